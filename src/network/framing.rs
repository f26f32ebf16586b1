/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Length-prefixed DNS framing
//!
//! Stream transports (DoQ streams and TCP backends) carry each DNS message as
//! `u16 big-endian length || payload`. The helpers here work on raw payload
//! bytes so the gateway can forward messages without re-encoding them.

use crate::core::error::{GatewayError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_LEN: usize = 2;

/// Largest payload a single frame can carry.
pub const MAX_FRAME_LEN: usize = u16::MAX as usize;

/// Prefix `payload` with its big-endian length.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes> {
    let len = u16::try_from(payload.len()).map_err(|_| {
        GatewayError::protocol(format!(
            "DNS message too large: {} bytes (max {})",
            payload.len(),
            MAX_FRAME_LEN
        ))
    })?;
    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    frame.put_u16(len);
    frame.put_slice(payload);
    Ok(frame.freeze())
}

/// Split one complete frame into its payload.
///
/// The declared length must match the trailing byte count exactly.
pub fn decode_frame(frame: &[u8]) -> Result<&[u8]> {
    let (prefix, payload) = frame
        .split_first_chunk::<LENGTH_PREFIX_LEN>()
        .ok_or_else(|| GatewayError::protocol("Frame shorter than its length prefix"))?;
    let declared = u16::from_be_bytes(*prefix) as usize;
    if declared != payload.len() {
        return Err(GatewayError::protocol(format!(
            "Frame length mismatch: declared {}, carried {}",
            declared,
            payload.len()
        )));
    }
    Ok(payload)
}

/// Read the 2-byte length prefix.
pub async fn read_length_prefix<R>(reader: &mut R) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut len_prefix = [0u8; LENGTH_PREFIX_LEN];
    reader.read_exact(&mut len_prefix).await?;
    Ok(u16::from_be_bytes(len_prefix) as usize)
}

/// Read exactly `len` payload bytes, tolerating short reads from the transport.
pub async fn read_payload<R>(reader: &mut R, len: usize) -> std::io::Result<BytesMut>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::zeroed(len);
    reader.read_exact(&mut buf[..]).await?;
    Ok(buf)
}

/// Read one complete frame and return its payload.
pub async fn read_frame<R>(reader: &mut R) -> Result<BytesMut>
where
    R: AsyncRead + Unpin,
{
    let msg_len = read_length_prefix(reader)
        .await
        .map_err(|e| GatewayError::protocol(format!("Failed to read length prefix: {}", e)))?;
    read_payload(reader, msg_len).await.map_err(|e| {
        GatewayError::protocol(format!(
            "Failed to read DNS message body ({} bytes): {}",
            msg_len, e
        ))
    })
}

/// Write `payload` as one frame.
///
/// Length prefix and body go out in a single write so a frame is never split
/// across two transport writes by this side.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(payload)?;
    writer
        .write_all(&frame)
        .await
        .map_err(|e| GatewayError::protocol(format!("Failed to write DNS frame: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[test]
    fn test_frame_round_trip() {
        for len in [0usize, 1, 12, 512, 4096, MAX_FRAME_LEN] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let frame = encode_frame(&payload).unwrap();
            assert_eq!(frame.len(), LENGTH_PREFIX_LEN + len);
            let decoded = decode_frame(&frame).unwrap();
            assert_eq!(decoded, &payload[..]);
            assert_eq!(encode_frame(decoded).unwrap(), frame);
        }
    }

    #[test]
    fn test_encode_rejects_oversized_payload() {
        let payload = vec![0u8; MAX_FRAME_LEN + 1];
        assert!(matches!(
            encode_frame(&payload),
            Err(GatewayError::Protocol(_))
        ));
    }

    #[test]
    fn test_decode_rejects_length_mismatch() {
        assert!(decode_frame(&[0x00]).is_err());
        assert!(decode_frame(&[0x00, 0x03, 1, 2]).is_err());
        assert!(decode_frame(&[0x00, 0x01, 1, 2]).is_err());
        assert_eq!(decode_frame(&[0x00, 0x00]).unwrap(), &[] as &[u8]);
    }

    #[tokio::test]
    async fn test_read_frame_across_partial_writes() {
        let (mut client, mut server) = duplex(4);
        let writer = tokio::spawn(async move {
            client.write_all(&[0x00, 0x05]).await.unwrap();
            client.write_all(b"he").await.unwrap();
            client.write_all(b"llo").await.unwrap();
        });
        let payload = read_frame(&mut server).await.unwrap();
        assert_eq!(&payload[..], b"hello");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_frame_truncated_body() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[0x00, 0x0a, 1, 2, 3, 4]).await.unwrap();
        drop(client);
        let err = read_frame(&mut server).await.unwrap_err();
        assert!(err.to_string().contains("body"));
    }

    #[tokio::test]
    async fn test_write_then_read_frame() {
        let (mut client, mut server) = duplex(64);
        write_frame(&mut client, b"\x00\x00query").await.unwrap();
        let payload = read_frame(&mut server).await.unwrap();
        assert_eq!(&payload[..], b"\x00\x00query");
    }
}
