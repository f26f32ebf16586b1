/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

use std::fs;
use std::path::Path;

const SAMPLE_CONFIG: &str = "./resource/config.yaml";

fn main() {
    println!("cargo:rerun-if-changed={}", SAMPLE_CONFIG);

    // `target/<profile>/build/<pkg>-<hash>/out` → `target/<profile>/`
    let Ok(out_dir) = std::env::var("OUT_DIR") else {
        return;
    };
    let Some(profile_dir) = Path::new(&out_dir).ancestors().nth(3) else {
        return;
    };

    // Place a sample configuration next to the binaries
    if let Err(e) = fs::copy(SAMPLE_CONFIG, profile_dir.join("config.yaml")) {
        println!("cargo:warning=Failed to copy {}: {}", SAMPLE_CONFIG, e);
    }
}
