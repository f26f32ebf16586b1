/*
 * SPDX-FileCopyrightText: 2025 Sven Shi
 * SPDX-License-Identifier: GPL-3.0-or-later
 */

//! Stream handler implementations and their registry
//!
//! A registry maps the `handler.type` configuration value to the factory
//! that builds the matching [`StreamHandler`](crate::server::StreamHandler).
//! Registries are plain values, so several gateways can run in one process.

use crate::core::error::{GatewayError, Result};
use crate::server::HandlerFactory;
use std::collections::HashMap;

pub mod echo;
pub mod proxy;
pub mod txid;

/// Handler type names mapped to their factories
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    factories: HashMap<String, Box<dyn HandlerFactory>>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `proxy` and `echo` handlers
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register_factory("proxy", Box::new(proxy::ProxyFactory));
        registry.register_factory("echo", Box::new(echo::EchoFactory));
        registry
    }

    pub fn register_factory(&mut self, handler_type: &str, factory: Box<dyn HandlerFactory>) {
        self.factories.insert(handler_type.to_string(), factory);
    }

    /// Factory registered for `handler_type`
    pub fn get(&self, handler_type: &str) -> Result<&dyn HandlerFactory> {
        self.factories
            .get(handler_type)
            .map(|factory| factory.as_ref())
            .ok_or_else(|| GatewayError::config(format!("Unknown handler type: {}", handler_type)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_resolves_known_types() {
        let registry = HandlerRegistry::with_builtin();
        assert_eq!(registry.get("proxy").unwrap().create(None).unwrap().name(), "proxy");
        assert_eq!(registry.get("echo").unwrap().create(None).unwrap().name(), "echo");
    }

    #[test]
    fn test_unknown_type_is_config_error() {
        let registry = HandlerRegistry::with_builtin();
        let err = registry.get("recursive").unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
        assert!(err.to_string().contains("recursive"));
    }
}
