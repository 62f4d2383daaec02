// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::traits::Registry;

/// In-memory key/value registry.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    entries: RwLock<HashMap<String, String>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Registry for StaticRegistry {
    fn lookup(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn insert(&self, key: &str, value: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_lookup_remove() {
        let registry = StaticRegistry::new();
        assert!(registry.lookup("camera.1000.out_port").is_none());

        registry.insert("camera.1000.out_port", "camera.1000.out_port");
        assert_eq!(
            registry.lookup("camera.1000.out_port").as_deref(),
            Some("camera.1000.out_port")
        );

        registry.remove("camera.1000.out_port");
        registry.remove("camera.1000.out_port");
        assert!(registry.is_empty());
    }
}
