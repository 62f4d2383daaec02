// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque task address of the form `<unit>.<instance>`.
///
/// A bare unit name (`"yolo"`) is also a valid `WorkId`; it addresses the unit
/// itself rather than one of its tasks and has no instance number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkId(String);

impl WorkId {
    pub fn new(unit: &str, instance: u32) -> Self {
        Self(format!("{}.{}", unit, instance))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unit name portion (everything before the first `.`).
    pub fn unit(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }

    /// Numeric instance id, or `None` when this addresses the unit itself.
    pub fn instance(&self) -> Option<u32> {
        let (_, rest) = self.0.split_once('.')?;
        rest.parse().ok()
    }

    pub fn is_unit_scoped(&self) -> bool {
        !self.0.contains('.')
    }

    /// Topic this task publishes its output envelopes on.
    pub fn out_port(&self) -> String {
        format!("{}.out_port", self.0)
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkId {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decomposes_into_unit_and_instance() {
        let id = WorkId::new("yolo", 1000);
        assert_eq!(id.as_str(), "yolo.1000");
        assert_eq!(id.unit(), "yolo");
        assert_eq!(id.instance(), Some(1000));
        assert!(!id.is_unit_scoped());
        assert_eq!(id.out_port(), "yolo.1000.out_port");
    }

    #[test]
    fn test_bare_unit_name_has_no_instance() {
        let id = WorkId::from("kws");
        assert_eq!(id.unit(), "kws");
        assert_eq!(id.instance(), None);
        assert!(id.is_unit_scoped());
    }

    #[test]
    fn test_non_numeric_instance() {
        assert_eq!(WorkId::from("tts.out").instance(), None);
    }
}
