// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{
    DEFAULT_FIRST_INSTANCE_ID, DEFAULT_QUEUE_CAPACITY, DEFAULT_REPLY_TOPIC,
    DEFAULT_TASK_COUNT_LIMIT,
};
use crate::errors::ConfigError;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Process-wide configuration for one unit.
///
/// Loaded once at startup. Per-task settings arrive later in the `setup`
/// request and are parsed into [`SetupRequest`](crate::config::SetupRequest).
///
/// # Example
/// ```yaml
/// unit_name: yolo
/// task_count_limit: 2
/// queue_capacity: 3
/// models:
///   yolo11n:
///     engine: echo
///     accelerator: true
///     options:
///       bgr2rgb: true
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct UnitConfig {
    pub unit_name: String,
    /// Topic the controller listens on for control envelopes. Defaults to `unit_name`.
    #[serde(default)]
    pub control_topic: Option<String>,
    #[serde(default = "default_reply_topic")]
    pub reply_topic: String,
    #[serde(default = "default_task_count_limit")]
    pub task_count_limit: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_first_instance_id")]
    pub first_instance_id: u32,
    #[serde(default)]
    pub models: HashMap<String, ModelConfig>,
}

impl UnitConfig {
    /// Minimal config with built-in defaults and no models.
    pub fn new(unit_name: impl Into<String>) -> Self {
        Self {
            unit_name: unit_name.into(),
            control_topic: None,
            reply_topic: default_reply_topic(),
            task_count_limit: DEFAULT_TASK_COUNT_LIMIT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            first_instance_id: DEFAULT_FIRST_INSTANCE_ID,
            models: HashMap::new(),
        }
    }

    pub fn with_model(mut self, name: impl Into<String>, model: ModelConfig) -> Self {
        self.models.insert(name.into(), model);
        self
    }

    pub fn control_topic(&self) -> &str {
        self.control_topic.as_deref().unwrap_or(&self.unit_name)
    }
}

/// One model a task may be set up with.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelConfig {
    /// Engine factory key, e.g. `echo` or `pcm_stitch`.
    pub engine: String,
    /// Whether the engine runs on the shared hardware accelerator.
    #[serde(default)]
    pub accelerator: bool,
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl ModelConfig {
    pub fn new(engine: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            ..Default::default()
        }
    }

    pub fn on_accelerator(mut self) -> Self {
        self.accelerator = true;
        self
    }

    pub fn with_option(mut self, key: &str, value: serde_json::Value) -> Self {
        self.options.insert(key.to_string(), value);
        self
    }
}

fn default_reply_topic() -> String {
    DEFAULT_REPLY_TOPIC.to_string()
}

fn default_task_count_limit() -> usize {
    DEFAULT_TASK_COUNT_LIMIT
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_first_instance_id() -> u32 {
    DEFAULT_FIRST_INSTANCE_ID
}

/// Load a unit config. Files ending in `.toml` are read as TOML, anything else as YAML.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<UnitConfig, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let cfg = match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => toml::from_str(&content)?,
        _ => serde_yaml::from_str(&content)?,
    };
    Ok(cfg)
}

/// Load a unit config and reject values the controller cannot run with.
pub fn load_and_validate_config<P: AsRef<Path>>(path: P) -> Result<UnitConfig, ConfigError> {
    let cfg = load_config(path)?;
    validate_config(&cfg)?;
    Ok(cfg)
}

pub fn validate_config(cfg: &UnitConfig) -> Result<(), ConfigError> {
    let mut problems = Vec::new();

    if cfg.unit_name.is_empty() {
        problems.push("unit_name must not be empty".to_string());
    } else if cfg.unit_name.contains('.') {
        problems.push(format!("unit_name '{}' must not contain '.'", cfg.unit_name));
    }
    if cfg.queue_capacity == 0 {
        problems.push("queue_capacity must be at least 1".to_string());
    }
    if cfg.task_count_limit == 0 {
        problems.push("task_count_limit must be at least 1".to_string());
    }
    let mut names: Vec<&String> = cfg.models.keys().collect();
    names.sort();
    for name in names {
        if cfg.models[name].engine.is_empty() {
            problems.push(format!("model '{}' does not name an engine", name));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(problems))
    }
}
