// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Runtime configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! model_path = "./models/mobilenet"
//! memory_budget = "4M"
//! backends = ["planar", "cpu"]
//! enable_profiling = true
//!
//! [input_shapes]
//! image = [1, 224, 224, 3]
//! ```

use backend_planner::{create_backend, Backend};
use memory_manager::MemoryBudget;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::RuntimeError;

/// Configuration for the inference runtime.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RuntimeConfig {
    /// Path to the model directory.
    pub model_path: PathBuf,
    /// Arena budget (human-readable, e.g., `"256K"`).
    pub memory_budget: String,
    /// Backend ids in preference order: `"planar"`, `"cpu"`.
    #[serde(default = "default_backends")]
    pub backends: Vec<String>,
    /// Whether to record per-node timings.
    #[serde(default = "default_true")]
    pub enable_profiling: bool,
    /// Concrete shapes for graph inputs with unknown dimensions, applied
    /// before planning.
    #[serde(default)]
    pub input_shapes: BTreeMap<String, Vec<usize>>,
}

fn default_true() -> bool {
    true
}

fn default_backends() -> Vec<String> {
    vec!["cpu".to_string()]
}

impl RuntimeConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::ConfigError(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, RuntimeError> {
        toml::from_str(toml_str)
            .map_err(|e| RuntimeError::ConfigError(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, RuntimeError> {
        toml::to_string_pretty(self)
            .map_err(|e| RuntimeError::ConfigError(format!("TOML serialise error: {e}")))
    }

    /// Parses the memory budget string into a [`MemoryBudget`].
    pub fn parse_budget(&self) -> Result<MemoryBudget, RuntimeError> {
        MemoryBudget::parse(&self.memory_budget)
            .map_err(|e| RuntimeError::ConfigError(format!("invalid budget: {e}")))
    }

    /// Constructs the configured backends in preference order.
    pub fn create_backends(&self) -> Result<Vec<Box<dyn Backend>>, RuntimeError> {
        if self.backends.is_empty() {
            return Err(RuntimeError::ConfigError("no backends configured".into()));
        }
        self.backends
            .iter()
            .map(|id| {
                create_backend(id).map_err(|e| {
                    RuntimeError::ConfigError(format!(
                        "{e}; expected one of {:?}",
                        backend_planner::BACKEND_IDS
                    ))
                })
            })
            .collect()
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("./models/mobilenet"),
            memory_budget: "4M".to_string(),
            backends: default_backends(),
            enable_profiling: true,
            input_shapes: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default() {
        let c = RuntimeConfig::default();
        assert_eq!(c.memory_budget, "4M");
        assert_eq!(c.backends, vec!["cpu"]);
        assert!(c.enable_profiling);
        assert!(c.input_shapes.is_empty());
    }

    #[test]
    fn test_parse_budget() {
        let c = RuntimeConfig {
            memory_budget: "256K".into(),
            ..Default::default()
        };
        assert_eq!(c.parse_budget().unwrap().as_bytes(), 256 * 1024);

        let bad = RuntimeConfig {
            memory_budget: "lots".into(),
            ..Default::default()
        };
        assert!(matches!(bad.parse_budget(), Err(RuntimeError::ConfigError(_))));
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
model_path = "/tmp/model"
memory_budget = "1M"
backends = ["planar", "cpu"]
enable_profiling = false

[input_shapes]
image = [1, 28, 28, 3]
"#;
        let c = RuntimeConfig::from_toml(toml).unwrap();
        assert_eq!(c.model_path, PathBuf::from("/tmp/model"));
        assert_eq!(c.memory_budget, "1M");
        assert_eq!(c.backends, vec!["planar", "cpu"]);
        assert!(!c.enable_profiling);
        assert_eq!(c.input_shapes["image"], vec![1, 28, 28, 3]);
    }

    #[test]
    fn test_optional_fields_default() {
        let c = RuntimeConfig::from_toml("model_path = \"m\"\nmemory_budget = \"64K\"\n").unwrap();
        assert_eq!(c.backends, vec!["cpu"]);
        assert!(c.enable_profiling);
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let mut c = RuntimeConfig::default();
        c.input_shapes.insert("x".into(), vec![1, 8]);
        let back = RuntimeConfig::from_toml(&c.to_toml().unwrap()).unwrap();
        assert_eq!(back, c);
    }

    #[test]
    fn test_create_backends() {
        let c = RuntimeConfig {
            backends: vec!["planar".into(), "cpu".into()],
            ..Default::default()
        };
        let ids: Vec<String> = c
            .create_backends()
            .unwrap()
            .iter()
            .map(|b| b.id().to_string())
            .collect();
        assert_eq!(ids, vec!["planar", "cpu"]);
    }

    #[test]
    fn test_create_backends_unknown() {
        let c = RuntimeConfig {
            backends: vec!["gpu".into()],
            ..Default::default()
        };
        assert!(c.create_backends().is_err());

        let empty = RuntimeConfig {
            backends: vec![],
            ..Default::default()
        };
        assert!(empty.create_backends().is_err());
    }
}
