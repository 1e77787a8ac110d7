//! Pipeline configuration documents.
//!
//! A [`PipelineConfig`] is the engine's input from an external
//! configuration loader: a set of global variables, each with a
//! read-only flag, applied to the process-global store when a pipeline
//! is constructed with [`Pipeline::with_config`].
//!
//! # JSON shape
//!
//! ```json
//! {
//!   "v": 1,
//!   "variables": [
//!     { "name": "base_url", "value": "https://example.org", "read_only": true },
//!     { "name": "greeting", "value": "hello" }
//!   ],
//!   "strict": false
//! }
//! ```
//!
//! [`Pipeline::with_config`]: crate::pipeline::Pipeline::with_config

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::{EngineError, Result};
use crate::variables::set_global;

/// Top-level configuration document (v1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Config version (currently `1`).
    pub v: u32,

    /// Global variables to seed.
    #[serde(default)]
    pub variables: Vec<ConfigVariable>,

    /// If `true`, unrecognized fields are errors; if `false`, they are
    /// ignored.
    #[serde(default)]
    pub strict: bool,

    /// Captures any fields not recognized by the schema.
    #[serde(flatten)]
    pub unknown_fields: HashMap<String, serde_json::Value>,
}

/// One variable seeded into the process-global store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigVariable {
    pub name: String,

    #[serde(default)]
    pub value: Option<String>,

    #[serde(default)]
    pub read_only: bool,
}

impl PipelineConfig {
    /// An empty v1 config.
    pub fn new() -> Self {
        Self {
            v: 1,
            variables: Vec::new(),
            strict: false,
            unknown_fields: HashMap::new(),
        }
    }

    /// Add a variable.
    pub fn with_variable(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        read_only: bool,
    ) -> Self {
        self.variables.push(ConfigVariable {
            name: name.into(),
            value: Some(value.into()),
            read_only,
        });
        self
    }

    /// Parse a config document from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PipelineConfig =
            serde_json::from_str(json).map_err(|e| EngineError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate version and strictness constraints.
    pub fn validate(&self) -> Result<()> {
        if self.v != 1 {
            return Err(EngineError::invalid_config(format!(
                "unsupported config version {}",
                self.v
            )));
        }
        if self.strict && !self.unknown_fields.is_empty() {
            let mut names: Vec<_> = self.unknown_fields.keys().cloned().collect();
            names.sort();
            return Err(EngineError::invalid_config(format!(
                "unknown fields: {}",
                names.join(", ")
            )));
        }
        Ok(())
    }

    /// Write every configured variable into the process-global store.
    pub(crate) fn apply(&self) {
        for var in &self.variables {
            set_global(&var.name, var.value.clone(), var.read_only);
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new()
    }
}
