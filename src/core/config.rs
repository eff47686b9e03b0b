/*
 * Copyright 2025 Vijaykumar Singh
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {field} = {value}")]
    InvalidValue { field: String, value: String },

    #[error("Failed to read configuration file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("TOML parsing error: {0}")]
    TomlParseError(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub index: IndexConfig,
    pub fusion: FusionConfig,
    pub persistence: PersistenceConfig,
    pub embedder: EmbedderConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Embedding dimension D, fixed per deployment
    pub dimension: usize,
    /// How many candidates a search scans for before joining and truncating
    pub search_breadth: usize,
    /// Maximum number of results handed back to a caller
    pub result_limit: usize,
}

/// Weights of the image/text fusion policy. Ingestion and query share them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub image_weight: f32,
    pub text_weight: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub data_dir: PathBuf,
    /// Periodic checkpoint interval; 0 disables the timer
    pub checkpoint_interval_secs: u64,
    /// Checkpoint after this many inserts; 0 disables the trigger
    pub checkpoint_every_inserts: u64,
    /// fsync every WAL append
    pub sync_writes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedderConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Write daily-rolling log files here in addition to stdout
    pub directory: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: 512,
            search_breadth: 10,
            result_limit: 5,
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            image_weight: 0.6,
            text_weight: 0.4,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_dir: PathBuf::from("./data"),
            checkpoint_interval_secs: 60,
            checkpoint_every_inserts: 1000,
            sync_writes: true,
        }
    }
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9000".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults for any
    /// section or field the file leaves out.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(contents).map_err(|e| ConfigError::TomlParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &str, value: impl ToString) -> ConfigError {
            ConfigError::InvalidValue {
                field: field.to_string(),
                value: value.to_string(),
            }
        }

        if self.index.dimension == 0 {
            return Err(invalid("index.dimension", self.index.dimension));
        }
        if self.index.search_breadth == 0 {
            return Err(invalid("index.search_breadth", self.index.search_breadth));
        }
        if self.index.result_limit == 0 {
            return Err(invalid("index.result_limit", self.index.result_limit));
        }

        let FusionConfig {
            image_weight,
            text_weight,
        } = self.fusion;
        if !image_weight.is_finite() || image_weight < 0.0 {
            return Err(invalid("fusion.image_weight", image_weight));
        }
        if !text_weight.is_finite() || text_weight < 0.0 {
            return Err(invalid("fusion.text_weight", text_weight));
        }
        if image_weight + text_weight == 0.0 {
            return Err(invalid("fusion.image_weight + fusion.text_weight", 0.0));
        }

        if self.embedder.timeout_secs == 0 {
            return Err(invalid("embedder.timeout_secs", self.embedder.timeout_secs));
        }
        Ok(())
    }

    /// Directory holding the snapshot and WAL segments.
    pub fn data_dir(&self) -> &Path {
        &self.persistence.data_dir
    }
}
