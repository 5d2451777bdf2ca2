//! TOML configuration and graph-engine selection.
//!
//! [`CoachConfig`] is persisted as TOML with serde defaults, so a missing or
//! partial file still yields a working setup. The `[graph]` section selects
//! which concept-graph engine is constructed at startup; a missing section,
//! bad credentials, or an unreachable backend leaves the graph capability
//! absent for the process lifetime instead of crashing the service.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::graph::cypher::{CypherConfig, CypherStore};
use crate::graph::postgrest::{PostgrestConfig, PostgrestStore};
use crate::graph::{ConceptStore, MemoryStore};
use crate::identity::IdentityConfig;
use crate::scoring::ScoringConfig;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration, persisted as TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoachConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub graph: GraphSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cypher: Option<CypherSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgrest: Option<PostgrestSection>,
}

/// Where the session store keeps its data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".mathesis")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Which concept-graph engine to construct at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSection {
    /// `"cypher"`, `"postgrest"`, `"memory"`, or `"none"`.
    #[serde(default = "default_engine")]
    pub engine: String,
}

fn default_engine() -> String {
    "none".into()
}

impl Default for GraphSection {
    fn default() -> Self {
        Self {
            engine: default_engine(),
        }
    }
}

/// Connection settings for the native graph engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CypherSection {
    pub url: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_database() -> String {
    "neo4j".into()
}

/// Connection settings for the relational-REST engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgrestSection {
    pub url: String,
    pub key: String,
}

impl CoachConfig {
    /// Load from a TOML file.
    pub fn load(path: &std::path::Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Save to a TOML file, creating parent directories.
    pub fn save(&self, path: &std::path::Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                    path: parent.display().to_string(),
                    source: e,
                })?;
            }
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}

/// Construct the configured graph engine and ensure its schema.
///
/// Startup-time graph failures are logged once and surface as an absent
/// capability, never as a crash.
pub fn connect_graph(config: &CoachConfig) -> Option<Arc<dyn ConceptStore>> {
    let store: Arc<dyn ConceptStore> = match config.graph.engine.as_str() {
        "none" | "" => return None,
        "memory" => Arc::new(MemoryStore::new(
            config.identity.clone(),
            config.scoring.clone(),
        )),
        "cypher" => {
            let Some(section) = &config.cypher else {
                tracing::warn!("graph engine is \"cypher\" but [cypher] section is missing");
                return None;
            };
            Arc::new(CypherStore::new(
                CypherConfig {
                    url: section.url.clone(),
                    user: section.user.clone(),
                    password: section.password.clone(),
                    database: section.database.clone(),
                },
                config.identity.clone(),
                config.scoring.clone(),
            ))
        }
        "postgrest" => {
            let Some(section) = &config.postgrest else {
                tracing::warn!("graph engine is \"postgrest\" but [postgrest] section is missing");
                return None;
            };
            Arc::new(PostgrestStore::new(
                PostgrestConfig {
                    url: section.url.clone(),
                    key: section.key.clone(),
                },
                config.identity.clone(),
                config.scoring.clone(),
            ))
        }
        other => {
            tracing::warn!(engine = %other, "unknown graph engine, running without graph");
            return None;
        }
    };

    if let Err(error) = store.ensure_schema() {
        tracing::warn!(error = %error, "graph schema setup failed, running without graph");
        return None;
    }
    tracing::info!(engine = %config.graph.engine, "graph engine connected");
    Some(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_run_without_graph() {
        let cfg = CoachConfig::default();
        assert_eq!(cfg.graph.engine, "none");
        assert!(connect_graph(&cfg).is_none());
    }

    #[test]
    fn config_roundtrip_toml() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("mathesis.toml");

        let mut cfg = CoachConfig::default();
        cfg.graph.engine = "postgrest".into();
        cfg.postgrest = Some(PostgrestSection {
            url: "https://project.example.co".into(),
            key: "anon".into(),
        });
        cfg.scoring.decay_days = 14.0;
        cfg.save(&path).unwrap();

        let loaded = CoachConfig::load(&path).unwrap();
        assert_eq!(loaded.graph.engine, "postgrest");
        assert_eq!(loaded.postgrest.unwrap().url, "https://project.example.co");
        assert!((loaded.scoring.decay_days - 14.0).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: CoachConfig = toml::from_str("[graph]\nengine = \"memory\"\n").unwrap();
        assert_eq!(cfg.graph.engine, "memory");
        assert!((cfg.scoring.baseline - 0.12).abs() < f64::EPSILON);
        assert!(!cfg.identity.case_fold);
    }

    #[test]
    fn memory_engine_connects() {
        let cfg: CoachConfig = toml::from_str("[graph]\nengine = \"memory\"\n").unwrap();
        assert!(connect_graph(&cfg).is_some());
    }

    #[test]
    fn misconfigured_engine_leaves_capability_absent() {
        // Engine selected but its section missing: absent, not a crash.
        let cfg: CoachConfig = toml::from_str("[graph]\nengine = \"cypher\"\n").unwrap();
        assert!(connect_graph(&cfg).is_none());

        let cfg: CoachConfig = toml::from_str("[graph]\nengine = \"warp-drive\"\n").unwrap();
        assert!(connect_graph(&cfg).is_none());
    }
}
