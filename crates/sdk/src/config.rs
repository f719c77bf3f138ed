//! Connection and session configuration.
//!
//! Both files are JSON and are read once, when a session is opened.

use crate::replica::ReplicaPolicy;
use identity::SignatureError;
use ledger_types::ProofScheme;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default synchronous commit timeout.
pub const DEFAULT_COMMIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that can occur while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("invalid replica url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("key error: {0}")]
    Key(#[from] SignatureError),
}

/// A replica the client may send requests to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicaConfig {
    /// Node identity the replica signs its responses with.
    pub id: String,
    pub url: String,
}

/// A node identity trusted to sign responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeIdentityConfig {
    pub id: String,
    /// Hex-encoded ed25519 public key.
    pub public_key: String,
}

/// Where the database lives and whom to trust.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub replicas: Vec<ReplicaConfig>,
    pub trusted_nodes: Vec<NodeIdentityConfig>,
    #[serde(default)]
    pub replica_policy: ReplicaPolicy,
    #[serde(default)]
    pub scheme: ProofScheme,
}

impl ConnectionConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = load_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.replicas.is_empty() {
            return Err(ConfigError::Invalid("no replicas configured".to_string()));
        }
        if self.trusted_nodes.is_empty() {
            return Err(ConfigError::Invalid("no trusted nodes configured".to_string()));
        }

        let mut seen = HashSet::new();
        for replica in &self.replicas {
            if !seen.insert(replica.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate replica id {}", replica.id)));
            }
        }
        Ok(())
    }
}

/// Per-user session settings.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    pub user_id: String,
    /// File holding the user's hex-encoded ed25519 seed.
    pub signing_key_path: PathBuf,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "commit_timeout_ms", default = "default_commit_timeout")]
    pub commit_timeout: Duration,
    /// Zero means queries wait indefinitely.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "query_timeout_ms", default)]
    pub query_timeout: Duration,
}

fn default_commit_timeout() -> Duration {
    DEFAULT_COMMIT_TIMEOUT
}

impl SessionConfig {
    pub fn new(user_id: impl Into<String>, signing_key_path: impl Into<PathBuf>) -> Self {
        Self {
            user_id: user_id.into(),
            signing_key_path: signing_key_path.into(),
            commit_timeout: DEFAULT_COMMIT_TIMEOUT,
            query_timeout: Duration::ZERO,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = load_json(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_id.is_empty() {
            return Err(ConfigError::Invalid("user_id is empty".to_string()));
        }
        if self.commit_timeout.is_zero() {
            return Err(ConfigError::Invalid("commit timeout must be positive".to_string()));
        }
        Ok(())
    }

    /// Query deadline, if any.
    pub fn query_deadline(&self) -> Option<Duration> {
        (!self.query_timeout.is_zero()).then_some(self.query_timeout)
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let data = std::fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&data).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_types::{Encoding, HashFunction};

    const CONNECTION: &str = r#"{
        "replicas": [{"id": "node1", "url": "http://127.0.0.1:6001"}],
        "trusted_nodes": [{"id": "node1", "public_key": "00"}],
        "replica_policy": "round_robin",
        "scheme": {"hash": "sha3_256", "encoding": "json"}
    }"#;

    #[test]
    fn test_parse_connection_config() {
        let config: ConnectionConfig = serde_json::from_str(CONNECTION).unwrap();
        assert_eq!(config.replicas[0].id, "node1");
        assert_eq!(config.replica_policy, ReplicaPolicy::RoundRobin);
        assert_eq!(config.scheme, ProofScheme::new(HashFunction::Sha3_256, Encoding::Json));
        config.validate().unwrap();
    }

    #[test]
    fn test_connection_defaults() {
        let config: ConnectionConfig = serde_json::from_str(
            r#"{"replicas": [{"id": "n", "url": "http://h"}], "trusted_nodes": []}"#,
        )
        .unwrap();
        assert_eq!(config.replica_policy, ReplicaPolicy::FirstAvailable);
        assert_eq!(config.scheme, ProofScheme::V1);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_duplicate_replicas_rejected() {
        let mut config: ConnectionConfig = serde_json::from_str(CONNECTION).unwrap();
        config.replicas.push(config.replicas[0].clone());
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_session_timeouts() {
        let config: SessionConfig = serde_json::from_str(
            r#"{"user_id": "alice", "signing_key_path": "alice.key", "query_timeout_ms": 1500}"#,
        )
        .unwrap();
        assert_eq!(config.commit_timeout, DEFAULT_COMMIT_TIMEOUT);
        assert_eq!(config.query_deadline(), Some(Duration::from_millis(1500)));

        let unbounded = SessionConfig::new("alice", "alice.key");
        assert_eq!(unbounded.query_deadline(), None);
    }

    #[test]
    fn test_zero_commit_timeout_rejected() {
        let config: SessionConfig = serde_json::from_str(
            r#"{"user_id": "alice", "signing_key_path": "k", "commit_timeout_ms": 0}"#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("ledger-connection-{}.json", std::process::id()));
        std::fs::write(&path, CONNECTION).unwrap();
        let config = ConnectionConfig::load(&path).unwrap();
        assert_eq!(config.trusted_nodes.len(), 1);
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(
            ConnectionConfig::load(&path),
            Err(ConfigError::Io { .. })
        ));
    }
}
