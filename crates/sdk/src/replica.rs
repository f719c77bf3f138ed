//! Replica set and the policy that picks which replica serves a request.

use crate::config::{ConfigError, ReplicaConfig};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use transport::{TransportError, Url};

/// A replica endpoint and the node identity expected to answer from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replica {
    pub id: String,
    pub url: Url,
}

impl Replica {
    pub fn new(id: impl Into<String>, url: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { id: id.into(), url })
    }

    pub fn from_config(config: &ReplicaConfig) -> Result<Self, ConfigError> {
        Self::new(config.id.clone(), &config.url)
    }

    /// Resolve an absolute endpoint path (with optional query) against the
    /// replica's base url.
    pub fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.url
            .join(path)
            .map_err(|e| TransportError::InvalidUrl(format!("{path}: {e}")))
    }
}

/// Picks the replica a request is sent to.
pub trait ReplicaSelector: Send + Sync {
    fn select<'a>(&self, replicas: &'a [Replica]) -> Option<&'a Replica>;
}

/// Always the first configured replica.
#[derive(Debug, Default)]
pub struct FirstAvailable;

impl ReplicaSelector for FirstAvailable {
    fn select<'a>(&self, replicas: &'a [Replica]) -> Option<&'a Replica> {
        replicas.first()
    }
}

/// Cycles through the replicas, one request at a time.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl ReplicaSelector for RoundRobin {
    fn select<'a>(&self, replicas: &'a [Replica]) -> Option<&'a Replica> {
        if replicas.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % replicas.len();
        replicas.get(index)
    }
}

/// Selection policy named in the connection config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaPolicy {
    #[default]
    FirstAvailable,
    RoundRobin,
}

impl ReplicaPolicy {
    pub fn selector(self) -> Box<dyn ReplicaSelector> {
        match self {
            ReplicaPolicy::FirstAvailable => Box::new(FirstAvailable),
            ReplicaPolicy::RoundRobin => Box::new(RoundRobin::default()),
        }
    }
}
