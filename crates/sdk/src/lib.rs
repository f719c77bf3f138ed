//! Client SDK for a ledger database.
//!
//! A [`Session`] is opened once from a connection and a session config. It
//! hands out:
//!
//! - [`TxContext`]s, one per transaction attempt, which compose, submit and
//!   authenticate a single transaction
//! - a [`Ledger`] for block, receipt and proof queries, and for end-to-end
//!   verification of a committed transaction
//!
//! # Example
//!
//! ```ignore
//! use sdk::{CommitOutcome, ConnectionConfig, Session, SessionConfig};
//!
//! let session = Session::connect(
//!     &ConnectionConfig::load("connection.json")?,
//!     &SessionConfig::load("session.json")?,
//! )?;
//!
//! let mut tx = session.data_tx();
//! tx.data()?.put("bdb", "key1", b"value1".to_vec(), None);
//! if let CommitOutcome::Committed { receipt, .. } = tx.commit(true).await? {
//!     let ledger = session.ledger();
//!     let anchor = ledger.last_block_header().await?;
//!     let proof = ledger
//!         .full_tx_proof_and_verify(&receipt, &anchor, tx.tx_envelope()?)
//!         .await?;
//!     assert!(proof.verified);
//! }
//! ```

mod config;
mod error;
mod ledger;
mod replica;
mod response;
mod tx_context;
mod tx_kind;

pub use config::{
    ConfigError, ConnectionConfig, NodeIdentityConfig, ReplicaConfig, SessionConfig,
    DEFAULT_COMMIT_TIMEOUT,
};
pub use error::{LedgerError, TxError};
pub use ledger::{FullTxProof, Ledger};
pub use replica::{FirstAvailable, Replica, ReplicaPolicy, ReplicaSelector, RoundRobin};
pub use response::{
    authenticate, GetBlockResponse, GetDataProofResponse, GetLedgerPathResponse,
    GetTxProofResponse, GetTxReceiptResponse, ResponseError, ResponseHeader, TxReceiptResponse,
};
pub use tx_context::{derive_tx_id, CommitOutcome, TxContext, TxState, COMMIT_TIMEOUT_MARGIN};
pub use tx_kind::{ConfigOps, DataTxOps, DbAdminOps, TxKind, UserAdminOps};

pub use identity;
pub use ledger_types;
pub use merkle;
pub use transport;

use identity::{KeyTable, SignatureVerifier, UserSigner};
use ledger_types::ProofScheme;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use transport::{HttpTransport, Transport};

/// Read-only state shared by every context and query of a session.
pub(crate) struct SessionShared {
    pub(crate) signer: UserSigner,
    pub(crate) replicas: Vec<Replica>,
    pub(crate) selector: Box<dyn ReplicaSelector>,
    pub(crate) verifier: Arc<dyn SignatureVerifier>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) commit_timeout: Duration,
    pub(crate) query_timeout: Option<Duration>,
    pub(crate) scheme: ProofScheme,
}

/// An authenticated user's connection to the database.
#[derive(Clone)]
pub struct Session {
    shared: Arc<SessionShared>,
}

impl Session {
    /// Open a session over HTTP, loading the user's key from
    /// `config.signing_key_path`.
    pub fn connect(connection: &ConnectionConfig, config: &SessionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let signer = UserSigner::load(config.user_id.clone(), &config.signing_key_path)?;
        Self::with_transport(connection, config, signer, Arc::new(HttpTransport::new()))
    }

    /// Open a session over an arbitrary transport.
    pub fn with_transport(
        connection: &ConnectionConfig,
        config: &SessionConfig,
        signer: UserSigner,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ConfigError> {
        connection.validate()?;
        config.validate()?;
        if signer.user_id() != config.user_id {
            return Err(ConfigError::Invalid(format!(
                "signing key belongs to {}, session is for {}",
                signer.user_id(),
                config.user_id
            )));
        }

        let replicas = connection
            .replicas
            .iter()
            .map(Replica::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        let keys = KeyTable::from_hex(
            connection
                .trusted_nodes
                .iter()
                .map(|node| (node.id.as_str(), node.public_key.as_str())),
        )?;

        info!(
            "Opened session for {} with {} replicas and {} trusted nodes",
            config.user_id,
            replicas.len(),
            keys.len()
        );

        Ok(Self {
            shared: Arc::new(SessionShared {
                signer,
                replicas,
                selector: connection.replica_policy.selector(),
                verifier: Arc::new(keys),
                transport,
                commit_timeout: config.commit_timeout,
                query_timeout: config.query_deadline(),
                scheme: connection.scheme,
            }),
        })
    }

    pub fn user_id(&self) -> &str {
        self.shared.signer.user_id()
    }

    pub fn scheme(&self) -> ProofScheme {
        self.shared.scheme
    }

    pub fn data_tx(&self) -> TxContext {
        self.tx(TxKind::Data(DataTxOps::default()))
    }

    pub fn db_tx(&self) -> TxContext {
        self.tx(TxKind::DbAdmin(DbAdminOps::default()))
    }

    pub fn user_tx(&self) -> TxContext {
        self.tx(TxKind::UserAdmin(UserAdminOps::default()))
    }

    pub fn config_tx(&self) -> TxContext {
        self.tx(TxKind::Config(ConfigOps::default()))
    }

    fn tx(&self, kind: TxKind) -> TxContext {
        TxContext::new(Arc::clone(&self.shared), kind)
    }

    pub fn ledger(&self) -> Ledger {
        Ledger::new(Arc::clone(&self.shared))
    }
}
