//! Commit/abort protocol shared by every transaction kind.

use crate::replica::Replica;
use crate::response::{authenticate, TxReceiptResponse};
use crate::tx_kind::{ConfigOps, DataTxOps, DbAdminOps, TxKind, UserAdminOps};
use crate::{SessionShared, TxError};
use ledger_types::{ProofScheme, TxEnvelope, TxReceipt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use transport::{rejection_message, STATUS_ACCEPTED, STATUS_OK};

/// Extra time the client waits past the server-side commit timeout.
pub const COMMIT_TIMEOUT_MARGIN: Duration = Duration::from_secs(1);

const TX_NONCE_LEN: usize = 24;

/// Lifecycle of a transaction context. Every state except `Open` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Open,
    /// Submission in flight.
    Committing,
    Committed,
    /// Accepted by the server without a receipt.
    Submitted,
    TimedOut,
    Failed,
    Aborted,
}

impl TxState {
    pub fn is_spent(self) -> bool {
        self != TxState::Open
    }
}

/// Result of a commit that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Synchronous commit with an authenticated receipt.
    Committed { tx_id: String, receipt: TxReceipt },
    /// Asynchronous commit accepted by the replica.
    Accepted { tx_id: String },
    /// The outcome is pending. The transaction may still land; poll for its
    /// effect instead of resubmitting.
    TimedOut { tx_id: String },
}

impl CommitOutcome {
    pub fn tx_id(&self) -> &str {
        match self {
            CommitOutcome::Committed { tx_id, .. }
            | CommitOutcome::Accepted { tx_id }
            | CommitOutcome::TimedOut { tx_id } => tx_id,
        }
    }

    pub fn receipt(&self) -> Option<&TxReceipt> {
        match self {
            CommitOutcome::Committed { receipt, .. } => Some(receipt),
            _ => None,
        }
    }

    fn state(&self) -> TxState {
        match self {
            CommitOutcome::Committed { .. } => TxState::Committed,
            CommitOutcome::Accepted { .. } => TxState::Submitted,
            CommitOutcome::TimedOut { .. } => TxState::TimedOut,
        }
    }
}

/// Transaction id: hex digest of the submitting identity and a fresh nonce.
pub fn derive_tx_id(scheme: &ProofScheme, user_id: &str, nonce: &[u8]) -> String {
    hex::encode(scheme.digest_parts(&[user_id.as_bytes(), nonce]))
}

/// One transaction attempt.
///
/// A context is committed or aborted exactly once; after that every
/// `commit`/`abort` returns [`TxError::AlreadySpent`]. A failed commit is
/// never retried: open a new context, which carries a new id.
pub struct TxContext {
    shared: Arc<SessionShared>,
    kind: TxKind,
    tx_id: String,
    state: TxState,
    envelope: Option<TxEnvelope>,
}

impl TxContext {
    pub(crate) fn new(shared: Arc<SessionShared>, kind: TxKind) -> Self {
        let nonce: [u8; TX_NONCE_LEN] = rand::random();
        let tx_id = derive_tx_id(&shared.scheme, shared.signer.user_id(), &nonce);
        debug!("Opened {} transaction {}", kind.name(), tx_id);
        Self {
            shared,
            kind,
            tx_id,
            state: TxState::Open,
            envelope: None,
        }
    }

    pub fn tx_id(&self) -> &str {
        &self.tx_id
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// Submit the transaction to one replica.
    ///
    /// With `sync` the call waits up to the commit timeout (plus a margin)
    /// for an authenticated receipt; on expiry it returns
    /// [`CommitOutcome::TimedOut`]. Without `sync` it returns once the
    /// replica accepted the envelope.
    pub async fn commit(&mut self, sync: bool) -> Result<CommitOutcome, TxError> {
        if self.state.is_spent() {
            return Err(TxError::AlreadySpent);
        }

        let shared = Arc::clone(&self.shared);
        let replica = shared
            .selector
            .select(&shared.replicas)
            .ok_or(TxError::NoReplica)?;
        let url = replica.endpoint(self.kind.submit_path())?;
        let envelope = self
            .kind
            .compose_envelope(&self.tx_id, &shared.signer, &shared.scheme)?;
        let body = envelope.canonical_bytes(&shared.scheme)?;

        // From here on the context is spent, whatever the exchange yields.
        self.state = TxState::Committing;
        self.kind.clean();
        self.envelope = Some(envelope);

        info!(
            "Submitting {} transaction {} to replica {} (sync: {})",
            self.kind.name(),
            self.tx_id,
            replica.id,
            sync
        );

        let result = self.exchange(replica, &url, body, sync).await;
        self.state = match &result {
            Ok(outcome) => outcome.state(),
            Err(_) => TxState::Failed,
        };
        result
    }

    async fn exchange(
        &self,
        replica: &Replica,
        url: &transport::Url,
        body: Vec<u8>,
        sync: bool,
    ) -> Result<CommitOutcome, TxError> {
        let shared = &self.shared;
        let tx_id = self.tx_id.clone();

        let content_type = shared.scheme.content_type();
        let response = if sync {
            let deadline = shared.commit_timeout + COMMIT_TIMEOUT_MARGIN;
            let submission = shared
                .transport
                .submit(url, body, content_type, Some(shared.commit_timeout));
            match tokio::time::timeout(deadline, submission).await {
                Ok(response) => response?,
                Err(_) => {
                    warn!("Transaction {} not finalized within {:?}", tx_id, deadline);
                    return Ok(CommitOutcome::TimedOut { tx_id });
                }
            }
        } else {
            shared.transport.submit(url, body, content_type, None).await?
        };

        match response.status {
            STATUS_OK => {
                let decoded: TxReceiptResponse =
                    authenticate(shared.verifier.as_ref(), replica, &response.body).map_err(|e| {
                        error!("Rejecting response to transaction {}: {}", tx_id, e);
                        TxError::from(e)
                    })?;

                if !sync {
                    info!("Transaction {} accepted by {}", tx_id, replica.id);
                    return Ok(CommitOutcome::Accepted { tx_id });
                }

                let receipt = decoded.receipt.ok_or_else(|| {
                    TxError::MalformedResponse("synchronous commit returned no receipt".to_string())
                })?;
                if receipt.validation_info().is_none() {
                    return Err(TxError::MalformedResponse(format!(
                        "receipt index {} outside block {}",
                        receipt.tx_index,
                        receipt.block_number()
                    )));
                }

                info!(
                    "Transaction {} committed in block {} at index {}",
                    tx_id,
                    receipt.block_number(),
                    receipt.tx_index
                );
                Ok(CommitOutcome::Committed { tx_id, receipt })
            }
            STATUS_ACCEPTED if sync => {
                warn!("Transaction {} accepted but not yet committed", tx_id);
                Ok(CommitOutcome::TimedOut { tx_id })
            }
            STATUS_ACCEPTED => Ok(CommitOutcome::Accepted { tx_id }),
            status => {
                let message = rejection_message(&response.body);
                warn!("Transaction {} rejected with status {}: {}", tx_id, status, message);
                Err(TxError::RemoteRejected { status, message })
            }
        }
    }

    /// Discard pending operations without contacting any replica.
    pub fn abort(&mut self) -> Result<(), TxError> {
        if self.state.is_spent() {
            return Err(TxError::AlreadySpent);
        }
        self.kind.clean();
        self.state = TxState::Aborted;
        debug!("Aborted transaction {}", self.tx_id);
        Ok(())
    }

    /// The envelope that was submitted.
    pub fn tx_envelope(&self) -> Result<&TxEnvelope, TxError> {
        match (self.state, &self.envelope) {
            (TxState::Committed | TxState::Submitted | TxState::TimedOut, Some(envelope)) => Ok(envelope),
            _ => Err(TxError::NotFinalized),
        }
    }

    fn ops(&mut self) -> Result<&mut TxKind, TxError> {
        if self.state.is_spent() {
            return Err(TxError::AlreadySpent);
        }
        Ok(&mut self.kind)
    }

    pub fn data(&mut self) -> Result<&mut DataTxOps, TxError> {
        match self.ops()? {
            TxKind::Data(ops) => Ok(ops),
            other => Err(wrong_kind("data", other)),
        }
    }

    pub fn db_admin(&mut self) -> Result<&mut DbAdminOps, TxError> {
        match self.ops()? {
            TxKind::DbAdmin(ops) => Ok(ops),
            other => Err(wrong_kind("db administration", other)),
        }
    }

    pub fn user_admin(&mut self) -> Result<&mut UserAdminOps, TxError> {
        match self.ops()? {
            TxKind::UserAdmin(ops) => Ok(ops),
            other => Err(wrong_kind("user administration", other)),
        }
    }

    pub fn config(&mut self) -> Result<&mut ConfigOps, TxError> {
        match self.ops()? {
            TxKind::Config(ops) => Ok(ops),
            other => Err(wrong_kind("config", other)),
        }
    }
}

fn wrong_kind(expected: &'static str, actual: &TxKind) -> TxError {
    TxError::WrongKind {
        expected,
        actual: actual.name(),
    }
}
