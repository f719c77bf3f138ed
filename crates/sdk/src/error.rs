use crate::response::ResponseError;
use ledger_types::EncodingError;
use merkle::ProofError;
use std::time::Duration;
use thiserror::Error;
use transport::TransportError;

/// Errors returned by a transaction context.
#[derive(Error, Debug)]
pub enum TxError {
    #[error("transaction committed or aborted")]
    AlreadySpent,
    #[error("can't access tx envelope, transaction not finalized")]
    NotFinalized,
    #[error("untrusted response from node {node_id}: {reason}")]
    UntrustedResponse { node_id: String, reason: String },
    #[error("failed to submit transaction, server returned: status: {status}, message: {message}")]
    RemoteRejected { status: u16, message: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("operation requires a {expected} transaction, this is a {actual} transaction")]
    WrongKind {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("failed to compose transaction envelope: {0}")]
    Compose(String),
    #[error("no replica available")]
    NoReplica,
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl TxError {
    /// Whether a failed commit may still have taken effect on the server.
    ///
    /// When true, poll for the transaction's effect before resubmitting; a
    /// resubmission must use a new context and therefore a new id.
    pub fn outcome_unknown(&self) -> bool {
        match self {
            TxError::Transport(e) => !e.never_sent(),
            TxError::UntrustedResponse { .. } | TxError::MalformedResponse(_) => true,
            _ => false,
        }
    }
}

impl From<ResponseError> for TxError {
    fn from(err: ResponseError) -> Self {
        match err {
            ResponseError::Malformed(e) => TxError::MalformedResponse(e.to_string()),
            other => TxError::UntrustedResponse {
                node_id: other.node_id().unwrap_or_default().to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Errors returned by ledger queries and proof verification.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("untrusted response from node {node_id}: {reason}")]
    UntrustedResponse { node_id: String, reason: String },
    #[error("error handling request, server returned: status: {status}, message: {message}")]
    RemoteRejected { status: u16, message: String },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
    #[error("no replica available")]
    NoReplica,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),
    #[error("proof error: {0}")]
    Proof(#[from] ProofError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl From<ResponseError> for LedgerError {
    fn from(err: ResponseError) -> Self {
        match err {
            ResponseError::Malformed(e) => LedgerError::MalformedResponse(e.to_string()),
            other => LedgerError::UntrustedResponse {
                node_id: other.node_id().unwrap_or_default().to_string(),
                reason: other.to_string(),
            },
        }
    }
}
