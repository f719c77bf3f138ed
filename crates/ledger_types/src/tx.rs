//! Transaction payloads and their signed envelopes.
//!
//! Four transaction kinds exist. Each payload is signed by its submitter over
//! its canonical encoding; data transactions may carry several signatures.

use crate::{EncodingError, ProofScheme};
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, hex::Hex, serde_as};
use std::collections::{BTreeMap, BTreeSet};

/// Position of a committed value: block number and index inside the block.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub block_num: u64,
    pub tx_num: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessControl {
    pub read_users: BTreeSet<String>,
    pub read_write_users: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataRead {
    pub key: String,
    pub version: Option<Version>,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataWrite {
    pub key: String,
    #[serde_as(as = "Base64")]
    pub value: Vec<u8>,
    pub acl: Option<AccessControl>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataDelete {
    pub key: String,
}

/// Reads, writes and deletes against one database.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DbOperation {
    pub db_name: String,
    pub data_reads: Vec<DataRead>,
    pub data_writes: Vec<DataWrite>,
    pub data_deletes: Vec<DataDelete>,
}

impl DbOperation {
    pub fn is_empty(&self) -> bool {
        self.data_reads.is_empty() && self.data_writes.is_empty() && self.data_deletes.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataTx {
    pub must_sign_user_ids: Vec<String>,
    pub tx_id: String,
    pub db_operations: Vec<DbOperation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DbAdministrationTx {
    pub user_id: String,
    pub tx_id: String,
    pub create_dbs: Vec<String>,
    pub delete_dbs: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DbPermission {
    Read,
    ReadWrite,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    #[serde_as(as = "Hex")]
    pub public_key: Vec<u8>,
    pub db_permissions: BTreeMap<String, DbPermission>,
    pub admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRead {
    pub user_id: String,
    pub version: Option<Version>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserWrite {
    pub user: User,
    pub acl: Option<AccessControl>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserDelete {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserAdministrationTx {
    pub user_id: String,
    pub tx_id: String,
    pub user_reads: Vec<UserRead>,
    pub user_writes: Vec<UserWrite>,
    pub user_deletes: Vec<UserDelete>,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeConfig {
    pub id: String,
    pub address: String,
    pub port: u16,
    #[serde_as(as = "Hex")]
    pub public_key: Vec<u8>,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Admin {
    pub id: String,
    #[serde_as(as = "Hex")]
    pub public_key: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterConfig {
    pub nodes: Vec<NodeConfig>,
    pub admins: Vec<Admin>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigTx {
    pub user_id: String,
    pub tx_id: String,
    pub read_old_config_version: Option<Version>,
    pub new_config: ClusterConfig,
}

/// Data transaction with one signature per signing user.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DataTxEnvelope {
    pub payload: DataTx,
    #[serde_as(as = "BTreeMap<_, Base64>")]
    pub signatures: BTreeMap<String, Vec<u8>>,
}

/// Single-signer envelope used by the administrative transaction kinds.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedEnvelope<P> {
    pub payload: P,
    #[serde_as(as = "Base64")]
    pub signature: Vec<u8>,
}

pub type DbAdministrationTxEnvelope = SignedEnvelope<DbAdministrationTx>;
pub type UserAdministrationTxEnvelope = SignedEnvelope<UserAdministrationTx>;
pub type ConfigTxEnvelope = SignedEnvelope<ConfigTx>;

/// The exact submission unit of any transaction kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TxEnvelope {
    Data(DataTxEnvelope),
    DbAdministration(DbAdministrationTxEnvelope),
    UserAdministration(UserAdministrationTxEnvelope),
    Config(ConfigTxEnvelope),
}

impl TxEnvelope {
    pub fn tx_id(&self) -> &str {
        match self {
            TxEnvelope::Data(env) => &env.payload.tx_id,
            TxEnvelope::DbAdministration(env) => &env.payload.tx_id,
            TxEnvelope::UserAdministration(env) => &env.payload.tx_id,
            TxEnvelope::Config(env) => &env.payload.tx_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TxEnvelope::Data(_) => "data",
            TxEnvelope::DbAdministration(_) => "db_administration",
            TxEnvelope::UserAdministration(_) => "user_administration",
            TxEnvelope::Config(_) => "config",
        }
    }

    /// Canonical bytes of the kind-specific envelope, without the variant
    /// tag. These are both the submitted body and the transaction's leaf
    /// pre-image.
    pub fn canonical_bytes(&self, scheme: &ProofScheme) -> Result<Vec<u8>, EncodingError> {
        match self {
            TxEnvelope::Data(env) => scheme.encode(env),
            TxEnvelope::DbAdministration(env) => scheme.encode(env),
            TxEnvelope::UserAdministration(env) => scheme.encode(env),
            TxEnvelope::Config(env) => scheme.encode(env),
        }
    }
}
