//! Transaction kinds.
//!
//! Each kind accumulates its own operations and knows how to turn them into
//! a signed envelope. The shared commit/abort protocol in
//! [`crate::TxContext`] holds one [`TxKind`] and dispatches to it.

use crate::TxError;
use identity::UserSigner;
use ledger_types::{
    AccessControl, Admin, ClusterConfig, ConfigTx, DataDelete, DataRead, DataTx, DataTxEnvelope,
    DataWrite, DbAdministrationTx, DbOperation, NodeConfig, ProofScheme, SignedEnvelope,
    TxEnvelope, User, UserAdministrationTx, UserDelete, UserRead, UserWrite, Version,
};
use std::collections::{BTreeMap, BTreeSet};

/// Pending operations of a data transaction, grouped by database.
#[derive(Debug, Default)]
pub struct DataTxOps {
    operations: BTreeMap<String, DbOperation>,
    must_sign_users: BTreeSet<String>,
}

impl DataTxOps {
    fn db(&mut self, db_name: &str) -> &mut DbOperation {
        self.operations
            .entry(db_name.to_string())
            .or_insert_with(|| DbOperation {
                db_name: db_name.to_string(),
                ..Default::default()
            })
    }

    /// Record that `key` was read at `version`.
    pub fn read(&mut self, db_name: &str, key: &str, version: Option<Version>) {
        let op = self.db(db_name);
        op.data_reads.retain(|r| r.key != key);
        op.data_reads.push(DataRead {
            key: key.to_string(),
            version,
        });
    }

    /// Write `value` under `key`, replacing any pending write or delete.
    pub fn put(&mut self, db_name: &str, key: &str, value: Vec<u8>, acl: Option<AccessControl>) {
        let op = self.db(db_name);
        op.data_deletes.retain(|d| d.key != key);
        op.data_writes.retain(|w| w.key != key);
        op.data_writes.push(DataWrite {
            key: key.to_string(),
            value,
            acl,
        });
    }

    /// Delete `key`, replacing any pending write.
    pub fn delete(&mut self, db_name: &str, key: &str) {
        let op = self.db(db_name);
        op.data_writes.retain(|w| w.key != key);
        if !op.data_deletes.iter().any(|d| d.key == key) {
            op.data_deletes.push(DataDelete {
                key: key.to_string(),
            });
        }
    }

    /// Require another user's signature before the server accepts the
    /// transaction.
    pub fn add_must_sign_user(&mut self, user_id: &str) {
        self.must_sign_users.insert(user_id.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.operations.values().all(DbOperation::is_empty)
    }

    fn compose(&self, tx_id: &str, signer: &UserSigner, scheme: &ProofScheme) -> Result<TxEnvelope, TxError> {
        if self.is_empty() {
            return Err(TxError::Compose("data transaction has no operations".to_string()));
        }

        let mut must_sign: BTreeSet<String> = self.must_sign_users.clone();
        must_sign.insert(signer.user_id().to_string());

        let payload = DataTx {
            must_sign_user_ids: must_sign.into_iter().collect(),
            tx_id: tx_id.to_string(),
            db_operations: self
                .operations
                .values()
                .filter(|op| !op.is_empty())
                .cloned()
                .collect(),
        };
        let signature = signer.sign(&scheme.encode(&payload)?);

        Ok(TxEnvelope::Data(DataTxEnvelope {
            payload,
            signatures: BTreeMap::from([(signer.user_id().to_string(), signature)]),
        }))
    }
}

/// Pending database creations and deletions.
#[derive(Debug, Default)]
pub struct DbAdminOps {
    create_dbs: BTreeSet<String>,
    delete_dbs: BTreeSet<String>,
}

impl DbAdminOps {
    pub fn create_db(&mut self, db_name: &str) {
        self.create_dbs.insert(db_name.to_string());
    }

    pub fn delete_db(&mut self, db_name: &str) {
        self.delete_dbs.insert(db_name.to_string());
    }

    fn compose(&self, tx_id: &str, signer: &UserSigner, scheme: &ProofScheme) -> Result<TxEnvelope, TxError> {
        if let Some(db) = self.create_dbs.intersection(&self.delete_dbs).next() {
            return Err(TxError::Compose(format!(
                "database {db} is both created and deleted"
            )));
        }
        if self.create_dbs.is_empty() && self.delete_dbs.is_empty() {
            return Err(TxError::Compose("db administration transaction is empty".to_string()));
        }

        let payload = DbAdministrationTx {
            user_id: signer.user_id().to_string(),
            tx_id: tx_id.to_string(),
            create_dbs: self.create_dbs.iter().cloned().collect(),
            delete_dbs: self.delete_dbs.iter().cloned().collect(),
        };
        let signature = signer.sign(&scheme.encode(&payload)?);
        Ok(TxEnvelope::DbAdministration(SignedEnvelope { payload, signature }))
    }
}

/// Pending user reads, writes and deletions.
#[derive(Debug, Default)]
pub struct UserAdminOps {
    reads: BTreeMap<String, Option<Version>>,
    writes: BTreeMap<String, UserWrite>,
    deletes: BTreeSet<String>,
}

impl UserAdminOps {
    pub fn read_user(&mut self, user_id: &str, version: Option<Version>) {
        self.reads.insert(user_id.to_string(), version);
    }

    pub fn put_user(&mut self, user: User, acl: Option<AccessControl>) {
        self.deletes.remove(&user.id);
        self.writes.insert(user.id.clone(), UserWrite { user, acl });
    }

    pub fn delete_user(&mut self, user_id: &str) {
        self.writes.remove(user_id);
        self.deletes.insert(user_id.to_string());
    }

    fn compose(&self, tx_id: &str, signer: &UserSigner, scheme: &ProofScheme) -> Result<TxEnvelope, TxError> {
        if self.writes.is_empty() && self.deletes.is_empty() {
            return Err(TxError::Compose("user administration transaction is empty".to_string()));
        }

        let payload = UserAdministrationTx {
            user_id: signer.user_id().to_string(),
            tx_id: tx_id.to_string(),
            user_reads: self
                .reads
                .iter()
                .map(|(user_id, version)| UserRead {
                    user_id: user_id.clone(),
                    version: *version,
                })
                .collect(),
            user_writes: self.writes.values().cloned().collect(),
            user_deletes: self
                .deletes
                .iter()
                .map(|user_id| UserDelete {
                    user_id: user_id.clone(),
                })
                .collect(),
        };
        let signature = signer.sign(&scheme.encode(&payload)?);
        Ok(TxEnvelope::UserAdministration(SignedEnvelope { payload, signature }))
    }
}

/// Replacement cluster configuration, pinned to the version it was read at.
#[derive(Debug, Default)]
pub struct ConfigOps {
    read_version: Option<Version>,
    config: ClusterConfig,
}

impl ConfigOps {
    /// Start from the current configuration as read at `version`.
    pub fn load(&mut self, config: ClusterConfig, version: Version) {
        self.config = config;
        self.read_version = Some(version);
    }

    pub fn add_node(&mut self, node: NodeConfig) {
        self.config.nodes.retain(|n| n.id != node.id);
        self.config.nodes.push(node);
    }

    pub fn remove_node(&mut self, node_id: &str) {
        self.config.nodes.retain(|n| n.id != node_id);
    }

    pub fn add_admin(&mut self, admin: Admin) {
        self.config.admins.retain(|a| a.id != admin.id);
        self.config.admins.push(admin);
    }

    pub fn remove_admin(&mut self, admin_id: &str) {
        self.config.admins.retain(|a| a.id != admin_id);
    }

    fn compose(&self, tx_id: &str, signer: &UserSigner, scheme: &ProofScheme) -> Result<TxEnvelope, TxError> {
        if self.config.nodes.is_empty() {
            return Err(TxError::Compose("cluster config must contain at least one node".to_string()));
        }
        if self.config.admins.is_empty() {
            return Err(TxError::Compose("cluster config must contain at least one admin".to_string()));
        }

        let payload = ConfigTx {
            user_id: signer.user_id().to_string(),
            tx_id: tx_id.to_string(),
            read_old_config_version: self.read_version,
            new_config: self.config.clone(),
        };
        let signature = signer.sign(&scheme.encode(&payload)?);
        Ok(TxEnvelope::Config(SignedEnvelope { payload, signature }))
    }
}

/// The closed set of transaction kinds.
#[derive(Debug)]
pub enum TxKind {
    Data(DataTxOps),
    DbAdmin(DbAdminOps),
    UserAdmin(UserAdminOps),
    Config(ConfigOps),
}

impl TxKind {
    pub fn name(&self) -> &'static str {
        match self {
            TxKind::Data(_) => "data",
            TxKind::DbAdmin(_) => "db administration",
            TxKind::UserAdmin(_) => "user administration",
            TxKind::Config(_) => "config",
        }
    }

    /// Endpoint the envelope is posted to.
    pub(crate) fn submit_path(&self) -> &'static str {
        match self {
            TxKind::Data(_) => "/data/tx",
            TxKind::DbAdmin(_) => "/db/tx",
            TxKind::UserAdmin(_) => "/user/tx",
            TxKind::Config(_) => "/config/tx",
        }
    }

    pub(crate) fn compose_envelope(
        &self,
        tx_id: &str,
        signer: &UserSigner,
        scheme: &ProofScheme,
    ) -> Result<TxEnvelope, TxError> {
        match self {
            TxKind::Data(ops) => ops.compose(tx_id, signer, scheme),
            TxKind::DbAdmin(ops) => ops.compose(tx_id, signer, scheme),
            TxKind::UserAdmin(ops) => ops.compose(tx_id, signer, scheme),
            TxKind::Config(ops) => ops.compose(tx_id, signer, scheme),
        }
    }

    /// Drop accumulated operations, keeping the kind.
    pub(crate) fn clean(&mut self) {
        match self {
            TxKind::Data(ops) => *ops = DataTxOps::default(),
            TxKind::DbAdmin(ops) => *ops = DbAdminOps::default(),
            TxKind::UserAdmin(ops) => *ops = UserAdminOps::default(),
            TxKind::Config(ops) => *ops = ConfigOps::default(),
        }
    }
}
