//! Store trait definitions

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::{AuditEvent, StoreResult};

/// Logical partitions of the key-value space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// User preferences, including the raw rule text
    Prefs,
    /// Per-package penalty records
    Penalty,
    /// Per-package session ticket expiries
    Sessions,
    /// Freeze rule list
    Freeze,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Prefs => "prefs",
            Namespace::Penalty => "penalty",
            Namespace::Sessions => "sessions",
            Namespace::Freeze => "freeze",
        }
    }
}

/// Key under which the rule text is stored in [`Namespace::Prefs`]
pub const RAW_CONFIG_KEY: &str = "raw_config";

/// Key under which the freeze rule list is stored in [`Namespace::Freeze`]
pub const FREEZE_RULES_KEY: &str = "rules_json";

/// Notification emitted after a committed write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub namespace: Namespace,
    pub key: String,
}

/// Operations available inside a transaction
pub trait KvTxn {
    fn get(&self, namespace: Namespace, key: &str) -> StoreResult<Option<String>>;
    fn set(&mut self, namespace: Namespace, key: &str, value: &str) -> StoreResult<()>;
    fn remove(&mut self, namespace: Namespace, key: &str) -> StoreResult<()>;
}

/// Main store trait
pub trait Store: Send + Sync {
    // Key-value

    fn get(&self, namespace: Namespace, key: &str) -> StoreResult<Option<String>>;

    fn set(&self, namespace: Namespace, key: &str, value: &str) -> StoreResult<()>;

    fn remove(&self, namespace: Namespace, key: &str) -> StoreResult<()>;

    /// All keys present in a namespace
    fn keys(&self, namespace: Namespace) -> StoreResult<Vec<String>>;

    /// Run `f` atomically. Nothing is written (and nothing is announced)
    /// unless `f` returns `Ok`.
    fn transaction(
        &self,
        f: &mut dyn FnMut(&mut dyn KvTxn) -> StoreResult<()>,
    ) -> StoreResult<()>;

    /// Receive a [`StoreChange`] for every committed write
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;

    // Audit log

    /// Append an audit event, returning its id
    fn append_audit(&self, event: AuditEvent) -> StoreResult<i64>;

    /// Most recent audit events, newest first
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Health

    fn is_healthy(&self) -> bool;
}

/// Typed JSON access on top of the string store
pub trait StoreExt {
    fn get_json<T: DeserializeOwned>(&self, namespace: Namespace, key: &str)
    -> StoreResult<Option<T>>;

    fn set_json<T: Serialize>(&self, namespace: Namespace, key: &str, value: &T)
    -> StoreResult<()>;
}

impl<S: Store + ?Sized> StoreExt for S {
    fn get_json<T: DeserializeOwned>(
        &self,
        namespace: Namespace,
        key: &str,
    ) -> StoreResult<Option<T>> {
        match self.get(namespace, key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(
        &self,
        namespace: Namespace,
        key: &str,
        value: &T,
    ) -> StoreResult<()> {
        let raw = serde_json::to_string(value)?;
        self.set(namespace, key, &raw)
    }
}

/// Typed JSON access inside a transaction
pub fn txn_get_json<T: DeserializeOwned>(
    txn: &dyn KvTxn,
    namespace: Namespace,
    key: &str,
) -> StoreResult<Option<T>> {
    match txn.get(namespace, key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub fn txn_set_json<T: Serialize>(
    txn: &mut dyn KvTxn,
    namespace: Namespace,
    key: &str,
    value: &T,
) -> StoreResult<()> {
    let raw = serde_json::to_string(value)?;
    txn.set(namespace, key, &raw)
}
