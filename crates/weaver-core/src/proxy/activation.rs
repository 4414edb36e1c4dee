// Activation: turning printed source into a callable type
//
// `ActivationSink` is the pluggable mechanism. `ActivationRegistry` is the
// ledger that keeps every proxy name activated at most once.

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ProxyIdentity;
use crate::ast::ClassName;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActivationError {
    #[error("Class '{0}' is already defined")]
    Duplicate(String),

    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Class '{class}' extends unknown class '{parent}'")]
    UnresolvedParent { class: String, parent: String },

    #[error("Class '{class}' cannot extend final class '{parent}'")]
    FinalParent { class: String, parent: String },

    #[error("Method '{method}' of class '{class}' overrides a final method")]
    FinalOverride { class: String, method: String },

    #[error("'{0}' cannot be instantiated")]
    NotInstantiable(String),
}

/// Handle to a type a sink has made available
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeHandle {
    pub name: ClassName,
    pub methods: Vec<String>,
}

/// Makes generated source callable by the running process
pub trait ActivationSink: Send + Sync {
    /// Define every declaration in `source`; the handle names the first class
    fn define(&self, source: &str) -> Result<TypeHandle, ActivationError>;

    fn is_defined(&self, class: &ClassName) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRecord {
    pub identity: ProxyIdentity,
    pub handle: TypeHandle,
    pub activated_at: DateTime<Utc>,
}

/// Proxy name -> activation record
#[derive(Debug, Default)]
pub struct ActivationRegistry {
    records: DashMap<ClassName, ActivationRecord>,
}

impl ActivationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_activated(&self, proxy: &ClassName) -> bool {
        self.records.contains_key(proxy)
    }

    /// Record an activation; a proxy name can be recorded only once
    pub fn record(
        &self,
        identity: ProxyIdentity,
        handle: TypeHandle,
    ) -> Result<ActivationRecord, ActivationError> {
        match self.records.entry(identity.proxy_name.clone()) {
            Entry::Occupied(_) => Err(ActivationError::Duplicate(identity.proxy_name.to_string())),
            Entry::Vacant(slot) => {
                let record = ActivationRecord {
                    identity,
                    handle,
                    activated_at: Utc::now(),
                };
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    pub fn get(&self, proxy: &ClassName) -> Option<ActivationRecord> {
        self.records.get(proxy).map(|entry| entry.value().clone())
    }

    /// The original class a proxy was generated from
    pub fn origin_of(&self, proxy: &ClassName) -> Option<ClassName> {
        self.records
            .get(proxy)
            .map(|entry| entry.identity.original_name.clone())
    }

    /// Every proxy generated for `original`, oldest first
    pub fn proxies_of(&self, original: &ClassName) -> Vec<ClassName> {
        let mut matching: Vec<_> = self
            .records
            .iter()
            .filter(|entry| entry.identity.original_name == *original)
            .map(|entry| (entry.activated_at, entry.identity.proxy_name.clone()))
            .collect();
        matching.sort_by(|a, b| a.0.cmp(&b.0));
        matching.into_iter().map(|(_, name)| name).collect()
    }

    /// All records, oldest first
    pub fn records(&self) -> Vec<ActivationRecord> {
        let mut records: Vec<_> = self.records.iter().map(|e| e.value().clone()).collect();
        records.sort_by(|a, b| a.activated_at.cmp(&b.activated_at));
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
