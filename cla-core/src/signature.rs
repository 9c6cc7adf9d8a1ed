//! Signature facts: the store contract and the per-author projection.

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A contributor, as identified by a commit author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    pub email: Option<String>,
    pub given_name: Option<String>,
}

/// An author checked against a specific CLA version.
///
/// The reconciler builds one of these for every author the store reports as
/// not signed; they only live for the duration of one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSignature {
    pub user: User,
    pub cla_version: String,
}

#[derive(Debug, Error)]
#[error("Signature store error: {message}")]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Read side of the signature store.
///
/// Keyed by (author login, CLA version). Writing signatures belongs to the
/// signing flow, never to reconciliation.
#[async_trait]
pub trait SignatureStore: Send + Sync {
    async fn has_author_signed(&self, login: &str, cla_version: &str) -> Result<bool, StoreError>;
}

/// Signature store held in memory.
#[derive(Debug, Default)]
pub struct InMemorySignatureStore {
    signed: RwLock<HashSet<(String, String)>>,
}

impl InMemorySignatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signed<I, S>(logins: I, cla_version: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        for login in logins {
            store.record(login, cla_version);
        }
        store
    }

    pub fn record(&self, login: impl Into<String>, cla_version: impl Into<String>) {
        let mut signed = self.signed.write().unwrap_or_else(|e| e.into_inner());
        signed.insert((login.into(), cla_version.into()));
    }
}

#[async_trait]
impl SignatureStore for InMemorySignatureStore {
    async fn has_author_signed(&self, login: &str, cla_version: &str) -> Result<bool, StoreError> {
        let signed = self.signed.read().unwrap_or_else(|e| e.into_inner());
        Ok(signed.contains(&(login.to_string(), cla_version.to_string())))
    }
}
