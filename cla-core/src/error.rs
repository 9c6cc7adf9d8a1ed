//! Reconciliation failures.
//!
//! Every failure is fatal for the run it occurs in. Nothing already written
//! to GitHub is rolled back: each step is idempotent, so redelivering the
//! event converges.

use std::fmt;

use thiserror::Error;

use crate::services::{ApiError, CredentialError};
use crate::signature::StoreError;

/// The external call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateStatus,
    ListCommits,
    GetLabel,
    CreateLabel,
    ListLabelsOnIssue,
    AddLabelsToIssue,
    RemoveLabelFromIssue,
    ListComments,
    CreateComment,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateStatus => "CreateStatus",
            Self::ListCommits => "ListCommits",
            Self::GetLabel => "GetLabel",
            Self::CreateLabel => "CreateLabel",
            Self::ListLabelsOnIssue => "ListLabelsOnIssue",
            Self::AddLabelsToIssue => "AddLabelsToIssue",
            Self::RemoveLabelFromIssue => "RemoveLabelFromIssue",
            Self::ListComments => "ListComments",
            Self::CreateComment => "CreateComment",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// No session could be minted; nothing was sent to GitHub.
    #[error("Authentication for installation {installation_id} failed: {source}")]
    Credentials {
        installation_id: u64,
        #[source]
        source: CredentialError,
    },

    #[error("Signature lookup for {login} failed: {source}")]
    SignatureLookup {
        login: String,
        #[source]
        source: StoreError,
    },

    /// GitHub could not link the commit author to an account, so there is
    /// no login to check.
    #[error(
        "Commit {sha} has an author ({}) with no linked GitHub account",
        .email.as_deref().unwrap_or("no email")
    )]
    UnlinkedAuthor { sha: String, email: Option<String> },

    #[error("{operation} failed: {source}")]
    Api {
        operation: Operation,
        #[source]
        source: ApiError,
    },
}

impl ReconcileError {
    pub fn api(operation: Operation) -> impl FnOnce(ApiError) -> Self {
        move |source| Self::Api { operation, source }
    }

    /// The failed GitHub call, if the failure came from one.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::Api { operation, .. } => Some(*operation),
            _ => None,
        }
    }
}
