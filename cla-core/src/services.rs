//! Capability interfaces onto the GitHub API.
//!
//! One narrow trait per resource family, so the reconciler can run against
//! the real REST client or an in-process fake. Implementations handle
//! transport, authentication and pagination; callers see whole lists.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::{PullRequestCommit, RepoRef};

/// Failure of a single GitHub API call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// GitHub answered with a non-success status.
    #[error("GitHub API error: {status} - {message}")]
    Status { status: u16, message: String },

    /// The request never produced a response.
    #[error("GitHub request failed: {0}")]
    Transport(String),

    /// The response body was not what the endpoint documents.
    #[error("Failed to parse GitHub response: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::status(404, message)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

/// A label, either as defined on a repository or as attached to an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    pub body: String,
}

/// Commit status state. Only the three states this bot publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusState {
    Pending,
    Success,
    Failure,
}

impl StatusState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for StatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoStatus {
    pub state: StatusState,
    pub description: String,
}

impl RepoStatus {
    pub fn new(state: StatusState, description: impl Into<String>) -> Self {
        Self {
            state,
            description: description.into(),
        }
    }
}

#[async_trait]
pub trait RepositoriesService: Send + Sync {
    async fn create_status(
        &self,
        repo: &RepoRef,
        sha: &str,
        status: &RepoStatus,
    ) -> Result<(), ApiError>;
}

#[async_trait]
pub trait PullRequestsService: Send + Sync {
    /// All commits on the pull request, oldest first.
    async fn list_commits(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> Result<Vec<PullRequestCommit>, ApiError>;
}

/// Issue operations. A pull request is addressed by its issue number.
#[async_trait]
pub trait IssuesService: Send + Sync {
    /// Fails with a 404 [`ApiError::Status`] when the repository has no such label.
    async fn get_label(&self, repo: &RepoRef, name: &str) -> Result<Label, ApiError>;

    async fn create_label(&self, repo: &RepoRef, label: &Label) -> Result<Label, ApiError>;

    async fn list_labels_on_issue(
        &self,
        repo: &RepoRef,
        issue_number: u64,
    ) -> Result<Vec<Label>, ApiError>;

    async fn add_labels_to_issue(
        &self,
        repo: &RepoRef,
        issue_number: u64,
        labels: &[String],
    ) -> Result<Vec<Label>, ApiError>;

    /// Fails with a 404 [`ApiError::Status`] when the label is not on the issue.
    async fn remove_label_from_issue(
        &self,
        repo: &RepoRef,
        issue_number: u64,
        label: &str,
    ) -> Result<(), ApiError>;

    async fn list_comments(
        &self,
        repo: &RepoRef,
        issue_number: u64,
    ) -> Result<Vec<IssueComment>, ApiError>;

    async fn create_comment(
        &self,
        repo: &RepoRef,
        issue_number: u64,
        body: &str,
    ) -> Result<IssueComment, ApiError>;
}

/// An authenticated session exposing every resource family.
pub trait GitHubSession: RepositoriesService + PullRequestsService + IssuesService {}

impl<T> GitHubSession for T where T: RepositoriesService + PullRequestsService + IssuesService {}

#[derive(Debug, Error)]
#[error("Failed to obtain installation credentials: {message}")]
pub struct CredentialError {
    pub message: String,
}

impl CredentialError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Mints short-lived sessions scoped to one app installation.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn session(&self, installation_id: u64) -> Result<Box<dyn GitHubSession>, CredentialError>;
}
