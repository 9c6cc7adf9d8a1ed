//! Inbound pull request events and the commit data enumerated for them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A repository on GitHub, identified by owner login and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// The pull request event that triggers one reconciliation.
///
/// Built by the webhook layer from an already-verified delivery. The
/// reconciler only reads it; commits are enumerated through
/// [`crate::PullRequestsService`] rather than trusted from the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestEvent {
    pub repo: RepoRef,
    pub number: u64,
    pub head_sha: String,
    pub installation_id: u64,
}

impl PullRequestEvent {
    pub fn new(
        repo: RepoRef,
        number: u64,
        head_sha: impl Into<String>,
        installation_id: u64,
    ) -> Self {
        Self {
            repo,
            number,
            head_sha: head_sha.into(),
            installation_id,
        }
    }
}

/// Identity of a commit's author.
///
/// `login` is the GitHub account the author email is linked to. GitHub
/// reports no account for emails it cannot match, hence the `Option`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommitAuthor {
    pub login: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// One commit on a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestCommit {
    pub sha: String,
    /// The author, not the committer: GitHub's web-flow bot is the committer
    /// of merges and rebases done in the UI.
    pub author: CommitAuthor,
}

impl PullRequestCommit {
    pub fn by(sha: impl Into<String>, login: impl Into<String>) -> Self {
        Self {
            sha: sha.into(),
            author: CommitAuthor {
                login: Some(login.into()),
                ..CommitAuthor::default()
            },
        }
    }
}
