//! In-process GitHub double for tests.
//!
//! Keeps repository labels, issue labels, comments, statuses and commits in
//! memory and mirrors the API behaviour the reconciler depends on: a 404 for
//! unknown labels and for removing a label that is not attached.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::Operation;
use crate::event::{PullRequestCommit, RepoRef};
use crate::services::{
    ApiError, CredentialError, GitHubSession, IssueComment, IssuesService, Label,
    PullRequestsService, RepoStatus, RepositoriesService, SessionProvider,
};
use crate::signature::{SignatureStore, StoreError};

#[derive(Debug, Default)]
pub struct FakeState {
    pub repo_labels: Vec<Label>,
    pub issue_labels: HashMap<u64, Vec<String>>,
    pub comments: HashMap<u64, Vec<IssueComment>>,
    pub statuses: Vec<(String, RepoStatus)>,
    pub commits: Vec<PullRequestCommit>,
    pub calls: Vec<Operation>,
    /// Operation to fail, starting from its nth call (1-based).
    pub fail_on: Option<(Operation, usize)>,
    next_comment_id: u64,
}

#[derive(Debug, Clone, Default)]
pub struct FakeGitHub {
    inner: Arc<Mutex<FakeState>>,
}

impl FakeGitHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_commits(commits: Vec<PullRequestCommit>) -> Self {
        let fake = Self::new();
        fake.state().commits = commits;
        fake
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.inner.lock().unwrap()
    }

    pub fn fail_on(&self, operation: Operation) {
        self.fail_on_call(operation, 1);
    }

    /// Fails `operation` from its `nth` call onwards; earlier calls succeed.
    pub fn fail_on_call(&self, operation: Operation, nth: usize) {
        self.state().fail_on = Some((operation, nth));
    }

    pub fn define_label(&self, label: Label) {
        self.state().repo_labels.push(label);
    }

    pub fn attach_label(&self, issue_number: u64, name: &str) {
        self.state()
            .issue_labels
            .entry(issue_number)
            .or_default()
            .push(name.to_string());
    }

    pub fn add_comment(&self, issue_number: u64, body: &str) {
        let mut state = self.state();
        state.next_comment_id += 1;
        let id = state.next_comment_id;
        state
            .comments
            .entry(issue_number)
            .or_default()
            .push(IssueComment {
                id,
                body: body.to_string(),
            });
    }

    pub fn labels_on(&self, issue_number: u64) -> Vec<String> {
        self.state()
            .issue_labels
            .get(&issue_number)
            .cloned()
            .unwrap_or_default()
    }

    pub fn comments_on(&self, issue_number: u64) -> Vec<String> {
        self.state()
            .comments
            .get(&issue_number)
            .map(|comments| comments.iter().map(|c| c.body.clone()).collect())
            .unwrap_or_default()
    }

    pub fn repo_label(&self, name: &str) -> Option<Label> {
        self.state()
            .repo_labels
            .iter()
            .find(|label| label.name == name)
            .cloned()
    }

    pub fn statuses(&self) -> Vec<RepoStatus> {
        self.state()
            .statuses
            .iter()
            .map(|(_, status)| status.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<Operation> {
        self.state().calls.clone()
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|&&call| call == operation)
            .count()
    }

    fn enter(&self, operation: Operation) -> Result<MutexGuard<'_, FakeState>, ApiError> {
        let mut state = self.state();
        state.calls.push(operation);
        let made = state.calls.iter().filter(|&&call| call == operation).count();
        if matches!(state.fail_on, Some((failing, nth)) if failing == operation && made >= nth) {
            return Err(ApiError::status(500, format!("forced {} error", operation)));
        }
        Ok(state)
    }
}

#[async_trait]
impl RepositoriesService for FakeGitHub {
    async fn create_status(
        &self,
        _repo: &RepoRef,
        sha: &str,
        status: &RepoStatus,
    ) -> Result<(), ApiError> {
        let mut state = self.enter(Operation::CreateStatus)?;
        state.statuses.push((sha.to_string(), status.clone()));
        Ok(())
    }
}

#[async_trait]
impl PullRequestsService for FakeGitHub {
    async fn list_commits(
        &self,
        _repo: &RepoRef,
        _number: u64,
    ) -> Result<Vec<PullRequestCommit>, ApiError> {
        let state = self.enter(Operation::ListCommits)?;
        Ok(state.commits.clone())
    }
}

#[async_trait]
impl IssuesService for FakeGitHub {
    async fn get_label(&self, _repo: &RepoRef, name: &str) -> Result<Label, ApiError> {
        let state = self.enter(Operation::GetLabel)?;
        state
            .repo_labels
            .iter()
            .find(|label| label.name == name)
            .cloned()
            .ok_or_else(|| ApiError::not_found("Not Found"))
    }

    async fn create_label(&self, _repo: &RepoRef, label: &Label) -> Result<Label, ApiError> {
        let mut state = self.enter(Operation::CreateLabel)?;
        if state.repo_labels.iter().any(|l| l.name == label.name) {
            return Err(ApiError::status(422, "Validation Failed: already_exists"));
        }
        state.repo_labels.push(label.clone());
        Ok(label.clone())
    }

    async fn list_labels_on_issue(
        &self,
        _repo: &RepoRef,
        issue_number: u64,
    ) -> Result<Vec<Label>, ApiError> {
        let state = self.enter(Operation::ListLabelsOnIssue)?;
        let names = state
            .issue_labels
            .get(&issue_number)
            .cloned()
            .unwrap_or_default();
        Ok(names
            .into_iter()
            .map(|name| {
                state
                    .repo_labels
                    .iter()
                    .find(|label| label.name == name)
                    .cloned()
                    .unwrap_or(Label {
                        name,
                        color: "ededed".to_string(),
                        description: None,
                    })
            })
            .collect())
    }

    async fn add_labels_to_issue(
        &self,
        _repo: &RepoRef,
        issue_number: u64,
        labels: &[String],
    ) -> Result<Vec<Label>, ApiError> {
        let mut state = self.enter(Operation::AddLabelsToIssue)?;
        let attached = state.issue_labels.entry(issue_number).or_default();
        for name in labels {
            if !attached.contains(name) {
                attached.push(name.clone());
            }
        }
        let attached = attached.clone();
        Ok(attached
            .into_iter()
            .map(|name| Label {
                name,
                color: String::new(),
                description: None,
            })
            .collect())
    }

    async fn remove_label_from_issue(
        &self,
        _repo: &RepoRef,
        issue_number: u64,
        label: &str,
    ) -> Result<(), ApiError> {
        let mut state = self.enter(Operation::RemoveLabelFromIssue)?;
        let attached = state.issue_labels.entry(issue_number).or_default();
        match attached.iter().position(|name| name == label) {
            Some(index) => {
                attached.remove(index);
                Ok(())
            }
            None => Err(ApiError::not_found("Label does not exist")),
        }
    }

    async fn list_comments(
        &self,
        _repo: &RepoRef,
        issue_number: u64,
    ) -> Result<Vec<IssueComment>, ApiError> {
        let state = self.enter(Operation::ListComments)?;
        Ok(state
            .comments
            .get(&issue_number)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_comment(
        &self,
        _repo: &RepoRef,
        issue_number: u64,
        body: &str,
    ) -> Result<IssueComment, ApiError> {
        let mut state = self.enter(Operation::CreateComment)?;
        state.next_comment_id += 1;
        let comment = IssueComment {
            id: state.next_comment_id,
            body: body.to_string(),
        };
        state
            .comments
            .entry(issue_number)
            .or_default()
            .push(comment.clone());
        Ok(comment)
    }
}

/// Hands out sessions backed by one shared [`FakeGitHub`], or refuses.
pub struct FakeSessions {
    pub github: Option<FakeGitHub>,
}

#[async_trait]
impl SessionProvider for FakeSessions {
    async fn session(
        &self,
        installation_id: u64,
    ) -> Result<Box<dyn GitHubSession>, CredentialError> {
        match &self.github {
            Some(github) => Ok(Box::new(github.clone())),
            None => Err(CredentialError::new(format!(
                "could not read private key for installation {}",
                installation_id
            ))),
        }
    }
}

pub struct FailingStore;

#[async_trait]
impl SignatureStore for FailingStore {
    async fn has_author_signed(&self, _login: &str, _cla_version: &str) -> Result<bool, StoreError> {
        Err(StoreError::new("connection refused"))
    }
}
