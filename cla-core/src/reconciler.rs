//! One end-to-end reconciliation of a pull request against the CLA facts.
//!
//! Steps run strictly in order and the first failure ends the run:
//!
//! 1. `pending` status on the head commit
//! 2. gather unsigned authors
//! 3. label sync (desired label before opposite removal)
//! 4. notification comment, only when someone has not signed
//! 5. final `success` or `failure` status

use tracing::info;

use crate::decision::{running_status, Decision};
use crate::error::ReconcileError;
use crate::event::PullRequestEvent;
use crate::gatherer;
use crate::labels::{self, LabelSync};
use crate::publisher::{self, CommentAction};
use crate::services::{GitHubSession, SessionProvider};
use crate::signature::SignatureStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentOutcome {
    Posted,
    AlreadyPresent,
    NotNeeded,
}

impl From<CommentAction> for CommentOutcome {
    fn from(action: CommentAction) -> Self {
        match action {
            CommentAction::Post => Self::Posted,
            CommentAction::AlreadyPosted => Self::AlreadyPresent,
        }
    }
}

/// What a successful reconciliation decided and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub decision: Decision,
    pub labels: LabelSync,
    pub comment: CommentOutcome,
}

/// Reconciles one pull request using an already-authenticated session.
pub async fn reconcile<S>(
    session: &S,
    store: &dyn SignatureStore,
    event: &PullRequestEvent,
    cla_version: &str,
) -> Result<ReconcileReport, ReconcileError>
where
    S: GitHubSession + ?Sized,
{
    let repo = &event.repo;

    publisher::publish_status(session, repo, &event.head_sha, &running_status()).await?;

    let decision = gatherer::decide(session, store, repo, event.number, cla_version).await?;
    match &decision {
        Decision::AllSigned => info!("All authors on PR #{} in {} have signed", event.number, repo),
        Decision::SomeUnsigned(authors) => info!(
            "PR #{} in {} has {} unsigned author(s): {}",
            event.number,
            repo,
            authors.len(),
            authors.logins().collect::<Vec<_>>().join(", ")
        ),
    }

    let labels = labels::sync_labels(session, repo, event.number, &decision).await?;

    let comment: CommentOutcome = match decision.comment() {
        Some(body) => publisher::ensure_comment(session, repo, event.number, &body)
            .await?
            .into(),
        None => CommentOutcome::NotNeeded,
    };

    publisher::publish_status(session, repo, &event.head_sha, &decision.final_status()).await?;

    Ok(ReconcileReport {
        decision,
        labels,
        comment,
    })
}

/// Mints a session for the event's installation and reconciles.
///
/// A credential failure returns before any GitHub call is made.
pub async fn handle_pull_request(
    sessions: &dyn SessionProvider,
    store: &dyn SignatureStore,
    event: &PullRequestEvent,
    cla_version: &str,
) -> Result<ReconcileReport, ReconcileError> {
    let session = sessions
        .session(event.installation_id)
        .await
        .map_err(|source| ReconcileError::Credentials {
            installation_id: event.installation_id,
            source,
        })?;

    reconcile(session.as_ref(), store, event, cla_version).await
}
