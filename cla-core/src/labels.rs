//! Label synchronisation.
//!
//! Keeps exactly one of the two CLA labels on the issue. The desired label
//! is defined (if missing) and attached before the opposite one is removed,
//! so an interrupted run can leave both labels for a moment but never
//! neither.

use tracing::{debug, info};

use crate::decision::{Decision, LabelSpec};
use crate::error::{Operation, ReconcileError};
use crate::event::RepoRef;
use crate::services::{ApiError, IssuesService, Label};

/// What to do about a repository label definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionAction {
    UseExisting(Label),
    Create(Label),
}

/// Interprets a label lookup: 404 means the label must be created, any
/// other error is a failure.
pub fn definition_action(
    lookup: Result<Label, ApiError>,
    spec: &LabelSpec,
) -> Result<DefinitionAction, ApiError> {
    match lookup {
        Ok(existing) => Ok(DefinitionAction::UseExisting(existing)),
        Err(e) if e.is_not_found() => Ok(DefinitionAction::Create(spec.to_label())),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachAction {
    AlreadyAttached,
    Attach,
}

pub fn attach_action(attached: &[Label], name: &str) -> AttachAction {
    if attached.iter().any(|label| label.name == name) {
        AttachAction::AlreadyAttached
    } else {
        AttachAction::Attach
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalOutcome {
    Removed,
    AlreadyAbsent,
}

/// Interprets a label removal: 404 means the label was not attached.
pub fn removal_outcome(result: Result<(), ApiError>) -> Result<RemovalOutcome, ApiError> {
    match result {
        Ok(()) => Ok(RemovalOutcome::Removed),
        Err(e) if e.is_not_found() => Ok(RemovalOutcome::AlreadyAbsent),
        Err(e) => Err(e),
    }
}

/// What [`sync_labels`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSync {
    pub label: &'static str,
    pub created: bool,
    pub attach: AttachAction,
    pub opposite: RemovalOutcome,
}

/// Looks up the label definition, creating it from `spec` when the
/// repository lacks it.
pub async fn ensure_label_defined<I>(
    issues: &I,
    repo: &RepoRef,
    spec: &LabelSpec,
) -> Result<DefinitionAction, ReconcileError>
where
    I: IssuesService + ?Sized,
{
    let lookup = issues.get_label(repo, spec.name).await;
    let action =
        definition_action(lookup, spec).map_err(ReconcileError::api(Operation::GetLabel))?;

    if let DefinitionAction::Create(label) = &action {
        info!("Label '{}' doesn't exist in {}, creating it", label.name, repo);
        issues
            .create_label(repo, label)
            .await
            .map_err(ReconcileError::api(Operation::CreateLabel))?;
    } else {
        debug!("Found existing label '{}' in {}", spec.name, repo);
    }

    Ok(action)
}

pub async fn ensure_label_attached<I>(
    issues: &I,
    repo: &RepoRef,
    issue_number: u64,
    name: &str,
) -> Result<AttachAction, ReconcileError>
where
    I: IssuesService + ?Sized,
{
    let attached = issues
        .list_labels_on_issue(repo, issue_number)
        .await
        .map_err(ReconcileError::api(Operation::ListLabelsOnIssue))?;

    let action = attach_action(&attached, name);
    match action {
        AttachAction::AlreadyAttached => {
            debug!("Label '{}' already on #{} in {}", name, issue_number, repo);
        }
        AttachAction::Attach => {
            info!("Adding label '{}' to #{} in {}", name, issue_number, repo);
            issues
                .add_labels_to_issue(repo, issue_number, &[name.to_string()])
                .await
                .map_err(ReconcileError::api(Operation::AddLabelsToIssue))?;
        }
    }

    Ok(action)
}

pub async fn remove_label_if_applied<I>(
    issues: &I,
    repo: &RepoRef,
    issue_number: u64,
    name: &str,
) -> Result<RemovalOutcome, ReconcileError>
where
    I: IssuesService + ?Sized,
{
    let result = issues.remove_label_from_issue(repo, issue_number, name).await;
    let outcome =
        removal_outcome(result).map_err(ReconcileError::api(Operation::RemoveLabelFromIssue))?;

    match outcome {
        RemovalOutcome::Removed => {
            info!("Removed label '{}' from #{} in {}", name, issue_number, repo)
        }
        RemovalOutcome::AlreadyAbsent => {
            debug!("Label '{}' was not on #{} in {}", name, issue_number, repo)
        }
    }

    Ok(outcome)
}

/// Brings the issue's CLA labels in line with `decision`.
pub async fn sync_labels<I>(
    issues: &I,
    repo: &RepoRef,
    issue_number: u64,
    decision: &Decision,
) -> Result<LabelSync, ReconcileError>
where
    I: IssuesService + ?Sized,
{
    let desired = decision.desired_label();
    let opposite = decision.opposite_label();

    let definition = ensure_label_defined(issues, repo, &desired).await?;
    let attach = ensure_label_attached(issues, repo, issue_number, desired.name).await?;
    let removal = remove_label_if_applied(issues, repo, issue_number, opposite.name).await?;

    Ok(LabelSync {
        label: desired.name,
        created: matches!(definition, DefinitionAction::Create(_)),
        attach,
        opposite: removal,
    })
}
