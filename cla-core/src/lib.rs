pub mod decision;
pub mod error;
pub mod event;
pub mod gatherer;
pub mod labels;
pub mod publisher;
pub mod reconciler;
pub mod services;
pub mod signature;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use decision::{
    compose_comment, running_status, Decision, LabelSpec, UnsignedAuthors, LABEL_NOT_SIGNED,
    LABEL_SIGNED, STATUS_RUNNING, STATUS_SIGNED, STATUS_UNSIGNED,
};
pub use error::{Operation, ReconcileError};
pub use event::{CommitAuthor, PullRequestCommit, PullRequestEvent, RepoRef};
pub use gatherer::{decide, gather_unsigned};
pub use labels::{
    attach_action, definition_action, removal_outcome, sync_labels, AttachAction,
    DefinitionAction, LabelSync, RemovalOutcome,
};
pub use publisher::{comment_action, ensure_comment, publish_status, CommentAction};
pub use reconciler::{handle_pull_request, reconcile, CommentOutcome, ReconcileReport};
pub use services::{
    ApiError, CredentialError, GitHubSession, IssueComment, IssuesService, Label,
    PullRequestsService, RepoStatus, RepositoriesService, SessionProvider, StatusState,
};
pub use signature::{InMemorySignatureStore, SignatureStore, StoreError, User, UserSignature};
