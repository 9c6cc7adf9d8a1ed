//! Commit status and notification comment.

use tracing::{debug, info};

use crate::error::{Operation, ReconcileError};
use crate::event::RepoRef;
use crate::services::{IssueComment, IssuesService, RepoStatus, RepositoriesService};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentAction {
    AlreadyPosted,
    Post,
}

/// Exact text match against every existing comment. A comment that differs
/// in any way, including a different author list, does not count.
pub fn comment_action(existing: &[IssueComment], candidate: &str) -> CommentAction {
    if existing.iter().any(|comment| comment.body == candidate) {
        CommentAction::AlreadyPosted
    } else {
        CommentAction::Post
    }
}

pub async fn publish_status<R>(
    repos: &R,
    repo: &RepoRef,
    sha: &str,
    status: &RepoStatus,
) -> Result<(), ReconcileError>
where
    R: RepositoriesService + ?Sized,
{
    info!(
        "Setting status '{}' on {}@{}: {}",
        status.state, repo, sha, status.description
    );
    repos
        .create_status(repo, sha, status)
        .await
        .map_err(ReconcileError::api(Operation::CreateStatus))
}

/// Posts `body` on the issue unless an identical comment is already there.
pub async fn ensure_comment<I>(
    issues: &I,
    repo: &RepoRef,
    issue_number: u64,
    body: &str,
) -> Result<CommentAction, ReconcileError>
where
    I: IssuesService + ?Sized,
{
    let existing = issues
        .list_comments(repo, issue_number)
        .await
        .map_err(ReconcileError::api(Operation::ListComments))?;

    let action = comment_action(&existing, body);
    match action {
        CommentAction::AlreadyPosted => {
            debug!("Comment already present on #{} in {}", issue_number, repo);
        }
        CommentAction::Post => {
            let comment = issues
                .create_comment(repo, issue_number, body)
                .await
                .map_err(ReconcileError::api(Operation::CreateComment))?;
            info!(
                "Posted comment {} on #{} in {}",
                comment.id, issue_number, repo
            );
        }
    }

    Ok(action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeGitHub;
    use crate::services::StatusState;

    fn repo() -> RepoRef {
        RepoRef::new("owner", "repo")
    }

    fn comment(id: u64, body: &str) -> IssueComment {
        IssueComment {
            id,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_comment_action_exact_match_only() {
        let existing = vec![
            comment(1, "LGTM"),
            comment(2, "we need @john to sign"),
        ];
        assert_eq!(
            comment_action(&existing, "we need @john to sign"),
            CommentAction::AlreadyPosted
        );
        assert_eq!(
            comment_action(&existing, "we need @john, @doe to sign"),
            CommentAction::Post
        );
        assert_eq!(
            comment_action(&existing, "we need @john to sign "),
            CommentAction::Post
        );
        assert_eq!(comment_action(&[], "anything"), CommentAction::Post);
    }

    #[tokio::test]
    async fn test_ensure_comment_posts_once() {
        let github = FakeGitHub::new();
        github.add_comment(3, "unrelated");

        let first = ensure_comment(&github, &repo(), 3, "please sign").await.unwrap();
        let second = ensure_comment(&github, &repo(), 3, "please sign").await.unwrap();

        assert_eq!(first, CommentAction::Post);
        assert_eq!(second, CommentAction::AlreadyPosted);
        assert_eq!(github.comments_on(3), vec!["unrelated", "please sign"]);
    }

    #[tokio::test]
    async fn test_changed_text_posts_a_second_comment() {
        let github = FakeGitHub::new();
        github.add_comment(3, "we need @john, @doe to sign");

        ensure_comment(&github, &repo(), 3, "we need @doe to sign")
            .await
            .unwrap();

        assert_eq!(github.comments_on(3).len(), 2);
    }

    #[tokio::test]
    async fn test_list_comments_error_skips_create() {
        let github = FakeGitHub::new();
        github.fail_on(Operation::ListComments);

        let err = ensure_comment(&github, &repo(), 3, "please sign")
            .await
            .unwrap_err();
        assert_eq!(err.operation(), Some(Operation::ListComments));
        assert_eq!(github.count(Operation::CreateComment), 0);
    }

    #[tokio::test]
    async fn test_publish_status_records_sha_and_state() {
        let github = FakeGitHub::new();
        let status = RepoStatus::new(StatusState::Success, "done");

        publish_status(&github, &repo(), "abc123", &status)
            .await
            .unwrap();

        let recorded = github.state().statuses.clone();
        assert_eq!(recorded, vec![("abc123".to_string(), status)]);
    }

    #[tokio::test]
    async fn test_publish_status_error_names_operation() {
        let github = FakeGitHub::new();
        github.fail_on(Operation::CreateStatus);

        let err = publish_status(
            &github,
            &repo(),
            "abc123",
            &RepoStatus::new(StatusState::Pending, "running"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.operation(), Some(Operation::CreateStatus));
    }
}
