//! Fact gathering: which pull request authors have not signed the CLA.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::decision::Decision;
use crate::error::{Operation, ReconcileError};
use crate::event::RepoRef;
use crate::services::PullRequestsService;
use crate::signature::{SignatureStore, User, UserSignature};

/// Lists the pull request's commits and checks each distinct author login
/// against `store` for `cla_version`.
///
/// Stops at the first listing or lookup failure; nothing is accumulated on a
/// best-effort basis. An author who wrote several commits is looked up and
/// reported once, keyed by login.
pub async fn gather_unsigned<P>(
    pulls: &P,
    store: &dyn SignatureStore,
    repo: &RepoRef,
    number: u64,
    cla_version: &str,
) -> Result<Vec<UserSignature>, ReconcileError>
where
    P: PullRequestsService + ?Sized,
{
    let commits = pulls
        .list_commits(repo, number)
        .await
        .map_err(ReconcileError::api(Operation::ListCommits))?;

    info!(
        "Checking {} commit(s) on PR #{} in {} against CLA version {}",
        commits.len(),
        number,
        repo,
        cla_version
    );

    let mut seen = HashSet::new();
    let mut unsigned = Vec::new();

    for commit in commits {
        let Some(login) = commit.author.login.clone() else {
            warn!(
                "Commit {} on PR #{} in {} has author {:?} with no linked GitHub account",
                commit.sha, number, repo, commit.author.email
            );
            return Err(ReconcileError::UnlinkedAuthor {
                sha: commit.sha,
                email: commit.author.email,
            });
        };

        if !seen.insert(login.clone()) {
            continue;
        }

        let signed = store
            .has_author_signed(&login, cla_version)
            .await
            .map_err(|source| ReconcileError::SignatureLookup {
                login: login.clone(),
                source,
            })?;

        if signed {
            debug!("{} has signed CLA version {}", login, cla_version);
            continue;
        }

        let missing = UserSignature {
            user: User {
                login,
                email: commit.author.email,
                given_name: commit.author.name,
            },
            cla_version: cla_version.to_string(),
        };
        debug!("Missing author signature: {:?}", missing);
        unsigned.push(missing);
    }

    Ok(unsigned)
}

/// [`gather_unsigned`] folded into a [`Decision`].
pub async fn decide<P>(
    pulls: &P,
    store: &dyn SignatureStore,
    repo: &RepoRef,
    number: u64,
    cla_version: &str,
) -> Result<Decision, ReconcileError>
where
    P: PullRequestsService + ?Sized,
{
    let unsigned = gather_unsigned(pulls, store, repo, number, cla_version).await?;
    Ok(Decision::from_unsigned(unsigned))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CommitAuthor, PullRequestCommit};
    use crate::fake::{FailingStore, FakeGitHub};
    use crate::signature::InMemorySignatureStore;

    fn repo() -> RepoRef {
        RepoRef::new("owner", "repo")
    }

    #[tokio::test]
    async fn test_all_authors_signed() {
        let github = FakeGitHub::with_commits(vec![
            PullRequestCommit::by("a1", "john"),
            PullRequestCommit::by("b2", "doe"),
        ]);
        let store = InMemorySignatureStore::with_signed(["john", "doe"], "1");

        let decision = decide(&github, &store, &repo(), 7, "1").await.unwrap();
        assert_eq!(decision, Decision::AllSigned);
    }

    #[tokio::test]
    async fn test_unsigned_authors_in_commit_order() {
        let github = FakeGitHub::with_commits(vec![
            PullRequestCommit::by("a1", "john"),
            PullRequestCommit::by("b2", "signed-user"),
            PullRequestCommit::by("c3", "doe"),
        ]);
        let store = InMemorySignatureStore::with_signed(["signed-user"], "1");

        let unsigned = gather_unsigned(&github, &store, &repo(), 7, "1")
            .await
            .unwrap();
        let logins: Vec<&str> = unsigned.iter().map(|s| s.user.login.as_str()).collect();
        assert_eq!(logins, vec!["john", "doe"]);
        assert!(unsigned.iter().all(|s| s.cla_version == "1"));
    }

    #[tokio::test]
    async fn test_signature_for_other_version_does_not_count() {
        let github = FakeGitHub::with_commits(vec![PullRequestCommit::by("a1", "john")]);
        let store = InMemorySignatureStore::with_signed(["john"], "1");

        let decision = decide(&github, &store, &repo(), 7, "2").await.unwrap();
        assert_eq!(decision.unsigned().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_author_collapses_to_one_entry() {
        let github = FakeGitHub::with_commits(vec![
            PullRequestCommit::by("a1", "john"),
            PullRequestCommit::by("a2", "john"),
            PullRequestCommit::by("a3", "john"),
        ]);
        let store = InMemorySignatureStore::new();

        let unsigned = gather_unsigned(&github, &store, &repo(), 7, "1")
            .await
            .unwrap();
        assert_eq!(unsigned.len(), 1);
        assert_eq!(unsigned[0].user.login, "john");
    }

    #[tokio::test]
    async fn test_identity_fields_come_from_commit_author() {
        let github = FakeGitHub::with_commits(vec![PullRequestCommit {
            sha: "a1".to_string(),
            author: CommitAuthor {
                login: Some("john".to_string()),
                email: Some("j@gmail.com".to_string()),
                name: Some("John".to_string()),
            },
        }]);
        let store = InMemorySignatureStore::new();

        let unsigned = gather_unsigned(&github, &store, &repo(), 7, "1")
            .await
            .unwrap();
        assert_eq!(unsigned[0].user.email.as_deref(), Some("j@gmail.com"));
        assert_eq!(unsigned[0].user.given_name.as_deref(), Some("John"));
    }

    #[tokio::test]
    async fn test_list_commits_error_propagates() {
        let github = FakeGitHub::with_commits(vec![PullRequestCommit::by("a1", "john")]);
        github.fail_on(Operation::ListCommits);
        let store = InMemorySignatureStore::new();

        let err = decide(&github, &store, &repo(), 7, "1").await.unwrap_err();
        assert_eq!(err.operation(), Some(Operation::ListCommits));
        assert!(err.to_string().contains("forced ListCommits error"));
    }

    #[tokio::test]
    async fn test_store_error_aborts() {
        let github = FakeGitHub::with_commits(vec![PullRequestCommit::by("a1", "john")]);

        let err = decide(&github, &FailingStore, &repo(), 7, "1")
            .await
            .unwrap_err();
        match err {
            ReconcileError::SignatureLookup { login, .. } => assert_eq!(login, "john"),
            other => panic!("expected SignatureLookup, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unlinked_author_aborts() {
        let github = FakeGitHub::with_commits(vec![
            PullRequestCommit::by("a1", "john"),
            PullRequestCommit {
                sha: "b2".to_string(),
                author: CommitAuthor {
                    login: None,
                    email: Some("someone@example.com".to_string()),
                    name: Some("Someone".to_string()),
                },
            },
        ]);
        let store = InMemorySignatureStore::new();

        let err = decide(&github, &store, &repo(), 7, "1").await.unwrap_err();
        match &err {
            ReconcileError::UnlinkedAuthor { sha, email } => {
                assert_eq!(sha, "b2");
                assert_eq!(email.as_deref(), Some("someone@example.com"));
            }
            other => panic!("expected UnlinkedAuthor, got {:?}", other),
        }
        assert!(err.to_string().contains("someone@example.com"));
    }
}
