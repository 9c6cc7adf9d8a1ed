use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, Response, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use cla_core::{
    ApiError, CommitAuthor, CredentialError, GitHubSession, IssueComment, IssuesService, Label,
    PullRequestCommit, PullRequestsService, RepoRef, RepoStatus, RepositoriesService,
    SessionProvider,
};

use crate::middleware::ApiTraceMiddleware;

const ACCEPT_GITHUB_JSON: &str = "application/vnd.github.v3+json";
const PER_PAGE: usize = 100;

#[derive(Debug, Serialize, Deserialize)]
struct GitHubAppClaims {
    iss: u64,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct InstallationTokenResponse {
    token: String,
    expires_at: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    sha: String,
    commit: GitCommit,
    /// The GitHub account linked to the author email, if any.
    author: Option<Account>,
}

#[derive(Debug, Deserialize)]
struct GitCommit {
    author: Option<GitIdentity>,
}

#[derive(Debug, Deserialize)]
struct GitIdentity {
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Account {
    login: String,
}

impl From<CommitResponse> for PullRequestCommit {
    fn from(response: CommitResponse) -> Self {
        let identity = response.commit.author;
        Self {
            sha: response.sha,
            author: CommitAuthor {
                login: response.author.map(|account| account.login),
                email: identity.as_ref().and_then(|i| i.email.clone()),
                name: identity.and_then(|i| i.name),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct PullRequestResponse {
    head: PullRequestRef,
}

#[derive(Debug, Deserialize)]
struct PullRequestRef {
    sha: String,
}

#[derive(Debug, Serialize)]
struct CreateStatusRequest<'a> {
    state: &'a str,
    description: &'a str,
}

#[derive(Debug, Serialize)]
struct AddLabelsRequest<'a> {
    labels: &'a [String],
}

#[derive(Debug, Serialize)]
struct CreateCommentRequest<'a> {
    body: &'a str,
}

/// The GitHub App identity: signs app JWTs and exchanges them for
/// installation tokens.
#[derive(Clone)]
pub struct GitHubApp {
    client: ClientWithMiddleware,
    app_id: u64,
    private_key: String,
    api_base: Url,
}

impl GitHubApp {
    pub fn new(app_id: u64, private_key: String, api_base: &str) -> Result<Self> {
        Ok(Self {
            client: create_github_client(),
            app_id,
            private_key,
            api_base: parse_api_base(api_base)?,
        })
    }

    fn generate_jwt(&self, now: u64) -> Result<String> {
        let claims = GitHubAppClaims {
            iss: self.app_id,
            iat: now.saturating_sub(60),
            exp: now + 600,
        };

        let header = Header::new(Algorithm::RS256);
        let encoding_key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .context("Failed to parse private key")?;

        encode(&header, &claims, &encoding_key).context("Failed to encode JWT")
    }

    /// Mints a fresh installation access token. Tokens are not cached.
    pub async fn installation_token(&self, installation_id: u64) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("Failed to get current time")?
            .as_secs();
        let jwt = self.generate_jwt(now)?;
        let url = endpoint(
            &self.api_base,
            &[
                "app",
                "installations",
                &installation_id.to_string(),
                "access_tokens",
            ],
        );

        info!(
            "Requesting installation access token for installation {}",
            installation_id
        );

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", jwt))
            .header("Accept", ACCEPT_GITHUB_JSON)
            .send()
            .await
            .context("Failed to send installation token request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .context("Failed to read error response body")?;
            error!(
                "GitHub App token request failed: {} - {}",
                status, error_text
            );
            return Err(anyhow!(
                "GitHub App token request failed: {} - {}",
                status,
                error_text
            ));
        }

        let token_response: InstallationTokenResponse = response
            .json()
            .await
            .context("Failed to parse installation token response")?;

        info!(
            "Obtained installation access token (expires {})",
            token_response.expires_at
        );
        Ok(token_response.token)
    }

    pub async fn installation_client(&self, installation_id: u64) -> Result<InstallationClient> {
        let token = self.installation_token(installation_id).await?;
        Ok(InstallationClient {
            client: self.client.clone(),
            token,
            api_base: self.api_base.clone(),
        })
    }
}

#[async_trait]
impl SessionProvider for GitHubApp {
    async fn session(
        &self,
        installation_id: u64,
    ) -> std::result::Result<Box<dyn GitHubSession>, CredentialError> {
        let client = self
            .installation_client(installation_id)
            .await
            .map_err(|e| CredentialError::new(format!("{:#}", e)))?;
        Ok(Box::new(client))
    }
}

/// REST client authenticated as one installation.
#[derive(Clone)]
pub struct InstallationClient {
    client: ClientWithMiddleware,
    token: String,
    api_base: Url,
}

impl InstallationClient {
    pub fn new(token: String, api_base: &str) -> Result<Self> {
        Ok(Self {
            client: create_github_client(),
            token,
            api_base: parse_api_base(api_base)?,
        })
    }

    fn repo_url(&self, repo: &RepoRef, rest: &[&str]) -> Url {
        let mut segments = vec!["repos", repo.owner.as_str(), repo.name.as_str()];
        segments.extend_from_slice(rest);
        endpoint(&self.api_base, &segments)
    }

    async fn send(&self, request: RequestBuilder) -> std::result::Result<Response, ApiError> {
        let response = request
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", ACCEPT_GITHUB_JSON)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ApiError::status(status, error_message(&error_text)));
        }

        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> std::result::Result<T, ApiError> {
        self.send(request)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Follows `page` until GitHub returns a short page.
    async fn get_all<T: DeserializeOwned>(&self, url: Url) -> std::result::Result<Vec<T>, ApiError> {
        let mut all = Vec::new();
        let mut page = 1;

        loop {
            let mut page_url = url.clone();
            page_url
                .query_pairs_mut()
                .append_pair("per_page", &PER_PAGE.to_string())
                .append_pair("page", &page.to_string());

            let items: Vec<T> = self.send_json(self.client.get(page_url)).await?;
            let count = items.len();
            all.extend(items);

            if count < PER_PAGE {
                break;
            }
            page += 1;
        }

        Ok(all)
    }

    /// Current head commit of a pull request.
    pub async fn pull_request_head_sha(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> std::result::Result<String, ApiError> {
        let url = self.repo_url(repo, &["pulls", &number.to_string()]);
        let pr: PullRequestResponse = self.send_json(self.client.get(url)).await?;
        Ok(pr.head.sha)
    }
}

#[async_trait]
impl RepositoriesService for InstallationClient {
    async fn create_status(
        &self,
        repo: &RepoRef,
        sha: &str,
        status: &RepoStatus,
    ) -> std::result::Result<(), ApiError> {
        let url = self.repo_url(repo, &["statuses", sha]);
        let body = json_body(&CreateStatusRequest {
            state: status.state.as_str(),
            description: &status.description,
        })?;
        self.send(self.client.post(url).body(body).header("Content-Type", "application/json"))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PullRequestsService for InstallationClient {
    async fn list_commits(
        &self,
        repo: &RepoRef,
        number: u64,
    ) -> std::result::Result<Vec<PullRequestCommit>, ApiError> {
        let url = self.repo_url(repo, &["pulls", &number.to_string(), "commits"]);
        let commits: Vec<CommitResponse> = self.get_all(url).await?;
        Ok(commits.into_iter().map(PullRequestCommit::from).collect())
    }
}

#[async_trait]
impl IssuesService for InstallationClient {
    async fn get_label(&self, repo: &RepoRef, name: &str) -> std::result::Result<Label, ApiError> {
        let url = self.repo_url(repo, &["labels", name]);
        self.send_json(self.client.get(url)).await
    }

    async fn create_label(
        &self,
        repo: &RepoRef,
        label: &Label,
    ) -> std::result::Result<Label, ApiError> {
        let url = self.repo_url(repo, &["labels"]);
        let body = json_body(label)?;
        self.send_json(
            self.client
                .post(url)
                .body(body)
                .header("Content-Type", "application/json"),
        )
        .await
    }

    async fn list_labels_on_issue(
        &self,
        repo: &RepoRef,
        issue_number: u64,
    ) -> std::result::Result<Vec<Label>, ApiError> {
        let url = self.repo_url(repo, &["issues", &issue_number.to_string(), "labels"]);
        self.get_all(url).await
    }

    async fn add_labels_to_issue(
        &self,
        repo: &RepoRef,
        issue_number: u64,
        labels: &[String],
    ) -> std::result::Result<Vec<Label>, ApiError> {
        let url = self.repo_url(repo, &["issues", &issue_number.to_string(), "labels"]);
        let body = json_body(&AddLabelsRequest { labels })?;
        self.send_json(
            self.client
                .post(url)
                .body(body)
                .header("Content-Type", "application/json"),
        )
        .await
    }

    async fn remove_label_from_issue(
        &self,
        repo: &RepoRef,
        issue_number: u64,
        label: &str,
    ) -> std::result::Result<(), ApiError> {
        let url = self.repo_url(
            repo,
            &["issues", &issue_number.to_string(), "labels", label],
        );
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn list_comments(
        &self,
        repo: &RepoRef,
        issue_number: u64,
    ) -> std::result::Result<Vec<IssueComment>, ApiError> {
        let url = self.repo_url(repo, &["issues", &issue_number.to_string(), "comments"]);
        self.get_all(url).await
    }

    async fn create_comment(
        &self,
        repo: &RepoRef,
        issue_number: u64,
        body: &str,
    ) -> std::result::Result<IssueComment, ApiError> {
        let url = self.repo_url(repo, &["issues", &issue_number.to_string(), "comments"]);
        let payload = json_body(&CreateCommentRequest { body })?;
        self.send_json(
            self.client
                .post(url)
                .body(payload)
                .header("Content-Type", "application/json"),
        )
        .await
    }
}

fn parse_api_base(api_base: &str) -> Result<Url> {
    let url = Url::parse(api_base)
        .with_context(|| format!("Invalid GitHub API URL: {}", api_base))?;
    if url.cannot_be_a_base() {
        bail!("GitHub API URL cannot have path segments: {}", api_base);
    }
    Ok(url)
}

/// Appends `segments` to `base`, percent-encoding each one. Label names
/// contain spaces and colons, and may contain `/`.
fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

fn json_body<T: Serialize>(body: &T) -> std::result::Result<String, ApiError> {
    serde_json::to_string(body)
        .map_err(|e| ApiError::Transport(format!("Failed to serialize request body: {}", e)))
}

/// GitHub error bodies are JSON with a `message`; fall back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|parsed| parsed.message)
        .unwrap_or_else(|_| body.to_string())
}

pub fn create_github_client() -> ClientWithMiddleware {
    let client = Client::builder()
        .user_agent(concat!("cla-bot/", env!("CARGO_PKG_VERSION")))
        .build()
        .expect("Failed to create HTTP client");

    ClientBuilder::new(client).with(ApiTraceMiddleware).build()
}
