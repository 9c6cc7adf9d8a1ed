use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{Json, Response},
    routing::post,
    Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use cla_core::{handle_pull_request, PullRequestEvent, RepoRef};

use crate::AppState;

/// Pull request actions that can change the set of commit authors.
const RECONCILE_ACTIONS: &[&str] = &["opened", "reopened", "synchronize"];

#[derive(Debug, Deserialize)]
pub struct PullRequestPayload {
    pub action: Option<String>,
    pub number: Option<u64>,
    pub pull_request: Option<PullRequest>,
    pub repository: Option<Repository>,
    pub installation: Option<Installation>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Installation {
    pub id: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PullRequest {
    pub number: u64,
    pub head: PullRequestRef,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PullRequestRef {
    pub sha: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Repository {
    pub name: String,
    pub owner: User,
}

#[derive(Debug, Deserialize, Clone)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub message: String,
}

impl WebhookResponse {
    fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

type HmacSha256 = Hmac<Sha256>;

fn verify_github_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    let Some(signature_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let signature_bytes = match hex::decode(signature_hex) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };

    mac.update(payload);

    // Constant-time comparison
    mac.verify_slice(&signature_bytes).is_ok()
}

async fn verify_webhook_signature(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let signature = parts
        .headers
        .get("x-hub-signature-256")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            warn!("Webhook delivery without X-Hub-Signature-256");
            StatusCode::UNAUTHORIZED
        })?;

    if !verify_github_signature(&state.webhook_secret, &bytes, signature) {
        error!("Invalid webhook signature");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let request = Request::from_parts(parts, axum::body::Body::from(bytes));
    Ok(next.run(request).await)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|h| h.to_str().ok())
}

/// Extracts the reconciliation input from a verified `pull_request` delivery.
fn pull_request_event(payload: &PullRequestPayload) -> Result<PullRequestEvent, StatusCode> {
    let installation = payload.installation.as_ref().ok_or_else(|| {
        warn!("pull_request delivery has no installation");
        StatusCode::BAD_REQUEST
    })?;
    let pr = payload.pull_request.as_ref().ok_or(StatusCode::BAD_REQUEST)?;
    let repository = payload.repository.as_ref().ok_or(StatusCode::BAD_REQUEST)?;

    Ok(PullRequestEvent::new(
        RepoRef::new(&repository.owner.login, &repository.name),
        payload.number.unwrap_or(pr.number),
        pr.head.sha.clone(),
        installation.id,
    ))
}

pub async fn github_webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<Json<WebhookResponse>, StatusCode> {
    let delivery_id = header(&headers, "x-github-delivery")
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let event_type = header(&headers, "x-github-event").unwrap_or_default();

    info!("Received {} webhook (delivery {})", event_type, delivery_id);

    match event_type {
        "ping" => return Ok(WebhookResponse::new("pong")),
        "pull_request" => {}
        other => {
            info!("Ignoring {} event", other);
            return Ok(WebhookResponse::new("ignored"));
        }
    }

    let payload: PullRequestPayload = serde_json::from_slice(&body).map_err(|e| {
        warn!("Failed to parse pull_request payload: {}", e);
        StatusCode::BAD_REQUEST
    })?;

    let action = payload.action.as_deref().unwrap_or_default();
    if !RECONCILE_ACTIONS.contains(&action) {
        info!("Ignoring pull_request action '{}'", action);
        return Ok(WebhookResponse::new("ignored"));
    }

    let event = pull_request_event(&payload)?;

    let span = info_span!(
        "reconcile",
        delivery = %delivery_id,
        repo = %event.repo,
        pr = event.number,
        sha = %event.head_sha,
    );

    let result = handle_pull_request(
        state.sessions.as_ref(),
        state.signatures.as_ref(),
        &event,
        &state.cla_version,
    )
    .instrument(span)
    .await;

    match result {
        Ok(report) => {
            let message = if report.decision.is_all_signed() {
                "all authors have signed"
            } else {
                "unsigned authors remain"
            };
            info!(
                "Reconciled PR #{} in {}: {}",
                event.number, event.repo, message
            );
            Ok(WebhookResponse::new(message))
        }
        Err(e) => {
            error!(
                "Failed to reconcile PR #{} in {} (delivery {}): {}",
                event.number, event.repo, delivery_id, e
            );
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub fn webhook_router(middleware_state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhook", post(github_webhook_handler))
        .route_layer(middleware::from_fn_with_state(
            middleware_state,
            verify_webhook_signature,
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use cla_core::fake::{FakeGitHub, FakeSessions};
    use cla_core::{
        InMemorySignatureStore, Operation, PullRequestCommit, LABEL_NOT_SIGNED, LABEL_SIGNED,
    };
    use serde_json::json;
    use tower::ServiceExt;

    const SECRET: &str = "It's a Secret to Everybody";

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn app(github: Option<FakeGitHub>, store: InMemorySignatureStore) -> Router {
        let state = Arc::new(AppState {
            sessions: Arc::new(FakeSessions { github }),
            signatures: Arc::new(store),
            webhook_secret: SECRET.to_string(),
            cla_version: "1".to_string(),
        });
        webhook_router(state.clone()).with_state(state)
    }

    fn pull_request_body(action: &str, with_installation: bool) -> Vec<u8> {
        let mut payload = json!({
            "action": action,
            "number": 7,
            "pull_request": {
                "number": 7,
                "head": {"sha": "abc123", "ref": "feature"},
                "base": {"sha": "def456", "ref": "main"}
            },
            "repository": {
                "name": "widgets",
                "full_name": "octo/widgets",
                "owner": {"login": "octo", "id": 1}
            },
            "installation": {"id": 99}
        });
        if !with_installation {
            payload.as_object_mut().unwrap().remove("installation");
        }
        serde_json::to_vec(&payload).unwrap()
    }

    fn delivery(event: &str, body: Vec<u8>, signature: Option<String>) -> Request {
        let mut builder = axum::http::Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .header("x-github-event", event)
            .header("x-github-delivery", "72d3162e-cc78-11e3-81ab-4c9367dc0958");
        if let Some(signature) = signature {
            builder = builder.header("x-hub-signature-256", signature);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn signed(event: &str, body: Vec<u8>) -> Request {
        let signature = sign(SECRET, &body);
        delivery(event, body, Some(signature))
    }

    async fn message(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice::<WebhookResponse>(&bytes)
            .unwrap()
            .message
    }

    #[test]
    fn test_verify_github_signature() {
        // Example from GitHub's webhook validation docs
        let payload = b"Hello, World!";
        let expected = "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17";
        assert!(verify_github_signature(SECRET, payload, expected));
    }

    #[test]
    fn test_verify_github_signature_rejects_bad_input() {
        let payload = b"Hello, World!";
        let good = sign(SECRET, payload);
        assert!(verify_github_signature(SECRET, payload, &good));
        assert!(!verify_github_signature("other secret", payload, &good));
        assert!(!verify_github_signature(SECRET, b"Hello, World?", &good));
        assert!(!verify_github_signature(SECRET, payload, good.trim_start_matches("sha256=")));
        assert!(!verify_github_signature(SECRET, payload, "sha256=not-hex"));
    }

    #[tokio::test]
    async fn test_missing_signature_is_unauthorized() {
        let response = app(None, InMemorySignatureStore::new())
            .oneshot(delivery("ping", b"{}".to_vec(), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_wrong_signature_is_unauthorized() {
        let body = pull_request_body("opened", true);
        let signature = sign("not the secret", &body);
        let github = FakeGitHub::new();

        let response = app(Some(github.clone()), InMemorySignatureStore::new())
            .oneshot(delivery("pull_request", body, Some(signature)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(github.calls().is_empty());
    }

    #[tokio::test]
    async fn test_ping_gets_pong() {
        let response = app(None, InMemorySignatureStore::new())
            .oneshot(signed("ping", br#"{"zen":"Keep it logically awesome."}"#.to_vec()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(message(response).await, "pong");
    }

    #[tokio::test]
    async fn test_other_events_are_ignored() {
        let response = app(None, InMemorySignatureStore::new())
            .oneshot(signed("issues", br#"{"action":"opened"}"#.to_vec()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(message(response).await, "ignored");
    }

    #[tokio::test]
    async fn test_closed_action_is_ignored() {
        let github = FakeGitHub::new();
        let response = app(Some(github.clone()), InMemorySignatureStore::new())
            .oneshot(signed("pull_request", pull_request_body("closed", true)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(message(response).await, "ignored");
        assert!(github.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_installation_is_bad_request() {
        let response = app(Some(FakeGitHub::new()), InMemorySignatureStore::new())
            .oneshot(signed("pull_request", pull_request_body("opened", false)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_opened_pull_request_is_reconciled() {
        let github = FakeGitHub::with_commits(vec![
            PullRequestCommit::by("c1", "john"),
            PullRequestCommit::by("c2", "doe"),
        ]);
        let store = InMemorySignatureStore::with_signed(["doe"], "1");

        let response = app(Some(github.clone()), store)
            .oneshot(signed("pull_request", pull_request_body("opened", true)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(message(response).await, "unsigned authors remain");
        assert_eq!(github.labels_on(7), vec![LABEL_NOT_SIGNED.name.to_string()]);
        assert_eq!(github.comments_on(7).len(), 1);
        assert!(github.comments_on(7)[0].contains("we need @john to sign"));
        let shas: Vec<String> = github
            .state()
            .statuses
            .iter()
            .map(|(sha, _)| sha.clone())
            .collect();
        assert_eq!(shas, vec!["abc123", "abc123"]);
    }

    #[tokio::test]
    async fn test_synchronize_with_all_signed() {
        let github = FakeGitHub::with_commits(vec![PullRequestCommit::by("c1", "john")]);
        let store = InMemorySignatureStore::with_signed(["john"], "1");

        let response = app(Some(github.clone()), store)
            .oneshot(signed("pull_request", pull_request_body("synchronize", true)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(message(response).await, "all authors have signed");
        assert_eq!(github.labels_on(7), vec![LABEL_SIGNED.name.to_string()]);
    }

    #[tokio::test]
    async fn test_reconciliation_failure_is_server_error() {
        let github = FakeGitHub::with_commits(vec![PullRequestCommit::by("c1", "john")]);
        github.fail_on(Operation::CreateLabel);

        let response = app(Some(github.clone()), InMemorySignatureStore::new())
            .oneshot(signed("pull_request", pull_request_body("reopened", true)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(github.count(Operation::AddLabelsToIssue), 0);
    }

    #[tokio::test]
    async fn test_credential_failure_is_server_error() {
        let response = app(None, InMemorySignatureStore::new())
            .oneshot(signed("pull_request", pull_request_body("opened", true)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
