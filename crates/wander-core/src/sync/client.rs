//! HTTP client for the bulk sync API and its collaborator endpoints.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::config::SyncClientConfig;
use crate::models::NewPlace;
use crate::util::{compact_text, is_http_url, normalize_text_option};

use super::protocol::{ServerPlace, SyncBatchResult, SyncRequest, SyncResponse};

/// Classified failure of one request/response exchange
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Invalid sync client configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Server returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Server rejected the sync batch: {0}")]
    Rejected(String),
    #[error("Invalid server response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// Whether the failure is worth retrying without any change on our side.
    ///
    /// The sync queue retries every failure; this only informs logging and
    /// the online-first create fallback.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            Self::InvalidConfiguration(_) | Self::Rejected(_) | Self::InvalidResponse(_) => false,
        }
    }

    fn from_reqwest(error: &reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            Self::Timeout(timeout)
        } else if error.is_decode() {
            Self::InvalidResponse(error.to_string())
        } else if error.is_builder() {
            Self::InvalidConfiguration(error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }
}

/// Remote API surface used by the sync engine and the place service.
///
/// The futures are `Send` so callers may drive them from spawned tasks.
pub trait SyncApi: Send + Sync + 'static {
    /// One bulk sync exchange (`POST /sync`)
    fn bulk_sync(
        &self,
        request: SyncRequest,
    ) -> impl Future<Output = Result<SyncBatchResult, TransportError>> + Send;

    /// Create a place immediately (`POST /places`)
    fn create_place(
        &self,
        place: NewPlace,
    ) -> impl Future<Output = Result<ServerPlace, TransportError>> + Send;

    /// List every place the server knows (`GET /places`)
    fn fetch_places(&self) -> impl Future<Output = Result<Vec<ServerPlace>, TransportError>> + Send;

    /// Cheap reachability check (`GET /healthz`)
    fn health_check(&self) -> impl Future<Output = bool> + Send;
}

/// `reqwest` implementation of [`SyncApi`]
#[derive(Clone)]
pub struct HttpSyncClient {
    base_url: String,
    token: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpSyncClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpSyncClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpSyncClient {
    /// Build a client for an explicit base URL
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| {
                TransportError::InvalidConfiguration(format!(
                    "Failed to construct HTTP client: {error}"
                ))
            })?;
        Ok(Self {
            base_url,
            token: None,
            timeout,
            client,
        })
    }

    /// Build a client from resolved configuration
    pub fn from_config(config: &SyncClientConfig) -> Result<Self, TransportError> {
        let client = Self::new(config.api_base_url.clone(), config.request_timeout)?;
        Ok(client.with_token(config.api_token.clone()))
    }

    /// Attach a bearer token sent with every request
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = normalize_text_option(token);
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .header("Accept", "application/json");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, TransportError> {
        let response = request
            .send()
            .await
            .map_err(|error| TransportError::from_reqwest(&error, self.timeout))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Http {
                status: status.as_u16(),
                message: parse_api_error(status, &body),
            });
        }
        Ok(response)
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        response
            .json::<T>()
            .await
            .map_err(|error| TransportError::from_reqwest(&error, self.timeout))
    }
}

impl SyncApi for HttpSyncClient {
    async fn bulk_sync(&self, request: SyncRequest) -> Result<SyncBatchResult, TransportError> {
        tracing::debug!(actions = request.actions.len(), "POST /sync");
        let response = self
            .send(self.request(reqwest::Method::POST, "/sync").json(&request))
            .await?;
        let body: SyncResponse = self.decode(response).await?;
        body.into_result()
    }

    async fn create_place(&self, place: NewPlace) -> Result<ServerPlace, TransportError> {
        let response = self
            .send(self.request(reqwest::Method::POST, "/places").json(&place))
            .await?;
        let body: PlaceEnvelope = self.decode(response).await?;
        Ok(body.into_place())
    }

    async fn fetch_places(&self) -> Result<Vec<ServerPlace>, TransportError> {
        let response = self
            .send(self.request(reqwest::Method::GET, "/places"))
            .await?;
        let body: PlacesEnvelope = self.decode(response).await?;
        Ok(body.into_places())
    }

    async fn health_check(&self) -> bool {
        let request = self.request(reqwest::Method::GET, "/healthz");
        match self.send(request).await {
            Ok(_) => true,
            Err(error) => {
                tracing::debug!(%error, "Health check failed");
                false
            }
        }
    }
}

/// `POST /places` answers either with the place or with `{ "place": ... }`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PlaceEnvelope {
    Wrapped { place: ServerPlace },
    Bare(ServerPlace),
}

impl PlaceEnvelope {
    fn into_place(self) -> ServerPlace {
        match self {
            Self::Wrapped { place } | Self::Bare(place) => place,
        }
    }
}

/// `GET /places` answers either with a list or with `{ "places": [...] }`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PlacesEnvelope {
    Wrapped { places: Vec<ServerPlace> },
    Bare(Vec<ServerPlace>),
}

impl PlacesEnvelope {
    fn into_places(self) -> Vec<ServerPlace> {
        match self {
            Self::Wrapped { places } | Self::Bare(places) => places,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

pub(crate) fn normalize_base_url(raw: String) -> Result<String, TransportError> {
    let base_url = normalize_text_option(Some(raw)).ok_or_else(|| {
        TransportError::InvalidConfiguration("base URL must not be empty".to_string())
    })?;
    if is_http_url(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(TransportError::InvalidConfiguration(
            "base URL must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeoPoint;
    use crate::sync::protocol::IdMapping;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base_url: &str) -> HttpSyncClient {
        HttpSyncClient::new(base_url, Duration::from_secs(5)).unwrap()
    }

    fn empty_request() -> SyncRequest {
        SyncRequest {
            actions: Vec::new(),
            last_synced_at: None,
        }
    }

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url(String::new()).is_err());
        assert!(normalize_base_url("api.example.com".to_string()).is_err());
        assert_eq!(
            normalize_base_url(" https://api.example.com/ ".to_string()).unwrap(),
            "https://api.example.com"
        );
    }

    #[test]
    fn debug_redacts_token() {
        let token = Some("secret".to_string());
        let client = client("https://api.example.com").with_token(token);
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn parse_api_error_prefers_message_field() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_REQUEST, r#"{"error":"bad payload"}"#),
            "bad payload (400)"
        );
        assert_eq!(
            parse_api_error(StatusCode::SERVICE_UNAVAILABLE, "  "),
            "HTTP 503"
        );
    }

    #[test]
    fn transient_classification() {
        assert!(TransportError::Network("reset".into()).is_transient());
        assert!(TransportError::Timeout(Duration::from_secs(30)).is_transient());
        let unavailable = TransportError::Http {
            status: 503,
            message: String::new(),
        };
        assert!(unavailable.is_transient());
        let bad_request = TransportError::Http {
            status: 400,
            message: String::new(),
        };
        assert!(!bad_request.is_transient());
        assert!(!TransportError::Rejected("nope".into()).is_transient());
    }

    #[tokio::test]
    async fn bulk_sync_posts_wire_body_and_decodes_response() {
        let app = Router::new().route(
            "/sync",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(
                    headers.get("authorization").unwrap().to_str().unwrap(),
                    "Bearer token-1"
                );
                assert_eq!(body["actions"], json!([]));
                Json(json!({
                    "success": true,
                    "idMappings": [{"clientId": "p1", "serverId": "srv-42"}],
                    "updatedPlaces": [],
                    "syncedAt": "2026-01-01T00:00:00Z"
                }))
            }),
        );
        let base_url = serve(app).await;

        let result = client(&base_url)
            .with_token(Some("token-1".to_string()))
            .bulk_sync(empty_request())
            .await
            .unwrap();
        assert_eq!(result.id_mappings, vec![IdMapping::new("p1", "srv-42")]);
    }

    #[tokio::test]
    async fn bulk_sync_classifies_http_status() {
        let app = Router::new().route(
            "/sync",
            post(|| async {
                (
                    AxumStatus::SERVICE_UNAVAILABLE,
                    Json(json!({"message": "maintenance"})),
                )
            }),
        );
        let base_url = serve(app).await;

        let error = client(&base_url)
            .bulk_sync(empty_request())
            .await
            .unwrap_err();
        assert_eq!(
            error,
            TransportError::Http {
                status: 503,
                message: "maintenance (503)".to_string()
            }
        );
    }

    #[tokio::test]
    async fn bulk_sync_classifies_success_false() {
        let app = Router::new().route(
            "/sync",
            post(|| async { Json(json!({"success": false, "error": "stale batch"})) }),
        );
        let base_url = serve(app).await;

        let error = client(&base_url)
            .bulk_sync(empty_request())
            .await
            .unwrap_err();
        assert_eq!(error, TransportError::Rejected("stale batch".to_string()));
    }

    #[tokio::test]
    async fn bulk_sync_classifies_undecodable_body() {
        let app = Router::new().route("/sync", post(|| async { "not json" }));
        let base_url = serve(app).await;

        let error = client(&base_url)
            .bulk_sync(empty_request())
            .await
            .unwrap_err();
        assert!(matches!(error, TransportError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn bulk_sync_times_out() {
        let app = Router::new().route(
            "/sync",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(json!({"success": true}))
            }),
        );
        let base_url = serve(app).await;

        let slow = HttpSyncClient::new(&base_url, Duration::from_millis(100)).unwrap();
        let error = slow.bulk_sync(empty_request()).await.unwrap_err();
        assert_eq!(error, TransportError::Timeout(Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn unreachable_server_is_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = client(&format!("http://{addr}"));
        let error = client.bulk_sync(empty_request()).await.unwrap_err();
        assert!(matches!(error, TransportError::Network(_)));
        assert!(!client.health_check().await);
    }

    #[tokio::test]
    async fn create_and_fetch_places_accept_both_envelopes() {
        let app = Router::new()
            .route(
                "/places",
                post(|Json(body): Json<Value>| async move {
                    Json(json!({
                        "place": {
                            "id": "srv-1",
                            "name": body["name"],
                            "lat": body["lat"],
                            "lng": body["lng"]
                        }
                    }))
                })
                .get(|| async {
                    Json(json!([
                        {"id": "srv-1", "name": "Eiffel Tower", "lat": 48.8584, "lng": 2.2945}
                    ]))
                }),
            )
            .route("/healthz", get(|| async { "ok" }));
        let base_url = serve(app).await;
        let client = client(&base_url);

        let location = GeoPoint::new(48.8584, 2.2945).unwrap();
        let created = client
            .create_place(NewPlace::new("Eiffel Tower", location))
            .await
            .unwrap();
        assert_eq!(created.id, "srv-1");
        assert_eq!(created.name, "Eiffel Tower");

        let listed = client.fetch_places().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(client.health_check().await);
    }
}
