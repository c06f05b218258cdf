//! Pass files to the content-addressed upload service.
//!
//! The service is a black box that turns bytes into a URL. The [Coordinator] base64-encodes the
//! payload, posts it as `{file, filename}` JSON to an [Endpoint] and translates the reply:
//!
//! - `2xx` with `{url}`: the URL.
//! - `2xx` without a URL: [Error::Upload].
//! - non-`2xx`: [Error::Upload] carrying the reply's `error` field (or the status).
//! - transport failure: [Error::Upload] carrying the transport message.
//!
//! Each upload is attempted once. Failures are recorded in the session under
//! [Family::Upload].

use crate::{
    session::{Family, Session},
    Config, ConfigError, Error,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use tracing::{debug, warn};

/// Body posted to the upload service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Base64-encoded payload.
    pub file: String,
    pub filename: String,
}

/// Status and JSON body returned by the upload service.
#[derive(Clone, Debug, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Connection to the upload service.
pub trait Endpoint: Clone + Send + Sync + 'static {
    /// Post `request`, returning the reply or a transport error message.
    fn post(&self, request: Request) -> impl Future<Output = Result<Reply, String>> + Send;
}

/// [Endpoint] reached over HTTP.
#[derive(Clone)]
pub struct HttpEndpoint {
    client: reqwest::Client,
    url: String,
}

impl HttpEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// Connect to the upload service named by `config`.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let url = config
            .upload
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingUpload)?;
        let parsed =
            reqwest::Url::parse(url).map_err(|err| ConfigError::InvalidUpload(err.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUpload(format!(
                "unsupported scheme {}",
                parsed.scheme()
            )));
        }
        Ok(Self::new(url))
    }
}

impl Endpoint for HttpEndpoint {
    async fn post(&self, request: Request) -> Result<Reply, String> {
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|err| err.to_string())?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|err| err.to_string())?;
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok(Reply { status, body })
    }
}

/// Uploads files on behalf of a [Session].
#[derive(Clone)]
pub struct Coordinator<U: Endpoint> {
    endpoint: U,
    session: Session,
}

impl<U: Endpoint> Coordinator<U> {
    pub fn new(endpoint: U, session: Session) -> Self {
        Self { endpoint, session }
    }

    /// Upload `bytes` as `filename` and return the URL it is served at.
    pub async fn upload(&self, bytes: &[u8], filename: &str) -> Result<String, Error> {
        let request = Request {
            file: BASE64.encode(bytes),
            filename: filename.to_string(),
        };
        let result = match self.endpoint.post(request).await {
            Ok(reply) => Self::translate(reply),
            Err(message) => Err(Error::Upload(message)),
        };
        match &result {
            Ok(url) => debug!(filename, %url, size = bytes.len(), "uploaded"),
            Err(err) => {
                warn!(filename, ?err, "upload failed");
                self.session.fail(Family::Upload, err);
            }
        }
        result
    }

    /// Serialize `document` as JSON and upload it as `filename`.
    pub async fn upload_json(&self, document: &Value, filename: &str) -> Result<String, Error> {
        let bytes = serde_json::to_vec(document).map_err(|err| Error::Upload(err.to_string()))?;
        self.upload(&bytes, filename).await
    }

    fn translate(reply: Reply) -> Result<String, Error> {
        if !reply.is_success() {
            let message = reply
                .body
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| {
                    format!("upload service replied with status {}", reply.status)
                });
            return Err(Error::Upload(message));
        }
        match reply.body.get("url").and_then(Value::as_str) {
            Some(url) if !url.is_empty() => Ok(url.to_string()),
            _ => Err(Error::Upload("reply carries no url".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks;
    use commonware_macros::test_traced;
    use axum::{http::StatusCode, routing::post, serve, Json, Router};
    use commonware_runtime::{deterministic, tokio, Metrics, Runner, Spawner};
    use serde_json::json;

    #[test_traced]
    fn test_upload_encodes_payload() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let session = Session::new();
            let endpoint = mocks::Endpoint::default();
            let coordinator = Coordinator::new(endpoint.clone(), session.clone());

            let url = coordinator.upload(b"portrait", "ada.png").await.unwrap();
            assert!(url.starts_with(mocks::GATEWAY));

            let requests = endpoint.requests();
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].filename, "ada.png");
            assert_eq!(BASE64.decode(&requests[0].file).unwrap(), b"portrait");
            assert_eq!(session.report(), None);
        });
    }

    #[test_traced]
    fn test_upload_json() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let endpoint = mocks::Endpoint::default();
            let coordinator = Coordinator::new(endpoint.clone(), Session::new());

            let document = json!({"name": "Ada", "age": "36"});
            coordinator.upload_json(&document, "data.json").await.unwrap();

            let requests = endpoint.requests();
            let decoded = BASE64.decode(&requests[0].file).unwrap();
            let parsed: Value = serde_json::from_slice(&decoded).unwrap();
            assert_eq!(parsed, document);
        });
    }

    #[test_traced]
    fn test_upload_failures() {
        let executor = deterministic::Runner::default();
        executor.start(|_| async move {
            let session = Session::new();
            let endpoint = mocks::Endpoint::default();
            let coordinator = Coordinator::new(endpoint.clone(), session.clone());

            // Error reply carries its message through
            endpoint.reply(413, json!({"error": "quota exceeded"}));
            let result = coordinator.upload(b"huge", "huge.png").await;
            assert_eq!(result, Err(Error::Upload("quota exceeded".into())));
            let report = session.report().unwrap();
            assert_eq!(report.family, Family::Upload);
            assert_eq!(report.message, "upload failed: quota exceeded");

            // Error reply without a message
            endpoint.reply(502, Value::String("Bad Gateway".into()));
            let result = coordinator.upload(b"x", "x.png").await;
            assert!(matches!(result, Err(Error::Upload(message)) if message.contains("502")));

            // Success without a url
            endpoint.reply(200, json!({}));
            let result = coordinator.upload(b"x", "x.png").await;
            assert_eq!(result, Err(Error::Upload("reply carries no url".into())));

            // Unreachable service
            endpoint.unreachable("connection refused");
            let result = coordinator.upload(b"x", "x.png").await;
            assert_eq!(result, Err(Error::Upload("connection refused".into())));

            // One attempt per upload
            assert_eq!(endpoint.requests().len(), 4);

            // Queue drained: back to success
            assert!(coordinator.upload(b"x", "x.png").await.is_ok());
        });
    }

    #[test]
    fn test_http_endpoint_from_config() {
        let mut config = mocks::config();
        assert_eq!(
            HttpEndpoint::from_config(&config).err(),
            Some(ConfigError::MissingUpload)
        );
        config.upload = Some("  ".into());
        assert_eq!(
            HttpEndpoint::from_config(&config).err(),
            Some(ConfigError::MissingUpload)
        );
        config.upload = Some("not a url".into());
        assert!(matches!(
            HttpEndpoint::from_config(&config),
            Err(ConfigError::InvalidUpload(_))
        ));
        config.upload = Some("ftp://localhost/upload".into());
        assert!(matches!(
            HttpEndpoint::from_config(&config),
            Err(ConfigError::InvalidUpload(_))
        ));
        config.upload = Some(" http://localhost:3000/api/pinata ".into());
        let endpoint = HttpEndpoint::from_config(&config).unwrap();
        assert_eq!(endpoint.url, "http://localhost:3000/api/pinata");
    }

    #[test_traced]
    fn test_http_endpoint() {
        let executor = tokio::Runner::default();
        executor.start(|context| async move {
            // Serve a stand-in upload service on an ephemeral port
            let listener = ::tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let app = Router::new()
                .route(
                    "/upload",
                    post(|Json(request): Json<Request>| async move {
                        let size = BASE64.decode(&request.file).unwrap().len();
                        Json(json!({
                            "url": format!("{}{}?size={size}", mocks::GATEWAY, request.filename)
                        }))
                    }),
                )
                .route(
                    "/full",
                    post(|| async {
                        (
                            StatusCode::PAYLOAD_TOO_LARGE,
                            Json(json!({"error": "quota exceeded"})),
                        )
                    }),
                )
                .route(
                    "/down",
                    post(|| async { (StatusCode::BAD_GATEWAY, "Bad Gateway") }),
                );
            context.with_label("upload").spawn(move |_| async move {
                serve(listener, app.into_make_service()).await.unwrap();
            });

            // Success carries the url through
            let mut config = mocks::config();
            config.upload = Some(format!("http://{addr}/upload"));
            let session = Session::new();
            let endpoint = HttpEndpoint::from_config(&config).unwrap();
            let coordinator = Coordinator::new(endpoint, session.clone());
            let url = coordinator.upload(b"portrait", "ada.png").await.unwrap();
            assert_eq!(url, format!("{}ada.png?size=8", mocks::GATEWAY));
            assert_eq!(session.report(), None);

            // JSON error reply
            let coordinator =
                Coordinator::new(HttpEndpoint::new(format!("http://{addr}/full")), session.clone());
            let result = coordinator.upload(b"huge", "huge.png").await;
            assert_eq!(result, Err(Error::Upload("quota exceeded".into())));
            assert_eq!(session.report().unwrap().family, Family::Upload);

            // Plain-text error reply falls back to the status
            let coordinator =
                Coordinator::new(HttpEndpoint::new(format!("http://{addr}/down")), session.clone());
            let result = coordinator.upload(b"x", "x.png").await;
            assert!(matches!(result, Err(Error::Upload(message)) if message.contains("502")));
        });
    }
}
