//! Shared HTTP plumbing for catalog and release backends.
//!
//! Every backend goes through [`get_json`] or [`get_text`], which apply one
//! status policy:
//!
//! | Status | Result |
//! |--------|--------|
//! | 2xx | `Ok(Some(body))` |
//! | 404 | `Ok(None)` (not found is not an error) |
//! | 403, 429 | [`FetchError::RateLimited`] |
//! | other | [`FetchError::Status`] with the response body |

use anyhow::{Context, Result};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::HttpConfig;
use crate::error::FetchError;

/// Build the client shared by all backends of a run.
///
/// The per-request timeout bounds every individual call; there is no
/// pipeline-wide deadline.
pub fn build_client(config: &HttpConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .context("Failed to build HTTP client")
}

/// Send `request` and decode a JSON body.
pub async fn get_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<Option<T>, FetchError> {
    let Some(response) = send(request).await? else {
        return Ok(None);
    };
    let body = response
        .text()
        .await
        .map_err(|e| FetchError::Network(e.to_string()))?;
    serde_json::from_str(&body)
        .map(Some)
        .map_err(|e| FetchError::Decode(e.to_string()))
}

/// Send `request` and return the body as text.
pub async fn get_text(request: RequestBuilder) -> Result<Option<String>, FetchError> {
    let Some(response) = send(request).await? else {
        return Ok(None);
    };
    response
        .text()
        .await
        .map(Some)
        .map_err(|e| FetchError::Network(e.to_string()))
}

async fn send(request: RequestBuilder) -> Result<Option<Response>, FetchError> {
    let response = request
        .send()
        .await
        .map_err(|e| FetchError::Network(e.to_string()))?;

    let status = response.status();
    if status.is_success() {
        return Ok(Some(response));
    }
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(FetchError::RateLimited {
            status: status.as_u16(),
        });
    }

    let body = response.text().await.unwrap_or_default();
    Err(FetchError::Status {
        status: status.as_u16(),
        body: truncate_body(&body),
    })
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::get;
    use axum::Router;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client() -> reqwest::Client {
        build_client(&HttpConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_status_classification() {
        let app = Router::new()
            .route("/ok", get(|| async { r#"{"n": 3}"# }))
            .route("/bad-json", get(|| async { "not json" }))
            .route("/missing", get(|| async { AxumStatus::NOT_FOUND }))
            .route("/forbidden", get(|| async { AxumStatus::FORBIDDEN }))
            .route("/limited", get(|| async { AxumStatus::TOO_MANY_REQUESTS }))
            .route(
                "/boom",
                get(|| async { (AxumStatus::INTERNAL_SERVER_ERROR, "kaboom") }),
            );
        let base = serve(app).await;
        let c = client();

        let ok: Option<serde_json::Value> =
            get_json(c.get(format!("{}/ok", base))).await.unwrap();
        assert_eq!(ok.unwrap()["n"], 3);

        let missing: Option<serde_json::Value> =
            get_json(c.get(format!("{}/missing", base))).await.unwrap();
        assert!(missing.is_none());

        let err = get_json::<serde_json::Value>(c.get(format!("{}/bad-json", base)))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));

        let err = get_text(c.get(format!("{}/forbidden", base)))
            .await
            .unwrap_err();
        assert!(err.is_rate_limited());

        let err = get_text(c.get(format!("{}/limited", base)))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::RateLimited { status: 429 }));

        let err = get_text(c.get(format!("{}/boom", base)))
            .await
            .unwrap_err();
        match err {
            FetchError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "kaboom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let c = client();
        let err = get_text(c.get("http://127.0.0.1:1/nothing"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(500);
        let t = truncate_body(&long);
        assert_eq!(t.len(), 203);
        assert_eq!(truncate_body("short"), "short");
    }
}
