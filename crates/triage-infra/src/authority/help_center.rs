//! Help-center article API authority.

use serde::Deserialize;

use triage_core::validator::ArticleAuthority;
use triage_types::error::AuthorityError;

/// Checks article existence via `GET {base}/api/v2/help_center/articles/{id}.json`.
#[derive(Debug, Clone)]
pub struct HelpCenterArticleAuthority {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ArticleEnvelope {
    article: ArticleBody,
}

#[derive(Debug, Deserialize)]
struct ArticleBody {
    #[serde(default)]
    draft: bool,
}

impl HelpCenterArticleAuthority {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn article_url(&self, article_id: u64) -> String {
        format!("{}/api/v2/help_center/articles/{article_id}.json", self.base_url)
    }
}

impl ArticleAuthority for HelpCenterArticleAuthority {
    /// Published articles exist; drafts and 404s do not. Any other status is
    /// an authority error so the validator can fall back.
    async fn exists(&self, article_id: u64) -> Result<bool, AuthorityError> {
        let response = self
            .client
            .get(self.article_url(article_id))
            .send()
            .await
            .map_err(|e| AuthorityError::Request(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AuthorityError::UnexpectedStatus {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: ArticleEnvelope = response
            .json()
            .await
            .map_err(|e| AuthorityError::Parse(e.to_string()))?;
        Ok(!envelope.article.draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::{Json, Router, routing::get};

    async fn article(Path(file): Path<String>) -> Response {
        match file.as_str() {
            "123.json" => Json(serde_json::json!({"article": {"id": 123, "draft": false}})).into_response(),
            "456.json" => Json(serde_json::json!({"article": {"id": 456, "draft": true}})).into_response(),
            "500.json" => (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response(),
            _ => StatusCode::NOT_FOUND.into_response(),
        }
    }

    async fn serve() -> String {
        let app = Router::new().route("/api/v2/help_center/articles/{file}", get(article));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}/")
    }

    #[test]
    fn test_article_url() {
        let authority =
            HelpCenterArticleAuthority::new(reqwest::Client::new(), "https://acme.zendesk.com/");
        assert_eq!(
            authority.article_url(42),
            "https://acme.zendesk.com/api/v2/help_center/articles/42.json"
        );
    }

    #[tokio::test]
    async fn test_published_draft_and_missing() {
        let base = serve().await;
        let authority = HelpCenterArticleAuthority::new(reqwest::Client::new(), &base);

        assert!(authority.exists(123).await.unwrap());
        assert!(!authority.exists(456).await.unwrap());
        assert!(!authority.exists(789).await.unwrap());
    }

    #[tokio::test]
    async fn test_server_error_is_authority_error() {
        let base = serve().await;
        let authority = HelpCenterArticleAuthority::new(reqwest::Client::new(), &base);

        let err = authority.exists(500).await.unwrap_err();
        assert!(matches!(err, AuthorityError::UnexpectedStatus { status: 500, .. }));
    }
}
