//! REST client for the realtime document database holding player records

use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};

/// Document database client; documents live at `{base}/{path}.json`
#[derive(Clone)]
pub struct RealtimeDbClient {
    client: Client,
    base_url: String,
    auth: Option<String>,
}

impl RealtimeDbClient {
    pub fn new(base_url: &str, auth: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        }
    }

    /// Full URL of a document, with the auth token if one is configured
    fn document_url(&self, path: &str) -> String {
        let path = path.trim_matches('/');
        match &self.auth {
            Some(token) => format!("{}/{}.json?auth={}", self.base_url, path, token),
            None => format!("{}/{}.json", self.base_url, path),
        }
    }

    /// Read a document. A JSON `null` body means the document does not exist.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, DbError> {
        let response = self
            .client
            .get(self.document_url(path))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(DbError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DbError::Api {
                status: status.as_u16(),
                body,
            });
        }

        response.json::<Option<T>>().await.map_err(DbError::Parse)
    }

    /// Replace a document
    pub async fn put<T: Serialize>(&self, path: &str, data: &T) -> Result<(), DbError> {
        let response = self
            .client
            .put(self.document_url(path))
            .header("Content-Type", "application/json")
            .json(data)
            .send()
            .await
            .map_err(DbError::Request)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DbError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

/// Document database errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("HTTP request failed: {0}")]
    Request(reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(reqwest::Error),
}
