//! Detail-fetch collaborator
//!
//! The platform itself is scraped by a separate sidecar; this crate only
//! asks it for one note's detail at a time.

use async_trait::async_trait;
use nkeep_common::config::SyncConfig;
use nkeep_common::{Error, Result};
use std::time::Duration;

use crate::models::{NoteDetail, NoteRef};

/// Fetches the full detail of one note
#[async_trait]
pub trait NoteSource: Send + Sync {
    /// `TransientFetch` for network or upstream failures, `NotFound` when
    /// the remote no longer has the note
    async fn fetch_detail(&self, note: &NoteRef) -> Result<NoteDetail>;
}

/// HTTP client for the detail-fetch sidecar
pub struct HttpNoteSource {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpNoteSource {
    pub fn new(endpoint: &str, user_agent: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// `None` when no endpoint is configured
    pub fn from_config(config: &SyncConfig) -> Result<Option<Self>> {
        config
            .detail_endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .map(|endpoint| {
                Self::new(
                    endpoint,
                    &config.user_agent,
                    Duration::from_secs(config.request_timeout_secs),
                )
            })
            .transpose()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl NoteSource for HttpNoteSource {
    async fn fetch_detail(&self, note: &NoteRef) -> Result<NoteDetail> {
        let url = format!("{}/notes/{}", self.endpoint, note.id);

        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(token) = note.xsec_token.as_deref() {
            query.push(("xsec_token", token));
        }
        if let Some(source) = note.xsec_source.as_deref() {
            query.push(("xsec_source", source));
        }

        tracing::debug!(note_id = %note.id, url = %url, "Fetching note detail");

        let response = self
            .http_client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| Error::TransientFetch(format!("fetch detail {}: {}", note.id, e)))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("remote note '{}'", note.id)));
        }
        if !status.is_success() {
            return Err(Error::TransientFetch(format!(
                "fetch detail {}: upstream returned {}",
                note.id, status
            )));
        }

        response
            .json::<NoteDetail>()
            .await
            .map_err(|e| Error::Validation(format!("malformed detail for {}: {}", note.id, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_without_endpoint() {
        let config = SyncConfig::default();
        assert!(HttpNoteSource::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_from_config_trims_trailing_slash() {
        let config = SyncConfig {
            detail_endpoint: Some("http://127.0.0.1:5731/".to_string()),
            ..SyncConfig::default()
        };
        let source = HttpNoteSource::from_config(&config).unwrap().unwrap();
        assert_eq!(source.endpoint(), "http://127.0.0.1:5731");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transient() {
        // Port 9 (discard) is not listening on loopback in test environments
        let source =
            HttpNoteSource::new("http://127.0.0.1:9", "test", Duration::from_millis(500)).unwrap();
        let note = crate::models::parse_note_ref("n1");

        let err = source.fetch_detail(&note).await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {:?}", err);
    }
}
