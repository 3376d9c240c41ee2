//! Network fallback over HTTP.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::instrument;

use crate::{FetchError, NetworkSource, Progress};

/// Fetches virtual paths relative to a base URL with a plain `GET`.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// URL that a virtual path resolves to.
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl NetworkSource for HttpSource {
    #[instrument(skip(self, progress), level = "debug")]
    async fn get(
        &self,
        path: &str,
        size_hint: usize,
        progress: Progress<'_>,
    ) -> Result<Vec<u8>, FetchError> {
        let url = self.url_for(path);
        let mut response = self.client.get(&url).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let expected = response.content_length();
        let mut body = Vec::with_capacity(size_hint);
        while let Some(chunk) = response.chunk().await? {
            progress(chunk.len());
            body.extend_from_slice(&chunk);
        }

        if let Some(expected) = expected {
            if expected != body.len() as u64 {
                return Err(FetchError::Malformed {
                    url,
                    reason: format!("expected {} bytes, received {}", expected, body.len()),
                });
            }
        }

        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_joins_single_slash() {
        let source = HttpSource::new("http://mirror.example/quake/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            source.url_for("id1/gfx.wad"),
            "http://mirror.example/quake/id1/gfx.wad"
        );
        assert_eq!(
            source.url_for("/id1/gfx.wad"),
            "http://mirror.example/quake/id1/gfx.wad"
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_fetch_error() {
        // Nothing listens on the discard port.
        let source = HttpSource::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let result = source.get("a.cfg", 16, &mut |_| {}).await;
        assert!(matches!(result, Err(FetchError::Http(_))));
    }
}
