//! Async HTTP fetch, grounded in the teacher's `ureq`-based `Fetcher` but
//! rebuilt on `reqwest` to fit the rest of this crate's async runtime
//! (spec.md §4.2 Fetch: `User-Agent`, 5 s timeout, non-2xx ⇒ error).

use crate::common::error::{Error, Result};
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Response from fetching a URL.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: Url,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub body: String,
}

/// HTTP fetcher for downloading web pages and `robots.txt`.
#[derive(Clone)]
pub struct Fetcher {
    client: Client,
    max_size: usize,
}

impl Fetcher {
    pub fn new(user_agent: &str, timeout_seconds: u64, max_size: usize) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent.to_string())
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(Error::HttpError)?;
        Ok(Self { client, max_size })
    }

    /// Fetch `url`, reading at most `max_size` bytes of the body.
    pub async fn fetch(&self, url: &Url) -> Result<FetchResponse> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidResponse(format!(
                "unsupported URL scheme: {}",
                url.scheme()
            )));
        }

        let response = self.client.get(url.as_str()).send().await?;
        let status_code = response.status().as_u16();
        if !(200..300).contains(&status_code) {
            return Err(Error::InvalidResponse(format!(
                "HTTP {} for {}",
                status_code, url
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let bytes = response.bytes().await?;
        let truncated = &bytes[..bytes.len().min(self.max_size)];
        let body = String::from_utf8_lossy(truncated).into_owned();

        Ok(FetchResponse {
            url: url.clone(),
            status_code,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetch_rejects_non_http_schemes() {
        let fetcher = Fetcher::new("TestBot/1.0", 5, 1024).unwrap();
        let url = Url::parse("ftp://example.com").unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn fetch_errors_on_non_2xx_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("GET", "/").with_status(500).create_async().await;

        let fetcher = Fetcher::new("TestBot/1.0", 5, 1024).unwrap();
        let url = Url::parse(&server.url()).unwrap();
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn fetch_returns_body_truncated_to_max_size() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_body("0123456789")
            .create_async()
            .await;

        let fetcher = Fetcher::new("TestBot/1.0", 5, 4).unwrap();
        let url = Url::parse(&server.url()).unwrap();
        let response = fetcher.fetch(&url).await.unwrap();
        assert_eq!(response.body, "0123");
    }
}
