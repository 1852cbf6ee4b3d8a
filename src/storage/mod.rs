//! Client for the Artifact Store (AS): the external object store holding
//! raw fetched HTML and extracted plain text, addressed by a
//! content/URL-derived key (spec.md §6). Backed by AWS S3, matching
//! `S3_BUCKET` / `AWS_REGION` and the original `boto3.client("s3", ...)`
//! usage in `crawler_node.py`.

use crate::common::error::{Error, Result};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::Utc;
use sha1::{Digest, Sha1};
use std::collections::HashMap;

fn sha1_hex(input: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// `crawled/<host>/<sha1(url)>.<ext>`, per spec.md §6.
fn artifact_key(host: &str, url: &str, ext: &str) -> String {
    format!("crawled/{}/{}.{}", host, sha1_hex(url), ext)
}

#[derive(Clone)]
pub struct ArtifactStore {
    client: Client,
    bucket: String,
}

impl ArtifactStore {
    pub async fn connect(region: &str, bucket: String) -> Self {
        let region_provider = aws_config::Region::new(region.to_string());
        let shared_config = aws_config::from_env().region(region_provider).load().await;
        let client = Client::new(&shared_config);
        Self { client, bucket }
    }

    /// Persist the raw HTML for `url` (served from host `host`), tagged
    /// with the source URL and crawl time. Returns the object key.
    pub async fn put_html(&self, host: &str, url: &str, body: &str) -> Result<String> {
        let key = artifact_key(host, url, "html");
        let mut metadata = HashMap::new();
        metadata.insert("source-url".to_string(), url.to_string());
        metadata.insert("crawl-time".to_string(), Utc::now().to_rfc3339());

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body.as_bytes().to_vec()))
            .set_metadata(Some(metadata))
            .send()
            .await?;

        Ok(key)
    }

    /// Persist the extracted plain text for `url`. Returns the object key
    /// (the `text_key` carried on the `index_content` task).
    pub async fn put_text(&self, host: &str, url: &str, text: &str) -> Result<String> {
        let key = artifact_key(host, url, "txt");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(text.as_bytes().to_vec()))
            .content_type("text/plain")
            .send()
            .await?;

        Ok(key)
    }

    /// Read back the extracted text for a given key (consumed by the
    /// index worker).
    pub async fn get_text(&self, key: &str) -> Result<String> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;

        let bytes = resp
            .body
            .collect()
            .await
            .map_err(|e| Error::ArtifactStoreError(e.to_string()))?
            .into_bytes();

        String::from_utf8(bytes.to_vec()).map_err(|e| Error::ArtifactStoreError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_key_matches_spec_layout() {
        let key = artifact_key("a.test", "https://a.test/x", "html");
        assert!(key.starts_with("crawled/a.test/"));
        assert!(key.ends_with(".html"));
        // sha1("https://a.test/x") is stable and lowercase-hex.
        assert_eq!(
            key,
            format!("crawled/a.test/{}.html", sha1_hex("https://a.test/x"))
        );
        assert_eq!(sha1_hex("https://a.test/x").len(), 40);
        assert!(sha1_hex("https://a.test/x").chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn sha1_hex_is_deterministic() {
        assert_eq!(sha1_hex("hello"), sha1_hex("hello"));
        assert_ne!(sha1_hex("hello"), sha1_hex("world"));
    }
}
