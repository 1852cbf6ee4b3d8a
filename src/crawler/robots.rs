//! `robots.txt` policy checker with a per-process cache, grounded in the
//! teacher's own `RobotsChecker` (rebuilt against the async `Fetcher`
//! instead of a blocking one spawned via `spawn_blocking`). A fetch failure
//! is cached as allow-all to avoid repeated failures (spec.md §4.2/§3).

use crate::common::error::{Error, Result};
use crate::crawler::fetcher::Fetcher;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};
use url::Url;

#[derive(Clone, Debug, Default)]
struct RobotsRules {
    disallowed_paths: Vec<String>,
    allowed_paths: Vec<String>,
}

struct CacheEntry {
    rules: RobotsRules,
    fetched_at: Instant,
}

#[derive(Clone)]
pub struct RobotsChecker {
    cache: Arc<Mutex<HashMap<String, CacheEntry>>>,
    ttl: Duration,
    user_agent: String,
    fetcher: Fetcher,
}

impl RobotsChecker {
    pub fn new(user_agent: String, ttl: Duration, fetcher: Fetcher) -> Self {
        Self {
            cache: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            user_agent,
            fetcher,
        }
    }

    /// Whether `url` may be crawled under the cached (or freshly-fetched)
    /// rules for its origin.
    pub async fn is_allowed(&self, url: &Url) -> Result<bool> {
        let rules = self.rules_for(url).await?;
        let path = url.path();

        if rules.allowed_paths.iter().any(|p| path.starts_with(p.as_str())) {
            return Ok(true);
        }
        if rules.disallowed_paths.iter().any(|p| path.starts_with(p.as_str())) {
            info!(%url, "robots.txt disallows crawling");
            return Ok(false);
        }
        Ok(true)
    }

    async fn rules_for(&self, url: &Url) -> Result<RobotsRules> {
        let host = url
            .host_str()
            .ok_or_else(|| Error::InvalidResponse("URL has no host".to_string()))?;
        // Cache key includes the port so distinct non-default ports on the
        // same host don't share a robots.txt verdict.
        let origin = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        {
            let cache = self.cache.lock().await;
            if let Some(entry) = cache.get(&origin) {
                if entry.fetched_at.elapsed() < self.ttl {
                    return Ok(entry.rules.clone());
                }
            }
        }

        // `join` preserves scheme/host/port, unlike rebuilding from
        // `host_str()` alone, which would silently drop a non-default port.
        let robots_url = url.join("/robots.txt")?;
        let rules = match self.fetcher.fetch(&robots_url).await {
            Ok(response) => parse(&response.body, &self.user_agent),
            Err(e) => {
                warn!(%origin, error = %e, "robots.txt fetch failed, allowing crawl");
                RobotsRules::default()
            }
        };

        let mut cache = self.cache.lock().await;
        cache.insert(
            origin,
            CacheEntry {
                rules: rules.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(rules)
    }
}

fn parse(content: &str, user_agent: &str) -> RobotsRules {
    let mut rules = RobotsRules::default();
    let mut applies_to_us = false;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((directive, value)) = line.split_once(':') else {
            continue;
        };
        let directive = directive.trim().to_lowercase();
        let value = value.trim();

        match directive.as_str() {
            "user-agent" => {
                let declared = value.to_lowercase();
                applies_to_us = declared == "*" || user_agent.to_lowercase().contains(&declared);
            }
            "disallow" if applies_to_us && !value.is_empty() => {
                rules.disallowed_paths.push(value.to_string());
            }
            "allow" if applies_to_us && !value.is_empty() => {
                rules.allowed_paths.push(value.to_string());
            }
            _ => {}
        }
    }

    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_disallow_and_allow_for_matching_user_agent() {
        let content = "User-agent: *\nDisallow: /private/\nAllow: /private/public.html\n";
        let rules = parse(content, "MyCustomBot/1.0");
        assert_eq!(rules.disallowed_paths, vec!["/private/".to_string()]);
        assert_eq!(rules.allowed_paths, vec!["/private/public.html".to_string()]);
    }

    #[test]
    fn ignores_rules_for_other_user_agents() {
        let content = "User-agent: BadBot\nDisallow: /\n";
        let rules = parse(content, "MyCustomBot/1.0");
        assert!(rules.disallowed_paths.is_empty());
    }

    #[tokio::test]
    async fn robots_fetch_failure_allows_crawl() {
        // spec.md §8: "Robots fetch failure ⇒ URL is fetched normally."
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/robots.txt")
            .with_status(500)
            .create_async()
            .await;

        let fetcher = Fetcher::new("TestBot/1.0", 5, 1024).unwrap();
        let checker = RobotsChecker::new("TestBot/1.0".to_string(), Duration::from_secs(60), fetcher);
        let url = Url::parse(&format!("{}/some/page", server.url())).unwrap();

        assert!(checker.is_allowed(&url).await.unwrap());
    }

    #[tokio::test]
    async fn disallowed_path_denies_crawl_after_successful_fetch() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/robots.txt")
            .with_status(200)
            .with_body("User-agent: *\nDisallow: /private/\n")
            .create_async()
            .await;

        let fetcher = Fetcher::new("TestBot/1.0", 5, 1024).unwrap();
        let checker = RobotsChecker::new("TestBot/1.0".to_string(), Duration::from_secs(60), fetcher);
        let url = Url::parse(&format!("{}/private/secret", server.url())).unwrap();

        assert!(!checker.is_allowed(&url).await.unwrap());
    }

    #[tokio::test]
    async fn cache_key_distinguishes_non_default_ports() {
        let mut server_a = mockito::Server::new_async().await;
        let mut server_b = mockito::Server::new_async().await;
        let _mock_a = server_a
            .mock("GET", "/robots.txt")
            .with_status(200)
            .with_body("User-agent: *\nDisallow: /\n")
            .create_async()
            .await;
        let _mock_b = server_b
            .mock("GET", "/robots.txt")
            .with_status(200)
            .with_body("User-agent: *\n")
            .create_async()
            .await;

        let fetcher = Fetcher::new("TestBot/1.0", 5, 1024).unwrap();
        let checker = RobotsChecker::new("TestBot/1.0".to_string(), Duration::from_secs(60), fetcher);

        let url_a = Url::parse(&format!("{}/x", server_a.url())).unwrap();
        let url_b = Url::parse(&format!("{}/x", server_b.url())).unwrap();

        assert!(!checker.is_allowed(&url_a).await.unwrap());
        assert!(checker.is_allowed(&url_b).await.unwrap());
    }
}
