//! The master's in-memory frontier + crawled-URL set + crawl options
//! (spec.md §3/§4.1). Deliberately not durable across restarts — see
//! spec.md §1 Non-goals and §9.

use std::collections::{HashMap, HashSet};
use url::Url;

/// Crawl-wide policy: how deep to follow links and which domains to admit.
#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    pub max_depth: usize,
    /// `None` (or empty) means all domains are allowed (spec.md §3).
    pub allowed_domains: Option<Vec<String>>,
}

/// Owns the frontier (`url -> depth`) and the permanent `crawled_urls` set.
/// All mutation happens through `&mut self`; callers hold the enclosing
/// `tokio::sync::Mutex` for the duration (spec.md §5's "single coarse
/// mutex").
#[derive(Debug, Default)]
pub struct Frontier {
    queue: HashMap<String, usize>,
    crawled: HashSet<String>,
    options: CrawlOptions,
}

impl Frontier {
    pub fn new() -> Self {
        Self {
            queue: HashMap::new(),
            crawled: HashSet::new(),
            options: CrawlOptions {
                max_depth: 1,
                allowed_domains: None,
            },
        }
    }

    pub fn set_crawl_options(&mut self, max_depth: usize, allowed_domains: Option<Vec<String>>) {
        self.options.max_depth = max_depth;
        self.options.allowed_domains = allowed_domains.filter(|d| !d.is_empty());
    }

    pub fn max_depth(&self) -> usize {
        self.options.max_depth
    }

    /// Substring match of any allowed domain against the URL's host,
    /// lenient by design (spec.md §9 Open Question).
    pub fn is_allowed_domain(&self, url: &str) -> bool {
        let Some(allowed) = &self.options.allowed_domains else {
            return true;
        };
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host = host.to_lowercase();
        allowed
            .iter()
            .any(|d| host.contains(&d.to_lowercase()))
    }

    /// Seed URLs at depth 1. Returns the count actually admitted (already
    /// crawled or domain-disallowed URLs are skipped). Pre-existing
    /// frontier entries are never overwritten, so re-seeding a URL already
    /// queued at a different depth is a no-op for that URL.
    pub fn add_seed_urls(&mut self, urls: &[String]) -> usize {
        let mut admitted = 0;
        for url in urls {
            if self.crawled.contains(url) {
                continue;
            }
            if !self.is_allowed_domain(url) {
                continue;
            }
            self.queue.entry(url.clone()).or_insert(1);
            admitted += 1;
        }
        admitted
    }

    /// Fold newly-discovered links from a finished crawl back into the
    /// frontier, at `parent_depth + 1`. The whole batch is dropped if that
    /// exceeds `max_depth` (spec.md §4.1).
    pub fn add_new_urls(&mut self, urls: &[String], parent_depth: usize) -> usize {
        let new_depth = parent_depth + 1;
        if new_depth > self.options.max_depth {
            return 0;
        }
        let mut admitted = 0;
        for url in urls {
            if self.crawled.contains(url) {
                continue;
            }
            if !self.is_allowed_domain(url) {
                continue;
            }
            if !self.queue.contains_key(url) {
                self.queue.insert(url.clone(), new_depth);
                admitted += 1;
            }
        }
        admitted
    }

    /// Remove and return one frontier entry, in unspecified order — the
    /// frontier is a multiset-free map, so any extraction order is correct
    /// (spec.md §4.1).
    pub fn pop(&mut self) -> Option<(String, usize)> {
        let url = self.queue.keys().next().cloned()?;
        let depth = self.queue.remove(&url).unwrap();
        Some((url, depth))
    }

    pub fn mark_crawled(&mut self, url: &str) {
        self.crawled.insert(url.to_string());
    }

    /// Used both to re-queue a URL after a failed `distribute_tasks`
    /// publish (at its original depth) and to reinject a URL recovered
    /// from a dead worker's pending-assignment record. Deliberately does
    /// not consult `crawled_urls`: the source tracks "crawled" at dispatch
    /// time rather than completion time, so a URL may already be marked
    /// crawled by the time its worker dies (spec.md §9 Open Question).
    pub fn reinsert(&mut self, url: String, depth: usize) {
        self.queue.insert(url, depth);
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn queued_urls(&self) -> Vec<String> {
        self.queue.keys().cloned().collect()
    }

    pub fn crawled_urls(&self) -> Vec<String> {
        self.crawled.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_respects_allowed_domains_and_depth() {
        let mut f = Frontier::new();
        f.set_crawl_options(2, Some(vec!["a.test".to_string()]));
        let admitted = f.add_seed_urls(&[
            "https://a.test/x".to_string(),
            "https://b.test/y".to_string(),
        ]);
        assert_eq!(admitted, 1);
        assert_eq!(f.pop(), Some(("https://a.test/x".to_string(), 1)));
    }

    #[test]
    fn reseeding_same_url_is_idempotent() {
        let mut f = Frontier::new();
        f.set_crawl_options(1, None);
        f.add_seed_urls(&["https://a.test/".to_string()]);
        f.add_seed_urls(&["https://a.test/".to_string()]);
        assert_eq!(f.queued_urls().len(), 1);
    }

    #[test]
    fn max_depth_one_drops_all_new_urls() {
        let mut f = Frontier::new();
        f.set_crawl_options(1, None);
        let admitted = f.add_new_urls(&["https://a.test/1".to_string()], 1);
        assert_eq!(admitted, 0);
        assert!(f.is_empty());
    }

    #[test]
    fn crawled_url_is_never_readmitted_by_seed() {
        let mut f = Frontier::new();
        f.set_crawl_options(1, None);
        f.mark_crawled("https://a.test/");
        let admitted = f.add_seed_urls(&["https://a.test/".to_string()]);
        assert_eq!(admitted, 0);
        assert!(f.is_empty());
    }

    #[test]
    fn empty_allowed_domains_admits_all_hosts() {
        let mut f = Frontier::new();
        f.set_crawl_options(1, Some(vec![]));
        assert!(f.is_allowed_domain("https://anything.example/"));
    }

    #[test]
    fn no_new_urls_means_no_frontier_change() {
        let mut f = Frontier::new();
        f.set_crawl_options(2, None);
        let admitted = f.add_new_urls(&[], 1);
        assert_eq!(admitted, 0);
        assert!(f.is_empty());
    }
}
