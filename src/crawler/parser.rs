//! HTML extraction, grounded in the teacher's `scraper`-based `Parser` but
//! narrowed to spec.md §4.2's exact rule: text from `{p, h1..h6, span}`,
//! joined with single spaces; links resolved relative to the page, filtered
//! to same-origin `http(s)://`, capped at a configurable count (default
//! five, per `CrawlerConfig::max_new_urls_per_result`).

use crate::common::error::Result;
use scraper::{Html, Selector};
use url::Url;

#[derive(Debug, Clone)]
pub struct ParsedPage {
    pub text_content: String,
    pub links: Vec<Url>,
}

#[derive(Clone)]
pub struct Parser {
    text_selector: Selector,
    link_selector: Selector,
    max_links: usize,
}

impl Parser {
    pub fn new(max_links: usize) -> Self {
        Self {
            text_selector: Selector::parse("p, h1, h2, h3, h4, h5, h6, span").unwrap(),
            link_selector: Selector::parse("a[href]").unwrap(),
            max_links,
        }
    }

    /// Parse `html` fetched from `base_url` into trimmed text content plus
    /// up to `max_links` same-origin `http(s)://` links.
    pub fn parse(&self, html: &str, base_url: &Url) -> Result<ParsedPage> {
        let document = Html::parse_document(html);

        let text_content = document
            .select(&self.text_selector)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        let mut links = Vec::new();
        for element in document.select(&self.link_selector) {
            if links.len() >= self.max_links {
                break;
            }
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            if href.is_empty() || href.starts_with('#') {
                continue;
            }
            let Ok(resolved) = resolve(href, base_url) else {
                continue;
            };
            if !matches!(resolved.scheme(), "http" | "https") {
                continue;
            }
            if resolved.host_str() != base_url.host_str() {
                continue;
            }
            links.push(resolved);
        }

        Ok(ParsedPage { text_content, links })
    }
}

fn resolve(href: &str, base_url: &Url) -> std::result::Result<Url, url::ParseError> {
    if let Ok(url) = Url::parse(href) {
        return Ok(url);
    }
    base_url.join(href)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_text_only_from_spec_tags() {
        let html = r#"<html><body>
            <p>Hello</p><div>ignored</div><h1>Title</h1><span>world</span>
        </body></html>"#;
        let base = Url::parse("https://a.test/").unwrap();
        let parsed = Parser::new(5).parse(html, &base).unwrap();
        assert!(parsed.text_content.contains("Hello"));
        assert!(parsed.text_content.contains("Title"));
        assert!(parsed.text_content.contains("world"));
        assert!(!parsed.text_content.contains("ignored"));
    }

    #[test]
    fn caps_links_at_five_and_drops_cross_origin() {
        let html = r#"<html><body>
            <a href="/1">1</a><a href="/2">2</a><a href="/3">3</a>
            <a href="/4">4</a><a href="/5">5</a><a href="/6">6</a>
            <a href="https://b.test/x">cross-origin</a>
        </body></html>"#;
        let base = Url::parse("https://a.test/").unwrap();
        let parsed = Parser::new(5).parse(html, &base).unwrap();
        assert_eq!(parsed.links.len(), 5);
        assert!(parsed.links.iter().all(|u| u.host_str() == Some("a.test")));
    }

    #[test]
    fn skips_anchors_and_empty_hrefs() {
        let html = r#"<a href="#top">top</a><a href="">empty</a><a href="/ok">ok</a>"#;
        let base = Url::parse("https://a.test/").unwrap();
        let parsed = Parser::new(5).parse(html, &base).unwrap();
        assert_eq!(parsed.links.len(), 1);
        assert_eq!(parsed.links[0].path(), "/ok");
    }

    #[test]
    fn respects_configured_link_cap() {
        let html = r#"<a href="/1">1</a><a href="/2">2</a><a href="/3">3</a>"#;
        let base = Url::parse("https://a.test/").unwrap();
        let parsed = Parser::new(2).parse(html, &base).unwrap();
        assert_eq!(parsed.links.len(), 2);
    }
}
