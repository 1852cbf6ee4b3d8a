//! Client for the Search Backend (SB): `index(doc)` / `search(query) ->
//! [url]`, specified only at the interface level by spec.md §2/§6. Backed
//! in-process by `tantivy`, the teacher's own search-engine dependency
//! (see SPEC_FULL.md §0 / DESIGN.md for why this satisfies the interface
//! instead of a remote OpenSearch cluster).

pub mod tokenizer;

use crate::common::error::Result;
use std::path::Path;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Schema, FAST, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, Term};
use tokio::sync::Mutex;

/// Document shape accepted by `SearchBackend::index`, matching
/// `IndexerNode.add_to_index`'s `{url, content, tokens, timestamp}`.
#[derive(Debug, Clone)]
pub struct IndexDocument {
    pub url: String,
    pub content: String,
    pub tokens: Vec<String>,
    pub timestamp: i64,
}

#[derive(Clone)]
pub struct SearchBackend {
    index: Index,
    writer: Arc<Mutex<IndexWriter>>,
    reader: IndexReader,
    url_field: tantivy::schema::Field,
    content_field: tantivy::schema::Field,
    tokens_field: tantivy::schema::Field,
    timestamp_field: tantivy::schema::Field,
}

impl SearchBackend {
    /// Open (or create) the tantivy index rooted at `index_path`.
    pub async fn open(index_path: &str) -> Result<Self> {
        let path = index_path.to_string();
        tokio::task::spawn_blocking(move || Self::open_blocking(&path))
            .await
            .map_err(|e| crate::common::error::Error::Unknown(e.to_string()))?
    }

    fn open_blocking(index_path: &str) -> Result<Self> {
        std::fs::create_dir_all(index_path)?;

        let mut schema_builder = Schema::builder();
        // STRING: untokenized, so delete_term can match the exact url for
        // overwrite-in-place re-indexing (spec.md §9: "no exactly-once
        // claim", but re-indexing overwrites rather than duplicates).
        let url_field = schema_builder.add_text_field("url", STRING | STORED | FAST);
        let content_field = schema_builder.add_text_field("content", STORED);
        let tokens_field = schema_builder.add_text_field("tokens", TEXT | STORED);
        let timestamp_field = schema_builder.add_i64_field("timestamp", STORED | FAST);
        let schema = schema_builder.build();

        let dir = tantivy::directory::MmapDirectory::open(Path::new(index_path))?;
        let index = Index::open_or_create(dir, schema)?;
        let writer = index.writer(50_000_000)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::OnCommitWithDelay)
            .try_into()?;

        Ok(Self {
            index,
            writer: Arc::new(Mutex::new(writer)),
            reader,
            url_field,
            content_field,
            tokens_field,
            timestamp_field,
        })
    }

    /// Index (or re-index, overwriting by `url`) a document.
    pub async fn index(&self, document: IndexDocument) -> Result<()> {
        let writer = self.writer.clone();
        let (url_field, content_field, tokens_field, timestamp_field) =
            (self.url_field, self.content_field, self.tokens_field, self.timestamp_field);

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut writer = writer.blocking_lock();
            writer.delete_term(Term::from_field_text(url_field, &document.url));
            writer.add_document(doc!(
                url_field => document.url,
                content_field => document.content,
                tokens_field => document.tokens.join(" "),
                timestamp_field => document.timestamp,
            ))?;
            writer.commit()?;
            Ok(())
        })
        .await
        .map_err(|e| crate::common::error::Error::Unknown(e.to_string()))?
    }

    /// Tokenize `query` the same way documents are tokenized, match against
    /// the `tokens` field, and return matching URLs ranked by relevance.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let index = self.index.clone();
        let reader = self.reader.clone();
        let (url_field, tokens_field) = (self.url_field, self.tokens_field);
        let normalized = tokenizer::tokenize_and_normalize(query).join(" ");

        tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let searcher = reader.searcher();
            let parser = QueryParser::for_index(&index, vec![tokens_field]);
            let parsed = parser.parse_query(&normalized)?;
            let top_docs = searcher.search(&parsed, &TopDocs::with_limit(limit))?;

            let mut urls = Vec::with_capacity(top_docs.len());
            for (_score, addr) in top_docs {
                let retrieved = searcher.doc(addr)?;
                if let Some(value) = retrieved.get_first(url_field) {
                    if let Some(text) = value.as_text() {
                        urls.push(text.to_string());
                    }
                }
            }
            Ok(urls)
        })
        .await
        .map_err(|e| crate::common::error::Error::Unknown(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn indexes_and_finds_document_by_token() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SearchBackend::open(dir.path().to_str().unwrap()).await.unwrap();

        backend
            .index(IndexDocument {
                url: "https://a.test/".to_string(),
                content: "The quick brown fox".to_string(),
                tokens: tokenizer::tokenize_and_normalize("The quick brown fox"),
                timestamp: 0,
            })
            .await
            .unwrap();

        let results = backend.search("quick fox", 10).await.unwrap();
        assert_eq!(results, vec!["https://a.test/".to_string()]);
    }

    #[tokio::test]
    async fn reindexing_same_url_overwrites_rather_than_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let backend = SearchBackend::open(dir.path().to_str().unwrap()).await.unwrap();

        for content in ["first version", "second version"] {
            backend
                .index(IndexDocument {
                    url: "https://a.test/doc".to_string(),
                    content: content.to_string(),
                    tokens: tokenizer::tokenize_and_normalize(content),
                    timestamp: 0,
                })
                .await
                .unwrap();
        }

        let results = backend.search("version", 10).await.unwrap();
        assert_eq!(results.len(), 1);
    }
}
