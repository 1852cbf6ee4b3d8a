//! Client for the Task Bus (TB): the external durable queue service backing
//! the `crawler` and `indexer` logical queues, with at-least-once delivery
//! and a visibility timeout (spec.md §6). Backed by AWS SQS, matching
//! `SQS_QUEUE_URL` / `SQS_INDEXER_QUEUE_URL` / `AWS_REGION` and the original
//! Celery-over-SQS broker configuration in `tasks.py`.

use crate::common::error::{Error, Result};
use aws_sdk_sqs::Client;
use serde::{Deserialize, Serialize};

const RECEIVE_WAIT_SECS: i32 = 10;

/// Wire body matching spec.md §6's literal `{task: "crawl_page", args:
/// [url, depth]}` shape. Task identity is carried by SQS's own message id,
/// not duplicated into the body.
#[derive(Debug, Serialize, Deserialize)]
struct CrawlMessage {
    task: String,
    args: (String, usize),
}

/// Wire body matching spec.md §6's `{task: "index_content", args: [url,
/// depth, text_key]}` shape.
#[derive(Debug, Serialize, Deserialize)]
struct IndexMessage {
    task: String,
    args: (String, usize, String),
}

/// A crawl task received from the bus, with its receipt handle for the
/// eventual `ack`.
#[derive(Debug, Clone)]
pub struct CrawlTask {
    pub task_id: String,
    pub url: String,
    pub depth: usize,
    pub receipt_handle: String,
}

/// An index task received from the bus.
#[derive(Debug, Clone)]
pub struct IndexTask {
    pub task_id: String,
    pub url: String,
    pub depth: usize,
    pub text_key: String,
    pub receipt_handle: String,
}

#[derive(Clone)]
pub struct TaskBus {
    client: Client,
    crawler_queue_url: String,
    indexer_queue_url: String,
    visibility_timeout_secs: i32,
}

impl TaskBus {
    pub async fn connect(
        region: &str,
        crawler_queue_url: String,
        indexer_queue_url: String,
        visibility_timeout_secs: i32,
    ) -> Self {
        let region_provider = aws_config::Region::new(region.to_string());
        let shared_config = aws_config::from_env().region(region_provider).load().await;
        let client = Client::new(&shared_config);
        Self {
            client,
            crawler_queue_url,
            indexer_queue_url,
            visibility_timeout_secs,
        }
    }

    /// Publish `crawl_page(url, depth)`. Returns SQS's own message id, used
    /// as the task identity. Invariant (spec.md §4.1): the caller must only
    /// mark `url` as crawled after this succeeds.
    pub async fn publish_crawl(&self, url: &str, depth: usize) -> Result<String> {
        let body = serde_json::to_string(&CrawlMessage {
            task: "crawl_page".to_string(),
            args: (url.to_string(), depth),
        })
        .map_err(|e| Error::TaskBusError(e.to_string()))?;

        let resp = self
            .client
            .send_message()
            .queue_url(&self.crawler_queue_url)
            .message_body(body)
            .send()
            .await?;

        Ok(resp.message_id.unwrap_or_default())
    }

    /// Publish `index_content(url, depth, text_key)`. Must be called before
    /// the crawl worker writes `finished_crawls` (spec.md §5's ordering
    /// guarantee), so a reaped crawler still leaves the indexing job behind.
    pub async fn publish_index(&self, url: &str, depth: usize, text_key: &str) -> Result<String> {
        let body = serde_json::to_string(&IndexMessage {
            task: "index_content".to_string(),
            args: (url.to_string(), depth, text_key.to_string()),
        })
        .map_err(|e| Error::TaskBusError(e.to_string()))?;

        let resp = self
            .client
            .send_message()
            .queue_url(&self.indexer_queue_url)
            .message_body(body)
            .send()
            .await?;

        Ok(resp.message_id.unwrap_or_default())
    }

    /// Long-poll for the next crawl task. Returns `None` if nothing arrived
    /// within the wait window.
    pub async fn receive_crawl(&self) -> Result<Option<CrawlTask>> {
        let resp = self
            .client
            .receive_message()
            .queue_url(&self.crawler_queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(RECEIVE_WAIT_SECS)
            .visibility_timeout(self.visibility_timeout_secs)
            .send()
            .await?;

        let Some(msg) = resp.messages.unwrap_or_default().into_iter().next() else {
            return Ok(None);
        };
        let task_id = msg
            .message_id
            .ok_or_else(|| Error::TaskBusError("message has no message id".into()))?;
        let body = msg.body.ok_or_else(|| Error::TaskBusError("message has no body".into()))?;
        let receipt_handle = msg
            .receipt_handle
            .ok_or_else(|| Error::TaskBusError("message has no receipt handle".into()))?;
        let parsed: CrawlMessage =
            serde_json::from_str(&body).map_err(|e| Error::TaskBusError(e.to_string()))?;

        Ok(Some(CrawlTask {
            task_id,
            url: parsed.args.0,
            depth: parsed.args.1,
            receipt_handle,
        }))
    }

    /// Long-poll for the next index task.
    pub async fn receive_index(&self) -> Result<Option<IndexTask>> {
        let resp = self
            .client
            .receive_message()
            .queue_url(&self.indexer_queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(RECEIVE_WAIT_SECS)
            .visibility_timeout(self.visibility_timeout_secs)
            .send()
            .await?;

        let Some(msg) = resp.messages.unwrap_or_default().into_iter().next() else {
            return Ok(None);
        };
        let task_id = msg
            .message_id
            .ok_or_else(|| Error::TaskBusError("message has no message id".into()))?;
        let body = msg.body.ok_or_else(|| Error::TaskBusError("message has no body".into()))?;
        let receipt_handle = msg
            .receipt_handle
            .ok_or_else(|| Error::TaskBusError("message has no receipt handle".into()))?;
        let parsed: IndexMessage =
            serde_json::from_str(&body).map_err(|e| Error::TaskBusError(e.to_string()))?;

        Ok(Some(IndexTask {
            task_id,
            url: parsed.args.0,
            depth: parsed.args.1,
            text_key: parsed.args.2,
            receipt_handle,
        }))
    }

    /// Ack a crawl message. Only a clean return from the task body should
    /// reach this call (spec.md §7) — on error the message is left
    /// unacked so TB redelivers it after the visibility timeout.
    pub async fn ack_crawl(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.crawler_queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await?;
        Ok(())
    }

    pub async fn ack_index(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.indexer_queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crawl_message_round_trips_through_json() {
        let msg = CrawlMessage {
            task: "crawl_page".to_string(),
            args: ("https://a.test/".to_string(), 2),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"crawl_page\""));
        assert!(!json.contains("task_id"));
        let parsed: CrawlMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.args.0, "https://a.test/");
        assert_eq!(parsed.args.1, 2);
    }

    #[test]
    fn index_message_matches_spec_wire_shape() {
        let msg = IndexMessage {
            task: "index_content".to_string(),
            args: ("https://a.test/".to_string(), 1, "crawled/a.test/x.txt".to_string()),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["task"], "index_content");
        assert_eq!(parsed["args"][0], "https://a.test/");
        assert_eq!(parsed["args"][1], 1);
        assert_eq!(parsed["args"][2], "crawled/a.test/x.txt");
    }
}
