use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::config::EsConfig;
use crate::error::PipelineError;
use crate::types::{EventDoc, NotificationRecord};

const SCROLL_PAGE_SIZE: usize = 1000;
const SCROLL_INITIAL_KEEPALIVE: &str = "2m";
const SCROLL_KEEPALIVE: &str = "1h";

/// Thin client for the event and state indices. The event index is written
/// with index-op semantics keyed by `unique_id` (repeat delivery is a no-op
/// overwrite); the state index is written create-if-absent so the storage
/// layer itself enforces dedup.
#[derive(Clone)]
pub struct EsClient {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: SearchHits,
}

#[derive(Deserialize)]
struct SearchHits {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(rename = "_source")]
    source: EventDoc,
}

impl EsClient {
    pub fn new(config: &EsConfig) -> Self {
        EsClient {
            client: Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
        }
    }

    /// Bulk-index one page of events into the given day shard. Per-item
    /// rejections are logged and skipped; they must not abort the cycle.
    /// Returns the number of accepted documents.
    pub async fn bulk_index(
        &self,
        index: &str,
        docs: &[EventDoc],
    ) -> Result<usize, PipelineError> {
        if docs.is_empty() {
            return Ok(0);
        }

        let body = bulk_body(index, docs);
        let response = self
            .client
            .post(format!("{}/_bulk", self.base_url))
            .header("content-type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| PipelineError::transient("elasticsearch", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::transient(
                "elasticsearch",
                format!("bulk request returned {}", status),
            ));
        }

        let bulk: BulkResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::transient("elasticsearch", e))?;

        let mut accepted = docs.len();
        if bulk.errors {
            let rejected = bulk
                .items
                .iter()
                .filter_map(|item| item.get("index"))
                .filter(|op| op.get("error").is_some())
                .count();
            accepted = accepted.saturating_sub(rejected);
            warn!(
                "bulk into {} rejected {} of {} documents",
                index,
                rejected,
                docs.len()
            );
        }
        Ok(accepted)
    }

    /// Scroll over every event in the lookback range, exhausting the
    /// server-side cursor before returning. The scroll context is cleared
    /// once the cursor runs dry.
    pub async fn scan_events(
        &self,
        index_pattern: &str,
        lookback_hours: i64,
    ) -> Result<Vec<EventDoc>, PipelineError> {
        let query = json!({
            "size": SCROLL_PAGE_SIZE,
            "query": {
                "bool": {
                    "must": [
                        {
                            "range": {
                                "event_timestamp": {
                                    "gte": format!("now-{}h", lookback_hours)
                                }
                            }
                        }
                    ]
                }
            }
        });

        let response = self
            .client
            .post(format!(
                "{}/{}/_search?scroll={}",
                self.base_url, index_pattern, SCROLL_INITIAL_KEEPALIVE
            ))
            .json(&query)
            .send()
            .await
            .map_err(|e| PipelineError::transient("elasticsearch", e))?;

        let mut page = self.read_search_response(response).await?;
        let mut docs: Vec<EventDoc> = Vec::new();
        docs.extend(page.hits.hits.into_iter().map(|hit| hit.source));

        while let Some(scroll_id) = page.scroll_id.take() {
            let response = self
                .client
                .post(format!("{}/_search/scroll", self.base_url))
                .json(&json!({
                    "scroll": SCROLL_KEEPALIVE,
                    "scroll_id": scroll_id,
                }))
                .send()
                .await
                .map_err(|e| PipelineError::transient("elasticsearch", e))?;

            page = self.read_search_response(response).await?;
            if page.hits.hits.is_empty() {
                let latest = page.scroll_id.clone().unwrap_or(scroll_id);
                self.clear_scroll(&latest).await;
                break;
            }
            docs.extend(page.hits.hits.into_iter().map(|hit| hit.source));
        }

        Ok(docs)
    }

    /// Existence probe for a dedup marker. A missing index answers 404 just
    /// like a missing document, which is exactly the "not seen" case.
    pub async fn exists(&self, index: &str, id: &str) -> Result<bool, PipelineError> {
        let response = self
            .client
            .head(format!("{}/{}/_doc/{}", self.base_url, index, id))
            .send()
            .await
            .map_err(|e| PipelineError::transient("elasticsearch", e))?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(PipelineError::transient(
                "elasticsearch",
                format!("existence check on {} returned {}", index, status),
            )),
        }
    }

    /// Create-if-absent marker write. Returns false when the marker already
    /// existed (409) — a concurrent or repeated write, not an error.
    pub async fn create_marker(
        &self,
        index: &str,
        id: &str,
        record: &NotificationRecord,
    ) -> Result<bool, PipelineError> {
        let response = self
            .client
            .put(format!(
                "{}/{}/_doc/{}?op_type=create",
                self.base_url, index, id
            ))
            .json(record)
            .send()
            .await
            .map_err(|e| PipelineError::transient("elasticsearch", e))?;

        match response.status() {
            StatusCode::CREATED | StatusCode::OK => Ok(true),
            StatusCode::CONFLICT => Ok(false),
            status => Err(PipelineError::transient(
                "elasticsearch",
                format!("marker create in {} returned {}", index, status),
            )),
        }
    }

    async fn read_search_response(
        &self,
        response: reqwest::Response,
    ) -> Result<SearchResponse, PipelineError> {
        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::transient(
                "elasticsearch",
                format!("search returned {}", status),
            ));
        }
        response
            .json()
            .await
            .map_err(|e| PipelineError::transient("elasticsearch", e))
    }

    async fn clear_scroll(&self, scroll_id: &str) {
        let result = self
            .client
            .delete(format!("{}/_search/scroll", self.base_url))
            .json(&json!({ "scroll_id": scroll_id }))
            .send()
            .await;
        if let Err(e) = result {
            debug!("failed to clear scroll context: {}", e);
        }
    }
}

/// Build the ndjson bulk body: one index-action line plus one source line
/// per document, `_id` pinned to the event's `unique_id`.
fn bulk_body(index: &str, docs: &[EventDoc]) -> String {
    let mut body = String::new();
    for doc in docs {
        let action = json!({
            "index": {
                "_index": index,
                "_id": doc.unique_id,
            }
        });
        body.push_str(&action.to_string());
        body.push('\n');
        body.push_str(&serde_json::to_string(doc).expect("event doc serializes"));
        body.push('\n');
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(unique_id: &str) -> EventDoc {
        EventDoc {
            client_id: "abc".to_string(),
            event_timestamp: "2024-03-01T12:00:00Z".to_string(),
            username: "jane".to_string(),
            detailed_scopes: vec![],
            scopes: vec![],
            unique_id: unique_id.to_string(),
            actor: "jane@example.com".to_string(),
            app_name: "Foo".to_string(),
        }
    }

    #[test]
    fn bulk_body_pairs_action_and_source_lines() {
        let body = bulk_body("grant-events-2024.03.01", &[doc("u1"), doc("u2")]);
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 4);

        let action: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(action["index"]["_index"], "grant-events-2024.03.01");
        assert_eq!(action["index"]["_id"], "u1");

        let source: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(source["unique_id"], "u1");
        assert_eq!(source["app_name"], "Foo");

        let second_action: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(second_action["index"]["_id"], "u2");
    }

    #[test]
    fn bulk_body_ends_with_newline() {
        let body = bulk_body("idx", &[doc("u1")]);
        assert!(body.ends_with('\n'));
    }
}
