use chrono::{DateTime, Utc};
use log::{info, warn};
use tokio::time::{sleep, Duration};

use common::config::CollectorConfig;
use common::error::PipelineError;
use common::es::EsClient;
use common::reports::{Activity, ActivityPage, ReportsClient};
use common::scopes::ScopeRegistry;
use common::types::AuthEvent;
use common::window::{day_index, query_window};

const PAGE_FETCH_ATTEMPTS: u32 = 3;
const PAGE_RETRY_BACKOFF: Duration = Duration::from_secs(10);

/// Windowed ingestion service: polls the token activity feed over a sliding
/// window, normalizes raw activities, and upserts them into the current
/// day's event shard keyed by `unique_id`, so repeated delivery across
/// overlapping windows is a no-op.
pub struct Collector {
    reports: ReportsClient,
    es: EsClient,
    registry: ScopeRegistry,
    index_prefix: String,
    lag_minutes: i64,
    historic_window_minutes: i64,
}

impl Collector {
    pub fn new(
        reports: ReportsClient,
        es: EsClient,
        registry: ScopeRegistry,
        config: &CollectorConfig,
    ) -> Self {
        Collector {
            reports,
            es,
            registry,
            index_prefix: config.index_prefix.clone(),
            lag_minutes: config.lag_minutes,
            historic_window_minutes: config.historic_window_minutes,
        }
    }

    pub async fn collect(&self, now: DateTime<Utc>, cycle: u64) -> anyhow::Result<()> {
        let (start, end) = query_window(now, self.lag_minutes, self.historic_window_minutes);
        info!("cycle={} collecting authorizations from {} to {}", cycle, start, end);

        let index = day_index(&self.index_prefix, now.date_naive());
        let mut page_token: Option<String> = None;
        let mut stored = 0usize;
        let mut skipped = 0usize;

        loop {
            let page = match self
                .fetch_page_with_retry(start, end, page_token.as_deref(), cycle)
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    // Remaining pages are left for the next cycle's
                    // overlapping window to pick up.
                    warn!("cycle={} abandoning remaining pages: {}", cycle, e);
                    break;
                }
            };

            let mut docs = Vec::with_capacity(page.items.len());
            for activity in &page.items {
                match normalize(activity, &self.registry) {
                    Ok(event) => docs.push(event.into_doc()),
                    Err(e) => {
                        skipped += 1;
                        warn!("cycle={} skipping activity: {}", cycle, e);
                    }
                }
            }

            let accepted = self.es.bulk_index(&index, &docs).await?;
            stored += accepted;
            info!("cycle={} bulk indexed {} events into {}", cycle, accepted, index);

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        info!(
            "cycle={} done: {} events stored, {} malformed skipped",
            cycle, stored, skipped
        );
        Ok(())
    }

    /// Bounded same-page retry: transient fetch failures back off a fixed
    /// 10 s and retry the same page token up to 3 attempts before the cycle
    /// gives up on its remaining pages.
    async fn fetch_page_with_retry(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page_token: Option<&str>,
        cycle: u64,
    ) -> Result<ActivityPage, PipelineError> {
        let mut attempt = 1;
        loop {
            match self.reports.list_authorizations(start, end, page_token).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() && attempt < PAGE_FETCH_ATTEMPTS => {
                    warn!(
                        "cycle={} page fetch attempt {}/{} failed, backing off: {}",
                        cycle, attempt, PAGE_FETCH_ATTEMPTS, e
                    );
                    sleep(PAGE_RETRY_BACKOFF).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Build an AuthEvent from one raw activity. Parameters are matched by name;
/// any missing field fails only this item, never the page.
fn normalize(activity: &Activity, registry: &ScopeRegistry) -> Result<AuthEvent, PipelineError> {
    let unique_id = activity
        .id
        .as_ref()
        .and_then(|id| id.unique_qualifier.clone())
        .ok_or_else(|| PipelineError::malformed("<unknown>", "id.uniqueQualifier"))?;

    let event_time = activity
        .id
        .as_ref()
        .and_then(|id| id.time.clone())
        .ok_or_else(|| PipelineError::malformed(unique_id.clone(), "id.time"))?;

    let actor = activity
        .actor
        .as_ref()
        .and_then(|actor| actor.email.clone())
        .ok_or_else(|| PipelineError::malformed(unique_id.clone(), "actor.email"))?;

    let event = activity
        .events
        .first()
        .ok_or_else(|| PipelineError::malformed(unique_id.clone(), "events"))?;

    let client_id = event
        .parameter_value("client_id")
        .ok_or_else(|| PipelineError::malformed(unique_id.clone(), "client_id"))?
        .to_string();

    let app_name = event
        .parameter_value("app_name")
        .ok_or_else(|| PipelineError::malformed(unique_id.clone(), "app_name"))?
        .to_string();

    let granted = event
        .parameter_multi_value("scope")
        .ok_or_else(|| PipelineError::malformed(unique_id.clone(), "scope"))?;

    let scopes = registry.filter_granted(granted);

    Ok(AuthEvent {
        app_name,
        client_id,
        unique_id,
        actor,
        scopes,
        event_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ScopeRegistry {
        ScopeRegistry::from_json(r#"{"s1": {"Description": "d1", "Weight": 5}}"#).unwrap()
    }

    fn activity(json: serde_json::Value) -> Activity {
        serde_json::from_value(json).unwrap()
    }

    fn full_activity() -> serde_json::Value {
        serde_json::json!({
            "id": {"time": "2024-03-01T12:00:00Z", "uniqueQualifier": "u1"},
            "actor": {"email": "jane@example.com"},
            "events": [{
                "parameters": [
                    {"name": "client_id", "value": "abc"},
                    {"name": "app_name", "value": "Foo"},
                    {"name": "scope", "multiValue": ["s1", "unknown-scope"]}
                ]
            }]
        })
    }

    #[test]
    fn normalize_builds_event_with_registry_filtered_scopes() {
        let event = normalize(&activity(full_activity()), &registry()).unwrap();
        assert_eq!(event.app_name, "Foo");
        assert_eq!(event.client_id, "abc");
        assert_eq!(event.unique_id, "u1");
        assert_eq!(event.actor, "jane@example.com");
        assert_eq!(event.event_time, "2024-03-01T12:00:00Z");
        // The unknown scope never makes it into the stored event.
        assert_eq!(event.scopes.len(), 1);
        assert_eq!(event.scopes[0].scope, "s1");
        assert_eq!(event.scopes[0].description, "d1");
        assert_eq!(event.scopes[0].weight, 5);
    }

    #[test]
    fn normalize_fails_item_on_missing_client_id() {
        let mut raw = full_activity();
        raw["events"][0]["parameters"][0] =
            serde_json::json!({"name": "something_else", "value": "x"});
        let err = normalize(&activity(raw), &registry()).unwrap_err();
        match err {
            PipelineError::MalformedPayload { unique_id, field } => {
                assert_eq!(unique_id, "u1");
                assert_eq!(field, "client_id");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn normalize_fails_item_on_missing_actor() {
        let mut raw = full_activity();
        raw["actor"] = serde_json::json!({});
        let err = normalize(&activity(raw), &registry()).unwrap_err();
        match err {
            PipelineError::MalformedPayload { field, .. } => assert_eq!(field, "actor.email"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn normalize_fails_item_without_unique_id() {
        let mut raw = full_activity();
        raw["id"] = serde_json::json!({"time": "2024-03-01T12:00:00Z"});
        let err = normalize(&activity(raw), &registry()).unwrap_err();
        match err {
            PipelineError::MalformedPayload { unique_id, field } => {
                assert_eq!(unique_id, "<unknown>");
                assert_eq!(field, "id.uniqueQualifier");
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
