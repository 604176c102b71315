use chrono::{DateTime, SecondsFormat, Utc};
use log::info;
use reqwest::Client;
use serde::Deserialize;

use crate::config::ReportsConfig;
use crate::error::PipelineError;

const PAGE_SIZE: u32 = 500;

/// Client for the identity provider's admin reports surface: the token
/// audit activity feed and the per-user token revocation endpoint.
#[derive(Clone)]
pub struct ReportsClient {
    client: Client,
    base_url: String,
    api_token: String,
}

/// One page of raw token-authorize activities.
#[derive(Debug, Deserialize)]
pub struct ActivityPage {
    #[serde(default)]
    pub items: Vec<Activity>,
    #[serde(rename = "nextPageToken")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Activity {
    pub id: Option<ActivityId>,
    pub actor: Option<Actor>,
    #[serde(default)]
    pub events: Vec<ActivityEvent>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityId {
    pub time: Option<String>,
    #[serde(rename = "uniqueQualifier")]
    pub unique_qualifier: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Actor {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ActivityEvent {
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Deserialize)]
pub struct Parameter {
    pub name: Option<String>,
    pub value: Option<String>,
    #[serde(rename = "multiValue", default)]
    pub multi_value: Vec<String>,
}

impl ActivityEvent {
    pub fn parameter_value(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.name.as_deref() == Some(name))
            .and_then(|p| p.value.as_deref())
    }

    pub fn parameter_multi_value(&self, name: &str) -> Option<&[String]> {
        self.parameters
            .iter()
            .find(|p| p.name.as_deref() == Some(name))
            .map(|p| p.multi_value.as_slice())
    }
}

impl ReportsClient {
    pub fn new(config: &ReportsConfig) -> Self {
        ReportsClient {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        }
    }

    /// Fetch one page of `authorize` token events in `[start, end)`.
    pub async fn list_authorizations(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page_token: Option<&str>,
    ) -> Result<ActivityPage, PipelineError> {
        let url = format!(
            "{}/admin/reports/v1/activity/users/all/applications/token",
            self.base_url
        );

        let start_time = start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let end_time = end.to_rfc3339_opts(SecondsFormat::Secs, true);
        let max_results = PAGE_SIZE.to_string();

        let mut request = self
            .client
            .get(url)
            .bearer_auth(&self.api_token)
            .query(&[
                ("eventName", "authorize"),
                ("startTime", start_time.as_str()),
                ("endTime", end_time.as_str()),
                ("maxResults", max_results.as_str()),
            ]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::transient("reports", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::transient(
                "reports",
                format!("activity list returned {}", status),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| PipelineError::transient("reports", e))
    }

    /// Revoke the token a user issued to a client. Best-effort from the
    /// caller's point of view; the error is surfaced as `Revocation`.
    pub async fn revoke_token(
        &self,
        user_key: &str,
        client_id: &str,
    ) -> Result<(), PipelineError> {
        let url = format!(
            "{}/admin/directory/v1/users/{}/tokens/{}",
            self.base_url, user_key, client_id
        );

        let response = self
            .client
            .delete(url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| PipelineError::Revocation {
                client_id: client_id.to_string(),
                detail: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Revocation {
                client_id: client_id.to_string(),
                detail: format!("delete returned {}", status),
            });
        }

        info!("revoked token {} for {}", client_id, user_key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_parses_items_and_token() {
        let raw = serde_json::json!({
            "items": [
                {
                    "id": {"time": "2024-03-01T12:00:00Z", "uniqueQualifier": "358068855354"},
                    "actor": {"email": "jane@example.com"},
                    "events": [{
                        "parameters": [
                            {"name": "client_id", "value": "abc"},
                            {"name": "app_name", "value": "Foo"},
                            {"name": "scope", "multiValue": ["s1", "s2"]}
                        ]
                    }]
                }
            ],
            "nextPageToken": "tok-2"
        });

        let page: ActivityPage = serde_json::from_value(raw).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.next_page_token.as_deref(), Some("tok-2"));

        let event = &page.items[0].events[0];
        assert_eq!(event.parameter_value("client_id"), Some("abc"));
        assert_eq!(event.parameter_value("app_name"), Some("Foo"));
        assert_eq!(
            event.parameter_multi_value("scope").unwrap(),
            &["s1".to_string(), "s2".to_string()]
        );
    }

    #[test]
    fn page_tolerates_missing_fields() {
        let page: ActivityPage = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_page_token.is_none());

        let sparse: Activity =
            serde_json::from_value(serde_json::json!({"events": [{}]})).unwrap();
        assert!(sparse.id.is_none());
        assert!(sparse.events[0].parameter_value("client_id").is_none());
    }
}
