use serde::{Deserialize, Serialize};

/// One scope granted to a third-party app, enriched from the scope registry.
/// Wire keys keep the capitalized schema the stored documents use.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScopeDescriptor {
    #[serde(rename = "Scope")]
    pub scope: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Weight")]
    pub weight: i64,
}

/// An OAuth authorization grant as normalized from the reports API.
/// `unique_id` is stable across repeated fetches of the same grant and
/// doubles as the storage document id and the notification dedup key.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthEvent {
    pub app_name: String,
    pub client_id: String,
    pub unique_id: String,
    pub actor: String,
    pub scopes: Vec<ScopeDescriptor>,
    pub event_time: String,
}

/// Stored shape of an authorization event in the event index.
/// `username` is the actor's local part; `scopes` is the flat list of
/// scope descriptions alongside the full `detailed_scopes`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EventDoc {
    pub client_id: String,
    pub event_timestamp: String,
    pub username: String,
    pub detailed_scopes: Vec<ScopeDescriptor>,
    pub scopes: Vec<String>,
    pub unique_id: String,
    pub actor: String,
    pub app_name: String,
}

/// Dedup marker written to the state index once a grant has been acted on.
/// Stored under id = `unique_id`; its existence means "never act again".
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NotificationRecord {
    pub event_timestamp: String,
}

impl AuthEvent {
    pub fn into_doc(self) -> EventDoc {
        let username = self
            .actor
            .split('@')
            .next()
            .unwrap_or_default()
            .to_string();
        let scopes = self.scopes.iter().map(|s| s.description.clone()).collect();
        EventDoc {
            client_id: self.client_id,
            event_timestamp: self.event_time,
            username,
            detailed_scopes: self.scopes,
            scopes,
            unique_id: self.unique_id,
            actor: self.actor,
            app_name: self.app_name,
        }
    }
}
