use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use common::config::NotifierConfig;
use common::es::EsClient;
use common::mail::{escape_html, pretty_timestamp, render, Mailer};
use common::policy::{Decision, PolicyLists};
use common::reports::ReportsClient;
use common::scopes::ScopeRegistry;
use common::types::{EventDoc, NotificationRecord, ScopeDescriptor};
use common::window::{day_index, marker_indices};

/// The two HTML bodies a notification can carry, loaded once at startup.
pub struct Templates {
    pub default: String,
    pub blacklist: String,
}

/// Which irreversible side effects one decision entails. Factored out of
/// the event loop so the mapping stays a pure, testable table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionPlan {
    pub revoke: bool,
    pub mail: Option<MailTemplate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailTemplate {
    Default,
    Blacklist,
}

impl ActionPlan {
    pub fn for_decision(decision: Decision) -> Self {
        match decision {
            Decision::Whitelisted => ActionPlan {
                revoke: false,
                mail: None,
            },
            Decision::Blacklisted => ActionPlan {
                revoke: true,
                mail: Some(MailTemplate::Blacklist),
            },
            Decision::Unclassified => ActionPlan {
                revoke: false,
                mail: Some(MailTemplate::Default),
            },
        }
    }
}

/// Notification engine: pulls candidate grants from the event index over a
/// rolling lookback, skips anything already marked in the state index,
/// classifies the rest, executes side effects, and writes the dedup marker
/// only after the side effects were attempted — at-least-once by design.
pub struct Notifier {
    reports: ReportsClient,
    es: EsClient,
    registry: ScopeRegistry,
    policy: PolicyLists,
    mailer: Mailer,
    templates: Templates,
    data_index_prefix: String,
    state_index_prefix: String,
    lookback_hours: i64,
}

impl Notifier {
    pub fn new(
        reports: ReportsClient,
        es: EsClient,
        registry: ScopeRegistry,
        policy: PolicyLists,
        mailer: Mailer,
        templates: Templates,
        config: &NotifierConfig,
    ) -> Self {
        Notifier {
            reports,
            es,
            registry,
            policy,
            mailer,
            templates,
            data_index_prefix: config.data_index_prefix.clone(),
            state_index_prefix: config.state_index_prefix.clone(),
            lookback_hours: config.lookback_hours,
        }
    }

    pub async fn notify(&self, now: DateTime<Utc>, cycle: u64) -> anyhow::Result<()> {
        let pattern = format!("{}-*", self.data_index_prefix);
        let docs = self.es.scan_events(&pattern, self.lookback_hours).await?;
        info!("cycle={} authorizations received: {}", cycle, docs.len());

        let today = now.date_naive();
        let probe_indices = marker_indices(&self.state_index_prefix, today);
        let marker_index = day_index(&self.state_index_prefix, today);

        let total = docs.len();
        let mut fresh = 0usize;
        let mut suppressed = 0usize;

        for doc in docs {
            if self.seen(&probe_indices, &doc.unique_id).await? {
                suppressed += 1;
                continue;
            }

            let decision = self.policy.classify(&doc.client_id, &doc.app_name);
            let plan = ActionPlan::for_decision(decision);
            debug!(
                "cycle={} {} by {} classified {:?}",
                cycle, doc.app_name, doc.actor, decision
            );

            if plan.revoke {
                // Best-effort: a failed revocation never blocks the mail
                // or the marker.
                if let Err(e) = self.reports.revoke_token(&doc.actor, &doc.client_id).await {
                    warn!("cycle={} {}", cycle, e);
                }
            }

            if let Some(which) = plan.mail {
                let template = match which {
                    MailTemplate::Default => &self.templates.default,
                    MailTemplate::Blacklist => &self.templates.blacklist,
                };
                self.send_mail(&doc, template).await?;
            }

            let record = NotificationRecord {
                event_timestamp: doc.event_timestamp.clone(),
            };
            let created = self
                .es
                .create_marker(&marker_index, &doc.unique_id, &record)
                .await?;
            if !created {
                debug!(
                    "cycle={} marker for {} already present",
                    cycle, doc.unique_id
                );
            }
            fresh += 1;
        }

        info!(
            "cycle={} {} new authorizations out of {} received, {} already processed",
            cycle, fresh, total, suppressed
        );
        Ok(())
    }

    /// Dedup probe across the trailing three day-shards of the state index.
    async fn seen(&self, indices: &[String], unique_id: &str) -> anyhow::Result<bool> {
        for index in indices {
            if self.es.exists(index, unique_id).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn send_mail(&self, doc: &EventDoc, template: &str) -> anyhow::Result<()> {
        let scopes = self.registry.rejoin_descriptions(&doc.scopes);
        let body = render(
            template,
            &[
                ("actor", escape_html(&doc.actor)),
                ("app_name", escape_html(&doc.app_name)),
                ("timestamp", escape_html(&pretty_timestamp(&doc.event_timestamp))),
                ("scope_rows", scope_rows(&scopes)),
            ],
        );
        self.mailer
            .send_notification(&doc.actor, &subject(&doc.app_name), &body)
            .await?;
        Ok(())
    }
}

fn subject(app_name: &str) -> String {
    format!("[Notification] You have authorized {} access", app_name)
}

fn scope_rows(scopes: &[ScopeDescriptor]) -> String {
    scopes
        .iter()
        .map(|s| {
            format!(
                "<li><strong>{}</strong> ({}, weight {})</li>",
                escape_html(&s.description),
                escape_html(&s.scope),
                s.weight
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelisted_grants_get_no_side_effects() {
        let plan = ActionPlan::for_decision(Decision::Whitelisted);
        assert!(!plan.revoke);
        assert!(plan.mail.is_none());
    }

    #[test]
    fn blacklisted_grants_are_revoked_and_mailed() {
        let plan = ActionPlan::for_decision(Decision::Blacklisted);
        assert!(plan.revoke);
        assert_eq!(plan.mail, Some(MailTemplate::Blacklist));
    }

    #[test]
    fn unclassified_grants_are_mailed_only() {
        let plan = ActionPlan::for_decision(Decision::Unclassified);
        assert!(!plan.revoke);
        assert_eq!(plan.mail, Some(MailTemplate::Default));
    }

    #[test]
    fn subject_names_the_app() {
        assert_eq!(
            subject("Foo"),
            "[Notification] You have authorized Foo access"
        );
    }

    #[test]
    fn scope_rows_render_description_uri_and_weight() {
        let scopes = vec![ScopeDescriptor {
            scope: "s1".to_string(),
            description: "Read <mail>".to_string(),
            weight: 5,
        }];
        let rows = scope_rows(&scopes);
        assert_eq!(
            rows,
            "<li><strong>Read &lt;mail&gt;</strong> (s1, weight 5)</li>"
        );
    }
}
