use anyhow::Result;
use chrono::DateTime;
use lettre::{
    message::header::ContentType,
    message::Mailbox,
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use log::info;

use crate::config::SmtpConfig;
use crate::error::PipelineError;

/// SMTP delivery for notification mail. Every notification goes out twice:
/// once to the fixed audit recipient and once to the granting user.
#[derive(Clone)]
pub struct Mailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
    audit_recipient: Mailbox,
}

impl Mailer {
    pub fn new(
        config: &SmtpConfig,
        sender_name: &str,
        sender_email: &str,
        audit_recipient: &str,
    ) -> Result<Self> {
        let transport = match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
                    .port(config.port)
                    .credentials(Credentials::new(username.clone(), password.clone()))
                    .build()
            }
            // Plain relay, the usual internal port-25 setup.
            _ => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .port(config.port)
                .build(),
        };

        let sender: Mailbox = format!("{} <{}>", sender_name, sender_email).parse()?;
        let audit_recipient: Mailbox = audit_recipient.parse()?;

        Ok(Mailer {
            transport,
            sender,
            audit_recipient,
        })
    }

    pub async fn send_notification(
        &self,
        actor: &str,
        subject: &str,
        html_body: &str,
    ) -> Result<(), PipelineError> {
        let actor_mailbox: Mailbox = actor
            .parse()
            .map_err(|e| PipelineError::transient("smtp", e))?;

        self.send_copy(self.audit_recipient.clone(), subject, html_body)
            .await?;
        self.send_copy(actor_mailbox, subject, html_body).await?;
        info!("sent notification to {} (audit copy included)", actor);
        Ok(())
    }

    async fn send_copy(
        &self,
        to: Mailbox,
        subject: &str,
        html_body: &str,
    ) -> Result<(), PipelineError> {
        let message = Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
            .map_err(|e| PipelineError::transient("smtp", e))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| PipelineError::transient("smtp", e))?;
        Ok(())
    }
}

/// Substitute `{{name}}` placeholders. Values are inserted verbatim, so
/// callers escape anything sourced from event payloads first.
pub fn render(template: &str, vars: &[(&str, String)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{{{}}}}}", name), value);
    }
    out
}

/// Minimal HTML escaping for values interpolated into the mail body.
pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Human-readable event time for the mail body, e.g. `Fri Mar 01, 12:34`.
/// Falls back to the raw string when the source timestamp fails to parse.
pub fn pretty_timestamp(rfc3339: &str) -> String {
    DateTime::parse_from_rfc3339(rfc3339)
        .map(|t| t.format("%a %b %d, %H:%M").to_string())
        .unwrap_or_else(|_| rfc3339.to_string())
}
