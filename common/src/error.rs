//! Error taxonomy for the ingestion and notification pipelines.
//!
//! Transient failures are retried with a bounded backoff on the collector's
//! pagination path and otherwise fail the cycle. Malformed payloads
//! invalidate only the offending item. Revocation failures are logged and
//! never block the accompanying notification. Duplicate suppression is not
//! an error at all; it is counted by the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("transient failure talking to {service}: {detail}")]
    Transient { service: &'static str, detail: String },

    #[error("malformed activity {unique_id}: missing {field}")]
    MalformedPayload { unique_id: String, field: &'static str },

    #[error("token revocation failed for client {client_id}: {detail}")]
    Revocation { client_id: String, detail: String },
}

impl PipelineError {
    pub fn transient(service: &'static str, err: impl std::fmt::Display) -> Self {
        PipelineError::Transient {
            service,
            detail: err.to_string(),
        }
    }

    pub fn malformed(unique_id: impl Into<String>, field: &'static str) -> Self {
        PipelineError::MalformedPayload {
            unique_id: unique_id.into(),
            field,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::Transient { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_is_distinguished() {
        let err = PipelineError::transient("reports", "connection refused");
        assert!(err.is_transient());
        assert!(err.to_string().contains("reports"));

        let err = PipelineError::malformed("u1", "client_id");
        assert!(!err.is_transient());
        assert_eq!(
            err.to_string(),
            "malformed activity u1: missing client_id"
        );
    }
}
