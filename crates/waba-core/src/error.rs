//! Error taxonomy shared by every component of the messaging automation core.
//!
//! The kinds here are a closed set (spec §7): callers branch on them
//! exhaustively instead of inspecting provider-specific payloads.

use thiserror::Error;

/// Result type alias used across the core crates.
pub type Result<T> = std::result::Result<T, Error>;

/// The messaging automation core's error taxonomy.
///
/// Each variant maps to a propagation policy (recovered locally vs.
/// surfaced to the caller) and, at the HTTP boundary, a status code.
/// See `waba-server::error` for the `IntoResponse` mapping.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Request or payload failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation would violate a state machine invariant.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A second `waiting` conversation was requested for (workflow_id, phone).
    #[error("conversation conflict for workflow {workflow_id} phone {phone}")]
    ConversationConflict {
        /// The workflow whose conversation slot is already occupied.
        workflow_id: String,
        /// The phone number already holding a waiting conversation.
        phone: String,
    },

    /// The upstream provider signalled it is throttling this sender.
    #[error("rate limited by provider")]
    RateLimited,

    /// The provider rejected a stale media URL.
    #[error("media expired: {0}")]
    MediaExpired(String),

    /// The provider rejected the message on policy/quality grounds.
    #[error("policy rejected: {0}")]
    PolicyRejected(String),

    /// The provider rejected the request as unauthenticated/unauthorized.
    #[error("auth error: {0}")]
    Auth(String),

    /// A transient failure (network, 5xx) that is safe to retry.
    #[error("transient error: {0}")]
    Transient(String),

    /// A permanent failure (malformed payload, unknown recipient).
    #[error("permanent error: {0}")]
    Permanent(String),

    /// A backing table is missing; the owning subsystem should self-disable.
    #[error("missing table: {0}")]
    MissingTable(String),

    /// Serialization/deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for infrastructure failures that don't fit the taxonomy.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the error class is safe for bounded local retry.
    ///
    /// Matches spec §7: `rate_limited` and `transient` are recovered
    /// locally; `media_expired` is recovered via a single rehost retry
    /// (callers handle that separately, see `waba-precheck`).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RateLimited | Error::Transient(_))
    }

    /// True when the owning subsystem should self-disable rather than fail
    /// the caller's request (spec §7: `missing_table` degrades, doesn't crash).
    #[must_use]
    pub fn is_degradable(&self) -> bool {
        matches!(self, Error::MissingTable(_))
    }
}

/// The provider error classification taxonomy (spec §4.A).
///
/// This is the *only* vocabulary higher layers are allowed to branch on;
/// the Provider Client is the sole interpreter of raw provider payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorClass {
    /// The call succeeded.
    Ok,
    /// The provider is throttling this sender.
    RateLimited,
    /// A header media URL has expired.
    MediaExpired,
    /// Template category/quality rejection.
    PolicyRejected,
    /// Network or 5xx failure.
    Transient,
    /// Token invalid/expired.
    Auth,
    /// Malformed payload or unknown recipient.
    Permanent,
}

impl ProviderErrorClass {
    /// Convert a classified provider outcome into the shared error taxonomy,
    /// given a human-readable detail string for non-`Ok` classes.
    #[must_use]
    pub fn into_error(self, detail: impl Into<String>) -> Option<Error> {
        let detail = detail.into();
        match self {
            ProviderErrorClass::Ok => None,
            ProviderErrorClass::RateLimited => Some(Error::RateLimited),
            ProviderErrorClass::MediaExpired => Some(Error::MediaExpired(detail)),
            ProviderErrorClass::PolicyRejected => Some(Error::PolicyRejected(detail)),
            ProviderErrorClass::Transient => Some(Error::Transient(detail)),
            ProviderErrorClass::Auth => Some(Error::Auth(detail)),
            ProviderErrorClass::Permanent => Some(Error::Permanent(detail)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classes() {
        assert!(Error::RateLimited.is_retryable());
        assert!(Error::Transient("x".into()).is_retryable());
        assert!(!Error::Permanent("x".into()).is_retryable());
        assert!(!Error::Auth("x".into()).is_retryable());
    }

    #[test]
    fn degradable_classes() {
        assert!(Error::MissingTable("campaign_trace_events".into()).is_degradable());
        assert!(!Error::Conflict("x".into()).is_degradable());
    }

    #[test]
    fn provider_class_conversion() {
        assert!(ProviderErrorClass::Ok.into_error("").is_none());
        assert!(matches!(
            ProviderErrorClass::RateLimited.into_error(""),
            Some(Error::RateLimited)
        ));
        assert!(matches!(
            ProviderErrorClass::MediaExpired.into_error("header image"),
            Some(Error::MediaExpired(_))
        ));
    }
}
