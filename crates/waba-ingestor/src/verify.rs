//! Webhook verify-token check (spec §4.F).

/// Outcome of checking an inbound webhook request against the configured
/// verify token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The configured token matched.
    Verified,
    /// No token is configured; accepted but flagged degraded.
    Degraded,
    /// A token is configured and the request's token didn't match.
    Rejected,
}

/// Check a `POST /webhook` request's token. Absence of a configured token
/// is degraded, not a hard failure (spec §4.F "Verification").
#[must_use]
pub fn check_webhook_token(configured: Option<&str>, provided: Option<&str>) -> VerifyOutcome {
    match configured {
        None => VerifyOutcome::Degraded,
        Some(token) => match provided {
            Some(p) if p == token => VerifyOutcome::Verified,
            _ => VerifyOutcome::Rejected,
        },
    }
}

/// `GET /webhook` verification challenge: only matches when a token is
/// configured and equals the request's token (spec §6).
#[must_use]
pub fn verify_challenge(configured: Option<&str>, provided: &str) -> bool {
    configured == Some(provided)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_configured_token_is_degraded_not_rejected() {
        assert_eq!(check_webhook_token(None, Some("x")), VerifyOutcome::Degraded);
        assert_eq!(check_webhook_token(None, None), VerifyOutcome::Degraded);
    }

    #[test]
    fn matching_token_is_verified() {
        assert_eq!(check_webhook_token(Some("secret"), Some("secret")), VerifyOutcome::Verified);
    }

    #[test]
    fn mismatched_token_is_rejected() {
        assert_eq!(check_webhook_token(Some("secret"), Some("wrong")), VerifyOutcome::Rejected);
        assert_eq!(check_webhook_token(Some("secret"), None), VerifyOutcome::Rejected);
    }

    #[test]
    fn challenge_only_echoes_on_exact_match() {
        assert!(verify_challenge(Some("secret"), "secret"));
        assert!(!verify_challenge(Some("secret"), "other"));
        assert!(!verify_challenge(None, "secret"));
    }
}
