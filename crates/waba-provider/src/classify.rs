//! The provider error classifier (spec §4.A).
//!
//! This is the sole interpreter of WhatsApp Business Cloud API error
//! shapes; every other crate branches on [`waba_core::ProviderErrorClass`].

use waba_core::ProviderErrorClass;

/// Classify an HTTP response into the closed taxonomy.
///
/// `body` is the parsed JSON response, when present; the provider nests
/// its error object at `error.code` / `error.error_subcode` /
/// `error.type`. Unrecognized shapes fall back to `status`-based rules so
/// a schema change degrades to a coarse class rather than panicking.
#[must_use]
pub fn classify_status(status: u16, body: Option<&serde_json::Value>) -> ProviderErrorClass {
    if (200..300).contains(&status) {
        return ProviderErrorClass::Ok;
    }

    let error = body.and_then(|b| b.get("error"));
    let code = error.and_then(|e| e.get("code")).and_then(|v| v.as_i64());
    let subcode = error
        .and_then(|e| e.get("error_subcode"))
        .and_then(|v| v.as_i64());
    let error_type = error
        .and_then(|e| e.get("type"))
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    match (status, code, subcode, error_type) {
        // Rate limiting: 429, or the app/account-level throttling codes.
        (429, ..) | (_, Some(4), ..) | (_, Some(80007), ..) => ProviderErrorClass::RateLimited,

        // Expired/forbidden header media URL.
        (403, _, _, "OAuthException") if subcode == Some(2018318) => {
            ProviderErrorClass::MediaExpired
        }
        (403, Some(131052), ..) => ProviderErrorClass::MediaExpired,

        // Template category/quality rejections.
        (_, Some(131049), ..) | (_, Some(132000), ..) | (_, Some(132001), ..) => {
            ProviderErrorClass::PolicyRejected
        }

        // Auth: invalid/expired token.
        (401, ..) | (_, Some(190), ..) => ProviderErrorClass::Auth,

        // Malformed payload or unknown recipient.
        (400, Some(131026), ..) | (400, Some(100), ..) => ProviderErrorClass::Permanent,

        // Network/5xx: safe to retry.
        (500..=599, ..) => ProviderErrorClass::Transient,

        // Anything else unrecognized is treated conservatively as permanent
        // so the dispatcher doesn't retry a request that will never succeed.
        _ => ProviderErrorClass::Permanent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ok_range() {
        assert_eq!(classify_status(200, None), ProviderErrorClass::Ok);
        assert_eq!(classify_status(201, None), ProviderErrorClass::Ok);
    }

    #[test]
    fn rate_limited_by_status() {
        assert_eq!(classify_status(429, None), ProviderErrorClass::RateLimited);
    }

    #[test]
    fn rate_limited_by_code() {
        let body = json!({"error": {"code": 4, "message": "app rate limit"}});
        assert_eq!(
            classify_status(400, Some(&body)),
            ProviderErrorClass::RateLimited
        );
    }

    #[test]
    fn media_expired_by_subcode() {
        let body = json!({"error": {"code": 100, "type": "OAuthException", "error_subcode": 2018318}});
        assert_eq!(
            classify_status(403, Some(&body)),
            ProviderErrorClass::MediaExpired
        );
    }

    #[test]
    fn policy_rejected_by_code() {
        let body = json!({"error": {"code": 131049}});
        assert_eq!(
            classify_status(400, Some(&body)),
            ProviderErrorClass::PolicyRejected
        );
    }

    #[test]
    fn auth_by_status_or_code() {
        assert_eq!(classify_status(401, None), ProviderErrorClass::Auth);
        let body = json!({"error": {"code": 190}});
        assert_eq!(classify_status(400, Some(&body)), ProviderErrorClass::Auth);
    }

    #[test]
    fn transient_on_5xx() {
        assert_eq!(classify_status(503, None), ProviderErrorClass::Transient);
    }

    #[test]
    fn unrecognized_shape_is_permanent_not_a_panic() {
        assert_eq!(classify_status(400, None), ProviderErrorClass::Permanent);
    }
}
