//! Trace event entity (spec §3, §4.H).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only phase record emitted by every subsystem that has a
/// corresponding curated phase (spec §4.H lists the default set: run
/// boundaries, batch boundaries, send outcomes, rehost outcomes, webhook
/// effects, completion).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub trace_id: String,
    pub ts: DateTime<Utc>,
    pub campaign_id: Option<String>,
    pub step: String,
    pub phase: String,
    pub ok: bool,
    pub ms: Option<u64>,
    pub batch_index: Option<u64>,
    pub contact_id: Option<String>,
    /// Masked as `***` + last four digits before the event ever leaves the
    /// sink's caller (spec §4.H, §3).
    pub phone_masked: Option<String>,
    pub extra: serde_json::Value,
}

/// Mask a phone number as `***` + last four digits (spec §3 TraceEvent).
#[must_use]
pub fn mask_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() <= 4 {
        format!("***{digits}")
    } else {
        format!("***{}", &digits[digits.len() - 4..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_all_but_last_four_digits() {
        assert_eq!(mask_phone("+5511987654321"), "***4321");
        assert_eq!(mask_phone("123"), "***123");
        assert_eq!(mask_phone(""), "***");
    }
}
