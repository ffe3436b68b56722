//! Opaque string identifiers.
//!
//! Spec §6: "All ids are string identifiers (UUID or short opaque)." We
//! always mint UUIDv4 and carry them as `String` at the API boundary so
//! callers never need to parse or validate id shape.

use uuid::Uuid;

/// Mint a fresh opaque identifier.
#[must_use]
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
