//! Template Precheck & Media Rehost (spec §4.G).

pub mod binding;
pub mod phone;
pub mod precheck;
pub mod rehost;

pub use binding::{missing_bindings, resolve_binding};
pub use phone::normalize_e164;
pub use precheck::{precheck as precheck_contact, PrecheckResult};
pub use rehost::{rehost, RehostContext};
