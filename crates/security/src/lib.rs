//! Security layer for switchyard.
//!
//! Every routing decision and every permission transition is written to an
//! append-only audit trail so a capability grant can always be traced back
//! to the approval that produced it.

pub mod audit;

pub use audit::{AuditEntry, AuditEvent, AuditLog, AuditOutcome, AuditSink, TracingSink};
