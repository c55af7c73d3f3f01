//! Certification gate: lifecycle graph, readiness evaluation, the certify
//! operation and certificate rendering.

pub mod readiness;
pub mod render;
pub mod service;
pub mod state;

pub use readiness::{check_readiness, Blocker, BlockerType, ReadinessCounts, ReadinessReport};
pub use service::{certify, CertificationOutcome};
pub use state::{advance_application, can_transition, next_status, validate_transition};
