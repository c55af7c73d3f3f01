//! API middleware stack.
//!
//! Execution order (outermost to innermost):
//! 1. Actor extraction: rejects requests without an identity
//! 2. Access log: one line per request with actor, method, path and status

pub mod access_log;
pub mod actor;
