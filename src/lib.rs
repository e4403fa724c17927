//! Admin Diagnostics Library
//!
//! An authenticated HTTP endpoint that lets an administrator run a small,
//! fixed set of diagnostic operations and returns the result as JSON.
//! Caller input is only ever used as a lookup key into an immutable
//! registry; it is never passed to a program, a shell or a file path.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod server;
pub mod tools;
