//! Shared plumbing for the demo binary and its example scenarios. Not
//! meant to be depended on outside this crate.

pub mod tracing_init;
