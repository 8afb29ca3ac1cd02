//! Integration test suite for the Cirrus wallet engine.
//!
//! Exercises the engine through its public API: payment scenarios,
//! concurrent builds sharing one ledger, conservation and fee properties
//! under randomized inputs, and crash-safety of the commit pipeline.

pub mod helpers;
