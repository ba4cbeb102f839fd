//! Docgate - Rate-Gated Document Submission
//!
//! This crate submits documents to a single HTTP endpoint while capping the
//! number of calls per time window across every concurrent caller in the
//! process. One [`gate::RateGate`] is built per endpoint and shared by all
//! [`client::SubmissionClient`]s that target it.

pub mod client;
pub mod config;
pub mod document;
pub mod error;
pub mod gate;
