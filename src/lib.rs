//! LaunchGate Library
//!
//! Admission gate and position tracker for AI-proposed token deployments

pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod gate;
pub mod market;
pub mod paper_trading;
pub mod persistence;
pub mod summary;
pub mod tracker;
pub mod types;

#[cfg(feature = "dashboard")]
pub mod dashboard;
