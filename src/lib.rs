//! Derivative Escrow
//!
//! Price-triggered binary derivative escrow engine with an asynchronous
//! oracle settlement path.

pub mod config;
pub mod escrow;

pub use config::EngineConfig;
