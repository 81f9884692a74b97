//! Continuous glucose monitoring session engine
//!
//! Simulated sensor feed, trend classification, threshold alerting and
//! time-in-range / GMI metrics, served over HTTP and WebSocket.
//!
//! ⚠️ DISCLAIMER:
//! This system is NOT a medical device. Simulated values must never be
//! used for treatment decisions.

pub mod alerts;
pub mod config;
pub mod controller;
pub mod error;
pub mod fhir;
pub mod generator;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod state;
pub mod store;
pub mod trend;
pub mod validation;
pub mod websocket;

pub use controller::CgmController;
pub use error::{AppError, AppResult};
