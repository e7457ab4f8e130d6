//! External metrics provider for the scaling control plane.
//!
//! Exposes the pulled `getMetric` surface an external autoscaler polls
//! (spec §4.E), backed by the same trigger registry and `Scaler` contract
//! the reconcile loop uses, plus a short-lived read-through cache so bursts
//! from the autoscaler's own poll loop don't retrigger a live sample every
//! time. Runs inside the controller process rather than as its own binary.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod registry;
pub mod state;

pub use config::Config;
pub use error::{ProviderError, Result};
pub use registry::{PolicyRegistry, PolicySnapshot};
pub use state::AppState;
