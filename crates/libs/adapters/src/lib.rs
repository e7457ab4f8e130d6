//! Trigger adapter registry and a representative set of adapters.
//!
//! The full catalogue (spec names ~60 kinds: RabbitMQ, Kafka, SQS, Azure
//! Monitor, Prometheus, NewRelic, Solr, Datadog, Splunk, …) is out of scope
//! for individual wire protocols; this crate implements enough kinds —
//! spanning a pooled-connection queue adapter, a trait-backed streaming
//! adapter, a PromQL adapter, a time-window adapter with no network I/O, and
//! a generic JSON-over-HTTP adapter — to exercise the registry's dispatch,
//! validation and error-taxonomy machinery end to end. Extending the
//! catalogue is adding another arm to [`registry::build`], not a new
//! architectural seam.

pub mod cron;
pub mod external_http;
pub mod kafka;
pub mod options;
pub mod prometheus;
pub mod rabbitmq;
pub mod registry;
pub mod static_adapter;

pub use registry::{build, BuildContext};
