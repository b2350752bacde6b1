//! Prometheus metrics exporter for Celery Flower.
//!
//! This crate polls one or more Flower monitoring APIs over HTTP, normalizes
//! their JSON payloads into gauge series and exposes them via an HTTP
//! `/metrics` endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │  Flower API(s)  │────>│  Poller / task  │────>│    Registry     │────>│   HTTP Server   │
//! │ (/api/queues/…) │     │  (normalize)    │     │  (gauge store)  │     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! flower-exporter --flower http://flower:5555 --addr 0.0.0.0:8888
//! flower-exporter --config config.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod client;
pub mod config;
pub mod coordinator;
pub mod http;
pub mod normalize;
pub mod poller;
pub mod registry;
pub mod status;

pub use client::{FailureKind, FetchError, FlowerClient};
pub use config::{ConfigError, ExporterConfig, FlowerConfig, UnreachablePolicy};
pub use coordinator::Coordinator;
pub use http::HttpServer;
pub use normalize::Variant;
pub use poller::{Poller, StopReason};
pub use registry::{MetricRegistry, Sample, SeriesKey, SharedRegistry};
pub use status::{SharedStatusBoard, StatusBoard};
