//! Application Layer - Ingestion use cases and port definitions.
//!
//! This layer wires the pure domain to the outside world through ports, and
//! hosts the services that own concurrency: stream workers, the ingestion
//! coordinator and the shutdown controller.

/// Port interfaces for stream sources, storage sinks and snapshot stores.
pub mod ports;

/// Worker, coordinator and shutdown services.
pub mod services;
