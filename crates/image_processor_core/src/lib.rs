//! Deployment and processing primitives for the image processor.
//!
//! This crate owns the typed deployment descriptor (validation, template
//! rendering, provisioning plans) and the deterministic parts of the daily
//! image run. It intentionally excludes AWS SDK and Lambda runtime concerns.

pub mod catalog;
pub mod config;
pub mod contract;
pub mod descriptor;
pub mod media;
pub mod places;
pub mod provisioning;
pub mod template;
pub mod validation;
