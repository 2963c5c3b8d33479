//! Lambda side of the image processor.
//!
//! `handlers` runs the daily publish against the adapter traits in
//! `adapters`; the `image_processor` binary supplies the S3, DynamoDB and
//! CloudFront implementations. Deterministic rules (key naming, folder
//! renumbering plans, catalog edits) live in `image_processor_core`.

pub mod adapters;
pub mod handlers;
pub mod logging;
