//! Seqgate Ingest Library
//!
//! Sequence-validated batch ingestion of compressed message bundles.
//!
//! Each run admits inbound zip bundles under backlog and per-stream batch
//! caps, validates their per-stream sequence numbers against durable state,
//! unpacks them with a bounded worker pool, classifies the extracted XML
//! documents against cached carrier-code reference data, routes documents to
//! output, reject, or matched directories, and archives the source bundles.
//!
//! # Example
//!
//! ```no_run
//! use seqgate_ingest::config::PipelineConfig;
//! use seqgate_ingest::pipeline::Pipeline;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PipelineConfig::with_root("./data");
//!     let report = Pipeline::new(config).run().await?;
//!     println!("admitted {} bundle(s)", report.admitted);
//!     Ok(())
//! }
//! ```

pub mod admission;
pub mod archive;
pub mod classify;
pub mod config;
pub mod extract;
pub mod fsops;
pub mod pipeline;
pub mod pool;
pub mod reference;
pub mod state;
pub mod validate;
