//! Recursive repacking of nested ZIP archives.
//!
//! # Architecture
//!
//! - `schema.rs` - Declarative nesting levels
//! - `config.rs` - TOML configuration
//! - `locate.rs` - Container and target discovery per level
//! - `transform.rs` - Leaf transforms (marker file)
//! - `pipeline.rs` - Frame stack: unwrap, transform, rewrap
//! - `batch.rs` - Many inputs, independent failures
//!
//! # Example
//!
//! ```no_run
//! use repack_pipeline::{MarkerTransform, NestingSchema, Pipeline};
//!
//! let pipeline = Pipeline::new(NestingSchema::default(), "signed").transform(MarkerTransform::default());
//! let outcome = pipeline.process("unsign/20260105.zip".as_ref())?;
//! println!("{} leaves signed", outcome.leaves.len());
//! # Ok::<(), repack_pipeline::ArchiveFailure>(())
//! ```

pub use batch::{Batch, BatchReport, collect_inputs};
pub use config::{MarkerConfig, RepackConfig};
pub use error::{ConfigError, PipelineError, Result};
pub use locate::{Located, Targets, find_targets, list_tree, locate};
pub use pipeline::{ArchiveFailure, Pipeline, ProcessOutcome};
pub use schema::{LevelSpec, LocateRule, NestingSchema, SearchMode};
pub use transform::{DEFAULT_MARKER_CONTENT, DEFAULT_MARKER_NAME, MarkerTransform, Transform, TransformError};

mod batch;
mod config;
mod error;
mod locate;
mod pipeline;
mod schema;
mod transform;
