//! nodesize-core: shared types for the node-sizing engine.
//!
//! Holds the data model (node sizes, runtime constraints, queued jobs,
//! demand snapshots), the immutable [`SizeCatalog`], and the
//! `nodesize.toml` config parser.
//!
//! # Constraint coercion
//!
//! Job records come from an external scheduler and are loosely typed.
//! Every constraint field goes through [`coerce_int`]; malformed values are
//! treated as absent, and an absent `min_nodes` means one node. Decoding a
//! job therefore never fails.

pub mod catalog;
pub mod config;
pub mod error;
pub mod types;

pub use catalog::SizeCatalog;
pub use config::{NodesizeConfig, PollSettings, QueueConfig, SourceConfig, parse_duration};
pub use error::{CatalogError, CatalogResult, ConfigError};
pub use types::*;
