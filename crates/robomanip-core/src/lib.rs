//! robomanip core: shared error type and configuration for the rollout and
//! dataset tools.

pub mod config;
pub mod error;

pub use config::{DatasetPaths, RolloutConfig};
pub use error::{Error, Result};
