//! Recorded-episode datasets: naming conventions, `.npz` inspection,
//! directory scanning and the keyword-based train/test split.
//!
//! A dataset root holds one `env<N>/` directory per world index, each with
//! the `.npz` episodes captured in that world.

pub mod layout;
pub mod npy;
pub mod npz;
pub mod scan;
pub mod split;

pub use layout::{EpisodeLabel, EpisodeName};
pub use npz::{ArraySummary, NpzArchive};
pub use scan::{scan_dataset, DatasetIndex, EnvDir, Episode};
pub use split::{execute_split, plan_split, Split, SplitManifest, SplitPlan, SplitRule};
