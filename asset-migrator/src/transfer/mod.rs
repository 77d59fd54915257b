//! Progress accounting for migration runs.

pub mod progress;

pub use progress::{ProgressTracker, RunProgress};
