// src/pipeline/mod.rs
//
// Per-camera wiring: the context/registry layer, the detection loop that
// feeds the tracker, and the shared idle watcher that finalizes
// trajectories.

pub mod detection;
pub mod registry;
pub mod watcher;

pub use registry::{CameraContext, CameraRegistry};
