//! earstudy - calibration and statistics for in-ear sensor studies
//!
//! This library loads per-participant sensor recordings, smooths and
//! calibrates the temperature channels against a reference, segments the
//! recordings into study phases and computes descriptive, HRV and
//! significance statistics that are then aggregated across participants.

pub mod aggregate;
pub mod calibration;
pub mod cli;
pub mod config;
pub mod error;
pub mod loader;
pub mod phase_analyses;
pub mod pipeline;
pub mod recording;
pub mod report;
pub mod segmentation;
pub mod smoothing;
pub mod statistics;
