//! Utility functions and types for Neurosweep.

pub mod telemetry;
