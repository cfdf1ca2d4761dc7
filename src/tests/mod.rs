//! Crate-internal tests.
//!
//! Everything here runs without a native OpenCL library: dispatch is driven
//! directly against callback registries, standing in for the runtime
//! threads that would otherwise do the firing.

mod callback_bridge;
