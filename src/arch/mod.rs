//! # Architecture Abstraction Layer
//!
//! Hardware halves of the [`Platform`](crate::platform::Platform) traits,
//! one sibling module per target. Each is compiled only for its target.

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;
