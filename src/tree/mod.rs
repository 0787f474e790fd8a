//! Control tree building.
//!
//! This module provides the fetch coordinator and the worker pool it
//! schedules fetches on.

pub mod builder;
pub mod pool;

pub use builder::ControlTreeBuilder;
