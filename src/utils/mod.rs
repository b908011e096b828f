//! The `utils` module provides a collection of utility functions and common
//! definitions used across the `pophub` application.
//!
//! It centralizes the startup error type and logging initialization.

pub mod error;
pub mod logging;

pub use error::HubError;
