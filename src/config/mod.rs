//! Configuration constants
//!
//! - [`defaults`] - Default programs, file names, and tuning values

pub mod defaults;
