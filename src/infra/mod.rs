//! Infrastructure layer
//!
//! Handles external processes and the command-backed collaborators used by
//! the command-line front end.

pub mod adapters;
pub mod process;
