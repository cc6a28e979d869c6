//! markweave command-line interface.
//!
//! Validates and compiles markup documents with the markweave compiler:
//!
//! - `validate`: check a document against tag definitions
//! - `compile`: resolve, transform and render a document
//! - `formats`: list the available output formats

pub mod cli;
pub mod error;
