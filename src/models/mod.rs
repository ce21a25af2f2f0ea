//! Core data models for colloquy.
//!
//! Epistemic mapping:
//! - K_i (Knowledge): Concrete types with compile-time guarantees
//! - B_i (Beliefs): Wrapped in Result/Option
//! - I^R (Resolvable): Config parameters
//! - I^B (Bounded): Error variants with fallback strategies

mod config;
mod dialogue;
mod error;
mod source;

pub use config::*;
pub use dialogue::*;
pub use error::*;
pub use source::*;
