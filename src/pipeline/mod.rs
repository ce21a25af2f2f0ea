//! Pipeline module - dataset loading, batched generation and final selection.

mod generate;

pub use generate::*;
