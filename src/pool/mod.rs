//! Pool module - bounded worker pool for dialogue generation.

mod worker;

pub use worker::*;
