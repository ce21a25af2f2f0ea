//! Dialogue synthesis: state, personas, turn generators and the per-item chain.

mod chain;
mod persona;
mod question;
mod response;
mod state;
pub mod template;

pub use chain::*;
pub use persona::*;
pub use question::*;
pub use response::*;
pub use state::*;

use crate::index::Indices;
use crate::nlp::NlpContext;

/// Read-only context an answer is grounded in.
#[derive(Clone, Copy)]
pub struct Grounding<'a> {
    pub nlp: &'a NlpContext,
    pub indices: &'a Indices,
}
