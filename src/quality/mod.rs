//! Quality layers: per-turn validation, per-dialogue scoring, post-processing
//! and the pastoral review annotation pass.

mod coherence;
mod postprocess;
mod review;
mod validator;

pub use coherence::*;
pub use postprocess::*;
pub use review::*;
pub use validator::*;
