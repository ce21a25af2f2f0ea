//! Chat endpoint client used for paraphrasing.

mod llm_client;

pub use llm_client::*;
