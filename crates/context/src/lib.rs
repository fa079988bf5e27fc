//! DocQA Context
//!
//! Turns reranked evidence into answers:
//! - Prompt assembly with numbered context and source blocks
//! - Citation extraction from generated text
//! - The `DocQa` orchestrator driving retrieve, fuse, rerank and generate

pub mod citations;
pub mod pipeline;
pub mod prompt;

pub use citations::{extract_citations, Citation};
pub use pipeline::{Answer, Collaborators, DocQa, DocQaSettings, RetrievedContext};
pub use prompt::{PromptAssembler, QaPrompt};
