//! DocQA Search
//!
//! Retrieval and ranking core:
//! - Vector similarity search (pgvector)
//! - BM25 text search (PostgreSQL full-text or Elasticsearch)
//! - Candidate fusion (union de-duplication or weighted RRF)
//! - Cross-encoder reranking (Cohere)

pub mod rerank;
pub mod retrieval;

#[cfg(test)]
mod test_support;

pub use rerank::{RerankProvider, RerankedPassage, Reranker};
pub use retrieval::{
    Backend, CandidateFuser, FusedSet, FusionPolicy, LexicalIndex, Passage, RankedList, VectorIndex,
};
