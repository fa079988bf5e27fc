//! Question-answering prompt assembly
//!
//! Pure and deterministic: the same passages and query always produce a
//! byte-identical `QaPrompt`.

use docqa_search::RerankedPassage;
use serde::Serialize;

/// Header placed before the numbered passages
pub const DEFAULT_PREFIX: &str = "<passages>:\n\n";

/// Everything the generator and the caller need for one query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QaPrompt {
    /// Full prompt sent to the generator
    pub prompt_text: String,

    /// `<i>: <text>` entries joined by blank lines
    pub context_block: String,

    /// `<i>: <source>` entries joined by blank lines
    pub source_block: String,
}

/// Builds `QaPrompt`s from reranked passages
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    prefix: String,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl PromptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different header before the passages
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    /// Number passages 1..N in rerank order and wrap them with the query
    pub fn assemble(&self, passages: &[RerankedPassage], query: &str) -> QaPrompt {
        let mut numbered = String::new();
        let mut contexts = Vec::with_capacity(passages.len());
        let mut sources = Vec::with_capacity(passages.len());

        for (i, hit) in passages.iter().enumerate() {
            let n = i + 1;
            numbered.push_str(&format!("{}: {}\n", n, hit.passage.text));
            contexts.push(format!("<{}>: {}", n, hit.passage.text));
            sources.push(format!("<{}>: {}", n, hit.passage.source));
        }

        QaPrompt {
            prompt_text: format!("{}{}{}", self.prefix, numbered, suffix(query)),
            context_block: contexts.join("\n\n"),
            source_block: sources.join("\n\n"),
        }
    }
}

fn suffix(query: &str) -> String {
    format!("\n<question>: {}\n<answer>: ", query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_search::Passage;

    fn reranked(items: &[(&str, &str)]) -> Vec<RerankedPassage> {
        items
            .iter()
            .enumerate()
            .map(|(i, (text, source))| RerankedPassage {
                passage: Passage::new(*text, *source),
                relevance_score: 1.0 - i as f32 * 0.1,
            })
            .collect()
    }

    #[test]
    fn test_prompt_layout() {
        let prompt = PromptAssembler::new().assemble(
            &reranked(&[("GPT store opened", "news.txt"), ("It lists custom GPTs", "blog.md")]),
            "What is the GPT store?",
        );

        assert_eq!(
            prompt.prompt_text,
            "<passages>:\n\n1: GPT store opened\n2: It lists custom GPTs\n\n<question>: What is the GPT store?\n<answer>: "
        );
        assert_eq!(prompt.context_block, "<1>: GPT store opened\n\n<2>: It lists custom GPTs");
        assert_eq!(prompt.source_block, "<1>: news.txt\n\n<2>: blog.md");
    }

    #[test]
    fn test_assembly_is_idempotent() {
        let assembler = PromptAssembler::new();
        let passages = reranked(&[("a", "x"), ("b", "y"), ("c", "z")]);

        assert_eq!(assembler.assemble(&passages, "q"), assembler.assemble(&passages, "q"));
    }

    #[test]
    fn test_query_appears_verbatim_in_suffix() {
        let query = "  weird <query> with [1] and\nnewline ";
        let prompt = PromptAssembler::new().assemble(&reranked(&[("a", "x")]), query);

        assert!(prompt.prompt_text.ends_with(&suffix(query)));
        assert!(prompt.prompt_text.contains(query));
    }

    #[test]
    fn test_empty_passages_keep_query() {
        let prompt = PromptAssembler::new().assemble(&[], "anything?");

        assert_eq!(prompt.context_block, "");
        assert_eq!(prompt.source_block, "");
        assert_eq!(prompt.prompt_text, "<passages>:\n\n\n<question>: anything?\n<answer>: ");
    }

    #[test]
    fn test_custom_prefix() {
        let prompt = PromptAssembler::with_prefix("Context:\n").assemble(&reranked(&[("a", "x")]), "q");
        assert!(prompt.prompt_text.starts_with("Context:\n1: a\n"));
    }
}
