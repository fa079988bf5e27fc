//! Candidate fusion for combining vector and lexical results
//!
//! Two policies are supported:
//! - `Union`: concatenate both lists, keep the first occurrence of each
//!   passage. Order is arrival order; the reranker assigns the real score.
//! - `ReciprocalRank`: weighted RRF. Each list contributes
//!   `weight / (rank + c)` per passage, so only rank positions matter and
//!   the incomparable raw scores are ignored.
//!
//! Inputs are always walked vector list first, then lexical list.

use super::{Backend, OriginRank, Passage, RankedList};
use docqa_common::config::{FusionMode, RetrievalConfig};
use docqa_common::errors::{AppError, Result};
use serde::Serialize;
use std::collections::HashMap;

/// Default rank-discount constant
pub const DEFAULT_RRF_CONSTANT: f64 = 60.0;

/// Weighted RRF parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RrfParams {
    /// Weight of the vector list
    pub vector_weight: f64,

    /// Weight of the lexical list
    pub lexical_weight: f64,

    /// Rank-discount constant `c`
    pub c: f64,

    /// Maximum number of fused candidates returned
    pub top_k: usize,
}

impl Default for RrfParams {
    fn default() -> Self {
        Self {
            vector_weight: 0.5,
            lexical_weight: 0.5,
            c: DEFAULT_RRF_CONSTANT,
            top_k: 10,
        }
    }
}

impl RrfParams {
    fn validate(&self) -> Result<()> {
        let weights = [self.vector_weight, self.lexical_weight];
        // A zero weight would tie "top of both lists" with "top of one"
        if weights.iter().any(|w| !w.is_finite() || *w <= 0.0) {
            return Err(AppError::validation(
                "fusion.weights",
                format!("weights must be finite and positive, got {:?}", weights),
            ));
        }
        if !self.c.is_finite() || self.c < 0.0 {
            return Err(AppError::validation(
                "fusion.c",
                format!("rank constant must be finite and non-negative, got {}", self.c),
            ));
        }
        if self.top_k == 0 {
            return Err(AppError::validation("fusion.top_k", "top_k must be greater than zero"));
        }
        Ok(())
    }

    fn weight(&self, backend: Backend) -> f64 {
        match backend {
            Backend::Vector => self.vector_weight,
            Backend::Lexical => self.lexical_weight,
        }
    }
}

/// How two ranked lists are merged
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FusionPolicy {
    /// Union with first-seen de-duplication, no truncation
    Union,
    /// Weighted reciprocal rank fusion, truncated to `top_k`
    ReciprocalRank(RrfParams),
}

impl Default for FusionPolicy {
    fn default() -> Self {
        FusionPolicy::Union
    }
}

impl FusionPolicy {
    /// Select the policy named by retrieval configuration
    pub fn from_config(config: &RetrievalConfig) -> Self {
        match config.fusion {
            FusionMode::Union => FusionPolicy::Union,
            FusionMode::Rrf => FusionPolicy::ReciprocalRank(RrfParams {
                vector_weight: config.vector_weight,
                lexical_weight: config.lexical_weight,
                c: config.rrf_constant,
                top_k: config.fusion_top_k,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FusionPolicy::Union => "union",
            FusionPolicy::ReciprocalRank(_) => "rrf",
        }
    }
}

/// One unique passage after fusion
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FusedCandidate {
    pub passage: Passage,

    /// Aggregate RRF score; always 0.0 under `Union`
    pub score: f64,

    /// Every list position the passage was found at
    pub origins: Vec<OriginRank>,
}

/// De-duplicated, ordered fusion output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusedSet {
    candidates: Vec<FusedCandidate>,
}

impl FusedSet {
    pub fn candidates(&self) -> &[FusedCandidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FusedCandidate> {
        self.candidates.iter()
    }

    /// Passages in fused order
    pub fn passages(&self) -> Vec<Passage> {
        self.candidates.iter().map(|c| c.passage.clone()).collect()
    }

    pub fn contains(&self, passage: &Passage) -> bool {
        self.candidates.iter().any(|c| &c.passage == passage)
    }
}

/// Merges the vector and lexical lists under one policy
#[derive(Debug, Clone)]
pub struct CandidateFuser {
    policy: FusionPolicy,
}

impl CandidateFuser {
    /// Create a fuser, rejecting malformed RRF parameters up front
    pub fn new(policy: FusionPolicy) -> Result<Self> {
        if let FusionPolicy::ReciprocalRank(params) = &policy {
            params.validate()?;
        }
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &FusionPolicy {
        &self.policy
    }

    /// Fuse the two backend lists for one query.
    ///
    /// Pure computation. Fails only on malformed input; empty lists yield an
    /// empty set.
    pub fn fuse(&self, vector: &RankedList, lexical: &RankedList) -> Result<FusedSet> {
        if vector.backend() != Backend::Vector || lexical.backend() != Backend::Lexical {
            return Err(AppError::validation(
                "fusion.inputs",
                format!(
                    "expected (vector, lexical) lists, got ({}, {})",
                    vector.backend(),
                    lexical.backend()
                ),
            ));
        }

        let set = match &self.policy {
            FusionPolicy::Union => union(vector, lexical),
            FusionPolicy::ReciprocalRank(params) => {
                params.validate()?;
                reciprocal_rank(vector, lexical, params)
            }
        };

        tracing::debug!(
            policy = self.policy.name(),
            vector = vector.len(),
            lexical = lexical.len(),
            fused = set.len(),
            "Fused candidates"
        );
        Ok(set)
    }
}

/// Walk both lists in order, merging repeat sightings into the first entry
fn collect_unique(vector: &RankedList, lexical: &RankedList) -> Vec<FusedCandidate> {
    let mut index: HashMap<&Passage, usize> = HashMap::new();
    let mut candidates: Vec<FusedCandidate> = Vec::new();

    for candidate in vector.iter().chain(lexical.iter()) {
        match index.get(&candidate.passage) {
            Some(&i) => candidates[i].origins.push(candidate.origin),
            None => {
                index.insert(&candidate.passage, candidates.len());
                candidates.push(FusedCandidate {
                    passage: candidate.passage.clone(),
                    score: 0.0,
                    origins: vec![candidate.origin],
                });
            }
        }
    }

    candidates
}

fn union(vector: &RankedList, lexical: &RankedList) -> FusedSet {
    FusedSet {
        candidates: collect_unique(vector, lexical),
    }
}

fn reciprocal_rank(vector: &RankedList, lexical: &RankedList, params: &RrfParams) -> FusedSet {
    let mut candidates = collect_unique(vector, lexical);

    for candidate in &mut candidates {
        candidate.score = candidate
            .origins
            .iter()
            .map(|o| params.weight(o.backend) / (o.rank as f64 + params.c))
            .sum();
    }

    // Stable sort keeps first-seen order among equal scores
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates.truncate(params.top_k);

    FusedSet { candidates }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(text: &str) -> Passage {
        Passage::new(text, format!("{}.txt", text))
    }

    fn list(backend: Backend, texts: &[&str]) -> RankedList {
        RankedList::from_hits(
            backend,
            texts.iter().enumerate().map(|(i, t)| (p(t), 1.0 - i as f32 * 0.1)),
        )
    }

    fn rrf(vector_weight: f64, lexical_weight: f64, c: f64, top_k: usize) -> CandidateFuser {
        CandidateFuser::new(FusionPolicy::ReciprocalRank(RrfParams {
            vector_weight,
            lexical_weight,
            c,
            top_k,
        }))
        .unwrap()
    }

    fn texts(set: &FusedSet) -> Vec<String> {
        set.iter().map(|c| c.passage.text.clone()).collect()
    }

    #[test]
    fn test_union_keeps_first_seen_order() {
        let fuser = CandidateFuser::new(FusionPolicy::Union).unwrap();
        let set = fuser
            .fuse(&list(Backend::Vector, &["p1", "p2"]), &list(Backend::Lexical, &["p2", "p3"]))
            .unwrap();

        assert_eq!(texts(&set), vec!["p1", "p2", "p3"]);
        assert_eq!(set.candidates()[1].origins.len(), 2);
    }

    #[test]
    fn test_union_has_no_duplicates() {
        let fuser = CandidateFuser::new(FusionPolicy::Union).unwrap();
        let vector = list(Backend::Vector, &["a", "b", "c", "d"]);
        let lexical = list(Backend::Lexical, &["d", "e", "a", "f", "b"]);
        let set = fuser.fuse(&vector, &lexical).unwrap();

        // 6 unique passages across both lists
        assert_eq!(set.len(), 6);
        let mut seen = std::collections::HashSet::new();
        assert!(set.iter().all(|c| seen.insert(c.passage.clone())));
        assert_eq!(texts(&set), vec!["a", "b", "c", "d", "e", "f"]);
    }

    #[test]
    fn test_union_distinguishes_sources() {
        let fuser = CandidateFuser::new(FusionPolicy::Union).unwrap();
        let vector = RankedList::from_hits(Backend::Vector, vec![(Passage::new("same", "a"), 0.9)]);
        let lexical = RankedList::from_hits(Backend::Lexical, vec![(Passage::new("same", "b"), 3.0)]);

        assert_eq!(fuser.fuse(&vector, &lexical).unwrap().len(), 2);
    }

    #[test]
    fn test_rrf_reference_score() {
        let set = rrf(0.5, 0.5, 60.0, 10)
            .fuse(&list(Backend::Vector, &["p", "x"]), &list(Backend::Lexical, &["y", "p"]))
            .unwrap();

        let fused = set.iter().find(|c| c.passage.text == "p").unwrap();
        let expected = 0.5 / 61.0 + 0.5 / 62.0;
        assert!((fused.score - expected).abs() < 1e-12);
        assert!((fused.score - 0.01626).abs() < 1e-5);
        assert_eq!(set.candidates()[0].passage.text, "p");
    }

    #[test]
    fn test_rrf_absent_backend_contributes_nothing() {
        let set = rrf(0.7, 0.3, 60.0, 10)
            .fuse(&list(Backend::Vector, &["only_vector"]), &list(Backend::Lexical, &["only_lexical"]))
            .unwrap();

        assert!((set.candidates()[0].score - 0.7 / 61.0).abs() < 1e-12);
        assert!((set.candidates()[1].score - 0.3 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn test_rrf_top_in_both_beats_top_in_one() {
        for &(wv, wl) in &[(0.5, 0.5), (0.9, 0.1), (0.1, 0.9), (2.0, 3.0)] {
            for &c in &[0.0, 1.0, 60.0, 1000.0] {
                let set = rrf(wv, wl, c, 10)
                    .fuse(
                        &list(Backend::Vector, &["both", "v2"]),
                        &list(Backend::Lexical, &["both", "l2"]),
                    )
                    .unwrap();
                let score = |t: &str| set.iter().find(|c| c.passage.text == t).unwrap().score;

                assert!(score("both") > wv / (1.0 + c), "weights ({}, {}) c={}", wv, wl, c);
                assert!(score("both") > wl / (1.0 + c), "weights ({}, {}) c={}", wv, wl, c);
                assert_eq!(set.candidates()[0].passage.text, "both");
            }
        }
    }

    #[test]
    fn test_rrf_sorted_descending() {
        let set = rrf(0.6, 0.4, 60.0, 10)
            .fuse(
                &list(Backend::Vector, &["a", "b", "c", "d"]),
                &list(Backend::Lexical, &["d", "c", "e"]),
            )
            .unwrap();

        let scores: Vec<f64> = set.iter().map(|c| c.score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_rrf_ties_keep_insertion_order() {
        let set = rrf(0.5, 0.5, 60.0, 10)
            .fuse(&list(Backend::Vector, &["v"]), &list(Backend::Lexical, &["l"]))
            .unwrap();

        assert_eq!(texts(&set), vec!["v", "l"]);
    }

    #[test]
    fn test_rrf_truncates_to_top_k() {
        let fuser = rrf(0.5, 0.5, 60.0, 2);
        let set = fuser
            .fuse(&list(Backend::Vector, &["a", "b", "c"]), &list(Backend::Lexical, &["d"]))
            .unwrap();
        assert_eq!(set.len(), 2);

        let wide = rrf(0.5, 0.5, 60.0, 50)
            .fuse(&list(Backend::Vector, &["a", "b", "c"]), &list(Backend::Lexical, &["d"]))
            .unwrap();
        assert_eq!(wide.len(), 4);
    }

    #[test]
    fn test_empty_inputs_yield_empty_set() {
        let vector = RankedList::empty(Backend::Vector);
        let lexical = RankedList::empty(Backend::Lexical);

        assert!(CandidateFuser::new(FusionPolicy::Union)
            .unwrap()
            .fuse(&vector, &lexical)
            .unwrap()
            .is_empty());
        assert!(rrf(0.5, 0.5, 60.0, 3).fuse(&vector, &lexical).unwrap().is_empty());
    }

    #[test]
    fn test_weights_need_not_sum_to_one() {
        let set = rrf(3.0, 1.0, 60.0, 5)
            .fuse(&list(Backend::Vector, &["a"]), &list(Backend::Lexical, &["a"]))
            .unwrap();
        assert!((set.candidates()[0].score - 4.0 / 61.0).abs() < 1e-12);
    }

    #[test]
    fn test_malformed_params_rejected() {
        let bad = |params: RrfParams| CandidateFuser::new(FusionPolicy::ReciprocalRank(params)).is_err();

        assert!(bad(RrfParams { top_k: 0, ..RrfParams::default() }));
        assert!(bad(RrfParams { vector_weight: -0.1, ..RrfParams::default() }));
        assert!(bad(RrfParams { vector_weight: 0.0, lexical_weight: 0.0, ..RrfParams::default() }));
        assert!(bad(RrfParams { vector_weight: 0.0, lexical_weight: 1.0, ..RrfParams::default() }));
        assert!(bad(RrfParams { vector_weight: 1.0, lexical_weight: 0.0, ..RrfParams::default() }));
        assert!(bad(RrfParams { lexical_weight: f64::NAN, ..RrfParams::default() }));
        assert!(bad(RrfParams { c: f64::INFINITY, ..RrfParams::default() }));
    }

    #[test]
    fn test_swapped_lists_rejected() {
        let fuser = CandidateFuser::new(FusionPolicy::Union).unwrap();
        let err = fuser
            .fuse(&list(Backend::Lexical, &["a"]), &list(Backend::Vector, &["b"]))
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = RetrievalConfig::default();
        assert_eq!(FusionPolicy::from_config(&config), FusionPolicy::Union);

        config.fusion = FusionMode::Rrf;
        config.fusion_top_k = 4;
        match FusionPolicy::from_config(&config) {
            FusionPolicy::ReciprocalRank(params) => {
                assert_eq!(params.top_k, 4);
                assert_eq!(params.c, 60.0);
            }
            other => panic!("unexpected policy {:?}", other),
        }
    }
}
