// ============================================================
// Layer 3 — Model Capability Traits
// ============================================================
// The search, training and replacement code never sees a
// concrete network. It talks to two capabilities:
//
//   DecodingModel  — incremental next-token distributions for
//                    beam search and sampling, teacher-forced
//                    attention alignments and sentence costs
//
//   TrainableModel — one gradient step under either criterion,
//                    plus parameter export / import / freezing
//
// The burn-backed network in `ml` implements both. Tests use
// small deterministic implementations instead.

use anyhow::Result;

use crate::domain::{
    alignment::AlignmentGrid,
    batch::TokenBatch,
    params::{ImportReport, ParamKey, ParamStore},
};

// ─── DecodingModel ───────────────────────────────────────────────────────────
/// Incremental decoding over a set of hypothesis rows.
///
/// A decoding session starts from one source sentence with a single
/// row. Each call to `step` yields one probability row per live
/// hypothesis; the caller then picks tokens and calls `select` with
/// the row each new hypothesis extends.
pub trait DecodingModel {
    type State: Clone;

    /// Encode `source` (EOS included) and return a one-row state.
    fn start(&self, source: &[u32]) -> Result<Self::State>;

    /// Next-token probabilities, one row per live hypothesis, and the
    /// state that `select` expects.
    fn step(&self, state: &Self::State) -> Result<(Vec<Vec<f32>>, Self::State)>;

    /// Keep rows `parents` (repeats allowed) and feed `tokens[i]` to
    /// the i-th kept row.
    fn select(&self, state: Self::State, parents: &[usize], tokens: &[u32]) -> Result<Self::State>;

    /// Teacher-forced attention weights for every pair of the batch.
    fn align(&self, batch: &TokenBatch) -> Result<AlignmentGrid>;

    /// Negative log-likelihood of each target given its source.
    fn score(&self, batch: &TokenBatch) -> Result<Vec<f32>>;
}

// ─── TrainableModel ──────────────────────────────────────────────────────────
/// A model that can be optimised and persisted.
pub trait TrainableModel {
    type Decoder: DecodingModel;

    /// Inference view over the current parameters.
    fn decoder(&self) -> Self::Decoder;

    /// One maximum-likelihood step. Returns the mean per-sentence cost.
    fn train_mle(&mut self, batch: &TokenBatch, alpha: f64) -> Result<f32>;

    /// One minimum-risk step over the sample space of `source`.
    /// Returns the expected risk under the sharpened distribution.
    fn train_mrt(
        &mut self,
        source:     &[u32],
        candidates: &[Vec<u32>],
        risks:      &[f32],
        sharp:      f32,
        alpha:      f64,
    ) -> Result<f32>;

    fn export_params(&self) -> Result<ParamStore>;

    /// Bind every stored value whose key and shape match a model
    /// parameter; report the rest.
    fn import_params(&mut self, store: &ParamStore) -> Result<ImportReport>;

    /// Only `keys` receive updates from now on.
    fn restrict_trainable(&mut self, keys: &[ParamKey]) -> Result<()>;

    fn parameter_count(&self) -> usize;
}
