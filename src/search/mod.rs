// ============================================================
// Layer 5 — Search and Post-processing
// ============================================================
// Model-agnostic algorithms that drive a DecodingModel:
//
//   beam.rs     — ensemble beam search with probability fusion
//   sampler.rs  — ancestral sampling of full sequences
//   risk.rs     — MRT sample space, BLEU risk, oracle choice
//   unk.rs      — alignment-based UNK replacement
//
// Nothing here knows about burn; every function is generic
// over the capability traits in domain::traits.

pub mod beam;
pub mod sampler;
pub mod risk;
pub mod unk;

#[cfg(test)]
pub(crate) mod testing;
