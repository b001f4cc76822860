// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types and traits that describe the translation
// system: vocabularies, token batches, hypotheses, attention
// alignments, named parameter stores, the BLEU metric, and the
// capability traits every model implementation provides.
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O beyond loading a vocabulary file
//   - Only plain structs, enums, functions and traits

/// Token <-> id tables for one language side
pub mod vocabulary;

/// Aligned source/target id sequences fed to a model
pub mod batch;

/// Beam search output entries
pub mod hypothesis;

/// Arithmetic / geometric averaging of model outputs
pub mod fusion;

/// Target x source x batch attention weights
pub mod alignment;

/// Parameter registry keyed by logical identity
pub mod params;

/// Corpus and smoothed sentence BLEU
pub mod bleu;

/// Capability traits implemented by concrete models
pub mod traits;
