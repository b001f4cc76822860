// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between text files on disk and token batches:
//
//   parallel text files
//       │
//       ▼
//   TextReader        → line tuples, optional per-epoch shuffle
//       │
//       ▼
//   BatchStream       → length-limited, window-sorted batches
//       │
//       ▼
//   TokenBatch        → ids with EOS (domain::batch)
//
// Side inputs used for scoring and post-processing:
//   references.rs     → reference translations for BLEU
//   lexicon.rs        → source → target dictionary for UNKs
//   links.rs          → reference word alignments for AER

/// Line-aligned readers with resumable shuffle order
pub mod reader;

/// Windowed, sorted batching with exact resume positions
pub mod batcher;

/// Reference translation loading
pub mod references;

/// Probabilistic bilingual lexicon
pub mod lexicon;

/// Pharaoh-format reference alignments
pub mod links;
