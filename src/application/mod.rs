// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// One use case per command. Each one wires the lower layers
// together for a single goal and owns no ML math itself:
//
//   train      — resolve config, build or resume, run the
//                training orchestrator
//   translate  — beam search with an ensemble, optional oracle
//   sample     — random translations from one model
//   replace    — rewrite UNK tokens from attention alignments
//   evaluate   — per-sentence cost and alignment error rate
//
// The decode-side use cases keep their line loop in a generic
// function over DecodingModel so it can be tested without a GPU.

/// Training hyperparameters, run state, flag resolution
pub mod config;

/// The training loop state machine
pub mod orchestrator;

/// Loading several checkpoints for decoding
pub mod ensemble;

pub mod train_use_case;
pub mod translate_use_case;
pub mod sample_use_case;
pub mod replace_use_case;
pub mod evaluate_use_case;
