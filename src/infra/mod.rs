// ============================================================
// Layer 7 — Infrastructure Layer
// ============================================================
// Persistence shared by the use cases:
//
//   checkpoint.rs — full training snapshots (config, vocabulary,
//                   run state, parameters, shuffle order),
//                   bincode-encoded; autosave / best naming
//
//   metrics.rs    — validation history appended to a CSV file
//                   for plotting learning curves
//
// Reference: Rust Book §9 (Error Handling with anyhow)

/// Checkpoint saving and loading
pub mod checkpoint;

/// Validation metrics CSV logger
pub mod metrics;
