// ============================================================
// Layer 7 — Checkpoint Manager
// ============================================================
// A checkpoint is a complete snapshot of one training run:
//
//   1. TrainConfig     — resolved hyperparameters
//   2. VocabularyPair  — token tables, fixed at creation
//   3. RunState        — epoch, step, stream position, cost,
//                        best BLEU, learning rate
//   4. ParamStore      — every parameter tensor by ParamKey
//   5. indices         — corpus shuffle order, when shuffling
//
// The whole struct is written with bincode in one go.
//
// File naming, derived from the --model path:
//   run/
//     nmt.ckpt            ← given path, loaded to resume
//     nmt.autosave.ckpt   ← latest state (every freq steps, epoch end)
//     nmt.best.ckpt       ← best validation BLEU so far
//     nmt.metrics.csv     ← see infra::metrics
//
// Writes overwrite in place; there is no temp-file-and-rename
// step, so a crash during a write can leave a truncated file.

use anyhow::{Context, Result};
use bincode::Options;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::application::config::{RunState, TrainConfig};
use crate::domain::{params::ParamStore, vocabulary::VocabularyPair};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub config:  TrainConfig,
    pub vocab:   VocabularyPair,
    pub state:   RunState,
    pub params:  ParamStore,
    pub indices: Option<Vec<usize>>,
}

impl Checkpoint {
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        }

        let file = fs::File::create(path)
            .with_context(|| format!("Cannot create checkpoint '{}'", path.display()))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, self)
            .with_context(|| format!("Failed to write checkpoint '{}'", path.display()))?;
        writer.flush()?;

        tracing::debug!("Saved checkpoint '{}'", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)
            .with_context(|| format!("Cannot open checkpoint '{}'", path.display()))?;
        let size = file.metadata()?.len();
        // same layout as serialize_into; lengths past the file size are corrupt
        let ckpt: Checkpoint = bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .allow_trailing_bytes()
            .with_limit(size)
            .deserialize_from(BufReader::new(file))
            .with_context(|| format!("Cannot decode checkpoint '{}'", path.display()))?;

        tracing::debug!(
            "Loaded checkpoint '{}' (epoch {}, step {}, {} tensors)",
            path.display(), ckpt.state.epoch, ckpt.state.step, ckpt.params.len()
        );
        Ok(ckpt)
    }
}

/// Paths of the checkpoint files that belong to one --model path.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    model: PathBuf,
    dir:   PathBuf,
    stem:  String,
}

impl CheckpointManager {
    pub fn new(model: impl Into<PathBuf>) -> Self {
        let model: PathBuf = model.into();
        let dir = model.parent().map(Path::to_path_buf).unwrap_or_default();
        let stem = model
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());
        Self { model, dir, stem }
    }

    pub fn model_path(&self) -> &Path {
        &self.model
    }

    pub fn autosave_path(&self) -> PathBuf {
        self.dir.join(format!("{}.autosave.ckpt", self.stem))
    }

    pub fn best_path(&self) -> PathBuf {
        self.dir.join(format!("{}.best.ckpt", self.stem))
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.dir.join(format!("{}.metrics.csv", self.stem))
    }

    /// The checkpoint to resume from: the --model file itself, else
    /// its autosave, else none (fresh run).
    pub fn load_existing(&self) -> Result<Option<Checkpoint>> {
        let autosave = self.autosave_path();
        let path = if self.model.exists() {
            self.model.as_path()
        } else if autosave.exists() {
            autosave.as_path()
        } else {
            return Ok(None);
        };
        tracing::info!("Resuming from '{}'", path.display());
        Checkpoint::load(path).map(Some)
    }

    pub fn save_autosave(&self, ckpt: &Checkpoint) -> Result<()> {
        ckpt.save(&self.autosave_path())
    }

    pub fn save_best(&self, ckpt: &Checkpoint) -> Result<()> {
        ckpt.save(&self.best_path())
    }
}
