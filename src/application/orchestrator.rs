// ============================================================
// Layer 2 — Training Orchestrator
// ============================================================
// Drives a TrainableModel through the corpus, epoch by epoch:
//
//   per batch:
//     optimise     one MLE or MRT step
//     every freq   autosave (state + shuffle order)
//     every vfreq  decode the validation set, save "best" only
//                  when BLEU strictly beats the best so far
//     every sfreq  decode one sentence of the batch into the log
//
//   per epoch end:
//     validate, log the average cost, decay the learning rate
//     once the epoch reaches `stop`, rewind / reshuffle the
//     corpus and autosave at the start of the next epoch
//
// The run state (epoch, step, stream position, cost, best BLEU,
// learning rate) lives in one RunState value owned here; a
// checkpoint is a snapshot of it together with the parameters.
//
// Reference: Shen et al. (2016) Minimum Risk Training for NMT

use anyhow::{ensure, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{path::{Path, PathBuf}, time::Instant};

use crate::application::config::{Criterion, RunState, TrainConfig};
use crate::data::{
    batcher::{BatchStream, LineBatch},
    reader::read_lines,
    references::{load_references, tokenize, References},
};
use crate::domain::{
    batch::TokenBatch,
    bleu::corpus_bleu,
    traits::{DecodingModel, TrainableModel},
    vocabulary::VocabularyPair,
};
use crate::infra::{
    checkpoint::{Checkpoint, CheckpointManager},
    metrics::{MetricsLogger, ValidationMetrics},
};
use crate::search::{
    beam::{beam_search, BeamOptions},
    risk::{build_sample_space, risk_scores},
    sampler::sample,
};

/// Validation source sentences with their references.
pub struct ValidationSet {
    pub sources:    Vec<String>,
    pub references: References,
    pub lowercase:  bool,
}

impl ValidationSet {
    pub fn load(source: &Path, references: &[PathBuf], lowercase: bool) -> Result<Self> {
        let sources = read_lines(source)?;
        let references = load_references(references, lowercase)?;
        ensure!(
            sources.len() == references.len(),
            "validation set has {} lines but references have {}",
            sources.len(), references.len()
        );
        Ok(Self { sources, references, lowercase })
    }
}

/// Position the stream where `state` left it: the epoch's shuffle
/// order (restored from `indices` when saved), then the recorded
/// position within the epoch.
pub fn restore_stream(stream: &mut BatchStream, state: &RunState, indices: Option<Vec<usize>>) -> Result<()> {
    stream.reset(state.epoch);
    if let Some(indices) = indices {
        stream.reader_mut().set_indices(indices)?;
    }
    stream.seek(state.position);
    Ok(())
}

/// Best hypothesis of the first model's beam, as target words.
fn translate<D: DecodingModel>(
    decoders: &[D],
    vocab:    &VocabularyPair,
    line:     &str,
    options:  &BeamOptions,
) -> Result<Vec<String>> {
    let source = vocab.source.encode(line);
    let hyps = beam_search(decoders, &source, vocab.target.eos_id(), options)?;
    Ok(hyps.first().map(|h| h.words(&vocab.target)).unwrap_or_default())
}

pub struct Orchestrator<'a, M: TrainableModel> {
    cfg:         &'a TrainConfig,
    vocab:       &'a VocabularyPair,
    checkpoints: &'a CheckpointManager,
    model:       M,
    stream:      BatchStream,
    state:       RunState,
    validation:  Option<(ValidationSet, MetricsLogger)>,
    rng:         StdRng,
}

impl<'a, M: TrainableModel> Orchestrator<'a, M> {
    pub fn new(
        cfg:         &'a TrainConfig,
        vocab:       &'a VocabularyPair,
        checkpoints: &'a CheckpointManager,
        model:       M,
        stream:      BatchStream,
        state:       RunState,
    ) -> Self {
        let rng = StdRng::seed_from_u64(cfg.seed);
        Self { cfg, vocab, checkpoints, model, stream, state, validation: None, rng }
    }

    pub fn with_validation(mut self, set: ValidationSet, metrics: MetricsLogger) -> Self {
        self.validation = Some((set, metrics));
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Train until `maxepoch` epochs are complete.
    pub fn run(&mut self) -> Result<()> {
        tracing::info!(
            "Training from epoch {} step {} (alpha={}, criterion={}, best bleu={:.4})",
            self.state.epoch + 1, self.state.step, self.state.alpha, self.cfg.criterion, self.state.bleu
        );

        while self.state.epoch < self.cfg.maxepoch {
            self.run_epoch()?;
        }

        tracing::info!("Training finished after {} epochs", self.state.epoch);
        Ok(())
    }

    fn run_epoch(&mut self) -> Result<()> {
        let epoch = self.state.epoch;

        while let Some(batch) = self.stream.next() {
            let started = Instant::now();
            let cost = self.optimize(&batch)?;

            self.state.step += 1;
            self.state.position = self.stream.position();
            self.state.cost += cost;

            let step = self.state.step;
            tracing::info!(
                "epoch {} step {} cost {:.4} time {:.2}s",
                epoch + 1, step, cost, started.elapsed().as_secs_f64()
            );

            if step % self.cfg.freq == 0 {
                self.autosave()?;
            }
            if step % self.cfg.vfreq == 0 {
                self.validate()?;
            }
            if step % self.cfg.sfreq == 0 {
                self.log_sample(&batch)?;
            }
        }

        // ── Epoch end ─────────────────────────────────────────────────────────
        self.validate()?;
        tracing::info!("epoch {} finished, average cost {:.4}", epoch + 1, self.avg_cost());

        if epoch + 1 >= self.cfg.stop {
            self.state.alpha *= self.cfg.decay;
            tracing::info!("learning rate decayed to {}", self.state.alpha);
        }

        self.state.epoch = epoch + 1;
        self.state.step = 0;
        self.state.cost = 0.0;
        self.stream.reset(self.state.epoch);
        self.state.position = self.stream.position();
        self.autosave()
    }

    fn avg_cost(&self) -> f64 {
        if self.state.step == 0 {
            0.0
        } else {
            self.state.cost / self.state.step as f64
        }
    }

    // ─── Optimisation ────────────────────────────────────────────────────────
    /// One step; returns the cost reported for it.
    fn optimize(&mut self, batch: &LineBatch) -> Result<f64> {
        let sources = batch.column(0);
        let targets = batch.column(1);

        match self.cfg.criterion {
            Criterion::Mle => {
                let tokens = TokenBatch::from_lines(&sources, &targets, self.vocab);
                let cost = f64::from(self.model.train_mle(&tokens, self.state.alpha)?);
                // batch mean -> per target token, in bits
                let per_token = cost * tokens.len() as f64 / tokens.target_tokens().max(1) as f64;
                Ok(per_token / std::f64::consts::LN_2)
            }
            Criterion::Mrt => {
                ensure!(batch.len() == 1, "minimum risk training needs batches of one sentence");
                self.optimize_mrt(&sources[0], &targets[0])
            }
        }
    }

    fn optimize_mrt(&mut self, source: &str, target: &str) -> Result<f64> {
        let vocab = self.vocab;
        let source_ids = vocab.source.encode(source);

        let references = vec![vocab.target.normalize_line(target)];
        let reference_words: Vec<Vec<String>> = references.iter().map(|r| tokenize(r, false)).collect();

        let target_len = vocab.target.encode(target).len();
        let maxlen = (1.5 * target_len as f64) as usize;
        let count = self.cfg.sample.saturating_sub(references.len());

        let decoder = self.model.decoder();
        let drawn = sample(&decoder, &source_ids, count, maxlen, vocab.target.eos_id(), &mut self.rng)?;
        let drawn: Vec<Vec<String>> = drawn.iter().map(|ids| vocab.target.decode(ids)).collect();

        let space = build_sample_space(&references, &drawn);
        let risks = risk_scores(&space, &reference_words);
        let candidates: Vec<Vec<u32>> = space.iter().map(|c| vocab.target.encode(c)).collect();
        tracing::debug!("sample space of {} candidates from {} samples", space.len(), drawn.len());

        let cost = self.model.train_mrt(&source_ids, &candidates, &risks, self.cfg.sharp, self.state.alpha)?;
        Ok(f64::from(cost))
    }

    // ─── Checkpoints ─────────────────────────────────────────────────────────
    fn snapshot(&self) -> Result<Checkpoint> {
        Ok(Checkpoint {
            config:  self.cfg.clone(),
            vocab:   self.vocab.clone(),
            state:   self.state.clone(),
            params:  self.model.export_params()?,
            indices: self.stream.reader().get_indices(),
        })
    }

    fn autosave(&self) -> Result<()> {
        self.checkpoints.save_autosave(&self.snapshot()?)?;
        tracing::info!(
            "autosaved epoch {} step {} to '{}'",
            self.state.epoch, self.state.step, self.checkpoints.autosave_path().display()
        );
        Ok(())
    }

    /// Keep `bleu` as the new best, saving the best checkpoint, only
    /// when it strictly beats the stored best.
    pub fn record_validation(&mut self, bleu: f64) -> Result<bool> {
        tracing::info!("validation bleu {:.4} (best {:.4})", bleu, self.state.bleu);
        if bleu <= self.state.bleu {
            return Ok(false);
        }
        self.state.bleu = bleu;
        self.checkpoints.save_best(&self.snapshot()?)?;
        tracing::info!("new best model saved to '{}'", self.checkpoints.best_path().display());
        Ok(true)
    }

    // ─── Validation and samples ──────────────────────────────────────────────
    fn validate(&mut self) -> Result<()> {
        let bleu = match &self.validation {
            None => return Ok(()),
            Some((set, _)) => {
                let decoder = [self.model.decoder()];
                let options = self.cfg.beam_options();
                let mut candidates = Vec::with_capacity(set.sources.len());
                for line in &set.sources {
                    let mut words = translate(&decoder, self.vocab, line, &options)?;
                    if set.lowercase {
                        words.iter_mut().for_each(|w| *w = w.to_lowercase());
                    }
                    candidates.push(words);
                }
                corpus_bleu(&candidates, &set.references, false)
            }
        };

        let previous = self.state.bleu;
        self.record_validation(bleu)?;

        if let Some((_, metrics)) = &self.validation {
            metrics.log(&ValidationMetrics {
                epoch:     self.state.epoch + 1,
                step:      self.state.step,
                avg_cost:  self.avg_cost(),
                bleu,
                best_bleu: previous.max(bleu),
            })?;
        }
        Ok(())
    }

    fn log_sample(&mut self, batch: &LineBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let row = &batch.rows[self.rng.gen_range(0..batch.len())];
        let decoder = [self.model.decoder()];
        let words = translate(&decoder, self.vocab, &row[0], &self.cfg.beam_options())?;

        tracing::info!("source:      {}", row[0]);
        tracing::info!("reference:   {}", row[1]);
        tracing::info!("translation: {}", words.join(" "));
        Ok(())
    }
}
