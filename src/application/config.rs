// ============================================================
// Layer 2 — Training Configuration
// ============================================================
// Training options are split in two:
//
//   TrainConfig  — hyperparameters, fixed once resolved
//   RunState     — counters that change while training
//
// A run resolves its TrainConfig exactly once, at startup:
//
//   defaults  →  config stored in a resumed checkpoint
//             →  command-line overrides
//
// Vocabulary and network dimensions come from the command line
// only on a fresh run; a resumed run keeps what it was created
// with.

use anyhow::{bail, ensure, Result};
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr};

use crate::data::batcher::{BatchOptions, StreamPosition};
use crate::ml::{engine::{OptimizerKind, OptimizerSettings}, model::RnnSearchConfig};
use crate::search::beam::BeamOptions;
use crate::domain::fusion::FusionRule;

// ─── Criterion ───────────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    #[default]
    Mle,
    Mrt,
}

impl FromStr for Criterion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mle" => Ok(Self::Mle),
            "mrt" => Ok(Self::Mrt),
            other => bail!("unknown criterion '{other}' (expected mle or mrt)"),
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mle => "mle",
            Self::Mrt => "mrt",
        })
    }
}

// ─── TrainConfig ─────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    // data
    pub corpus:     Vec<PathBuf>,
    pub vocab:      Vec<PathBuf>,
    pub model:      PathBuf,
    pub validation: Option<PathBuf>,
    pub references: Vec<PathBuf>,
    pub lowercase:  bool,
    pub unk:        String,
    pub eos:        String,

    // network
    pub embdim:    [usize; 2],
    pub hidden:    [usize; 3],
    pub maxhid:    usize,
    pub maxpart:   usize,
    pub deephid:   usize,
    pub scale:     f64,
    pub keep_prob: Option<f64>,

    // optimisation
    pub maxepoch:  usize,
    pub alpha:     f64,
    pub momentum:  f64,
    pub batch:     usize,
    pub optimizer: OptimizerKind,
    pub norm:      f32,
    pub stop:      usize,
    pub decay:     f64,
    pub l2_scale:  Option<f32>,
    pub seed:      u64,
    pub criterion: Criterion,
    pub sample:    usize,
    pub sharp:     f32,

    // corpus stream
    pub sort:    usize,
    pub shuffle: bool,
    pub limit:   [usize; 2],

    // cadence
    pub freq:  usize,
    pub vfreq: usize,
    pub sfreq: usize,

    // validation decoding
    pub beamsize:  usize,
    pub normalize: bool,
    pub maxlen:    Option<usize>,
    pub minlen:    Option<usize>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            corpus:     Vec::new(),
            vocab:      Vec::new(),
            model:      PathBuf::from("model.ckpt"),
            validation: None,
            references: Vec::new(),
            lowercase:  false,
            unk:        "UNK".to_string(),
            eos:        "<eos>".to_string(),

            embdim:    [620, 620],
            hidden:    [1000, 1000, 1000],
            maxhid:    500,
            maxpart:   2,
            deephid:   620,
            scale:     0.08,
            keep_prob: None,

            maxepoch:  5,
            alpha:     5e-4,
            momentum:  0.0,
            batch:     128,
            optimizer: OptimizerKind::RmsProp,
            norm:      1.0,
            stop:      0,
            decay:     0.5,
            l2_scale:  None,
            seed:      1234,
            criterion: Criterion::Mle,
            sample:    100,
            sharp:     5e-3,

            sort:    20,
            shuffle: false,
            limit:   [50, 50],

            freq:  1000,
            vfreq: 1000,
            sfreq: 50,

            beamsize:  10,
            normalize: false,
            maxlen:    None,
            minlen:    None,
        }
    }
}

impl TrainConfig {
    pub fn network(&self, source_vocab: usize, target_vocab: usize) -> RnnSearchConfig {
        RnnSearchConfig::new(
            source_vocab,
            target_vocab,
            self.embdim[0],
            self.embdim[1],
            self.hidden[0],
            self.hidden[1],
            self.hidden[2],
            self.maxhid,
            self.maxpart,
            self.deephid,
        )
        .with_scale(self.scale)
        .with_dropout(self.keep_prob.map_or(0.0, |p| 1.0 - p))
    }

    pub fn optimizer_settings(&self) -> OptimizerSettings {
        OptimizerSettings { momentum: self.momentum, norm: self.norm, l2_scale: self.l2_scale }
    }

    /// MRT trains on one sentence at a time, unsorted.
    pub fn batch_options(&self) -> BatchOptions {
        match self.criterion {
            Criterion::Mle => BatchOptions { batch: self.batch, sortk: self.sort, limit: self.limit.to_vec() },
            Criterion::Mrt => BatchOptions { batch: 1, sortk: 1, limit: self.limit.to_vec() },
        }
    }

    pub fn beam_options(&self) -> BeamOptions {
        BeamOptions {
            beamsize:  self.beamsize,
            normalize: self.normalize,
            maxlen:    self.maxlen,
            minlen:    self.minlen,
            fusion:    FusionRule::Geometric,
        }
    }

    pub fn shuffle_seed(&self) -> Option<u64> {
        self.shuffle.then_some(self.seed)
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.corpus.len() == 2, "--corpus needs a source and a target file");
        ensure!(self.vocab.len() == 2, "--vocab needs a source and a target file");
        for (name, value) in [
            ("freq", self.freq),
            ("vfreq", self.vfreq),
            ("sfreq", self.sfreq),
            ("batch", self.batch),
            ("beamsize", self.beamsize),
        ] {
            ensure!(value >= 1, "--{name} must be at least 1");
        }
        if let Some(p) = self.keep_prob {
            ensure!(p > 0.0 && p <= 1.0, "--keep-prob must be in (0, 1]");
        }
        Ok(())
    }
}

// ─── RunState ────────────────────────────────────────────────────────────────
/// Mutable training counters, persisted with every checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub epoch:    usize,
    /// Steps taken in the current epoch
    pub step:     usize,
    pub position: StreamPosition,
    /// Summed per-token cost (bits) over the current epoch
    pub cost:     f64,
    /// Best validation BLEU so far
    pub bleu:     f64,
    /// Current learning rate
    pub alpha:    f64,
}

impl RunState {
    pub fn new(alpha: f64) -> Self {
        Self { epoch: 0, step: 0, position: StreamPosition::default(), cost: 0.0, bleu: 0.0, alpha }
    }

    /// Forget progress but keep the best score and learning rate.
    pub fn reset_progress(&mut self) {
        self.epoch = 0;
        self.step = 0;
        self.position = StreamPosition::default();
        self.cost = 0.0;
    }
}

// ─── Overrides ───────────────────────────────────────────────────────────────
/// One optional value per command-line flag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainOverrides {
    pub corpus:     Option<Vec<PathBuf>>,
    pub vocab:      Option<Vec<PathBuf>>,
    pub model:      Option<PathBuf>,
    pub validation: Option<PathBuf>,
    pub references: Option<Vec<PathBuf>>,
    pub lowercase:  Option<bool>,

    pub embdim:    Option<Vec<usize>>,
    pub hidden:    Option<Vec<usize>>,
    pub maxhid:    Option<usize>,
    pub maxpart:   Option<usize>,
    pub deephid:   Option<usize>,
    pub scale:     Option<f64>,
    pub keep_prob: Option<f64>,

    pub maxepoch:  Option<usize>,
    pub alpha:     Option<f64>,
    pub momentum:  Option<f64>,
    pub batch:     Option<usize>,
    pub optimizer: Option<OptimizerKind>,
    pub norm:      Option<f32>,
    pub stop:      Option<usize>,
    pub decay:     Option<f64>,
    pub l2_scale:  Option<f32>,
    pub seed:      Option<u64>,
    pub criterion: Option<Criterion>,
    pub sample:    Option<usize>,
    pub sharp:     Option<f32>,

    pub sort:    Option<usize>,
    pub shuffle: Option<bool>,
    pub limit:   Option<Vec<usize>>,

    pub freq:  Option<usize>,
    pub vfreq: Option<usize>,
    pub sfreq: Option<usize>,

    pub beamsize:  Option<usize>,
    pub normalize: Option<bool>,
    pub maxlen:    Option<usize>,
    pub minlen:    Option<usize>,
}

fn fixed<const N: usize>(flag: &str, values: &[usize]) -> Result<[usize; N]> {
    values
        .try_into()
        .map_err(|_| anyhow::anyhow!("--{flag} expects {N} values, got {}", values.len()))
}

macro_rules! take {
    ($cfg:ident, $ov:ident, $($field:ident),+ $(,)?) => {
        $( if let Some(v) = $ov.$field.clone() { $cfg.$field = v; } )+
    };
}

macro_rules! take_opt {
    ($cfg:ident, $ov:ident, $($field:ident),+ $(,)?) => {
        $( if let Some(v) = $ov.$field.clone() { $cfg.$field = Some(v); } )+
    };
}

/// Merge defaults (or a resumed config) with command-line overrides.
///
/// `base` is the config found in the checkpoint being resumed, or
/// `None` for a fresh run. Errors are raised before anything is
/// written to disk.
pub fn resolve(base: Option<TrainConfig>, ov: &TrainOverrides) -> Result<TrainConfig> {
    let fresh = base.is_none();
    if fresh {
        ensure!(ov.corpus.is_some(), "--corpus is required when training a new model");
        ensure!(ov.vocab.is_some(), "--vocab is required when training a new model");
    }

    let mut cfg = base.unwrap_or_default();

    if fresh {
        take!(cfg, ov, vocab, maxhid, maxpart, deephid);
        if let Some(v) = &ov.embdim {
            cfg.embdim = fixed("embdim", v)?;
        }
        if let Some(v) = &ov.hidden {
            cfg.hidden = fixed("hidden", v)?;
        }
    }

    take!(
        cfg, ov,
        corpus, model, references, lowercase, scale,
        maxepoch, alpha, momentum, batch, optimizer, norm, stop, decay, seed,
        criterion, sample, sharp, sort, shuffle, freq, vfreq, sfreq,
        beamsize, normalize,
    );
    take_opt!(cfg, ov, validation, keep_prob, l2_scale, maxlen, minlen);

    if let Some(limit) = &ov.limit {
        cfg.limit = match limit.as_slice() {
            &[n] => [n, n],
            &[s, t] => [s, t],
            other => bail!("--limit takes one or two values, got {}", other.len()),
        };
    }

    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_overrides() -> TrainOverrides {
        TrainOverrides {
            corpus: Some(vec!["src.txt".into(), "tgt.txt".into()]),
            vocab:  Some(vec!["src.json".into(), "tgt.json".into()]),
            model:  Some("run/nmt.ckpt".into()),
            ..TrainOverrides::default()
        }
    }

    #[test]
    fn test_fresh_run_uses_defaults() {
        let cfg = resolve(None, &fresh_overrides()).unwrap();
        assert_eq!(cfg.embdim, [620, 620]);
        assert_eq!(cfg.hidden, [1000, 1000, 1000]);
        assert_eq!(cfg.limit, [50, 50]);
        assert_eq!(cfg.optimizer, OptimizerKind::RmsProp);
        assert_eq!(cfg.model, PathBuf::from("run/nmt.ckpt"));
    }

    #[test]
    fn test_fresh_run_requires_corpus_and_vocab() {
        let mut ov = fresh_overrides();
        ov.corpus = None;
        assert!(resolve(None, &ov).unwrap_err().to_string().contains("--corpus"));

        let mut ov = fresh_overrides();
        ov.vocab = None;
        assert!(resolve(None, &ov).unwrap_err().to_string().contains("--vocab"));
    }

    #[test]
    fn test_single_limit_applies_to_both_sides() {
        let ov = TrainOverrides { limit: Some(vec![30]), ..fresh_overrides() };
        assert_eq!(resolve(None, &ov).unwrap().limit, [30, 30]);

        let ov = TrainOverrides { limit: Some(vec![30, 40, 50]), ..fresh_overrides() };
        assert!(resolve(None, &ov).is_err());
    }

    #[test]
    fn test_resume_keeps_dimensions_and_vocab() {
        let base = resolve(None, &fresh_overrides()).unwrap();
        let ov = TrainOverrides {
            embdim:   Some(vec![8, 8]),
            vocab:    Some(vec!["other.json".into(), "other.json".into()]),
            alpha:    Some(0.1),
            maxepoch: Some(9),
            ..TrainOverrides::default()
        };
        let cfg = resolve(Some(base.clone()), &ov).unwrap();
        assert_eq!(cfg.embdim, base.embdim);
        assert_eq!(cfg.vocab, base.vocab);
        assert_eq!(cfg.alpha, 0.1);
        assert_eq!(cfg.maxepoch, 9);
    }

    #[test]
    fn test_wrong_dimension_count_is_rejected() {
        let ov = TrainOverrides { hidden: Some(vec![10, 10]), ..fresh_overrides() };
        assert!(resolve(None, &ov).is_err());
    }

    #[test]
    fn test_zero_frequency_is_rejected() {
        let ov = TrainOverrides { vfreq: Some(0), ..fresh_overrides() };
        assert!(resolve(None, &ov).is_err());
    }

    #[test]
    fn test_mrt_forces_single_sentence_batches() {
        let ov = TrainOverrides { criterion: Some(Criterion::Mrt), ..fresh_overrides() };
        let opts = resolve(None, &ov).unwrap().batch_options();
        assert_eq!((opts.batch, opts.sortk), (1, 1));
    }

    #[test]
    fn test_criterion_parses() {
        assert_eq!("mrt".parse::<Criterion>().unwrap(), Criterion::Mrt);
        assert!("ce".parse::<Criterion>().is_err());
    }
}
