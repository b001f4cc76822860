// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// One subcommand per workflow: train, translate, sample,
// replace and evaluate, each with its own flag set.
//
// Training flags are all optional: on a resumed run every flag
// left out keeps the value stored in the checkpoint, so they
// convert into TrainOverrides rather than a full config.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::application::{
    config::{Criterion, TrainOverrides},
    evaluate_use_case::EvaluateOptions,
    replace_use_case::ReplaceOptions,
    sample_use_case::SampleOptions,
    train_use_case::TrainRequest,
    translate_use_case::TranslateOptions,
};
use crate::ml::engine::OptimizerKind;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a new model or resume an existing one
    Train(TrainArgs),

    /// Translate standard input with one model or an ensemble
    Translate(TranslateArgs),

    /// Draw random translations of standard input
    Sample(SampleArgs),

    /// Replace UNK tokens in a translation using attention alignments
    Replace(ReplaceArgs),

    /// Score a parallel corpus under a trained model
    Evaluate(EvaluateArgs),
}

// ─── train ───────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Source and target training files
    #[arg(long, num_args = 2, value_names = ["SOURCE", "TARGET"])]
    pub corpus: Option<Vec<PathBuf>>,

    /// Source and target vocabulary files (JSON token → id)
    #[arg(long, num_args = 2, value_names = ["SOURCE", "TARGET"])]
    pub vocab: Option<Vec<PathBuf>>,

    /// Checkpoint path; resumed from when it (or its autosave) exists
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Validation source file
    #[arg(long)]
    pub validation: Option<PathBuf>,

    /// Validation reference files
    #[arg(long, num_args = 1..)]
    pub references: Option<Vec<PathBuf>>,

    /// Lowercase validation output and references before BLEU.
    /// A bare flag means true; `--lowercase false` switches a resumed run off.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub lowercase: Option<bool>,

    #[arg(long, num_args = 2)]
    pub embdim: Option<Vec<usize>>,

    /// Encoder, decoder and attention sizes
    #[arg(long, num_args = 3)]
    pub hidden: Option<Vec<usize>>,

    #[arg(long)]
    pub maxhid: Option<usize>,

    #[arg(long)]
    pub maxpart: Option<usize>,

    #[arg(long)]
    pub deephid: Option<usize>,

    /// Uniform initialisation range
    #[arg(long)]
    pub scale: Option<f64>,

    /// Dropout keep probability
    #[arg(long)]
    pub keep_prob: Option<f64>,

    #[arg(long)]
    pub maxepoch: Option<usize>,

    /// Learning rate; overrides the resumed one
    #[arg(long)]
    pub alpha: Option<f64>,

    #[arg(long)]
    pub momentum: Option<f64>,

    #[arg(long)]
    pub batch: Option<usize>,

    /// rmsprop, adam or sgd
    #[arg(long)]
    pub optimizer: Option<OptimizerKind>,

    /// Gradient norm clipping threshold (0 disables)
    #[arg(long)]
    pub norm: Option<f32>,

    /// Epoch from which the learning rate decays
    #[arg(long)]
    pub stop: Option<usize>,

    #[arg(long)]
    pub decay: Option<f64>,

    #[arg(long)]
    pub l2_scale: Option<f32>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// mle or mrt
    #[arg(long)]
    pub criterion: Option<Criterion>,

    /// Sample space size for minimum risk training
    #[arg(long)]
    pub sample: Option<usize>,

    /// Sharpness of the MRT distribution
    #[arg(long)]
    pub sharp: Option<f32>,

    /// Batches read ahead and sorted by length
    #[arg(long)]
    pub sort: Option<usize>,

    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub shuffle: Option<bool>,

    /// Maximum sentence length in words, one value or source and target
    #[arg(long, num_args = 1..)]
    pub limit: Option<Vec<usize>>,

    /// Autosave every N steps
    #[arg(long)]
    pub freq: Option<usize>,

    /// Validate every N steps
    #[arg(long)]
    pub vfreq: Option<usize>,

    /// Log a sample translation every N steps
    #[arg(long)]
    pub sfreq: Option<usize>,

    #[arg(long)]
    pub beamsize: Option<usize>,

    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub normalize: Option<bool>,

    #[arg(long)]
    pub maxlen: Option<usize>,

    #[arg(long)]
    pub minlen: Option<usize>,

    /// Pretrained checkpoint to initialise matching parameters from
    #[arg(long)]
    pub initialize: Option<PathBuf>,

    /// Only train parameters not provided by --initialize
    #[arg(long, requires = "initialize")]
    pub finetune: bool,

    /// Restart epoch and step counters of a resumed run
    #[arg(long)]
    pub reset: bool,

    #[arg(long)]
    pub skip_val: bool,
}

impl From<TrainArgs> for TrainRequest {
    fn from(a: TrainArgs) -> Self {
        let overrides = TrainOverrides {
            corpus:     a.corpus,
            vocab:      a.vocab,
            model:      a.model,
            validation: a.validation,
            references: a.references,
            lowercase:  a.lowercase,

            embdim:    a.embdim,
            hidden:    a.hidden,
            maxhid:    a.maxhid,
            maxpart:   a.maxpart,
            deephid:   a.deephid,
            scale:     a.scale,
            keep_prob: a.keep_prob,

            maxepoch:  a.maxepoch,
            alpha:     a.alpha,
            momentum:  a.momentum,
            batch:     a.batch,
            optimizer: a.optimizer,
            norm:      a.norm,
            stop:      a.stop,
            decay:     a.decay,
            l2_scale:  a.l2_scale,
            seed:      a.seed,
            criterion: a.criterion,
            sample:    a.sample,
            sharp:     a.sharp,

            sort:    a.sort,
            shuffle: a.shuffle,
            limit:   a.limit,

            freq:  a.freq,
            vfreq: a.vfreq,
            sfreq: a.sfreq,

            beamsize:  a.beamsize,
            normalize: a.normalize,
            maxlen:    a.maxlen,
            minlen:    a.minlen,
        };
        TrainRequest {
            overrides,
            initialize: a.initialize,
            finetune:   a.finetune,
            reset:      a.reset,
            skip_val:   a.skip_val,
        }
    }
}

// ─── translate ───────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct TranslateArgs {
    /// One or more checkpoints; several form an ensemble
    #[arg(long, num_args = 1.., required = true)]
    pub model: Vec<PathBuf>,

    #[arg(long, default_value_t = 10)]
    pub beamsize: usize,

    /// Divide final scores by hypothesis length
    #[arg(long)]
    pub normalize: bool,

    /// Average ensemble probabilities instead of log-probabilities
    #[arg(long)]
    pub arithmetic: bool,

    #[arg(long)]
    pub maxlen: Option<usize>,

    #[arg(long)]
    pub minlen: Option<usize>,

    /// Reference files for oracle selection from the beam
    #[arg(long, num_args = 1..)]
    pub oracle: Vec<PathBuf>,

    #[arg(long)]
    pub lowercase: bool,
}

impl From<TranslateArgs> for TranslateOptions {
    fn from(a: TranslateArgs) -> Self {
        TranslateOptions {
            models:     a.model,
            beamsize:   a.beamsize,
            normalize:  a.normalize,
            arithmetic: a.arithmetic,
            maxlen:     a.maxlen,
            minlen:     a.minlen,
            oracle:     a.oracle,
            lowercase:  a.lowercase,
        }
    }
}

// ─── sample ──────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct SampleArgs {
    #[arg(long)]
    pub model: PathBuf,

    /// Samples drawn per input line
    #[arg(long, default_value_t = 1)]
    pub batch: usize,

    #[arg(long)]
    pub maxlen: Option<usize>,
}

impl From<SampleArgs> for SampleOptions {
    fn from(a: SampleArgs) -> Self {
        SampleOptions { model: a.model, batch: a.batch, maxlen: a.maxlen }
    }
}

// ─── replace ─────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct ReplaceArgs {
    #[arg(long, num_args = 1.., required = true)]
    pub model: Vec<PathBuf>,

    /// Source file and its translation
    #[arg(long, num_args = 2, required = true, value_names = ["SOURCE", "TRANSLATION"])]
    pub text: Vec<PathBuf>,

    /// Lexicon with `source target probability` lines
    #[arg(long)]
    pub dictionary: Option<PathBuf>,

    /// 0 copy, 1 dictionary, 2 dictionary for lowercase words only
    #[arg(long, default_value_t = 1)]
    pub heuristic: u8,

    #[arg(long, default_value_t = 128)]
    pub batch: usize,

    #[arg(long)]
    pub arithmetic: bool,
}

impl From<ReplaceArgs> for ReplaceOptions {
    fn from(a: ReplaceArgs) -> Self {
        let mut text = a.text.into_iter();
        ReplaceOptions {
            models:      a.model,
            source:      text.next().unwrap_or_default(),
            translation: text.next().unwrap_or_default(),
            dictionary:  a.dictionary,
            heuristic:   a.heuristic,
            batch:       a.batch,
            arithmetic:  a.arithmetic,
        }
    }
}

// ─── evaluate ────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    #[arg(long)]
    pub model: PathBuf,

    #[arg(long)]
    pub source: PathBuf,

    #[arg(long)]
    pub target: PathBuf,

    /// Reference alignments, `i-j` pairs per line
    #[arg(long)]
    pub align: Option<PathBuf>,

    #[arg(long, default_value_t = 128)]
    pub batch: usize,

    /// Echo each sentence pair before its cost
    #[arg(long)]
    pub verbose: bool,
}

impl From<EvaluateArgs> for EvaluateOptions {
    fn from(a: EvaluateArgs) -> Self {
        EvaluateOptions {
            model:   a.model,
            source:  a.source,
            target:  a.target,
            align:   a.align,
            batch:   a.batch,
            verbose: a.verbose,
        }
    }
}
