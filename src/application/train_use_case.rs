// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Sets up one training run and hands it to the Orchestrator:
//
//   Step 1: Find a checkpoint to resume     (Layer 7 - infra)
//   Step 2: Resolve the config and state    (Layer 2 - config)
//   Step 3: Load vocabularies (fresh run)   (Layer 3 - domain)
//   Step 4: Build network + optimiser       (Layer 6 - ml)
//   Step 5: Restore resumed parameters      (Layer 6 - ml)
//   Step 6: Initialise / fine-tune subset   (Layer 6 - ml)
//   Step 7: Open the corpus stream          (Layer 4 - data)
//   Step 8: Run the orchestrator            (Layer 2)
//
// The optimiser type is chosen at runtime, so Steps 5-8 are
// written once over any TrainableModel and instantiated per
// optimiser kind.

use anyhow::{ensure, Context, Result};
use std::path::PathBuf;

use crate::application::{
    config::{resolve, RunState, TrainConfig, TrainOverrides},
    orchestrator::{restore_stream, Orchestrator, ValidationSet},
};
use crate::data::{batcher::BatchStream, reader::TextReader};
use crate::domain::{
    params::ParamStore,
    traits::TrainableModel,
    vocabulary::{Vocabulary, VocabularyPair},
};
use crate::infra::{
    checkpoint::{Checkpoint, CheckpointManager},
    metrics::MetricsLogger,
};
use crate::ml::{
    self,
    engine::{adam, rmsprop, sgd, NmtEngine, OptimizerKind},
    TrainBackend,
};

// ─── Request ─────────────────────────────────────────────────────────────────
/// Everything the `train` command was given.
#[derive(Debug, Clone, Default)]
pub struct TrainRequest {
    pub overrides:  TrainOverrides,
    /// Pretrained checkpoint whose matching parameters seed the model
    pub initialize: Option<PathBuf>,
    /// Train only the parameters `initialize` did not provide
    pub finetune:   bool,
    /// Restart epoch/step/cost of a resumed run
    pub reset:      bool,
    pub skip_val:   bool,
}

/// A run ready to start: resolved config, vocabularies, counters
/// and whatever a resumed checkpoint carried.
pub struct PreparedRun {
    pub cfg:         TrainConfig,
    pub vocab:       VocabularyPair,
    pub checkpoints: CheckpointManager,
    pub state:       RunState,
    pub params:      Option<ParamStore>,
    pub indices:     Option<Vec<usize>>,
}

/// Steps 1-3: nothing is written to disk here.
pub fn prepare(request: &TrainRequest) -> Result<PreparedRun> {
    let mut overrides = request.overrides.clone();
    let model_path = overrides.model.clone().unwrap_or_else(|| TrainConfig::default().model);
    overrides.model = Some(model_path.clone());

    let checkpoints = CheckpointManager::new(model_path);
    let resumed = checkpoints.load_existing()?;

    let (base, vocab, state, params, indices) = match resumed {
        Some(ckpt) => (Some(ckpt.config), Some(ckpt.vocab), Some(ckpt.state), Some(ckpt.params), ckpt.indices),
        None => (None, None, None, None, None),
    };
    let cfg = resolve(base, &overrides)?;

    let vocab = match vocab {
        Some(vocab) => vocab,
        None => VocabularyPair {
            source: Vocabulary::load(&cfg.vocab[0], &cfg.unk, &cfg.eos)?,
            target: Vocabulary::load(&cfg.vocab[1], &cfg.unk, &cfg.eos)?,
        },
    };
    tracing::info!("Vocabulary sizes: source {}, target {}", vocab.source.len(), vocab.target.len());

    let mut state = state.unwrap_or_else(|| RunState::new(cfg.alpha));
    if let Some(alpha) = request.overrides.alpha {
        state.alpha = alpha;
    }
    if request.reset {
        tracing::info!("Resetting epoch and step counters");
        state.reset_progress();
    }

    Ok(PreparedRun { cfg, vocab, checkpoints, state, params, indices })
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    request: TrainRequest,
}

impl TrainUseCase {
    pub fn new(request: TrainRequest) -> Self {
        Self { request }
    }

    pub fn execute(&self) -> Result<()> {
        let run = prepare(&self.request)?;
        let cfg = &run.cfg;

        // ── Step 4: Build network + optimiser ────────────────────────────────
        let device = ml::device();
        let network = cfg
            .network(run.vocab.source.len(), run.vocab.target.len())
            .init::<TrainBackend>(&device);
        let settings = cfg.optimizer_settings();
        let kind = cfg.optimizer;
        tracing::info!("Optimizer: {} (norm {}, l2 {:?})", kind, settings.norm, settings.l2_scale);

        match kind {
            OptimizerKind::RmsProp => {
                let optim = rmsprop::<TrainBackend>(&settings);
                self.train(NmtEngine::new(network, optim), run)
            }
            OptimizerKind::Adam => {
                let optim = adam::<TrainBackend>(&settings);
                self.train(NmtEngine::new(network, optim), run)
            }
            OptimizerKind::Sgd => {
                let optim = sgd::<TrainBackend>(&settings);
                self.train(NmtEngine::new(network, optim), run)
            }
        }
    }

    /// Steps 5-6. A pretrained checkpoint is applied after the resumed
    /// parameters, so its values win wherever both provide a key.
    pub fn load_parameters<M: TrainableModel>(&self, model: &mut M, resumed: Option<&ParamStore>) -> Result<()> {
        // ── Step 5: Restore resumed parameters ───────────────────────────────
        if let Some(params) = resumed {
            model.import_params(params)?.warn_unmatched();
        }

        // ── Step 6: Initialise from a pretrained model ───────────────────────
        if let Some(path) = &self.request.initialize {
            let pretrained = Checkpoint::load(path)
                .with_context(|| format!("Cannot initialise from '{}'", path.display()))?;
            let report = model.import_params(&pretrained.params)?;
            tracing::info!("Initialised {} parameters from '{}'", report.matched.len(), path.display());
            report.warn_unmatched();
            if self.request.finetune {
                ensure!(!report.unmatched.is_empty(), "no variables to finetune");
                tracing::info!("Fine-tuning {} parameters", report.unmatched.len());
                model.restrict_trainable(&report.unmatched)?;
            }
        }
        Ok(())
    }

    /// Steps 5-8 for any model.
    pub fn train<M: TrainableModel>(&self, mut model: M, run: PreparedRun) -> Result<()> {
        let PreparedRun { cfg, vocab, checkpoints, state, params, indices } = run;

        self.load_parameters(&mut model, params.as_ref())?;
        tracing::info!("Model has {} parameters", model.parameter_count());

        // ── Step 7: Open the corpus stream ───────────────────────────────────
        let reader = TextReader::open(&cfg.corpus, cfg.shuffle_seed())?;
        tracing::info!("Corpus: {} sentence pairs", reader.len());
        let mut stream = BatchStream::new(reader, cfg.batch_options());
        restore_stream(&mut stream, &state, indices)?;

        // ── Step 8: Run ──────────────────────────────────────────────────────
        let mut orchestrator = Orchestrator::new(&cfg, &vocab, &checkpoints, model, stream, state);
        match (&cfg.validation, self.request.skip_val) {
            (Some(source), false) if !cfg.references.is_empty() => {
                let set = ValidationSet::load(source, &cfg.references, cfg.lowercase)?;
                tracing::info!("Validation: {} sentences", set.sources.len());
                let metrics = MetricsLogger::new(checkpoints.metrics_path())?;
                orchestrator = orchestrator.with_validation(set, metrics);
            }
            (Some(_), false) => tracing::warn!("--validation given without --references, validation disabled"),
            _ => {}
        }

        orchestrator.run()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        batch::TokenBatch,
        params::{ImportReport, ParamBlob, ParamKey},
    };
    use crate::search::testing::TableModel;
    use std::fs;
    use tempfile::TempDir;

    /// Scalar parameters by name; records what fine-tuning froze.
    #[derive(Debug, Default)]
    struct RecordingModel {
        params:     ParamStore,
        restricted: Option<Vec<ParamKey>>,
    }

    impl RecordingModel {
        fn with_keys(names: &[&str]) -> Self {
            let mut model = Self::default();
            for name in names {
                model.params.insert(ParamKey::weight(*name), ParamBlob::new(vec![1], vec![0.0]));
            }
            model
        }

        fn value(&self, name: &str) -> f32 {
            self.params.get(&ParamKey::weight(name)).unwrap().values[0]
        }
    }

    impl TrainableModel for RecordingModel {
        type Decoder = TableModel;

        fn decoder(&self) -> TableModel {
            TableModel::new(vec![vec![0.1, 0.1, 0.1, 0.7]])
        }

        fn train_mle(&mut self, _batch: &TokenBatch, _alpha: f64) -> Result<f32> {
            Ok(1.0)
        }

        fn train_mrt(&mut self, _source: &[u32], _candidates: &[Vec<u32>], _risks: &[f32], _sharp: f32, _alpha: f64) -> Result<f32> {
            Ok(0.5)
        }

        fn export_params(&self) -> Result<ParamStore> {
            Ok(self.params.clone())
        }

        fn import_params(&mut self, store: &ParamStore) -> Result<ImportReport> {
            let mut report = ImportReport::default();
            let keys: Vec<ParamKey> = self.params.keys().cloned().collect();
            for key in keys {
                match store.get(&key) {
                    Some(blob) if blob.shape == vec![1] => {
                        self.params.insert(key.clone(), blob.clone());
                        report.matched.push(key);
                    }
                    _ => report.unmatched.push(key),
                }
            }
            Ok(report)
        }

        fn restrict_trainable(&mut self, keys: &[ParamKey]) -> Result<()> {
            self.restricted = Some(keys.to_vec());
            Ok(())
        }

        fn parameter_count(&self) -> usize {
            self.params.numel()
        }
    }

    fn scalars(values: &[(&str, f32)]) -> ParamStore {
        let mut store = ParamStore::new();
        for (name, value) in values {
            store.insert(ParamKey::weight(*name), ParamBlob::new(vec![1], vec![*value]));
        }
        store
    }

    /// Writes a checkpoint holding `params` to `<dir>/<name>`.
    fn write_pretrained(dir: &TempDir, name: &str, params: ParamStore) -> PathBuf {
        let run = prepare(&request(dir)).unwrap();
        let path = dir.path().join(name);
        let ckpt = Checkpoint { config: run.cfg, vocab: run.vocab, state: run.state, params, indices: None };
        ckpt.save(&path).unwrap();
        path
    }

    fn write_vocab(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, r#"{"a": 0, "b": 1}"#).unwrap();
        path
    }

    fn request(dir: &TempDir) -> TrainRequest {
        TrainRequest {
            overrides: TrainOverrides {
                corpus: Some(vec![dir.path().join("src.txt"), dir.path().join("tgt.txt")]),
                vocab:  Some(vec![write_vocab(dir, "src.json"), write_vocab(dir, "tgt.json")]),
                model:  Some(dir.path().join("nmt.ckpt")),
                ..TrainOverrides::default()
            },
            ..TrainRequest::default()
        }
    }

    fn save_progress(run: &PreparedRun) {
        let mut state = run.state.clone();
        state.epoch = 3;
        state.step = 12;
        state.bleu = 0.3;
        let ckpt = Checkpoint {
            config:  run.cfg.clone(),
            vocab:   run.vocab.clone(),
            state,
            params:  ParamStore::new(),
            indices: None,
        };
        run.checkpoints.save_autosave(&ckpt).unwrap();
    }

    #[test]
    fn test_fresh_run_loads_vocabularies() {
        let dir = tempfile::tempdir().unwrap();
        let run = prepare(&request(&dir)).unwrap();
        // a, b, UNK, <eos>
        assert_eq!(run.vocab.source.len(), 4);
        assert_eq!(run.state, RunState::new(run.cfg.alpha));
        assert!(run.params.is_none());
    }

    #[test]
    fn test_resume_keeps_counters_and_applies_alpha_override() {
        let dir = tempfile::tempdir().unwrap();
        save_progress(&prepare(&request(&dir)).unwrap());

        let mut req = request(&dir);
        req.overrides.alpha = Some(1e-5);
        let run = prepare(&req).unwrap();
        assert_eq!(run.state.epoch, 3);
        assert_eq!(run.state.step, 12);
        assert_eq!(run.state.alpha, 1e-5);
        assert!(run.params.is_some());
    }

    #[test]
    fn test_reset_zeroes_progress_but_keeps_best_bleu() {
        let dir = tempfile::tempdir().unwrap();
        save_progress(&prepare(&request(&dir)).unwrap());

        let run = prepare(&TrainRequest { reset: true, ..request(&dir) }).unwrap();
        assert_eq!(run.state.epoch, 0);
        assert_eq!(run.state.step, 0);
        assert_eq!(run.state.bleu, 0.3);
    }

    #[test]
    fn test_missing_vocab_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request(&dir);
        req.overrides.vocab = Some(vec![dir.path().join("nope.json"), dir.path().join("nope.json")]);
        assert!(prepare(&req).is_err());
    }

    #[test]
    fn test_pretrained_values_override_resumed_values() {
        let dir = tempfile::tempdir().unwrap();
        let pretrained = write_pretrained(&dir, "pre.ckpt", scalars(&[("w", 2.0)]));
        let use_case = TrainUseCase::new(TrainRequest { initialize: Some(pretrained), ..request(&dir) });

        let mut model = RecordingModel::with_keys(&["w", "v"]);
        let resumed = scalars(&[("w", 1.0), ("v", 1.0)]);
        use_case.load_parameters(&mut model, Some(&resumed)).unwrap();
        assert_eq!(model.value("w"), 2.0);
        assert_eq!(model.value("v"), 1.0);
        assert!(model.restricted.is_none());
    }

    #[test]
    fn test_finetune_trains_only_parameters_the_pretrained_model_lacks() {
        let dir = tempfile::tempdir().unwrap();
        let pretrained = write_pretrained(&dir, "pre.ckpt", scalars(&[("w", 2.0)]));
        let use_case = TrainUseCase::new(TrainRequest {
            initialize: Some(pretrained),
            finetune: true,
            ..request(&dir)
        });

        let mut model = RecordingModel::with_keys(&["w", "v"]);
        let resumed = scalars(&[("w", 1.0), ("v", 1.0)]);
        use_case.load_parameters(&mut model, Some(&resumed)).unwrap();
        assert_eq!(model.restricted, Some(vec![ParamKey::weight("v")]));
    }

    #[test]
    fn test_finetune_with_nothing_left_to_train_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let pretrained = write_pretrained(&dir, "pre.ckpt", scalars(&[("w", 2.0), ("v", 2.0)]));
        let use_case = TrainUseCase::new(TrainRequest {
            initialize: Some(pretrained),
            finetune: true,
            ..request(&dir)
        });

        let mut model = RecordingModel::with_keys(&["w", "v"]);
        let err = use_case.load_parameters(&mut model, None).unwrap_err();
        assert!(err.to_string().contains("no variables to finetune"));
        assert!(model.restricted.is_none());
    }

    #[test]
    fn test_missing_pretrained_checkpoint_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let use_case = TrainUseCase::new(TrainRequest {
            initialize: Some(dir.path().join("absent.ckpt")),
            ..request(&dir)
        });
        let mut model = RecordingModel::with_keys(&["w"]);
        assert!(use_case.load_parameters(&mut model, None).is_err());
    }

    #[test]
    fn test_resumed_run_with_initialize_saves_pretrained_values() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("src.txt"), "a\nb\n").unwrap();
        fs::write(dir.path().join("tgt.txt"), "b\na\n").unwrap();
        let pretrained = write_pretrained(&dir, "pre.ckpt", scalars(&[("w", 2.0)]));

        let mut req = request(&dir);
        req.overrides.maxepoch = Some(1);
        let run = prepare(&req).unwrap();
        let ckpt = Checkpoint {
            config:  run.cfg.clone(),
            vocab:   run.vocab.clone(),
            state:   run.state.clone(),
            params:  scalars(&[("w", 1.0)]),
            indices: None,
        };
        run.checkpoints.save_autosave(&ckpt).unwrap();

        let use_case = TrainUseCase::new(TrainRequest { initialize: Some(pretrained), ..req.clone() });
        let run = prepare(&req).unwrap();
        let autosave = run.checkpoints.autosave_path();
        use_case.train(RecordingModel::with_keys(&["w"]), run).unwrap();

        let saved = Checkpoint::load(&autosave).unwrap();
        assert_eq!(saved.state.epoch, 1);
        assert_eq!(saved.params.get(&ParamKey::weight("w")).unwrap().values, vec![2.0]);
    }
}
