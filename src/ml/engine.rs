// ============================================================
// Layer 6 — Training Engine
// ============================================================
// Couples an RnnSearch network on an autodiff backend with one
// optimiser and exposes both through TrainableModel.
//
//   MLE   loss = mean over the batch of sentence NLL
//   MRT   q    = softmax(-sharp * nll)     over the sample space
//         loss = Σ q · risk                 (expected risk)
//
// Each train call is one backward pass + one optimiser step:
//   grads = loss.backward()
//   model = optim.step(alpha, model, grads)
//
// Reference: Shen et al. (2016) Minimum Risk Training for NMT

use anyhow::{bail, ensure, Result};
use burn::{
    grad_clipping::GradientClippingConfig,
    module::AutodiffModule,
    optim::{
        decay::WeightDecayConfig, momentum::MomentumConfig, AdamConfig, GradientsParams,
        Optimizer, RmsPropConfig, SgdConfig,
    },
    prelude::*,
    tensor::{activation::softmax, backend::AutodiffBackend},
};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::domain::{
    batch::TokenBatch,
    params::{ImportReport, ParamKey, ParamStore},
    traits::TrainableModel,
};
use crate::ml::{
    decoder::padded_tensors,
    model::RnnSearch,
    params::{export_params, freeze_except, import_params},
};

// ─── Optimiser choice ────────────────────────────────────────────────────────
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    #[default]
    RmsProp,
    Adam,
    Sgd,
}

impl FromStr for OptimizerKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rmsprop" => Ok(Self::RmsProp),
            "adam"    => Ok(Self::Adam),
            "sgd"     => Ok(Self::Sgd),
            other     => bail!("unknown optimizer '{other}' (expected rmsprop, adam or sgd)"),
        }
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RmsProp => "rmsprop",
            Self::Adam    => "adam",
            Self::Sgd     => "sgd",
        })
    }
}

/// Hyperparameters shared by every optimiser.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerSettings {
    pub momentum: f64,
    /// Gradient norm clipping threshold; 0 disables clipping.
    pub norm:     f32,
    pub l2_scale: Option<f32>,
}

impl OptimizerSettings {
    fn clipping(&self) -> Option<GradientClippingConfig> {
        (self.norm > 0.0).then_some(GradientClippingConfig::Norm(self.norm))
    }

    fn decay(&self) -> Option<WeightDecayConfig> {
        self.l2_scale.map(WeightDecayConfig::new)
    }
}

pub fn rmsprop<B: AutodiffBackend>(s: &OptimizerSettings) -> impl Optimizer<RnnSearch<B>, B> {
    RmsPropConfig::new()
        .with_grad_clipping(s.clipping())
        .with_weight_decay(s.decay())
        .init::<B, RnnSearch<B>>()
}

pub fn adam<B: AutodiffBackend>(s: &OptimizerSettings) -> impl Optimizer<RnnSearch<B>, B> {
    AdamConfig::new()
        .with_epsilon(1e-8)
        .with_grad_clipping(s.clipping())
        .with_weight_decay(s.decay())
        .init::<B, RnnSearch<B>>()
}

pub fn sgd<B: AutodiffBackend>(s: &OptimizerSettings) -> impl Optimizer<RnnSearch<B>, B> {
    let momentum = (s.momentum > 0.0).then(|| MomentumConfig::new().with_momentum(s.momentum));
    SgdConfig::new()
        .with_momentum(momentum)
        .with_gradient_clipping(s.clipping())
        .with_weight_decay(s.decay())
        .init::<B, RnnSearch<B>>()
}

// ─── Engine ──────────────────────────────────────────────────────────────────
pub struct NmtEngine<B: AutodiffBackend, O: Optimizer<RnnSearch<B>, B>> {
    model:  RnnSearch<B>,
    optim:  O,
}

impl<B: AutodiffBackend, O: Optimizer<RnnSearch<B>, B>> NmtEngine<B, O> {
    pub fn new(model: RnnSearch<B>, optim: O) -> Self {
        Self { model, optim }
    }

    pub fn model(&self) -> &RnnSearch<B> {
        &self.model
    }

    fn apply(&mut self, loss: Tensor<B, 1>, alpha: f64) -> f32 {
        let cost = loss.clone().into_scalar().elem::<f32>();
        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self.optim.step(alpha, self.model.clone(), grads);
        cost
    }

    fn batch_nll(&self, batch: &TokenBatch) -> Tensor<B, 1> {
        let device = self.model.device();
        let (src, src_mask) = padded_tensors::<B>(&batch.padded_source(), &device);
        let (tgt, tgt_mask) = padded_tensors::<B>(&batch.padded_target(), &device);
        let forced = self.model.forward(src, src_mask, tgt.clone(), tgt_mask.clone());
        self.model.sentence_nll(&forced, tgt, tgt_mask)
    }
}

impl<B: AutodiffBackend, O: Optimizer<RnnSearch<B>, B>> TrainableModel for NmtEngine<B, O> {
    type Decoder = RnnSearch<B::InnerBackend>;

    fn decoder(&self) -> Self::Decoder {
        self.model.valid()
    }

    fn train_mle(&mut self, batch: &TokenBatch, alpha: f64) -> Result<f32> {
        ensure!(!batch.is_empty(), "empty training batch");
        let loss = self.batch_nll(batch).mean();
        Ok(self.apply(loss, alpha))
    }

    fn train_mrt(&mut self, source: &[u32], candidates: &[Vec<u32>], risks: &[f32], sharp: f32, alpha: f64) -> Result<f32> {
        ensure!(!candidates.is_empty(), "empty sample space");
        ensure!(
            candidates.len() == risks.len(),
            "{} candidates but {} risk values", candidates.len(), risks.len()
        );

        let sources = vec![source.to_vec(); candidates.len()];
        let batch = TokenBatch::new(sources, candidates.to_vec());
        let nll = self.batch_nll(&batch);

        let q = softmax(nll.mul_scalar(-sharp), 0);
        let risk = Tensor::<B, 1>::from_floats(risks, &self.model.device());
        let loss = (q * risk).sum();
        Ok(self.apply(loss, alpha))
    }

    fn export_params(&self) -> Result<ParamStore> {
        export_params(&self.model)
    }

    fn import_params(&mut self, store: &ParamStore) -> Result<ImportReport> {
        let (model, report) = import_params(self.model.clone(), store)?;
        self.model = model;
        Ok(report)
    }

    fn restrict_trainable(&mut self, keys: &[ParamKey]) -> Result<()> {
        ensure!(!keys.is_empty(), "no variables to finetune");
        self.model = freeze_except(self.model.clone(), keys)?;
        Ok(())
    }

    fn parameter_count(&self) -> usize {
        self.model.num_params()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::RnnSearchConfig;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn settings() -> OptimizerSettings {
        OptimizerSettings { momentum: 0.0, norm: 1.0, l2_scale: None }
    }

    fn engine() -> NmtEngine<TestBackend, impl Optimizer<RnnSearch<TestBackend>, TestBackend>> {
        let model = RnnSearchConfig::tiny().init::<TestBackend>(&Default::default());
        NmtEngine::new(model, adam::<TestBackend>(&settings()))
    }

    fn batch() -> TokenBatch {
        TokenBatch::new(vec![vec![1, 2, 6], vec![3, 6]], vec![vec![1, 2, 5], vec![3, 5]])
    }

    #[test]
    fn test_optimizer_kind_parses() {
        assert_eq!("adam".parse::<OptimizerKind>().unwrap(), OptimizerKind::Adam);
        assert_eq!(OptimizerKind::default().to_string(), "rmsprop");
        assert!("adadelta".parse::<OptimizerKind>().is_err());
    }

    #[test]
    fn test_mle_cost_decreases_on_repeated_batch() {
        let mut engine = engine();
        let first = engine.train_mle(&batch(), 0.05).unwrap();
        let mut last = first;
        for _ in 0..20 {
            last = engine.train_mle(&batch(), 0.05).unwrap();
        }
        assert!(last < first, "cost did not decrease: {first} -> {last}");
    }

    #[test]
    fn test_mrt_shifts_mass_to_low_risk_candidate() {
        let mut engine = engine();
        let source = vec![1, 2, 6];
        let candidates = vec![vec![1, 2, 5], vec![4, 4, 5]];
        let risks = vec![0.0, 1.0];

        let first = engine.train_mrt(&source, &candidates, &risks, 1.0, 0.05).unwrap();
        let mut last = first;
        for _ in 0..20 {
            last = engine.train_mrt(&source, &candidates, &risks, 1.0, 0.05).unwrap();
        }
        assert!((0.0..=1.0).contains(&first));
        assert!(last < first);
    }

    #[test]
    fn test_mrt_rejects_mismatched_risks() {
        let mut engine = engine();
        assert!(engine.train_mrt(&[1, 6], &[vec![1, 5]], &[0.1, 0.2], 1.0, 0.01).is_err());
    }

    #[test]
    fn test_restricted_training_leaves_frozen_params() {
        let mut engine = engine();
        let trainable = vec![ParamKey::weight("decoder.readout.logits"), ParamKey::bias("decoder.readout.logits")];
        engine.restrict_trainable(&trainable).unwrap();

        let before = engine.export_params().unwrap();
        engine.train_mle(&batch(), 0.05).unwrap();
        let after = engine.export_params().unwrap();

        let frozen = ParamKey::weight("encoder.embedding");
        assert_eq!(before.get(&frozen), after.get(&frozen));
        assert_ne!(before.get(&trainable[0]), after.get(&trainable[0]));
    }

    #[test]
    fn test_empty_finetune_set_is_fatal() {
        let mut engine = engine();
        let err = engine.restrict_trainable(&[]).unwrap_err();
        assert!(err.to_string().contains("no variables to finetune"));
    }

    #[test]
    fn test_decoder_snapshot_matches_parameters() {
        let engine = engine();
        assert_eq!(engine.decoder().num_params(), engine.parameter_count());
    }
}
