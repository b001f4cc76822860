// ============================================================
// Layer 2 — Model Ensemble Loading
// ============================================================
// Rebuilds one RnnSearch network per checkpoint file. Each
// checkpoint carries its own config and vocabulary, so members
// may differ in size; parameters bind by ParamKey into a fresh
// instance, which keeps members fully independent.
//
// The first model's vocabularies and symbols are used for
// encoding input and decoding output. Every member must share
// its target vocabulary size so their distributions can be fused.

use anyhow::{ensure, Result};
use burn::prelude::*;
use std::path::PathBuf;

use crate::application::config::TrainConfig;
use crate::domain::vocabulary::VocabularyPair;
use crate::infra::checkpoint::Checkpoint;
use crate::ml::{model::RnnSearch, params::import_params};

pub struct Ensemble<B: Backend> {
    pub models: Vec<RnnSearch<B>>,
    /// Config of the first member
    pub config: TrainConfig,
    /// Vocabularies of the first member
    pub vocab:  VocabularyPair,
}

impl<B: Backend> Ensemble<B> {
    pub fn load(paths: &[PathBuf], device: &B::Device) -> Result<Self> {
        ensure!(!paths.is_empty(), "at least one --model is required");

        let mut models = Vec::with_capacity(paths.len());
        let mut first: Option<(TrainConfig, VocabularyPair)> = None;

        for path in paths {
            let ckpt = Checkpoint::load(path)?;
            let network = ckpt.config.network(ckpt.vocab.source.len(), ckpt.vocab.target.len());
            let (model, report) = import_params(network.init::<B>(device), &ckpt.params)?;
            report.warn_unmatched();
            tracing::info!(
                "Loaded model '{}' ({} parameters, {} restored)",
                path.display(), model.num_params(), report.matched.len()
            );

            match &first {
                None => first = Some((ckpt.config, ckpt.vocab)),
                Some((_, vocab)) => ensure!(
                    vocab.target.len() == ckpt.vocab.target.len(),
                    "'{}' has a target vocabulary of {} entries, the first model has {}",
                    path.display(), ckpt.vocab.target.len(), vocab.target.len()
                ),
            }
            models.push(model);
        }

        let (config, vocab) = first.ok_or_else(|| anyhow::anyhow!("no model loaded"))?;
        Ok(Self { models, config, vocab })
    }
}
