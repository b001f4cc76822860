// ============================================================
// Layer 6 — Named Parameter Access
// ============================================================
// Walks every tensor of an RnnSearch network under its logical
// ParamKey. Three walkers are built on top of it:
//
//   export  — copy every tensor into a ParamStore (host memory)
//   import  — bind stored values whose key and shape match,
//             leaving the rest at their current values
//   freeze  — stop gradient tracking for all tensors whose key
//             is not in a given set (fine-tuning)

use anyhow::{anyhow, Result};
use burn::{
    module::Param,
    nn::{Embedding, Linear},
    prelude::*,
    tensor::TensorData,
};
use std::collections::HashSet;

use crate::domain::params::{ImportReport, ParamBlob, ParamKey, ParamStore};
use crate::ml::model::{GruCell, RnnSearch};

pub trait ParamVisitor<B: Backend> {
    fn visit<const D: usize>(&mut self, key: ParamKey, param: Param<Tensor<B, D>>) -> Result<Param<Tensor<B, D>>>;
}

fn map_linear<B: Backend, V: ParamVisitor<B>>(name: &str, mut linear: Linear<B>, v: &mut V) -> Result<Linear<B>> {
    linear.weight = v.visit(ParamKey::weight(name), linear.weight)?;
    linear.bias = match linear.bias {
        Some(bias) => Some(v.visit(ParamKey::bias(name), bias)?),
        None => None,
    };
    Ok(linear)
}

fn map_embedding<B: Backend, V: ParamVisitor<B>>(name: &str, mut emb: Embedding<B>, v: &mut V) -> Result<Embedding<B>> {
    emb.weight = v.visit(ParamKey::weight(name), emb.weight)?;
    Ok(emb)
}

fn map_gru<B: Backend, V: ParamVisitor<B>>(name: &str, mut gru: GruCell<B>, v: &mut V) -> Result<GruCell<B>> {
    gru.input = map_linear(&format!("{name}.input"), gru.input, v)?;
    gru.hidden = map_linear(&format!("{name}.hidden"), gru.hidden, v)?;
    Ok(gru)
}

impl<B: Backend> RnnSearch<B> {
    /// Visit every parameter in a fixed order.
    pub fn map_params<V: ParamVisitor<B>>(mut self, v: &mut V) -> Result<Self> {
        self.source_embedding = map_embedding("encoder.embedding", self.source_embedding, v)?;
        self.encoder_forward  = map_gru("encoder.forward", self.encoder_forward, v)?;
        self.encoder_backward = map_gru("encoder.backward", self.encoder_backward, v)?;
        self.decoder_init     = map_linear("decoder.init", self.decoder_init, v)?;
        self.target_embedding = map_embedding("decoder.embedding", self.target_embedding, v)?;
        self.decoder_gru      = map_gru("decoder.gru", self.decoder_gru, v)?;
        self.attention_query  = map_linear("decoder.attention.query", self.attention_query, v)?;
        self.attention_key    = map_linear("decoder.attention.key", self.attention_key, v)?;
        self.attention_score  = map_linear("decoder.attention.score", self.attention_score, v)?;
        self.readout_hidden   = map_linear("decoder.readout.hidden", self.readout_hidden, v)?;
        self.readout_prev     = map_linear("decoder.readout.prev", self.readout_prev, v)?;
        self.readout_context  = map_linear("decoder.readout.context", self.readout_context, v)?;
        self.readout_deep     = map_linear("decoder.readout.deep", self.readout_deep, v)?;
        self.readout_logits   = map_linear("decoder.readout.logits", self.readout_logits, v)?;
        Ok(self)
    }
}

// ─── Export ──────────────────────────────────────────────────────────────────
struct Exporter {
    store: ParamStore,
}

impl<B: Backend> ParamVisitor<B> for Exporter {
    fn visit<const D: usize>(&mut self, key: ParamKey, param: Param<Tensor<B, D>>) -> Result<Param<Tensor<B, D>>> {
        let tensor = param.val();
        let shape = tensor.dims().to_vec();
        let values = tensor
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| anyhow!("cannot read parameter {key}: {e:?}"))?;
        self.store.insert(key, ParamBlob::new(shape, values));
        Ok(param)
    }
}

pub fn export_params<B: Backend>(model: &RnnSearch<B>) -> Result<ParamStore> {
    let mut exporter = Exporter { store: ParamStore::new() };
    model.clone().map_params(&mut exporter)?;
    Ok(exporter.store)
}

// ─── Import ──────────────────────────────────────────────────────────────────
struct Importer<'a> {
    store:  &'a ParamStore,
    report: ImportReport,
}

impl<B: Backend> ParamVisitor<B> for Importer<'_> {
    fn visit<const D: usize>(&mut self, key: ParamKey, param: Param<Tensor<B, D>>) -> Result<Param<Tensor<B, D>>> {
        let current = param.val();
        let blob = match self.store.get(&key) {
            Some(blob) if blob.shape.as_slice() == current.dims().as_slice() => blob,
            _ => {
                self.report.unmatched.push(key);
                return Ok(param);
            }
        };

        let data = TensorData::new(blob.values.clone(), blob.shape.clone());
        let mut tensor = Tensor::<B, D>::from_data(data, &current.device());
        if current.is_require_grad() {
            tensor = tensor.require_grad();
        }
        self.report.matched.push(key);
        Ok(Param::initialized(param.id, tensor))
    }
}

pub fn import_params<B: Backend>(model: RnnSearch<B>, store: &ParamStore) -> Result<(RnnSearch<B>, ImportReport)> {
    let mut importer = Importer { store, report: ImportReport::default() };
    let model = model.map_params(&mut importer)?;
    Ok((model, importer.report))
}

// ─── Freeze ──────────────────────────────────────────────────────────────────
struct Freezer<'a> {
    trainable: HashSet<&'a ParamKey>,
}

impl<B: Backend> ParamVisitor<B> for Freezer<'_> {
    fn visit<const D: usize>(&mut self, key: ParamKey, param: Param<Tensor<B, D>>) -> Result<Param<Tensor<B, D>>> {
        if self.trainable.contains(&key) {
            Ok(param)
        } else {
            Ok(param.set_require_grad(false))
        }
    }
}

/// Stop gradient flow into every parameter outside `trainable`.
pub fn freeze_except<B: Backend>(model: RnnSearch<B>, trainable: &[ParamKey]) -> Result<RnnSearch<B>> {
    let mut freezer = Freezer { trainable: trainable.iter().collect() };
    model.map_params(&mut freezer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::RnnSearchConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn model() -> RnnSearch<TestBackend> {
        RnnSearchConfig::tiny().init(&Default::default())
    }

    #[test]
    fn test_export_names_every_tensor() {
        let store = export_params(&model()).unwrap();
        let keys: Vec<String> = store.keys().map(ToString::to_string).collect();
        assert!(keys.contains(&"encoder.embedding.weight".to_string()));
        assert!(keys.contains(&"decoder.gru.hidden.weight".to_string()));
        assert!(!keys.contains(&"decoder.gru.hidden.bias".to_string()));
        assert_eq!(store.numel(), model().num_params());
    }

    #[test]
    fn test_import_copies_values_between_instances() {
        let source = export_params(&model()).unwrap();
        let (target, report) = import_params(model(), &source).unwrap();
        assert!(report.unmatched.is_empty());
        assert_eq!(report.matched.len(), source.len());
        assert_eq!(export_params(&target).unwrap(), source);
    }

    #[test]
    fn test_missing_or_misshapen_entries_are_unmatched() {
        let mut store = export_params(&model()).unwrap();
        store.insert(ParamKey::weight("decoder.init"), ParamBlob::new(vec![1], vec![0.0]));
        let partial: ParamStore = {
            let mut s = ParamStore::new();
            for (k, b) in store.iter().filter(|(k, _)| k.module != "decoder.readout.logits") {
                s.insert(k.clone(), b.clone());
            }
            s
        };
        let (_, report) = import_params(model(), &partial).unwrap();
        let unmatched: Vec<String> = report.unmatched.iter().map(ToString::to_string).collect();
        assert!(unmatched.contains(&"decoder.init.weight".to_string()));
        assert!(unmatched.contains(&"decoder.readout.logits.weight".to_string()));
        assert!(unmatched.contains(&"decoder.readout.logits.bias".to_string()));
        assert_eq!(unmatched.len(), 3);
    }
}
