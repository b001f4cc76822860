// ============================================================
// Layer 6 — Incremental Decoding
// ============================================================
// RnnSearch as a DecodingModel. A decoding session encodes one
// source sentence and then carries, per live hypothesis row:
//
//   hidden   s_{i-1}
//   prev     embedding of the last emitted token (zeros at start)
//   context  c_i, filled by `step` and consumed by `select`
//
// Encoder outputs are shared by all rows; `select` gathers the
// per-row tensors by parent index and replicates the encoder
// outputs to the new row count.

use anyhow::{anyhow, ensure, Context, Result};
use burn::{prelude::*, tensor::activation::softmax};

use crate::domain::{
    alignment::AlignmentGrid,
    batch::{Padded, TokenBatch},
    traits::DecodingModel,
};
use crate::ml::model::{Encoded, RnnSearch};

#[derive(Debug, Clone)]
pub struct DecodeState<B: Backend> {
    encoded: Encoded<B>,
    hidden:  Tensor<B, 2>,
    prev:    Tensor<B, 2>,
    context: Option<Tensor<B, 2>>,
}

impl<B: Backend> DecodeState<B> {
    pub fn rows(&self) -> usize {
        let [rows, _] = self.hidden.dims();
        rows
    }
}

/// Ids [batch, max_len] and mask [batch, max_len] tensors.
pub fn padded_tensors<B: Backend>(p: &Padded, device: &B::Device) -> (Tensor<B, 2, Int>, Tensor<B, 2>) {
    let ids = Tensor::<B, 1, Int>::from_ints(p.ids.as_slice(), device).reshape([p.batch, p.max_len]);
    let mask = Tensor::<B, 1>::from_floats(p.mask.as_slice(), device).reshape([p.batch, p.max_len]);
    (ids, mask)
}

pub fn to_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("cannot read tensor: {e:?}"))
}

fn gather_rows<B: Backend, const D: usize>(tensor: Tensor<B, D>, rows: &Tensor<B, 1, Int>) -> Tensor<B, D> {
    tensor.select(0, rows.clone())
}

impl<B: Backend> DecodingModel for RnnSearch<B> {
    type State = DecodeState<B>;

    fn start(&self, source: &[u32]) -> Result<Self::State> {
        ensure!(!source.is_empty(), "cannot decode an empty source sequence");
        let device = self.device();
        let padded = crate::domain::batch::pad(&[source.to_vec()]);
        let (ids, mask) = padded_tensors::<B>(&padded, &device);
        let encoded = self.encode(ids, mask);
        let hidden = encoded.initial.clone();
        let prev = Tensor::zeros([1, self.target_embdim()], &device);
        Ok(DecodeState { encoded, hidden, prev, context: None })
    }

    fn step(&self, state: &Self::State) -> Result<(Vec<Vec<f32>>, Self::State)> {
        let (context, _) = self.attend(state.hidden.clone(), &state.encoded);
        let logits = self.readout(state.hidden.clone(), state.prev.clone(), context.clone());
        let [rows, vocab] = logits.dims();
        let probs = to_vec(softmax(logits, 1))?;
        let probs = probs.chunks(vocab).map(<[f32]>::to_vec).collect::<Vec<_>>();
        ensure!(probs.len() == rows, "decoder produced {} rows, expected {}", probs.len(), rows);

        let mut next = state.clone();
        next.context = Some(context);
        Ok((probs, next))
    }

    fn select(&self, state: Self::State, parents: &[usize], tokens: &[u32]) -> Result<Self::State> {
        ensure!(parents.len() == tokens.len(), "{} parents for {} tokens", parents.len(), tokens.len());
        let rows = state.rows();
        ensure!(parents.iter().all(|&p| p < rows), "parent row out of range (have {rows} rows)");
        let context = state.context.context("select called before step")?;

        let device = self.device();
        let parents: Vec<i32> = parents.iter().map(|&p| p as i32).collect();
        let parents = Tensor::<B, 1, Int>::from_ints(parents.as_slice(), &device);
        let tokens: Vec<i32> = tokens.iter().map(|&t| t as i32).collect();
        let tokens = Tensor::<B, 1, Int>::from_ints(tokens.as_slice(), &device);

        let hidden = gather_rows(state.hidden, &parents);
        let context = gather_rows(context, &parents);
        let emb = self.embed_target(tokens);
        let hidden = self.advance(hidden, emb.clone(), context);

        let enc = state.encoded;
        let encoded = Encoded {
            annotations: gather_rows(enc.annotations, &parents),
            keys:        gather_rows(enc.keys, &parents),
            mask:        gather_rows(enc.mask, &parents),
            initial:     gather_rows(enc.initial, &parents),
        };

        Ok(DecodeState { encoded, hidden, prev: emb, context: None })
    }

    fn align(&self, batch: &TokenBatch) -> Result<AlignmentGrid> {
        let device = self.device();
        let (src, src_mask) = padded_tensors::<B>(&batch.padded_source(), &device);
        let (tgt, tgt_mask) = padded_tensors::<B>(&batch.padded_target(), &device);
        let forced = self.forward(src, src_mask, tgt, tgt_mask);

        // [tgt, batch, src] → [tgt, src, batch]
        let attention = forced.attention.swap_dims(1, 2);
        let [t, s, b] = attention.dims();
        AlignmentGrid::new(t, s, b, to_vec(attention)?)
    }

    fn score(&self, batch: &TokenBatch) -> Result<Vec<f32>> {
        let device = self.device();
        let (src, src_mask) = padded_tensors::<B>(&batch.padded_source(), &device);
        let (tgt, tgt_mask) = padded_tensors::<B>(&batch.padded_target(), &device);
        let forced = self.forward(src, src_mask, tgt.clone(), tgt_mask.clone());
        to_vec(self.sentence_nll(&forced, tgt, tgt_mask))
    }
}
