// ============================================================
// Layer 6 — RNNsearch Network
// ============================================================
// Attention-based encoder-decoder (Bahdanau et al., 2015).
//
// Encoder:
//   x_j          = E_src[source_j]
//   →h_j, ←h_j   = GRU_fwd / GRU_bwd over the masked sentence
//   a_j          = [→h_j ; ←h_j]                (annotations)
//
// Decoder, one target position i:
//   e_ij  = v · tanh(W_q s_{i-1} + W_k a_j)     (masked)
//   α_i   = softmax_j(e_ij)
//   c_i   = Σ_j α_ij a_j
//   t_i   = maxout(U s_{i-1} + V y_{i-1} + C c_i)
//   p_i   = softmax(W_o (D t_i))
//   s_i   = GRU_dec(s_{i-1}, [y_i ; c_i])
//
//   s_0 = tanh(W_init ←h_1); y_0 is the zero vector.
//
// All weights start uniform in [-scale, scale]. GRU cells are
// built from Linear layers so every tensor has a stable name in
// the parameter registry (see ml::params).

use burn::{
    nn::{
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        Initializer,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::{log_softmax, sigmoid, softmax},
};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct RnnSearchConfig {
    pub source_vocab:     usize,
    pub target_vocab:     usize,
    pub source_embdim:    usize,
    pub target_embdim:    usize,
    pub source_hidden:    usize,
    pub target_hidden:    usize,
    pub attention_hidden: usize,
    pub maxhid:           usize,
    pub maxpart:          usize,
    pub deephid:          usize,
    #[config(default = 0.08)]
    pub scale:            f64,
    #[config(default = 0.0)]
    pub dropout:          f64,
}

impl RnnSearchConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> RnnSearch<B> {
        let init = Initializer::Uniform { min: -self.scale, max: self.scale };
        let linear = |i: usize, o: usize| {
            LinearConfig::new(i, o).with_initializer(init.clone()).init(device)
        };
        let gru = |input: usize, size: usize| GruCell {
            input:  LinearConfig::new(input, 3 * size).with_initializer(init.clone()).init(device),
            hidden: LinearConfig::new(size, 3 * size)
                .with_bias(false)
                .with_initializer(init.clone())
                .init(device),
            size,
        };
        let embedding = |n: usize, d: usize| {
            EmbeddingConfig::new(n, d).with_initializer(init.clone()).init(device)
        };

        let annotation = 2 * self.source_hidden;
        let readout = self.maxhid * self.maxpart;

        RnnSearch {
            source_embedding:  embedding(self.source_vocab, self.source_embdim),
            encoder_forward:   gru(self.source_embdim, self.source_hidden),
            encoder_backward:  gru(self.source_embdim, self.source_hidden),
            decoder_init:      linear(self.source_hidden, self.target_hidden),
            target_embedding:  embedding(self.target_vocab, self.target_embdim),
            decoder_gru:       gru(self.target_embdim + annotation, self.target_hidden),
            attention_query:   linear(self.target_hidden, self.attention_hidden),
            attention_key:     linear(annotation, self.attention_hidden),
            attention_score:   linear(self.attention_hidden, 1),
            readout_hidden:    linear(self.target_hidden, readout),
            readout_prev:      linear(self.target_embdim, readout),
            readout_context:   linear(annotation, readout),
            readout_deep:      linear(self.maxhid, self.deephid),
            readout_logits:    linear(self.deephid, self.target_vocab),
            dropout:           DropoutConfig::new(self.dropout).init(),
            maxhid:            self.maxhid,
            maxpart:           self.maxpart,
        }
    }

    /// Small network for unit tests.
    #[cfg(test)]
    pub(crate) fn tiny() -> Self {
        RnnSearchConfig {
            source_vocab: 7,
            target_vocab: 6,
            source_embdim: 4,
            target_embdim: 4,
            source_hidden: 5,
            target_hidden: 5,
            attention_hidden: 3,
            maxhid: 4,
            maxpart: 2,
            deephid: 4,
            scale: 0.08,
            dropout: 0.0,
        }
    }
}

// ─── GRU cell ────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct GruCell<B: Backend> {
    /// x → [reset | update | candidate]
    pub input:  Linear<B>,
    /// h → [reset | update | candidate], no bias
    pub hidden: Linear<B>,
    pub size:   usize,
}

impl<B: Backend> GruCell<B> {
    /// x: [batch, in], h: [batch, size] → [batch, size]
    pub fn forward(&self, x: Tensor<B, 2>, h: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch, _] = h.dims();
        let n = self.size;
        let gx = self.input.forward(x);
        let gh = self.hidden.forward(h.clone());

        let gate = |t: &Tensor<B, 2>, k: usize| t.clone().slice([0..batch, k * n..(k + 1) * n]);

        let r = sigmoid(gate(&gx, 0) + gate(&gh, 0));
        let z = sigmoid(gate(&gx, 1) + gate(&gh, 1));
        let c = (gate(&gx, 2) + r * gate(&gh, 2)).tanh();

        // (1 - z) * c + z * h
        (z.clone().neg() + 1.0) * c + z * h
    }
}

/// Keep `prev` where `mask` ([batch, 1]) is zero.
fn masked_update<B: Backend>(next: Tensor<B, 2>, prev: Tensor<B, 2>, mask: Tensor<B, 2>) -> Tensor<B, 2> {
    next * mask.clone() + prev * (mask.neg() + 1.0)
}

// ─── Network ─────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct RnnSearch<B: Backend> {
    pub source_embedding: Embedding<B>,
    pub encoder_forward:  GruCell<B>,
    pub encoder_backward: GruCell<B>,
    pub decoder_init:     Linear<B>,
    pub target_embedding: Embedding<B>,
    pub decoder_gru:      GruCell<B>,
    pub attention_query:  Linear<B>,
    pub attention_key:    Linear<B>,
    pub attention_score:  Linear<B>,
    pub readout_hidden:   Linear<B>,
    pub readout_prev:     Linear<B>,
    pub readout_context:  Linear<B>,
    pub readout_deep:     Linear<B>,
    pub readout_logits:   Linear<B>,
    pub dropout:          Dropout,
    pub maxhid:           usize,
    pub maxpart:          usize,
}

/// Encoder output for a batch of source sentences.
#[derive(Debug, Clone)]
pub struct Encoded<B: Backend> {
    /// [batch, src_len, 2 * source_hidden]
    pub annotations: Tensor<B, 3>,
    /// Attention keys, [batch, src_len, attention_hidden]
    pub keys:        Tensor<B, 3>,
    /// [batch, src_len]
    pub mask:        Tensor<B, 2>,
    /// s_0, [batch, target_hidden]
    pub initial:     Tensor<B, 2>,
}

/// Teacher-forced decoder output.
pub struct Forced<B: Backend> {
    /// [batch, tgt_len, target_vocab]
    pub logits:    Tensor<B, 3>,
    /// [tgt_len, batch, src_len]
    pub attention: Tensor<B, 3>,
}

impl<B: Backend> RnnSearch<B> {
    pub fn device(&self) -> B::Device {
        self.readout_logits.weight.val().device()
    }

    pub fn target_embdim(&self) -> usize {
        let [_, d] = self.target_embedding.weight.val().dims();
        d
    }

    /// source: [batch, src_len] ids, mask: [batch, src_len]
    pub fn encode(&self, source: Tensor<B, 2, Int>, mask: Tensor<B, 2>) -> Encoded<B> {
        let [batch, len] = source.dims();
        let emb = self.source_embedding.forward(source);
        let [_, _, dim] = emb.dims();
        let device = emb.device();

        let input = |t: usize| emb.clone().slice([0..batch, t..t + 1, 0..dim]).reshape([batch, dim]);
        let step_mask = |t: usize| mask.clone().slice([0..batch, t..t + 1]);

        let mut h = Tensor::<B, 2>::zeros([batch, self.encoder_forward.size], &device);
        let mut forward = Vec::with_capacity(len);
        for t in 0..len {
            h = masked_update(self.encoder_forward.forward(input(t), h.clone()), h, step_mask(t));
            forward.push(h.clone());
        }

        let mut h = Tensor::<B, 2>::zeros([batch, self.encoder_backward.size], &device);
        let mut backward = vec![h.clone(); len];
        for t in (0..len).rev() {
            h = masked_update(self.encoder_backward.forward(input(t), h.clone()), h, step_mask(t));
            backward[t] = h.clone();
        }

        let initial = self.decoder_init.forward(backward[0].clone()).tanh();
        let steps: Vec<Tensor<B, 2>> = forward
            .into_iter()
            .zip(backward)
            .map(|(f, b)| Tensor::cat(vec![f, b], 1))
            .collect();
        let annotations: Tensor<B, 3> = Tensor::stack(steps, 1);
        let keys = self.attention_key.forward(annotations.clone());

        Encoded { annotations, keys, mask, initial }
    }

    /// Context vector [batch, 2 * source_hidden] and weights [batch, src_len].
    pub fn attend(&self, hidden: Tensor<B, 2>, enc: &Encoded<B>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let [batch, len, _] = enc.keys.dims();
        let [_, _, width] = enc.annotations.dims();

        let query = self.attention_query.forward(hidden).unsqueeze_dim::<3>(1);
        let energy = self
            .attention_score
            .forward((enc.keys.clone() + query).tanh())
            .reshape([batch, len]);
        let energy = energy + (enc.mask.clone() - 1.0) * 1.0e9;
        let alpha = softmax(energy, 1);

        let context = (alpha.clone().unsqueeze_dim::<3>(2) * enc.annotations.clone())
            .sum_dim(1)
            .reshape([batch, width]);
        (context, alpha)
    }

    /// Unnormalised next-token scores [batch, target_vocab].
    pub fn readout(&self, hidden: Tensor<B, 2>, prev: Tensor<B, 2>, context: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch, _] = hidden.dims();
        let t = self.readout_hidden.forward(hidden)
            + self.readout_prev.forward(prev)
            + self.readout_context.forward(context);
        let t = t
            .reshape([batch, self.maxhid, self.maxpart])
            .max_dim(2)
            .reshape([batch, self.maxhid]);
        let t = self.dropout.forward(t);
        self.readout_logits.forward(self.readout_deep.forward(t))
    }

    /// Embed target ids [batch] → [batch, target_embdim].
    pub fn embed_target(&self, ids: Tensor<B, 1, Int>) -> Tensor<B, 2> {
        let [batch] = ids.dims();
        let emb = self.target_embedding.forward(ids.reshape([batch, 1]));
        let [_, _, dim] = emb.dims();
        emb.reshape([batch, dim])
    }

    /// Advance the decoder after emitting `emb` under `context`.
    pub fn advance(&self, hidden: Tensor<B, 2>, emb: Tensor<B, 2>, context: Tensor<B, 2>) -> Tensor<B, 2> {
        self.decoder_gru.forward(Tensor::cat(vec![emb, context], 1), hidden)
    }

    /// Teacher-forced pass over `target` ([batch, tgt_len] ids with mask).
    pub fn forward(
        &self,
        source:      Tensor<B, 2, Int>,
        source_mask: Tensor<B, 2>,
        target:      Tensor<B, 2, Int>,
        target_mask: Tensor<B, 2>,
    ) -> Forced<B> {
        let [batch, len] = target.dims();
        let enc = self.encode(source, source_mask);
        let device = enc.initial.device();

        let mut hidden = enc.initial.clone();
        let mut prev = Tensor::<B, 2>::zeros([batch, self.target_embdim()], &device);
        let mut logits = Vec::with_capacity(len);
        let mut weights = Vec::with_capacity(len);

        for t in 0..len {
            let (context, alpha) = self.attend(hidden.clone(), &enc);
            logits.push(self.readout(hidden.clone(), prev, context.clone()));
            weights.push(alpha);

            let ids = target.clone().slice([0..batch, t..t + 1]).reshape([batch]);
            let emb = self.embed_target(ids);
            let m = target_mask.clone().slice([0..batch, t..t + 1]);
            hidden = masked_update(self.advance(hidden.clone(), emb.clone(), context), hidden, m);
            prev = emb;
        }

        Forced {
            logits:    Tensor::stack(logits, 1),
            attention: Tensor::stack(weights, 0),
        }
    }

    /// Per-sentence negative log-likelihood [batch].
    pub fn sentence_nll(&self, forced: &Forced<B>, target: Tensor<B, 2, Int>, target_mask: Tensor<B, 2>) -> Tensor<B, 1> {
        let [batch, len] = target.dims();
        let log_probs = log_softmax(forced.logits.clone(), 2);
        let picked = log_probs
            .gather(2, target.unsqueeze_dim::<3>(2))
            .reshape([batch, len]);
        (picked * target_mask).sum_dim(1).reshape([batch]).neg()
    }
}
