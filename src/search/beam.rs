// ============================================================
// Layer 5 — Ensemble Beam Search
// ============================================================
// Best-first search over target sequences with a bounded beam.
//
// At every step:
//   1. each model yields next-token probabilities for every
//      live hypothesis; the ensemble fuses them per row
//   2. while the hypothesis is shorter than `minlen`, the EOS
//      probability is forced to zero
//   3. candidate score = parent score + ln p(token)
//   4. the best (beamsize - finished) candidates survive;
//      candidates ending in EOS move to the finished list
//
// Search stops when the beam is full of finished hypotheses,
// no live hypothesis remains, or `maxlen` steps were taken.
// Only finished hypotheses are returned; an empty list means
// no translation was produced.

use anyhow::{ensure, Result};
use std::cmp::Ordering;

use crate::domain::{
    fusion::{fuse, FusionRule},
    hypothesis::Hypothesis,
    traits::DecodingModel,
};

#[derive(Debug, Clone, PartialEq)]
pub struct BeamOptions {
    pub beamsize:  usize,
    /// Divide final scores by hypothesis length (EOS included)
    pub normalize: bool,
    /// Defaults to 3 x source length
    pub maxlen:    Option<usize>,
    /// Defaults to source length / 2
    pub minlen:    Option<usize>,
    pub fusion:    FusionRule,
}

impl Default for BeamOptions {
    fn default() -> Self {
        Self { beamsize: 10, normalize: false, maxlen: None, minlen: None, fusion: FusionRule::Geometric }
    }
}

struct Candidate {
    score:  f32,
    parent: usize,
    token:  u32,
}

/// Decode `source` (EOS included) with every model of the ensemble.
pub fn beam_search<M: DecodingModel>(
    models:  &[M],
    source:  &[u32],
    eos_id:  u32,
    options: &BeamOptions,
) -> Result<Vec<Hypothesis>> {
    ensure!(!models.is_empty(), "beam search needs at least one model");
    let beamsize = options.beamsize.max(1);
    let maxlen = options.maxlen.unwrap_or(3 * source.len());
    let minlen = options.minlen.unwrap_or(source.len() / 2);

    let mut states = models
        .iter()
        .map(|m| m.start(source))
        .collect::<Result<Vec<_>>>()?;
    let mut live: Vec<(Vec<u32>, f32)> = vec![(Vec::new(), 0.0)];
    let mut finished: Vec<Hypothesis> = Vec::new();

    for step in 0..maxlen {
        let mut model_probs = Vec::with_capacity(models.len());
        let mut stepped = Vec::with_capacity(models.len());
        for (model, state) in models.iter().zip(&states) {
            let (probs, next) = model.step(state)?;
            ensure!(probs.len() == live.len(), "model returned {} rows for {} hypotheses", probs.len(), live.len());
            model_probs.push(probs);
            stepped.push(next);
        }

        let mut candidates = Vec::new();
        for (row, (_, parent_score)) in live.iter().enumerate() {
            let per_model: Vec<&[f32]> = model_probs.iter().map(|p| p[row].as_slice()).collect();
            let mut probs = fuse(&per_model, options.fusion)?;
            if step < minlen {
                if let Some(p) = probs.get_mut(eos_id as usize) {
                    *p = 0.0;
                }
            }
            for (token, &p) in probs.iter().enumerate() {
                let score = parent_score + p.ln();
                if score.is_finite() {
                    candidates.push(Candidate { score, parent: row, token: token as u32 });
                }
            }
        }

        let width = beamsize - finished.len();
        let best = top_candidates(candidates, width);

        let mut next_live = Vec::with_capacity(best.len());
        let mut parents = Vec::with_capacity(best.len());
        let mut tokens = Vec::with_capacity(best.len());
        for c in best {
            let mut seq = live[c.parent].0.clone();
            seq.push(c.token);
            if c.token == eos_id {
                finished.push(Hypothesis::new(seq, c.score));
            } else {
                next_live.push((seq, c.score));
                parents.push(c.parent);
                tokens.push(c.token);
            }
        }

        if finished.len() >= beamsize || next_live.is_empty() {
            break;
        }

        states = models
            .iter()
            .zip(stepped)
            .map(|(m, s)| m.select(s, &parents, &tokens))
            .collect::<Result<Vec<_>>>()?;
        live = next_live;
    }

    if options.normalize {
        for h in &mut finished {
            h.score /= h.tokens.len() as f32;
        }
    }
    finished.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(finished)
}

/// The `k` best candidates, best first. Ties go to the lower
/// (parent, token) pair so results do not depend on sort internals.
fn top_candidates(mut candidates: Vec<Candidate>, k: usize) -> Vec<Candidate> {
    let order = |a: &Candidate, b: &Candidate| -> Ordering {
        b.score
            .total_cmp(&a.score)
            .then(a.parent.cmp(&b.parent))
            .then(a.token.cmp(&b.token))
    };
    if candidates.len() > k && k > 0 {
        candidates.select_nth_unstable_by(k - 1, order);
        candidates.truncate(k);
    }
    candidates.sort_by(order);
    candidates.truncate(k);
    candidates
}
