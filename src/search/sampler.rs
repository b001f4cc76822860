// ============================================================
// Layer 5 — Sampler
// ============================================================
// Draws complete target sequences from the model's own
// distribution (ancestral sampling, no beam). One source
// sentence is replicated into `count` rows; each row draws a
// token per step until it emits EOS or `maxlen` tokens were
// drawn. Finished rows are dropped from the model state so
// later steps only run the rows still alive.
//
// Sampled sequences are returned without the EOS token.

use anyhow::{Context, Result};
use rand::{distributions::WeightedIndex, prelude::Distribution, Rng};

use crate::domain::traits::DecodingModel;

pub fn sample<M: DecodingModel, R: Rng>(
    model:  &M,
    source: &[u32],
    count:  usize,
    maxlen: usize,
    eos_id: u32,
    rng:    &mut R,
) -> Result<Vec<Vec<u32>>> {
    let mut samples: Vec<Vec<u32>> = vec![Vec::new(); count];
    if count == 0 || maxlen == 0 {
        return Ok(samples);
    }

    let mut state = model.start(source)?;
    // row -> sample index; the first step has a single shared row
    let mut rows: Vec<usize> = vec![0];
    let mut first = true;

    for _ in 0..maxlen {
        let (probs, stepped) = model.step(&state)?;

        let drawn: Vec<(usize, u32)> = if first {
            let dist = distribution(&probs[0])?;
            (0..count).map(|i| (i, dist.sample(rng) as u32)).collect()
        } else {
            rows.iter()
                .zip(&probs)
                .map(|(&i, p)| Ok((i, distribution(p)?.sample(rng) as u32)))
                .collect::<Result<Vec<_>>>()?
        };

        let mut parents = Vec::new();
        let mut tokens = Vec::new();
        let mut alive = Vec::new();
        for (pos, &(i, token)) in drawn.iter().enumerate() {
            if token == eos_id {
                continue;
            }
            samples[i].push(token);
            parents.push(if first { 0 } else { pos });
            tokens.push(token);
            alive.push(i);
        }

        if alive.is_empty() {
            break;
        }
        state = model.select(stepped, &parents, &tokens)?;
        rows = alive;
        first = false;
    }

    Ok(samples)
}

fn distribution(probs: &[f32]) -> Result<WeightedIndex<f32>> {
    WeightedIndex::new(probs).context("model produced an invalid next-token distribution")
}
