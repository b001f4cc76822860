// ============================================================
// Layer 2 — Sample Use Case
// ============================================================
// Draws `batch` random translations for every line read from
// standard input and prints one sample per output line. A line
// for which nothing could be drawn prints a single empty line.
// The random generator is seeded from the model's training seed,
// so repeated runs print the same samples.

use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    time::Instant,
};

use crate::application::ensemble::Ensemble;
use crate::domain::{traits::DecodingModel, vocabulary::VocabularyPair};
use crate::ml::{self, DecodeBackend};
use crate::search::sampler::sample;

#[derive(Debug, Clone)]
pub struct SampleOptions {
    pub model:  PathBuf,
    pub batch:  usize,
    /// Defaults to 3 x source length
    pub maxlen: Option<usize>,
}

pub struct SampleUseCase {
    options: SampleOptions,
}

impl SampleUseCase {
    pub fn new(options: SampleOptions) -> Self {
        Self { options }
    }

    pub fn execute(&self) -> Result<()> {
        let device = ml::device();
        let ensemble = Ensemble::<DecodeBackend>::load(std::slice::from_ref(&self.options.model), &device)?;
        let mut rng = StdRng::seed_from_u64(ensemble.config.seed);

        let stdin = io::stdin();
        let stdout = io::stdout();
        let mut out = stdout.lock();
        sample_lines(
            &ensemble.models[0],
            &ensemble.vocab,
            self.options.batch,
            self.options.maxlen,
            &mut rng,
            stdin.lock(),
            &mut out,
        )?;
        Ok(())
    }
}

pub fn sample_lines<D: DecodingModel, G: Rng, R: BufRead, W: Write>(
    model:  &D,
    vocab:  &VocabularyPair,
    batch:  usize,
    maxlen: Option<usize>,
    rng:    &mut G,
    input:  R,
    output: &mut W,
) -> Result<usize> {
    let mut count = 0;
    for line in input.lines() {
        let line = line?;
        let started = Instant::now();

        let source = vocab.source.encode(line.trim());
        let maxlen = maxlen.unwrap_or(3 * source.len());
        let samples = sample(model, &source, batch, maxlen, vocab.target.eos_id(), rng)?;

        if samples.is_empty() {
            writeln!(output)?;
        }
        for s in &samples {
            writeln!(output, "{}", vocab.target.decode(s).join(" "))?;
        }

        count += 1;
        tracing::debug!("{} {:.3}s", count, started.elapsed().as_secs_f64());
    }
    output.flush()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::vocabulary::Vocabulary;
    use crate::search::testing::TableModel;
    use std::collections::BTreeMap;

    fn vocab() -> VocabularyPair {
        let map: BTreeMap<String, u32> = [("a", 0), ("b", 1)].iter().map(|(t, i)| (t.to_string(), *i)).collect();
        let v = Vocabulary::from_map(map, "UNK", "<eos>").unwrap();
        VocabularyPair { source: v.clone(), target: v }
    }

    // always "b" then EOS (a = 0, b = 1, UNK = 2, <eos> = 3)
    fn model() -> TableModel {
        TableModel::new(vec![vec![0.0, 1.0, 0.0, 0.0], vec![0.0, 0.0, 0.0, 1.0]])
    }

    #[test]
    fn test_prints_batch_samples_per_line() {
        let mut out = Vec::new();
        let mut rng = StdRng::seed_from_u64(1);
        let n = sample_lines(&model(), &vocab(), 3, None, &mut rng, "a\nb a\n".as_bytes(), &mut out).unwrap();
        assert_eq!(n, 2);
        assert_eq!(String::from_utf8(out).unwrap(), "b\nb\nb\nb\nb\nb\n");
    }

    #[test]
    fn test_zero_samples_prints_empty_line() {
        let mut out = Vec::new();
        let mut rng = StdRng::seed_from_u64(1);
        sample_lines(&model(), &vocab(), 0, None, &mut rng, "a\n".as_bytes(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "\n");
    }

    #[test]
    fn test_maxlen_truncates_samples() {
        let mut out = Vec::new();
        let mut rng = StdRng::seed_from_u64(1);
        let looping = TableModel::new(vec![vec![1.0, 0.0, 0.0, 0.0]]);
        sample_lines(&looping, &vocab(), 1, Some(2), &mut rng, "a\n".as_bytes(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a a\n");
    }
}
