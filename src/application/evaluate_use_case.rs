// ============================================================
// Layer 2 — Evaluate Use Case
// ============================================================
// Scores a parallel corpus with one model under teacher forcing
// and prints the per-sentence cost (negative log-likelihood,
// EOS included). With `--align`, the model's hard alignments are
// also compared against reference links:
//
//   verbose:   src: <source line>
//              tgt: <target line>
//   always:    cost: <nll>
//   --align:   aer: <alignment error rate>

use anyhow::{ensure, Result};
use std::{
    io::{self, Write},
    path::PathBuf,
};

use crate::application::ensemble::Ensemble;
use crate::data::{links::{parse_links, Links}, reader::read_lines};
use crate::domain::{
    alignment::alignment_error_rate, batch::TokenBatch, traits::DecodingModel, vocabulary::VocabularyPair,
};
use crate::ml::{self, DecodeBackend};

#[derive(Debug, Clone)]
pub struct EvaluateOptions {
    pub model:   PathBuf,
    pub source:  PathBuf,
    pub target:  PathBuf,
    pub align:   Option<PathBuf>,
    pub batch:   usize,
    pub verbose: bool,
}

pub struct EvaluateUseCase {
    options: EvaluateOptions,
}

/// Corpus totals printed once all sentences are scored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationSummary {
    pub sentences: usize,
    pub mean_cost: f64,
    pub mean_aer:  Option<f64>,
}

impl EvaluateUseCase {
    pub fn new(options: EvaluateOptions) -> Self {
        Self { options }
    }

    pub fn execute(&self) -> Result<()> {
        let opts = &self.options;
        ensure!(opts.batch >= 1, "--batch must be at least 1");

        let device = ml::device();
        let ensemble = Ensemble::<DecodeBackend>::load(std::slice::from_ref(&opts.model), &device)?;

        let sources = read_lines(&opts.source)?;
        let targets = read_lines(&opts.target)?;
        ensure!(
            sources.len() == targets.len(),
            "'{}' has {} lines but '{}' has {}",
            opts.source.display(), sources.len(), opts.target.display(), targets.len()
        );

        let links = match &opts.align {
            None => None,
            Some(path) => {
                let links = read_lines(path)?
                    .iter()
                    .map(|l| parse_links(l))
                    .collect::<Result<Vec<_>>>()?;
                ensure!(
                    links.len() == sources.len(),
                    "'{}' has {} lines, expected {}",
                    path.display(), links.len(), sources.len()
                );
                Some(links)
            }
        };

        let stdout = io::stdout();
        let mut out = stdout.lock();
        let summary = evaluate_lines(
            &ensemble.models[0],
            &ensemble.vocab,
            opts.batch,
            opts.verbose,
            &sources,
            &targets,
            links.as_deref(),
            &mut out,
        )?;

        match summary.mean_aer {
            Some(aer) => tracing::info!(
                "Evaluated {} sentences: mean cost {:.4}, mean AER {:.4}",
                summary.sentences, summary.mean_cost, aer
            ),
            None => tracing::info!("Evaluated {} sentences: mean cost {:.4}", summary.sentences, summary.mean_cost),
        }
        Ok(())
    }
}

fn word_count(line: &str) -> usize {
    line.split_whitespace().count()
}

#[allow(clippy::too_many_arguments)]
pub fn evaluate_lines<D: DecodingModel, W: Write>(
    model:   &D,
    vocab:   &VocabularyPair,
    batch:   usize,
    verbose: bool,
    sources: &[String],
    targets: &[String],
    links:   Option<&[Links]>,
    output:  &mut W,
) -> Result<EvaluationSummary> {
    let mut sentences = 0;
    let mut total_cost = 0.0f64;
    let mut total_aer = 0.0f64;

    let size = batch.max(1);
    for (chunk, (src_chunk, tgt_chunk)) in sources.chunks(size).zip(targets.chunks(size)).enumerate() {
        let tokens = TokenBatch::from_lines(src_chunk, tgt_chunk, vocab);
        let costs = model.score(&tokens)?;
        let grid = match links {
            Some(_) => Some(model.align(&tokens)?),
            None => None,
        };

        for (b, (source, target)) in src_chunk.iter().zip(tgt_chunk).enumerate() {
            if verbose {
                writeln!(output, "src: {}", source.trim())?;
                writeln!(output, "tgt: {}", target.trim())?;
            }
            writeln!(output, "cost: {:.6}", costs[b])?;
            total_cost += f64::from(costs[b]);

            if let (Some(links), Some(grid)) = (links, &grid) {
                let predicted = grid.links(b, word_count(source), word_count(target));
                let aer = alignment_error_rate(&predicted, &links[chunk * size + b]);
                writeln!(output, "aer: {:.6}", aer)?;
                total_aer += aer;
            }
            sentences += 1;
        }
    }
    output.flush()?;

    let mean = |total: f64| if sentences == 0 { 0.0 } else { total / sentences as f64 };
    Ok(EvaluationSummary {
        sentences,
        mean_cost: mean(total_cost),
        mean_aer:  links.map(|_| mean(total_aer)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{alignment::AlignmentGrid, vocabulary::Vocabulary};
    use crate::search::testing::TableModel;
    use std::collections::{BTreeMap, HashSet};

    // a → 0, b → 1, UNK = 2, <eos> = 3
    fn vocab() -> VocabularyPair {
        let map: BTreeMap<String, u32> = [("a", 0), ("b", 1)].iter().map(|(t, i)| (t.to_string(), *i)).collect();
        let v = Vocabulary::from_map(map, "UNK", "<eos>").unwrap();
        VocabularyPair { source: v.clone(), target: v }
    }

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    // first token "a" with p = 0.5, then EOS with p = 1
    fn model() -> TableModel {
        TableModel::new(vec![vec![0.5, 0.5, 0.0, 0.0], vec![0.0, 0.0, 0.0, 1.0]])
    }

    #[test]
    fn test_prints_cost_per_sentence() {
        let mut out = Vec::new();
        let summary = evaluate_lines(
            &model(), &vocab(), 1, false, &lines(&["a", "b"]), &lines(&["a", "b"]), None, &mut out,
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        let expected = format!("cost: {:.6}\n", -(0.5f32.ln()));
        assert_eq!(text, expected.repeat(2));
        assert_eq!(summary.sentences, 2);
        assert!((summary.mean_cost - f64::from(-(0.5f32.ln()))).abs() < 1e-6);
        assert_eq!(summary.mean_aer, None);
    }

    #[test]
    fn test_verbose_echoes_pair() {
        let mut out = Vec::new();
        evaluate_lines(&model(), &vocab(), 4, true, &lines(&["a b"]), &lines(&["b"]), None, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut rows = text.lines();
        assert_eq!(rows.next(), Some("src: a b"));
        assert_eq!(rows.next(), Some("tgt: b"));
        assert!(rows.next().unwrap().starts_with("cost: "));
    }

    #[test]
    fn test_alignment_error_rate_against_reference() {
        // "a b" + EOS against "b a" + EOS, crossing alignment
        let w = vec![
            0.0, 1.0, 0.0,
            1.0, 0.0, 0.0,
            0.0, 0.0, 1.0,
        ];
        let aligned = model().with_alignment(AlignmentGrid::new(3, 3, 1, w).unwrap());
        let reference = vec![HashSet::from([(0, 1), (1, 0)])];

        let mut out = Vec::new();
        let summary = evaluate_lines(
            &aligned, &vocab(), 1, false, &lines(&["a b"]), &lines(&["b a"]), Some(&reference), &mut out,
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.ends_with("aer: 0.000000\n"));
        assert_eq!(summary.mean_aer, Some(0.0));
    }
}
