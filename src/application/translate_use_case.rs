// ============================================================
// Layer 2 — Translate Use Case
// ============================================================
// Reads one source sentence per line from standard input and
// writes one line per input to standard output:
//
//   plain:    best hypothesis
//   oracle:   top ||| top_score ||| oracle_index ||| oracle_hyp ||| oracle_score
//
// With oracle references, every hypothesis of the beam is scored
// with smoothed sentence BLEU against that line's references and
// the best one (strictly better wins, index 0 by default) is
// reported with its model score. A beam that finishes no
// hypothesis yields an empty line and the sentinel score -10000.

use anyhow::{ensure, Result};
use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    time::Instant,
};

use crate::application::ensemble::Ensemble;
use crate::data::references::{load_references, References};
use crate::domain::{fusion::FusionRule, hypothesis::Hypothesis, traits::DecodingModel, vocabulary::VocabularyPair};
use crate::ml::{self, DecodeBackend};
use crate::search::{beam::{beam_search, BeamOptions}, risk::select_oracle};

/// Score reported when no hypothesis was found.
pub const FAILED_SCORE: f32 = -10000.0;

#[derive(Debug, Clone)]
pub struct TranslateOptions {
    pub models:     Vec<PathBuf>,
    pub beamsize:   usize,
    pub normalize:  bool,
    pub arithmetic: bool,
    pub maxlen:     Option<usize>,
    pub minlen:     Option<usize>,
    pub oracle:     Vec<PathBuf>,
    pub lowercase:  bool,
}

/// Reference sets used to pick an oracle hypothesis per line.
pub struct Oracle {
    pub references: References,
    pub lowercase:  bool,
}

pub struct TranslateUseCase {
    options: TranslateOptions,
}

impl TranslateUseCase {
    pub fn new(options: TranslateOptions) -> Self {
        Self { options }
    }

    pub fn execute(&self) -> Result<()> {
        let opts = &self.options;
        ensure!(opts.beamsize >= 1, "--beamsize must be at least 1");

        let device = ml::device();
        let ensemble = Ensemble::<DecodeBackend>::load(&opts.models, &device)?;

        let oracle = if opts.oracle.is_empty() {
            None
        } else {
            Some(Oracle { references: load_references(&opts.oracle, opts.lowercase)?, lowercase: opts.lowercase })
        };

        let beam = BeamOptions {
            beamsize:  opts.beamsize,
            normalize: opts.normalize,
            maxlen:    opts.maxlen,
            minlen:    opts.minlen,
            fusion:    FusionRule::from_arithmetic_flag(opts.arithmetic),
        };

        let stdin = io::stdin();
        let stdout = io::stdout();
        let mut out = stdout.lock();
        let count = translate_lines(&ensemble.models, &ensemble.vocab, &beam, oracle.as_ref(), stdin.lock(), &mut out)?;
        tracing::info!("Translated {} sentences", count);
        Ok(())
    }
}

fn format_plain(hyps: &[Hypothesis], vocab: &VocabularyPair) -> String {
    hyps.first().map(|h| h.sentence(&vocab.target)).unwrap_or_default()
}

fn format_oracle(hyps: &[Hypothesis], vocab: &VocabularyPair, oracle: &Oracle, line: usize) -> Result<String> {
    let references = oracle
        .references
        .get(line)
        .ok_or_else(|| anyhow::anyhow!("no oracle reference for input line {}", line + 1))?;

    let candidates: Vec<Vec<String>> = hyps
        .iter()
        .map(|h| {
            h.words(&vocab.target)
                .into_iter()
                .map(|w| if oracle.lowercase { w.to_lowercase() } else { w })
                .collect()
        })
        .collect();
    let (best, _) = select_oracle(&candidates, references);

    let (top, top_score) = hyps
        .first()
        .map_or((String::new(), FAILED_SCORE), |h| (h.sentence(&vocab.target), h.score));
    let (oracle_hyp, oracle_score) = hyps
        .get(best)
        .map_or((String::new(), FAILED_SCORE), |h| (h.sentence(&vocab.target), h.score));

    Ok(format!("{top} ||| {top_score} ||| {best} ||| {oracle_hyp} ||| {oracle_score}"))
}

/// Translate every line of `input`; returns the number of lines.
pub fn translate_lines<D: DecodingModel, R: BufRead, W: Write>(
    models: &[D],
    vocab:  &VocabularyPair,
    beam:   &BeamOptions,
    oracle: Option<&Oracle>,
    input:  R,
    output: &mut W,
) -> Result<usize> {
    let mut count = 0;
    for line in input.lines() {
        let line = line?;
        let started = Instant::now();

        let source = vocab.source.encode(line.trim());
        let hyps = beam_search(models, &source, vocab.target.eos_id(), beam)?;
        let score = hyps.first().map_or(FAILED_SCORE, |h| h.score);
        if hyps.is_empty() {
            tracing::warn!("no translation found for line {}", count + 1);
        }

        let text = match oracle {
            None => format_plain(&hyps, vocab),
            Some(oracle) => format_oracle(&hyps, vocab, oracle, count)?,
        };
        writeln!(output, "{text}")?;

        count += 1;
        tracing::debug!("{} {} {:.3}s", count, score, started.elapsed().as_secs_f64());
    }
    output.flush()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::references::tokenize;
    use crate::domain::vocabulary::Vocabulary;
    use crate::search::testing::TableModel;
    use std::collections::BTreeMap;

    // a b c → 0..2, UNK = 3, <eos> = 4
    fn vocab() -> VocabularyPair {
        let map: BTreeMap<String, u32> = [("a", 0), ("b", 1), ("c", 2)].iter().map(|(t, i)| (t.to_string(), *i)).collect();
        let v = Vocabulary::from_map(map, "UNK", "<eos>").unwrap();
        VocabularyPair { source: v.clone(), target: v }
    }

    // "a" then EOS is best; "b" then EOS second
    fn model() -> TableModel {
        TableModel::new(vec![
            vec![0.6, 0.4, 0.0, 0.0, 0.0],
            vec![0.0, 0.0, 0.0, 0.0, 1.0],
        ])
    }

    fn beam() -> BeamOptions {
        BeamOptions { beamsize: 2, minlen: Some(1), ..BeamOptions::default() }
    }

    #[test]
    fn test_plain_output_one_line_per_input() {
        let mut out = Vec::new();
        let n = translate_lines(&[model()], &vocab(), &beam(), None, "a b\nc\n".as_bytes(), &mut out).unwrap();
        assert_eq!(n, 2);
        assert_eq!(String::from_utf8(out).unwrap(), "a\na\n");
    }

    #[test]
    fn test_failed_search_prints_empty_line() {
        // only EOS has mass, and EOS is blocked below minlen
        let dead = TableModel::new(vec![vec![0.0, 0.0, 0.0, 0.0, 1.0]]);
        let mut out = Vec::new();
        translate_lines(&[dead], &vocab(), &beam(), None, "a\n".as_bytes(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "\n");
    }

    #[test]
    fn test_oracle_record_picks_best_bleu_hypothesis() {
        let oracle = Oracle { references: vec![vec![tokenize("b", false)]], lowercase: false };
        let mut out = Vec::new();
        translate_lines(&[model()], &vocab(), &beam(), Some(&oracle), "a\n".as_bytes(), &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let fields: Vec<&str> = text.trim_end().split(" ||| ").collect();
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[0], "a");
        assert_eq!(fields[2], "1");
        assert_eq!(fields[3], "b");
        let top: f32 = fields[1].parse().unwrap();
        let oracle_score: f32 = fields[4].parse().unwrap();
        assert!((top - 0.6f32.ln()).abs() < 1e-5);
        assert!((oracle_score - 0.4f32.ln()).abs() < 1e-5);
    }

    #[test]
    fn test_missing_oracle_line_is_an_error() {
        let oracle = Oracle { references: vec![], lowercase: false };
        let mut out = Vec::new();
        assert!(translate_lines(&[model()], &vocab(), &beam(), Some(&oracle), "a\n".as_bytes(), &mut out).is_err());
    }
}
