// ============================================================
// Layer 3 — BLEU
// ============================================================
// Corpus-level BLEU over whitespace tokens with up to 4-grams,
// uniform weights and multiple references per candidate.
//
//   p_n  = sum clipped n-gram matches / sum candidate n-grams
//   BP   = 1                    if c > r
//          exp(1 - r / c)       otherwise (0 when c = 0)
//   BLEU = BP * exp(mean(ln p_n))
//
// r is the sum, over candidates, of the reference length closest
// to the candidate length (shorter reference on ties).
//
// With smoothing, one is added to numerator and denominator of
// every order above unigrams; sentence-level scores used as MRT
// risk and for oracle selection are computed this way.

use std::collections::HashMap;

const MAX_ORDER: usize = 4;

fn ngram_counts<S: AsRef<str>>(tokens: &[S], n: usize) -> HashMap<Vec<&str>, usize> {
    let mut counts = HashMap::new();
    if tokens.len() < n {
        return counts;
    }
    for window in tokens.windows(n) {
        let key: Vec<&str> = window.iter().map(AsRef::as_ref).collect();
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

/// (clipped matches, candidate n-gram total) for one candidate.
fn modified_precision<S: AsRef<str>>(candidate: &[S], references: &[Vec<S>], n: usize) -> (usize, usize) {
    let cand_counts = ngram_counts(candidate, n);
    let total: usize = cand_counts.values().sum();

    let mut max_ref: HashMap<Vec<&str>, usize> = HashMap::new();
    for reference in references {
        for (gram, count) in ngram_counts(reference, n) {
            let slot = max_ref.entry(gram).or_insert(0);
            *slot = (*slot).max(count);
        }
    }

    let clipped = cand_counts
        .iter()
        .map(|(gram, &count)| count.min(max_ref.get(gram).copied().unwrap_or(0)))
        .sum();

    (clipped, total)
}

fn closest_ref_length<S>(candidate_len: usize, references: &[Vec<S>]) -> usize {
    references
        .iter()
        .map(Vec::len)
        .min_by_key(|&len| (len.abs_diff(candidate_len), len))
        .unwrap_or(0)
}

/// Corpus BLEU of `candidates` against per-candidate reference sets.
pub fn corpus_bleu<S: AsRef<str>>(candidates: &[Vec<S>], references: &[Vec<Vec<S>>], smoothing: bool) -> f64 {
    let mut matches = [0usize; MAX_ORDER];
    let mut totals  = [0usize; MAX_ORDER];
    let mut cand_len = 0usize;
    let mut ref_len  = 0usize;

    for (candidate, refs) in candidates.iter().zip(references) {
        for n in 0..MAX_ORDER {
            let (m, t) = modified_precision(candidate, refs, n + 1);
            matches[n] += m;
            totals[n]  += t;
        }
        cand_len += candidate.len();
        ref_len  += closest_ref_length(candidate.len(), refs);
    }

    let mut log_precision = 0.0f64;
    for n in 0..MAX_ORDER {
        let (mut m, mut t) = (matches[n] as f64, totals[n] as f64);
        if smoothing && n > 0 {
            m += 1.0;
            t += 1.0;
        }
        if m == 0.0 || t == 0.0 {
            return 0.0;
        }
        log_precision += (m / t).ln() / MAX_ORDER as f64;
    }

    let bp = if cand_len == 0 {
        0.0
    } else if cand_len > ref_len {
        1.0
    } else {
        (1.0 - ref_len as f64 / cand_len as f64).exp()
    };

    bp * log_precision.exp()
}

/// Smoothed BLEU of one candidate against its references.
pub fn sentence_bleu<S: AsRef<str>>(candidate: &[S], references: &[Vec<S>]) -> f64
where
    S: Clone,
{
    corpus_bleu(&[candidate.to_vec()], &[references.to_vec()], true)
}
