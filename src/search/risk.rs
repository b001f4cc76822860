// ============================================================
// Layer 5 — Sample Space and Risk
// ============================================================
// Minimum risk training works on a finite candidate set per
// source sentence:
//
//   space = references ∪ non-empty samples   (deduplicated,
//                                             references first)
//   risk(y) = 1 - smoothed_sentence_bleu(y, references)
//
// The same smoothed sentence BLEU picks the oracle hypothesis
// out of a beam when decoding against references.

use crate::domain::bleu::sentence_bleu;

/// Deduplicated candidate strings for one source sentence.
pub fn build_sample_space<S: AsRef<str>>(references: &[String], samples: &[Vec<S>]) -> Vec<String> {
    let mut space: Vec<String> = Vec::with_capacity(references.len() + samples.len());

    for r in references {
        if !space.contains(r) {
            space.push(r.clone());
        }
    }

    for s in samples {
        if s.is_empty() {
            continue;
        }
        let joined = s.iter().map(AsRef::as_ref).collect::<Vec<&str>>().join(" ");
        if !space.contains(&joined) {
            space.push(joined);
        }
    }

    space
}

/// One risk value per candidate.
pub fn risk_scores(space: &[String], references: &[Vec<String>]) -> Vec<f32> {
    space
        .iter()
        .map(|candidate| {
            let words: Vec<&str> = candidate.split_whitespace().collect();
            let refs: Vec<Vec<&str>> = references
                .iter()
                .map(|r| r.iter().map(String::as_str).collect())
                .collect();
            (1.0 - sentence_bleu(&words, &refs)) as f32
        })
        .collect()
}

/// Index and score of the candidate with the highest smoothed BLEU.
/// Only a strictly better score replaces the current choice, which
/// starts at index 0 with score 0.
pub fn select_oracle(candidates: &[Vec<String>], references: &[Vec<String>]) -> (usize, f64) {
    let mut best = (0, 0.0);
    for (i, candidate) in candidates.iter().enumerate() {
        let score = sentence_bleu(candidate.as_slice(), references);
        if score > best.1 {
            best = (i, score);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_sample_space_dedups_and_drops_empty() {
        let refs: Vec<String> = vec!["a b".into(), "a b".into(), "c".into()];
        let samples = vec![words(""), words("a b"), words("d e")];
        let space = build_sample_space(&refs, &samples);

        assert_eq!(space.len(), 3);
        let mut sorted = space.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["a b", "c", "d e"]);
        // references lead
        assert_eq!(space[0], "a b");
    }

    #[test]
    fn test_reference_has_lowest_risk() {
        let refs = vec![words("the cat sat on the mat")];
        let space: Vec<String> = vec!["the cat sat on the mat".into(), "a dog".into()];
        let risks = risk_scores(&space, &refs);
        assert!(risks[0].abs() < 1e-6);
        assert!(risks[1] > 0.5);
    }

    #[test]
    fn test_oracle_prefers_strictly_better_candidate() {
        let refs = vec![words("the cat sat")];
        let cands = vec![words("a dog"), words("the cat sat"), words("the cat sat")];
        let (index, score) = select_oracle(&cands, &refs);
        assert_eq!(index, 1);
        assert!(score > 0.9);
    }

    #[test]
    fn test_oracle_defaults_to_first() {
        let refs = vec![words("x y z")];
        let cands = vec![words("a"), words("b")];
        assert_eq!(select_oracle(&cands, &refs), (0, 0.0));
    }
}
