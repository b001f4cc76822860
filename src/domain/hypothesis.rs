// ============================================================
// Layer 3 — Hypothesis
// ============================================================
// One beam search result: a target id sequence and its score.
// A finished hypothesis always ends with the end-of-sequence id;
// `output` strips it before the ids are turned into words.

use crate::domain::vocabulary::Vocabulary;

#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    /// Target ids including the terminal EOS
    pub tokens: Vec<u32>,
    /// Summed log-probability, divided by length when normalised
    pub score: f32,
}

impl Hypothesis {
    pub fn new(tokens: Vec<u32>, score: f32) -> Self {
        Self { tokens, score }
    }

    /// Tokens without the terminal EOS.
    pub fn output(&self, eos_id: u32) -> &[u32] {
        match self.tokens.split_last() {
            Some((&last, rest)) if last == eos_id => rest,
            _ => &self.tokens,
        }
    }

    pub fn words(&self, vocab: &Vocabulary) -> Vec<String> {
        vocab.decode(self.output(vocab.eos_id()))
    }

    pub fn sentence(&self, vocab: &Vocabulary) -> String {
        self.words(vocab).join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_strips_only_terminal_eos() {
        let h = Hypothesis::new(vec![4, 5, 9], -1.0);
        assert_eq!(h.output(9), &[4, 5]);
        let h = Hypothesis::new(vec![4, 5], -1.0);
        assert_eq!(h.output(9), &[4, 5]);
    }
}
