// ============================================================
// Layer 3 — Token Batch
// ============================================================
// A batch of aligned source/target sentences already converted
// to ids. Every sequence ends with the end-of-sequence id.
//
// Padding happens late: models ask for a padded, time-major or
// batch-major copy together with a 0/1 mask when they build
// tensors.

use crate::domain::vocabulary::VocabularyPair;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TokenBatch {
    pub source: Vec<Vec<u32>>,
    pub target: Vec<Vec<u32>>,
}

/// A padded `[batch, max_len]` block with its mask.
#[derive(Debug, Clone, PartialEq)]
pub struct Padded {
    pub ids:     Vec<i64>,
    pub mask:    Vec<f32>,
    pub batch:   usize,
    pub max_len: usize,
}

impl TokenBatch {
    pub fn new(source: Vec<Vec<u32>>, target: Vec<Vec<u32>>) -> Self {
        debug_assert_eq!(source.len(), target.len());
        Self { source, target }
    }

    /// Convert raw source/target lines with the given vocabularies.
    pub fn from_lines(sources: &[String], targets: &[String], vocab: &VocabularyPair) -> Self {
        Self {
            source: sources.iter().map(|l| vocab.source.encode(l)).collect(),
            target: targets.iter().map(|l| vocab.target.encode(l)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Number of target tokens, EOS included.
    pub fn target_tokens(&self) -> usize {
        self.target.iter().map(Vec::len).sum()
    }

    /// Length of the longest target sequence, EOS included.
    pub fn max_target_len(&self) -> usize {
        self.target.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn padded_source(&self) -> Padded {
        pad(&self.source)
    }

    pub fn padded_target(&self) -> Padded {
        pad(&self.target)
    }
}

/// Pad sequences with id 0 to a `[batch, max_len]` row-major block.
pub fn pad(sequences: &[Vec<u32>]) -> Padded {
    let batch   = sequences.len();
    let max_len = sequences.iter().map(Vec::len).max().unwrap_or(0).max(1);
    let mut ids  = vec![0i64; batch * max_len];
    let mut mask = vec![0f32; batch * max_len];

    for (row, seq) in sequences.iter().enumerate() {
        for (col, &id) in seq.iter().enumerate() {
            ids[row * max_len + col]  = id as i64;
            mask[row * max_len + col] = 1.0;
        }
    }

    Padded { ids, mask, batch, max_len }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_fills_mask_only_for_real_tokens() {
        let p = pad(&[vec![5, 9], vec![7]]);
        assert_eq!(p.max_len, 2);
        assert_eq!(p.ids,  vec![5, 9, 7, 0]);
        assert_eq!(p.mask, vec![1.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_target_token_count_includes_eos() {
        let b = TokenBatch::new(vec![vec![1, 9], vec![2, 9]], vec![vec![3, 4, 9], vec![9]]);
        assert_eq!(b.target_tokens(), 4);
        assert_eq!(b.max_target_len(), 3);
    }
}
