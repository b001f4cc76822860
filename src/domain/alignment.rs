// ============================================================
// Layer 3 — Alignment Grid
// ============================================================
// Attention weights produced while a model reads a (source,
// target) pair under teacher forcing.
//
// Layout: weight(t, s, b) with target position t, source
// position s and batch item b, stored row-major in that order. Positions
// past a sentence's real length hold padding weights and must
// not be trusted by callers.

use anyhow::{ensure, Result};
use std::collections::HashSet;

use crate::domain::fusion::{fuse, FusionRule};

#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentGrid {
    pub target_len: usize,
    pub source_len: usize,
    pub batch:      usize,
    weights:        Vec<f32>,
}

impl AlignmentGrid {
    pub fn new(target_len: usize, source_len: usize, batch: usize, weights: Vec<f32>) -> Result<Self> {
        ensure!(
            weights.len() == target_len * source_len * batch,
            "alignment has {} weights, expected {}x{}x{}",
            weights.len(), target_len, source_len, batch
        );
        Ok(Self { target_len, source_len, batch, weights })
    }

    fn offset(&self, t: usize, s: usize, b: usize) -> usize {
        (t * self.source_len + s) * self.batch + b
    }

    pub fn weight(&self, t: usize, s: usize, b: usize) -> f32 {
        self.weights[self.offset(t, s, b)]
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Source position with the largest weight for target position `t`
    /// of batch item `b`. The first maximum wins ties.
    pub fn argmax_source(&self, t: usize, b: usize) -> usize {
        let mut best = 0;
        let mut best_weight = f32::NEG_INFINITY;
        for s in 0..self.source_len {
            let w = self.weight(t, s, b);
            if w > best_weight {
                best_weight = w;
                best = s;
            }
        }
        best
    }

    /// Hard (source, target) links of batch item `b`: each of the
    /// first `target_words` target positions links to its argmax
    /// source position, when that is one of the first `source_words`.
    pub fn links(&self, b: usize, source_words: usize, target_words: usize) -> HashSet<(usize, usize)> {
        (0..target_words.min(self.target_len))
            .map(|t| (self.argmax_source(t, b), t))
            .filter(|&(s, _)| s < source_words)
            .collect()
    }

    /// Fuse the grids of several models into one.
    pub fn fuse(grids: &[AlignmentGrid], rule: FusionRule) -> Result<AlignmentGrid> {
        ensure!(!grids.is_empty(), "no alignments to fuse");
        let first = &grids[0];
        ensure!(
            grids.iter().all(|g| g.target_len == first.target_len
                && g.source_len == first.source_len
                && g.batch == first.batch),
            "alignments of ensemble members differ in shape"
        );
        let slices: Vec<&[f32]> = grids.iter().map(|g| g.weights.as_slice()).collect();
        let weights = fuse(&slices, rule)?;
        AlignmentGrid::new(first.target_len, first.source_len, first.batch, weights)
    }
}

/// Alignment error rate of `predicted` against reference links,
/// with every reference link treated as sure:
///
///   AER = 1 - 2 |A ∩ S| / (|A| + |S|)
pub fn alignment_error_rate(predicted: &HashSet<(usize, usize)>, reference: &HashSet<(usize, usize)>) -> f64 {
    let total = predicted.len() + reference.len();
    if total == 0 {
        return 0.0;
    }
    let common = predicted.intersection(reference).count();
    1.0 - 2.0 * common as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1 target position, 2 source positions, 1 batch item
    fn grid(w0: f32, w1: f32) -> AlignmentGrid {
        AlignmentGrid::new(1, 2, 1, vec![w0, w1]).unwrap()
    }

    #[test]
    fn test_argmax_picks_largest_weight() {
        assert_eq!(grid(0.3, 0.7).argmax_source(0, 0), 1);
        assert_eq!(grid(0.5, 0.5).argmax_source(0, 0), 0);
    }

    #[test]
    fn test_fusion_per_cell() {
        let a = grid(0.2, 0.8);
        let b = grid(0.8, 0.2);
        let arith = AlignmentGrid::fuse(&[a.clone(), b.clone()], FusionRule::Arithmetic).unwrap();
        assert!((arith.weight(0, 0, 0) - 0.5).abs() < 1e-6);
        let geo = AlignmentGrid::fuse(&[a, b], FusionRule::Geometric).unwrap();
        assert!((geo.weight(0, 0, 0) - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_layout_is_target_source_batch() {
        // 2 targets, 2 sources, 2 batch items
        let w: Vec<f32> = (0..8).map(|x| x as f32).collect();
        let g = AlignmentGrid::new(2, 2, 2, w).unwrap();
        assert_eq!(g.weight(1, 0, 1), 5.0);
        assert_eq!(g.weight(0, 1, 0), 2.0);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let a = grid(0.2, 0.8);
        let b = AlignmentGrid::new(1, 1, 1, vec![1.0]).unwrap();
        assert!(AlignmentGrid::fuse(&[a, b], FusionRule::Arithmetic).is_err());
    }

    #[test]
    fn test_links_skip_eos_and_padding() {
        // 3 targets x 3 sources (last is EOS), 1 batch item
        let w = vec![
            0.9, 0.1, 0.0,
            0.1, 0.2, 0.7,
            0.0, 1.0, 0.0,
        ];
        let g = AlignmentGrid::new(3, 3, 1, w).unwrap();
        let links = g.links(0, 2, 2);
        assert_eq!(links, HashSet::from([(0, 0)]));
    }

    #[test]
    fn test_alignment_error_rate() {
        let reference = HashSet::from([(0, 0), (1, 1)]);
        assert_eq!(alignment_error_rate(&reference, &reference), 0.0);
        assert_eq!(alignment_error_rate(&HashSet::from([(0, 1)]), &reference), 1.0);
        let half = alignment_error_rate(&HashSet::from([(0, 0)]), &reference);
        assert!((half - (1.0 - 2.0 / 3.0)).abs() < 1e-12);
        assert_eq!(alignment_error_rate(&HashSet::new(), &HashSet::new()), 0.0);
    }
}
