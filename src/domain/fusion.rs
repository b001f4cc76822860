// ============================================================
// Layer 3 — Ensemble Fusion
// ============================================================
// Combines the same quantity produced by several models:
//   - next-token probabilities during beam search
//   - attention weights during UNK replacement
//
// Arithmetic:  (x_1 + ... + x_n) / n
// Geometric:   exp((ln x_1 + ... + ln x_n) / n)
//
// The geometric mean is accumulated in log space; a zero in any
// model drives the fused value to zero.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FusionRule {
    Arithmetic,
    #[default]
    Geometric,
}

impl FusionRule {
    pub fn from_arithmetic_flag(arithmetic: bool) -> Self {
        if arithmetic { Self::Arithmetic } else { Self::Geometric }
    }
}

/// Element-wise fusion of equally long slices.
pub fn fuse(values: &[&[f32]], rule: FusionRule) -> Result<Vec<f32>> {
    ensure!(!values.is_empty(), "cannot fuse an empty set of model outputs");
    let len = values[0].len();
    ensure!(
        values.iter().all(|v| v.len() == len),
        "model outputs differ in size and cannot be fused"
    );

    if values.len() == 1 {
        return Ok(values[0].to_vec());
    }

    let n = values.len() as f32;
    let fused = match rule {
        FusionRule::Arithmetic => (0..len)
            .map(|i| values.iter().map(|v| v[i]).sum::<f32>() / n)
            .collect(),
        FusionRule::Geometric => (0..len)
            .map(|i| (values.iter().map(|v| v[i].ln()).sum::<f32>() / n).exp())
            .collect(),
    };
    Ok(fused)
}
