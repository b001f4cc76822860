// Deterministic models for search and training tests.

use anyhow::{Context, Result};

use crate::domain::{alignment::AlignmentGrid, batch::TokenBatch, traits::DecodingModel};

/// Next-token distribution chosen by prefix length: row `i` of the
/// table is used after `i` emitted tokens, the last row thereafter.
#[derive(Debug, Clone)]
pub struct TableModel {
    table:     Vec<Vec<f32>>,
    alignment: Option<AlignmentGrid>,
}

impl TableModel {
    pub fn new(table: Vec<Vec<f32>>) -> Self {
        Self { table, alignment: None }
    }

    pub fn with_alignment(mut self, grid: AlignmentGrid) -> Self {
        self.alignment = Some(grid);
        self
    }

    fn row(&self, prefix_len: usize) -> Vec<f32> {
        let i = prefix_len.min(self.table.len() - 1);
        self.table[i].clone()
    }
}

impl DecodingModel for TableModel {
    /// One emitted prefix per live row
    type State = Vec<Vec<u32>>;

    fn start(&self, _source: &[u32]) -> Result<Self::State> {
        Ok(vec![Vec::new()])
    }

    fn step(&self, state: &Self::State) -> Result<(Vec<Vec<f32>>, Self::State)> {
        let probs = state.iter().map(|p| self.row(p.len())).collect();
        Ok((probs, state.clone()))
    }

    fn select(&self, state: Self::State, parents: &[usize], tokens: &[u32]) -> Result<Self::State> {
        parents
            .iter()
            .zip(tokens)
            .map(|(&p, &t)| {
                let mut prefix = state.get(p).context("parent row out of range")?.clone();
                prefix.push(t);
                Ok(prefix)
            })
            .collect()
    }

    fn align(&self, batch: &TokenBatch) -> Result<AlignmentGrid> {
        match &self.alignment {
            Some(grid) => Ok(grid.clone()),
            None => {
                let t = batch.max_target_len();
                let s = batch.source.iter().map(Vec::len).max().unwrap_or(0);
                let b = batch.len();
                AlignmentGrid::new(t, s, b, vec![1.0 / s.max(1) as f32; t * s * b])
            }
        }
    }

    fn score(&self, batch: &TokenBatch) -> Result<Vec<f32>> {
        Ok(batch
            .target
            .iter()
            .map(|target| {
                target
                    .iter()
                    .enumerate()
                    .map(|(i, &tok)| -self.row(i).get(tok as usize).copied().unwrap_or(0.0).ln())
                    .sum()
            })
            .collect())
    }
}
