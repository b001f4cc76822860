// ============================================================
// Layer 4 — Parallel Text Reader
// ============================================================
// Reads N line-aligned text files (source, target, and any
// extra column such as a reference alignment) as tuples: the
// i-th tuple holds line i of every file.
//
// Ordering:
//   - without shuffling, tuples come out in file order
//   - with shuffling, a permutation `indices` is drawn for each
//     epoch from (seed, epoch) with a Fisher-Yates shuffle
//
// `position` counts tuples handed out since the last reset. A
// resumed run restores the permutation with `set_indices` and
// calls `advance(position)` to land on the same next tuple.

use anyhow::{bail, Context, Result};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

pub struct TextReader {
    /// columns[file][line]
    columns:  Vec<Vec<String>>,
    /// Seed of the per-epoch shuffle; None keeps file order
    shuffle:  Option<u64>,
    indices:  Vec<usize>,
    position: usize,
}

impl TextReader {
    /// Open every file and check they have the same number of lines.
    pub fn open(paths: &[PathBuf], shuffle: Option<u64>) -> Result<Self> {
        let columns = paths
            .iter()
            .map(|p| read_lines(p))
            .collect::<Result<Vec<_>>>()?;
        Self::from_columns(columns, shuffle)
    }

    pub fn from_columns(columns: Vec<Vec<String>>, shuffle: Option<u64>) -> Result<Self> {
        if columns.is_empty() {
            bail!("a text reader needs at least one input");
        }
        let n = columns[0].len();
        if let Some(bad) = columns.iter().position(|c| c.len() != n) {
            bail!(
                "parallel inputs are not aligned: input 0 has {} lines, input {} has {}",
                n, bad, columns[bad].len()
            );
        }

        let mut reader = Self { columns, shuffle, indices: Vec::new(), position: 0 };
        reader.reset(0);
        Ok(reader)
    }

    /// Number of tuples per epoch.
    pub fn len(&self) -> usize {
        self.columns[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Current permutation, if shuffling.
    pub fn get_indices(&self) -> Option<Vec<usize>> {
        self.shuffle.map(|_| self.indices.clone())
    }

    /// Restore a saved permutation. Ignored when not shuffling.
    pub fn set_indices(&mut self, indices: Vec<usize>) -> Result<()> {
        if self.shuffle.is_none() {
            return Ok(());
        }
        let mut seen = vec![false; self.len()];
        for &i in &indices {
            match seen.get_mut(i) {
                Some(slot) if !*slot => *slot = true,
                _ => bail!("saved shuffle order does not match the corpus ({} lines)", self.len()),
            }
        }
        if indices.len() != self.len() {
            bail!("saved shuffle order has {} entries, corpus has {} lines", indices.len(), self.len());
        }
        self.indices = indices;
        Ok(())
    }

    /// Advance past `count` tuples without returning them.
    pub fn advance(&mut self, count: usize) {
        self.position = (self.position + count).min(self.len());
    }

    /// Rewind within the current epoch, keeping the permutation.
    pub fn reset_position(&mut self) {
        self.position = 0;
    }

    /// Rewind; when shuffling, draw the permutation for `epoch`.
    pub fn reset(&mut self, epoch: usize) {
        self.position = 0;
        self.indices = (0..self.len()).collect();
        if let Some(seed) = self.shuffle {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(epoch as u64));
            self.indices.shuffle(&mut rng);
        }
    }
}

impl Iterator for TextReader {
    type Item = Vec<String>;

    fn next(&mut self) -> Option<Vec<String>> {
        let &line = self.indices.get(self.position)?;
        self.position += 1;
        Some(self.columns.iter().map(|c| c[line].clone()).collect())
    }
}

/// Read a whole file as trimmed lines.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path)
        .with_context(|| format!("Cannot open '{}'", path.display()))?;
    BufReader::new(file)
        .lines()
        .map(|l| l.map(|s| s.trim().to_string()))
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("Cannot read '{}'", path.display()))
}
