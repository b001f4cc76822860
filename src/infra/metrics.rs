// ============================================================
// Layer 7 — Metrics Logger
// ============================================================
// Appends one CSV row per validation pass, next to the
// checkpoints (<model-stem>.metrics.csv):
//
//   epoch,step,avg_cost,bleu,best_bleu
//   1,1000,5.812300,0.041200,0.041200
//   1,2000,5.109800,0.038900,0.041200
//   ...
//
// avg_cost is the mean per-token cost in bits over the steps of
// the current epoch. The header is written once, so a resumed
// run keeps appending to the same file.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

/// One validation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationMetrics {
    pub epoch:     usize,
    pub step:      usize,
    pub avg_cost:  f64,
    pub bleu:      f64,
    pub best_bleu: f64,
}

pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Open `csv_path`, writing the header if the file is new.
    pub fn new(csv_path: impl Into<PathBuf>) -> Result<Self> {
        let csv_path = csv_path.into();

        if let Some(dir) = csv_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }

        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create metrics file '{}'", csv_path.display()))?;
            writeln!(f, "epoch,step,avg_cost,bleu,best_bleu")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &ValidationMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open metrics file '{}'", self.csv_path.display()))?;

        writeln!(
            f,
            "{},{},{:.6},{:.6},{:.6}",
            m.epoch, m.step, m.avg_cost, m.bleu, m.best_bleu,
        )?;

        tracing::debug!("Logged validation at epoch {} step {}: bleu={:.4}", m.epoch, m.step, m.bleu);
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(bleu: f64, best_bleu: f64) -> ValidationMetrics {
        ValidationMetrics { epoch: 1, step: 100, avg_cost: 4.5, bleu, best_bleu }
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nmt.metrics.csv");

        let logger = MetricsLogger::new(&path).unwrap();
        logger.log(&metrics(0.1, 0.0)).unwrap();
        let logger = MetricsLogger::new(&path).unwrap();
        logger.log(&metrics(0.2, 0.1)).unwrap();

        let text = fs::read_to_string(logger.csv_path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "epoch,step,avg_cost,bleu,best_bleu");
        assert_eq!(lines[2], "1,100,4.500000,0.200000,0.100000");
    }
}
