// ============================================================
// Layer 4 — Reference Translations
// ============================================================
// One or more reference files, line-aligned with a source text.
// The result holds, for every source line, the tokenised line
// of each reference file:
//
//   refs[line][file] = ["the", "cat", ...]

use anyhow::{bail, Result};
use std::path::PathBuf;

use crate::data::reader::read_lines;

pub type References = Vec<Vec<Vec<String>>>;

/// Load reference files, optionally lower-casing every word.
pub fn load_references(paths: &[PathBuf], lowercase: bool) -> Result<References> {
    if paths.is_empty() {
        bail!("no reference files given");
    }

    let files = paths
        .iter()
        .map(|p| read_lines(p))
        .collect::<Result<Vec<_>>>()?;

    let n = files[0].len();
    if let Some(bad) = files.iter().position(|f| f.len() != n) {
        bail!(
            "reference '{}' has {} lines, '{}' has {}",
            paths[bad].display(), files[bad].len(), paths[0].display(), n
        );
    }

    let refs = (0..n)
        .map(|line| files.iter().map(|f| tokenize(&f[line], lowercase)).collect())
        .collect();

    tracing::info!("Loaded {} reference sets from {} file(s)", n, paths.len());
    Ok(refs)
}

pub fn tokenize(line: &str, lowercase: bool) -> Vec<String> {
    line.split_whitespace()
        .map(|w| if lowercase { w.to_lowercase() } else { w.to_string() })
        .collect()
}
