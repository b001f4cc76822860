// ============================================================
// Layer 4 — Reference Word Alignments
// ============================================================
// Pharaoh / Moses format, one sentence pair per line, each link
// written as `source-target` with 0-based word positions:
//
//   0-0 1-2 2-1

use anyhow::{Context, Result};
use std::collections::HashSet;

pub type Links = HashSet<(usize, usize)>;

pub fn parse_links(line: &str) -> Result<Links> {
    line.split_whitespace()
        .map(|pair| {
            let (s, t) = pair
                .split_once('-')
                .with_context(|| format!("malformed alignment link '{pair}'"))?;
            let s = s.parse().with_context(|| format!("bad source position in '{pair}'"))?;
            let t = t.parse().with_context(|| format!("bad target position in '{pair}'"))?;
            Ok((s, t))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pharaoh_line() {
        assert_eq!(parse_links("0-0 1-2  2-1").unwrap(), HashSet::from([(0, 0), (1, 2), (2, 1)]));
        assert!(parse_links("").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_link_is_an_error() {
        assert!(parse_links("0-0 12").is_err());
        assert!(parse_links("a-1").is_err());
    }
}
