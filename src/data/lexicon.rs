// ============================================================
// Layer 4 — Probabilistic Lexicon
// ============================================================
// Reads a bilingual lexicon with one entry per line:
//
//   source_word target_word probability
//
// and keeps, for each source word, the target word with the
// highest probability. An entry only replaces the current one
// when its probability is strictly greater, so the first entry
// seen wins ties.

use anyhow::{bail, Context, Result};
use std::{collections::HashMap, path::Path};

use crate::data::reader::read_lines;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    mapping: HashMap<String, String>,
}

impl Dictionary {
    pub fn get(&self, source_word: &str) -> Option<&str> {
        self.mapping.get(source_word).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Build from lexicon lines; `origin` names the input in errors.
    pub fn from_lines<S: AsRef<str>>(lines: &[S], origin: &str) -> Result<Self> {
        let mut best: HashMap<String, (String, f64)> = HashMap::new();

        for (n, line) in lines.iter().enumerate() {
            let line = line.as_ref();
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            let &[sword, tword, prob] = fields.as_slice() else {
                bail!("{}:{}: expected 'source target probability', got '{}'", origin, n + 1, line);
            };
            let prob: f64 = prob
                .parse()
                .with_context(|| format!("{}:{}: invalid probability '{}'", origin, n + 1, prob))?;

            match best.get_mut(sword) {
                Some(entry) => {
                    if prob > entry.1 {
                        *entry = (tword.to_string(), prob);
                    }
                }
                None => {
                    best.insert(sword.to_string(), (tword.to_string(), prob));
                }
            }
        }

        let mapping = best.into_iter().map(|(s, (t, _))| (s, t)).collect();
        Ok(Self { mapping })
    }
}

pub fn load_dictionary(path: &Path) -> Result<Dictionary> {
    let lines = read_lines(path)?;
    let dict = Dictionary::from_lines(&lines, &path.display().to_string())?;
    tracing::info!("Loaded dictionary '{}' ({} source words)", path.display(), dict.len());
    Ok(dict)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highest_probability_wins() {
        let d = Dictionary::from_lines(&["the le 0.9", "the la 0.4"], "lex").unwrap();
        assert_eq!(d.get("the"), Some("le"));

        let d = Dictionary::from_lines(&["the la 0.4", "the le 0.9"], "lex").unwrap();
        assert_eq!(d.get("the"), Some("le"));
    }

    #[test]
    fn test_first_entry_wins_ties() {
        let d = Dictionary::from_lines(&["cat chat 0.5", "cat minou 0.5"], "lex").unwrap();
        assert_eq!(d.get("cat"), Some("chat"));
    }

    #[test]
    fn test_malformed_line_is_an_error() {
        assert!(Dictionary::from_lines(&["cat chat"], "lex").is_err());
        assert!(Dictionary::from_lines(&["cat chat high"], "lex").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lex.txt");
        std::fs::write(&path, "the le 0.9\nthe la 0.4\ndog chien 1.0\n").unwrap();
        let d = load_dictionary(&path).unwrap();
        assert_eq!(d.len(), 2);
        assert_eq!(d.get("dog"), Some("chien"));
        assert_eq!(d.get("cat"), None);
    }
}
