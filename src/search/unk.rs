// ============================================================
// Layer 5 — UNK Replacement
// ============================================================
// Rewrites unknown-token placeholders in a translation using
// the source word each placeholder attends to most.
//
// For an UNK at target position t:
//   s = argmax over source positions of the fused alignment
//   s past the real source length  → keep UNK
//   otherwise, by heuristic:
//     Copy                  → source word
//     Dictionary            → dict[source word], else copy
//     LowercaseDictionary   → dict[source word] when the word
//                             starts lowercase, else copy

use anyhow::{bail, Result};

use crate::data::lexicon::Dictionary;
use crate::domain::alignment::AlignmentGrid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heuristic {
    Copy,
    Dictionary,
    LowercaseDictionary,
}

impl Heuristic {
    pub fn from_level(level: u8) -> Result<Self> {
        match level {
            0 => Ok(Self::Copy),
            1 => Ok(Self::Dictionary),
            2 => Ok(Self::LowercaseDictionary),
            other => bail!("unknown replacement heuristic {other} (expected 0, 1 or 2)"),
        }
    }
}

pub struct UnkReplacer {
    heuristic:  Heuristic,
    dictionary: Option<Dictionary>,
    unk:        String,
}

impl UnkReplacer {
    /// A dictionary heuristic without a dictionary is a configuration error.
    pub fn new(heuristic: Heuristic, dictionary: Option<Dictionary>, unk: impl Into<String>) -> Result<Self> {
        let heuristic = match (&dictionary, heuristic) {
            (None, Heuristic::Copy) => Heuristic::Copy,
            (None, _) => bail!("heuristic > 0, but no dictionary available"),
            (Some(_), h) => h,
        };
        Ok(Self { heuristic, dictionary, unk: unk.into() })
    }

    /// Rewrite batch item `b` of `grid`.
    pub fn replace(&self, source: &[String], translation: &[String], grid: &AlignmentGrid, b: usize) -> Vec<String> {
        translation
            .iter()
            .enumerate()
            .map(|(t, word)| {
                if *word != self.unk || t >= grid.target_len {
                    return word.clone();
                }
                let s = grid.argmax_source(t, b);
                match source.get(s) {
                    Some(source_word) => self.substitute(source_word),
                    None => {
                        tracing::warn!("UNK at {} aligned past the source (position {}), kept", t, s);
                        word.clone()
                    }
                }
            })
            .collect()
    }

    fn substitute(&self, source_word: &str) -> String {
        let entry = self.dictionary.as_ref().and_then(|d| d.get(source_word));
        match (self.heuristic, entry) {
            (Heuristic::Dictionary, Some(target)) => target.to_string(),
            (Heuristic::LowercaseDictionary, Some(target))
                if source_word.chars().next().is_some_and(char::is_lowercase) =>
            {
                target.to_string()
            }
            _ => source_word.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    // target x source(+EOS) x 1; every target position attends `to[t]`
    fn grid(to: &[usize], source_len: usize) -> AlignmentGrid {
        let mut w = vec![0.0; to.len() * source_len];
        for (t, &s) in to.iter().enumerate() {
            w[t * source_len + s] = 1.0;
        }
        AlignmentGrid::new(to.len(), source_len, 1, w).unwrap()
    }

    fn dict() -> Dictionary {
        Dictionary::from_lines(&["chat cat 0.9", "Paris paris 0.9"], "lex").unwrap()
    }

    #[test]
    fn test_copy_ignores_dictionary() {
        let r = UnkReplacer::new(Heuristic::Copy, Some(dict()), "UNK").unwrap();
        let out = r.replace(&words("chat noir"), &words("UNK noir"), &grid(&[0, 1], 3), 0);
        assert_eq!(out, words("chat noir"));
    }

    #[test]
    fn test_dictionary_substitution() {
        let r = UnkReplacer::new(Heuristic::Dictionary, Some(dict()), "UNK").unwrap();
        let out = r.replace(&words("chat noir"), &words("UNK UNK"), &grid(&[0, 1], 3), 0);
        // "noir" is not in the dictionary → copied
        assert_eq!(out, words("cat noir"));
    }

    #[test]
    fn test_lowercase_heuristic_copies_capitalised_words() {
        let r = UnkReplacer::new(Heuristic::LowercaseDictionary, Some(dict()), "UNK").unwrap();
        let out = r.replace(&words("Paris chat"), &words("UNK UNK"), &grid(&[0, 1], 3), 0);
        assert_eq!(out, words("Paris cat"));
    }

    #[test]
    fn test_alignment_past_source_keeps_unk() {
        let r = UnkReplacer::new(Heuristic::Copy, None, "UNK").unwrap();
        // position 2 is the source EOS
        let out = r.replace(&words("chat noir"), &words("UNK"), &grid(&[2], 3), 0);
        assert_eq!(out, words("UNK"));
    }

    #[test]
    fn test_dictionary_heuristic_requires_dictionary() {
        assert!(UnkReplacer::new(Heuristic::Dictionary, None, "UNK").is_err());
        assert!(UnkReplacer::new(Heuristic::LowercaseDictionary, None, "UNK").is_err());
        assert!(Heuristic::from_level(3).is_err());
    }
}
