// ============================================================
// Layer 3 — Vocabulary
// ============================================================
// A bijective token <-> id table for one language side.
//
// The vocabulary file is a JSON object mapping every token to a
// contiguous id starting at 0:
//
//   { "the": 0, "cat": 1, "UNK": 2, ... }
//
// On load the table is augmented with two reserved symbols:
//   - the unknown-token symbol (appended if the file lacks it)
//   - the end-of-sequence symbol, always given the highest id
//
// Once built at the first training run the vocabulary is stored
// inside every checkpoint and never rebuilt on resume.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    /// id -> token
    tokens: Vec<String>,
    /// token -> id
    ids: BTreeMap<String, u32>,
    unk_id: u32,
    eos_id: u32,
}

impl Vocabulary {
    /// Build a vocabulary from an explicit token -> id map.
    ///
    /// Fails if ids are not exactly `0..n` or if the map already
    /// contains the end-of-sequence symbol.
    pub fn from_map(map: BTreeMap<String, u32>, unk: &str, eos: &str) -> Result<Self> {
        if map.contains_key(eos) {
            bail!("vocabulary already contains the reserved end-of-sequence symbol '{eos}'");
        }

        let mut tokens: Vec<Option<String>> = vec![None; map.len()];
        for (token, &id) in &map {
            let slot = tokens
                .get_mut(id as usize)
                .with_context(|| format!("token '{token}' has out-of-range id {id}"))?;
            if let Some(existing) = slot {
                bail!("id {id} is assigned to both '{existing}' and '{token}'");
            }
            *slot = Some(token.clone());
        }
        let mut tokens: Vec<String> = tokens.into_iter().flatten().collect();
        let mut ids = map;

        if !ids.contains_key(unk) {
            ids.insert(unk.to_string(), tokens.len() as u32);
            tokens.push(unk.to_string());
        }
        let unk_id = ids[unk];

        let eos_id = tokens.len() as u32;
        ids.insert(eos.to_string(), eos_id);
        tokens.push(eos.to_string());

        Ok(Self { tokens, ids, unk_id, eos_id })
    }

    /// Load a JSON `{token: id}` file and augment it with UNK / EOS.
    pub fn load(path: &Path, unk: &str, eos: &str) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read vocabulary '{}'", path.display()))?;
        let map: BTreeMap<String, u32> = serde_json::from_str(&text)
            .with_context(|| format!("Malformed vocabulary '{}'", path.display()))?;
        let vocab = Self::from_map(map, unk, eos)?;
        tracing::info!("Loaded vocabulary '{}' ({} entries)", path.display(), vocab.len());
        Ok(vocab)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn unk_id(&self) -> u32 {
        self.unk_id
    }

    pub fn eos_id(&self) -> u32 {
        self.eos_id
    }

    pub fn unk_symbol(&self) -> &str {
        &self.tokens[self.unk_id as usize]
    }

    pub fn eos_symbol(&self) -> &str {
        &self.tokens[self.eos_id as usize]
    }

    pub fn contains(&self, word: &str) -> bool {
        self.ids.contains_key(word)
    }

    /// Id of `word`, or the UNK id for out-of-vocabulary words.
    pub fn id(&self, word: &str) -> u32 {
        self.ids.get(word).copied().unwrap_or(self.unk_id)
    }

    /// Token for `id`; ids past the table render as the UNK symbol.
    pub fn token(&self, id: u32) -> &str {
        self.tokens
            .get(id as usize)
            .map(String::as_str)
            .unwrap_or_else(|| self.unk_symbol())
    }

    /// Whitespace-split `line` into ids and append EOS.
    pub fn encode(&self, line: &str) -> Vec<u32> {
        let mut ids: Vec<u32> = line.split_whitespace().map(|w| self.id(w)).collect();
        ids.push(self.eos_id);
        ids
    }

    /// Map ids back to tokens (EOS included if present).
    pub fn decode(&self, ids: &[u32]) -> Vec<String> {
        ids.iter().map(|&id| self.token(id).to_string()).collect()
    }

    /// Replace out-of-vocabulary words of `line` with the UNK symbol.
    pub fn normalize_line(&self, line: &str) -> String {
        line.split_whitespace()
            .map(|w| if self.contains(w) { w } else { self.unk_symbol() })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Source and target vocabularies of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyPair {
    pub source: Vocabulary,
    pub target: Vocabulary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, u32)]) -> BTreeMap<String, u32> {
        entries.iter().map(|(t, i)| (t.to_string(), *i)).collect()
    }

    #[test]
    fn test_eos_gets_highest_id() {
        let v = Vocabulary::from_map(map(&[("a", 0), ("UNK", 1), ("b", 2)]), "UNK", "<eos>").unwrap();
        assert_eq!(v.len(), 4);
        assert_eq!(v.eos_id(), 3);
        assert_eq!(v.unk_id(), 1);
        assert_eq!(v.token(3), "<eos>");
    }

    #[test]
    fn test_missing_unk_is_appended_before_eos() {
        let v = Vocabulary::from_map(map(&[("a", 0), ("b", 1)]), "UNK", "<eos>").unwrap();
        assert_eq!(v.unk_id(), 2);
        assert_eq!(v.eos_id(), 3);
    }

    #[test]
    fn test_encode_maps_unknown_words_and_appends_eos() {
        let v = Vocabulary::from_map(map(&[("a", 0), ("UNK", 1)]), "UNK", "<eos>").unwrap();
        assert_eq!(v.encode("a zzz a"), vec![0, 1, 0, 2]);
        assert_eq!(v.normalize_line("a zzz"), "a UNK");
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let err = Vocabulary::from_map(map(&[("a", 0), ("b", 0)]), "UNK", "<eos>");
        assert!(err.is_err());
    }

    #[test]
    fn test_rejects_gaps_in_ids() {
        let err = Vocabulary::from_map(map(&[("a", 0), ("b", 5)]), "UNK", "<eos>");
        assert!(err.is_err());
    }
}
