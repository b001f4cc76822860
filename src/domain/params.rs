// ============================================================
// Layer 3 — Parameter Registry
// ============================================================
// Model parameters are addressed by a typed key: the logical
// module that owns the tensor plus the tensor's role in it,
// e.g. (decoder.attention.query, Weight).
//
// Keys carry no instance scope, so parameters of one checkpoint
// bind by exact lookup to any model instance of the same
// architecture. Ensemble members, resumed runs and pretrained
// initialisation all rely on this.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TensorRole {
    Weight,
    Bias,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParamKey {
    pub module: String,
    pub role:   TensorRole,
}

impl ParamKey {
    pub fn weight(module: impl Into<String>) -> Self {
        Self { module: module.into(), role: TensorRole::Weight }
    }

    pub fn bias(module: impl Into<String>) -> Self {
        Self { module: module.into(), role: TensorRole::Bias }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self.role {
            TensorRole::Weight => "weight",
            TensorRole::Bias   => "bias",
        };
        write!(f, "{}.{}", self.module, role)
    }
}

/// Host copy of one parameter tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamBlob {
    pub shape:  Vec<usize>,
    pub values: Vec<f32>,
}

impl ParamBlob {
    pub fn new(shape: Vec<usize>, values: Vec<f32>) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), values.len());
        Self { shape, values }
    }

    pub fn numel(&self) -> usize {
        self.values.len()
    }
}

/// Ordered collection of named parameters.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParamStore {
    entries: Vec<(ParamKey, ParamBlob)>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace, keeping first-insertion order.
    pub fn insert(&mut self, key: ParamKey, blob: ParamBlob) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = blob,
            None => self.entries.push((key, blob)),
        }
    }

    pub fn get(&self, key: &ParamKey) -> Option<&ParamBlob> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, b)| b)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ParamKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParamKey, &ParamBlob)> {
        self.entries.iter().map(|(k, b)| (k, b))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of scalar values.
    pub fn numel(&self) -> usize {
        self.entries.iter().map(|(_, b)| b.numel()).sum()
    }
}

/// Outcome of binding a store onto a model.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImportReport {
    /// Model parameters that received a stored value
    pub matched:   Vec<ParamKey>,
    /// Model parameters left untouched (absent or shape mismatch)
    pub unmatched: Vec<ParamKey>,
}

impl ImportReport {
    /// Report every unmatched parameter; never fatal.
    pub fn warn_unmatched(&self) {
        for key in &self.unmatched {
            tracing::warn!("{} NOT restored", key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_and_keeps_order() {
        let mut s = ParamStore::new();
        s.insert(ParamKey::weight("a"), ParamBlob::new(vec![1], vec![1.0]));
        s.insert(ParamKey::bias("a"),   ParamBlob::new(vec![1], vec![2.0]));
        s.insert(ParamKey::weight("a"), ParamBlob::new(vec![1], vec![3.0]));

        let keys: Vec<String> = s.keys().map(ToString::to_string).collect();
        assert_eq!(keys, vec!["a.weight", "a.bias"]);
        assert_eq!(s.get(&ParamKey::weight("a")).unwrap().values, vec![3.0]);
        assert_eq!(s.numel(), 2);
    }
}
