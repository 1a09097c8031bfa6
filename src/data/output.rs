use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::model::Value;

// ---------------------------------------------------------------------------
// Named – insertion-ordered name → item mapping
// ---------------------------------------------------------------------------

/// Ordered mapping. Lookups are linear; outputs carry a handful of entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Named<T> {
    entries: Vec<(String, T)>,
}

impl<T> Default for Named<T> {
    fn default() -> Self {
        Named {
            entries: Vec::new(),
        }
    }
}

impl<T> Named<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Insert or overwrite in place. Returns the previous item, if any.
    pub fn insert(&mut self, name: impl Into<String>, item: T) -> Option<T> {
        let name = name.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, item)),
            None => {
                self.entries.push((name, item));
                None
            }
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn into_values(self) -> Vec<T> {
        self.entries.into_iter().map(|(_, v)| v).collect()
    }

    /// Fallible map over the items, keeping names and order.
    pub fn try_map<U>(&self, mut f: impl FnMut(&T) -> Result<U>) -> Result<Named<U>> {
        let mut entries = Vec::with_capacity(self.entries.len());
        for (k, v) in &self.entries {
            entries.push((k.clone(), f(v)?));
        }
        Ok(Named { entries })
    }
}

impl<T> FromIterator<(String, T)> for Named<T> {
    fn from_iter<I: IntoIterator<Item = (String, T)>>(iter: I) -> Self {
        let mut named = Named::new();
        for (k, v) in iter {
            named.insert(k, v);
        }
        named
    }
}

impl<T> IntoIterator for Named<T> {
    type Item = (String, T);
    type IntoIter = std::vec::IntoIter<(String, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// A named group of values, e.g. one keyword-argument set.
pub type Record = Named<Value>;

// ---------------------------------------------------------------------------
// Output – the five shapes data takes between loading and shaping
// ---------------------------------------------------------------------------

/// Intermediate or final output of the pipeline.
///
/// Loaders and preprocessors may return any of these; every phase after
/// loading matches on the variant instead of probing types at run time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Output {
    Single(Value),
    Sequence(Vec<Value>),
    SequenceOfMaps(Vec<Record>),
    Map(Record),
    MapOfMaps(Named<Record>),
}

impl Output {
    /// Number of top-level entries.
    pub fn len(&self) -> usize {
        match self {
            Output::Single(_) => 1,
            Output::Sequence(v) => v.len(),
            Output::SequenceOfMaps(v) => v.len(),
            Output::Map(m) => m.len(),
            Output::MapOfMaps(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn case_name(&self) -> &'static str {
        match self {
            Output::Single(_) => "single value",
            Output::Sequence(_) => "sequence of values",
            Output::SequenceOfMaps(_) => "sequence of mappings",
            Output::Map(_) => "mapping of values",
            Output::MapOfMaps(_) => "mapping of mappings",
        }
    }

    /// Top-level values in order, for the value-shaped cases.
    pub fn values(&self) -> Option<Vec<&Value>> {
        match self {
            Output::Single(v) => Some(vec![v]),
            Output::Sequence(vs) => Some(vs.iter().collect()),
            Output::Map(m) => Some(m.values().collect()),
            Output::SequenceOfMaps(_) | Output::MapOfMaps(_) => None,
        }
    }

    /// Apply `f` to every value of a value-shaped output.
    /// Mapping-shaped cases pass through unchanged.
    pub fn map_values(&self, mut f: impl FnMut(&Value) -> Result<Value>) -> Result<Output> {
        Ok(match self {
            Output::Single(v) => Output::Single(f(v)?),
            Output::Sequence(vs) => Output::Sequence(vs.iter().map(&mut f).collect::<Result<_>>()?),
            Output::Map(m) => Output::Map(m.try_map(&mut f)?),
            other => other.clone(),
        })
    }

    /// Concatenate partitions into one ordered output.
    ///
    /// Value-shaped parts flatten to a `Sequence`, mapping-shaped parts to a
    /// `SequenceOfMaps`; empty parts contribute nothing. `None` when the
    /// parts mix both kinds.
    pub fn concat<'a>(parts: impl IntoIterator<Item = &'a Output>) -> Option<Output> {
        let mut values = Vec::new();
        let mut records = Vec::new();
        for part in parts {
            match part {
                Output::Single(v) => values.push(v.clone()),
                Output::Sequence(vs) => values.extend(vs.iter().cloned()),
                Output::Map(m) => values.extend(m.values().cloned()),
                Output::SequenceOfMaps(rs) => records.extend(rs.iter().cloned()),
                Output::MapOfMaps(m) => records.extend(m.values().cloned()),
            }
        }
        match (values.is_empty(), records.is_empty()) {
            (_, true) => Some(Output::Sequence(values)),
            (true, false) => Some(Output::SequenceOfMaps(records)),
            (false, false) => None,
        }
    }
}

impl From<Value> for Output {
    fn from(v: Value) -> Self {
        Output::Single(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::Scalar;

    fn int(i: i64) -> Value {
        Value::Scalar(Scalar::Integer(i))
    }

    #[test]
    fn named_insert_overwrites_in_place() {
        let mut named = Named::new();
        named.insert("x", 1);
        named.insert("y", 2);
        assert_eq!(named.insert("x", 3), Some(1));
        assert_eq!(named.keys().collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(named.get("x"), Some(&3));
    }

    #[test]
    fn concat_flattens_values_in_order() {
        let train: Record = [("X_train".to_string(), int(1))].into_iter().collect();
        let test = Output::Sequence(vec![int(2), int(3)]);
        let misc = Output::Sequence(vec![]);
        let flat = Output::concat([&Output::Map(train), &test, &misc]).unwrap();
        assert_eq!(flat, Output::Sequence(vec![int(1), int(2), int(3)]));
    }

    #[test]
    fn concat_refuses_mixed_parts() {
        let rec: Record = [("a".to_string(), int(1))].into_iter().collect();
        let parts = [Output::Single(int(0)), Output::SequenceOfMaps(vec![rec])];
        assert!(Output::concat(&parts).is_none());
    }

    #[test]
    fn map_values_skips_mapping_cases() {
        let rec: Record = [("a".to_string(), int(1))].into_iter().collect();
        let out = Output::SequenceOfMaps(vec![rec]);
        let mapped = out.map_values(|_| anyhow::bail!("never called")).unwrap();
        assert_eq!(mapped, out);
    }
}
