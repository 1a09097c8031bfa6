use serde_json::Value as JsonValue;

use crate::config::Args;
use crate::data::output::{Named, Output};

/// Read-only view handed to every phase and callable.
///
/// Holds the configuration document plus any outputs that were given names.
/// Adding names yields a new context; an existing context never changes.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pars: Args,
    input_pars: Args,
    named: Named<Output>,
}

/// Result of a key lookup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    /// A named output produced during `compute()`.
    Data(&'a Output),
    /// A top-level configuration entry.
    Config(&'a JsonValue),
}

impl Context {
    pub fn new(pars: Args) -> Self {
        let input_pars = pars
            .get("input_pars")
            .and_then(JsonValue::as_object)
            .cloned()
            .unwrap_or_default();
        Context {
            pars,
            input_pars,
            named: Named::new(),
        }
    }

    /// Build from a JSON document; non-objects give an empty context.
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Object(pars) => Context::new(pars),
            _ => Context::default(),
        }
    }

    pub fn pars(&self) -> &Args {
        &self.pars
    }

    pub fn input_pars(&self) -> &Args {
        &self.input_pars
    }

    pub fn named(&self) -> &Named<Output> {
        &self.named
    }

    /// Named outputs shadow configuration keys of the same name.
    pub fn get(&self, key: &str) -> Option<Lookup<'_>> {
        self.named
            .get(key)
            .map(Lookup::Data)
            .or_else(|| self.pars.get(key).map(Lookup::Config))
    }

    /// A new context extended with `entries`.
    ///
    /// Collisions overwrite: a name that matches a configuration key or an
    /// earlier named output replaces it for lookups, with a warning.
    pub fn with_named(&self, entries: impl IntoIterator<Item = (String, Output)>) -> Context {
        let mut next = self.clone();
        for (name, output) in entries {
            if next.pars.contains_key(&name) || next.named.contains_key(&name) {
                log::warn!("output name `{name}` overwrites an existing entry");
            }
            next.named.insert(name, output);
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{Scalar, Value};
    use serde_json::json;

    fn single(i: i64) -> Output {
        Output::Single(Value::Scalar(Scalar::Integer(i)))
    }

    #[test]
    fn with_named_leaves_original_untouched() {
        let base = Context::from_json(json!({"input_pars": {"path": "a.csv"}, "X": "cfg"}));
        let next = base.with_named([("X".to_string(), single(1)), ("Y".to_string(), single(2))]);

        assert_eq!(base.get("X"), Some(Lookup::Config(&json!("cfg"))));
        assert_eq!(next.get("X"), Some(Lookup::Data(&single(1))));
        assert_eq!(next.get("Y"), Some(Lookup::Data(&single(2))));
        assert!(base.get("Y").is_none());
        assert_eq!(next.input_pars().get("path"), Some(&json!("a.csv")));
    }

    #[test]
    fn later_names_overwrite_earlier_ones() {
        let ctx = Context::default()
            .with_named([("X".to_string(), single(1))])
            .with_named([("X".to_string(), single(9))]);
        assert_eq!(ctx.named().len(), 1);
        assert_eq!(ctx.get("X"), Some(Lookup::Data(&single(9))));
    }
}
