//! Column-set algebra for resource permissions.
//!
//! A role's readable columns are either every column of the resource (`All`) or an explicit,
//! possibly empty, set. The two never overlap: a set that covers the whole universe collapses
//! to `All`, and an empty set stays an empty set.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "columns", rename_all = "snake_case")]
pub enum AllOrSet {
    All,
    Set(BTreeSet<String>),
}

impl Default for AllOrSet {
    fn default() -> Self {
        AllOrSet::empty()
    }
}

impl AllOrSet {
    pub fn empty() -> Self {
        AllOrSet::Set(BTreeSet::new())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, AllOrSet::All)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, AllOrSet::Set(set) if set.is_empty())
    }

    pub fn contains(&self, column: &str) -> bool {
        match self {
            AllOrSet::All => true,
            AllOrSet::Set(set) => set.contains(column),
        }
    }

    /// Normalizes an explicit selection against the resource's universe.
    ///
    /// Columns outside the universe are dropped. An empty universe never yields `All`.
    pub fn from_selection<I, S>(selected: I, universe: &BTreeSet<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = selected
            .into_iter()
            .map(Into::into)
            .filter(|column| universe.contains(column))
            .collect();
        Self::collapse(set, universe)
    }

    /// Flips one column in or out of the set.
    pub fn toggle(&self, universe: &BTreeSet<String>, item: &str) -> Self {
        let mut set = match self {
            AllOrSet::All => universe.clone(),
            AllOrSet::Set(set) => set.clone(),
        };

        if !set.remove(item) {
            set.insert(item.to_string());
        }

        Self::collapse(set, universe)
    }

    /// Keeps only the permitted fields of a JSON object row. Non-object values pass through.
    pub fn project(&self, row: &Value) -> Value {
        match (self, row) {
            (AllOrSet::All, _) => row.clone(),
            (AllOrSet::Set(set), Value::Object(fields)) => {
                let kept: Map<String, Value> = fields
                    .iter()
                    .filter(|(name, _)| set.contains(name.as_str()))
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect();
                Value::Object(kept)
            }
            (AllOrSet::Set(_), other) => other.clone(),
        }
    }

    fn collapse(set: BTreeSet<String>, universe: &BTreeSet<String>) -> Self {
        if !set.is_empty() && set == *universe {
            AllOrSet::All
        } else {
            AllOrSet::Set(set)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn universe() -> BTreeSet<String> {
        ["amount", "customer", "phone"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn toggle_off_from_all_expands_universe() {
        let result = AllOrSet::All.toggle(&universe(), "phone");
        let expected: BTreeSet<String> = ["amount", "customer"].iter().map(|s| s.to_string()).collect();
        assert_eq!(result, AllOrSet::Set(expected));
    }

    #[test]
    fn toggle_round_trip_returns_all() {
        let universe = universe();
        let removed = AllOrSet::All.toggle(&universe, "customer");
        assert!(!removed.is_all());
        assert_eq!(removed.toggle(&universe, "customer"), AllOrSet::All);
    }

    #[test]
    fn deselecting_last_column_is_empty_not_all() {
        let universe = universe();
        let single = AllOrSet::from_selection(["amount"], &universe);
        let cleared = single.toggle(&universe, "amount");
        assert!(cleared.is_empty());
        assert!(!cleared.is_all());
        assert!(!cleared.contains("amount"));
    }

    #[test]
    fn selecting_every_column_collapses_to_all() {
        let universe = universe();
        assert_eq!(AllOrSet::from_selection(["amount", "customer", "phone"], &universe), AllOrSet::All);
        assert!(AllOrSet::from_selection(["amount", "ghost"], &universe).contains("amount"));
        assert!(!AllOrSet::from_selection(["amount", "ghost"], &universe).contains("ghost"));
    }

    #[test]
    fn empty_universe_never_yields_all() {
        let universe = BTreeSet::new();
        assert!(AllOrSet::from_selection(Vec::<String>::new(), &universe).is_empty());
    }

    #[test]
    fn serialization_is_tagged() {
        assert_eq!(serde_json::to_value(AllOrSet::All).unwrap(), json!({"mode": "all"}));
        let set = AllOrSet::from_selection(["amount"], &universe());
        assert_eq!(serde_json::to_value(&set).unwrap(), json!({"mode": "set", "columns": ["amount"]}));
        let empty: AllOrSet = serde_json::from_value(json!({"mode": "set", "columns": []})).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn project_filters_object_fields() {
        let row = json!({"amount": 10, "customer": "ACME", "phone": "555"});
        let cols = AllOrSet::from_selection(["amount", "phone"], &universe());
        assert_eq!(cols.project(&row), json!({"amount": 10, "phone": "555"}));
        assert_eq!(AllOrSet::All.project(&row), row);
        assert_eq!(AllOrSet::empty().project(&row), json!({}));
    }
}
