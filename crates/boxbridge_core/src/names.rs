use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameDomain {
    Species,
    Move,
    Ability,
    Nature,
    Item,
}

/// Maps numeric codes to display names. Never fails: unknown codes come back
/// as `#<code>`.
pub trait NameResolver {
    fn resolve(&self, domain: NameDomain, code: i64) -> String;
}

pub fn placeholder_name(code: i64) -> String {
    format!("#{code}")
}

/// Resolver with no tables at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NumericNames;

impl NameResolver for NumericNames {
    fn resolve(&self, _domain: NameDomain, code: i64) -> String {
        placeholder_name(code)
    }
}

/// Name tables as they appear in a provider library manifest. Keys are
/// decimal strings because JSON object keys cannot be numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NameTableSpec {
    pub species: BTreeMap<String, String>,
    pub moves: BTreeMap<String, String>,
    pub abilities: BTreeMap<String, String>,
    pub natures: BTreeMap<String, String>,
    pub items: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameTable {
    tables: BTreeMap<NameDomain, BTreeMap<i64, String>>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, domain: NameDomain, code: i64, name: impl Into<String>) {
        self.tables
            .entry(domain)
            .or_default()
            .insert(code, name.into());
    }

    pub fn from_spec(spec: &NameTableSpec) -> Self {
        let mut table = Self::new();
        let domains = [
            (NameDomain::Species, &spec.species),
            (NameDomain::Move, &spec.moves),
            (NameDomain::Ability, &spec.abilities),
            (NameDomain::Nature, &spec.natures),
            (NameDomain::Item, &spec.items),
        ];
        for (domain, entries) in domains {
            for (key, name) in entries {
                match key.trim().parse::<i64>() {
                    Ok(code) => table.insert(domain, code, name.clone()),
                    Err(_) => warn!(
                        target: "boxbridge::library",
                        ?domain,
                        key = %key,
                        "ignoring non-numeric name key"
                    ),
                }
            }
        }
        table
    }

    pub fn len(&self) -> usize {
        self.tables.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NameResolver for NameTable {
    fn resolve(&self, domain: NameDomain, code: i64) -> String {
        self.tables
            .get(&domain)
            .and_then(|t| t.get(&code))
            .map(|name| name.replace('_', " "))
            .unwrap_or_else(|| placeholder_name(code))
    }
}
