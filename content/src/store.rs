//! Primary index over loaded records.

use anyhow::{anyhow, Result};
use util::{HashMap, HashSet, IndexMap};

use crate::{canonical_type, Record, RecordId};

type Key = (String, String);

/// Raw lookup index over one loaded record stream.
///
/// Keeps the full registration history per key: the latest entry answers
/// lookups, the rest back self-referential `copy-from` chains.
#[derive(Debug, Default)]
pub struct Store {
    /// Concrete entries per (canonical type, key), in stream order.
    concrete: IndexMap<Key, Vec<RecordId>>,
    /// Abstract template entries per (canonical type, key).
    abstracts: HashMap<Key, Vec<RecordId>>,
    /// Monster alias → the key it redirects to.
    aliases: HashMap<String, String>,
    /// Keyed concrete records per canonical type, in stream order.
    by_type: IndexMap<String, Vec<RecordId>>,
    /// Every concrete record, in stream order.
    all: Vec<RecordId>,
    /// Keys each concrete record registered under.
    keys: HashMap<RecordId, Vec<String>>,
    /// Concrete monster records, for policy filtering.
    monsters: HashSet<RecordId>,
    /// Monster keys hidden by blacklist policy.
    hidden_monsters: HashSet<String>,
}

impl Store {
    pub fn build(records: &[Record]) -> Store {
        let mut store = Store::default();

        for (i, r) in records.iter().enumerate() {
            let rid = RecordId(i as u32);
            let ct = r.canonical_type().to_string();

            if let Some(key) = r.abstract_key() {
                store
                    .abstracts
                    .entry((ct, key.to_string()))
                    .or_default()
                    .push(rid);
                continue;
            }

            store.all.push(rid);

            let keys = r.primary_keys();
            if keys.is_empty() {
                continue;
            }

            store
                .by_type
                .entry(ct.clone())
                .or_default()
                .push(rid);

            if ct == "monster" {
                store.monsters.insert(rid);
                for alias in r.aliases() {
                    store.aliases.insert(alias.to_string(), keys[0].clone());
                }
            }

            for key in &keys {
                store
                    .concrete
                    .entry((ct.clone(), key.clone()))
                    .or_default()
                    .push(rid);
            }
            store.keys.insert(rid, keys);
        }

        store
    }

    pub fn set_hidden_monsters(&mut self, hidden: HashSet<String>) {
        self.hidden_monsters = hidden;
    }

    fn is_hidden(&self, ct: &str, key: &str) -> bool {
        ct == "monster" && self.hidden_monsters.contains(key)
    }

    /// A monster record survives filtering if any of its keys does.
    fn is_visible(&self, rid: RecordId) -> bool {
        if !self.monsters.contains(&rid) {
            return true;
        }
        match self.keys.get(&rid) {
            Some(keys) => keys.iter().any(|k| !self.hidden_monsters.contains(k)),
            None => true,
        }
    }

    /// Latest concrete entry for a key, respecting monster policy.
    pub fn latest(&self, ct: &str, key: &str) -> Option<RecordId> {
        if self.is_hidden(ct, key) {
            return None;
        }
        self.concrete
            .get(&(ct.to_string(), key.to_string()))
            .and_then(|h| h.last())
            .copied()
    }

    /// Latest entry for a key ignoring policy, falling back to abstract
    /// templates. Inheritance chains use this so a blacklisted parent
    /// still resolves.
    pub fn latest_for_inheritance(&self, ct: &str, key: &str) -> Option<RecordId> {
        let key = (ct.to_string(), key.to_string());
        self.concrete
            .get(&key)
            .and_then(|h| h.last())
            .or_else(|| self.abstracts.get(&key).and_then(|h| h.last()))
            .copied()
    }

    /// Full registration history of concrete entries under a key.
    pub fn history(&self, ct: &str, key: &str) -> &[RecordId] {
        self.concrete
            .get(&(ct.to_string(), key.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn abstract_history(&self, ct: &str, key: &str) -> &[RecordId] {
        self.abstracts
            .get(&(ct.to_string(), key.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Look up a record by type and key. Concrete entries shadow
    /// abstract ones; monster lookups also walk the alias table.
    pub fn by_id(&self, type_tag: &str, key: &str) -> Result<RecordId> {
        self.by_id_maybe(type_tag, key)
            .ok_or_else(|| anyhow!("no such {type_tag}: {key}"))
    }

    pub fn by_id_maybe(&self, type_tag: &str, key: &str) -> Option<RecordId> {
        let ct = canonical_type(type_tag);

        if let Some(rid) = self.latest(ct, key) {
            return Some(rid);
        }

        if ct == "monster" {
            if let Some(target) = self.aliases.get(key) {
                if let Some(rid) = self.latest(ct, target) {
                    return Some(rid);
                }
            }
        }

        if self.is_hidden(ct, key) {
            return None;
        }
        self.abstract_by_id(type_tag, key)
    }

    pub fn abstract_by_id(&self, type_tag: &str, key: &str) -> Option<RecordId> {
        let ct = canonical_type(type_tag);
        self.abstracts
            .get(&(ct.to_string(), key.to_string()))
            .and_then(|h| h.last())
            .copied()
    }

    /// Keyed concrete records of a type, in stream order.
    pub fn by_type(&self, type_tag: &str) -> Vec<RecordId> {
        let ct = canonical_type(type_tag);
        let Some(rids) = self.by_type.get(ct) else {
            return Vec::new();
        };
        if ct == "monster" && !self.hidden_monsters.is_empty() {
            rids.iter()
                .copied()
                .filter(|rid| self.is_visible(*rid))
                .collect()
        } else {
            rids.clone()
        }
    }

    /// Every concrete record, in stream order.
    pub fn all(&self) -> Vec<RecordId> {
        if self.hidden_monsters.is_empty() {
            return self.all.clone();
        }
        self.all
            .iter()
            .copied()
            .filter(|rid| self.is_visible(*rid))
            .collect()
    }

    /// First-registration order of keys of a type, latest entry each.
    pub fn keys_of_type(&self, type_tag: &str) -> Vec<(&str, RecordId)> {
        let ct = canonical_type(type_tag);
        self.concrete
            .iter()
            .filter(|((t, k), _)| t == ct && !self.is_hidden(t, k))
            .filter_map(|((_, k), h)| h.last().map(|rid| (k.as_str(), *rid)))
            .collect()
    }
}
