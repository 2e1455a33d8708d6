//! Mod-aware content loading, inheritance resolution and lookups.

use std::{collections::VecDeque, sync::Arc};

use anyhow::{bail, Result};
use serde_json::Value;
use util::{HashSet, Pacer, Uninterrupted};

mod flatten;
pub use flatten::Flattener;

mod mods;
pub use mods::{ModData, ModId, ModSet};

mod policy;
pub use policy::MonsterPolicy;

mod provenance;
pub use provenance::Provenance;

mod record;
pub use record::{canonical_type, name_str, str_list, Record, RecordId};

mod store;
pub use store::Store;

/// One loaded content version: the records, their indexes and every
/// derived table.
///
/// Replacing the corpus means building a new `Corpus` and dropping this
/// one; all caches key on record identities that die with the value, so
/// nothing derived can leak across versions.
#[derive(Debug)]
pub struct Corpus {
    records: Vec<Record>,
    sources: Vec<ModId>,
    store: Store,
    provenance: Provenance,
    flattener: Flattener,
}

impl Corpus {
    /// Build from an already concatenated (mod, record) stream. Use
    /// [`ModSet::corpus`] to get the stream ordering right.
    pub fn new(stream: Vec<(ModId, Record)>, pacer: &mut dyn Pacer) -> Corpus {
        let mut records = Vec::with_capacity(stream.len());
        let mut sources = Vec::with_capacity(stream.len());
        let mut provenance = Provenance::default();

        for (m, r) in stream {
            let ct = r.canonical_type().to_string();
            for key in r.primary_keys() {
                provenance.note(&ct, &key, &m);
            }
            if let Some(key) = r.abstract_key() {
                provenance.note(&ct, key, &m);
            }
            records.push(r);
            sources.push(m);
        }

        let mut store = Store::build(&records);
        let policy = MonsterPolicy::scan(&store, &records, pacer);
        store.set_hidden_monsters(policy.into_hidden());

        Corpus {
            records,
            sources,
            store,
            provenance,
            flattener: Flattener::default(),
        }
    }

    /// Single-stream corpus with no mod overlays.
    pub fn from_records(records: Vec<Record>) -> Corpus {
        let core = ModId::from("core");
        Corpus::new(
            records.into_iter().map(|r| (core.clone(), r)).collect(),
            &mut Uninterrupted,
        )
    }

    /// Corpus from a JSON array of record objects.
    pub fn from_json(v: Value) -> Result<Corpus> {
        let Value::Array(items) = v else {
            bail!("corpus must be a JSON array of records");
        };
        let mut records = Vec::with_capacity(items.len());
        for item in items {
            match Record::from_value(item) {
                Some(r) => records.push(r),
                None => bail!("corpus entries must be JSON objects"),
            }
        }
        Ok(Corpus::from_records(records))
    }

    pub fn record(&self, rid: RecordId) -> &Record {
        &self.records[rid.0 as usize]
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// The mod that supplied a record.
    pub fn source_of(&self, rid: RecordId) -> &ModId {
        &self.sources[rid.0 as usize]
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Fully inherited form of a record.
    pub fn flatten(&self, rid: RecordId) -> Arc<Record> {
        self.flattener.flatten(&self.store, &self.records, rid)
    }

    /// Flattened record by (type, key). The only error that escapes the
    /// content layer is this lookup failing.
    pub fn resolve(&self, type_tag: &str, key: &str) -> Result<Arc<Record>> {
        Ok(self.flatten(self.store.by_id(type_tag, key)?))
    }

    pub fn resolve_maybe(&self, type_tag: &str, key: &str) -> Option<Arc<Record>> {
        Some(self.flatten(self.store.by_id_maybe(type_tag, key)?))
    }

    /// All flattened concrete records of a type, in stream order.
    pub fn enumerate(&self, type_tag: &str) -> Vec<Arc<Record>> {
        self.store
            .by_type(type_tag)
            .into_iter()
            .map(|rid| self.flatten(rid))
            .collect()
    }

    /// Mods that supplied an entry directly under this key.
    pub fn direct_mods(&self, type_tag: &str, key: &str) -> &[ModId] {
        self.provenance.direct(canonical_type(type_tag), key)
    }

    /// Direct mods plus those whose contributions flowed in through the
    /// `copy-from` chain, in first-contribution order.
    pub fn contributing_mods(&self, type_tag: &str, key: &str) -> Vec<ModId> {
        let ct = canonical_type(type_tag);
        let mut out: Vec<ModId> = Vec::new();
        let mut visited: HashSet<String> = HashSet::default();
        let mut queue: VecDeque<String> = VecDeque::from([key.to_string()]);

        while let Some(key) = queue.pop_front() {
            if !visited.insert(key.clone()) {
                continue;
            }
            for m in self.provenance.direct(ct, &key) {
                if !out.contains(m) {
                    out.push(m.clone());
                }
            }
            let history = self
                .store
                .history(ct, &key)
                .iter()
                .chain(self.store.abstract_history(ct, &key));
            for &rid in history {
                if let Some(cf) = self.record(rid).copy_from() {
                    if cf != key {
                        queue.push_back(cf.to_string());
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
pub(crate) fn test_records(v: Value) -> Vec<Record> {
    let Value::Array(items) = v else {
        panic!("expected array");
    };
    items
        .into_iter()
        .map(|x| Record::from_value(x).expect("expected object"))
        .collect()
}
