//! Mod overlays and their load order.

use anyhow::{bail, Result};
use derive_more::Display;
use util::{HashSet, IndexMap, Pacer};

use crate::{str_list, Corpus, Record};

/// Identifier of one content overlay.
#[derive(Clone, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ModId(pub String);

impl From<&str> for ModId {
    fn from(s: &str) -> Self {
        ModId(s.to_string())
    }
}

impl From<String> for ModId {
    fn from(s: String) -> Self {
        ModId(s)
    }
}

/// One overlay: its manifest and its record stream.
#[derive(Clone, Debug)]
pub struct ModData {
    pub id: ModId,
    pub dependencies: Vec<ModId>,
    pub records: Vec<Record>,
}

impl ModData {
    pub fn new(id: impl Into<ModId>, records: Vec<Record>) -> Self {
        ModData {
            id: id.into(),
            dependencies: Vec::new(),
            records,
        }
    }

    /// Read the manifest out of a `MOD_INFO` record in the stream.
    pub fn from_records(records: Vec<Record>) -> Option<Self> {
        let info = records.iter().find(|r| r.type_tag() == "MOD_INFO")?;
        let id = ModId::from(info.get_str("id")?);
        let dependencies = info
            .get("dependencies")
            .map(|v| str_list(v).into_iter().map(ModId::from).collect())
            .unwrap_or_default();
        Some(ModData {
            id,
            dependencies,
            records,
        })
    }
}

/// The core stream plus the overlays that can be applied on top of it.
#[derive(Debug)]
pub struct ModSet {
    core: ModData,
    available: IndexMap<ModId, ModData>,
}

impl ModSet {
    pub fn new(core: ModData) -> Self {
        ModSet {
            core,
            available: IndexMap::default(),
        }
    }

    pub fn insert(&mut self, m: ModData) {
        self.available.insert(m.id.clone(), m);
    }

    pub fn mods(&self) -> impl Iterator<Item = &ModId> {
        self.available.keys()
    }

    /// Dependency-closed emission order for a user selection. Depth
    /// first, dependencies before dependents, each mod once, the core id
    /// implicit and skipped, user order preserved among roots.
    pub fn resolve_order(&self, selected: &[ModId]) -> Result<Vec<&ModId>> {
        let mut order = Vec::new();
        let mut seen = HashSet::default();
        for m in selected {
            if !self.available.contains_key(m) {
                bail!("unknown mod: {m}");
            }
            self.visit(m, &mut seen, &mut order);
        }
        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        m: &ModId,
        seen: &mut HashSet<&'a ModId>,
        order: &mut Vec<&'a ModId>,
    ) {
        if *m == self.core.id {
            return;
        }
        let Some((key, data)) = self.available.get_key_value(m) else {
            log::warn!("mod {m}: dependency not present, skipping");
            return;
        };
        if !seen.insert(key) {
            return;
        }
        for dep in &data.dependencies {
            self.visit(dep, seen, order);
        }
        order.push(key);
    }

    /// Concatenate the core stream with the selected overlays and build
    /// a corpus from the result.
    pub fn corpus(&self, selected: &[ModId], pacer: &mut dyn Pacer) -> Result<Corpus> {
        let order = self.resolve_order(selected)?;

        let mut stream = Vec::new();
        for r in &self.core.records {
            stream.push((self.core.id.clone(), r.clone()));
        }
        for m in order {
            pacer.relinquish();
            for r in &self.available[m].records {
                stream.push((m.clone(), r.clone()));
            }
        }

        Ok(Corpus::new(stream, pacer))
    }
}
