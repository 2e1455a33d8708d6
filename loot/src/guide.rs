//! The query facade collaborators talk to.
//!
//! A [`Guide`] owns one corpus version and every derived table computed
//! from it. A [`Session`] holds the active guide and lets a host swap in
//! a new corpus; aggregations that straddle a swap abandon their result
//! so callers re-read fresh state.

use std::{
    cell::{Cell, OnceCell, RefCell},
    rc::Rc,
    sync::Arc,
};

use anyhow::Result;
use content::{Corpus, ModId, Record, RecordId};
use glam::IVec2;
use serde_json::Value;
use util::{Guard, HashMap, IndexMap, Memo, Pacer};

use crate::item_group::{self, FlatEntry};
use crate::mapgen::MapgenRef;
use crate::palette::SymbolTable;
use crate::requirement::{self, Requirement};
use crate::schema::MapgenRecord;
use crate::{special, Loot, LootKind};

/// One corpus and its derived tables.
pub struct Guide {
    corpus: Corpus,
    pub(crate) mapgen_cache: Memo<(RecordId, IVec2, LootKind), Arc<Loot>>,
    pub(crate) mapgen_guard: Guard<RecordId>,
    pub(crate) palette_cache: Memo<(RecordId, LootKind), Arc<SymbolTable>>,
    pub(crate) palette_guard: Guard<RecordId>,
    pub(crate) group_cache: Memo<RecordId, Arc<Vec<FlatEntry>>>,
    pub(crate) group_guard: Guard<RecordId>,
    pub(crate) requirement_guard: Guard<RecordId>,
    pub(crate) omt_cache: Memo<(String, LootKind), Arc<Loot>>,
    parsed_mapgens: Memo<RecordId, Arc<MapgenRecord>>,
    map_index: OnceCell<MapIndex>,
    sub_index: OnceCell<HashMap<String, Vec<String>>>,
}

/// Where each overmap terrain and nested chunk id finds its generators.
pub(crate) struct MapIndex {
    pub omt: HashMap<String, Vec<MapgenRef>>,
    pub nested: HashMap<String, Vec<MapgenRef>>,
}

impl Guide {
    pub fn new(corpus: Corpus) -> Guide {
        Guide {
            corpus,
            mapgen_cache: Memo::default(),
            mapgen_guard: Guard::default(),
            palette_cache: Memo::default(),
            palette_guard: Guard::default(),
            group_cache: Memo::default(),
            group_guard: Guard::default(),
            requirement_guard: Guard::default(),
            omt_cache: Memo::default(),
            parsed_mapgens: Memo::default(),
            map_index: OnceCell::new(),
            sub_index: OnceCell::new(),
        }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    /// Flattened record by (type, key).
    pub fn resolve(&self, type_tag: &str, key: &str) -> Result<Arc<Record>> {
        self.corpus.resolve(type_tag, key)
    }

    pub fn resolve_maybe(&self, type_tag: &str, key: &str) -> Option<Arc<Record>> {
        self.corpus.resolve_maybe(type_tag, key)
    }

    /// All flattened concrete records of a type, in load order.
    pub fn enumerate(&self, type_tag: &str) -> Vec<Arc<Record>> {
        self.corpus.enumerate(type_tag)
    }

    /// Item distribution over a whole overmap special.
    pub fn loot_for_special(&self, oms_id: &str, pacer: &mut dyn Pacer) -> Result<Loot> {
        special::special_loot(self, LootKind::Items, oms_id, pacer)
    }

    pub fn furniture_for_special(&self, oms_id: &str, pacer: &mut dyn Pacer) -> Result<Loot> {
        special::special_loot(self, LootKind::Furniture, oms_id, pacer)
    }

    pub fn terrain_for_special(&self, oms_id: &str, pacer: &mut dyn Pacer) -> Result<Loot> {
        special::special_loot(self, LootKind::Terrain, oms_id, pacer)
    }

    pub fn distribution_for_special(
        &self,
        kind: LootKind,
        oms_id: &str,
        pacer: &mut dyn Pacer,
    ) -> Result<Loot> {
        special::special_loot(self, kind, oms_id, pacer)
    }

    /// Distribution for a single overmap terrain id.
    pub fn distribution_for_terrain(&self, kind: LootKind, omt_id: &str) -> Arc<Loot> {
        special::omt_loot(self, kind, omt_id)
    }

    /// Specials bucketed by the look of their ground tiles.
    pub fn group_specials_by_appearance(
        &self,
        pacer: &mut dyn Pacer,
    ) -> IndexMap<String, Vec<String>> {
        special::specials_by_appearance(self, pacer)
    }

    pub fn direct_mods(&self, type_tag: &str, key: &str) -> &[ModId] {
        self.corpus.direct_mods(type_tag, key)
    }

    pub fn contributing_mods(&self, type_tag: &str, key: &str) -> Vec<ModId> {
        self.corpus.contributing_mods(type_tag, key)
    }

    /// Flattened entries of an item group.
    pub fn item_group(&self, id: &str) -> Option<Arc<Vec<FlatEntry>>> {
        let rid = self.corpus.store().by_id_maybe("item_group", id)?;
        Some(item_group::group_entries(self, rid))
    }

    /// A requirement expanded through `using`, with every count scaled.
    pub fn requirement(
        &self,
        id: &str,
        multiplier: f64,
        only_recoverable: bool,
    ) -> Result<Requirement> {
        let rid = self.corpus.store().by_id("requirement", id)?;
        Ok(requirement::expand(self, rid, multiplier, only_recoverable))
    }

    /// The inline requirement of a recipe, keyed by its result.
    pub fn recipe_requirement(&self, result: &str) -> Result<Requirement> {
        let rid = self.corpus.store().by_id("recipe", result)?;
        Ok(requirement::expand(self, rid, 1.0, false))
    }

    /// What taking a thing apart can give back: the uncraft record's
    /// components with unrecoverable ones dropped.
    pub fn uncraft_requirement(&self, result: &str) -> Result<Requirement> {
        let rid = self.corpus.store().by_id("uncraft", result)?;
        Ok(requirement::expand(self, rid, 1.0, true))
    }

    pub(crate) fn parsed_mapgen(&self, rid: RecordId) -> Arc<MapgenRecord> {
        self.parsed_mapgens.get_or_insert_with(rid, || {
            let flat = self.corpus.flatten(rid);
            let parsed = serde_json::from_value(Value::Object(flat.fields().clone()))
                .unwrap_or_else(|e| {
                    log::warn!("mapgen does not parse: {e}");
                    MapgenRecord::default()
                });
            Arc::new(parsed)
        })
    }

    pub(crate) fn map_index(&self) -> &MapIndex {
        self.map_index.get_or_init(|| build_map_index(self))
    }

    /// Items accepted in a tool's place: everything declaring the same
    /// `sub` key. A tool with no `sub` of its own stands under its id.
    pub(crate) fn tool_substitutes(&self, id: &str) -> Vec<String> {
        let sub_key = self
            .resolve_maybe("item", id)
            .and_then(|r| r.get_str("sub").map(str::to_string))
            .unwrap_or_else(|| id.to_string());
        self.sub_index
            .get_or_init(|| build_sub_index(self))
            .get(&sub_key)
            .map(|subs| subs.iter().filter(|s| *s != id).cloned().collect())
            .unwrap_or_default()
    }
}

fn build_map_index(guide: &Guide) -> MapIndex {
    let mut omt: HashMap<String, Vec<MapgenRef>> = HashMap::default();
    let mut nested: HashMap<String, Vec<MapgenRef>> = HashMap::default();

    for rid in guide.corpus.store().by_type("mapgen") {
        let rec = guide.parsed_mapgen(rid);
        let weight = rec.weight();

        match &rec.om_terrain {
            Some(Value::String(id)) => {
                omt.entry(id.clone()).or_default().push(MapgenRef {
                    rid,
                    cell: None,
                    weight,
                });
            }
            Some(Value::Array(entries)) => {
                if entries.iter().all(Value::is_string) {
                    // A flat list reuses the whole generator for every id.
                    for id in entries.iter().filter_map(Value::as_str) {
                        omt.entry(id.to_string()).or_default().push(MapgenRef {
                            rid,
                            cell: None,
                            weight,
                        });
                    }
                } else {
                    // A 2D grid splits into 24×24 cells, one per id.
                    for (y, row) in entries.iter().enumerate() {
                        let Value::Array(row) = row else { continue };
                        for (x, id) in row.iter().enumerate() {
                            let Some(id) = id.as_str() else { continue };
                            omt.entry(id.to_string()).or_default().push(MapgenRef {
                                rid,
                                cell: Some(IVec2::new(x as i32, y as i32)),
                                weight,
                            });
                        }
                    }
                }
            }
            _ => {}
        }

        for id in [&rec.nested_mapgen_id, &rec.update_mapgen_id]
            .into_iter()
            .flatten()
        {
            nested.entry(id.clone()).or_default().push(MapgenRef {
                rid,
                cell: None,
                weight,
            });
        }
    }

    MapIndex { omt, nested }
}

fn build_sub_index(guide: &Guide) -> HashMap<String, Vec<String>> {
    let mut index: HashMap<String, Vec<String>> = HashMap::default();
    for flat in guide.corpus.enumerate("item") {
        let (Some(id), Some(sub)) = (flat.get_str("id"), flat.get_str("sub")) else {
            continue;
        };
        index.entry(sub.to_string()).or_default().push(id.to_string());
    }
    index
}

/// The active guide, swappable by the host.
pub struct Session {
    active: RefCell<Rc<Guide>>,
    generation: Cell<u64>,
}

impl Session {
    pub fn new(guide: Guide) -> Session {
        Session {
            active: RefCell::new(Rc::new(guide)),
            generation: Cell::new(0),
        }
    }

    pub fn guide(&self) -> Rc<Guide> {
        self.active.borrow().clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.get()
    }

    /// Swap in a freshly loaded corpus. Every derived table of the old
    /// version goes with it.
    pub fn replace(&self, guide: Guide) {
        *self.active.borrow_mut() = Rc::new(guide);
        self.generation.set(self.generation.get() + 1);
    }

    /// Paced aggregation against the active guide. Returns `None` when
    /// the corpus was replaced while this computation was relinquished;
    /// the caller should refetch and retry against the new version.
    pub fn distribution_for_special(
        &self,
        kind: LootKind,
        oms_id: &str,
        pacer: &mut dyn Pacer,
    ) -> Result<Option<Loot>> {
        let start = self.generation.get();
        let guide = self.guide();
        let mut watch = ReplacementWatch {
            session: self,
            inner: pacer,
            start,
            tripped: false,
        };
        let loot = special::special_loot(&guide, kind, oms_id, &mut watch)?;
        Ok((!watch.tripped).then_some(loot))
    }

    pub fn loot_for_special(
        &self,
        oms_id: &str,
        pacer: &mut dyn Pacer,
    ) -> Result<Option<Loot>> {
        self.distribution_for_special(LootKind::Items, oms_id, pacer)
    }
}

/// Notices a corpus swap at each yield point.
struct ReplacementWatch<'a> {
    session: &'a Session,
    inner: &'a mut dyn Pacer,
    start: u64,
    tripped: bool,
}

impl Pacer for ReplacementWatch<'_> {
    fn relinquish(&mut self) {
        self.inner.relinquish();
        if self.session.generation() != self.start {
            self.tripped = true;
        }
    }
}
