//! Palette resolution: symbol → loot tables.
//!
//! A palette's own mappings merge with its referenced palettes, each
//! reference scaled by its normalized weight. Item-ish fields on one
//! symbol roll independently; furniture, terrain and nested chunks are
//! weighted exclusive alternatives.

use std::sync::Arc;

use serde_json::Value;
use util::HashMap;

use crate::schema::{MapgenValue, PaletteData, ParamScope};
use crate::{mapgen, Guide, ItemChance, Loot, LootKind};

pub(crate) type SymbolTable = HashMap<char, Loot>;

/// The symbol table of one palette body, references included.
pub(crate) fn table_for(
    guide: &Guide,
    kind: LootKind,
    data: &PaletteData,
    scope: &ParamScope,
) -> SymbolTable {
    let mut table = SymbolTable::default();

    match kind {
        LootKind::Items => {
            for (sym, spawns) in &data.item {
                for s in spawns.as_slice() {
                    add(&mut table, sym, mapgen::item_spawn_loot(scope, s));
                }
            }
            for (sym, spawns) in &data.items {
                for s in spawns.as_slice() {
                    add(&mut table, sym, mapgen::group_spawn_loot(guide, scope, s));
                }
            }
            for (sym, spawns) in &data.sealed_item {
                for s in spawns.as_slice() {
                    add(&mut table, sym, mapgen::sealed_spawn_loot(guide, scope, s));
                }
            }
            for (sym, block) in &data.mapping {
                if let Some(spawns) = &block.item {
                    for s in spawns.as_slice() {
                        add(&mut table, sym, mapgen::item_spawn_loot(scope, s));
                    }
                }
                if let Some(spawns) = &block.items {
                    for s in spawns.as_slice() {
                        add(&mut table, sym, mapgen::group_spawn_loot(guide, scope, s));
                    }
                }
            }
        }
        LootKind::Furniture => {
            for (sym, values) in &data.furniture {
                add(&mut table, sym, alternatives_loot(values.as_slice(), scope));
            }
            for (sym, block) in &data.mapping {
                if let Some(values) = &block.furniture {
                    add(&mut table, sym, alternatives_loot(values.as_slice(), scope));
                }
            }
            // The shell a sealed item sits in is furniture too.
            for (sym, spawns) in &data.sealed_item {
                for s in spawns.as_slice() {
                    if let Some(f) = &s.furniture {
                        let mut loot = Loot::default();
                        loot.insert_and(f.clone(), ItemChance::ONE);
                        add(&mut table, sym, loot);
                    }
                }
            }
        }
        LootKind::Terrain => {
            for (sym, values) in &data.terrain {
                add(&mut table, sym, alternatives_loot(values.as_slice(), scope));
            }
            for (sym, block) in &data.mapping {
                if let Some(values) = &block.terrain {
                    add(&mut table, sym, alternatives_loot(values.as_slice(), scope));
                }
            }
        }
    }

    // Nested chunks can place any of the three distributions.
    for (sym, spawns) in &data.nested {
        for s in spawns.as_slice() {
            let loot = mapgen::nested_spawn_loot(guide, kind, s);
            if !loot.is_empty() {
                add(&mut table, sym, loot);
            }
        }
    }

    // Referenced palettes fold in, each scaled by its weight; symbols
    // appearing in several sources roll independently.
    for pref in &data.palettes {
        for (pid, w) in pref.distribution(scope) {
            let sub = by_id(guide, kind, &pid);
            for (c, loot) in sub.iter() {
                let scaled = loot.scale(w);
                match table.get_mut(c) {
                    Some(existing) => existing.and_assign(&scaled),
                    None => {
                        table.insert(*c, scaled);
                    }
                }
            }
        }
    }

    table
}

/// A palette record's table, cached per record identity.
pub(crate) fn by_id(guide: &Guide, kind: LootKind, id: &str) -> Arc<SymbolTable> {
    let Some(rid) = guide.corpus().store().by_id_maybe("palette", id) else {
        log::debug!("no such palette: {id}");
        return Arc::new(SymbolTable::default());
    };

    let key = (rid, kind);
    if let Some(cached) = guide.palette_cache.get(&key) {
        return cached;
    }
    // Palettes referencing themselves resolve to nothing on re-entry.
    let Some(_token) = guide.palette_guard.enter(rid) else {
        return Arc::new(SymbolTable::default());
    };

    let flat = guide.corpus().flatten(rid);
    let data: PaletteData = serde_json::from_value(Value::Object(flat.fields().clone()))
        .unwrap_or_else(|e| {
            log::warn!("palette {id} does not parse: {e}");
            PaletteData::default()
        });
    let scope = ParamScope::with(&data.parameters);
    let table = table_for(guide, kind, &data, &scope);
    guide.palette_cache.insert(key, Arc::new(table))
}

/// Several values on one symbol pick one alternative, equally weighted;
/// each value's internal weights then split its share.
fn alternatives_loot(values: &[MapgenValue], scope: &ParamScope) -> Loot {
    let parts: Vec<Loot> = values
        .iter()
        .map(|v| {
            let mut loot = Loot::default();
            for (id, p) in v.distribution(scope) {
                loot.insert_and(id, ItemChance::new(p, p));
            }
            loot
        })
        .collect();
    Loot::merge(parts.iter().map(|l| (l, 1.0)))
}

fn add(table: &mut SymbolTable, sym: &str, loot: Loot) {
    let Some(c) = sym.chars().next() else {
        return;
    };
    match table.get_mut(&c) {
        Some(existing) => existing.and_assign(&loot),
        None => {
            table.insert(c, loot);
        }
    }
}
