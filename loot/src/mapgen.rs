//! Per-mapgen analytic evaluation.
//!
//! One map generator reduces to a loot table by counting palette symbols
//! in its rows and folding in the explicit place lists. Furniture and
//! terrain run through the same engine with their own mapping fields and
//! sentinel id.

use std::sync::Arc;

use content::RecordId;
use glam::IVec2;
use util::HashMap;

use crate::schema::{
    Count, GroupSpawn, ItemSpawn, LootPlacement, MapgenObject, MapgenValue, NestedSpawn,
    ParamScope, SealedSpawn, SetEntry, Spread,
};
use crate::{item_group, palette, Guide, ItemChance, Loot};

/// Tiles per overmap terrain side.
pub const OMT_SIZE: i32 = 24;

/// Which distribution an evaluator computes.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum LootKind {
    Items,
    Furniture,
    Terrain,
}

impl LootKind {
    /// The null id stripped from a finished table of this kind.
    pub fn sentinel(self) -> &'static str {
        match self {
            LootKind::Items => "null",
            LootKind::Furniture => "f_null",
            LootKind::Terrain => "t_null",
        }
    }
}

/// One use of a mapgen record: the whole record, or one 24×24 cell of a
/// multi-terrain grid.
#[derive(Clone, Debug)]
pub(crate) struct MapgenRef {
    pub rid: RecordId,
    pub cell: Option<IVec2>,
    pub weight: f64,
}

pub(crate) fn mapgen_loot(guide: &Guide, kind: LootKind, mref: &MapgenRef) -> Arc<Loot> {
    let key = (mref.rid, mref.cell.unwrap_or(IVec2::NEG_ONE), kind);
    if let Some(cached) = guide.mapgen_cache.get(&key) {
        return cached;
    }
    // Nested chunks that loop back into a generator being evaluated
    // contribute nothing.
    let Some(_token) = guide.mapgen_guard.enter(mref.rid) else {
        return Arc::new(Loot::default());
    };

    let record = guide.parsed_mapgen(mref.rid);
    let loot = eval(guide, kind, &record.object, mref.cell);
    guide.mapgen_cache.insert(key, Arc::new(loot))
}

/// Everything a nested chunk id can expand to, its variant records
/// folded by weight.
pub(crate) fn nested_loot_by_id(guide: &Guide, kind: LootKind, id: &str) -> Loot {
    if id == "null" {
        return Loot::default();
    }
    let Some(refs) = guide.map_index().nested.get(id) else {
        log::debug!("no such nested mapgen: {id}");
        return Loot::default();
    };
    let parts: Vec<(Arc<Loot>, f64)> = refs
        .iter()
        .map(|r| (mapgen_loot(guide, kind, r), r.weight))
        .collect();
    Loot::merge(parts.iter().map(|(l, w)| (l.as_ref(), *w)))
}

fn eval(guide: &Guide, kind: LootKind, obj: &MapgenObject, cell: Option<IVec2>) -> Loot {
    let scope = ParamScope::with(&obj.palette.parameters);
    let table = palette::table_for(guide, kind, &obj.palette, &scope);

    let rows = slice_rows(&obj.rows, cell);
    let mut counts: HashMap<char, i32> = HashMap::default();
    let mut total_cells = 0i32;
    for row in &rows {
        for c in row.chars() {
            total_cells += 1;
            if table.contains_key(&c) {
                *counts.entry(c).or_default() += 1;
            }
        }
    }
    if rows.is_empty() {
        let [w, h] = obj.mapgensize.unwrap_or([OMT_SIZE, OMT_SIZE]);
        total_cells = w * h;
    }

    let mut out = Loot::default();

    // Every tile showing a symbol rolls that symbol's loot once.
    for (c, n) in &counts {
        out.and_assign(&table[c].repeat(*n, *n));
    }

    match kind {
        LootKind::Items => {
            for spawn in obj.place_item.iter().chain(&obj.add) {
                if in_cell(cell, spawn.x, spawn.y) {
                    out.and_assign(&item_spawn_loot(&scope, spawn));
                }
            }
            for spawn in &obj.place_items {
                if in_cell(cell, spawn.x, spawn.y) {
                    out.and_assign(&group_spawn_loot(guide, &scope, spawn));
                }
            }
            for p in &obj.place_loot {
                if in_cell(cell, p.x, p.y) {
                    out.and_assign(&loot_placement(guide, p));
                }
            }
        }
        LootKind::Furniture => {
            for p in &obj.place_furniture {
                if in_cell(cell, p.x, p.y) {
                    out.and_assign(&value_placement(&scope, &p.furn, p.chance, p.repeat));
                }
            }
        }
        LootKind::Terrain => {
            for p in &obj.place_terrain {
                if in_cell(cell, p.x, p.y) {
                    out.and_assign(&value_placement(&scope, &p.ter, p.chance, p.repeat));
                }
            }
        }
    }

    for spawn in &obj.place_nested {
        if in_cell(cell, spawn.x, spawn.y) {
            out.and_assign(&nested_spawn_loot(guide, kind, spawn));
        }
    }

    if kind != LootKind::Items {
        for s in &obj.set {
            if in_cell(cell, s.x, s.y) {
                out.and_assign(&set_loot(kind, &scope, s));
            }
        }
    }

    // Tiles no terrain symbol claimed take the background fill.
    if kind == LootKind::Terrain {
        if let Some(fill) = &obj.fill_ter {
            let covered: i32 = counts.values().sum();
            let uncovered = (total_cells - covered).max(0);
            if uncovered > 0 {
                for (id, p) in fill.distribution(&scope) {
                    out.insert_and(id, ItemChance::new(p, p).repeat(uncovered, uncovered));
                }
            }
        }
    }

    out.strip(kind.sentinel());
    out
}

fn slice_rows(rows: &[String], cell: Option<IVec2>) -> Vec<String> {
    let Some(cell) = cell else {
        return rows.to_vec();
    };
    rows.iter()
        .skip((cell.y * OMT_SIZE) as usize)
        .take(OMT_SIZE as usize)
        .map(|r| {
            r.chars()
                .skip((cell.x * OMT_SIZE) as usize)
                .take(OMT_SIZE as usize)
                .collect()
        })
        .collect()
}

/// Grid mapgens assign each place entry to the cell holding its minimum
/// coordinates.
fn in_cell(cell: Option<IVec2>, x: Option<Spread>, y: Option<Spread>) -> bool {
    let Some(cell) = cell else {
        return true;
    };
    let x = x.map(Spread::min).unwrap_or(0);
    let y = y.map(Spread::min).unwrap_or(0);
    x.div_euclid(OMT_SIZE) == cell.x && y.div_euclid(OMT_SIZE) == cell.y
}

fn apply_repeat(loot: Loot, repeat: Option<Count>) -> Loot {
    match repeat {
        Some(c) => {
            let (lo, hi) = c.bounds();
            loot.repeat(lo, hi)
        }
        None => loot,
    }
}

pub(crate) fn item_spawn_loot(scope: &ParamScope, spawn: &ItemSpawn) -> Loot {
    let Some(value) = &spawn.item else {
        return Loot::default();
    };
    let raw = spawn.chance.unwrap_or(100.0) / 100.0;
    let amount = spawn.amount.map(Count::midpoint).unwrap_or(1.0);

    let mut out = Loot::default();
    for (id, p) in value.distribution(scope) {
        // Chance saturates at certainty; the surplus of a >100% chance
        // shows up in the expected count.
        out.insert_and(id, ItemChance::new(raw * p, raw * p * amount));
    }
    apply_repeat(out, spawn.repeat)
}

pub(crate) fn group_spawn_loot(guide: &Guide, scope: &ParamScope, spawn: &GroupSpawn) -> Loot {
    let Some(value) = &spawn.item else {
        return Loot::default();
    };
    let chance = spawn.chance.unwrap_or(100.0) / 100.0;

    let mut out = Loot::default();
    for (gid, p) in value.distribution(scope) {
        out.and_assign(&item_group::group_loot(guide, &gid).scale(chance * p));
    }
    apply_repeat(out, spawn.repeat)
}

pub(crate) fn sealed_spawn_loot(guide: &Guide, scope: &ParamScope, spawn: &SealedSpawn) -> Loot {
    let mut out = Loot::default();
    if let Some(spawns) = &spawn.item {
        for s in spawns.as_slice() {
            out.and_assign(&item_spawn_loot(scope, s));
        }
    }
    if let Some(spawns) = &spawn.items {
        for s in spawns.as_slice() {
            out.and_assign(&group_spawn_loot(guide, scope, s));
        }
    }
    match spawn.chance {
        Some(c) => out.scale(c / 100.0),
        None => out,
    }
}

fn loot_placement(guide: &Guide, p: &LootPlacement) -> Loot {
    let base = p.chance.unwrap_or(100.0) / 100.0;

    let mut out = Loot::default();
    if let Some(id) = &p.item {
        out.insert_and(id.clone(), ItemChance::new(base, base));
    }
    if let Some(gid) = &p.group {
        out.and_assign(&item_group::group_loot(guide, gid).scale(base));
    }

    // Guns placed this way may come with ammo and a spare magazine.
    let mut companions = Vec::new();
    for (suffix, pct) in [("ammo", p.ammo), ("magazine", p.magazine)] {
        let pct = pct.unwrap_or(0.0) / 100.0;
        if pct <= 0.0 {
            continue;
        }
        for (id, c) in out.iter() {
            let prob = c.prob * pct;
            companions.push((format!("{id}_{suffix}"), ItemChance::new(prob, prob)));
        }
    }
    for (id, c) in companions {
        out.insert_and(id, c);
    }

    apply_repeat(out, p.repeat)
}

fn value_placement(
    scope: &ParamScope,
    value: &Option<MapgenValue>,
    chance: Option<f64>,
    repeat: Option<Count>,
) -> Loot {
    let Some(value) = value else {
        return Loot::default();
    };
    let c = chance.unwrap_or(100.0) / 100.0;

    let mut out = Loot::default();
    for (id, p) in value.distribution(scope) {
        out.insert_and(id, ItemChance::new(c * p, c * p));
    }
    apply_repeat(out, repeat)
}

pub(crate) fn nested_spawn_loot(guide: &Guide, kind: LootKind, spawn: &NestedSpawn) -> Loot {
    let mut chunks: Vec<(String, f64)> = spawn
        .chunks
        .iter()
        .map(|c| (c.id().to_string(), c.weight().max(0.0)))
        .collect();
    let mut elses: Vec<(String, f64)> = spawn
        .else_chunks
        .iter()
        .map(|c| (c.id().to_string(), c.weight().max(0.0)))
        .collect();

    let branches = if spawn.conditional() {
        // With placement conditions the two branches are a coin flip:
        // rescale the else side to weigh exactly as much as the chunk
        // side, padding an empty side with a null entry.
        let sum = |xs: &[(String, f64)]| xs.iter().map(|(_, w)| w).sum::<f64>();
        let (sum_c, sum_e) = (sum(&chunks), sum(&elses));
        if chunks.is_empty() {
            chunks.push(("null".to_string(), if sum_e > 0.0 { sum_e } else { 1.0 }));
        }
        if elses.is_empty() {
            elses.push(("null".to_string(), if sum_c > 0.0 { sum_c } else { 1.0 }));
        }
        let (sum_c, sum_e) = (sum(&chunks), sum(&elses));
        let f = if sum_e > 0.0 { sum_c / sum_e } else { 1.0 };
        chunks.extend(elses.into_iter().map(|(id, w)| (id, w * f)));
        chunks
    } else if !chunks.is_empty() {
        chunks
    } else {
        elses
    };

    let parts: Vec<(Loot, f64)> = branches
        .into_iter()
        .map(|(id, w)| (nested_loot_by_id(guide, kind, &id), w))
        .collect();
    let merged = Loot::merge(parts.iter().map(|(l, w)| (l, *w)));
    apply_repeat(merged, spawn.repeat)
}

fn set_loot(kind: LootKind, scope: &ParamScope, s: &SetEntry) -> Loot {
    let target = match kind {
        LootKind::Furniture => "furniture",
        LootKind::Terrain => "terrain",
        LootKind::Items => return Loot::default(),
    };
    let Some(value) = &s.id else {
        return Loot::default();
    };

    let x = s.x.map(Spread::min).unwrap_or(0);
    let y = s.y.map(Spread::min).unwrap_or(0);
    let x2 = s.x2.map(Spread::min).unwrap_or(x);
    let y2 = s.y2.map(Spread::min).unwrap_or(y);
    let (dx, dy) = ((x2 - x).abs(), (y2 - y).abs());

    let tiles = if s.point.as_deref() == Some(target) {
        1
    } else if s.line.as_deref() == Some(target) {
        dx.max(dy) + 1
    } else if s.square.as_deref() == Some(target) {
        (dx + 1) * (dy + 1)
    } else {
        return Loot::default();
    };

    let p = s.chance.unwrap_or(100.0) / 100.0;
    let mut out = Loot::default();
    for (id, pid) in value.distribution(scope) {
        let per_tile = (p * pid).clamp(0.0, 1.0);
        out.insert_and(
            id,
            ItemChance::new(1.0 - (1.0 - per_tile).powi(tiles), per_tile * tiles as f64),
        );
    }
    apply_repeat(out, s.repeat)
}
