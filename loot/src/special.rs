//! Aggregation across overmap terrains and specials.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use util::{IndexMap, Pacer};

use crate::schema::SpecialRecord;
use crate::{mapgen, Guide, Loot, LootKind};

/// Overmap ids inside a special carry a facing suffix; the terrain
/// record doesn't.
pub(crate) fn strip_direction(id: &str) -> &str {
    for suffix in ["_north", "_south", "_east", "_west"] {
        if let Some(stripped) = id.strip_suffix(suffix) {
            return stripped;
        }
    }
    id
}

/// One overmap terrain's distribution: the weighted average over its
/// variant generators.
pub(crate) fn omt_loot(guide: &Guide, kind: LootKind, omt_id: &str) -> Arc<Loot> {
    let key = (omt_id.to_string(), kind);
    if let Some(cached) = guide.omt_cache.get(&key) {
        return cached;
    }

    let loot = match guide.map_index().omt.get(omt_id) {
        Some(refs) => {
            let parts: Vec<(Arc<Loot>, f64)> = refs
                .iter()
                .map(|r| (mapgen::mapgen_loot(guide, kind, r), r.weight))
                .collect();
            Loot::merge(parts.iter().map(|(l, w)| (l.as_ref(), *w)))
        }
        None => Loot::default(),
    };
    guide.omt_cache.insert(key, Arc::new(loot))
}

/// A whole special: at-least-one across all its ground tiles, which roll
/// independently. Mutable specials stay opaque and yield nothing.
pub(crate) fn special_loot(
    guide: &Guide,
    kind: LootKind,
    oms_id: &str,
    pacer: &mut dyn Pacer,
) -> Result<Loot> {
    let flat = guide.corpus().resolve("overmap_special", oms_id)?;
    let spec = parse_special(flat.fields());
    if spec.is_mutable() {
        return Ok(Loot::default());
    }

    let mut out = Loot::default();
    for om in &spec.overmaps {
        if om.point[2] != 0 {
            continue;
        }
        let Some(id) = &om.overmap else { continue };
        out.and_assign(&omt_loot(guide, kind, strip_direction(id)));
        pacer.relinquish();
    }
    Ok(out)
}

fn parse_special(fields: &serde_json::Map<String, Value>) -> SpecialRecord {
    serde_json::from_value(Value::Object(fields.clone())).unwrap_or_else(|e| {
        log::warn!("overmap special does not parse: {e}");
        SpecialRecord::default()
    })
}

/// The visual fingerprint of one overmap terrain on the world map.
pub(crate) fn omt_appearance(guide: &Guide, omt_id: &str) -> String {
    let Some(r) = guide.corpus().resolve_maybe("overmap_terrain", omt_id) else {
        return "?".to_string();
    };
    let sym = match r.get("sym") {
        Some(Value::String(s)) => s.clone(),
        // Legacy numeric symbols are codepoints.
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| char::from_u32(n as u32))
            .map(String::from)
            .unwrap_or_else(|| "?".to_string()),
        _ => String::new(),
    };
    let color = r.get_str("color").unwrap_or("");
    let name = r.get("name").and_then(content::name_str).unwrap_or("");
    format!("{sym}:{color}:{name}")
}

/// Group every fixed special by the concatenated appearance of its
/// ground tiles, so visually identical variants collapse together.
pub(crate) fn specials_by_appearance(
    guide: &Guide,
    pacer: &mut dyn Pacer,
) -> IndexMap<String, Vec<String>> {
    let mut out: IndexMap<String, Vec<String>> = IndexMap::default();

    for flat in guide.corpus().enumerate("overmap_special") {
        let Some(id) = flat.get_str("id") else { continue };
        let spec = parse_special(flat.fields());
        if spec.is_mutable() {
            continue;
        }

        let tiles: Vec<String> = spec
            .overmaps
            .iter()
            .filter(|om| om.point[2] == 0)
            .filter_map(|om| om.overmap.as_deref())
            .map(|om| omt_appearance(guide, strip_direction(om)))
            .collect();

        out.entry(tiles.join("|")).or_default().push(id.to_string());
        pacer.relinquish();
    }

    for ids in out.values_mut() {
        ids.sort();
        ids.dedup();
    }
    out
}
