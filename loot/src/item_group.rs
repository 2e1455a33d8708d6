//! Item group expansion.
//!
//! Groups nest arbitrarily; a `collection` rolls every entry on its own,
//! a `distribution` picks exactly one by weight. Expansion reduces the
//! whole tree to a flat list of per-id chances without sampling.

use std::sync::Arc;

use content::RecordId;
use serde::Deserialize;
use serde_json::Value;
use util::IndexMap;

use crate::{Guide, ItemChance, Loot};
use crate::schema::Count;

/// One line of a flattened item group.
#[derive(Clone, Debug, PartialEq)]
pub struct FlatEntry {
    pub id: String,
    pub count: (i32, i32),
    pub chance: ItemChance,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
struct GroupRecord {
    subtype: Option<String>,
    entries: Vec<GroupEntry>,
    items: Vec<GroupEntry>,
    groups: Vec<GroupEntry>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum GroupEntry {
    Bare(String),
    Pair(String, f64),
    Spec(Box<EntrySpec>),
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
struct EntrySpec {
    item: Option<String>,
    group: Option<String>,
    collection: Option<Vec<GroupEntry>>,
    distribution: Option<Vec<GroupEntry>>,
    prob: Option<f64>,
    count: Option<Count>,
    #[serde(rename = "container-item")]
    container_item: Option<String>,
}

#[derive(Copy, Clone)]
enum EntryKind {
    Item,
    Group,
}

/// An entry list with the kind bare names default to in that list.
fn normalize(entries: &[GroupEntry], kind: EntryKind) -> Vec<EntrySpec> {
    entries
        .iter()
        .map(|e| match e {
            GroupEntry::Bare(id) => named(id.clone(), None, kind),
            GroupEntry::Pair(id, w) => named(id.clone(), Some(*w), kind),
            GroupEntry::Spec(spec) => (**spec).clone(),
        })
        .collect()
}

fn named(id: String, prob: Option<f64>, kind: EntryKind) -> EntrySpec {
    let mut spec = EntrySpec {
        prob,
        ..Default::default()
    };
    match kind {
        EntryKind::Item => spec.item = Some(id),
        EntryKind::Group => spec.group = Some(id),
    }
    spec
}

/// Flattened entries of an item group record, cached per record.
pub(crate) fn group_entries(guide: &Guide, rid: RecordId) -> Arc<Vec<FlatEntry>> {
    if let Some(cached) = guide.group_cache.get(&rid) {
        return cached;
    }
    // A group that contains itself contributes nothing on re-entry.
    let Some(_token) = guide.group_guard.enter(rid) else {
        return Arc::new(Vec::new());
    };

    let flat = guide.corpus().flatten(rid);
    let parsed: GroupRecord =
        serde_json::from_value(Value::Object(flat.fields().clone())).unwrap_or_else(|e| {
            log::warn!("item group does not parse: {e}");
            GroupRecord::default()
        });

    let mut entries = normalize(&parsed.entries, EntryKind::Item);
    entries.extend(normalize(&parsed.items, EntryKind::Item));
    entries.extend(normalize(&parsed.groups, EntryKind::Group));

    let collection = parsed.subtype.as_deref() == Some("collection");
    let out = expand(guide, &entries, collection);
    guide.group_cache.insert(rid, Arc::new(out))
}

pub(crate) fn group_entries_by_id(guide: &Guide, id: &str) -> Arc<Vec<FlatEntry>> {
    match guide.corpus().store().by_id_maybe("item_group", id) {
        Some(rid) => group_entries(guide, rid),
        None => {
            log::debug!("no such item group: {id}");
            Arc::new(Vec::new())
        }
    }
}

/// An item group as a loot table.
pub(crate) fn group_loot(guide: &Guide, id: &str) -> Loot {
    let mut out = Loot::default();
    for e in group_entries_by_id(guide, id).iter() {
        out.insert_and(e.id.clone(), e.chance);
    }
    out
}

fn expand(guide: &Guide, entries: &[EntrySpec], collection: bool) -> Vec<FlatEntry> {
    let total: f64 = entries
        .iter()
        .map(|e| e.prob.unwrap_or(100.0).max(0.0))
        .sum();

    let mut out: IndexMap<String, FlatEntry> = IndexMap::default();
    for e in entries {
        // Collections roll each entry independently at prob%;
        // distributions normalize entry weights into a partition.
        let p = if collection {
            (e.prob.unwrap_or(100.0) / 100.0).clamp(0.0, 1.0)
        } else if total > 0.0 {
            e.prob.unwrap_or(100.0).max(0.0) / total
        } else {
            0.0
        };
        let count = e.count.map(Count::bounds).unwrap_or((1, 1));
        let midpoint = (count.0 + count.1) as f64 / 2.0;

        if let Some(id) = &e.item {
            push(&mut out, id.clone(), count, ItemChance::new(p, p * midpoint));
            if let Some(container) = container_for(guide, e, id) {
                push(&mut out, container, (1, 1), ItemChance::new(p, p));
            }
        } else if let Some(gid) = &e.group {
            absorb_children(&mut out, &group_entries_by_id(guide, gid), e, p);
        } else if let Some(sub) = &e.collection {
            let children = expand(guide, &normalize(sub, EntryKind::Item), true);
            absorb_children(&mut out, &children, e, p);
        } else if let Some(sub) = &e.distribution {
            let children = expand(guide, &normalize(sub, EntryKind::Item), false);
            absorb_children(&mut out, &children, e, p);
        }
    }
    out.into_values().collect()
}

fn absorb_children(
    out: &mut IndexMap<String, FlatEntry>,
    children: &[FlatEntry],
    e: &EntrySpec,
    p: f64,
) {
    for ch in children {
        let mut chance = ch.chance;
        if let Some(count) = e.count {
            let (lo, hi) = count.bounds();
            chance = chance.repeat(lo, hi);
        }
        push(out, ch.id.clone(), ch.count, chance.scale(p));
    }
}

/// The container an entry's items arrive in: the entry's own override,
/// or the default container of the item record.
fn container_for(guide: &Guide, e: &EntrySpec, item_id: &str) -> Option<String> {
    if let Some(c) = &e.container_item {
        return Some(c.clone());
    }
    guide
        .corpus()
        .resolve_maybe("item", item_id)
        .and_then(|r| r.get_str("container").map(str::to_string))
        .filter(|c| c != "null")
}

/// Later occurrences of an id combine independently with earlier ones.
fn push(out: &mut IndexMap<String, FlatEntry>, id: String, count: (i32, i32), chance: ItemChance) {
    match out.get_mut(&id) {
        Some(existing) => {
            existing.chance = existing.chance.and(chance);
            existing.count = (existing.count.0.min(count.0), existing.count.1 + count.1);
        }
        None => {
            out.insert(
                id.clone(),
                FlatEntry { id, count, chance },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use content::Corpus;
    use serde_json::json;

    use super::*;

    fn guide(records: Value) -> Guide {
        Guide::new(Corpus::from_json(records).unwrap())
    }

    fn entry<'a>(entries: &'a [FlatEntry], id: &str) -> &'a FlatEntry {
        entries.iter().find(|e| e.id == id).unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn collection_with_containers() {
        let g = guide(json!([
            {"type": "item_group", "id": "stash", "subtype": "collection", "entries": [
                {"item": "contained", "prob": 50, "container-item": "box"},
                {"item": "other", "prob": 10}
            ]}
        ]));

        let entries = g.item_group("stash").unwrap();
        let c = entry(&entries, "contained");
        assert!(close(c.chance.prob, 0.5) && close(c.chance.expected, 0.5));
        let b = entry(&entries, "box");
        assert!(close(b.chance.prob, 0.5) && close(b.chance.expected, 0.5));
        let o = entry(&entries, "other");
        assert!(close(o.chance.prob, 0.1) && close(o.chance.expected, 0.1));
    }

    #[test]
    fn item_default_container_attaches() {
        let g = guide(json!([
            {"type": "COMESTIBLE", "id": "cola", "container": "bottle_plastic"},
            {"type": "item_group", "id": "fridge", "subtype": "collection", "entries": [
                {"item": "cola", "prob": 50}
            ]}
        ]));

        let entries = g.item_group("fridge").unwrap();
        let b = entry(&entries, "bottle_plastic");
        assert!(close(b.chance.prob, 0.5));
    }

    #[test]
    fn distribution_normalizes() {
        let g = guide(json!([
            {"type": "item_group", "id": "pick_one", "subtype": "distribution", "entries": [
                {"item": "a", "prob": 30},
                {"item": "b", "prob": 10}
            ]}
        ]));

        let entries = g.item_group("pick_one").unwrap();
        assert!(close(entry(&entries, "a").chance.prob, 0.75));
        assert!(close(entry(&entries, "b").chance.prob, 0.25));

        // A distribution's probabilities partition at most one pick.
        let total: f64 = entries.iter().map(|e| e.chance.prob).sum();
        assert!(total <= 1.0 + 1e-9);
    }

    #[test]
    fn legacy_shorthand_entries() {
        let g = guide(json!([
            {"type": "item_group", "id": "inner", "subtype": "distribution",
             "items": [["a", 1]]},
            {"type": "item_group", "id": "outer", "subtype": "distribution",
             "items": [["b", 1], ["c", 1]], "groups": [["inner", 2]]}
        ]));

        let entries = g.item_group("outer").unwrap();
        assert!(close(entry(&entries, "b").chance.prob, 0.25));
        assert!(close(entry(&entries, "c").chance.prob, 0.25));
        assert!(close(entry(&entries, "a").chance.prob, 0.5));
    }

    #[test]
    fn nested_anonymous_groups() {
        let g = guide(json!([
            {"type": "item_group", "id": "mixed", "subtype": "collection", "entries": [
                {"distribution": [{"item": "x", "prob": 1}, {"item": "y", "prob": 1}],
                 "prob": 50}
            ]}
        ]));

        let entries = g.item_group("mixed").unwrap();
        assert!(close(entry(&entries, "x").chance.prob, 0.25));
        assert!(close(entry(&entries, "y").chance.prob, 0.25));
    }

    #[test]
    fn count_scales_expectation() {
        let g = guide(json!([
            {"type": "item_group", "id": "ammo_box", "subtype": "collection", "entries": [
                {"item": "cartridge", "prob": 50, "count": [2, 6]}
            ]}
        ]));

        let entries = g.item_group("ammo_box").unwrap();
        let c = entry(&entries, "cartridge");
        assert_eq!(c.count, (2, 6));
        assert!(close(c.chance.prob, 0.5));
        assert!(close(c.chance.expected, 2.0));
    }

    #[test]
    fn self_referential_group_degrades() {
        let g = guide(json!([
            {"type": "item_group", "id": "loop", "subtype": "collection", "entries": [
                {"group": "loop", "prob": 50},
                {"item": "pebble", "prob": 10}
            ]}
        ]));

        let entries = g.item_group("loop").unwrap();
        assert_eq!(entries.len(), 1);
        assert!(close(entry(&entries, "pebble").chance.prob, 0.1));
    }

    #[test]
    fn duplicate_ids_combine() {
        let g = guide(json!([
            {"type": "item_group", "id": "pockets", "subtype": "collection", "entries": [
                {"item": "coin", "prob": 50},
                {"item": "coin", "prob": 50}
            ]}
        ]));

        let entries = g.item_group("pockets").unwrap();
        assert_eq!(entries.len(), 1);
        let c = entry(&entries, "coin");
        assert!(close(c.chance.prob, 0.75));
        assert!(close(c.chance.expected, 1.0));
    }
}
