//! Typed views over flattened map generator family records.
//!
//! Records stay open maps in the content layer; the evaluators read them
//! through these serde facades. Unknown fields pass through untouched,
//! and the one-or-many and id-or-weighted shapes of the corpus get
//! untagged enums.

use serde::Deserialize;
use serde_json::Value;
use util::IndexMap;

/// Parameter declarations visible to a mapgen value, innermost first.
#[derive(Debug, Default)]
pub struct ParamScope<'a> {
    layers: Vec<&'a IndexMap<String, Parameter>>,
}

impl<'a> ParamScope<'a> {
    pub fn with(layer: &'a IndexMap<String, Parameter>) -> Self {
        ParamScope {
            layers: vec![layer],
        }
    }

    pub fn push(&mut self, layer: &'a IndexMap<String, Parameter>) {
        self.layers.push(layer);
    }

    /// The default value of a named parameter, if any layer declares it.
    pub fn lookup(&self, name: &str) -> Option<&'a MapgenValue> {
        self.layers
            .iter()
            .find_map(|l| l.get(name).and_then(|p| p.default.as_ref()))
    }
}

/// A field holding either one value or a list of them.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn as_slice(&self) -> &[T] {
        match self {
            OneOrMany::One(x) => std::slice::from_ref(x),
            OneOrMany::Many(xs) => xs,
        }
    }
}

/// An id with an optional weight, as in `"t_grass"` or `["t_grass", 3]`.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum WeightedId {
    Bare(String),
    Weighted(String, f64),
}

impl WeightedId {
    pub fn id(&self) -> &str {
        match self {
            WeightedId::Bare(id) => id,
            WeightedId::Weighted(id, _) => id,
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            WeightedId::Bare(_) => 1.0,
            WeightedId::Weighted(_, w) => *w,
        }
    }
}

/// A count that is either flat or a `[lo, hi]` range.
#[derive(Copy, Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum Count {
    Flat(i32),
    Range([i32; 2]),
}

impl Count {
    pub fn bounds(self) -> (i32, i32) {
        match self {
            Count::Flat(n) => (n, n),
            Count::Range([lo, hi]) => (lo, hi),
        }
    }

    pub fn midpoint(self) -> f64 {
        let (lo, hi) = self.bounds();
        (lo + hi) as f64 / 2.0
    }
}

/// A placement coordinate, either exact or spread over a range.
#[derive(Copy, Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum Spread {
    At(i32),
    Between([i32; 2]),
}

impl Spread {
    pub fn min(self) -> i32 {
        match self {
            Spread::At(n) => n,
            Spread::Between([a, b]) => a.min(b),
        }
    }
}

/// A map generator value: one id chosen from a possibly conditional,
/// possibly parameterized distribution.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum MapgenValue {
    Id(String),
    List(Vec<WeightedId>),
    Spec(Box<ValueSpec>),
}

/// The object forms a mapgen value can take.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ValueSpec {
    pub ter: Option<String>,
    pub furn: Option<String>,
    pub param: Option<String>,
    pub fallback: Option<String>,
    pub distribution: Option<Vec<WeightedId>>,
    pub switch: Option<MapgenValue>,
    pub cases: IndexMap<String, String>,
}

impl MapgenValue {
    /// Reduce to id → probability. Parameters resolve to their default
    /// in the enclosing scope; a missing parameter falls back to the
    /// spec's fallback id.
    pub fn distribution(&self, scope: &ParamScope) -> Vec<(String, f64)> {
        match self {
            MapgenValue::Id(id) => vec![(id.clone(), 1.0)],
            MapgenValue::List(xs) => normalize(xs),
            MapgenValue::Spec(spec) => spec.distribution(scope),
        }
    }
}

impl ValueSpec {
    fn distribution(&self, scope: &ParamScope) -> Vec<(String, f64)> {
        if let Some(id) = self.ter.as_ref().or(self.furn.as_ref()) {
            return vec![(id.clone(), 1.0)];
        }
        if let Some(xs) = &self.distribution {
            return normalize(xs);
        }
        if let Some(name) = &self.param {
            if let Some(value) = scope.lookup(name) {
                return value.distribution(scope);
            }
            return self
                .fallback
                .as_ref()
                .map(|f| vec![(f.clone(), 1.0)])
                .unwrap_or_default();
        }
        if let Some(switch) = &self.switch {
            let mut out = Vec::new();
            for (value, p) in switch.distribution(scope) {
                let id = self
                    .cases
                    .get(&value)
                    .cloned()
                    .or_else(|| self.fallback.clone());
                if let Some(id) = id {
                    out.push((id, p));
                }
            }
            return out;
        }
        Vec::new()
    }
}

fn normalize(xs: &[WeightedId]) -> Vec<(String, f64)> {
    let total: f64 = xs.iter().map(|x| x.weight().max(0.0)).sum();
    if total <= 0.0 {
        return Vec::new();
    }
    xs.iter()
        .map(|x| (x.id().to_string(), x.weight().max(0.0) / total))
        .collect()
}

/// A declared mapgen parameter; only the default matters analytically.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Parameter {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub default: Option<MapgenValue>,
    pub scope: Option<String>,
}

pub type SymbolMap<T> = IndexMap<String, T>;

/// The symbol mapping fields shared by palettes and mapgen objects.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct PaletteData {
    pub palettes: Vec<MapgenValue>,
    pub item: SymbolMap<OneOrMany<ItemSpawn>>,
    pub items: SymbolMap<OneOrMany<GroupSpawn>>,
    pub sealed_item: SymbolMap<OneOrMany<SealedSpawn>>,
    pub furniture: SymbolMap<OneOrMany<MapgenValue>>,
    pub terrain: SymbolMap<OneOrMany<MapgenValue>>,
    pub nested: SymbolMap<OneOrMany<NestedSpawn>>,
    pub mapping: SymbolMap<MappingBlock>,
    pub parameters: IndexMap<String, Parameter>,
}

/// One symbol's combined mapping block.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct MappingBlock {
    pub item: Option<OneOrMany<ItemSpawn>>,
    pub items: Option<OneOrMany<GroupSpawn>>,
    pub furniture: Option<OneOrMany<MapgenValue>>,
    pub terrain: Option<OneOrMany<MapgenValue>>,
}

/// A single-item spawn, from symbol `item` maps, `place_item` and `add`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ItemSpawn {
    pub item: Option<MapgenValue>,
    pub amount: Option<Count>,
    pub chance: Option<f64>,
    pub repeat: Option<Count>,
    pub x: Option<Spread>,
    pub y: Option<Spread>,
}

/// An item group spawn, from symbol `items` maps and `place_items`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct GroupSpawn {
    pub item: Option<MapgenValue>,
    pub chance: Option<f64>,
    pub repeat: Option<Count>,
    pub x: Option<Spread>,
    pub y: Option<Spread>,
}

/// Loot sealed inside a furniture piece.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SealedSpawn {
    pub furniture: Option<String>,
    pub item: Option<OneOrMany<ItemSpawn>>,
    pub items: Option<OneOrMany<GroupSpawn>>,
    pub chance: Option<f64>,
}

/// A nested mapgen reference, from symbol `nested` maps and
/// `place_nested`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct NestedSpawn {
    pub chunks: Vec<WeightedId>,
    pub else_chunks: Vec<WeightedId>,
    pub neighbors: Option<Value>,
    pub connections: Option<Value>,
    pub joins: Option<Value>,
    pub repeat: Option<Count>,
    pub x: Option<Spread>,
    pub y: Option<Spread>,
}

impl NestedSpawn {
    /// Placement conditions make the chunk branches a coin flip.
    pub fn conditional(&self) -> bool {
        self.neighbors.is_some() || self.connections.is_some() || self.joins.is_some()
    }
}

/// A `place_loot` entry: an item or group with optional ammo and
/// magazine percentages.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct LootPlacement {
    pub group: Option<String>,
    pub item: Option<String>,
    pub chance: Option<f64>,
    pub ammo: Option<f64>,
    pub magazine: Option<f64>,
    pub repeat: Option<Count>,
    pub x: Option<Spread>,
    pub y: Option<Spread>,
}

/// A `place_furniture` or `place_terrain` entry.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ValuePlacement {
    pub furn: Option<MapgenValue>,
    pub ter: Option<MapgenValue>,
    pub chance: Option<f64>,
    pub repeat: Option<Count>,
    pub x: Option<Spread>,
    pub y: Option<Spread>,
}

/// A `set` entry painting a point, line or square.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SetEntry {
    pub point: Option<String>,
    pub line: Option<String>,
    pub square: Option<String>,
    pub id: Option<MapgenValue>,
    pub chance: Option<f64>,
    pub repeat: Option<Count>,
    pub x: Option<Spread>,
    pub y: Option<Spread>,
    pub x2: Option<Spread>,
    pub y2: Option<Spread>,
}

/// The generator body of a mapgen record.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct MapgenObject {
    #[serde(flatten)]
    pub palette: PaletteData,
    pub rows: Vec<String>,
    pub fill_ter: Option<MapgenValue>,
    pub mapgensize: Option<[i32; 2]>,
    pub place_item: Vec<ItemSpawn>,
    pub add: Vec<ItemSpawn>,
    pub place_items: Vec<GroupSpawn>,
    pub place_loot: Vec<LootPlacement>,
    pub place_nested: Vec<NestedSpawn>,
    pub place_furniture: Vec<ValuePlacement>,
    pub place_terrain: Vec<ValuePlacement>,
    pub set: Vec<SetEntry>,
}

/// One mapgen record as the evaluator sees it.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct MapgenRecord {
    pub om_terrain: Option<Value>,
    pub nested_mapgen_id: Option<String>,
    pub update_mapgen_id: Option<String>,
    pub weight: Option<f64>,
    pub object: MapgenObject,
}

impl MapgenRecord {
    pub fn weight(&self) -> f64 {
        self.weight.unwrap_or(1000.0)
    }
}

/// An overmap special: a multi-terrain structure.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SpecialRecord {
    pub subtype: Option<String>,
    pub overmaps: Vec<SpecialEntry>,
}

impl SpecialRecord {
    /// Mutable specials rearrange themselves at runtime and stay opaque
    /// to the analytic engine.
    pub fn is_mutable(&self) -> bool {
        self.subtype.as_deref() == Some("mutable")
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SpecialEntry {
    pub point: [i32; 3],
    pub overmap: Option<String>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn scope() -> ParamScope<'static> {
        ParamScope::default()
    }

    #[test]
    fn weighted_lists_normalize() {
        let v: MapgenValue = serde_json::from_value(json!(["t_a", ["t_b", 3]])).unwrap();
        let d = v.distribution(&scope());
        assert_eq!(d, vec![("t_a".to_string(), 0.25), ("t_b".to_string(), 0.75)]);
    }

    #[test]
    fn value_spec_forms() {
        let v: MapgenValue = serde_json::from_value(json!({"ter": "t_floor"})).unwrap();
        assert_eq!(v.distribution(&scope()), vec![("t_floor".to_string(), 1.0)]);

        let v: MapgenValue =
            serde_json::from_value(json!({"distribution": [["a", 1], ["b", 1]]})).unwrap();
        let d = v.distribution(&scope());
        assert_eq!(d[0].1, 0.5);

        let v: MapgenValue =
            serde_json::from_value(json!({"param": "wall_type", "fallback": "t_wall"}))
                .unwrap();
        assert_eq!(v.distribution(&scope()), vec![("t_wall".to_string(), 1.0)]);
    }

    #[test]
    fn switch_maps_through_cases() {
        let v: MapgenValue = serde_json::from_value(json!({
            "switch": {"distribution": [["old", 1], ["new", 3]]},
            "cases": {"old": "t_pavement_cracked", "new": "t_pavement"}
        }))
        .unwrap();
        let d = v.distribution(&scope());
        assert_eq!(
            d,
            vec![
                ("t_pavement_cracked".to_string(), 0.25),
                ("t_pavement".to_string(), 0.75)
            ]
        );
    }

    #[test]
    fn mapgen_object_parses() {
        let mg: MapgenRecord = serde_json::from_value(json!({
            "om_terrain": "house",
            "weight": 250,
            "object": {
                "rows": ["..", ".."],
                "fill_ter": "t_floor",
                "palettes": ["domestic"],
                "items": {".": {"item": "junk", "chance": 30}},
                "place_loot": [{"group": "guns", "x": 1, "y": [0, 1], "chance": 50}],
                "set": [{"point": "terrain", "id": "t_dirt", "x": 0, "y": 0}]
            }
        }))
        .unwrap();

        assert_eq!(mg.weight(), 250.0);
        assert_eq!(mg.object.rows.len(), 2);
        assert_eq!(mg.object.palette.palettes.len(), 1);
        assert!(mg.object.palette.items.contains_key("."));
        assert_eq!(mg.object.place_loot[0].y.unwrap().min(), 0);
    }

    #[test]
    fn count_shapes() {
        let c: Count = serde_json::from_value(json!(4)).unwrap();
        assert_eq!(c.bounds(), (4, 4));
        let c: Count = serde_json::from_value(json!([2, 6])).unwrap();
        assert_eq!(c.bounds(), (2, 6));
        assert_eq!(c.midpoint(), 4.0);
    }
}
