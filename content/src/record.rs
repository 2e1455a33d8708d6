//! Raw content records.
//!
//! A record is one JSON object from a content stream. Records are kept in
//! their open form, every field preserved; typed views are layered on top
//! where a consumer needs them.

use serde_json::{Map, Value};

/// Index of a record in the corpus load order.
///
/// Identity key for every derived cache. Two content-equal records from
/// different loads get different ids, so stale derived values can never
/// be confused for fresh ones.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub u32);

/// One raw content object.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    fields: Map<String, Value>,
}

/// Collapse subtype tags into their lookup family. All the item subtype
/// tags share one id namespace, and monsters are queried under their
/// lowercase family name.
pub fn canonical_type(t: &str) -> &str {
    match t {
        "AMMO" | "ARMOR" | "BATTERY" | "BIONIC_ITEM" | "BOOK" | "COMESTIBLE" | "ENGINE"
        | "GENERIC" | "GUN" | "GUNMOD" | "MAGAZINE" | "PET_ARMOR" | "TOOL" | "TOOLMOD"
        | "TOOL_ARMOR" | "WHEEL" | "ITEM" => "item",
        "MONSTER" => "monster",
        t => t,
    }
}

/// Read a name-like value, which is either a plain string or an object
/// with a `str` variant field.
pub fn name_str(v: &Value) -> Option<&str> {
    match v {
        Value::String(s) => Some(s),
        Value::Object(m) => m
            .get("str")
            .or_else(|| m.get("str_sp"))
            .and_then(Value::as_str),
        _ => None,
    }
}

/// Read a field that is either one string or a list of strings.
pub fn str_list(v: &Value) -> Vec<&str> {
    match v {
        Value::String(s) => vec![s],
        Value::Array(xs) => xs.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Record { fields }
    }
}

impl Record {
    /// Wrap a JSON value, which must be an object.
    pub fn from_value(v: Value) -> Option<Self> {
        match v {
            Value::Object(fields) => Some(Record { fields }),
            _ => None,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn type_tag(&self) -> &str {
        self.get_str("type").unwrap_or("")
    }

    pub fn canonical_type(&self) -> &str {
        canonical_type(self.type_tag())
    }

    /// Abstract records are inheritance templates, keyed separately and
    /// never enumerated as concrete content.
    pub fn is_abstract(&self) -> bool {
        self.fields.contains_key("abstract")
    }

    pub fn abstract_key(&self) -> Option<&str> {
        self.get_str("abstract")
    }

    pub fn copy_from(&self) -> Option<&str> {
        self.get_str("copy-from")
    }

    /// Alternate lookup keys; monsters use these for renamed ids.
    pub fn aliases(&self) -> Vec<&str> {
        self.get("alias").map(|v| str_list(v)).unwrap_or_default()
    }

    /// The concrete keys this record registers under. An id list
    /// registers every element; a mapgen registers every terrain id in
    /// its `om_terrain`, which may be a string, a list, or a 2D grid.
    pub fn primary_keys(&self) -> Vec<String> {
        if self.is_abstract() {
            return Vec::new();
        }

        match self.canonical_type() {
            "recipe" | "uncraft" => self
                .get_str("result")
                .map(|s| vec![s.to_string()])
                .unwrap_or_default(),
            "mapgen" => {
                let mut keys = Vec::new();
                if let Some(omt) = self.get("om_terrain") {
                    collect_terrain_ids(omt, &mut keys);
                }
                for field in ["nested_mapgen_id", "update_mapgen_id"] {
                    if let Some(id) = self.get_str(field) {
                        keys.push(id.to_string());
                    }
                }
                keys
            }
            _ => {
                if let Some(id) = self.get("id") {
                    str_list(id).into_iter().map(str::to_string).collect()
                } else if let Some(name) = self.get("name").and_then(name_str) {
                    vec![name.to_string()]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

fn collect_terrain_ids(v: &Value, out: &mut Vec<String>) {
    match v {
        Value::String(s) => out.push(s.clone()),
        Value::Array(xs) => {
            for x in xs {
                collect_terrain_ids(x, out);
            }
        }
        _ => {}
    }
}
