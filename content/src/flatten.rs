//! `copy-from` inheritance resolution.
//!
//! Flattening folds a record's whole inheritance chain into one
//! self-contained record. Malformed shapes never fail the resolve; the
//! offending field is left as it was.

use std::sync::Arc;

use serde_json::{Map, Value};
use util::{units, Guard, Memo};

use crate::{Record, RecordId, Store};

/// The inheritance verbs, consumed during flattening.
const VERBS: [&str; 5] = ["copy-from", "relative", "proportional", "extend", "delete"];

#[derive(Debug, Default)]
pub struct Flattener {
    cache: Memo<RecordId, Arc<Record>>,
    guard: Guard<RecordId>,
}

impl Flattener {
    /// Fully inherited form of the record. Cached by record identity.
    pub fn flatten(&self, store: &Store, records: &[Record], rid: RecordId) -> Arc<Record> {
        if let Some(flat) = self.cache.get(&rid) {
            return flat;
        }

        let r = &records[rid.0 as usize];
        if r.copy_from().is_none() {
            return self.cache.insert(rid, Arc::new(r.clone()));
        }

        // On a copy-from loop, hand the record back unresolved rather
        // than failing the query.
        let Some(_token) = self.guard.enter(rid) else {
            return Arc::new(r.clone());
        };

        let flat = match self.parent_of(store, records, rid) {
            Some(parent) => {
                let parent_flat = self.flatten(store, records, parent);
                Arc::new(overlay(&parent_flat, r))
            }
            None => {
                log::warn!(
                    "{} {:?}: copy-from {:?} not found",
                    r.canonical_type(),
                    r.primary_keys().first(),
                    r.copy_from()
                );
                Arc::new(r.clone())
            }
        };
        self.cache.insert(rid, flat)
    }

    /// The record the `copy-from` refers to. When a record copies from
    /// its own key, the parent is the previous entry registered under
    /// that key, which is how overlays extend an id they also define.
    fn parent_of(&self, store: &Store, records: &[Record], rid: RecordId) -> Option<RecordId> {
        let r = &records[rid.0 as usize];
        let cf = r.copy_from()?;
        let ct = r.canonical_type();

        let self_keyed =
            r.primary_keys().iter().any(|k| k == cf) || r.abstract_key() == Some(cf);
        if self_keyed {
            let history = if r.is_abstract() {
                store.abstract_history(ct, cf)
            } else {
                store.history(ct, cf)
            };
            if let Some(pos) = history.iter().position(|&h| h == rid) {
                if pos > 0 {
                    return Some(history[pos - 1]);
                }
            }
            // First entry under its own key; an abstract template of the
            // same name is the only possible parent left.
            return store
                .abstract_history(ct, cf)
                .iter()
                .rev()
                .find(|&&h| h != rid)
                .copied();
        }

        store.latest_for_inheritance(ct, cf)
    }
}

/// Apply a child record on top of its flattened parent.
fn overlay(parent: &Record, child: &Record) -> Record {
    let mut base = parent.fields().clone();

    // Neither the parent's identity nor any verbs left in a
    // cycle-degraded parent survive into the child.
    base.remove("abstract");
    base.remove("id");
    for verb in VERBS {
        base.remove(verb);
    }

    for (k, v) in child.fields() {
        if !VERBS.contains(&k.as_str()) {
            base.insert(k.clone(), v.clone());
        }
    }

    if let Some(Value::Object(rel)) = child.get("relative") {
        apply_relative(&mut base, rel);
    }
    if let Some(Value::Object(prop)) = child.get("proportional") {
        apply_proportional(&mut base, prop);
    }
    if let Some(Value::Object(ext)) = child.get("extend") {
        apply_extend(&mut base, ext);
    }
    if let Some(Value::Object(del)) = child.get("delete") {
        apply_delete(&mut base, del);
    }

    Record::from(base)
}

fn json_number(n: f64) -> Value {
    if n == n.trunc() && n.abs() < 1e15 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

fn apply_relative(base: &mut Map<String, Value>, rel: &Map<String, Value>) {
    for (k, rv) in rel {
        let Some(bv) = base.get(k) else { continue };

        if let (Some(b), Some(r)) = (units::scalar(bv), units::scalar(rv)) {
            base.insert(k.clone(), json_number(b + r));
        } else if let Some(merged) = merge_damage_lists(bv, rv) {
            base.insert(k.clone(), merged);
        } else if let Some(merged) = merge_quality_lists(bv, rv) {
            base.insert(k.clone(), merged);
        } else {
            log::debug!("relative: leaving field {k} unchanged");
        }
    }
}

fn apply_proportional(base: &mut Map<String, Value>, prop: &Map<String, Value>) {
    for (k, pv) in prop {
        let Some(factor) = pv.as_f64() else {
            log::debug!("proportional: non-numeric factor for {k}");
            continue;
        };
        match base.get(k) {
            Some(Value::Number(n)) => {
                let n = n.as_f64().unwrap_or_default();
                base.insert(k.clone(), json_number(n * factor));
            }
            Some(Value::String(s)) => {
                if let Some(scaled) = units::scale_dimensioned(s, factor) {
                    base.insert(k.clone(), Value::String(scaled));
                }
            }
            _ => log::debug!("proportional: leaving field {k} unchanged"),
        }
    }
}

fn apply_extend(base: &mut Map<String, Value>, ext: &Map<String, Value>) {
    for (k, ev) in ext {
        match base.get_mut(k) {
            Some(Value::Array(xs)) => match ev {
                Value::Array(es) => xs.extend(es.iter().cloned()),
                v => xs.push(v.clone()),
            },
            None => {
                let v = match ev {
                    Value::Array(_) => ev.clone(),
                    v => Value::Array(vec![v.clone()]),
                };
                base.insert(k.clone(), v);
            }
            Some(_) => log::debug!("extend: field {k} is not an array"),
        }
    }
}

fn apply_delete(base: &mut Map<String, Value>, del: &Map<String, Value>) {
    for (k, dv) in del {
        let delete_elements =
            matches!((base.get(k), dv), (Some(Value::Array(_)), Value::Array(_)));
        if delete_elements {
            let (Some(Value::Array(xs)), Value::Array(ds)) = (base.get_mut(k), dv) else {
                unreachable!()
            };
            xs.retain(|x| !ds.contains(x));
        } else {
            base.remove(k);
        }
    }
}

/// Damage instance lists merge by damage type, amounts adding up.
fn merge_damage_lists(bv: &Value, rv: &Value) -> Option<Value> {
    let mut out = damage_instances(bv)?;
    for ri in damage_instances(rv)? {
        let rt = ri.get("damage_type");
        match out.iter_mut().find(|bi| bi.get("damage_type") == rt) {
            Some(bi) => {
                for field in ["amount", "armor_penetration"] {
                    let sum = bi.get(field).and_then(Value::as_f64).unwrap_or(0.0)
                        + ri.get(field).and_then(Value::as_f64).unwrap_or(0.0);
                    if bi.contains_key(field) || ri.contains_key(field) {
                        bi.insert(field.to_string(), json_number(sum));
                    }
                }
            }
            None => out.push(ri),
        }
    }
    Some(Value::Array(out.into_iter().map(Value::Object).collect()))
}

fn damage_instances(v: &Value) -> Option<Vec<Map<String, Value>>> {
    let list = match v {
        Value::Array(xs) => xs.clone(),
        Value::Object(_) => vec![v.clone()],
        _ => return None,
    };
    list.into_iter()
        .map(|x| match x {
            Value::Object(m) if m.contains_key("damage_type") => Some(m),
            _ => None,
        })
        .collect()
}

/// `[quality, level]` tuple lists merge by quality id, levels adding up.
fn merge_quality_lists(bv: &Value, rv: &Value) -> Option<Value> {
    let mut out = quality_tuples(bv)?;
    for (id, level) in quality_tuples(rv)? {
        match out.iter_mut().find(|(b, _)| *b == id) {
            Some((_, b_level)) => *b_level += level,
            None => out.push((id, level)),
        }
    }
    Some(Value::Array(
        out.into_iter()
            .map(|(id, level)| Value::Array(vec![Value::String(id), json_number(level)]))
            .collect(),
    ))
}

fn quality_tuples(v: &Value) -> Option<Vec<(String, f64)>> {
    let Value::Array(xs) = v else { return None };
    xs.iter()
        .map(|x| match x {
            Value::Array(pair) if pair.len() >= 2 => Some((
                pair[0].as_str()?.to_string(),
                pair[1].as_f64()?,
            )),
            _ => None,
        })
        .collect()
}
