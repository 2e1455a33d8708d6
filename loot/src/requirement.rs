//! Crafting requirement expansion.
//!
//! Requirements are three parallel lists of any-of alternatives. The
//! `using` indirection and `LIST` entries splice other requirement
//! records in, with a count acting as a multiplier.

use content::RecordId;
use serde_json::Value;

use crate::Guide;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Requirement {
    pub tools: Vec<Vec<ToolReq>>,
    pub components: Vec<Vec<ComponentReq>>,
    pub qualities: Vec<Vec<QualityReq>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolReq {
    pub id: String,
    pub count: i32,
    /// Items accepted in this tool's place at the same count.
    pub substitutes: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ComponentReq {
    pub id: String,
    pub count: i32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QualityReq {
    pub id: String,
    pub level: i32,
}

struct RawEntry {
    id: String,
    count: f64,
    is_list: bool,
    no_recover: bool,
}

fn parse_rows(v: Option<&Value>) -> Vec<Vec<RawEntry>> {
    let Some(Value::Array(rows)) = v else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| {
            let Value::Array(alts) = row else {
                return Vec::new();
            };
            alts.iter().filter_map(parse_entry).collect()
        })
        .collect()
}

fn parse_entry(v: &Value) -> Option<RawEntry> {
    let Value::Array(parts) = v else { return None };
    let id = parts.first()?.as_str()?.to_string();
    let count = parts.get(1).and_then(Value::as_f64).unwrap_or(1.0);
    let flags: Vec<&str> = parts[2..].iter().filter_map(Value::as_str).collect();
    Some(RawEntry {
        id,
        count,
        is_list: flags.contains(&"LIST"),
        no_recover: flags.contains(&"NO_RECOVER"),
    })
}

fn parse_quality_rows(v: Option<&Value>) -> Vec<Vec<QualityReq>> {
    let Some(Value::Array(rows)) = v else {
        return Vec::new();
    };
    rows.iter()
        .map(|row| match row {
            Value::Array(alts) => alts.iter().filter_map(parse_quality).collect(),
            q => parse_quality(q).into_iter().collect(),
        })
        .filter(|row: &Vec<QualityReq>| !row.is_empty())
        .collect()
}

fn parse_quality(v: &Value) -> Option<QualityReq> {
    let m = v.as_object()?;
    Some(QualityReq {
        id: m.get("id")?.as_str()?.to_string(),
        level: m.get("level").and_then(Value::as_i64).unwrap_or(1) as i32,
    })
}

/// Expand a requirement record, applying a multiplier to every count.
pub(crate) fn expand(
    guide: &Guide,
    rid: RecordId,
    multiplier: f64,
    only_recoverable: bool,
) -> Requirement {
    // An indirection loop contributes nothing the second time around.
    let Some(_token) = guide.requirement_guard.enter(rid) else {
        return Requirement::default();
    };

    let flat = guide.corpus().flatten(rid);
    let mut req = Requirement::default();

    for row in parse_rows(flat.get("components")) {
        let mut alts = Vec::new();
        for e in row {
            let count = scaled(e.count, multiplier);
            if e.is_list {
                let nested = expand_by_id(guide, &e.id, e.count * multiplier, only_recoverable);
                for nested_row in nested.components {
                    alts.extend(nested_row);
                }
                continue;
            }
            if e.no_recover && only_recoverable {
                continue;
            }
            if only_recoverable && is_unrecoverable(guide, &e.id) {
                continue;
            }
            alts.push(ComponentReq { id: e.id, count });
        }
        if !alts.is_empty() {
            req.components.push(alts);
        }
    }

    for row in parse_rows(flat.get("tools")) {
        let mut alts = Vec::new();
        for e in row {
            let count = scaled(e.count, multiplier);
            if e.is_list {
                let nested = expand_by_id(guide, &e.id, e.count * multiplier, only_recoverable);
                for nested_row in nested.tools {
                    alts.extend(nested_row);
                }
                continue;
            }
            let substitutes = guide.tool_substitutes(&e.id);
            alts.push(ToolReq {
                id: e.id,
                count,
                substitutes,
            });
        }
        if !alts.is_empty() {
            req.tools.push(alts);
        }
    }

    req.qualities = parse_quality_rows(flat.get("qualities"));

    // `using` splices whole requirement blocks in, scaled.
    if let Some(Value::Array(usings)) = flat.get("using") {
        for u in usings {
            let Some(e) = parse_entry(u) else { continue };
            let nested = expand_by_id(guide, &e.id, e.count * multiplier, only_recoverable);
            req.components.extend(nested.components);
            req.tools.extend(nested.tools);
            req.qualities.extend(nested.qualities);
        }
    }

    req
}

fn expand_by_id(guide: &Guide, id: &str, multiplier: f64, only_recoverable: bool) -> Requirement {
    match guide.corpus().store().by_id_maybe("requirement", id) {
        Some(rid) => expand(guide, rid, multiplier, only_recoverable),
        None => {
            log::debug!("no such requirement: {id}");
            Requirement::default()
        }
    }
}

fn scaled(count: f64, multiplier: f64) -> i32 {
    // Negative tool counts mean chargeless use and don't scale.
    if count < 0.0 {
        return count as i32;
    }
    (count * multiplier).round().max(1.0) as i32
}

fn is_unrecoverable(guide: &Guide, id: &str) -> bool {
    guide
        .corpus()
        .resolve_maybe("item", id)
        .and_then(|r| {
            r.get("flags")
                .map(|f| content::str_list(f).contains(&"UNRECOVERABLE"))
        })
        .unwrap_or(false)
}
