//! Monster blacklist and whitelist filtering.
//!
//! Policy records hide monsters from every query surface. A hidden
//! monster is simply absent; nothing downstream ever sees a policy
//! error.

use util::{HashSet, Pacer};

use crate::{str_list, Record, Store};

/// One side's selectors, unioned over every record of that side.
#[derive(Debug, Default)]
struct SelectorSet {
    monsters: HashSet<String>,
    species: HashSet<String>,
    categories: HashSet<String>,
}

impl SelectorSet {
    /// Absorb one policy record. Names in the monster list that resolve
    /// to a monstergroup expand to the group's members.
    fn absorb(&mut self, r: &Record, store: &Store, records: &[Record]) {
        if let Some(v) = r.get("monsters") {
            for name in str_list(v) {
                if store.by_id_maybe("monstergroup", name).is_some() {
                    let mut visited = HashSet::default();
                    self.group_members(name, store, records, &mut visited);
                } else {
                    self.monsters.insert(name.to_string());
                }
            }
        }
        for (field, set) in [
            ("species", &mut self.species),
            ("categories", &mut self.categories),
        ] {
            if let Some(v) = r.get(field) {
                set.extend(str_list(v).into_iter().map(str::to_string));
            }
        }
    }

    fn group_members(
        &mut self,
        group: &str,
        store: &Store,
        records: &[Record],
        visited: &mut HashSet<String>,
    ) {
        if !visited.insert(group.to_string()) {
            return;
        }
        let Some(rid) = store.by_id_maybe("monstergroup", group) else {
            return;
        };
        let r = &records[rid.0 as usize];
        if let Some(default) = r.get_str("default") {
            self.monsters.insert(default.to_string());
        }
        let Some(serde_json::Value::Array(entries)) = r.get("monsters") else {
            return;
        };
        for entry in entries {
            if let Some(id) = entry.get("monster").and_then(|v| v.as_str()) {
                self.monsters.insert(id.to_string());
            }
            if let Some(sub) = entry.get("group").and_then(|v| v.as_str()) {
                self.group_members(sub, store, records, visited);
            }
        }
    }

    fn matches(&self, m: &Record) -> bool {
        m.primary_keys().iter().any(|k| self.monsters.contains(k))
            || m.get("species")
                .map(|v| str_list(v).iter().any(|s| self.species.contains(*s)))
                .unwrap_or(false)
            || m.get("categories")
                .map(|v| str_list(v).iter().any(|s| self.categories.contains(*s)))
                .unwrap_or(false)
    }
}

/// The post-load visibility decision for every monster key.
#[derive(Debug, Default)]
pub struct MonsterPolicy {
    hidden: HashSet<String>,
}

impl MonsterPolicy {
    /// Scan the stream for policy records and decide monster visibility.
    ///
    /// A monster stays visible when it is not blacklisted, or when a
    /// whitelist re-admits it; an `EXCLUSIVE` whitelist additionally
    /// hides everything it does not match.
    pub fn scan(store: &Store, records: &[Record], pacer: &mut dyn Pacer) -> Self {
        let mut black = SelectorSet::default();
        let mut white = SelectorSet::default();
        let mut exclusive = SelectorSet::default();
        let mut any_exclusive = false;

        for r in records {
            match r.type_tag() {
                "MONSTER_BLACKLIST" => black.absorb(r, store, records),
                "MONSTER_WHITELIST" => {
                    white.absorb(r, store, records);
                    if r.get_str("mode") == Some("EXCLUSIVE") {
                        any_exclusive = true;
                        exclusive.absorb(r, store, records);
                    }
                }
                _ => continue,
            }
            pacer.relinquish();
        }

        let mut hidden = HashSet::default();
        for rid in store.by_type("monster") {
            let m = &records[rid.0 as usize];
            let visible = (!black.matches(m) || white.matches(m))
                && (!any_exclusive || exclusive.matches(m));
            if !visible {
                hidden.extend(m.primary_keys());
            }
        }

        MonsterPolicy { hidden }
    }

    pub fn into_hidden(self) -> HashSet<String> {
        self.hidden
    }

    pub fn is_hidden(&self, key: &str) -> bool {
        self.hidden.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::Corpus;

    #[test]
    fn whitelist_readmits_blacklisted_species() {
        let c = Corpus::from_json(json!([
            {"type": "MONSTER", "id": "mon_m", "species": ["ZOMBIE"]},
            {"type": "MONSTER", "id": "mon_other", "species": ["ZOMBIE"]},
            {"type": "MONSTER", "id": "mon_dog", "species": ["MAMMAL"]},
            {"type": "MONSTER_BLACKLIST", "species": ["ZOMBIE"]},
            {"type": "MONSTER_WHITELIST", "monsters": ["mon_m"]}
        ]))
        .unwrap();

        assert!(c.resolve_maybe("monster", "mon_m").is_some());
        assert!(c.resolve_maybe("monster", "mon_other").is_none());
        assert!(c.resolve_maybe("monster", "mon_dog").is_some());

        let visible: Vec<_> = c.enumerate("monster");
        assert_eq!(visible.len(), 2);
    }

    #[test]
    fn exclusive_whitelist_hides_the_rest() {
        let c = Corpus::from_json(json!([
            {"type": "MONSTER", "id": "mon_a", "species": ["ROBOT"]},
            {"type": "MONSTER", "id": "mon_b", "species": ["ROBOT"]},
            {"type": "MONSTER_WHITELIST", "mode": "EXCLUSIVE", "monsters": ["mon_a"]}
        ]))
        .unwrap();

        assert!(c.resolve_maybe("monster", "mon_a").is_some());
        assert!(c.resolve_maybe("monster", "mon_b").is_none());
    }

    #[test]
    fn monstergroup_selectors_expand() {
        let c = Corpus::from_json(json!([
            {"type": "MONSTER", "id": "mon_wolf", "species": ["MAMMAL"]},
            {"type": "MONSTER", "id": "mon_bear", "species": ["MAMMAL"]},
            {"type": "monstergroup", "id": "GROUP_FOREST", "default": "mon_wolf",
             "monsters": [{"monster": "mon_bear"}]},
            {"type": "MONSTER_BLACKLIST", "monsters": ["GROUP_FOREST"]}
        ]))
        .unwrap();

        assert!(c.resolve_maybe("monster", "mon_wolf").is_none());
        assert!(c.resolve_maybe("monster", "mon_bear").is_none());
    }

    #[test]
    fn visibility_is_order_independent() {
        let records = [
            json!({"type": "MONSTER", "id": "mon_m", "species": ["ZOMBIE"]}),
            json!({"type": "MONSTER_BLACKLIST", "species": ["ZOMBIE"]}),
            json!({"type": "MONSTER_WHITELIST", "monsters": ["mon_m"]}),
        ];

        // All permutations of the policy records agree.
        for order in [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]] {
            let stream: Vec<_> = order.iter().map(|&i| records[i].clone()).collect();
            let c = Corpus::from_json(json!(stream)).unwrap();
            assert!(
                c.resolve_maybe("monster", "mon_m").is_some(),
                "hidden under order {order:?}"
            );
        }
    }
}
