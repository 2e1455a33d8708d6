//! End-to-end fixtures driven through the query facade.

use content::Corpus;
use loot::{Guide, LootKind, Session};
use serde_json::{json, Value};
use util::{Pacer, Uninterrupted};

fn guide(records: Value) -> Guide {
    Guide::new(Corpus::from_json(records).unwrap())
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn symbol_counts_roll_per_tile() {
    let g = guide(json!([
        {"type": "mapgen", "om_terrain": "quarry", "object": {
            "rows": ["AA", "AA"],
            "item": {"A": {"item": "stone", "chance": 50}}
        }},
        {"type": "overmap_special", "id": "quarry_site", "overmaps": [
            {"point": [0, 0, 0], "overmap": "quarry_north"}
        ]}
    ]));

    let loot = g.loot_for_special("quarry_site", &mut Uninterrupted).unwrap();
    let stone = loot["stone"];
    assert!(close(stone.prob, 1.0 - 0.5f64.powi(4)));
    assert!(close(stone.expected, 2.0));
}

#[test]
fn variant_generators_average_by_weight() {
    let g = guide(json!([
        {"type": "mapgen", "om_terrain": "shed", "weight": 3000, "object": {
            "rows": ["A"],
            "item": {"A": {"item": "nail"}}
        }},
        {"type": "mapgen", "om_terrain": "shed", "object": {
            "rows": ["A"],
            "item": {"A": {"item": "screw"}}
        }},
        {"type": "overmap_special", "id": "backyard", "overmaps": [
            {"point": [0, 0, 0], "overmap": "shed_east"}
        ]}
    ]));

    let loot = g.loot_for_special("backyard", &mut Uninterrupted).unwrap();
    // Declared weight 3000 vs the default 1000.
    assert!(close(loot["nail"].prob, 0.75));
    assert!(close(loot["screw"].prob, 0.25));
}

#[test]
fn special_tiles_combine_independently() {
    let g = guide(json!([
        {"type": "mapgen", "om_terrain": "aisle", "object": {
            "rows": ["A"],
            "item": {"A": {"item": "can", "chance": 50}}
        }},
        {"type": "overmap_special", "id": "store", "overmaps": [
            {"point": [0, 0, 0], "overmap": "aisle_north"},
            {"point": [1, 0, 0], "overmap": "aisle_north"},
            {"point": [0, 0, -1], "overmap": "aisle_north"}
        ]}
    ]));

    // Two ground tiles roll independently; the basement tile is not
    // ground level and stays out.
    let loot = g.loot_for_special("store", &mut Uninterrupted).unwrap();
    assert!(close(loot["can"].prob, 0.75));
    assert!(close(loot["can"].expected, 1.0));
}

#[test]
fn place_loot_brings_ammo_and_magazine() {
    let g = guide(json!([
        {"type": "mapgen", "om_terrain": "armory", "object": {
            "place_loot": [
                {"item": "rifle", "chance": 50, "ammo": 40, "magazine": 100}
            ]
        }},
        {"type": "overmap_special", "id": "bunker", "overmaps": [
            {"point": [0, 0, 0], "overmap": "armory_north"}
        ]}
    ]));

    let loot = g.loot_for_special("bunker", &mut Uninterrupted).unwrap();
    assert!(close(loot["rifle"].prob, 0.5));
    assert!(close(loot["rifle_ammo"].prob, 0.2));
    assert!(close(loot["rifle_magazine"].prob, 0.5));
}

#[test]
fn palette_reference_and_group_spawns() {
    let g = guide(json!([
        {"type": "item_group", "id": "kitchen_stuff", "subtype": "distribution", "entries": [
            {"item": "fork", "prob": 1},
            {"item": "spoon", "prob": 1}
        ]},
        {"type": "palette", "id": "domestic", "items": {
            "K": {"item": "kitchen_stuff", "chance": 60}
        }},
        {"type": "mapgen", "om_terrain": "kitchen", "object": {
            "rows": ["K"],
            "palettes": ["domestic"]
        }},
        {"type": "overmap_special", "id": "house", "overmaps": [
            {"point": [0, 0, 0], "overmap": "kitchen_north"}
        ]}
    ]));

    let loot = g.loot_for_special("house", &mut Uninterrupted).unwrap();
    assert!(close(loot["fork"].prob, 0.3));
    assert!(close(loot["spoon"].prob, 0.3));
}

#[test]
fn conditional_chunks_split_even() {
    let g = guide(json!([
        {"type": "mapgen", "nested_mapgen_id": "crate_spawn", "object": {
            "place_loot": [{"item": "crowbar", "chance": 100}]
        }},
        {"type": "mapgen", "om_terrain": "dock", "object": {
            "place_nested": [
                {"chunks": ["crate_spawn"], "neighbors": {"north": "road"}, "x": 0, "y": 0}
            ]
        }},
        {"type": "overmap_special", "id": "harbor", "overmaps": [
            {"point": [0, 0, 0], "overmap": "dock_north"}
        ]}
    ]));

    // The empty else branch pads to a null entry of equal weight, so
    // the chunk fires half the time.
    let loot = g.loot_for_special("harbor", &mut Uninterrupted).unwrap();
    assert!(close(loot["crowbar"].prob, 0.5));
    assert!(close(loot["crowbar"].expected, 0.5));
}

#[test]
fn unconditional_chunks_prefer_chunks() {
    let g = guide(json!([
        {"type": "mapgen", "nested_mapgen_id": "a_chunk", "object": {
            "place_loot": [{"item": "apple", "chance": 100}]
        }},
        {"type": "mapgen", "nested_mapgen_id": "b_chunk", "object": {
            "place_loot": [{"item": "banana", "chance": 100}]
        }},
        {"type": "mapgen", "om_terrain": "orchard", "object": {
            "place_nested": [
                {"chunks": ["a_chunk"], "else_chunks": ["b_chunk"], "x": 0, "y": 0}
            ]
        }},
        {"type": "overmap_special", "id": "farm", "overmaps": [
            {"point": [0, 0, 0], "overmap": "orchard_north"}
        ]}
    ]));

    let loot = g.loot_for_special("farm", &mut Uninterrupted).unwrap();
    assert!(close(loot["apple"].prob, 1.0));
    assert!(loot.get("banana").is_none());
}

#[test]
fn grid_mapgen_splits_into_cells() {
    // One 24×48 generator covering a 1×2 grid of terrains.
    let mut rows = Vec::new();
    for _ in 0..24 {
        rows.push(format!("{}{}", "A".repeat(24), "B".repeat(24)));
    }

    let g = guide(json!([
        {"type": "mapgen", "om_terrain": [["mall_w", "mall_e"]], "object": {
            "rows": rows,
            "item": {
                "A": {"item": "hanger", "chance": 10},
                "B": {"item": "receipt", "chance": 10}
            },
            "place_item": [{"item": "register", "x": 30, "y": 4}]
        }}
    ]));

    let west = g.distribution_for_terrain(LootKind::Items, "mall_w");
    let east = g.distribution_for_terrain(LootKind::Items, "mall_e");

    // Each cell only sees its own 24×24 slice of symbols.
    assert!(west.get("hanger").is_some());
    assert!(west.get("receipt").is_none());
    assert!(east.get("receipt").is_some());
    assert!(east.get("hanger").is_none());
    assert!(close(east["receipt"].expected, 24.0 * 24.0 * 0.1));

    // The place entry lands in the cell holding its coordinates.
    assert!(west.get("register").is_none());
    assert!(close(east["register"].prob, 1.0));
}

#[test]
fn terrain_evaluator_fills_and_strips() {
    let g = guide(json!([
        {"type": "mapgen", "om_terrain": "cellar", "object": {
            "rows": ["#..", "#.."],
            "terrain": {"#": "t_wall", ".": "t_null"},
            "fill_ter": "t_rock_floor",
            "set": [{"square": "terrain", "id": "t_water", "x": 0, "y": 0,
                     "x2": 1, "y2": 1, "chance": 50}]
        }},
        {"type": "overmap_special", "id": "hole", "overmaps": [
            {"point": [0, 0, 0], "overmap": "cellar_north"}
        ]}
    ]));

    let terrain = g.terrain_for_special("hole", &mut Uninterrupted).unwrap();
    assert!(close(terrain["t_wall"].expected, 2.0));
    // Every cell had a terrain symbol, so nothing takes the fill.
    assert!(terrain.get("t_rock_floor").is_none());
    // The sentinel never leaves the evaluator.
    assert!(terrain.get("t_null").is_none());
    // Four square tiles at 50% each.
    assert!(close(terrain["t_water"].prob, 1.0 - 0.5f64.powi(4)));
    assert!(close(terrain["t_water"].expected, 2.0));
}

#[test]
fn furniture_alternatives_share_probability() {
    let g = guide(json!([
        {"type": "mapgen", "om_terrain": "lounge", "object": {
            "rows": ["C"],
            "furniture": {"C": [["f_chair", 3], "f_sofa"]}
        }},
        {"type": "overmap_special", "id": "club", "overmaps": [
            {"point": [0, 0, 0], "overmap": "lounge_north"}
        ]}
    ]));

    let furniture = g
        .furniture_for_special("club", &mut Uninterrupted)
        .unwrap();
    assert!(close(furniture["f_chair"].prob, 0.75));
    assert!(close(furniture["f_sofa"].prob, 0.25));
}

#[test]
fn mutable_specials_stay_opaque() {
    let g = guide(json!([
        {"type": "mapgen", "om_terrain": "vault", "object": {
            "place_loot": [{"item": "gold", "chance": 100}]
        }},
        {"type": "overmap_special", "id": "labyrinth", "subtype": "mutable",
         "overmaps": [{"point": [0, 0, 0], "overmap": "vault_north"}]}
    ]));

    let loot = g.loot_for_special("labyrinth", &mut Uninterrupted).unwrap();
    assert!(loot.is_empty());
}

#[test]
fn missing_special_is_the_only_error() {
    let g = guide(json!([]));
    assert!(g.loot_for_special("nowhere", &mut Uninterrupted).is_err());
}

#[test]
fn appearance_groups_identical_variants() {
    let g = guide(json!([
        {"type": "overmap_terrain", "id": "cabin", "sym": "C", "color": "brown",
         "name": "cabin"},
        {"type": "overmap_terrain", "id": "barn", "sym": "B", "color": "brown",
         "name": "barn"},
        {"type": "overmap_special", "id": "cabin_a", "overmaps": [
            {"point": [0, 0, 0], "overmap": "cabin_north"}
        ]},
        {"type": "overmap_special", "id": "cabin_b", "overmaps": [
            {"point": [0, 0, 0], "overmap": "cabin_south"}
        ]},
        {"type": "overmap_special", "id": "farm", "overmaps": [
            {"point": [0, 0, 0], "overmap": "barn_north"}
        ]}
    ]));

    let groups = g.group_specials_by_appearance(&mut Uninterrupted);
    let cabins = groups
        .values()
        .find(|ids| ids.contains(&"cabin_a".to_string()))
        .unwrap();
    assert_eq!(cabins, &vec!["cabin_a".to_string(), "cabin_b".to_string()]);
    assert!(groups.values().any(|ids| ids == &vec!["farm".to_string()]));
}

#[test]
fn replaced_corpus_abandons_paced_results() {
    fn fixture() -> Value {
        json!([
            {"type": "mapgen", "om_terrain": "hut", "object": {
                "place_loot": [{"item": "stick", "chance": 100}]
            }},
            {"type": "overmap_special", "id": "camp", "overmaps": [
                {"point": [0, 0, 0], "overmap": "hut_north"},
                {"point": [1, 0, 0], "overmap": "hut_north"}
            ]}
        ])
    }

    struct ReplaceOnce<'a> {
        session: &'a Session,
        done: bool,
    }

    impl Pacer for ReplaceOnce<'_> {
        fn relinquish(&mut self) {
            if !self.done {
                self.done = true;
                self.session
                    .replace(Guide::new(Corpus::from_json(fixture()).unwrap()));
            }
        }
    }

    let session = Session::new(Guide::new(Corpus::from_json(fixture()).unwrap()));

    // A swap mid-flight abandons the result.
    let mut pacer = ReplaceOnce {
        session: &session,
        done: false,
    };
    assert_eq!(session.generation(), 0);
    let abandoned = session.loot_for_special("camp", &mut pacer).unwrap();
    assert!(abandoned.is_none());
    assert_eq!(session.generation(), 1);

    // A clean run against the new version completes.
    let loot = session
        .loot_for_special("camp", &mut Uninterrupted)
        .unwrap()
        .expect("no further replacement");
    assert!(close(loot["stick"].expected, 2.0));
}
