//! The probability algebra every evaluator computes in.
//!
//! Nothing here ever samples; placements are folded analytically. The
//! two numbers tracked per id are the probability that at least one
//! appears and the expected count.

use derive_more::Deref;
use util::IndexMap;

/// Probability of at least one appearing, and expected count.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ItemChance {
    pub prob: f64,
    pub expected: f64,
}

impl ItemChance {
    pub const ZERO: ItemChance = ItemChance {
        prob: 0.0,
        expected: 0.0,
    };

    /// A single guaranteed appearance.
    pub const ONE: ItemChance = ItemChance {
        prob: 1.0,
        expected: 1.0,
    };

    pub fn new(prob: f64, expected: f64) -> Self {
        ItemChance {
            prob: prob.clamp(0.0, 1.0),
            expected: expected.max(0.0),
        }
    }

    /// Two placements rolled independently.
    pub fn and(self, other: ItemChance) -> ItemChance {
        ItemChance {
            prob: 1.0 - (1.0 - self.prob) * (1.0 - other.prob),
            expected: self.expected + other.expected,
        }
    }

    /// Both fields scaled. Probability saturates at one; the excess of
    /// an over-100% chance lives on in the expected count.
    pub fn scale(self, t: f64) -> ItemChance {
        let t = t.max(0.0);
        ItemChance {
            prob: (self.prob * t).min(1.0),
            expected: self.expected * t,
        }
    }

    /// Rolled once per repetition, the repetition count uniform over
    /// `[lo, hi]`. Reversed bounds normalize; `[0, 0]` is the zero.
    pub fn repeat(self, lo: i32, hi: i32) -> ItemChance {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        let (lo, hi) = (lo.max(0), hi.max(0));
        if hi == 0 {
            return ItemChance::ZERO;
        }

        let rolls = (hi - lo + 1) as f64;
        let prob = (lo..=hi)
            .map(|r| 1.0 - (1.0 - self.prob).powi(r))
            .sum::<f64>()
            / rolls;
        ItemChance {
            prob,
            expected: self.expected * (lo + hi) as f64 / 2.0,
        }
    }
}

/// A loot table: item id to its chance.
#[derive(Clone, Debug, Default, Deref, PartialEq)]
pub struct Loot(IndexMap<String, ItemChance>);

impl Loot {
    /// Fold one placement in, rolling independently against whatever is
    /// already there for the id.
    pub fn insert_and(&mut self, id: impl Into<String>, chance: ItemChance) {
        let slot = self.0.entry(id.into()).or_insert(ItemChance::ZERO);
        *slot = slot.and(chance);
    }

    /// Independent combine with a whole table; `add` in aggregation
    /// terms.
    pub fn and_assign(&mut self, other: &Loot) {
        for (id, &chance) in other.iter() {
            self.insert_and(id.clone(), chance);
        }
    }

    pub fn scale(&self, t: f64) -> Loot {
        Loot(
            self.0
                .iter()
                .map(|(id, c)| (id.clone(), c.scale(t)))
                .collect(),
        )
    }

    pub fn repeat(&self, lo: i32, hi: i32) -> Loot {
        Loot(
            self.0
                .iter()
                .map(|(id, c)| (id.clone(), c.repeat(lo, hi)))
                .collect(),
        )
    }

    /// Weighted average of alternative tables; how variant map
    /// generators of one terrain fold together.
    pub fn merge<'a>(parts: impl IntoIterator<Item = (&'a Loot, f64)>) -> Loot {
        let parts: Vec<_> = parts.into_iter().collect();
        let total: f64 = parts.iter().map(|(_, w)| w.max(0.0)).sum();
        if total <= 0.0 {
            return Loot::default();
        }

        let mut out = Loot::default();
        for (loot, w) in parts {
            let f = w.max(0.0) / total;
            for (id, c) in loot.iter() {
                let slot = out.0.entry(id.clone()).or_insert(ItemChance::ZERO);
                slot.prob = (slot.prob + c.prob * f).min(1.0);
                slot.expected += c.expected * f;
            }
        }
        out
    }

    /// Drop the null id of the evaluator kind from the final table.
    pub fn strip(&mut self, sentinel: &str) {
        self.0.shift_remove(sentinel);
    }
}

impl FromIterator<(String, ItemChance)> for Loot {
    fn from_iter<T: IntoIterator<Item = (String, ItemChance)>>(iter: T) -> Self {
        let mut out = Loot::default();
        for (id, c) in iter {
            out.insert_and(id, c);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use quickcheck::{Arbitrary, Gen};
    use quickcheck_macros::quickcheck;

    use super::*;

    #[derive(Copy, Clone, Debug)]
    struct Chance(ItemChance);

    impl Arbitrary for Chance {
        fn arbitrary(g: &mut Gen) -> Self {
            let p = u32::arbitrary(g) % 1001;
            let e = u32::arbitrary(g) % 10_000;
            Chance(ItemChance::new(p as f64 / 1000.0, e as f64 / 100.0))
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn chances_close(a: ItemChance, b: ItemChance) -> bool {
        close(a.prob, b.prob) && close(a.expected, b.expected)
    }

    #[quickcheck]
    fn and_commutes(a: Chance, b: Chance) -> bool {
        chances_close(a.0.and(b.0), b.0.and(a.0))
    }

    #[quickcheck]
    fn and_associates(a: Chance, b: Chance, c: Chance) -> bool {
        chances_close(a.0.and(b.0).and(c.0), a.0.and(b.0.and(c.0)))
    }

    #[quickcheck]
    fn scale_by_one_is_identity(a: Chance) -> bool {
        chances_close(a.0.scale(1.0), a.0)
    }

    #[quickcheck]
    fn repeat_once_is_identity(a: Chance) -> bool {
        chances_close(a.0.repeat(1, 1), a.0)
    }

    #[quickcheck]
    fn combinators_stay_in_bounds(a: Chance, b: Chance, t: u8, lo: i8, hi: i8) -> bool {
        let results = [
            a.0.and(b.0),
            a.0.scale(t as f64 / 32.0),
            a.0.repeat(lo as i32, hi as i32),
        ];
        results
            .iter()
            .all(|c| (0.0..=1.0).contains(&c.prob) && c.expected >= 0.0)
    }

    #[quickcheck]
    fn merge_with_self_is_identity(a: Chance) -> bool {
        let mut loot = Loot::default();
        loot.insert_and("stone", a.0);
        let merged = Loot::merge([(&loot, 1.0), (&loot, 1.0)]);
        chances_close(merged["stone"], loot["stone"])
    }

    #[test]
    fn repeat_boundaries() {
        let c = ItemChance::new(0.5, 0.5);
        assert_eq!(c.repeat(0, 0), ItemChance::ZERO);
        // Reversed bounds normalize.
        assert_eq!(c.repeat(5, 2), c.repeat(2, 5));

        let four = c.repeat(4, 4);
        assert!(close(four.prob, 1.0 - 0.5f64.powi(4)));
        assert!(close(four.expected, 2.0));
    }

    #[test]
    fn saturated_scale_keeps_expectation() {
        // A 250% chance caps at certainty but still means 2.5 expected.
        let c = ItemChance::ONE.scale(2.5);
        assert!(close(c.prob, 1.0));
        assert!(close(c.expected, 2.5));
    }

    #[test]
    fn insert_and_combines_duplicates() {
        let mut loot = Loot::default();
        loot.insert_and("rock", ItemChance::new(0.5, 0.5));
        loot.insert_and("rock", ItemChance::new(0.5, 0.5));
        assert!(close(loot["rock"].prob, 0.75));
        assert!(close(loot["rock"].expected, 1.0));
    }
}
