//! Unopinionated standalone utilities.

mod memo;
pub use memo::{Guard, GuardToken, Memo};

mod pace;
pub use pace::{IdleDeadline, InputAware, Pacer, Uninterrupted};

pub mod units;
pub use units::{Duration, Mass, Volume};

/// Map with an efficient hash function.
pub use rustc_hash::FxHashMap as HashMap;

/// Set with an efficient hash function.
pub use rustc_hash::FxHashSet as HashSet;

type DefaultHashBuilder = std::hash::BuildHasherDefault<rustc_hash::FxHasher>;

/// Insertion order preserving map with an efficient hash function.
pub type IndexMap<K, V> = indexmap::IndexMap<K, V, DefaultHashBuilder>;

/// Insertion order preserving set with an efficient hash function.
pub type IndexSet<V> = indexmap::IndexSet<V, DefaultHashBuilder>;
