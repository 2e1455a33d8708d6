//! Analytic loot, furniture and terrain distributions over map content.
//!
//! Given a loaded [`content::Corpus`], a [`Guide`] answers what can
//! appear where and how likely it is, by folding map generators,
//! palettes and item groups into probability tables instead of rolling
//! them.

mod chance;
pub use chance::{ItemChance, Loot};

mod guide;
pub use guide::{Guide, Session};

mod item_group;
pub use item_group::FlatEntry;

mod mapgen;
pub use mapgen::{LootKind, OMT_SIZE};

mod palette;

mod requirement;
pub use requirement::{ComponentReq, QualityReq, Requirement, ToolReq};

pub mod schema;
pub use schema::ParamScope;

mod special;
