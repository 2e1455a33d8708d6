//! Which mods touched which key.
//!
//! Kept entirely outside the records as a sidecar filled during stream
//! concatenation; records never carry load metadata.

use util::HashMap;

use crate::ModId;

#[derive(Debug, Default)]
pub struct Provenance {
    touched: HashMap<(String, String), Vec<ModId>>,
}

impl Provenance {
    /// Note that `mod_id` supplied an entry under (type, key).
    pub fn note(&mut self, ct: &str, key: &str, mod_id: &ModId) {
        let entry = self
            .touched
            .entry((ct.to_string(), key.to_string()))
            .or_default();
        if !entry.contains(mod_id) {
            entry.push(mod_id.clone());
        }
    }

    /// Mods that supplied an entry directly under this key, in load
    /// order.
    pub fn direct(&self, ct: &str, key: &str) -> &[ModId] {
        self.touched
            .get(&(ct.to_string(), key.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
