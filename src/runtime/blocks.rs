use std::collections::BTreeMap;
use std::sync::Arc;

use crate::codegen::{BlockUnit, Unit};

/// Block definitions visible to one namespace
///
/// Each name maps to a chain of definitions, most derived first. The last
/// entry is the one the owning template declared itself.
#[derive(Debug, Clone, Default)]
pub struct BlockStorage {
    chains: BTreeMap<String, Vec<Arc<BlockUnit>>>,
}

impl BlockStorage {
    pub fn from_unit(unit: &Unit) -> Self {
        let chains = unit
            .blocks
            .iter()
            .map(|(name, block)| (name.clone(), vec![Arc::clone(block)]))
            .collect();
        Self { chains }
    }

    pub fn declares(&self, name: &str) -> bool {
        self.chains.contains_key(name)
    }

    /// The definition `depth` steps away from the most derived one
    pub fn get(&self, name: &str, depth: usize) -> Option<&Arc<BlockUnit>> {
        self.chains.get(name).and_then(|chain| chain.get(depth))
    }

    /// Put a child's overrides in front of the definitions declared here
    ///
    /// Names this storage does not declare are dropped.
    pub fn merge_overrides(&mut self, child: &BlockStorage) {
        for (name, chain) in self.chains.iter_mut() {
            if let Some(overrides) = child.chains.get(name) {
                let mut merged = overrides.clone();
                merged.append(chain);
                *chain = merged;
            }
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.chains.keys().map(String::as_str)
    }
}
