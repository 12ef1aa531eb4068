//! Routing-table ids for interfaces, allocated once per compilation pass.

use std::fmt::{self, Display, Formatter};
use std::num::NonZeroU32;

use indexmap::IndexMap;
use serde::Serialize;

/// First id handed out when the settings do not override it.
pub const DEFAULT_TABLE_BASE: u32 = 100;

/// A custom routing-table id. Never zero, so "no table yet" is always `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TableId(NonZeroU32);

impl TableId {
    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl Display for TableId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out increasing table ids to interface names on first use.
///
/// Ids depend only on the order of [`TableAllocator::ensure`] calls, so two
/// passes over the same ordered input produce the same mapping.
#[derive(Debug, Clone)]
pub struct TableAllocator {
    assigned: IndexMap<String, TableId>,
    next: NonZeroU32,
}

impl TableAllocator {
    /// Allocator starting at `base`; a zero base falls back to [`DEFAULT_TABLE_BASE`].
    pub fn new(base: u32) -> Self {
        let next = NonZeroU32::new(base)
            .or_else(|| NonZeroU32::new(DEFAULT_TABLE_BASE))
            .unwrap_or(NonZeroU32::MIN);
        Self {
            assigned: IndexMap::new(),
            next,
        }
    }

    /// Table id of `interface`, allocating the next id if it has none yet.
    pub fn ensure(&mut self, interface: &str) -> TableId {
        if let Some(id) = self.assigned.get(interface) {
            return *id;
        }
        let id = TableId(self.next);
        self.next = self.next.saturating_add(1);
        self.assigned.insert(interface.to_string(), id);
        id
    }

    /// Table id of `interface` if one was allocated this pass.
    pub fn get(&self, interface: &str) -> Option<TableId> {
        self.assigned.get(interface).copied()
    }

    /// Allocations in the order they were made.
    pub fn allocations(&self) -> impl Iterator<Item = (&str, TableId)> {
        self.assigned.iter().map(|(name, id)| (name.as_str(), *id))
    }
}

impl Default for TableAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE_BASE)
    }
}

#[cfg(test)]
mod tests {
    use super::TableAllocator;

    #[test]
    fn first_use_allocates_and_repeats_are_stable() {
        let mut tables = TableAllocator::default();
        let wan = tables.ensure("eth0");
        let lan = tables.ensure("eth0.10");
        assert_eq!(wan.get(), 100);
        assert_eq!(lan.get(), 101);
        assert_eq!(tables.ensure("eth0"), wan);
        assert_eq!(tables.get("eth0.10"), Some(lan));
        assert_eq!(tables.get("eth0.20"), None);
    }

    #[test]
    fn zero_base_never_yields_table_zero() {
        let mut tables = TableAllocator::new(0);
        assert_eq!(tables.ensure("eth0").get(), 100);
    }

    #[test]
    fn same_order_gives_same_mapping() {
        let names = ["eth0", "eth0.10", "eth0", "eth1.30", "eth0.10"];
        let run = || {
            let mut tables = TableAllocator::new(200);
            for name in names {
                tables.ensure(name);
            }
            tables
                .allocations()
                .map(|(n, id)| (n.to_string(), id.get()))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
        assert_eq!(
            run(),
            vec![
                ("eth0".to_string(), 200),
                ("eth0.10".to_string(), 201),
                ("eth1.30".to_string(), 202)
            ]
        );
    }
}
