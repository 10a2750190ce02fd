//! In-memory symbol registry

use std::collections::HashMap;

use super::{Address, ResolveError, Resolver};

/// Registry of exported symbols, keyed by name.
///
/// Stands in for the host's live export table when the host hands over its symbols up front.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    /// Registered symbols
    symbols: HashMap<String, Address>,
}
impl SymbolTable {
    /// Creates an empty registry
    pub fn new() -> Self {
        Self::default()
    }
    /// Registers `name` at `address`, returning the address it replaced, if any
    pub fn register(&mut self, name: impl Into<String>, address: Address) -> Option<Address> {
        self.symbols.insert(name.into(), address)
    }
    /// Removes `name`, as happens when the image defining it is unloaded
    pub fn unregister(&mut self, name: &str) -> Option<Address> {
        self.symbols.remove(name)
    }
    /// Number of registered symbols
    pub fn len(&self) -> usize {
        self.symbols.len()
    }
    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl Resolver for SymbolTable {
    fn resolve(&self, name: &str) -> Result<Address, ResolveError> {
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| ResolveError::NotFound(name.to_owned()))
    }
}

impl<S: Into<String>> FromIterator<(S, Address)> for SymbolTable {
    fn from_iter<I: IntoIterator<Item = (S, Address)>>(iter: I) -> Self {
        Self {
            symbols: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::symbol::{Address, ResolveError, Resolver, SymbolTable};

    #[test]
    /// Registered names resolve to exactly the registered address, others are not found
    fn test_resolve() {
        let mut table = SymbolTable::new();
        let addr = Address::from_usize(0xc000_1000).unwrap();
        table.register("ubifs_symlink_inode_operations", addr);

        assert_eq!(table.resolve("ubifs_symlink_inode_operations"), Ok(addr));
        assert_eq!(
            table.resolve("ubifs_file_inode_operations"),
            Err(ResolveError::NotFound(
                "ubifs_file_inode_operations".into()
            ))
        );
    }

    #[test]
    /// The registry reflects the current value, not the first one seen
    fn test_reregister() {
        let first = Address::from_usize(0x1000).unwrap();
        let second = Address::from_usize(0x2000).unwrap();

        let mut table = SymbolTable::new();
        assert_eq!(table.register("sym", first), None);
        assert_eq!(table.register("sym", second), Some(first));
        assert_eq!(table.resolve("sym"), Ok(second));
        assert_eq!(table.len(), 1);

        // unloading the defining image makes the name disappear
        assert_eq!(table.unregister("sym"), Some(second));
        assert!(table.is_empty());
        assert!(table.resolve("sym").is_err());
    }

    #[test]
    /// Collecting pairs builds a registry
    fn test_collect() {
        let table: SymbolTable = [
            ("a", Address::from_usize(0x10).unwrap()),
            ("b", Address::from_usize(0x20).unwrap()),
        ]
        .into_iter()
        .collect();

        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve("b").unwrap().as_usize(), 0x20);
    }
}
