//! Resolver backed by a snapshot of `/proc/kallsyms`
//!
//! Each line has the form `<hex address> <type> <name> [<module>]`, where `<module>` is wrapped in brackets and only present for symbols defined by loadable modules.

use std::collections::HashMap;
use std::path::Path;
use std::{fs, io};

use log::{debug, warn};
use thiserror::Error;

use super::{Address, ResolveError, Resolver};

/// Default location of the kernel symbol listing
pub const KALLSYMS_PATH: &str = "/proc/kallsyms";

/// Errors when loading a kallsyms listing
#[derive(Debug, Error)]
pub enum ParseError {
    /// The listing could not be read
    #[error("reading symbol listing: {0}")]
    Io(#[from] io::Error),
    /// A line did not follow the `<address> <type> <name> [<module>]` layout
    #[error("malformed symbol listing at line {line}: {reason}")]
    Malformed {
        /// 1-based line number
        line: usize,
        /// What was wrong with it
        reason: &'static str,
    },
}

/// One entry of the listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSymbol {
    /// Address of the symbol
    pub address: Address,
    /// Symbol type letter as printed by `nm` (`T`, `d`, `R`, ...)
    pub kind: char,
    /// Defining module, `None` for the core image
    pub module: Option<String>,
}

/// Parsed symbol listing
#[derive(Debug, Default, Clone)]
pub struct Kallsyms {
    /// Symbols by name
    symbols: HashMap<String, KernelSymbol>,
}
impl Kallsyms {
    /// Reads the running kernel's listing from [`KALLSYMS_PATH`]
    pub fn load() -> Result<Self, ParseError> {
        Self::from_path(KALLSYMS_PATH)
    }
    /// Reads a listing from `path`
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let text = fs::read_to_string(path.as_ref())?;
        let symbols = Self::parse(&text)?;
        debug!(
            "loaded {} symbols from {}",
            symbols.len(),
            path.as_ref().display()
        );
        Ok(symbols)
    }
    /// Parses a listing.
    ///
    /// Zero addresses are what the kernel prints when pointers are restricted, so those symbols are skipped.
    /// When a name is listed twice the first entry wins, since the core image is listed before any module.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut symbols = HashMap::new();
        let mut restricted = 0usize;

        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (name, symbol) = match parse_line(line) {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    restricted += 1;
                    continue;
                }
                Err(reason) => {
                    return Err(ParseError::Malformed {
                        line: idx + 1,
                        reason,
                    })
                }
            };
            symbols.entry(name.to_owned()).or_insert(symbol);
        }

        if restricted > 0 {
            warn!("{} symbols listed with a zero address, pointers are likely restricted", restricted);
        }
        Ok(Self { symbols })
    }
    /// Full entry for `name`
    pub fn get(&self, name: &str) -> Option<&KernelSymbol> {
        self.symbols.get(name)
    }
    /// Module defining `name`, `None` if unknown or part of the core image
    pub fn module_of(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|s| s.module.as_deref())
    }
    /// Number of resolvable symbols
    pub fn len(&self) -> usize {
        self.symbols.len()
    }
    /// Whether no symbol is resolvable
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Splits one non-empty line. `Ok(None)` means the address was zeroed out.
fn parse_line(line: &str) -> Result<Option<(&str, KernelSymbol)>, &'static str> {
    let mut fields = line.split_whitespace();
    let addr = fields.next().ok_or("missing address")?;
    let kind = fields.next().ok_or("missing symbol type")?;
    let name = fields.next().ok_or("missing symbol name")?;
    let module = match fields.next() {
        Some(m) => Some(
            m.strip_prefix('[')
                .and_then(|m| m.strip_suffix(']'))
                .ok_or("module name not in brackets")?,
        ),
        None => None,
    };
    if fields.next().is_some() {
        return Err("trailing fields");
    }

    let addr = usize::from_str_radix(addr, 16).map_err(|_| "address is not hexadecimal")?;
    let mut chars = kind.chars();
    let kind = match (chars.next(), chars.next()) {
        (Some(c), None) => c,
        _ => return Err("symbol type is not a single character"),
    };

    Ok(Address::from_usize(addr).map(|address| {
        (
            name,
            KernelSymbol {
                address,
                kind,
                module: module.map(str::to_owned),
            },
        )
    }))
}

impl Resolver for Kallsyms {
    fn resolve(&self, name: &str) -> Result<Address, ResolveError> {
        self.get(name)
            .map(|s| s.address)
            .ok_or_else(|| ResolveError::NotFound(name.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use crate::symbol::kallsyms::{Kallsyms, ParseError};
    use crate::symbol::{ResolveError, Resolver};

    /// Excerpt of a real listing, with a module symbol and a duplicate local name
    const LISTING: &str = "\
c0008000 T stext
c0008000 T _text
c05a1b2c r ubifs_symlink_inode_operations
c05a1c00 r ubifs_file_inode_operations

c0123456 t cleanup_module
bf000000 t cleanup_module\t[hijack]
bf000010 d __this_module\t[hijack]
";

    #[test]
    /// Names in the listing resolve to their address
    fn test_parse() {
        let syms = Kallsyms::parse(LISTING).unwrap();
        assert_eq!(syms.len(), 6);

        let addr = syms.resolve("ubifs_symlink_inode_operations").unwrap();
        assert_eq!(addr.as_usize(), 0xc05a_1b2c);
        assert_eq!(syms.get("ubifs_symlink_inode_operations").unwrap().kind, 'r');

        assert_eq!(
            syms.resolve("ubifs_dir_inode_operations"),
            Err(ResolveError::NotFound("ubifs_dir_inode_operations".into()))
        );
    }

    #[test]
    /// Module suffixes are recorded and the core image wins on duplicates
    fn test_modules() {
        let syms = Kallsyms::parse(LISTING).unwrap();

        assert_eq!(syms.module_of("__this_module"), Some("hijack"));
        assert_eq!(syms.module_of("stext"), None);

        assert_eq!(syms.resolve("cleanup_module").unwrap().as_usize(), 0xc012_3456);
        assert_eq!(syms.module_of("cleanup_module"), None);
    }

    #[test]
    /// With restricted pointers every address reads as zero and nothing resolves
    fn test_restricted() {
        let syms = Kallsyms::parse(
            "00000000 T stext\n00000000 r ubifs_symlink_inode_operations\n",
        )
        .unwrap();

        assert!(syms.is_empty());
        assert!(syms.resolve("ubifs_symlink_inode_operations").is_err());
    }

    #[test]
    /// Malformed lines report their line number
    fn test_malformed() {
        let cases = [
            ("c0008000 T stext\nzzzz T _text\n", 2),
            ("c0008000\n", 1),
            ("c0008000 T\n", 1),
            ("\nc0008000 TT stext\n", 2),
            ("c0008000 T stext hijack\n", 1),
            ("c0008000 T stext [hijack] extra\n", 1),
        ];

        for (text, expected) in cases {
            match Kallsyms::parse(text) {
                Err(ParseError::Malformed { line, .. }) => assert_eq!(line, expected, "{text:?}"),
                other => panic!("expected malformed error for {text:?}, got {other:?}"),
            }
        }
    }

    #[test]
    /// Listings can be read from any file
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(LISTING.as_bytes()).unwrap();

        let syms = Kallsyms::from_path(file.path()).unwrap();
        assert!(syms.resolve("_text").is_ok());

        let path = file.path().to_owned();
        file.close().unwrap();
        assert!(matches!(Kallsyms::from_path(&path), Err(ParseError::Io(_))));
    }
}
