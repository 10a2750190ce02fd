//! # Wrapper
//!
//! This takes an intercepted call, forwards it to the original function, and decides whether the caller sees the original outcome or a veto.
//!
//! The original always runs first, so everything it does besides returning (caching, link depth accounting, logging) still happens.
//! Only the final answer changes, and only for the one input the [`VetoRule`] names.

pub mod follow_link;

use log::debug;

/// Exact match against one configured path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VetoRule {
    /// Path that gets vetoed
    path: &'static str,
}
impl VetoRule {
    /// Creates a rule vetoing exactly `path`
    pub const fn new(path: &'static str) -> Self {
        Self { path }
    }
    /// Path this rule vetoes
    pub fn path(&self) -> &'static str {
        self.path
    }
    /// Byte-for-byte equality. Prefixes, suffixes and case variants do not match.
    pub fn matches(&self, candidate: &[u8]) -> bool {
        candidate == self.path.as_bytes()
    }
}

/// Forwards one call.
///
/// - `call` runs the original function with the caller's arguments
/// - `target` extracts the path to judge from the call's context once the original returned, given its result
/// - `deny` builds the outcome returned instead of the original one on a match
///
/// Returns the original outcome unchanged unless `target` yields a path the rule matches.
pub fn forward<'a, T>(
    rule: &VetoRule,
    call: impl FnOnce() -> T,
    target: impl FnOnce(&T) -> Option<&'a [u8]>,
    deny: impl FnOnce() -> T,
) -> T {
    let outcome = call();
    match target(&outcome) {
        Some(path) if rule.matches(path) => {
            debug!("vetoed {}", rule.path());
            deny()
        }
        _ => outcome,
    }
}
