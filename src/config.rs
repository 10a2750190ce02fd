//! Deploy-time configuration. Nothing here changes while the interception is live.

/// Exported operation table whose `follow_link` slot gets intercepted
pub const SYMBOL_NAME: &str = "ubifs_symlink_inode_operations";

/// Link target that resolves as missing while the interception is active.
///
/// The wrapper is a plain function pointer with no state of its own, so this is baked into its veto rule at build time.
pub const DENY_PATH: &str = "/dev/mtd2ro";

/// Settings for one interception
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookConfig {
    /// Symbol naming the operation table
    pub symbol: &'static str,
}
impl HookConfig {
    /// The settings the crate is built with
    pub const DEFAULT: Self = Self {
        symbol: SYMBOL_NAME,
    };
}
impl Default for HookConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
