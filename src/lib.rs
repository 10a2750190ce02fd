#![warn(clippy::missing_docs_in_private_items)]
#![warn(rustdoc::missing_crate_level_docs)]
#![doc = include_str!("../README.md")]

pub mod config;
pub mod controller;
pub mod error;
pub mod hook;
pub mod host;
pub mod module;
pub mod patcher;
pub mod platform;
pub mod symbol;
pub mod wrapper;

pub use controller::InterceptionController;
pub use error::HookError;
