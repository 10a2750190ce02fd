//! # Controller
//!
//! Owns the single interception: installs [`hooked_follow_link`] into the `follow_link` slot of the configured operation table,
//! remembers what it replaced, and puts it back on teardown.
//!
//! State transitions happen under a mutex, and the wrapper's [`SITE`] is claimed for as long as the interception is active,
//! so two controllers cannot both hold the slot even if the host failed to serialize load and unload.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{error, info, warn};

use crate::config::HookConfig;
use crate::error::HookError;
use crate::hook::slot::SlotHook;
use crate::hook::{Hook, HookGuard};
use crate::host::{load_follow_link, FollowLinkFn, InodeOperations};
use crate::patcher::mem::PermissionWrapper;
use crate::patcher::slot::{check_slot, SlotPatcher};
use crate::patcher::Slot;
use crate::symbol::{Address, Resolver};
use crate::wrapper::follow_link::{hooked_follow_link, SITE};

/// Hook used unless told otherwise: atomic slot writes, with the table's page made writable around them
pub type DefaultHook = SlotHook<PermissionWrapper<SlotPatcher>>;

/// Address of the wrapper as stored in the slot
fn wrapper_address() -> *mut () {
    hooked_follow_link as FollowLinkFn as *mut ()
}

/// An installed interception
struct Active<G> {
    /// Guard restoring the slot
    guard: G,
    /// Table the slot lives in
    table: Address,
}

/// Controller for the `follow_link` interception
pub struct InterceptionController<R: Resolver, H: Hook = DefaultHook> {
    /// Host symbol lookup
    resolver: R,
    /// How the slot gets written
    hook: H,
    /// What to intercept
    config: HookConfig,
    /// `Some` while active
    state: Mutex<Option<Active<H::Guard>>>,
}

impl<R: Resolver> InterceptionController<R> {
    /// Creates an inactive controller with the built-in configuration
    pub fn new(resolver: R) -> Self {
        Self::with_hook(resolver, DefaultHook::default(), HookConfig::DEFAULT)
    }
}

impl<R: Resolver, H: Hook> InterceptionController<R, H> {
    /// Creates an inactive controller writing the slot through `hook`
    pub fn with_hook(resolver: R, hook: H, config: HookConfig) -> Self {
        Self {
            resolver,
            hook,
            config,
            state: Mutex::new(None),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &HookConfig {
        &self.config
    }

    /// Installs the wrapper.
    ///
    /// Fails with [`HookError::AlreadyActive`] if this or any other controller holds the interception, [`HookError::NotFound`]
    /// if the table's symbol is not exported, and [`HookError::NoOriginal`] if the slot is empty. State is unchanged on failure.
    pub fn activate(&self) -> Result<(), HookError> {
        let mut state = self.lock();
        if state.is_some() {
            return Err(HookError::AlreadyActive);
        }
        if !SITE.claim() {
            warn!("follow_link interception held by another controller");
            return Err(HookError::AlreadyActive);
        }

        match self.install() {
            Ok(active) => {
                *state = Some(active);
                Ok(())
            }
            Err(e) => {
                SITE.release();
                Err(e)
            }
        }
    }

    /// Resolves the table and swaps the slot, with the site already claimed
    fn install(&self) -> Result<Active<H::Guard>, HookError> {
        let symbol = self.config.symbol;
        let table = self.resolver.resolve(symbol).map_err(|e| {
            error!("can not find {}", symbol);
            e
        })?;
        info!("{} found at {}", symbol, table);

        let ops = table.as_ptr::<InodeOperations>();
        // Safety: the resolved address is the live table; this only offsets into it
        let slot = unsafe { InodeOperations::follow_link_slot(ops) };
        check_slot(slot).map_err(|e| HookError::Slot(e.to_string()))?;

        // Safety: the slot is aligned and inside the live table
        let current = unsafe { load_follow_link(ops) };
        let original = current.ok_or(HookError::NoOriginal(symbol))?;
        info!("follow_link = {:p}", original as *const ());
        if original as *mut () == wrapper_address() {
            // an earlier restore failed and left the wrapper in place
            error!("follow_link of {} is already the wrapper", symbol);
            return Err(HookError::AlreadyActive);
        }

        // the wrapper must see the original before the slot can route any call to it
        SITE.publish(original);

        // Safety: `hooked_follow_link` has the slot's signature and lives as long as the program
        let mut guard = unsafe { self.hook.hook(slot, wrapper_address()) }
            .map_err(|e| HookError::Slot(e.to_string()))?;
        if guard.original() != original as *mut () {
            // the wrapper would forward to a function that was never in the slot when it got swapped
            error!(
                "follow_link changed from {:p} to {:p} while hooking",
                original as *const (),
                guard.original()
            );
            guard.unhook().map_err(|e| HookError::Slot(e.to_string()))?;
            return Err(HookError::Slot("follow_link changed while hooking".into()));
        }
        info!("follow_link of {} now {:p}", symbol, wrapper_address());

        Ok(Active { guard, table })
    }

    /// Restores the slot to the exact value it held before [`Self::activate`].
    ///
    /// The slot remembered at activation is written; the table is not resolved again.
    pub fn deactivate(&self) -> Result<(), HookError> {
        let mut state = self.lock();
        let active = state.as_mut().ok_or(HookError::NotActive)?;
        let slot = active.guard.slot();
        let original = active.guard.original();

        match active.guard.unhook() {
            Ok(()) => {
                let table = active.table;
                *state = None;
                SITE.release();
                info!("follow_link of {} restored to {:p} at {:p}", table, original, slot);
                Ok(())
            }
            Err(e) => {
                // the slot still routes to the wrapper, so the interception stays active and can be retried
                error!("restoring follow_link at {:p}: {}", slot, e);
                Err(HookError::Slot(e.to_string()))
            }
        }
    }

    /// Whether the wrapper is installed
    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    /// Pointer the slot held before activation, while active
    pub fn original(&self) -> Option<*mut ()> {
        self.lock().as_ref().map(|a| a.guard.original())
    }

    /// Slot being intercepted, while active
    pub fn slot(&self) -> Option<Slot> {
        self.lock().as_ref().map(|a| a.guard.slot())
    }

    /// Locks the state. A panic while holding the lock cannot leave it half-updated, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Option<Active<H::Guard>>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<R: Resolver, H: Hook> Drop for InterceptionController<R, H> {
    fn drop(&mut self) {
        if self.is_active() {
            warn!("controller dropped while active, restoring follow_link");
            if let Err(e) = self.deactivate() {
                error!("restoring follow_link on drop: {}", e);
            }
        }
    }
}
