//! Wrapper for the `follow_link` slot
//!
//! The host calls whatever the slot holds as a plain function pointer, so the wrapper cannot carry state of its own.
//! It reads the original function from [`SITE`], the one interception site of the process.

use std::ffi::{c_void, CStr};
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use log::error;

use crate::config::DENY_PATH;
use crate::host::{err_ptr, is_err, link_target, Dentry, FollowLinkFn, NameiData, ENOENT};

use super::VetoRule;

/// State shared between the controller and [`hooked_follow_link`]
#[derive(Debug)]
pub struct InterceptSite {
    /// Original `follow_link`, published before the slot points at the wrapper
    original: AtomicPtr<()>,
    /// Held by the controller that owns the site
    claimed: AtomicBool,
    /// Outcome to veto
    rule: VetoRule,
}
impl InterceptSite {
    /// Creates an unclaimed site
    pub const fn new(rule: VetoRule) -> Self {
        Self {
            original: AtomicPtr::new(std::ptr::null_mut()),
            claimed: AtomicBool::new(false),
            rule,
        }
    }
    /// Takes ownership of the site, `false` if someone else holds it
    pub(crate) fn claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
    /// Gives the site back.
    ///
    /// The published original stays in place: a call that loaded the wrapper from the slot just before it was restored may still be on its way in.
    pub(crate) fn release(&self) {
        self.claimed.store(false, Ordering::Release);
    }
    /// Whether a controller holds the site
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
    /// Makes `original` the function the wrapper forwards to
    pub(crate) fn publish(&self, original: FollowLinkFn) {
        self.original.store(original as *mut (), Ordering::Release);
    }
    /// Function the wrapper forwards to, `None` before the first activation
    pub fn original(&self) -> Option<FollowLinkFn> {
        let raw = self.original.load(Ordering::Acquire);
        // Safety: only `publish` stores here, always a `FollowLinkFn` or the initial null
        unsafe { std::mem::transmute::<*mut (), Option<FollowLinkFn>>(raw) }
    }
    /// Rule applied to every forwarded call
    pub fn rule(&self) -> &VetoRule {
        &self.rule
    }
}

/// The interception site of this process
pub static SITE: InterceptSite = InterceptSite::new(VetoRule::new(DENY_PATH));

/// Forwards one `follow_link` call to `original` and applies `rule` to the resolved link target.
///
/// A failing original is passed through verbatim: no link target was recorded, so there is nothing to judge.
///
/// # Safety
///
/// `dentry` and `nd` must be valid for `original`, and any target recorded in `nd` must be a NUL-terminated string
pub unsafe fn forward(
    original: FollowLinkFn,
    rule: &VetoRule,
    dentry: *mut Dentry,
    nd: *mut NameiData,
) -> *mut c_void {
    super::forward(
        rule,
        || original(dentry, nd),
        |&cookie| {
            if is_err(cookie) {
                None
            } else {
                link_target(nd).map(CStr::to_bytes)
            }
        },
        || err_ptr(-ENOENT),
    )
}

/// Function installed in the `follow_link` slot
///
/// # Safety
///
/// Called by the host with the arguments it would pass to the original `follow_link`
pub unsafe extern "C" fn hooked_follow_link(dentry: *mut Dentry, nd: *mut NameiData) -> *mut c_void {
    match SITE.original() {
        Some(original) => forward(original, SITE.rule(), dentry, nd),
        None => {
            // unreachable while the slot is managed by a controller
            error!("follow_link wrapper called with no original to forward to");
            err_ptr(-ENOENT)
        }
    }
}
