//! # Host
//!
//! Narrow model of the host filesystem interfaces the interception touches: the inode operation table,
//! the path-walk state passed to `follow_link`, and error pointers.
//!
//! Only the members this crate or its callers read are modelled. Layouts are `#[repr(C)]` so that a table
//! handed over by the host can be addressed field by field.

use std::ffi::{c_char, c_int, c_void, CStr};
use std::ptr;

use crate::patcher::slot::read_slot;
use crate::patcher::Slot;

/// No such file or directory
pub const ENOENT: c_int = 2;
/// Permission denied
pub const EACCES: c_int = 13;
/// Bad address
pub const EFAULT: c_int = 14;
/// Device or resource busy
pub const EBUSY: c_int = 16;
/// No such device
pub const ENODEV: c_int = 19;
/// Invalid argument
pub const EINVAL: c_int = 22;

/// Largest errno an error pointer can carry
pub const MAX_ERRNO: usize = 4095;

/// Maximum depth of nested symbolic links during one walk
pub const MAX_NESTED_LINKS: usize = 8;

/// Encodes a negative errno as a pointer, the way pointer-returning host functions report failure
pub fn err_ptr(errno: c_int) -> *mut c_void {
    errno as isize as *mut c_void
}

/// Whether `ptr` encodes an errno rather than pointing at something
pub fn is_err(ptr: *const c_void) -> bool {
    ptr as usize >= (MAX_ERRNO as isize).wrapping_neg() as usize
}

/// Errno carried by an error pointer
pub fn ptr_err(ptr: *const c_void) -> c_int {
    ptr as isize as c_int
}

/// Directory entry being walked
#[repr(C)]
#[derive(Debug)]
pub struct Dentry {
    /// Filesystem-private data
    pub d_fsdata: *mut c_void,
}

/// Path-walk state
#[repr(C)]
#[derive(Debug)]
pub struct NameiData {
    /// Current link nesting depth
    pub depth: u32,
    /// Link target recorded at each nesting level
    pub saved_names: [*const c_char; MAX_NESTED_LINKS + 1],
}
impl NameiData {
    /// Fresh walk state with no link recorded
    pub fn new() -> Self {
        Self {
            depth: 0,
            saved_names: [ptr::null(); MAX_NESTED_LINKS + 1],
        }
    }
}
impl Default for NameiData {
    fn default() -> Self {
        Self::new()
    }
}

/// Records `link` as the target of the link being followed at the current depth
///
/// # Safety
///
/// `nd` must be valid for writes
pub unsafe fn nd_set_link(nd: *mut NameiData, link: *const c_char) {
    let depth = (*nd).depth as usize;
    if let Some(name) = (*nd).saved_names.get_mut(depth) {
        *name = link;
    }
}

/// Target recorded at the current depth, null if none
///
/// # Safety
///
/// `nd` must be valid for reads
pub unsafe fn nd_get_link(nd: *const NameiData) -> *const c_char {
    let depth = (*nd).depth as usize;
    (*nd).saved_names.get(depth).copied().unwrap_or(ptr::null())
}

/// Resolved link target of the current walk step as a C string
///
/// # Safety
///
/// `nd` must be valid for reads, and the recorded target, if any, must be a NUL-terminated string that outlives `'a`
pub unsafe fn link_target<'a>(nd: *const NameiData) -> Option<&'a CStr> {
    if nd.is_null() {
        return None;
    }
    let link = nd_get_link(nd);
    if link.is_null() || is_err(link as _) {
        None
    } else {
        Some(CStr::from_ptr(link))
    }
}

/// `readlink` slot signature
pub type ReadlinkFn = unsafe extern "C" fn(*mut Dentry, *mut c_char, c_int) -> c_int;
/// `follow_link` slot signature: records the link target in the walk state and returns a cookie or an error pointer
pub type FollowLinkFn = unsafe extern "C" fn(*mut Dentry, *mut NameiData) -> *mut c_void;
/// `put_link` slot signature
pub type PutLinkFn = unsafe extern "C" fn(*mut Dentry, *mut NameiData, *mut c_void);

/// Inode operation table for symbolic links
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct InodeOperations {
    /// Copies the link target into a user buffer
    pub readlink: Option<ReadlinkFn>,
    /// Resolves the link target during a path walk
    pub follow_link: Option<FollowLinkFn>,
    /// Releases whatever `follow_link` returned
    pub put_link: Option<PutLinkFn>,
}
impl InodeOperations {
    /// Address of the `follow_link` slot inside the table at `ops`
    ///
    /// # Safety
    ///
    /// `ops` must point into a live table (it is not dereferenced, only offset)
    pub unsafe fn follow_link_slot(ops: *mut Self) -> Slot {
        ptr::addr_of_mut!((*ops).follow_link) as Slot
    }
}

/// Reads the `follow_link` slot the way the host does during a walk, with an acquire load
///
/// # Safety
///
/// `ops` must point to a live table whose slot is only written atomically
pub unsafe fn load_follow_link(ops: *const InodeOperations) -> Option<FollowLinkFn> {
    let raw = read_slot(InodeOperations::follow_link_slot(ops as *mut _));
    // Safety: `Option<fn>` has the layout of a nullable pointer
    std::mem::transmute::<*mut (), Option<FollowLinkFn>>(raw)
}

/// Dispatches one `follow_link` call through the table, `None` if the slot is empty
///
/// # Safety
///
/// Same as [`load_follow_link`], and `dentry` and `nd` must be valid for whatever the installed function does with them
pub unsafe fn follow_link(
    ops: *const InodeOperations,
    dentry: *mut Dentry,
    nd: *mut NameiData,
) -> Option<*mut c_void> {
    load_follow_link(ops).map(|f| f(dentry, nd))
}

#[cfg(test)]
mod tests {
    use std::ffi::{c_void, CStr};
    use std::ptr;

    use crate::host::{
        err_ptr, follow_link, is_err, link_target, nd_get_link, nd_set_link, ptr_err, Dentry,
        InodeOperations, NameiData, EINVAL, ENOENT, MAX_NESTED_LINKS,
    };

    unsafe extern "C" fn set_fsdata_link(dentry: *mut Dentry, nd: *mut NameiData) -> *mut c_void {
        nd_set_link(nd, (*dentry).d_fsdata as _);
        ptr::null_mut()
    }

    #[test]
    /// Error pointers round-trip their errno and are told apart from real pointers
    fn test_err_ptr() {
        let e = err_ptr(-ENOENT);
        assert!(is_err(e));
        assert_eq!(ptr_err(e), -ENOENT);
        assert!(is_err(err_ptr(-4095)));

        assert!(!is_err(ptr::null()));
        let x = 5u32;
        assert!(!is_err(&x as *const u32 as *const c_void));
        assert!(!is_err(err_ptr(-4096)));
    }

    #[test]
    /// The link is recorded per depth
    fn test_nd_link() {
        let target = c"/dev/mtd2ro";
        let mut nd = NameiData::new();
        assert!(unsafe { nd_get_link(&nd) }.is_null());
        assert_eq!(unsafe { link_target(&nd) }, None);

        unsafe { nd_set_link(&mut nd, target.as_ptr()) };
        assert_eq!(unsafe { link_target(&nd) }, Some(target));

        nd.depth = 1;
        assert_eq!(unsafe { link_target(&nd) }, None);

        // out of range depths are ignored rather than written past the end
        nd.depth = MAX_NESTED_LINKS as u32 + 1;
        unsafe { nd_set_link(&mut nd, target.as_ptr()) };
        assert!(unsafe { nd_get_link(&nd) }.is_null());

        // error pointers stored as links are not strings
        nd.depth = 2;
        unsafe { nd_set_link(&mut nd, err_ptr(-EINVAL) as _) };
        assert_eq!(unsafe { link_target(&nd) }, None);
        assert_eq!(unsafe { link_target(ptr::null()) }, None::<&CStr>);
    }

    #[test]
    /// The slot is addressed inside the table and dispatch goes through it
    fn test_dispatch() {
        let mut ops = InodeOperations::default();
        let base = &mut ops as *mut InodeOperations;
        let slot = unsafe { InodeOperations::follow_link_slot(base) };
        assert_eq!(slot as usize - base as usize, std::mem::size_of::<usize>());

        let target = c"/dev/mtd1";
        let mut dentry = Dentry {
            d_fsdata: target.as_ptr() as _,
        };
        let mut nd = NameiData::new();

        assert_eq!(unsafe { follow_link(base, &mut dentry, &mut nd) }, None);

        ops.follow_link = Some(set_fsdata_link);
        let cookie = unsafe { follow_link(&ops, &mut dentry, &mut nd) };
        assert_eq!(cookie, Some(ptr::null_mut()));
        assert_eq!(unsafe { link_target(&nd) }, Some(target));
    }
}
