//! Host memory descriptors and the pointer stability guard.
//!
//! Several enqueue entry points retain the raw host address they are given
//! past the call that submitted them (every non-blocking read/write, and
//! anything SVM- or native-kernel-shaped). A reference whose backing
//! storage may be gone or reused by then must never reach those calls, so
//! each host range carries a [`Stability`] tag and [`resolve_host_ptr`]
//! gates on it at the boundary.

use std::mem;
use std::ptr;
use std::slice;

use crate::error::{Error, Result as OclResult};
use crate::ffi::c_void;

/// Whether the address backing a host range remains valid after the
/// initiating call returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stability {
    /// The allocation is fixed and outlives any in-flight native call
    /// (caller-managed, e.g. [`FixedHostMemory`]).
    Fixed,
    /// Borrowed storage that is only guaranteed for the duration of the
    /// initiating call. Usable for blocking operations only.
    Transient,
}

/// A host-side byte range handed to a native entry point.
///
/// This is a raw descriptor: it does not borrow-check the storage it
/// points at. The caller keeps the backing alive for at least the duration
/// of the native call (and, for `Fixed` ranges used asynchronously, until
/// the operation completes).
#[derive(Clone, Copy, Debug)]
pub struct HostMem {
    ptr: *mut c_void,
    size: usize,
    stability: Stability,
}

impl HostMem {
    /// The null range. Resolves to a null pointer with a size of zero.
    pub fn null() -> HostMem {
        HostMem { ptr: ptr::null_mut(), size: 0, stability: Stability::Fixed }
    }

    /// A transient view of a slice.
    pub fn from_slice<T>(v: &[T]) -> HostMem {
        HostMem {
            ptr: v.as_ptr() as *mut c_void,
            size: v.len() * mem::size_of::<T>(),
            stability: Stability::Transient,
        }
    }

    /// A transient view of a mutable slice (for operations that write back
    /// into host memory).
    pub fn from_mut_slice<T>(v: &mut [T]) -> HostMem {
        HostMem {
            ptr: v.as_mut_ptr() as *mut c_void,
            size: v.len() * mem::size_of::<T>(),
            stability: Stability::Transient,
        }
    }

    /// A transient view of a single value.
    pub fn from_ref<T>(v: &T) -> HostMem {
        HostMem {
            ptr: v as *const T as *mut c_void,
            size: mem::size_of::<T>(),
            stability: Stability::Transient,
        }
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn stability(&self) -> Stability {
        self.stability
    }
}

/// A fixed-address host allocation.
///
/// Allocated zeroed with `calloc`; the address never changes for the
/// lifetime of the value and the storage is freed on drop. Use this as the
/// target of non-blocking reads/writes, keeping it alive until the
/// operation's event completes.
#[derive(Debug)]
pub struct FixedHostMemory {
    ptr: *mut c_void,
    size: usize,
}

unsafe impl Send for FixedHostMemory {}
unsafe impl Sync for FixedHostMemory {}

impl FixedHostMemory {
    pub fn alloc(size: usize) -> OclResult<FixedHostMemory> {
        let ptr = unsafe { libc::calloc(size, 1) };
        if ptr.is_null() && size != 0 {
            return Err(Error::OutOfMemory);
        }
        Ok(FixedHostMemory { ptr, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// The descriptor to pass to an enqueue call. Tagged `Fixed`.
    pub fn host_mem(&self) -> HostMem {
        HostMem { ptr: self.ptr, size: self.size, stability: Stability::Fixed }
    }

    pub fn as_slice(&self) -> &[u8] {
        if self.ptr.is_null() {
            return &[];
        }
        unsafe { slice::from_raw_parts(self.ptr as *const u8, self.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.ptr.is_null() {
            return &mut [];
        }
        unsafe { slice::from_raw_parts_mut(self.ptr as *mut u8, self.size) }
    }
}

impl Drop for FixedHostMemory {
    fn drop(&mut self) {
        unsafe { libc::free(self.ptr) };
    }
}

/// Resolves a host range to the raw address passed to a native call.
///
/// When `require_stable` is set (every call site where the runtime keeps
/// the address after the initiating call returns), a `Transient` range is a
/// fatal precondition violation: proceeding would hand the runtime an
/// address it may dereference after the storage is gone, corrupting memory
/// at some arbitrary later point on an arbitrary thread. Panicking here is
/// deliberate; this is a programming error, not a recoverable condition.
pub fn resolve_host_ptr(mem: Option<&HostMem>, require_stable: bool,
        param_name: &'static str) -> *mut c_void {
    let mem = match mem {
        Some(mem) => mem,
        None => return ptr::null_mut(),
    };
    if mem.as_ptr().is_null() {
        return ptr::null_mut();
    }
    if require_stable && mem.stability() != Stability::Fixed {
        panic!("`{}` must be a fixed-address host range: the native runtime keeps \
            this address after the call returns and the backing storage may no \
            longer exist when it is dereferenced", param_name);
    }
    mem.as_ptr()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_accepts_fixed_when_required() {
        let fixed = FixedHostMemory::alloc(64).unwrap();
        let mem = fixed.host_mem();
        assert_eq!(resolve_host_ptr(Some(&mem), true, "data"), mem.as_ptr());
    }

    #[test]
    fn guard_accepts_anything_when_not_required() {
        let buf = [0u8; 16];
        let transient = HostMem::from_slice(&buf);
        assert_eq!(resolve_host_ptr(Some(&transient), false, "data"), transient.as_ptr());

        let fixed = FixedHostMemory::alloc(16).unwrap();
        let mem = fixed.host_mem();
        assert_eq!(resolve_host_ptr(Some(&mem), false, "data"), mem.as_ptr());
    }

    #[test]
    #[should_panic(expected = "fixed-address host range")]
    fn guard_rejects_transient_when_required() {
        let buf = [0u8; 16];
        let transient = HostMem::from_slice(&buf);
        resolve_host_ptr(Some(&transient), true, "data");
    }

    #[test]
    fn null_and_absent_resolve_to_null() {
        assert!(resolve_host_ptr(None, true, "data").is_null());
        let null = HostMem::null();
        assert!(resolve_host_ptr(Some(&null), true, "data").is_null());
    }

    #[test]
    fn fixed_host_memory_is_zeroed_and_writable() {
        let mut mem = FixedHostMemory::alloc(32).unwrap();
        assert!(mem.as_slice().iter().all(|&b| b == 0));
        mem.as_mut_slice()[7] = 0xA5;
        assert_eq!(mem.as_slice()[7], 0xA5);
    }
}
