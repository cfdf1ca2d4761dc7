//! Abstract data type wrappers.
//!
//! Thin `#[repr(C)]` newtypes over the raw OpenCL handles. A wrapper is
//! exactly pointer-sized, so a slice of wrappers can be passed to a native
//! entry point expecting an array of handles.
//!
//! The wrappers do not reference count. Ownership follows the native
//! object's own retain/release rules; `from_raw` is `unsafe` because the
//! caller asserts the pointer is (or may legitimately be) a live handle.

use std::fmt;

use crate::ffi::{cl_command_queue, cl_context, cl_device_id, cl_event, cl_mem,
    cl_platform_id, cl_program};

macro_rules! cl_handle {
    ($(#[$attrs:meta])* $name:ident, $raw:ty) => {
        $(#[$attrs])*
        #[repr(C)]
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name($raw);

        impl $name {
            /// Wraps a raw handle.
            pub unsafe fn from_raw(ptr: $raw) -> $name {
                $name(ptr)
            }

            /// Returns an invalid handle used for initializing data
            /// structures meant to be filled with valid ones.
            pub fn null() -> $name {
                $name(::std::ptr::null_mut())
            }

            /// Returns the raw handle.
            pub fn as_ptr(self) -> $raw {
                self.0
            }

            pub fn is_null(self) -> bool {
                self.0.is_null()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({:p})"), self.0)
            }
        }

        unsafe impl Send for $name {}
        unsafe impl Sync for $name {}
    };
}

cl_handle!(
    /// cl_platform_id
    PlatformId, cl_platform_id);
cl_handle!(
    /// cl_device_id
    DeviceId, cl_device_id);
cl_handle!(
    /// cl_context
    Context, cl_context);
cl_handle!(
    /// cl_command_queue
    CommandQueue, cl_command_queue);
cl_handle!(
    /// cl_mem
    Mem, cl_mem);
cl_handle!(
    /// cl_program
    Program, cl_program);
cl_handle!(
    /// cl_event
    ///
    /// `#[repr(C)]` matters most here: wait lists are passed as
    /// `&[Event]` and new-event out-parameters as `&mut Event`.
    Event, cl_event);
