//! Thin wrappers and high-level utilities for the OpenCL 3.0 host API,
//! centered on managed callback bridging.
//!
//! The native runtime delivers build notifications, event status
//! transitions, destructor hooks, error notifications, SVM free
//! completions, and native-kernel invocations by calling a registered
//! function pointer on one of its own threads, handing back a single
//! pointer-sized `user_data` value. This crate lets plain Rust closures
//! ride that channel:
//!
//! * registration allocates a fixed-address cell holding a registry key and
//!   passes the cell's address as `user_data`;
//! * a fixed `extern "C"` trampoline per callback kind resolves the key in
//!   a process-wide registry and invokes the closure;
//! * one-shot kinds (everything except context error notification) delete
//!   their registry entry on first fire, so a closure can never run twice
//!   and an abandoned registration can be reclaimed with an explicit
//!   release.
//!
//! Enqueue entry points that retain a host address past the initiating call
//! take [`HostMem`] descriptors; a `Transient` descriptor reaching such a
//! call site is rejected before the native call is made (see
//! [`resolve_host_ptr`]).
//!
//! The OpenCL library itself is opened at runtime on first use
//! (`OPENCL_LIBRARY` overrides the search path), so building and testing do
//! not require an ICD loader to be installed.
//!
//! ## Safety
//!
//! Handle wrappers ([`Context`], [`Mem`], [`Event`], ..) are plain copies
//! of raw pointers and do not reference count; retain/release calls and the
//! validity of every handle passed in remain the caller's responsibility,
//! as do the lifetime contracts spelled out on the individual functions.

#[macro_use]
extern crate bitflags;

pub mod ffi;

mod callback;
mod error;
mod functions;
mod host_mem;
mod types;

#[cfg(test)]
mod tests;

pub use crate::callback::{callbacks, Callback, CallbackRegistry, ContextErrorCallback,
    FireMode, UserData};
pub use crate::error::{ApiError, Error, Result, Status};
pub use crate::host_mem::{resolve_host_ptr, FixedHostMemory, HostMem, Stability};
pub use crate::types::abs::{CommandQueue, Context, DeviceId, Event, Mem, PlatformId,
    Program};
pub use crate::types::enums::{CommandExecutionStatus, CommandQueueProperties, DeviceType,
    MemFlags, SvmMemFlags};
pub use crate::types::structs::ContextProperties;

pub use crate::functions::{
    build_program, compile_program, create_buffer, create_command_queue,
    create_command_queue_with_properties, create_context, create_context_from_type,
    create_program_with_source, create_user_event, enqueue_native_kernel,
    enqueue_read_buffer, enqueue_svm_free, enqueue_write_buffer, finish, flush,
    get_device_ids, get_platform_ids, link_program, release_command_queue,
    release_context, release_event, release_mem_object, release_program,
    retain_command_queue, retain_context, retain_event, retain_mem_object,
    retain_program, set_context_destructor_callback, set_event_callback,
    set_mem_object_destructor_callback, set_program_release_callback,
    set_user_event_status, svm_alloc, svm_free, wait_for_events,
};
