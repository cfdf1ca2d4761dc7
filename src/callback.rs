//! The native-callback bridge.
//!
//! The OpenCL runtime invokes registered callbacks on its own worker
//! threads, at arbitrary times after registration, holding nothing but a
//! fixed-signature function pointer and one pointer-sized `user_data` slot.
//! This module owns the machinery that lets a Rust closure ride across that
//! boundary and back:
//!
//! * [`UserData`] - a `malloc`'d cell holding a registry key. The cell's
//!   address is what travels through the native `user_data` slot, so it must
//!   stay valid (and fixed) for as long as the runtime may still fire.
//! * [`Callback`] - the registered closure, tagged by callback kind. Whether
//!   an entry is deleted by the trampoline after its single fire (one-shot)
//!   or survives until an explicit release (multi-fire) is a property of the
//!   kind, carried on the variant.
//! * [`CallbackRegistry`] - the key-to-closure map, shared between
//!   registering threads and however many runtime threads fire callbacks
//!   concurrently. Lookups during dispatch take the read lock; registration
//!   and deletion take the write lock.
//!
//! The `extern "C"` trampolines themselves live in [`functions`] next to
//! the entry points that register them; each one is a single
//! resolve-then-invoke against the process-wide registry.
//!
//! [`functions`]: crate::functions

use std::collections::HashMap;
use std::ffi::CStr;
use std::mem;
use std::slice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use once_cell::sync::Lazy;

use crate::error::{ApiError, Error, Result as OclResult};
use crate::ffi::{c_char, c_void, cl_command_queue, cl_int, cl_program, cl_uint, size_t};
use crate::types::abs::{CommandQueue, Program};

/// A fixed-address cell carrying one registration's key across the foreign
/// boundary.
///
/// The registry key cannot be handed to the runtime directly: the
/// `user_data` slot wants a pointer, and the value behind that pointer must
/// stay put for the whole window in which the runtime may still dereference
/// it. The cell is allocated with `malloc` at registration and freed exactly
/// once when the entry is deleted - by the trampoline for one-shot kinds, or
/// by [`CallbackRegistry::release`] otherwise.
///
/// Dropping a `UserData` does *not* free the cell; ownership of the cell
/// conceptually passes to the native call that received its address. A
/// registration whose native call never happened (or failed) must be
/// reclaimed with `release`.
#[derive(Debug)]
#[must_use]
pub struct UserData {
    ptr: *mut usize,
}

// The cell is written once at registration and the pointer is owned by a
// single lifecycle.
unsafe impl Send for UserData {}

impl UserData {
    /// The address passed verbatim as the native `user_data` argument.
    pub fn as_ptr(&self) -> *mut c_void {
        self.ptr as *mut c_void
    }

    /// Reads the registry key back out of the cell.
    ///
    /// Undefined behavior if the entry was already deleted (the cell is
    /// freed along with it). This mirrors the native runtime's own "do not
    /// use an object after its last reference is released" contract.
    pub(crate) unsafe fn key(&self) -> usize {
        *self.ptr
    }
}

/// Whether the registry entry is deleted by the trampoline after its single
/// invocation, or lives until explicitly released.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FireMode {
    OneShot,
    MultiFire,
}

/// A registered managed callback, tagged by kind.
///
/// The variant fixes three things at once: the native trampoline signature
/// that will fire, the closure signature it resolves to, and the deletion
/// responsibility (see [`FireMode`]).
pub enum Callback {
    /// Context error notification: `(error_text, private_info)`. Multi-fire;
    /// lives until released.
    ContextError(Arc<dyn Fn(&str, &[u8]) + Send + Sync>),
    /// Context destructor hook. Since: 3.0.
    ContextDestructor(Box<dyn FnOnce() + Send>),
    /// Program build completion.
    ProgramBuild(Box<dyn FnOnce() + Send>),
    /// Program compile completion.
    ProgramCompile(Box<dyn FnOnce() + Send>),
    /// Program link completion; carries the resulting program handle.
    ProgramLink(Box<dyn FnOnce(Program) + Send>),
    /// Memory object destructor hook.
    MemObjectDestructor(Box<dyn FnOnce() + Send>),
    /// Program release hook (`clSetProgramReleaseCallback`).
    ProgramRelease(Box<dyn FnOnce() + Send>),
    /// Event status transition; `Err` carries a negative status verbatim.
    EventStatus(Box<dyn FnOnce(std::result::Result<(), ApiError>) + Send>),
    /// SVM free completion: `(queue, freed_pointers)`.
    SvmFree(Box<dyn FnOnce(CommandQueue, &[*mut c_void]) + Send>),
    /// Native kernel invocation; receives the base of the packed argument
    /// block (after the leading token word).
    NativeKernel(Box<dyn FnOnce(*const c_void) + Send>),
}

// One-shot closures are only ever moved out of the map under the exclusive
// lock and invoked by the thread that removed them; nothing can be called
// through a shared reference. The multi-fire variant is `Sync` on its own.
unsafe impl Sync for Callback {}

impl Callback {
    pub fn fire_mode(&self) -> FireMode {
        match *self {
            Callback::ContextError(_) => FireMode::MultiFire,
            _ => FireMode::OneShot,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match *self {
            Callback::ContextError(_) => "context error",
            Callback::ContextDestructor(_) => "context destructor",
            Callback::ProgramBuild(_) => "program build",
            Callback::ProgramCompile(_) => "program compile",
            Callback::ProgramLink(_) => "program link",
            Callback::MemObjectDestructor(_) => "mem object destructor",
            Callback::ProgramRelease(_) => "program release",
            Callback::EventStatus(_) => "event status",
            Callback::SvmFree(_) => "svm free",
            Callback::NativeKernel(_) => "native kernel",
        }
    }
}

/// The key-to-closure registry behind every callback registration.
///
/// One process-wide instance (see [`callbacks`]) serves the `extern "C"`
/// trampolines; separate instances can be constructed freely, which the
/// tests use to drive dispatch against a registry they fully control.
pub struct CallbackRegistry {
    entries: RwLock<HashMap<usize, Callback>>,
    next_key: AtomicUsize,
}

impl Default for CallbackRegistry {
    fn default() -> CallbackRegistry {
        CallbackRegistry::new()
    }
}

impl CallbackRegistry {
    pub fn new() -> CallbackRegistry {
        CallbackRegistry {
            entries: RwLock::new(HashMap::new()),
            // Key zero is never issued, so a zeroed cell can't alias a live
            // registration.
            next_key: AtomicUsize::new(1),
        }
    }

    fn read_entries(&self) -> RwLockReadGuard<HashMap<usize, Callback>> {
        self.entries.read().expect("callback registry lock poisoned")
    }

    fn write_entries(&self) -> RwLockWriteGuard<HashMap<usize, Callback>> {
        self.entries.write().expect("callback registry lock poisoned")
    }

    /// Registers `callback`, allocating its stable cell, and returns the
    /// user data to pass to the native entry point.
    ///
    /// Keys are unique among all registrations ever issued by this registry,
    /// so a released entry's state can never bleed into a later one.
    pub fn register(&self, callback: Callback) -> OclResult<UserData> {
        let cell = unsafe { libc::malloc(mem::size_of::<usize>()) as *mut usize };
        if cell.is_null() {
            return Err(Error::OutOfMemory);
        }
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        unsafe { cell.write(key) };
        self.write_entries().insert(key, callback);
        Ok(UserData { ptr: cell })
    }

    /// Deletes the registration and frees its cell.
    ///
    /// This is the explicit-release path: multi-fire registrations when the
    /// owner is done with them, and one-shot registrations whose native call
    /// failed (or was never made). It must not be called while a native call
    /// that may still fire the callback is in flight; the runtime would
    /// dereference a freed cell.
    pub fn release(&self, user_data: UserData) {
        let key = unsafe { user_data.key() };
        self.write_entries().remove(&key);
        unsafe { libc::free(user_data.ptr as *mut c_void) };
    }

    /// Removes and returns the entry for `key`, if present.
    pub(crate) fn take(&self, key: usize) -> Option<Callback> {
        self.write_entries().remove(&key)
    }

    pub(crate) fn len(&self) -> usize {
        self.read_entries().len()
    }

    /// Consumes the one-shot entry behind `user_data` and frees its cell.
    ///
    /// `Err(key)` means no entry is registered for the key - the entry was
    /// already consumed or released. The cell is *not* freed in that case:
    /// the first consumption freed it, and this pointer is already dangling.
    pub(crate) unsafe fn take_one_shot(&self, user_data: *mut c_void)
            -> std::result::Result<Callback, usize> {
        let cell = user_data as *mut usize;
        let key = *cell;
        match self.take(key) {
            Some(callback) => {
                libc::free(cell as *mut c_void);
                Ok(callback)
            }
            None => Err(key),
        }
    }

    //========================================================================
    // Dispatch: one method per callback kind, driven by the `extern "C"`
    // trampolines in `functions` and, in tests, called directly.
    //========================================================================

    /// Context error notification. Multi-fire: the entry survives the call.
    ///
    /// An unknown key is dropped silently. The owning context may have been
    /// destroyed (and the registration released) concurrently with an
    /// in-flight notification; faulting here would turn that benign race
    /// into a crash on a runtime thread.
    pub unsafe fn notify_context_error(&self, errinfo: *const c_char,
            private_info: *const c_void, cb: size_t, user_data: *mut c_void) {
        if user_data.is_null() {
            return;
        }
        let key = *(user_data as *const usize);
        let handler = {
            let entries = self.read_entries();
            match entries.get(&key) {
                Some(Callback::ContextError(handler)) => handler.clone(),
                Some(other) => panic!("context error notification fired for a {} \
                    registration (key: {})", other.kind_name(), key),
                None => {
                    log::warn!("dropping context error notification for released \
                        registration (key: {})", key);
                    return;
                }
            }
        };
        let error_text = if errinfo.is_null() {
            String::new()
        } else {
            CStr::from_ptr(errinfo).to_string_lossy().into_owned()
        };
        // A view over runtime-owned memory; valid only for this call.
        let private = if private_info.is_null() || cb == 0 {
            &[]
        } else {
            slice::from_raw_parts(private_info as *const u8, cb as usize)
        };
        handler(&error_text, private);
    }

    /// Context destructor hook. One-shot.
    pub unsafe fn complete_context_destructor(&self, user_data: *mut c_void) {
        match self.take_one_shot(user_data) {
            Ok(Callback::ContextDestructor(f)) => f(),
            Ok(other) => mismatched_kind("context destructor", &other),
            Err(key) => released_one_shot("context destructor", key),
        }
    }

    /// Program build completion. One-shot.
    pub unsafe fn complete_program_build(&self, user_data: *mut c_void) {
        match self.take_one_shot(user_data) {
            Ok(Callback::ProgramBuild(f)) => f(),
            Ok(other) => mismatched_kind("program build", &other),
            Err(key) => released_one_shot("program build", key),
        }
    }

    /// Program compile completion. One-shot.
    pub unsafe fn complete_program_compile(&self, user_data: *mut c_void) {
        match self.take_one_shot(user_data) {
            Ok(Callback::ProgramCompile(f)) => f(),
            Ok(other) => mismatched_kind("program compile", &other),
            Err(key) => released_one_shot("program compile", key),
        }
    }

    /// Program link completion. One-shot; passes the resulting program
    /// handle through.
    pub unsafe fn complete_program_link(&self, program: cl_program, user_data: *mut c_void) {
        match self.take_one_shot(user_data) {
            Ok(Callback::ProgramLink(f)) => f(Program::from_raw(program)),
            Ok(other) => mismatched_kind("program link", &other),
            Err(key) => released_one_shot("program link", key),
        }
    }

    /// Memory object destructor hook. One-shot.
    pub unsafe fn complete_mem_object_destructor(&self, user_data: *mut c_void) {
        match self.take_one_shot(user_data) {
            Ok(Callback::MemObjectDestructor(f)) => f(),
            Ok(other) => mismatched_kind("mem object destructor", &other),
            Err(key) => released_one_shot("mem object destructor", key),
        }
    }

    /// Program release hook. One-shot.
    pub unsafe fn complete_program_release(&self, user_data: *mut c_void) {
        match self.take_one_shot(user_data) {
            Ok(Callback::ProgramRelease(f)) => f(),
            Ok(other) => mismatched_kind("program release", &other),
            Err(key) => released_one_shot("program release", key),
        }
    }

    /// Event status transition. One-shot per registration; a negative
    /// status is surfaced as an error wrapping the code verbatim.
    pub unsafe fn complete_event_status(&self, status: cl_int, user_data: *mut c_void) {
        match self.take_one_shot(user_data) {
            Ok(Callback::EventStatus(f)) => {
                let result = if status < 0 {
                    Err(ApiError::new(status, "clSetEventCallback", None::<String>))
                } else {
                    Ok(())
                };
                f(result);
            }
            Ok(other) => mismatched_kind("event status", &other),
            Err(key) => released_one_shot("event status", key),
        }
    }

    /// SVM free completion. One-shot; reconstructs the freed-pointer list
    /// as a view valid only for the call.
    pub unsafe fn complete_svm_free(&self, queue: cl_command_queue,
            num_svm_pointers: cl_uint, svm_pointers: *mut *mut c_void,
            user_data: *mut c_void) {
        match self.take_one_shot(user_data) {
            Ok(Callback::SvmFree(f)) => {
                let ptrs = if svm_pointers.is_null() || num_svm_pointers == 0 {
                    &[]
                } else {
                    slice::from_raw_parts(svm_pointers as *const *mut c_void,
                        num_svm_pointers as usize)
                };
                f(CommandQueue::from_raw(queue), ptrs);
            }
            Ok(other) => mismatched_kind("svm free", &other),
            Err(key) => released_one_shot("svm free", key),
        }
    }

    /// Native kernel invocation. One-shot.
    ///
    /// `clEnqueueNativeKernel` has no separate user-data slot, so the cell
    /// address is embedded as the first word of the packed argument block
    /// (see [`enqueue_native_kernel`](crate::enqueue_native_kernel)); the
    /// registered closure receives a pointer just past that word.
    pub unsafe fn run_native_kernel(&self, args: *mut c_void) {
        let cell_ptr = *(args as *const *mut c_void);
        match self.take_one_shot(cell_ptr) {
            Ok(Callback::NativeKernel(f)) => {
                f((args as *const u8).add(mem::size_of::<usize>()) as *const c_void);
            }
            Ok(other) => mismatched_kind("native kernel", &other),
            Err(key) => released_one_shot("native kernel", key),
        }
    }
}

// NOTE: These panics unwind into an `extern "C"` trampoline frame and abort
// the process. That is the intended severity: a one-shot entry missing at
// fire time means a double fire or a release while the call was in flight,
// and memory may already be corrupt.
fn mismatched_kind(fired: &'static str, found: &Callback) -> ! {
    panic!("{} callback fired for a {} registration", fired, found.kind_name());
}

fn released_one_shot(fired: &'static str, key: usize) -> ! {
    panic!("{} callback fired for already-released registration (key: {})", fired, key);
}

/// A registered context error handler.
///
/// Context error callbacks are multi-fire: the runtime may deliver any
/// number of asynchronous notifications for contexts created with this
/// callback, from any of its threads. The registration is therefore a
/// process-global resource that must be explicitly [`release`]d once no
/// context still references it.
///
/// [`release`]: ContextErrorCallback::release
pub struct ContextErrorCallback {
    user_data: UserData,
}

impl ContextErrorCallback {
    /// Creates and registers a new callback in the process-wide registry.
    ///
    /// Registration may fail if memory is exhausted. The handler can be
    /// called from arbitrary runtime threads and must synchronize its own
    /// state.
    pub fn new<F>(handler: F) -> OclResult<ContextErrorCallback>
            where F: Fn(&str, &[u8]) + Send + Sync + 'static {
        let user_data = callbacks().register(Callback::ContextError(Arc::new(handler)))?;
        Ok(ContextErrorCallback { user_data })
    }

    /// The value for the `user_data` slot of a context creation call.
    pub fn as_ptr(&self) -> *mut c_void {
        self.user_data.as_ptr()
    }

    /// Removes the registration. When this returns, the handler is no
    /// longer invoked; a notification racing this call is dropped.
    ///
    /// Release only after every context created with this callback has been
    /// destroyed. A notification from a still-live context after release
    /// would dereference the freed cell.
    pub fn release(self) {
        callbacks().release(self.user_data);
    }
}

static CALLBACKS: Lazy<CallbackRegistry> = Lazy::new(CallbackRegistry::new);

/// The process-wide registry the `extern "C"` trampolines dispatch through.
///
/// Created on first use and never torn down; entries come and go with the
/// registrations they back.
pub fn callbacks() -> &'static CallbackRegistry {
    &CALLBACKS
}
