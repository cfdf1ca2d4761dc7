//! OpenCL C types, callback signatures, and the runtime-loaded API table.
//!
//! The native library is opened with `dlopen`/`LoadLibrary` semantics on
//! first use instead of being linked, so the crate builds and its callback
//! bridge tests run on machines without an ICD loader installed. Function
//! pointers for entry points newer than OpenCL 1.2 (and for extensions) are
//! stored as `Option` and surface [`Error::ApiUnavailable`] when missing.
//!
//! [`Error::ApiUnavailable`]: crate::Error

#![allow(non_camel_case_types)]

use std::env;
use std::ffi::OsString;

use libloading::Library;
use once_cell::sync::Lazy;

use crate::error::{Error, Result as OclResult};

pub use libc::{c_char, c_void, size_t};

pub type cl_int = i32;
pub type cl_uint = u32;
pub type cl_ulong = u64;
pub type cl_bool = cl_uint;
pub type cl_bitfield = cl_ulong;

pub type cl_platform_id = *mut c_void;
pub type cl_device_id = *mut c_void;
pub type cl_context = *mut c_void;
pub type cl_command_queue = *mut c_void;
pub type cl_mem = *mut c_void;
pub type cl_program = *mut c_void;
pub type cl_kernel = *mut c_void;
pub type cl_event = *mut c_void;

pub type cl_context_properties = isize;
pub type cl_device_type = cl_bitfield;
pub type cl_mem_flags = cl_bitfield;
pub type cl_svm_mem_flags = cl_bitfield;
pub type cl_map_flags = cl_bitfield;
pub type cl_command_queue_properties = cl_bitfield;
pub type cl_queue_properties = cl_bitfield;

pub const CL_SUCCESS: cl_int = 0;
pub const CL_OUT_OF_HOST_MEMORY: cl_int = -6;

pub const CL_FALSE: cl_bool = 0;
pub const CL_TRUE: cl_bool = 1;

// Command execution statuses passed to event callbacks:
pub const CL_COMPLETE: cl_int = 0x0;
pub const CL_RUNNING: cl_int = 0x1;
pub const CL_SUBMITTED: cl_int = 0x2;
pub const CL_QUEUED: cl_int = 0x3;

pub const CL_CONTEXT_PLATFORM: cl_context_properties = 0x1084;
pub const CL_CONTEXT_INTEROP_USER_SYNC: cl_context_properties = 0x1085;

pub const CL_QUEUE_PROPERTIES: cl_queue_properties = 0x1093;

/// The opaque user-data slot every registration entry point reserves.
pub type UserDataPtr = *mut c_void;

// Callback signatures fixed by the OpenCL API:
pub type CreateContextCallbackFn = extern "C" fn(errinfo: *const c_char,
    private_info: *const c_void, cb: size_t, user_data: *mut c_void);
pub type ContextDestructorCallbackFn = extern "C" fn(context: cl_context,
    user_data: *mut c_void);
pub type ProgramCallbackFn = extern "C" fn(program: cl_program, user_data: *mut c_void);
pub type MemDestructorCallbackFn = extern "C" fn(memobj: cl_mem, user_data: *mut c_void);
pub type EventCallbackFn = extern "C" fn(event: cl_event,
    event_command_exec_status: cl_int, user_data: *mut c_void);
pub type SvmFreeCallbackFn = extern "C" fn(queue: cl_command_queue,
    num_svm_pointers: cl_uint, svm_pointers: *mut *mut c_void, user_data: *mut c_void);
pub type NativeKernelFn = extern "C" fn(args: *mut c_void);

/// Function pointers resolved from the loaded OpenCL library.
///
/// Entry points newer than OpenCL 1.2, and extension entry points, are
/// `Option` because a conformant 1.2 or 3.0 library may omit them.
#[allow(non_snake_case)]
pub struct ApiTable {
    // Keeps the resolved pointers valid:
    _lib: Library,

    pub clGetPlatformIDs: unsafe extern "system" fn(cl_uint, *mut cl_platform_id,
        *mut cl_uint) -> cl_int,
    pub clGetDeviceIDs: unsafe extern "system" fn(cl_platform_id, cl_device_type, cl_uint,
        *mut cl_device_id, *mut cl_uint) -> cl_int,

    pub clCreateContext: unsafe extern "system" fn(*const cl_context_properties, cl_uint,
        *const cl_device_id, Option<CreateContextCallbackFn>, *mut c_void,
        *mut cl_int) -> cl_context,
    pub clCreateContextFromType: unsafe extern "system" fn(*const cl_context_properties,
        cl_device_type, Option<CreateContextCallbackFn>, *mut c_void,
        *mut cl_int) -> cl_context,
    pub clRetainContext: unsafe extern "system" fn(cl_context) -> cl_int,
    pub clReleaseContext: unsafe extern "system" fn(cl_context) -> cl_int,
    /// Since: 3.0
    pub clSetContextDestructorCallback: Option<unsafe extern "system" fn(cl_context,
        Option<ContextDestructorCallbackFn>, *mut c_void) -> cl_int>,

    pub clCreateCommandQueue: unsafe extern "system" fn(cl_context, cl_device_id,
        cl_command_queue_properties, *mut cl_int) -> cl_command_queue,
    /// Since: 2.0
    pub clCreateCommandQueueWithProperties: Option<unsafe extern "system" fn(cl_context,
        cl_device_id, *const cl_queue_properties, *mut cl_int) -> cl_command_queue>,
    pub clRetainCommandQueue: unsafe extern "system" fn(cl_command_queue) -> cl_int,
    pub clReleaseCommandQueue: unsafe extern "system" fn(cl_command_queue) -> cl_int,
    pub clFlush: unsafe extern "system" fn(cl_command_queue) -> cl_int,
    pub clFinish: unsafe extern "system" fn(cl_command_queue) -> cl_int,

    pub clCreateBuffer: unsafe extern "system" fn(cl_context, cl_mem_flags, size_t,
        *mut c_void, *mut cl_int) -> cl_mem,
    pub clRetainMemObject: unsafe extern "system" fn(cl_mem) -> cl_int,
    pub clReleaseMemObject: unsafe extern "system" fn(cl_mem) -> cl_int,
    pub clSetMemObjectDestructorCallback: unsafe extern "system" fn(cl_mem,
        Option<MemDestructorCallbackFn>, *mut c_void) -> cl_int,
    pub clEnqueueReadBuffer: unsafe extern "system" fn(cl_command_queue, cl_mem, cl_bool,
        size_t, size_t, *mut c_void, cl_uint, *const cl_event, *mut cl_event) -> cl_int,
    pub clEnqueueWriteBuffer: unsafe extern "system" fn(cl_command_queue, cl_mem, cl_bool,
        size_t, size_t, *const c_void, cl_uint, *const cl_event, *mut cl_event) -> cl_int,

    pub clCreateProgramWithSource: unsafe extern "system" fn(cl_context, cl_uint,
        *const *const c_char, *const size_t, *mut cl_int) -> cl_program,
    pub clRetainProgram: unsafe extern "system" fn(cl_program) -> cl_int,
    pub clReleaseProgram: unsafe extern "system" fn(cl_program) -> cl_int,
    pub clBuildProgram: unsafe extern "system" fn(cl_program, cl_uint, *const cl_device_id,
        *const c_char, Option<ProgramCallbackFn>, *mut c_void) -> cl_int,
    pub clCompileProgram: unsafe extern "system" fn(cl_program, cl_uint,
        *const cl_device_id, *const c_char, cl_uint, *const cl_program,
        *const *const c_char, Option<ProgramCallbackFn>, *mut c_void) -> cl_int,
    pub clLinkProgram: unsafe extern "system" fn(cl_context, cl_uint, *const cl_device_id,
        *const c_char, cl_uint, *const cl_program, Option<ProgramCallbackFn>,
        *mut c_void, *mut cl_int) -> cl_program,
    /// Since: 2.2 (deprecated in 3.0, still exported by most libraries)
    pub clSetProgramReleaseCallback: Option<unsafe extern "system" fn(cl_program,
        Option<ProgramCallbackFn>, *mut c_void) -> cl_int>,

    pub clCreateUserEvent: unsafe extern "system" fn(cl_context, *mut cl_int) -> cl_event,
    pub clSetUserEventStatus: unsafe extern "system" fn(cl_event, cl_int) -> cl_int,
    pub clSetEventCallback: unsafe extern "system" fn(cl_event, cl_int,
        Option<EventCallbackFn>, *mut c_void) -> cl_int,
    pub clRetainEvent: unsafe extern "system" fn(cl_event) -> cl_int,
    pub clReleaseEvent: unsafe extern "system" fn(cl_event) -> cl_int,
    pub clWaitForEvents: unsafe extern "system" fn(cl_uint, *const cl_event) -> cl_int,

    /// Since: 2.0
    pub clSVMAlloc: Option<unsafe extern "system" fn(cl_context, cl_svm_mem_flags, size_t,
        cl_uint) -> *mut c_void>,
    /// Since: 2.0
    pub clSVMFree: Option<unsafe extern "system" fn(cl_context, *mut c_void)>,
    /// Since: 2.0
    pub clEnqueueSVMFree: Option<unsafe extern "system" fn(cl_command_queue, cl_uint,
        *mut *mut c_void, Option<SvmFreeCallbackFn>, *mut c_void, cl_uint,
        *const cl_event, *mut cl_event) -> cl_int>,

    pub clEnqueueNativeKernel: unsafe extern "system" fn(cl_command_queue,
        Option<NativeKernelFn>, *mut c_void, size_t, cl_uint, *const cl_mem,
        *const *const c_void, cl_uint, *const cl_event, *mut cl_event) -> cl_int,
}

macro_rules! cl_fn {
    ($lib:expr, $name:expr) => {{
        let symbol = unsafe {
            $lib.get(concat!($name, "\0").as_bytes())
                .map_err(|err| Error::LibraryLoad(
                    format!("missing required symbol `{}`: {}", $name, err)))?
        };
        *symbol
    }};
}

macro_rules! cl_fn_opt {
    ($lib:expr, $name:expr) => {{
        unsafe { $lib.get(concat!($name, "\0").as_bytes()).ok().map(|symbol| *symbol) }
    }};
}

impl ApiTable {
    fn load() -> OclResult<ApiTable> {
        let lib = open_library()?;
        Ok(ApiTable {
            clGetPlatformIDs: cl_fn!(lib, "clGetPlatformIDs"),
            clGetDeviceIDs: cl_fn!(lib, "clGetDeviceIDs"),
            clCreateContext: cl_fn!(lib, "clCreateContext"),
            clCreateContextFromType: cl_fn!(lib, "clCreateContextFromType"),
            clRetainContext: cl_fn!(lib, "clRetainContext"),
            clReleaseContext: cl_fn!(lib, "clReleaseContext"),
            clSetContextDestructorCallback: cl_fn_opt!(lib, "clSetContextDestructorCallback"),
            clCreateCommandQueue: cl_fn!(lib, "clCreateCommandQueue"),
            clCreateCommandQueueWithProperties:
                cl_fn_opt!(lib, "clCreateCommandQueueWithProperties"),
            clRetainCommandQueue: cl_fn!(lib, "clRetainCommandQueue"),
            clReleaseCommandQueue: cl_fn!(lib, "clReleaseCommandQueue"),
            clFlush: cl_fn!(lib, "clFlush"),
            clFinish: cl_fn!(lib, "clFinish"),
            clCreateBuffer: cl_fn!(lib, "clCreateBuffer"),
            clRetainMemObject: cl_fn!(lib, "clRetainMemObject"),
            clReleaseMemObject: cl_fn!(lib, "clReleaseMemObject"),
            clSetMemObjectDestructorCallback: cl_fn!(lib, "clSetMemObjectDestructorCallback"),
            clEnqueueReadBuffer: cl_fn!(lib, "clEnqueueReadBuffer"),
            clEnqueueWriteBuffer: cl_fn!(lib, "clEnqueueWriteBuffer"),
            clCreateProgramWithSource: cl_fn!(lib, "clCreateProgramWithSource"),
            clRetainProgram: cl_fn!(lib, "clRetainProgram"),
            clReleaseProgram: cl_fn!(lib, "clReleaseProgram"),
            clBuildProgram: cl_fn!(lib, "clBuildProgram"),
            clCompileProgram: cl_fn!(lib, "clCompileProgram"),
            clLinkProgram: cl_fn!(lib, "clLinkProgram"),
            clSetProgramReleaseCallback: cl_fn_opt!(lib, "clSetProgramReleaseCallback"),
            clCreateUserEvent: cl_fn!(lib, "clCreateUserEvent"),
            clSetUserEventStatus: cl_fn!(lib, "clSetUserEventStatus"),
            clSetEventCallback: cl_fn!(lib, "clSetEventCallback"),
            clRetainEvent: cl_fn!(lib, "clRetainEvent"),
            clReleaseEvent: cl_fn!(lib, "clReleaseEvent"),
            clWaitForEvents: cl_fn!(lib, "clWaitForEvents"),
            clSVMAlloc: cl_fn_opt!(lib, "clSVMAlloc"),
            clSVMFree: cl_fn_opt!(lib, "clSVMFree"),
            clEnqueueSVMFree: cl_fn_opt!(lib, "clEnqueueSVMFree"),
            clEnqueueNativeKernel: cl_fn!(lib, "clEnqueueNativeKernel"),
            _lib: lib,
        })
    }
}

/// Candidate library names, checked in order. `OPENCL_LIBRARY` overrides.
fn library_candidates() -> Vec<OsString> {
    if let Some(path) = env::var_os("OPENCL_LIBRARY") {
        return vec![path];
    }
    if cfg!(target_os = "windows") {
        vec![OsString::from("OpenCL.dll")]
    } else if cfg!(target_os = "macos") {
        vec![OsString::from("/System/Library/Frameworks/OpenCL.framework/OpenCL")]
    } else {
        vec![OsString::from("libOpenCL.so.1"), OsString::from("libOpenCL.so")]
    }
}

fn open_library() -> OclResult<Library> {
    let candidates = library_candidates();
    let mut last_err = None;
    for name in &candidates {
        match unsafe { Library::new(name) } {
            Ok(lib) => {
                log::debug!("loaded OpenCL library from {:?}", name);
                return Ok(lib);
            }
            Err(err) => last_err = Some(err),
        }
    }
    let msg = match last_err {
        Some(err) => format!("{:?}: {}", candidates, err),
        None => String::from("no candidate library names"),
    };
    log::warn!("unable to load an OpenCL library ({})", msg);
    Err(Error::LibraryLoad(msg))
}

static API: Lazy<OclResult<ApiTable>> = Lazy::new(ApiTable::load);

/// Returns the process-wide API table, loading the OpenCL library on first
/// call. The table lives for the remainder of the process.
pub fn api() -> OclResult<&'static ApiTable> {
    match &*API {
        Ok(table) => Ok(table),
        Err(err) => Err(Error::LibraryLoad(err.to_string())),
    }
}
