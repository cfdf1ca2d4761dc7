//! Thin and safe OpenCL API function wrappers.
//!
// ### Error Handling Notes
//
// All forwarded calls use the same error type `ApiError`, carrying the raw
// status code verbatim along with the API function name. Error messages
// include a link to the relevant Khronos reference page.

use std::ffi::{CStr, CString};
use std::mem;
use std::ptr;
use std::slice;

use crate::callback::{callbacks, Callback, ContextErrorCallback, UserData};
use crate::error::{ApiError, Error, Result as OclResult};
use crate::ffi::{self, c_char, c_void, size_t, cl_command_queue, cl_context,
    cl_context_properties, cl_device_id, cl_event, cl_int, cl_mem, cl_platform_id,
    cl_program, cl_uint, CreateContextCallbackFn, ContextDestructorCallbackFn,
    EventCallbackFn, MemDestructorCallbackFn, NativeKernelFn, ProgramCallbackFn,
    SvmFreeCallbackFn, CL_SUCCESS};
use crate::host_mem::{resolve_host_ptr, HostMem};
use crate::types::abs::{CommandQueue, Context, DeviceId, Event, Mem, PlatformId, Program};
use crate::types::enums::{CommandExecutionStatus, CommandQueueProperties, DeviceType,
    MemFlags, SvmMemFlags};
use crate::types::structs::ContextProperties;

//============================================================================
//=============================== CALLBACKS ==================================
//============================================================================
//
// One trampoline per callback kind, each directly callable by the native
// runtime from any of its threads. A trampoline performs exactly one
// resolve-then-invoke against the process-wide registry; one-shot kinds
// delete their registry entry before returning.

/// Context error notifications. Multi-fire; drops silently if the
/// registration was released while a notification was in flight.
pub extern "C" fn _context_error_callback(errinfo: *const c_char,
        private_info: *const c_void, cb: size_t, user_data: *mut c_void) {
    unsafe { callbacks().notify_context_error(errinfo, private_info, cb, user_data) }
}

pub extern "C" fn _context_destructor_callback(_context: cl_context,
        user_data: *mut c_void) {
    unsafe { callbacks().complete_context_destructor(user_data) }
}

pub extern "C" fn _program_build_callback(_program: cl_program, user_data: *mut c_void) {
    unsafe { callbacks().complete_program_build(user_data) }
}

pub extern "C" fn _program_compile_callback(_program: cl_program, user_data: *mut c_void) {
    unsafe { callbacks().complete_program_compile(user_data) }
}

/// Unlike build/compile, the link callback carries the resulting program.
pub extern "C" fn _program_link_callback(program: cl_program, user_data: *mut c_void) {
    unsafe { callbacks().complete_program_link(program, user_data) }
}

pub extern "C" fn _program_release_callback(_program: cl_program, user_data: *mut c_void) {
    unsafe { callbacks().complete_program_release(user_data) }
}

pub extern "C" fn _mem_object_destructor_callback(_memobj: cl_mem, user_data: *mut c_void) {
    unsafe { callbacks().complete_mem_object_destructor(user_data) }
}

pub extern "C" fn _event_status_callback(_event: cl_event, exec_status: cl_int,
        user_data: *mut c_void) {
    unsafe { callbacks().complete_event_status(exec_status, user_data) }
}

pub extern "C" fn _svm_free_callback(queue: cl_command_queue, num_svm_pointers: cl_uint,
        svm_pointers: *mut *mut c_void, user_data: *mut c_void) {
    unsafe { callbacks().complete_svm_free(queue, num_svm_pointers, svm_pointers, user_data) }
}

/// The native-kernel entry point has no user-data slot of its own; the cell
/// address rides as the first word of the packed argument block.
pub extern "C" fn _native_kernel_callback(args: *mut c_void) {
    unsafe { callbacks().run_native_kernel(args) }
}

//============================================================================
//================================ SUPPORT ===================================
//============================================================================

/// Evaluates `errcode` and returns an `Err` if it is not `CL_SUCCESS`.
#[inline(always)]
fn eval_errcode<T, S>(errcode: cl_int, result: T, fn_name: &'static str,
        fn_info: Option<S>) -> OclResult<T>
        where S: Into<String> {
    if errcode == CL_SUCCESS {
        Ok(result)
    } else {
        Err(ApiError::new(errcode, fn_name, fn_info).into())
    }
}

fn require<T: Copy>(f: Option<T>, fn_name: &'static str) -> OclResult<T> {
    f.ok_or(Error::ApiUnavailable(fn_name))
}

fn wait_list_parts(wait_list: &[Event]) -> (cl_uint, *const cl_event) {
    if wait_list.is_empty() {
        (0, ptr::null())
    } else {
        (wait_list.len() as cl_uint, wait_list.as_ptr() as *const cl_event)
    }
}

fn new_event_ptr(new_event: Option<&mut Event>) -> *mut cl_event {
    match new_event {
        Some(event) => event as *mut Event as *mut cl_event,
        None => ptr::null_mut(),
    }
}

fn device_list_parts(device_ids: Option<&[DeviceId]>) -> (cl_uint, *const cl_device_id) {
    match device_ids {
        Some(ids) if !ids.is_empty() =>
            (ids.len() as cl_uint, ids.as_ptr() as *const cl_device_id),
        _ => (0, ptr::null()),
    }
}

fn user_data_parts(user_data: &Option<UserData>) -> *mut c_void {
    match user_data {
        Some(ud) => ud.as_ptr(),
        None => ptr::null_mut(),
    }
}

/// Releases a registration whose native call failed, so a failed
/// registration-then-call never leaks an entry or its cell.
fn release_on_error(user_data: Option<UserData>) {
    if let Some(ud) = user_data {
        callbacks().release(ud);
    }
}

//============================================================================
//========================= PLATFORMS AND DEVICES ============================
//============================================================================

/// Returns a list of available platforms.
pub fn get_platform_ids() -> OclResult<Vec<PlatformId>> {
    let api = ffi::api()?;
    let mut count: cl_uint = 0;
    let errcode = unsafe { (api.clGetPlatformIDs)(0, ptr::null_mut(), &mut count) };
    eval_errcode(errcode, (), "clGetPlatformIDs", None::<String>)?;
    if count == 0 {
        return Ok(Vec::with_capacity(0));
    }
    let mut ids = vec![PlatformId::null(); count as usize];
    let errcode = unsafe {
        (api.clGetPlatformIDs)(count, ids.as_mut_ptr() as *mut cl_platform_id,
            ptr::null_mut())
    };
    eval_errcode(errcode, ids, "clGetPlatformIDs", None::<String>)
}

/// Returns the devices of `platform` matching `device_type`
/// (`DeviceType::ALL` if unspecified).
pub fn get_device_ids(platform: PlatformId, device_type: Option<DeviceType>)
        -> OclResult<Vec<DeviceId>> {
    let api = ffi::api()?;
    let device_type = device_type.unwrap_or_default();
    let mut count: cl_uint = 0;
    let errcode = unsafe {
        (api.clGetDeviceIDs)(platform.as_ptr(), device_type.bits(), 0,
            ptr::null_mut(), &mut count)
    };
    eval_errcode(errcode, (), "clGetDeviceIDs", None::<String>)?;
    if count == 0 {
        return Ok(Vec::with_capacity(0));
    }
    let mut ids = vec![DeviceId::null(); count as usize];
    let errcode = unsafe {
        (api.clGetDeviceIDs)(platform.as_ptr(), device_type.bits(), count,
            ids.as_mut_ptr() as *mut cl_device_id, ptr::null_mut())
    };
    eval_errcode(errcode, ids, "clGetDeviceIDs", None::<String>)
}

//============================================================================
//=============================== CONTEXTS ===================================
//============================================================================

/// Creates a context for the specified devices.
///
/// If `error_callback` is given, its handler receives asynchronous error
/// notifications for this context, on arbitrary runtime threads, until the
/// context is destroyed. The registration outlives this call and is
/// released by the caller (see [`ContextErrorCallback::release`]).
pub fn create_context(properties: Option<&ContextProperties>, device_ids: &[DeviceId],
        error_callback: Option<&ContextErrorCallback>) -> OclResult<Context> {
    if device_ids.is_empty() {
        return Err(Error::DeviceListEmpty);
    }
    let api = ffi::api()?;
    let properties_raw = properties.map(|p| p.to_raw()).unwrap_or_default();
    let properties_ptr = if properties_raw.is_empty() {
        ptr::null()
    } else {
        properties_raw.as_ptr() as *const cl_context_properties
    };
    let (pfn_notify, user_data_ptr): (Option<CreateContextCallbackFn>, *mut c_void) =
        match error_callback {
            Some(cb) => (Some(_context_error_callback), cb.as_ptr()),
            None => (None, ptr::null_mut()),
        };
    let mut errcode: cl_int = 0;
    let context_ptr = unsafe {
        (api.clCreateContext)(
            properties_ptr,
            device_ids.len() as cl_uint,
            device_ids.as_ptr() as *const cl_device_id,
            pfn_notify,
            user_data_ptr,
            &mut errcode,
        )
    };
    eval_errcode(errcode, context_ptr, "clCreateContext", None::<String>)
        .map(|ctx_ptr| unsafe { Context::from_raw(ctx_ptr) })
}

/// Creates a context for all devices of a specific type. Platform is
/// specified in `properties`.
pub fn create_context_from_type(properties: Option<&ContextProperties>,
        device_type: DeviceType, error_callback: Option<&ContextErrorCallback>)
        -> OclResult<Context> {
    let api = ffi::api()?;
    let properties_raw = properties.map(|p| p.to_raw()).unwrap_or_default();
    let properties_ptr = if properties_raw.is_empty() {
        ptr::null()
    } else {
        properties_raw.as_ptr() as *const cl_context_properties
    };
    let (pfn_notify, user_data_ptr): (Option<CreateContextCallbackFn>, *mut c_void) =
        match error_callback {
            Some(cb) => (Some(_context_error_callback), cb.as_ptr()),
            None => (None, ptr::null_mut()),
        };
    let mut errcode: cl_int = 0;
    let context_ptr = unsafe {
        (api.clCreateContextFromType)(
            properties_ptr,
            device_type.bits(),
            pfn_notify,
            user_data_ptr,
            &mut errcode,
        )
    };
    eval_errcode(errcode, context_ptr, "clCreateContextFromType", None::<String>)
        .map(|ctx_ptr| unsafe { Context::from_raw(ctx_ptr) })
}

/// Increments the reference count of a context.
pub unsafe fn retain_context(context: Context) -> OclResult<()> {
    let api = ffi::api()?;
    eval_errcode((api.clRetainContext)(context.as_ptr()), (),
        "clRetainContext", None::<String>)
}

/// Decrements the reference count of a context.
pub unsafe fn release_context(context: Context) -> OclResult<()> {
    let api = ffi::api()?;
    eval_errcode((api.clReleaseContext)(context.as_ptr()), (),
        "clReleaseContext", None::<String>)
}

/// Registers a destructor callback, invoked exactly once when `context` is
/// being destroyed. Callbacks registered on the same context run in reverse
/// registration order, on an arbitrary runtime thread.
///
/// Since: 3.0
pub fn set_context_destructor_callback<F>(context: Context, callback: F) -> OclResult<()>
        where F: FnOnce() + Send + 'static {
    let api = ffi::api()?;
    let f = require(api.clSetContextDestructorCallback, "clSetContextDestructorCallback")?;
    let user_data = callbacks().register(Callback::ContextDestructor(Box::new(callback)))?;
    let errcode = unsafe {
        f(context.as_ptr(),
            Some(_context_destructor_callback as ContextDestructorCallbackFn),
            user_data.as_ptr())
    };
    if errcode != CL_SUCCESS {
        callbacks().release(user_data);
        return eval_errcode(errcode, (), "clSetContextDestructorCallback", None::<String>);
    }
    Ok(())
}

//============================================================================
//============================ COMMAND QUEUES ================================
//============================================================================

/// Creates a command queue on `device`.
pub fn create_command_queue(context: Context, device: DeviceId,
        properties: Option<CommandQueueProperties>) -> OclResult<CommandQueue> {
    let api = ffi::api()?;
    let properties = properties.map(|p| p.bits()).unwrap_or(0);
    let mut errcode: cl_int = 0;
    let queue_ptr = unsafe {
        (api.clCreateCommandQueue)(context.as_ptr(), device.as_ptr(), properties,
            &mut errcode)
    };
    eval_errcode(errcode, queue_ptr, "clCreateCommandQueue", None::<String>)
        .map(|ptr| unsafe { CommandQueue::from_raw(ptr) })
}

/// Creates a command queue via the properties-list entry point.
///
/// Since: 2.0
pub fn create_command_queue_with_properties(context: Context, device: DeviceId,
        properties: Option<CommandQueueProperties>) -> OclResult<CommandQueue> {
    let api = ffi::api()?;
    let f = require(api.clCreateCommandQueueWithProperties,
        "clCreateCommandQueueWithProperties")?;
    let properties_raw: Vec<ffi::cl_queue_properties> = match properties {
        Some(p) => vec![ffi::CL_QUEUE_PROPERTIES, p.bits(), 0],
        None => Vec::with_capacity(0),
    };
    let properties_ptr = if properties_raw.is_empty() {
        ptr::null()
    } else {
        properties_raw.as_ptr()
    };
    let mut errcode: cl_int = 0;
    let queue_ptr = unsafe {
        f(context.as_ptr(), device.as_ptr(), properties_ptr, &mut errcode)
    };
    eval_errcode(errcode, queue_ptr, "clCreateCommandQueueWithProperties", None::<String>)
        .map(|ptr| unsafe { CommandQueue::from_raw(ptr) })
}

pub unsafe fn retain_command_queue(queue: CommandQueue) -> OclResult<()> {
    let api = ffi::api()?;
    eval_errcode((api.clRetainCommandQueue)(queue.as_ptr()), (),
        "clRetainCommandQueue", None::<String>)
}

pub unsafe fn release_command_queue(queue: CommandQueue) -> OclResult<()> {
    let api = ffi::api()?;
    eval_errcode((api.clReleaseCommandQueue)(queue.as_ptr()), (),
        "clReleaseCommandQueue", None::<String>)
}

/// Issues all previously queued commands to the device.
pub fn flush(queue: CommandQueue) -> OclResult<()> {
    let api = ffi::api()?;
    eval_errcode(unsafe { (api.clFlush)(queue.as_ptr()) }, (), "clFlush", None::<String>)
}

/// Blocks until all previously queued commands have completed.
pub fn finish(queue: CommandQueue) -> OclResult<()> {
    let api = ffi::api()?;
    eval_errcode(unsafe { (api.clFinish)(queue.as_ptr()) }, (), "clFinish", None::<String>)
}

//============================================================================
//============================ MEMORY OBJECTS ================================
//============================================================================

/// Creates a buffer object.
///
/// `host_data` participates per `flags` (`USE_HOST_PTR`/`COPY_HOST_PTR`/..).
/// With `USE_HOST_PTR` the runtime keeps the address for the buffer's
/// lifetime, so the range must resolve as fixed.
pub unsafe fn create_buffer(context: Context, flags: MemFlags, size: usize,
        host_data: Option<&HostMem>) -> OclResult<Mem> {
    let api = ffi::api()?;
    let require_stable = flags.contains(MemFlags::USE_HOST_PTR);
    let host_ptr = resolve_host_ptr(host_data, require_stable, "host_data");
    let mut errcode: cl_int = 0;
    let mem_ptr = (api.clCreateBuffer)(context.as_ptr(), flags.bits(),
        size as size_t, host_ptr, &mut errcode);
    eval_errcode(errcode, mem_ptr, "clCreateBuffer", None::<String>)
        .map(|ptr| Mem::from_raw(ptr))
}

pub unsafe fn retain_mem_object(mem: Mem) -> OclResult<()> {
    let api = ffi::api()?;
    eval_errcode((api.clRetainMemObject)(mem.as_ptr()), (),
        "clRetainMemObject", None::<String>)
}

pub unsafe fn release_mem_object(mem: Mem) -> OclResult<()> {
    let api = ffi::api()?;
    eval_errcode((api.clReleaseMemObject)(mem.as_ptr()), (),
        "clReleaseMemObject", None::<String>)
}

/// Registers a destructor callback, invoked exactly once when `mem` is
/// about to be deleted. Callbacks registered on the same object run in
/// reverse registration order.
pub fn set_mem_object_destructor_callback<F>(mem: Mem, callback: F) -> OclResult<()>
        where F: FnOnce() + Send + 'static {
    let api = ffi::api()?;
    let user_data = callbacks().register(
        Callback::MemObjectDestructor(Box::new(callback)))?;
    let errcode = unsafe {
        (api.clSetMemObjectDestructorCallback)(mem.as_ptr(),
            Some(_mem_object_destructor_callback as MemDestructorCallbackFn),
            user_data.as_ptr())
    };
    if errcode != CL_SUCCESS {
        callbacks().release(user_data);
        return eval_errcode(errcode, (), "clSetMemObjectDestructorCallback",
            None::<String>);
    }
    Ok(())
}

/// Enqueues a read from `mem` into `data`.
///
/// A non-blocking read keeps the destination address after this call
/// returns, so `data` must then resolve as fixed and stay alive until the
/// read's event completes.
pub unsafe fn enqueue_read_buffer(queue: CommandQueue, mem: Mem, blocking: bool,
        offset: usize, data: &HostMem, wait_list: &[Event],
        new_event: Option<&mut Event>) -> OclResult<()> {
    let api = ffi::api()?;
    let data_ptr = resolve_host_ptr(Some(data), !blocking, "data");
    let (wl_count, wl_ptr) = wait_list_parts(wait_list);
    let errcode = (api.clEnqueueReadBuffer)(
        queue.as_ptr(),
        mem.as_ptr(),
        blocking as ffi::cl_bool,
        offset as size_t,
        data.size() as size_t,
        data_ptr,
        wl_count,
        wl_ptr,
        new_event_ptr(new_event),
    );
    eval_errcode(errcode, (), "clEnqueueReadBuffer", None::<String>)
}

/// Enqueues a write from `data` into `mem`. Same stability contract as
/// [`enqueue_read_buffer`].
pub unsafe fn enqueue_write_buffer(queue: CommandQueue, mem: Mem, blocking: bool,
        offset: usize, data: &HostMem, wait_list: &[Event],
        new_event: Option<&mut Event>) -> OclResult<()> {
    let api = ffi::api()?;
    let data_ptr = resolve_host_ptr(Some(data), !blocking, "data");
    let (wl_count, wl_ptr) = wait_list_parts(wait_list);
    let errcode = (api.clEnqueueWriteBuffer)(
        queue.as_ptr(),
        mem.as_ptr(),
        blocking as ffi::cl_bool,
        offset as size_t,
        data.size() as size_t,
        data_ptr as *const c_void,
        wl_count,
        wl_ptr,
        new_event_ptr(new_event),
    );
    eval_errcode(errcode, (), "clEnqueueWriteBuffer", None::<String>)
}

//============================================================================
//=============================== PROGRAMS ===================================
//============================================================================

/// Creates a program from source strings.
pub fn create_program_with_source(context: Context, src_strings: &[CString])
        -> OclResult<Program> {
    let api = ffi::api()?;
    let src_ptrs: Vec<*const c_char> = src_strings.iter().map(|s| s.as_ptr()).collect();
    let src_lens: Vec<size_t> = src_strings.iter()
        .map(|s| s.as_bytes().len() as size_t).collect();
    let mut errcode: cl_int = 0;
    let program_ptr = unsafe {
        (api.clCreateProgramWithSource)(context.as_ptr(), src_strings.len() as cl_uint,
            src_ptrs.as_ptr(), src_lens.as_ptr(), &mut errcode)
    };
    eval_errcode(errcode, program_ptr, "clCreateProgramWithSource", None::<String>)
        .map(|ptr| unsafe { Program::from_raw(ptr) })
}

pub unsafe fn retain_program(program: Program) -> OclResult<()> {
    let api = ffi::api()?;
    eval_errcode((api.clRetainProgram)(program.as_ptr()), (),
        "clRetainProgram", None::<String>)
}

pub unsafe fn release_program(program: Program) -> OclResult<()> {
    let api = ffi::api()?;
    eval_errcode((api.clReleaseProgram)(program.as_ptr()), (),
        "clReleaseProgram", None::<String>)
}

/// Builds (compiles and links) a program executable.
///
/// With a callback, the call may return before the build completes and the
/// callback fires exactly once, on an arbitrary runtime thread, whether the
/// build succeeded or failed. Without one, the call blocks until the build
/// has completed.
pub fn build_program(program: Program, device_ids: Option<&[DeviceId]>, options: &CStr,
        callback: Option<Box<dyn FnOnce() + Send>>) -> OclResult<()> {
    let api = ffi::api()?;
    let (pfn_notify, user_data): (Option<ProgramCallbackFn>, Option<UserData>) =
        match callback {
            Some(cb) => (Some(_program_build_callback),
                Some(callbacks().register(Callback::ProgramBuild(cb))?)),
            None => (None, None),
        };
    let (dev_count, dev_ptr) = device_list_parts(device_ids);
    let errcode = unsafe {
        (api.clBuildProgram)(program.as_ptr(), dev_count, dev_ptr, options.as_ptr(),
            pfn_notify, user_data_parts(&user_data))
    };
    if errcode != CL_SUCCESS {
        release_on_error(user_data);
        return eval_errcode(errcode, (), "clBuildProgram", None::<String>);
    }
    Ok(())
}

/// Compiles a program's source for the specified devices.
///
/// `input_headers` and `header_include_names` pair up by index. Callback
/// semantics are the same as [`build_program`].
pub fn compile_program(program: Program, device_ids: Option<&[DeviceId]>, options: &CStr,
        input_headers: &[Program], header_include_names: &[CString],
        callback: Option<Box<dyn FnOnce() + Send>>) -> OclResult<()> {
    assert_eq!(input_headers.len(), header_include_names.len(),
        "each input header needs exactly one include name");
    let api = ffi::api()?;
    let (pfn_notify, user_data): (Option<ProgramCallbackFn>, Option<UserData>) =
        match callback {
            Some(cb) => (Some(_program_compile_callback),
                Some(callbacks().register(Callback::ProgramCompile(cb))?)),
            None => (None, None),
        };
    let (dev_count, dev_ptr) = device_list_parts(device_ids);
    let header_ptrs: Vec<cl_program> = input_headers.iter().map(|h| h.as_ptr()).collect();
    let name_ptrs: Vec<*const c_char> = header_include_names.iter()
        .map(|n| n.as_ptr()).collect();
    let (headers_ptr, names_ptr) = if header_ptrs.is_empty() {
        (ptr::null(), ptr::null())
    } else {
        (header_ptrs.as_ptr(), name_ptrs.as_ptr())
    };
    let errcode = unsafe {
        (api.clCompileProgram)(program.as_ptr(), dev_count, dev_ptr, options.as_ptr(),
            header_ptrs.len() as cl_uint, headers_ptr, names_ptr, pfn_notify,
            user_data_parts(&user_data))
    };
    if errcode != CL_SUCCESS {
        release_on_error(user_data);
        return eval_errcode(errcode, (), "clCompileProgram", None::<String>);
    }
    Ok(())
}

/// Links compiled programs into an executable for the specified devices.
///
/// The returned program handle is valid either way; with a callback, the
/// callback additionally receives it once linking completes.
pub fn link_program(context: Context, device_ids: Option<&[DeviceId]>, options: &CStr,
        input_programs: &[Program],
        callback: Option<Box<dyn FnOnce(Program) + Send>>) -> OclResult<Program> {
    let api = ffi::api()?;
    let (pfn_notify, user_data): (Option<ProgramCallbackFn>, Option<UserData>) =
        match callback {
            Some(cb) => (Some(_program_link_callback),
                Some(callbacks().register(Callback::ProgramLink(cb))?)),
            None => (None, None),
        };
    let (dev_count, dev_ptr) = device_list_parts(device_ids);
    let program_ptrs: Vec<cl_program> = input_programs.iter().map(|p| p.as_ptr()).collect();
    let programs_ptr = if program_ptrs.is_empty() {
        ptr::null()
    } else {
        program_ptrs.as_ptr()
    };
    let mut errcode: cl_int = 0;
    let program_ptr = unsafe {
        (api.clLinkProgram)(context.as_ptr(), dev_count, dev_ptr, options.as_ptr(),
            program_ptrs.len() as cl_uint, programs_ptr, pfn_notify,
            user_data_parts(&user_data), &mut errcode)
    };
    if errcode != CL_SUCCESS {
        release_on_error(user_data);
        return eval_errcode(errcode, Program::null(), "clLinkProgram", None::<String>);
    }
    Ok(unsafe { Program::from_raw(program_ptr) })
}

/// Registers a hook invoked exactly once when `program` is about to be
/// released for the last time.
///
/// Since: 2.2 (extension entry point; not exported by every library)
pub fn set_program_release_callback<F>(program: Program, callback: F) -> OclResult<()>
        where F: FnOnce() + Send + 'static {
    let api = ffi::api()?;
    let f = require(api.clSetProgramReleaseCallback, "clSetProgramReleaseCallback")?;
    let user_data = callbacks().register(Callback::ProgramRelease(Box::new(callback)))?;
    let errcode = unsafe {
        f(program.as_ptr(), Some(_program_release_callback as ProgramCallbackFn),
            user_data.as_ptr())
    };
    if errcode != CL_SUCCESS {
        callbacks().release(user_data);
        return eval_errcode(errcode, (), "clSetProgramReleaseCallback", None::<String>);
    }
    Ok(())
}

//============================================================================
//================================ EVENTS ====================================
//============================================================================

/// Creates a user event. Its initial execution status is `Submitted`.
pub fn create_user_event(context: Context) -> OclResult<Event> {
    let api = ffi::api()?;
    let mut errcode: cl_int = 0;
    let event_ptr = unsafe { (api.clCreateUserEvent)(context.as_ptr(), &mut errcode) };
    eval_errcode(errcode, event_ptr, "clCreateUserEvent", None::<String>)
        .map(|ptr| unsafe { Event::from_raw(ptr) })
}

/// Sets the execution status of a user event: `CL_COMPLETE`, or a negative
/// error code. May be called only once per event.
pub fn set_user_event_status(event: Event, execution_status: cl_int) -> OclResult<()> {
    let api = ffi::api()?;
    eval_errcode(unsafe { (api.clSetUserEventStatus)(event.as_ptr(), execution_status) },
        (), "clSetUserEventStatus", None::<String>)
}

/// Registers a callback for a command execution status transition of
/// `event` (`Submitted`, `Running` or `Complete`).
///
/// The callback fires exactly once for the registered transition, on an
/// arbitrary runtime thread. It receives `Ok(())` when the transition was
/// reached normally, or `Err` wrapping the negative status code verbatim
/// when execution was abnormally terminated.
pub fn set_event_callback<F>(event: Event, callback_type: CommandExecutionStatus,
        callback: F) -> OclResult<()>
        where F: FnOnce(std::result::Result<(), ApiError>) + Send + 'static {
    let api = ffi::api()?;
    let user_data = callbacks().register(Callback::EventStatus(Box::new(callback)))?;
    let errcode = unsafe {
        (api.clSetEventCallback)(event.as_ptr(), callback_type.to_i32(),
            Some(_event_status_callback as EventCallbackFn), user_data.as_ptr())
    };
    if errcode != CL_SUCCESS {
        callbacks().release(user_data);
        return eval_errcode(errcode, (), "clSetEventCallback",
            Some(format!("callback_type: {:?}", callback_type)));
    }
    Ok(())
}

pub unsafe fn retain_event(event: Event) -> OclResult<()> {
    let api = ffi::api()?;
    eval_errcode((api.clRetainEvent)(event.as_ptr()), (), "clRetainEvent", None::<String>)
}

pub unsafe fn release_event(event: Event) -> OclResult<()> {
    let api = ffi::api()?;
    eval_errcode((api.clReleaseEvent)(event.as_ptr()), (), "clReleaseEvent", None::<String>)
}

/// Blocks until all events in `wait_list` have completed.
pub fn wait_for_events(wait_list: &[Event]) -> OclResult<()> {
    let api = ffi::api()?;
    let (wl_count, wl_ptr) = wait_list_parts(wait_list);
    eval_errcode(unsafe { (api.clWaitForEvents)(wl_count, wl_ptr) }, (),
        "clWaitForEvents", None::<String>)
}

//============================================================================
//================================== SVM =====================================
//============================================================================

/// Allocates a shared virtual memory buffer. `alignment` of zero means the
/// largest supported type alignment.
///
/// Since: 2.0
pub fn svm_alloc(context: Context, flags: SvmMemFlags, size: usize, alignment: u32)
        -> OclResult<*mut c_void> {
    let api = ffi::api()?;
    let f = require(api.clSVMAlloc, "clSVMAlloc")?;
    let ptr = unsafe { f(context.as_ptr(), flags.bits(), size as size_t, alignment) };
    if ptr.is_null() {
        // The entry point reports failure by returning null only.
        return Err(Error::OutOfMemory);
    }
    Ok(ptr)
}

/// Frees an SVM buffer immediately. Does not wait for enqueued commands
/// that may still be using `ptr`; synchronizing those is the caller's
/// responsibility (or use [`enqueue_svm_free`]).
///
/// Since: 2.0
pub unsafe fn svm_free(context: Context, ptr: *mut c_void) -> OclResult<()> {
    let api = ffi::api()?;
    let f = require(api.clSVMFree, "clSVMFree")?;
    f(context.as_ptr(), ptr);
    Ok(())
}

/// Enqueues a command to free SVM buffers once prior commands complete.
///
/// With a callback, the pointers are instead handed to it (exactly once, on
/// an arbitrary runtime thread) and the callback performs the frees; the
/// pointer list view it receives is valid only for that call.
///
/// Since: 2.0
pub unsafe fn enqueue_svm_free(queue: CommandQueue, ptrs: &[*mut c_void],
        callback: Option<Box<dyn FnOnce(CommandQueue, &[*mut c_void]) + Send>>,
        wait_list: &[Event], new_event: Option<&mut Event>) -> OclResult<()> {
    let api = ffi::api()?;
    let f = require(api.clEnqueueSVMFree, "clEnqueueSVMFree")?;
    let (pfn_notify, user_data): (Option<SvmFreeCallbackFn>, Option<UserData>) =
        match callback {
            Some(cb) => (Some(_svm_free_callback),
                Some(callbacks().register(Callback::SvmFree(cb))?)),
            None => (None, None),
        };
    // The runtime copies the pointer list at enqueue time.
    let mut ptr_list: Vec<*mut c_void> = ptrs.to_vec();
    let ptrs_ptr = if ptr_list.is_empty() {
        ptr::null_mut()
    } else {
        ptr_list.as_mut_ptr()
    };
    let (wl_count, wl_ptr) = wait_list_parts(wait_list);
    let errcode = f(queue.as_ptr(), ptr_list.len() as cl_uint, ptrs_ptr, pfn_notify,
        user_data_parts(&user_data), wl_count, wl_ptr, new_event_ptr(new_event));
    if errcode != CL_SUCCESS {
        release_on_error(user_data);
        return eval_errcode(errcode, (), "clEnqueueSVMFree", None::<String>);
    }
    Ok(())
}

//============================================================================
//============================ NATIVE KERNELS ================================
//============================================================================

/// Enqueues a command to execute a host function instead of a compiled
/// kernel.
///
/// `callback` fires exactly once on a runtime thread and receives one
/// pointer per entry of `mem_objects`, each resolved to the global memory
/// backing that object for the duration of the call.
///
/// The packed argument block the runtime copies at enqueue time is laid out
/// as `[cell_address, mem_slot_0, .., mem_slot_n-1]`; the runtime patches
/// each `mem_slot` with the resolved address before invoking the
/// trampoline.
pub fn enqueue_native_kernel(queue: CommandQueue,
        callback: Box<dyn FnOnce(&[*mut c_void]) + Send>, mem_objects: &[Mem],
        wait_list: &[Event], new_event: Option<&mut Event>) -> OclResult<()> {
    let api = ffi::api()?;
    let num_mems = mem_objects.len();
    let wrapped: Box<dyn FnOnce(*const c_void) + Send> = Box::new(move |arg_base| {
        let mem_ptrs = if num_mems == 0 {
            &[]
        } else {
            unsafe { slice::from_raw_parts(arg_base as *const *mut c_void, num_mems) }
        };
        callback(mem_ptrs);
    });
    let user_data = callbacks().register(Callback::NativeKernel(wrapped))?;

    let mut raw_args: Vec<usize> = vec![0; num_mems + 1];
    raw_args[0] = user_data.as_ptr() as usize;
    let args_size = raw_args.len() * mem::size_of::<usize>();
    let args_base = raw_args.as_mut_ptr();
    let mem_locs: Vec<*const c_void> = (0..num_mems)
        .map(|i| unsafe { args_base.add(1 + i) } as *const c_void)
        .collect();
    let (mems_ptr, locs_ptr) = if num_mems == 0 {
        (ptr::null(), ptr::null())
    } else {
        (mem_objects.as_ptr() as *const cl_mem, mem_locs.as_ptr())
    };
    let (wl_count, wl_ptr) = wait_list_parts(wait_list);
    let errcode = unsafe {
        (api.clEnqueueNativeKernel)(
            queue.as_ptr(),
            Some(_native_kernel_callback as NativeKernelFn),
            args_base as *mut c_void,
            args_size as size_t,
            num_mems as cl_uint,
            mems_ptr,
            locs_ptr,
            wl_count,
            wl_ptr,
            new_event_ptr(new_event),
        )
    };
    if errcode != CL_SUCCESS {
        release_on_error(Some(user_data));
        return eval_errcode(errcode, (), "clEnqueueNativeKernel", None::<String>);
    }
    Ok(())
}
