//! Callback registry and dispatch tests.
//!
//! These call the registry's dispatch methods (and in a few cases the
//! `extern "C"` trampolines themselves) the way the native runtime would,
//! including from many threads at once.

use std::ffi::CString;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::callback::{callbacks, Callback, CallbackRegistry, ContextErrorCallback,
    FireMode, UserData};
use crate::ffi::{c_void, size_t};
use crate::functions::{_context_error_callback, _program_build_callback};
use crate::types::abs::{CommandQueue, Program};

/// Wraps a raw cell address so firing threads can carry it.
struct SendPtr(*mut c_void);
unsafe impl Send for SendPtr {}

#[test]
fn fire_modes_per_kind() {
    let multi = Callback::ContextError(Arc::new(|_, _| {}));
    assert_eq!(multi.fire_mode(), FireMode::MultiFire);

    let one_shots = vec![
        Callback::ContextDestructor(Box::new(|| {})),
        Callback::ProgramBuild(Box::new(|| {})),
        Callback::ProgramCompile(Box::new(|| {})),
        Callback::ProgramLink(Box::new(|_| {})),
        Callback::MemObjectDestructor(Box::new(|| {})),
        Callback::ProgramRelease(Box::new(|| {})),
        Callback::EventStatus(Box::new(|_| {})),
        Callback::SvmFree(Box::new(|_, _| {})),
        Callback::NativeKernel(Box::new(|_| {})),
    ];
    for cb in one_shots {
        assert_eq!(cb.fire_mode(), FireMode::OneShot, "kind: {}", cb.kind_name());
    }
}

#[test]
fn registrations_get_unique_cells_and_keys() {
    let registry = Arc::new(CallbackRegistry::new());
    let threads: Vec<_> = (0..16).map(|_| {
        let registry = registry.clone();
        thread::spawn(move || {
            (0..64).map(|_| {
                registry.register(Callback::ProgramBuild(Box::new(|| {}))).unwrap()
            }).collect::<Vec<UserData>>()
        })
    }).collect();

    let mut user_datas = Vec::with_capacity(16 * 64);
    for handle in threads {
        user_datas.extend(handle.join().unwrap());
    }
    assert_eq!(registry.len(), 16 * 64);

    let mut addrs: Vec<usize> = user_datas.iter().map(|ud| ud.as_ptr() as usize).collect();
    let mut keys: Vec<usize> = user_datas.iter().map(|ud| unsafe { ud.key() }).collect();
    addrs.sort_unstable();
    addrs.dedup();
    keys.sort_unstable();
    keys.dedup();
    assert_eq!(addrs.len(), 16 * 64);
    assert_eq!(keys.len(), 16 * 64);
    assert!(!keys.contains(&0));

    for ud in user_datas {
        registry.release(ud);
    }
    assert_eq!(registry.len(), 0);
}

#[test]
fn one_shot_round_trip_deletes_the_entry() {
    let registry = CallbackRegistry::new();
    let fired = Arc::new(AtomicUsize::new(0));
    let fired_in = fired.clone();
    let user_data = registry.register(Callback::ProgramBuild(Box::new(move || {
        fired_in.fetch_add(1, Ordering::SeqCst);
    }))).unwrap();
    let key = unsafe { user_data.key() };
    assert_eq!(registry.len(), 1);

    unsafe { registry.complete_program_build(user_data.as_ptr()) };

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(registry.len(), 0);
    assert!(registry.take(key).is_none());
}

#[test]
fn one_shot_fire_storm_runs_each_closure_exactly_once() {
    // 1,000 distinct registrations fired from 16 threads: each closure runs
    // exactly once and only for its own cell.
    const TOTAL: usize = 1_000;
    const THREADS: usize = 16;

    let registry = Arc::new(CallbackRegistry::new());
    let fire_counts: Arc<Vec<AtomicUsize>> =
        Arc::new((0..TOTAL).map(|_| AtomicUsize::new(0)).collect());

    let mut cells: Vec<SendPtr> = (0..TOTAL).map(|idx| {
        let fire_counts = fire_counts.clone();
        let ud = registry.register(Callback::ProgramBuild(Box::new(move || {
            fire_counts[idx].fetch_add(1, Ordering::SeqCst);
        }))).unwrap();
        SendPtr(ud.as_ptr())
    }).collect();
    assert_eq!(registry.len(), TOTAL);

    let mut batches: Vec<Vec<SendPtr>> = (0..THREADS).map(|_| Vec::new()).collect();
    for (idx, cell) in cells.drain(..).enumerate() {
        batches[idx % THREADS].push(cell);
    }
    let threads: Vec<_> = batches.into_iter().map(|batch| {
        let registry = registry.clone();
        thread::spawn(move || {
            for cell in batch {
                unsafe { registry.complete_program_build(cell.0) };
            }
        })
    }).collect();
    for handle in threads {
        handle.join().unwrap();
    }

    assert!(fire_counts.iter().all(|count| count.load(Ordering::SeqCst) == 1));
    assert_eq!(registry.len(), 0);
}

#[test]
fn context_error_entry_survives_fires_and_drops_silently_after_removal() {
    let registry = CallbackRegistry::new();
    let captured = Arc::new(Mutex::new(Vec::new()));
    let captured_in = captured.clone();
    let user_data = registry.register(Callback::ContextError(Arc::new(
        move |errinfo: &str, private: &[u8]| {
            captured_in.lock().unwrap().push((errinfo.to_owned(), private.to_vec()));
        }))).unwrap();

    let errinfo = CString::new("CL_OUT_OF_RESOURCES on queue").unwrap();
    let private = [0xDEu8, 0xAD, 0xBE, 0xEF];
    for _ in 0..3 {
        unsafe {
            registry.notify_context_error(errinfo.as_ptr(),
                private.as_ptr() as *const c_void, private.len() as size_t,
                user_data.as_ptr());
        }
    }
    assert_eq!(registry.len(), 1);
    {
        let captured = captured.lock().unwrap();
        assert_eq!(captured.len(), 3);
        assert_eq!(captured[0].0, "CL_OUT_OF_RESOURCES on queue");
        assert_eq!(captured[0].1.as_slice(), &private[..]);
    }

    // Remove the entry while keeping the cell alive, as if a notification
    // were racing the release.
    let key = unsafe { user_data.key() };
    assert!(registry.take(key).is_some());
    unsafe {
        registry.notify_context_error(errinfo.as_ptr(), ptr::null(), 0,
            user_data.as_ptr());
    }
    assert_eq!(captured.lock().unwrap().len(), 3);

    registry.release(user_data);
}

#[test]
fn context_error_handles_null_info_pointers() {
    let registry = CallbackRegistry::new();
    let captured = Arc::new(Mutex::new(Vec::new()));
    let captured_in = captured.clone();
    let user_data = registry.register(Callback::ContextError(Arc::new(
        move |errinfo: &str, private: &[u8]| {
            captured_in.lock().unwrap().push((errinfo.to_owned(), private.len()));
        }))).unwrap();

    unsafe { registry.notify_context_error(ptr::null(), ptr::null(), 0, user_data.as_ptr()) };
    unsafe { registry.notify_context_error(ptr::null(), ptr::null(), 0, ptr::null_mut()) };

    let captured = captured.lock().unwrap();
    assert_eq!(captured.as_slice(), &[(String::new(), 0)]);
    drop(captured);
    registry.release(user_data);
}

#[test]
fn released_key_is_never_reissued() {
    let registry = CallbackRegistry::new();
    let first = registry.register(Callback::ProgramCompile(Box::new(|| {}))).unwrap();
    let first_key = unsafe { first.key() };
    registry.release(first);

    let second = registry.register(Callback::ProgramCompile(Box::new(|| {}))).unwrap();
    let second_key = unsafe { second.key() };
    assert_ne!(first_key, second_key);

    let fired = Arc::new(AtomicUsize::new(0));
    let fired_in = fired.clone();
    let third = registry.register(Callback::ProgramCompile(Box::new(move || {
        fired_in.fetch_add(1, Ordering::SeqCst);
    }))).unwrap();
    unsafe { registry.complete_program_compile(third.as_ptr()) };
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    registry.release(second);
    assert_eq!(registry.len(), 0);
}

#[test]
fn event_status_maps_codes_to_results() {
    let registry = CallbackRegistry::new();

    let seen = Arc::new(Mutex::new(None));
    let seen_in = seen.clone();
    let user_data = registry.register(Callback::EventStatus(Box::new(move |result| {
        *seen_in.lock().unwrap() = Some(result);
    }))).unwrap();
    unsafe { registry.complete_event_status(-14, user_data.as_ptr()) };
    {
        let seen = seen.lock().unwrap();
        let err = seen.as_ref().unwrap().as_ref().unwrap_err();
        assert_eq!(err.status().0, -14);
    }

    let seen_ok = Arc::new(Mutex::new(None));
    let seen_in = seen_ok.clone();
    let user_data = registry.register(Callback::EventStatus(Box::new(move |result| {
        *seen_in.lock().unwrap() = Some(result);
    }))).unwrap();
    unsafe { registry.complete_event_status(0, user_data.as_ptr()) };
    assert!(seen_ok.lock().unwrap().as_ref().unwrap().is_ok());
    assert_eq!(registry.len(), 0);
}

#[test]
fn svm_free_passes_queue_and_pointer_list_in_order() {
    let registry = CallbackRegistry::new();
    let seen = Arc::new(Mutex::new(None));
    let seen_in = seen.clone();
    let user_data = registry.register(Callback::SvmFree(Box::new(
        move |queue: CommandQueue, ptrs: &[*mut c_void]| {
            let addrs: Vec<usize> = ptrs.iter().map(|&p| p as usize).collect();
            *seen_in.lock().unwrap() = Some((queue.as_ptr() as usize, addrs));
        }))).unwrap();

    let queue = 0xC0FFEEusize;
    let mut ptrs = [0x1000usize as *mut c_void, 0x2000usize as *mut c_void,
        0x3000usize as *mut c_void];
    unsafe {
        registry.complete_svm_free(queue as *mut c_void, ptrs.len() as u32,
            ptrs.as_mut_ptr(), user_data.as_ptr());
    }

    let seen = seen.lock().unwrap();
    let (seen_queue, seen_ptrs) = seen.as_ref().unwrap();
    assert_eq!(*seen_queue, queue);
    assert_eq!(seen_ptrs.as_slice(), &[0x1000, 0x2000, 0x3000]);
    assert_eq!(registry.len(), 0);
}

#[test]
fn native_kernel_reads_args_past_the_leading_cell_word() {
    let registry = CallbackRegistry::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_in = seen.clone();
    let user_data = registry.register(Callback::NativeKernel(Box::new(
        move |arg_base: *const c_void| {
            let words = arg_base as *const usize;
            let mut out = seen_in.lock().unwrap();
            out.push(unsafe { *words });
            out.push(unsafe { *words.add(1) });
        }))).unwrap();

    // Packed block as the enqueue call lays it out: cell address first,
    // then the argument words.
    let mut block = [user_data.as_ptr() as usize, 0x1111, 0x2222];
    unsafe { registry.run_native_kernel(block.as_mut_ptr() as *mut c_void) };

    assert_eq!(seen.lock().unwrap().as_slice(), &[0x1111, 0x2222]);
    assert_eq!(registry.len(), 0);
}

#[test]
fn program_link_passes_the_program_handle_through() {
    let registry = CallbackRegistry::new();
    let seen = Arc::new(Mutex::new(None));
    let seen_in = seen.clone();
    let user_data = registry.register(Callback::ProgramLink(Box::new(
        move |program: Program| {
            *seen_in.lock().unwrap() = Some(program.as_ptr() as usize);
        }))).unwrap();

    unsafe { registry.complete_program_link(0x7E57 as *mut c_void, user_data.as_ptr()) };
    assert_eq!(seen.lock().unwrap().unwrap(), 0x7E57);
}

#[test]
#[should_panic(expected = "already-released registration")]
fn one_shot_double_fire_is_fatal() {
    let registry = CallbackRegistry::new();
    let user_data = registry.register(Callback::MemObjectDestructor(Box::new(|| {}))).unwrap();
    let key = unsafe { user_data.key() };
    unsafe { registry.complete_mem_object_destructor(user_data.as_ptr()) };

    // Keep the entry (already gone) and give the dispatch a live cell
    // carrying the stale key, as a double fire would.
    let other = registry.register(Callback::MemObjectDestructor(Box::new(|| {}))).unwrap();
    unsafe { (other.as_ptr() as *mut usize).write(key) };
    unsafe { registry.complete_mem_object_destructor(other.as_ptr()) };
}

#[test]
#[should_panic(expected = "fired for a")]
fn one_shot_kind_mismatch_is_fatal() {
    let registry = CallbackRegistry::new();
    let user_data = registry.register(Callback::ProgramBuild(Box::new(|| {}))).unwrap();
    unsafe { registry.complete_context_destructor(user_data.as_ptr()) };
}

#[test]
fn trampolines_dispatch_through_the_process_registry() {
    let fired = Arc::new(AtomicUsize::new(0));
    let fired_in = fired.clone();
    let user_data = callbacks().register(Callback::ProgramBuild(Box::new(move || {
        fired_in.fetch_add(1, Ordering::SeqCst);
    }))).unwrap();

    _program_build_callback(ptr::null_mut(), user_data.as_ptr());
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn context_error_callback_wrapper_registers_and_releases() {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let captured_in = captured.clone();
    let callback = ContextErrorCallback::new(move |errinfo: &str, _private: &[u8]| {
        captured_in.lock().unwrap().push(errinfo.to_owned());
    }).unwrap();

    let errinfo = CString::new("device lost").unwrap();
    _context_error_callback(errinfo.as_ptr(), ptr::null(), 0, callback.as_ptr());
    _context_error_callback(errinfo.as_ptr(), ptr::null(), 0, callback.as_ptr());

    assert_eq!(captured.lock().unwrap().as_slice(),
        &["device lost".to_owned(), "device lost".to_owned()]);
    callback.release();
}
