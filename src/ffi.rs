//! FFI bindings for tabletrack
//!
//! This module provides C-compatible functions for driving the tracking core
//! from a presentation layer written in another language. Strings are
//! null-terminated; strings returned by this library must be freed with
//! `tabletrack_free_string`. Functions returning `i32` use 0 for success and
//! -1 for failure, with the message available from `tabletrack_last_error`.

use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use chrono::{TimeZone, Utc};

use crate::activation::ContentKind;
use crate::catalog::Catalog;
use crate::config::TrackerConfig;
use crate::error::TrackingError;
use crate::pipeline::SurfaceProcessor;
use crate::tracker::InstanceId;

thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

/// Opaque handle to a SurfaceProcessor
pub struct TabletrackProcessorHandle {
    processor: SurfaceProcessor,
}

/// Borrow the processor behind a handle, recording an error for NULL
unsafe fn handle_mut<'a>(
    processor: *mut TabletrackProcessorHandle,
) -> Option<&'a mut SurfaceProcessor> {
    if processor.is_null() {
        set_last_error("Null processor pointer");
        return None;
    }
    Some(&mut (*processor).processor)
}

/// Map a unit result onto the 0 / -1 convention
fn status(result: Result<(), TrackingError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

fn build_processor(
    config_json: Option<String>,
    catalog_json: Option<String>,
) -> Result<SurfaceProcessor, TrackingError> {
    let config = match config_json {
        Some(json) => TrackerConfig::from_json(&json)?,
        None => TrackerConfig::default(),
    };
    let catalog = match catalog_json {
        Some(json) => Catalog::from_json(&json)?,
        None => Catalog::default(),
    };
    SurfaceProcessor::with_config(config, catalog)
}

// ============================================================================
// Processor lifecycle
// ============================================================================

/// Create a new processor.
///
/// # Safety
/// - `config_json` and `catalog_json` must each be NULL (use the defaults) or
///   a valid null-terminated C string.
/// - Returns a pointer that must be freed with `tabletrack_processor_free`.
/// - Returns NULL on error; call `tabletrack_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn tabletrack_processor_new(
    config_json: *const c_char,
    catalog_json: *const c_char,
) -> *mut TabletrackProcessorHandle {
    clear_last_error();

    let config = if config_json.is_null() {
        None
    } else {
        match cstr_to_string(config_json) {
            Some(s) => Some(s),
            None => {
                set_last_error("Invalid config string pointer");
                return ptr::null_mut();
            }
        }
    };
    let catalog = if catalog_json.is_null() {
        None
    } else {
        match cstr_to_string(catalog_json) {
            Some(s) => Some(s),
            None => {
                set_last_error("Invalid catalog string pointer");
                return ptr::null_mut();
            }
        }
    };

    match build_processor(config, catalog) {
        Ok(processor) => Box::into_raw(Box::new(TabletrackProcessorHandle { processor })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a processor.
///
/// # Safety
/// - `processor` must be a pointer returned by `tabletrack_processor_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn tabletrack_processor_free(processor: *mut TabletrackProcessorHandle) {
    if !processor.is_null() {
        drop(Box::from_raw(processor));
    }
}

// ============================================================================
// Contact events
// ============================================================================

/// A contact went down.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `tabletrack_processor_new`.
#[no_mangle]
pub unsafe extern "C" fn tabletrack_contact_start(
    processor: *mut TabletrackProcessorHandle,
    contact_id: u64,
    x: f64,
    y: f64,
) -> i32 {
    clear_last_error();
    match handle_mut(processor) {
        Some(p) => {
            p.contact_start(contact_id, x, y);
            0
        }
        None => -1,
    }
}

/// A live contact moved. Unknown ids are ignored.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `tabletrack_processor_new`.
#[no_mangle]
pub unsafe extern "C" fn tabletrack_contact_move(
    processor: *mut TabletrackProcessorHandle,
    contact_id: u64,
    x: f64,
    y: f64,
) -> i32 {
    clear_last_error();
    match handle_mut(processor) {
        Some(p) => {
            p.contact_move(contact_id, x, y);
            0
        }
        None => -1,
    }
}

/// A contact lifted.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `tabletrack_processor_new`.
#[no_mangle]
pub unsafe extern "C" fn tabletrack_contact_end(
    processor: *mut TabletrackProcessorHandle,
    contact_id: u64,
) -> i32 {
    clear_last_error();
    match handle_mut(processor) {
        Some(p) => {
            p.contact_end(contact_id);
            0
        }
        None => -1,
    }
}

// ============================================================================
// Frames
// ============================================================================

/// Run one frame at `now_ms` (Unix milliseconds) and return the frame as JSON.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `tabletrack_processor_new`.
/// - Returns a newly allocated string that must be freed with `tabletrack_free_string`.
/// - Returns NULL on error; call `tabletrack_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn tabletrack_processor_tick(
    processor: *mut TabletrackProcessorHandle,
    now_ms: i64,
) -> *mut c_char {
    clear_last_error();

    let Some(p) = handle_mut(processor) else {
        return ptr::null_mut();
    };
    let Some(now) = Utc.timestamp_millis_opt(now_ms).single() else {
        set_last_error("Timestamp out of range");
        return ptr::null_mut();
    };

    match serde_json::to_string(&p.tick(now)) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

// ============================================================================
// Content activation
// ============================================================================

/// A panel switched content. `kind` is one of "info", "images", "location", "none".
///
/// # Safety
/// - `processor` must be a valid pointer returned by `tabletrack_processor_new`.
/// - `instance_id` and `kind` must be valid null-terminated C strings.
#[no_mangle]
pub unsafe extern "C" fn tabletrack_processor_content_changed(
    processor: *mut TabletrackProcessorHandle,
    instance_id: *const c_char,
    kind: *const c_char,
) -> i32 {
    clear_last_error();

    let Some(p) = handle_mut(processor) else {
        return -1;
    };
    let Some(id) = cstr_to_string(instance_id) else {
        set_last_error("Invalid instance_id string pointer");
        return -1;
    };
    let Some(kind) = cstr_to_string(kind) else {
        set_last_error("Invalid kind string pointer");
        return -1;
    };
    let kind: ContentKind = match serde_json::from_value(serde_json::Value::String(kind)) {
        Ok(kind) => kind,
        Err(e) => {
            set_last_error(&format!("Unknown content kind: {}", e));
            return -1;
        }
    };

    status(p.content_changed(&InstanceId::new(id), kind))
}

/// Give an instance the external effect `effect_key`.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `tabletrack_processor_new`.
/// - `instance_id` and `effect_key` must be valid null-terminated C strings.
#[no_mangle]
pub unsafe extern "C" fn tabletrack_processor_activate(
    processor: *mut TabletrackProcessorHandle,
    instance_id: *const c_char,
    effect_key: *const c_char,
) -> i32 {
    clear_last_error();

    let Some(p) = handle_mut(processor) else {
        return -1;
    };
    let Some(id) = cstr_to_string(instance_id) else {
        set_last_error("Invalid instance_id string pointer");
        return -1;
    };
    let Some(effect_key) = cstr_to_string(effect_key) else {
        set_last_error("Invalid effect_key string pointer");
        return -1;
    };

    status(p.request_activation(&InstanceId::new(id), &effect_key))
}

/// Clear the effect if the instance owns it.
///
/// Returns 1 when the effect was cleared, 0 when the instance did not own it
/// and -1 on error.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `tabletrack_processor_new`.
/// - `instance_id` must be a valid null-terminated C string.
#[no_mangle]
pub unsafe extern "C" fn tabletrack_processor_deactivate(
    processor: *mut TabletrackProcessorHandle,
    instance_id: *const c_char,
) -> i32 {
    clear_last_error();

    let Some(p) = handle_mut(processor) else {
        return -1;
    };
    let Some(id) = cstr_to_string(instance_id) else {
        set_last_error("Invalid instance_id string pointer");
        return -1;
    };

    i32::from(p.request_deactivation(&InstanceId::new(id)))
}

/// Drop every tracked object and the active effect.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `tabletrack_processor_new`.
#[no_mangle]
pub unsafe extern "C" fn tabletrack_processor_reset(
    processor: *mut TabletrackProcessorHandle,
) -> i32 {
    clear_last_error();
    match handle_mut(processor) {
        Some(p) => {
            p.reset();
            0
        }
        None => -1,
    }
}

/// Toggle the calibration overlay data in frame output.
///
/// # Safety
/// - `processor` must be a valid pointer returned by `tabletrack_processor_new`.
#[no_mangle]
pub unsafe extern "C" fn tabletrack_processor_set_debug(
    processor: *mut TabletrackProcessorHandle,
    enabled: bool,
) -> i32 {
    clear_last_error();
    match handle_mut(processor) {
        Some(p) => {
            p.set_debug(enabled);
            0
        }
        None => -1,
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by tabletrack functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a tabletrack function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn tabletrack_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next tabletrack call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn tabletrack_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn tabletrack_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000_000;

    unsafe fn tick_json(processor: *mut TabletrackProcessorHandle, now_ms: i64) -> serde_json::Value {
        let result = tabletrack_processor_tick(processor, now_ms);
        assert!(!result.is_null());
        let value = serde_json::from_str(CStr::from_ptr(result).to_str().unwrap()).unwrap();
        tabletrack_free_string(result);
        value
    }

    unsafe fn place_four(processor: *mut TabletrackProcessorHandle) {
        for (id, (x, y)) in [(500.0, 500.0), (540.0, 500.0), (540.0, 540.0), (500.0, 540.0)]
            .into_iter()
            .enumerate()
        {
            assert_eq!(tabletrack_contact_start(processor, id as u64, x, y), 0);
        }
    }

    #[test]
    fn test_ffi_processor_lifecycle() {
        unsafe {
            let processor = tabletrack_processor_new(ptr::null(), ptr::null());
            assert!(!processor.is_null());

            place_four(processor);
            let frame = tick_json(processor, T0);
            assert_eq!(frame["items"][0]["type_id"], "prod_a");
            assert_eq!(frame["frame"], 1);
            let id = CString::new(frame["items"][0]["instance_id"].as_str().unwrap()).unwrap();

            let kind = CString::new("location").unwrap();
            assert_eq!(
                tabletrack_processor_content_changed(processor, id.as_ptr(), kind.as_ptr()),
                0
            );
            let frame = tick_json(processor, T0 + 16);
            assert_eq!(frame["active_effect"]["effect_key"], "karnataka");

            assert_eq!(tabletrack_processor_deactivate(processor, id.as_ptr()), 1);
            assert_eq!(tabletrack_processor_deactivate(processor, id.as_ptr()), 0);

            for contact in 0..4 {
                assert_eq!(tabletrack_contact_end(processor, contact), 0);
            }
            let frame = tick_json(processor, T0 + 32);
            assert_eq!(frame["items"][0]["status"], "ghost");

            assert_eq!(tabletrack_processor_reset(processor), 0);
            let frame = tick_json(processor, T0 + 48);
            assert_eq!(frame["items"].as_array().unwrap().len(), 0);

            tabletrack_processor_free(processor);
        }
    }

    #[test]
    fn test_ffi_debug_toggle() {
        unsafe {
            let processor = tabletrack_processor_new(ptr::null(), ptr::null());
            place_four(processor);

            assert!(tick_json(processor, T0).get("debug").is_none());
            assert_eq!(tabletrack_processor_set_debug(processor, true), 0);
            let frame = tick_json(processor, T0 + 16);
            assert_eq!(frame["debug"]["contacts"].as_array().unwrap().len(), 4);

            tabletrack_processor_free(processor);
        }
    }

    #[test]
    fn test_ffi_custom_config() {
        unsafe {
            let config = CString::new(r#"{"ghost_grace_ms": 500}"#).unwrap();
            let processor = tabletrack_processor_new(config.as_ptr(), ptr::null());
            assert!(!processor.is_null());

            place_four(processor);
            tick_json(processor, T0);
            for contact in 0..4 {
                tabletrack_contact_end(processor, contact);
            }
            assert_eq!(tick_json(processor, T0 + 400)["items"].as_array().unwrap().len(), 1);
            assert_eq!(tick_json(processor, T0 + 500)["items"].as_array().unwrap().len(), 0);

            tabletrack_processor_free(processor);
        }
    }

    #[test]
    fn test_ffi_error_handling() {
        unsafe {
            let bad = CString::new("not json").unwrap();
            let processor = tabletrack_processor_new(bad.as_ptr(), ptr::null());
            assert!(processor.is_null());

            let error = tabletrack_last_error();
            assert!(!error.is_null());
            assert!(!CStr::from_ptr(error).to_str().unwrap().is_empty());

            assert_eq!(tabletrack_contact_start(ptr::null_mut(), 1, 0.0, 0.0), -1);
            assert!(tabletrack_processor_tick(ptr::null_mut(), T0).is_null());

            let processor = tabletrack_processor_new(ptr::null(), ptr::null());
            let id = CString::new("prod_a-1").unwrap();
            let key = CString::new("karnataka").unwrap();
            assert_eq!(tabletrack_processor_activate(processor, id.as_ptr(), key.as_ptr()), -1);
            let message = CStr::from_ptr(tabletrack_last_error()).to_str().unwrap();
            assert!(message.contains("prod_a-1"));

            let kind = CString::new("video").unwrap();
            assert_eq!(
                tabletrack_processor_content_changed(processor, id.as_ptr(), kind.as_ptr()),
                -1
            );
            tabletrack_processor_free(processor);
        }
    }

    #[test]
    fn test_ffi_version() {
        unsafe {
            let version = tabletrack_version();
            assert!(!version.is_null());
            let version_str = CStr::from_ptr(version).to_str().unwrap();
            assert_eq!(version_str, env!("CARGO_PKG_VERSION"));
        }
    }
}
