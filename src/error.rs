//! Standard error and result types.

use std::fmt;

use crate::ffi::{cl_int, CL_SUCCESS};

/// cl30-core result type.
pub type Result<T> = std::result::Result<T, Error>;

/// A raw OpenCL status code, carried verbatim.
///
/// Codes are not remapped or named: extensions may define codes this wrapper
/// has never heard of, so the numeric presentation is the only one that
/// stays consistent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Status(pub cl_int);

impl Status {
    pub fn is_success(self) -> bool {
        self.0 == CL_SUCCESS
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

static SDK_DOCS_URL_PRE: &str = "https://registry.khronos.org/OpenCL/sdk/3.0/docs/man/html/";
static SDK_DOCS_URL_SUF: &str = ".html";

/// An error status returned by a forwarded OpenCL call.
#[derive(Clone)]
pub struct ApiError {
    status: Status,
    fn_name: &'static str,
    fn_info: Option<String>,
}

impl ApiError {
    pub fn new<S: Into<String>>(errcode: cl_int, fn_name: &'static str,
            fn_info: Option<S>) -> ApiError {
        ApiError {
            status: Status(errcode),
            fn_name,
            fn_info: fn_info.map(|s| s.into()),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn fn_name(&self) -> &'static str {
        self.fn_name
    }
}

impl std::error::Error for ApiError {}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let fn_info_string = if let Some(ref fn_info) = self.fn_info {
            format!(" (\"{}\")", fn_info)
        } else {
            String::with_capacity(0)
        };
        write!(f, "{}{} failed with status code {} [{}{}{}]",
            self.fn_name, fn_info_string, self.status,
            SDK_DOCS_URL_PRE, self.fn_name, SDK_DOCS_URL_SUF)
    }
}

impl fmt::Debug for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&self, f)
    }
}

/// An enum containing one of several error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Api: OpenCL function call error:
    #[error("{0}")]
    Api(#[from] ApiError),
    // OutOfMemory: a wrapper-side allocation failed. Returned before any
    // native call is attempted, so no call is ever made with a
    // half-constructed token:
    #[error("out of memory")]
    OutOfMemory,
    // LibraryLoad: the OpenCL library could not be opened, or a required
    // symbol is missing:
    #[error("unable to load the OpenCL library: {0}")]
    LibraryLoad(String),
    // ApiUnavailable: a 2.0+/3.0/extension entry point is not exported by
    // the loaded library:
    #[error("`{0}` is not available in the loaded OpenCL library")]
    ApiUnavailable(&'static str),
    #[error("device list is empty")]
    DeviceListEmpty,
    // FfiNul: Ffi string conversion error:
    #[error("{0}")]
    FfiNul(#[from] std::ffi::NulError),
}

impl Error {
    /// Returns the raw status code for `Api` variants.
    pub fn api_status(&self) -> Option<Status> {
        match *self {
            Error::Api(ref err) => Some(err.status()),
            _ => None,
        }
    }
}
