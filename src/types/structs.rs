//! Structured parameter builders.

use crate::ffi::{cl_context_properties, CL_CONTEXT_INTEROP_USER_SYNC, CL_CONTEXT_PLATFORM,
    CL_FALSE, CL_TRUE};
use crate::types::abs::PlatformId;

/// Context property list builder.
///
/// Encodes to the zero-terminated `[name, value, ..., 0]` array the context
/// creation entry points expect. An empty builder encodes to an empty list,
/// which is passed as a null pointer.
#[derive(Clone, Debug, Default)]
pub struct ContextProperties {
    props: Vec<(cl_context_properties, cl_context_properties)>,
}

impl ContextProperties {
    pub fn new() -> ContextProperties {
        ContextProperties { props: Vec::with_capacity(4) }
    }

    /// Specifies the platform to use.
    pub fn platform(mut self, platform: PlatformId) -> ContextProperties {
        self.props.push((CL_CONTEXT_PLATFORM, platform.as_ptr() as cl_context_properties));
        self
    }

    /// Specifies whether the user is responsible for synchronization between
    /// OpenCL and other APIs.
    pub fn interop_user_sync(mut self, sync: bool) -> ContextProperties {
        let raw = if sync { CL_TRUE } else { CL_FALSE } as cl_context_properties;
        self.props.push((CL_CONTEXT_INTEROP_USER_SYNC, raw));
        self
    }

    /// Returns the zero-terminated raw property list.
    pub fn to_raw(&self) -> Vec<cl_context_properties> {
        if self.props.is_empty() {
            return Vec::with_capacity(0);
        }
        let mut raw = Vec::with_capacity(self.props.len() * 2 + 1);
        for &(name, value) in &self.props {
            raw.push(name);
            raw.push(value);
        }
        raw.push(0);
        raw
    }
}
