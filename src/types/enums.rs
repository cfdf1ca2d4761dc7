//! Enumerators and bitfields for forwarded parameters.
//!
//! Only the values the wrapper itself needs are defined here. Status codes
//! are deliberately not enumerated; they are carried verbatim (see
//! [`Status`](crate::Status)).

use crate::ffi::{cl_bitfield, cl_int, CL_COMPLETE, CL_QUEUED, CL_RUNNING, CL_SUBMITTED};

/// The execution status of a command, as reported to event callbacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandExecutionStatus {
    Complete = CL_COMPLETE as isize,
    Running = CL_RUNNING as isize,
    Submitted = CL_SUBMITTED as isize,
    Queued = CL_QUEUED as isize,
}

impl CommandExecutionStatus {
    /// Decodes a raw status value. Negative values are error codes, not
    /// execution statuses, and return `None` here.
    pub fn from_i32(val: cl_int) -> Option<CommandExecutionStatus> {
        match val {
            CL_COMPLETE => Some(CommandExecutionStatus::Complete),
            CL_RUNNING => Some(CommandExecutionStatus::Running),
            CL_SUBMITTED => Some(CommandExecutionStatus::Submitted),
            CL_QUEUED => Some(CommandExecutionStatus::Queued),
            _ => None,
        }
    }

    pub fn to_i32(self) -> cl_int {
        self as cl_int
    }
}

bitflags! {
    /// cl_device_type - bitfield
    pub struct DeviceType: cl_bitfield {
        const DEFAULT = 1;
        const CPU = 1 << 1;
        const GPU = 1 << 2;
        const ACCELERATOR = 1 << 3;
        const CUSTOM = 1 << 4;
        const ALL = 0xFFFF_FFFF;
    }
}

impl Default for DeviceType {
    fn default() -> DeviceType {
        DeviceType::ALL
    }
}

bitflags! {
    /// cl_mem_flags - bitfield
    pub struct MemFlags: cl_bitfield {
        const READ_WRITE = 1;
        const WRITE_ONLY = 1 << 1;
        const READ_ONLY = 1 << 2;
        const USE_HOST_PTR = 1 << 3;
        const ALLOC_HOST_PTR = 1 << 4;
        const COPY_HOST_PTR = 1 << 5;
        const HOST_WRITE_ONLY = 1 << 7;
        const HOST_READ_ONLY = 1 << 8;
        const HOST_NO_ACCESS = 1 << 9;
    }
}

bitflags! {
    /// cl_svm_mem_flags - bitfield
    ///
    /// Since: 2.0
    pub struct SvmMemFlags: cl_bitfield {
        const READ_WRITE = 1;
        const WRITE_ONLY = 1 << 1;
        const READ_ONLY = 1 << 2;
        const FINE_GRAIN_BUFFER = 1 << 10;
        const ATOMICS = 1 << 11;
    }
}

bitflags! {
    /// cl_command_queue_properties - bitfield
    pub struct CommandQueueProperties: cl_bitfield {
        const OUT_OF_ORDER_EXEC_MODE_ENABLE = 1;
        const PROFILING_ENABLE = 1 << 1;
        const ON_DEVICE = 1 << 2;
        const ON_DEVICE_DEFAULT = 1 << 3;
    }
}
