// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Kernel crypto API interface library - Error module

use thiserror::Error;

// Linux errno values. Kept local so the interface does not need libc on
// targets where only the mock provider is available.
const EIO: i32 = 5;
const EFAULT: i32 = 14;
const EAGAIN: i32 = 11;
const EINVAL: i32 = 22;
const EOPNOTSUPP: i32 = 95;

/// Kernel crypto API error
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KcapiError {
    /// The requested capability is not available on this handle or kernel
    #[error("operation not supported")]
    NotSupported,

    /// Malformed caller input
    #[error("invalid parameter")]
    InvalidParameter,

    /// Non-blocking access was requested and the operation cannot complete now
    #[error("operation would block")]
    WouldBlock,

    /// Transport reported a completion count that does not match the
    /// number of outstanding requests
    #[error("completion mismatch: expected {expected}, reported {reported}")]
    CompletionMismatch {
        /// Number of completions the driver could still accept
        expected: usize,

        /// Number of completions the transport reported
        reported: usize,
    },

    /// The kernel took fewer bytes than were handed to it
    #[error("short transfer: expected {expected} bytes, sent {sent}")]
    ShortTransfer {
        /// Bytes handed to the kernel
        expected: usize,

        /// Bytes the kernel accepted
        sent: usize,
    },

    /// Any other transport failure, carrying the raw errno
    #[error("transport error (errno {0})")]
    Transport(i32),
}

impl KcapiError {
    /// Classify a raw errno value. Both `-EINVAL` and `EINVAL` are accepted.
    pub fn from_errno(errno: i32) -> Self {
        match errno.saturating_abs() {
            EOPNOTSUPP => KcapiError::NotSupported,
            EINVAL => KcapiError::InvalidParameter,
            EAGAIN => KcapiError::WouldBlock,
            other => KcapiError::Transport(other),
        }
    }

    /// Negative error code for this error, the shape returned by the C API.
    pub fn errno(&self) -> i32 {
        match self {
            KcapiError::NotSupported => -EOPNOTSUPP,
            KcapiError::InvalidParameter => -EINVAL,
            KcapiError::WouldBlock => -EAGAIN,
            KcapiError::CompletionMismatch { .. } => -EIO,
            KcapiError::ShortTransfer { .. } => -EFAULT,
            KcapiError::Transport(errno) => -errno.saturating_abs(),
        }
    }
}

#[cfg(target_os = "linux")]
impl From<nix::errno::Errno> for KcapiError {
    fn from(errno: nix::errno::Errno) -> Self {
        KcapiError::from_errno(errno as i32)
    }
}
