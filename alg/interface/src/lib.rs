// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![warn(missing_docs)]

//! Kernel crypto API (AF_ALG) transport interface library

mod error;

use std::io::IoSlice;
use std::io::IoSliceMut;

pub use error::KcapiError;

/// Kernel crypto API Result
pub type KcapiResult<T> = Result<T, KcapiError>;

/// Page size assumed when a transport cannot query the system
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Cipher operation selected for a request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AlgOp {
    /// Encrypt
    Encrypt,

    /// Decrypt
    Decrypt,

    /// Sign
    Sign,

    /// Verify
    Verify,
}

impl AlgOp {
    /// Kernel `ALG_OP_*` code carried in the `ALG_SET_OP` control message
    pub fn code(&self) -> i32 {
        match self {
            AlgOp::Decrypt => 0,
            AlgOp::Encrypt => 1,
            AlgOp::Sign => 2,
            AlgOp::Verify => 3,
        }
    }
}

/// Whether a call may block waiting for the kernel
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AccessMode {
    /// Wait for the kernel
    #[default]
    Blocking,

    /// Surface `KcapiError::WouldBlock` instead of waiting
    NonBlocking,
}

/// Result of collecting asynchronous completions
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AioCompletion {
    /// Number of sub-operations that completed
    pub completed: usize,

    /// Bytes produced by those sub-operations
    pub bytes: usize,
}

/// Kernel crypto provider trait
pub trait Alg: Default {
    /// Transport bound to one transform
    type Transport: AlgTransport;

    /// Open a transform
    ///
    /// # Arguments
    /// * `alg_type`    - Transform type, e.g. `akcipher`
    /// * `name`        - Cipher name, e.g. `rsa`
    ///
    /// # Returns
    /// * `Self::Transport` - Transport bound to the transform
    ///
    /// # Error
    /// * `KcapiError` - Error encountered while opening the transform
    fn open(&self, alg_type: &str, name: &str) -> KcapiResult<Self::Transport>;
}

/// Transport primitives over one cipher transform.
///
/// All data operations run on the operation channel, which is established
/// by `accept_op` (implementations may also establish it lazily).
///
/// # Buffer lifetime
///
/// `aio_submit` may hand the output buffers to the kernel. An implementation
/// must not return from any method, successful or not, while a request that
/// references those buffers is in flight, with one exception: between a
/// successful `aio_submit` and the `aio_retrieve`/`aio_drain` calls that
/// collect it within the same driver call.
pub trait AlgTransport {
    /// Install a private key on the transform
    fn set_key(&mut self, key: &[u8]) -> KcapiResult<()>;

    /// Install a public key on the transform
    fn set_pubkey(&mut self, key: &[u8]) -> KcapiResult<()>;

    /// Establish the operation channel. Calling it again is a no-op.
    fn accept_op(&mut self) -> KcapiResult<()>;

    /// Whether the kernel supports batched asynchronous submission
    fn aio_available(&self) -> bool;

    /// System page size used for zero-copy accounting
    fn page_size(&self) -> usize {
        DEFAULT_PAGE_SIZE
    }

    /// Send operation metadata together with optional data
    ///
    /// # Arguments
    /// * `iov`         - Data sent with the metadata, may be empty
    /// * `op`          - Cipher operation
    /// * `more`        - More data of this request follows
    ///
    /// # Returns
    /// * `usize` - Bytes accepted
    fn send_meta(&mut self, iov: &[IoSlice<'_>], op: AlgOp, more: bool) -> KcapiResult<usize>;

    /// Send request data through the socket buffer
    fn send_data(&mut self, iov: &[IoSlice<'_>], more: bool) -> KcapiResult<usize>;

    /// Largest chunk `vmsplice` moves without copying. Bigger chunks are
    /// sent through the socket buffer instead.
    fn splice_capacity(&self) -> usize {
        usize::MAX
    }

    /// Send request data by splicing the user pages
    fn vmsplice(&mut self, iov: &[IoSlice<'_>], more: bool) -> KcapiResult<usize>;

    /// Receive the result of the current request
    ///
    /// # Returns
    /// * `usize` - Bytes written into `iov`
    fn recv_data(&mut self, iov: &mut [IoSliceMut<'_>], access: AccessMode)
        -> KcapiResult<usize>;

    /// Submit independent requests. `inputs[i]` pairs with `outputs[i]`.
    ///
    /// # Returns
    /// * `usize` - Number of requests accepted, counted from the front
    fn aio_submit(
        &mut self,
        inputs: &[IoSlice<'_>],
        outputs: &mut [IoSliceMut<'_>],
        access: AccessMode,
        op: AlgOp,
    ) -> KcapiResult<usize>;

    /// Collect up to `expected` completions
    fn aio_retrieve(&mut self, expected: usize) -> KcapiResult<AioCompletion>;

    /// Collect all `remaining` outstanding completions
    fn aio_drain(&mut self, remaining: usize) -> KcapiResult<AioCompletion>;
}
