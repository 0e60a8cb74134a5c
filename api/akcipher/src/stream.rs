// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Streaming operations.
//!
//! A streamed operation is started with one of the `stream_init_*` calls,
//! fed with [`AkcipherHandle::stream_update`] and closed with
//! [`AkcipherHandle::stream_update_last`]. The result is read with
//! [`AkcipherHandle::stream_op`].

use std::io::IoSlice;
use std::io::IoSliceMut;

use kcapi_alg::AccessMode;
use kcapi_alg::AlgOp;
use kcapi_alg::AlgTransport;
use kcapi_alg::KcapiError;
use kcapi_alg::KcapiResult;

use crate::handle::check_sent;
use crate::handle::iov_len;
use crate::handle::AkcipherHandle;

impl<T: AlgTransport> AkcipherHandle<T> {
    /// Start a streamed encryption. `iov` may carry the first input chunk.
    pub fn stream_init_enc(&mut self, iov: &[IoSlice<'_>]) -> KcapiResult<usize> {
        self.stream_init(iov, AlgOp::Encrypt)
    }

    /// Start a streamed decryption
    pub fn stream_init_dec(&mut self, iov: &[IoSlice<'_>]) -> KcapiResult<usize> {
        self.stream_init(iov, AlgOp::Decrypt)
    }

    /// Start a streamed signature generation
    pub fn stream_init_sgn(&mut self, iov: &[IoSlice<'_>]) -> KcapiResult<usize> {
        self.stream_init(iov, AlgOp::Sign)
    }

    /// Start a streamed signature verification
    pub fn stream_init_vfy(&mut self, iov: &[IoSlice<'_>]) -> KcapiResult<usize> {
        self.stream_init(iov, AlgOp::Verify)
    }

    pub(crate) fn stream_init(&mut self, iov: &[IoSlice<'_>], op: AlgOp) -> KcapiResult<usize> {
        let sent = self.send_meta(iov, op, true)?;
        check_sent(iov_len(iov), sent)
    }

    /// Send more input; further input follows.
    ///
    /// Chunks are spliced while fewer pages than the configured threshold are
    /// pinned by the current operation and copied afterwards.
    ///
    /// # Returns
    /// * `usize` - Bytes accepted
    pub fn stream_update(&mut self, iov: &[IoSlice<'_>]) -> KcapiResult<usize> {
        self.send_chunk(iov, true)
    }

    /// Send the final input chunk
    pub fn stream_update_last(&mut self, iov: &[IoSlice<'_>]) -> KcapiResult<usize> {
        self.send_chunk(iov, false)
    }

    /// Read the result of the streamed operation
    ///
    /// # Arguments
    /// * `iov`         - Output buffers, at least one
    ///
    /// # Returns
    /// * `usize` - Bytes written to `iov`
    ///
    /// # Error
    /// * `KcapiError::InvalidParameter` - No output buffer provided
    pub fn stream_op(&mut self, iov: &mut [IoSliceMut<'_>]) -> KcapiResult<usize> {
        self.stream_op_access(iov, AccessMode::Blocking)
    }

    pub(crate) fn stream_op_access(
        &mut self,
        iov: &mut [IoSliceMut<'_>],
        access: AccessMode,
    ) -> KcapiResult<usize> {
        if iov.is_empty() {
            tracing::error!("Asymmetric operation: No buffer for output data provided");
            return Err(KcapiError::InvalidParameter);
        }
        self.recv_result(iov, access)
    }
}
