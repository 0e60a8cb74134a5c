// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Batched asynchronous operations.
//!
//! Every `(inputs[i], outputs[i])` pair is one independent cipher operation.
//! The pairs are submitted to the kernel over the handle's operation channel
//! and all completions are collected before the call returns. Completions may
//! arrive in any order; the pairing of input and output is logical only.
//!
//! When the handle has asynchronous submission disabled, or the kernel does
//! not support it, the pairs are processed one after another with the
//! streaming calls. Callers see the same result either way.
//!
//! A batch is closed once all its requests are collected. Keeping a batch
//! open across calls would need a way to tell which request a completion
//! belongs to, which the kernel interface does not provide.

use std::io::IoSlice;
use std::io::IoSliceMut;
use std::slice;

use kcapi_alg::AccessMode;
use kcapi_alg::AlgOp;
use kcapi_alg::AlgTransport;
use kcapi_alg::KcapiError;
use kcapi_alg::KcapiResult;

use crate::handle::AkcipherHandle;

/// Requests handed to the transport per submission
const AIO_SUBMIT_CHUNK: usize = 1;

impl<T: AlgTransport> AkcipherHandle<T> {
    /// Encrypt every input into the output at the same index
    ///
    /// # Arguments
    /// * `inputs`      - Plaintexts, one per operation
    /// * `outputs`     - Ciphertext buffers, same length as `inputs`
    /// * `access`      - Whether collecting completions may block
    ///
    /// # Returns
    /// * `usize` - Total bytes produced by all operations
    ///
    /// # Error
    /// * `KcapiError` - The first failure; outputs are then unspecified
    pub fn encrypt_aio(
        &mut self,
        inputs: &[IoSlice<'_>],
        outputs: &mut [IoSliceMut<'_>],
        access: AccessMode,
    ) -> KcapiResult<usize> {
        self.crypt_aio(inputs, outputs, access, AlgOp::Encrypt)
    }

    /// Decrypt every input into the output at the same index.
    /// See [`AkcipherHandle::encrypt_aio`].
    pub fn decrypt_aio(
        &mut self,
        inputs: &[IoSlice<'_>],
        outputs: &mut [IoSliceMut<'_>],
        access: AccessMode,
    ) -> KcapiResult<usize> {
        self.crypt_aio(inputs, outputs, access, AlgOp::Decrypt)
    }

    /// Sign every input into the output at the same index.
    /// See [`AkcipherHandle::encrypt_aio`].
    pub fn sign_aio(
        &mut self,
        inputs: &[IoSlice<'_>],
        outputs: &mut [IoSliceMut<'_>],
        access: AccessMode,
    ) -> KcapiResult<usize> {
        self.crypt_aio(inputs, outputs, access, AlgOp::Sign)
    }

    /// Verify every input into the output at the same index.
    /// See [`AkcipherHandle::encrypt_aio`].
    pub fn verify_aio(
        &mut self,
        inputs: &[IoSlice<'_>],
        outputs: &mut [IoSliceMut<'_>],
        access: AccessMode,
    ) -> KcapiResult<usize> {
        self.crypt_aio(inputs, outputs, access, AlgOp::Verify)
    }

    #[tracing::instrument(skip_all, fields(op = ?op, count = inputs.len()))]
    fn crypt_aio(
        &mut self,
        inputs: &[IoSlice<'_>],
        outputs: &mut [IoSliceMut<'_>],
        access: AccessMode,
        op: AlgOp,
    ) -> KcapiResult<usize> {
        if inputs.len() != outputs.len() {
            tracing::error!(outputs = outputs.len(), "Input and output counts differ");
            return Err(KcapiError::InvalidParameter);
        }

        self.aio.completed_reads = 0;

        match self.aio_open() {
            Ok(()) => self.aio_batch(inputs, outputs, access, op),
            Err(KcapiError::NotSupported) => self.aio_fallback(inputs, outputs, access, op),
            Err(err) => Err(err),
        }
    }

    fn aio_open(&mut self) -> KcapiResult<()> {
        if self.config.async_disabled {
            tracing::warn!("AIO support disabled");
            return Err(KcapiError::NotSupported);
        }
        self.transport.accept_op()
    }

    fn aio_batch(
        &mut self,
        inputs: &[IoSlice<'_>],
        outputs: &mut [IoSliceMut<'_>],
        access: AccessMode,
        op: AlgOp,
    ) -> KcapiResult<usize> {
        let count = inputs.len();
        let mut submitted = 0;
        let mut total = 0;

        while submitted < count {
            let end = (submitted + AIO_SUBMIT_CHUNK).min(count);
            let requested = end - submitted;

            let accepted = self.transport.aio_submit(
                &inputs[submitted..end],
                &mut outputs[submitted..end],
                access,
                op,
            )?;
            if accepted == 0 {
                return Err(KcapiError::WouldBlock);
            }
            if accepted > requested {
                return Err(KcapiError::CompletionMismatch {
                    expected: requested,
                    reported: accepted,
                });
            }
            submitted += accepted;

            let completion = self.transport.aio_retrieve(accepted)?;
            self.note_completions(completion, submitted)?;
            total += completion.bytes;

            tracing::trace!(
                submitted,
                completed = self.aio.completed_reads,
                outstanding = count - self.aio.completed_reads,
                "Submitted request"
            );
        }

        // Completions can trail submission, so collect whatever is outstanding
        // even if the loop already saw everything.
        let remaining = count - self.aio.completed_reads;
        let completion = self.transport.aio_drain(remaining)?;
        self.note_completions(completion, count)?;
        if self.aio.completed_reads != count {
            tracing::error!(
                remaining,
                reported = completion.completed,
                "Drain left requests outstanding"
            );
            return Err(KcapiError::CompletionMismatch {
                expected: remaining,
                reported: completion.completed,
            });
        }
        total += completion.bytes;

        tracing::debug!(count, total, "Batched operation complete");
        Ok(total)
    }

    fn aio_fallback(
        &mut self,
        inputs: &[IoSlice<'_>],
        outputs: &mut [IoSliceMut<'_>],
        access: AccessMode,
        op: AlgOp,
    ) -> KcapiResult<usize> {
        tracing::debug!("Processing batch sequentially");

        let mut total = self.stream_init(&[], op)?;
        for (input, output) in inputs.iter().zip(outputs.iter_mut()) {
            self.stream_update_last(slice::from_ref(input))?;
            total += self.stream_op_access(slice::from_mut(output), access)?;
        }
        Ok(total)
    }
}
