// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Synchronous one-shot operations

use std::io::IoSlice;
use std::io::IoSliceMut;

use kcapi_alg::AccessMode;
use kcapi_alg::AlgOp;
use kcapi_alg::AlgTransport;
use kcapi_alg::KcapiError;
use kcapi_alg::KcapiResult;

use crate::handle::check_sent;
use crate::handle::AkcipherHandle;

impl<T: AlgTransport> AkcipherHandle<T> {
    /// Encrypt `input` into `output`
    ///
    /// # Arguments
    /// * `input`       - Plaintext, must not be empty
    /// * `output`      - Ciphertext buffer
    /// * `access`      - Whether reading the result may block
    ///
    /// # Returns
    /// * `usize` - Bytes written to `output`
    ///
    /// # Error
    /// * `KcapiError` - Invalid buffers or transport failure
    pub fn encrypt(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        access: AccessMode,
    ) -> KcapiResult<usize> {
        self.crypt(input, output, access, AlgOp::Encrypt)
    }

    /// Decrypt `input` into `output`. See [`AkcipherHandle::encrypt`].
    pub fn decrypt(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        access: AccessMode,
    ) -> KcapiResult<usize> {
        self.crypt(input, output, access, AlgOp::Decrypt)
    }

    /// Sign `input`, writing the signature to `output`.
    /// See [`AkcipherHandle::encrypt`].
    pub fn sign(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        access: AccessMode,
    ) -> KcapiResult<usize> {
        self.crypt(input, output, access, AlgOp::Sign)
    }

    /// Verify the signature in `input`, writing the recovered message to
    /// `output`. See [`AkcipherHandle::encrypt`].
    pub fn verify(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        access: AccessMode,
    ) -> KcapiResult<usize> {
        self.crypt(input, output, access, AlgOp::Verify)
    }

    fn crypt(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        access: AccessMode,
        op: AlgOp,
    ) -> KcapiResult<usize> {
        if input.is_empty() || output.is_empty() {
            tracing::error!(?op, "Asymmetric operation: empty input or output buffer");
            return Err(KcapiError::InvalidParameter);
        }

        let iov = [IoSlice::new(input)];
        if self.zero_copy_available() {
            self.send_meta(&[], op, true)?;
            self.send_chunk(&iov, false)?;
        } else {
            let sent = self.send_meta(&iov, op, false)?;
            check_sent(input.len(), sent)?;
        }

        let produced = self.recv_result(&mut [IoSliceMut::new(output)], access)?;
        tracing::debug!(?op, len = input.len(), produced, "Asymmetric operation complete");
        Ok(produced)
    }
}
