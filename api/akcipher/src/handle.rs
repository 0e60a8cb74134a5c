// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Asymmetric cipher handle

use std::io::IoSlice;
use std::io::IoSliceMut;

use kcapi_alg::AccessMode;
use kcapi_alg::AioCompletion;
use kcapi_alg::Alg;
use kcapi_alg::AlgOp;
use kcapi_alg::AlgTransport;
use kcapi_alg::KcapiError;
use kcapi_alg::KcapiResult;

use crate::config::HandleConfig;

/// Transform type of asymmetric ciphers
pub const AKCIPHER_TYPE: &str = "akcipher";

/// Per-batch asynchronous bookkeeping
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct AioState {
    /// Completions observed in the current batch
    pub(crate) completed_reads: usize,
}

/// One open asymmetric cipher session.
///
/// A handle drives at most one operation at a time. Calls on the same
/// handle from several threads must be serialized by the caller; use one
/// handle per concurrent stream of work.
#[derive(Debug)]
pub struct AkcipherHandle<T: AlgTransport> {
    pub(crate) transport: T,
    pub(crate) config: HandleConfig,
    pub(crate) processed_pages: usize,
    pub(crate) aio: AioState,
}

impl<T: AlgTransport> AkcipherHandle<T> {
    /// Wrap an open transport.
    ///
    /// Batched submission is disabled when the transport reports that the
    /// kernel lacks asynchronous I/O support.
    pub fn new(transport: T, mut config: HandleConfig) -> Self {
        if !config.async_disabled && !transport.aio_available() {
            tracing::warn!("Kernel AIO unavailable, batched operations run sequentially");
            config.async_disabled = true;
        }

        Self {
            transport,
            config,
            processed_pages: 0,
            aio: AioState::default(),
        }
    }

    /// Open an asymmetric cipher
    ///
    /// # Arguments
    /// * `alg`         - Kernel crypto provider
    /// * `ciphername`  - Cipher name, e.g. `rsa`
    /// * `config`      - Handle policy
    ///
    /// # Returns
    /// * `Self` - Handle bound to the cipher
    ///
    /// # Error
    /// * `KcapiError` - Error encountered while opening the transform
    pub fn init<A: Alg<Transport = T>>(
        alg: &A,
        ciphername: &str,
        config: HandleConfig,
    ) -> KcapiResult<Self> {
        let transport = alg.open(AKCIPHER_TYPE, ciphername)?;
        tracing::debug!(ciphername, "Opened akcipher handle");
        Ok(Self::new(transport, config))
    }

    /// Install a private key. Sign and decrypt need it.
    pub fn set_key(&mut self, key: &[u8]) -> KcapiResult<()> {
        if key.is_empty() {
            return Err(KcapiError::InvalidParameter);
        }
        self.transport.set_key(key)
    }

    /// Install a public key. Verify and encrypt need it.
    pub fn set_pubkey(&mut self, key: &[u8]) -> KcapiResult<()> {
        if key.is_empty() {
            return Err(KcapiError::InvalidParameter);
        }
        self.transport.set_pubkey(key)
    }

    /// Handle policy
    pub fn config(&self) -> &HandleConfig {
        &self.config
    }

    /// Pages submitted through zero-copy since the last result was read
    pub fn processed_pages(&self) -> usize {
        self.processed_pages
    }

    /// Completions observed by the current or most recent batched call
    pub fn completed_reads(&self) -> usize {
        self.aio.completed_reads
    }

    /// Underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Underlying transport, mutable
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub(crate) fn zero_copy_available(&self) -> bool {
        self.processed_pages < self.config.zero_copy_page_threshold
    }

    /// Send a chunk, by zero-copy while the page budget lasts. Only chunks
    /// the transport can splice count against the budget.
    pub(crate) fn send_chunk(&mut self, iov: &[IoSlice<'_>], more: bool) -> KcapiResult<usize> {
        let len = iov_len(iov);
        if !self.zero_copy_available() {
            tracing::trace!(pages = self.processed_pages, "Zero-copy budget spent");
            let sent = self.transport.send_data(iov, more)?;
            return check_sent(len, sent);
        }

        let sent = self.transport.vmsplice(iov, more)?;
        check_sent(len, sent)?;
        if len <= self.transport.splice_capacity() {
            self.processed_pages += pages_spanned(iov, self.transport.page_size());
        }
        Ok(sent)
    }

    /// Read the current result. The kernel releases the spliced pages once
    /// the result has been read.
    pub(crate) fn recv_result(
        &mut self,
        iov: &mut [IoSliceMut<'_>],
        access: AccessMode,
    ) -> KcapiResult<usize> {
        let received = self.transport.recv_data(iov, access)?;
        self.processed_pages = 0;
        Ok(received)
    }

    pub(crate) fn send_meta(
        &mut self,
        iov: &[IoSlice<'_>],
        op: AlgOp,
        more: bool,
    ) -> KcapiResult<usize> {
        self.transport.send_meta(iov, op, more)
    }

    /// Count completions reported by the transport against the requests
    /// submitted so far.
    pub(crate) fn note_completions(
        &mut self,
        completion: AioCompletion,
        submitted: usize,
    ) -> KcapiResult<()> {
        let expected = submitted - self.aio.completed_reads;
        if completion.completed > expected {
            tracing::error!(
                expected,
                reported = completion.completed,
                "Transport reported more completions than outstanding requests"
            );
            return Err(KcapiError::CompletionMismatch {
                expected,
                reported: completion.completed,
            });
        }

        self.aio.completed_reads += completion.completed;
        Ok(())
    }
}

pub(crate) fn iov_len(iov: &[IoSlice<'_>]) -> usize {
    iov.iter().map(|v| v.len()).sum()
}

/// Fail unless the kernel took all `expected` bytes
pub(crate) fn check_sent(expected: usize, sent: usize) -> KcapiResult<usize> {
    if sent != expected {
        tracing::error!(expected, sent, "Kernel accepted a partial chunk");
        return Err(KcapiError::ShortTransfer { expected, sent });
    }
    Ok(sent)
}

/// Pages covered by `iov`, counting each vector separately
fn pages_spanned(iov: &[IoSlice<'_>], page_size: usize) -> usize {
    let page_size = page_size.max(1);
    iov.iter().map(|v| v.len().div_ceil(page_size)).sum()
}
