// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Kernel crypto API implementation - In-process mock provider - Transport module

use std::collections::HashMap;
use std::collections::VecDeque;
use std::io::IoSlice;
use std::io::IoSliceMut;
use std::sync::Arc;

use kcapi_alg_interface::*;
use parking_lot::Mutex;

/// Mask applied by the mock transform. XOR is its own inverse, so
/// decrypting an encrypted buffer (or verifying a signature) yields the input.
pub const MOCK_XOR_MASK: u8 = 0x5a;

/// Transform applied by the mock to every request
pub fn mock_transform(data: &[u8]) -> Vec<u8> {
    data.iter().map(|b| b ^ MOCK_XOR_MASK).collect()
}

/// Primitive call recorded by the mock
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockCall {
    /// `set_key`
    SetKey {
        /// Key length
        len: usize,
    },

    /// `set_pubkey`
    SetPubkey {
        /// Key length
        len: usize,
    },

    /// `accept_op`
    AcceptOp,

    /// `send_meta`
    SendMeta {
        /// Operation
        op: AlgOp,
        /// Data length
        len: usize,
        /// More data follows
        more: bool,
    },

    /// `send_data`
    SendData {
        /// Data length
        len: usize,
        /// More data follows
        more: bool,
    },

    /// `vmsplice`
    Vmsplice {
        /// Data length
        len: usize,
        /// More data follows
        more: bool,
    },

    /// `recv_data`
    RecvData {
        /// Output capacity
        capacity: usize,
    },

    /// `aio_submit`
    AioSubmit {
        /// Number of requests
        count: usize,
        /// Operation
        op: AlgOp,
        /// Access mode
        access: AccessMode,
    },

    /// `aio_retrieve`
    AioRetrieve {
        /// Completions requested
        expected: usize,
    },

    /// `aio_drain`
    AioDrain {
        /// Completions outstanding
        remaining: usize,
    },
}

/// Kind of a recorded call, used for counting and fault injection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MockCallKind {
    /// `set_key`
    SetKey,
    /// `set_pubkey`
    SetPubkey,
    /// `accept_op`
    AcceptOp,
    /// `send_meta`
    SendMeta,
    /// `send_data`
    SendData,
    /// `vmsplice`
    Vmsplice,
    /// `recv_data`
    RecvData,
    /// `aio_submit`
    AioSubmit,
    /// `aio_retrieve`
    AioRetrieve,
    /// `aio_drain`
    AioDrain,
}

impl MockCall {
    /// Kind of this call
    pub fn kind(&self) -> MockCallKind {
        match self {
            MockCall::SetKey { .. } => MockCallKind::SetKey,
            MockCall::SetPubkey { .. } => MockCallKind::SetPubkey,
            MockCall::AcceptOp => MockCallKind::AcceptOp,
            MockCall::SendMeta { .. } => MockCallKind::SendMeta,
            MockCall::SendData { .. } => MockCallKind::SendData,
            MockCall::Vmsplice { .. } => MockCallKind::Vmsplice,
            MockCall::RecvData { .. } => MockCallKind::RecvData,
            MockCall::AioSubmit { .. } => MockCallKind::AioSubmit,
            MockCall::AioRetrieve { .. } => MockCallKind::AioRetrieve,
            MockCall::AioDrain { .. } => MockCallKind::AioDrain,
        }
    }
}

/// How `aio_retrieve` reports queued completions
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RetrievePolicy {
    /// Report up to `expected` completions, oldest first
    #[default]
    Immediate,

    /// Report nothing; everything is left for the drain
    Hold,

    /// Report nothing; the drain releases completions newest first
    Reversed,

    /// Report one completion more than is queued
    Overreport,
}

#[derive(Debug)]
struct Fault {
    kind: MockCallKind,
    nth: usize,
    err: KcapiError,
}

#[derive(Debug)]
struct MockState {
    key: Option<Vec<u8>>,
    pubkey: Option<Vec<u8>>,
    op_accepted: bool,
    aio_available: bool,
    current_op: Option<AlgOp>,
    pending: Vec<u8>,
    results: VecDeque<Vec<u8>>,
    aio_queue: VecDeque<(usize, usize)>,
    aio_seq: usize,
    delivered: Vec<usize>,
    send_limit: Option<usize>,
    splice_capacity: usize,
    retrieve_policy: RetrievePolicy,
    journal: Vec<MockCall>,
    counts: HashMap<MockCallKind, usize>,
    faults: Vec<Fault>,
}

impl MockState {
    fn new() -> Self {
        Self {
            key: None,
            pubkey: None,
            op_accepted: false,
            aio_available: true,
            current_op: None,
            pending: Vec::new(),
            results: VecDeque::new(),
            aio_queue: VecDeque::new(),
            aio_seq: 0,
            delivered: Vec::new(),
            send_limit: None,
            splice_capacity: usize::MAX,
            retrieve_policy: RetrievePolicy::default(),
            journal: Vec::new(),
            counts: HashMap::new(),
            faults: Vec::new(),
        }
    }

    /// Journal the call and fail it if a fault is armed for it.
    fn record(&mut self, call: MockCall) -> KcapiResult<()> {
        let kind = call.kind();
        let count = self.counts.entry(kind).or_insert(0);
        *count += 1;
        let nth = *count;
        self.journal.push(call);

        if let Some(pos) = self
            .faults
            .iter()
            .position(|f| f.kind == kind && f.nth == nth)
        {
            let fault = self.faults.remove(pos);
            tracing::debug!(?kind, nth, err = ?fault.err, "Injecting mock fault");
            return Err(fault.err);
        }
        Ok(())
    }

    fn append(&mut self, iov: &[IoSlice<'_>], more: bool) -> KcapiResult<usize> {
        let Some(op) = self.current_op else {
            tracing::error!("Mock received data before any operation was selected");
            return Err(KcapiError::InvalidParameter);
        };

        let mut len = 0;
        for v in iov {
            let room = self.send_limit.map_or(usize::MAX, |limit| limit - len);
            let take = v.len().min(room);
            self.pending.extend_from_slice(&v[..take]);
            len += take;
        }

        if !more && !self.pending.is_empty() {
            let input = std::mem::take(&mut self.pending);
            tracing::trace!(?op, len = input.len(), "Mock request complete");
            self.results.push_back(mock_transform(&input));
        }
        Ok(len)
    }

    /// Report `take` queued completions, oldest or newest first.
    fn release(&mut self, take: usize, newest_first: bool) -> AioCompletion {
        let mut completion = AioCompletion::default();
        for _ in 0..take {
            let next = if newest_first {
                self.aio_queue.pop_back()
            } else {
                self.aio_queue.pop_front()
            };
            let Some((seq, bytes)) = next else {
                break;
            };
            self.delivered.push(seq);
            completion.completed += 1;
            completion.bytes += bytes;
        }
        completion
    }
}

/// Copy `data` across `iov`. Returns `None` if it does not fit.
fn scatter(iov: &mut [IoSliceMut<'_>], data: &[u8]) -> Option<usize> {
    let capacity: usize = iov.iter().map(|v| v.len()).sum();
    if capacity < data.len() {
        return None;
    }

    let mut rest = data;
    for v in iov.iter_mut() {
        if rest.is_empty() {
            break;
        }
        let n = v.len().min(rest.len());
        v[..n].copy_from_slice(&rest[..n]);
        rest = &rest[n..];
    }
    Some(data.len())
}

/// Shared view of a mock transport's state, usable after the transport
/// has been moved into a handle
#[derive(Clone, Debug)]
pub struct MockProbe {
    state: Arc<Mutex<MockState>>,
}

impl MockProbe {
    /// Every primitive call so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().journal.clone()
    }

    /// Number of calls of one kind
    pub fn count(&self, kind: MockCallKind) -> usize {
        self.state.lock().counts.get(&kind).copied().unwrap_or(0)
    }

    /// Forget the recorded calls. Armed faults keep their call numbering.
    pub fn clear_calls(&self) {
        self.state.lock().journal.clear();
    }

    /// Fail the `nth` (1-based, counted from now) call of `kind` with `err`
    pub fn fail_nth(&self, kind: MockCallKind, nth: usize, err: KcapiError) {
        let mut state = self.state.lock();
        let nth = state.counts.get(&kind).copied().unwrap_or(0) + nth;
        state.faults.push(Fault { kind, nth, err });
    }

    /// Switch kernel AIO support on or off
    pub fn set_aio_available(&self, available: bool) {
        self.state.lock().aio_available = available;
    }

    /// Choose how retrieve reports completions
    pub fn set_retrieve_policy(&self, policy: RetrievePolicy) {
        self.state.lock().retrieve_policy = policy;
    }

    /// Installed private key
    pub fn key(&self) -> Option<Vec<u8>> {
        self.state.lock().key.clone()
    }

    /// Installed public key
    pub fn pubkey(&self) -> Option<Vec<u8>> {
        self.state.lock().pubkey.clone()
    }

    /// Whether the operation channel was established
    pub fn op_accepted(&self) -> bool {
        self.state.lock().op_accepted
    }

    /// Completions queued but not yet reported
    pub fn queued_completions(&self) -> usize {
        self.state.lock().aio_queue.len()
    }

    /// Submission index (0-based, over the transport's lifetime) of every
    /// reported completion, in the order reported
    pub fn delivery_order(&self) -> Vec<usize> {
        self.state.lock().delivered.clone()
    }

    /// Accept at most `limit` bytes per data call
    pub fn set_send_limit(&self, limit: Option<usize>) {
        self.state.lock().send_limit = limit;
    }

    /// Largest chunk reported as spliceable
    pub fn set_splice_capacity(&self, capacity: usize) {
        self.state.lock().splice_capacity = capacity;
    }
}

/// Kernel crypto API transport backed by an in-process mock
#[derive(Debug)]
pub struct AlgMockTransport {
    state: Arc<Mutex<MockState>>,
}

impl Default for AlgMockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl AlgMockTransport {
    /// Create a transport with AIO available and no faults armed
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::new())),
        }
    }

    /// Probe sharing this transport's state
    pub fn probe(&self) -> MockProbe {
        MockProbe {
            state: self.state.clone(),
        }
    }
}

impl AlgTransport for AlgMockTransport {
    fn set_key(&mut self, key: &[u8]) -> KcapiResult<()> {
        let mut state = self.state.lock();
        state.record(MockCall::SetKey { len: key.len() })?;
        state.key = Some(key.to_vec());
        Ok(())
    }

    fn set_pubkey(&mut self, key: &[u8]) -> KcapiResult<()> {
        let mut state = self.state.lock();
        state.record(MockCall::SetPubkey { len: key.len() })?;
        state.pubkey = Some(key.to_vec());
        Ok(())
    }

    fn accept_op(&mut self) -> KcapiResult<()> {
        let mut state = self.state.lock();
        state.record(MockCall::AcceptOp)?;
        state.op_accepted = true;
        Ok(())
    }

    fn aio_available(&self) -> bool {
        self.state.lock().aio_available
    }

    fn splice_capacity(&self) -> usize {
        self.state.lock().splice_capacity
    }

    fn send_meta(&mut self, iov: &[IoSlice<'_>], op: AlgOp, more: bool) -> KcapiResult<usize> {
        let mut state = self.state.lock();
        let len = iov.iter().map(|v| v.len()).sum();
        state.record(MockCall::SendMeta { op, len, more })?;

        state.current_op = Some(op);
        state.append(iov, more)
    }

    fn send_data(&mut self, iov: &[IoSlice<'_>], more: bool) -> KcapiResult<usize> {
        let mut state = self.state.lock();
        let len = iov.iter().map(|v| v.len()).sum();
        state.record(MockCall::SendData { len, more })?;

        state.append(iov, more)
    }

    fn vmsplice(&mut self, iov: &[IoSlice<'_>], more: bool) -> KcapiResult<usize> {
        let mut state = self.state.lock();
        let len = iov.iter().map(|v| v.len()).sum();
        state.record(MockCall::Vmsplice { len, more })?;

        state.append(iov, more)
    }

    fn recv_data(
        &mut self,
        iov: &mut [IoSliceMut<'_>],
        _access: AccessMode,
    ) -> KcapiResult<usize> {
        let mut state = self.state.lock();
        let capacity = iov.iter().map(|v| v.len()).sum();
        state.record(MockCall::RecvData { capacity })?;

        let Some(result) = state.results.pop_front() else {
            return Err(KcapiError::WouldBlock);
        };
        scatter(iov, &result).ok_or_else(|| {
            tracing::error!(capacity, needed = result.len(), "Mock output buffer too small");
            KcapiError::InvalidParameter
        })
    }

    fn aio_submit(
        &mut self,
        inputs: &[IoSlice<'_>],
        outputs: &mut [IoSliceMut<'_>],
        access: AccessMode,
        op: AlgOp,
    ) -> KcapiResult<usize> {
        let mut state = self.state.lock();
        state.record(MockCall::AioSubmit {
            count: inputs.len(),
            op,
            access,
        })?;

        if !state.aio_available {
            return Err(KcapiError::NotSupported);
        }
        if inputs.len() != outputs.len() {
            return Err(KcapiError::InvalidParameter);
        }

        for (input, output) in inputs.iter().zip(outputs.iter_mut()) {
            if let Some(limit) = state.send_limit.filter(|&limit| limit < input.len()) {
                return Err(KcapiError::ShortTransfer {
                    expected: input.len(),
                    sent: limit,
                });
            }
            let result = mock_transform(input);
            let written = scatter(std::slice::from_mut(output), &result)
                .ok_or(KcapiError::InvalidParameter)?;
            let seq = state.aio_seq;
            state.aio_seq += 1;
            state.aio_queue.push_back((seq, written));
        }
        Ok(inputs.len())
    }

    fn aio_retrieve(&mut self, expected: usize) -> KcapiResult<AioCompletion> {
        let mut state = self.state.lock();
        state.record(MockCall::AioRetrieve { expected })?;

        let policy = state.retrieve_policy;
        let completion = match policy {
            RetrievePolicy::Immediate => state.release(expected, false),
            RetrievePolicy::Hold | RetrievePolicy::Reversed => AioCompletion::default(),
            RetrievePolicy::Overreport => {
                let queued = state.aio_queue.len();
                let mut completion = state.release(queued, false);
                completion.completed += 1;
                completion
            }
        };
        Ok(completion)
    }

    fn aio_drain(&mut self, remaining: usize) -> KcapiResult<AioCompletion> {
        let mut state = self.state.lock();
        state.record(MockCall::AioDrain { remaining })?;

        let newest_first = state.retrieve_policy == RetrievePolicy::Reversed;
        Ok(state.release(remaining, newest_first))
    }
}
