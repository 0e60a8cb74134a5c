// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(dead_code)]

use std::io::IoSlice;
use std::io::IoSliceMut;

use kcapi_akcipher::*;
use kcapi_alg_mock::*;
use rand::Rng;

/// Page size reported by the mock transport
pub const PAGE: usize = 4096;

pub fn mock_handle(config: HandleConfig) -> (AkcipherHandle<AlgMockTransport>, MockProbe) {
    let transport = AlgMockTransport::new();
    let probe = transport.probe();
    (AkcipherHandle::new(transport, config), probe)
}

pub fn random_payload(len: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen()).collect()
}

pub fn random_payloads(count: usize, len: usize) -> Vec<Vec<u8>> {
    (0..count).map(|_| random_payload(len)).collect()
}

/// Run a batched call over `inputs`, giving every output `out_len` bytes.
pub fn run_batch<F>(inputs: &[Vec<u8>], out_len: usize, f: F) -> (KcapiResult<usize>, Vec<Vec<u8>>)
where
    F: FnOnce(&[IoSlice<'_>], &mut [IoSliceMut<'_>]) -> KcapiResult<usize>,
{
    let mut outputs = vec![vec![0u8; out_len]; inputs.len()];

    let in_iov: Vec<IoSlice<'_>> = inputs.iter().map(|v| IoSlice::new(v)).collect();
    let mut out_iov: Vec<IoSliceMut<'_>> =
        outputs.iter_mut().map(|v| IoSliceMut::new(v)).collect();
    let result = f(&in_iov, &mut out_iov);
    drop(out_iov);

    (result, outputs)
}

/// Calls of one kind in the journal
pub fn calls_of(probe: &MockProbe, kind: MockCallKind) -> Vec<MockCall> {
    probe
        .calls()
        .into_iter()
        .filter(|c| c.kind() == kind)
        .collect()
}
