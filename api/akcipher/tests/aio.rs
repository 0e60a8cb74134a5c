// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

mod common;

use std::io::IoSlice;
use std::io::IoSliceMut;

use kcapi_akcipher::*;
use kcapi_alg_mock::*;
use test_with_tracing::test;

use crate::common::*;

const LEN: usize = 64;

#[test]
fn test_aio_encrypt_batch() {
    let (mut handle, probe) = mock_handle(HandleConfig::default());
    let inputs = random_payloads(3, LEN);

    let (result, outputs) = run_batch(&inputs, LEN, |i, o| {
        handle.encrypt_aio(i, o, AccessMode::Blocking)
    });

    assert_eq!(result, Ok(3 * LEN));
    for (input, output) in inputs.iter().zip(&outputs) {
        assert_eq!(output, &mock_transform(input));
    }
    assert_eq!(handle.completed_reads(), 3);

    let submit = MockCall::AioSubmit {
        count: 1,
        op: AlgOp::Encrypt,
        access: AccessMode::Blocking,
    };
    let retrieve = MockCall::AioRetrieve { expected: 1 };
    assert_eq!(
        probe.calls(),
        vec![
            MockCall::AcceptOp,
            submit.clone(),
            retrieve.clone(),
            submit.clone(),
            retrieve.clone(),
            submit,
            retrieve,
            MockCall::AioDrain { remaining: 0 },
        ]
    );
}

#[test]
fn test_aio_round_trip() {
    let (mut handle, _probe) = mock_handle(HandleConfig::default());
    let inputs = random_payloads(4, LEN);

    let (result, ciphertexts) = run_batch(&inputs, LEN, |i, o| {
        handle.sign_aio(i, o, AccessMode::Blocking)
    });
    assert_eq!(result, Ok(4 * LEN));

    let (result, recovered) = run_batch(&ciphertexts, LEN, |i, o| {
        handle.verify_aio(i, o, AccessMode::Blocking)
    });
    assert_eq!(result, Ok(4 * LEN));
    assert_eq!(recovered, inputs);
}

#[test]
fn test_aio_drain_collects_held_completions() {
    let (mut handle, probe) = mock_handle(HandleConfig::default());
    probe.set_retrieve_policy(RetrievePolicy::Hold);
    let inputs = random_payloads(3, LEN);

    let (result, outputs) = run_batch(&inputs, LEN, |i, o| {
        handle.decrypt_aio(i, o, AccessMode::Blocking)
    });

    assert_eq!(result, Ok(3 * LEN));
    assert_eq!(outputs[2], mock_transform(&inputs[2]));
    assert_eq!(handle.completed_reads(), 3);
    assert_eq!(
        calls_of(&probe, MockCallKind::AioDrain),
        vec![MockCall::AioDrain { remaining: 3 }]
    );
    assert_eq!(probe.queued_completions(), 0);
}

#[test]
fn test_aio_out_of_order_completions() {
    let inputs = vec![random_payload(8), random_payload(16), random_payload(32)];

    let (mut in_order, in_order_probe) = mock_handle(HandleConfig::default());
    let (result, _) = run_batch(&inputs, 32, |i, o| {
        in_order.encrypt_aio(i, o, AccessMode::Blocking)
    });
    assert_eq!(result, Ok(8 + 16 + 32));
    assert_eq!(in_order_probe.delivery_order(), vec![0, 1, 2]);

    let (mut handle, probe) = mock_handle(HandleConfig::default());
    probe.set_retrieve_policy(RetrievePolicy::Reversed);
    let (result, outputs) = run_batch(&inputs, 32, |i, o| {
        handle.encrypt_aio(i, o, AccessMode::Blocking)
    });

    assert_eq!(result, Ok(8 + 16 + 32));
    assert_eq!(probe.delivery_order(), vec![2, 1, 0]);
    assert_eq!(handle.completed_reads(), 3);
    for (input, output) in inputs.iter().zip(&outputs) {
        assert_eq!(&output[..input.len()], mock_transform(input).as_slice());
    }
}

#[test]
fn test_aio_submit_failure_aborts_batch() {
    let (mut handle, probe) = mock_handle(HandleConfig::default());
    probe.fail_nth(MockCallKind::AioSubmit, 2, KcapiError::Transport(5));
    let inputs = random_payloads(3, LEN);

    let (result, _) = run_batch(&inputs, LEN, |i, o| {
        handle.encrypt_aio(i, o, AccessMode::Blocking)
    });

    assert_eq!(result, Err(KcapiError::Transport(5)));
    assert_eq!(probe.count(MockCallKind::AioSubmit), 2);
    assert_eq!(probe.count(MockCallKind::AioRetrieve), 1);
    assert_eq!(probe.count(MockCallKind::AioDrain), 0);
    assert_eq!(probe.count(MockCallKind::SendMeta), 0);
    assert!(handle.completed_reads() <= 3);
}

#[test]
fn test_aio_retrieve_failure_aborts_batch() {
    let (mut handle, probe) = mock_handle(HandleConfig::default());
    probe.fail_nth(MockCallKind::AioRetrieve, 1, KcapiError::Transport(74));
    let inputs = random_payloads(2, LEN);

    let (result, _) = run_batch(&inputs, LEN, |i, o| {
        handle.sign_aio(i, o, AccessMode::Blocking)
    });

    assert_eq!(result.map_err(|e| e.errno()), Err(-74));
    assert_eq!(probe.count(MockCallKind::AioSubmit), 1);
    assert_eq!(probe.count(MockCallKind::AioDrain), 0);
}

#[test]
fn test_aio_drain_would_block() {
    let (mut handle, probe) = mock_handle(HandleConfig::default());
    probe.set_retrieve_policy(RetrievePolicy::Hold);
    probe.fail_nth(MockCallKind::AioDrain, 1, KcapiError::WouldBlock);
    let inputs = random_payloads(2, LEN);

    let (result, _) = run_batch(&inputs, LEN, |i, o| {
        handle.encrypt_aio(i, o, AccessMode::NonBlocking)
    });

    assert_eq!(result, Err(KcapiError::WouldBlock));
    assert_eq!(
        calls_of(&probe, MockCallKind::AioSubmit)[0],
        MockCall::AioSubmit {
            count: 1,
            op: AlgOp::Encrypt,
            access: AccessMode::NonBlocking
        }
    );
}

#[test]
fn test_aio_disabled_verify_falls_back() {
    let config = HandleConfig::default().with_async_disabled(true);
    let (mut handle, probe) = mock_handle(config);
    let inputs = vec![random_payload(24), random_payload(40)];

    let (result, outputs) = run_batch(&inputs, LEN, |i, o| {
        handle.verify_aio(i, o, AccessMode::Blocking)
    });

    assert_eq!(result, Ok(24 + 40));
    assert_eq!(&outputs[0][..24], mock_transform(&inputs[0]).as_slice());
    assert_eq!(&outputs[1][..40], mock_transform(&inputs[1]).as_slice());

    assert_eq!(
        probe.calls(),
        vec![
            MockCall::SendMeta {
                op: AlgOp::Verify,
                len: 0,
                more: true
            },
            MockCall::Vmsplice {
                len: 24,
                more: false
            },
            MockCall::RecvData { capacity: LEN },
            MockCall::Vmsplice {
                len: 40,
                more: false
            },
            MockCall::RecvData { capacity: LEN },
        ]
    );
    assert_eq!(probe.count(MockCallKind::AcceptOp), 0);
    assert_eq!(probe.count(MockCallKind::AioSubmit), 0);
}

#[test]
fn test_fallback_matches_sequential_streaming() {
    let inputs = random_payloads(5, LEN);

    let config = HandleConfig::default().with_async_disabled(true);
    let (mut batched, _probe) = mock_handle(config);
    let (result, batched_out) = run_batch(&inputs, LEN, |i, o| {
        batched.encrypt_aio(i, o, AccessMode::Blocking)
    });

    let (mut streamed, _probe) = mock_handle(HandleConfig::default());
    let mut streamed_out = vec![vec![0u8; LEN]; inputs.len()];
    let mut streamed_total = 0;
    for (input, output) in inputs.iter().zip(streamed_out.iter_mut()) {
        streamed.stream_init_enc(&[]).expect("init");
        streamed
            .stream_update_last(&[IoSlice::new(input)])
            .expect("update_last");
        streamed_total += streamed
            .stream_op(&mut [IoSliceMut::new(output)])
            .expect("stream_op");
    }

    assert_eq!(result, Ok(streamed_total));
    assert_eq!(batched_out, streamed_out);
}

#[test]
fn test_kernel_without_aio_disables_batching() {
    let transport = AlgMockTransport::new();
    let probe = transport.probe();
    probe.set_aio_available(false);

    let mut handle = AkcipherHandle::new(transport, HandleConfig::default());
    assert!(handle.config().async_disabled);

    let inputs = random_payloads(2, LEN);
    let (result, _) = run_batch(&inputs, LEN, |i, o| {
        handle.decrypt_aio(i, o, AccessMode::Blocking)
    });
    assert_eq!(result, Ok(2 * LEN));
    assert_eq!(probe.count(MockCallKind::AioSubmit), 0);
}

#[test]
fn test_accept_not_supported_falls_back() {
    let (mut handle, probe) = mock_handle(HandleConfig::default());
    probe.fail_nth(MockCallKind::AcceptOp, 1, KcapiError::NotSupported);
    let inputs = random_payloads(2, LEN);

    let (result, outputs) = run_batch(&inputs, LEN, |i, o| {
        handle.sign_aio(i, o, AccessMode::Blocking)
    });

    assert_eq!(result, Ok(2 * LEN));
    assert_eq!(outputs[1], mock_transform(&inputs[1]));
    assert_eq!(probe.count(MockCallKind::SendMeta), 1);
    assert_eq!(probe.count(MockCallKind::AioSubmit), 0);
}

#[test]
fn test_accept_failure_is_propagated() {
    let (mut handle, probe) = mock_handle(HandleConfig::default());
    probe.fail_nth(MockCallKind::AcceptOp, 1, KcapiError::Transport(24));
    let inputs = random_payloads(2, LEN);

    let (result, _) = run_batch(&inputs, LEN, |i, o| {
        handle.encrypt_aio(i, o, AccessMode::Blocking)
    });

    assert_eq!(result, Err(KcapiError::Transport(24)));
    assert_eq!(probe.count(MockCallKind::SendMeta), 0);
    assert_eq!(probe.count(MockCallKind::AioSubmit), 0);
}

#[test]
fn test_late_not_supported_does_not_fall_back() {
    let (mut handle, probe) = mock_handle(HandleConfig::default());
    // Support vanishes after the handle decided to batch.
    probe.set_aio_available(false);
    let inputs = random_payloads(2, LEN);

    let (result, _) = run_batch(&inputs, LEN, |i, o| {
        handle.encrypt_aio(i, o, AccessMode::Blocking)
    });

    assert_eq!(result, Err(KcapiError::NotSupported));
    assert_eq!(probe.count(MockCallKind::SendMeta), 0);
}

#[test]
fn test_overreported_completions_are_rejected() {
    let (mut handle, probe) = mock_handle(HandleConfig::default());
    probe.set_retrieve_policy(RetrievePolicy::Overreport);
    let inputs = random_payloads(3, LEN);

    let (result, _) = run_batch(&inputs, LEN, |i, o| {
        handle.encrypt_aio(i, o, AccessMode::Blocking)
    });

    assert_eq!(
        result,
        Err(KcapiError::CompletionMismatch {
            expected: 1,
            reported: 2
        })
    );
    assert!(handle.completed_reads() <= 3);
}

#[test]
fn test_completion_counter_resets_per_batch() {
    let (mut handle, probe) = mock_handle(HandleConfig::default());
    let inputs = random_payloads(3, LEN);

    let (result, _) = run_batch(&inputs, LEN, |i, o| {
        handle.encrypt_aio(i, o, AccessMode::Blocking)
    });
    assert!(result.is_ok());
    assert_eq!(handle.completed_reads(), 3);

    probe.fail_nth(MockCallKind::AcceptOp, 1, KcapiError::Transport(24));
    let (result, _) = run_batch(&inputs[..1], LEN, |i, o| {
        handle.encrypt_aio(i, o, AccessMode::Blocking)
    });
    assert!(result.is_err());
    assert_eq!(handle.completed_reads(), 0);

    let (result, _) = run_batch(&inputs[..2], LEN, |i, o| {
        handle.encrypt_aio(i, o, AccessMode::Blocking)
    });
    assert_eq!(result, Ok(2 * LEN));
    assert_eq!(handle.completed_reads(), 2);
}

#[test]
fn test_aio_rejects_mismatched_lists() {
    let (mut handle, probe) = mock_handle(HandleConfig::default());
    let input = random_payload(LEN);
    let mut a = vec![0u8; LEN];
    let mut b = vec![0u8; LEN];

    let result = handle.encrypt_aio(
        &[IoSlice::new(&input)],
        &mut [IoSliceMut::new(&mut a), IoSliceMut::new(&mut b)],
        AccessMode::Blocking,
    );

    assert_eq!(result, Err(KcapiError::InvalidParameter));
    assert!(probe.calls().is_empty());
}

#[test]
fn test_aio_empty_batch() {
    let (mut handle, probe) = mock_handle(HandleConfig::default());

    assert_eq!(handle.encrypt_aio(&[], &mut [], AccessMode::Blocking), Ok(0));
    assert_eq!(
        probe.calls(),
        vec![MockCall::AcceptOp, MockCall::AioDrain { remaining: 0 }]
    );
}

#[test]
fn test_aio_partial_request_fails_batch_without_resubmit() {
    let (mut handle, probe) = mock_handle(HandleConfig::default());
    probe.set_send_limit(Some(LEN / 2));
    let inputs = random_payloads(3, LEN);

    let (result, _) = run_batch(&inputs, LEN, |i, o| {
        handle.encrypt_aio(i, o, AccessMode::Blocking)
    });

    assert_eq!(
        result,
        Err(KcapiError::ShortTransfer {
            expected: LEN,
            sent: LEN / 2
        })
    );
    assert_eq!(probe.count(MockCallKind::AioSubmit), 1);
    assert_eq!(probe.count(MockCallKind::AioDrain), 0);
    assert_eq!(probe.count(MockCallKind::SendMeta), 0);
}
