// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Kernel crypto API implementation - Linux AF_ALG sockets - Kernel AIO module

#![allow(unsafe_code)]

use std::io::IoSliceMut;
use std::os::fd::RawFd;
use std::ptr;

use kcapi_alg_interface::AioCompletion;
use kcapi_alg_interface::KcapiError;
use kcapi_alg_interface::KcapiResult;
use nix::errno::Errno;

/// Maximum number of requests in flight on one AIO context
pub(crate) const MAX_AIO_EVENTS: usize = 128;

const IOCB_CMD_PREAD: u16 = 0;

type AioContextId = libc::c_ulong;

/// `struct iocb` from linux/aio_abi.h
#[derive(Default)]
#[repr(C)]
struct IoCb {
    aio_data: u64,
    #[cfg(target_endian = "little")]
    aio_key: u32,
    aio_rw_flags: i32,
    #[cfg(target_endian = "big")]
    aio_key: u32,
    aio_lio_opcode: u16,
    aio_reqprio: i16,
    aio_fildes: u32,
    aio_buf: u64,
    aio_nbytes: u64,
    aio_offset: i64,
    aio_reserved2: u64,
    aio_flags: u32,
    aio_resfd: u32,
}

/// `struct io_event` from linux/aio_abi.h
#[derive(Default, Clone, Copy)]
#[repr(C)]
struct IoEvent {
    data: u64,
    obj: u64,
    res: i64,
    res2: i64,
}

/// Kernel AIO context owning the requests submitted on one transform
pub(crate) struct AioContext {
    ctx: AioContextId,
    inflight: usize,
}

impl AioContext {
    /// Set up a context. Fails with `ENOSYS` on kernels built without AIO.
    pub(crate) fn new(nr_events: usize) -> KcapiResult<Self> {
        let mut ctx: AioContextId = 0;

        // SAFETY: io_setup writes the context id into `ctx`, which is valid for writes.
        let ret = unsafe {
            libc::syscall(
                libc::SYS_io_setup,
                nr_events as libc::c_long,
                &mut ctx as *mut AioContextId,
            )
        };
        Errno::result(ret)?;

        Ok(Self { ctx, inflight: 0 })
    }

    pub(crate) fn inflight(&self) -> usize {
        self.inflight
    }

    /// Queue a read of the next result on `fd` into `buf`.
    ///
    /// The caller keeps `buf` borrowed until the request has been reaped.
    pub(crate) fn submit_read(
        &mut self,
        fd: RawFd,
        buf: &mut IoSliceMut<'_>,
        tag: u64,
    ) -> KcapiResult<()> {
        if self.inflight >= MAX_AIO_EVENTS {
            return Err(KcapiError::WouldBlock);
        }

        let mut cb = IoCb {
            aio_data: tag,
            aio_lio_opcode: IOCB_CMD_PREAD,
            aio_fildes: fd as u32,
            aio_buf: buf.as_mut_ptr() as u64,
            aio_nbytes: buf.len() as u64,
            ..Default::default()
        };
        let mut cbs = [&mut cb as *mut IoCb];

        // SAFETY: The iocb array is valid for the duration of the call and the
        // kernel copies it. The buffer it points to outlives the request because
        // every path reaps in-flight requests before the buffer borrow ends.
        let ret = unsafe {
            libc::syscall(
                libc::SYS_io_submit,
                self.ctx,
                1 as libc::c_long,
                cbs.as_mut_ptr(),
            )
        };
        if Errno::result(ret)? != 1 {
            return Err(KcapiError::WouldBlock);
        }

        self.inflight += 1;
        Ok(())
    }

    /// Reap between `min` and `max` completions. Without `wait` only the
    /// completions that are already available are returned.
    pub(crate) fn get_events(
        &mut self,
        min: usize,
        max: usize,
        wait: bool,
    ) -> KcapiResult<AioCompletion> {
        let max = max.min(self.inflight).min(MAX_AIO_EVENTS);
        if max == 0 {
            return Ok(AioCompletion::default());
        }
        let min = if wait { min.min(max) } else { 0 };

        let mut events = [IoEvent::default(); MAX_AIO_EVENTS];
        let mut no_wait = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        let timeout = if wait {
            ptr::null_mut()
        } else {
            &mut no_wait as *mut libc::timespec
        };

        let reaped = loop {
            // SAFETY: `events` holds MAX_AIO_EVENTS entries and at most `max`
            // are written. `timeout` is null or points to a live timespec.
            let ret = unsafe {
                libc::syscall(
                    libc::SYS_io_getevents,
                    self.ctx,
                    min as libc::c_long,
                    max as libc::c_long,
                    events.as_mut_ptr(),
                    timeout,
                )
            };
            match Errno::result(ret) {
                Ok(n) => break n as usize,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
        };
        self.inflight -= reaped;

        let mut completion = AioCompletion {
            completed: reaped,
            bytes: 0,
        };
        let mut failure = None;
        for event in &events[..reaped] {
            if event.res < 0 {
                tracing::error!(tag = event.data, res = event.res, "AIO request failed");
                failure.get_or_insert(KcapiError::from_errno(event.res as i32));
            } else {
                completion.bytes += event.res as usize;
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(completion),
        }
    }

    /// Wait for every in-flight request, discarding the results.
    pub(crate) fn reap_all(&mut self) {
        while self.inflight > 0 {
            let before = self.inflight;
            if let Err(err) = self.get_events(before, before, true) {
                if self.inflight == before {
                    tracing::error!(?err, inflight = before, "Failed to reap AIO requests");
                    return;
                }
            }
        }
    }
}

impl Drop for AioContext {
    fn drop(&mut self) {
        self.reap_all();

        // SAFETY: `ctx` was returned by io_setup and is destroyed exactly once.
        let ret = unsafe { libc::syscall(libc::SYS_io_destroy, self.ctx) };
        if let Err(err) = Errno::result(ret) {
            tracing::warn!(?err, "io_destroy failed");
        }
    }
}
