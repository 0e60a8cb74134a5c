// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Kernel crypto API implementation - Linux AF_ALG sockets - Transport module

#![allow(unsafe_code)]

use std::io::IoSlice;
use std::io::IoSliceMut;
use std::os::fd::AsRawFd;
use std::os::fd::FromRawFd;
use std::os::fd::OwnedFd;
use std::os::fd::RawFd;
use std::slice;

use kcapi_alg_interface::*;
use nix::errno::Errno;
use nix::fcntl::fcntl;
use nix::fcntl::splice;
use nix::fcntl::vmsplice;
use nix::fcntl::FcntlArg;
use nix::fcntl::OFlag;
use nix::fcntl::SpliceFFlags;
use nix::sys::socket::accept;
use nix::sys::socket::bind;
use nix::sys::socket::recvmsg;
use nix::sys::socket::sendmsg;
use nix::sys::socket::socket;
use nix::sys::socket::AddressFamily;
use nix::sys::socket::AlgAddr;
use nix::sys::socket::ControlMessage;
use nix::sys::socket::MsgFlags;
use nix::sys::socket::SockFlag;
use nix::sys::socket::SockType;
use nix::unistd::pipe2;
use nix::unistd::sysconf;
use nix::unistd::SysconfVar;

use crate::aio::AioContext;
use crate::aio::MAX_AIO_EVENTS;

// Not exported by libc; defined by the akcipher AF_ALG interface.
const ALG_SET_PUBKEY: libc::c_int = 6;

/// Pages the splice pipe is sized for
const ALG_MAX_PAGES: usize = 16;

/// Kernel crypto API transport over a Linux AF_ALG transform socket
pub struct AlgNixTransport {
    // Dropped first: outstanding requests are reaped while the sockets are open.
    aio: Option<AioContext>,
    aio_access: AccessMode,
    aio_seq: u64,
    tfm: OwnedFd,
    op: Option<OwnedFd>,
    pipe_rd: OwnedFd,
    pipe_wr: OwnedFd,
    pipe_size: usize,
    page_size: usize,
}

impl AlgNixTransport {
    pub(crate) fn open(alg_type: &str, name: &str) -> KcapiResult<Self> {
        tracing::debug!(alg_type, name, "Opening AlgNixTransport");

        let tfm = socket(
            AddressFamily::Alg,
            SockType::SeqPacket,
            SockFlag::SOCK_CLOEXEC,
            None,
        )?;

        let addr = AlgAddr::new(alg_type, name);
        bind(tfm.as_raw_fd(), &addr).map_err(|err| {
            tracing::error!(?err, alg_type, name, "Failed to bind transform");
            err
        })?;

        let (pipe_rd, pipe_wr) = pipe2(OFlag::O_CLOEXEC)?;

        let page_size = system_page_size();

        let wanted = ALG_MAX_PAGES * page_size;
        let pipe_size = match fcntl(
            pipe_wr.as_raw_fd(),
            FcntlArg::F_SETPIPE_SZ(wanted as libc::c_int),
        ) {
            Ok(size) => size as usize,
            Err(err) => {
                tracing::warn!(?err, wanted, "Failed to resize splice pipe");
                wanted
            }
        };

        let aio = match AioContext::new(MAX_AIO_EVENTS) {
            Ok(ctx) => Some(ctx),
            Err(err) => {
                tracing::warn!(?err, "Kernel AIO unavailable");
                None
            }
        };

        Ok(Self {
            aio,
            aio_access: AccessMode::Blocking,
            aio_seq: 0,
            tfm,
            op: None,
            pipe_rd,
            pipe_wr,
            pipe_size,
            page_size,
        })
    }

    fn op_fd(&mut self) -> KcapiResult<RawFd> {
        self.accept_op()?;
        self.op
            .as_ref()
            .map(|fd| fd.as_raw_fd())
            .ok_or(KcapiError::InvalidParameter)
    }

    fn setsockopt(&self, optname: libc::c_int, key: &[u8]) -> KcapiResult<()> {
        // SAFETY: `key` points to `key.len()` readable bytes for the duration of the call.
        let ret = unsafe {
            libc::setsockopt(
                self.tfm.as_raw_fd(),
                libc::SOL_ALG,
                optname,
                key.as_ptr().cast(),
                key.len() as libc::socklen_t,
            )
        };
        Errno::result(ret).map_err(|err| {
            tracing::error!(?err, optname, "Failed to install key");
            err
        })?;
        Ok(())
    }
}

fn system_page_size() -> usize {
    match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(size)) if size > 0 => size as usize,
        _ => DEFAULT_PAGE_SIZE,
    }
}

/// Repeat `step` with the bytes still to move until all `len` are moved.
/// A step that moves nothing ends the transfer short.
fn transfer_all<F>(len: usize, mut step: F) -> KcapiResult<usize>
where
    F: FnMut(usize) -> KcapiResult<usize>,
{
    let mut moved = 0;
    while moved < len {
        match step(len - moved)? {
            0 => {
                return Err(KcapiError::ShortTransfer {
                    expected: len,
                    sent: moved,
                })
            }
            n => moved += n,
        }
    }
    Ok(moved)
}

fn more_flags(more: bool) -> MsgFlags {
    if more {
        MsgFlags::from_bits_retain(libc::MSG_MORE)
    } else {
        MsgFlags::empty()
    }
}

fn access_flags(access: AccessMode) -> MsgFlags {
    match access {
        AccessMode::Blocking => MsgFlags::empty(),
        AccessMode::NonBlocking => MsgFlags::MSG_DONTWAIT,
    }
}

impl AlgTransport for AlgNixTransport {
    fn set_key(&mut self, key: &[u8]) -> KcapiResult<()> {
        tracing::debug!(len = key.len(), "Setting private key");
        self.setsockopt(libc::ALG_SET_KEY, key)
    }

    fn set_pubkey(&mut self, key: &[u8]) -> KcapiResult<()> {
        tracing::debug!(len = key.len(), "Setting public key");
        self.setsockopt(ALG_SET_PUBKEY, key)
    }

    fn accept_op(&mut self) -> KcapiResult<()> {
        if self.op.is_some() {
            return Ok(());
        }

        let fd = accept(self.tfm.as_raw_fd()).map_err(|err| {
            tracing::error!(?err, "Failed to accept operation socket");
            err
        })?;

        // SAFETY: accept returned a freshly opened descriptor that nothing else owns.
        self.op = Some(unsafe { OwnedFd::from_raw_fd(fd) });
        Ok(())
    }

    fn aio_available(&self) -> bool {
        self.aio.is_some()
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn splice_capacity(&self) -> usize {
        self.pipe_size
    }

    fn send_meta(&mut self, iov: &[IoSlice<'_>], op: AlgOp, more: bool) -> KcapiResult<usize> {
        let fd = self.op_fd()?;
        let op_code: libc::c_int = op.code();
        let cmsgs = [ControlMessage::AlgSetOp(&op_code)];

        let sent = sendmsg::<()>(fd, iov, &cmsgs, more_flags(more), None).map_err(|err| {
            tracing::error!(?err, ?op, "Failed to send metadata");
            err
        })?;
        Ok(sent)
    }

    fn send_data(&mut self, iov: &[IoSlice<'_>], more: bool) -> KcapiResult<usize> {
        let fd = self.op_fd()?;

        let sent = sendmsg::<()>(fd, iov, &[], more_flags(more), None).map_err(|err| {
            tracing::error!(?err, "Failed to send data");
            err
        })?;
        Ok(sent)
    }

    fn vmsplice(&mut self, iov: &[IoSlice<'_>], more: bool) -> KcapiResult<usize> {
        let len: usize = iov.iter().map(|v| v.len()).sum();
        if len > self.pipe_size {
            tracing::debug!(len, pipe_size = self.pipe_size, "Chunk exceeds pipe, using sendmsg");
            return self.send_data(iov, more);
        }

        self.accept_op()?;
        let Some(op) = self.op.as_ref() else {
            return Err(KcapiError::InvalidParameter);
        };

        let queued = vmsplice(&self.pipe_wr, iov, SpliceFFlags::SPLICE_F_GIFT)?;
        let flags = if more {
            SpliceFFlags::SPLICE_F_MORE
        } else {
            SpliceFFlags::empty()
        };

        // The pipe must be empty when this returns, or the next request
        // would start with stale bytes.
        let spliced = transfer_all(queued, |left| {
            Ok(splice(&self.pipe_rd, None, op, None, left, flags)?)
        })
        .map_err(|err| {
            tracing::error!(?err, queued, "Failed to splice into operation socket");
            err
        })?;

        if queued != len {
            tracing::error!(len, queued, "vmsplice queued a partial chunk");
            return Err(KcapiError::ShortTransfer {
                expected: len,
                sent: queued,
            });
        }
        Ok(spliced)
    }

    fn recv_data(
        &mut self,
        iov: &mut [IoSliceMut<'_>],
        access: AccessMode,
    ) -> KcapiResult<usize> {
        let fd = self.op_fd()?;

        let msg = recvmsg::<()>(fd, iov, None, access_flags(access))?;
        Ok(msg.bytes)
    }

    fn aio_submit(
        &mut self,
        inputs: &[IoSlice<'_>],
        outputs: &mut [IoSliceMut<'_>],
        access: AccessMode,
        op: AlgOp,
    ) -> KcapiResult<usize> {
        if inputs.len() != outputs.len() {
            return Err(KcapiError::InvalidParameter);
        }
        let fd = self.op_fd()?;
        let Some(aio) = self.aio.as_mut() else {
            return Err(KcapiError::NotSupported);
        };

        self.aio_access = access;
        let op_code: libc::c_int = op.code();
        let flags = access_flags(access);

        for (index, (input, output)) in inputs.iter().zip(outputs.iter_mut()).enumerate() {
            let cmsgs = [ControlMessage::AlgSetOp(&op_code)];
            let tag = self.aio_seq;

            let res = sendmsg::<()>(fd, slice::from_ref(input), &cmsgs, flags, None)
                .map_err(KcapiError::from)
                .and_then(|sent| {
                    if sent != input.len() {
                        return Err(KcapiError::ShortTransfer {
                            expected: input.len(),
                            sent,
                        });
                    }
                    aio.submit_read(fd, output, tag)
                });

            // Once sendmsg succeeded the request data is in the kernel, so a
            // failed element cannot be resubmitted. The whole batch fails.
            if let Err(err) = res {
                tracing::error!(?err, ?op, index, "AIO submission failed");
                aio.reap_all();
                return Err(err);
            }
            self.aio_seq = self.aio_seq.wrapping_add(1);
        }

        Ok(inputs.len())
    }

    fn aio_retrieve(&mut self, expected: usize) -> KcapiResult<AioCompletion> {
        let wait = self.aio_access == AccessMode::Blocking;
        let Some(aio) = self.aio.as_mut() else {
            return Err(KcapiError::NotSupported);
        };

        aio.get_events(expected, expected, wait).map_err(|err| {
            aio.reap_all();
            err
        })
    }

    fn aio_drain(&mut self, remaining: usize) -> KcapiResult<AioCompletion> {
        let Some(aio) = self.aio.as_mut() else {
            return Err(KcapiError::NotSupported);
        };

        // Always waits: the outstanding requests still reference caller buffers.
        let mut total = AioCompletion::default();
        while total.completed < remaining && aio.inflight() > 0 {
            let want = remaining - total.completed;
            match aio.get_events(want, want, true) {
                Ok(completion) => {
                    total.completed += completion.completed;
                    total.bytes += completion.bytes;
                }
                Err(err) => {
                    aio.reap_all();
                    return Err(err);
                }
            }
        }

        Ok(total)
    }
}
