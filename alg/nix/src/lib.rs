// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![warn(missing_docs)]

//! Kernel crypto API implementation - Linux AF_ALG sockets

#![cfg(target_os = "linux")]

mod aio;
mod alg;
mod transport;

pub use alg::AlgNix;
pub use transport::AlgNixTransport;
