// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Kernel crypto API implementation - Linux AF_ALG sockets - Provider module

use kcapi_alg_interface::Alg;
use kcapi_alg_interface::KcapiResult;

use crate::transport::AlgNixTransport;

/// Kernel crypto API provider backed by Linux AF_ALG sockets
#[derive(Default, Debug)]
pub struct AlgNix {}

impl Alg for AlgNix {
    type Transport = AlgNixTransport;

    /// Open a transform
    ///
    /// # Arguments
    /// * `alg_type`    - Transform type, e.g. `akcipher`
    /// * `name`        - Cipher name, e.g. `rsa`
    ///
    /// # Returns
    /// * `Self::Transport` - Transport bound to the transform
    ///
    /// # Error
    /// * `KcapiError` - Error encountered while binding the socket
    fn open(&self, alg_type: &str, name: &str) -> KcapiResult<Self::Transport> {
        AlgNixTransport::open(alg_type, name)
    }
}
