// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Kernel crypto API implementation - In-process mock provider - Provider module

use kcapi_alg_interface::Alg;
use kcapi_alg_interface::KcapiError;
use kcapi_alg_interface::KcapiResult;

use crate::transport::AlgMockTransport;

/// Transform type served by the mock
const MOCK_ALG_TYPE: &str = "akcipher";

/// Kernel crypto API provider backed by an in-process mock
#[derive(Default, Debug)]
pub struct AlgMock {}

impl Alg for AlgMock {
    type Transport = AlgMockTransport;

    /// Open a transform
    ///
    /// # Arguments
    /// * `alg_type`    - Transform type, only `akcipher` is served
    /// * `name`        - Cipher name, any non-empty name is accepted
    ///
    /// # Returns
    /// * `Self::Transport` - Mock transport
    ///
    /// # Error
    /// * `KcapiError` - Unknown transform type or empty name
    #[tracing::instrument]
    fn open(&self, alg_type: &str, name: &str) -> KcapiResult<Self::Transport> {
        if alg_type != MOCK_ALG_TYPE {
            tracing::warn!(alg_type, "Mock does not serve this transform type");
            return Err(KcapiError::NotSupported);
        }
        if name.is_empty() {
            return Err(KcapiError::InvalidParameter);
        }

        tracing::debug!(name, "Opening AlgMockTransport");
        Ok(AlgMockTransport::new())
    }
}
