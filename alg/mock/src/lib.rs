// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![warn(missing_docs)]

//! Kernel crypto API implementation - In-process mock provider

mod alg;
mod transport;

pub use alg::AlgMock;
pub use transport::mock_transform;
pub use transport::AlgMockTransport;
pub use transport::MockCall;
pub use transport::MockCallKind;
pub use transport::MockProbe;
pub use transport::RetrievePolicy;
pub use transport::MOCK_XOR_MASK;
