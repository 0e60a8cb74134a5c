// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![warn(missing_docs)]

//! Kernel crypto API (AF_ALG) transport library

pub use kcapi_alg_interface::*;

cfg_if::cfg_if! {
    if #[cfg(feature = "mock")] {
        /// Kernel crypto API provider
        pub type KcapiAlg = kcapi_alg_mock::AlgMock;
    } else if #[cfg(target_os = "linux")] {
        /// Kernel crypto API provider
        pub type KcapiAlg = kcapi_alg_nix::AlgNix;
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(feature = "mock", target_os = "linux"))] {
        /// Transport opened by [`KcapiAlg`]
        pub type KcapiTransport = <KcapiAlg as Alg>::Transport;
    }
}
