// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![warn(missing_docs)]

//! Asymmetric cipher operations over the kernel crypto API.
//!
//! An [`AkcipherHandle`] binds one `akcipher` transform and offers three
//! ways to run operations:
//!
//! - One-shot: [`AkcipherHandle::encrypt`], `decrypt`, `sign`, `verify`.
//! - Streamed: `stream_init_*`, [`AkcipherHandle::stream_update`],
//!   [`AkcipherHandle::stream_update_last`], [`AkcipherHandle::stream_op`].
//! - Batched: [`AkcipherHandle::encrypt_aio`] and friends submit many
//!   independent operations at once and fall back to sequential streaming
//!   when the kernel cannot batch.
//!
//! Input is spliced into the kernel while the handle's page budget
//! ([`HandleConfig::zero_copy_page_threshold`]) lasts and copied otherwise.
//!
//! # Example
//!
//! ```ignore
//! use kcapi_akcipher::*;
//!
//! let alg = KcapiAlg::default();
//! let mut handle = AkcipherHandle::init(&alg, "rsa", HandleConfig::default())?;
//! handle.set_pubkey(&pubkey_der)?;
//!
//! let mut ct = vec![0u8; 256];
//! let len = handle.encrypt(&msg, &mut ct, AccessMode::Blocking)?;
//! ```

mod aio;
mod config;
mod crypt;
mod handle;
mod stream;

pub use config::HandleConfig;
pub use config::ALG_MAX_PAGES;
pub use handle::AkcipherHandle;
pub use handle::AKCIPHER_TYPE;
pub use kcapi_alg::*;
