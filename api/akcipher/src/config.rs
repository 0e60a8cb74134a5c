// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Handle configuration

/// Default zero-copy page budget, the kernel's `ALG_MAX_PAGES`
pub const ALG_MAX_PAGES: usize = 16;

/// Policy carried by one handle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandleConfig {
    /// Never use batched asynchronous submission; batched calls run the
    /// sequential fallback instead
    pub async_disabled: bool,

    /// Pages that may be in flight through zero-copy submission before
    /// chunks are copied through the socket buffer instead
    pub zero_copy_page_threshold: usize,
}

impl Default for HandleConfig {
    fn default() -> Self {
        Self {
            async_disabled: false,
            zero_copy_page_threshold: ALG_MAX_PAGES,
        }
    }
}

impl HandleConfig {
    /// Set [`HandleConfig::async_disabled`]
    pub fn with_async_disabled(mut self, disabled: bool) -> Self {
        self.async_disabled = disabled;
        self
    }

    /// Set [`HandleConfig::zero_copy_page_threshold`]
    pub fn with_zero_copy_page_threshold(mut self, pages: usize) -> Self {
        self.zero_copy_page_threshold = pages;
        self
    }
}
