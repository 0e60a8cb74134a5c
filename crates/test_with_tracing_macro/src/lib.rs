// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Proc macro for `#[test_with_tracing::test]`.
//!
//! Expands to a standard `#[test]` whose body first installs the tracing
//! subscriber from `test_with_tracing::init`. Return types such as
//! `Result<(), E>` are preserved.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::parse_macro_input;
use syn::ItemFn;

/// Attribute macro replacing `#[test]`.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return syn::Error::new(Span::call_site(), "`test` takes no arguments")
            .to_compile_error()
            .into();
    }

    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = parse_macro_input!(item as ItemFn);

    quote! {
        #[::core::prelude::v1::test]
        #(#attrs)*
        #vis #sig {
            ::test_with_tracing::init();
            #block
        }
    }
    .into()
}
