//! Derive macros for the bytemachine crate.
//!
//! Provides:
//! - `#[derive(Error)]` - `Display` and `Error` boilerplate for the VM's error enums

mod error;

use proc_macro::TokenStream;

/// Automatically implements `Display` and `Error` traits for error types.
#[proc_macro_derive(Error, attributes(error, error_code))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
