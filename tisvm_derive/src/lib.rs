//! Derive macros for the tisvm crate.
//!
//! Provides `#[derive(Error)]`: `Display` from `#[error("...")]` messages and
//! an `std::error::Error` impl whose `source()` returns a field named `source`.

mod error;

use proc_macro::TokenStream;

/// Implements `Display` and `std::error::Error` for an error enum or struct.
#[proc_macro_derive(Error, attributes(error))]
pub fn derive_error(input: TokenStream) -> TokenStream {
    error::derive_error(input)
}
