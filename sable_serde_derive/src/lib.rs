//! Derive macros for the `BitcoinSerialize` and `BitcoinDeserialize` traits.
//!
//! The expanded impls simply serialize each field in declaration order, so
//! these derives are only correct for types whose consensus encoding is the
//! concatenation of their fields' encodings. Types with markers, flags, or
//! length prefixes that depend on other fields (notably witness-bearing
//! transactions) implement the traits by hand.
extern crate proc_macro;
use proc_macro::TokenStream;

mod deserialize;
mod serialize;

#[proc_macro_derive(BtcSerialize)]
pub fn serializable(input: TokenStream) -> TokenStream {
    let ast = syn::parse(input).expect("BtcSerialize input parses as a derive item");
    serialize::impl_serialize(&ast)
}

#[proc_macro_derive(BtcDeserialize)]
pub fn deserializable(input: TokenStream) -> TokenStream {
    let ast = syn::parse(input).expect("BtcDeserialize input parses as a derive item");
    deserialize::impl_deserialize(&ast)
}
