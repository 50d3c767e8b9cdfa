use proc_macro::TokenStream;
use quote::quote;

pub fn impl_deserialize(ast: &syn::DeriveInput) -> TokenStream {
    let name = &ast.ident;
    let data = match ast.data {
        syn::Data::Struct(ref data) => data,
        // Enum encodings carry a discriminant whose layout is type-specific,
        // so enums implement BitcoinDeserialize by hand.
        _ => panic!("BtcDeserialize can only be derived for structs"),
    };

    let constructor = match data.fields {
        syn::Fields::Named(ref fields) => {
            let statements: Vec<proc_macro2::TokenStream> = fields
                .named
                .iter()
                .map(|field| {
                    let id = field.ident.as_ref().expect("named field has an ident");
                    let ty = &field.ty;
                    quote! { #id: <#ty as BitcoinDeserialize>::bitcoin_deserialize(&mut target)?, }
                })
                .collect();
            quote! { #name { #(#statements)* } }
        }
        syn::Fields::Unnamed(ref fields) => {
            let statements: Vec<proc_macro2::TokenStream> = fields
                .unnamed
                .iter()
                .map(|field| {
                    let ty = &field.ty;
                    quote! { <#ty as BitcoinDeserialize>::bitcoin_deserialize(&mut target)?, }
                })
                .collect();
            quote! { #name ( #(#statements)* ) }
        }
        syn::Fields::Unit => quote! { #name },
    };

    let expanded = quote! {
        impl BitcoinDeserialize for #name {
            fn bitcoin_deserialize<R: std::io::Read>(
                mut target: R,
            ) -> Result<Self, SerializationError> {
                Ok(#constructor)
            }
        }
    };
    TokenStream::from(expanded)
}
