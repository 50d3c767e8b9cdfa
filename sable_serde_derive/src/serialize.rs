use proc_macro::TokenStream;
use quote::quote;

pub fn impl_serialize(ast: &syn::DeriveInput) -> TokenStream {
    let name = &ast.ident;
    let body = match ast.data {
        syn::Data::Struct(ref data) => {
            let statements: Vec<proc_macro2::TokenStream> = data
                .fields
                .iter()
                .enumerate()
                .map(|(index, field)| serialize_field(field, index))
                .collect();
            quote! { #(#statements)* }
        }
        syn::Data::Enum(ref data) => {
            let arms: Vec<proc_macro2::TokenStream> = data
                .variants
                .iter()
                .map(|variant| serialize_variant(variant, name))
                .collect();
            quote! {
                match *self {
                    #(#arms)*
                }
            }
        }
        syn::Data::Union(_) => panic!("BtcSerialize cannot be derived for unions"),
    };

    let expanded = quote! {
        impl BitcoinSerialize for #name {
            fn bitcoin_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
            where
                W: std::io::Write,
            {
                #body
                Ok(())
            }
        }
    };
    TokenStream::from(expanded)
}

fn serialize_field(field: &syn::Field, index: usize) -> proc_macro2::TokenStream {
    match field.ident {
        Some(ref id) => quote! { self.#id.bitcoin_serialize(&mut target)?; },
        None => {
            let index = syn::Index::from(index);
            quote! { self.#index.bitcoin_serialize(&mut target)?; }
        }
    }
}

fn serialize_variant(variant: &syn::Variant, name: &syn::Ident) -> proc_macro2::TokenStream {
    let ident = &variant.ident;
    match variant.fields {
        syn::Fields::Named(ref fields) => {
            let bindings: Vec<&syn::Ident> = fields
                .named
                .iter()
                .map(|field| field.ident.as_ref().expect("named field has an ident"))
                .collect();
            let statements: Vec<proc_macro2::TokenStream> = bindings
                .iter()
                .map(|id| quote! { #id.bitcoin_serialize(&mut target)?; })
                .collect();
            quote! {
                #name::#ident { #(ref #bindings,)* } => {
                    #(#statements)*
                }
            }
        }
        syn::Fields::Unnamed(ref fields) => {
            let bindings: Vec<syn::Ident> = (0..fields.unnamed.len())
                .map(|i| quote::format_ident!("field_{}", i))
                .collect();
            let statements: Vec<proc_macro2::TokenStream> = bindings
                .iter()
                .map(|id| quote! { #id.bitcoin_serialize(&mut target)?; })
                .collect();
            quote! {
                #name::#ident ( #(ref #bindings,)* ) => {
                    #(#statements)*
                }
            }
        }
        syn::Fields::Unit => quote! { #name::#ident => {} },
    }
}
