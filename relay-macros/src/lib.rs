//! `#[remote_trait]`: derives the boilerplate [`relay_core::Exposed`]
//! dispatcher and a typed client proxy from a plain async trait, the way
//! `ic-cdk-macros`'s export attributes turn a plain function into the
//! canister-call boilerplate it needs.
//!
//! Input:
//!
//! ```ignore
//! #[relay_macros::remote_trait]
//! #[async_trait::async_trait]
//! pub trait Counter {
//!     async fn increment(&self, by: i64) -> i64;
//!     async fn value(&self) -> i64;
//! }
//! ```
//!
//! emits, alongside the trait itself:
//! - `CounterExposed<T>`, wrapping any `Arc<T: Counter>` as a
//!   [`relay_core::Exposed`] that dispatches `APPLY` by method name;
//! - `CounterProxy`, a thin wrapper over `Arc<relay_core::RemoteHandle>`
//!   with one async method per trait method, each doing one `APPLY`
//!   round trip and decoding the JSON result back to the declared return
//!   type.
//!
//! Every parameter and the return type must be `Serialize +
//! DeserializeOwned`; every method must take `&self` and no other
//! receiver. GET/SET are not generated — a `#[remote_trait]` trait models
//! a callable surface, not addressable fields (use a hand-written
//! [`relay_core::Exposed`] impl when property-style access is needed).

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{FnArg, Ident, ItemTrait, Pat, ReturnType, TraitItem, TraitItemFn, Type};

#[proc_macro_attribute]
pub fn remote_trait(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(item as ItemTrait);
    match expand(&input) {
        Ok(generated) => {
            let mut out = quote! { #input };
            out.extend(generated);
            out.into()
        }
        Err(err) => {
            let mut out = quote! { #input };
            out.extend(err.to_compile_error());
            out.into()
        }
    }
}

struct Method {
    name: Ident,
    args: Vec<(Ident, Box<Type>)>,
    output: Box<Type>,
}

fn expand(item: &ItemTrait) -> syn::Result<TokenStream2> {
    let trait_name = &item.ident;
    let exposed_name = format_ident!("{}Exposed", trait_name);
    let proxy_name = format_ident!("{}Proxy", trait_name);

    let mut methods = Vec::new();
    for member in &item.items {
        let TraitItem::Fn(method) = member else { continue };
        methods.push(parse_method(method)?);
    }

    let dispatch_arms = methods.iter().map(|m| dispatch_arm(m));
    let proxy_methods = methods.iter().map(|m| proxy_method(m));

    Ok(quote! {
        /// Wraps any implementor of the trait above as a dispatchable
        /// object: one `APPLY` arm per method, matched by name at path
        /// depth one.
        pub struct #exposed_name<T: #trait_name + Send + Sync + 'static> {
            inner: ::std::sync::Arc<T>,
        }

        impl<T: #trait_name + Send + Sync + 'static> #exposed_name<T> {
            pub fn new(inner: ::std::sync::Arc<T>) -> ::std::sync::Arc<Self> {
                ::std::sync::Arc::new(Self { inner })
            }
        }

        // The caller's crate must depend on `async-trait` directly (the
        // same dependency the trait definition above is already
        // decorated with); this macro only emits a path reference to it.
        #[::async_trait::async_trait]
        impl<T: #trait_name + Send + Sync + 'static> ::relay_core::Exposed for #exposed_name<T> {
            fn get(&self, path: &[::relay_core::PathSegment]) -> ::std::result::Result<::relay_core::ExposedValue, ::relay_core::DispatchError> {
                ::std::result::Result::Err(::relay_core::DispatchError::NoSuchPath(path.to_vec()))
            }

            fn set(&self, path: &[::relay_core::PathSegment], _value: ::relay_core::RemoteValue) -> ::std::result::Result<(), ::relay_core::DispatchError> {
                ::std::result::Result::Err(::relay_core::DispatchError::NoSuchPath(path.to_vec()))
            }

            async fn apply(
                &self,
                path: &[::relay_core::PathSegment],
                args: ::std::vec::Vec<::relay_core::RemoteValue>,
            ) -> ::std::result::Result<::relay_core::ExposedValue, ::relay_core::DispatchError> {
                match path {
                    #(#dispatch_arms)*
                    _ => ::std::result::Result::Err(::relay_core::DispatchError::NotCallable),
                }
            }

            async fn construct(
                &self,
                _path: &[::relay_core::PathSegment],
                _args: ::std::vec::Vec<::relay_core::RemoteValue>,
            ) -> ::std::result::Result<::std::sync::Arc<dyn ::relay_core::Exposed>, ::relay_core::DispatchError> {
                ::std::result::Result::Err(::relay_core::DispatchError::NotConstructible)
            }
        }

        /// Typed client wrapper over a [`relay_core::RemoteHandle`]: one
        /// async method per trait method, each a single `APPLY` round
        /// trip.
        pub struct #proxy_name {
            handle: ::std::sync::Arc<::relay_core::RemoteHandle>,
        }

        impl #proxy_name {
            pub fn new(handle: ::std::sync::Arc<::relay_core::RemoteHandle>) -> Self {
                Self { handle }
            }

            #(#proxy_methods)*
        }
    })
}

fn parse_method(method: &TraitItemFn) -> syn::Result<Method> {
    if method.sig.asyncness.is_none() {
        return Err(syn::Error::new_spanned(&method.sig, "remote_trait methods must be `async fn`"));
    }
    let mut args = Vec::new();
    for input in method.sig.inputs.iter() {
        match input {
            FnArg::Receiver(r) => {
                if r.reference.is_none() {
                    return Err(syn::Error::new_spanned(r, "remote_trait methods must take `&self`"));
                }
            }
            FnArg::Typed(pat_type) => {
                let Pat::Ident(ident) = pat_type.pat.as_ref() else {
                    return Err(syn::Error::new_spanned(&pat_type.pat, "remote_trait arguments must be simple identifiers"));
                };
                args.push((ident.ident.clone(), pat_type.ty.clone()));
            }
        }
    }
    let output = match &method.sig.output {
        ReturnType::Default => Box::new(syn::parse_quote!(())),
        ReturnType::Type(_, ty) => ty.clone(),
    };
    Ok(Method { name: method.sig.ident.clone(), args, output })
}

fn dispatch_arm(method: &Method) -> TokenStream2 {
    let name = &method.name;
    let name_str = name.to_string();
    let arg_idents: Vec<Ident> = method.args.iter().map(|(n, _)| n.clone()).collect();
    let decodes = method.args.iter().enumerate().map(|(i, (ident, ty))| {
        quote! {
            let #ident: #ty = match args.get(#i).cloned() {
                ::std::option::Option::Some(::relay_core::RemoteValue::Json(v)) => {
                    ::serde_json::from_value(v).map_err(|e| ::relay_core::DispatchError::Unserializable(e.to_string()))?
                }
                _ => return ::std::result::Result::Err(::relay_core::DispatchError::Unserializable(
                    ::std::format!("missing or non-JSON argument {} to {}", #i, #name_str),
                )),
            };
        }
    });
    quote! {
        [seg] if seg == #name_str => {
            #(#decodes)*
            let result = self.inner.#name(#(#arg_idents),*).await;
            ::relay_core::ExposedValue::json(&result)
        }
    }
}

fn proxy_method(method: &Method) -> TokenStream2 {
    let name = &method.name;
    let name_str = name.to_string();
    let output = &method.output;
    let params = method.args.iter().map(|(n, ty)| quote! { #n: #ty });
    let encodes = method.args.iter().map(|(n, _)| {
        quote! {
            ::relay_core::ExposedValue::json(&#n).map_err(|e: ::relay_core::DispatchError| ::relay_core::RemoteError::Remote(
                ::relay_core::ThrownValue::error("TypeError", e.to_string()),
            ))?
        }
    });
    quote! {
        pub async fn #name(&self, #(#params),*) -> ::std::result::Result<#output, ::relay_core::RemoteError> {
            let args = ::std::vec![#(#encodes),*];
            let result = self.handle.field(#name_str).apply(args).await?;
            let value = result.into_json()?;
            ::serde_json::from_value(value).map_err(|_| ::relay_core::RemoteError::Unserializable)
        }
    }
}
