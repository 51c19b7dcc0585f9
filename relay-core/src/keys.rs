//! Distinguished intrinsic tags (spec §6).
//!
//! The source system's release capability, endpoint capability, and
//! finalizer hook are all reached through intercepted property/function
//! traps keyed on reserved strings, because that system has no other way
//! to surface a capability on an object. Rust's `Exposed`/`RemoteHandle`
//! pair has an explicit navigation API instead (`RemoteHandle::release()`,
//! `RemoteHandle::endpoint_channel()`, `Exposed::finalize()`), so those
//! three capabilities are plain methods here and need no reserved path
//! segment at all.
//!
//! `"bind"` is different: spec P5 requires it to be recognized as an
//! ordinary *user-chosen* terminal path segment — any exposed method
//! happens to be named `bind` — and treated as a local no-op by the
//! proxy before it would otherwise become a wire call. That check has to
//! live in [`crate::proxy::RemoteHandle::apply`], so the key is still a
//! real constant.

/// Thenable key: at the root path this short-circuits `await` without a
/// round trip (spec P6); at any deeper path it behaves like a `GET`. Read
/// by [`crate::proxy::RemoteHandle::is_guarded_then`], the guard
/// [`crate::proxy::RemoteHandle`]'s `IntoFuture` impl consults.
pub const THEN_KEY: &str = "then";

/// The `bind` no-op (spec §4.2, P5): calling `.apply(..)` on a handle
/// whose terminal path segment is this string is equivalent to dropping
/// that segment and returning the parent proxy, with no wire traffic.
pub const BIND_KEY: &str = "bind";
