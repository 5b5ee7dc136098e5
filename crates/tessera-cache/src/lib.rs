#![forbid(unsafe_code)]

//! Resource cache.
//!
//! Sources own files; files own a texture on the display surface plus, when
//! they came out of a compressed payload, a raw-byte shadow the texture can be
//! rebuilt from after the surface invalidates it.

mod cache;

pub use cache::{NewFile, RawShadow, ResourceCache};
