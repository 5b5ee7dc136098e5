//! Default collaborators backed by third-party crates.

mod image_crate;

pub use image_crate::ImageCrateDecoder;
