//! Session action implementations.
//!
//! One module per inbound action name.

pub mod find_duplicate_images;

pub use find_duplicate_images::find_duplicate_images_impl;
