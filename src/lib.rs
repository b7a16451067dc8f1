// No unsafe here!
#![deny(unsafe_code)]

#[macro_use]
extern crate lazy_static;
extern crate serde;
#[macro_use]
extern crate serde_prefix;

// Shared (structs) between binaries
pub mod shared_interface;
pub mod cli;
pub mod error;

// Tweet text and word embeddings
pub mod text;

// Handcrafted features
pub mod feature_extraction;

// Classification model
pub mod model;

pub use error::{ClassifierError, Result};
