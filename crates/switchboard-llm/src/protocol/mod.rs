//! Wire format types for each backend API family
//!
//! Plain serde types with no behaviour; building and decoding lives in
//! [`crate::wire`].

pub mod anthropic;
pub mod google;
pub mod ollama;
pub mod openai;
