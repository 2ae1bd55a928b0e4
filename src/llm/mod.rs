//! Model collaborator layer: client traits, HTTP transport, JSON extraction.

pub mod client;
pub mod json;

pub use client::{
    HttpTextModel, ImageModel, MockTextModel, ModelError, TextModel, TextRequest,
};
pub use json::{extract_json, parse_response};
