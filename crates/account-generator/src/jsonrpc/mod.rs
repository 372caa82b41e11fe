//! JSON-RPC request decoding.

pub mod decoder;

pub use decoder::JsonDecoder;
