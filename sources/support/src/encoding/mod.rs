//! String encodings used inside class files.
//!
//! Class files store every `CONSTANT_Utf8` in "modified UTF-8": the NUL character
//! is written as two bytes and supplementary characters are written as a UTF-16
//! surrogate pair, each half encoded on its own.

pub mod mutf8;

pub use mutf8::{decode_modified_utf8, decode_modified_utf8_lossy, encode_modified_utf8};
