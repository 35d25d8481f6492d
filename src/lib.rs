//! Encoder, decoder, and file-format bridges for QOI images.
//!
//! The codec itself lives in [`qoi`] and only ever deals in in-memory pixel
//! buffers and byte streams. [`bridge`] adapts those buffers to and from PNG
//! and raw scanline files; the `qoic` binary built on top of this library
//! wires the bridges and the codec together behind a CLI.
pub mod bridge;
pub mod qoi;
