//! Shared surface of the in-memory virtual file system.
//!
//! This crate holds everything the engine and a host-language binding have in
//! common: the flag and mode constants, the metadata projections
//! ([`types::Stat`], [`types::Statx`]), the error surface ([`error::Errno`],
//! [`error::ApiError`]), the operation traits the engine implements
//! ([`fs`]), and the two external collaborators the engine treats as opaque:
//! the wall clock ([`clock`]) and the durable dump image ([`image`]).
//!
//! Placing the modules here ensures a binding can be compiled against the
//! surface without pulling in the engine.

#![deny(missing_docs)]

//The wall-clock seam
pub mod clock;
pub mod error;

//The memory-mapped dump image
pub mod image;

//Basic modules for types
pub mod types;

//Traits the engine implements
pub mod fs;
