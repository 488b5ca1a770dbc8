//! # Corvid XML
//!
//! Incremental XML stream decoding for the Corvid messaging server.
//!
//! This crate provides:
//! - A resumable particle tokenizer over a growing byte buffer
//! - An element assembler that emits the stream opener, then one stanza at a time
//! - Namespace scoping and entity handling
//! - Rendering of elements back to wire text
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────┐   ┌───────────────────┐
//! │  raw bytes   │──▶│    Tokenizer    │──▶│ ElementAssembler  │──▶ AssemblerEvent
//! │ (any chunks) │   │   (particles)   │   │ (depth + stack)   │
//! └──────────────┘   └─────────────────┘   └───────────────────┘
//! ```
//!
//! [`StreamDecoder`] bundles both stages for one session.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod assembler;
pub mod decoder;
pub mod element;
pub mod error;
pub mod escape;
pub mod namespace;
pub mod particle;
pub mod render;

pub use assembler::{AssemblerEvent, ElementAssembler, is_balanced};
pub use decoder::{DEFAULT_MAX_PENDING, StreamDecoder};
pub use element::{Attribute, Element, ElementBuilder, Node};
pub use error::XmlError;
pub use namespace::{NamespaceScope, XML_NAMESPACE};
pub use particle::{Particle, ParticleKind, Tokenizer, next_particle};
pub use render::{render, render_close, render_in, render_open};
