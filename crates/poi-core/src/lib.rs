//! Core types and trait definitions for the POI catalogue.
//!
//! This crate is deliberately free of database dependencies. Storage backends
//! implement [`store::PoiStore`]; everything else depends only on this crate.

pub mod error;
pub mod normalize;
pub mod pending;
pub mod poi;
pub mod store;
pub mod tag;

pub use error::{Error, ErrorKind, Result};
