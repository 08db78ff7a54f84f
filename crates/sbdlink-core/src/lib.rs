//! sbdlink-core: Core traits, types, and error definitions for sbdlink.
//!
//! This crate defines the abstractions shared by the serial line handle, the
//! AT transceiver, and test doubles. Applications depend on these types
//! without pulling in a concrete serial backend.
//!
//! # Key types
//!
//! - [`Transport`] -- half-duplex byte link with text/binary mode switching
//! - [`LineMode`] -- canonical text vs raw binary line discipline
//! - [`Error`] / [`ErrorKind`] / [`Result`] -- error handling

pub mod error;
pub mod transport;
pub mod types;

pub use error::{Error, ErrorKind, Result};
pub use transport::Transport;
pub use types::*;
