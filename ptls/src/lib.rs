//! `ptls` — a transport-agnostic TLS 1.3 endpoint core.
//!
//! This crate implements the handshake state machine (client and server),
//! the handshake transcript and HKDF-based key schedule, and the record
//! layer (framing, fragmentation, AEAD seal/open) described by RFC 8446.
//! It performs no I/O: every operation consumes byte slices the caller
//! already has and appends whatever it produces to a caller-supplied
//! [`buffer::GrowableBuffer`]. Concrete AEAD ciphers, hash functions, key
//! exchange, and certificate-chain verification are reached only through
//! the capability traits in [`crypto`] and [`tls::certificate`] — an
//! embedder can supply their own, or enable `feature = "default-backend"`
//! to use the bundled RustCrypto-based implementation.
//!
//! # Layout
//!
//! - [`bytes`] — borrowed octet spans.
//! - [`buffer`] — the scratch-or-heap output sink every wire-producing
//!   operation writes into.
//! - [`crypto`] — capability traits (AEAD, hash, key exchange, PRNG),
//!   the HKDF-Expand-Label construction, the key schedule, the
//!   transcript hash, and (behind `default-backend`) concrete
//!   implementations.
//! - [`tls`] — wire format: record framing ([`tls::record`]), handshake
//!   message codecs ([`tls::handshake`]), and the certificate callback
//!   protocol ([`tls::certificate`]).
//! - [`connection`] — the orchestrator binding all of the above into the
//!   client/server handshake state machine and the post-handshake
//!   `send`/`receive` operations.
//! - [`error`] — the error taxonomy: self-alerts, peer-alerts, and
//!   internal failures, with the 16-bit wire encoding recoverable via
//!   [`error::Error::code`].

#![no_std]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod buffer;
pub mod bytes;
pub mod connection;
pub mod crypto;
pub mod error;
pub mod tls;

pub use bytes::ByteView;
pub use connection::{Connection, Role, Status};
pub use error::{AlertDescription, Error, ErrorClass};
