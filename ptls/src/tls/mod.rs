//! TLS 1.3 wire format: record framing, handshake message codec, and
//! the certificate callback protocol.
//!
//! This module groups everything that talks about *bytes on the wire*;
//! [`crate::connection`] is where those pieces are driven into a
//! handshake state machine.

pub mod certificate;
pub mod codec;
pub mod handshake;
pub mod record;

pub use certificate::{
    CertificateCallbacks, CertificateChain, CertificateLookup, CertificateVerifier, LookupResult,
    Signer, Verifier, VerifyResult, release_signer, release_verifier,
};
pub use record::{AeadContext, ContentType, RecordLayer, MAX_CIPHERTEXT_RECORD, MAX_PLAINTEXT_RECORD};

/// `legacy_version`/`supported_versions` value for TLS 1.3 (spec.md §6).
pub const TLS13_VERSION: u16 = 0x0304;
/// Outer record `legacy_record_version` (spec.md §4.3).
pub const LEGACY_RECORD_VERSION: u16 = 0x0303;

/// Handshake message type (RFC 8446 §4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandshakeType {
    ClientHello = 1,
    ServerHello = 2,
    NewSessionTicket = 4,
    EndOfEarlyData = 5,
    EncryptedExtensions = 8,
    Certificate = 11,
    CertificateRequest = 13,
    CertificateVerify = 15,
    Finished = 20,
    KeyUpdate = 24,
    MessageHash = 254,
}

impl HandshakeType {
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            1 => Self::ClientHello,
            2 => Self::ServerHello,
            4 => Self::NewSessionTicket,
            5 => Self::EndOfEarlyData,
            8 => Self::EncryptedExtensions,
            11 => Self::Certificate,
            13 => Self::CertificateRequest,
            15 => Self::CertificateVerify,
            20 => Self::Finished,
            24 => Self::KeyUpdate,
            254 => Self::MessageHash,
            _ => return None,
        })
    }
}

/// Extension type (RFC 8446 §4.2). Only the handful `ptls` negotiates
/// are named; everything else is parsed generically and ignored
/// (spec.md §9 Open Question, resolved in SPEC_FULL.md §4.4: unknown
/// extensions are always ignored).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ExtensionType {
    ServerName = 0,
    SupportedGroups = 10,
    SignatureAlgorithms = 13,
    KeyShare = 51,
    SupportedVersions = 43,
}

impl ExtensionType {
    pub fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            0 => Self::ServerName,
            10 => Self::SupportedGroups,
            13 => Self::SignatureAlgorithms,
            43 => Self::SupportedVersions,
            51 => Self::KeyShare,
            _ => return None,
        })
    }
}
