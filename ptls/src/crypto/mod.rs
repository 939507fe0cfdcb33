//! Cryptographic capability objects.
//!
//! Concrete primitives (AEAD ciphers, hashes, key exchange, signatures,
//! PRNG) are never hardcoded into the core; it consumes them through
//! the small capability traits below. Algorithm *selection* is a closed,
//! tagged enum (`AeadAlgorithm`, `HashAlgorithm`, `NamedGroup`) — TLS 1.3
//! only defines a handful of each — while the *implementation* behind a
//! selection is a trait object, so a caller can swap backends without
//! touching the state machine. `feature = "default-backend"` wires the
//! tagged enums to a RustCrypto-based implementation; disable it and
//! supply your own `dyn Aead`/`dyn DigestCtx`/`dyn KeyExchange` to bring
//! your own crypto library (OpenSSL via FFI, a hardware HSM, etc).

pub mod hkdf;
pub mod schedule;
pub mod transcript;

#[cfg(feature = "default-backend")]
pub mod backend;

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::error::Error;

/// Largest traffic secret any supported hash algorithm produces.
pub const MAX_SECRET_SIZE: usize = 32;
/// Largest AEAD IV any supported cipher uses.
pub const MAX_IV_SIZE: usize = 16;
/// Largest digest any supported hash algorithm produces.
pub const MAX_DIGEST_SIZE: usize = 64;

/// A source of cryptographically secure random bytes.
pub trait Prng {
    /// Fill `out` with random bytes. Returns an internal error if the
    /// entropy source failed.
    fn fill(&mut self, out: &mut [u8]) -> Result<(), Error>;
}

/// A hash algorithm usable as a cipher suite's IANA hash component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
}

impl HashAlgorithm {
    pub fn output_size(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
        }
    }
}

/// Incremental hash context. Exactly one update per handshake message,
/// in wire order.
pub trait DigestCtx: Send {
    fn algorithm(&self) -> HashAlgorithm;
    fn update(&mut self, data: &[u8]);
    /// Read the digest without consuming the context — required because
    /// the key schedule needs the transcript digest at a point where
    /// more messages are still to come.
    fn snapshot(&self) -> Vec<u8>;
    /// Reset to the empty state, as if newly constructed.
    fn reset(&mut self);
}

/// How a transcript read should affect the underlying context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalize {
    /// Read the digest and reset the context to empty.
    Reset,
    /// Read the digest, leaving the context unmodified.
    Snapshot,
}

/// An AEAD algorithm usable as a cipher suite's IANA AEAD component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AeadAlgorithm {
    Aes128Gcm,
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl AeadAlgorithm {
    pub fn key_size(&self) -> usize {
        match self {
            AeadAlgorithm::Aes128Gcm => 16,
            AeadAlgorithm::Aes256Gcm => 32,
            AeadAlgorithm::ChaCha20Poly1305 => 32,
        }
    }

    pub fn iv_size(&self) -> usize {
        12
    }

    pub fn tag_size(&self) -> usize {
        16
    }
}

/// A keyless AEAD transform: one call seals, one call opens. Keys and
/// nonces are supplied per call so a single instance can be shared by
/// the read and write directions of an [`AeadContext`] that both use
/// the same algorithm.
pub trait Aead: Send {
    fn algorithm(&self) -> AeadAlgorithm;

    /// Encrypt `plaintext` with associated data `aad`, appending
    /// ciphertext‖tag to `out`.
    fn seal(
        &self,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        plaintext: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<(), Error>;

    /// Decrypt and authenticate `ciphertext` (which includes the trailing
    /// tag), appending the plaintext to `out`. A MAC failure is reported
    /// as `Error::SelfAlert(AlertDescription::BadRecordMac)` by the
    /// caller, not by this trait — implementations just report failure.
    fn open(
        &self,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<(), Error>;
}

/// A Diffie-Hellman group usable for TLS 1.3 key exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamedGroup {
    Secp256r1,
    X25519,
}

impl NamedGroup {
    pub fn codepoint(&self) -> u16 {
        match self {
            NamedGroup::Secp256r1 => 23,
            NamedGroup::X25519 => 29,
        }
    }

    pub fn from_codepoint(v: u16) -> Option<Self> {
        match v {
            23 => Some(NamedGroup::Secp256r1),
            29 => Some(NamedGroup::X25519),
            _ => None,
        }
    }

    pub fn public_key_size(&self) -> usize {
        match self {
            NamedGroup::Secp256r1 => 65,
            NamedGroup::X25519 => 32,
        }
    }
}

/// Private key-exchange state produced by [`KeyExchange::prepare`]. Used
/// by a client that generated its ephemeral share before it knew the
/// peer's, and now needs to complete the exchange with whatever share
/// the peer sent back.
pub trait KeyExchangePrivate {
    fn group(&self) -> NamedGroup;

    /// Consume the private state and derive the shared secret from the
    /// peer's public share.
    fn complete(self: Box<Self>, peer_public: &[u8]) -> Result<Vec<u8>, Error>;
}

/// A Diffie-Hellman-style key exchange algorithm.
pub trait KeyExchange: Send {
    fn group(&self) -> NamedGroup;

    /// Generate an ephemeral keypair, returning the retained private
    /// state and the public share to send. Used by the client, which
    /// must commit to a share before it knows which group the server
    /// will pick.
    fn prepare(
        &self,
        prng: &mut dyn Prng,
    ) -> Result<(Box<dyn KeyExchangePrivate>, Vec<u8>), Error>;

    /// Generate an ephemeral keypair and immediately combine it with the
    /// peer's public share, returning (own public share, shared secret).
    /// Used by the server, which only learns the client's share once.
    fn exchange(&self, prng: &mut dyn Prng, peer_public: &[u8]) -> Result<(Vec<u8>, Vec<u8>), Error>;
}

/// One TLS 1.3 cipher suite: IANA code point plus its AEAD and hash
/// components.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherSuite {
    pub code_point: u16,
    pub aead: AeadAlgorithm,
    pub hash: HashAlgorithm,
}

impl CipherSuite {
    pub const TLS13_AES_128_GCM_SHA256: CipherSuite = CipherSuite {
        code_point: 0x1301,
        aead: AeadAlgorithm::Aes128Gcm,
        hash: HashAlgorithm::Sha256,
    };
    pub const TLS13_AES_256_GCM_SHA384: CipherSuite = CipherSuite {
        code_point: 0x1302,
        aead: AeadAlgorithm::Aes256Gcm,
        hash: HashAlgorithm::Sha384,
    };
    pub const TLS13_CHACHA20_POLY1305_SHA256: CipherSuite = CipherSuite {
        code_point: 0x1303,
        aead: AeadAlgorithm::ChaCha20Poly1305,
        hash: HashAlgorithm::Sha256,
    };

    pub fn from_code_point(cp: u16) -> Option<Self> {
        match cp {
            0x1301 => Some(Self::TLS13_AES_128_GCM_SHA256),
            0x1302 => Some(Self::TLS13_AES_256_GCM_SHA384),
            0x1303 => Some(Self::TLS13_CHACHA20_POLY1305_SHA256),
            _ => None,
        }
    }
}

/// Groups a PRNG with the key-exchange algorithms and cipher suites an
/// endpoint is willing to negotiate.
///
/// The descriptor tables (`key_exchanges`, `cipher_suites`) are
/// immutable shared data, hence exposed directly. The PRNG advances its
/// own state on every draw, so it cannot be behind a plain shared
/// reference if one registry is to back several concurrently-live
/// connections (each `handshake`/`receive`/`send` call is synchronous,
/// so an interior `RefCell` never conflicts with itself — it only rules
/// out two connections drawing from the same registry on two threads at
/// once, which is undefined behavior by construction here, not a case
/// this type tries to support).
pub struct CryptoRegistry {
    pub prng: RefCell<Box<dyn Prng>>,
    pub key_exchanges: Vec<Box<dyn KeyExchange>>,
    pub cipher_suites: Vec<CipherSuite>,
}

impl CryptoRegistry {
    pub fn key_exchange_for(&self, group: NamedGroup) -> Option<&dyn KeyExchange> {
        self.key_exchanges
            .iter()
            .find(|kx| kx.group() == group)
            .map(|kx| kx.as_ref())
    }
}

/// Signature schemes used by CertificateVerify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureScheme {
    EcdsaSecp256r1Sha256,
    Ed25519,
}

impl SignatureScheme {
    pub fn codepoint(&self) -> u16 {
        match self {
            SignatureScheme::EcdsaSecp256r1Sha256 => 0x0403,
            SignatureScheme::Ed25519 => 0x0807,
        }
    }

    pub fn from_codepoint(v: u16) -> Option<Self> {
        match v {
            0x0403 => Some(SignatureScheme::EcdsaSecp256r1Sha256),
            0x0807 => Some(SignatureScheme::Ed25519),
            _ => None,
        }
    }
}
