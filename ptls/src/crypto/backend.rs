//! Default crypto backend: wires the capability traits in the parent
//! module to the RustCrypto ecosystem (SPEC_FULL.md §10).
//!
//! Nothing in `crypto::mod` or the handshake state machine depends on
//! this module directly — it only appears behind `feature =
//! "default-backend"`, built entirely from the same trait objects an
//! embedder bringing their own crypto library would implement.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use aes_gcm::aead::{Aead as AeadCipher, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::ChaCha20Poly1305;
use ed25519_dalek::Signer as Ed25519Signer;
use ed25519_dalek::Verifier as Ed25519Verifier;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use p256::ecdsa::signature::{Signer as EcdsaSigner, Verifier as EcdsaVerifier};
use sha2::{Digest, Sha256, Sha384};

use super::hkdf::HkdfAlgorithm;
use super::{
    Aead, AeadAlgorithm, DigestCtx, HashAlgorithm, KeyExchange, KeyExchangePrivate, NamedGroup,
    Prng,
};
use crate::error::{AlertDescription, Error};

// ---------------------------------------------------------------------
// PRNG
// ---------------------------------------------------------------------

/// [`Prng`] backed by `rand`'s OS entropy source. Only available under
/// `std` (embedded targets supply their own hardware RNG wrapper).
#[cfg(feature = "std")]
pub struct OsPrng(rand::rngs::ThreadRng);

#[cfg(feature = "std")]
impl OsPrng {
    pub fn new() -> Self {
        Self(rand::thread_rng())
    }
}

#[cfg(feature = "std")]
impl Default for OsPrng {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Prng for OsPrng {
    fn fill(&mut self, out: &mut [u8]) -> Result<(), Error> {
        use rand_core::RngCore;
        self.0.fill_bytes(out);
        Ok(())
    }
}

/// Adapts a [`Prng`] trait object to `rand_core::RngCore`/`CryptoRng` so
/// it can be handed to `x25519-dalek`/`p256`'s key-generation calls.
struct RngAdapter<'a>(&'a mut dyn Prng);

impl<'a> rand_core::RngCore for RngAdapter<'a> {
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        let _ = self.0.fill(&mut buf);
        u32::from_le_bytes(buf)
    }

    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        let _ = self.0.fill(&mut buf);
        u64::from_le_bytes(buf)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let _ = self.0.fill(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.0.fill(dest).map_err(|_| rand_core::Error::new(FillFailed))
    }
}

#[derive(Debug)]
struct FillFailed;

impl core::fmt::Display for FillFailed {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "entropy source failed to fill buffer")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FillFailed {}

impl<'a> rand_core::CryptoRng for RngAdapter<'a> {}

// ---------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------

/// SHA-256 [`DigestCtx`].
#[derive(Clone)]
pub struct Sha256Digest(Sha256);

impl Sha256Digest {
    pub fn new() -> Self {
        Self(Sha256::new())
    }
}

impl Default for Sha256Digest {
    fn default() -> Self {
        Self::new()
    }
}

impl DigestCtx for Sha256Digest {
    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Sha256
    }

    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.0, data);
    }

    fn snapshot(&self) -> Vec<u8> {
        self.0.clone().finalize().to_vec()
    }

    fn reset(&mut self) {
        self.0 = Sha256::new();
    }
}

/// SHA-384 [`DigestCtx`].
#[derive(Clone)]
pub struct Sha384Digest(Sha384);

impl Sha384Digest {
    pub fn new() -> Self {
        Self(Sha384::new())
    }
}

impl Default for Sha384Digest {
    fn default() -> Self {
        Self::new()
    }
}

impl DigestCtx for Sha384Digest {
    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Sha384
    }

    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.0, data);
    }

    fn snapshot(&self) -> Vec<u8> {
        self.0.clone().finalize().to_vec()
    }

    fn reset(&mut self) {
        self.0 = Sha384::new();
    }
}

/// Construct the right [`DigestCtx`] for a negotiated [`HashAlgorithm`].
pub fn digest_ctx(alg: HashAlgorithm) -> Box<dyn DigestCtx> {
    match alg {
        HashAlgorithm::Sha256 => Box::new(Sha256Digest::new()),
        HashAlgorithm::Sha384 => Box::new(Sha384Digest::new()),
    }
}

// ---------------------------------------------------------------------
// HKDF / HMAC
// ---------------------------------------------------------------------

/// HKDF-SHA256, per RFC 5869 / RFC 8446 §7.1.
pub struct Sha256Hkdf;

impl HkdfAlgorithm for Sha256Hkdf {
    fn hash(&self) -> HashAlgorithm {
        HashAlgorithm::Sha256
    }

    fn extract(&self, salt: &[u8], ikm: &[u8]) -> Vec<u8> {
        let (prk, _) = Hkdf::<Sha256>::extract(Some(salt), ikm);
        prk.to_vec()
    }

    fn expand(&self, prk: &[u8], info: &[u8], out: &mut [u8]) -> Result<(), Error> {
        let hkdf = Hkdf::<Sha256>::from_prk(prk).map_err(|_| Error::LIBRARY_BUG)?;
        hkdf.expand(info, out).map_err(|_| Error::LIBRARY_BUG)
    }

    fn hmac(&self, key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key length");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}

/// HKDF-SHA384, per RFC 5869 / RFC 8446 §7.1.
pub struct Sha384Hkdf;

impl HkdfAlgorithm for Sha384Hkdf {
    fn hash(&self) -> HashAlgorithm {
        HashAlgorithm::Sha384
    }

    fn extract(&self, salt: &[u8], ikm: &[u8]) -> Vec<u8> {
        let (prk, _) = Hkdf::<Sha384>::extract(Some(salt), ikm);
        prk.to_vec()
    }

    fn expand(&self, prk: &[u8], info: &[u8], out: &mut [u8]) -> Result<(), Error> {
        let hkdf = Hkdf::<Sha384>::from_prk(prk).map_err(|_| Error::LIBRARY_BUG)?;
        hkdf.expand(info, out).map_err(|_| Error::LIBRARY_BUG)
    }

    fn hmac(&self, key: &[u8], data: &[u8]) -> Vec<u8> {
        let mut mac = Hmac::<Sha384>::new_from_slice(key).expect("HMAC accepts any key length");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Construct the right [`HkdfAlgorithm`] for a negotiated [`HashAlgorithm`].
pub fn hkdf_algorithm(alg: HashAlgorithm) -> &'static dyn HkdfAlgorithm {
    match alg {
        HashAlgorithm::Sha256 => &Sha256Hkdf,
        HashAlgorithm::Sha384 => &Sha384Hkdf,
    }
}

// ---------------------------------------------------------------------
// AEAD
// ---------------------------------------------------------------------

/// AES-128-GCM [`Aead`].
pub struct Aes128GcmAead;

impl Aead for Aes128GcmAead {
    fn algorithm(&self) -> AeadAlgorithm {
        AeadAlgorithm::Aes128Gcm
    }

    fn seal(&self, key: &[u8], nonce: &[u8], aad: &[u8], plaintext: &[u8], out: &mut Vec<u8>) -> Result<(), Error> {
        let cipher = Aes128Gcm::new_from_slice(key).map_err(|_| Error::INCOMPATIBLE_KEY)?;
        let ct = cipher
            .encrypt(nonce.into(), Payload { msg: plaintext, aad })
            .map_err(|_| Error::LIBRARY_BUG)?;
        out.extend_from_slice(&ct);
        Ok(())
    }

    fn open(&self, key: &[u8], nonce: &[u8], aad: &[u8], ciphertext: &[u8], out: &mut Vec<u8>) -> Result<(), Error> {
        let cipher = Aes128Gcm::new_from_slice(key).map_err(|_| Error::INCOMPATIBLE_KEY)?;
        let pt = cipher
            .decrypt(nonce.into(), Payload { msg: ciphertext, aad })
            .map_err(|_| Error::SelfAlert(AlertDescription::BadRecordMac))?;
        out.extend_from_slice(&pt);
        Ok(())
    }
}

/// AES-256-GCM [`Aead`].
pub struct Aes256GcmAead;

impl Aead for Aes256GcmAead {
    fn algorithm(&self) -> AeadAlgorithm {
        AeadAlgorithm::Aes256Gcm
    }

    fn seal(&self, key: &[u8], nonce: &[u8], aad: &[u8], plaintext: &[u8], out: &mut Vec<u8>) -> Result<(), Error> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| Error::INCOMPATIBLE_KEY)?;
        let ct = cipher
            .encrypt(nonce.into(), Payload { msg: plaintext, aad })
            .map_err(|_| Error::LIBRARY_BUG)?;
        out.extend_from_slice(&ct);
        Ok(())
    }

    fn open(&self, key: &[u8], nonce: &[u8], aad: &[u8], ciphertext: &[u8], out: &mut Vec<u8>) -> Result<(), Error> {
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| Error::INCOMPATIBLE_KEY)?;
        let pt = cipher
            .decrypt(nonce.into(), Payload { msg: ciphertext, aad })
            .map_err(|_| Error::SelfAlert(AlertDescription::BadRecordMac))?;
        out.extend_from_slice(&pt);
        Ok(())
    }
}

/// ChaCha20-Poly1305 [`Aead`].
pub struct ChaCha20Poly1305Aead;

impl Aead for ChaCha20Poly1305Aead {
    fn algorithm(&self) -> AeadAlgorithm {
        AeadAlgorithm::ChaCha20Poly1305
    }

    fn seal(&self, key: &[u8], nonce: &[u8], aad: &[u8], plaintext: &[u8], out: &mut Vec<u8>) -> Result<(), Error> {
        let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| Error::INCOMPATIBLE_KEY)?;
        let ct = cipher
            .encrypt(nonce.into(), Payload { msg: plaintext, aad })
            .map_err(|_| Error::LIBRARY_BUG)?;
        out.extend_from_slice(&ct);
        Ok(())
    }

    fn open(&self, key: &[u8], nonce: &[u8], aad: &[u8], ciphertext: &[u8], out: &mut Vec<u8>) -> Result<(), Error> {
        let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| Error::INCOMPATIBLE_KEY)?;
        let pt = cipher
            .decrypt(nonce.into(), Payload { msg: ciphertext, aad })
            .map_err(|_| Error::SelfAlert(AlertDescription::BadRecordMac))?;
        out.extend_from_slice(&pt);
        Ok(())
    }
}

/// Construct the right [`Aead`] for a negotiated [`AeadAlgorithm`].
pub fn aead_for(alg: AeadAlgorithm) -> Box<dyn Aead> {
    match alg {
        AeadAlgorithm::Aes128Gcm => Box::new(Aes128GcmAead),
        AeadAlgorithm::Aes256Gcm => Box::new(Aes256GcmAead),
        AeadAlgorithm::ChaCha20Poly1305 => Box::new(ChaCha20Poly1305Aead),
    }
}

// ---------------------------------------------------------------------
// Key exchange
// ---------------------------------------------------------------------

struct X25519Private(x25519_dalek::EphemeralSecret);

impl KeyExchangePrivate for X25519Private {
    fn group(&self) -> NamedGroup {
        NamedGroup::X25519
    }

    fn complete(self: Box<Self>, peer_public: &[u8]) -> Result<Vec<u8>, Error> {
        let bytes: [u8; 32] = peer_public.try_into().map_err(|_| Error::SelfAlert(AlertDescription::DecodeError))?;
        let public = x25519_dalek::PublicKey::from(bytes);
        let shared = self.0.diffie_hellman(&public);
        Ok(shared.as_bytes().to_vec())
    }
}

/// X25519 [`KeyExchange`] (RFC 7748).
pub struct X25519;

impl KeyExchange for X25519 {
    fn group(&self) -> NamedGroup {
        NamedGroup::X25519
    }

    fn prepare(&self, prng: &mut dyn Prng) -> Result<(Box<dyn KeyExchangePrivate>, Vec<u8>), Error> {
        let mut rng = RngAdapter(prng);
        let secret = x25519_dalek::EphemeralSecret::random_from_rng(&mut rng);
        let public = x25519_dalek::PublicKey::from(&secret);
        Ok((Box::new(X25519Private(secret)), public.as_bytes().to_vec()))
    }

    fn exchange(&self, prng: &mut dyn Prng, peer_public: &[u8]) -> Result<(Vec<u8>, Vec<u8>), Error> {
        let bytes: [u8; 32] = peer_public.try_into().map_err(|_| Error::SelfAlert(AlertDescription::DecodeError))?;
        let their_public = x25519_dalek::PublicKey::from(bytes);
        let mut rng = RngAdapter(prng);
        let secret = x25519_dalek::EphemeralSecret::random_from_rng(&mut rng);
        let our_public = x25519_dalek::PublicKey::from(&secret);
        let shared = secret.diffie_hellman(&their_public);
        Ok((our_public.as_bytes().to_vec(), shared.as_bytes().to_vec()))
    }
}

struct P256Private(p256::ecdh::EphemeralSecret);

impl KeyExchangePrivate for P256Private {
    fn group(&self) -> NamedGroup {
        NamedGroup::Secp256r1
    }

    fn complete(self: Box<Self>, peer_public: &[u8]) -> Result<Vec<u8>, Error> {
        let public = p256::PublicKey::from_sec1_bytes(peer_public)
            .map_err(|_| Error::SelfAlert(AlertDescription::DecodeError))?;
        let shared = self.0.diffie_hellman(&public);
        Ok(shared.raw_secret_bytes().to_vec())
    }
}

/// secp256r1 ECDH [`KeyExchange`] (NIST P-256).
pub struct P256;

impl KeyExchange for P256 {
    fn group(&self) -> NamedGroup {
        NamedGroup::Secp256r1
    }

    fn prepare(&self, prng: &mut dyn Prng) -> Result<(Box<dyn KeyExchangePrivate>, Vec<u8>), Error> {
        let mut rng = RngAdapter(prng);
        let secret = p256::ecdh::EphemeralSecret::random(&mut rng);
        let public = secret.public_key();
        let encoded = public.to_sec1_bytes();
        Ok((Box::new(P256Private(secret)), encoded.to_vec()))
    }

    fn exchange(&self, prng: &mut dyn Prng, peer_public: &[u8]) -> Result<(Vec<u8>, Vec<u8>), Error> {
        let their_public = p256::PublicKey::from_sec1_bytes(peer_public)
            .map_err(|_| Error::SelfAlert(AlertDescription::DecodeError))?;
        let mut rng = RngAdapter(prng);
        let secret = p256::ecdh::EphemeralSecret::random(&mut rng);
        let our_public = secret.public_key().to_sec1_bytes().to_vec();
        let shared = secret.diffie_hellman(&their_public);
        Ok((our_public, shared.raw_secret_bytes().to_vec()))
    }
}

/// All key-exchange algorithms the default backend supports, in the
/// order a [`super::CryptoRegistry`] should try them.
pub fn default_key_exchanges() -> Vec<Box<dyn KeyExchange>> {
    vec![Box::new(X25519), Box::new(P256)]
}

/// The cipher suites the default backend supports, in preference order.
pub fn default_cipher_suites() -> Vec<super::CipherSuite> {
    vec![
        super::CipherSuite::TLS13_AES_128_GCM_SHA256,
        super::CipherSuite::TLS13_AES_256_GCM_SHA384,
        super::CipherSuite::TLS13_CHACHA20_POLY1305_SHA256,
    ]
}

// ---------------------------------------------------------------------
// Signatures — raw sign/verify primitives for CertificateVerify.
//
// Chain *validation* is always delegated to the embedder's `verify`
// callback; these are only the primitives a callback's
// signer/verifier closures would wrap, exposed so tests can drive a
// full handshake without a real X.509 stack.
// ---------------------------------------------------------------------

/// Sign `message` with an ECDSA P-256 private key (raw 32-byte scalar).
pub fn ecdsa_p256_sign(private_key: &[u8], message: &[u8]) -> Result<Vec<u8>, Error> {
    let signing_key = p256::ecdsa::SigningKey::from_bytes(private_key.into())
        .map_err(|_| Error::INCOMPATIBLE_KEY)?;
    let sig: p256::ecdsa::Signature = signing_key.sign(message);
    Ok(sig.to_der().as_bytes().to_vec())
}

/// Verify an ECDSA P-256 signature over `message` against a SEC1-encoded
/// public key.
pub fn ecdsa_p256_verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(verifying_key) = p256::ecdsa::VerifyingKey::from_sec1_bytes(public_key) else {
        return false;
    };
    let Ok(sig) = p256::ecdsa::Signature::from_der(signature) else {
        return false;
    };
    verifying_key.verify(message, &sig).is_ok()
}

/// Sign `message` with an Ed25519 private key (raw 32-byte seed).
pub fn ed25519_sign(private_key: &[u8], message: &[u8]) -> Result<Vec<u8>, Error> {
    let bytes: [u8; 32] = private_key.try_into().map_err(|_| Error::INCOMPATIBLE_KEY)?;
    let signing_key = ed25519_dalek::SigningKey::from_bytes(&bytes);
    Ok(signing_key.sign(message).to_bytes().to_vec())
}

/// Verify an Ed25519 signature over `message`.
pub fn ed25519_verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(key_bytes) = <[u8; 32]>::try_from(public_key) else {
        return false;
    };
    let Ok(verifying_key) = ed25519_dalek::VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; 64]>::try_from(signature) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
    verifying_key.verify(message, &sig).is_ok()
}
