//! RFC 8446 §7.1 key schedule: the Early/Handshake/Master secret chain
//! and the per-flight traffic secrets derived from it.
//!
//! No PSK support is in scope, so the Early Secret is always extracted
//! from an all-zero IKM, matching
//! RFC 8446's "no PSK" case. `resumption_master_secret` and
//! `exporter_master_secret` are still derived, since a caller may want to
//! export keying material or implement resumption on top of this crate.

use alloc::vec;
use alloc::vec::Vec;

use zeroize::Zeroize;

use crate::error::Error;
use super::hkdf::{derive_secret, HkdfAlgorithm};
use super::HashAlgorithm;

/// `Hash("")` for SHA-256 and SHA-384, needed by `Derive-Secret(., "derived", "")`.
fn empty_transcript_hash(alg: HashAlgorithm) -> Vec<u8> {
    match alg {
        HashAlgorithm::Sha256 => vec![
            0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f,
            0xb9, 0x24, 0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b,
            0x78, 0x52, 0xb8, 0x55,
        ],
        HashAlgorithm::Sha384 => vec![
            0x38, 0xb0, 0x60, 0xa7, 0x51, 0xac, 0x96, 0x38, 0x4c, 0xd9, 0x32, 0x7e, 0xb1, 0xb1,
            0xe3, 0x6a, 0x21, 0xfd, 0xb7, 0x11, 0x14, 0xbe, 0x07, 0x43, 0x4c, 0x0c, 0xc7, 0xbf,
            0x63, 0xf6, 0xe1, 0xda, 0x27, 0x4e, 0xde, 0xbf, 0xe7, 0x6f, 0x65, 0xfb, 0xd5, 0x1a,
            0xd2, 0xf1, 0x48, 0x98, 0xb9, 0x5b,
        ],
    }
}

/// The two handshake traffic secrets derived once the (EC)DHE shared
/// secret is known.
#[derive(Clone)]
pub struct HandshakeSecrets {
    pub client: Vec<u8>,
    pub server: Vec<u8>,
}

/// The application traffic secrets and the two exported masters derived
/// once the handshake transcript is complete.
pub struct MasterSecrets {
    pub client_application: Vec<u8>,
    pub server_application: Vec<u8>,
    pub exporter_master: Vec<u8>,
    pub resumption_master: Vec<u8>,
}

/// Walks the Early Secret -> Handshake Secret -> Master Secret chain,
/// keeping only the current link: no chain secret outlives its use
/// except the per-flight traffic secrets it emits, which the caller
/// holds separately.
pub struct KeySchedule<'a> {
    hkdf: &'a dyn HkdfAlgorithm,
    secret: Vec<u8>,
}

impl<'a> KeySchedule<'a> {
    /// Start the chain: `Early Secret = HKDF-Extract(0, 0)` (no PSK).
    pub fn new(hkdf: &'a dyn HkdfAlgorithm) -> Self {
        let hash_len = hkdf.hash().output_size();
        let zero = vec![0u8; hash_len];
        let early_secret = hkdf.extract(&zero, &zero);
        Self { hkdf, secret: early_secret }
    }

    fn derive(&self, label: &[u8], transcript_hash: &[u8]) -> Result<Vec<u8>, Error> {
        derive_secret(self.hkdf, &self.secret, label, transcript_hash)
    }

    /// `Derive-Secret(secret, "derived", "") -> HKDF-Extract(., ikm)`,
    /// the step between each link of the chain.
    fn advance(&mut self, ikm: &[u8]) -> Result<(), Error> {
        let empty = empty_transcript_hash(self.hkdf.hash());
        let derived = self.derive(b"derived", &empty)?;
        self.secret = self.hkdf.extract(&derived, ikm);
        Ok(())
    }

    /// Move from Early Secret to Handshake Secret and derive
    /// `client/server_handshake_traffic_secret` over the transcript
    /// hash through ServerHello.
    pub fn handshake_secrets(
        &mut self,
        shared_secret: &[u8],
        transcript_hash_through_server_hello: &[u8],
    ) -> Result<HandshakeSecrets, Error> {
        self.advance(shared_secret)?;
        Ok(HandshakeSecrets {
            client: self.derive(b"c hs traffic", transcript_hash_through_server_hello)?,
            server: self.derive(b"s hs traffic", transcript_hash_through_server_hello)?,
        })
    }

    /// Move from Handshake Secret to Master Secret and derive the
    /// application traffic secrets plus both exported masters.
    /// `transcript_hash_through_server_finished` covers up to and
    /// including the server's Finished; `transcript_hash_through_client_finished`
    /// additionally covers the client's Finished (used only for
    /// `resumption_master_secret`).
    pub fn master_secrets(
        &mut self,
        transcript_hash_through_server_finished: &[u8],
        transcript_hash_through_client_finished: &[u8],
    ) -> Result<MasterSecrets, Error> {
        let hash_len = self.hkdf.hash().output_size();
        let zero = vec![0u8; hash_len];
        self.advance(&zero)?;
        Ok(MasterSecrets {
            client_application: self.derive(b"c ap traffic", transcript_hash_through_server_finished)?,
            server_application: self.derive(b"s ap traffic", transcript_hash_through_server_finished)?,
            exporter_master: self.derive(b"exp master", transcript_hash_through_server_finished)?,
            resumption_master: self.derive(b"res master", transcript_hash_through_client_finished)?,
        })
    }
}

impl<'a> Drop for KeySchedule<'a> {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

/// `HKDF-Expand-Label(secret, "key", "", AEAD.key_length)`.
pub fn traffic_key(hkdf: &dyn HkdfAlgorithm, secret: &[u8], key_len: usize) -> Result<Vec<u8>, Error> {
    super::hkdf::expand_label(hkdf, secret, b"key", b"", key_len)
}

/// `HKDF-Expand-Label(secret, "iv", "", AEAD.nonce_length)`, the static
/// IV that per-record nonces are derived from via a seq-number XOR
/// construction.
pub fn traffic_iv(hkdf: &dyn HkdfAlgorithm, secret: &[u8], iv_len: usize) -> Result<Vec<u8>, Error> {
    super::hkdf::expand_label(hkdf, secret, b"iv", b"", iv_len)
}

/// `HKDF-Expand-Label(base_key, "finished", "", Hash.length)`, the key
/// used to compute and verify a Finished message's MAC.
pub fn finished_key(hkdf: &dyn HkdfAlgorithm, base_key: &[u8]) -> Result<Vec<u8>, Error> {
    let len = hkdf.hash().output_size();
    super::hkdf::expand_label(hkdf, base_key, b"finished", b"", len)
}

/// `HMAC(finished_key, Transcript-Hash(Handshake Context, ...))`, the
/// verify_data carried by a Finished message.
pub fn finished_verify_data(hkdf: &dyn HkdfAlgorithm, finished_key: &[u8], transcript_hash: &[u8]) -> Vec<u8> {
    hkdf.hmac(finished_key, transcript_hash)
}

#[cfg(all(test, feature = "default-backend"))]
mod tests {
    use super::*;
    use crate::crypto::backend::Sha256Hkdf;

    #[test]
    fn chain_produces_distinct_secrets_per_stage() {
        let hkdf = Sha256Hkdf;
        let mut ks = KeySchedule::new(&hkdf);
        let shared_secret = [0x42u8; 32];
        let th1 = [0xaau8; 32];
        let hs = ks.handshake_secrets(&shared_secret, &th1).unwrap();
        assert_ne!(hs.client, hs.server);

        let th2 = [0xbbu8; 32];
        let th3 = [0xccu8; 32];
        let ms = ks.master_secrets(&th2, &th3).unwrap();
        assert_ne!(ms.client_application, ms.server_application);
        assert_ne!(ms.exporter_master, ms.resumption_master);
        assert_ne!(ms.client_application, hs.client);
    }

    #[test]
    fn finished_mac_is_deterministic() {
        let hkdf = Sha256Hkdf;
        let base_key = [0x11u8; 32];
        let fk = finished_key(&hkdf, &base_key).unwrap();
        let th = [0x22u8; 32];
        let mac1 = finished_verify_data(&hkdf, &fk, &th);
        let mac2 = finished_verify_data(&hkdf, &fk, &th);
        assert_eq!(mac1, mac2);
    }
}
