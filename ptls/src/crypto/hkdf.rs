//! HKDF-Extract / HKDF-Expand-Label, generic over a hash algorithm.
//!
//! RFC 8446 §7.1 defines `HKDF-Expand-Label(Secret, Label, Context,
//! Length)` as `HKDF-Expand(Secret, HkdfLabel, Length)` where `HkdfLabel`
//! is a length-prefixed `"tls13 " + Label` plus the context. This module
//! builds that wire structure; the actual Extract/Expand math is
//! supplied by a `HkdfAlgorithm` implementation (the default backend
//! wires this to the `hkdf`/`hmac`/`sha2` crates).

use alloc::vec;
use alloc::vec::Vec;

use crate::error::Error;
use super::HashAlgorithm;

const LABEL_PREFIX: &[u8] = b"tls13 ";

/// HKDF-Extract and HKDF-Expand for one hash algorithm, plus the raw
/// HMAC construction spec.md §6 requires be exposed for tests.
pub trait HkdfAlgorithm: Send {
    fn hash(&self) -> HashAlgorithm;

    /// `HKDF-Extract(salt, ikm) -> PRK`.
    fn extract(&self, salt: &[u8], ikm: &[u8]) -> Vec<u8>;

    /// `HKDF-Expand(prk, info, length) -> OKM`.
    fn expand(&self, prk: &[u8], info: &[u8], out: &mut [u8]) -> Result<(), Error>;

    /// `HMAC(key, data) -> tag`, used for the Finished MAC.
    fn hmac(&self, key: &[u8], data: &[u8]) -> Vec<u8>;
}

/// Build the `HkdfLabel` structure of RFC 8446 §7.1.
fn hkdf_label(length: u16, label: &[u8], context: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + 1 + LABEL_PREFIX.len() + label.len() + 1 + context.len());
    out.extend_from_slice(&length.to_be_bytes());
    out.push((LABEL_PREFIX.len() + label.len()) as u8);
    out.extend_from_slice(LABEL_PREFIX);
    out.extend_from_slice(label);
    out.push(context.len() as u8);
    out.extend_from_slice(context);
    out
}

/// `HKDF-Expand-Label(secret, label, context, length)`.
pub fn expand_label(
    alg: &dyn HkdfAlgorithm,
    secret: &[u8],
    label: &[u8],
    context: &[u8],
    length: usize,
) -> Result<Vec<u8>, Error> {
    let info = hkdf_label(length as u16, label, context);
    let mut out = vec![0u8; length];
    alg.expand(secret, &info, &mut out)?;
    Ok(out)
}

/// `Derive-Secret(secret, label, messages) = HKDF-Expand-Label(secret,
/// label, Transcript-Hash(messages), Hash.length)`.
pub fn derive_secret(
    alg: &dyn HkdfAlgorithm,
    secret: &[u8],
    label: &[u8],
    transcript_hash: &[u8],
) -> Result<Vec<u8>, Error> {
    expand_label(alg, secret, label, transcript_hash, alg.hash().output_size())
}

#[cfg(all(test, feature = "default-backend"))]
mod tests {
    use super::*;
    use crate::crypto::backend::Sha256Hkdf;

    // RFC 5869 test case 1, adapted: verifies our Extract/Expand wiring
    // against the published test vector (HKDF-SHA256).
    #[test]
    fn hkdf_extract_expand_matches_rfc5869_case1() {
        let ikm = [0x0bu8; 22];
        let salt: [u8; 13] = [
            0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c,
        ];
        let info: [u8; 10] = [0xf0, 0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8, 0xf9];

        let alg = Sha256Hkdf;
        let prk = alg.extract(&salt, &ikm);
        let expected_prk = [
            0x07, 0x77, 0x09, 0x36, 0x2c, 0x2e, 0x32, 0xdf, 0x0d, 0xdc, 0x3f, 0x0d, 0xc4, 0x7b,
            0xba, 0x63, 0x90, 0xb6, 0xc7, 0x3b, 0xb5, 0x0f, 0x9c, 0x31, 0x22, 0xec, 0x84, 0x4a,
            0xd7, 0xc2, 0xb3, 0xe5,
        ];
        assert_eq!(prk.as_slice(), &expected_prk[..]);

        let mut okm = [0u8; 42];
        alg.expand(&prk, &info, &mut okm).unwrap();
        let expected_okm = [
            0x3c, 0xb2, 0x5f, 0x25, 0xfa, 0xac, 0xd5, 0x7a, 0x90, 0x43, 0x4f, 0x64, 0xd0, 0x36,
            0x2f, 0x2a, 0x2d, 0x2d, 0x0a, 0x90, 0xcf, 0x1a, 0x5a, 0x4c, 0x5d, 0xb0, 0x2d, 0x56,
            0xec, 0xc4, 0xc5, 0xbf, 0x34, 0x00, 0x72, 0x08, 0xd5, 0xb8, 0x87, 0x18, 0x58, 0x65,
        ];
        assert_eq!(&okm[..], &expected_okm[..]);
    }
}
