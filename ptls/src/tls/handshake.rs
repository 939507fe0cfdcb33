//! Handshake message bodies: encode/decode for the messages `ptls`
//! sends and receives, and the CertificateVerify context-string
//! construction (RFC 8446 §4.4.3). The state machine that decides
//! *which* messages to build and in what order lives in
//! [`crate::connection`]; this module only knows their shapes.

use alloc::vec::Vec;

use crate::crypto::{NamedGroup, SignatureScheme};
use crate::error::{AlertDescription, Error};

use super::codec::{write_handshake_header, write_vec_u16, write_vec_u24, write_vec_u8, Reader};
use super::{ExtensionType, HandshakeType, TLS13_VERSION};

fn decode_error() -> Error {
    Error::SelfAlert(AlertDescription::DecodeError)
}

/// A `(group, key_exchange)` pair as carried in a `key_share` extension.
pub struct KeyShareEntry<'a> {
    pub group: NamedGroup,
    pub key_exchange: &'a [u8],
}

/// Fields of a ClientHello relevant to `ptls`'s negotiation (legacy
/// session id and compression methods are round-tripped but otherwise
/// unused — TLS 1.3 mandates a single null compression method and an
/// echoed-back session id only for middlebox compatibility).
pub struct ClientHello<'a> {
    pub random: [u8; 32],
    pub cipher_suites: Vec<u16>,
    pub supported_groups: Vec<NamedGroup>,
    pub key_shares: Vec<KeyShareEntry<'a>>,
    pub signature_algorithms: Vec<SignatureScheme>,
    pub server_name: Option<&'a str>,
}

impl<'a> ClientHello<'a> {
    /// Build the ClientHello body (everything after the handshake
    /// header) per spec.md §4.4: legacy version 0x0303, 32 random bytes,
    /// empty session id, cipher suite list, and the extensions named.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        out.extend_from_slice(&LEGACY_CLIENT_VERSION);
        out.extend_from_slice(&self.random);
        write_vec_u8(out, |_| {})?; // empty legacy_session_id

        write_vec_u16(out, |out| {
            for suite in &self.cipher_suites {
                out.extend_from_slice(&suite.to_be_bytes());
            }
        })?;
        write_vec_u8(out, |out| out.push(0))?; // legacy_compression_methods = [null]

        write_vec_u16(out, |out| {
            if let Some(name) = self.server_name {
                write_extension(out, ExtensionType::ServerName as u16, |out| {
                    write_vec_u16(out, |out| {
                        write_server_name_list(out, name);
                    })
                    .unwrap();
                });
            }
            write_extension(out, ExtensionType::SupportedVersions as u16, |out| {
                write_vec_u8(out, |out| out.extend_from_slice(&TLS13_VERSION.to_be_bytes())).unwrap();
            });
            write_extension(out, ExtensionType::SupportedGroups as u16, |out| {
                write_vec_u16(out, |out| {
                    for g in &self.supported_groups {
                        out.extend_from_slice(&g.codepoint().to_be_bytes());
                    }
                })
                .unwrap();
            });
            write_extension(out, ExtensionType::SignatureAlgorithms as u16, |out| {
                write_vec_u16(out, |out| {
                    for s in &self.signature_algorithms {
                        out.extend_from_slice(&s.codepoint().to_be_bytes());
                    }
                })
                .unwrap();
            });
            write_extension(out, ExtensionType::KeyShare as u16, |out| {
                write_vec_u16(out, |out| {
                    for share in &self.key_shares {
                        out.extend_from_slice(&share.group.codepoint().to_be_bytes());
                        write_vec_u16(out, |out| out.extend_from_slice(share.key_exchange)).unwrap();
                    }
                })
                .unwrap();
            });
        })?;
        Ok(())
    }

    /// Wrap [`Self::encode`]'s body in the handshake header.
    pub fn encode_message(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        write_handshake_header(out, HandshakeType::ClientHello as u8, |out| {
            self.encode(out).unwrap();
        })
    }

    pub fn decode(body: &'a [u8]) -> Result<Self, Error> {
        let mut r = Reader::new(body);
        let _legacy_version = r.u16()?;
        let random_bytes = r.bytes(32)?;
        let mut random = [0u8; 32];
        random.copy_from_slice(random_bytes);
        let _session_id = r.vec_u8()?;

        let mut cipher_suites = Vec::new();
        let mut suites_r = r.sub_reader_u16()?;
        while !suites_r.is_empty() {
            cipher_suites.push(suites_r.u16()?);
        }
        let _compression_methods = r.vec_u8()?;

        let mut supported_groups = Vec::new();
        let mut key_shares = Vec::new();
        let mut signature_algorithms = Vec::new();
        let mut server_name = None;

        let mut ext_r = r.sub_reader_u16()?;
        while !ext_r.is_empty() {
            let ext_type = ext_r.u16()?;
            let mut body_r = Reader::new(ext_r.vec_u16()?);
            match ExtensionType::from_u16(ext_type) {
                Some(ExtensionType::SupportedGroups) => {
                    let mut groups_r = body_r.sub_reader_u16()?;
                    while !groups_r.is_empty() {
                        if let Some(g) = NamedGroup::from_codepoint(groups_r.u16()?) {
                            supported_groups.push(g);
                        }
                    }
                }
                Some(ExtensionType::SignatureAlgorithms) => {
                    let mut sig_r = body_r.sub_reader_u16()?;
                    while !sig_r.is_empty() {
                        if let Some(s) = SignatureScheme::from_codepoint(sig_r.u16()?) {
                            signature_algorithms.push(s);
                        }
                    }
                }
                Some(ExtensionType::KeyShare) => {
                    let mut shares_r = body_r.sub_reader_u16()?;
                    while !shares_r.is_empty() {
                        let group_cp = shares_r.u16()?;
                        let key_exchange = shares_r.vec_u16()?;
                        if let Some(group) = NamedGroup::from_codepoint(group_cp) {
                            key_shares.push(KeyShareEntry { group, key_exchange });
                        }
                    }
                }
                Some(ExtensionType::ServerName) => {
                    server_name = parse_server_name_list(&mut body_r)?;
                }
                // supported_versions and anything unrecognized: ignored
                // (SPEC_FULL.md §4.4 — unknown extensions are not an error).
                _ => {}
            }
        }

        Ok(Self {
            random,
            cipher_suites,
            supported_groups,
            key_shares,
            signature_algorithms,
            server_name,
        })
    }
}

const LEGACY_CLIENT_VERSION: [u8; 2] = [0x03, 0x03];

/// Write `extension_type` followed by the 2-byte `extension_data`
/// length and whatever `build` puts there. Each extension's own inner
/// grammar (e.g. a further length-prefixed list) is `build`'s job.
fn write_extension(out: &mut Vec<u8>, ext_type: u16, build: impl FnOnce(&mut Vec<u8>)) {
    out.extend_from_slice(&ext_type.to_be_bytes());
    write_vec_u16(out, build).unwrap();
}

fn write_server_name_list(out: &mut Vec<u8>, name: &str) {
    out.push(0); // name_type = host_name
    write_vec_u16(out, |out| out.extend_from_slice(name.as_bytes())).unwrap();
}

fn parse_server_name_list<'a>(r: &mut Reader<'a>) -> Result<Option<&'a str>, Error> {
    let mut list_r = r.sub_reader_u16()?;
    if list_r.is_empty() {
        return Ok(None);
    }
    let name_type = list_r.u8()?;
    let raw = list_r.vec_u16()?;
    if name_type != 0 {
        return Ok(None);
    }
    core::str::from_utf8(raw).map(Some).map_err(|_| decode_error())
}

/// A well-known fixed random value marking a ServerHello as a
/// HelloRetryRequest in disguise (RFC 8446 §4.1.3).
pub const HELLO_RETRY_REQUEST_RANDOM: [u8; 32] = [
    0xCF, 0x21, 0xAD, 0x74, 0xE5, 0x9A, 0x61, 0x11, 0xBE, 0x1D, 0x8C, 0x02, 0x1E, 0x65, 0xB8, 0x91,
    0xC2, 0xA2, 0x11, 0x16, 0x7A, 0xBB, 0x8C, 0x5E, 0x07, 0x9E, 0x09, 0xE2, 0xC8, 0xA8, 0x33, 0x9C,
];

pub struct ServerHello<'a> {
    pub random: [u8; 32],
    pub cipher_suite: u16,
    pub key_share: Option<KeyShareEntry<'a>>,
}

impl<'a> ServerHello<'a> {
    pub fn is_hello_retry_request(&self) -> bool {
        self.random == HELLO_RETRY_REQUEST_RANDOM
    }

    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        out.extend_from_slice(&LEGACY_CLIENT_VERSION);
        out.extend_from_slice(&self.random);
        write_vec_u8(out, |_| {})?; // echoed legacy_session_id_echo (always empty: ptls never sends one)
        out.extend_from_slice(&self.cipher_suite.to_be_bytes());
        out.push(0); // legacy_compression_method = null

        write_vec_u16(out, |out| {
            write_extension(out, ExtensionType::SupportedVersions as u16, |out| {
                out.extend_from_slice(&TLS13_VERSION.to_be_bytes());
            });
            if let Some(share) = &self.key_share {
                write_extension(out, ExtensionType::KeyShare as u16, |out| {
                    out.extend_from_slice(&share.group.codepoint().to_be_bytes());
                    write_vec_u16(out, |out| out.extend_from_slice(share.key_exchange)).unwrap();
                });
            }
        })?;
        Ok(())
    }

    pub fn encode_message(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        write_handshake_header(out, HandshakeType::ServerHello as u8, |out| {
            self.encode(out).unwrap();
        })
    }

    pub fn decode(body: &'a [u8]) -> Result<Self, Error> {
        let mut r = Reader::new(body);
        let _legacy_version = r.u16()?;
        let random_bytes = r.bytes(32)?;
        let mut random = [0u8; 32];
        random.copy_from_slice(random_bytes);
        let _session_id_echo = r.vec_u8()?;
        let cipher_suite = r.u16()?;
        let _compression_method = r.u8()?;

        let mut key_share = None;
        let mut ext_r = r.sub_reader_u16()?;
        while !ext_r.is_empty() {
            let ext_type = ext_r.u16()?;
            let mut body_r = Reader::new(ext_r.vec_u16()?);
            if ExtensionType::from_u16(ext_type) == Some(ExtensionType::KeyShare) {
                let group_cp = body_r.u16()?;
                let key_exchange = body_r.vec_u16()?;
                if let Some(group) = NamedGroup::from_codepoint(group_cp) {
                    key_share = Some(KeyShareEntry { group, key_exchange });
                }
            }
            // supported_versions and unrecognized extensions: ignored.
        }

        Ok(Self { random, cipher_suite, key_share })
    }
}

/// EncryptedExtensions carries no fields `ptls` negotiates (ALPN,
/// max-fragment-length, etc. are out of scope); it is always empty.
pub struct EncryptedExtensions;

impl EncryptedExtensions {
    pub fn encode_message(out: &mut Vec<u8>) -> Result<(), Error> {
        write_handshake_header(out, HandshakeType::EncryptedExtensions as u8, |out| {
            write_vec_u16(out, |_| {}).unwrap(); // empty extensions list
        })
    }

    pub fn decode(body: &[u8]) -> Result<(), Error> {
        let mut r = Reader::new(body);
        let mut ext_r = r.sub_reader_u16()?;
        while !ext_r.is_empty() {
            let _ext_type = ext_r.u16()?;
            let _body = ext_r.vec_u16()?; // ignored, unconditionally
        }
        Ok(())
    }
}

/// Certificate message: `certificate_request_context` (empty outside
/// post-handshake auth, which is a non-goal) plus a list of entries,
/// end-entity first. Per-entry extensions are parsed and discarded.
pub struct CertificateMessage<'a> {
    pub entries: Vec<&'a [u8]>,
}

impl<'a> CertificateMessage<'a> {
    pub fn encode_message(entries: &[&[u8]], out: &mut Vec<u8>) -> Result<(), Error> {
        write_handshake_header(out, HandshakeType::Certificate as u8, |out| {
            write_vec_u8(out, |_| {}).unwrap(); // empty certificate_request_context
            write_vec_u24(out, |out| {
                for entry in entries {
                    write_vec_u24(out, |out| out.extend_from_slice(entry)).unwrap();
                    write_vec_u16(out, |_| {}).unwrap(); // empty per-entry extensions
                }
            })
            .unwrap();
        })
    }

    pub fn decode(body: &'a [u8]) -> Result<Self, Error> {
        let mut r = Reader::new(body);
        let _context = r.vec_u8()?;
        let mut entries = Vec::new();
        let mut list_r = r.sub_reader_u24()?;
        while !list_r.is_empty() {
            entries.push(list_r.vec_u24()?);
            let _entry_extensions = list_r.vec_u16()?;
        }
        Ok(Self { entries })
    }
}

/// CertificateVerify: the chosen signature scheme plus the signature
/// bytes themselves.
pub struct CertificateVerifyMessage<'a> {
    pub scheme: SignatureScheme,
    pub signature: &'a [u8],
}

impl<'a> CertificateVerifyMessage<'a> {
    pub fn encode_message(scheme: SignatureScheme, signature: &[u8], out: &mut Vec<u8>) -> Result<(), Error> {
        write_handshake_header(out, HandshakeType::CertificateVerify as u8, |out| {
            out.extend_from_slice(&scheme.codepoint().to_be_bytes());
            write_vec_u16(out, |out| out.extend_from_slice(signature)).unwrap();
        })
    }

    pub fn decode(body: &'a [u8]) -> Result<Self, Error> {
        let mut r = Reader::new(body);
        let scheme_cp = r.u16()?;
        let scheme = SignatureScheme::from_codepoint(scheme_cp)
            .ok_or_else(|| Error::SelfAlert(AlertDescription::IllegalParameter))?;
        let signature = r.vec_u16()?;
        Ok(Self { scheme, signature })
    }
}

/// Finished: a bare HMAC verify_data, exactly `Hash.length` bytes.
pub struct FinishedMessage<'a> {
    pub verify_data: &'a [u8],
}

impl<'a> FinishedMessage<'a> {
    pub fn encode_message(verify_data: &[u8], out: &mut Vec<u8>) -> Result<(), Error> {
        write_handshake_header(out, HandshakeType::Finished as u8, |out| {
            out.extend_from_slice(verify_data);
        })
    }

    pub fn decode(body: &'a [u8]) -> Result<Self, Error> {
        Ok(Self { verify_data: body })
    }
}

/// Build the content actually signed/verified by CertificateVerify
/// (RFC 8446 §4.4.3): 64 spaces, a context string disambiguating
/// client vs server, a zero byte, then the transcript hash.
pub fn certificate_verify_context(is_server: bool, transcript_hash: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&[0x20u8; 64]);
    if is_server {
        out.extend_from_slice(b"TLS 1.3, server CertificateVerify");
    } else {
        out.extend_from_slice(b"TLS 1.3, client CertificateVerify");
    }
    out.push(0);
    out.extend_from_slice(transcript_hash);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::NamedGroup;

    #[test]
    fn client_hello_roundtrip() {
        let share = [0x11u8; 32];
        let ch = ClientHello {
            random: [0x42; 32],
            cipher_suites: alloc::vec![0x1301, 0x1303],
            supported_groups: alloc::vec![NamedGroup::X25519],
            key_shares: alloc::vec![KeyShareEntry { group: NamedGroup::X25519, key_exchange: &share }],
            signature_algorithms: alloc::vec![SignatureScheme::Ed25519],
            server_name: Some("example.com"),
        };
        let mut out = Vec::new();
        ch.encode(&mut out).unwrap();
        let decoded = ClientHello::decode(&out).unwrap();
        assert_eq!(decoded.random, [0x42; 32]);
        assert_eq!(decoded.cipher_suites, alloc::vec![0x1301, 0x1303]);
        assert_eq!(decoded.supported_groups, alloc::vec![NamedGroup::X25519]);
        assert_eq!(decoded.key_shares.len(), 1);
        assert_eq!(decoded.key_shares[0].key_exchange, &share);
        assert_eq!(decoded.server_name, Some("example.com"));
    }

    #[test]
    fn server_hello_roundtrip_and_hrr_detection() {
        let share = [0x22u8; 32];
        let sh = ServerHello {
            random: [0x55; 32],
            cipher_suite: 0x1301,
            key_share: Some(KeyShareEntry { group: NamedGroup::X25519, key_exchange: &share }),
        };
        assert!(!sh.is_hello_retry_request());
        let mut out = Vec::new();
        sh.encode(&mut out).unwrap();
        let decoded = ServerHello::decode(&out).unwrap();
        assert_eq!(decoded.cipher_suite, 0x1301);
        assert_eq!(decoded.key_share.unwrap().key_exchange, &share);

        let hrr = ServerHello { random: HELLO_RETRY_REQUEST_RANDOM, cipher_suite: 0x1301, key_share: None };
        assert!(hrr.is_hello_retry_request());
    }

    #[test]
    fn certificate_message_roundtrip() {
        let der = [0xAAu8; 16];
        let mut out = Vec::new();
        CertificateMessage::encode_message(&[&der], &mut out).unwrap();
        // Strip the handshake header (1 type byte + 3 length bytes) before decoding the body.
        let decoded = CertificateMessage::decode(&out[4..]).unwrap();
        assert_eq!(decoded.entries, alloc::vec![&der[..]]);
    }

    #[test]
    fn certificate_verify_context_differs_by_role() {
        let th = [0x99u8; 32];
        let mut client_ctx = Vec::new();
        certificate_verify_context(false, &th, &mut client_ctx);
        let mut server_ctx = Vec::new();
        certificate_verify_context(true, &th, &mut server_ctx);
        assert_ne!(client_ctx, server_ctx);
        assert_eq!(client_ctx.len(), 64 + "TLS 1.3, client CertificateVerify".len() + 1 + 32);
    }
}
