//! End-to-end handshake tests driving a [`Connection`] pair purely
//! in-memory: client output is fed verbatim into the server and back,
//! with no real transport in between. Certificate validation is backed
//! by a bare Ed25519 keypair rather than an X.509 stack, since chain
//! parsing is explicitly the embedder's job (spec.md §4.5).

use std::cell::RefCell;
use std::vec::Vec;

use ed25519_dalek::SigningKey;
use ptls::connection::{Connection, Status};
use ptls::buffer::GrowableBuffer;
use ptls::crypto::backend::{self, OsPrng};
use ptls::crypto::{CipherSuite, CryptoRegistry, NamedGroup, SignatureScheme};
use ptls::error::{AlertDescription, Error};
use ptls::tls::{
    CertificateCallbacks, CertificateChain, CertificateLookup, CertificateVerifier, LookupResult,
    Signer, Verifier, VerifyResult,
};
use ptls::ByteView;

struct Ed25519TestSigner {
    key: [u8; 32],
}

impl Signer for Ed25519TestSigner {
    fn invoke(&mut self, data: &[u8]) -> Result<Vec<u8>, Error> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        backend::ed25519_sign(&self.key, data)
    }
}

struct Ed25519TestVerifier {
    public: [u8; 32],
}

impl Verifier for Ed25519TestVerifier {
    fn invoke(&mut self, message: &[u8], signature: &[u8]) -> Result<(), Error> {
        if message.is_empty() && signature.is_empty() {
            return Ok(());
        }
        if backend::ed25519_verify(&self.public, message, signature) {
            Ok(())
        } else {
            Err(Error::SelfAlert(AlertDescription::BadCertificate))
        }
    }
}

struct TestLookup {
    key: [u8; 32],
    chain_entry: Vec<u8>,
}

impl CertificateLookup for TestLookup {
    fn lookup(&self, _client_signature_schemes: &[SignatureScheme]) -> Result<LookupResult<'_>, Error> {
        Ok(LookupResult {
            chain: CertificateChain::new(vec![ByteView::new(&self.chain_entry)]),
            scheme: SignatureScheme::Ed25519,
            signer: Box::new(Ed25519TestSigner { key: self.key }),
        })
    }
}

struct TestVerify {
    public: [u8; 32],
}

impl CertificateVerifier for TestVerify {
    fn verify(&self, chain: &CertificateChain<'_>, _server_name: Option<&str>) -> Result<VerifyResult<'_>, Error> {
        assert!(!chain.is_empty(), "server must present at least one certificate");
        Ok(VerifyResult { verifier: Box::new(Ed25519TestVerifier { public: self.public }) })
    }
}

struct RejectingLookup;

impl CertificateLookup for RejectingLookup {
    fn lookup(&self, _client_signature_schemes: &[SignatureScheme]) -> Result<LookupResult<'_>, Error> {
        Err(Error::SelfAlert(AlertDescription::InternalError))
    }
}

struct RejectingVerify;

impl CertificateVerifier for RejectingVerify {
    fn verify(&self, _chain: &CertificateChain<'_>, _server_name: Option<&str>) -> Result<VerifyResult<'_>, Error> {
        Err(Error::SelfAlert(AlertDescription::InternalError))
    }
}

fn server_key() -> [u8; 32] {
    [0x42; 32]
}

fn server_public() -> [u8; 32] {
    SigningKey::from_bytes(&server_key()).verifying_key().to_bytes()
}

fn registry_with_suites(cipher_suites: Vec<CipherSuite>) -> CryptoRegistry {
    CryptoRegistry {
        prng: RefCell::new(Box::new(OsPrng::new())),
        key_exchanges: backend::default_key_exchanges(),
        cipher_suites,
    }
}

/// Like [`registry_with_suites`], but restricted to a single key-exchange
/// group — used to drive a negotiation failure (spec.md §8 scenario C).
fn registry_with_group(group: NamedGroup, cipher_suites: Vec<CipherSuite>) -> CryptoRegistry {
    CryptoRegistry {
        prng: RefCell::new(Box::new(OsPrng::new())),
        key_exchanges: backend::default_key_exchanges()
            .into_iter()
            .filter(|kx| kx.group() == group)
            .collect(),
        cipher_suites,
    }
}

/// Drives `client` and `server` to completion by ping-ponging whatever
/// each side's `handshake` call produces, starting with the client's
/// first flight.
fn run_handshake(client: &mut Connection<'_>, server: &mut Connection<'_>) {
    let mut to_server: Vec<u8> = Vec::new();
    let mut to_client: Vec<u8> = Vec::new();

    loop {
        let mut client_scratch = [0u8; 8192];
        let mut buf = GrowableBuffer::new(&mut client_scratch);
        let mut consumed = 0;
        let client_status = client.handshake(&mut buf, &to_client, &mut consumed).unwrap();
        to_client.drain(..consumed);
        to_server.extend_from_slice(buf.as_slice());

        let mut server_scratch = [0u8; 8192];
        let mut buf = GrowableBuffer::new(&mut server_scratch);
        let mut consumed = 0;
        let server_status = server.handshake(&mut buf, &to_server, &mut consumed).unwrap();
        to_server.drain(..consumed);
        to_client.extend_from_slice(buf.as_slice());

        let done = client_status == Status::Connected
            && server_status == Status::Connected
            && to_client.is_empty()
            && to_server.is_empty();
        if done {
            break;
        }
    }
}

#[test]
fn full_handshake_then_application_data_round_trip() {
    let client_registry = registry_with_suites(backend::default_cipher_suites());
    let server_registry = registry_with_suites(backend::default_cipher_suites());

    let client_callbacks = CertificateCallbacks {
        lookup: Box::new(RejectingLookup),
        verify: Box::new(TestVerify { public: server_public() }),
    };
    let server_callbacks = CertificateCallbacks {
        lookup: Box::new(TestLookup { key: server_key(), chain_entry: vec![0xAAu8; 16] }),
        verify: Box::new(RejectingVerify),
    };

    let mut client = Connection::new(&client_registry, client_callbacks, Some("example.com"));
    let mut server = Connection::new(&server_registry, server_callbacks, None);

    run_handshake(&mut client, &mut server);
    assert_eq!(client.role(), ptls::Role::Client);
    assert_eq!(server.role(), ptls::Role::Server);

    let mut scratch = [0u8; 256];
    let mut out = GrowableBuffer::new(&mut scratch);
    client.send(&mut out, b"hello from client").unwrap();

    let mut recv_scratch = [0u8; 256];
    let mut recv = GrowableBuffer::new(&mut recv_scratch);
    let mut consumed = 0;
    server.receive(&mut recv, out.as_slice(), &mut consumed).unwrap();
    assert_eq!(recv.as_slice(), b"hello from client");

    let mut scratch = [0u8; 256];
    let mut out = GrowableBuffer::new(&mut scratch);
    server.send(&mut out, b"hello from server").unwrap();

    let mut recv_scratch = [0u8; 256];
    let mut recv = GrowableBuffer::new(&mut recv_scratch);
    let mut consumed = 0;
    client.receive(&mut recv, out.as_slice(), &mut consumed).unwrap();
    assert_eq!(recv.as_slice(), b"hello from server");
}

#[test]
fn mismatched_cipher_suites_fail_negotiation() {
    let client_registry = registry_with_suites(vec![CipherSuite::TLS13_CHACHA20_POLY1305_SHA256]);
    let server_registry = registry_with_suites(vec![CipherSuite::TLS13_AES_128_GCM_SHA256]);

    let client_callbacks = CertificateCallbacks {
        lookup: Box::new(RejectingLookup),
        verify: Box::new(TestVerify { public: server_public() }),
    };
    let server_callbacks = CertificateCallbacks {
        lookup: Box::new(TestLookup { key: server_key(), chain_entry: vec![0xAAu8; 16] }),
        verify: Box::new(RejectingVerify),
    };

    let mut client = Connection::new(&client_registry, client_callbacks, Some("example.com"));
    let mut server = Connection::new(&server_registry, server_callbacks, None);

    let mut client_scratch = [0u8; 4096];
    let mut buf = GrowableBuffer::new(&mut client_scratch);
    let mut consumed = 0;
    client.handshake(&mut buf, &[], &mut consumed).unwrap();

    let mut server_scratch = [0u8; 4096];
    let mut buf2 = GrowableBuffer::new(&mut server_scratch);
    let mut consumed2 = 0;
    let err = server.handshake(&mut buf2, buf.as_slice(), &mut consumed2).unwrap_err();
    assert_eq!(err, Error::SelfAlert(AlertDescription::HandshakeFailure));
}

#[test]
fn tampered_finished_mac_is_rejected() {
    let client_registry = registry_with_suites(backend::default_cipher_suites());
    let server_registry = registry_with_suites(backend::default_cipher_suites());

    let client_callbacks = CertificateCallbacks {
        lookup: Box::new(RejectingLookup),
        verify: Box::new(TestVerify { public: server_public() }),
    };
    let server_callbacks = CertificateCallbacks {
        lookup: Box::new(TestLookup { key: server_key(), chain_entry: vec![0xAAu8; 16] }),
        verify: Box::new(RejectingVerify),
    };

    let mut client = Connection::new(&client_registry, client_callbacks, Some("example.com"));
    let mut server = Connection::new(&server_registry, server_callbacks, None);

    let mut to_server: Vec<u8> = Vec::new();
    let mut to_client: Vec<u8> = Vec::new();

    // Drive the client's first flight, then the server's full response
    // flight (ServerHello..Finished) in one shot, landing the client at
    // WaitFinished without yet having processed a (possibly tampered)
    // server Finished.
    let mut client_scratch = [0u8; 8192];
    let mut buf = GrowableBuffer::new(&mut client_scratch);
    let mut consumed = 0;
    client.handshake(&mut buf, &to_client, &mut consumed).unwrap();
    to_server.extend_from_slice(buf.as_slice());

    let mut server_scratch = [0u8; 8192];
    let mut buf = GrowableBuffer::new(&mut server_scratch);
    let mut consumed = 0;
    server.handshake(&mut buf, &to_server, &mut consumed).unwrap();
    to_client.extend_from_slice(buf.as_slice());

    // Flip a bit deep enough in the flight to land inside the server's
    // Finished verify_data without corrupting the AEAD tag boundary of
    // an earlier record.
    let tamper_index = to_client.len() - 1;
    to_client[tamper_index] ^= 0x01;

    let mut client_scratch2 = [0u8; 8192];
    let mut buf = GrowableBuffer::new(&mut client_scratch2);
    let mut consumed = 0;
    let err = client.handshake(&mut buf, &to_client, &mut consumed).unwrap_err();
    assert!(matches!(err, Error::SelfAlert(AlertDescription::BadRecordMac) | Error::SelfAlert(AlertDescription::DecryptError)));
}

/// spec.md §8 scenario C: client offers only secp256r1, server supports
/// only X25519 — no common group, so negotiation fails with
/// `handshake_failure` (self-alert on the server, peer-alert on the
/// client once it processes the server's alert record).
#[test]
fn group_mismatch_fails_negotiation() {
    let client_registry = registry_with_group(NamedGroup::Secp256r1, backend::default_cipher_suites());
    let server_registry = registry_with_group(NamedGroup::X25519, backend::default_cipher_suites());

    let client_callbacks = CertificateCallbacks {
        lookup: Box::new(RejectingLookup),
        verify: Box::new(TestVerify { public: server_public() }),
    };
    let server_callbacks = CertificateCallbacks {
        lookup: Box::new(TestLookup { key: server_key(), chain_entry: vec![0xAAu8; 16] }),
        verify: Box::new(RejectingVerify),
    };

    let mut client = Connection::new(&client_registry, client_callbacks, Some("example.com"));
    let mut server = Connection::new(&server_registry, server_callbacks, None);

    let mut client_scratch = [0u8; 4096];
    let mut client_first_flight = GrowableBuffer::new(&mut client_scratch);
    let mut consumed = 0;
    client.handshake(&mut client_first_flight, &[], &mut consumed).unwrap();

    let mut server_scratch = [0u8; 4096];
    let mut server_out = GrowableBuffer::new(&mut server_scratch);
    let mut consumed = 0;
    let server_err = server
        .handshake(&mut server_out, client_first_flight.as_slice(), &mut consumed)
        .unwrap_err();
    assert_eq!(server_err, Error::SelfAlert(AlertDescription::HandshakeFailure));

    let mut client_scratch2 = [0u8; 4096];
    let mut client_out2 = GrowableBuffer::new(&mut client_scratch2);
    let mut consumed2 = 0;
    let client_err = client
        .handshake(&mut client_out2, server_out.as_slice(), &mut consumed2)
        .unwrap_err();
    assert_eq!(client_err, Error::PeerAlert(AlertDescription::HandshakeFailure));
}

/// spec.md §8 scenario E: the server's first flight is delivered to the
/// client one byte at a time. `handshake` must return `InProgress` on
/// every call that doesn't complete a full record, always reporting the
/// fed length as consumed, until the final byte lands the connection in
/// `Connected`.
#[test]
fn short_input_delivered_one_byte_at_a_time() {
    let client_registry = registry_with_suites(backend::default_cipher_suites());
    let server_registry = registry_with_suites(backend::default_cipher_suites());

    let client_callbacks = CertificateCallbacks {
        lookup: Box::new(RejectingLookup),
        verify: Box::new(TestVerify { public: server_public() }),
    };
    let server_callbacks = CertificateCallbacks {
        lookup: Box::new(TestLookup { key: server_key(), chain_entry: vec![0xAAu8; 16] }),
        verify: Box::new(RejectingVerify),
    };

    let mut client = Connection::new(&client_registry, client_callbacks, Some("example.com"));
    let mut server = Connection::new(&server_registry, server_callbacks, None);

    let mut client_scratch = [0u8; 8192];
    let mut client_first_flight = GrowableBuffer::new(&mut client_scratch);
    let mut consumed = 0;
    client.handshake(&mut client_first_flight, &[], &mut consumed).unwrap();

    let mut server_scratch = [0u8; 8192];
    let mut server_flight = GrowableBuffer::new(&mut server_scratch);
    let mut consumed = 0;
    server
        .handshake(&mut server_flight, client_first_flight.as_slice(), &mut consumed)
        .unwrap();

    let flight = server_flight.as_slice().to_vec();
    for (i, &byte) in flight.iter().enumerate() {
        let mut scratch = [0u8; 8192];
        let mut out = GrowableBuffer::new(&mut scratch);
        let mut consumed = 0;
        let status = client.handshake(&mut out, core::slice::from_ref(&byte), &mut consumed).unwrap();
        assert_eq!(consumed, 1, "every fed byte must be reported consumed");
        if i + 1 < flight.len() {
            assert_eq!(status, Status::InProgress);
        } else {
            assert_eq!(status, Status::Connected);
        }
    }
}

/// spec.md §8 scenario F: after `connected`, one party sends
/// `close_notify`. The peer's `receive` reports it as a graceful,
/// peer-alert-class error exactly once; a subsequent `receive` call
/// reports the same terminal error rather than hanging or succeeding.
#[test]
fn graceful_close_is_reported_once_then_terminal() {
    let client_registry = registry_with_suites(backend::default_cipher_suites());
    let server_registry = registry_with_suites(backend::default_cipher_suites());

    let client_callbacks = CertificateCallbacks {
        lookup: Box::new(RejectingLookup),
        verify: Box::new(TestVerify { public: server_public() }),
    };
    let server_callbacks = CertificateCallbacks {
        lookup: Box::new(TestLookup { key: server_key(), chain_entry: vec![0xAAu8; 16] }),
        verify: Box::new(RejectingVerify),
    };

    let mut client = Connection::new(&client_registry, client_callbacks, Some("example.com"));
    let mut server = Connection::new(&server_registry, server_callbacks, None);
    run_handshake(&mut client, &mut server);

    let mut scratch = [0u8; 256];
    let mut out = GrowableBuffer::new(&mut scratch);
    server.close(&mut out).unwrap();

    let mut recv_scratch = [0u8; 256];
    let mut recv = GrowableBuffer::new(&mut recv_scratch);
    let mut consumed = 0;
    let err = client.receive(&mut recv, out.as_slice(), &mut consumed).unwrap_err();
    assert_eq!(err, Error::PeerAlert(AlertDescription::CloseNotify));
    assert!(err.is_graceful_close());

    let mut recv_scratch2 = [0u8; 256];
    let mut recv2 = GrowableBuffer::new(&mut recv_scratch2);
    let mut consumed2 = 0;
    let err2 = client.receive(&mut recv2, &[], &mut consumed2).unwrap_err();
    assert_eq!(err2, Error::PeerAlert(AlertDescription::CloseNotify));
}
