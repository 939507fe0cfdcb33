//! The connection object: binds a role, the crypto registry, certificate
//! callbacks, and the current handshake/record state.
//!
//! This is the orchestrator. It owns no I/O: every operation takes the
//! bytes it needs as an argument and appends whatever it produces to a
//! caller-supplied [`GrowableBuffer`].

use alloc::boxed::Box;
use alloc::vec::Vec;

use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::buffer::GrowableBuffer;
use crate::bytes::ByteView;
use crate::crypto::hkdf::HkdfAlgorithm;
use crate::crypto::schedule::{HandshakeSecrets, KeySchedule};
use crate::crypto::transcript::TranscriptHash;
use crate::crypto::{CipherSuite, CryptoRegistry, Finalize, NamedGroup, SignatureScheme};
use crate::error::{AlertDescription, Error};
use crate::tls::certificate::{
    release_signer, release_verifier, CertificateCallbacks, CertificateChain, Signer, Verifier,
};
use crate::tls::handshake::{
    certificate_verify_context, CertificateMessage, CertificateVerifyMessage, ClientHello,
    EncryptedExtensions, FinishedMessage, KeyShareEntry, ServerHello,
};
use crate::tls::record::{AeadContext, ContentType, RecordLayer};
use crate::tls::HandshakeType;

#[cfg(feature = "default-backend")]
use crate::crypto::backend;

/// Which side of the handshake a [`Connection`] plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Result of a [`Connection::handshake`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// More input is needed before the handshake can progress further.
    InProgress,
    /// The handshake finished; application traffic secrets are installed.
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientPhase {
    Start,
    WaitServerHello,
    WaitEncryptedExtensions,
    WaitCertificate,
    WaitCertificateVerify,
    WaitFinished,
    Connected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerPhase {
    WaitClientHello,
    WaitFinished,
    Connected,
}

/// Binds a role, the crypto registry, certificate callbacks, and the
/// live handshake/record state. Created by [`Connection::new`], mutated
/// only by [`Connection::handshake`]/[`Connection::receive`]/
/// [`Connection::send`], and releases (zeroes) all secret-bearing state
/// on `Drop`.
pub struct Connection<'a> {
    role: Role,
    registry: &'a CryptoRegistry,
    callbacks: CertificateCallbacks<'a>,
    server_name: Option<&'a str>,

    /// Messages hashed before the cipher suite (and hence the transcript's
    /// hash algorithm) is known. Replayed into the real transcript once
    /// `install_handshake_secrets` picks the negotiated digest.
    early_messages: Vec<Vec<u8>>,
    transcript: Option<TranscriptHash>,
    hkdf: Option<&'static dyn HkdfAlgorithm>,
    suite: Option<CipherSuite>,
    handshake_secrets: Option<HandshakeSecrets>,
    schedule: Option<KeySchedule<'static>>,

    records: RecordLayer,
    hs_buffer: Vec<u8>,

    pending_privates: Vec<Box<dyn crate::crypto::KeyExchangePrivate>>,
    peer_chain: Vec<Vec<u8>>,
    pending_signer: Option<Box<dyn Signer + 'a>>,
    pending_verifier: Option<Box<dyn Verifier + 'a>>,

    client_phase: ClientPhase,
    server_phase: ServerPhase,

    terminal_error: Option<Error>,
}

impl<'a> Connection<'a> {
    /// `new(crypto_registry, cert_callbacks, optional server_name)`.
    /// Client role iff `server_name` is supplied.
    pub fn new(
        registry: &'a CryptoRegistry,
        callbacks: CertificateCallbacks<'a>,
        server_name: Option<&'a str>,
    ) -> Self {
        let role = if server_name.is_some() { Role::Client } else { Role::Server };
        log::debug!("new {:?} connection", role);
        Self {
            role,
            registry,
            callbacks,
            server_name,
            early_messages: Vec::new(),
            transcript: None,
            hkdf: None,
            suite: None,
            handshake_secrets: None,
            schedule: None,
            records: RecordLayer::new(),
            hs_buffer: Vec::new(),
            pending_privates: Vec::new(),
            peer_chain: Vec::new(),
            pending_signer: None,
            pending_verifier: None,
            client_phase: ClientPhase::Start,
            server_phase: ServerPhase::WaitClientHello,
            terminal_error: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    fn check_not_failed(&self) -> Result<(), Error> {
        if let Some(err) = self.terminal_error {
            return Err(err);
        }
        Ok(())
    }

    /// Mark the connection terminally failed, append `alert` to `out`
    /// under whatever cipher is currently active, and release any
    /// outstanding certificate-callback state. Returns the error the
    /// caller should propagate.
    fn fail(&mut self, out: &mut GrowableBuffer, alert: AlertDescription) -> Error {
        let err = Error::SelfAlert(alert);
        self.terminal_error = Some(err);
        let _ = self.records.seal_and_append(ContentType::Alert, &[2, alert as u8], out);
        self.release_pending_callbacks();
        log::debug!("connection failed: {}", err);
        err
    }

    fn release_pending_callbacks(&mut self) {
        if let Some(mut signer) = self.pending_signer.take() {
            release_signer(signer.as_mut());
        }
        if let Some(mut verifier) = self.pending_verifier.take() {
            release_verifier(verifier.as_mut());
        }
    }

    /// Add a handshake message (header + body) to the transcript. Before
    /// the cipher suite is negotiated the digest algorithm isn't known
    /// yet, so messages are buffered and replayed once it is: every
    /// handshake message is hashed exactly once, in wire order, under
    /// the negotiated suite's hash.
    fn record_transcript(&mut self, msg: &[u8]) {
        match &mut self.transcript {
            Some(t) => t.update(msg),
            None => self.early_messages.push(msg.to_vec()),
        }
    }

    /// `handshake(connection, out_buffer, in_ptr, &in_len)`: feed
    /// incoming bytes, append any outgoing handshake bytes produced to
    /// `out`, and report whether the handshake is complete.
    pub fn handshake(
        &mut self,
        out: &mut GrowableBuffer,
        input: &[u8],
        consumed: &mut usize,
    ) -> Result<Status, Error> {
        self.check_not_failed()?;
        *consumed = 0;

        if self.role == Role::Client && self.client_phase == ClientPhase::Start {
            self.start_client(out)?;
        }

        self.records.feed(input);
        *consumed = input.len();

        loop {
            let record = match self.records.next_record() {
                Ok(Some(r)) => r,
                Ok(None) => break,
                Err(Error::SelfAlert(alert)) => return Err(self.fail(out, alert)),
                Err(e) => return Err(e),
            };
            match record {
                (ContentType::Handshake, payload) => {
                    self.hs_buffer.extend_from_slice(&payload);
                    while let Some(msg) = self.next_handshake_message() {
                        if let Err(e) = self.dispatch(&msg, out) {
                            let alert = match e {
                                Error::SelfAlert(a) => a,
                                _ => AlertDescription::InternalError,
                            };
                            return Err(self.fail(out, alert));
                        }
                        if self.is_connected() {
                            return Ok(Status::Connected);
                        }
                    }
                }
                (ContentType::Alert, payload) => {
                    return Err(self.handle_alert(&payload));
                }
                (ContentType::ApplicationData, _) => {
                    return Err(self.fail(out, AlertDescription::UnexpectedMessage));
                }
                (ContentType::ChangeCipherSpec, _) => unreachable!("filtered by RecordLayer"),
            }
        }

        if self.is_connected() {
            Ok(Status::Connected)
        } else {
            Ok(Status::InProgress)
        }
    }

    fn is_connected(&self) -> bool {
        match self.role {
            Role::Client => self.client_phase == ClientPhase::Connected,
            Role::Server => self.server_phase == ServerPhase::Connected,
        }
    }

    fn handle_alert(&mut self, payload: &[u8]) -> Error {
        let description = payload
            .get(1)
            .and_then(|b| AlertDescription::from_byte(*b))
            .unwrap_or(AlertDescription::InternalError);
        let err = Error::PeerAlert(description);
        self.terminal_error = Some(err);
        self.release_pending_callbacks();
        err
    }

    fn next_handshake_message(&mut self) -> Option<Vec<u8>> {
        if self.hs_buffer.len() < 4 {
            return None;
        }
        let len = u32::from_be_bytes([0, self.hs_buffer[1], self.hs_buffer[2], self.hs_buffer[3]]) as usize;
        let total = 4 + len;
        if self.hs_buffer.len() < total {
            return None;
        }
        Some(self.hs_buffer.drain(..total).collect())
    }

    /// Dispatch one handshake message. Each handler is responsible for
    /// calling [`Self::record_transcript`] itself, at the point RFC 8446
    /// requires — notably, a peer's Finished message must be verified
    /// against the transcript *excluding* itself, then recorded only
    /// afterwards, so the generic loop cannot record it up front.
    fn dispatch(&mut self, msg: &[u8], out: &mut GrowableBuffer) -> Result<(), Error> {
        let msg_type = HandshakeType::from_byte(msg[0])
            .ok_or(Error::SelfAlert(AlertDescription::DecodeError))?;
        let body = &msg[4..];
        match self.role {
            Role::Client => self.client_dispatch(msg_type, msg, body, out),
            Role::Server => self.server_dispatch(msg_type, msg, body, out),
        }
    }

    // -------------------------------------------------------------
    // Client handshake flow
    // -------------------------------------------------------------

    fn start_client(&mut self, out: &mut GrowableBuffer) -> Result<(), Error> {
        let mut privates = Vec::new();
        let mut key_shares_storage: Vec<(NamedGroup, Vec<u8>)> = Vec::new();
        for kx in &self.registry.key_exchanges {
            let mut prng = self.registry.prng.borrow_mut();
            let (private, public) = kx.prepare(&mut **prng)?;
            key_shares_storage.push((private.group(), public));
            privates.push(private);
        }
        self.pending_privates = privates;

        let mut random = [0u8; 32];
        self.registry.prng.borrow_mut().fill(&mut random)?;

        let key_shares: Vec<KeyShareEntry> = key_shares_storage
            .iter()
            .map(|(group, public)| KeyShareEntry { group: *group, key_exchange: public.as_slice() })
            .collect();

        let ch = ClientHello {
            random,
            cipher_suites: self.registry.cipher_suites.iter().map(|s| s.code_point).collect(),
            supported_groups: self.registry.key_exchanges.iter().map(|kx| kx.group()).collect(),
            key_shares,
            signature_algorithms: alloc::vec![SignatureScheme::EcdsaSecp256r1Sha256, SignatureScheme::Ed25519],
            server_name: self.server_name,
        };

        let mut wire = Vec::new();
        ch.encode_message(&mut wire)?;
        self.record_transcript(&wire);
        self.records.seal_and_append(ContentType::Handshake, &wire, out)?;
        self.client_phase = ClientPhase::WaitServerHello;
        Ok(())
    }

    fn client_dispatch(
        &mut self,
        msg_type: HandshakeType,
        msg: &[u8],
        body: &[u8],
        out: &mut GrowableBuffer,
    ) -> Result<(), Error> {
        match (self.client_phase, msg_type) {
            (ClientPhase::WaitServerHello, HandshakeType::ServerHello) => self.client_on_server_hello(msg, body),
            (ClientPhase::WaitEncryptedExtensions, HandshakeType::EncryptedExtensions) => {
                EncryptedExtensions::decode(body)?;
                self.record_transcript(msg);
                self.client_phase = ClientPhase::WaitCertificate;
                Ok(())
            }
            (ClientPhase::WaitCertificate, HandshakeType::Certificate) => {
                self.on_certificate(body)?;
                self.record_transcript(msg);
                self.client_phase = ClientPhase::WaitCertificateVerify;
                Ok(())
            }
            (ClientPhase::WaitCertificateVerify, HandshakeType::CertificateVerify) => {
                self.client_on_certificate_verify(msg, body)
            }
            (ClientPhase::WaitFinished, HandshakeType::Finished) => self.client_on_finished(msg, body, out),
            _ => Err(Error::SelfAlert(AlertDescription::UnexpectedMessage)),
        }
    }

    fn client_on_server_hello(&mut self, msg: &[u8], body: &[u8]) -> Result<(), Error> {
        let sh = ServerHello::decode(body)?;
        if sh.is_hello_retry_request() {
            // HelloRetryRequest round-trips are out of scope (no PSK/0-RTT
            // retry flow); fail loudly instead of misparsing it as an
            // ordinary ServerHello and desyncing the transcript.
            return Err(Error::SelfAlert(AlertDescription::HandshakeFailure));
        }
        let suite = CipherSuite::from_code_point(sh.cipher_suite)
            .filter(|s| self.registry.cipher_suites.contains(s))
            .ok_or(Error::SelfAlert(AlertDescription::HandshakeFailure))?;
        let share = sh.key_share.ok_or(Error::SelfAlert(AlertDescription::HandshakeFailure))?;

        let idx = self
            .pending_privates
            .iter()
            .position(|p| p.group() == share.group)
            .ok_or(Error::SelfAlert(AlertDescription::HandshakeFailure))?;
        let private = self.pending_privates.swap_remove(idx);
        self.pending_privates.clear();
        let shared_secret = private.complete(share.key_exchange)?;

        self.record_transcript(msg);
        self.install_handshake_secrets(suite, &shared_secret)?;
        self.client_phase = ClientPhase::WaitEncryptedExtensions;
        Ok(())
    }

    fn client_on_certificate_verify(&mut self, msg: &[u8], body: &[u8]) -> Result<(), Error> {
        let cv = CertificateVerifyMessage::decode(body)?;
        let views: Vec<ByteView> = self.peer_chain.iter().map(|d| ByteView::new(d)).collect();
        let chain = CertificateChain::new(views);

        let verify_result = self.callbacks.verify.verify(&chain, self.server_name)?;
        let mut verifier = verify_result.verifier;

        let th = self.transcript_snapshot()?;
        let mut context = Vec::new();
        certificate_verify_context(true, &th, &mut context);
        let outcome = verifier.invoke(&context, cv.signature);
        release_verifier(verifier.as_mut());
        outcome.map_err(|_| Error::SelfAlert(AlertDescription::BadCertificate))?;
        let _ = cv.scheme; // the scheme is informational; the verifier decides validity

        self.record_transcript(msg);
        self.client_phase = ClientPhase::WaitFinished;
        Ok(())
    }

    fn client_on_finished(&mut self, msg: &[u8], body: &[u8], out: &mut GrowableBuffer) -> Result<(), Error> {
        // The MAC covers the transcript up to but excluding this message.
        let th_before_server_finished = self.transcript_snapshot()?;
        self.verify_finished(body, &th_before_server_finished, BaseKeyOwner::Server)?;
        self.record_transcript(msg);

        let fin = FinishedMessage::decode(body)?;
        let _ = fin;

        let hs = self
            .handshake_secrets
            .clone()
            .ok_or(Error::LIBRARY_BUG)?;
        let hkdf = self.hkdf.ok_or(Error::LIBRARY_BUG)?;
        let client_finished_key = crate::crypto::schedule::finished_key(hkdf, &hs.client)?;
        let verify_data = crate::crypto::schedule::finished_verify_data(hkdf, &client_finished_key, &th_before_server_finished);
        let mut wire = Vec::new();
        FinishedMessage::encode_message(&verify_data, &mut wire)?;
        let th_server_finished = self.transcript_snapshot()?;
        self.record_transcript(&wire);
        self.records.seal_and_append(ContentType::Handshake, &wire, out)?;

        let th_through_client_finished = self.transcript_snapshot()?;
        self.install_application_secrets(&th_server_finished, &th_through_client_finished)?;
        self.client_phase = ClientPhase::Connected;
        Ok(())
    }

    // -------------------------------------------------------------
    // Server handshake flow
    // -------------------------------------------------------------

    fn server_dispatch(
        &mut self,
        msg_type: HandshakeType,
        msg: &[u8],
        body: &[u8],
        out: &mut GrowableBuffer,
    ) -> Result<(), Error> {
        match (self.server_phase, msg_type) {
            (ServerPhase::WaitClientHello, HandshakeType::ClientHello) => self.server_on_client_hello(msg, body, out),
            (ServerPhase::WaitFinished, HandshakeType::Finished) => self.server_on_finished(msg, body),
            _ => Err(Error::SelfAlert(AlertDescription::UnexpectedMessage)),
        }
    }

    fn server_on_client_hello(&mut self, msg: &[u8], body: &[u8], out: &mut GrowableBuffer) -> Result<(), Error> {
        let ch = ClientHello::decode(body)?;

        let suite = self
            .registry
            .cipher_suites
            .iter()
            .find(|s| ch.cipher_suites.contains(&s.code_point))
            .copied()
            .ok_or(Error::SelfAlert(AlertDescription::HandshakeFailure))?;

        let client_share = ch
            .key_shares
            .iter()
            .find(|share| self.registry.key_exchange_for(share.group).is_some())
            .ok_or(Error::SelfAlert(AlertDescription::HandshakeFailure))?;
        let kx = self
            .registry
            .key_exchange_for(client_share.group)
            .ok_or(Error::LIBRARY_BUG)?;
        let (server_public, shared_secret) = {
            let mut prng = self.registry.prng.borrow_mut();
            kx.exchange(&mut **prng, client_share.key_exchange)?
        };
        let group = client_share.group;

        let lookup_result = self.callbacks.lookup.lookup(&ch.signature_algorithms)?;
        if lookup_result.chain.is_empty() {
            // An empty chain from `lookup` is treated as a bug-check,
            // not a legal "no certificate" case.
            return Err(Error::SelfAlert(AlertDescription::HandshakeFailure));
        }
        let scheme = lookup_result.scheme;
        let mut signer = lookup_result.signer;
        let entries: Vec<Vec<u8>> = lookup_result.chain.entries().iter().map(|v| v.as_slice().to_vec()).collect();

        self.record_transcript(msg);

        let mut random = [0u8; 32];
        self.registry.prng.borrow_mut().fill(&mut random)?;
        let sh = ServerHello {
            random,
            cipher_suite: suite.code_point,
            key_share: Some(KeyShareEntry { group, key_exchange: &server_public }),
        };
        let mut wire = Vec::new();
        sh.encode_message(&mut wire)?;
        self.record_transcript(&wire);
        self.records.seal_and_append(ContentType::Handshake, &wire, out)?;

        self.install_handshake_secrets(suite, &shared_secret)?;

        let mut ee_wire = Vec::new();
        EncryptedExtensions::encode_message(&mut ee_wire)?;
        self.record_transcript(&ee_wire);
        self.records.seal_and_append(ContentType::Handshake, &ee_wire, out)?;

        let entry_refs: Vec<&[u8]> = entries.iter().map(|e| e.as_slice()).collect();
        let mut cert_wire = Vec::new();
        CertificateMessage::encode_message(&entry_refs, &mut cert_wire)?;
        self.record_transcript(&cert_wire);
        self.records.seal_and_append(ContentType::Handshake, &cert_wire, out)?;

        let th = self.transcript_snapshot()?;
        let mut context = Vec::new();
        certificate_verify_context(true, &th, &mut context);
        let signature = signer.invoke(&context)?;
        release_signer(signer.as_mut());

        let mut cv_wire = Vec::new();
        CertificateVerifyMessage::encode_message(scheme, &signature, &mut cv_wire)?;
        self.record_transcript(&cv_wire);
        self.records.seal_and_append(ContentType::Handshake, &cv_wire, out)?;

        let server_finished_th = self.transcript_snapshot()?;
        let hs = self.handshake_secrets.clone().ok_or(Error::LIBRARY_BUG)?;
        let hkdf = self.hkdf.ok_or(Error::LIBRARY_BUG)?;
        let server_finished_key = crate::crypto::schedule::finished_key(hkdf, &hs.server)?;
        let verify_data = crate::crypto::schedule::finished_verify_data(hkdf, &server_finished_key, &server_finished_th);
        let mut fin_wire = Vec::new();
        FinishedMessage::encode_message(&verify_data, &mut fin_wire)?;
        self.record_transcript(&fin_wire);
        self.records.seal_and_append(ContentType::Handshake, &fin_wire, out)?;

        self.server_phase = ServerPhase::WaitFinished;
        Ok(())
    }

    fn server_on_finished(&mut self, msg: &[u8], body: &[u8]) -> Result<(), Error> {
        let th_through_server_finished = self.transcript_snapshot()?;
        self.verify_finished(body, &th_through_server_finished, BaseKeyOwner::Client)?;
        self.record_transcript(msg);

        let th_through_client_finished = self.transcript_snapshot()?;
        self.install_application_secrets(&th_through_server_finished, &th_through_client_finished)?;
        self.server_phase = ServerPhase::Connected;
        Ok(())
    }

    // -------------------------------------------------------------
    // Shared handshake helpers
    // -------------------------------------------------------------

    fn on_certificate(&mut self, body: &[u8]) -> Result<(), Error> {
        let cert = CertificateMessage::decode(body)?;
        if cert.entries.is_empty() {
            return Err(Error::SelfAlert(AlertDescription::HandshakeFailure));
        }
        self.peer_chain = cert.entries.iter().map(|e| e.to_vec()).collect();
        Ok(())
    }

    fn transcript_snapshot(&mut self) -> Result<Vec<u8>, Error> {
        let transcript = self.transcript.as_mut().ok_or(Error::LIBRARY_BUG)?;
        Ok(transcript.finalize(Finalize::Snapshot))
    }

    fn verify_finished(&mut self, body: &[u8], transcript_hash: &[u8], base_key_owner: BaseKeyOwner) -> Result<(), Error> {
        let hkdf = self.hkdf.ok_or(Error::LIBRARY_BUG)?;
        let hs = self.handshake_secrets.as_ref().ok_or(Error::LIBRARY_BUG)?;
        let base_key = match base_key_owner {
            BaseKeyOwner::Server => &hs.server,
            BaseKeyOwner::Client => &hs.client,
        };
        let finished_key = crate::crypto::schedule::finished_key(hkdf, base_key)?;
        let expected = crate::crypto::schedule::finished_verify_data(hkdf, &finished_key, transcript_hash);
        if expected.ct_eq(body).unwrap_u8() != 1 {
            return Err(Error::SelfAlert(AlertDescription::DecryptError));
        }
        Ok(())
    }

    fn install_handshake_secrets(&mut self, suite: CipherSuite, shared_secret: &[u8]) -> Result<(), Error> {
        let hkdf = pick_hkdf(suite.hash);
        self.hkdf = Some(hkdf);
        self.suite = Some(suite);

        // The transcript's hash algorithm is only known now. Build it
        // for the negotiated suite and replay everything hashed so far.
        let mut transcript = TranscriptHash::new(digest_for(suite.hash));
        for early in self.early_messages.drain(..) {
            transcript.update(&early);
        }
        self.transcript = Some(transcript);

        let th = self.transcript_snapshot()?;
        let mut schedule = KeySchedule::new(hkdf);
        let secrets = schedule.handshake_secrets(shared_secret, &th)?;

        let key_size = suite.aead.key_size();
        let iv_size = suite.aead.iv_size();
        let client_key = crate::crypto::schedule::traffic_key(hkdf, &secrets.client, key_size)?;
        let client_iv = crate::crypto::schedule::traffic_iv(hkdf, &secrets.client, iv_size)?;
        let server_key = crate::crypto::schedule::traffic_key(hkdf, &secrets.server, key_size)?;
        let server_iv = crate::crypto::schedule::traffic_iv(hkdf, &secrets.server, iv_size)?;

        let client_cipher = AeadContext::new(pick_aead(suite.aead), client_key, client_iv);
        let server_cipher = AeadContext::new(pick_aead(suite.aead), server_key, server_iv);

        match self.role {
            Role::Client => {
                self.records.install_read(server_cipher);
                self.records.install_write(client_cipher);
            }
            Role::Server => {
                self.records.install_read(client_cipher);
                self.records.install_write(server_cipher);
            }
        }

        self.handshake_secrets = Some(secrets);
        self.schedule = Some(schedule);
        Ok(())
    }

    fn install_application_secrets(&mut self, th_server_finished: &[u8], th_client_finished: &[u8]) -> Result<(), Error> {
        let hkdf = self.hkdf.ok_or(Error::LIBRARY_BUG)?;
        let suite = self.suite.ok_or(Error::LIBRARY_BUG)?;

        // Continue the same key-schedule chain the Handshake Secret was
        // derived on; this is the only place the Master Secret step runs.
        let mut schedule = self.schedule.take().ok_or(Error::LIBRARY_BUG)?;
        let mut masters = schedule.master_secrets(th_server_finished, th_client_finished)?;
        drop(schedule);

        let key_size = suite.aead.key_size();
        let iv_size = suite.aead.iv_size();
        let client_key = crate::crypto::schedule::traffic_key(hkdf, &masters.client_application, key_size)?;
        let client_iv = crate::crypto::schedule::traffic_iv(hkdf, &masters.client_application, iv_size)?;
        let server_key = crate::crypto::schedule::traffic_key(hkdf, &masters.server_application, key_size)?;
        let server_iv = crate::crypto::schedule::traffic_iv(hkdf, &masters.server_application, iv_size)?;

        let client_cipher = AeadContext::new(pick_aead(suite.aead), client_key, client_iv);
        let server_cipher = AeadContext::new(pick_aead(suite.aead), server_key, server_iv);

        match self.role {
            Role::Client => {
                self.records.install_read(server_cipher);
                self.records.install_write(client_cipher);
            }
            Role::Server => {
                self.records.install_read(client_cipher);
                self.records.install_write(server_cipher);
            }
        }

        masters.exporter_master.zeroize();
        masters.resumption_master.zeroize();
        if let Some(mut old) = self.handshake_secrets.take() {
            old.client.zeroize();
            old.server.zeroize();
        }
        Ok(())
    }

    /// `receive(connection, plaintext_out_buffer, in_ptr, &in_len)`:
    /// decrypt exactly one application-data record, appending its inner
    /// plaintext to `out`. A zero-length plaintext is legal and is not
    /// surfaced as end-of-stream.
    pub fn receive(&mut self, out: &mut GrowableBuffer, input: &[u8], consumed: &mut usize) -> Result<(), Error> {
        self.check_not_failed()?;
        self.records.feed(input);
        *consumed = input.len();

        loop {
            match self.records.next_record() {
                Ok(Some((ContentType::ApplicationData, payload))) => {
                    out.append(&payload)?;
                    return Ok(());
                }
                Ok(Some((ContentType::Alert, payload))) => {
                    return Err(self.handle_alert(&payload));
                }
                Ok(Some((ContentType::Handshake, _))) => {
                    // Post-handshake messages (e.g. session tickets) are out
                    // of scope; drop and keep looking for application data.
                    continue;
                }
                Ok(Some((ContentType::ChangeCipherSpec, _))) => unreachable!("filtered by RecordLayer"),
                Ok(None) => return Err(Error::InProgress),
                Err(Error::SelfAlert(alert)) => {
                    self.terminal_error = Some(Error::SelfAlert(alert));
                    return Err(Error::SelfAlert(alert));
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// `send(connection, out_buffer, plaintext_ptr, plaintext_len)`:
    /// fragment and AEAD-seal `plaintext` into one or more
    /// application-data records appended to `out`.
    pub fn send(&mut self, out: &mut GrowableBuffer, plaintext: &[u8]) -> Result<(), Error> {
        self.check_not_failed()?;
        self.records.seal_and_append(ContentType::ApplicationData, plaintext, out)
    }

    /// Send a close_notify alert (a graceful end-of-stream, not a
    /// failure — does not set `terminal_error`, mirroring how a peer's
    /// own close_notify is reported as `is_graceful_close()` rather
    /// than a hard failure).
    pub fn close(&mut self, out: &mut GrowableBuffer) -> Result<(), Error> {
        self.check_not_failed()?;
        self.records.seal_and_append(ContentType::Alert, &[1, AlertDescription::CloseNotify as u8], out)
    }
}

impl<'a> Drop for Connection<'a> {
    fn drop(&mut self) {
        self.release_pending_callbacks();
        if let Some(mut hs) = self.handshake_secrets.take() {
            hs.client.zeroize();
            hs.server.zeroize();
        }
    }
}

/// Which side's base key a Finished MAC is computed/verified against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BaseKeyOwner {
    Client,
    Server,
}

fn pick_hkdf(hash: crate::crypto::HashAlgorithm) -> &'static dyn HkdfAlgorithm {
    #[cfg(feature = "default-backend")]
    {
        backend::hkdf_algorithm(hash)
    }
    #[cfg(not(feature = "default-backend"))]
    {
        let _ = hash;
        panic!("no HKDF backend available; build with feature = \"default-backend\" or supply one")
    }
}

fn pick_aead(alg: crate::crypto::AeadAlgorithm) -> Box<dyn crate::crypto::Aead> {
    #[cfg(feature = "default-backend")]
    {
        backend::aead_for(alg)
    }
    #[cfg(not(feature = "default-backend"))]
    {
        let _ = alg;
        panic!("no AEAD backend available; build with feature = \"default-backend\" or supply one")
    }
}

fn digest_for(hash: crate::crypto::HashAlgorithm) -> Box<dyn crate::crypto::DigestCtx> {
    #[cfg(feature = "default-backend")]
    {
        backend::digest_ctx(hash)
    }
    #[cfg(not(feature = "default-backend"))]
    {
        let _ = hash;
        panic!("no digest backend available; build with feature = \"default-backend\" or supply one")
    }
}
