//! Certificate callback protocol (spec.md §4.5).
//!
//! The state machine never parses or validates certificates itself —
//! an application supplies a `lookup` callback (server side, invoked
//! after ClientHello) and a `verify` callback (peer-of-Certificate
//! side, invoked after the Certificate message arrives). Both hand back
//! a one-shot closure bound to opaque state: the signer is invoked once
//! over the CertificateVerify context string and once more with an
//! empty input to release its state; the verifier is invoked once with
//! the context string and the received signature and once more with
//! empty inputs, even if the handshake aborts before a real call
//! happens. [`release_signer`]/[`release_verifier`] centralize that
//! second call so every abort path remembers to make it.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::bytes::ByteView;
use crate::crypto::SignatureScheme;
use crate::error::Error;

/// A certificate chain as received or offered on the wire: an ordered
/// list of DER entries, end-entity certificate first.
pub struct CertificateChain<'a> {
    entries: Vec<ByteView<'a>>,
}

impl<'a> CertificateChain<'a> {
    pub fn new(entries: Vec<ByteView<'a>>) -> Self {
        Self { entries }
    }

    pub fn end_entity(&self) -> Option<&ByteView<'a>> {
        self.entries.first()
    }

    pub fn entries(&self) -> &[ByteView<'a>] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A one-shot signing closure bound to opaque key-handle state.
///
/// `invoke` is called exactly twice over its lifetime: once with the
/// non-empty CertificateVerify context string, returning the raw
/// signature bytes; once more with an empty slice to release whatever
/// key material the callback is holding (return value ignored). Never
/// call it a third time.
pub trait Signer {
    fn invoke(&mut self, data: &[u8]) -> Result<Vec<u8>, Error>;
}

/// A one-shot verification closure bound to opaque state.
///
/// `invoke` is called exactly twice: once with the non-empty context
/// string and the peer's signature, returning whether it's valid; once
/// more with empty inputs to release state. The release call happens
/// even if the handshake aborted before the first real call — that's
/// the only way a `verify` that allocated scratch state learns to free
/// it on every path.
pub trait Verifier {
    fn invoke(&mut self, message: &[u8], signature: &[u8]) -> Result<(), Error>;
}

/// Release a signer's state. Errors from the release call are dropped
/// on the floor: by this point the handshake has already decided its
/// outcome and a cleanup failure can't change it.
pub fn release_signer(signer: &mut dyn Signer) {
    let _ = signer.invoke(&[]);
}

/// Release a verifier's state; see [`release_signer`].
pub fn release_verifier(verifier: &mut dyn Verifier) {
    let _ = verifier.invoke(&[], &[]);
}

/// What `lookup` hands back: the chain to send, which of the client's
/// advertised signature schemes it was signed for, and the signer to
/// produce CertificateVerify with.
pub struct LookupResult<'a> {
    pub chain: CertificateChain<'a>,
    pub scheme: SignatureScheme,
    pub signer: Box<dyn Signer + 'a>,
}

/// Server-side callback: given the client's advertised signature
/// schemes, produce a certificate chain and a bound signer. Called
/// once per handshake, after ClientHello.
pub trait CertificateLookup {
    fn lookup(&self, client_signature_schemes: &[SignatureScheme]) -> Result<LookupResult<'_>, Error>;
}

/// What `verify` hands back: the verifier to check CertificateVerify
/// with.
pub struct VerifyResult<'a> {
    pub verifier: Box<dyn Verifier + 'a>,
}

/// Receiver-side callback: given the chain carried by a Certificate
/// message (and, for a client, the server name it connected to),
/// produce a bound verifier. Called once per handshake, after
/// Certificate.
pub trait CertificateVerifier {
    fn verify(&self, chain: &CertificateChain<'_>, server_name: Option<&str>) -> Result<VerifyResult<'_>, Error>;
}

/// Both certificate callbacks an endpoint needs: `lookup` to serve its
/// own chain, `verify` to validate the peer's.
pub struct CertificateCallbacks<'a> {
    pub lookup: Box<dyn CertificateLookup + 'a>,
    pub verify: Box<dyn CertificateVerifier + 'a>,
}
