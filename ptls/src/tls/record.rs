//! TLS record layer: framing, fragmentation, and AEAD seal/open.
//!
//! Grounded in spec.md §4.3. The record layer never looks inside a
//! handshake message; it only knows content types, lengths, and
//! whichever [`AeadContext`] is currently installed for each direction.

use alloc::boxed::Box;
use alloc::vec::Vec;

use zeroize::Zeroize;

use crate::buffer::GrowableBuffer;
use crate::crypto::Aead;
use crate::error::{AlertDescription, Error};

/// Maximum plaintext record payload (spec.md §4.3).
pub const MAX_PLAINTEXT_RECORD: usize = 1 << 14;
/// Maximum ciphertext record payload: plaintext limit plus the inner
/// content-type byte, padding, and AEAD expansion.
pub const MAX_CIPHERTEXT_RECORD: usize = (1 << 14) + 256;
/// Wire size of a record header: 1-byte type, 2-byte legacy version,
/// 2-byte big-endian length.
pub const RECORD_HEADER_LEN: usize = 5;
/// Outer `legacy_record_version` field (spec.md §4.3, §6).
pub const LEGACY_RECORD_VERSION: [u8; 2] = [0x03, 0x03];

/// Outer record content type (RFC 8446 §5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ContentType {
    ChangeCipherSpec = 20,
    Alert = 21,
    Handshake = 22,
    ApplicationData = 23,
}

impl ContentType {
    pub fn from_byte(b: u8) -> Result<Self, Error> {
        Ok(match b {
            20 => ContentType::ChangeCipherSpec,
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            _ => return Err(Error::SelfAlert(AlertDescription::DecodeError)),
        })
    }
}

/// One direction's AEAD state for one key epoch (spec.md §3/§4.3): the
/// traffic secret's derived static IV, the monotone sequence counter,
/// and the negotiated transform. Replaced wholesale on every epoch
/// change; dropping one zeroes its key material.
pub struct AeadContext {
    aead: Box<dyn Aead>,
    key: Vec<u8>,
    static_iv: Vec<u8>,
    seq: u64,
}

impl AeadContext {
    pub fn new(aead: Box<dyn Aead>, key: Vec<u8>, static_iv: Vec<u8>) -> Self {
        Self { aead, key, static_iv, seq: 0 }
    }

    /// Per-record nonce: static IV XOR (sequence number, big-endian,
    /// right-aligned) — spec.md §3.
    fn nonce(&self) -> Vec<u8> {
        let mut nonce = self.static_iv.clone();
        let seq_bytes = self.seq.to_be_bytes();
        let offset = nonce.len() - seq_bytes.len();
        for (n, s) in nonce[offset..].iter_mut().zip(seq_bytes.iter()) {
            *n ^= s;
        }
        nonce
    }

    fn advance_seq(&mut self) -> Result<(), Error> {
        self.seq = self.seq.checked_add(1).ok_or(Error::LIBRARY_BUG)?;
        Ok(())
    }

    pub fn seal(&mut self, aad: &[u8], plaintext: &[u8], out: &mut Vec<u8>) -> Result<(), Error> {
        let nonce = self.nonce();
        self.aead.seal(&self.key, &nonce, aad, plaintext, out)?;
        self.advance_seq()
    }

    pub fn open(&mut self, aad: &[u8], ciphertext: &[u8], out: &mut Vec<u8>) -> Result<(), Error> {
        let nonce = self.nonce();
        self.aead.open(&self.key, &nonce, aad, ciphertext, out)?;
        self.advance_seq()
    }
}

impl Drop for AeadContext {
    fn drop(&mut self) {
        self.key.zeroize();
        self.static_iv.zeroize();
    }
}

/// Fragments outgoing payloads, reassembles incoming ones, and applies
/// whichever [`AeadContext`] is installed for each direction (spec.md
/// §4.3). Agnostic to message semantics: the handshake state machine
/// decides *when* to call [`RecordLayer::install_read`]/
/// [`RecordLayer::install_write`]; the record layer just protects
/// whatever crosses it with whatever is installed at the time.
pub struct RecordLayer {
    read: Option<AeadContext>,
    write: Option<AeadContext>,
    partial: Vec<u8>,
}

impl RecordLayer {
    pub fn new() -> Self {
        Self { read: None, write: None, partial: Vec::new() }
    }

    pub fn install_read(&mut self, ctx: AeadContext) {
        self.read = Some(ctx);
    }

    pub fn install_write(&mut self, ctx: AeadContext) {
        self.write = Some(ctx);
    }

    pub fn clear_read(&mut self) {
        self.read = None;
    }

    pub fn clear_write(&mut self) {
        self.write = None;
    }

    pub fn has_write_cipher(&self) -> bool {
        self.write.is_some()
    }

    /// Fragment `payload` into ≤2^14-byte records of `content_type`,
    /// sealing each under the current write cipher if one is installed,
    /// and append the wire bytes to `out`.
    pub fn seal_and_append(
        &mut self,
        content_type: ContentType,
        payload: &[u8],
        out: &mut GrowableBuffer,
    ) -> Result<(), Error> {
        if payload.is_empty() {
            return self.seal_one_fragment(content_type, &[], out);
        }
        for chunk in payload.chunks(MAX_PLAINTEXT_RECORD) {
            self.seal_one_fragment(content_type, chunk, out)?;
        }
        Ok(())
    }

    fn seal_one_fragment(
        &mut self,
        content_type: ContentType,
        chunk: &[u8],
        out: &mut GrowableBuffer,
    ) -> Result<(), Error> {
        match &mut self.write {
            None => {
                let mut record = Vec::with_capacity(RECORD_HEADER_LEN + chunk.len());
                record.push(content_type as u8);
                record.extend_from_slice(&LEGACY_RECORD_VERSION);
                record.extend_from_slice(&(chunk.len() as u16).to_be_bytes());
                record.extend_from_slice(chunk);
                out.append(&record)
            }
            Some(write) => {
                let mut inner = Vec::with_capacity(chunk.len() + 1);
                inner.extend_from_slice(chunk);
                inner.push(content_type as u8);

                let cipher_len = inner.len() + write_tag_len(write);
                let mut header = [0u8; RECORD_HEADER_LEN];
                header[0] = ContentType::ApplicationData as u8;
                header[1..3].copy_from_slice(&LEGACY_RECORD_VERSION);
                header[3..5].copy_from_slice(&(cipher_len as u16).to_be_bytes());

                let mut sealed = Vec::with_capacity(cipher_len);
                write.seal(&header, &inner, &mut sealed)?;

                out.append(&header)?;
                out.append(&sealed)
            }
        }
    }

    /// Append freshly-received transport bytes to the internal reassembly
    /// buffer. Does not itself attempt to parse a record.
    pub fn feed(&mut self, data: &[u8]) {
        self.partial.extend_from_slice(data);
    }

    /// Pop and decrypt (if a read cipher is installed) the next complete
    /// record, or `None` if the buffered bytes don't yet contain one.
    /// `change_cipher_spec` records are consumed and silently dropped
    /// (spec.md §4.3 tie-break) — call again to get the next real record.
    pub fn next_record(&mut self) -> Result<Option<(ContentType, Vec<u8>)>, Error> {
        loop {
            if self.partial.len() < RECORD_HEADER_LEN {
                return Ok(None);
            }
            let outer_type = ContentType::from_byte(self.partial[0])?;
            let declared_len = u16::from_be_bytes([self.partial[3], self.partial[4]]) as usize;
            if declared_len > MAX_CIPHERTEXT_RECORD {
                return Err(Error::SelfAlert(AlertDescription::DecodeError));
            }
            if self.partial.len() < RECORD_HEADER_LEN + declared_len {
                return Ok(None);
            }

            let header: [u8; RECORD_HEADER_LEN] = self.partial[..RECORD_HEADER_LEN].try_into().unwrap();
            let payload_start = RECORD_HEADER_LEN;
            let payload_end = RECORD_HEADER_LEN + declared_len;
            let payload = self.partial[payload_start..payload_end].to_vec();
            let consumed = payload_end;

            let result = match outer_type {
                ContentType::ChangeCipherSpec => None,
                _ => Some(self.open_one(outer_type, &header, &payload)?),
            };

            self.partial.drain(..consumed);

            if let Some(record) = result {
                return Ok(Some(record));
            }
            // change_cipher_spec: loop and try the next record.
        }
    }

    fn open_one(
        &mut self,
        outer_type: ContentType,
        header: &[u8; RECORD_HEADER_LEN],
        payload: &[u8],
    ) -> Result<(ContentType, Vec<u8>), Error> {
        match &mut self.read {
            None => Ok((outer_type, payload.to_vec())),
            Some(read) => {
                if outer_type != ContentType::ApplicationData {
                    // Only application_data carries protected records
                    // once a read cipher is installed; anything else is
                    // a desynced peer.
                    return Err(Error::SelfAlert(AlertDescription::UnexpectedMessage));
                }
                let mut inner = Vec::new();
                read.open(header, payload, &mut inner)?;
                strip_inner_plaintext(inner)
            }
        }
    }
}

impl Default for RecordLayer {
    fn default() -> Self {
        Self::new()
    }
}

fn write_tag_len(write: &AeadContext) -> usize {
    write.aead.algorithm().tag_size()
}

/// Split `TLSInnerPlaintext = content || real_type || zeros*` (RFC 8446
/// §5.2) into the real content type and the content, trimming trailing
/// zero padding.
fn strip_inner_plaintext(mut inner: Vec<u8>) -> Result<(ContentType, Vec<u8>), Error> {
    while let Some(&0) = inner.last() {
        inner.pop();
    }
    let Some(type_byte) = inner.pop() else {
        return Err(Error::SelfAlert(AlertDescription::UnexpectedMessage));
    };
    let content_type = ContentType::from_byte(type_byte)?;
    Ok((content_type, inner))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct XorAead;

    impl Aead for XorAead {
        fn algorithm(&self) -> crate::crypto::AeadAlgorithm {
            crate::crypto::AeadAlgorithm::Aes128Gcm
        }
        fn seal(&self, key: &[u8], nonce: &[u8], aad: &[u8], plaintext: &[u8], out: &mut Vec<u8>) -> Result<(), Error> {
            out.extend_from_slice(plaintext);
            out.extend_from_slice(&[0u8; 16]);
            let _ = (key, nonce, aad);
            Ok(())
        }
        fn open(&self, key: &[u8], nonce: &[u8], aad: &[u8], ciphertext: &[u8], out: &mut Vec<u8>) -> Result<(), Error> {
            if ciphertext.len() < 16 {
                return Err(Error::SelfAlert(AlertDescription::BadRecordMac));
            }
            if ciphertext[ciphertext.len() - 16..] != [0u8; 16] {
                return Err(Error::SelfAlert(AlertDescription::BadRecordMac));
            }
            out.extend_from_slice(&ciphertext[..ciphertext.len() - 16]);
            let _ = (key, nonce, aad);
            Ok(())
        }
    }

    fn test_ctx() -> AeadContext {
        AeadContext::new(Box::new(XorAead), alloc::vec![0u8; 16], alloc::vec![0u8; 12])
    }

    #[test]
    fn plaintext_roundtrip_before_any_cipher() {
        let mut layer = RecordLayer::new();
        let mut scratch = [0u8; 256];
        let mut out = GrowableBuffer::new(&mut scratch);
        layer.seal_and_append(ContentType::Handshake, b"client hello", &mut out).unwrap();

        let mut peer = RecordLayer::new();
        peer.feed(out.as_slice());
        let (ct, payload) = peer.next_record().unwrap().unwrap();
        assert_eq!(ct, ContentType::Handshake);
        assert_eq!(payload, b"client hello");
    }

    #[test]
    fn encrypted_roundtrip_recovers_inner_type() {
        let mut layer = RecordLayer::new();
        layer.install_write(test_ctx());
        let mut scratch = [0u8; 256];
        let mut out = GrowableBuffer::new(&mut scratch);
        layer.seal_and_append(ContentType::Handshake, b"encrypted extensions", &mut out).unwrap();

        let mut peer = RecordLayer::new();
        peer.install_read(test_ctx());
        peer.feed(out.as_slice());
        let (ct, payload) = peer.next_record().unwrap().unwrap();
        assert_eq!(ct, ContentType::Handshake);
        assert_eq!(payload, b"encrypted extensions");
    }

    #[test]
    fn change_cipher_spec_is_skipped() {
        let mut layer = RecordLayer::new();
        let ccs = [ContentType::ChangeCipherSpec as u8, 3, 3, 0, 1, 1];
        layer.feed(&ccs);
        let mut scratch = [0u8; 64];
        let mut out = GrowableBuffer::new(&mut scratch);
        layer.seal_and_append(ContentType::Handshake, b"hi", &mut out).unwrap();
        layer.feed(out.as_slice());
        let (ct, payload) = layer.next_record().unwrap().unwrap();
        assert_eq!(ct, ContentType::Handshake);
        assert_eq!(payload, b"hi");
    }

    #[test]
    fn oversized_record_is_decode_error() {
        let mut layer = RecordLayer::new();
        let mut header = [ContentType::Handshake as u8, 3, 3, 0, 0];
        let big: u16 = (MAX_CIPHERTEXT_RECORD + 1) as u16;
        header[3..5].copy_from_slice(&big.to_be_bytes());
        layer.feed(&header);
        let err = layer.next_record().unwrap_err();
        assert_eq!(err, Error::SelfAlert(AlertDescription::DecodeError));
    }

    #[test]
    fn partial_header_returns_none() {
        let mut layer = RecordLayer::new();
        layer.feed(&[22, 3, 3]);
        assert!(layer.next_record().unwrap().is_none());
    }

    #[test]
    fn sequence_number_advances_monotonically() {
        let mut ctx = test_ctx();
        let mut out = Vec::new();
        ctx.seal(b"aad", b"one", &mut out).unwrap();
        assert_eq!(ctx.seq, 1);
        out.clear();
        ctx.seal(b"aad", b"two", &mut out).unwrap();
        assert_eq!(ctx.seq, 2);
    }
}
