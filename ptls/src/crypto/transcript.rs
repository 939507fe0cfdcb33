//! Handshake transcript hash.
//!
//! RFC 8446 §4.4.1 defines the transcript hash as the running digest of
//! every handshake message seen so far, in wire order, with the message
//! framing but not the record framing. The key schedule needs a digest
//! of the transcript at several different points while more messages are
//! still arriving, so reads must not consume the running state — only an
//! explicit [`Finalize::Reset`] does that (used once, for `resumption_master_secret`
//! style derivations that close out the transcript; ordinary key-schedule
//! reads use `Finalize::Snapshot`).

use alloc::boxed::Box;
use alloc::vec::Vec;

use super::{DigestCtx, Finalize, HashAlgorithm};

/// Wraps a [`DigestCtx`] with the snapshot/reset discipline spec.md §3
/// requires of the transcript hash.
pub struct TranscriptHash {
    ctx: Box<dyn DigestCtx>,
}

impl TranscriptHash {
    pub fn new(ctx: Box<dyn DigestCtx>) -> Self {
        Self { ctx }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.ctx.algorithm()
    }

    /// Feed one handshake message (header included, record layer
    /// framing excluded) into the transcript.
    pub fn update(&mut self, message: &[u8]) {
        self.ctx.update(message);
    }

    /// Read the current digest, per `mode`.
    pub fn finalize(&mut self, mode: Finalize) -> Vec<u8> {
        let digest = self.ctx.snapshot();
        if mode == Finalize::Reset {
            self.ctx.reset();
        }
        digest
    }
}
