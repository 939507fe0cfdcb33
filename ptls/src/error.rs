//! Error taxonomy.
//!
//! The wire-level error space is a 16-bit integer partitioned by its high
//! byte into three classes (self-alert, peer-alert, internal); see
//! [`Error::code`] and [`Error::class`]. [`Error`] itself is the ergonomic,
//! matchable view a caller actually wants, with the wire encoding
//! recoverable losslessly via `code()`.

use core::fmt;

/// High-byte discriminant of the wire error space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// A fatal condition this endpoint wants to alert the peer about.
    SelfAlert,
    /// An alert received from the peer.
    PeerAlert,
    /// A local, non-protocol failure (allocation, RNG, programmer error).
    Internal,
}

/// TLS alert description (RFC 8446 §6, plus legacy alerts an endpoint
/// must still be able to parse even though it never originates them).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AlertDescription {
    CloseNotify = 0,
    UnexpectedMessage = 10,
    BadRecordMac = 20,
    RecordOverflow = 22,
    HandshakeFailure = 40,
    BadCertificate = 42,
    UnsupportedCertificate = 43,
    CertificateRevoked = 44,
    CertificateExpired = 45,
    CertificateUnknown = 46,
    IllegalParameter = 47,
    UnknownCa = 48,
    AccessDenied = 49,
    DecodeError = 50,
    DecryptError = 51,
    ProtocolVersion = 70,
    InsufficientSecurity = 71,
    InternalError = 80,
    InappropriateFallback = 86,
    UserCanceled = 90,
    MissingExtension = 109,
    UnsupportedExtension = 110,
    UnrecognizedName = 112,
    BadCertificateStatusResponse = 113,
    UnknownPskIdentity = 115,
    CertificateRequired = 116,
    NoApplicationProtocol = 120,
}

impl AlertDescription {
    /// Parse from the wire byte. Unknown codes are not an error by
    /// themselves (RFC 8446 requires tolerance); callers that need to
    /// reject unknown alerts do so explicitly.
    pub fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0 => Self::CloseNotify,
            10 => Self::UnexpectedMessage,
            20 => Self::BadRecordMac,
            22 => Self::RecordOverflow,
            40 => Self::HandshakeFailure,
            42 => Self::BadCertificate,
            43 => Self::UnsupportedCertificate,
            44 => Self::CertificateRevoked,
            45 => Self::CertificateExpired,
            46 => Self::CertificateUnknown,
            47 => Self::IllegalParameter,
            48 => Self::UnknownCa,
            49 => Self::AccessDenied,
            50 => Self::DecodeError,
            51 => Self::DecryptError,
            70 => Self::ProtocolVersion,
            71 => Self::InsufficientSecurity,
            80 => Self::InternalError,
            86 => Self::InappropriateFallback,
            90 => Self::UserCanceled,
            109 => Self::MissingExtension,
            110 => Self::UnsupportedExtension,
            112 => Self::UnrecognizedName,
            113 => Self::BadCertificateStatusResponse,
            115 => Self::UnknownPskIdentity,
            116 => Self::CertificateRequired,
            120 => Self::NoApplicationProtocol,
            _ => return None,
        })
    }
}

/// Internal (non-protocol) failure kinds, forming the 0x0200-class
/// low bytes of the wire error space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InternalErrorKind {
    OutOfMemory = 0x01,
    HandshakeInProgress = 0x02,
    LibraryBug = 0x03,
    IncompatibleKey = 0x04,
}

/// The error type returned by every fallible `ptls` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A protocol violation or negotiation failure this endpoint
    /// detected; the next `send` will emit this as an alert record and
    /// the connection becomes unusable except for `free`.
    SelfAlert(AlertDescription),
    /// An alert record received from the peer. `close_notify` is an
    /// ordinary end-of-stream; everything else is fatal.
    PeerAlert(AlertDescription),
    /// `ptls_handshake` needs more input before it can make progress.
    /// Not a terminal error.
    InProgress,
    /// A local resource or invariant failure.
    Internal(InternalErrorKind),
}

impl Error {
    /// Shorthand for `Internal(InternalErrorKind::OutOfMemory)`.
    pub const OUT_OF_MEMORY: Error = Error::Internal(InternalErrorKind::OutOfMemory);
    /// Shorthand for `Internal(InternalErrorKind::LibraryBug)`.
    pub const LIBRARY_BUG: Error = Error::Internal(InternalErrorKind::LibraryBug);
    /// Shorthand for `Internal(InternalErrorKind::IncompatibleKey)`.
    pub const INCOMPATIBLE_KEY: Error = Error::Internal(InternalErrorKind::IncompatibleKey);

    /// The error class this value belongs to, or `None` for `InProgress`
    /// (which is not an error).
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            Error::SelfAlert(_) => Some(ErrorClass::SelfAlert),
            Error::PeerAlert(_) => Some(ErrorClass::PeerAlert),
            Error::Internal(_) => Some(ErrorClass::Internal),
            Error::InProgress => None,
        }
    }

    /// The 16-bit wire-classed value: high byte selects the class,
    /// low byte is the alert/internal-kind discriminant.
    pub fn code(&self) -> u16 {
        match self {
            Error::SelfAlert(a) => 0x0000 | (*a as u16),
            Error::PeerAlert(a) => 0x0100 | (*a as u16),
            Error::InProgress => 0x0202,
            Error::Internal(k) => 0x0200 | (*k as u16),
        }
    }

    /// True if this is `close_notify` received from the peer — an
    /// ordinary end-of-stream, not fatal.
    pub fn is_graceful_close(&self) -> bool {
        matches!(self, Error::PeerAlert(AlertDescription::CloseNotify))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::SelfAlert(a) => write!(f, "local alert {:?} (code 0x{:04x})", a, self.code()),
            Error::PeerAlert(a) => write!(f, "peer alert {:?} (code 0x{:04x})", a, self.code()),
            Error::InProgress => write!(f, "handshake in progress"),
            Error::Internal(k) => write!(f, "internal error {:?} (code 0x{:04x})", k, self.code()),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_class_from_code() {
        let e = Error::SelfAlert(AlertDescription::HandshakeFailure);
        assert_eq!(e.code() & 0xff00, 0x0000);
        assert_eq!(e.code() & 0xff, 40);

        let e = Error::PeerAlert(AlertDescription::BadRecordMac);
        assert_eq!(e.code() & 0xff00, 0x0100);
        assert_eq!(e.code() & 0xff, 20);

        let e = Error::OUT_OF_MEMORY;
        assert_eq!(e.code() & 0xff00, 0x0200);
    }

    #[test]
    fn close_notify_is_graceful() {
        assert!(Error::PeerAlert(AlertDescription::CloseNotify).is_graceful_close());
        assert!(!Error::PeerAlert(AlertDescription::HandshakeFailure).is_graceful_close());
    }
}
