use crate::bc::model::Bc;
use crate::NomErrorType;
use err_derive::Error;
use std::sync::Arc;

/// This is the primary error type of the library
#[derive(Debug, Error, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum Error {
    /// Underlying IO errors. Always fatal to the session that raised them
    #[error(display = "IO Error: {:?}", _0)]
    Io(#[error(source)] Arc<std::io::Error>),

    /// Raised when a receive deadline passes. Benign inside the streaming
    /// loop, fatal during login
    #[error(display = "Timeout")]
    Timeout,

    /// Raised when the camera rejects the login credentials
    #[error(display = "Credential error")]
    AuthFailed,

    /// Raised when the camera answers a request with a non-OK response code
    #[error(display = "Camera rejected the request")]
    CameraServiceUnavailable,

    /// Raised when a Bc reply was not understood
    #[error(display = "Communication error")]
    UnintelligibleReply {
        /// The Bc packet that was not understood
        reply: Arc<Box<Bc>>,
        /// The message attached to the error
        why: &'static str,
    },

    /// Raised when the camera replies with an unknown encryption
    /// negotiation code
    #[error(display = "Unknown encryption: {:x?}", _0)]
    UnknownEncryption(u16),

    /// Raised when the camera picks an encryption stronger than the
    /// advertised ceiling
    #[error(display = "Camera negotiated {:x?} above the requested ceiling", _0)]
    NegotiationMismatch(u16),

    /// Raised when a stream is requested before a successful login
    #[error(display = "Not logged in")]
    NotLoggedIn,

    /// Raised when the given camera address could not be resolved
    #[error(display = "Failed to translate camera address")]
    AddrResolutionError,

    /// Raised when no resolved address accepted the connection
    #[error(display = "Camera not reachable")]
    ConnectionUnavailable,

    /// Raised when a stream cannot be decoded. The framing is lost, so
    /// this is fatal to the connection
    #[error(display = "Parsing error: {}", _0)]
    NomError(String),

    /// Raised when the receive buffer does not yet hold a complete frame
    #[error(display = "Parsing incomplete: {}", _0)]
    NomIncomplete(usize),

    /// Raised during serialisation
    #[error(display = "Cookie GenError")]
    GenError(#[error(source)] Arc<cookie_factory::GenError>),

    /// Raised when an xml body cannot be written
    #[error(display = "XML serialisation error: {}", _0)]
    XmlSer(String),
}

impl From<std::io::Error> for Error {
    fn from(k: std::io::Error) -> Self {
        Error::Io(Arc::new(k))
    }
}

impl From<cookie_factory::GenError> for Error {
    fn from(k: cookie_factory::GenError) -> Self {
        Error::GenError(Arc::new(k))
    }
}

impl<'a> From<nom::Err<NomErrorType<'a>>> for Error {
    fn from(k: nom::Err<NomErrorType<'a>>) -> Self {
        match k {
            nom::Err::Error(e) => Error::NomError(format!("Nom Error: {:x?}", e)),
            nom::Err::Failure(e) => Error::NomError(format!("Nom Error: {:x?}", e)),
            nom::Err::Incomplete(nom::Needed::Size(amount)) => Error::NomIncomplete(amount.get()),
            nom::Err::Incomplete(nom::Needed::Unknown) => Error::NomIncomplete(1),
        }
    }
}
