//! Error taxonomy: the stable negative codes surfaced to peers in error envelopes.
//!
//! The code is the contract with clients; the message is the code's name.
//! Groups:
//!   -101..-119  general / protocol / storage
//!   -120..-129  authorization
//!   -150..-159  command unmarshal/marshal

/// Every error a peer can observe in an `error` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ErrCode {
    #[error("UnknownError")]
    Unknown,
    #[error("UnimplementedError")]
    Unimplemented,
    #[error("NotFoundError")]
    NotFound,
    #[error("InvalidArgument")]
    InvalidArgument,
    #[error("PointerReleasedError")]
    PointerReleased,
    #[error("SizeOverflowError")]
    SizeOverflow,
    #[error("StdSystemError")]
    StdSystem,
    #[error("WrongState")]
    WrongState,
    #[error("AlreadyExists")]
    AlreadyExists,
    #[error("DatabaseException")]
    DatabaseException,
    #[error("OutOfMemoryError")]
    OutOfMemory,

    #[error("DidNotReady")]
    DidNotReady,
    #[error("InvalidAccessToken")]
    InvalidAccessToken,
    #[error("NotAuthorizedError")]
    NotAuthorized,

    #[error("CmdUnknownReqFailed")]
    UnknownRequest,
    #[error("CmdUnmarshalReqFailed")]
    UnmarshalRequestFailed,
    #[error("CmdMarshalRespFailed")]
    MarshalResponseFailed,
    #[error("CmdUnsupportedVersion")]
    UnsupportedVersion,
}

const ALL: [ErrCode; 18] = [
    ErrCode::Unknown,
    ErrCode::Unimplemented,
    ErrCode::NotFound,
    ErrCode::InvalidArgument,
    ErrCode::PointerReleased,
    ErrCode::SizeOverflow,
    ErrCode::StdSystem,
    ErrCode::WrongState,
    ErrCode::AlreadyExists,
    ErrCode::DatabaseException,
    ErrCode::OutOfMemory,
    ErrCode::DidNotReady,
    ErrCode::InvalidAccessToken,
    ErrCode::NotAuthorized,
    ErrCode::UnknownRequest,
    ErrCode::UnmarshalRequestFailed,
    ErrCode::MarshalResponseFailed,
    ErrCode::UnsupportedVersion,
];

impl ErrCode {
    /// The wire value. Always negative.
    pub fn code(self) -> i64 {
        match self {
            Self::Unknown => -101,
            Self::Unimplemented => -102,
            Self::NotFound => -103,
            Self::InvalidArgument => -104,
            Self::PointerReleased => -105,
            Self::SizeOverflow => -109,
            Self::StdSystem => -110,
            Self::WrongState => -111,
            Self::AlreadyExists => -112,
            Self::DatabaseException => -113,
            Self::OutOfMemory => -114,
            Self::DidNotReady => -120,
            Self::InvalidAccessToken => -121,
            Self::NotAuthorized => -122,
            Self::UnknownRequest => -150,
            Self::UnmarshalRequestFailed => -151,
            Self::MarshalResponseFailed => -152,
            Self::UnsupportedVersion => -153,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        ALL.iter().copied().find(|e| e.code() == code)
    }

    /// Human-readable description rendered into error envelopes.
    pub fn describe(self) -> String {
        self.to_string()
    }

    /// Authorization failures require the peer to re-authenticate.
    pub fn is_auth(self) -> bool {
        matches!(
            self,
            Self::DidNotReady | Self::InvalidAccessToken | Self::NotAuthorized
        )
    }
}

/// Render any code, including ones this build does not know about.
pub fn describe_code(code: i64) -> String {
    match ErrCode::from_code(code) {
        Some(e) => e.describe(),
        None => format!("UnknownError({code})"),
    }
}
