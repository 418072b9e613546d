use thiserror::Error;

/// Why a negotiation could not go on.
///
/// Protocol failures are terminal for the negotiation that raised them: build
/// a new one (with other credentials or another mechanism) to retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SaslError {
    #[error("no usable mechanism")]
    NoMechanism,
    #[error("malformed challenge")]
    BadProtocol,
    #[error("server failed mutual authentication")]
    BadServerResponse,
    #[error("authentication failure")]
    BadAuthentication,
    #[error("authorization failure")]
    NotAuthorized,
    #[error("mechanism too weak for this user")]
    MechanismTooWeak,
    #[error("encryption needed to use this mechanism")]
    EncryptionRequired,
    #[error("passphrase expired")]
    MechanismExpired,
    #[error("account disabled")]
    MechanismDisabled,
    #[error("user not found")]
    UnknownUser,
    #[error("remote authentication server unavailable")]
    RemoteUnavailable,
    #[error("security layer failed to process a buffer")]
    SecureLayerError,
    #[error("negotiation used out of contract")]
    ContractViolation,
    #[error("negotiation engine could not be initialized (code {code})")]
    EngineInit { code: i32 },
    #[error("negotiation engine failed (code {code})")]
    Engine { code: i32 },
}

impl SaslError {
    /// Other credentials may succeed where these failed.
    ///
    /// Any other error means this mechanism is unusable here and another one
    /// has to be picked.
    pub fn is_credential_problem(&self) -> bool {
        matches!(
            self,
            Self::BadAuthentication | Self::NotAuthorized | Self::UnknownUser | Self::MechanismExpired
        )
    }
}

/// Failure to read an attribute list as a digest challenge.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("attribute list has {nonce} nonce and {algorithm} algorithm entries, expected one of each")]
    MalformedAttributeList { nonce: usize, algorithm: usize },
}

impl From<ParseError> for SaslError {
    fn from(_: ParseError) -> Self {
        Self::BadProtocol
    }
}
