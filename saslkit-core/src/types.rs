use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use super::credentials::NeededFields;
use super::error::SaslError;

/// Name of the only mechanism the built-in client speaks.
pub const DIGEST_MD5: &str = "DIGEST-MD5";

/// Which implementation sits behind a `Negotiator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Self-contained DIGEST-MD5 client, no external dependency.
    BuiltinDigest,
    /// Delegates every step to an external negotiation engine.
    ExternalEngine,
}

/// Connection identity, as given by the transport before starting.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    /// Service name registered for the protocol, eg. imap, xmpp, smtp.
    pub service: String,
    /// Fully qualified name of the server we are talking to.
    pub host: String,
    #[serde(default)]
    pub local_addr: Option<SocketAddr>,
    #[serde(default)]
    pub remote_addr: Option<SocketAddr>,
}

impl Identity {
    pub fn new(service: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            host: host.into(),
            local_addr: None,
            remote_addr: None,
        }
    }

    /// `service/host`, the value of DIGEST-MD5 `digest-uri`.
    pub fn digest_uri(&self) -> String {
        format!("{}/{}", self.service, self.host)
    }
}

/// What the connection demands from the mechanism.
///
/// Strengths are expressed as a security strength factor, roughly the number
/// of key bits protecting the layer. 0 means no layer, 1 means integrity only.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct SecurityRequirements {
    /// Refuse mechanisms that send the password in clear.
    pub no_plaintext: bool,
    /// Refuse mechanisms subject to active (non-dictionary) attacks.
    pub no_active: bool,
    /// Refuse mechanisms subject to passive dictionary attacks.
    pub no_dictionary: bool,
    /// Refuse anonymous mechanisms.
    pub no_anonymous: bool,
    /// Require forward secrecy between sessions.
    pub require_forward_secrecy: bool,
    /// Require mechanisms that pass client credentials to the server.
    pub require_pass_credentials: bool,
    /// Require the server to authenticate itself too.
    pub require_mutual_auth: bool,
    pub min_strength: u32,
    pub max_strength: u32,
    /// Identity already established by an outer layer (eg. TLS client certificate).
    pub external_auth_id: Option<String>,
    /// Strength of that outer layer.
    pub external_strength: u32,
}

/// Identities reported by a server-side negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityPair {
    /// Who proved knowledge of the credentials.
    pub authenticated: String,
    /// Who they want to act as. Equal to `authenticated` when no proxying is requested.
    pub authorization: String,
}

/// Outcome of one negotiation step.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    /// A token is ready in `result()` (possibly empty), feed the peer's answer to `next()`.
    Continue,
    /// Negotiation is over and succeeded.
    Success,
    /// Supply these fields then call `try_again()`; the inbound token was kept.
    NeedCredentials(NeededFields),
    /// Server side: approve or deny this identity pair with `authorize()`.
    AuthCheck(IdentityPair),
    /// Negotiation is over and failed.
    Error(SaslError),
}

impl Status {
    /// `Success` and `Error` never move again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error(_))
    }
}

/// One `name=value` pair of a DIGEST-MD5 token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: Vec<u8>,
}

/// Ordered attributes of a challenge or response. Names may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeList(pub Vec<Attribute>);

impl AttributeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append, keeping insertion order.
    pub fn set(&mut self, name: &str, value: impl Into<Vec<u8>>) {
        self.0.push(Attribute {
            name: name.to_string(),
            value: value.into(),
        })
    }

    /// First value for this name.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_slice())
    }

    /// Every value for this name, eg. the realms offered by a server.
    pub fn get_all(&self, name: &str) -> Vec<&[u8]> {
        self.0
            .iter()
            .filter(|a| a.name == name)
            .map(|a| a.value.as_slice())
            .collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.0.iter().filter(|a| a.name == name).count()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
