use std::net::SocketAddr;

use saslkit_core::{CredentialSet, Identity, IdentityPair, NeededFields, SaslError, SecurityRequirements};

/// Result codes of the engine, as the C library spells them.
pub mod code {
    pub const CONTINUE: i32 = 1;
    pub const OK: i32 = 0;
    pub const FAIL: i32 = -1;
    pub const NOMEM: i32 = -2;
    pub const BUFOVER: i32 = -3;
    pub const NOMECH: i32 = -4;
    pub const BADPROT: i32 = -5;
    pub const NOTDONE: i32 = -6;
    pub const BADPARAM: i32 = -7;
    pub const TRYAGAIN: i32 = -8;
    pub const BADMAC: i32 = -9;
    pub const NOTINIT: i32 = -12;
    pub const INTERACT: i32 = 2;
    pub const BADSERV: i32 = -10;
    pub const WRONGMECH: i32 = -11;
    pub const BADAUTH: i32 = -13;
    pub const NOAUTHZ: i32 = -14;
    pub const TOOWEAK: i32 = -15;
    pub const ENCRYPT: i32 = -16;
    pub const TRANS: i32 = -17;
    pub const EXPIRED: i32 = -18;
    pub const DISABLED: i32 = -19;
    pub const NOUSER: i32 = -20;
    pub const BADVERS: i32 = -23;
    pub const UNAVAIL: i32 = -24;
    pub const NOVERIFY: i32 = -26;
}

/// Security property flags understood by the engine.
pub mod secflags {
    pub const NOPLAINTEXT: u32 = 0x0001;
    pub const NOACTIVE: u32 = 0x0002;
    pub const NODICTIONARY: u32 = 0x0004;
    pub const FORWARD_SECRECY: u32 = 0x0008;
    pub const NOANONYMOUS: u32 = 0x0010;
    pub const PASS_CREDENTIALS: u32 = 0x0020;
    pub const MUTUAL_AUTH: u32 = 0x0040;
}

/// Largest buffer we are willing to receive from a security layer.
pub const BUFFER_SIZE: usize = 8192;

/// `OK` ends the negotiation, `CONTINUE` asks for one more round.
pub fn is_progress(c: i32) -> bool {
    c == code::OK || c == code::CONTINUE
}

pub fn error_from_code(c: i32) -> SaslError {
    match c {
        // common
        code::NOMECH => SaslError::NoMechanism,
        code::BADPROT => SaslError::BadProtocol,

        // client
        code::BADSERV => SaslError::BadServerResponse,

        // server
        code::BADAUTH => SaslError::BadAuthentication,
        code::NOAUTHZ => SaslError::NotAuthorized,
        code::TOOWEAK => SaslError::MechanismTooWeak,
        code::ENCRYPT => SaslError::EncryptionRequired,
        code::EXPIRED => SaslError::MechanismExpired,
        code::DISABLED => SaslError::MechanismDisabled,
        code::NOUSER => SaslError::UnknownUser,
        code::UNAVAIL => SaslError::RemoteUnavailable,

        other => SaslError::Engine { code: other },
    }
}

/// Addresses are handed to the engine as `ip;port`.
pub fn addr_string(addr: &SocketAddr) -> String {
    format!("{};{}", addr.ip(), addr.port())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnParams {
    pub service: String,
    pub host: String,
    pub local_addr: Option<String>,
    pub remote_addr: Option<String>,
}

impl From<&Identity> for ConnParams {
    fn from(id: &Identity) -> Self {
        Self {
            service: id.service.clone(),
            host: id.host.clone(),
            local_addr: id.local_addr.as_ref().map(addr_string),
            remote_addr: id.remote_addr.as_ref().map(addr_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSecurityProps {
    pub min_strength: u32,
    pub max_strength: u32,
    pub max_buffer: usize,
    pub flags: u32,
}

impl From<&SecurityRequirements> for EngineSecurityProps {
    fn from(req: &SecurityRequirements) -> Self {
        let mut flags = 0;
        for (set, flag) in [
            (req.no_plaintext, secflags::NOPLAINTEXT),
            (req.no_active, secflags::NOACTIVE),
            (req.no_dictionary, secflags::NODICTIONARY),
            (req.no_anonymous, secflags::NOANONYMOUS),
            (req.require_forward_secrecy, secflags::FORWARD_SECRECY),
            (req.require_pass_credentials, secflags::PASS_CREDENTIALS),
            (req.require_mutual_auth, secflags::MUTUAL_AUTH),
        ] {
            if set {
                flags |= flag;
            }
        }

        Self {
            min_strength: req.min_strength,
            max_strength: req.max_strength,
            max_buffer: BUFFER_SIZE,
            flags,
        }
    }
}

/// What one engine start or step call reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStep {
    pub code: i32,
    /// Token produced by the call. `None` differs from empty for initial responses.
    pub output: Option<Vec<u8>>,
    /// Client start only: the mechanism the engine picked.
    pub mechanism: Option<String>,
    /// With `code::INTERACT`: the credential fields the engine asks for.
    pub needs: NeededFields,
    /// Server only: the engine consulted the proxy policy for this pair.
    pub proxy_check: Option<IdentityPair>,
}

impl EngineStep {
    pub fn new(code: i32) -> Self {
        Self {
            code,
            output: None,
            mechanism: None,
            needs: NeededFields::default(),
            proxy_check: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<Vec<u8>>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_mechanism(mut self, mechanism: impl Into<String>) -> Self {
        self.mechanism = Some(mechanism.into());
        self
    }

    pub fn interact(needs: NeededFields) -> Self {
        Self {
            needs,
            ..Self::new(code::INTERACT)
        }
    }

    pub fn with_proxy_check(mut self, pair: IdentityPair) -> Self {
        self.proxy_check = Some(pair);
        self
    }
}

/// An external SASL library, process wide.
///
/// Initialization and teardown are driven by `EngineRegistry`, each at most
/// once; implementors do not need to guard against repeated calls.
pub trait Engine {
    type Conn: EngineConn;

    fn client_init(&self) -> i32;
    fn server_init(&self, app_name: &str) -> i32;
    fn client_new(&self, params: &ConnParams) -> Result<Self::Conn, i32>;
    fn server_new(&self, params: &ConnParams, realm: &str) -> Result<Self::Conn, i32>;
    /// Release everything the library holds. No connection is alive at this point.
    fn done(&self);
}

/// One negotiation inside the engine. Dropping it disposes of it.
///
/// Credentials are read straight from the `CredentialSet` on every client
/// call; when one the engine wants is unknown it answers `code::INTERACT`
/// listing the fields, and the same call is issued again once they are known.
pub trait EngineConn {
    fn set_security_props(&mut self, props: &EngineSecurityProps) -> i32;
    fn set_external(&mut self, strength: u32, auth_id: &str) -> i32;
    /// Space separated.
    fn list_mechanisms(&mut self) -> Result<String, i32>;

    fn client_start(&mut self, mechanisms: &str, creds: &CredentialSet, want_initial: bool) -> EngineStep;
    fn client_step(&mut self, input: &[u8], creds: &CredentialSet) -> EngineStep;
    fn server_start(&mut self, mechanism: &str, initial: Option<&[u8]>) -> EngineStep;
    fn server_step(&mut self, input: &[u8]) -> EngineStep;

    /// Strength of the layer installed by a successful negotiation.
    fn strength(&self) -> Result<u32, i32>;
    /// Largest chunk `encode` accepts.
    fn max_output(&self) -> Result<usize, i32>;
    fn encode(&mut self, chunk: &[u8]) -> Result<Vec<u8>, i32>;
    fn decode(&mut self, chunk: &[u8]) -> Result<Vec<u8>, i32>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        assert_eq!(error_from_code(code::NOMECH), SaslError::NoMechanism);
        assert_eq!(error_from_code(code::BADPROT), SaslError::BadProtocol);
        assert_eq!(error_from_code(code::BADSERV), SaslError::BadServerResponse);
        assert_eq!(error_from_code(code::NOAUTHZ), SaslError::NotAuthorized);
        assert_eq!(error_from_code(code::UNAVAIL), SaslError::RemoteUnavailable);
        assert_eq!(
            error_from_code(code::BADMAC),
            SaslError::Engine { code: code::BADMAC }
        );
        assert!(is_progress(code::CONTINUE));
        assert!(!is_progress(code::INTERACT));
    }

    #[test]
    fn test_security_props() {
        let props = EngineSecurityProps::from(&SecurityRequirements {
            no_plaintext: true,
            require_mutual_auth: true,
            min_strength: 1,
            max_strength: 256,
            ..Default::default()
        });
        assert_eq!(props.flags, secflags::NOPLAINTEXT | secflags::MUTUAL_AUTH);
        assert_eq!(props.max_buffer, BUFFER_SIZE);
        assert_eq!((props.min_strength, props.max_strength), (1, 256));
    }

    #[test]
    fn test_conn_params() {
        let mut id = Identity::new("xmpp", "jabber.example");
        id.remote_addr = Some("192.0.2.7:5222".parse().unwrap());
        let params = ConnParams::from(&id);
        assert_eq!(params.local_addr, None);
        assert_eq!(params.remote_addr.as_deref(), Some("192.0.2.7;5222"));
    }
}
