use std::convert::Infallible;

use rand::{rngs::StdRng, SeedableRng};

use super::credentials::*;
use super::decode::{attribute_list, challenge};
use super::digest::{self, DigestParams, NONCE_COUNT, QOP_AUTH};
use super::encode::Encode;
use super::error::SaslError;
use super::layer::SecurityLayer;
use super::negotiator::Negotiator;
use super::types::*;

#[derive(Debug)]
pub enum State {
    /// `client_start` was not called, or the negotiation was reset.
    Idle,
    /// Mechanism accepted, nothing sent yet.
    Started,
    /// Waiting for the server challenge, or for credentials to answer it.
    AwaitingChallenge,
    /// Our response is out, the next server message ends the exchange.
    Responded,
    Success,
    Error(SaslError),
}

/// Self-contained DIGEST-MD5 client.
///
/// ```text
/// C: (start, no initial response)
/// S: realm="elwood.innosoft.com",nonce="OA6MG9tEQGm2hh",qop="auth",algorithm=md5-sess,charset=utf-8
/// C: username="chris",realm="elwood.innosoft.com",nonce="OA6MG9tEQGm2hh",cnonce="..",nc="00000001",
///    serv-type="imap",host="elwood.innosoft.com",digest-uri="imap/elwood.innosoft.com",qop="auth",
///    response="..",charset="utf-8"
/// S: rspauth=..
/// C: (empty)
/// ```
///
/// The `rspauth` proof sent by the server is compared when present but never
/// enforced: the exchange succeeds after one round whatever the server says.
/// No security layer is ever negotiated.
pub struct DigestClient {
    identity: Identity,
    capable: bool,
    state: State,
    creds: CredentialSet,
    in_buf: Vec<u8>,
    out_buf: Vec<u8>,
    out_mech: Option<String>,
    expected_rspauth: Option<String>,
    /// The last step returned `NeedCredentials`, `try_again` may run it again.
    asked: bool,
    last_error: Option<SaslError>,
    layer: SecurityLayer,
    rng: StdRng,
}

impl Default for DigestClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DigestClient {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Client nonces are drawn from `rng`.
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            identity: Identity::default(),
            capable: true,
            state: State::Idle,
            creds: CredentialSet::new(),
            in_buf: vec![],
            out_buf: vec![],
            out_mech: None,
            expected_rspauth: None,
            asked: false,
            last_error: None,
            layer: SecurityLayer::default(),
            rng,
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    fn reset_state(&mut self) {
        self.state = State::Idle;
        self.in_buf.clear();
        self.out_buf.clear();
        self.out_mech = None;
        self.expected_rspauth = None;
        self.asked = false;
        self.last_error = None;
    }

    fn fail(&mut self, err: SaslError) -> (State, Status) {
        self.last_error = Some(err.clone());
        (State::Error(err.clone()), Status::Error(err))
    }

    fn progress(&mut self) -> Status {
        self.asked = false;
        let (new_state, status) = match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => {
                tracing::error!("DIGEST-MD5 negotiation was not started");
                (State::Idle, Status::Error(SaslError::ContractViolation))
            }
            terminal @ (State::Success | State::Error(_)) => {
                tracing::error!(state=?terminal, "DIGEST-MD5 negotiation is already over");
                (terminal, Status::Error(SaslError::ContractViolation))
            }
            State::Started => {
                // the server always speaks first with this mechanism
                self.out_mech = Some(DIGEST_MD5.to_string());
                self.out_buf.clear();
                (State::AwaitingChallenge, Status::Continue)
            }
            State::AwaitingChallenge => self.respond(),
            State::Responded => {
                self.check_response_auth();
                self.out_buf.clear();
                (State::Success, Status::Success)
            }
        };
        tracing::debug!(state=?new_state, "Made progress");
        self.state = new_state;
        status
    }

    fn respond(&mut self) -> (State, Status) {
        // the caller was told what to provide and came back without it
        let needed = self.creds.needed();
        if !needed.is_empty() {
            tracing::error!(needed=?needed, "Requested credentials were not supplied");
            return self.fail(SaslError::ContractViolation);
        }

        let missing: NeededFields = [
            CredentialField::Username,
            CredentialField::Authzid,
            CredentialField::Password,
        ]
        .into_iter()
        .filter(|f| !self.creds.is_known(*f))
        .collect();
        if !missing.is_empty() {
            tracing::debug!(missing=?missing, "Waiting for credentials");
            self.creds.mark_needed(missing);
            self.asked = true;
            return (State::AwaitingChallenge, Status::NeedCredentials(missing));
        }

        let challenge = match challenge(&self.in_buf) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(err=%e, "Could not parse the DIGEST-MD5 challenge");
                return self.fail(e.into());
            }
        };
        let qops = challenge.get_all("qop");
        if !qops.is_empty()
            && !qops
                .iter()
                .any(|q| q.split(|c| *c == b',').any(|o| o == QOP_AUTH.as_bytes()))
        {
            tracing::warn!("Server did not list qop=auth, answering with it anyway");
        }

        let cnonce = digest::client_nonce(&mut self.rng);
        let nonce = challenge.get("nonce").unwrap_or_default();
        let username = self.creds.username().unwrap_or_default();
        let authzid = self.creds.authzid().unwrap_or_default();
        let host = self.identity.host.as_str();
        let realm = self.creds.realm().unwrap_or(host);
        let digest_uri = self.identity.digest_uri();

        let params = DigestParams {
            username,
            realm,
            password: self.creds.password().unwrap_or_default(),
            authzid: Some(authzid),
            nonce,
            cnonce: cnonce.as_bytes(),
            nonce_count: NONCE_COUNT,
            digest_uri: &digest_uri,
            qop: QOP_AUTH,
        };
        let response = digest::response(&params);
        let expected_rspauth = digest::response_auth(&params);

        let mut out = AttributeList::new();
        out.set("username", username);
        out.set("realm", realm);
        out.set("nonce", nonce);
        out.set("cnonce", cnonce.as_str());
        out.set("nc", NONCE_COUNT);
        out.set("serv-type", self.identity.service.as_str());
        out.set("host", host);
        out.set("digest-uri", digest_uri.as_str());
        out.set("qop", QOP_AUTH);
        out.set("response", response);
        out.set("charset", "utf-8");
        if !authzid.is_empty() {
            out.set("authzid", authzid);
        }

        self.out_buf = out.to_bytes();
        self.expected_rspauth = Some(expected_rspauth);
        tracing::debug!(user=%username, realm=%realm, len=self.out_buf.len(), "DIGEST-MD5 response built");
        (State::Responded, Status::Continue)
    }

    fn check_response_auth(&self) {
        let rspauth = match attribute_list(&self.in_buf) {
            Ok((_, list)) => list.get("rspauth").map(|v| v.to_vec()),
            Err(_) => None,
        };
        match (rspauth, &self.expected_rspauth) {
            (None, _) => tracing::debug!("Server sent no rspauth, accepting"),
            (Some(got), Some(want)) if got == want.as_bytes() => {
                tracing::debug!("Server proved knowledge of the password")
            }
            (Some(_), _) => tracing::warn!("Server rspauth does not match, accepting anyway"),
        }
    }
}

impl Negotiator for DigestClient {
    fn variant(&self) -> Variant {
        Variant::BuiltinDigest
    }

    fn set_identity(&mut self, identity: Identity) {
        self.identity = identity;
    }

    fn set_security_requirements(&mut self, req: SecurityRequirements) {
        // DIGEST-MD5 here offers none of these guarantees
        self.capable = !(req.require_forward_secrecy
            || req.require_pass_credentials
            || req.require_mutual_auth
            || req.min_strength > 0);
    }

    fn client_start(&mut self, mechanisms: &[String]) -> Result<(), SaslError> {
        let offered = mechanisms.iter().any(|m| m == DIGEST_MD5);
        if !self.capable || !offered {
            tracing::warn!(
                offered,
                capable = self.capable,
                "DIGEST-MD5 can not be used on this connection"
            );
            self.last_error = Some(SaslError::NoMechanism);
            return Err(SaslError::NoMechanism);
        }

        self.reset_state();
        self.state = State::Started;
        Ok(())
    }

    fn client_first_step(&mut self, _allow_client_first: bool) -> Status {
        self.progress()
    }

    fn server_start(&mut self, _realm: &str, _app_name: &str) -> Result<Vec<String>, SaslError> {
        tracing::error!("The built-in DIGEST-MD5 mechanism is client only");
        Err(SaslError::NoMechanism)
    }

    fn server_first_step(&mut self, _mechanism: &str, _initial: Option<&[u8]>) -> Status {
        Status::Error(SaslError::ContractViolation)
    }

    fn next(&mut self, inbound: &[u8]) -> Status {
        if matches!(self.state, State::Success | State::Error(_)) {
            tracing::error!("Token received after the end of the negotiation");
            return Status::Error(SaslError::ContractViolation);
        }
        self.in_buf = inbound.to_vec();
        self.progress()
    }

    fn try_again(&mut self) -> Status {
        if !(self.asked && matches!(self.state, State::AwaitingChallenge)) {
            tracing::error!(state=?self.state, "No credential request to answer");
            return Status::Error(SaslError::ContractViolation);
        }
        self.progress()
    }

    fn authorize(&mut self, _approve: bool) -> Status {
        Status::Error(SaslError::ContractViolation)
    }

    fn supply_credentials(&mut self, update: CredentialUpdate) {
        self.creds.supply(update)
    }

    fn needed_credentials(&self) -> NeededFields {
        self.creds.missing()
    }

    fn result(&self) -> &[u8] {
        &self.out_buf
    }

    fn client_initial(&self) -> Option<&[u8]> {
        None
    }

    fn chosen_mechanism(&self) -> Option<&str> {
        self.out_mech.as_deref()
    }

    fn negotiated_strength(&self) -> u32 {
        self.layer.strength()
    }

    fn authenticated_identity(&self) -> Option<&IdentityPair> {
        None
    }

    fn last_error(&self) -> Option<&SaslError> {
        self.last_error.as_ref()
    }

    fn encode(&mut self, plain: &[u8]) -> Result<Vec<u8>, SaslError> {
        self.layer.encode(plain, |c| Ok::<_, Infallible>(c.to_vec()))
    }

    fn decode(&mut self, protected: &[u8]) -> Result<Vec<u8>, SaslError> {
        self.layer.decode(protected, |c| Ok::<_, Infallible>(c.to_vec()))
    }

    fn reset(&mut self) {
        self.reset_state();
        self.creds.clear();
        self.capable = true;
    }
}

// ---- TESTS ----

#[cfg(test)]
mod tests {
    use super::*;

    const CHALLENGE: &[u8] = b"realm=\"elwood.innosoft.com\",nonce=\"OA6MG9tEQGm2hh\",qop=\"auth\",algorithm=md5-sess,charset=utf-8";

    fn started() -> DigestClient {
        let mut client = DigestClient::with_rng(StdRng::seed_from_u64(42));
        client.set_identity(Identity::new("imap", "elwood.innosoft.com"));
        client.client_start(&[DIGEST_MD5.to_string()]).unwrap();
        client
    }

    fn chris() -> CredentialUpdate {
        CredentialUpdate::default()
            .username("chris")
            .authzid("")
            .password("secret")
    }

    #[test]
    fn test_start_requires_mechanism() {
        let mut client = DigestClient::new();
        assert_eq!(
            client.client_start(&["PLAIN".to_string(), "digest-md5".to_string()]),
            Err(SaslError::NoMechanism)
        );
        assert!(matches!(client.state(), State::Idle));
        assert_eq!(client.last_error(), Some(&SaslError::NoMechanism));
    }

    #[test]
    fn test_start_declines_strong_requirements() {
        let demands = [
            SecurityRequirements {
                require_forward_secrecy: true,
                ..Default::default()
            },
            SecurityRequirements {
                require_pass_credentials: true,
                ..Default::default()
            },
            SecurityRequirements {
                require_mutual_auth: true,
                ..Default::default()
            },
            SecurityRequirements {
                min_strength: 1,
                ..Default::default()
            },
        ];
        for req in demands {
            let mut client = DigestClient::new();
            client.set_security_requirements(req);
            assert_eq!(
                client.client_start(&[DIGEST_MD5.to_string()]),
                Err(SaslError::NoMechanism)
            );
        }

        // requirements this mechanism does meet
        let mut client = DigestClient::new();
        client.set_security_requirements(SecurityRequirements {
            no_plaintext: true,
            no_anonymous: true,
            max_strength: 256,
            ..Default::default()
        });
        assert!(client.client_start(&[DIGEST_MD5.to_string()]).is_ok());
    }

    #[test]
    fn test_first_step_sends_nothing() {
        let mut client = started();
        assert_eq!(client.client_first_step(true), Status::Continue);
        assert_eq!(client.chosen_mechanism(), Some(DIGEST_MD5));
        assert!(client.result().is_empty());
        assert!(client.client_initial().is_none());
    }

    #[test]
    fn test_need_credentials_lists_exactly_missing() {
        let mut client = started();
        client.client_first_step(false);
        client.supply_credentials(CredentialUpdate::default().username("chris"));

        let status = client.next(CHALLENGE);
        assert_eq!(
            status,
            Status::NeedCredentials(NeededFields {
                authzid: true,
                password: true,
                ..Default::default()
            })
        );
        assert!(client.result().is_empty());
        assert!(matches!(client.state(), State::AwaitingChallenge));

        // the challenge is kept for the retry
        client.supply_credentials(CredentialUpdate::default().authzid("").password("secret"));
        assert!(client.needed_credentials().is_empty());
        assert_eq!(client.try_again(), Status::Continue);
        assert!(client.result().starts_with(b"username=\"chris\""));
    }

    #[test]
    fn test_try_again_needs_a_request() {
        let mut client = started();
        client.supply_credentials(chris());
        assert_eq!(client.try_again(), Status::Error(SaslError::ContractViolation));
        assert!(matches!(client.state(), State::Started));

        client.client_first_step(false);
        assert_eq!(client.next(CHALLENGE), Status::Continue);
        let response = client.result().to_vec();

        // no server reply fed yet
        assert_eq!(client.try_again(), Status::Error(SaslError::ContractViolation));
        assert!(matches!(client.state(), State::Responded));
        assert_eq!(client.result(), &response[..]);
        assert_eq!(client.last_error(), None);

        assert_eq!(client.next(b"rspauth=0"), Status::Success);
    }

    #[test]
    fn test_unanswered_request_is_fatal() {
        let mut client = started();
        client.client_first_step(false);
        assert!(matches!(client.next(CHALLENGE), Status::NeedCredentials(_)));

        client.supply_credentials(CredentialUpdate::default().username("chris").authzid(""));
        assert_eq!(
            client.try_again(),
            Status::Error(SaslError::ContractViolation)
        );
        assert_eq!(client.last_error(), Some(&SaslError::ContractViolation));
    }

    #[test]
    fn test_bad_challenge() {
        let mut client = started();
        client.supply_credentials(chris());
        client.client_first_step(false);
        assert_eq!(
            client.next(b"realm=\"x\",nonce=\"a\",nonce=\"b\",algorithm=md5-sess"),
            Status::Error(SaslError::BadProtocol)
        );
        // no retry with the same negotiation
        assert_eq!(
            client.next(CHALLENGE),
            Status::Error(SaslError::ContractViolation)
        );
        assert_eq!(client.last_error(), Some(&SaslError::BadProtocol));
    }

    #[test]
    fn test_response_fields() {
        let mut client = started();
        client.supply_credentials(chris());
        client.client_first_step(false);
        assert_eq!(client.next(CHALLENGE), Status::Continue);

        let (_, out) = attribute_list(client.result()).unwrap();
        let names: Vec<&str> = out.0.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "username",
                "realm",
                "nonce",
                "cnonce",
                "nc",
                "serv-type",
                "host",
                "digest-uri",
                "qop",
                "response",
                "charset"
            ]
        );
        assert_eq!(out.get("realm"), Some(&b"elwood.innosoft.com"[..]));
        assert_eq!(out.get("nonce"), Some(&b"OA6MG9tEQGm2hh"[..]));
        assert_eq!(out.get("nc"), Some(&b"00000001"[..]));
        assert_eq!(out.get("digest-uri"), Some(&b"imap/elwood.innosoft.com"[..]));

        let cnonce = out.get("cnonce").unwrap();
        let expected = digest::response(&DigestParams {
            username: "chris",
            realm: "elwood.innosoft.com",
            password: "secret",
            authzid: None,
            nonce: b"OA6MG9tEQGm2hh",
            cnonce,
            nonce_count: NONCE_COUNT,
            digest_uri: "imap/elwood.innosoft.com",
            qop: QOP_AUTH,
        });
        assert_eq!(out.get("response"), Some(expected.as_bytes()));
    }

    #[test]
    fn test_supplied_realm_and_authzid() {
        let mut client = started();
        client.supply_credentials(
            CredentialUpdate::default()
                .username("chris")
                .authzid("admin")
                .password("secret")
                .realm("innosoft.com"),
        );
        client.client_first_step(false);
        client.next(CHALLENGE);

        let (_, out) = attribute_list(client.result()).unwrap();
        assert_eq!(out.get("realm"), Some(&b"innosoft.com"[..]));
        assert_eq!(out.get("host"), Some(&b"elwood.innosoft.com"[..]));
        assert_eq!(out.get("authzid"), Some(&b"admin"[..]));
    }

    #[test]
    fn test_success_is_stable() {
        let mut client = started();
        client.supply_credentials(chris());
        client.client_first_step(false);
        client.next(CHALLENGE);
        assert_eq!(
            client.next(b"rspauth=00000000000000000000000000000000"),
            Status::Success
        );
        assert!(client.result().is_empty());

        assert_eq!(
            client.next(b"anything"),
            Status::Error(SaslError::ContractViolation)
        );
        assert!(matches!(client.state(), State::Success));
        assert_eq!(client.negotiated_strength(), 0);
        assert_eq!(client.chosen_mechanism(), Some(DIGEST_MD5));
        assert_eq!(client.last_error(), None);
    }

    #[test]
    fn test_next_before_start() {
        let mut client = DigestClient::new();
        assert_eq!(
            client.next(CHALLENGE),
            Status::Error(SaslError::ContractViolation)
        );
    }

    #[test]
    fn test_reset_forgets_everything() {
        let mut client = started();
        client.set_security_requirements(SecurityRequirements {
            require_mutual_auth: true,
            ..Default::default()
        });
        client.supply_credentials(chris());
        client.client_first_step(false);
        client.reset();

        assert!(matches!(client.state(), State::Idle));
        assert_eq!(client.chosen_mechanism(), None);
        assert!(client.client_start(&[DIGEST_MD5.to_string()]).is_ok());
        client.client_first_step(false);
        assert!(matches!(client.next(CHALLENGE), Status::NeedCredentials(_)));
    }

    #[test]
    fn test_no_layer() {
        let mut client = started();
        let data = vec![0xA5u8; 20_000];
        assert_eq!(client.encode(&data).unwrap(), data);
        assert_eq!(client.decode(&[]).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_client_only() {
        let mut client = DigestClient::new();
        assert_eq!(
            client.server_start("realm", "app"),
            Err(SaslError::NoMechanism)
        );
    }
}
