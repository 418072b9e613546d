use std::rc::Rc;

use saslkit_core::*;

use super::engine::*;
use super::registry::Shared;

/// How many times one call may be reissued because the engine asked for
/// credentials it already has.
const MAX_INTERACT_ROUNDS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Server,
}

/// The engine call a step is made of. It is issued again by `try_again`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ClientStart { allow_client_first: bool },
    ClientStep,
    ServerStart { mechanism: String, initial: Option<Vec<u8>> },
    ServerStep,
}

impl Call {
    fn side(&self) -> Side {
        match self {
            Self::ClientStart { .. } | Self::ClientStep => Side::Client,
            Self::ServerStart { .. } | Self::ServerStep => Side::Server,
        }
    }

    fn following(&self) -> Self {
        match self.side() {
            Side::Client => Self::ClientStep,
            Side::Server => Self::ServerStep,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waiting {
    Peer,
    Credentials,
}

#[derive(Debug)]
pub enum State {
    Idle,
    /// Engine connection set up, first step not issued.
    Ready(Side),
    Running { call: Call, waiting: Waiting },
    /// The engine finished `call` but the caller has to approve the identities first.
    Checking { call: Call, step: EngineStep },
    Success,
    Error(SaslError),
}

/// `Negotiator` backed by an external SASL engine, client or server side.
///
/// Credentials asked by the engine are looked up in the same `CredentialSet`
/// the built-in client uses; unknown ones are reported with
/// `Status::NeedCredentials` and the interrupted engine call is issued again
/// by `try_again`. On the server side the engine proxy policy check suspends
/// the step with `Status::AuthCheck`; `authorize` resumes it from the result
/// the engine already produced.
pub struct EngineNegotiator<E: Engine> {
    // dropped before `shared`: connections go before the engine teardown
    conn: Option<E::Conn>,
    shared: Rc<Shared<E>>,

    identity: Identity,
    requirements: SecurityRequirements,
    state: State,
    creds: CredentialSet,
    mech_list: String,

    in_buf: Vec<u8>,
    out_buf: Vec<u8>,
    out_mech: Option<String>,
    client_init: Option<Vec<u8>>,
    identities: Option<IdentityPair>,
    check_raised: bool,
    last_error: Option<SaslError>,
    layer: SecurityLayer,
}

impl<E: Engine> EngineNegotiator<E> {
    pub(crate) fn new(shared: Rc<Shared<E>>) -> Self {
        Self {
            conn: None,
            shared,
            identity: Identity::default(),
            requirements: SecurityRequirements::default(),
            state: State::Idle,
            creds: CredentialSet::new(),
            mech_list: String::new(),
            in_buf: vec![],
            out_buf: vec![],
            out_mech: None,
            client_init: None,
            identities: None,
            check_raised: false,
            last_error: None,
            layer: SecurityLayer::default(),
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    fn reset_state(&mut self) {
        self.conn = None;
        self.state = State::Idle;
        self.mech_list.clear();
        self.in_buf.clear();
        self.out_buf.clear();
        self.out_mech = None;
        self.client_init = None;
        self.identities = None;
        self.check_raised = false;
        self.last_error = None;
        self.layer = SecurityLayer::default();
    }

    fn setup_failed(&mut self, err: SaslError) -> SaslError {
        tracing::warn!(err=%err, "Could not set up the engine negotiation");
        self.conn = None;
        self.last_error = Some(err.clone());
        err
    }

    fn fail(&mut self, err: SaslError) -> (State, Status) {
        tracing::info!(err=%err, "Engine negotiation failed");
        self.last_error = Some(err.clone());
        (State::Error(err.clone()), Status::Error(err))
    }

    /// Apply what the connection requirements say to a fresh engine connection.
    fn configure(&mut self) -> Result<(), SaslError> {
        let conn = match self.conn.as_mut() {
            Some(c) => c,
            None => return Err(SaslError::Engine { code: code::NOTINIT }),
        };

        let props = EngineSecurityProps::from(&self.requirements);
        match conn.set_security_props(&props) {
            code::OK => (),
            c => return Err(error_from_code(c)),
        }

        if let Some(auth_id) = &self.requirements.external_auth_id {
            match conn.set_external(self.requirements.external_strength, auth_id) {
                code::OK => (),
                c => return Err(error_from_code(c)),
            }
        }
        Ok(())
    }

    fn issue(&mut self, call: &Call) -> EngineStep {
        let conn = match self.conn.as_mut() {
            Some(c) => c,
            None => return EngineStep::new(code::NOTINIT),
        };
        match call {
            Call::ClientStart { allow_client_first } => {
                conn.client_start(&self.mech_list, &self.creds, *allow_client_first)
            }
            Call::ClientStep => conn.client_step(&self.in_buf, &self.creds),
            Call::ServerStart { mechanism, initial } => {
                conn.server_start(mechanism, initial.as_deref())
            }
            Call::ServerStep => conn.server_step(&self.in_buf),
        }
    }

    /// Issue `call` until the engine stops asking for credentials we know.
    fn run(&mut self, call: Call) -> (State, Status) {
        for round in 0..MAX_INTERACT_ROUNDS {
            let step = self.issue(&call);
            if step.code != code::INTERACT {
                return self.handle(call, step);
            }

            let missing: NeededFields = step
                .needs
                .fields()
                .into_iter()
                .filter(|f| !self.creds.is_known(*f))
                .collect();
            if !missing.is_empty() {
                tracing::debug!(missing=?missing, "Engine waits for credentials");
                self.creds.mark_needed(missing);
                let waiting = Waiting::Credentials;
                return (State::Running { call, waiting }, Status::NeedCredentials(missing));
            }
            tracing::debug!(round, "Engine asked for known credentials, issuing again");
        }

        tracing::error!(call=?call, "Engine keeps asking for credentials");
        self.fail(SaslError::Engine {
            code: code::INTERACT,
        })
    }

    fn handle(&mut self, call: Call, step: EngineStep) -> (State, Status) {
        if let Some(pair) = &step.proxy_check {
            self.identities = Some(pair.clone());
            if !self.check_raised && is_progress(step.code) {
                self.check_raised = true;
                tracing::debug!(authn=%pair.authenticated, authz=%pair.authorization, "Waiting for authorization");
                let status = Status::AuthCheck(pair.clone());
                return (State::Checking { call, step }, status);
            }
        }
        self.conclude(call, step)
    }

    fn conclude(&mut self, call: Call, step: EngineStep) -> (State, Status) {
        if !is_progress(step.code) {
            return self.fail(error_from_code(step.code));
        }

        if let Some(mech) = step.mechanism {
            self.out_mech = Some(mech);
        }
        self.out_buf = match (&call, step.code) {
            // a server finishing on a later step has nothing left to say
            (Call::ServerStep, code::OK) => vec![],
            _ => step.output.clone().unwrap_or_default(),
        };
        if let Call::ClientStart {
            allow_client_first: true,
        } = call
        {
            self.client_init = step.output;
        }

        match step.code {
            code::CONTINUE => {
                let waiting = Waiting::Peer;
                let call = call.following();
                (State::Running { call, waiting }, Status::Continue)
            }
            _ => self.settle(),
        }
    }

    /// Read the security layer the engine installed.
    fn settle(&mut self) -> (State, Status) {
        let layer = match self.conn.as_ref() {
            Some(conn) => conn
                .strength()
                .and_then(|ssf| Ok(SecurityLayer::new(ssf, conn.max_output()?))),
            None => Err(code::NOTINIT),
        };
        match layer {
            Ok(layer) => {
                tracing::info!(mech=?self.out_mech, ssf = layer.strength(), max_buffer = layer.max_buffer(), "Engine negotiation succeeded");
                self.layer = layer;
                (State::Success, Status::Success)
            }
            Err(c) => self.fail(error_from_code(c)),
        }
    }

    fn misuse(&mut self, what: &str) -> Status {
        tracing::error!(state=?self.state, "{} is not allowed now", what);
        Status::Error(SaslError::ContractViolation)
    }

    fn transition<F>(&mut self, f: F) -> Status
    where
        F: FnOnce(&mut Self, State) -> (State, Status),
    {
        let old = std::mem::replace(&mut self.state, State::Idle);
        let (new_state, status) = f(self, old);
        tracing::debug!(state=?new_state, "Made progress");
        self.state = new_state;
        status
    }
}

impl<E: Engine> Negotiator for EngineNegotiator<E> {
    fn variant(&self) -> Variant {
        Variant::ExternalEngine
    }

    fn set_identity(&mut self, identity: Identity) {
        self.identity = identity;
    }

    fn set_security_requirements(&mut self, requirements: SecurityRequirements) {
        self.requirements = requirements;
    }

    fn client_start(&mut self, mechanisms: &[String]) -> Result<(), SaslError> {
        self.reset_state();
        if mechanisms.is_empty() {
            return Err(self.setup_failed(SaslError::NoMechanism));
        }
        if let Err(e) = self.shared.ensure_client() {
            return Err(self.setup_failed(e));
        }

        let params = ConnParams::from(&self.identity);
        match self.shared.engine.client_new(&params) {
            Ok(conn) => self.conn = Some(conn),
            Err(c) => return Err(self.setup_failed(error_from_code(c))),
        }
        if let Err(e) = self.configure() {
            return Err(self.setup_failed(e));
        }

        self.mech_list = mechanisms.join(" ");
        self.state = State::Ready(Side::Client);
        tracing::debug!(mechanisms=%self.mech_list, "Client negotiation ready");
        Ok(())
    }

    fn client_first_step(&mut self, allow_client_first: bool) -> Status {
        if !matches!(self.state, State::Ready(Side::Client)) {
            return self.misuse("Client first step");
        }
        self.transition(|n, _| n.run(Call::ClientStart { allow_client_first }))
    }

    fn server_start(&mut self, realm: &str, app_name: &str) -> Result<Vec<String>, SaslError> {
        self.reset_state();
        if let Err(e) = self.shared.ensure_server(app_name) {
            return Err(self.setup_failed(e));
        }

        let params = ConnParams::from(&self.identity);
        match self.shared.engine.server_new(&params, realm) {
            Ok(conn) => self.conn = Some(conn),
            Err(c) => return Err(self.setup_failed(error_from_code(c))),
        }
        if let Err(e) = self.configure() {
            return Err(self.setup_failed(e));
        }

        let listed = match self.conn.as_mut().map(|c| c.list_mechanisms()) {
            Some(Ok(l)) => l,
            Some(Err(c)) => return Err(self.setup_failed(error_from_code(c))),
            None => return Err(self.setup_failed(SaslError::Engine { code: code::NOTINIT })),
        };
        let mechanisms: Vec<String> = listed.split(' ').filter(|m| !m.is_empty()).map(String::from).collect();

        self.state = State::Ready(Side::Server);
        tracing::debug!(realm, count = mechanisms.len(), "Server negotiation ready");
        Ok(mechanisms)
    }

    fn server_first_step(&mut self, mechanism: &str, client_initial: Option<&[u8]>) -> Status {
        if !matches!(self.state, State::Ready(Side::Server)) {
            return self.misuse("Server first step");
        }
        self.out_mech = Some(mechanism.to_string());
        let call = Call::ServerStart {
            mechanism: mechanism.to_string(),
            initial: client_initial.map(|i| i.to_vec()),
        };
        self.transition(|n, _| n.run(call))
    }

    fn next(&mut self, inbound: &[u8]) -> Status {
        let waiting = Waiting::Peer;
        if !matches!(&self.state, State::Running { waiting: w, .. } if *w == waiting) {
            return self.misuse("Feeding a token");
        }
        self.in_buf = inbound.to_vec();
        self.transition(|n, old| match old {
            State::Running { call, .. } => n.run(call),
            other => (other, Status::Error(SaslError::ContractViolation)),
        })
    }

    fn try_again(&mut self) -> Status {
        let waiting = Waiting::Credentials;
        if !matches!(&self.state, State::Running { waiting: w, .. } if *w == waiting) {
            return self.misuse("Retrying a step");
        }
        self.transition(|n, old| match old {
            State::Running { call, .. } => {
                let missing = n.creds.missing();
                if !missing.is_empty() {
                    tracing::error!(missing=?missing, "Requested credentials were not supplied");
                    return n.fail(SaslError::ContractViolation);
                }
                n.run(call)
            }
            other => (other, Status::Error(SaslError::ContractViolation)),
        })
    }

    fn authorize(&mut self, approve: bool) -> Status {
        if !matches!(self.state, State::Checking { .. }) {
            return self.misuse("Authorization");
        }
        self.transition(|n, old| match old {
            State::Checking { .. } if !approve => {
                tracing::info!(identities=?n.identities, "Authorization denied");
                n.fail(SaslError::NotAuthorized)
            }
            State::Checking { call, step } => n.conclude(call, step),
            other => (other, Status::Error(SaslError::ContractViolation)),
        })
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
        self.client_init.as_deref()
    }

    fn chosen_mechanism(&self) -> Option<&str> {
        self.out_mech.as_deref()
    }

    fn negotiated_strength(&self) -> u32 {
        self.layer.strength()
    }

    fn authenticated_identity(&self) -> Option<&IdentityPair> {
        self.identities.as_ref()
    }

    fn last_error(&self) -> Option<&SaslError> {
        self.last_error.as_ref()
    }

    fn encode(&mut self, plain: &[u8]) -> Result<Vec<u8>, SaslError> {
        let layer = self.layer;
        match self.conn.as_mut() {
            Some(conn) => layer.encode(plain, |c| conn.encode(c)),
            None => layer.encode(plain, |_| Err(code::NOTINIT)),
        }
    }

    fn decode(&mut self, protected: &[u8]) -> Result<Vec<u8>, SaslError> {
        let layer = self.layer;
        match self.conn.as_mut() {
            Some(conn) => layer.decode(protected, |c| conn.decode(c)),
            None => layer.decode(protected, |_| Err(code::NOTINIT)),
        }
    }

    fn reset(&mut self) {
        self.reset_state();
        self.creds.clear();
        self.requirements = SecurityRequirements::default();
    }
}
