use super::credentials::{CredentialUpdate, NeededFields};
use super::error::SaslError;
use super::types::*;

/// Operations a transport drives, whatever implements the mechanism.
///
/// One negotiator serves one authentication attempt. Steps never block:
/// when credentials are missing the step says so with
/// `Status::NeedCredentials`, the transport gets them the way it likes and
/// calls `try_again`. Tokens are not framed, framing belongs to the transport.
pub trait Negotiator {
    fn variant(&self) -> Variant;

    fn set_identity(&mut self, identity: Identity);
    fn set_security_requirements(&mut self, requirements: SecurityRequirements);

    /// Pick a mechanism among those the server offers.
    fn client_start(&mut self, mechanisms: &[String]) -> Result<(), SaslError>;
    /// First client step, possibly producing an initial response when allowed.
    fn client_first_step(&mut self, allow_client_first: bool) -> Status;

    /// Returns the mechanisms this server can offer.
    fn server_start(&mut self, realm: &str, app_name: &str) -> Result<Vec<String>, SaslError>;
    fn server_first_step(&mut self, mechanism: &str, client_initial: Option<&[u8]>) -> Status;

    /// Feed the peer's token.
    fn next(&mut self, inbound: &[u8]) -> Status;
    /// Run the current step again with the token already fed.
    fn try_again(&mut self) -> Status;
    /// Answer a `Status::AuthCheck`. A refusal ends the negotiation.
    fn authorize(&mut self, approve: bool) -> Status;

    fn supply_credentials(&mut self, update: CredentialUpdate);
    /// Fields the last step asked for that are still unknown.
    fn needed_credentials(&self) -> NeededFields;

    /// Token to send to the peer.
    fn result(&self) -> &[u8];
    fn client_initial(&self) -> Option<&[u8]>;
    fn chosen_mechanism(&self) -> Option<&str>;
    fn negotiated_strength(&self) -> u32;
    fn authenticated_identity(&self) -> Option<&IdentityPair>;
    fn last_error(&self) -> Option<&SaslError>;

    fn encode(&mut self, plain: &[u8]) -> Result<Vec<u8>, SaslError>;
    fn decode(&mut self, protected: &[u8]) -> Result<Vec<u8>, SaslError>;

    /// Forget the attempt, its credentials and requirements. The identity is kept.
    fn reset(&mut self);
}
