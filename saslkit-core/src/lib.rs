pub mod credentials;
pub mod decode;
pub mod digest;
pub mod encode;
pub mod error;
pub mod flow;
pub mod layer;
pub mod negotiator;
/// Client side SASL negotiation, built around a self-contained DIGEST-MD5
///
/// ## Trace
///
/// ```text
/// C: AUTHENTICATE DIGEST-MD5
/// S: + cmVhbG09ImVsd29vZC5pbm5vc29mdC5jb20iLG5vbmNlPSJPQTZNRzl0RVFHbTJoaCIscW9wPSJhdXRoIixhbGdvcml0aG09bWQ1LXNlc3MsY2hhcnNldD11dGYtOA==
/// C: dXNlcm5hbWU9ImNocmlzIixyZWFsbT0iZWx3b29kLmlubm9zb2Z0LmNvbSIsbm9uY2U9Ik9BNk1HOXRFUUdtMmhoIiwuLi4=
/// S: + cnNwYXV0aD1lYTQwZjYwMzM1YzQyN2I1NTI3Yjg0ZGJhYmNkZmZmZA==
/// C:
/// S: A OK Authenticated
/// ```
///
/// The transport carries the tokens (here IMAP, base64 encoded); this crate
/// only produces and consumes their content, through the `Negotiator` trait.
///
/// ## RFC References
///
/// DIGEST-MD5 SASL - https://datatracker.ietf.org/doc/html/rfc2831
/// SASL framework - https://datatracker.ietf.org/doc/html/rfc4422
pub mod types;

pub use credentials::{CredentialField, CredentialSet, CredentialUpdate, NeededFields};
pub use error::{ParseError, SaslError};
pub use flow::DigestClient;
pub use layer::SecurityLayer;
pub use negotiator::Negotiator;
pub use types::{Identity, IdentityPair, SecurityRequirements, Status, Variant, DIGEST_MD5};
