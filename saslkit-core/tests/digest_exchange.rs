use rand::{rngs::StdRng, SeedableRng};

use saslkit_core::decode::attribute_list;
use saslkit_core::digest::{self, DigestParams};
use saslkit_core::*;

const SERVER_NONCE: &str = "OA6MG9tEQGm2hh";

fn server_challenge() -> Vec<u8> {
    format!(
        "realm=\"elwood.innosoft.com\",nonce=\"{}\",qop=\"auth\",algorithm=md5-sess,charset=utf-8",
        SERVER_NONCE
    )
    .into_bytes()
}

/// What a server does with the client response: recompute the proof from
/// the password it knows and answer with rspauth.
fn server_verify(response: &[u8], password: &str) -> Option<Vec<u8>> {
    let (_, attrs) = attribute_list(response).ok()?;
    let text = |name: &str| std::str::from_utf8(attrs.get(name)?).ok();

    let params = DigestParams {
        username: text("username")?,
        realm: text("realm")?,
        password,
        authzid: text("authzid"),
        nonce: attrs.get("nonce")?,
        cnonce: attrs.get("cnonce")?,
        nonce_count: text("nc")?,
        digest_uri: text("digest-uri")?,
        qop: text("qop")?,
    };
    if params.nonce != SERVER_NONCE.as_bytes() || text("response")? != digest::response(&params) {
        return None;
    }
    Some(format!("rspauth={}", digest::response_auth(&params)).into_bytes())
}

fn negotiator() -> Box<dyn Negotiator> {
    let mut n: Box<dyn Negotiator> = Box::new(DigestClient::with_rng(StdRng::seed_from_u64(1)));
    n.set_identity(Identity::new("imap", "elwood.innosoft.com"));
    n.set_security_requirements(SecurityRequirements::default());
    n
}

#[test]
fn full_exchange_with_late_credentials() {
    let mut n = negotiator();
    assert_eq!(n.variant(), Variant::BuiltinDigest);
    n.client_start(&["PLAIN".to_string(), "DIGEST-MD5".to_string()])
        .unwrap();
    assert_eq!(n.client_first_step(false), Status::Continue);

    let challenge = server_challenge();
    let status = n.next(&challenge);
    let needed = match status {
        Status::NeedCredentials(f) => f,
        other => panic!("expected a credential request, got {:?}", other),
    };
    assert_eq!(
        needed.fields(),
        vec![
            CredentialField::Username,
            CredentialField::Authzid,
            CredentialField::Password
        ]
    );

    // a prompt would happen here
    n.supply_credentials(
        CredentialUpdate::default()
            .username("chris")
            .authzid("")
            .password("secret"),
    );
    assert_eq!(n.try_again(), Status::Continue);

    let rspauth = server_verify(n.result(), "secret").expect("server accepts the proof");
    assert_eq!(n.next(&rspauth), Status::Success);
    assert!(n.result().is_empty());
    assert_eq!(n.chosen_mechanism(), Some("DIGEST-MD5"));
    assert_eq!(n.negotiated_strength(), 0);

    let app = b"a001 SELECT INBOX\r\n";
    assert_eq!(n.encode(app).unwrap(), app.to_vec());
    assert_eq!(n.decode(app).unwrap(), app.to_vec());
}

#[test]
fn wrong_password_is_caught_by_the_server() {
    let mut n = negotiator();
    n.client_start(&["DIGEST-MD5".to_string()]).unwrap();
    n.supply_credentials(
        CredentialUpdate::default()
            .username("chris")
            .authzid("")
            .password("not-secret"),
    );
    n.client_first_step(false);
    assert_eq!(n.next(&server_challenge()), Status::Continue);
    assert!(server_verify(n.result(), "secret").is_none());
}

#[test]
fn fresh_cnonce_per_attempt() {
    let mut n = negotiator();
    let mut cnonces = vec![];
    for _ in 0..2 {
        n.reset();
        n.client_start(&["DIGEST-MD5".to_string()]).unwrap();
        n.supply_credentials(
            CredentialUpdate::default()
                .username("chris")
                .authzid("")
                .password("secret"),
        );
        n.client_first_step(false);
        n.next(&server_challenge());
        let (_, attrs) = attribute_list(n.result()).unwrap();
        cnonces.push(attrs.get("cnonce").unwrap().to_vec());
    }
    assert_ne!(cnonces[0], cnonces[1]);
}

#[test]
fn missing_mechanism_fails_start() {
    let mut n = negotiator();
    assert_eq!(
        n.client_start(&["PLAIN".to_string(), "SCRAM-SHA-1".to_string()]),
        Err(SaslError::NoMechanism)
    );
    assert_eq!(n.chosen_mechanism(), None);
    assert!(n.result().is_empty());
}
