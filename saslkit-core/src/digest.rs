//! DIGEST-MD5 proof computation (RFC 2831 section 2.1.2.1)
//!
//! ```text
//! Y        = H(username ":" realm ":" password)          raw 16 bytes
//! A1       = Y ":" nonce ":" cnonce [":" authzid]
//! A2       = "AUTHENTICATE:" digest-uri
//! response = HEX(H(HEX(H(A1)) ":" nonce ":" nc ":" cnonce ":" qop ":" HEX(H(A2))))
//! ```
//!
//! The server proves itself with the same chain where `A2` lacks the
//! `AUTHENTICATE` prefix (`rspauth`).

use base64::Engine;
use md5::{Digest, Md5};
use rand::RngCore;

/// Re-authentication is not supported, so the first request is the only one.
pub const NONCE_COUNT: &str = "00000001";
/// Authentication only, no integrity or confidentiality layer.
pub const QOP_AUTH: &str = "auth";

const CNONCE_LEN: usize = 32;

pub struct DigestParams<'a> {
    pub username: &'a str,
    pub realm: &'a str,
    pub password: &'a str,
    /// Left out of `A1` when absent or empty.
    pub authzid: Option<&'a str>,
    pub nonce: &'a [u8],
    pub cnonce: &'a [u8],
    pub nonce_count: &'a str,
    pub digest_uri: &'a str,
    pub qop: &'a str,
}

fn hex_hash(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

fn a1(p: &DigestParams) -> Vec<u8> {
    let y = Md5::new()
        .chain_update(p.username.as_bytes())
        .chain_update(b":")
        .chain_update(p.realm.as_bytes())
        .chain_update(b":")
        .chain_update(p.password.as_bytes())
        .finalize();

    let mut a1 = y.to_vec();
    a1.extend_from_slice(b":");
    a1.extend_from_slice(p.nonce);
    a1.extend_from_slice(b":");
    a1.extend_from_slice(p.cnonce);
    if let Some(authzid) = p.authzid.filter(|z| !z.is_empty()) {
        a1.extend_from_slice(b":");
        a1.extend_from_slice(authzid.as_bytes());
    }
    a1
}

fn kd(p: &DigestParams, a2: &[u8]) -> String {
    let mut kd = hex_hash(&a1(p)).into_bytes();
    for part in [
        p.nonce,
        p.nonce_count.as_bytes(),
        p.cnonce,
        p.qop.as_bytes(),
        hex_hash(a2).as_bytes(),
    ] {
        kd.push(b':');
        kd.extend_from_slice(part);
    }
    hex_hash(&kd)
}

/// The `response` attribute a client sends.
pub fn response(p: &DigestParams) -> String {
    kd(p, format!("AUTHENTICATE:{}", p.digest_uri).as_bytes())
}

/// The `rspauth` attribute a server answers with.
pub fn response_auth(p: &DigestParams) -> String {
    kd(p, format!(":{}", p.digest_uri).as_bytes())
}

/// A fresh `cnonce`: random bytes, base64 encoded so it never needs quoting.
pub fn client_nonce<R: RngCore>(rng: &mut R) -> String {
    let mut raw = [0u8; CNONCE_LEN];
    rng.fill_bytes(&mut raw);
    base64::engine::general_purpose::STANDARD.encode(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn rfc2831_example() -> DigestParams<'static> {
        DigestParams {
            username: "chris",
            realm: "elwood.innosoft.com",
            password: "secret",
            authzid: None,
            nonce: b"OA6MG9tEQGm2hh",
            cnonce: b"OA6MHXh6VqTrRk",
            nonce_count: NONCE_COUNT,
            digest_uri: "imap/elwood.innosoft.com",
            qop: QOP_AUTH,
        }
    }

    #[test]
    fn test_rfc2831_response() {
        assert_eq!(
            response(&rfc2831_example()),
            "d388dad90d4bbd760a152321f2143af7"
        );
    }

    #[test]
    fn test_rfc2831_response_auth() {
        assert_eq!(
            response_auth(&rfc2831_example()),
            "ea40f60335c427b5527b84dbabcdfffd"
        );
    }

    #[test]
    fn test_empty_authzid_is_absent() {
        let mut p = rfc2831_example();
        p.authzid = Some("");
        assert_eq!(response(&p), "d388dad90d4bbd760a152321f2143af7");

        p.authzid = Some("admin");
        assert_ne!(response(&p), "d388dad90d4bbd760a152321f2143af7");
    }

    #[test]
    fn test_client_nonce() {
        let mut rng = StdRng::seed_from_u64(7);
        let a = client_nonce(&mut rng);
        let b = client_nonce(&mut rng);
        assert_ne!(a, b);
        // 32 bytes of base64 with padding
        assert_eq!(a.len(), 44);
        assert!(!a.contains('"') && !a.contains(','));

        let mut again = StdRng::seed_from_u64(7);
        assert_eq!(client_nonce(&mut again), a);
    }
}
