use std::io::Read;
use std::path::PathBuf;

use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use saslkit_core::{Identity, SecurityRequirements, DIGEST_MD5};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub identity: Identity,
    #[serde(default)]
    pub security: SecurityRequirements,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    /// What the server advertises.
    #[serde(default = "default_mechanisms")]
    pub mechanisms: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CredentialsConfig {
    pub username: Option<String>,
    pub authzid: Option<String>,
    pub password: Option<String>,
    pub realm: Option<String>,
}

pub fn read_config<T: DeserializeOwned>(config_file: PathBuf) -> Result<T> {
    let mut file = std::fs::OpenOptions::new()
        .read(true)
        .open(config_file.as_path())?;

    let mut config = String::new();
    file.read_to_string(&mut config)?;

    Ok(toml::from_str(&config)?)
}

fn default_mechanisms() -> Vec<String> {
    vec![DIGEST_MD5.into()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config() {
        let config: Config = toml::from_str(
            r#"
            [identity]
            service = "imap"
            host = "elwood.innosoft.com"
            "#,
        )
        .unwrap();
        assert_eq!(config.identity.digest_uri(), "imap/elwood.innosoft.com");
        assert_eq!(config.mechanisms, vec!["DIGEST-MD5".to_string()]);
        assert_eq!(config.security, SecurityRequirements::default());
        assert!(config.credentials.username.is_none());
    }

    #[test]
    fn full_config() {
        let config: Config = toml::from_str(
            r#"
            mechanisms = ["PLAIN", "DIGEST-MD5"]

            [identity]
            service = "xmpp"
            host = "jabber.example"
            remote_addr = "192.0.2.7:5222"

            [security]
            no_plaintext = true
            max_strength = 256

            [credentials]
            username = "chris"
            authzid = ""
            "#,
        )
        .unwrap();
        assert_eq!(config.identity.remote_addr, Some("192.0.2.7:5222".parse().unwrap()));
        assert!(config.security.no_plaintext);
        assert_eq!(config.security.max_strength, 256);
        assert_eq!(config.credentials.username.as_deref(), Some("chris"));
        assert_eq!(config.credentials.authzid.as_deref(), Some(""));
        assert_eq!(config.mechanisms.len(), 2);
    }
}
