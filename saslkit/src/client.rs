use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use zeroize::Zeroizing;

use saslkit_core::{CredentialField, CredentialUpdate, NeededFields, Negotiator, Status};

use crate::config::CredentialsConfig;

/// Answers credential requests from the configuration, then the terminal.
pub struct CredentialSource {
    username: Option<String>,
    authzid: Option<String>,
    realm: Option<String>,
    password: Option<Zeroizing<String>>,
    prompt: bool,
}

impl CredentialSource {
    pub fn new(config: CredentialsConfig, password: Option<String>, prompt: bool) -> Self {
        Self {
            username: config.username,
            authzid: config.authzid,
            realm: config.realm,
            password: password.or(config.password).map(Zeroizing::new),
            prompt,
        }
    }

    /// What is known without asking, handed over before the first step.
    ///
    /// The realm is never requested by a mechanism that can default it, so a
    /// configured one only takes effect this way.
    fn known(&self) -> CredentialUpdate {
        CredentialUpdate {
            username: self.username.clone(),
            authzid: self.authzid.clone(),
            password: None,
            realm: self.realm.clone(),
        }
    }

    fn answer(&mut self, needed: NeededFields) -> Result<CredentialUpdate> {
        let mut update = CredentialUpdate::default();
        for field in needed.fields() {
            match field {
                CredentialField::Username => {
                    let user = self
                        .username
                        .clone()
                        .context("a username is needed, set it in [credentials] or with --username")?;
                    update.username = Some(user);
                }
                // acting as ourselves
                CredentialField::Authzid => update.authzid = Some(self.authzid.clone().unwrap_or_default()),
                CredentialField::Realm => update.realm = self.realm.clone(),
                CredentialField::Password => {
                    let password = match self.password.take() {
                        Some(p) => p,
                        None if self.prompt => Zeroizing::new(rpassword::prompt_password("Enter password: ")?),
                        None => bail!("a password is needed, set SASLKIT_PASSWORD"),
                    };
                    update.password = Some(password);
                }
            }
        }
        Ok(update)
    }
}

/// Drives a client negotiation over a line oriented channel.
///
/// The first line written is the chosen mechanism, followed by the initial
/// response when there is one. Every line read is a base64 server token,
/// optionally prefixed by an IMAP continuation `+ `; every line written is a
/// base64 client token, empty when the token is.
pub struct ClientLoop<R, W> {
    negotiator: Box<dyn Negotiator>,
    creds: CredentialSource,
    reader: R,
    writer: W,
    read_buf: String,
}

impl<R, W> ClientLoop<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(negotiator: Box<dyn Negotiator>, creds: CredentialSource, reader: R, writer: W) -> Self {
        Self {
            negotiator,
            creds,
            reader,
            writer,
            read_buf: String::new(),
        }
    }

    async fn send(&mut self, token: &[u8]) -> Result<()> {
        let line = format!("{}\n", STANDARD.encode(token));
        tracing::trace!(len = token.len(), "Sent token");
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Resolve credential requests until the step gives a real answer.
    fn settle(&mut self, mut status: Status) -> Result<Status> {
        while let Status::NeedCredentials(needed) = status {
            tracing::debug!(needed=?needed, "Credentials requested");
            let update = self.creds.answer(needed)?;
            self.negotiator.supply_credentials(update);
            status = self.negotiator.try_again();
        }
        Ok(status)
    }

    pub async fn run(mut self, mechanisms: &[String]) -> Result<Box<dyn Negotiator>> {
        self.negotiator
            .client_start(mechanisms)
            .context("no mechanism offered by the server can be used")?;
        self.negotiator.supply_credentials(self.creds.known());

        let status = self.negotiator.client_first_step(true);
        match self.settle(status)? {
            Status::Continue | Status::Success => (),
            Status::Error(e) => bail!(e),
            other => bail!("unexpected first step outcome {:?}", other),
        }

        let mech = self
            .negotiator
            .chosen_mechanism()
            .ok_or(anyhow!("no mechanism was chosen"))?
            .to_string();
        tracing::info!(mech=%mech, "Mechanism selected");
        self.writer.write_all(format!("{}\n", mech).as_bytes()).await?;
        if let Some(initial) = self.negotiator.client_initial().map(|i| i.to_vec()) {
            self.send(&initial).await?;
        }

        loop {
            self.read_buf.clear();
            let bread = self.reader.read_line(&mut self.read_buf).await?;
            if bread == 0 {
                bail!("Server closed the channel before the negotiation ended");
            }

            let line = self.read_buf.trim();
            let line = line.strip_prefix('+').map(str::trim_start).unwrap_or(line);
            let token = STANDARD
                .decode(line)
                .context("server token is not valid base64")?;
            tracing::trace!(len = token.len(), "Received token");

            let status = self.negotiator.next(&token);
            match self.settle(status)? {
                Status::Continue => {
                    let out = self.negotiator.result().to_vec();
                    self.send(&out).await?;
                }
                Status::Success => {
                    let out = self.negotiator.result().to_vec();
                    self.send(&out).await?;
                    tracing::info!(mech=%mech, ssf = self.negotiator.negotiated_strength(), "Authenticated");
                    return Ok(self.negotiator);
                }
                Status::Error(e) if e.is_credential_problem() => {
                    bail!("{}, retry with other credentials", e)
                }
                Status::Error(e) => bail!("{}, this mechanism can not be used", e),
                other => bail!("unexpected outcome {:?}", other),
            }
        }
    }
}
