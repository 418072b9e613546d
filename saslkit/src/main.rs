mod client;
mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use saslkit_core::digest::{self, DigestParams, NONCE_COUNT, QOP_AUTH};
use saslkit_core::{DigestClient, Negotiator};

use client::{ClientLoop, CredentialSource};
use config::*;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Command,

    #[clap(short, long, env = "SASLKIT_CONFIG", default_value = "saslkit.toml")]
    /// Path to the saslkit configuration file
    config_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Authenticate with DIGEST-MD5, server tokens on stdin and ours on stdout
    Client {
        /// Overrides the username of the configuration file
        #[clap(short, long)]
        username: Option<String>,

        #[clap(env = "SASLKIT_PASSWORD")]
        maybe_password: Option<String>,

        /// Fail instead of prompting when a credential is missing
        #[clap(long)]
        no_prompt: bool,
    },

    #[clap(subcommand)]
    /// Specific tooling, for debug & experimentation only
    Tools(ToolsCommand),
}

#[derive(Subcommand, Debug)]
enum ToolsCommand {
    /// Compute the DIGEST-MD5 response and rspauth values
    Digest {
        #[clap(long)]
        username: String,
        #[clap(long)]
        realm: String,
        #[clap(long)]
        nonce: String,
        #[clap(long)]
        cnonce: String,
        #[clap(long)]
        digest_uri: String,
        #[clap(long)]
        authzid: Option<String>,
        #[clap(long, default_value = NONCE_COUNT)]
        nc: String,

        #[clap(env = "SASLKIT_PASSWORD")]
        maybe_password: Option<String>,
    },
}

#[cfg(tokio_unstable)]
fn tracer() {
    console_subscriber::init();
}

#[cfg(not(tokio_unstable))]
fn tracer() {
    // stdout carries the tokens
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var(
            "RUST_LOG",
            "saslkit=info,saslkit_core=info,saslkit_engine=info",
        )
    }

    // Abort on panic (same behavior as in Go)
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("{}", panic_info);
        eprintln!("{:?}", backtrace::Backtrace::new());
        std::process::abort();
    }));

    tracer();

    let args = Args::parse();
    match &args.command {
        Command::Client {
            username,
            maybe_password,
            no_prompt,
        } => {
            let config: Config = read_config(args.config_file.clone())
                .context(format!("'{:?}' must be a saslkit configuration", args.config_file))?;

            let mut creds_config = config.credentials;
            if let Some(user) = username {
                creds_config.username = Some(user.clone());
            }
            let creds = CredentialSource::new(creds_config, maybe_password.clone(), !no_prompt);

            let mut negotiator: Box<dyn Negotiator> = Box::new(DigestClient::new());
            negotiator.set_identity(config.identity);
            negotiator.set_security_requirements(config.security);

            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            let stdout = tokio::io::stdout();
            ClientLoop::new(negotiator, creds, stdin, stdout)
                .run(&config.mechanisms)
                .await?;
        }
        Command::Tools(subcommand) => match subcommand {
            ToolsCommand::Digest {
                username,
                realm,
                nonce,
                cnonce,
                digest_uri,
                authzid,
                nc,
                maybe_password,
            } => {
                let password = match maybe_password {
                    Some(pwd) => pwd.clone(),
                    None => rpassword::prompt_password("Enter password: ")?,
                };
                let params = DigestParams {
                    username,
                    realm,
                    password: &password,
                    authzid: authzid.as_deref(),
                    nonce: nonce.as_bytes(),
                    cnonce: cnonce.as_bytes(),
                    nonce_count: nc,
                    digest_uri,
                    qop: QOP_AUTH,
                };
                println!("response={}", digest::response(&params));
                println!("rspauth={}", digest::response_auth(&params));
            }
        },
    }

    Ok(())
}
