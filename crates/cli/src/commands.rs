//! Subcommands and their results.

use crate::config::NodeSettings;
use anyhow::{bail, Context, Result};
use clap::Subcommand;
use corelib::{Headers, Request, Response};
use node::tls::{roots_from_pem, CertificateDer};
use node::{default_transport, Identity, Limits, Node, NodeConfig, QuicConnection, SecurityConfig};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const DEFAULT_LISTEN: &str = "127.0.0.1:4433";
const DEFAULT_SERVER_NAME: &str = "localhost";

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a node answering `ping` and `echo` until Ctrl-C.
    Serve {
        /// Address to bind, `host:port`.
        #[arg(long)]
        listen: Option<String>,
        /// PEM certificate chain.
        #[arg(long, requires = "key")]
        cert: Option<PathBuf>,
        /// PEM private key.
        #[arg(long, requires = "cert")]
        key: Option<PathBuf>,
        /// PEM roots trusted when this node dials. Defaults to its own certificate.
        #[arg(long)]
        ca: Option<PathBuf>,
        /// Generate a throwaway certificate instead of loading one.
        #[arg(long, conflicts_with_all = ["cert", "key"])]
        self_signed: bool,
        /// Write the generated certificate here so clients can trust it.
        #[arg(long, requires = "self_signed")]
        export_cert: Option<PathBuf>,
        /// Name the certificate is issued for and checked against when dialing.
        #[arg(long)]
        server_name: Option<String>,
    },

    /// Make one call and print the response.
    Call {
        /// Target node, `host:port`.
        #[arg(long)]
        addr: String,
        #[arg(long)]
        route: String,
        #[arg(long, default_value = "")]
        body: String,
        /// Request header as `key=value`. Repeatable.
        #[arg(short = 'H', long = "header", value_parser = parse_header)]
        headers: Vec<(String, String)>,
        /// PEM roots used to verify the target.
        #[arg(long)]
        ca: Option<PathBuf>,
        #[arg(long)]
        server_name: Option<String>,
        /// Print the response as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Write a self-signed `cert.pem` and `key.pem`.
    GenCert {
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        /// Subject alternative name. Repeatable.
        #[arg(long = "name", default_value = DEFAULT_SERVER_NAME)]
        names: Vec<String>,
    },
}

impl Command {
    pub async fn execute(self, settings: &NodeSettings) -> Result<CommandResult> {
        match self {
            Command::Serve {
                listen,
                cert,
                key,
                ca,
                self_signed,
                export_cert,
                server_name,
            } => {
                let server_name = server_name
                    .or_else(|| settings.server_name.clone())
                    .unwrap_or_else(|| DEFAULT_SERVER_NAME.to_string());
                let identity = if self_signed {
                    self_signed_identity(&server_name, export_cert)?
                } else {
                    let cert = cert.or_else(|| settings.cert.clone());
                    let key = key.or_else(|| settings.key.clone());
                    match (cert, key) {
                        (Some(cert), Some(key)) => Identity::from_pem_files(&cert, &key)
                            .with_context(|| format!("failed to load {}", cert.display()))?,
                        _ => bail!("serve needs --cert and --key, or --self-signed"),
                    }
                };
                let trusted = match ca.or_else(|| settings.ca.clone()) {
                    Some(path) => load_roots(&path)?,
                    None => identity.cert_chain.iter().take(1).cloned().collect(),
                };
                let security = SecurityConfig::new(Some(identity), &trusted, server_name)?;
                let listen = listen
                    .or_else(|| settings.listen.clone())
                    .unwrap_or_else(|| DEFAULT_LISTEN.to_string());
                serve(listen, security, settings.limits()).await
            }
            Command::Call {
                addr,
                route,
                body,
                headers,
                ca,
                server_name,
                json: _,
            } => {
                let ca = ca
                    .or_else(|| settings.ca.clone())
                    .context("call needs a trusted certificate (--ca)")?;
                let server_name = server_name
                    .or_else(|| settings.server_name.clone())
                    .unwrap_or_else(|| DEFAULT_SERVER_NAME.to_string());
                let security = SecurityConfig::client_only(&load_roots(&ca)?, server_name)?;
                let headers: Headers = headers.into_iter().collect();
                call(&addr, &route, headers, body, security, settings.limits()).await
            }
            Command::GenCert { out_dir, names } => gen_cert(out_dir, &names),
        }
    }

    pub fn wants_json(&self) -> bool {
        matches!(self, Command::Call { json: true, .. })
    }
}

/// Output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandResult {
    Stopped {
        addr: String,
    },
    Response {
        status: u16,
        message: String,
        headers: BTreeMap<String, String>,
        body: String,
    },
    CertWritten {
        cert: PathBuf,
        key: PathBuf,
    },
}

impl CommandResult {
    pub fn from_response(response: &Response) -> Self {
        CommandResult::Response {
            status: response.status,
            message: response.message.clone(),
            headers: response
                .headers
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            body: String::from_utf8_lossy(&response.body).into_owned(),
        }
    }

    pub fn render(&self, json: bool) -> Result<String> {
        if json {
            return Ok(serde_json::to_string_pretty(self)?);
        }
        Ok(match self {
            CommandResult::Stopped { addr } => format!("node at {addr} stopped"),
            CommandResult::Response {
                status,
                message,
                headers,
                body,
            } => {
                let mut out = format!("{status} {message}\n");
                for (key, value) in headers {
                    out.push_str(&format!("{key}: {value}\n"));
                }
                out.push('\n');
                out.push_str(body);
                out
            }
            CommandResult::CertWritten { cert, key } => {
                format!("wrote {} and {}", cert.display(), key.display())
            }
        })
    }
}

async fn serve(listen: String, security: SecurityConfig, limits: Limits) -> Result<CommandResult> {
    let config = NodeConfig::new(listen)
        .with_security(security)
        .with_transport(default_transport())
        .with_limits(limits);
    let node = Node::start(config)?;
    node.handle("ping", |_| async { Response::ok("pong") });
    node.handle("echo", |request: Request<QuicConnection>| async move {
        Response::ok(request.body)
    });

    let addr = node.local_addr()?;
    info!(%addr, "serving, press Ctrl-C to stop");
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            info!("interrupt received");
        }
        () = node.closed() => warn!("node stopped on its own"),
    }
    node.stop().await;
    Ok(CommandResult::Stopped {
        addr: addr.to_string(),
    })
}

async fn call(
    addr: &str,
    route: &str,
    headers: Headers,
    body: String,
    security: SecurityConfig,
    limits: Limits,
) -> Result<CommandResult> {
    let bind: SocketAddr = if addr.starts_with('[') {
        "[::]:0".parse()?
    } else {
        "0.0.0.0:0".parse()?
    };
    let node = Node::dialer(bind, &security, default_transport(), limits)?;
    let outcome = node.call(addr, route, headers, body).await;
    node.stop().await;

    let response = match outcome {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "call failed");
            err.into_response()
        }
    };
    Ok(CommandResult::from_response(&response))
}

fn gen_cert(out_dir: PathBuf, names: &[String]) -> Result<CommandResult> {
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let (cert_pem, key_pem) = Identity::self_signed_pem(&names)?;

    let cert = out_dir.join("cert.pem");
    let key = out_dir.join("key.pem");
    fs::write(&cert, cert_pem)?;
    fs::write(&key, key_pem)?;
    Ok(CommandResult::CertWritten { cert, key })
}

fn self_signed_identity(name: &str, export: Option<PathBuf>) -> Result<Identity> {
    let (cert_pem, key_pem) = Identity::self_signed_pem(&[name])?;
    if let Some(path) = export {
        fs::write(&path, &cert_pem)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "exported self-signed certificate");
    }
    Ok(Identity::from_pem(cert_pem.as_bytes(), key_pem.as_bytes())?)
}

fn load_roots(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let pem = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(roots_from_pem(&pem)?)
}

fn parse_header(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected key=value, got {raw:?}")),
    }
}
