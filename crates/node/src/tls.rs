//! TLS material for the QUIC transport.
//!
//! A node needs an [`Identity`] (certificate chain + key) to listen and a
//! set of trusted roots to dial. [`SecurityConfig`] bundles the resulting
//! quinn crypto configs with the server name presented when dialing.

use corelib::{Error, Result};
use rustls::RootCertStore;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::PrivatePkcs8KeyDer;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub use rustls_pki_types::{CertificateDer, PrivateKeyDer};

/// Certificate chain and private key.
pub struct Identity {
    pub cert_chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

impl Identity {
    /// Generate a self-signed identity valid for `names`.
    pub fn self_signed(names: &[&str]) -> Result<Self> {
        let certified = generate(names)?;
        let key = PrivatePkcs8KeyDer::from(certified.key_pair.serialize_der());
        Ok(Self {
            cert_chain: vec![certified.cert.der().clone()],
            key: PrivateKeyDer::Pkcs8(key),
        })
    }

    /// Generate a self-signed identity and return it as `(cert_pem, key_pem)`.
    pub fn self_signed_pem(names: &[&str]) -> Result<(String, String)> {
        let certified = generate(names)?;
        Ok((certified.cert.pem(), certified.key_pair.serialize_pem()))
    }

    /// Parse a PEM certificate chain and a PEM private key.
    pub fn from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self> {
        let cert_chain = CertificateDer::pem_slice_iter(cert_pem)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|err| Error::Config(format!("certificate PEM: {err}")))?;
        if cert_chain.is_empty() {
            return Err(Error::Config("certificate PEM holds no certificates".into()));
        }
        let key = PrivateKeyDer::from_pem_slice(key_pem)
            .map_err(|err| Error::Config(format!("private key PEM: {err}")))?;
        Ok(Self { cert_chain, key })
    }

    pub fn from_pem_files(cert: impl AsRef<Path>, key: impl AsRef<Path>) -> Result<Self> {
        let cert_pem = std::fs::read(cert)?;
        let key_pem = std::fs::read(key)?;
        Self::from_pem(&cert_pem, &key_pem)
    }

    /// Leaf certificate, for peers that should trust this identity directly.
    pub fn leaf(&self) -> Option<&CertificateDer<'static>> {
        self.cert_chain.first()
    }
}

impl Clone for Identity {
    fn clone(&self) -> Self {
        Self {
            cert_chain: self.cert_chain.clone(),
            key: self.key.clone_key(),
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("certificates", &self.cert_chain.len())
            .finish_non_exhaustive()
    }
}

fn generate(names: &[&str]) -> Result<rcgen::CertifiedKey> {
    let names: Vec<String> = names.iter().map(|name| name.to_string()).collect();
    rcgen::generate_simple_self_signed(names)
        .map_err(|err| Error::Config(format!("certificate generation: {err}")))
}

/// Parse every certificate in a PEM bundle, for use as trusted roots.
pub fn roots_from_pem(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    CertificateDer::pem_slice_iter(pem)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|err| Error::Config(format!("CA PEM: {err}")))
}

/// Crypto configuration for a node.
#[derive(Clone)]
pub struct SecurityConfig {
    /// Server side; `None` for dial-only nodes.
    pub server: Option<quinn::ServerConfig>,
    /// Client side used for every outbound dial.
    pub client: quinn::ClientConfig,
    /// Name checked against the peer certificate when dialing.
    pub server_name: String,
}

impl SecurityConfig {
    /// Build quinn configs from an optional identity and trusted roots.
    ///
    /// # Errors
    /// [`Error::Config`] if a root or the identity is rejected by rustls.
    pub fn new(
        identity: Option<Identity>,
        trusted: &[CertificateDer<'static>],
        server_name: impl Into<String>,
    ) -> Result<Self> {
        let mut roots = RootCertStore::empty();
        for cert in trusted {
            roots
                .add(cert.clone())
                .map_err(|err| Error::Config(format!("trusted root: {err}")))?;
        }
        let client = quinn::ClientConfig::with_root_certificates(Arc::new(roots))
            .map_err(|err| Error::Config(format!("client TLS: {err}")))?;

        let server = identity
            .map(|identity| {
                quinn::ServerConfig::with_single_cert(identity.cert_chain, identity.key)
                    .map_err(|err| Error::Config(format!("server TLS: {err}")))
            })
            .transpose()?;

        Ok(Self {
            server,
            client,
            server_name: server_name.into(),
        })
    }

    /// Identity that trusts only itself. Every node sharing `identity`
    /// can dial every other.
    pub fn shared(identity: &Identity, server_name: impl Into<String>) -> Result<Self> {
        let trusted: Vec<_> = identity.leaf().cloned().into_iter().collect();
        Self::new(Some(identity.clone()), &trusted, server_name)
    }

    /// Dial-only configuration trusting `roots`.
    pub fn client_only(
        roots: &[CertificateDer<'static>],
        server_name: impl Into<String>,
    ) -> Result<Self> {
        Self::new(None, roots, server_name)
    }
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("listens", &self.server.is_some())
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}
