//! Process-wide configuration
//!
//! All secrets are read exactly once at startup: the app key that signs
//! terminal session tokens and the RSA key pair that signs login JWTs.
//! Everything else arrives per request.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use jsonwebtoken::{DecodingKey, EncodingKey};

use crate::error::Error;
use crate::Result;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "gantry", version, about, long_about = None)]
pub struct Cli {
    /// HTTP listen address
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen_addr: SocketAddr,

    /// Path to the YAML cluster registry file
    #[arg(long, env = "GANTRY_REGISTRY_FILE", default_value = "clusters.yaml")]
    pub registry_file: PathBuf,

    /// Application key used to sign terminal session tokens
    #[arg(long, env = "GANTRY_APP_KEY")]
    pub app_key: String,

    /// Path to the RSA private key (PEM) for signing login JWTs
    #[arg(long, env = "GANTRY_RSA_PRIVATE_KEY")]
    pub rsa_private_key: PathBuf,

    /// Path to the RSA public key (PEM) for verifying login JWTs
    #[arg(long, env = "GANTRY_RSA_PUBLIC_KEY")]
    pub rsa_public_key: PathBuf,

    /// Login token lifetime in seconds
    #[arg(long, default_value = "86400")]
    pub token_lifetime_secs: i64,

    /// Seconds between reconciler passes
    #[arg(long, default_value_t = crate::DEFAULT_RECONCILE_PERIOD_SECS)]
    pub reconcile_period_secs: u64,
}

/// Resolved application configuration, shared across all handlers
pub struct AppConfig {
    /// App key signing terminal session tokens
    pub app_key: String,
    /// JWT signing key
    pub jwt_encoding_key: EncodingKey,
    /// JWT verification key
    pub jwt_decoding_key: DecodingKey,
    /// Login token lifetime
    pub token_lifetime: Duration,
    /// Interval between reconciler passes
    pub reconcile_period: Duration,
}

impl AppConfig {
    /// Build the configuration from parsed CLI arguments, reading key
    /// material from disk
    pub fn from_cli(cli: &Cli) -> Result<Arc<Self>> {
        let private_pem = std::fs::read(&cli.rsa_private_key).map_err(|e| {
            Error::internal(format!(
                "read RSA private key {}: {e}",
                cli.rsa_private_key.display()
            ))
        })?;
        let public_pem = std::fs::read(&cli.rsa_public_key).map_err(|e| {
            Error::internal(format!(
                "read RSA public key {}: {e}",
                cli.rsa_public_key.display()
            ))
        })?;

        let jwt_encoding_key = EncodingKey::from_rsa_pem(&private_pem)
            .map_err(|e| Error::internal(format!("invalid RSA private key: {e}")))?;
        let jwt_decoding_key = DecodingKey::from_rsa_pem(&public_pem)
            .map_err(|e| Error::internal(format!("invalid RSA public key: {e}")))?;

        Ok(Arc::new(Self {
            app_key: cli.app_key.clone(),
            jwt_encoding_key,
            jwt_decoding_key,
            token_lifetime: Duration::from_secs(cli.token_lifetime_secs.max(0) as u64),
            reconcile_period: Duration::from_secs(cli.reconcile_period_secs),
        }))
    }

    /// Construct a configuration from in-memory key material, for tests and
    /// embedding
    pub fn from_parts(
        app_key: impl Into<String>,
        private_pem: &[u8],
        public_pem: &[u8],
        token_lifetime: Duration,
    ) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            app_key: app_key.into(),
            jwt_encoding_key: EncodingKey::from_rsa_pem(private_pem)
                .map_err(|e| Error::internal(format!("invalid RSA private key: {e}")))?,
            jwt_decoding_key: DecodingKey::from_rsa_pem(public_pem)
                .map_err(|e| Error::internal(format!("invalid RSA public key: {e}")))?,
            token_lifetime,
            reconcile_period: Duration::from_secs(crate::DEFAULT_RECONCILE_PERIOD_SECS),
        }))
    }
}
