//! Postgres connections, with TLS when the connection string asks for it.

use std::sync::Arc;

use rustls::ClientConfig;
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::{Client, Socket};
use tokio_postgres_rustls_improved::MakeRustlsConnect;
use tracing::{debug, error};

use crate::error::{StoreError, StoreResult};

/// Transport security requested through `sslmode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    Disabled,
    Required,
}

impl TlsMode {
    pub fn from_connection_string(connection_string: &str) -> Self {
        let requires = ["sslmode=require", "sslmode=verify-ca", "sslmode=verify-full"]
            .iter()
            .any(|mode| connection_string.contains(mode));
        if requires {
            TlsMode::Required
        } else {
            TlsMode::Disabled
        }
    }
}

/// Connect to Postgres and drive the connection on a background task.
pub async fn connect(connection_string: &str) -> StoreResult<Client> {
    let mode = TlsMode::from_connection_string(connection_string);
    debug!(?mode, "Connecting to Postgres");

    match mode {
        TlsMode::Required => {
            let config =
                ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
                    .with_safe_default_protocol_versions()
                    .map_err(|e| StoreError::Connection(format!("TLS config error: {}", e)))?
                    .with_root_certificates(root_certs())
                    .with_no_client_auth();
            spawn_connection(connection_string, MakeRustlsConnect::new(config)).await
        }
        TlsMode::Disabled => spawn_connection(connection_string, tokio_postgres::NoTls).await,
    }
}

async fn spawn_connection<T>(connection_string: &str, tls: T) -> StoreResult<Client>
where
    T: MakeTlsConnect<Socket>,
    T::Stream: Send + 'static,
{
    let (client, connection) = tokio_postgres::connect(connection_string, tls)
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!(error = %e, "Postgres connection error");
        }
    });

    Ok(client)
}

fn root_certs() -> rustls::RootCertStore {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    roots
}
