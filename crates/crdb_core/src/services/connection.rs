//! Single database connection per invocation.
//!
//! Provides:
//! - libpq-style sslmode handling on top of native-tls (feature `tls`)
//! - Hard-fail vs. soft-fail connection policy
//! - Implicit transaction handling when autocommit is off
//! - Best-effort close on every exit path

use crate::error::CrdbError;
use crate::models::{ConnParams, RowShape, SslMode};
use crate::services::cursor::PgCursor;
use crate::state::ModuleState;

use tokio::task::JoinHandle;
use tokio_postgres::tls::MakeTlsConnect;
use tokio_postgres::{Client, NoTls, Socket};

/// Application name reported to the server.
const APPLICATION_NAME: &str = "crdb";

/// How to open a connection and what to do when that fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Commit every statement immediately
    pub autocommit: bool,
    /// Abort on connection failure instead of warning
    pub fail_on_connect_error: bool,
    /// Shape of fetched rows
    pub row_shape: RowShape,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self { autocommit: false, fail_on_connect_error: true, row_shape: RowShape::Tuple }
    }
}

impl ConnectOptions {
    pub fn autocommit(mut self, autocommit: bool) -> Self {
        self.autocommit = autocommit;
        self
    }

    pub fn fail_on_connect_error(mut self, fail: bool) -> Self {
        self.fail_on_connect_error = fail;
        self
    }

    pub fn row_shape(mut self, shape: RowShape) -> Self {
        self.row_shape = shape;
        self
    }
}

/// A live connection owned by one invocation.
pub struct ConnectionHandle {
    client: Client,
    task: JoinHandle<()>,
    row_shape: RowShape,
    autocommit: bool,
    in_transaction: bool,
}

impl ConnectionHandle {
    /// Open a cursor for running statements.
    pub fn cursor(&mut self) -> PgCursor<'_> {
        PgCursor::new(&self.client, self.row_shape, self.autocommit, &mut self.in_transaction)
    }

    /// Commit the implicit transaction, if one is open.
    pub async fn commit(&mut self) -> Result<(), CrdbError> {
        if self.in_transaction {
            tracing::debug!("Committing implicit transaction");
            self.client.batch_execute("COMMIT").await?;
            self.in_transaction = false;
        }
        Ok(())
    }

    /// Roll back the implicit transaction, if one is open.
    pub async fn rollback(&mut self) -> Result<(), CrdbError> {
        if self.in_transaction {
            tracing::debug!("Rolling back implicit transaction");
            self.in_transaction = false;
            self.client.batch_execute("ROLLBACK").await?;
        }
        Ok(())
    }

    /// Close the connection. Never fails; problems are logged.
    ///
    /// An open implicit transaction is rolled back first.
    pub async fn close(mut self) {
        if let Err(e) = self.rollback().await {
            tracing::warn!(error = %e, "Rollback on close failed");
        }

        let ConnectionHandle { client, task, .. } = self;
        drop(client);
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Connection task did not shut down cleanly");
        }
        tracing::debug!("Connection closed");
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("row_shape", &self.row_shape)
            .field("autocommit", &self.autocommit)
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}

/// Open a connection.
///
/// Returns `Ok(None)` when the connection failed and
/// `options.fail_on_connect_error` is off; a warning is recorded on `state`.
/// A missing TLS implementation is always fatal.
pub async fn connect(
    params: &ConnParams,
    options: ConnectOptions,
    state: &ModuleState,
) -> Result<Option<ConnectionHandle>, CrdbError> {
    tracing::debug!(
        params = ?params,
        autocommit = options.autocommit,
        row_shape = ?options.row_shape,
        "Connecting"
    );

    match open(params).await {
        Ok((client, task)) => {
            tracing::info!(
                host = params.host.as_deref().unwrap_or("localhost"),
                dbname = params.dbname.as_deref().unwrap_or(""),
                "Connected"
            );
            Ok(Some(ConnectionHandle {
                client,
                task,
                row_shape: options.row_shape,
                autocommit: options.autocommit,
                in_transaction: false,
            }))
        }
        Err(err) if err.is_connect_failure() && !options.fail_on_connect_error => {
            state.warn(format!("CockroachDB server is unavailable: {}", err.message()));
            Ok(None)
        }
        Err(err) => {
            tracing::warn!(error = %err, "Connection failed");
            Err(err)
        }
    }
}

/// Build the driver configuration from mapped parameters.
pub fn build_pg_config(params: &ConnParams) -> tokio_postgres::Config {
    let mut config = tokio_postgres::Config::new();
    config.host(params.host.as_deref().unwrap_or("localhost"));
    if let Some(port) = params.port {
        config.port(port);
    }
    if let Some(user) = params.user.as_deref() {
        config.user(user);
    }
    if let Some(password) = params.password.as_deref() {
        config.password(password);
    }
    if let Some(dbname) = params.dbname.as_deref() {
        config.dbname(dbname);
    }
    config.application_name(APPLICATION_NAME);
    config.ssl_mode(driver_ssl_mode(params.sslmode.unwrap_or_default()));
    config
}

/// The driver only negotiates; certificate checks live in the TLS connector.
fn driver_ssl_mode(mode: SslMode) -> tokio_postgres::config::SslMode {
    match mode {
        SslMode::Disable => tokio_postgres::config::SslMode::Disable,
        SslMode::Allow | SslMode::Prefer => tokio_postgres::config::SslMode::Prefer,
        SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => {
            tokio_postgres::config::SslMode::Require
        }
    }
}

async fn open(params: &ConnParams) -> Result<(Client, JoinHandle<()>), CrdbError> {
    let config = build_pg_config(params);
    let mode = params.sslmode.unwrap_or_default();

    if mode == SslMode::Disable {
        return spawn_connection(&config, NoTls).await;
    }
    open_tls(params, &config, mode).await
}

#[cfg(feature = "tls")]
async fn open_tls(
    params: &ConnParams,
    config: &tokio_postgres::Config,
    mode: SslMode,
) -> Result<(Client, JoinHandle<()>), CrdbError> {
    let tls = tls::make_connector(params, mode)?;
    spawn_connection(config, tls).await
}

#[cfg(not(feature = "tls"))]
async fn open_tls(
    params: &ConnParams,
    config: &tokio_postgres::Config,
    mode: SslMode,
) -> Result<(Client, JoinHandle<()>), CrdbError> {
    if mode.requires_tls() || params.has_certificates() {
        return Err(CrdbError::missing_dependency(
            "native-tls",
            format!("ssl_mode '{mode}' needs TLS support, which this build does not include"),
        ));
    }
    spawn_connection(config, NoTls).await
}

async fn spawn_connection<T>(
    config: &tokio_postgres::Config,
    tls: T,
) -> Result<(Client, JoinHandle<()>), CrdbError>
where
    T: MakeTlsConnect<Socket>,
    T::Stream: Send + 'static,
{
    let (client, connection) = config.connect(tls).await.map_err(connect_error)?;
    let task = tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::warn!(error = %e, "Connection terminated with error");
        }
    });
    Ok((client, task))
}

/// Any error while opening counts as a connection failure.
fn connect_error(err: tokio_postgres::Error) -> CrdbError {
    match CrdbError::from(err) {
        CrdbError::Database { message, .. } => CrdbError::connection(message),
        other => other,
    }
}

#[cfg(feature = "tls")]
mod tls {
    use super::*;
    use native_tls::{Certificate, Identity, TlsConnector};
    use postgres_native_tls::MakeTlsConnector;

    /// Build a connector that checks certificates the way libpq's sslmode does.
    ///
    /// `require` with a root certificate behaves like `verify-ca`.
    pub(super) fn make_connector(
        params: &ConnParams,
        mode: SslMode,
    ) -> Result<MakeTlsConnector, CrdbError> {
        let mut builder = TlsConnector::builder();

        let verify_chain = match mode {
            SslMode::VerifyCa | SslMode::VerifyFull => true,
            SslMode::Require => params.sslrootcert.is_some(),
            SslMode::Disable | SslMode::Allow | SslMode::Prefer => false,
        };
        if !verify_chain {
            builder.danger_accept_invalid_certs(true);
        }
        if mode != SslMode::VerifyFull {
            builder.danger_accept_invalid_hostnames(true);
        }

        if let Some(path) = params.sslrootcert.as_deref() {
            let pem = read_pem(path, "CA certificate")?;
            let cert = Certificate::from_pem(&pem).map_err(|e| {
                CrdbError::tls_with_source(format!("Invalid CA certificate {path}"), e)
            })?;
            builder.add_root_certificate(cert);
        }

        match (params.sslcert.as_deref(), params.sslkey.as_deref()) {
            (Some(cert_path), Some(key_path)) => {
                let cert = read_pem(cert_path, "client certificate")?;
                let key = read_pem(key_path, "client key")?;
                let identity = Identity::from_pkcs8(&cert, &key).map_err(|e| {
                    CrdbError::tls_with_source(
                        format!("Invalid client certificate/key pair {cert_path}, {key_path}"),
                        e,
                    )
                })?;
                builder.identity(identity);
            }
            (None, None) => {}
            _ => return Err(CrdbError::tls("ssl_cert and ssl_key must be given together")),
        }

        let connector = builder
            .build()
            .map_err(|e| CrdbError::tls_with_source("Failed to create TLS connector", e))?;
        Ok(MakeTlsConnector::new(connector))
    }

    fn read_pem(path: &str, what: &str) -> Result<Vec<u8>, CrdbError> {
        std::fs::read(path)
            .map_err(|e| CrdbError::tls_with_source(format!("Failed to read {what} {path}"), e))
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_pg_config() {
        let params = ConnParams {
            host: Some("db.example.com".into()),
            port: Some(26257),
            user: Some("app".into()),
            password: Some("pw".into()),
            dbname: Some("movr".into()),
            sslmode: Some(SslMode::VerifyCa),
            ..Default::default()
        };
        let config = build_pg_config(&params);
        assert_eq!(config.get_ports(), &[26257]);
        assert_eq!(config.get_user(), Some("app"));
        assert_eq!(config.get_dbname(), Some("movr"));
        assert_eq!(config.get_password(), Some(&b"pw"[..]));
        assert_eq!(config.get_application_name(), Some("crdb"));
        assert_eq!(config.get_ssl_mode(), tokio_postgres::config::SslMode::Require);
    }

    #[test]
    fn test_driver_ssl_modes() {
        use tokio_postgres::config::SslMode as Driver;
        assert_eq!(driver_ssl_mode(SslMode::Disable), Driver::Disable);
        assert_eq!(driver_ssl_mode(SslMode::Allow), Driver::Prefer);
        assert_eq!(driver_ssl_mode(SslMode::Prefer), Driver::Prefer);
        assert_eq!(driver_ssl_mode(SslMode::VerifyFull), Driver::Require);
    }

    #[test]
    fn test_connect_options_builder() {
        let options = ConnectOptions::default()
            .autocommit(true)
            .fail_on_connect_error(false)
            .row_shape(RowShape::Keyed);
        assert!(options.autocommit);
        assert!(!options.fail_on_connect_error);
        assert_eq!(options.row_shape, RowShape::Keyed);
    }

    fn unreachable_params() -> ConnParams {
        ConnParams {
            host: Some("127.0.0.1".into()),
            port: Some(1),
            user: Some("root".into()),
            sslmode: Some(SslMode::Disable),
            ..Default::default()
        }
    }

    #[test]
    fn test_soft_fail_warns_and_returns_none() {
        let state = ModuleState::new(false).unwrap();
        let options = ConnectOptions::default().fail_on_connect_error(false);
        let handle = state.block_on(connect(&unreachable_params(), options, &state)).unwrap();
        assert!(handle.is_none());
        let warnings = state.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("CockroachDB server is unavailable: "));
    }

    #[test]
    fn test_hard_fail_returns_error() {
        let state = ModuleState::new(false).unwrap();
        let err = state
            .block_on(connect(&unreachable_params(), ConnectOptions::default(), &state))
            .unwrap_err();
        assert!(err.to_string().starts_with("unable to connect to database: "));
        assert!(state.warnings().is_empty());
    }
}
