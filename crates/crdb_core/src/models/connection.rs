//! Connection configuration models.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default CockroachDB SQL port.
pub const DEFAULT_PORT: u16 = 26257;

/// Default login user.
pub const DEFAULT_USER: &str = "root";

/// Default login host.
pub const DEFAULT_HOST: &str = "localhost";

/// SSL mode for database connections, as understood by libpq.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    /// No SSL
    Disable,
    /// Use SSL only if the server insists
    Allow,
    /// Use SSL if available (default)
    #[default]
    Prefer,
    /// Require SSL, accept any certificate
    Require,
    /// Require SSL, verify CA
    VerifyCa,
    /// Require SSL, verify CA and hostname
    VerifyFull,
}

impl SslMode {
    /// All accepted modes in their wire spelling.
    pub const CHOICES: [&'static str; 6] =
        ["disable", "allow", "prefer", "require", "verify-ca", "verify-full"];

    /// Convert to the libpq spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disable => "disable",
            Self::Allow => "allow",
            Self::Prefer => "prefer",
            Self::Require => "require",
            Self::VerifyCa => "verify-ca",
            Self::VerifyFull => "verify-full",
        }
    }

    /// Whether this mode refuses to connect without TLS.
    pub fn requires_tls(&self) -> bool {
        matches!(self, Self::Require | Self::VerifyCa | Self::VerifyFull)
    }
}

impl FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "disable" => Ok(Self::Disable),
            "allow" => Ok(Self::Allow),
            "prefer" => Ok(Self::Prefer),
            "require" => Ok(Self::Require),
            "verify-ca" => Ok(Self::VerifyCa),
            "verify-full" => Ok(Self::VerifyFull),
            other => Err(format!(
                "value of ssl_mode must be one of: {}, got: {other}",
                Self::CHOICES.join(", ")
            )),
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How fetched rows are shaped. Chosen once per connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowShape {
    /// Ordered sequence of values
    #[default]
    Tuple,
    /// Column name to value mapping
    #[serde(rename = "dict", alias = "keyed")]
    Keyed,
}

impl RowShape {
    /// Whether rows carry column names.
    pub fn is_keyed(&self) -> bool {
        matches!(self, Self::Keyed)
    }
}

/// Connection options shared by every module.
///
/// Field names match the module argument names. Explicit `null` or empty
/// strings mean "absent"; the mapper drops them.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Server hostname, IP or socket directory
    pub login_host: Option<String>,
    /// Server port
    #[serde(deserialize_with = "deserialize_port")]
    pub login_port: Option<u16>,
    /// Login username
    pub login_user: Option<String>,
    /// Login password
    pub login_password: Option<String>,
    /// Database to connect to
    pub login_db: Option<String>,
    /// Unix socket directory that replaces a loopback host
    pub login_unix_socket: Option<String>,
    /// SSL configuration
    pub ssl_mode: Option<SslMode>,
    /// CA certificate (PEM)
    pub ssl_root_cert: Option<String>,
    /// Client certificate (PEM)
    pub ssl_cert: Option<String>,
    /// Client private key (PEM, PKCS#8)
    pub ssl_key: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            login_host: Some(DEFAULT_HOST.to_string()),
            login_port: Some(DEFAULT_PORT),
            login_user: Some(DEFAULT_USER.to_string()),
            login_password: None,
            login_db: None,
            login_unix_socket: None,
            ssl_mode: Some(SslMode::Prefer),
            ssl_root_cert: None,
            ssl_cert: None,
            ssl_key: None,
        }
    }
}

impl ConnectionConfig {
    /// Create a configuration with only the documented defaults set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration with every option absent.
    pub fn empty() -> Self {
        Self {
            login_host: None,
            login_port: None,
            login_user: None,
            login_password: None,
            login_db: None,
            login_unix_socket: None,
            ssl_mode: None,
            ssl_root_cert: None,
            ssl_cert: None,
            ssl_key: None,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("login_host", &self.login_host)
            .field("login_port", &self.login_port)
            .field("login_user", &self.login_user)
            .field("login_password", &self.login_password.as_ref().map(|_| "********"))
            .field("login_db", &self.login_db)
            .field("login_unix_socket", &self.login_unix_socket)
            .field("ssl_mode", &self.ssl_mode)
            .field("ssl_root_cert", &self.ssl_root_cert)
            .field("ssl_cert", &self.ssl_cert)
            .field("ssl_key", &self.ssl_key)
            .finish()
    }
}

/// Driver connection parameters, named the way libpq names them.
///
/// `None` means "use the driver default".
#[derive(Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dbname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sslmode: Option<SslMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sslrootcert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sslcert: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sslkey: Option<String>,
}

impl ConnParams {
    /// Names of the parameters that are set, in libpq order.
    pub fn keys(&self) -> Vec<&'static str> {
        let mut keys = Vec::new();
        let present = [
            ("host", self.host.is_some()),
            ("port", self.port.is_some()),
            ("user", self.user.is_some()),
            ("password", self.password.is_some()),
            ("dbname", self.dbname.is_some()),
            ("sslmode", self.sslmode.is_some()),
            ("sslrootcert", self.sslrootcert.is_some()),
            ("sslcert", self.sslcert.is_some()),
            ("sslkey", self.sslkey.is_some()),
        ];
        for (key, set) in present {
            if set {
                keys.push(key);
            }
        }
        keys
    }

    /// Whether any client certificate option is set.
    pub fn has_certificates(&self) -> bool {
        self.sslrootcert.is_some() || self.sslcert.is_some() || self.sslkey.is_some()
    }
}

impl fmt::Debug for ConnParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("dbname", &self.dbname)
            .field("sslmode", &self.sslmode)
            .field("sslrootcert", &self.sslrootcert)
            .field("sslcert", &self.sslcert)
            .field("sslkey", &self.sslkey)
            .finish()
    }
}

/// Accept a port as a JSON number, a numeric string, or null/empty.
fn deserialize_port<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u16),
        Text(String),
    }

    match Option::<Port>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Port::Number(port)) => Ok(Some(port)),
        Some(Port::Text(text)) if text.trim().is_empty() => Ok(None),
        Some(Port::Text(text)) => text
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid login_port: {text}"))),
    }
}
