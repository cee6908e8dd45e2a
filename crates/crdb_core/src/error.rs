//! Error types for the crdb modules.
//!
//! Every failure an invocation can hit is a `CrdbError`. Server errors keep
//! their SQLSTATE details; statement-level failures keep the statement text.

use thiserror::Error;

/// Main error type for crdb operations.
#[derive(Debug, Error)]
pub enum CrdbError {
    /// A required client library or feature is not available in this build.
    #[error("Missing required library: {library}. {message}")]
    MissingDependency {
        /// Name of the missing library.
        library: String,
        /// Human-readable error message.
        message: String,
    },

    /// Database connection failed.
    #[error("unable to connect to database: {message}")]
    Connection {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Authentication failed.
    #[error("unable to connect to database: {message}")]
    Authentication {
        /// Human-readable error message.
        message: String,
        /// Actionable hint for the user.
        hint: Option<String>,
    },

    /// TLS setup or negotiation error.
    #[error("TLS error: {message}")]
    Tls {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Error reported by the server with SQLSTATE details.
    #[error("{message}")]
    Database {
        /// Server error message.
        message: String,
        /// Additional detail from the server.
        detail: Option<String>,
        /// Server hint.
        hint: Option<String>,
        /// SQLSTATE code (e.g., "42P01").
        code: Option<String>,
    },

    /// A statement could not be executed.
    #[error("Cannot execute query \"{statement}\": {message}")]
    Execution {
        /// The statement text as supplied.
        statement: String,
        /// Underlying cause.
        message: String,
    },

    /// Rows could not be fetched after a successful execution.
    #[error("Cannot fetch rows for query \"{statement}\": {message}")]
    Fetch {
        /// The statement text as supplied.
        statement: String,
        /// Underlying cause.
        message: String,
    },

    /// The executed statement produced no result set.
    ///
    /// Raised by cursors and always absorbed by the query executor.
    #[error("no results to fetch")]
    NoResultsToFetch,

    /// The server version banner could not be parsed.
    #[error("Unable to parse server version \"{raw}\": {message}")]
    VersionParse {
        /// The banner as returned by the server.
        raw: String,
        /// Parse failure message.
        message: String,
    },

    /// A DDL statement issued during reconciliation failed.
    #[error("Cannot execute statement \"{statement}\": {message}")]
    Definition {
        /// The DDL statement text.
        statement: String,
        /// Underlying cause.
        message: String,
    },

    /// Invalid module argument.
    #[error("{message}")]
    InvalidArgument {
        /// Human-readable error message.
        message: String,
    },

    /// Unexpected internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl CrdbError {
    // ========== Constructors ==========

    /// Create a new missing dependency error.
    pub fn missing_dependency(library: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MissingDependency { library: library.into(), message: message.into() }
    }

    /// Create a new connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Create a new TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls { message: message.into(), source: None }
    }

    /// Create a new TLS error with source.
    pub fn tls_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Tls { message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create an execution error for `statement` from any displayable cause.
    pub fn execution(statement: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Execution { statement: statement.into(), message: cause.to_string() }
    }

    /// Create a fetch error for `statement` from any displayable cause.
    pub fn fetch(statement: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Fetch { statement: statement.into(), message: cause.to_string() }
    }

    /// Create a version parse error.
    pub fn version_parse(raw: impl Into<String>, message: impl Into<String>) -> Self {
        Self::VersionParse { raw: raw.into(), message: message.into() }
    }

    /// Create a DDL failure for `statement`.
    pub fn definition(statement: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Definition { statement: statement.into(), message: cause.to_string() }
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    /// Create a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    // ========== Methods ==========

    /// Check if this is the absorbed "no results to fetch" condition.
    pub fn is_no_results(&self) -> bool {
        matches!(self, Self::NoResultsToFetch)
    }

    /// Check if this error came from opening the connection.
    ///
    /// Only these are eligible for the soft-fail connection policy.
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Authentication { .. } | Self::Tls { .. })
    }

    /// The underlying message without the category prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Connection { message, .. }
            | Self::Authentication { message, .. }
            | Self::Tls { message, .. }
            | Self::Database { message, .. }
            | Self::Execution { message, .. }
            | Self::Fetch { message, .. }
            | Self::VersionParse { message, .. }
            | Self::Definition { message, .. }
            | Self::InvalidArgument { message }
            | Self::Internal { message, .. }
            | Self::MissingDependency { message, .. } => message.clone(),
            Self::NoResultsToFetch => self.to_string(),
        }
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::MissingDependency { .. } => "MissingDependency",
            Self::Connection { .. } => "Connection",
            Self::Authentication { .. } => "Authentication",
            Self::Tls { .. } => "TLS",
            Self::Database { .. } => "Database",
            Self::Execution { .. } => "Execution",
            Self::Fetch { .. } => "Fetch",
            Self::NoResultsToFetch => "Fetch",
            Self::VersionParse { .. } => "VersionParse",
            Self::Definition { .. } => "Definition",
            Self::InvalidArgument { .. } => "Argument",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Get actionable hint for the user.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::MissingDependency { .. } => Some("Rebuild crdb with the `tls` feature enabled"),
            Self::Connection { .. } => Some("Check that the CockroachDB node is running"),
            Self::Authentication { hint, .. } => hint.as_deref(),
            Self::Tls { .. } => Some("Verify ssl_mode and certificate paths"),
            Self::Database { hint, .. } => hint.as_deref(),
            Self::Execution { .. } => None,
            Self::Fetch { .. } => None,
            Self::NoResultsToFetch => None,
            Self::VersionParse { .. } => None,
            Self::Definition { .. } => Some("Check that the login user holds the CREATEDB privilege"),
            Self::InvalidArgument { .. } => None,
            Self::Internal { .. } => Some("Please report this issue"),
        }
    }
}

// ========== Error Conversions ==========

/// Convert from tokio_postgres::Error to CrdbError.
impl From<tokio_postgres::Error> for CrdbError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let message = db_err.message().to_string();
            let detail = db_err.detail().map(String::from);
            let hint = db_err.hint().map(String::from);
            let code_str = db_err.code().code();

            return match code_str {
                "28P01" => CrdbError::Authentication {
                    message,
                    hint: Some("Invalid password - check login_password".to_string()),
                },
                _ if code_str.starts_with("28") => CrdbError::Authentication {
                    message,
                    hint: Some("Check login_user and its certificates".to_string()),
                },
                _ if code_str.starts_with("08") => {
                    CrdbError::Connection { message, source: Some(Box::new(err)) }
                }
                _ => CrdbError::Database { message, detail, hint, code: Some(code_str.to_string()) },
            };
        }

        if err.is_closed() {
            return CrdbError::Connection {
                message: "Connection closed".to_string(),
                source: Some(Box::new(err)),
            };
        }

        CrdbError::Connection { message: err.to_string(), source: Some(Box::new(err)) }
    }
}

/// Convert from std::io::Error to CrdbError.
impl From<std::io::Error> for CrdbError {
    fn from(err: std::io::Error) -> Self {
        CrdbError::Internal { message: err.to_string(), source: Some(Box::new(err)) }
    }
}

/// Convert from serde_json::Error to CrdbError.
impl From<serde_json::Error> for CrdbError {
    fn from(err: serde_json::Error) -> Self {
        CrdbError::InvalidArgument { message: format!("invalid JSON: {err}") }
    }
}
