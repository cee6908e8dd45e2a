//! Module options to driver connection parameters.

use crate::models::{ConnParams, ConnectionConfig};
use std::net::IpAddr;

/// Map connection options to driver parameters.
///
/// Only non-empty options are copied, so an absent key means "driver
/// default". A unix socket replaces a missing or loopback host; an explicit
/// remote host always wins and the socket is ignored.
pub fn map_connection_params(config: &ConnectionConfig) -> ConnParams {
    let mut params = ConnParams {
        host: non_empty(&config.login_host),
        port: config.login_port,
        user: non_empty(&config.login_user),
        password: non_empty(&config.login_password),
        dbname: non_empty(&config.login_db),
        sslmode: config.ssl_mode,
        sslrootcert: non_empty(&config.ssl_root_cert),
        sslcert: non_empty(&config.ssl_cert),
        sslkey: non_empty(&config.ssl_key),
    };

    if let Some(socket) = non_empty(&config.login_unix_socket) {
        let use_socket = params.host.as_deref().map_or(true, is_loopback);
        if use_socket {
            tracing::debug!(socket = %socket, "Using unix socket instead of loopback host");
            params.host = Some(socket);
        } else {
            tracing::debug!(host = ?params.host, "Explicit host set, ignoring login_unix_socket");
        }
    }

    params
}

/// Whether `host` names the local machine.
pub fn is_loopback(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SslMode;

    fn config() -> ConnectionConfig {
        ConnectionConfig::new()
    }

    #[test]
    fn test_defaults_map_to_driver_names() {
        let params = map_connection_params(&config());
        assert_eq!(params.host.as_deref(), Some("localhost"));
        assert_eq!(params.port, Some(26257));
        assert_eq!(params.user.as_deref(), Some("root"));
        assert_eq!(params.sslmode, Some(SslMode::Prefer));
        assert_eq!(params.keys(), vec!["host", "port", "user", "sslmode"]);
    }

    #[test]
    fn test_all_options_are_translated() {
        let config = ConnectionConfig {
            login_host: Some("db.example.com".into()),
            login_port: Some(1234),
            login_user: Some("app".into()),
            login_password: Some("pw".into()),
            login_db: Some("movr".into()),
            login_unix_socket: None,
            ssl_mode: Some(SslMode::VerifyFull),
            ssl_root_cert: Some("/certs/ca.crt".into()),
            ssl_cert: Some("/certs/client.app.crt".into()),
            ssl_key: Some("/certs/client.app.key".into()),
        };
        let params = map_connection_params(&config);
        assert_eq!(
            params,
            ConnParams {
                host: Some("db.example.com".into()),
                port: Some(1234),
                user: Some("app".into()),
                password: Some("pw".into()),
                dbname: Some("movr".into()),
                sslmode: Some(SslMode::VerifyFull),
                sslrootcert: Some("/certs/ca.crt".into()),
                sslcert: Some("/certs/client.app.crt".into()),
                sslkey: Some("/certs/client.app.key".into()),
            }
        );
    }

    #[test]
    fn test_empty_and_null_values_are_omitted() {
        let config = ConnectionConfig {
            login_host: Some(String::new()),
            login_password: Some(String::new()),
            login_db: None,
            ssl_root_cert: Some(String::new()),
            ..ConnectionConfig::empty()
        };
        let params = map_connection_params(&config);
        assert!(params.keys().is_empty());
        assert_eq!(params, ConnParams::default());
    }

    #[test]
    fn test_socket_replaces_missing_or_loopback_host() {
        for host in [None, Some(""), Some("localhost"), Some("127.0.0.1"), Some("::1")] {
            let config = ConnectionConfig {
                login_host: host.map(String::from),
                login_unix_socket: Some("/var/run/cockroach".into()),
                ..config()
            };
            let params = map_connection_params(&config);
            assert_eq!(params.host.as_deref(), Some("/var/run/cockroach"), "host = {host:?}");
        }
    }

    #[test]
    fn test_explicit_host_wins_over_socket() {
        let config = ConnectionConfig {
            login_host: Some("192.168.0.1".into()),
            login_unix_socket: Some("/var/run/cockroach".into()),
            ..config()
        };
        assert_eq!(map_connection_params(&config).host.as_deref(), Some("192.168.0.1"));
    }

    #[test]
    fn test_empty_socket_is_ignored() {
        let config = ConnectionConfig { login_unix_socket: Some(String::new()), ..config() };
        assert_eq!(map_connection_params(&config).host.as_deref(), Some("localhost"));
    }

    #[test]
    fn test_loopback_detection() {
        assert!(is_loopback("localhost"));
        assert!(is_loopback("LOCALHOST"));
        assert!(is_loopback("127.0.0.1"));
        assert!(is_loopback("127.1.2.3"));
        assert!(is_loopback("[::1]"));
        assert!(!is_loopback("10.0.0.1"));
        assert!(!is_loopback("db.internal"));
    }
}
