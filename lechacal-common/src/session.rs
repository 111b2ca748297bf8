use std::time::Duration;

use rumqttc::{AsyncClient, EventLoop, MqttOptions, Transport};

use crate::config::MqttConfig;
use crate::error::{Error, Result};

const MQTT_PORT: u16 = 1883;
const MQTTS_PORT: u16 = 8883;

/// Broker address extracted from an MQTT URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerAddress {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// Parse a broker URL such as `mqtt://localhost:1883`.
///
/// Accepted schemes are `mqtt`/`tcp` (plain, default port 1883) and
/// `mqtts`/`ssl` (TLS, default port 8883). A trailing `/` is ignored.
///
/// # Example
/// ```
/// use lechacal_common::session::parse_broker_url;
///
/// let addr = parse_broker_url("mqtt://broker.lan").unwrap();
/// assert_eq!(addr.host, "broker.lan");
/// assert_eq!(addr.port, 1883);
/// assert!(!addr.tls);
/// ```
pub fn parse_broker_url(url: &str) -> Result<BrokerAddress> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| Error::broker_url(url, "missing scheme (expected mqtt:// or mqtts://)"))?;

    let (tls, default_port) = match scheme.to_ascii_lowercase().as_str() {
        "mqtt" | "tcp" => (false, MQTT_PORT),
        "mqtts" | "ssl" => (true, MQTTS_PORT),
        other => {
            return Err(Error::broker_url(
                url,
                format!("unsupported scheme '{}'", other),
            ));
        }
    };

    let authority = rest.trim_end_matches('/');
    if authority.contains('/') || authority.contains('@') {
        return Err(Error::broker_url(
            url,
            "paths and inline credentials are not supported",
        ));
    }

    let (host, port) = split_host_port(authority)
        .map_err(|reason| Error::broker_url(url, reason))?;

    if host.is_empty() {
        return Err(Error::broker_url(url, "missing host"));
    }

    Ok(BrokerAddress {
        host: host.to_string(),
        port: port.unwrap_or(default_port),
        tls,
    })
}

fn split_host_port(authority: &str) -> std::result::Result<(&str, Option<u16>), String> {
    // Bracketed IPv6 literal: [::1]:1883
    if let Some(stripped) = authority.strip_prefix('[') {
        let (host, tail) = stripped
            .split_once(']')
            .ok_or_else(|| "unterminated IPv6 literal".to_string())?;
        return match tail.strip_prefix(':') {
            Some(port) => Ok((host, Some(parse_port(port)?))),
            None if tail.is_empty() => Ok((host, None)),
            None => Err(format!("unexpected characters after host: '{}'", tail)),
        };
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => Ok((host, Some(parse_port(port)?))),
        None => Ok((authority, None)),
    }
}

fn parse_port(port: &str) -> std::result::Result<u16, String> {
    port.parse::<u16>()
        .map_err(|_| format!("invalid port '{}'", port))
}

/// Build an MQTT client and its event loop from the provided configuration.
///
/// No network traffic happens here; the connection is established the first
/// time the returned [`EventLoop`] is polled.
pub fn connect(config: &MqttConfig) -> Result<(AsyncClient, EventLoop)> {
    let address = parse_broker_url(&config.url)?;

    let mut options = MqttOptions::new(&config.client_id, &address.host, address.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)));

    match (&config.username, &config.password) {
        (Some(username), password) => {
            options.set_credentials(username, password.as_deref().unwrap_or(""));
        }
        (None, Some(_)) => {
            tracing::warn!("MQTT password configured without a username, ignoring it");
        }
        (None, None) => {}
    }

    if address.tls {
        options.set_transport(Transport::tls_with_default_config());
    }

    tracing::info!(
        host = %address.host,
        port = address.port,
        tls = address.tls,
        client_id = %config.client_id,
        "Configured MQTT client"
    );

    Ok(AsyncClient::new(options, config.request_capacity))
}
