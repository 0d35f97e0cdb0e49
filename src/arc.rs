//! Arc Credential Files
//!
//! Read-only view of the Arc client JSON (`arc.json`) for diagnostics. The
//! bridge never interprets this file; it is handed to the native module as
//! text. This module only backs `soratun inspect`.

use std::fmt;
use std::net::IpAddr;

use serde::Deserialize;
use thiserror::Error;

/// Port used when the server endpoint omits one.
pub const DEFAULT_SERVER_PORT: u16 = 11010;

/// Errors reading a credential file.
#[derive(Debug, Error)]
pub enum ArcError {
    #[error("Failed to parse Arc config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Arc config has no arcSessionStatus")]
    MissingSession,

    #[error("Invalid server endpoint '{0}'")]
    InvalidEndpoint(String),
}

/// Arc client configuration as written by the Arc bootstrap tools.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcConfig {
    /// WireGuard private key (base64)
    pub private_key: String,

    /// Session established with the Arc server
    #[serde(rename = "arcSessionStatus")]
    pub session: Option<ArcSession>,

    /// Native module log level: 0 silent, 1 error, 2 verbose
    #[serde(default)]
    pub log_level: u8,
}

/// Connection details received from the Arc server.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcSession {
    /// Server WireGuard public key (base64)
    pub arc_server_peer_public_key: String,

    /// Server UDP endpoint, "host" or "host:port"
    pub arc_server_endpoint: String,

    /// CIDRs routed through the tunnel
    #[serde(default, rename = "arcAllowedIPs")]
    pub arc_allowed_ips: Vec<String>,

    /// Tunnel address of this client
    #[serde(default)]
    pub arc_client_peer_ip_address: Option<IpAddr>,
}

impl ArcConfig {
    /// Parse credential JSON
    pub fn parse(json: &str) -> Result<Self, ArcError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Session details, required for any tunnel
    pub fn session(&self) -> Result<&ArcSession, ArcError> {
        self.session.as_ref().ok_or(ArcError::MissingSession)
    }

    /// WireGuard-style summary with the private key masked
    pub fn summary(&self) -> Result<ArcSummary<'_>, ArcError> {
        let session = self.session()?;
        let (host, port) = split_endpoint(&session.arc_server_endpoint)?;
        Ok(ArcSummary {
            session,
            host,
            port,
        })
    }
}

/// Printable summary of an [`ArcConfig`].
pub struct ArcSummary<'a> {
    session: &'a ArcSession,
    host: &'a str,
    port: u16,
}

impl ArcSummary<'_> {
    /// Server endpoint as host and port
    pub fn endpoint(&self) -> (&str, u16) {
        (self.host, self.port)
    }
}

impl fmt::Display for ArcSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let address = self
            .session
            .arc_client_peer_ip_address
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "<unassigned>".to_string());
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.to_string()
        };

        writeln!(f, "[Interface]")?;
        writeln!(f, "Address = {}/32", address)?;
        writeln!(f, "PrivateKey = <secret>")?;
        writeln!(f)?;
        writeln!(f, "[Peer]")?;
        writeln!(f, "PublicKey = {}", self.session.arc_server_peer_public_key)?;
        writeln!(f, "AllowedIPs = {}", self.session.arc_allowed_ips.join(", "))?;
        writeln!(f, "Endpoint = {}:{}", host, self.port)
    }
}

/// Split "host", "host:port", "[v6]" or "[v6]:port"
fn split_endpoint(endpoint: &str) -> Result<(&str, u16), ArcError> {
    let invalid = || ArcError::InvalidEndpoint(endpoint.to_string());

    if let Some(rest) = endpoint.strip_prefix('[') {
        let (host, after) = rest.split_once(']').ok_or_else(invalid)?;
        return match after.strip_prefix(':') {
            Some(port) => Ok((host, port.parse().map_err(|_| invalid())?)),
            None if after.is_empty() => Ok((host, DEFAULT_SERVER_PORT)),
            None => Err(invalid()),
        };
    }

    // A bare IPv6 address has several colons and no port
    if endpoint.matches(':').count() > 1 {
        return Ok((endpoint, DEFAULT_SERVER_PORT));
    }

    match endpoint.split_once(':') {
        Some((host, port)) if !host.is_empty() => Ok((host, port.parse().map_err(|_| invalid())?)),
        Some(_) => Err(invalid()),
        None if endpoint.is_empty() => Err(invalid()),
        None => Ok((endpoint, DEFAULT_SERVER_PORT)),
    }
}
