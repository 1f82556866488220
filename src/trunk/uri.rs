//! SIP URI parsing, enough to reach an endpoint.

use std::fmt;

use thiserror::Error;

pub const DEFAULT_SIP_PORT: u16 = 5060;
pub const DEFAULT_SIPS_PORT: u16 = 5061;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UriError {
    #[error("'{0}' is not a sip: or sips: URI")]
    Scheme(String),

    #[error("missing host in '{0}'")]
    Host(String),

    #[error("invalid port in '{0}'")]
    Port(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Sip,
    Sips,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
    Tls,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Udp => "UDP",
            Transport::Tcp => "TCP",
            Transport::Tls => "TLS",
        }
    }
}

/// `sip:[user@]host[:port][;param[=value]]*`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipUri {
    pub scheme: Scheme,
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub params: Vec<(String, Option<String>)>,
}

impl SipUri {
    pub fn parse(input: &str) -> Result<Self, UriError> {
        let trimmed = input.trim().trim_start_matches('<').trim_end_matches('>');
        let lower = trimmed.to_ascii_lowercase();
        let (scheme, rest) = if lower.starts_with("sips:") {
            (Scheme::Sips, &trimmed[5..])
        } else if lower.starts_with("sip:") {
            (Scheme::Sip, &trimmed[4..])
        } else {
            return Err(UriError::Scheme(input.to_string()));
        };

        // Headers after '?' do not affect reachability.
        let rest = rest.split('?').next().unwrap_or_default();
        let mut parts = rest.split(';');
        let authority = parts.next().unwrap_or_default();
        let params = parts
            .filter(|p| !p.is_empty())
            .map(|p| match p.split_once('=') {
                Some((k, v)) => (k.to_ascii_lowercase(), Some(v.to_string())),
                None => (p.to_ascii_lowercase(), None),
            })
            .collect();

        let (user, hostport) = match authority.rsplit_once('@') {
            Some((user, hostport)) => (Some(user.to_string()), hostport),
            None => (None, authority),
        };

        let (host, port) = split_host_port(hostport).ok_or_else(|| UriError::Port(input.to_string()))?;
        if host.is_empty() {
            return Err(UriError::Host(input.to_string()));
        }

        Ok(Self {
            scheme,
            user,
            host: host.to_string(),
            port,
            params,
        })
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .and_then(|(_, v)| v.as_deref())
    }

    /// Transport from the `transport` parameter, TLS for `sips:`, else UDP.
    pub fn transport(&self) -> Transport {
        match self.param("transport").map(str::to_ascii_lowercase).as_deref() {
            Some("tcp") => Transport::Tcp,
            Some("tls") => Transport::Tls,
            Some(_) => Transport::Udp,
            None if self.scheme == Scheme::Sips => Transport::Tls,
            None => Transport::Udp,
        }
    }

    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(match self.transport() {
            Transport::Tls => DEFAULT_SIPS_PORT,
            _ => DEFAULT_SIP_PORT,
        })
    }

    /// `host:port` suitable for socket address resolution.
    pub fn socket_target(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.effective_port())
        } else {
            format!("{}:{}", self.host, self.effective_port())
        }
    }
}

/// Split `host[:port]`, `[v6]` or `[v6]:port`. `None` on a bad port.
fn split_host_port(hostport: &str) -> Option<(&str, Option<u16>)> {
    if let Some(rest) = hostport.strip_prefix('[') {
        let (host, after) = rest.split_once(']')?;
        return match after.strip_prefix(':') {
            Some(port) => Some((host, Some(port.parse().ok()?))),
            None if after.is_empty() => Some((host, None)),
            None => None,
        };
    }
    match hostport.split_once(':') {
        Some((host, port)) => Some((host, Some(port.parse().ok()?))),
        None => Some((hostport, None)),
    }
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scheme = match self.scheme {
            Scheme::Sip => "sip",
            Scheme::Sips => "sips",
        };
        write!(f, "{}:", scheme)?;
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        if self.host.contains(':') {
            write!(f, "[{}]", self.host)?;
        } else {
            write!(f, "{}", self.host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        for (k, v) in &self.params {
            match v {
                Some(v) => write!(f, ";{}={}", k, v)?,
                None => write!(f, ";{}", k)?,
            }
        }
        Ok(())
    }
}
