//! CIDR parsing and containment.

use std::net::{IpAddr, SocketAddr};

use ipnet::IpNet;

use super::AddressParseError;

/// Parse a source address, dropping a SIP port if present.
///
/// Accepts `1.2.3.4`, `1.2.3.4:5060`, `2001:db8::1` and `[2001:db8::1]:5060`.
pub fn parse_source(source: &str) -> Result<IpAddr, AddressParseError> {
    let source = source.trim();
    if let Ok(addr) = source.parse::<SocketAddr>() {
        return Ok(addr.ip());
    }
    let bare = source
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(source);
    bare.parse::<IpAddr>()
        .map_err(|_| AddressParseError::InvalidSource(source.to_string()))
}

/// Parse a candidate network.
///
/// The candidate is an `ip` + `range` concatenation such as `10.0.0.0/8`.
/// A port on the address part is dropped (`10.0.0.0:5060/24`) and a bare
/// address is taken as a single host.
pub fn parse_network(candidate: &str) -> Result<IpNet, AddressParseError> {
    let candidate = candidate.trim();
    let invalid = || AddressParseError::InvalidNetwork(candidate.to_string());

    let (addr, prefix_len) = match candidate.rsplit_once('/') {
        Some((addr, len)) => (addr, Some(len.parse::<u8>().map_err(|_| invalid())?)),
        None => (candidate, None),
    };

    let ip = parse_source(addr).map_err(|_| invalid())?;
    match prefix_len {
        Some(len) => IpNet::new(ip, len).map_err(|_| invalid()),
        None => Ok(IpNet::from(ip)),
    }
}

/// Build the candidate network of a whitelist row.
pub fn row_network(ip: &str, range: &str) -> Result<IpNet, AddressParseError> {
    let range = range.trim();
    if range.is_empty() || range.starts_with('/') {
        parse_network(&format!("{}{}", ip.trim(), range))
    } else {
        parse_network(&format!("{}/{}", ip.trim(), range))
    }
}

/// Whether `source`, taken as a single host, lies inside `candidate`.
pub fn cidr_contains(source: &str, candidate: &str) -> Result<bool, AddressParseError> {
    let ip = parse_source(source)?;
    let network = parse_network(candidate)?;
    Ok(network.contains(&ip))
}
