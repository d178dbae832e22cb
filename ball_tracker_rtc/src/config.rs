use anyhow::Context;

pub const DEFAULT_SIGNALING_ADDR: &str = "127.0.0.1:9000";

/// Network settings for one peer. Read from the environment like the rest of
/// the session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Where the server listens for, and the client dials, the signaling socket.
    pub signaling_addr: String,
    pub stun_url: Option<String>,
    /// Public address to advertise as a host candidate when behind 1:1 NAT.
    pub nat_public_ip: Option<String>,
    /// Restrict ICE to a UDP port range.
    pub udp_port_start: Option<u16>,
    pub udp_port_end: Option<u16>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            signaling_addr: DEFAULT_SIGNALING_ADDR.to_string(),
            stun_url: None,
            nat_public_ip: None,
            udp_port_start: None,
            udp_port_end: None,
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut cfg = Self::default();
        if let Some(addr) = non_empty_var("BT_SIGNALING_ADDR") {
            cfg.signaling_addr = addr;
        }
        cfg.stun_url = non_empty_var("BT_STUN_URL");
        cfg.nat_public_ip = non_empty_var("BT_NAT_IP");
        if let Some(range) = non_empty_var("BT_ICE_PORT_RANGE") {
            let (start, end) = parse_port_range(&range)?;
            cfg.udp_port_start = Some(start);
            cfg.udp_port_end = Some(end);
        }
        Ok(cfg)
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parses `start-end`.
pub fn parse_port_range(range: &str) -> anyhow::Result<(u16, u16)> {
    let (start, end) = range
        .split_once('-')
        .with_context(|| format!("port range {range:?} is not of the form start-end"))?;
    let start: u16 = start.trim().parse().with_context(|| format!("bad start port in {range:?}"))?;
    let end: u16 = end.trim().parse().with_context(|| format!("bad end port in {range:?}"))?;
    anyhow::ensure!(start <= end, "port range {range:?} is reversed");
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_range_parsing() {
        assert_eq!(parse_port_range("50000-50100").unwrap(), (50000, 50100));
        assert_eq!(parse_port_range(" 1 - 2 ").unwrap(), (1, 2));
        assert!(parse_port_range("50100-50000").is_err());
        assert!(parse_port_range("50000").is_err());
        assert!(parse_port_range("a-b").is_err());
    }
}
