//! SSH destinations.

use std::path::PathBuf;
use std::time::Duration;

use super::{RemoteError, Result};

/// Default `ConnectTimeout` handed to ssh/scp.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Keepalive probe interval; a dead link is noticed after
/// `SERVER_ALIVE_INTERVAL_SECS * SERVER_ALIVE_COUNT_MAX` seconds.
pub const SERVER_ALIVE_INTERVAL_SECS: u64 = 5;
pub const SERVER_ALIVE_COUNT_MAX: u32 = 2;

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_file: Option<PathBuf>,
    /// Extra `-o` values, e.g. `ProxyJump=bastion`.
    pub options: Vec<String>,
    pub connect_timeout: Duration,
}

impl SshTarget {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: None,
            port: None,
            identity_file: None,
            options: Vec::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Parse `[user@]host[:port]`, with `[v6addr]` for IPv6 plus port.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        let invalid = || RemoteError::InvalidTarget(spec.to_string());

        let (user, rest) = match spec.rsplit_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
            Some(_) => return Err(invalid()),
            None => (None, spec),
        };

        let (host, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, tail) = bracketed.split_once(']').ok_or_else(invalid)?;
            let port = match tail {
                "" => None,
                _ => {
                    let port = tail.strip_prefix(':').ok_or_else(invalid)?;
                    Some(parse_port(port).ok_or_else(invalid)?)
                }
            };
            (host, port)
        } else if rest.matches(':').count() == 1 {
            let (host, port) = rest.split_once(':').ok_or_else(invalid)?;
            (host, Some(parse_port(port).ok_or_else(invalid)?))
        } else {
            // Bare IPv6 address or plain host name.
            (rest, None)
        };

        if host.is_empty() || host.chars().any(char::is_whitespace) {
            return Err(invalid());
        }

        Ok(Self {
            user,
            port,
            ..Self::new(host)
        })
    }

    /// `user@host` as ssh expects it.
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }

    /// `user@host` with IPv6 addresses bracketed, as scp expects it.
    pub fn scp_destination(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        match &self.user {
            Some(user) => format!("{user}@{host}"),
            None => host,
        }
    }

    /// Options shared by ssh and scp that rule out every interactive prompt.
    ///
    /// `port_flag` is `-p` for ssh and `-P` for scp.
    pub(crate) fn connection_args(&self, port_flag: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
            "-o".to_string(),
            format!("ServerAliveInterval={SERVER_ALIVE_INTERVAL_SECS}"),
            "-o".to_string(),
            format!("ServerAliveCountMax={SERVER_ALIVE_COUNT_MAX}"),
        ];

        if let Some(port) = self.port {
            args.push(port_flag.to_string());
            args.push(port.to_string());
        }

        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity.to_string_lossy().into_owned());
            args.push("-o".to_string());
            args.push("IdentitiesOnly=yes".to_string());
        }

        for option in &self.options {
            args.push("-o".to_string());
            args.push(option.clone());
        }

        args
    }
}

fn parse_port(s: &str) -> Option<u16> {
    s.parse::<u16>().ok().filter(|port| *port != 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_plain_host() {
        let target = SshTarget::parse("build.example.com").unwrap();
        assert_eq!(target.host, "build.example.com");
        assert_eq!(target.user, None);
        assert_eq!(target.port, None);
    }

    #[test]
    fn test_parse_user_host_port() {
        let target = SshTarget::parse("deploy@10.0.0.5:2222").unwrap();
        assert_eq!(target.user.as_deref(), Some("deploy"));
        assert_eq!(target.host, "10.0.0.5");
        assert_eq!(target.port, Some(2222));
        assert_eq!(target.destination(), "deploy@10.0.0.5");
    }

    #[test]
    fn test_parse_ipv6() {
        let bare = SshTarget::parse("fe80::1").unwrap();
        assert_eq!(bare.host, "fe80::1");
        assert_eq!(bare.port, None);

        let bracketed = SshTarget::parse("root@[::1]:22").unwrap();
        assert_eq!(bracketed.host, "::1");
        assert_eq!(bracketed.port, Some(22));
        assert_eq!(bracketed.scp_destination(), "root@[::1]");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for spec in ["", "@host", "host:notaport", "host:0", "[::1", "[::1]x", "a b"] {
            assert!(SshTarget::parse(spec).is_err(), "accepted {spec:?}");
        }
    }

    #[test]
    fn test_connection_args_are_non_interactive() {
        let mut target = SshTarget::new("h");
        target.port = Some(2200);
        target.identity_file = Some(PathBuf::from("/keys/id_ed25519"));
        target.options.push("ProxyJump=bastion".to_string());

        let args = target.connection_args("-p");

        assert!(args.windows(2).any(|w| w == ["-o", "BatchMode=yes"]));
        assert!(args.windows(2).any(|w| w == ["-o", "StrictHostKeyChecking=accept-new"]));
        assert!(args.windows(2).any(|w| w == ["-o", "ConnectTimeout=10"]));
        assert!(args.windows(2).any(|w| w == ["-p", "2200"]));
        assert!(args.windows(2).any(|w| w == ["-i", "/keys/id_ed25519"]));
        assert!(args.windows(2).any(|w| w == ["-o", "ProxyJump=bastion"]));
    }
}
