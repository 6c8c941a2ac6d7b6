use crate::FzError;
use std::fmt;

/// A tagged location of the form `<scheme>://<authority>/<payload>`.
#[derive(Debug, Clone, PartialEq)]
pub enum CalculatorUri {
    /// `sh://<command>` — run command locally in the case directory.
    Sh { command: String },
    /// `ssh://[user@]host[:port]/<command>`
    Ssh {
        user: Option<String>,
        host: String,
        port: Option<u16>,
        command: String,
    },
    /// `cache://<path-pattern>`
    Cache { pattern: String },
    /// `funz://[host]:<tcp-port>/<code>` — the host in the URI is the UDP
    /// broadcast target (empty means "any"); the TCP port is learned from
    /// the broadcast response, not from this URI's port.
    Funz {
        host: Option<String>,
        udp_port: u16,
        code: String,
    },
}

impl CalculatorUri {
    pub fn is_cache(&self) -> bool {
        matches!(self, CalculatorUri::Cache { .. })
    }
}

impl fmt::Display for CalculatorUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalculatorUri::Sh { command } => write!(f, "sh://{command}"),
            CalculatorUri::Ssh {
                user,
                host,
                port,
                command,
            } => {
                let auth = match (user, port) {
                    (Some(u), Some(p)) => format!("{u}@{host}:{p}"),
                    (Some(u), None) => format!("{u}@{host}"),
                    (None, Some(p)) => format!("{host}:{p}"),
                    (None, None) => host.clone(),
                };
                write!(f, "ssh://{auth}/{command}")
            }
            CalculatorUri::Cache { pattern } => write!(f, "cache://{pattern}"),
            CalculatorUri::Funz {
                host,
                udp_port,
                code,
            } => {
                write!(f, "funz://{}:{udp_port}/{code}", host.as_deref().unwrap_or(""))
            }
        }
    }
}

impl std::str::FromStr for CalculatorUri {
    type Err = FzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| FzError::InvalidUri {
            uri: s.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = s.split_once("://").ok_or_else(|| invalid("missing scheme"))?;

        match scheme {
            "sh" => Ok(CalculatorUri::Sh {
                command: rest.to_string(),
            }),
            "cache" => Ok(CalculatorUri::Cache {
                pattern: rest.to_string(),
            }),
            "ssh" => {
                let (authority, command) = rest
                    .split_once('/')
                    .ok_or_else(|| invalid("ssh URI missing '/<command>'"))?;
                let (user, host_port) = match authority.split_once('@') {
                    Some((u, hp)) => (Some(u.to_string()), hp),
                    None => (None, authority),
                };
                let (host, port) = match host_port.split_once(':') {
                    Some((h, p)) => (
                        h.to_string(),
                        Some(p.parse::<u16>().map_err(|_| invalid("invalid port"))?),
                    ),
                    None => (host_port.to_string(), None),
                };
                if host.is_empty() {
                    return Err(invalid("ssh URI missing host"));
                }
                Ok(CalculatorUri::Ssh {
                    user,
                    host,
                    port,
                    command: command.to_string(),
                })
            }
            "funz" => {
                let (authority, code) = rest
                    .split_once('/')
                    .ok_or_else(|| invalid("funz URI missing '/<code>'"))?;
                let (host, port_str) = match authority.split_once(':') {
                    Some((h, p)) => (if h.is_empty() { None } else { Some(h.to_string()) }, p),
                    None => return Err(invalid("funz URI missing ':<port>'")),
                };
                let udp_port = port_str.parse::<u16>().map_err(|_| invalid("invalid port"))?;
                Ok(CalculatorUri::Funz {
                    host,
                    udp_port,
                    code: code.to_string(),
                })
            }
            other => Err(invalid(&format!("unknown scheme '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_sh() {
        let uri: CalculatorUri = "sh://echo hi".parse().unwrap();
        assert_eq!(
            uri,
            CalculatorUri::Sh {
                command: "echo hi".into()
            }
        );
    }

    #[test]
    fn parse_ssh_full() {
        let uri: CalculatorUri = "ssh://alice@host.example:2222/run.sh".parse().unwrap();
        assert_eq!(
            uri,
            CalculatorUri::Ssh {
                user: Some("alice".into()),
                host: "host.example".into(),
                port: Some(2222),
                command: "run.sh".into(),
            }
        );
    }

    #[test]
    fn parse_ssh_minimal() {
        let uri: CalculatorUri = "ssh://host/run.sh".parse().unwrap();
        assert_eq!(
            uri,
            CalculatorUri::Ssh {
                user: None,
                host: "host".into(),
                port: None,
                command: "run.sh".into(),
            }
        );
    }

    #[test]
    fn parse_cache() {
        let uri: CalculatorUri = "cache:///data/runs/*".parse().unwrap();
        assert_eq!(
            uri,
            CalculatorUri::Cache {
                pattern: "/data/runs/*".into()
            }
        );
    }

    #[test]
    fn parse_funz() {
        let uri: CalculatorUri = "funz://:9334/mycode".parse().unwrap();
        assert_eq!(
            uri,
            CalculatorUri::Funz {
                host: None,
                udp_port: 9334,
                code: "mycode".into(),
            }
        );
    }

    #[test]
    fn unknown_scheme_rejected() {
        let err = "ftp://nope".parse::<CalculatorUri>().unwrap_err();
        assert!(matches!(err, FzError::InvalidUri { .. }));
    }

    #[test]
    fn missing_scheme_rejected() {
        assert!("not-a-uri".parse::<CalculatorUri>().is_err());
    }

    #[test]
    fn display_roundtrips_sh() {
        let uri = CalculatorUri::Sh {
            command: "echo hi".into(),
        };
        assert_eq!(uri.to_string(), "sh://echo hi");
    }

    #[test]
    fn is_cache_helper() {
        assert!(CalculatorUri::Cache { pattern: "x".into() }.is_cache());
        assert!(!CalculatorUri::Sh { command: "x".into() }.is_cache());
    }
}
