use serde::{Deserialize, Serialize};

/// L4 protocol carried by a rule tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Sctp,
    /// Wildcard, written `none` on the wire.
    Any,
    Other(u8),
}

impl Protocol {
    /// IP protocol number. Returns 0 for `Any`.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Tcp => 6,
            Self::Udp => 17,
            Self::Icmp => 1,
            Self::Sctp => 132,
            Self::Any => 0,
            Self::Other(n) => n,
        }
    }

    pub fn from_u8(n: u8) -> Self {
        match n {
            0 => Self::Any,
            1 => Self::Icmp,
            6 => Self::Tcp,
            17 => Self::Udp,
            132 => Self::Sctp,
            other => Self::Other(other),
        }
    }

    /// Wire name for the protocol (`tcp`, `udp`, `icmp`, `sctp`, `none`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
            Self::Sctp => "sctp",
            Self::Any => "none",
            Self::Other(_) => "other",
        }
    }

    /// Whether the protocol is connection oriented for inactivity purposes.
    pub fn is_stream(self) -> bool {
        matches!(self, Self::Tcp | Self::Sctp)
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Other(n) => write!(f, "{n}"),
            _ => f.write_str(self.as_str()),
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    /// Parses the service protocols accepted at the rule API boundary.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "icmp" => Ok(Self::Icmp),
            "sctp" => Ok(Self::Sctp),
            "none" | "" => Ok(Self::Any),
            other => Err(format!("unsupported protocol '{other}'")),
        }
    }
}
