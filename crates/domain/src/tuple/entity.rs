use std::fmt::Write as _;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

use crate::common::entity::Protocol;

use super::error::TupleError;

// ── IP network ──────────────────────────────────────────────────────

/// IP address with CIDR prefix (IPv4 or IPv6).
///
/// Host bits are kept as supplied; [`IpNetwork::network`] clears them and
/// is what enters a tuple key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpNetwork {
    /// IPv4 address as host-byte-order u32, prefix 0-32.
    V4 { addr: u32, prefix_len: u8 },
    /// IPv6 address as 16 bytes in network order, prefix 0-128.
    V6 { addr: [u8; 16], prefix_len: u8 },
}

impl Default for IpNetwork {
    fn default() -> Self {
        Self::ANY
    }
}

impl IpNetwork {
    /// `0.0.0.0/0`, the wildcard value of an L3 field.
    pub const ANY: Self = Self::V4 {
        addr: 0,
        prefix_len: 0,
    };

    /// A single-host network (`/32` or `/128`).
    pub fn host(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => Self::V4 {
                addr: u32::from(v4),
                prefix_len: 32,
            },
            IpAddr::V6(v6) => Self::V6 {
                addr: v6.octets(),
                prefix_len: 128,
            },
        }
    }

    /// Parse `"192.168.1.0/24"`, `"10.0.0.1"`, `"2001:db8::/32"` or `"::1"`.
    /// A bare address is a host network.
    pub fn parse(s: &str) -> Result<Self, TupleError> {
        let (ip_str, prefix) = match s.split_once('/') {
            Some((ip, prefix)) => (ip, Some(prefix)),
            None => (s, None),
        };

        let ip: IpAddr = ip_str.parse().map_err(|_| TupleError::InvalidCidr {
            value: s.to_string(),
            reason: format!("invalid address '{ip_str}'"),
        })?;
        let max = if ip.is_ipv4() { 32 } else { 128 };

        let prefix_len = match prefix {
            Some(p) => p.parse::<u8>().map_err(|_| TupleError::InvalidCidr {
                value: s.to_string(),
                reason: format!("invalid prefix length: '{p}'"),
            })?,
            None => max,
        };
        if prefix_len > max {
            return Err(TupleError::InvalidCidr {
                value: s.to_string(),
                reason: format!("prefix length {prefix_len} must be 0-{max}"),
            });
        }

        Ok(Self::host(ip).with_prefix(prefix_len))
    }

    fn with_prefix(self, prefix_len: u8) -> Self {
        match self {
            Self::V4 { addr, .. } => Self::V4 { addr, prefix_len },
            Self::V6 { addr, .. } => Self::V6 { addr, prefix_len },
        }
    }

    pub fn addr(&self) -> IpAddr {
        match *self {
            Self::V4 { addr, .. } => IpAddr::V4(Ipv4Addr::from(addr)),
            Self::V6 { addr, .. } => IpAddr::V6(Ipv6Addr::from(addr)),
        }
    }

    pub fn prefix_len(&self) -> u8 {
        match *self {
            Self::V4 { prefix_len, .. } | Self::V6 { prefix_len, .. } => prefix_len,
        }
    }

    /// Returns `true` if this is an IPv6 network.
    pub fn is_v6(&self) -> bool {
        matches!(self, Self::V6 { .. })
    }

    /// The same network with every host bit cleared.
    #[must_use]
    pub fn network(&self) -> Self {
        match *self {
            Self::V4 { addr, prefix_len } => {
                let mask = if prefix_len == 0 {
                    0
                } else {
                    u32::MAX << (32 - u32::from(prefix_len.min(32)))
                };
                Self::V4 {
                    addr: addr & mask,
                    prefix_len,
                }
            }
            Self::V6 {
                mut addr,
                prefix_len,
            } => {
                let prefix = usize::from(prefix_len);
                for (i, byte) in addr.iter_mut().enumerate() {
                    let start = i * 8;
                    if prefix <= start {
                        *byte = 0;
                    } else if prefix < start + 8 {
                        *byte &= 0xffu8 << (8 - (prefix - start));
                    }
                }
                Self::V6 { addr, prefix_len }
            }
        }
    }

    /// Whether `ip` falls within this network. Mixed families never match.
    pub fn contains(&self, ip: IpAddr) -> bool {
        if ip.is_ipv6() != self.is_v6() {
            return false;
        }
        Self::host(ip).with_prefix(self.prefix_len()).network() == self.network()
    }
}

impl std::fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr(), self.prefix_len())
    }
}

// ── Masked scalar fields ────────────────────────────────────────────

/// MAC address with a per-byte validity mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacField {
    pub addr: [u8; 6],
    pub valid: [u8; 6],
}

impl MacField {
    pub fn exact(addr: [u8; 6]) -> Self {
        Self {
            addr,
            valid: [0xff; 6],
        }
    }

    pub fn masked(&self) -> [u8; 6] {
        let mut out = self.addr;
        for (b, m) in out.iter_mut().zip(self.valid) {
            *b &= m;
        }
        out
    }
}

/// 16-bit value with a validity mask (VLAN id).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MaskedU16 {
    pub val: u16,
    pub valid: u16,
}

impl MaskedU16 {
    pub fn exact(val: u16) -> Self {
        Self { val, valid: 0xffff }
    }
}

/// L4 protocol number with a validity mask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtoField {
    pub val: u8,
    pub valid: u8,
}

impl ProtoField {
    /// `Protocol::Any` becomes the wildcard `{0, 0}`.
    pub fn from_protocol(proto: Protocol) -> Self {
        match proto {
            Protocol::Any => Self::default(),
            p => Self {
                val: p.to_u8(),
                valid: 0xff,
            },
        }
    }

    pub fn protocol(&self) -> Protocol {
        Protocol::from_u8(self.val & self.valid)
    }
}

/// L4 port match.
///
/// `valid == 0xffff` is an exact port. Anything else is a range stored as
/// `{ val: max, valid: min }`; `{0, 0}` is the wildcard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct L4Port {
    pub val: u16,
    pub valid: u16,
}

impl L4Port {
    pub const ANY: Self = Self { val: 0, valid: 0 };

    pub fn exact(port: u16) -> Self {
        Self {
            val: port,
            valid: 0xffff,
        }
    }

    /// Build a port match from an inclusive `min..=max` range.
    /// `0..=0` is the wildcard and `p..=p` an exact port.
    pub fn range(min: u16, max: u16) -> Result<Self, TupleError> {
        if min > max {
            return Err(TupleError::InvalidPortRange { min, max });
        }
        if min == max {
            return Ok(if min == 0 { Self::ANY } else { Self::exact(min) });
        }
        Ok(Self {
            val: max,
            valid: min,
        })
    }

    pub fn is_exact(&self) -> bool {
        self.valid == 0xffff
    }

    pub fn is_any(&self) -> bool {
        *self == Self::ANY
    }

    /// Inclusive `(min, max)` bounds of this match.
    pub fn bounds(&self) -> (u16, u16) {
        if self.is_exact() {
            (self.val, self.val)
        } else if self.is_any() {
            (0, u16::MAX)
        } else {
            (self.valid, self.val)
        }
    }

    pub fn matches(&self, port: u16) -> bool {
        let (min, max) = self.bounds();
        port >= min && port <= max
    }

    fn encode(&self, out: &mut String) {
        if self.is_exact() {
            let _ = write!(out, "={}", self.val & self.valid);
        } else {
            let _ = write!(out, "~{}:{}", self.valid, self.val);
        }
    }
}

// ── Match set ───────────────────────────────────────────────────────

/// Set of tuple fields participating in a table's key.
///
/// Path and preference are not listed: they always enter the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatchSet(u16);

impl MatchSet {
    pub const IN_PORT: Self = Self(1);
    pub const L2_DST: Self = Self(1 << 1);
    pub const L2_SRC: Self = Self(1 << 2);
    pub const VLAN: Self = Self(1 << 3);
    pub const L3_DST: Self = Self(1 << 4);
    pub const L3_SRC: Self = Self(1 << 5);
    pub const PROTO: Self = Self(1 << 6);
    pub const L4_SRC: Self = Self(1 << 7);
    pub const L4_DST: Self = Self(1 << 8);
    /// Every inner (tunnel-decapsulated) field.
    pub const INNER: Self = Self(1 << 9);
    pub const ALL: Self = Self(0x3ff);

    /// Exact service match used by the NAT/LB table.
    pub const NAT_LB: Self = Self(Self::L3_DST.0 | Self::L4_DST.0 | Self::PROTO.0);
    /// The firewall table matches on everything.
    pub const FIREWALL: Self = Self::ALL;

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for MatchSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ── Tuple ───────────────────────────────────────────────────────────

/// Inner (tunnel-decapsulated) header fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerTuple {
    pub l2_dst: MacField,
    pub l2_src: MacField,
    pub l3_dst: IpNetwork,
    pub l3_src: IpNetwork,
    pub proto: ProtoField,
    pub l4_src: L4Port,
    pub l4_dst: L4Port,
}

/// Packet-header match of a rule. Fields left at their default value are
/// wildcards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuple {
    pub in_port: Option<String>,
    pub l2_dst: MacField,
    pub l2_src: MacField,
    pub vlan: MaskedU16,
    pub l3_dst: IpNetwork,
    pub l3_src: IpNetwork,
    pub proto: ProtoField,
    pub l4_src: L4Port,
    pub l4_dst: L4Port,
    pub inner: InnerTuple,
    /// Disambiguates otherwise identical tuples (several rules per VIP:port).
    pub pref: u16,
    /// URL path for L7-aware services.
    pub path: Option<String>,
}

impl Tuple {
    /// Service tuple `{vip/32, port, proto}` as used by NAT/LB rules and
    /// by endpoint fold lookups.
    pub fn service(
        vip: IpAddr,
        port: u16,
        proto: Protocol,
        pref: u16,
        path: Option<String>,
    ) -> Self {
        Self {
            l3_dst: IpNetwork::host(vip),
            l4_dst: L4Port::exact(port),
            proto: ProtoField::from_protocol(proto),
            pref,
            path,
            ..Self::default()
        }
    }

    /// Copy of this tuple with every field outside `set` reset to its
    /// wildcard value.
    #[must_use]
    pub fn masked(&self, set: MatchSet) -> Self {
        let mut t = self.clone();
        if !set.contains(MatchSet::IN_PORT) {
            t.in_port = None;
        }
        if !set.contains(MatchSet::L2_DST) {
            t.l2_dst = MacField::default();
        }
        if !set.contains(MatchSet::L2_SRC) {
            t.l2_src = MacField::default();
        }
        if !set.contains(MatchSet::VLAN) {
            t.vlan = MaskedU16::default();
        }
        if !set.contains(MatchSet::L3_DST) {
            t.l3_dst = IpNetwork::ANY;
        }
        if !set.contains(MatchSet::L3_SRC) {
            t.l3_src = IpNetwork::ANY;
        }
        if !set.contains(MatchSet::PROTO) {
            t.proto = ProtoField::default();
        }
        if !set.contains(MatchSet::L4_SRC) {
            t.l4_src = L4Port::ANY;
        }
        if !set.contains(MatchSet::L4_DST) {
            t.l4_dst = L4Port::ANY;
        }
        if !set.contains(MatchSet::INNER) {
            t.inner = InnerTuple::default();
        }
        t
    }

    /// Canonical key of this tuple under `set`.
    ///
    /// Variable-length strings are length-prefixed and every field is
    /// separated, so distinct tuples cannot produce the same key.
    pub fn key(&self, set: MatchSet) -> TupleKey {
        let t = self.masked(set);
        let mut k = String::with_capacity(128);

        push_opt_str(&mut k, t.path.as_deref());
        push_opt_str(&mut k, t.in_port.as_deref());
        push_mac(&mut k, &t.l2_dst);
        push_mac(&mut k, &t.l2_src);
        let _ = write!(k, "{}|", t.vlan.val & t.vlan.valid);
        let _ = write!(k, "{}|{}|", t.l3_dst.network(), t.l3_src.network());
        let _ = write!(k, "{}|", t.proto.val & t.proto.valid);
        t.l4_src.encode(&mut k);
        k.push('|');
        t.l4_dst.encode(&mut k);
        k.push('|');

        push_mac(&mut k, &t.inner.l2_dst);
        push_mac(&mut k, &t.inner.l2_src);
        let _ = write!(
            k,
            "{}|{}|",
            t.inner.l3_dst.network(),
            t.inner.l3_src.network()
        );
        let _ = write!(k, "{}|", t.inner.proto.val & t.inner.proto.valid);
        t.inner.l4_src.encode(&mut k);
        k.push('|');
        t.inner.l4_dst.encode(&mut k);
        k.push('|');

        let _ = write!(k, "{}", t.pref);
        TupleKey(k)
    }
}

fn push_opt_str(k: &mut String, s: Option<&str>) {
    match s {
        Some(s) => {
            let _ = write!(k, "{}:{s}|", s.len());
        }
        None => k.push_str("-|"),
    }
}

fn push_mac(k: &mut String, mac: &MacField) {
    for b in mac.masked() {
        let _ = write!(k, "{b:02x}");
    }
    k.push('|');
}

impl std::fmt::Display for Tuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if let Some(ref p) = self.in_port {
            parts.push(format!("inport:{p}"));
        }
        if self.vlan.valid != 0 {
            parts.push(format!("vlan:{}", self.vlan.val));
        }
        if self.l3_src != IpNetwork::ANY {
            parts.push(format!("src:{}", self.l3_src));
        }
        if self.l3_dst != IpNetwork::ANY {
            parts.push(format!("dst:{}", self.l3_dst));
        }
        if self.proto.valid != 0 {
            parts.push(format!("proto:{}", self.proto.protocol()));
        }
        if !self.l4_src.is_any() {
            let (min, max) = self.l4_src.bounds();
            parts.push(format!("sport:{min}-{max}"));
        }
        if !self.l4_dst.is_any() {
            let (min, max) = self.l4_dst.bounds();
            parts.push(format!("dport:{min}-{max}"));
        }
        if let Some(ref p) = self.path {
            parts.push(format!("path:{p}"));
        }
        parts.push(format!("pref:{}", self.pref));
        f.write_str(&parts.join(","))
    }
}

/// Canonical string key of a tuple under a table's match set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TupleKey(String);

impl TupleKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TupleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    // ── IpNetwork ──────────────────────────────────────────────────

    #[test]
    fn parse_v4_cidr() {
        let n = IpNetwork::parse("192.168.1.0/24").unwrap();
        assert_eq!(n.prefix_len(), 24);
        assert_eq!(n.addr(), ip("192.168.1.0"));
        assert!(!n.is_v6());
    }

    #[test]
    fn parse_bare_address_is_host() {
        assert_eq!(IpNetwork::parse("10.0.0.1").unwrap().prefix_len(), 32);
        assert_eq!(IpNetwork::parse("2001:db8::1").unwrap().prefix_len(), 128);
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(IpNetwork::parse("10.0.0/24").is_err());
        assert!(IpNetwork::parse("10.0.0.0/33").is_err());
        assert!(IpNetwork::parse("2001:db8::/129").is_err());
        assert!(IpNetwork::parse("10.0.0.0/abc").is_err());
        assert!(IpNetwork::parse("").is_err());
    }

    #[test]
    fn network_clears_host_bits() {
        let n = IpNetwork::parse("10.1.2.3/16").unwrap().network();
        assert_eq!(n.addr(), ip("10.1.0.0"));
        let v6 = IpNetwork::parse("2001:db8:abcd::1/36").unwrap().network();
        assert_eq!(v6.addr(), ip("2001:db8:a000::"));
        assert_eq!(IpNetwork::parse("1.2.3.4/0").unwrap().network(), IpNetwork::ANY);
    }

    #[test]
    fn contains_respects_family() {
        let n = IpNetwork::parse("192.168.1.0/24").unwrap();
        assert!(n.contains(ip("192.168.1.77")));
        assert!(!n.contains(ip("192.168.2.1")));
        assert!(!n.contains(ip("::1")));
    }

    #[test]
    fn display_keeps_prefix() {
        assert_eq!(
            IpNetwork::host(ip("10.0.0.1")).to_string(),
            "10.0.0.1/32"
        );
    }

    // ── L4Port ─────────────────────────────────────────────────────

    #[test]
    fn port_range_encoding() {
        assert_eq!(L4Port::range(0, 0).unwrap(), L4Port::ANY);
        assert_eq!(L4Port::range(80, 80).unwrap(), L4Port::exact(80));
        let r = L4Port::range(1000, 2000).unwrap();
        assert_eq!(r.val, 2000);
        assert_eq!(r.valid, 1000);
        assert!(r.matches(1500));
        assert!(!r.matches(2001));
        assert!(L4Port::range(10, 5).is_err());
    }

    #[test]
    fn wildcard_port_matches_everything() {
        assert!(L4Port::ANY.matches(0));
        assert!(L4Port::ANY.matches(65535));
    }

    // ── Keys ───────────────────────────────────────────────────────

    #[test]
    fn masked_fields_do_not_affect_key() {
        let mut a = Tuple::service(ip("10.0.0.1"), 80, Protocol::Tcp, 0, None);
        let mut b = a.clone();
        a.l3_src = IpNetwork::parse("192.168.0.0/16").unwrap();
        b.vlan = MaskedU16::exact(100);
        assert_eq!(a.key(MatchSet::NAT_LB), b.key(MatchSet::NAT_LB));
        assert_ne!(a.key(MatchSet::FIREWALL), b.key(MatchSet::FIREWALL));
    }

    #[test]
    fn host_bits_do_not_affect_key() {
        let mut a = Tuple::default();
        let mut b = Tuple::default();
        a.l3_src = IpNetwork::parse("10.0.0.5/24").unwrap();
        b.l3_src = IpNetwork::parse("10.0.0.0/24").unwrap();
        assert_eq!(a.key(MatchSet::FIREWALL), b.key(MatchSet::FIREWALL));
    }

    #[test]
    fn pref_and_path_always_in_key() {
        let a = Tuple::service(ip("10.0.0.1"), 80, Protocol::Tcp, 0, None);
        let b = Tuple::service(ip("10.0.0.1"), 80, Protocol::Tcp, 1, None);
        let c = Tuple::service(ip("10.0.0.1"), 80, Protocol::Tcp, 0, Some("/api".into()));
        assert_ne!(a.key(MatchSet::NAT_LB), b.key(MatchSet::NAT_LB));
        assert_ne!(a.key(MatchSet::NAT_LB), c.key(MatchSet::NAT_LB));
    }

    #[test]
    fn range_and_exact_ports_do_not_collide() {
        let mut a = Tuple::default();
        let mut b = Tuple::default();
        // {val: 8080, valid: 0xffff} vs {val: 65535, valid: 8080}
        a.l4_dst = L4Port::exact(8080);
        b.l4_dst = L4Port::range(8080, 65535).unwrap();
        assert_ne!(a.key(MatchSet::FIREWALL), b.key(MatchSet::FIREWALL));
    }

    #[test]
    fn path_separator_cannot_collide() {
        let mut a = Tuple::default();
        let mut b = Tuple::default();
        a.path = Some("a|".into());
        a.in_port = Some("b".into());
        b.path = Some("a".into());
        b.in_port = Some("|b".into());
        assert_ne!(a.key(MatchSet::FIREWALL), b.key(MatchSet::FIREWALL));
    }

    #[test]
    fn proto_wildcard_differs_from_tcp() {
        let a = Tuple::service(ip("10.0.0.1"), 80, Protocol::Any, 0, None);
        let b = Tuple::service(ip("10.0.0.1"), 80, Protocol::Tcp, 0, None);
        assert_ne!(a.key(MatchSet::NAT_LB), b.key(MatchSet::NAT_LB));
    }

    #[test]
    fn identical_tuples_identical_keys() {
        let a = Tuple::service(ip("2001:db8::1"), 443, Protocol::Tcp, 3, None);
        let b = Tuple::service(ip("2001:db8::1"), 443, Protocol::Tcp, 3, None);
        assert_eq!(a.key(MatchSet::NAT_LB), b.key(MatchSet::NAT_LB));
    }

    #[test]
    fn match_set_contains() {
        assert!(MatchSet::ALL.contains(MatchSet::INNER));
        assert!(MatchSet::NAT_LB.contains(MatchSet::L3_DST | MatchSet::PROTO));
        assert!(!MatchSet::NAT_LB.contains(MatchSet::L3_SRC));
    }

    #[test]
    fn tuple_display_lists_set_fields() {
        let t = Tuple::service(ip("10.0.0.1"), 80, Protocol::Tcp, 0, None);
        assert_eq!(t.to_string(), "dst:10.0.0.1/32,proto:tcp,dport:80-80,pref:0");
    }
}
