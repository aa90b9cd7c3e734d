#![no_main]

use libfuzzer_sys::fuzz_target;

use domain::rule::args::FwRuleArgs;
use domain::tuple::entity::{IpNetwork, MatchSet};

// Firewall match parsing and canonical keys.
//
// Layout:
//   [0..2]  = sport min/max seeds
//   [2..4]  = dport min/max seeds
//   [4]     = IP protocol
//   rest    = "src|dst" as UTF-8
fuzz_target!(|data: &[u8]| {
    if data.len() < 5 {
        return;
    }
    let Ok(text) = std::str::from_utf8(&data[5..]) else {
        return;
    };
    let (src, dst) = text.split_once('|').unwrap_or((text, ""));

    if let Ok(net) = IpNetwork::parse(src) {
        let canon = net.network();
        assert!(canon.contains(canon.addr()));
    }

    let args = FwRuleArgs {
        src: src.to_string(),
        dst: dst.to_string(),
        sport_min: u16::from(data[0]) * 257,
        sport_max: u16::from(data[1]) * 257,
        dport_min: u16::from(data[2]) * 257,
        dport_max: u16::from(data[3]) * 257,
        proto: data[4],
        ..FwRuleArgs::default()
    };
    if let Ok(tuple) = args.tuple() {
        // Keys are stable under masking.
        let key = tuple.key(MatchSet::FIREWALL);
        assert_eq!(key, tuple.masked(MatchSet::FIREWALL).key(MatchSet::FIREWALL));
        let _ = tuple.key(MatchSet::NAT_LB);
    }
});
