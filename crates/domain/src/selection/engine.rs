//! Endpoint selection helpers.
//!
//! Round robin, hash, persistence, least-connections and N2 are applied
//! by the forwarding engine on the endpoint list as pushed. Only weights
//! and the priority slot table are computed here.

use crate::rule::entity::{Endpoint, MAX_ENDPOINTS};

use super::error::SelectionError;

/// Total weight of one rule after normalization.
pub const WEIGHT_TOTAL: u32 = 100;

/// Validate caller-supplied weights and distribute the remainder so they
/// sum to exactly 100.
///
/// The remainder is split evenly; leftover units go to the first
/// endpoints in list order.
pub fn normalize_weights(endpoints: &mut [Endpoint]) -> Result<(), SelectionError> {
    if endpoints.is_empty() {
        return Err(SelectionError::NoEndpoints);
    }
    let sum: u32 = endpoints.iter().map(|e| u32::from(e.weight)).sum();
    if sum > WEIGHT_TOTAL {
        return Err(SelectionError::WeightOverflow { sum });
    }
    distribute(endpoints.iter_mut(), WEIGHT_TOTAL - sum);
    Ok(())
}

/// Re-establish the weight invariant over member endpoints after an
/// attach or detach. Members whose weights overflow are reset to an even
/// split.
pub fn rebalance_weights(endpoints: &mut [Endpoint]) {
    let sum: u32 = endpoints
        .iter()
        .filter(|e| e.is_member())
        .map(|e| u32::from(e.weight))
        .sum();
    if sum == WEIGHT_TOTAL {
        return;
    }
    if sum > WEIGHT_TOTAL {
        for e in endpoints.iter_mut().filter(|e| e.is_member()) {
            e.weight = 0;
        }
        distribute(endpoints.iter_mut().filter(|e| e.is_member()), WEIGHT_TOTAL);
    } else {
        distribute(
            endpoints.iter_mut().filter(|e| e.is_member()),
            WEIGHT_TOTAL - sum,
        );
    }
}

/// Sum of weights over endpoints that are members of the rule.
pub fn member_weight_sum(endpoints: &[Endpoint]) -> u32 {
    endpoints
        .iter()
        .filter(|e| e.is_member())
        .map(|e| u32::from(e.weight))
        .sum()
}

#[allow(clippy::cast_possible_truncation)]
fn distribute<'a>(endpoints: impl Iterator<Item = &'a mut Endpoint>, remainder: u32) {
    let mut eps: Vec<&mut Endpoint> = endpoints.collect();
    if eps.is_empty() || remainder == 0 {
        return;
    }
    let n = eps.len() as u32;
    let share = remainder / n;
    let mut extra = remainder % n;
    for e in &mut eps {
        let mut add = share;
        if extra > 0 {
            add += 1;
            extra -= 1;
        }
        e.weight = (u32::from(e.weight) + add).min(WEIGHT_TOTAL) as u8;
    }
}

/// Expand serving endpoints into the priority slot table.
///
/// Each serving endpoint gets `floor(weight * 32 / 100)` slots. Slots
/// left over are handed out cyclically to endpoints that received zero or
/// one slot, or to every serving endpoint when there are none. Returns
/// endpoint indices; empty when nothing is serving.
#[allow(clippy::cast_possible_truncation)]
pub fn expand_priority(endpoints: &[Endpoint]) -> Vec<usize> {
    let serving: Vec<usize> = endpoints
        .iter()
        .enumerate()
        .filter(|(_, e)| e.is_serving())
        .map(|(i, _)| i)
        .collect();
    if serving.is_empty() {
        return Vec::new();
    }

    let mut slots = Vec::with_capacity(MAX_ENDPOINTS);
    let mut small = Vec::new();
    for &i in &serving {
        let share = u32::from(endpoints[i].weight) * MAX_ENDPOINTS as u32 / WEIGHT_TOTAL;
        for _ in 0..share {
            if slots.len() < MAX_ENDPOINTS {
                slots.push(i);
            }
        }
        if share <= 1 {
            small.push(i);
        }
    }

    let fill = if small.is_empty() { &serving } else { &small };
    let mut cursor = 0;
    while slots.len() < MAX_ENDPOINTS {
        slots.push(fill[cursor % fill.len()]);
        cursor += 1;
    }
    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::entity::EndpointState;

    fn eps(weights: &[u8]) -> Vec<Endpoint> {
        weights
            .iter()
            .enumerate()
            .map(|(i, &w)| Endpoint::new(format!("10.1.1.{}", i + 1).parse().unwrap(), 80, w))
            .collect()
    }

    fn count(slots: &[usize], idx: usize) -> usize {
        slots.iter().filter(|&&s| s == idx).count()
    }

    // ── Weights ────────────────────────────────────────────────────

    #[test]
    fn exact_hundred_untouched() {
        let mut e = eps(&[60, 40]);
        normalize_weights(&mut e).unwrap();
        assert_eq!(e[0].weight, 60);
        assert_eq!(e[1].weight, 40);
    }

    #[test]
    fn unweighted_endpoints_split_evenly() {
        let mut e = eps(&[0, 0, 0]);
        normalize_weights(&mut e).unwrap();
        let w: Vec<u8> = e.iter().map(|e| e.weight).collect();
        assert_eq!(w, vec![34, 33, 33]);
        assert_eq!(member_weight_sum(&e), 100);
    }

    #[test]
    fn remainder_added_to_every_endpoint() {
        let mut e = eps(&[50, 20]);
        normalize_weights(&mut e).unwrap();
        assert_eq!(e[0].weight, 65);
        assert_eq!(e[1].weight, 35);
    }

    #[test]
    fn overflow_rejected() {
        let mut e = eps(&[70, 40]);
        assert!(matches!(
            normalize_weights(&mut e),
            Err(SelectionError::WeightOverflow { sum: 110 })
        ));
    }

    #[test]
    fn empty_rejected() {
        assert!(normalize_weights(&mut []).is_err());
    }

    #[test]
    fn rebalance_ignores_removed() {
        let mut e = eps(&[50, 50, 30]);
        e[1].state = EndpointState::Removed;
        rebalance_weights(&mut e);
        assert_eq!(member_weight_sum(&e), 100);
        assert_eq!(e[1].weight, 50);
    }

    #[test]
    fn rebalance_resets_overflow() {
        let mut e = eps(&[60, 40, 50]);
        rebalance_weights(&mut e);
        let w: Vec<u8> = e.iter().map(|e| e.weight).collect();
        assert_eq!(w, vec![34, 33, 33]);
    }

    // ── Priority expansion ─────────────────────────────────────────

    #[test]
    fn sixty_forty_expansion() {
        let slots = expand_priority(&eps(&[60, 40]));
        assert_eq!(slots.len(), MAX_ENDPOINTS);
        // 19 + 12 proportional slots, one remainder back-filled from all.
        assert_eq!(count(&slots, 0), 20);
        assert_eq!(count(&slots, 1), 12);
    }

    #[test]
    fn small_endpoints_get_remainder() {
        let slots = expand_priority(&eps(&[90, 5, 5]));
        // 28 + 1 + 1 = 30, remainder goes to the two small endpoints.
        assert_eq!(count(&slots, 0), 28);
        assert_eq!(count(&slots, 1), 2);
        assert_eq!(count(&slots, 2), 2);
    }

    #[test]
    fn zero_weight_endpoint_backfilled() {
        let slots = expand_priority(&eps(&[97, 3, 0]));
        // 31 + 0 + 0; the single remainder goes to the first small endpoint.
        assert_eq!(count(&slots, 0), 31);
        assert_eq!(count(&slots, 1), 1);
        assert_eq!(count(&slots, 2), 0);
    }

    #[test]
    fn non_serving_endpoints_excluded() {
        let mut e = eps(&[50, 50]);
        e[1].no_service = true;
        let slots = expand_priority(&e);
        assert_eq!(count(&slots, 0), MAX_ENDPOINTS);
        e[0].state = EndpointState::Pending;
        assert!(expand_priority(&e).is_empty());
    }

    #[test]
    fn expansion_is_deterministic() {
        let e = eps(&[33, 33, 34]);
        assert_eq!(expand_priority(&e), expand_priority(&e));
    }
}
