use super::entity::{Endpoint, EndpointState, MAX_ENDPOINTS, RuleOp};
use super::error::RuleError;

/// Endpoint list produced by applying a modify request to a live rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub endpoints: Vec<Endpoint>,
    pub changed: bool,
}

/// Merge `incoming` into `existing` without reordering live endpoints.
///
/// Matching endpoints keep their position and counters; only weight and
/// administrative state are updated. New endpoints are appended in the
/// `Pending` state. Under `RuleOp::Add`, existing endpoints absent from
/// `incoming` become `Removed`. `RuleOp::Detach` drops the listed
/// endpoints instead.
///
/// Fails when the merged list still holds more than `MAX_ENDPOINTS`
/// entries after removed endpoints are compacted away.
pub fn merge_endpoints(
    existing: &[Endpoint],
    incoming: &[Endpoint],
    op: RuleOp,
) -> Result<MergeOutcome, RuleError> {
    if op == RuleOp::Detach {
        let endpoints: Vec<Endpoint> = existing
            .iter()
            .filter(|e| !incoming.iter().any(|n| n.same_target(e)))
            .cloned()
            .collect();
        let changed = endpoints.len() != existing.len();
        return Ok(MergeOutcome { endpoints, changed });
    }

    let mut changed = false;
    let mut endpoints = existing.to_vec();

    for e in &mut endpoints {
        match incoming.iter().find(|n| n.same_target(e)) {
            Some(n) => {
                if e.state == EndpointState::Removed {
                    e.state = EndpointState::Active;
                    changed = true;
                }
                if e.weight != n.weight {
                    e.weight = n.weight;
                    changed = true;
                }
            }
            None if op == RuleOp::Add && e.state != EndpointState::Removed => {
                e.state = EndpointState::Removed;
                changed = true;
            }
            None => {}
        }
    }

    for n in incoming {
        if !existing.iter().any(|e| e.same_target(n)) {
            let mut n = n.clone();
            n.state = EndpointState::Pending;
            endpoints.push(n);
            changed = true;
        }
    }

    if endpoints.len() > MAX_ENDPOINTS {
        endpoints.retain(Endpoint::is_member);
    }
    if endpoints.len() > MAX_ENDPOINTS {
        return Err(RuleError::EndpointCount {
            count: endpoints.len(),
            max: MAX_ENDPOINTS,
        });
    }

    Ok(MergeOutcome { endpoints, changed })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ep(last: u8, weight: u8) -> Endpoint {
        Endpoint::new(format!("10.1.1.{last}").parse().unwrap(), 8080, weight)
    }

    fn addrs(eps: &[Endpoint]) -> Vec<String> {
        eps.iter().map(|e| e.addr.to_string()).collect()
    }

    #[test]
    fn identical_lists_are_unchanged() {
        let existing = vec![ep(1, 60), ep(2, 40)];
        let out = merge_endpoints(&existing, &existing, RuleOp::Add).unwrap();
        assert!(!out.changed);
        assert_eq!(out.endpoints, existing);
    }

    #[test]
    fn new_endpoint_appended_pending_order_kept() {
        let existing = vec![ep(5, 50), ep(2, 50)];
        let incoming = vec![ep(2, 34), ep(3, 33), ep(5, 33)];
        let out = merge_endpoints(&existing, &incoming, RuleOp::Add).unwrap();
        assert!(out.changed);
        assert_eq!(addrs(&out.endpoints), ["10.1.1.5", "10.1.1.2", "10.1.1.3"]);
        assert_eq!(out.endpoints[0].state, EndpointState::Active);
        assert_eq!(out.endpoints[1].state, EndpointState::Active);
        assert_eq!(out.endpoints[2].state, EndpointState::Pending);
        assert_eq!(out.endpoints[0].weight, 33);
    }

    #[test]
    fn missing_endpoint_removed_under_add() {
        let existing = vec![ep(1, 50), ep(2, 50)];
        let out = merge_endpoints(&existing, &[ep(1, 100)], RuleOp::Add).unwrap();
        assert!(out.changed);
        assert_eq!(out.endpoints[1].state, EndpointState::Removed);
        // Re-applying the same request is a no-op.
        let again = merge_endpoints(&out.endpoints, &[ep(1, 100)], RuleOp::Add).unwrap();
        assert!(!again.changed);
    }

    #[test]
    fn removed_endpoint_reactivated() {
        let mut existing = vec![ep(1, 50), ep(2, 50)];
        existing[1].state = EndpointState::Removed;
        let out = merge_endpoints(&existing, &[ep(1, 50), ep(2, 50)], RuleOp::Add).unwrap();
        assert!(out.changed);
        assert_eq!(out.endpoints[1].state, EndpointState::Active);
    }

    #[test]
    fn attach_leaves_others_alone() {
        let existing = vec![ep(1, 50), ep(2, 50)];
        let out = merge_endpoints(&existing, &[ep(3, 50)], RuleOp::Attach).unwrap();
        assert!(out.changed);
        assert_eq!(out.endpoints.len(), 3);
        assert!(out.endpoints[..2].iter().all(|e| e.state == EndpointState::Active));
    }

    #[test]
    fn detach_removes_listed() {
        let existing = vec![ep(1, 50), ep(2, 50)];
        let out = merge_endpoints(&existing, &[ep(2, 0)], RuleOp::Detach).unwrap();
        assert!(out.changed);
        assert_eq!(addrs(&out.endpoints), ["10.1.1.1"]);
        let none = merge_endpoints(&existing, &[ep(9, 0)], RuleOp::Detach).unwrap();
        assert!(!none.changed);
    }

    #[test]
    fn overflow_compacts_removed_endpoints() {
        let mut existing: Vec<Endpoint> = (1..=32).map(|i| ep(i, 3)).collect();
        for e in &mut existing[..16] {
            e.state = EndpointState::Removed;
        }
        let out = merge_endpoints(&existing, &[ep(100, 100)], RuleOp::Attach).unwrap();
        assert_eq!(out.endpoints.len(), 17);
        assert!(out.endpoints.iter().all(Endpoint::is_member));
    }

    #[test]
    fn attach_beyond_capacity_rejected() {
        let existing: Vec<Endpoint> = (1..=30).map(|i| ep(i, 3)).collect();
        let incoming: Vec<Endpoint> = (101..=110).map(|i| ep(i, 0)).collect();
        let err = merge_endpoints(&existing, &incoming, RuleOp::Attach).unwrap_err();
        assert!(matches!(
            err,
            RuleError::EndpointCount {
                count: 40,
                max: MAX_ENDPOINTS
            }
        ));
    }

    #[test]
    fn add_growing_past_capacity_rejected() {
        let existing: Vec<Endpoint> = (1..=32).map(|i| ep(i, 3)).collect();
        let mut incoming = existing.clone();
        incoming.push(ep(200, 0));
        assert!(merge_endpoints(&existing, &incoming, RuleOp::Add).is_err());
    }

    #[test]
    fn full_list_still_accepted() {
        let existing: Vec<Endpoint> = (1..=31).map(|i| ep(i, 3)).collect();
        let out = merge_endpoints(&existing, &[ep(200, 0)], RuleOp::Attach).unwrap();
        assert_eq!(out.endpoints.len(), MAX_ENDPOINTS);
    }
}
