//! Property tests for role derivation and the authorization predicate

use proptest::prelude::*;
use shellmesh_authz::roles::DEFAULT_GROUP_ROLES;
use shellmesh_authz::{authorize, derive_roles, GroupRoleMapping, RoleSet};

fn group_strategy() -> impl Strategy<Value = String> {
    let known: Vec<String> = DEFAULT_GROUP_ROLES
        .iter()
        .map(|(g, _)| g.to_string())
        .collect();
    prop_oneof![
        proptest::sample::select(known),
        "[a-z-]{1,12}",
    ]
}

fn role_strategy() -> impl Strategy<Value = String> {
    proptest::sample::select(vec![
        "trader".to_string(),
        "admin".to_string(),
        "sales-agent".to_string(),
        "kyc-reviewer".to_string(),
        "annuity-ops".to_string(),
    ])
}

proptest! {
    #[test]
    fn derivation_is_order_independent(
        (groups, shuffled) in proptest::collection::vec(group_strategy(), 0..8)
            .prop_flat_map(|g| (Just(g.clone()), Just(g).prop_shuffle()))
    ) {
        prop_assert_eq!(derive_roles(&groups), derive_roles(&shuffled));
    }

    #[test]
    fn derivation_is_deterministic(groups in proptest::collection::vec(group_strategy(), 0..8)) {
        let mapping = GroupRoleMapping::default();
        prop_assert_eq!(mapping.derive_roles(&groups), mapping.derive_roles(&groups));
    }

    #[test]
    fn derivation_is_union_of_per_group_roles(groups in proptest::collection::vec(group_strategy(), 0..8)) {
        let mapping = GroupRoleMapping::default();
        let expected: RoleSet = groups
            .iter()
            .filter_map(|g| mapping.roles_for_group(g))
            .flatten()
            .cloned()
            .collect();
        prop_assert_eq!(mapping.derive_roles(&groups), expected);
    }

    #[test]
    fn authorization_iff_empty_or_intersecting(
        required in proptest::collection::vec(role_strategy(), 0..4),
        current in proptest::collection::btree_set(role_strategy(), 0..4),
    ) {
        let expected = required.is_empty() || required.iter().any(|r| current.contains(r));
        prop_assert_eq!(authorize(&required, &current).is_granted(), expected);
    }

    #[test]
    fn empty_current_roles_never_satisfy_a_requirement(
        required in proptest::collection::vec(role_strategy(), 1..4),
    ) {
        prop_assert!(!authorize(&required, &RoleSet::new()).is_granted());
    }
}
