//! Unit tests for role derivation

use super::*;
use crate::error::AuthzError;

#[test]
fn test_empty_input_yields_empty_roles() {
    let mapping = GroupRoleMapping::default();
    let groups: Vec<String> = Vec::new();

    assert!(mapping.derive_roles(&groups).is_empty());
}

#[test]
fn test_single_group_single_role() {
    let roles = derive_roles(["trading-desk"]);

    assert_eq!(roles.len(), 1);
    assert!(roles.contains("trader"));
}

#[test]
fn test_one_group_many_roles() {
    let roles = derive_roles(["platform-admins"]);

    assert!(roles.contains("admin"));
    assert!(roles.contains("trader"));
    assert!(roles.contains("compliance-officer"));
}

#[test]
fn test_overlapping_roles_are_deduplicated() {
    // Both groups grant "trader" and "compliance" overlaps with admins
    let roles = derive_roles(["trading-desk", "platform-admins", "compliance"]);

    let as_vec: Vec<&str> = roles.iter().map(String::as_str).collect();
    assert_eq!(
        as_vec,
        vec!["admin", "compliance-officer", "kyc-reviewer", "trader"]
    );
}

#[test]
fn test_unknown_groups_are_ignored() {
    let roles = derive_roles(["no-such-group", "sales", "another-unknown"]);

    assert_eq!(roles.len(), 1);
    assert!(roles.contains("sales-agent"));
}

#[test]
fn test_group_match_is_exact() {
    let roles = derive_roles(["Trading-Desk", "trading-desk "]);
    assert!(roles.is_empty());
}

#[test]
fn test_from_pairs_merges_repeated_groups() {
    let mapping = GroupRoleMapping::from_pairs(vec![
        ("ops", vec!["viewer"]),
        ("ops", vec!["editor"]),
    ])
    .unwrap();

    assert_eq!(mapping.len(), 1);
    let roles = mapping.derive_roles(["ops"]);
    assert!(roles.contains("viewer"));
    assert!(roles.contains("editor"));
}

#[test]
fn test_from_pairs_rejects_empty_identifiers() {
    let err = GroupRoleMapping::from_pairs(vec![("", vec!["viewer"])]).unwrap_err();
    assert!(matches!(err, AuthzError::InvalidMapping(_)));

    let err = GroupRoleMapping::from_pairs(vec![("ops", vec![""])]).unwrap_err();
    assert!(matches!(err, AuthzError::InvalidMapping(_)));
}

#[test]
fn test_empty_mapping_grants_nothing() {
    let mapping = GroupRoleMapping::empty();
    assert!(mapping.is_empty());
    assert!(mapping.derive_roles(["platform-admins"]).is_empty());
}

#[test]
fn test_known_roles_and_groups() {
    let mapping = GroupRoleMapping::default();

    assert_eq!(mapping.groups().len(), DEFAULT_GROUP_ROLES.len());
    assert!(mapping.known_roles().contains("annuity-ops"));
    assert!(mapping
        .roles_for_group("kyc-operations")
        .is_some_and(|r| r.contains("kyc-reviewer")));
}
