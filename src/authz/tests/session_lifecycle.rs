//! Claims store lifecycle against the identity provider boundary

use chrono::{Duration, TimeZone, Utc};
use shellmesh_authz::{
    token, Claims, ClaimsStore, FixedClock, GroupRoleMapping, IdentityProvider,
    MockIdentityProvider, SessionState, StaticTokenProvider,
};
use std::sync::Arc;

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()))
}

#[tokio::test]
async fn test_mock_auth_session_end_to_end() {
    let clock = clock();
    let provider = MockIdentityProvider::new(
        Claims::new("mock-user", 0)
            .with_name("Mock User")
            .with_group("platform-admins"),
    )
    .with_ttl(Duration::minutes(30))
    .with_clock(clock.clone());

    let store = Arc::new(ClaimsStore::default().with_clock(clock.clone()));
    let state = store.initialize(&provider).await;

    assert!(state.is_authenticated());
    assert!(store.has_all_roles(["admin", "trader"]));

    let ctx = store.auth_context();
    assert_eq!(ctx.claims().map(|c| c.name.as_str()), Some("Mock User"));
    assert!(ctx.groups().contains("platform-admins"));

    clock.advance(Duration::minutes(31));
    assert!(store.check_expiry());
    assert!(store.roles().is_empty());
}

#[tokio::test]
async fn test_signed_out_provider() {
    let store = ClaimsStore::default();
    let state = store.initialize(&StaticTokenProvider::default()).await;
    assert_eq!(state, SessionState::Unauthenticated);
    assert!(!store.is_authenticated());
}

#[tokio::test]
async fn test_custom_mapping_drives_roles() {
    let mapping = GroupRoleMapping::from_pairs(vec![("ops", vec!["viewer", "editor"])]).unwrap();
    let store = ClaimsStore::new(mapping).with_clock(clock());

    let raw = token::encode_unsigned(&Claims::new("u", i64::MAX).with_group("ops")).unwrap();
    let provider = StaticTokenProvider::new(Some(raw));
    assert!(provider.current_token().await.is_some());

    store.initialize(&provider).await;
    assert!(store.has_all_roles(["viewer", "editor"]));
    assert!(!store.has_role("trader"));
}
