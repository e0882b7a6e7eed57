//! End-to-end loading scenarios over mock transport and mock remotes

use shellmesh_authz::{Claims, ClaimsStore, GroupRoleMapping, RoleSet};
use shellmesh_federation::mocks::{
    FailingComponent, MockArtifactFetcher, MockComponent, MockContainer, MockManifestTransport,
    PanickingComponent,
};
use shellmesh_federation::{
    ErrorKind, HostLibrary, LoadError, LoaderMode, ManifestResolver, ModuleLoader, RenderError,
    SharedScope,
};
use std::sync::Arc;
use std::time::Duration;

const MANIFEST_URL: &str = "https://cdn.example.com/manifest.json";
const TRADE_URL: &str = "https://cdn/x/remoteEntry.js";
const KYC_URL: &str = "https://cdn/kyc/remoteEntry.js";

const MANIFEST: &str = r#"{
    "version": "2024.11.3",
    "remotes": {
        "tradePlans": {"url": "https://cdn/x/remoteEntry.js", "requiredRoles": ["trader", "admin"]},
        "tradeBlotter": {"url": "https://cdn/x/remoteEntry.js", "requiredRoles": ["trader"]},
        "kycQueue": {"url": "https://cdn/kyc/remoteEntry.js", "requiredRoles": ["kyc-reviewer"]},
        "help": {"url": "https://cdn/help/remoteEntry.js"}
    }
}"#;

struct Harness {
    transport: Arc<MockManifestTransport>,
    fetcher: Arc<MockArtifactFetcher>,
    loader: ModuleLoader,
}

fn harness(transport: MockManifestTransport, fetcher: MockArtifactFetcher) -> Harness {
    let transport = Arc::new(transport);
    let fetcher = Arc::new(fetcher);

    let scope = Arc::new(SharedScope::new("shell"));
    scope.bootstrap(&[
        HostLibrary::new("renderer", "18.2.0", Arc::new("renderer".to_string())),
        HostLibrary::new("router", "6.20.0", Arc::new("router".to_string())),
    ]);

    let resolver = Arc::new(ManifestResolver::new(MANIFEST_URL, transport.clone()));
    let loader = ModuleLoader::new(LoaderMode::Manifest, resolver, fetcher.clone(), scope);

    Harness {
        transport,
        fetcher,
        loader,
    }
}

fn trade_container() -> Arc<MockContainer> {
    Arc::new(
        MockContainer::new()
            .with_shared_requirement("renderer", "18.2.0")
            .with_export("./App", MockComponent::new("trade-plans"))
            .with_export("./Blotter", MockComponent::new("blotter")),
    )
}

fn roles(items: &[&str]) -> RoleSet {
    items.iter().map(|s| s.to_string()).collect()
}

fn store_for(groups: &[&str]) -> Arc<ClaimsStore> {
    let store = Arc::new(ClaimsStore::new(GroupRoleMapping::default()));
    let claims = groups
        .iter()
        .fold(Claims::new("u-1", 4_102_444_800), |claims, group| claims.with_group(*group));
    let token = shellmesh_authz::token::encode_unsigned(&claims).unwrap();
    assert!(store.login(&token));
    store
}

#[tokio::test]
async fn trader_loads_trade_plans() {
    let h = harness(
        MockManifestTransport::new(MANIFEST),
        MockArtifactFetcher::new().with(TRADE_URL, trade_container()),
    );
    let store = store_for(&["trading-desk"]);
    assert_eq!(store.roles(), roles(&["trader"]));

    let unit = h
        .loader
        .load_module("tradePlans", "./App", &["trader", "admin"], &store.roles())
        .await
        .unwrap();

    assert_eq!(unit.module(), "tradePlans");
    assert_eq!(unit.location(), TRADE_URL);
    assert_eq!(h.transport.request_count(), 1);
    assert_eq!(h.fetcher.fetch_count_for(TRADE_URL), 1);

    let view = unit.render(&store.auth_context()).unwrap();
    assert_eq!(view["component"], "trade-plans");
    assert_eq!(view["user"], "u-1");
}

#[tokio::test]
async fn sales_agent_denied_without_any_io() {
    let h = harness(
        MockManifestTransport::new(MANIFEST),
        MockArtifactFetcher::new().with(TRADE_URL, trade_container()),
    );
    let store = store_for(&["sales"]);

    let err = h
        .loader
        .load_module("tradePlans", "./App", &["trader", "admin"], &store.roles())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        LoadError::AuthorizationDenied {
            module: "tradePlans".to_string(),
            required: vec!["trader".to_string(), "admin".to_string()],
        }
    );
    assert!(!err.is_recoverable());
    assert_eq!(h.transport.request_count(), 0);
    assert_eq!(h.fetcher.fetch_count(), 0);
}

#[tokio::test]
async fn manifest_roles_are_enforced_after_lookup() {
    let h = harness(
        MockManifestTransport::new(MANIFEST),
        MockArtifactFetcher::new().with(TRADE_URL, trade_container()),
    );

    let err = h
        .loader
        .load_module::<&str>("tradePlans", "./App", &[], &roles(&["sales-agent"]))
        .await
        .unwrap_err();

    assert!(err.is_denial());
    assert_eq!(h.transport.request_count(), 1);
    assert_eq!(h.fetcher.fetch_count(), 0);
}

#[tokio::test]
async fn manifest_404_then_fresh_request() {
    let transport = MockManifestTransport::new(MANIFEST);
    transport.push_response(404, "not found");
    let h = harness(
        transport,
        MockArtifactFetcher::new().with(TRADE_URL, trade_container()),
    );
    let current = roles(&["trader"]);

    let err = h
        .loader
        .load_module("tradePlans", "./App", &["trader"], &current)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ManifestFetch);
    assert!(err.is_recoverable());
    assert!(h.loader.resolver().cached().is_none());

    h.loader
        .load_module("tradePlans", "./App", &["trader"], &current)
        .await
        .unwrap();
    assert_eq!(h.transport.request_count(), 2);
}

#[tokio::test]
async fn unregistered_module_never_fetches_artifact() {
    let h = harness(
        MockManifestTransport::new(MANIFEST),
        MockArtifactFetcher::new().with(TRADE_URL, trade_container()),
    );

    let err = h
        .loader
        .load_module::<&str>("annuityPipeline", "./App", &[], &roles(&["admin"]))
        .await
        .unwrap_err();

    assert_eq!(err, LoadError::ModuleNotRegistered("annuityPipeline".to_string()));
    assert_eq!(h.fetcher.fetch_count(), 0);
}

#[tokio::test]
async fn names_sharing_a_location_fetch_once() {
    let container = trade_container();
    let h = harness(
        MockManifestTransport::new(MANIFEST),
        MockArtifactFetcher::new().with(TRADE_URL, container.clone()),
    );
    let current = roles(&["trader"]);

    let plans = h
        .loader
        .load_module("tradePlans", "./App", &["trader"], &current)
        .await
        .unwrap();
    let blotter = h
        .loader
        .load_module("tradeBlotter", "./Blotter", &["trader"], &current)
        .await
        .unwrap();

    assert!(!plans.same_instance(&blotter));
    assert_eq!(h.fetcher.fetch_count_for(TRADE_URL), 1);
    assert_eq!(container.init_count(), 1);
}

#[tokio::test]
async fn concurrent_loads_share_one_fetch() {
    let container = trade_container();
    let h = harness(
        MockManifestTransport::new(MANIFEST),
        MockArtifactFetcher::new()
            .with(TRADE_URL, container.clone())
            .gated(),
    );
    let current = roles(&["trader"]);

    let loads = async {
        futures::future::join_all(
            (0..8).map(|_| h.loader.load_module("tradePlans", "./App", &["trader"], &current)),
        )
        .await
    };
    let release = async {
        while h.fetcher.fetch_count() == 0 {
            tokio::task::yield_now().await;
        }
        h.fetcher.release(1);
    };
    let (results, ()) = tokio::join!(loads, release);

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(h.fetcher.fetch_count_for(TRADE_URL), 1);
    assert_eq!(container.init_count(), 1);
}

#[tokio::test]
async fn shared_version_mismatch_is_initialization_error() {
    let container = Arc::new(
        MockContainer::new()
            .with_shared_requirement("renderer", "17.0.2")
            .with_export("./Queue", MockComponent::new("queue")),
    );
    let h = harness(
        MockManifestTransport::new(MANIFEST),
        MockArtifactFetcher::new().with(KYC_URL, container),
    );

    let err = h
        .loader
        .load_module("kycQueue", "./Queue", &["kyc-reviewer"], &roles(&["kyc-reviewer"]))
        .await
        .unwrap_err();

    match err {
        LoadError::Initialization { module, reason } => {
            assert_eq!(module, "kycQueue");
            assert!(reason.contains("renderer@17.0.2"));
        }
        other => panic!("expected initialization error, got {:?}", other),
    }
    assert!(h.loader.loaded_locations().is_empty());
}

#[tokio::test]
async fn missing_export_and_failing_factory() {
    let container = Arc::new(
        MockContainer::new()
            .with_export("./Queue", MockComponent::new("queue"))
            .with_failing_factory("./Broken", "constructor threw"),
    );
    let h = harness(
        MockManifestTransport::new(MANIFEST),
        MockArtifactFetcher::new().with(KYC_URL, container),
    );
    let current = roles(&["kyc-reviewer"]);

    let err = h
        .loader
        .load_module("kycQueue", "./Missing", &["kyc-reviewer"], &current)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LoadError::ExportNotFound {
            module: "kycQueue".to_string(),
            export_path: "./Missing".to_string(),
        }
    );

    let err = h
        .loader
        .load_module("kycQueue", "./Broken", &["kyc-reviewer"], &current)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Initialization);
    assert!(err.to_string().contains("constructor threw"));
    assert!(!h.loader.is_loaded("kycQueue", "./Broken"));
}

#[tokio::test]
async fn failed_fetch_is_retried_on_next_load() {
    let fetcher = MockArtifactFetcher::new().with(TRADE_URL, trade_container());
    fetcher.fail_next(TRADE_URL, "connection reset");
    let h = harness(MockManifestTransport::new(MANIFEST), fetcher);
    let current = roles(&["trader"]);

    let err = h
        .loader
        .load_module("tradePlans", "./App", &["trader"], &current)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LoadError::Fetch {
            module: "tradePlans".to_string(),
            location: TRADE_URL.to_string(),
            reason: "connection reset".to_string(),
        }
    );

    h.loader
        .load_module("tradePlans", "./App", &["trader"], &current)
        .await
        .unwrap();
    assert_eq!(h.fetcher.fetch_count_for(TRADE_URL), 2);
    assert_eq!(h.transport.request_count(), 1);
}

#[tokio::test]
async fn render_failures_stay_inside_the_unit() {
    let container = Arc::new(
        MockContainer::new()
            .with_export("./Failing", FailingComponent::new("no data"))
            .with_export("./Panicking", PanickingComponent),
    );
    let h = harness(
        MockManifestTransport::new(MANIFEST),
        MockArtifactFetcher::new().with("https://cdn/help/remoteEntry.js", container),
    );
    let ctx = store_for(&["sales"]).auth_context();

    let failing = h
        .loader
        .load_module::<&str>("help", "./Failing", &[], ctx.roles())
        .await
        .unwrap();
    assert!(matches!(failing.render(&ctx), Err(RenderError::Failed { .. })));

    let panicking = h
        .loader
        .load_module::<&str>("help", "./Panicking", &[], ctx.roles())
        .await
        .unwrap();
    assert!(matches!(panicking.render(&ctx), Err(RenderError::Panicked { .. })));

    // The loader keeps working after a contained panic
    assert!(h.loader.is_loaded("help", "./Failing"));
}

#[tokio::test]
async fn refreshed_manifest_replaces_cached_units() {
    const MOVED_URL: &str = "https://cdn/x2/remoteEntry.js";
    let h = harness(
        MockManifestTransport::new(MANIFEST),
        MockArtifactFetcher::new()
            .with(TRADE_URL, trade_container())
            .with(MOVED_URL, trade_container()),
    );
    let current = roles(&["trader"]);

    let first = h
        .loader
        .load_module::<&str>("tradePlans", "./App", &[], &current)
        .await
        .unwrap();
    assert_eq!(first.location(), TRADE_URL);

    // Moved to a new location
    h.transport.set_body(format!(
        r#"{{"remotes":{{"tradePlans":{{"url":"{}","requiredRoles":["trader"]}}}}}}"#,
        MOVED_URL
    ));
    h.loader.resolver().clear_cache();
    let moved = h
        .loader
        .load_module::<&str>("tradePlans", "./App", &[], &current)
        .await
        .unwrap();
    assert_eq!(moved.location(), MOVED_URL);
    assert!(!moved.same_instance(&first));
    assert_eq!(h.transport.request_count(), 2);
    assert_eq!(h.fetcher.fetch_count_for(MOVED_URL), 1);

    // Tightened roles
    h.transport.set_body(format!(
        r#"{{"remotes":{{"tradePlans":{{"url":"{}","requiredRoles":["admin"]}}}}}}"#,
        MOVED_URL
    ));
    h.loader.resolver().clear_cache();
    let err = h
        .loader
        .load_module::<&str>("tradePlans", "./App", &[], &current)
        .await
        .unwrap_err();
    assert!(err.is_denial());

    // Removed
    h.transport.set_body(r#"{"remotes":{}}"#);
    h.loader.resolver().clear_cache();
    let err = h
        .loader
        .load_module::<&str>("tradePlans", "./App", &[], &current)
        .await
        .unwrap_err();
    assert_eq!(err, LoadError::ModuleNotRegistered("tradePlans".to_string()));
    assert!(!h.loader.is_loaded("tradePlans", "./App"));
    assert_eq!(h.transport.request_count(), 4);
}

#[tokio::test]
async fn abandoned_fetch_starts_over() {
    let h = harness(
        MockManifestTransport::new(MANIFEST),
        MockArtifactFetcher::new().with(TRADE_URL, trade_container()).gated(),
    );
    let current = roles(&["trader"]);

    let hung = tokio::time::timeout(
        Duration::from_millis(20),
        h.loader.load_module::<&str>("tradePlans", "./App", &[], &current),
    )
    .await;
    assert!(hung.is_err());
    assert!(h.loader.abandon("tradePlans"));

    h.fetcher.release(1);
    h.loader
        .load_module::<&str>("tradePlans", "./App", &[], &current)
        .await
        .unwrap();
    assert_eq!(h.fetcher.fetch_count_for(TRADE_URL), 2);

    // Nothing left to abandon once the container is in place
    assert!(!h.loader.abandon("tradePlans"));
    assert!(h.loader.is_loaded("tradePlans", "./App"));
}

#[tokio::test]
async fn abandoned_manifest_request_is_reissued() {
    let h = harness(
        MockManifestTransport::new(MANIFEST).gated(),
        MockArtifactFetcher::new().with(TRADE_URL, trade_container()),
    );
    let current = roles(&["trader"]);

    let hung = tokio::time::timeout(
        Duration::from_millis(20),
        h.loader.load_module::<&str>("tradePlans", "./App", &[], &current),
    )
    .await;
    assert!(hung.is_err());
    assert!(h.loader.resolver().is_fetching());

    assert!(h.loader.abandon("tradePlans"));
    assert!(!h.loader.resolver().is_fetching());

    h.transport.release(1);
    h.loader
        .load_module::<&str>("tradePlans", "./App", &[], &current)
        .await
        .unwrap();
    assert_eq!(h.transport.request_count(), 2);
    assert_eq!(h.fetcher.fetch_count_for(TRADE_URL), 1);
}
