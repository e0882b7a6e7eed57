use super::*;
use crate::error::ErrorKind;
use crate::mocks::{MockArtifactFetcher, MockComponent, MockContainer, MockManifestTransport};
use crate::scope::HostLibrary;

const KYC_URL: &str = "https://cdn/kyc/remoteEntry.js";

fn roles(items: &[&str]) -> RoleSet {
    items.iter().map(|s| s.to_string()).collect()
}

fn bootstrapped_scope() -> Arc<SharedScope> {
    let scope = Arc::new(SharedScope::new("shell"));
    scope.bootstrap(&[HostLibrary::new("runtime", "1.0.0", Arc::new(42u32))]);
    scope
}

fn dev_loader(fetcher: Arc<MockArtifactFetcher>, scope: Arc<SharedScope>) -> ModuleLoader {
    let transport = Arc::new(MockManifestTransport::failing_with(500));
    let resolver = Arc::new(ManifestResolver::new("https://cdn/manifest.json", transport));
    ModuleLoader::new(
        LoaderMode::development([("kycQueue", KYC_URL)]),
        resolver,
        fetcher,
        scope,
    )
}

fn kyc_fetcher() -> Arc<MockArtifactFetcher> {
    let container = MockContainer::new().with_export("./Queue", MockComponent::new("queue"));
    Arc::new(MockArtifactFetcher::new().with(KYC_URL, Arc::new(container)))
}

#[test]
fn test_development_mode_constructor() {
    let mode = LoaderMode::development([("a", "https://a"), ("b", "https://b")]);
    assert!(mode.is_development());
    assert!(!LoaderMode::Manifest.is_development());

    match mode {
        LoaderMode::Development { locations } => {
            assert_eq!(locations.len(), 2);
            assert_eq!(locations["a"], "https://a");
        }
        LoaderMode::Manifest => unreachable!(),
    }
}

#[tokio::test]
async fn test_development_mode_skips_manifest() {
    let fetcher = kyc_fetcher();
    let loader = dev_loader(fetcher.clone(), bootstrapped_scope());

    let unit = loader
        .load_module("kycQueue", "./Queue", &["kyc-reviewer"], &roles(&["kyc-reviewer"]))
        .await
        .unwrap();

    assert_eq!(unit.location(), KYC_URL);
    assert_eq!(loader.resolver().request_count(), 0);
    assert_eq!(fetcher.fetch_count(), 1);
}

#[tokio::test]
async fn test_development_mode_unknown_name() {
    let fetcher = kyc_fetcher();
    let loader = dev_loader(fetcher.clone(), bootstrapped_scope());

    let err = loader
        .load_module::<&str>("annuityPipeline", "./App", &[], &RoleSet::new())
        .await
        .unwrap_err();

    assert_eq!(err, LoadError::ModuleNotRegistered("annuityPipeline".to_string()));
    assert_eq!(fetcher.fetch_count(), 0);
}

#[tokio::test]
async fn test_load_before_bootstrap_is_refused() {
    let fetcher = kyc_fetcher();
    let loader = dev_loader(fetcher.clone(), Arc::new(SharedScope::new("shell")));

    let err = loader
        .load_module::<&str>("kycQueue", "./Queue", &[], &RoleSet::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Initialization);
    assert_eq!(fetcher.fetch_count(), 0);
}

#[tokio::test]
async fn test_cached_unit_is_reused() {
    let fetcher = kyc_fetcher();
    let loader = dev_loader(fetcher.clone(), bootstrapped_scope());
    let current = roles(&["kyc-reviewer"]);

    let first = loader
        .load_module("kycQueue", "./Queue", &["kyc-reviewer"], &current)
        .await
        .unwrap();
    let second = loader
        .load_module("kycQueue", "./Queue", &["kyc-reviewer"], &current)
        .await
        .unwrap();

    assert!(first.same_instance(&second));
    assert!(loader.is_loaded("kycQueue", "./Queue"));
    assert_eq!(fetcher.fetch_count(), 1);
}

#[tokio::test]
async fn test_cached_unit_still_requires_roles() {
    let fetcher = kyc_fetcher();
    let loader = dev_loader(fetcher, bootstrapped_scope());

    loader
        .load_module("kycQueue", "./Queue", &["kyc-reviewer"], &roles(&["kyc-reviewer"]))
        .await
        .unwrap();

    let err = loader
        .load_module("kycQueue", "./Queue", &["kyc-reviewer"], &roles(&["sales-agent"]))
        .await
        .unwrap_err();
    assert!(err.is_denial());
}

#[tokio::test]
async fn test_evict_and_clear() {
    let fetcher = kyc_fetcher();
    let loader = dev_loader(fetcher.clone(), bootstrapped_scope());

    loader
        .load_module::<&str>("kycQueue", "./Queue", &[], &RoleSet::new())
        .await
        .unwrap();
    assert_eq!(loader.loaded_locations(), vec![KYC_URL.to_string()]);

    assert_eq!(loader.evict("kycQueue"), 1);
    assert!(!loader.is_loaded("kycQueue", "./Queue"));
    assert!(loader.loaded_locations().is_empty());
    assert_eq!(loader.evict("kycQueue"), 0);

    loader
        .load_module::<&str>("kycQueue", "./Queue", &[], &RoleSet::new())
        .await
        .unwrap();
    assert_eq!(fetcher.fetch_count(), 2);

    loader.clear();
    assert!(!loader.is_loaded("kycQueue", "./Queue"));
    assert!(loader.loaded_locations().is_empty());
}

#[tokio::test]
async fn test_abandon_drops_only_unfinished_loads() {
    let container = MockContainer::new().with_export("./Queue", MockComponent::new("queue"));
    let fetcher = Arc::new(MockArtifactFetcher::new().with(KYC_URL, Arc::new(container)).gated());
    let loader = dev_loader(fetcher.clone(), bootstrapped_scope());

    assert!(!loader.abandon("annuityPipeline"));
    assert!(!loader.abandon("kycQueue"));

    let hung = tokio::time::timeout(
        std::time::Duration::from_millis(20),
        loader.load_module::<&str>("kycQueue", "./Queue", &[], &RoleSet::new()),
    )
    .await;
    assert!(hung.is_err());
    assert_eq!(loader.loaded_locations(), vec![KYC_URL.to_string()]);

    assert!(loader.abandon("kycQueue"));
    assert!(loader.loaded_locations().is_empty());

    fetcher.release(1);
    loader
        .load_module::<&str>("kycQueue", "./Queue", &[], &RoleSet::new())
        .await
        .unwrap();
    assert_eq!(fetcher.fetch_count(), 2);
    assert!(!loader.abandon("kycQueue"));
}
