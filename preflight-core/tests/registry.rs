use async_trait::async_trait;
use preflight_core::context::Context;
use preflight_core::registry::{self, Registry};
use preflight_core::validation::{Validator, ValidatorMetadata, ValidatorResult};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

struct NamedValidator {
    name: &'static str,
    description: &'static str,
}

fn named(name: &'static str, description: &'static str) -> Arc<dyn Validator> {
    Arc::new(NamedValidator { name, description })
}

#[async_trait]
impl Validator for NamedValidator {
    fn metadata(&self) -> ValidatorMetadata {
        ValidatorMetadata {
            name: self.name.to_string(),
            description: self.description.to_string(),
            run_after: vec![],
            tags: vec![],
        }
    }

    fn enabled(&self, _ctx: &Context) -> bool {
        true
    }

    async fn validate(&self, _cancel: CancellationToken, _ctx: Arc<Context>) -> ValidatorResult {
        ValidatorResult::success("OK", "ok")
    }
}

#[test]
fn instance_registry_replaces_duplicates() {
    let registry = Registry::new();
    registry.register(named("dup", "first"));
    registry.register(named("dup", "second"));

    assert_eq!(registry.get_all().len(), 1);
    assert_eq!(registry.get("dup").unwrap().metadata().description, "second");
}

#[test]
fn instance_registry_get_and_clear() {
    let registry = Registry::new();
    registry.register(named("one", ""));
    registry.register(named("two", ""));

    assert!(registry.get("one").is_some());
    assert!(registry.get("missing").is_none());
    assert_eq!(registry.get_all().len(), 2);

    registry.clear();
    assert!(registry.get_all().is_empty());
}

#[test]
fn global_registry_round_trips() {
    registry::register(named("global-roundtrip", ""));

    let found = registry::get("global-roundtrip").unwrap();
    assert_eq!(found.metadata().name, "global-roundtrip");
    assert!(registry::get_all()
        .iter()
        .any(|v| v.metadata().name == "global-roundtrip"));
}

#[test]
#[should_panic(expected = "validator already registered: global-duplicate")]
fn global_registry_rejects_duplicates() {
    registry::register(named("global-duplicate", "first"));
    registry::register(named("global-duplicate", "second"));
}
