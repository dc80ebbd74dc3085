//! End-to-end coverage driving the full facade: register resources through
//! the sink a `MonitorService` would use, finish the update, and verify the
//! persisted snapshot — exercising the generator, executor and snapshot
//! manager together rather than each in isolation.

use std::sync::Arc;

use converge::Engine;
use converge_core::config::EngineSettings;
use converge_core::{PropertyMap, PropertyValue, Snapshot, TargetSet};
use converge_generator::Registration;
use converge_grpc::RegistrationSink;
use converge_registry::ProviderRegistry;
use converge_snapshot::PersistencePort;
use converge_test::{test_manifest, FakeProvider, FakeProviderScript, SingleLoader};

fn settings() -> EngineSettings {
    EngineSettings {
        parallel: 4,
        ..EngineSettings::default()
    }
}

fn bucket_urn(stack: &str, name: &str) -> converge_core::Urn {
    converge_core::Urn::new(stack, "proj", "", "aws:s3:Bucket", name)
}

#[tokio::test]
async fn update_registers_two_independent_resources_and_persists_the_result() {
    let provider = Arc::new(FakeProvider::new(FakeProviderScript::default()));
    let registry = Arc::new(ProviderRegistry::new(Arc::new(SingleLoader::new(provider.clone()))));
    let engine = Engine::new(registry, settings());

    let base = Snapshot::empty(test_manifest());
    let session = engine.begin_update(base, TargetSet::All, false);
    let sink = session.sink();

    let mut reg_a = Registration::new(bucket_urn("dev", "a"), true, "aws:s3:Bucket");
    let mut input = PropertyMap::new();
    input.insert("size".into(), PropertyValue::Plain(serde_json::json!(1)));
    reg_a.inputs = input;
    let outcome_a = sink.submit(reg_a).await.unwrap();
    assert!(!outcome_a.id.is_empty());

    let reg_b = Registration::new(bucket_urn("dev", "b"), true, "aws:s3:Bucket");
    let outcome_b = sink.submit(reg_b).await.unwrap();
    assert_ne!(outcome_a.id, outcome_b.id);

    let persistence = converge_snapshot::InMemoryPersistence::new();
    let report = session.finish(&persistence).await.unwrap();
    assert!(report.is_clean());
    assert!(report.deleted.is_empty());

    let persisted = persistence.load().await.unwrap().expect("snapshot was saved");
    assert_eq!(persisted.resources.len(), 2);
    assert!(persisted.verify_integrity().is_ok());
    assert_eq!(provider.calls().iter().filter(|c| *c == "create").count(), 2);
}

#[tokio::test]
async fn a_resource_dropped_from_the_program_is_deleted_on_finish() {
    let provider = Arc::new(FakeProvider::new(FakeProviderScript::default()));
    let registry = Arc::new(ProviderRegistry::new(Arc::new(SingleLoader::new(provider.clone()))));
    let engine = Engine::new(registry.clone(), settings());

    let urn = bucket_urn("dev", "gone");
    let mut base = Snapshot::empty(test_manifest());
    let mut row = converge_core::ResourceState::new(urn.clone(), true, "aws:s3:Bucket");
    row.provider = Some(converge_core::ProviderReference::new(
        converge_core::Urn::new("dev", "proj", "", "pulumi:providers:aws", "default"),
        "p1",
    ));
    base.resources.push(row);
    registry.get_or_create("aws", "1.0.0", "p1", &PropertyMap::new()).await.unwrap();

    let session = engine.begin_update(base, TargetSet::All, false);
    drop(session.sink());

    let persistence = converge_snapshot::InMemoryPersistence::new();
    let report = session.finish(&persistence).await.unwrap();

    assert_eq!(report.deleted, vec![urn]);
    let persisted = persistence.load().await.unwrap().unwrap();
    assert!(persisted.resources.is_empty());
    assert_eq!(provider.calls(), vec!["delete".to_string()]);
}

#[tokio::test]
async fn renaming_a_resource_via_alias_adopts_the_old_row_instead_of_recreating() {
    let provider = Arc::new(FakeProvider::new(FakeProviderScript::default()));
    let registry = Arc::new(ProviderRegistry::new(Arc::new(SingleLoader::new(provider.clone()))));
    registry.get_or_create("aws", "1.0.0", "p1", &PropertyMap::new()).await.unwrap();

    let old_urn = bucket_urn("dev", "old-name");
    let mut base = Snapshot::empty(test_manifest());
    let mut row = converge_core::ResourceState::new(old_urn.clone(), true, "aws:s3:Bucket");
    row.id = "existing-id".into();
    row.provider = Some(converge_core::ProviderReference::new(
        converge_core::Urn::new("dev", "proj", "", "pulumi:providers:aws", "default"),
        "p1",
    ));
    base.resources.push(row);

    let engine = Engine::new(registry, settings());
    let session = engine.begin_update(base, TargetSet::All, false);
    let sink = session.sink();

    let new_urn = bucket_urn("dev", "new-name");
    let mut reg = Registration::new(new_urn.clone(), true, "aws:s3:Bucket");
    reg.provider = Some(converge_core::ProviderReference::new(
        converge_core::Urn::new("dev", "proj", "", "pulumi:providers:aws", "default"),
        "p1",
    ));
    reg.alias_urns = vec![old_urn];
    let outcome = sink.submit(reg).await.unwrap();
    assert_eq!(outcome.id, "existing-id");

    drop(sink);
    let persistence = converge_snapshot::InMemoryPersistence::new();
    let report = session.finish(&persistence).await.unwrap();
    assert!(report.is_clean());

    let persisted = persistence.load().await.unwrap().unwrap();
    assert_eq!(persisted.resources.len(), 1);
    assert_eq!(persisted.resources[0].urn, new_urn);
    // An alias adoption is a Same, not a create: the provider is never called.
    assert!(provider.calls().is_empty());
}
