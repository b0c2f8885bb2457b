//! Tests for tenant enforcement on writes.
//!
//! This module tests auto-population of the tenant attribute, write
//! protection of persisted tenants and rejection of cross-tenant references.

use std::sync::Arc;

use serde_json::Value;

use helios_tenancy::backends::MemoryStore;
use helios_tenancy::scope::Query;
use helios_tenancy::tenant::{self, FixedTenant, TenantId};
use helios_tenancy::{
    BackendError, EntitySchema, Queryable, Record, Repository, Tenancy, TenancyConfig, TenancyError,
    TenantError, TenantScoping, ValidationKind,
};

use crate::common::*;

fn validation_kinds(err: &TenancyError) -> Vec<ValidationKind> {
    match err {
        TenancyError::Validation(err) => err.details().iter().map(|d| d.kind.clone()).collect(),
        other => panic!("expected a validation error, got {other}"),
    }
}

// ============================================================================
// Auto-population Tests
// ============================================================================

/// A new record saved without a tenant gets the current one.
#[tokio::test]
async fn test_new_record_gets_current_tenant() {
    let repo = memory_repository();
    let project = create_project(&repo, "a", "foobar").await;
    assert_eq!(project.get_str("account_id"), Some("a"));

    let stored = repo
        .find(Query::new("Project").unscoped())
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].get_str("account_id"), Some("a"));
}

/// Integer tenant keys are stored as integers.
#[tokio::test]
async fn test_integer_tenant_is_stamped() {
    let repo = memory_repository();
    let mut project = Record::new("Project").with("name", "foobar");
    tenant::with_tenant_async(TenantId::from(42), repo.save(&mut project))
        .await
        .unwrap();
    assert_eq!(project.get("account_id"), Some(&Value::from(42)));
}

/// Saving without any tenant fails and writes nothing.
#[tokio::test]
async fn test_save_without_tenant_fails() {
    let repo = memory_repository();
    tenant::reset();
    let mut project = Record::new("Project").with("name", "foobar");
    let err = repo.save(&mut project).await.unwrap_err();
    assert!(err.is_missing_tenant());
    assert!(repo.store().is_empty("Project"));
}

/// A null tenant left by a suspended write is filled in by the next save.
#[tokio::test]
async fn test_null_tenant_is_backfilled() {
    let repo = memory_repository();
    let mut project = Record::new("Project").with("name", "imported");
    tenant::with_tenant_async(
        TenantId::new("a"),
        tenant::without_scoping_async(repo.save(&mut project)),
    )
    .await
    .unwrap();
    assert_eq!(project.get("account_id"), None);

    tenant::with_tenant_async(TenantId::new("a"), async {
        project.set("name", "imported and claimed");
        repo.save(&mut project).await.unwrap();
    })
    .await;
    assert_eq!(project.get_str("account_id"), Some("a"));

    let seen_by_a = tenant::with_tenant_async(
        TenantId::new("a"),
        repo.find(repo.tenancy().entity("Project").all()),
    )
    .await
    .unwrap();
    assert_eq!(names(&seen_by_a), vec!["imported and claimed"]);
}

// ============================================================================
// Write Protection Tests
// ============================================================================

/// The persisted tenant can be re-assigned its own value only.
#[tokio::test]
async fn test_assign_tenant_attribute() {
    let repo = memory_repository();
    let tracker = repo.tenancy().clone();
    let mut project = create_project(&repo, "a", "foobar").await;

    let err = tracker
        .assign(&mut project, "account_id", "b")
        .unwrap_err();
    assert!(err.is_tenant_immutable());
    assert_eq!(project.get_str("account_id"), Some("a"));

    tracker.assign(&mut project, "account_id", "a").unwrap();
    assert!(!project.is_changed("account_id"));

    tracker.assign(&mut project, "name", "renamed").unwrap();
    assert_eq!(project.get_str("name"), Some("renamed"));

    tenant::without_scoping(|| tracker.assign(&mut project, "account_id", "b")).unwrap();
    assert_eq!(project.get_str("account_id"), Some("b"));
}

/// Unsaved records and records with a null stored tenant accept any value.
#[tokio::test]
async fn test_assign_before_tenant_is_fixed() {
    let repo = memory_repository();
    let tracker = repo.tenancy().clone();

    let mut fresh = Record::new("Project");
    tracker.assign(&mut fresh, "account_id", "a").unwrap();
    tracker.assign(&mut fresh, "account_id", "b").unwrap();
    assert_eq!(fresh.get_str("account_id"), Some("b"));

    let mut orphan = Record::new("Project").with("name", "orphan");
    tenant::without_scoping_async(repo.save(&mut orphan))
        .await
        .unwrap();
    assert!(orphan.is_persisted());
    tracker.assign(&mut orphan, "account_id", "a").unwrap();
}

/// Reassigning a persisted tenant with a plain setter is caught on save.
#[tokio::test]
async fn test_tenant_hijack_rejected_on_save() {
    let repo = memory_repository();
    let project = create_project(&repo, "a", "foobar").await;

    let mut hijacked = project.clone();
    hijacked.set("account_id", "b");
    let err = tenant::with_tenant_async(TenantId::new("b"), repo.save(&mut hijacked))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TenancyError::Tenant(TenantError::TenantImmutable { .. })
    ));

    let stored = repo.find(Query::new("Project").unscoped()).await.unwrap();
    assert_eq!(stored[0].get_str("account_id"), Some("a"));
}

/// Another tenant cannot write a record it got hold of.
#[tokio::test]
async fn test_other_tenant_cannot_update() {
    let repo = memory_repository();
    let project = create_project(&repo, "a", "foobar").await;

    let mut stolen = project.clone();
    stolen.set("name", "pwned");
    let err = tenant::with_tenant_async(TenantId::new("b"), repo.save(&mut stolen))
        .await
        .unwrap_err();
    assert!(validation_kinds(&err).iter().any(|kind| matches!(
        kind,
        ValidationKind::TenantMismatch { expected, actual }
            if *expected == TenantId::new("b") && *actual == TenantId::new("a")
    )));

    let stored = repo.find(Query::new("Project").unscoped()).await.unwrap();
    assert_eq!(names(&stored), vec!["foobar"]);
}

/// Updating a scoped record requires a current tenant.
#[tokio::test]
async fn test_update_without_tenant_is_rejected() {
    let repo = memory_repository();
    let project = create_project(&repo, "a", "foobar").await;

    let mut renamed = project.clone();
    renamed.set("name", "pwned");
    let err = repo.save(&mut renamed).await.unwrap_err();
    assert!(err.is_missing_tenant());

    let stored = repo.find(Query::new("Project").unscoped()).await.unwrap();
    assert_eq!(names(&stored), vec!["foobar"]);
}

/// Without the write-side check, another tenant still cannot reach the row.
#[tokio::test]
async fn test_other_tenant_cannot_update_when_check_disabled() {
    let mut builder = tracker_builder();
    builder.config(TenancyConfig {
        enforce_current_tenant_on_write: false,
        ..TenancyConfig::default()
    });
    let repo = Repository::new(Arc::new(builder.build().unwrap()), MemoryStore::new());
    let project = create_project(&repo, "a", "foobar").await;

    let mut stolen = project.clone();
    stolen.set("name", "pwned");
    let err = tenant::with_tenant_async(TenantId::new("b"), repo.save(&mut stolen))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TenancyError::Backend(BackendError::RecordNotFound { ref entity, .. }) if entity == "Project"
    ));

    let stored = repo.find(Query::new("Project").unscoped()).await.unwrap();
    assert_eq!(names(&stored), vec!["foobar"]);
    assert_eq!(stored[0].get_str("account_id"), Some("a"));

    let mut renamed = project.clone();
    renamed.set("name", "qux");
    tenant::with_tenant_async(TenantId::new("a"), repo.save(&mut renamed))
        .await
        .unwrap();
    let stored = repo.find(Query::new("Project").unscoped()).await.unwrap();
    assert_eq!(names(&stored), vec!["qux"]);
}

/// The fallback tenant counts as current when checking an explicit tenant.
#[tokio::test]
async fn test_explicit_tenant_checked_against_fallback() {
    let mut builder = tracker_builder();
    builder.fallback(FixedTenant::new("a"));
    let repo = Repository::new(Arc::new(builder.build().unwrap()), MemoryStore::new());

    let mut project = Record::new("Project")
        .with("name", "foobar")
        .with("account_id", "b");
    let err = repo.save(&mut project).await.unwrap_err();
    assert!(validation_kinds(&err).iter().any(|kind| matches!(
        kind,
        ValidationKind::TenantMismatch { expected, actual }
            if *expected == TenantId::new("a") && *actual == TenantId::new("b")
    )));
    assert!(repo.store().is_empty("Project"));

    let mut project = Record::new("Project").with("name", "foobar");
    repo.save(&mut project).await.unwrap();
    assert_eq!(project.get_str("account_id"), Some("a"));
}

/// With the write-side check off, an explicit tenant is kept as is.
#[tokio::test]
async fn test_explicit_tenant_kept_when_check_disabled() {
    let mut builder = tracker_builder();
    builder.config(TenancyConfig {
        enforce_current_tenant_on_write: false,
        ..TenancyConfig::default()
    });
    let repo = Repository::new(Arc::new(builder.build().unwrap()), MemoryStore::new());

    let mut project = Record::new("Project")
        .with("name", "foobar")
        .with("account_id", "a");
    tenant::with_tenant_async(TenantId::new("b"), repo.save(&mut project))
        .await
        .unwrap();
    assert_eq!(project.get_str("account_id"), Some("a"));
}

// ============================================================================
// Cross-tenant Association Tests
// ============================================================================

/// References within the tenant and null references pass.
#[tokio::test]
async fn test_same_tenant_and_null_references_pass() {
    let repo = memory_repository();
    let project = create_project(&repo, "a", "foobar").await;

    let task = create_task(&repo, "a", "write docs", &project).await.unwrap();
    assert_eq!(task.get("project_id"), project.get("id"));

    let mut loose = Record::new("Task").with("title", "triage");
    tenant::with_tenant_async(TenantId::new("a"), repo.save(&mut loose))
        .await
        .unwrap();
}

/// A reference to another tenant's record fails and names the association.
#[tokio::test]
async fn test_reference_to_other_tenant_fails() {
    let repo = memory_repository();
    let theirs = create_project(&repo, "b", "baz").await;

    let err = create_task(&repo, "a", "sneaky", &theirs).await.unwrap_err();
    assert_eq!(err.cross_tenant_associations(), vec!["project"]);
    assert!(repo.store().is_empty("Task"));
}

/// Relinking a task to another tenant's project from a third tenant fails.
#[tokio::test]
async fn test_relink_from_third_tenant_fails() {
    let repo = memory_repository();
    let ours = create_project(&repo, "a", "foobar").await;
    let theirs = create_project(&repo, "b", "baz").await;
    let mut task = create_task(&repo, "a", "write docs", &ours).await.unwrap();

    task.set("project_id", theirs.get("id").cloned().unwrap());
    let err = tenant::with_tenant_async(TenantId::new("c"), repo.save(&mut task))
        .await
        .unwrap_err();
    assert!(err.cross_tenant_associations().contains(&"project"));

    let stored = repo.find(Query::new("Task").unscoped()).await.unwrap();
    assert_eq!(stored[0].get("project_id"), ours.get("id"));
}

/// Suspended contexts may link across tenants on purpose.
#[tokio::test]
async fn test_suspended_context_may_link_across_tenants() {
    let repo = memory_repository();
    let theirs = create_project(&repo, "b", "baz").await;

    let mut task = Record::new("Task")
        .with("title", "migrated")
        .with("account_id", "a")
        .with("project_id", theirs.get("id").cloned().unwrap());
    tenant::with_tenant_async(
        TenantId::new("a"),
        tenant::without_scoping_async(repo.save(&mut task)),
    )
    .await
    .unwrap();
    assert_eq!(repo.store().len("Task"), 1);
}

/// References to the tenant owner itself are not checked.
#[tokio::test]
async fn test_owner_reference_is_not_checked() {
    let repo = memory_repository();
    let mut project = Record::new("Project")
        .with("name", "foobar")
        .with("account_id", "a");
    tenant::with_tenant_async(TenantId::new("a"), repo.save(&mut project))
        .await
        .unwrap();
    assert!(repo.store().is_empty("Account"));
}

// ============================================================================
// Uniqueness Tests
// ============================================================================

/// Unique fields are unique per tenant, not globally.
#[tokio::test]
async fn test_unique_within_tenant() {
    let mut builder = Tenancy::builder();
    builder
        .entity(EntitySchema::new("Account"))
        .unwrap()
        .entity(EntitySchema::new("Project").belongs_to("account", "Account"))
        .unwrap()
        .register_tenant_scoping(
            "Project",
            TenantScoping::owned_by("Account").unique_within_tenant("name"),
        )
        .unwrap();
    let repo = Repository::new(Arc::new(builder.build().unwrap()), MemoryStore::new());

    let mut first = create_project(&repo, "a", "foobar").await;
    create_project(&repo, "b", "foobar").await;

    let mut duplicate = Record::new("Project").with("name", "foobar");
    let err = tenant::with_tenant_async(TenantId::new("a"), repo.save(&mut duplicate))
        .await
        .unwrap_err();
    assert!(matches!(
        validation_kinds(&err).as_slice(),
        [ValidationKind::NotUniqueWithinTenant { .. }]
    ));

    // Saving the holder of the value again is fine.
    tenant::with_tenant_async(TenantId::new("a"), async {
        first.set("archived", true);
        repo.save(&mut first).await.unwrap();
    })
    .await;

    let all = repo.tenancy().entity("Project").unscoped();
    assert_eq!(repo.count(all).await.unwrap(), 2);
}
