//! Tests for tenant data isolation.
//!
//! This module tests that reads only see the current tenant's records and
//! that suspending the tenant filter is local to its body.

use std::sync::Arc;

use helios_tenancy::backends::MemoryStore;
use helios_tenancy::scope::{self, FilterScope, Predicate, Query, TENANT_FILTER};
use helios_tenancy::tenant::{self, FixedTenant, TenantId};
use helios_tenancy::{
    EntitySchema, Queryable, Record, Repository, Tenancy, TenancyError, TenantScoped,
    TenantScoping,
};

use crate::common::*;

// ============================================================================
// Listing Tests
// ============================================================================

/// Each tenant lists only its own projects; bypassing the filter lists all.
#[tokio::test]
async fn test_projects_listed_per_tenant() {
    let repo = memory_repository();
    create_project(&repo, "a", "foobar").await;
    create_project(&repo, "b", "baz").await;
    let projects = repo.tenancy().entity("Project");

    let seen_by_a = tenant::with_tenant_async(TenantId::new("a"), repo.find(projects.all()))
        .await
        .unwrap();
    assert_eq!(names(&seen_by_a), vec!["foobar"]);

    let seen_by_b = tenant::with_tenant_async(TenantId::new("b"), repo.find(projects.all()))
        .await
        .unwrap();
    assert_eq!(names(&seen_by_b), vec!["baz"]);

    let everything = tenant::with_tenant_async(
        TenantId::new("a"),
        tenant::without_scoping_async(repo.find(projects.all())),
    )
    .await
    .unwrap();
    assert_eq!(names(&everything), vec!["baz", "foobar"]);

    let unscoped = repo.find(projects.unscoped()).await.unwrap();
    assert_eq!(names(&unscoped), vec!["baz", "foobar"]);
}

/// A record is in its own tenant's result set and nobody else's.
#[tokio::test]
async fn test_for_current_tenant_contains_only_own_records() {
    let repo = memory_repository();
    let project = create_project(&repo, "a", "foobar").await;
    let id = project.get("id").cloned().unwrap();
    let projects = repo.tenancy().entity("Project");

    for (tenant_id, expected) in [("a", true), ("b", false), ("c", false)] {
        let found = tenant::with_tenant_async(TenantId::new(tenant_id), async {
            let query = projects.for_current_tenant()?;
            repo.find(query).await
        })
        .await
        .unwrap();
        let contains = found.iter().any(|r| r.get("id") == Some(&id));
        assert_eq!(contains, expected, "tenant {}", tenant_id);
    }
}

/// `for_tenant` reads an explicit tenant regardless of the current one.
#[tokio::test]
async fn test_for_tenant_overrides_current() {
    let repo = memory_repository();
    create_project(&repo, "a", "foobar").await;
    create_project(&repo, "b", "baz").await;
    let projects = repo.tenancy().entity("Project");

    let query = projects.for_tenant(&TenantId::new("a")).unwrap();
    let found = tenant::with_tenant_async(TenantId::new("b"), repo.find(query))
        .await
        .unwrap();
    assert_eq!(names(&found), vec!["foobar"]);
}

/// Lookups by id and counts go through the same filters as listings.
#[tokio::test]
async fn test_find_by_id_and_count_are_scoped() {
    let repo = memory_repository();
    let project = create_project(&repo, "a", "foobar").await;
    create_project(&repo, "a", "qux").await;
    create_project(&repo, "b", "baz").await;
    let id = project.get("id").cloned().unwrap();
    let projects = repo.tenancy().entity("Project");

    tenant::with_tenant_async(TenantId::new("b"), async {
        assert!(repo.find_by_id("Project", id.clone()).await.unwrap().is_none());
        assert_eq!(repo.count(projects.all()).await.unwrap(), 1);
    })
    .await;

    tenant::with_tenant_async(TenantId::new("a"), async {
        assert!(repo.find_by_id("Project", id.clone()).await.unwrap().is_some());
        assert_eq!(repo.count(projects.all()).await.unwrap(), 2);
    })
    .await;
}

/// A scoped read without a tenant fails instead of leaking records.
#[tokio::test]
async fn test_read_without_tenant_fails() {
    let repo = memory_repository();
    create_project(&repo, "a", "foobar").await;
    tenant::reset();

    let err = repo
        .find(repo.tenancy().entity("Project").all())
        .await
        .unwrap_err();
    assert!(err.is_missing_tenant());

    // Entity types that are not tenant-scoped stay readable.
    assert!(repo.find(Query::new("Account")).await.unwrap().is_empty());
}

/// A fallback policy supplies the tenant when the context has none.
#[tokio::test]
async fn test_fallback_tenant_applies_to_reads() {
    let mut builder = tracker_builder();
    builder.fallback(FixedTenant::new("a"));
    let repo = Repository::new(Arc::new(builder.build().unwrap()), MemoryStore::new());
    create_project(&repo, "a", "foobar").await;
    create_project(&repo, "b", "baz").await;

    tenant::reset();
    let found = repo
        .find(repo.tenancy().entity("Project").all())
        .await
        .unwrap();
    assert_eq!(names(&found), vec!["foobar"]);
}

// ============================================================================
// Suspension Tests
// ============================================================================

/// Suspension is undone once the body exits, even when the body fails.
#[tokio::test]
async fn test_suspension_is_undone_after_failure() {
    let repo = memory_repository();
    create_project(&repo, "a", "foobar").await;
    create_project(&repo, "b", "baz").await;
    let projects = repo.tenancy().entity("Project");

    tenant::with_tenant_async(TenantId::new("a"), async {
        let failed: Result<(), TenancyError> = tenant::without_scoping_async(async {
            let all = repo.find(projects.all()).await?;
            assert_eq!(all.len(), 2);
            repo.find(Query::new("Unknown")).await.map(|_| ())
        })
        .await;
        assert!(failed.is_err());

        let after = repo.find(projects.all()).await.unwrap();
        assert_eq!(names(&after), vec!["foobar"]);
    })
    .await;
}

/// A panic inside a synchronous suspension does not leave the filter off.
#[test]
fn test_suspension_is_undone_after_panic() {
    let _tenant = tenant::enter_tenant(TenantId::new("a"));
    let result = std::panic::catch_unwind(|| {
        tenant::without_scoping(|| {
            assert!(tenant::TenantContext::snapshot().is_tenant_scoping_suspended("Project"));
            panic!("failure inside suspended body");
        })
    });
    assert!(result.is_err());
    assert!(!tenant::TenantContext::snapshot().is_tenant_scoping_suspended("Project"));
}

/// Suspending for one entity type leaves the others scoped.
#[tokio::test]
async fn test_entity_suspension_leaves_other_types_scoped() {
    let repo = memory_repository();
    let foobar = create_project(&repo, "a", "foobar").await;
    let baz = create_project(&repo, "b", "baz").await;
    create_task(&repo, "a", "write docs", &foobar).await.unwrap();
    create_task(&repo, "b", "ship it", &baz).await.unwrap();
    let tracker = repo.tenancy();

    tenant::with_tenant_async(TenantId::new("a"), async {
        scope::with_suspended_async(TENANT_FILTER, FilterScope::entity("Project"), async {
            let projects = repo.find(tracker.entity("Project").all()).await.unwrap();
            assert_eq!(projects.len(), 2);
            let tasks = repo.find(tracker.entity("Task").all()).await.unwrap();
            assert_eq!(tasks.len(), 1);
            assert_eq!(tasks[0].get_str("title"), Some("write docs"));
        })
        .await;
    })
    .await;
}

// ============================================================================
// Filter Composition Tests
// ============================================================================

/// A default filter narrows the tenant's records further.
#[tokio::test]
async fn test_default_scope_composes_with_tenant_filter() {
    let mut builder = tracker_builder();
    builder
        .default_scope("Project", |_| Ok(Predicate::eq("archived", false)))
        .unwrap();
    let repo = Repository::new(Arc::new(builder.build().unwrap()), MemoryStore::new());

    tenant::with_tenant_async(TenantId::new("a"), async {
        for (name, archived) in [("foobar", false), ("old", true)] {
            let mut project = Record::new("Project")
                .with("name", name)
                .with("archived", archived);
            repo.save(&mut project).await.unwrap();
        }
    })
    .await;
    tenant::with_tenant_async(TenantId::new("b"), async {
        let mut project = Record::new("Project")
            .with("name", "baz")
            .with("archived", false);
        repo.save(&mut project).await.unwrap();
    })
    .await;

    let projects = repo.tenancy().entity("Project");
    tenant::with_tenant_async(TenantId::new("a"), async {
        let visible = repo.find(projects.all()).await.unwrap();
        assert_eq!(names(&visible), vec!["foobar"]);

        let with_archived = repo
            .find(projects.all().without_filter("default"))
            .await
            .unwrap();
        assert_eq!(names(&with_archived), vec!["foobar", "old"]);

        let all_unarchived = tenant::without_scoping_async(repo.find(projects.all()))
            .await
            .unwrap();
        assert_eq!(names(&all_unarchived), vec!["baz", "foobar"]);
    })
    .await;
}

/// Records with a null tenant are shared when global records are enabled.
#[tokio::test]
async fn test_global_records_visible_to_every_tenant() {
    let mut builder = Tenancy::builder();
    builder
        .entity(EntitySchema::new("Account"))
        .unwrap()
        .entity(EntitySchema::new("Label").belongs_to("account", "Account"))
        .unwrap()
        .register_tenant_scoping(
            "Label",
            TenantScoping::owned_by("Account").with_global_records(),
        )
        .unwrap();
    let repo = Repository::new(Arc::new(builder.build().unwrap()), MemoryStore::new());

    tenant::without_scoping_async(async {
        let mut shared = Record::new("Label").with("name", "urgent");
        repo.save(&mut shared).await.unwrap();
        assert_eq!(shared.get("account_id"), None);
    })
    .await;
    for (tenant_id, name) in [("a", "mine"), ("b", "theirs")] {
        let mut label = Record::new("Label").with("name", name);
        tenant::with_tenant_async(TenantId::new(tenant_id), repo.save(&mut label))
            .await
            .unwrap();
    }

    let labels = repo.tenancy().entity("Label");
    let seen_by_a = tenant::with_tenant_async(TenantId::new("a"), repo.find(labels.all()))
        .await
        .unwrap();
    assert_eq!(names(&seen_by_a), vec!["mine", "urgent"]);
}
