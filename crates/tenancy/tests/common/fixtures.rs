//! Fixtures for tenancy testing.
//!
//! The domain is a small project tracker: `Account` is the tenant owner,
//! `Project` belongs to an account and `Task` belongs to both an account and
//! a project.

use std::sync::Arc;

use helios_tenancy::backends::MemoryStore;
use helios_tenancy::core::EntityStore;
use helios_tenancy::tenant::{self, TenantId};
use helios_tenancy::{
    EntitySchema, Record, Repository, Tenancy, TenancyBuilder, TenancyResult, TenantScoping,
};

/// Builder with the Account / Project / Task domain declared and Project and
/// Task registered for tenant scoping.
pub fn tracker_builder() -> TenancyBuilder {
    let mut builder = Tenancy::builder();
    builder
        .entity(EntitySchema::new("Account"))
        .expect("declare Account")
        .entity(EntitySchema::new("Project").belongs_to("account", "Account"))
        .expect("declare Project")
        .entity(
            EntitySchema::new("Task")
                .belongs_to("account", "Account")
                .belongs_to("project", "Project"),
        )
        .expect("declare Task")
        .register_tenant_scoping("Project", TenantScoping::owned_by("Account"))
        .expect("register Project")
        .register_tenant_scoping("Task", TenantScoping::owned_by("Account"))
        .expect("register Task");
    builder
}

/// The tracker domain, built with default configuration.
pub fn tracker() -> Arc<Tenancy> {
    Arc::new(tracker_builder().build().expect("build tracker tenancy"))
}

/// Repository over a fresh in-memory store.
pub fn memory_repository() -> Repository<MemoryStore> {
    Repository::new(tracker(), MemoryStore::new())
}

/// Saves a new project named `name` on behalf of `tenant`.
pub async fn create_project<S: EntityStore>(
    repo: &Repository<S>,
    tenant: &str,
    name: &str,
) -> Record {
    let mut project = Record::new("Project").with("name", name);
    tenant::with_tenant_async(TenantId::new(tenant), repo.save(&mut project))
        .await
        .expect("save project");
    project
}

/// Saves a new task linked to `project` on behalf of `tenant`.
pub async fn create_task<S: EntityStore>(
    repo: &Repository<S>,
    tenant: &str,
    title: &str,
    project: &Record,
) -> TenancyResult<Record> {
    let mut task = Record::new("Task")
        .with("title", title)
        .with("project_id", project.get("id").cloned().unwrap_or_default());
    tenant::with_tenant_async(TenantId::new(tenant), repo.save(&mut task)).await?;
    Ok(task)
}

/// Sorted `name` attributes of the given records.
pub fn names(records: &[Record]) -> Vec<String> {
    let mut names: Vec<String> = records
        .iter()
        .filter_map(|r| r.get_str("name").map(str::to_string))
        .collect();
    names.sort();
    names
}
