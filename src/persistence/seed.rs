//! Demo data for a freshly reset database.

use std::sync::Arc;

use tracing::info;

use crate::models::client::{Client, NewClient};
use crate::models::task::{NewTask, ServiceCategory, Task, TaskStatus, TaskType, Urgency};
use crate::Result;

use super::client_repo::ClientRepo;
use super::db::Database;
use super::dependency_repo::DependencyRepo;
use super::task_repo::TaskRepo;

/// Records created by [`seed_demo_data`].
#[derive(Debug, Clone)]
pub struct SeedSummary {
    /// Demo clients.
    pub clients: Vec<Client>,
    /// Demo tasks, all owned by the first client.
    pub tasks: Vec<Task>,
}

/// Insert two demo clients, three tasks, and one dependency edge.
///
/// # Errors
///
/// Returns `AppError::Validation` if a demo email is already registered, or
/// `AppError::Db` if any insert fails.
pub async fn seed_demo_data(db: Arc<Database>) -> Result<SeedSummary> {
    let clients_repo = ClientRepo::new(Arc::clone(&db));
    let tasks_repo = TaskRepo::new(Arc::clone(&db));
    let deps_repo = DependencyRepo::new(db);

    let acme = clients_repo
        .create(&NewClient {
            organization_name: "Acme Corp".into(),
            first_name: "John".into(),
            last_name: "Doe".into(),
            email: "john.doe@acme.com".into(),
            phone: Some("+1 (555) 000-0000".into()),
            services: vec![
                ServiceCategory::Strategy,
                ServiceCategory::Design,
                ServiceCategory::Dev,
            ],
        })
        .await?;
    let techstart = clients_repo
        .create(&NewClient {
            organization_name: "TechStart Inc".into(),
            first_name: "Jane".into(),
            last_name: "Smith".into(),
            email: "jane.smith@techstart.com".into(),
            phone: Some("+1 (555) 111-1111".into()),
            services: vec![ServiceCategory::Dev, ServiceCategory::Consult],
        })
        .await?;

    let specs = [
        (
            TaskType::FeatureRequest,
            ServiceCategory::Dev,
            Urgency::Medium,
            TaskStatus::Open,
            "Implement User Authentication",
            "Add OAuth2 authentication flow for users",
        ),
        (
            TaskType::Research,
            ServiceCategory::Strategy,
            Urgency::Low,
            TaskStatus::InProgress,
            "Market Analysis",
            "Research competitor pricing models",
        ),
        (
            TaskType::Bug,
            ServiceCategory::Dev,
            Urgency::Urgent,
            TaskStatus::NeedsReview,
            "Fix Payment Processing",
            "Users receiving duplicate charges",
        ),
    ];

    let mut tasks = Vec::with_capacity(specs.len());
    for (task_type, service_category, urgency, status, title, description) in specs {
        let task = tasks_repo
            .create(&NewTask {
                client_id: acme.id,
                task_type,
                service_category,
                urgency,
                status,
                title: title.into(),
                description: Some(description.into()),
            })
            .await?;
        tasks.push(task);
    }

    if let [first, second, ..] = tasks.as_slice() {
        deps_repo.add(second.id, first.id).await?;
    }

    info!(clients = 2, tasks = tasks.len(), "demo data seeded");
    Ok(SeedSummary {
        clients: vec![acme, techstart],
        tasks,
    })
}
