//! Text classification behind a pluggable oracle.
//!
//! The [`Classifier`] trait decouples the intake pipeline from the model
//! vendor. [`openai::OpenAiClassifier`] is the production implementation;
//! tests substitute deterministic stand-ins.

pub mod openai;

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::models::task::{ServiceCategory, TaskType, Urgency};
use crate::{AppError, Result};

/// Structured result of classifying one message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    /// Kind of work requested.
    pub task_type: TaskType,
    /// Service line the work belongs to.
    pub service_category: ServiceCategory,
    /// How soon the work is needed.
    pub urgency: Urgency,
    /// Concise title.
    pub title: String,
    /// Clear description.
    pub description: String,
}

/// Oracle that turns free text into a [`Classification`].
pub trait Classifier: Send + Sync {
    /// Classify `text`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Classification` if the oracle is unreachable or
    /// its answer lacks a usable value for any field.
    fn classify<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Classification>> + Send + 'a>>;
}

/// Canonical key form: lowercase with spaces, underscores, and hyphens removed.
fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, ' ' | '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Non-empty string value stored under any spelling of `field`.
fn field<'a>(object: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    let wanted = normalize_key(field);
    object
        .iter()
        .find(|(key, _)| normalize_key(key) == wanted)
        .and_then(|(_, value)| value.as_str())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Enum value matched case-insensitively against its stored form.
fn parse_code<T>(raw: &str, parse: fn(&str) -> Option<T>) -> Option<T> {
    parse(raw)
        .or_else(|| parse(&raw.to_uppercase()))
        .or_else(|| parse(&raw.to_lowercase()))
        .or_else(|| parse(&raw.replace([' ', '-'], "_").to_uppercase()))
}

/// Build a [`Classification`] from an oracle's JSON object.
///
/// Field names are matched loosely (`taskType`, `Task type`, `task_type`),
/// enum values case-insensitively. Every field must be present.
///
/// # Errors
///
/// Returns `AppError::Classification` naming every missing or invalid field.
pub fn from_json(value: &Value) -> Result<Classification> {
    let object = value
        .as_object()
        .ok_or_else(|| AppError::Classification("response is not a JSON object".into()))?;

    let mut missing: Vec<&str> = Vec::new();
    let mut invalid: Vec<&str> = Vec::new();

    let mut pick = |name: &'static str| {
        let raw = field(object, name);
        if raw.is_none() {
            missing.push(name);
        }
        raw
    };
    let task_type_raw = pick("taskType");
    let service_category_raw = pick("serviceCategory");
    let urgency_raw = pick("urgency");
    let title = pick("title");
    let description = pick("description");

    let task_type = task_type_raw.and_then(|raw| parse_code(raw, TaskType::parse));
    if task_type_raw.is_some() && task_type.is_none() {
        invalid.push("taskType");
    }
    let service_category =
        service_category_raw.and_then(|raw| parse_code(raw, ServiceCategory::parse));
    if service_category_raw.is_some() && service_category.is_none() {
        invalid.push("serviceCategory");
    }
    let urgency = urgency_raw.and_then(|raw| parse_code(raw, Urgency::parse));
    if urgency_raw.is_some() && urgency.is_none() {
        invalid.push("urgency");
    }

    match (task_type, service_category, urgency, title, description) {
        (Some(task_type), Some(service_category), Some(urgency), Some(title), Some(description)) => {
            Ok(Classification {
                task_type,
                service_category,
                urgency,
                title: title.to_owned(),
                description: description.to_owned(),
            })
        }
        _ => {
            let mut problems = Vec::new();
            if !missing.is_empty() {
                problems.push(format!("missing fields: {}", missing.join(", ")));
            }
            if !invalid.is_empty() {
                problems.push(format!("invalid fields: {}", invalid.join(", ")));
            }
            Err(AppError::Classification(problems.join("; ")))
        }
    }
}

