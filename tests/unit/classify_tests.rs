use serde_json::json;
use wiremock::matchers::{bearer_token, body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use intake_desk::classify::openai::OpenAiClassifier;
use intake_desk::classify::{from_json, Classifier};
use intake_desk::config::ClassifierConfig;
use intake_desk::models::task::{ServiceCategory, TaskType, Urgency};
use intake_desk::AppError;

#[test]
fn exact_field_names_parse() {
    let parsed = from_json(&json!({
        "taskType": "BUG",
        "serviceCategory": "DEV",
        "urgency": "urgent",
        "title": "Login page broken",
        "description": "Users cannot log in since the last release."
    }))
    .expect("valid classification");

    assert_eq!(parsed.task_type, TaskType::Bug);
    assert_eq!(parsed.service_category, ServiceCategory::Dev);
    assert_eq!(parsed.urgency, Urgency::Urgent);
    assert_eq!(parsed.title, "Login page broken");
}

#[test]
fn field_names_and_values_match_loosely() {
    let parsed = from_json(&json!({
        "Task Type": "feature request",
        "service_category": "design",
        "URGENCY": "Low",
        "title": "  New logo  ",
        "description": "Refresh the brand mark."
    }))
    .expect("loose classification");

    assert_eq!(parsed.task_type, TaskType::FeatureRequest);
    assert_eq!(parsed.service_category, ServiceCategory::Design);
    assert_eq!(parsed.urgency, Urgency::Low);
    assert_eq!(parsed.title, "New logo");
}

#[test]
fn missing_and_invalid_fields_are_named() {
    let err = from_json(&json!({
        "taskType": "COMPLAINT",
        "serviceCategory": "DEV",
        "urgency": "medium",
        "title": ""
    }))
    .expect_err("incomplete classification");

    let AppError::Classification(message) = err else {
        panic!("expected classification error");
    };
    assert!(message.contains("missing fields: title, description"), "{message}");
    assert!(message.contains("invalid fields: taskType"), "{message}");
}

#[test]
fn non_object_is_rejected() {
    assert!(matches!(
        from_json(&json!(["BUG"])),
        Err(AppError::Classification(_))
    ));
}

fn config_for(server: &MockServer, api_key: &str) -> ClassifierConfig {
    ClassifierConfig {
        endpoint: format!("{}/v1/chat/completions", server.uri()),
        model: "test-model".into(),
        timeout_seconds: 5,
        api_key: api_key.into(),
    }
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [
            { "index": 0, "message": { "role": "assistant", "content": content } }
        ]
    })
}

#[tokio::test]
async fn classifier_posts_json_mode_request() {
    let server = MockServer::start().await;
    let answer = json!({
        "taskType": "QUESTION",
        "serviceCategory": "CONSULT",
        "urgency": "medium",
        "title": "Hosting options",
        "description": "Client asks which hosting we recommend."
    })
    .to_string();

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(bearer_token("sk-test"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "response_format": { "type": "json_object" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(&answer)))
        .expect(1)
        .mount(&server)
        .await;

    let classifier = OpenAiClassifier::new(&config_for(&server, "sk-test")).expect("client");
    let parsed = classifier
        .classify("Which hosting provider do you recommend?")
        .await
        .expect("classification");

    assert_eq!(parsed.task_type, TaskType::Question);
    assert_eq!(parsed.service_category, ServiceCategory::Consult);
}

#[tokio::test]
async fn upstream_error_is_a_classification_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let classifier = OpenAiClassifier::new(&config_for(&server, "sk-test")).expect("client");
    let err = classifier.classify("hello").await.expect_err("upstream failure");
    assert!(matches!(err, AppError::Classification(ref msg) if msg.contains("500")));
}

#[tokio::test]
async fn non_json_answer_is_a_classification_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("I think it's a bug")))
        .mount(&server)
        .await;

    let classifier = OpenAiClassifier::new(&config_for(&server, "sk-test")).expect("client");
    assert!(matches!(
        classifier.classify("hello").await,
        Err(AppError::Classification(_))
    ));
}

#[tokio::test]
async fn missing_api_key_fails_without_calling_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let classifier = OpenAiClassifier::new(&config_for(&server, "")).expect("client");
    assert!(matches!(
        classifier.classify("hello").await,
        Err(AppError::Classification(_))
    ));
}
