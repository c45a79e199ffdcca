//! End-to-end ingestion through `IngestPipeline` against an in-memory store.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing_subscriber::fmt::MakeWriter;

use intake_desk::classify::Classifier;
use intake_desk::config::WebhookConfig;
use intake_desk::intake::{ContentRules, InboundEmail, IngestPipeline};
use intake_desk::models::client::NewClient;
use intake_desk::models::event::EventType;
use intake_desk::models::message::{MessageDirection, MessageStatus};
use intake_desk::models::task::{ServiceCategory, TaskStatus};
use intake_desk::persistence::client_repo::ClientRepo;
use intake_desk::persistence::db::Database;
use intake_desk::persistence::event_repo::EventRepo;
use intake_desk::persistence::message_repo::MessageRepo;
use intake_desk::persistence::task_repo::TaskRepo;
use intake_desk::AppError;

use super::test_helpers::{
    acme, memory_db, signed_form, FailingClassifier, SlowClassifier, StaticClassifier,
    SIGNING_KEY,
};

fn webhook() -> WebhookConfig {
    WebhookConfig {
        max_timestamp_age_seconds: 900,
        require_signature: true,
        signing_key: Some(SIGNING_KEY.into()),
    }
}

fn pipeline(db: &Arc<Database>, classifier: Arc<dyn Classifier>) -> IngestPipeline {
    IngestPipeline::new(
        Arc::clone(db),
        classifier,
        Arc::new(ContentRules::new().expect("rules")),
        webhook(),
        Duration::from_millis(200),
    )
}

async fn row_counts(db: &Arc<Database>) -> (i64, i64, i64) {
    let count = |table: &'static str| {
        let db = Arc::clone(db);
        async move {
            let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
                .fetch_one(&*db)
                .await
                .expect("count");
            n
        }
    };
    (count("messages").await, count("tasks").await, count("events").await)
}

#[tokio::test]
async fn email_becomes_linked_message_and_task() {
    let db = memory_db().await;
    let client = acme(&db).await;
    let classifier = Arc::new(StaticClassifier::bug());
    let pipeline = pipeline(&db, Arc::clone(&classifier) as Arc<dyn Classifier>);

    let form = signed_form(
        "John Doe <john.doe@acme.com>",
        "The login page is broken.\n\n> On Monday you wrote:\n> earlier thread",
        Some("<m1@mail.acme.com>"),
    );
    let outcome = pipeline
        .ingest(&InboundEmail::from_form(&form))
        .await
        .expect("ingest");
    assert!(!outcome.duplicate);
    let task_id = outcome.task_id.expect("task created");
    assert_eq!(classifier.calls(), 1);

    let message = MessageRepo::new(Arc::clone(&db))
        .find_by_id(outcome.message_id)
        .await
        .expect("query")
        .expect("message stored");
    assert_eq!(message.client_id, client.id);
    assert_eq!(message.task_id, Some(task_id));
    assert_eq!(message.direction, MessageDirection::Inbound);
    assert_eq!(message.status, MessageStatus::Sent);
    assert!(message.sent_at.is_some());
    assert_eq!(message.body, "The login page is broken.");
    assert_eq!(message.subject.as_deref(), Some("Login issue"));
    assert_eq!(message.external_id.as_deref(), Some("<m1@mail.acme.com>"));

    let task = TaskRepo::new(Arc::clone(&db))
        .find_by_id(task_id)
        .await
        .expect("query")
        .expect("task stored");
    assert_eq!(task.client_id, client.id);
    assert_eq!(task.status, TaskStatus::Open);
    assert_eq!(task.title, "Login page broken");

    let events = EventRepo::new(Arc::clone(&db))
        .events_for_task(task_id)
        .await
        .expect("events");
    let kinds: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(kinds, vec![EventType::Message, EventType::TaskCreated]);
    assert_eq!(events[1].details["source"], "email");
    assert_eq!(events[1].details["messageId"], outcome.message_id);
    assert_eq!(events[1].details["classification"]["taskType"], "BUG");
    assert_eq!(events[0].details["messageId"], outcome.message_id);
}

#[tokio::test]
async fn html_only_email_is_stripped() {
    let db = memory_db().await;
    acme(&db).await;
    let pipeline = pipeline(&db, Arc::new(StaticClassifier::bug()));

    let mut form = signed_form("john.doe@acme.com", "", None);
    form.remove("body-plain");
    form.insert(
        "body-html".into(),
        "<p>Checkout &amp; cart fail</p><p>since today</p>".into(),
    );
    let outcome = pipeline
        .ingest(&InboundEmail::from_form(&form))
        .await
        .expect("ingest");

    let message = MessageRepo::new(Arc::clone(&db))
        .find_by_id(outcome.message_id)
        .await
        .expect("query")
        .expect("stored");
    assert_eq!(message.body, "Checkout & cart fail\nsince today");
}

#[tokio::test]
async fn bad_signature_writes_nothing() {
    let db = memory_db().await;
    acme(&db).await;
    let classifier = Arc::new(StaticClassifier::bug());
    let pipeline = pipeline(&db, Arc::clone(&classifier) as Arc<dyn Classifier>);

    let mut form = signed_form("john.doe@acme.com", "Please help", None);
    form.insert("signature".into(), "00".repeat(32));
    let err = pipeline
        .ingest(&InboundEmail::from_form(&form))
        .await
        .expect_err("bad signature");

    assert!(matches!(err, AppError::Unauthorized(_)));
    assert_eq!(classifier.calls(), 0);
    assert_eq!(row_counts(&db).await, (0, 0, 0));
}

#[tokio::test]
async fn unknown_sender_writes_nothing() {
    let db = memory_db().await;
    acme(&db).await;
    let classifier = Arc::new(StaticClassifier::bug());
    let pipeline = pipeline(&db, Arc::clone(&classifier) as Arc<dyn Classifier>);

    let form = signed_form("stranger@elsewhere.com", "Hi there", None);
    let err = pipeline
        .ingest(&InboundEmail::from_form(&form))
        .await
        .expect_err("unknown sender");

    assert!(matches!(err, AppError::UnknownSender(ref addr) if addr == "stranger@elsewhere.com"));
    assert_eq!(classifier.calls(), 0);
    assert_eq!(row_counts(&db).await, (0, 0, 0));
}

#[tokio::test]
async fn sender_problems_are_reported() {
    let db = memory_db().await;
    acme(&db).await;
    let pipeline = pipeline(&db, Arc::new(StaticClassifier::bug()));

    let mut form = signed_form("john.doe@acme.com", "Hello", None);
    form.remove("sender");
    let err = pipeline
        .ingest(&InboundEmail::from_form(&form))
        .await
        .expect_err("missing sender");
    assert!(
        matches!(err, AppError::Validation { ref missing_fields, .. } if missing_fields == &["sender"])
    );

    let form = signed_form("not-an-address", "Hello", None);
    let err = pipeline
        .ingest(&InboundEmail::from_form(&form))
        .await
        .expect_err("bad sender");
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn empty_body_is_rejected_before_classification() {
    let db = memory_db().await;
    acme(&db).await;
    let classifier = Arc::new(StaticClassifier::bug());
    let pipeline = pipeline(&db, Arc::clone(&classifier) as Arc<dyn Classifier>);

    let form = signed_form("john.doe@acme.com", "> only a quoted reply", None);
    let err = pipeline
        .ingest(&InboundEmail::from_form(&form))
        .await
        .expect_err("empty body");
    assert!(matches!(err, AppError::Validation { .. }));
    assert_eq!(classifier.calls(), 0);
    assert_eq!(row_counts(&db).await, (0, 0, 0));
}

#[tokio::test]
async fn classifier_failure_leaves_no_rows() {
    let db = memory_db().await;
    acme(&db).await;
    let pipeline = pipeline(&db, Arc::new(FailingClassifier));

    let form = signed_form("john.doe@acme.com", "Please fix the bug", None);
    let err = pipeline
        .ingest(&InboundEmail::from_form(&form))
        .await
        .expect_err("classifier down");
    assert!(matches!(err, AppError::Classification(_)));
    assert_eq!(row_counts(&db).await, (0, 0, 0));
}

#[tokio::test]
async fn classifier_timeout_leaves_no_rows() {
    let db = memory_db().await;
    acme(&db).await;
    let pipeline = pipeline(&db, Arc::new(SlowClassifier));

    let form = signed_form("john.doe@acme.com", "Please fix the bug", None);
    let err = pipeline
        .ingest(&InboundEmail::from_form(&form))
        .await
        .expect_err("classifier slow");
    assert!(matches!(err, AppError::Classification(ref msg) if msg.contains("timed out")));
    assert_eq!(row_counts(&db).await, (0, 0, 0));
}

#[tokio::test]
async fn redelivery_is_deduplicated() {
    let db = memory_db().await;
    acme(&db).await;
    let classifier = Arc::new(StaticClassifier::bug());
    let pipeline = pipeline(&db, Arc::clone(&classifier) as Arc<dyn Classifier>);

    let form = signed_form("john.doe@acme.com", "Please fix the bug", Some("<same@acme.com>"));
    let first = pipeline
        .ingest(&InboundEmail::from_form(&form))
        .await
        .expect("first delivery");

    let again = signed_form("john.doe@acme.com", "Please fix the bug", Some("<same@acme.com>"));
    let second = pipeline
        .ingest(&InboundEmail::from_form(&again))
        .await
        .expect("redelivery");

    assert!(second.duplicate);
    assert_eq!(second.message_id, first.message_id);
    assert_eq!(second.task_id, first.task_id);
    assert_eq!(classifier.calls(), 1);
    assert_eq!(row_counts(&db).await, (1, 1, 2));
}

#[tokio::test]
async fn same_message_id_from_another_client_is_new_mail() {
    let db = memory_db().await;
    let acme = acme(&db).await;
    let eve = ClientRepo::new(Arc::clone(&db))
        .create(&NewClient {
            organization_name: "Other Ltd".into(),
            first_name: "Eve".into(),
            last_name: "Other".into(),
            email: "eve@other.com".into(),
            phone: None,
            services: vec![ServiceCategory::Consult],
        })
        .await
        .expect("second client");
    let classifier = Arc::new(StaticClassifier::bug());
    let pipeline = pipeline(&db, Arc::clone(&classifier) as Arc<dyn Classifier>);

    let from_acme = signed_form("john.doe@acme.com", "Acme's request", Some("<x@mail>"));
    let first = pipeline
        .ingest(&InboundEmail::from_form(&from_acme))
        .await
        .expect("acme delivery");

    let from_eve = signed_form("eve@other.com", "Eve's own request", Some("<x@mail>"));
    let second = pipeline
        .ingest(&InboundEmail::from_form(&from_eve))
        .await
        .expect("eve delivery");

    assert!(!second.duplicate);
    assert_ne!(second.message_id, first.message_id);
    assert_ne!(second.task_id, first.task_id);
    assert_eq!(classifier.calls(), 2);

    let messages = MessageRepo::new(Arc::clone(&db));
    let eve_message = messages
        .find_by_id(second.message_id)
        .await
        .expect("query")
        .expect("eve's message stored");
    assert_eq!(eve_message.client_id, eve.id);
    assert_eq!(eve_message.body, "Eve's own request");
    let acme_message = messages
        .find_by_id(first.message_id)
        .await
        .expect("query")
        .expect("acme's message kept");
    assert_eq!(acme_message.client_id, acme.id);
}

/// Captures formatted log output for assertions.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("log buffer")).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test]
async fn classification_failure_logs_the_failing_stage() {
    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(logs.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let db = memory_db().await;
    acme(&db).await;
    let pipeline = pipeline(&db, Arc::new(FailingClassifier));
    let form = signed_form("john.doe@acme.com", "Need OAuth2 login", None);
    pipeline
        .ingest(&InboundEmail::from_form(&form))
        .await
        .expect_err("oracle down");

    let output = logs.contents();
    let failure = output
        .lines()
        .find(|line| line.contains("classification failed"))
        .expect("failure logged");
    assert!(failure.contains(r#""failed_stage":"classified""#), "{failure}");
    assert!(!failure.contains("content_normalized"), "{failure}");
}

#[tokio::test]
async fn disabled_signature_check_accepts_unsigned_mail() {
    let db = memory_db().await;
    acme(&db).await;
    let pipeline = IngestPipeline::new(
        Arc::clone(&db),
        Arc::new(StaticClassifier::bug()),
        Arc::new(ContentRules::new().expect("rules")),
        WebhookConfig {
            require_signature: false,
            ..WebhookConfig::default()
        },
        Duration::from_secs(1),
    );

    let mut form = signed_form("john.doe@acme.com", "Unsigned but trusted", None);
    form.remove("signature");
    form.remove("token");
    form.remove("timestamp");
    let outcome = pipeline
        .ingest(&InboundEmail::from_form(&form))
        .await
        .expect("accepted");
    assert!(outcome.task_id.is_some());
}
