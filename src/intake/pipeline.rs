//! Email-to-task ingestion.
//!
//! One inbound email moves through
//! `Received → Authenticated → ClientResolved → ContentNormalized →
//! Classified → Persisted → Linked`. Every write happens in the final
//! transaction, so a failure at any earlier stage leaves no rows behind.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::classify::{Classification, Classifier};
use crate::config::WebhookConfig;
use crate::models::client::Client;
use crate::models::event::NewEvent;
use crate::models::message::{Message, MessageDirection, MessageStatus, NewMessage};
use crate::models::now;
use crate::models::task::{NewTask, TaskStatus};
use crate::persistence::client_repo::ClientRepo;
use crate::persistence::db::{self, Database};
use crate::persistence::{event_repo, message_repo, task_repo};
use crate::{AppError, Result};

use super::content::ContentRules;
use super::signature::{self, SignedToken};

/// Pipeline stage, used to label log lines and failures.
///
/// Progress lines carry the stage just reached as `stage`; failure lines
/// carry the stage that could not be reached as `failed_stage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    /// Request accepted, nothing checked yet.
    Received,
    /// Signature verified.
    Authenticated,
    /// Sender mapped to a client.
    ClientResolved,
    /// Body cleaned.
    ContentNormalized,
    /// Classification obtained.
    Classified,
    /// Message and task written.
    Persisted,
    /// Message linked to its task and committed.
    Linked,
}

impl IngestStage {
    /// Log label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Authenticated => "authenticated",
            Self::ClientResolved => "client_resolved",
            Self::ContentNormalized => "content_normalized",
            Self::Classified => "classified",
            Self::Persisted => "persisted",
            Self::Linked => "linked",
        }
    }
}

/// Fields of one inbound email as posted by the mail relay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundEmail {
    /// `sender`, possibly in `Name <addr>` form.
    pub sender: Option<String>,
    /// `recipient`.
    pub recipient: Option<String>,
    /// `subject`.
    pub subject: Option<String>,
    /// `body-plain`.
    pub body_plain: Option<String>,
    /// `body-html`.
    pub body_html: Option<String>,
    /// `Message-Id`, used for redelivery dedup.
    pub message_id: Option<String>,
    /// `In-Reply-To`.
    pub in_reply_to: Option<String>,
    /// Signature triple.
    pub signed: SignedToken,
}

impl InboundEmail {
    /// Read an email from relay form fields.
    ///
    /// The signature triple comes from the `timestamp`/`token`/`signature`
    /// fields; callers may override it from transport headers.
    #[must_use]
    pub fn from_form(form: &HashMap<String, String>) -> Self {
        let get = |key: &str| {
            form.get(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        Self {
            sender: get("sender"),
            recipient: get("recipient"),
            subject: get("subject"),
            body_plain: get("body-plain"),
            body_html: get("body-html"),
            message_id: get("Message-Id").or_else(|| get("message-id")),
            in_reply_to: get("In-Reply-To").or_else(|| get("in-reply-to")),
            signed: SignedToken {
                timestamp: get("timestamp"),
                token: get("token"),
                signature: get("signature"),
            },
        }
    }
}

/// Result of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestOutcome {
    /// Inbound message id.
    pub message_id: i64,
    /// Task the message is linked to.
    pub task_id: Option<i64>,
    /// The email had been ingested before; nothing new was written.
    pub duplicate: bool,
}

impl IngestOutcome {
    fn duplicate_of(message: &Message) -> Self {
        Self {
            message_id: message.id,
            task_id: message.task_id,
            duplicate: true,
        }
    }
}

/// Email ingestion service shared by webhook handlers.
pub struct IngestPipeline {
    db: Arc<Database>,
    clients: ClientRepo,
    classifier: Arc<dyn Classifier>,
    rules: Arc<ContentRules>,
    webhook: WebhookConfig,
    classify_timeout: Duration,
}

impl IngestPipeline {
    /// Assemble a pipeline over the shared pool and classifier.
    #[must_use]
    pub fn new(
        db: Arc<Database>,
        classifier: Arc<dyn Classifier>,
        rules: Arc<ContentRules>,
        webhook: WebhookConfig,
        classify_timeout: Duration,
    ) -> Self {
        Self {
            clients: ClientRepo::new(Arc::clone(&db)),
            db,
            classifier,
            rules,
            webhook,
            classify_timeout,
        }
    }

    /// Run one email through every stage.
    ///
    /// # Errors
    ///
    /// - `AppError::Unauthorized` if the signature check fails.
    /// - `AppError::Validation` if `sender` or the body is missing.
    /// - `AppError::BadRequest` if `sender` is not an email address.
    /// - `AppError::UnknownSender` if no client owns the address.
    /// - `AppError::Classification` if the oracle fails or times out.
    /// - `AppError::Db` if the final transaction fails (rolled back).
    pub async fn ingest(&self, email: &InboundEmail) -> Result<IngestOutcome> {
        debug!(stage = IngestStage::Received.as_str(), "inbound email");

        self.authenticate(email)?;
        debug!(stage = IngestStage::Authenticated.as_str(), "signature accepted");

        let client = self.resolve_client(email).await?;
        debug!(
            stage = IngestStage::ClientResolved.as_str(),
            client_id = client.id,
            "sender resolved"
        );

        if let Some(ref external_id) = email.message_id {
            if let Some(existing) = self.find_delivered(client.id, external_id).await? {
                info!(
                    message_id = existing.id,
                    external_id = external_id.as_str(),
                    "duplicate delivery ignored"
                );
                return Ok(IngestOutcome::duplicate_of(&existing));
            }
        }

        let content = self.normalize(email)?;
        debug!(
            stage = IngestStage::ContentNormalized.as_str(),
            chars = content.len(),
            "content normalized"
        );

        let classification = self.classify(&content).await?;
        debug!(
            stage = IngestStage::Classified.as_str(),
            task_type = classification.task_type.as_str(),
            urgency = classification.urgency.as_str(),
            "content classified"
        );

        self.persist(email, &client, content, &classification).await
    }

    fn authenticate(&self, email: &InboundEmail) -> Result<()> {
        if !self.webhook.require_signature {
            warn!("webhook signature check disabled by configuration");
            return Ok(());
        }
        signature::verify(
            self.webhook.signing_key.as_deref(),
            &email.signed,
            self.webhook.max_timestamp_age_seconds,
            chrono::Utc::now(),
        )
        .inspect_err(|err| {
            warn!(failed_stage = IngestStage::Authenticated.as_str(), %err, "webhook rejected");
        })
    }

    async fn resolve_client(&self, email: &InboundEmail) -> Result<Client> {
        let sender = email.sender.as_deref().ok_or_else(|| {
            AppError::validation("sender is required", vec!["sender".into()], Vec::new())
        })?;
        let address = self
            .rules
            .sender_address(sender)
            .ok_or_else(|| AppError::BadRequest("Invalid sender format".into()))?;

        match self.clients.find_by_email(&address).await? {
            Some(client) => Ok(client),
            None => {
                warn!(
                    failed_stage = IngestStage::ClientResolved.as_str(),
                    sender = address.as_str(),
                    "unknown sender"
                );
                Err(AppError::UnknownSender(address))
            }
        }
    }

    async fn find_delivered(&self, client_id: i64, external_id: &str) -> Result<Option<Message>> {
        let mut conn = self.db.acquire().await?;
        message_repo::find_by_external_id_in(&mut conn, client_id, external_id).await
    }

    fn normalize(&self, email: &InboundEmail) -> Result<String> {
        let raw = match (&email.body_plain, &email.body_html) {
            (Some(plain), _) => plain.clone(),
            (None, Some(html)) => self.rules.strip_html(html),
            (None, None) => String::new(),
        };
        let content = self.rules.normalize(&raw);
        if content.is_empty() {
            warn!(failed_stage = IngestStage::ContentNormalized.as_str(), "empty email body");
            return Err(AppError::validation(
                "email body is empty",
                vec!["body-plain".into()],
                Vec::new(),
            ));
        }
        Ok(content)
    }

    async fn classify(&self, content: &str) -> Result<Classification> {
        match tokio::time::timeout(self.classify_timeout, self.classifier.classify(content)).await
        {
            Ok(Ok(classification)) => Ok(classification),
            Ok(Err(err)) => {
                warn!(failed_stage = IngestStage::Classified.as_str(), %err, "classification failed");
                Err(err)
            }
            Err(_) => {
                warn!(
                    failed_stage = IngestStage::Classified.as_str(),
                    timeout_secs = self.classify_timeout.as_secs(),
                    "classification timed out"
                );
                Err(AppError::Classification(format!(
                    "timed out after {}s",
                    self.classify_timeout.as_secs()
                )))
            }
        }
    }

    async fn persist(
        &self,
        email: &InboundEmail,
        client: &Client,
        content: String,
        classification: &Classification,
    ) -> Result<IngestOutcome> {
        let mut tx = db::begin_write(&self.db).await?;

        if let Some(ref external_id) = email.message_id {
            let existing =
                message_repo::find_by_external_id_in(&mut tx, client.id, external_id).await?;
            if let Some(existing) = existing {
                info!(
                    message_id = existing.id,
                    external_id = external_id.as_str(),
                    "duplicate delivery ignored"
                );
                return Ok(IngestOutcome::duplicate_of(&existing));
            }
        }

        let message = message_repo::insert_in(
            &mut tx,
            &NewMessage {
                client_id: client.id,
                task_id: None,
                direction: MessageDirection::Inbound,
                body: content,
                status: Some(MessageStatus::Sent),
                sent_at: Some(now()),
                subject: email.subject.clone(),
                external_id: email.message_id.clone(),
                thread_id: email.in_reply_to.clone().or_else(|| email.message_id.clone()),
            },
        )
        .await?;

        let task = task_repo::insert_in(
            &mut tx,
            &NewTask {
                client_id: client.id,
                task_type: classification.task_type,
                service_category: classification.service_category,
                urgency: classification.urgency,
                status: TaskStatus::Open,
                title: classification.title.clone(),
                description: Some(classification.description.clone()),
            },
        )
        .await?;
        event_repo::record_in(
            &mut tx,
            &NewEvent::task_created(
                &task,
                json!({
                    "source": "email",
                    "messageId": message.id,
                    "classification": classification,
                }),
            ),
        )
        .await?;
        debug!(
            stage = IngestStage::Persisted.as_str(),
            message_id = message.id,
            task_id = task.id,
            "records written"
        );

        let linked = message_repo::link_task_in(&mut tx, message.id, task.id).await?;
        tx.commit().await?;

        info!(
            stage = IngestStage::Linked.as_str(),
            client_id = client.id,
            message_id = linked.id,
            task_id = task.id,
            "email ingested"
        );
        Ok(IngestOutcome {
            message_id: linked.id,
            task_id: Some(task.id),
            duplicate: false,
        })
    }
}
