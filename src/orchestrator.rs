use futures::StreamExt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::classify::{ClassifiedFailure, classify};
use crate::config::Config;
use crate::error::{LabAssistError, Result};
use crate::gateway::AiGateway;
use crate::geolocation::GeolocationAdapter;
use crate::models::{
    Conversation, InlineImage, Language, Message, ProviderKind, SearchMethod, SocialPlatform,
    TestSubmissionFormInputs,
};
use crate::notifications::NotificationCenter;
use crate::prompts;
use crate::state::{AppState, GeneratedPost, OperationSlot, RequestState, Ticket};

/// Descriptions shorter than this are not worth an auto-fill round trip.
const AUTO_FILL_MIN_CHARS: usize = 10;

type Outcome = std::result::Result<(), ClassifiedFailure>;

/// Owns the application state and turns user actions into gateway calls.
///
/// Every operation moves its own slot through idle, pending and then
/// succeeded or failed. Starting an operation again supersedes the one in
/// flight: the older call still runs to completion, but its result is
/// dropped because its ticket no longer matches. Failures are classified,
/// stored in the slot and pushed to the notification center.
#[derive(Clone)]
pub struct Orchestrator {
    gateway: Arc<dyn AiGateway>,
    notifications: NotificationCenter,
    geolocation: Arc<GeolocationAdapter>,
    state: Arc<Mutex<AppState>>,
    site_index: Arc<str>,
    system_instruction: Arc<str>,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<dyn AiGateway>,
        notifications: NotificationCenter,
        geolocation: GeolocationAdapter,
        cfg: &Config,
    ) -> Self {
        Self {
            gateway,
            notifications,
            geolocation: Arc::new(geolocation),
            state: Arc::new(Mutex::new(AppState::new(
                cfg.app.language,
                &cfg.app.chat_greeting,
            ))),
            site_index: Arc::from(prompts::DEFAULT_SITE_INDEX),
            system_instruction: Arc::from(prompts::CHAT_SYSTEM_INSTRUCTION),
        }
    }

    /// Replace the page index used by semantic search.
    pub fn with_site_index(mut self, index: impl Into<String>) -> Self {
        let index: String = index.into();
        self.site_index = Arc::from(index);
        self
    }

    fn lock(&self) -> MutexGuard<'_, AppState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Read-only copy of the current state.
    pub fn snapshot(&self) -> AppState {
        self.lock().clone()
    }

    pub fn conversation(&self) -> Conversation {
        self.lock().conversation.clone()
    }

    pub fn language(&self) -> Language {
        self.lock().language
    }

    pub fn is_quota_exhausted(&self) -> bool {
        self.lock().quota_exhausted
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock().authenticated
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    // ── Session ────────────────────────────────────────────────────────────

    pub fn set_language(&self, language: Language) {
        tracing::info!("Language set to {}", language);
        self.lock().language = language;
    }

    pub fn login(&self) {
        self.lock().authenticated = true;
        self.notifications.success("Login successful!");
    }

    pub fn logout(&self) {
        self.lock().authenticated = false;
        self.notifications.info("You have been logged out.");
    }

    pub fn dismiss_quota_warning(&self) {
        self.lock().quota_exhausted = false;
    }

    // ── Consultant chat ────────────────────────────────────────────────────

    /// Send one chat message and stream the reply into the conversation.
    ///
    /// The user message and an empty model placeholder are appended before
    /// the call starts. On failure only the placeholder is removed. A reply
    /// superseded by a newer message keeps any text it streamed; if it never
    /// streamed any, its placeholder is dropped.
    pub async fn send_chat_message(&self, text: &str) -> Outcome {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let (ticket, history) = {
            let mut state = self.lock();
            state.conversation.push(Message::user(text));
            let history = state.conversation.clone();
            state.conversation.push(Message::model(""));
            (state.chat.begin(), history)
        };
        tracing::info!(turns = history.len(), "Sending chat message");

        let mut stream = match self
            .gateway
            .stream_chat(&history, &self.system_instruction)
            .await
        {
            Ok(stream) => stream,
            Err(e) => return self.fail_chat(ticket, &e),
        };

        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            let fragment = match chunk {
                Ok(fragment) => fragment,
                Err(e) => return self.fail_chat(ticket, &e),
            };
            reply.push_str(&fragment);

            let current = {
                let mut state = self.lock();
                let current = state.chat.is_current(ticket);
                if current {
                    state.conversation.replace_last_text(&reply);
                } else {
                    state.conversation.prune_abandoned_replies();
                }
                current
            };
            if !current {
                tracing::debug!("Chat reply superseded by a newer message; dropping stream");
                return Ok(());
            }
        }

        let mut state = self.lock();
        if !state.chat.succeed(ticket, ()) {
            state.conversation.prune_abandoned_replies();
            tracing::debug!("Chat reply superseded before completion");
            return Ok(());
        }
        if reply.trim().is_empty() {
            state.conversation.pop_model_reply();
        }
        tracing::debug!(chars = reply.len(), "Chat reply complete");
        Ok(())
    }

    fn fail_chat(&self, ticket: Ticket, error: &LabAssistError) -> Outcome {
        self.record_failure("chat", error, |state, message| {
            if state.chat.fail(ticket, message) {
                state.conversation.pop_model_reply();
                true
            } else {
                state.conversation.prune_abandoned_replies();
                false
            }
        })
    }

    // ── Providers ──────────────────────────────────────────────────────────

    /// Find distributors or veterinarians. A geo search resolves the user's
    /// position first and falls back to a location-less search.
    pub async fn search_providers(
        &self,
        method: SearchMethod,
        query: &str,
        kind: ProviderKind,
    ) -> Outcome {
        let (ticket, language) = {
            let mut state = self.lock();
            (state.providers.begin(), state.language)
        };

        let location = match method {
            SearchMethod::Geo => {
                let notifications = &self.notifications;
                self.geolocation
                    .resolve(|reason| {
                        notifications.info(format!(
                            "Geolocation failed: {reason} Searching without location."
                        ));
                    })
                    .await
            }
            SearchMethod::Text => None,
        };

        let result = self
            .gateway
            .find_providers(query, location, language, kind)
            .await;
        self.settle("providers", ticket, result, |s| &mut s.providers)
    }

    /// Geo-based distributor search keyed off a recommendation's assessment.
    pub async fn find_dropoff_location(&self, primary_assessment: &str) -> Outcome {
        self.search_providers(
            SearchMethod::Geo,
            primary_assessment,
            ProviderKind::Distributor,
        )
        .await
    }

    // ── Test recommender ───────────────────────────────────────────────────

    pub async fn get_recommendation(
        &self,
        inputs: &TestSubmissionFormInputs,
        image: Option<&InlineImage>,
    ) -> Outcome {
        let (ticket, language) = {
            let mut state = self.lock();
            state.test_details.reset();
            (state.recommendation.begin(), state.language)
        };
        let result = self
            .gateway
            .get_recommendation(inputs, image, language)
            .await;
        self.settle("recommendation", ticket, result, |s| &mut s.recommendation)
    }

    /// Fetch details for every test in the current recommendation.
    pub async fn get_test_details(&self) -> Outcome {
        let prepared = {
            let mut state = self.lock();
            match state.recommendation.value() {
                Some(rec) => {
                    let names = rec.recommended_tests.clone();
                    Some((state.test_details.begin(), state.language, names))
                }
                None => None,
            }
        };
        let Some((ticket, language, names)) = prepared else {
            return Err(self.report_failure(
                "test_details",
                &LabAssistError::InvalidInput(
                    "Test details need a recommendation first.".to_string(),
                ),
            ));
        };

        let result = self.gateway.get_test_details(&names, language).await;
        self.settle("test_details", ticket, result, |s| &mut s.test_details)
    }

    /// Infer optional form fields from a free-text issue description.
    pub async fn auto_fill_details(&self, description: &str) -> Outcome {
        if description.trim().chars().count() <= AUTO_FILL_MIN_CHARS {
            tracing::debug!("Description too short for auto-fill");
            return Ok(());
        }
        let (ticket, language) = {
            let mut state = self.lock();
            (state.auto_fill.begin(), state.language)
        };
        let result = self.gateway.auto_fill_details(description, language).await;
        self.settle("auto_fill", ticket, result, |s| &mut s.auto_fill)
    }

    // ── Site search ────────────────────────────────────────────────────────

    pub async fn semantic_search(&self, query: &str) -> Outcome {
        let (ticket, language) = {
            let mut state = self.lock();
            (state.search.begin(), state.language)
        };
        let result = self
            .gateway
            .semantic_search(query, &self.site_index, language)
            .await;
        self.settle("search", ticket, result, |s| &mut s.search)
    }

    // ── Content hub ────────────────────────────────────────────────────────

    pub async fn fetch_trends(&self) -> Outcome {
        let (ticket, language) = {
            let mut state = self.lock();
            (state.trends.begin(), state.language)
        };
        let result = self.gateway.fetch_trends(language).await;
        self.settle("trends", ticket, result, |s| &mut s.trends)
    }

    /// Generate post text, then its image. An image failure keeps the text.
    pub async fn generate_post(&self, topic: &str, platform: SocialPlatform) -> Outcome {
        let (ticket, language) = {
            let mut state = self.lock();
            state.adapted_post.reset();
            (state.post.begin(), state.language)
        };

        let draft = match self
            .gateway
            .generate_social_post(topic, platform, language)
            .await
        {
            Ok(draft) => draft,
            Err(e) => {
                return self.record_failure("post", &e, |state, message| {
                    state.post.fail(ticket, message)
                });
            }
        };

        let post = GeneratedPost {
            platform,
            text: draft.post_text,
            image: RequestState::Pending,
        };
        if !self.lock().post.succeed(ticket, post) {
            tracing::debug!(operation = "post", "Discarding stale completion");
            return Ok(());
        }
        self.notifications.info("Text generated, now creating image...");

        match self.gateway.generate_image(&draft.image_prompt).await {
            Ok(bytes) => {
                let applied = {
                    let mut state = self.lock();
                    match state.post.value_mut(ticket) {
                        Some(post) => {
                            post.image = RequestState::Succeeded(bytes);
                            true
                        }
                        None => false,
                    }
                };
                if applied {
                    self.notifications.success("Image successfully generated!");
                } else {
                    tracing::debug!(operation = "post_image", "Discarding stale completion");
                }
                Ok(())
            }
            Err(e) => self.record_failure("post_image", &e, |state, message| {
                match state.post.value_mut(ticket) {
                    Some(post) => {
                        post.image = RequestState::Failed(message.to_string());
                        true
                    }
                    None => false,
                }
            }),
        }
    }

    /// Rewrite the generated post as a website article. Needs post text,
    /// not the image.
    pub async fn adapt_post(&self) -> Outcome {
        let prepared = {
            let mut state = self.lock();
            match state.post.value() {
                Some(post) => {
                    let text = post.text.clone();
                    let platform = post.platform;
                    Some((state.adapted_post.begin(), state.language, text, platform))
                }
                None => None,
            }
        };
        let Some((ticket, language, text, platform)) = prepared else {
            return Err(self.report_failure(
                "adapt_post",
                &LabAssistError::InvalidInput("Generate a post before adapting it.".to_string()),
            ));
        };

        let result = self
            .gateway
            .adapt_post_for_website(&text, platform, language)
            .await;
        let applied = self.settle_applied("adapt_post", ticket, result, |s| &mut s.adapted_post)?;
        if applied {
            self.notifications
                .success("Content adapted for website successfully!");
        }
        Ok(())
    }

    // ── Completion plumbing ────────────────────────────────────────────────

    fn settle<T, F>(&self, operation: &str, ticket: Ticket, result: Result<T>, slot: F) -> Outcome
    where
        F: FnOnce(&mut AppState) -> &mut OperationSlot<T>,
    {
        self.settle_applied(operation, ticket, result, slot).map(|_| ())
    }

    /// Like `settle`, but reports whether a success landed in the slot.
    fn settle_applied<T, F>(
        &self,
        operation: &str,
        ticket: Ticket,
        result: Result<T>,
        slot: F,
    ) -> std::result::Result<bool, ClassifiedFailure>
    where
        F: FnOnce(&mut AppState) -> &mut OperationSlot<T>,
    {
        match result {
            Ok(value) => {
                let applied = slot(&mut *self.lock()).succeed(ticket, value);
                if applied {
                    tracing::debug!(operation, "Operation succeeded");
                } else {
                    tracing::debug!(operation, "Discarding stale completion");
                }
                Ok(applied)
            }
            Err(e) => self
                .record_failure(operation, &e, |state, message| {
                    slot(state).fail(ticket, message)
                })
                .map(|_| false),
        }
    }

    /// Apply a failure to state if its request is still current, then report it.
    fn record_failure<F>(&self, operation: &str, error: &LabAssistError, apply: F) -> Outcome
    where
        F: FnOnce(&mut AppState, &str) -> bool,
    {
        let failure = classify(error);
        if !apply(&mut *self.lock(), &failure.message) {
            tracing::debug!(operation, "Discarding stale failure: {}", error);
            return Ok(());
        }
        Err(self.publish(operation, error, failure))
    }

    /// Classify an error, flag quota exhaustion and push an error notification.
    pub fn report_failure(&self, operation: &str, error: &LabAssistError) -> ClassifiedFailure {
        self.publish(operation, error, classify(error))
    }

    fn publish(
        &self,
        operation: &str,
        error: &LabAssistError,
        failure: ClassifiedFailure,
    ) -> ClassifiedFailure {
        if failure.quota_exhausted {
            tracing::warn!(operation, "Quota exhausted: {}", error);
            self.lock().quota_exhausted = true;
        } else {
            tracing::error!(operation, "Operation failed: {}", error);
        }
        self.notifications.error(failure.message.clone());
        failure
    }
}
