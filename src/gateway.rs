use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::Deserialize;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{LabAssistError, Result};
use crate::models::{
    AdaptedPost, AutoFilledDetails, Content, Conversation, DailyTrend, GeminiRequest, GeoLocation,
    InlineDataPayload, InlineImage, Language, Part, ProviderKind, ProviderSearchResult,
    SearchResultItem, SocialPlatform, SocialPostDraft, TestDetailsItem,
    TestRecommendationResult, TestSubmissionFormInputs,
};
use crate::parse::parse_structured;
use crate::prompts;
use crate::transport::{TextStream, Transport};

/// Number of items a trend digest must contain.
pub const TREND_COUNT: usize = 3;

/// Every outbound call to the generative-AI service goes through this trait.
#[async_trait]
pub trait AiGateway: Send + Sync {
    async fn stream_chat(
        &self,
        history: &Conversation,
        system_instruction: &str,
    ) -> Result<TextStream>;

    async fn get_recommendation(
        &self,
        inputs: &TestSubmissionFormInputs,
        image: Option<&InlineImage>,
        language: Language,
    ) -> Result<TestRecommendationResult>;

    /// Order of the returned entries is not guaranteed; match by `test_name`.
    async fn get_test_details(
        &self,
        test_names: &[String],
        language: Language,
    ) -> Result<Vec<TestDetailsItem>>;

    async fn find_providers(
        &self,
        query: &str,
        location: Option<GeoLocation>,
        language: Language,
        kind: ProviderKind,
    ) -> Result<Vec<ProviderSearchResult>>;

    async fn semantic_search(
        &self,
        query: &str,
        index: &str,
        language: Language,
    ) -> Result<Vec<SearchResultItem>>;

    async fn fetch_trends(&self, language: Language) -> Result<Vec<DailyTrend>>;

    async fn generate_social_post(
        &self,
        topic: &str,
        platform: SocialPlatform,
        language: Language,
    ) -> Result<SocialPostDraft>;

    async fn generate_image(&self, image_prompt: &str) -> Result<Vec<u8>>;

    async fn adapt_post_for_website(
        &self,
        post_text: &str,
        platform: SocialPlatform,
        language: Language,
    ) -> Result<AdaptedPost>;

    async fn auto_fill_details(
        &self,
        description: &str,
        language: Language,
    ) -> Result<AutoFilledDetails>;
}

#[derive(Debug, Clone)]
struct Models {
    chat: String,
    structured: String,
    search: String,
    image: String,
}

pub struct GeminiGateway {
    tx: Arc<dyn Transport>,
    models: Models,
    website_suffix: String,
    max_providers: usize,
    max_search_results: usize,
}

impl GeminiGateway {
    pub fn new(tx: Arc<dyn Transport>, cfg: &Config) -> Self {
        Self {
            tx,
            models: Models {
                chat: cfg.gemini.chat_model.clone(),
                structured: cfg.gemini.structured_model.clone(),
                search: cfg.gemini.search_model.clone(),
                image: cfg.gemini.image_model.clone(),
            },
            website_suffix: cfg.providers.website_suffix.clone(),
            max_providers: cfg.providers.max_results,
            max_search_results: cfg.search.max_results,
        }
    }

    async fn structured<T: serde::de::DeserializeOwned>(
        &self,
        req: GeminiRequest,
        what: &str,
    ) -> Result<T> {
        tracing::info!(model = %req.model, "Requesting {} from Gemini", what);
        let raw = self.tx.generate(&req).await?;
        parse_structured(&raw, what)
    }
}

#[async_trait]
impl AiGateway for GeminiGateway {
    async fn stream_chat(
        &self,
        history: &Conversation,
        system_instruction: &str,
    ) -> Result<TextStream> {
        tracing::info!(
            model = %self.models.chat,
            turns = history.len(),
            "Opening chat stream"
        );
        let req = GeminiRequest {
            model: self.models.chat.clone(),
            // The service rejects empty text parts
            contents: history
                .messages()
                .iter()
                .filter(|m| !m.text.trim().is_empty())
                .map(Content::from)
                .collect(),
            system_instruction: None,
            generation_config: None,
            tools: None,
        }
        .with_system_instruction(system_instruction);
        self.tx.stream(&req).await
    }

    async fn get_recommendation(
        &self,
        inputs: &TestSubmissionFormInputs,
        image: Option<&InlineImage>,
        language: Language,
    ) -> Result<TestRecommendationResult> {
        let mut parts = vec![Part::text(prompts::recommendation_prompt(inputs, language))];
        if let Some(image) = image {
            parts.push(Part::InlineData {
                inline_data: InlineDataPayload {
                    mime_type: image.mime_type.clone(),
                    data: BASE64_STANDARD.encode(&image.data),
                },
            });
        }
        let req = GeminiRequest {
            model: self.models.structured.clone(),
            contents: vec![Content::user(parts)],
            system_instruction: None,
            generation_config: None,
            tools: None,
        }
        .with_schema(prompts::recommendation_schema());
        self.structured(req, "test recommendation").await
    }

    async fn get_test_details(
        &self,
        test_names: &[String],
        language: Language,
    ) -> Result<Vec<TestDetailsItem>> {
        if test_names.iter().all(|name| name.trim().is_empty()) {
            return Err(LabAssistError::InvalidInput(
                "at least one test name is required".to_string(),
            ));
        }
        let req = GeminiRequest::prompt(
            self.models.structured.clone(),
            prompts::test_details_prompt(test_names, language),
        )
        .with_schema(prompts::test_details_schema());
        self.structured(req, "test details").await
    }

    async fn find_providers(
        &self,
        query: &str,
        location: Option<GeoLocation>,
        language: Language,
        kind: ProviderKind,
    ) -> Result<Vec<ProviderSearchResult>> {
        let req = GeminiRequest::prompt(
            self.models.structured.clone(),
            prompts::providers_prompt(
                query,
                location,
                language,
                kind,
                self.max_providers,
                &self.website_suffix,
            ),
        );
        let raw: Vec<RawProvider> = self.structured(req, "provider search").await?;
        validate_providers(raw, kind, &self.website_suffix, self.max_providers)
    }

    async fn semantic_search(
        &self,
        query: &str,
        index: &str,
        language: Language,
    ) -> Result<Vec<SearchResultItem>> {
        let req = GeminiRequest::prompt(
            self.models.search.clone(),
            prompts::semantic_search_prompt(query, index, language, self.max_search_results),
        )
        .with_schema(prompts::search_results_schema());
        let items: Vec<SearchResultItem> = self.structured(req, "semantic search").await?;
        rank_search_results(items, self.max_search_results)
    }

    async fn fetch_trends(&self, language: Language) -> Result<Vec<DailyTrend>> {
        // Search grounding cannot be combined with a response schema
        let req = GeminiRequest::prompt(
            self.models.structured.clone(),
            prompts::trends_prompt(language),
        )
        .with_search_grounding();
        let trends: Vec<DailyTrend> = self.structured(req, "trend digest").await?;
        if trends.len() != TREND_COUNT {
            return Err(LabAssistError::SchemaViolation(format!(
                "expected {TREND_COUNT} trends, got {}",
                trends.len()
            )));
        }
        Ok(trends)
    }

    async fn generate_social_post(
        &self,
        topic: &str,
        platform: SocialPlatform,
        language: Language,
    ) -> Result<SocialPostDraft> {
        let req = GeminiRequest::prompt(
            self.models.structured.clone(),
            prompts::social_post_prompt(topic, platform, language),
        );
        let draft: SocialPostDraft = self.structured(req, "social post").await?;
        if draft.post_text.trim().is_empty() || draft.image_prompt.trim().is_empty() {
            return Err(LabAssistError::SchemaViolation(
                "social post is missing postText or imagePrompt".to_string(),
            ));
        }
        Ok(draft)
    }

    async fn generate_image(&self, image_prompt: &str) -> Result<Vec<u8>> {
        tracing::info!(model = %self.models.image, "Generating post image");
        self.tx.generate_image(&self.models.image, image_prompt).await
    }

    async fn adapt_post_for_website(
        &self,
        post_text: &str,
        platform: SocialPlatform,
        language: Language,
    ) -> Result<AdaptedPost> {
        let req = GeminiRequest::prompt(
            self.models.structured.clone(),
            prompts::adapt_post_prompt(post_text, platform, language),
        );
        self.structured(req, "website adaptation").await
    }

    async fn auto_fill_details(
        &self,
        description: &str,
        language: Language,
    ) -> Result<AutoFilledDetails> {
        let req = GeminiRequest::prompt(
            self.models.structured.clone(),
            prompts::auto_fill_prompt(description, language),
        );
        self.structured(req, "auto-filled details").await
    }
}

#[derive(Debug, Deserialize)]
struct RawProvider {
    name: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    website: Option<String>,
}

fn normalize_website(website: &str) -> &str {
    website.trim().trim_end_matches('/')
}

/// Split a website into its host and whatever follows the host. Scheme,
/// credentials and port are dropped.
fn split_host(website: &str) -> (&str, &str) {
    let without_scheme = match website.split_once("://") {
        Some((scheme, rest))
            if !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) =>
        {
            rest
        }
        _ => website,
    };
    let end = without_scheme
        .find(['/', '?', '#'])
        .unwrap_or(without_scheme.len());
    let (authority, rest) = without_scheme.split_at(end);
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let host = host.split(':').next().unwrap_or(host);
    (host, rest)
}

/// The host itself must sit under the suffix. A suffix that only shows up in
/// the path or query does not count, and is rejected outright.
fn is_synthetic_website(website: &str, suffix_lower: &str) -> bool {
    let (host, rest) = split_host(website);
    let host = host.to_ascii_lowercase();
    host.len() > suffix_lower.len()
        && host.ends_with(suffix_lower)
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.'))
        && !rest.to_ascii_lowercase().contains(suffix_lower)
}

/// Every website must be hosted under the synthetic suffix; one offender
/// fails the whole response so no real domain is ever shown.
fn validate_providers(
    raw: Vec<RawProvider>,
    kind: ProviderKind,
    suffix: &str,
    max: usize,
) -> Result<Vec<ProviderSearchResult>> {
    let suffix_lower = suffix.to_ascii_lowercase();
    let mut results = Vec::with_capacity(raw.len().min(max));
    for provider in raw.into_iter().take(max) {
        let website = provider
            .website
            .as_deref()
            .map(normalize_website)
            .unwrap_or_default();
        if !is_synthetic_website(website, &suffix_lower) {
            tracing::warn!(
                provider = %provider.name,
                website,
                "Rejecting provider results with a non-synthetic website"
            );
            return Err(LabAssistError::SchemaViolation(format!(
                "provider '{}' has website '{}' outside the {} domain",
                provider.name, website, suffix
            )));
        }
        results.push(ProviderSearchResult {
            name: provider.name,
            address: provider.address,
            phone: provider.phone,
            website: website.to_string(),
            kind,
        });
    }
    Ok(results)
}

/// Sort by descending relevance and keep the top `max`.
fn rank_search_results(
    mut items: Vec<SearchResultItem>,
    max: usize,
) -> Result<Vec<SearchResultItem>> {
    for item in &mut items {
        if !item.relevance_score.is_finite() {
            return Err(LabAssistError::SchemaViolation(format!(
                "search result '{}' has a non-numeric relevance score",
                item.title
            )));
        }
        item.relevance_score = item.relevance_score.clamp(0.0, 1.0);
    }
    items.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
    items.truncate(max);
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Message, TargetPage};
    use futures::StreamExt;
    use std::sync::Mutex;

    // Mock Transport for testing
    struct MockTransport {
        responses: Mutex<Vec<Result<String>>>,
        requests: Mutex<Vec<GeminiRequest>>,
    }

    impl MockTransport {
        fn new<S: AsRef<str>>(responses: Vec<S>) -> Self {
            // Popped from the back, so store reversed
            let responses = responses
                .into_iter()
                .rev()
                .map(|r| Ok(r.as_ref().to_string()))
                .collect();
            MockTransport {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            MockTransport {
                responses: Mutex::new(vec![Err(LabAssistError::Transport(message.to_string()))]),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn last_request(&self) -> GeminiRequest {
            self.requests
                .lock()
                .expect("Mock transport mutex should not be poisoned")
                .last()
                .cloned()
                .expect("a request should have been sent")
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn generate(&self, req: &GeminiRequest) -> Result<String> {
            self.requests
                .lock()
                .expect("Mock transport mutex should not be poisoned")
                .push(req.clone());
            self.responses
                .lock()
                .expect("Mock transport mutex should not be poisoned")
                .pop()
                .unwrap_or_else(|| {
                    Err(LabAssistError::Transport("No more mock responses".to_string()))
                })
        }

        async fn stream(&self, req: &GeminiRequest) -> Result<TextStream> {
            self.requests
                .lock()
                .expect("Mock transport mutex should not be poisoned")
                .push(req.clone());
            let chunks = vec![Ok("Hi".to_string()), Ok(" there".to_string())];
            Ok(futures::stream::iter(chunks).boxed())
        }

        async fn generate_image(&self, _model: &str, prompt: &str) -> Result<Vec<u8>> {
            Ok(prompt.as_bytes().to_vec())
        }
    }

    fn gateway(tx: Arc<MockTransport>) -> GeminiGateway {
        GeminiGateway::new(tx, &Config::default())
    }

    fn provider_json(websites: &[&str]) -> String {
        let items: Vec<serde_json::Value> = websites
            .iter()
            .enumerate()
            .map(|(i, w)| {
                serde_json::json!({
                    "name": format!("Provider {i}"),
                    "address": "1 Lab Street",
                    "phone": "+98 21 0000",
                    "website": w
                })
            })
            .collect();
        format!("```json\n{}\n```", serde_json::Value::Array(items))
    }

    #[tokio::test]
    async fn test_find_providers_accepts_synthetic_domains() {
        let tx = Arc::new(MockTransport::new(vec![&provider_json(&[
            "www.a.example.com",
            "https://b.example.com/",
        ])]));
        let results = gateway(tx)
            .find_providers("feed lab", None, Language::En, ProviderKind::Distributor)
            .await
            .expect("providers should validate");

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.website.ends_with(".example.com")));
        assert!(results.iter().all(|r| r.kind == ProviderKind::Distributor));
    }

    #[tokio::test]
    async fn test_find_providers_rejects_real_domain() {
        let tx = Arc::new(MockTransport::new(vec![&provider_json(&[
            "www.a.example.com",
            "aistudio.google.com/some/path",
        ])]));
        let err = gateway(tx)
            .find_providers("vet", None, Language::En, ProviderKind::Veterinarian)
            .await
            .expect_err("real domains must be rejected");
        assert!(matches!(err, LabAssistError::SchemaViolation(_)));
    }

    #[tokio::test]
    async fn test_find_providers_rejects_suffix_outside_host() {
        for website in [
            "https://www.real-vet.com/x.example.com",
            "www.google.com?.example.com",
            "http://real.com#a.example.com",
            "https://a.example.com@www.real.com",
            "www.real.com?next=https://a.example.com",
            "www.a.example.com/redirect?to=b.example.com",
        ] {
            let tx = Arc::new(MockTransport::new(vec![&provider_json(&[website])]));
            let err = gateway(tx)
                .find_providers("vet", None, Language::En, ProviderKind::Veterinarian)
                .await
                .expect_err("host outside the synthetic domain must be rejected");
            assert!(matches!(err, LabAssistError::SchemaViolation(_)), "{website}");
        }
    }

    #[test]
    fn test_synthetic_website_checks_host() {
        assert!(is_synthetic_website("www.vet-clinic.example.com", ".example.com"));
        assert!(is_synthetic_website("https://Agro.Example.com:8443/contact", ".example.com"));
        assert!(!is_synthetic_website(".example.com", ".example.com"));
        assert!(!is_synthetic_website("www.real.com\\x.example.com", ".example.com"));
        assert_eq!(
            split_host("https://user@shop.example.com:80/a?b"),
            ("shop.example.com", "/a?b")
        );
    }

    #[tokio::test]
    async fn test_find_providers_rejects_missing_website_and_truncates() {
        let tx = Arc::new(MockTransport::new(vec![
            r#"[{"name":"No site","address":"x","phone":"y"}]"#,
        ]));
        assert!(
            gateway(tx)
                .find_providers("q", None, Language::En, ProviderKind::Distributor)
                .await
                .is_err()
        );

        let many = provider_json(&["a.example.com"; 8]);
        let tx = Arc::new(MockTransport::new(vec![&many]));
        let results = gateway(tx)
            .find_providers("q", None, Language::En, ProviderKind::Distributor)
            .await
            .expect("providers should validate");
        assert_eq!(results.len(), 5);
    }

    #[tokio::test]
    async fn test_semantic_search_sorted_and_truncated() {
        let body = r#"[
            {"title":"Home","description":"d","targetPage":"home","relevanceScore":0.2},
            {"title":"Recommender","description":"d","targetPage":"test_recommender","relevanceScore":0.95},
            {"title":"Experts","description":"d","targetPage":"our_experts","relevanceScore":0.5},
            {"title":"Hub","description":"d","targetPage":"content_hub","relevanceScore":1.3}
        ]"#;
        let tx = Arc::new(MockTransport::new(vec![body]));
        let results = gateway(tx.clone())
            .semantic_search("aflatoxin", prompts::DEFAULT_SITE_INDEX, Language::En)
            .await
            .expect("search should parse");

        assert_eq!(results.len(), 3);
        assert!(
            results
                .windows(2)
                .all(|w| w[0].relevance_score >= w[1].relevance_score)
        );
        assert_eq!(results[0].target_page, TargetPage::ContentHub);
        assert_eq!(results[0].relevance_score, 1.0);
        assert_eq!(tx.last_request().model, "gemini-2.5-pro");
    }

    #[tokio::test]
    async fn test_fetch_trends_requires_exactly_three() {
        let two = r#"[{"title":"a","summary":"b"},{"title":"c","summary":"d"}]"#;
        let tx = Arc::new(MockTransport::new(vec![two]));
        assert!(matches!(
            gateway(tx).fetch_trends(Language::En).await,
            Err(LabAssistError::SchemaViolation(_))
        ));

        let four = r#"[{"title":"a","summary":"b"},{"title":"c","summary":"d"},{"title":"e","summary":"f"},{"title":"g","summary":"h"}]"#;
        let tx = Arc::new(MockTransport::new(vec![four]));
        assert!(matches!(
            gateway(tx).fetch_trends(Language::En).await,
            Err(LabAssistError::SchemaViolation(_))
        ));

        let three = r#"[{"title":"a","summary":"b"},{"title":"c","summary":"d"},{"title":"e","summary":"f"}]"#;
        let tx = Arc::new(MockTransport::new(vec![three]));
        let trends = gateway(tx.clone())
            .fetch_trends(Language::En)
            .await
            .expect("three trends should pass");
        assert_eq!(trends.len(), TREND_COUNT);
        assert!(tx.last_request().tools.is_some());
    }

    #[tokio::test]
    async fn test_recommendation_sends_image_part_and_schema() {
        let body = r#"{
            "primaryAssessment": "Suspected aflatoxin contamination",
            "assessmentDescription": "desc",
            "potentialIssues": [{"name":"Aflatoxin B1","description":"mould","relevance":"High"}],
            "recommendedTests": ["Aflatoxin B & G Analysis by HPLC"],
            "managementAdvice": ["Keep dry"],
            "nextStepsAndExpertConsultation": "Consult an expert",
            "disclaimer": "Preliminary"
        }"#;
        let tx = Arc::new(MockTransport::new(vec![body]));
        let image = InlineImage {
            mime_type: "image/png".to_string(),
            data: vec![1, 2, 3],
        };
        let inputs = TestSubmissionFormInputs {
            sample_type: "Pistachio".to_string(),
            suspected_issue: "Aflatoxin for EU export".to_string(),
            ..Default::default()
        };
        let result = gateway(tx.clone())
            .get_recommendation(&inputs, Some(&image), Language::En)
            .await
            .expect("recommendation should parse");
        assert_eq!(result.recommended_tests.len(), 1);

        let req = tx.last_request();
        assert_eq!(req.contents[0].parts.len(), 2);
        assert!(req.generation_config.is_some());
    }

    #[tokio::test]
    async fn test_recommendation_schema_violation() {
        let tx = Arc::new(MockTransport::new(vec![r#"{"primaryAssessment": 3}"#]));
        let err = gateway(tx)
            .get_recommendation(&TestSubmissionFormInputs::default(), None, Language::En)
            .await
            .expect_err("wrong shape must fail");
        assert!(matches!(err, LabAssistError::SchemaViolation(_)));
    }

    #[tokio::test]
    async fn test_test_details_rejects_empty_list() {
        let tx = Arc::new(MockTransport::new(Vec::<String>::new()));
        let err = gateway(tx.clone())
            .get_test_details(&[], Language::En)
            .await
            .expect_err("empty list is invalid");
        assert!(matches!(err, LabAssistError::InvalidInput(_)));
        assert!(tx.requests.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn test_auto_fill_defaults_missing_fields_to_empty() {
        let tx = Arc::new(MockTransport::new(vec![r#"{"sampleAge":"2 weeks"}"#]));
        let details = gateway(tx)
            .auto_fill_details("Honey crystallised after two weeks", Language::En)
            .await
            .expect("partial object should parse");
        assert_eq!(details.sample_age, "2 weeks");
        assert_eq!(details.specific_conditions, "");
        assert_eq!(details.control_sample_info, "");
    }

    #[tokio::test]
    async fn test_social_post_requires_both_fields() {
        let tx = Arc::new(MockTransport::new(vec![r#"{"postText":"Hello","imagePrompt":""}"#]));
        assert!(
            gateway(tx)
                .generate_social_post("HPLC", SocialPlatform::LinkedIn, Language::En)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_transport_errors_pass_through() {
        let tx = Arc::new(MockTransport::failing("Gemini API error (429 Too Many Requests): quota"));
        let err = gateway(tx)
            .adapt_post_for_website("post", SocialPlatform::Twitter, Language::En)
            .await
            .expect_err("transport failure should surface");
        assert!(matches!(err, LabAssistError::Transport(_)));
    }

    #[tokio::test]
    async fn test_stream_chat_sends_full_history() {
        let tx = Arc::new(MockTransport::new(Vec::<String>::new()));
        let mut history = Conversation::with_greeting("Hello");
        history.push(Message::model(""));
        history.push(Message::user("What is HPLC?"));

        let stream = gateway(tx.clone())
            .stream_chat(&history, prompts::CHAT_SYSTEM_INSTRUCTION)
            .await
            .expect("stream should open");
        let text: Vec<String> = stream.map(|r| r.expect("chunk")).collect().await;
        assert_eq!(text.concat(), "Hi there");

        let req = tx.last_request();
        assert_eq!(req.contents.len(), 2);
        assert_eq!(req.contents[0].role.as_deref(), Some("model"));
        assert_eq!(req.contents[1].role.as_deref(), Some("user"));
        assert!(req.system_instruction.is_some());
    }
}
