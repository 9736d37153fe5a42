use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Response language requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Fa,
    Ar,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Fa => "fa",
            Language::Ar => "ar",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" => Ok(Language::En),
            "fa" => Ok(Language::Fa),
            "ar" => Ok(Language::Ar),
            other => Err(format!("unsupported language '{other}' (expected en, fa or ar)")),
        }
    }
}

// ───────────────────────────────────────────────────────────────────────────────
// Conversation
// ───────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Ordered chat transcript.
///
/// Append-only, except that the final entry may have its text replaced while a
/// reply is streaming in, and empty model placeholders may be dropped when
/// their stream fails or is superseded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_greeting(greeting: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::model(greeting)],
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Replaces the text of the final message. Returns false when the
    /// transcript is empty or the final message is not a model reply.
    pub fn replace_last_text(&mut self, text: &str) -> bool {
        match self.messages.last_mut() {
            Some(last) if last.role == Role::Model => {
                last.text.clear();
                last.text.push_str(text);
                true
            }
            _ => false,
        }
    }

    /// Drops the final message if it is a model reply.
    pub fn pop_model_reply(&mut self) -> Option<Message> {
        if self.messages.last().map(|m| m.role) == Some(Role::Model) {
            self.messages.pop()
        } else {
            None
        }
    }

    /// Removes empty model replies anywhere but the tail. Those are
    /// placeholders of superseded sends; the tail may still be streaming.
    pub fn prune_abandoned_replies(&mut self) -> usize {
        let before = self.messages.len();
        let last = before.saturating_sub(1);
        let mut index = 0;
        self.messages.retain(|m| {
            let keep = index == last || m.role != Role::Model || !m.text.trim().is_empty();
            index += 1;
            keep
        });
        before - self.messages.len()
    }
}

// ───────────────────────────────────────────────────────────────────────────────
// Test recommendation
// ───────────────────────────────────────────────────────────────────────────────

/// Sample submission form as filled in by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSubmissionFormInputs {
    pub sample_type: String,
    pub suspected_issue: String,
    #[serde(default)]
    pub batch_size_origin: String,
    #[serde(default)]
    pub specific_conditions: String,
    #[serde(default)]
    pub control_sample_info: String,
    #[serde(default)]
    pub sample_age: String,
    #[serde(default)]
    pub previous_tests: String,
    #[serde(default)]
    pub additives: String,
}

/// Image attached to a recommendation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relevance {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotentialIssue {
    pub name: String,
    pub description: String,
    pub relevance: Relevance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRecommendationResult {
    pub primary_assessment: String,
    pub assessment_description: String,
    pub potential_issues: Vec<PotentialIssue>,
    pub recommended_tests: Vec<String>,
    pub management_advice: Vec<String>,
    pub next_steps_and_expert_consultation: String,
    pub disclaimer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDetailsItem {
    pub test_name: String,
    pub purpose: String,
    pub methodology: String,
    pub turnaround_time: String,
    pub estimated_cost: String,
}

/// Optional form fields inferred from the free-text issue description.
/// Fields the model cannot infer are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoFilledDetails {
    #[serde(default)]
    pub specific_conditions: String,
    #[serde(default)]
    pub control_sample_info: String,
    #[serde(default)]
    pub sample_age: String,
}

// ───────────────────────────────────────────────────────────────────────────────
// Providers
// ───────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Distributor,
    Veterinarian,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Distributor => "distributor",
            ProviderKind::Veterinarian => "veterinarian",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a provider search locates the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMethod {
    Geo,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSearchResult {
    pub name: String,
    pub address: String,
    pub phone: String,
    pub website: String,
    pub kind: ProviderKind,
}

// ───────────────────────────────────────────────────────────────────────────────
// Semantic search
// ───────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPage {
    Home,
    TestRecommender,
    SampleDropoff,
    AiConsultant,
    ContentHub,
    OurExperts,
    Partnerships,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultItem {
    pub title: String,
    pub description: String,
    pub target_page: TargetPage,
    pub relevance_score: f64,
}

// ───────────────────────────────────────────────────────────────────────────────
// Content hub
// ───────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTrend {
    pub title: String,
    pub summary: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocialPlatform {
    LinkedIn,
    Twitter,
    Instagram,
    Facebook,
}

impl SocialPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            SocialPlatform::LinkedIn => "linkedin",
            SocialPlatform::Twitter => "twitter",
            SocialPlatform::Instagram => "instagram",
            SocialPlatform::Facebook => "facebook",
        }
    }
}

impl fmt::Display for SocialPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SocialPlatform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "linkedin" => Ok(SocialPlatform::LinkedIn),
            "twitter" => Ok(SocialPlatform::Twitter),
            "instagram" => Ok(SocialPlatform::Instagram),
            "facebook" => Ok(SocialPlatform::Facebook),
            other => Err(format!("unsupported platform '{other}'")),
        }
    }
}

/// Text half of a generated social post plus the prompt for its image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialPostDraft {
    pub post_text: String,
    pub image_prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptedPost {
    pub title: String,
    /// Markdown body.
    pub content: String,
}

// ───────────────────────────────────────────────────────────────────────────────
// Gemini request format
// ───────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineDataPayload,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineDataPayload {
    pub mime_type: String,
    /// Base64-encoded bytes.
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some(Role::User.as_str().to_string()),
            parts,
        }
    }
}

impl From<&Message> for Content {
    fn from(message: &Message) -> Self {
        Self {
            role: Some(message.role.as_str().to_string()),
            parts: vec![Part::text(message.text.clone())],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,
}

impl GenerationConfig {
    pub fn json(schema: serde_json::Value) -> Self {
        Self {
            response_mime_type: Some("application/json".to_string()),
            response_schema: Some(schema),
        }
    }
}

// Gemini generateContent request body; the model is part of the URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    #[serde(skip)]
    pub model: String,
    pub contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
}

impl GeminiRequest {
    pub fn prompt(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            contents: vec![Content::user(vec![Part::text(prompt)])],
            system_instruction: None,
            generation_config: None,
            tools: None,
        }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.generation_config = Some(GenerationConfig::json(schema));
        self
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(Content {
            role: None,
            parts: vec![Part::text(instruction)],
        });
        self
    }

    pub fn with_search_grounding(mut self) -> Self {
        self.tools = Some(vec![serde_json::json!({ "googleSearch": {} })]);
        self
    }
}
