use serde::Serialize;

use crate::models::{
    AdaptedPost, AutoFilledDetails, Conversation, DailyTrend, Language, ProviderSearchResult,
    SearchResultItem, SocialPlatform, TestDetailsItem, TestRecommendationResult,
};

/// Status of one logical async operation.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum RequestState<T> {
    #[default]
    Idle,
    Pending,
    Succeeded(T),
    Failed(String),
}

impl<T> RequestState<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, RequestState::Pending)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            RequestState::Succeeded(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            RequestState::Failed(message) => Some(message),
            _ => None,
        }
    }
}

/// Identifies one started operation; stale tickets are ignored on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// A `RequestState` guarded by a generation counter, so a superseded request
/// cannot overwrite the state of the one that replaced it.
#[derive(Debug, Clone, Default)]
pub struct OperationSlot<T> {
    generation: u64,
    state: RequestState<T>,
}

impl<T> OperationSlot<T> {
    pub fn new() -> Self {
        Self {
            generation: 0,
            state: RequestState::Idle,
        }
    }

    /// Enter `Pending`, dropping any previous result.
    pub fn begin(&mut self) -> Ticket {
        self.generation += 1;
        self.state = RequestState::Pending;
        Ticket(self.generation)
    }

    /// Back to `Idle`; anything in flight becomes stale.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.state = RequestState::Idle;
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        ticket.0 == self.generation
    }

    pub fn succeed(&mut self, ticket: Ticket, value: T) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.state = RequestState::Succeeded(value);
        true
    }

    pub fn fail(&mut self, ticket: Ticket, message: impl Into<String>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.state = RequestState::Failed(message.into());
        true
    }

    pub fn state(&self) -> &RequestState<T> {
        &self.state
    }

    pub fn value(&self) -> Option<&T> {
        self.state.value()
    }

    /// Mutable access to a succeeded value, only for the current ticket.
    pub fn value_mut(&mut self, ticket: Ticket) -> Option<&mut T> {
        if !self.is_current(ticket) {
            return None;
        }
        match &mut self.state {
            RequestState::Succeeded(value) => Some(value),
            _ => None,
        }
    }
}

/// A generated social post. The image is produced by a second call and can
/// fail on its own without losing the text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratedPost {
    pub platform: SocialPlatform,
    pub text: String,
    pub image: RequestState<Vec<u8>>,
}

/// Everything the view layer renders. Handed out as a snapshot.
#[derive(Debug, Clone)]
pub struct AppState {
    pub language: Language,
    pub authenticated: bool,
    pub quota_exhausted: bool,
    pub conversation: Conversation,
    pub chat: OperationSlot<()>,
    pub providers: OperationSlot<Vec<ProviderSearchResult>>,
    pub recommendation: OperationSlot<TestRecommendationResult>,
    pub test_details: OperationSlot<Vec<TestDetailsItem>>,
    pub auto_fill: OperationSlot<AutoFilledDetails>,
    pub search: OperationSlot<Vec<SearchResultItem>>,
    pub trends: OperationSlot<Vec<DailyTrend>>,
    pub post: OperationSlot<GeneratedPost>,
    pub adapted_post: OperationSlot<AdaptedPost>,
}

impl AppState {
    pub fn new(language: Language, greeting: &str) -> Self {
        let conversation = if greeting.trim().is_empty() {
            Conversation::new()
        } else {
            Conversation::with_greeting(greeting)
        };
        Self {
            language,
            authenticated: false,
            quota_exhausted: false,
            conversation,
            chat: OperationSlot::new(),
            providers: OperationSlot::new(),
            recommendation: OperationSlot::new(),
            test_details: OperationSlot::new(),
            auto_fill: OperationSlot::new(),
            search: OperationSlot::new(),
            trends: OperationSlot::new(),
            post: OperationSlot::new(),
            adapted_post: OperationSlot::new(),
        }
    }

    /// Fetched details for one recommended test; the service may answer in any order.
    pub fn details_for(&self, test_name: &str) -> Option<&TestDetailsItem> {
        let wanted = test_name.trim();
        self.test_details
            .value()?
            .iter()
            .find(|item| item.test_name.trim().eq_ignore_ascii_case(wanted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_ticket_is_discarded() {
        let mut slot: OperationSlot<&str> = OperationSlot::new();
        let first = slot.begin();
        let second = slot.begin();

        assert!(slot.succeed(second, "b"));
        assert!(!slot.succeed(first, "a"));
        assert!(!slot.fail(first, "late failure"));
        assert_eq!(slot.value(), Some(&"b"));
    }

    #[test]
    fn test_begin_clears_previous_result() {
        let mut slot: OperationSlot<u32> = OperationSlot::new();
        let t = slot.begin();
        slot.fail(t, "nope");
        assert_eq!(slot.state().error(), Some("nope"));
        slot.begin();
        assert!(slot.state().is_pending());
    }

    #[test]
    fn test_reset_invalidates_in_flight() {
        let mut slot: OperationSlot<u32> = OperationSlot::new();
        let t = slot.begin();
        slot.reset();
        assert!(!slot.succeed(t, 1));
        assert_eq!(slot.state(), &RequestState::Idle);
    }

    #[test]
    fn test_details_for_matches_by_name() {
        let mut state = AppState::new(Language::En, "hi");
        let t = state.test_details.begin();
        state.test_details.succeed(
            t,
            vec![TestDetailsItem {
                test_name: "Heavy Metal Panel by ICP-MS".to_string(),
                purpose: "p".to_string(),
                methodology: "ICP-MS".to_string(),
                turnaround_time: "5 days".to_string(),
                estimated_cost: "Contact for quote".to_string(),
            }],
        );
        assert!(state.details_for("heavy metal panel by icp-ms ").is_some());
        assert!(state.details_for("Aflatoxin").is_none());
    }
}
