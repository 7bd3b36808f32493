//! Chat dispatch: the path from an inbound user message to a reply.
//!
//! [`ChatService::handle_chat`] appends the user turn (creating the
//! conversation on first contact), routes the request to
//! the adapter registered for the model, appends the assistant turn and
//! truncates. Provider failures stay typed until [`ChatReply::from_outcome`],
//! where they are flattened into an `"Error: ..."` reply with no usage.
//!
//! Two concurrent chats on the same session may interleave their appends;
//! the store lock is not held across the provider call.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::conversation::{Conversation, ConversationStore, SessionId};
use crate::health::Readiness;
use crate::llm::registry::ProviderRegistry;
use crate::llm::{AdapterKind, Completion, Message, ProviderError, UsageStats};

/// Body of a `POST /api/chat` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub usage: Option<UsageStats>,
}

impl ChatReply {
    /// Flatten a typed provider outcome into the wire reply.
    pub fn from_outcome(outcome: Result<Completion, ProviderError>) -> Self {
        match outcome {
            Ok(c) => Self { response: c.text, usage: c.usage },
            Err(e) => Self { response: format!("Error: {e}"), usage: None },
        }
    }
}

pub struct ChatService {
    store: ConversationStore,
    providers: ProviderRegistry,
    default_model: String,
}

impl ChatService {
    pub fn new(store: ConversationStore, providers: ProviderRegistry, default_model: impl Into<String>) -> Self {
        Self { store, providers, default_model: default_model.into() }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Run one chat turn for `session`. Never fails: provider errors come
    /// back as an `"Error: ..."` reply and are recorded as the assistant turn.
    pub async fn handle_chat(&self, session: &SessionId, user_text: String, model: Option<String>) -> ChatReply {
        let model = model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.default_model.clone());

        let user = Message::user(user_text);
        let conversation = self.store.append(session, user.clone()).await;

        let outcome = match self.providers.resolve(&model) {
            Ok((kind, provider)) => {
                let request = build_request(kind, &conversation, user, self.store.system_prompt());
                debug!(%session, %model, %kind, messages = request.len(), "dispatching chat turn");
                provider.complete(&request, &model).await
            }
            Err(e) => Err(e),
        };

        if let Err(e) = &outcome {
            warn!(%session, %model, error = %e, "provider call failed");
        }
        let reply = ChatReply::from_outcome(outcome);

        self.store
            .append(session, Message::assistant(reply.response.clone()))
            .await;
        self.store.truncate(session).await;

        if let Some(u) = &reply.usage {
            info!(
                %session,
                model = %u.model,
                prompt_tokens = u.prompt_tokens,
                completion_tokens = u.completion_tokens,
                total_tokens = u.total_tokens,
                "chat turn complete"
            );
        }
        reply
    }

    /// Reset the session to its system prompt.
    pub async fn handle_clear(&self, session: &SessionId) {
        self.store.reset(session).await;
    }

    /// Readiness of the provider serving the default model.
    pub async fn readiness(&self) -> Readiness {
        match self.providers.resolve(&self.default_model) {
            Ok((_, provider)) => provider.readiness().await,
            Err(e) => Readiness::invalid(e.to_string()),
        }
    }
}

/// Messages sent to the adapter for this turn.
///
/// Kinds that cannot carry history get the system message and the latest user
/// turn only; this treats them as stateless per call even though the full
/// conversation keeps accumulating.
fn build_request(kind: AdapterKind, conversation: &Conversation, user: Message, system_prompt: &str) -> Vec<Message> {
    if kind.accepts_history() {
        return conversation.messages().to_vec();
    }
    let system = conversation
        .system()
        .cloned()
        .unwrap_or_else(|| Message::system(system_prompt));
    vec![system, user]
}
