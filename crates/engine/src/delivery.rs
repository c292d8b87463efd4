//! The delivery controller: one send or reroll cycle per call.
//!
//! ```text
//! Idle -> Drafting -> AwaitingReply -> Delivered | Failed
//! ```
//!
//! Drafting and the bookkeeping after the reply run under the state mutex;
//! the network call does not. Whether the user is still looking at the
//! character is re-read after the reply arrives, and the typing lock and
//! unread flag are the only state that crosses that gap. A cycle whose
//! future is dropped before the reply lands still releases its lock.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parlor_config::{ApiSettings, AppConfig};
use parlor_core::error::{ProviderError, StoreError};
use parlor_core::event::{DomainEvent, EventBus, NoticeLevel};
use parlor_core::message::{ChatMessage, Message, Role, plain_text, timestamp_now};
use parlor_memory::Repository;
use parlor_providers::{ProviderAdapter, RequestLog};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use crate::context::ContextAssembler;
use crate::conversation::{ConversationState, LoadMore, Window};
use crate::error::{ConversationError, DeliveryError, KnowledgeError};
use crate::knowledge::KnowledgeLibrary;
use crate::reveal::RevealPlan;
use crate::state::AppState;

/// How a cycle that reached the network ended.
#[derive(Debug)]
pub enum DeliveryOutcome {
    /// The reply was appended at `message_index`. `reveal` is present only
    /// when the character was on screen when it arrived.
    Delivered {
        message_index: usize,
        reveal: Option<RevealPlan>,
    },
    /// The provider call failed; the history keeps the user turn.
    Failed {
        error: ProviderError,
        /// The error was published inline for the character on screen
        shown_inline: bool,
    },
    /// A reply arrived but its character is gone, so it was dropped.
    Discarded(ConversationError),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }
}

/// What a renderer needs on entering a conversation.
#[derive(Debug, Clone)]
pub struct ConversationView {
    pub character_id: String,
    pub name: String,
    pub window: Window,
    /// A reply for this character is outstanding
    pub typing: bool,
    /// Reroll is available
    pub has_reply: bool,
}

/// Everything captured under the lock that the network call needs.
struct Draft {
    messages: Vec<ChatMessage>,
    settings: ApiSettings,
    in_flight: InFlight,
}

/// Releases a character's typing lock if its cycle is dropped mid-flight.
///
/// A cycle that runs to completion disarms the guard and releases the lock
/// itself, after the reply has been recorded.
struct InFlight {
    state: Arc<Mutex<AppState>>,
    events: Arc<EventBus>,
    character_id: String,
    armed: bool,
}

impl InFlight {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(character = %self.character_id, "Reply abandoned before it arrived, releasing typing lock");

        let id = std::mem::take(&mut self.character_id);
        let events = self.events.clone();
        let release = move |state: &mut AppState| {
            state.typing.release(&id);
            events.publish(DomainEvent::TypingChanged {
                character_id: id,
                typing: false,
            });
        };

        if let Ok(mut state) = self.state.try_lock() {
            release(&mut *state);
            return;
        }
        let state = self.state.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let mut state = state.lock().await;
                    release(&mut *state);
                });
            }
            Err(_) => warn!("No runtime left to release the typing lock"),
        }
    }
}

/// Drives send/reroll cycles and message actions over shared [`AppState`].
#[derive(Clone)]
pub struct DeliveryController {
    state: Arc<Mutex<AppState>>,
    adapter: Arc<ProviderAdapter>,
    assembler: Arc<ContextAssembler>,
    repository: Repository,
    events: Arc<EventBus>,
    reveal_pace: Duration,
}

impl DeliveryController {
    pub fn new(
        state: AppState,
        adapter: Arc<ProviderAdapter>,
        assembler: ContextAssembler,
        repository: Repository,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            adapter,
            assembler: Arc::new(assembler),
            repository,
            events,
            reveal_pace: Duration::from_millis(400),
        }
    }

    /// Load settings, characters and books from `repository` and wire a
    /// controller from `config`.
    pub async fn load(
        config: &AppConfig,
        repository: Repository,
        adapter: Arc<ProviderAdapter>,
        events: Arc<EventBus>,
    ) -> Result<Self, StoreError> {
        let settings = repository.load_settings(&config.api).await?;
        let characters = repository.load_characters().await?;
        let books = repository.load_books().await?;
        info!(
            characters = characters.len(),
            books = books.len(),
            store = repository.store().name(),
            "Loaded application state"
        );

        let state = AppState::new(
            settings,
            ConversationState::new(characters, config.display.page_size),
            KnowledgeLibrary::new(books),
        );
        let assembler = ContextAssembler::new(&config.context, &config.knowledge);
        Ok(Self::new(state, adapter, assembler, repository, events)
            .with_reveal_pace(Duration::from_millis(config.display.reveal_delay_ms)))
    }

    /// Set the pause between revealed paragraphs.
    pub fn with_reveal_pace(mut self, pace: Duration) -> Self {
        self.reveal_pace = pace;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.events.subscribe()
    }

    /// Read-only access to the current state.
    pub async fn read<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        let state = self.state.lock().await;
        f(&state)
    }

    /// The last request body sent to a provider.
    pub fn last_request(&self) -> Option<RequestLog> {
        self.adapter.last_request()
    }

    // ── Navigation ───────────────────────────────────────────────────────

    /// Open a character: one page visible, unread cleared, any running
    /// reveal for the previous character stopped.
    pub async fn enter_character(&self, id: &str) -> Result<ConversationView, DeliveryError> {
        let mut state = self.state.lock().await;
        let character = state.conversations.character(id)?;
        let was_unread = character.unread;

        if let Some(reveal) = state.reveal.take() {
            reveal.cancel();
        }
        state.active_character = Some(id.to_string());
        state.conversations.reset_window();
        state.conversations.set_unread(id, false)?;
        if was_unread {
            self.persist_characters(&state).await;
        }

        Self::view(&state, id)
    }

    /// Back to the character list.
    pub async fn leave(&self) {
        let mut state = self.state.lock().await;
        if let Some(reveal) = state.reveal.take() {
            reveal.cancel();
        }
        state.active_character = None;
    }

    /// The current view of `id` without changing navigation.
    pub async fn view_of(&self, id: &str) -> Result<ConversationView, DeliveryError> {
        let state = self.state.lock().await;
        Self::view(&state, id)
    }

    fn view(state: &AppState, id: &str) -> Result<ConversationView, DeliveryError> {
        let character = state.conversations.character(id)?;
        Ok(ConversationView {
            character_id: id.to_string(),
            name: character.name.clone(),
            window: state.conversations.window(id)?,
            typing: state.typing.is_in_flight(id),
            has_reply: character.has_reply(),
        })
    }

    pub async fn load_more(&self, id: &str) -> Result<LoadMore, DeliveryError> {
        let mut state = self.state.lock().await;
        Ok(state.conversations.load_more(id)?)
    }

    // ── Send / reroll ────────────────────────────────────────────────────

    /// Append `text` as a user turn and request a reply.
    pub async fn send(&self, id: &str, text: &str) -> Result<DeliveryOutcome, DeliveryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DeliveryError::EmptyInput);
        }

        let draft = {
            let mut state = self.state.lock().await;
            Self::check_ready(&state, id)?;

            state.conversations.set_persona(id)?;
            let index = state
                .conversations
                .append(id, Message::user(text, timestamp_now()))?;
            self.events.publish(DomainEvent::MessageAppended {
                character_id: id.to_string(),
                index,
                role: Role::User,
                timestamp: Utc::now(),
            });
            self.persist_characters(&state).await;

            self.begin(&mut state, id, text)?
        };

        Ok(self.await_reply(id, draft).await)
    }

    /// Drop the trailing replies and ask again for the last user turn.
    pub async fn reroll(&self, id: &str) -> Result<DeliveryOutcome, DeliveryError> {
        let draft = {
            let mut state = self.state.lock().await;
            Self::check_ready(&state, id)?;

            let last_user = state
                .conversations
                .character(id)?
                .last_user_message()
                .map(|m| m.body().to_string())
                .ok_or(DeliveryError::NothingToReroll)?;

            let removed = state.conversations.truncate_trailing_assistant(id)?;
            state.conversations.set_persona(id)?;
            debug!(character = %id, removed, "Rerolling last reply");
            self.events.publish(DomainEvent::HistoryChanged {
                character_id: id.to_string(),
            });
            self.persist_characters(&state).await;

            self.begin(&mut state, id, &last_user)?
        };

        Ok(self.await_reply(id, draft).await)
    }

    fn check_ready(state: &AppState, id: &str) -> Result<(), DeliveryError> {
        state.settings.validate_for_send()?;
        state.conversations.character(id)?;
        if state.typing.is_in_flight(id) {
            return Err(DeliveryError::Busy(id.to_string()));
        }
        Ok(())
    }

    /// Take the typing lock and capture what the request needs.
    fn begin(&self, state: &mut AppState, id: &str, scan_text: &str) -> Result<Draft, DeliveryError> {
        let character = state.conversations.character(id)?;
        let messages = self
            .assembler
            .build(character, scan_text, state.library.books());

        state.typing.acquire(id);
        self.events.publish(DomainEvent::TypingChanged {
            character_id: id.to_string(),
            typing: true,
        });

        Ok(Draft {
            messages,
            settings: state.settings.clone(),
            in_flight: InFlight {
                state: self.state.clone(),
                events: self.events.clone(),
                character_id: id.to_string(),
                armed: true,
            },
        })
    }

    async fn await_reply(&self, id: &str, draft: Draft) -> DeliveryOutcome {
        let Draft {
            messages,
            settings,
            mut in_flight,
        } = draft;
        let result = self.adapter.complete(&messages, &settings).await;

        let mut state = self.state.lock().await;
        in_flight.disarm();
        let outcome = match result {
            Ok(reply) => self.deliver(&mut state, id, reply),
            Err(error) => self.fail(&state, id, error),
        };

        state.typing.release(id);
        self.events.publish(DomainEvent::TypingChanged {
            character_id: id.to_string(),
            typing: false,
        });

        if outcome.is_delivered() {
            self.persist_characters(&state).await;
        }
        outcome
    }

    fn deliver(&self, state: &mut AppState, id: &str, reply: String) -> DeliveryOutcome {
        let message = Message::assistant(reply, Some(timestamp_now()));
        let units = message.paragraphs();
        let message_index = match state.conversations.append(id, message) {
            Ok(index) => index,
            Err(e) => {
                warn!(character = %id, error = %e, "Dropping reply for a missing character");
                return DeliveryOutcome::Discarded(e);
            }
        };
        self.events.publish(DomainEvent::MessageAppended {
            character_id: id.to_string(),
            index: message_index,
            role: Role::Assistant,
            timestamp: Utc::now(),
        });

        if !state.is_viewing(id) {
            info!(character = %id, "Reply arrived off screen, marking unread");
            // Cannot fail: the append above found the character
            let _ = state.conversations.set_unread(id, true);
            self.events.publish(DomainEvent::UnreadMarked {
                character_id: id.to_string(),
            });
            return DeliveryOutcome::Delivered {
                message_index,
                reveal: None,
            };
        }

        let plan = RevealPlan::new(id, message_index, units.clone(), self.reveal_pace);
        if let Some(previous) = state.reveal.replace(plan.cancel_handle()) {
            previous.cancel();
        }
        self.events.publish(DomainEvent::ReplyReady {
            character_id: id.to_string(),
            message_index,
            units,
            pace_ms: u64::try_from(self.reveal_pace.as_millis()).unwrap_or(u64::MAX),
        });
        DeliveryOutcome::Delivered {
            message_index,
            reveal: Some(plan),
        }
    }

    fn fail(&self, state: &AppState, id: &str, error: ProviderError) -> DeliveryOutcome {
        let shown_inline = state.is_viewing(id);
        if shown_inline {
            let anchor_index = state
                .conversations
                .character(id)
                .map(|c| c.history.len().saturating_sub(1))
                .unwrap_or(0);
            self.events.publish(DomainEvent::InlineError {
                character_id: id.to_string(),
                anchor_index,
                text: format!("(Send failed: {error})"),
            });
        } else {
            warn!(character = %id, error = %error, "Reply failed off screen");
        }
        DeliveryOutcome::Failed {
            error,
            shown_inline,
        }
    }

    // ── Message actions ──────────────────────────────────────────────────

    /// Replace the text of a message. `false` when nothing changed.
    pub async fn edit_message(&self, id: &str, index: usize, text: &str) -> Result<bool, DeliveryError> {
        let mut state = self.state.lock().await;
        let changed = state.conversations.edit_at(id, index, text)?;
        if changed {
            self.events.publish(DomainEvent::HistoryChanged {
                character_id: id.to_string(),
            });
            self.persist_characters(&state).await;
        }
        Ok(changed)
    }

    pub async fn delete_message(&self, id: &str, index: usize) -> Result<Message, DeliveryError> {
        let mut state = self.state.lock().await;
        let removed = state.conversations.delete_at(id, index)?;
        self.events.publish(DomainEvent::HistoryChanged {
            character_id: id.to_string(),
        });
        self.persist_characters(&state).await;
        Ok(removed)
    }

    /// Message text for the clipboard.
    pub async fn copy_text(&self, id: &str, index: usize) -> Result<String, DeliveryError> {
        let state = self.state.lock().await;
        let history = &state.conversations.character(id)?.history;
        let message = history.get(index).ok_or(ConversationError::IndexOutOfRange {
            index,
            len: history.len(),
        })?;
        Ok(plain_text(&message.content))
    }

    // ── Library and settings ─────────────────────────────────────────────

    /// Apply `f` to the knowledge library and save the books.
    pub async fn update_library<R>(
        &self,
        f: impl FnOnce(&mut KnowledgeLibrary) -> Result<R, KnowledgeError>,
    ) -> Result<R, DeliveryError> {
        let mut state = self.state.lock().await;
        let out = f(&mut state.library)?;
        if let Err(e) = self.repository.save_books(state.library.books()).await {
            self.report_store_error(&e);
        }
        Ok(out)
    }

    /// Apply `f` to the endpoint settings and save them.
    pub async fn update_settings<R>(&self, f: impl FnOnce(&mut ApiSettings) -> R) -> Result<R, DeliveryError> {
        let mut state = self.state.lock().await;
        let out = f(&mut state.settings);
        self.repository.save_settings(&state.settings).await?;
        Ok(out)
    }

    // ── Persistence ──────────────────────────────────────────────────────

    async fn persist_characters(&self, state: &AppState) {
        if let Err(e) = self
            .repository
            .save_characters(state.conversations.characters())
            .await
        {
            self.report_store_error(&e);
        }
    }

    fn report_store_error(&self, error: &StoreError) {
        let (level, message) = match error {
            StoreError::QuotaExceeded { .. } => (
                NoticeLevel::Error,
                "Storage is full; recent changes were not saved. Export a backup and delete old messages."
                    .to_string(),
            ),
            other => (NoticeLevel::Warning, format!("Could not save: {other}")),
        };
        warn!(error = %error, "Save failed");
        self.events.publish(DomainEvent::Notice { level, message });
    }
}
