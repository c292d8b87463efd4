//! End-to-end tests for the Parlor delivery pipeline.
//!
//! These drive a `DeliveryController` loaded from a real store through a
//! scripted transport, and check what reaches the wire, what lands in the
//! history and what a renderer would be told.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use parlor_config::AppConfig;
use parlor_core::character::Character;
use parlor_core::error::ProviderError;
use parlor_core::event::{DomainEvent, EventBus};
use parlor_core::knowledge::{BookScope, KnowledgeBook, KnowledgeEntry};
use parlor_core::message::{Message, Role};
use parlor_core::provider::{Transport, WireRequest, WireResponse};
use parlor_core::store::{KeyValueStore, keys};
use parlor_engine::{DeliveryController, DeliveryError, DeliveryOutcome};
use parlor_memory::{FileStore, InMemoryStore, Repository, export_backup, import_backup};
use parlor_providers::ProviderAdapter;
use serde_json::{Map, Value, json};
use tokio::sync::Semaphore;

// ── Scripted transport ───────────────────────────────────────────────────

/// Replies from a script in order and records every request.
///
/// A gated transport holds each request until the test adds a permit.
struct ScriptedTransport {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<WireRequest>>,
    gate: Option<Semaphore>,
}

impl ScriptedTransport {
    fn new(replies: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            gate: None,
        })
    }

    fn gated(replies: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            gate: Some(Semaphore::new(0)),
        })
    }

    fn open(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    fn request(&self, n: usize) -> WireRequest {
        self.requests.lock().unwrap()[n].clone()
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: WireRequest) -> Result<WireResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        let body = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("transport script exhausted");
        Ok(WireResponse { status: 200, body })
    }
}

fn openai(text: &str) -> String {
    json!({"choices": [{"message": {"role": "assistant", "content": text}}]}).to_string()
}

fn claude(text: &str) -> String {
    json!({"content": [{"type": "text", "text": text}]}).to_string()
}

fn gemini(text: &str) -> String {
    json!({"candidates": [{"content": {"parts": [{"text": text}]}}]}).to_string()
}

// ── Harness ──────────────────────────────────────────────────────────────

const OPENAI_URL: &str = "https://api.example.com/v1/chat/completions";
const CLAUDE_URL: &str = "https://api.anthropic.com/v1/messages";
const GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

fn config(url: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.api.api_url = url.into();
    config.api.api_key = "sk-test".into();
    config.api.model = "test-model".into();
    config
}

fn cast() -> (Character, Character) {
    (
        Character::new("Mina", "🌧", "You are Mina, a quiet painter."),
        Character::new("Ren", "🔥", "You are Ren, a loud blacksmith."),
    )
}

async fn boot(
    url: &str,
    store: Arc<dyn KeyValueStore>,
    characters: Vec<Character>,
    books: Vec<KnowledgeBook>,
    transport: Arc<ScriptedTransport>,
) -> (DeliveryController, Repository) {
    let repository = Repository::new(store);
    repository.save_characters(&characters).await.unwrap();
    if !books.is_empty() {
        repository.save_books(&books).await.unwrap();
    }
    let controller = DeliveryController::load(
        &config(url),
        repository.clone(),
        Arc::new(ProviderAdapter::new(transport)),
        Arc::new(EventBus::default()),
    )
    .await
    .unwrap();
    (controller, repository)
}

async fn wait_in_flight(controller: &DeliveryController, id: &str) {
    while !controller.read(|s| s.typing.is_in_flight(id)).await {
        tokio::task::yield_now().await;
    }
}

fn sent_messages(request: &WireRequest) -> Vec<Value> {
    request.body.as_ref().unwrap()["messages"]
        .as_array()
        .unwrap()
        .clone()
}

fn history(controller_state: &parlor_engine::AppState, id: &str) -> Vec<Message> {
    controller_state
        .conversations
        .character(id)
        .unwrap()
        .history
        .clone()
}

// ── Knowledge scope ──────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_knowledge_scoped_to_active_character() {
    let (mina, ren) = cast();
    let (mina_id, ren_id) = (mina.id.clone(), ren.id.clone());

    let mut global = KnowledgeBook::new("World");
    global.entries.push(KnowledgeEntry::new(vec!["rain".into()], "It has rained for a week.", false, None));
    let mut minas = KnowledgeBook::new("Mina's notes");
    minas.scope = BookScope::Character(mina_id.clone());
    minas
        .entries
        .push(KnowledgeEntry::new(vec!["RAIN".into()], "{{char}} paints the rain for {{user}}.", false, None));
    let mut rens = KnowledgeBook::new("Ren's notes");
    rens.scope = BookScope::Character(ren_id.clone());
    rens.entries.push(KnowledgeEntry::new(vec!["rain".into()], "Ren hates rain.", false, None));

    let transport = ScriptedTransport::new(vec![openai("Shall I paint it?")]);
    let (controller, _) = boot(
        OPENAI_URL,
        Arc::new(InMemoryStore::new()),
        vec![mina, ren],
        vec![global, minas, rens],
        transport.clone(),
    )
    .await;

    controller.enter_character(&mina_id).await.unwrap();
    controller.send(&mina_id, "Look at the rain outside").await.unwrap();

    let messages = sent_messages(&transport.request(0));
    assert_eq!(messages.len(), 4);
    let knowledge = messages[2]["content"].as_str().unwrap();
    assert!(knowledge.ends_with("It has rained for a week.\n\nMina paints the rain for User."));
    assert!(!knowledge.contains("Ren hates rain"));
    assert_eq!(messages[3]["role"], "user");
    assert!(messages[3]["content"].as_str().unwrap().ends_with("] Look at the rain outside"));
}

// ── Reroll ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_reroll_replaces_all_trailing_replies() {
    let (mut mina, ren) = cast();
    let mina_id = mina.id.clone();
    mina.history = vec![
        Message::system(mina.persona.clone()),
        Message::user("Paint me something", "Mar.3 09:15"),
        Message::assistant("A lighthouse.", None),
        Message::assistant("Or maybe a harbour.", None),
    ];

    let transport = ScriptedTransport::new(vec![openai("A field of poppies.")]);
    let (controller, repository) = boot(
        OPENAI_URL,
        Arc::new(InMemoryStore::new()),
        vec![mina, ren],
        vec![],
        transport.clone(),
    )
    .await;
    controller.enter_character(&mina_id).await.unwrap();

    let outcome = controller.reroll(&mina_id).await.unwrap();
    assert!(outcome.is_delivered());

    let messages = sent_messages(&transport.request(0));
    let last = messages.last().unwrap();
    assert_eq!(last["role"], "user");
    assert_eq!(last["content"], "[Mar.3 09:15] Paint me something");
    assert!(messages.iter().all(|m| m["content"] != "A lighthouse."));

    let history = controller.read(|s| history(s, &mina_id)).await;
    let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    assert_eq!(history[2].content, "A field of poppies.");

    let saved = repository.load_characters().await.unwrap();
    assert_eq!(saved[0].history.len(), 3);
}

// ── Navigation during a reply ────────────────────────────────────────────

#[tokio::test]
async fn e2e_reply_for_character_left_behind_marks_unread() {
    let (mina, ren) = cast();
    let (mina_id, ren_id) = (mina.id.clone(), ren.id.clone());

    let transport = ScriptedTransport::gated(vec![openai("Sorry, I was painting.\n\nWhat's up?")]);
    let (controller, repository) = boot(
        OPENAI_URL,
        Arc::new(InMemoryStore::new()),
        vec![mina, ren],
        vec![],
        transport.clone(),
    )
    .await;
    let mut events = controller.subscribe();

    controller.enter_character(&mina_id).await.unwrap();
    let pending = {
        let controller = controller.clone();
        let id = mina_id.clone();
        tokio::spawn(async move { controller.send(&id, "Are you there?").await })
    };
    wait_in_flight(&controller, &mina_id).await;

    // A second send for the same character is refused while waiting
    assert!(matches!(
        controller.send(&mina_id, "hello??").await,
        Err(DeliveryError::Busy(_))
    ));
    assert_eq!(transport.request_count(), 1);

    let ren_view = controller.enter_character(&ren_id).await.unwrap();
    assert!(!ren_view.typing);

    transport.open(1);
    let outcome = pending.await.unwrap().unwrap();
    let DeliveryOutcome::Delivered { message_index, reveal } = outcome else {
        panic!("expected delivery");
    };
    assert!(reveal.is_none());
    assert_eq!(message_index, 2);

    let (unread, typing) = controller
        .read(|s| {
            (
                s.conversations.character(&mina_id).unwrap().unread,
                s.typing.typing_character().map(str::to_string),
            )
        })
        .await;
    assert!(unread);
    assert_eq!(typing, None);

    let mut saw_unread = false;
    while let Ok(event) = events.try_recv() {
        match event.as_ref() {
            DomainEvent::UnreadMarked { character_id } => saw_unread |= character_id == &mina_id,
            DomainEvent::ReplyReady { .. } => panic!("no reveal for a character off screen"),
            _ => {}
        }
    }
    assert!(saw_unread);
    assert!(repository.load_characters().await.unwrap()[0].unread);

    let back = controller.enter_character(&mina_id).await.unwrap();
    assert_eq!(back.window.entries.last().unwrap().paragraphs.len(), 2);
    assert!(!controller.read(|s| s.conversations.character(&mina_id).unwrap().unread).await);
}

#[tokio::test]
async fn e2e_release_keeps_other_characters_indicator() {
    let (mina, ren) = cast();
    let (mina_id, ren_id) = (mina.id.clone(), ren.id.clone());

    let transport = ScriptedTransport::gated(vec![openai("Mina here."), openai("Ren here.")]);
    let (controller, _) = boot(
        OPENAI_URL,
        Arc::new(InMemoryStore::new()),
        vec![mina, ren],
        vec![],
        transport.clone(),
    )
    .await;

    let first = {
        let (c, id) = (controller.clone(), mina_id.clone());
        tokio::spawn(async move { c.send(&id, "hi Mina").await })
    };
    wait_in_flight(&controller, &mina_id).await;

    controller.enter_character(&ren_id).await.unwrap();
    let second = {
        let (c, id) = (controller.clone(), ren_id.clone());
        tokio::spawn(async move { c.send(&id, "hi Ren").await })
    };
    wait_in_flight(&controller, &ren_id).await;
    assert_eq!(
        controller.read(|s| s.typing.typing_character().map(str::to_string)).await,
        Some(ren_id.clone())
    );

    // Mina's reply arrives first; Ren's indicator must survive it
    transport.open(1);
    first.await.unwrap().unwrap();
    assert_eq!(
        controller.read(|s| s.typing.typing_character().map(str::to_string)).await,
        Some(ren_id.clone())
    );

    transport.open(1);
    let outcome = second.await.unwrap().unwrap();
    assert!(matches!(outcome, DeliveryOutcome::Delivered { reveal: Some(_), .. }));
    assert!(controller.read(|s| s.typing.typing_character().is_none()).await);
}

// ── Provider shapes ──────────────────────────────────────────────────────

async fn two_turn_exchange(url: &str, replies: Vec<String>) -> Arc<ScriptedTransport> {
    let (mina, ren) = cast();
    let mina_id = mina.id.clone();
    let transport = ScriptedTransport::new(replies);
    let (controller, _) = boot(
        url,
        Arc::new(InMemoryStore::new()),
        vec![mina, ren],
        vec![],
        transport.clone(),
    )
    .await;
    controller.enter_character(&mina_id).await.unwrap();
    assert!(controller.send(&mina_id, "first question").await.unwrap().is_delivered());
    assert!(controller.send(&mina_id, "second question").await.unwrap().is_delivered());
    transport
}

#[tokio::test]
async fn e2e_openai_receives_full_history() {
    let transport = two_turn_exchange(OPENAI_URL, vec![openai("one"), openai("two")]).await;
    let request = transport.request(1);
    assert_eq!(request.header("authorization"), Some("Bearer sk-test"));

    let messages = sent_messages(&request);
    let roles: Vec<&str> = messages.iter().map(|m| m["role"].as_str().unwrap()).collect();
    assert_eq!(roles, vec!["system", "system", "user", "assistant", "user"]);
}

#[tokio::test]
async fn e2e_claude_receives_only_latest_user_turn() {
    let transport = two_turn_exchange(CLAUDE_URL, vec![claude("one"), claude("two")]).await;
    let request = transport.request(1);
    assert_eq!(request.header("x-api-key"), Some("sk-test"));
    assert_eq!(request.header("anthropic-version"), Some("2023-06-01"));

    let body = request.body.unwrap();
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0]["content"].as_str().unwrap().ends_with("] second question"));
    assert!(body["system"].as_str().unwrap().contains("You are Mina, a quiet painter."));
}

#[tokio::test]
async fn e2e_gemini_receives_only_latest_user_turn() {
    let transport = two_turn_exchange(GEMINI_URL, vec![gemini("one"), gemini("two")]).await;
    let request = transport.request(1);
    assert_eq!(
        request.url,
        format!("{GEMINI_URL}/test-model:generateContent?key=sk-test")
    );

    let body = request.body.unwrap();
    let contents = body["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 1);
    assert!(contents[0]["parts"][0]["text"].as_str().unwrap().ends_with("] second question"));
    assert!(
        body["system_instruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("You are Mina")
    );
}

// ── Persistence ──────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_history_survives_restart_and_stays_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.json");
    let (mina, ren) = cast();
    let (mina_id, ren_id) = (mina.id.clone(), ren.id.clone());

    {
        let store = Arc::new(FileStore::open(&path).unwrap());
        let transport = ScriptedTransport::new(vec![openai("Hello from the studio.")]);
        let (controller, _) = boot(OPENAI_URL, store, vec![mina, ren], vec![], transport).await;
        controller.enter_character(&mina_id).await.unwrap();
        controller.send(&mina_id, "Good morning").await.unwrap();
        assert!(controller.edit_message(&mina_id, 1, "Good evening").await.unwrap());
    }

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&path).unwrap());
    let repository = Repository::new(store);
    let characters = repository.load_characters().await.unwrap();
    let mina = characters.iter().find(|c| c.id == mina_id).unwrap();
    let ren = characters.iter().find(|c| c.id == ren_id).unwrap();

    assert_eq!(mina.history.len(), 3);
    assert_eq!(mina.history[0].role, Role::System);
    assert_eq!(mina.history[1].body(), "Good evening");
    assert!(mina.history[1].content.starts_with('['));
    assert_eq!(mina.history[2].content, "Hello from the studio.");
    assert!(ren.history.is_empty());
}

#[tokio::test]
async fn e2e_backup_round_trip_hides_credentials() {
    let source: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
    let (mina, ren) = cast();
    let mina_id = mina.id.clone();
    let transport = ScriptedTransport::new(vec![openai("Noted.")]);
    let (controller, _) = boot(OPENAI_URL, source.clone(), vec![mina, ren], vec![], transport).await;
    controller
        .update_settings(|s| s.api_key = "sk-secret".into())
        .await
        .unwrap();
    controller.send(&mina_id, "remember this").await.unwrap();

    let exported = export_backup(source.as_ref()).await.unwrap();
    let document = Value::Object(exported).to_string();
    assert!(!document.contains("sk-secret"));
    assert!(document.contains("ENC_"));

    let target = InMemoryStore::new();
    let summary = import_backup(&target, &document).await.unwrap();
    assert_eq!(summary.keys_written, 2);

    let settings = target.get(keys::SETTINGS).await.unwrap().unwrap();
    assert_eq!(settings["API_KEY"], "sk-secret");

    let restored = Repository::new(Arc::new(target)).load_characters().await.unwrap();
    assert_eq!(restored[0].history.last().unwrap().content, "Noted.");
    assert!(restored[1].history.is_empty());
}

#[tokio::test]
async fn e2e_failed_import_leaves_store_untouched() {
    let store = InMemoryStore::new();
    store.set(keys::CHARACTERS, json!([])).await.unwrap();

    assert!(import_backup(&store, "{not json").await.is_err());
    let mut wrong_shape = Map::new();
    wrong_shape.insert(keys::CHARACTERS.into(), json!("{\"not\": \"a list\"}"));
    let document = Value::Object(wrong_shape).to_string();
    assert!(import_backup(&store, &document).await.is_err());
    assert_eq!(store.get(keys::CHARACTERS).await.unwrap(), Some(json!([])));
}
