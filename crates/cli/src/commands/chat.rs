//! `parlor chat` — interactive conversation, and `parlor send` for one turn.
//!
//! Replies are requested in background tasks so the user can switch
//! characters while one is typing; a reply that lands off screen shows up
//! as an unread marker instead.

use std::io::Write;

use parlor_core::event::{DomainEvent, NoticeLevel};
use parlor_core::message::Role;
use parlor_engine::{ConversationView, DeliveryController, DeliveryOutcome, RevealStep};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use super::Runtime;

/// One line of chat input.
#[derive(Debug, PartialEq, Eq)]
enum ChatCommand {
    Say(String),
    Reroll,
    More,
    Edit(usize, String),
    Delete(usize),
    Copy(usize),
    Switch(String),
    List,
    Debug,
    Help,
    Quit,
    Invalid(String),
    Empty,
}

fn parse_line(line: &str) -> ChatCommand {
    let line = line.trim();
    if line.is_empty() {
        return ChatCommand::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return ChatCommand::Say(line.to_string());
    };

    let (verb, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let args = args.trim();
    let index = || args.split_whitespace().next().and_then(|n| n.parse::<usize>().ok());

    match verb {
        "reroll" | "r" => ChatCommand::Reroll,
        "more" => ChatCommand::More,
        "edit" => match (index(), args.split_once(char::is_whitespace)) {
            (Some(n), Some((_, text))) if !text.trim().is_empty() => ChatCommand::Edit(n, text.trim().to_string()),
            _ => ChatCommand::Invalid("usage: /edit N new text".into()),
        },
        "delete" | "del" => index().map_or_else(|| ChatCommand::Invalid("usage: /delete N".into()), ChatCommand::Delete),
        "copy" => index().map_or_else(|| ChatCommand::Invalid("usage: /copy N".into()), ChatCommand::Copy),
        "switch" | "s" if !args.is_empty() => ChatCommand::Switch(args.to_string()),
        "switch" | "s" => ChatCommand::Invalid("usage: /switch NAME".into()),
        "list" => ChatCommand::List,
        "debug" => ChatCommand::Debug,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        other => ChatCommand::Invalid(format!("unknown command /{other}, try /help")),
    }
}

pub async fn run(character: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::boot().await?;
    let controller = rt.controller.clone();
    let mut current = rt.character_id(character.as_deref()).await?;

    spawn_event_printer(controller.clone());

    println!();
    println!("  Parlor — type a message, or /help for commands.");
    render(&controller.enter_character(&current).await?);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    prompt()?;
    while let Some(line) = lines.next_line().await? {
        match parse_line(&line) {
            ChatCommand::Empty => {}
            ChatCommand::Say(text) => spawn_delivery(controller.clone(), current.clone(), Some(text)),
            ChatCommand::Reroll => spawn_delivery(controller.clone(), current.clone(), None),
            ChatCommand::More => {
                let grown = controller.load_more(&current).await?;
                if grown.revealed() == 0 {
                    println!("  (no older messages)");
                } else {
                    render(&controller.view_of(&current).await?);
                }
            }
            ChatCommand::Edit(index, text) => match controller.edit_message(&current, index, &text).await {
                Ok(true) => render(&controller.view_of(&current).await?),
                Ok(false) => println!("  (unchanged)"),
                Err(e) => eprintln!("  [!] {e}"),
            },
            ChatCommand::Delete(index) => match controller.delete_message(&current, index).await {
                Ok(_) => render(&controller.view_of(&current).await?),
                Err(e) => eprintln!("  [!] {e}"),
            },
            ChatCommand::Copy(index) => match controller.copy_text(&current, index).await {
                Ok(text) => println!("{text}"),
                Err(e) => eprintln!("  [!] {e}"),
            },
            ChatCommand::Switch(name) => match rt.character_id(Some(name.as_str())).await {
                Ok(id) => {
                    current = id;
                    render(&controller.enter_character(&current).await?);
                }
                Err(e) => eprintln!("  [!] {e}"),
            },
            ChatCommand::List => super::characters::print_list(&controller).await,
            ChatCommand::Debug => match controller.last_request() {
                Some(log) => {
                    println!("  Provider: {}  (~{} tokens)", log.provider, log.tokens);
                    println!("{}", log.body);
                }
                None => println!("  (nothing sent yet)"),
            },
            ChatCommand::Help => print_help(),
            ChatCommand::Quit => break,
            ChatCommand::Invalid(message) => eprintln!("  [!] {message}"),
        }
        prompt()?;
    }

    controller.leave().await;
    println!();
    Ok(())
}

/// `parlor send`: one user turn, reply printed without pacing.
pub async fn send_once(character: Option<String>, message: &str) -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::boot().await?;
    let id = rt.character_id(character.as_deref()).await?;
    rt.controller.enter_character(&id).await?;

    match rt.controller.send(&id, message).await? {
        DeliveryOutcome::Delivered {
            reveal: Some(plan), ..
        } => {
            println!("{}", plan.units.join("\n\n"));
            Ok(())
        }
        DeliveryOutcome::Delivered { reveal: None, .. } => Ok(()),
        DeliveryOutcome::Failed { error, .. } => Err(error.into()),
        DeliveryOutcome::Discarded(error) => Err(error.into()),
    }
}

fn spawn_delivery(controller: DeliveryController, id: String, text: Option<String>) {
    tokio::spawn(async move {
        let result = match text {
            Some(text) => controller.send(&id, &text).await,
            None => controller.reroll(&id).await,
        };
        match result {
            Ok(DeliveryOutcome::Delivered {
                reveal: Some(plan), ..
            }) => {
                let name = controller
                    .view_of(&id)
                    .await
                    .map(|v| v.name)
                    .unwrap_or_default();
                plan.play(|step| print_unit(&name, step)).await;
                redraw_prompt(&mut std::io::stdout());
            }
            // Unread markers and inline errors arrive as events
            Ok(_) => {}
            Err(e) => eprintln!("  [!] {e}"),
        }
    });
}

fn spawn_event_printer(controller: DeliveryController) {
    let mut events = controller.subscribe();
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };
            match event.as_ref() {
                DomainEvent::TypingChanged {
                    character_id,
                    typing: true,
                } => {
                    if !controller.read(|s| s.is_viewing(character_id)).await {
                        continue;
                    }
                    if let Ok(view) = controller.view_of(character_id).await {
                        println!("  {} is typing…", view.name);
                    }
                }
                DomainEvent::UnreadMarked { character_id } => {
                    if let Ok(view) = controller.view_of(character_id).await {
                        println!("  (new message from {})", view.name);
                    }
                }
                DomainEvent::InlineError { anchor_index, text, .. } => {
                    eprintln!("  [{anchor_index}] {text}");
                }
                DomainEvent::Notice { level, message } => {
                    let tag = match level {
                        NoticeLevel::Info => "info",
                        NoticeLevel::Warning => "warning",
                        NoticeLevel::Error => "error",
                    };
                    eprintln!("  [{tag}] {message}");
                }
                _ => {}
            }
        }
    });
}

fn render(view: &ConversationView) {
    println!();
    println!("  ── {} ──", view.name);
    if view.window.has_more {
        println!("  (older messages: /more)");
    }
    for entry in &view.window.entries {
        let who = match entry.role {
            Role::User => "You",
            _ => view.name.as_str(),
        };
        let stamp = entry.timestamp.as_deref().unwrap_or("");
        println!("  [{}] {who} {stamp}", entry.index);
        for paragraph in &entry.paragraphs {
            for line in paragraph.lines() {
                println!("      {line}");
            }
            println!();
        }
    }
    if view.typing {
        println!("  {} is typing…", view.name);
    }
}

fn print_unit(name: &str, step: &RevealStep) {
    if step.index == 0 {
        println!("  {name}");
    }
    for line in step.unit.lines() {
        println!("      {line}");
    }
    println!();
}

fn prompt() -> std::io::Result<()> {
    write_prompt(&mut std::io::stdout())
}

fn write_prompt(out: &mut impl Write) -> std::io::Result<()> {
    write!(out, "  You > ")?;
    out.flush()
}

/// Prompt again after background output. A closed terminal is not fatal here.
fn redraw_prompt(out: &mut impl Write) {
    if let Err(e) = write_prompt(out) {
        debug!(error = %e, "Could not redraw the prompt");
    }
}

fn print_help() {
    println!("  /reroll         ask again for the last message");
    println!("  /more           show older messages");
    println!("  /edit N text    replace the text of message N");
    println!("  /delete N       delete message N");
    println!("  /copy N         print message N as plain text");
    println!("  /switch NAME    talk to another character");
    println!("  /list           list characters");
    println!("  /debug          show the last request sent");
    println!("  /quit           leave");
}
