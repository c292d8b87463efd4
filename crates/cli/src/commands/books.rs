//! `parlor books` — knowledge book listing, binding and SillyTavern files.

use parlor_core::knowledge::{BookScope, KnowledgeBook};
use parlor_engine::{KnowledgeError, export_tavern, import_tavern};

use super::Runtime;

pub async fn list() -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::boot().await?;
    let (books, current, names) = rt
        .controller
        .read(|state| {
            let names: Vec<(String, String)> = state
                .conversations
                .characters()
                .iter()
                .map(|c| (c.id.clone(), c.name.clone()))
                .collect();
            (
                state.library.books().to_vec(),
                state.library.current_id().to_string(),
                names,
            )
        })
        .await;

    println!("📚 Knowledge books");
    println!("==================");
    for book in &books {
        let scope = match &book.scope {
            BookScope::Global => "global".to_string(),
            BookScope::Character(id) => names
                .iter()
                .find(|(cid, _)| cid == id)
                .map(|(_, name)| format!("bound to {name}"))
                .unwrap_or_else(|| format!("bound to {id}")),
        };
        let marker = if book.id == current { "*" } else { " " };
        println!("{marker} {} ({scope}, {} entries)", book.name, book.entries.len());
        for entry in &book.entries {
            let trigger = if entry.constant {
                "always".to_string()
            } else {
                entry.keys.join(", ")
            };
            println!("      - {} [{trigger}]", entry.label);
        }
    }
    Ok(())
}

pub async fn import(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::boot().await?;
    let text = std::fs::read_to_string(file)?;
    let file_name = std::path::Path::new(file)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned());

    let book = import_tavern(&text, file_name.as_deref())?;
    let (name, entries) = (book.name.clone(), book.entries.len());
    rt.controller
        .update_library(|lib| {
            lib.add_book(book);
            Ok(())
        })
        .await?;

    println!("✅ Imported \"{name}\" with {entries} entries");
    Ok(())
}

pub async fn export(book: &str, output: &str) -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::boot().await?;
    let found = rt
        .controller
        .read(|state| find_book(state.library.books(), book).cloned())
        .await
        .ok_or_else(|| KnowledgeError::UnknownBook(book.to_string()))?;

    let document = export_tavern(&found);
    std::fs::write(output, serde_json::to_string_pretty(&document)?)?;
    println!("📤 Exported \"{}\" ({} entries) to {output}", found.name, found.entries.len());
    Ok(())
}

pub async fn bind(book: &str, character: &str) -> Result<(), Box<dyn std::error::Error>> {
    let rt = Runtime::boot().await?;
    let scope = if character.eq_ignore_ascii_case("global") {
        BookScope::Global
    } else {
        BookScope::Character(rt.character_id(Some(character)).await?)
    };

    let book_id = rt
        .controller
        .read(|state| find_book(state.library.books(), book).map(|b| b.id.clone()))
        .await
        .ok_or_else(|| KnowledgeError::UnknownBook(book.to_string()))?;

    rt.controller
        .update_library(|lib| {
            lib.switch_to(&book_id)?;
            lib.bind_current(scope);
            Ok(())
        })
        .await?;

    println!("✅ Updated \"{book}\"");
    Ok(())
}

/// Match by id, then by name ignoring case.
fn find_book<'a>(books: &'a [KnowledgeBook], wanted: &str) -> Option<&'a KnowledgeBook> {
    books
        .iter()
        .find(|b| b.id == wanted)
        .or_else(|| books.iter().find(|b| b.name.eq_ignore_ascii_case(wanted)))
}
