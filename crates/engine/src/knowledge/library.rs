//! The book library and the "current book" being edited.

use parlor_core::knowledge::{
    BookScope, KnowledgeBook, KnowledgeEntry, parse_keys, resolve_label,
};
use tracing::debug;

use crate::error::KnowledgeError;

const FALLBACK_BOOK_NAME: &str = "New knowledge book";

/// Fields submitted from an entry editor.
#[derive(Debug, Clone, Default)]
pub struct EntryDraft {
    /// Existing entry to update; `None` creates a new entry
    pub uid: Option<String>,
    /// Comma-separated keys (ASCII or full-width commas)
    pub keys: String,
    pub content: String,
    pub constant: bool,
    pub label: Option<String>,
}

/// An ordered list of books with exactly one current book.
///
/// The list is never empty and the current id always names a book in it.
#[derive(Debug, Clone)]
pub struct KnowledgeLibrary {
    books: Vec<KnowledgeBook>,
    current: String,
}

impl KnowledgeLibrary {
    /// Wrap `books`, adding an empty book if there are none. The first book
    /// becomes current.
    pub fn new(mut books: Vec<KnowledgeBook>) -> Self {
        if books.is_empty() {
            books.push(KnowledgeBook::new(FALLBACK_BOOK_NAME));
        }
        let current = books[0].id.clone();
        Self { books, current }
    }

    pub fn books(&self) -> &[KnowledgeBook] {
        &self.books
    }

    pub fn current_id(&self) -> &str {
        &self.current
    }

    pub fn current(&self) -> &KnowledgeBook {
        self.books
            .iter()
            .find(|b| b.id == self.current)
            .unwrap_or(&self.books[0])
    }

    fn current_mut(&mut self) -> &mut KnowledgeBook {
        let pos = self.current_position();
        &mut self.books[pos]
    }

    fn current_position(&self) -> usize {
        self.books
            .iter()
            .position(|b| b.id == self.current)
            .unwrap_or(0)
    }

    /// Create an empty global book and make it current.
    pub fn create_book(&mut self, name: &str) -> Result<&KnowledgeBook, KnowledgeError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(KnowledgeError::EmptyName);
        }
        Ok(self.add_book(KnowledgeBook::new(name)))
    }

    /// Append an existing book (e.g. an import) and make it current.
    pub fn add_book(&mut self, book: KnowledgeBook) -> &KnowledgeBook {
        debug!(book = %book.id, name = %book.name, entries = book.entries.len(), "Adding knowledge book");
        self.current = book.id.clone();
        self.books.push(book);
        &self.books[self.books.len() - 1]
    }

    pub fn rename_current(&mut self, name: &str) -> Result<(), KnowledgeError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(KnowledgeError::EmptyName);
        }
        self.current_mut().name = name.to_string();
        Ok(())
    }

    /// Delete the current book; the first remaining book becomes current.
    pub fn delete_current(&mut self) -> Result<KnowledgeBook, KnowledgeError> {
        if self.books.len() <= 1 {
            return Err(KnowledgeError::LastBook);
        }
        let removed = self.books.remove(self.current_position());
        self.current = self.books[0].id.clone();
        Ok(removed)
    }

    pub fn switch_to(&mut self, book_id: &str) -> Result<(), KnowledgeError> {
        if !self.books.iter().any(|b| b.id == book_id) {
            return Err(KnowledgeError::UnknownBook(book_id.to_string()));
        }
        self.current = book_id.to_string();
        Ok(())
    }

    /// Bind the current book to one character, or back to global.
    pub fn bind_current(&mut self, scope: BookScope) {
        self.current_mut().scope = scope;
    }

    /// Create or update an entry in the current book.
    pub fn save_entry(&mut self, draft: EntryDraft) -> Result<&KnowledgeEntry, KnowledgeError> {
        let keys = parse_keys(&draft.keys);
        if draft.content.is_empty() && keys.is_empty() {
            return Err(KnowledgeError::EmptyEntry);
        }

        let book = self.current_mut();
        let existing = draft
            .uid
            .as_deref()
            .and_then(|uid| book.entries.iter().position(|e| e.uid == uid));

        let pos = match existing {
            Some(pos) => {
                let entry = &mut book.entries[pos];
                entry.label = resolve_label(draft.label.as_deref(), Some(entry.label.as_str()), &keys);
                entry.keys = keys;
                entry.content = draft.content;
                entry.constant = draft.constant;
                pos
            }
            None => {
                book.entries.push(KnowledgeEntry::new(
                    keys,
                    draft.content,
                    draft.constant,
                    draft.label.as_deref(),
                ));
                book.entries.len() - 1
            }
        };
        Ok(&book.entries[pos])
    }

    pub fn delete_entry(&mut self, uid: &str) -> Result<KnowledgeEntry, KnowledgeError> {
        let book = self.current_mut();
        let pos = book
            .entries
            .iter()
            .position(|e| e.uid == uid)
            .ok_or_else(|| KnowledgeError::UnknownEntry(uid.to_string()))?;
        Ok(book.entries.remove(pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_core::knowledge::UNNAMED_ENTRY_LABEL;

    fn draft(keys: &str, content: &str, label: Option<&str>) -> EntryDraft {
        EntryDraft {
            uid: None,
            keys: keys.into(),
            content: content.into(),
            constant: false,
            label: label.map(str::to_string),
        }
    }

    #[test]
    fn never_empty() {
        let lib = KnowledgeLibrary::new(vec![]);
        assert_eq!(lib.books().len(), 1);
        assert_eq!(lib.current_id(), lib.books()[0].id);
    }

    #[test]
    fn create_becomes_current() {
        let mut lib = KnowledgeLibrary::new(vec![]);
        let id = lib.create_book("Lore").unwrap().id.clone();
        assert_eq!(lib.current_id(), id);
        assert_eq!(lib.current().name, "Lore");
        assert!(matches!(lib.create_book("  "), Err(KnowledgeError::EmptyName)));
    }

    #[test]
    fn last_book_cannot_be_deleted() {
        let mut lib = KnowledgeLibrary::new(vec![]);
        assert!(matches!(lib.delete_current(), Err(KnowledgeError::LastBook)));
    }

    #[test]
    fn delete_reassigns_to_first() {
        let mut lib = KnowledgeLibrary::new(vec![KnowledgeBook::new("A")]);
        lib.create_book("B").unwrap();
        lib.create_book("C").unwrap();
        let removed = lib.delete_current().unwrap();
        assert_eq!(removed.name, "C");
        assert_eq!(lib.current().name, "A");
    }

    #[test]
    fn switch_and_bind() {
        let mut lib = KnowledgeLibrary::new(vec![KnowledgeBook::new("A")]);
        let b = lib.create_book("B").unwrap().id.clone();
        let a = lib.books()[0].id.clone();

        lib.switch_to(&a).unwrap();
        lib.bind_current(BookScope::Character("c1".into()));
        assert_eq!(lib.books()[0].scope, BookScope::Character("c1".into()));
        assert_eq!(lib.books()[1].scope, BookScope::Global);

        assert!(lib.switch_to("nope").is_err());
        assert_eq!(lib.current_id(), a);
        lib.switch_to(&b).unwrap();
        lib.rename_current("Bee").unwrap();
        assert_eq!(lib.current().name, "Bee");
    }

    #[test]
    fn save_entry_labels() {
        let mut lib = KnowledgeLibrary::new(vec![]);

        let e = lib.save_entry(draft("rain，storm", "Wet.", None)).unwrap();
        assert_eq!(e.keys, vec!["rain", "storm"]);
        assert_eq!(e.label, "rain");

        let e = lib.save_entry(draft("", "Loose text", None)).unwrap();
        assert_eq!(e.label, UNNAMED_ENTRY_LABEL);

        let e = lib.save_entry(draft("sun", "Dry.", Some("Weather"))).unwrap();
        assert_eq!(e.label, "Weather");

        assert!(matches!(
            lib.save_entry(draft(" , ", "", None)),
            Err(KnowledgeError::EmptyEntry)
        ));
    }

    #[test]
    fn update_keeps_uid_and_existing_label() {
        let mut lib = KnowledgeLibrary::new(vec![]);
        let uid = lib
            .save_entry(draft("rain", "Wet.", Some("Weather")))
            .unwrap()
            .uid
            .clone();

        let updated = lib
            .save_entry(EntryDraft {
                uid: Some(uid.clone()),
                ..draft("drizzle", "Damp.", None)
            })
            .unwrap();
        assert_eq!(updated.uid, uid);
        assert_eq!(updated.label, "Weather");
        assert_eq!(updated.content, "Damp.");
        assert_eq!(lib.current().entries.len(), 1);
    }

    #[test]
    fn delete_entry_by_uid() {
        let mut lib = KnowledgeLibrary::new(vec![]);
        let uid = lib.save_entry(draft("a", "A", None)).unwrap().uid.clone();
        assert!(lib.delete_entry("missing").is_err());
        assert_eq!(lib.delete_entry(&uid).unwrap().content, "A");
        assert!(lib.current().entries.is_empty());
    }
}
