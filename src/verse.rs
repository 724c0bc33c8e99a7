//! Verse types: keys, identities, lightweight references and bodies

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// English book names, indexed by the wire `book` number
pub const BOOK_NAMES: [&str; 66] = [
    "Genesis",
    "Exodus",
    "Leviticus",
    "Numbers",
    "Deuteronomy",
    "Joshua",
    "Judges",
    "Ruth",
    "1 Samuel",
    "2 Samuel",
    "1 Kings",
    "2 Kings",
    "1 Chronicles",
    "2 Chronicles",
    "Ezra",
    "Nehemiah",
    "Esther",
    "Job",
    "Psalms",
    "Proverbs",
    "Ecclesiastes",
    "Song of Solomon",
    "Isaiah",
    "Jeremiah",
    "Lamentations",
    "Ezekiel",
    "Daniel",
    "Hosea",
    "Joel",
    "Amos",
    "Obadiah",
    "Jonah",
    "Micah",
    "Nahum",
    "Habakkuk",
    "Zephaniah",
    "Haggai",
    "Zechariah",
    "Malachi",
    "Matthew",
    "Mark",
    "Luke",
    "John",
    "Acts",
    "Romans",
    "1 Corinthians",
    "2 Corinthians",
    "Galatians",
    "Ephesians",
    "Philippians",
    "Colossians",
    "1 Thessalonians",
    "2 Thessalonians",
    "1 Timothy",
    "2 Timothy",
    "Titus",
    "Philemon",
    "Hebrews",
    "James",
    "1 Peter",
    "2 Peter",
    "1 John",
    "2 John",
    "3 John",
    "Jude",
    "Revelation",
];

pub fn book_name(book: u32) -> Option<&'static str> {
    BOOK_NAMES.get(book as usize).copied()
}

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VerseKey {
    pub book: u32,
    pub chapter: u32,
    pub verse: u32,
}

impl VerseKey {
    pub fn new(book: u32, chapter: u32, verse: u32) -> Self {
        Self { book, chapter, verse }
    }

    /// Display identity, `None` for an unknown book
    pub fn identity(&self) -> Option<VerseIdentity> {
        let name = book_name(self.book)?;
        Some(VerseIdentity(format!("{} {}:{}", name, self.chapter, self.verse)))
    }
}

/// Stable identity of a verse across queries, e.g. `John 3:16`
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VerseIdentity(pub String);

impl VerseIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VerseIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VerseIdentity {
    fn from(s: &str) -> Self {
        VerseIdentity(s.to_string())
    }
}

/// A search hit without verse text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerseRef {
    pub id: VerseIdentity,
    pub key: VerseKey,
    pub top_translation_index: usize,
    pub highlight_words: Vec<String>,
}

/// Verse text per translation slot. Invariant across queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerseBody {
    pub translations: BTreeMap<usize, String>,
}

impl VerseBody {
    pub fn from_texts(texts: Vec<String>) -> Self {
        Self {
            translations: texts.into_iter().enumerate().collect(),
        }
    }

    pub fn text(&self, translation_index: usize) -> Option<&str> {
        self.translations.get(&translation_index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.translations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.translations.is_empty()
    }
}
