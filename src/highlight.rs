//! Split verse text into highlighted and plain chunks

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub highlighted: bool,
}

impl Chunk {
    fn plain(text: &str) -> Self {
        Self { text: text.to_string(), highlighted: false }
    }

    fn marked(text: &str) -> Self {
        Self { text: text.to_string(), highlighted: true }
    }
}

/// Split `text` at case-insensitive matches of each word anchored on a word
/// boundary. Words are applied in order; chunks already highlighted by an
/// earlier word are not split again. Empty pieces are dropped.
pub fn highlight(text: &str, words: &[String]) -> Vec<Chunk> {
    let mut chunks = vec![Chunk::plain(text)];

    for word in words.iter().filter(|w| !w.is_empty()) {
        let pattern = format!(r"(?i)\b{}", regex_lite::escape(word));
        let regex = match Regex::new(&pattern) {
            Ok(r) => r,
            Err(e) => {
                warn!("Skipping highlight word {:?}: {}", word, e);
                continue;
            }
        };

        chunks = chunks
            .into_iter()
            .flat_map(|chunk| {
                if chunk.highlighted {
                    vec![chunk]
                } else {
                    split_matches(&regex, &chunk.text)
                }
            })
            .collect();
    }

    chunks.retain(|c| !c.text.is_empty());
    chunks
}

fn split_matches(regex: &Regex, text: &str) -> Vec<Chunk> {
    let mut out = Vec::new();
    let mut last = 0;
    for m in regex.find_iter(text) {
        if m.start() > last {
            out.push(Chunk::plain(&text[last..m.start()]));
        }
        if !m.as_str().is_empty() {
            out.push(Chunk::marked(m.as_str()));
        }
        last = m.end();
    }
    if last < text.len() {
        out.push(Chunk::plain(&text[last..]));
    }
    out
}
