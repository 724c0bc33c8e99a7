//! Protobuf wire messages shared by the remote API and the embedded engine

use crate::error::ClientError;
use crate::verse::{self, VerseBody, VerseRef};
use prost::Message;

/// Content type requested from the remote API
pub const PROTOBUF_CONTENT_TYPE: &str = "application/protobuf";

#[derive(Clone, PartialEq, Message)]
pub struct VerseKey {
    #[prost(uint32, tag = "1")]
    pub book: u32,
    #[prost(uint32, tag = "2")]
    pub chapter: u32,
    #[prost(uint32, tag = "3")]
    pub verse: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct VerseResult {
    #[prost(message, optional, tag = "1")]
    pub key: Option<VerseKey>,
    /// One entry per translation slot
    #[prost(string, repeated, tag = "2")]
    pub text: Vec<String>,
    #[prost(uint32, tag = "3")]
    pub top_translation: u32,
    #[prost(string, repeated, tag = "4")]
    pub highlights: Vec<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Response {
    #[prost(message, repeated, tag = "1")]
    pub results: Vec<VerseResult>,
}

impl From<verse::VerseKey> for VerseKey {
    fn from(key: verse::VerseKey) -> Self {
        Self {
            book: key.book,
            chapter: key.chapter,
            verse: key.verse,
        }
    }
}

/// Decode an encoded `Response` into lightweight refs paired with their bodies
pub fn decode_response(bytes: &[u8]) -> Result<Vec<(VerseRef, VerseBody)>, ClientError> {
    let response = Response::decode(bytes)?;
    response.results.into_iter().map(convert_result).collect()
}

fn convert_result(result: VerseResult) -> Result<(VerseRef, VerseBody), ClientError> {
    let key = result
        .key
        .ok_or_else(|| ClientError::Decode("Result without verse key".to_string()))?;
    let key = verse::VerseKey::new(key.book, key.chapter, key.verse);
    let id = key
        .identity()
        .ok_or_else(|| ClientError::Decode(format!("Invalid book: {}", key.book)))?;

    let top = result.top_translation as usize;
    if !result.text.is_empty() && top >= result.text.len() {
        return Err(ClientError::Decode(format!(
            "Top translation {} out of range for {} ({} translations)",
            top,
            id,
            result.text.len()
        )));
    }

    let verse_ref = VerseRef {
        id,
        key,
        top_translation_index: top,
        highlight_words: result.highlights,
    };
    Ok((verse_ref, VerseBody::from_texts(result.text)))
}

/// Encode a response; used by engines and test servers
pub fn encode_response(response: &Response) -> Vec<u8> {
    response.encode_to_vec()
}
