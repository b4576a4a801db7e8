use serde::{Deserialize, Serialize};
use std::fmt;

/// Keywords that may appear many times and never carry a value.
pub const COMMENTARY_KEYWORDS: [&str; 3] = ["COMMENT", "HISTORY", ""];

/// Value of a single header card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Logical(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl HeaderValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HeaderValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HeaderValue::Integer(i) => Some(*i),
            HeaderValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HeaderValue::Float(f) => Some(*f),
            HeaderValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HeaderValue::Logical(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Logical(true) => write!(f, "T"),
            HeaderValue::Logical(false) => write!(f, "F"),
            HeaderValue::Integer(i) => write!(f, "{}", i),
            HeaderValue::Float(v) => write!(f, "{}", v),
            HeaderValue::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Logical(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Integer(value)
    }
}

impl From<f64> for HeaderValue {
    fn from(value: f64) -> Self {
        HeaderValue::Float(value)
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::String(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::String(value)
    }
}

/// One 80-column header record. Commentary cards have no value and keep
/// their text in `comment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub keyword: String,
    pub value: Option<HeaderValue>,
    pub comment: Option<String>,
}

impl Card {
    pub fn new(keyword: &str, value: impl Into<HeaderValue>) -> Self {
        Self {
            keyword: keyword.to_string(),
            value: Some(value.into()),
            comment: None,
        }
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    pub fn commentary(keyword: &str, text: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            value: None,
            comment: Some(text.to_string()),
        }
    }

    pub fn is_commentary(&self) -> bool {
        self.value.is_none() && COMMENTARY_KEYWORDS.contains(&self.keyword.as_str())
    }
}

/// Ordered FITS header. Keyword lookups are case-insensitive; the first
/// card with a matching keyword wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Header {
    cards: Vec<Card>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cards(cards: Vec<Card>) -> Self {
        Self { cards }
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub(crate) fn cards_mut(&mut self) -> &mut Vec<Card> {
        &mut self.cards
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    fn position(&self, keyword: &str) -> Option<usize> {
        self.cards
            .iter()
            .position(|card| !card.is_commentary() && card.keyword.eq_ignore_ascii_case(keyword))
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.position(keyword).is_some()
    }

    pub fn card(&self, keyword: &str) -> Option<&Card> {
        self.position(keyword).map(|idx| &self.cards[idx])
    }

    pub fn get(&self, keyword: &str) -> Option<&HeaderValue> {
        self.card(keyword).and_then(|card| card.value.as_ref())
    }

    pub fn get_str(&self, keyword: &str) -> Option<&str> {
        self.get(keyword).and_then(HeaderValue::as_str)
    }

    pub fn get_i64(&self, keyword: &str) -> Option<i64> {
        self.get(keyword).and_then(HeaderValue::as_i64)
    }

    pub fn get_f64(&self, keyword: &str) -> Option<f64> {
        self.get(keyword).and_then(HeaderValue::as_f64)
    }

    pub fn get_bool(&self, keyword: &str) -> Option<bool> {
        self.get(keyword).and_then(HeaderValue::as_bool)
    }

    /// Sets a keyword, replacing the value of an existing card in place and
    /// keeping its comment, or appending a new card.
    pub fn set(&mut self, keyword: &str, value: impl Into<HeaderValue>) {
        let keyword = keyword.to_ascii_uppercase();
        match self.position(&keyword) {
            Some(idx) => self.cards[idx].value = Some(value.into()),
            None => self.cards.push(Card::new(&keyword, value)),
        }
    }

    /// Inserts a card at `index`, shifting later cards.
    pub fn insert(&mut self, index: usize, card: Card) {
        let index = index.min(self.cards.len());
        self.cards.insert(index, card);
    }

    pub fn push(&mut self, card: Card) {
        self.cards.push(card);
    }

    pub fn add_history(&mut self, text: &str) {
        self.cards.push(Card::commentary("HISTORY", text));
    }

    pub fn add_comment(&mut self, text: &str) {
        self.cards.push(Card::commentary("COMMENT", text));
    }

    pub fn remove(&mut self, keyword: &str) -> Option<Card> {
        self.position(keyword).map(|idx| self.cards.remove(idx))
    }

    /// Keywords of all valued cards in header order.
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.cards
            .iter()
            .filter(|card| !card.is_commentary())
            .map(|card| card.keyword.as_str())
    }

    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.commentary("HISTORY")
    }

    pub fn comments(&self) -> impl Iterator<Item = &str> {
        self.commentary("COMMENT")
    }

    fn commentary<'a>(&'a self, keyword: &'a str) -> impl Iterator<Item = &'a str> {
        self.cards
            .iter()
            .filter(move |card| card.is_commentary() && card.keyword == keyword)
            .map(|card| card.comment.as_deref().unwrap_or(""))
    }
}
