//! 80-column card images.

use crate::domain::header::{Card, HeaderValue, COMMENTARY_KEYWORDS};
use crate::utils::error::{DatasetError, Result};

pub const CARD_SIZE: usize = 80;
const KEYWORD_SIZE: usize = 8;
const VALUE_INDICATOR: &[u8] = b"= ";
const COMMENTARY_TEXT_SIZE: usize = CARD_SIZE - KEYWORD_SIZE;
const CONTINUE_KEYWORD: &str = "CONTINUE";
/// Longest escaped string that fits a single `KEYWORD = '...'` card.
const SHORT_STRING_SIZE: usize = CARD_SIZE - KEYWORD_SIZE - VALUE_INDICATOR.len() - 2;
/// Escaped characters per card of a long string, leaving room for the `&`.
const LONG_STRING_CHUNK: usize = SHORT_STRING_SIZE - 1;

pub fn card_keyword(record: &[u8]) -> String {
    String::from_utf8_lossy(&record[..KEYWORD_SIZE.min(record.len())])
        .trim_end()
        .to_string()
}

pub fn parse_card(record: &[u8]) -> Result<Card> {
    if record.len() != CARD_SIZE {
        return Err(DatasetError::codec(format!(
            "card must be {} bytes, got {}",
            CARD_SIZE,
            record.len()
        )));
    }

    let keyword = card_keyword(record);
    let rest = &record[KEYWORD_SIZE..];
    let is_commentary = COMMENTARY_KEYWORDS
        .iter()
        .any(|k| k.eq_ignore_ascii_case(&keyword));

    if is_commentary || !rest.starts_with(VALUE_INDICATOR) {
        let text = String::from_utf8_lossy(rest).trim_end().to_string();
        return Ok(Card {
            keyword,
            value: None,
            comment: Some(text),
        });
    }

    let field = String::from_utf8_lossy(&rest[VALUE_INDICATOR.len()..]).into_owned();
    let (value, comment) = parse_value_field(&field)?;
    Ok(Card {
        keyword,
        value,
        comment,
    })
}

/// Folds `CONTINUE` records into the string they extend. A string value
/// ending in `&` continues on the next card when that card is `CONTINUE`;
/// the fragments' comments are joined the same way.
pub fn join_long_strings(cards: Vec<Card>) -> Vec<Card> {
    let mut joined: Vec<Card> = Vec::with_capacity(cards.len());
    for card in cards {
        if card.keyword == CONTINUE_KEYWORD && card.value.is_none() {
            let fragment = card
                .comment
                .as_deref()
                .and_then(|text| parse_value_field(text).ok());
            if let (Some(previous), Some((Some(HeaderValue::String(text)), comment))) =
                (joined.last_mut(), fragment)
            {
                if let Some(HeaderValue::String(value)) = &mut previous.value {
                    if value.ends_with('&') {
                        value.pop();
                        value.push_str(&text);
                        if let Some(comment) = comment {
                            match &mut previous.comment {
                                Some(existing) => {
                                    existing.push(' ');
                                    existing.push_str(&comment);
                                }
                                None => previous.comment = Some(comment),
                            }
                        }
                        continue;
                    }
                }
            }
        }
        joined.push(card);
    }
    joined
}

fn parse_value_field(field: &str) -> Result<(Option<HeaderValue>, Option<String>)> {
    let trimmed = field.trim_start();

    if let Some(quoted) = trimmed.strip_prefix('\'') {
        let mut value = String::new();
        let mut chars = quoted.char_indices().peekable();
        let mut end = None;
        while let Some((idx, c)) = chars.next() {
            if c == '\'' {
                if matches!(chars.peek(), Some((_, '\''))) {
                    value.push('\'');
                    chars.next();
                    continue;
                }
                end = Some(idx + 1);
                break;
            }
            value.push(c);
        }
        let end = end.ok_or_else(|| DatasetError::codec("unterminated string value in card"))?;
        let comment = parse_comment(&quoted[end..]);
        return Ok((Some(HeaderValue::String(value.trim_end().to_string())), comment));
    }

    let (raw, comment) = match trimmed.find('/') {
        Some(idx) => (&trimmed[..idx], parse_comment(&trimmed[idx..])),
        None => (trimmed, None),
    };
    let raw = raw.trim();

    let value = match raw {
        "" => None,
        "T" => Some(HeaderValue::Logical(true)),
        "F" => Some(HeaderValue::Logical(false)),
        _ => Some(parse_number(raw)),
    };
    Ok((value, comment))
}

fn parse_number(raw: &str) -> HeaderValue {
    if let Ok(i) = raw.parse::<i64>() {
        return HeaderValue::Integer(i);
    }
    match raw.replace(['D', 'd'], "E").parse::<f64>() {
        Ok(f) => HeaderValue::Float(f),
        // Kept verbatim so a malformed card survives a load.
        Err(_) => HeaderValue::String(raw.to_string()),
    }
}

fn parse_comment(rest: &str) -> Option<String> {
    let rest = rest.trim_start();
    let comment = rest.strip_prefix('/')?.trim();
    (!comment.is_empty()).then(|| comment.to_string())
}

pub fn format_float(value: f64) -> Result<String> {
    if !value.is_finite() {
        return Err(DatasetError::codec(format!(
            "{} cannot be stored in a FITS header",
            value
        )));
    }
    let repr = format!("{:?}", value).to_ascii_uppercase();
    if repr.contains('.') {
        return Ok(repr);
    }
    Ok(match repr.find('E') {
        Some(idx) => format!("{}.0{}", &repr[..idx], &repr[idx..]),
        None => format!("{}.0", repr),
    })
}

fn format_value(value: &HeaderValue) -> Result<String> {
    let formatted = match value {
        HeaderValue::String(s) => {
            let escaped = s.replace('\'', "''");
            format!("'{:<8}'", escaped)
        }
        HeaderValue::Logical(b) => format!("{:>20}", if *b { "T" } else { "F" }),
        HeaderValue::Integer(i) => format!("{:>20}", i),
        HeaderValue::Float(f) => format!("{:>20}", format_float(*f)?),
    };
    Ok(formatted)
}

/// Renders a card as one or more 80-byte records. Commentary text longer
/// than one card is split over several cards with the same keyword.
pub fn format_card(card: &Card) -> Result<Vec<u8>> {
    if card.keyword.len() > KEYWORD_SIZE {
        return Err(DatasetError::codec(format!(
            "keyword '{}' is longer than {} characters",
            card.keyword, KEYWORD_SIZE
        )));
    }
    let keyword = format!("{:<8}", card.keyword);

    let Some(value) = &card.value else {
        let text = card.comment.as_deref().unwrap_or("");
        let chunks: Vec<String> = if text.is_empty() {
            vec![String::new()]
        } else {
            text.chars()
                .collect::<Vec<_>>()
                .chunks(COMMENTARY_TEXT_SIZE)
                .map(|chunk| chunk.iter().collect())
                .collect()
        };
        let mut out = Vec::with_capacity(CARD_SIZE * chunks.len());
        for chunk in chunks {
            out.extend(pad_record(&format!("{}{}", keyword, chunk)));
        }
        return Ok(out);
    };

    if let HeaderValue::String(text) = value {
        if escaped_len(text) > SHORT_STRING_SIZE {
            return Ok(format_long_string(&keyword, text, card.comment.as_deref()));
        }
    }

    let mut record = format!("{}= {}", keyword, format_value(value)?);
    if record.len() > CARD_SIZE {
        return Err(DatasetError::codec(format!(
            "value of '{}' does not fit in a single card",
            card.keyword
        )));
    }
    if let Some(comment) = card.comment.as_deref().filter(|c| !c.is_empty()) {
        record.push_str(" / ");
        record.push_str(comment);
    }
    Ok(pad_record(&record))
}

fn escaped_len(text: &str) -> usize {
    text.chars().map(|c| if c == '\'' { 2 } else { 1 }).sum()
}

/// Splits `text` into quote-escaped pieces of at most `limit` characters,
/// never separating an escaped quote pair.
fn escaped_chunks(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut width = 0;
    for c in text.chars() {
        let escaped = if c == '\'' { "''" } else { "" };
        let w = if escaped.is_empty() { 1 } else { 2 };
        if width + w > limit {
            chunks.push(std::mem::take(&mut current));
            width = 0;
        }
        if escaped.is_empty() {
            current.push(c);
        } else {
            current.push_str(escaped);
        }
        width += w;
    }
    chunks.push(current);
    chunks
}

/// Long string values use the `CONTINUE` convention: every card but the
/// last ends its fragment with `&`. The comment goes on the last card.
fn format_long_string(keyword: &str, text: &str, comment: Option<&str>) -> Vec<u8> {
    let chunks = escaped_chunks(text, LONG_STRING_CHUNK);
    let last = chunks.len() - 1;
    let mut out = Vec::with_capacity(CARD_SIZE * chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        let marker = if i == last { "" } else { "&" };
        let mut record = if i == 0 {
            format!("{}= '{}{}'", keyword, chunk, marker)
        } else {
            format!("{:<8}  '{}{}'", CONTINUE_KEYWORD, chunk, marker)
        };
        if let Some(comment) = comment.filter(|c| i == last && !c.is_empty()) {
            record.push_str(" / ");
            record.push_str(comment);
        }
        out.extend(pad_record(&record));
    }
    out
}

fn pad_record(text: &str) -> Vec<u8> {
    let mut bytes: Vec<u8> = text
        .chars()
        .map(|c| if c.is_ascii() { c as u8 } else { b'?' })
        .take(CARD_SIZE)
        .collect();
    bytes.resize(CARD_SIZE, b' ');
    bytes
}

pub fn end_card() -> Vec<u8> {
    pad_record("END")
}
