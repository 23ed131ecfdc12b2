//! Free-text interpretation shared by the client funnel and the operator dialogs:
//! keyword detection, glyph-tolerant menu indices and catalog line grammars.

use std::str::FromStr;

use rust_decimal::Decimal;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::domain::catalog::OfferDraft;

const KEYCAP_VARIATION: char = '\u{FE0F}';
const KEYCAP_COMBINING: char = '\u{20E3}';
const KEYCAP_TEN: char = '\u{1F51F}';

const CANCEL_KEYWORDS: &[&str] = &["cancelar", "/cancelar", "cancel"];
const BACK_KEYWORDS: &[&str] = &["volver", "/volver", "atras", "back"];
const OFFERS_TRIGGER: &str = "oferta";

/// Decomposes, strips combining marks and case-folds.
pub fn normalize(input: &str) -> String {
    input.trim().nfd().filter(|c| !is_combining_mark(*c)).collect::<String>().to_lowercase()
}

pub fn is_cancel(input: &str) -> bool {
    let normalized = normalize(input);
    CANCEL_KEYWORDS.contains(&normalized.as_str())
}

pub fn is_back(input: &str) -> bool {
    let normalized = normalize(input);
    BACK_KEYWORDS.contains(&normalized.as_str())
}

/// Matches "oferta", "ofertas", "OFERTAS", "ofértas" anywhere in the message.
pub fn mentions_offers(input: &str) -> bool {
    normalize(input).contains(OFFERS_TRIGGER)
}

/// Parses a single menu index. Keycap digit glyphs (`1️⃣`, with or without the
/// variation selector) and `🔟` count as digits; everything else is ignored.
/// Input that yields no digit at all is `None`, never zero.
pub fn parse_menu_index(input: &str) -> Option<u32> {
    let mut digits = String::new();
    for c in input.chars() {
        match c {
            KEYCAP_TEN => digits.push_str("10"),
            c if c.is_ascii_digit() => digits.push(c),
            _ => {}
        }
    }
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Renders an index the way menus show it.
pub fn render_menu_index(index: u32) -> String {
    if index == 10 {
        return KEYCAP_TEN.to_string();
    }
    index
        .to_string()
        .chars()
        .flat_map(|digit| [digit, KEYCAP_VARIATION, KEYCAP_COMBINING])
        .collect()
}

/// Parses one or more indices separated by commas or whitespace, deduplicated in
/// first-seen order. Returns the first token that is not an index as the error.
pub fn parse_menu_indices(input: &str) -> Result<Vec<u32>, String> {
    let mut indices = Vec::new();
    for token in input.split(|c: char| c == ',' || c.is_whitespace()).filter(|t| !t.is_empty()) {
        let index = parse_menu_index(token).ok_or_else(|| token.to_owned())?;
        if !indices.contains(&index) {
            indices.push(index);
        }
    }
    if indices.is_empty() {
        return Err(input.trim().to_owned());
    }
    Ok(indices)
}

/// Non-empty trimmed lines of a possibly multi-line message.
pub fn lines(input: &str) -> impl Iterator<Item = &str> {
    input.lines().map(str::trim).filter(|line| !line.is_empty())
}

/// `<index> <name...>`
pub fn parse_product_line(line: &str) -> Option<(u32, String)> {
    let (index, name) = line.trim().split_once(char::is_whitespace)?;
    let index = index.parse::<u32>().ok()?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((index, name.to_owned()))
}

/// `<index> <description...> <priceMobile> <priceCard> [<priceUsd>]`
///
/// The reading with a USD price is tried first; a line whose last three tokens
/// are all numeric therefore always carries a USD price.
pub fn parse_offer_line(line: &str) -> Result<OfferDraft, String> {
    let tokens = line.split_whitespace().collect::<Vec<_>>();
    let malformed = || line.trim().to_owned();

    let menu_index = tokens.first().and_then(|t| t.parse::<u32>().ok()).ok_or_else(malformed)?;

    if tokens.len() >= 5 {
        let n = tokens.len();
        if let (Some(mobile), Some(card), Some(usd)) =
            (parse_price(tokens[n - 3]), parse_price(tokens[n - 2]), parse_decimal(tokens[n - 1]))
        {
            return Ok(OfferDraft {
                menu_index,
                description: tokens[1..n - 3].join(" "),
                price_mobile: mobile,
                price_card: card,
                price_usd: Some(usd),
            });
        }
    }

    if tokens.len() >= 4 {
        let n = tokens.len();
        if let (Some(mobile), Some(card)) = (parse_price(tokens[n - 2]), parse_price(tokens[n - 1]))
        {
            return Ok(OfferDraft {
                menu_index,
                description: tokens[1..n - 2].join(" "),
                price_mobile: mobile,
                price_card: card,
                price_usd: None,
            });
        }
    }

    Err(malformed())
}

/// Whole, non-negative price.
pub fn parse_price(input: &str) -> Option<i64> {
    input.trim().parse::<i64>().ok().filter(|value| *value >= 0)
}

/// Optional USD price: blank, `-` or any zero clears it.
pub fn parse_optional_usd(input: &str) -> Result<Option<Decimal>, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return Ok(None);
    }
    let value = parse_decimal(trimmed).ok_or_else(|| trimmed.to_owned())?;
    if value.is_zero() {
        return Ok(None);
    }
    Ok(Some(value))
}

fn parse_decimal(input: &str) -> Option<Decimal> {
    Decimal::from_str(&input.trim().replace(',', ".")).ok().filter(|value| !value.is_sign_negative())
}
