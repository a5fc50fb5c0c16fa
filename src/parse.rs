use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::{Error, Result};

/// Collects the table names carried by `{marker}={table}` query parameters of every link
/// in the document. Order follows the document, duplicates are kept.
/// Malformed or empty HTML simply yields no names.
pub fn extract_table_names(html: &str, marker: &str) -> Result<Vec<String>> {
    let doc = Html::parse_document(html);
    let link_selector = create_selector("a[href]")?;

    let names = doc
        .select(&link_selector)
        .filter_map(|link| link.value().attr("href"))
        .filter_map(|href| param_value(href, marker))
        .map(String::from)
        .collect();
    Ok(names)
}

/// Value between `{marker}=` and the next `&` (or the end of the link).
fn param_value<'a>(href: &'a str, marker: &str) -> Option<&'a str> {
    href.match_indices(marker).find_map(|(idx, _)| {
        let value = href[idx + marker.len()..].strip_prefix('=')?;
        let value = value.split('&').next().unwrap_or(value).trim();
        is_table_name(value).then_some(value)
    })
}

// Names end up in request paths and file names.
fn is_table_name(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Parses the row count out of the markup returned by the `count` endpoint.
///
/// The count must sit in exactly one element whose tag name contains `count`
/// (the innermost one when they nest). Its text is taken when it is a single integer,
/// otherwise it is searched for exactly one free standing digit run.
/// A bare integer body without any markup is accepted as is.
/// Anything else is a [`Error::MalformedCount`], never a guessed number.
pub fn parse_row_count(body: &str) -> Result<u64> {
    let bare = body.trim();
    if !bare.is_empty() && bare.bytes().all(|b| b.is_ascii_digit()) {
        return bare
            .parse()
            .map_err(|_| Error::MalformedCount(snippet(body)));
    }

    let doc = Html::parse_document(body);
    let count_elements: Vec<ElementRef> = doc
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| is_count_element(el))
        .filter(|el| {
            !el.descendants()
                .skip(1)
                .filter_map(ElementRef::wrap)
                .any(|inner| is_count_element(&inner))
        })
        .collect();

    let [count_element] = count_elements.as_slice() else {
        return Err(Error::MalformedCount(snippet(body)));
    };
    let text = count_element.text().collect::<String>();
    let text = text.trim();
    if let Ok(count) = text.parse::<u64>() {
        return Ok(count);
    }

    let mut candidates = digit_runs()?
        .find_iter(text)
        .filter(|m| is_free_standing(text, m.start(), m.end()));

    match (candidates.next(), candidates.next()) {
        (Some(m), None) => m
            .as_str()
            .parse()
            .map_err(|_| Error::MalformedCount(snippet(body))),
        _ => Err(Error::MalformedCount(snippet(body))),
    }
}

// Tag names come back lowercased from the HTML parser.
fn is_count_element(el: &ElementRef) -> bool {
    el.value().name().to_ascii_lowercase().contains("count")
}

fn digit_runs() -> Result<&'static Regex> {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    if let Some(digits) = DIGITS.get() {
        return Ok(digits);
    }
    let digits = Regex::new(r"[0-9]+").map_err(|e| Error::MalformedCount(e.to_string()))?;
    Ok(DIGITS.get_or_init(|| digits))
}

// A digit run glued to letters, signs or separators is part of something else.
fn is_free_standing(text: &str, start: usize, end: usize) -> bool {
    let glued = |c: char| c.is_alphanumeric() || matches!(c, '-' | '+' | '.' | ',' | '_');
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(glued) && !after.is_some_and(glued)
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(80) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[inline]
fn create_selector(sel_str: &str) -> Result<Selector> {
    Selector::parse(sel_str).map_err(|_| Error::ParseMissingSelector(sel_str.into()))
}
