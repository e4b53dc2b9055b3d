/*!
 * Response parsing for batch translations.
 *
 * Models asked for "a list of N translations" answer in many shapes: a JSON
 * array, a Python list with mixed quotes, a numbered list, bullets, or plain
 * comma-separated text, often wrapped in a code fence and preceded by a
 * chatty preamble. The parser tries progressively looser readings and
 * accepts the first one that yields exactly the expected count. It never
 * truncates or pads.
 */

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::ParseError;

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*\s*\n?(.*?)```").expect("valid fence pattern"));

static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d+\s*[.):\-]|[-*•])\s*").expect("valid marker pattern"));

const QUOTES: &[char] = &['\'', '"', '“', '”', '‘', '’', '«', '»'];

/// Parse a model response into exactly `expected` translations.
pub fn parse_translations(response: &str, expected: usize) -> Result<Vec<String>, ParseError> {
    let text = strip_code_fence(response.trim());
    if text.is_empty() {
        if expected == 0 {
            return Ok(Vec::new());
        }
        return Err(ParseError::Empty);
    }

    // Count from the most structured reading, used in the error
    let mut best_found: Option<usize> = None;

    if let Some(items) = parse_list_literal(text) {
        debug!("List literal stage found {} of {} entries", items.len(), expected);
        if items.len() == expected {
            return Ok(items);
        }
        best_found.get_or_insert(items.len());
    }

    let lines = parse_lines(text);
    debug!("Line stage found {} of {} entries", lines.len(), expected);
    if lines.len() == expected {
        return Ok(lines);
    }
    best_found.get_or_insert(lines.len());

    let segments = parse_comma_separated(text);
    debug!("Comma stage found {} of {} entries", segments.len(), expected);
    if segments.len() == expected {
        return Ok(segments);
    }

    Err(ParseError::Insufficient {
        expected,
        found: best_found.unwrap_or(segments.len()),
    })
}

/// Contents of the first code fence, or the text itself
fn strip_code_fence(text: &str) -> &str {
    CODE_FENCE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(text)
}

/// Read the outermost `[ ... ]` as a list of quoted strings
fn parse_list_literal(text: &str) -> Option<Vec<String>> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }
    let literal = &text[start..=end];

    if let Ok(items) = serde_json::from_str::<Vec<String>>(literal) {
        return Some(items.into_iter().map(|s| s.trim().to_string()).collect());
    }

    let items = tokenize_quoted(&literal[1..literal.len() - 1]);
    if items.is_empty() { None } else { Some(items) }
}

/// Collect quoted strings from the inside of a list literal.
///
/// A quote only closes a string when it is followed by a comma, the end of
/// the list, or end of input, so apostrophes inside words survive
/// (`'l'eau'`). Backslash escapes the next character.
fn tokenize_quoted(inner: &str) -> Vec<String> {
    let chars: Vec<char> = inner.chars().collect();
    let mut items = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if !QUOTES.contains(&c) {
            i += 1;
            continue;
        }

        let mut value = String::new();
        let mut j = i + 1;
        let mut closed = false;
        while j < chars.len() {
            let ch = chars[j];
            if ch == '\\' && j + 1 < chars.len() {
                value.push(unescape(chars[j + 1]));
                j += 2;
                continue;
            }
            if QUOTES.contains(&ch) && closes_item(&chars[j + 1..]) {
                closed = true;
                break;
            }
            value.push(ch);
            j += 1;
        }
        if !closed {
            break;
        }
        items.push(value.trim().to_string());
        i = j + 1;
    }
    items
}

fn closes_item(rest: &[char]) -> bool {
    match rest.iter().find(|c| !c.is_whitespace()) {
        None => true,
        Some(',') | Some(']') => true,
        Some(_) => false,
    }
}

fn unescape(c: char) -> char {
    match c {
        'n' => '\n',
        't' => '\t',
        other => other,
    }
}

/// One translation per non-blank line, with list markers removed
fn parse_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !is_preamble(line))
        .map(clean_line)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Strip the list marker, then list-literal punctuation only where the line
/// is visibly a fragment of a quoted list (`['a',`, `'b',`, `'c']`). Brackets
/// and quotes that belong to the text itself are kept.
fn clean_line(line: &str) -> String {
    let line = LIST_MARKER.replace(line, "");
    let mut text = line.trim();

    if let Some(rest) = text.strip_prefix('[') {
        if rest.trim_start().starts_with(|c: char| QUOTES.contains(&c)) {
            text = rest.trim_start();
        }
    }

    let Some(open) = text.chars().next().filter(|c| QUOTES.contains(c)) else {
        return text.to_string();
    };
    let body = &text[open.len_utf8()..];
    let body = body.trim_end();
    let body = body.strip_suffix(',').map(str::trim_end).unwrap_or(body);
    let body = match body.strip_suffix(']') {
        Some(inner) if inner.trim_end().ends_with(|c: char| QUOTES.contains(&c)) => inner.trim_end(),
        _ => body,
    };
    match body.strip_suffix(closing_quote(open)) {
        Some(inner) => inner.trim().to_string(),
        None => text.to_string(),
    }
}

fn closing_quote(open: char) -> char {
    match open {
        '“' => '”',
        '‘' => '’',
        '«' => '»',
        other => other,
    }
}

fn is_preamble(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower.starts_with("here are")
        || lower.starts_with("here is")
        || lower.starts_with("translation:")
        || lower.starts_with("translations:")
        || (lower.starts_with("here") && lower.ends_with(':'))
}

/// Last resort: split on commas
fn parse_comma_separated(text: &str) -> Vec<String> {
    let text = text.trim();
    let inner = text
        .strip_prefix('[')
        .and_then(|t| t.strip_suffix(']'))
        .unwrap_or(text);
    inner
        .split(',')
        .map(clean_line)
        .filter(|segment| !segment.is_empty())
        .filter(|segment| {
            let lower = segment.to_lowercase();
            !lower.starts_with("here") && !lower.starts_with("translation")
        })
        .collect()
}
