//! Tool invocation parser: extract tool calls from free-form LLM text.
//!
//! Three syntaxes are tried in order until one yields at least one call:
//!
//! 1. Tagged JSON: the literal marker `TOOL_CALL` followed by a balanced JSON
//!    object, any number of occurrences per reply.
//! 2. Function style: a line `name(key=value, key="value")`.
//! 3. ReAct style: adjacent `Action: name` / `Action Input: ...` lines.
//!
//! Unknown syntaxes yield an empty list, never an error.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// A tool call extracted from LLM text; no result yet.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedToolCall {
    pub name: String,
    pub arguments: HashMap<String, Value>,
    /// Generated call id, unique per parse.
    pub id: String,
}

impl ParsedToolCall {
    fn new(name: impl Into<String>, arguments: HashMap<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
            id: format!("call-{}", uuid::Uuid::new_v4()),
        }
    }
}

static FUNC_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_\-]*)\s*\((.*)\)\s*$").expect("function-call regex")
});

/// Parses tool calls out of one LLM reply.
pub fn parse_tool_calls(text: &str) -> Vec<ParsedToolCall> {
    let tagged = parse_tagged_json(text);
    if !tagged.is_empty() {
        return tagged;
    }
    let function = parse_function_style(text);
    if !function.is_empty() {
        return function;
    }
    parse_react_style(text)
}

/// Syntax 1: `TOOL_CALL` marker followed by a balanced JSON object.
fn parse_tagged_json(text: &str) -> Vec<ParsedToolCall> {
    const MARKER: &str = "TOOL_CALL";
    let mut calls = Vec::new();
    let mut search = 0;
    while let Some(found) = text[search..].find(MARKER) {
        let after = search + found + MARKER.len();
        search = after;
        let rest = &text[after..];
        let offset = rest
            .char_indices()
            .find(|(_, c)| !c.is_whitespace() && *c != ':')
            .map(|(i, _)| i);
        let Some(offset) = offset else { continue };
        if !rest[offset..].starts_with('{') {
            continue;
        }
        let Some(object) = balanced_object(&rest[offset..]) else {
            continue;
        };
        let Ok(Value::Object(map)) = serde_json::from_str::<Value>(object) else {
            continue;
        };
        let Some(name) = map
            .get("name")
            .or_else(|| map.get("tool"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
        else {
            continue;
        };
        let arguments = match map.get("arguments").or_else(|| map.get("args")) {
            Some(Value::Object(args)) => args
                .iter()
                .map(|(k, v)| (k.trim().to_string(), v.clone()))
                .collect(),
            _ => map
                .iter()
                .filter(|(k, _)| !matches!(k.as_str(), "name" | "tool"))
                .map(|(k, v)| (k.trim().to_string(), v.clone()))
                .collect(),
        };
        calls.push(ParsedToolCall::new(name, arguments));
    }
    calls
}

/// Returns the balanced `{...}` prefix of `text`, honoring strings/escapes.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Syntax 2: `name(key=value, key="value")` lines.
fn parse_function_style(text: &str) -> Vec<ParsedToolCall> {
    let mut calls = Vec::new();
    for line in text.lines() {
        let Some(captures) = FUNC_LINE.captures(line) else {
            continue;
        };
        let name = captures[1].trim().to_string();
        let args_text = captures[2].trim();
        let mut arguments = HashMap::new();
        let mut well_formed = true;
        if !args_text.is_empty() {
            for part in split_on_commas(args_text) {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                match part.split_once('=') {
                    Some((key, value)) => {
                        arguments.insert(
                            key.trim().to_string(),
                            Value::String(strip_quotes(value.trim()).to_string()),
                        );
                    }
                    None => {
                        well_formed = false;
                        break;
                    }
                }
            }
        }
        if well_formed {
            calls.push(ParsedToolCall::new(name, arguments));
        }
    }
    calls
}

/// Splits on commas that are not inside quotes.
fn split_on_commas(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quote: Option<char> = None;
    for (i, c) in text.char_indices() {
        match (quote, c) {
            (Some(q), _) if c == q => quote = None,
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, ',') => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' && last == b'"') || (first == b'\'' && last == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Syntax 3: `Action: name` followed by `Action Input: <json-or-text>`.
fn parse_react_style(text: &str) -> Vec<ParsedToolCall> {
    let mut calls = Vec::new();
    let lines: Vec<&str> = text.lines().collect();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i].trim();
        let Some(name) = line.strip_prefix("Action:").map(str::trim) else {
            i += 1;
            continue;
        };
        let input_line = lines[i + 1..]
            .iter()
            .map(|l| l.trim())
            .find(|l| !l.is_empty());
        let arguments = match input_line.and_then(|l| l.strip_prefix("Action Input:")) {
            Some(input) => react_input_arguments(input.trim()),
            None => {
                i += 1;
                continue;
            }
        };
        if !name.is_empty() {
            calls.push(ParsedToolCall::new(name, arguments));
        }
        i += 1;
    }
    calls
}

/// Parses ReAct input as a flat JSON object; anything else lands under the
/// synthetic `input` key.
fn react_input_arguments(input: &str) -> HashMap<String, Value> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(input) {
        return map
            .into_iter()
            .map(|(k, v)| (k.trim().to_string(), v))
            .collect();
    }
    let mut arguments = HashMap::new();
    arguments.insert(
        "input".to_string(),
        Value::String(strip_quotes(input).to_string()),
    );
    arguments
}
