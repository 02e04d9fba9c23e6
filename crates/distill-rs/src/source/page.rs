//! App name extraction from the store page markup.
//!
//! The page is read as a flat stream of start tags, end tags, and character
//! data. Nothing here builds a tree or validates nesting; the store page only
//! needs the text that follows one particular `<div>`. The content of
//! `<script>` and `<style>` elements is raw text up to the matching end tag.

/// One lexical event of the markup stream.
#[derive(Debug, PartialEq, Eq)]
enum MarkupEvent<'a> {
    StartTag {
        name: String,
        attrs: Vec<(String, String)>,
    },
    EndTag,
    Text(&'a str),
}

struct MarkupEvents<'a> {
    rest: &'a str,
    /// Lowercase end-tag prefix closing the current raw-text element.
    raw_text_end: Option<&'static str>,
}

impl<'a> MarkupEvents<'a> {
    fn new(markup: &'a str) -> Self {
        Self {
            rest: markup,
            raw_text_end: None,
        }
    }
}

fn raw_text_end(tag: &str) -> Option<&'static str> {
    match tag {
        "script" => Some("</script"),
        "style" => Some("</style"),
        _ => None,
    }
}

impl<'a> Iterator for MarkupEvents<'a> {
    type Item = MarkupEvent<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.rest.is_empty() {
                return None;
            }

            if let Some(close) = self.raw_text_end.take() {
                // ASCII lowercasing keeps byte offsets.
                let end = self
                    .rest
                    .to_ascii_lowercase()
                    .find(close)
                    .unwrap_or(self.rest.len());
                let (text, tail) = self.rest.split_at(end);
                self.rest = tail;
                if text.is_empty() {
                    continue;
                }
                return Some(MarkupEvent::Text(text));
            }

            if let Some(after) = self.rest.strip_prefix("<!--") {
                self.rest = after.split_once("-->").map_or("", |(_, tail)| tail);
                continue;
            }

            if let Some(after) = self.rest.strip_prefix('<')
                && after.starts_with(|c: char| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?'))
            {
                let Some(end) = tag_end(after) else {
                    self.rest = "";
                    return None;
                };
                let (body, tail) = after.split_at(end);
                self.rest = tail.strip_prefix('>').unwrap_or(tail);

                if body.starts_with('/') {
                    return Some(MarkupEvent::EndTag);
                }
                if body.starts_with('!') || body.starts_with('?') {
                    continue;
                }
                let event = parse_start_tag(body);
                if let MarkupEvent::StartTag { name, .. } = &event {
                    self.raw_text_end = raw_text_end(name);
                }
                return Some(event);
            }

            // Character data runs to the next '<' (a stray leading '<' is data).
            let end = self
                .rest
                .char_indices()
                .skip(1)
                .find(|&(_, c)| c == '<')
                .map_or(self.rest.len(), |(i, _)| i);
            let (text, tail) = self.rest.split_at(end);
            self.rest = tail;
            return Some(MarkupEvent::Text(text));
        }
    }
}

/// Byte offset of the `>` closing a tag, skipping quoted attribute values.
fn tag_end(s: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in s.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '>' => return Some(i),
            None => {}
        }
    }
    None
}

fn parse_start_tag(body: &str) -> MarkupEvent<'static> {
    let body = body.trim_end_matches('/');
    let name_end = body
        .find(|c: char| c.is_whitespace() || c == '/')
        .unwrap_or(body.len());
    let (name, mut rest) = body.split_at(name_end);

    let mut attrs = Vec::new();
    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '/');
        if rest.is_empty() {
            break;
        }
        let key_end = rest
            .find(|c: char| c.is_whitespace() || c == '=')
            .unwrap_or(rest.len());
        let (key, tail) = rest.split_at(key_end);
        let tail = tail.trim_start();
        let (value, tail) = match tail.strip_prefix('=') {
            Some(value) => read_attr_value(value.trim_start()),
            None => (String::new(), tail),
        };
        attrs.push((key.to_ascii_lowercase(), value));
        rest = tail;
    }

    MarkupEvent::StartTag {
        name: name.to_ascii_lowercase(),
        attrs,
    }
}

fn read_attr_value(s: &str) -> (String, &str) {
    for quote in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(quote) {
            return match inner.split_once(quote) {
                Some((value, tail)) => (decode_entities(value), tail),
                None => (decode_entities(inner), ""),
            };
        }
    }
    let end = s.find(char::is_whitespace).unwrap_or(s.len());
    let (value, tail) = s.split_at(end);
    (decode_entities(value), tail)
}

fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some((before, after)) = rest.split_once('&') {
        out.push_str(before);
        let decoded = after
            .split_once(';')
            .and_then(|(entity, tail)| decode_entity(entity).map(|c| (c, tail)));
        match decoded {
            Some((c, tail)) => {
                out.push(c);
                rest = tail;
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    if entity.is_empty() || entity.len() > 10 {
        return None;
    }
    if let Some(hex) = entity
        .strip_prefix("#x")
        .or_else(|| entity.strip_prefix("#X"))
    {
        return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
    }
    if let Some(dec) = entity.strip_prefix('#') {
        return dec.parse::<u32>().ok().and_then(char::from_u32);
    }
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => None,
    }
}

fn is_app_name_div(name: &str, attrs: &[(String, String)]) -> bool {
    name == "div" && attrs.iter().any(|(k, v)| k == "class" && v == "apphub_AppName")
}

/// The display name in a store page, if the page has one.
///
/// Returns the first non-blank character data inside the first `<div>` whose
/// `class` attribute is exactly `apphub_AppName`, trimmed and entity-decoded.
pub fn extract_display_name(markup: &str) -> Option<String> {
    let mut in_name = false;
    for event in MarkupEvents::new(markup) {
        match event {
            MarkupEvent::StartTag { name, attrs } => {
                if is_app_name_div(&name, &attrs) {
                    in_name = true;
                }
            }
            MarkupEvent::EndTag => in_name = false,
            MarkupEvent::Text(text) if in_name => {
                let text = text.trim();
                if !text.is_empty() {
                    return Some(decode_entities(text));
                }
            }
            MarkupEvent::Text(_) => {}
        }
    }
    None
}
