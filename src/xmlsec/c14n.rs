use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Cursor, Write};
use std::str;

use crate::xml::XML_NS;
use crate::xmlsec::Result;

type NamespaceMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// Exclusive XML canonicalization (without comments) with an optional
/// inclusive namespace prefix list
pub fn canonicalize(xml: impl AsRef<str>, inclusive_ns: Option<&[&str]>) -> Result<String> {
    let mut reader = Reader::from_str(xml.as_ref());
    reader.config_mut().trim_text(false);
    reader.config_mut().expand_empty_elements = true;

    let mut writer = Writer::new(Cursor::new(Vec::new()));
    let mut buf = Vec::new();

    let mut ns_declared_stack: Vec<NamespaceMap> = vec![BTreeMap::new()];
    let mut ns_rendered_stack: Vec<NamespaceMap> = vec![BTreeMap::new()];
    let mut depth = 0usize;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                depth += 1;
                handle_start(
                    &mut writer,
                    &e,
                    &mut ns_declared_stack,
                    &mut ns_rendered_stack,
                    inclusive_ns,
                )?;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                writer.write_event(Event::End(e))?;
                ns_declared_stack.pop();
                ns_rendered_stack.pop();
            }
            // Text outside the document element is not part of the canonical form
            Event::Text(e) if depth > 0 => {
                let text = e.unescape()?;
                let normalized = normalize_line_endings(text.as_bytes());
                let esc = escape_text_value(&normalized)?;
                writer.write_event(Event::Text(BytesText::from_escaped(esc)))?;
            }
            Event::CData(e) if depth > 0 => {
                let v = e.into_inner();
                let normalized = normalize_line_endings(&v);
                let esc = escape_text_value(&normalized)?;
                writer.write_event(Event::Text(BytesText::from_escaped(esc)))?;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(String::from_utf8(writer.into_inner().into_inner())?)
}

/// Normalize line endings to LF
fn normalize_line_endings(text: &[u8]) -> Cow<'_, [u8]> {
    if !text.contains(&b'\r') {
        return Cow::Borrowed(text);
    }

    let mut result = Vec::with_capacity(text.len());
    let mut i = 0;
    while i < text.len() {
        if text[i] == b'\r' {
            result.push(b'\n');
            i += if text.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
        } else {
            result.push(text[i]);
            i += 1;
        }
    }
    Cow::Owned(result)
}

fn escape_attr_value(v: &[u8]) -> Result<String> {
    let s = str::from_utf8(v)?;
    let mut out = String::with_capacity(s.len() + s.len() / 4);
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    Ok(out)
}

fn escape_text_value(v: &[u8]) -> Result<String> {
    let s = str::from_utf8(v)?;
    let mut out = String::with_capacity(s.len() + s.len() / 4);
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    Ok(out)
}

fn prefix_of(name: &[u8]) -> Option<(&[u8], &[u8])> {
    name.iter()
        .position(|&b| b == b':')
        .map(|pos| (&name[..pos], &name[pos + 1..]))
}

/// Writes a start tag with its visibly utilized namespaces and sorted attributes
fn handle_start<W: Write>(
    writer: &mut Writer<W>,
    e: &BytesStart,
    ns_declared_stack: &mut Vec<NamespaceMap>,
    ns_rendered_stack: &mut Vec<NamespaceMap>,
    inclusive_namespaces: Option<&[&str]>,
) -> Result<()> {
    let mut current_declared = ns_declared_stack.last().cloned().unwrap_or_default();
    let ns_rendered = ns_rendered_stack.last().cloned().unwrap_or_default();

    let mut regular_attrs = vec![];
    for attr in e.attributes().with_checks(false) {
        let attr = attr?;
        let key = attr.key.as_ref();
        if key == b"xmlns" {
            if attr.value.is_empty() {
                current_declared.remove(&Vec::new());
            } else {
                current_declared.insert(Vec::new(), attr.value.to_vec());
            }
        } else if let Some(prefix) = key.strip_prefix(b"xmlns:") {
            current_declared.insert(prefix.to_vec(), attr.value.to_vec());
        } else {
            let unescaped_value = attr.unescape_value()?;
            regular_attrs.push((key.to_vec(), unescaped_value.into_owned().into_bytes()));
        }
    }

    let name = e.name();
    let name_bytes = name.as_ref();
    let mut visibly_utilized = BTreeSet::new();
    match prefix_of(name_bytes) {
        Some((prefix, _)) => visibly_utilized.insert(prefix.to_vec()),
        None => visibly_utilized.insert(Vec::new()),
    };
    for (key_bytes, _) in &regular_attrs {
        if let Some((prefix, _)) = prefix_of(key_bytes) {
            if prefix != b"xml" {
                visibly_utilized.insert(prefix.to_vec());
            }
        }
    }
    if let Some(prefixes) = inclusive_namespaces {
        for prefix_str in prefixes {
            let prefix = if *prefix_str == "#default" { "" } else { prefix_str };
            if current_declared.contains_key(prefix.as_bytes()) {
                visibly_utilized.insert(prefix.as_bytes().to_vec());
            }
        }
    }

    let mut render_ns = Vec::new();
    for prefix in &visibly_utilized {
        match current_declared.get(prefix) {
            Some(current_uri) => {
                let already_rendered = ns_rendered.get(prefix) == Some(current_uri);
                if !already_rendered {
                    render_ns.push((prefix.clone(), current_uri.clone()));
                }
            }
            // An unprefixed element outside any default namespace undeclares
            // a default namespace rendered by an ancestor
            None if prefix.is_empty() && ns_rendered.contains_key(prefix) => {
                render_ns.push((Vec::new(), Vec::new()));
            }
            None => {}
        }
    }
    render_ns.sort_by(|a, b| a.0.cmp(&b.0));

    let name_str = str::from_utf8(name_bytes)?;
    let mut tag_start = format!("<{name_str}");
    for (prefix, uri) in &render_ns {
        if prefix.is_empty() {
            tag_start.push_str(" xmlns=\"");
        } else {
            tag_start.push_str(&format!(" xmlns:{}=\"", str::from_utf8(prefix)?));
        }
        tag_start.push_str(&escape_attr_value(uri)?);
        tag_start.push('"');
    }

    // Attributes sort by namespace URI, then local name
    let mut attr_info = vec![];
    for (key_bytes, value_bytes) in regular_attrs {
        let (ns_uri, local_name) = match prefix_of(&key_bytes) {
            Some((b"xml", local)) => (XML_NS.as_bytes().to_vec(), local.to_vec()),
            Some((prefix, local)) => (
                current_declared.get(prefix).cloned().unwrap_or_default(),
                local.to_vec(),
            ),
            None => (vec![], key_bytes.clone()),
        };
        attr_info.push((ns_uri, local_name, key_bytes, value_bytes));
    }
    attr_info.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

    for (_, _, key_bytes, value_bytes) in &attr_info {
        tag_start.push(' ');
        tag_start.push_str(str::from_utf8(key_bytes)?);
        tag_start.push_str("=\"");
        tag_start.push_str(&escape_attr_value(value_bytes)?);
        tag_start.push('"');
    }

    tag_start.push('>');
    writer.get_mut().write_all(tag_start.as_bytes())?;

    ns_declared_stack.push(current_declared);
    let mut new_rendered = ns_rendered;
    for (prefix, uri) in render_ns {
        if uri.is_empty() {
            new_rendered.remove(&prefix);
        } else {
            new_rendered.insert(prefix, uri);
        }
    }
    ns_rendered_stack.push(new_rendered);
    Ok(())
}
