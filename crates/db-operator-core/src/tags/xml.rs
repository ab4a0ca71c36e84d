//! Readers for the few fields the tag engine needs out of `.mra` and `.mgl`
//! documents. Documents are lowercased as a whole before parsing, so element
//! names, attribute names and values all compare in lowercase.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::error::{Error, Result};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MraFields {
    pub rbf: Option<String>,
    pub zips: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MglFields {
    pub rbf: Option<String>,
    pub setname: Option<String>,
}

pub fn read_mra_fields(path: &Path) -> Result<MraFields> {
    let content = read_document(path)?;
    parse_mra_fields(&content, path)
}

pub fn read_mgl_fields(path: &Path) -> Result<MglFields> {
    let content = read_document(path)?;
    parse_mgl_fields(&content, path)
}

/// Read and decode failures are reported against the document's path.
fn read_document(path: &Path) -> Result<String> {
    let xml_error = |source: quick_xml::Error| Error::Xml {
        path: path.to_path_buf(),
        source,
    };
    let bytes = fs::read(path).map_err(|err| xml_error(err.into()))?;
    String::from_utf8(bytes)
        .map_err(|err| xml_error(quick_xml::Error::NonDecodable(Some(err.utf8_error()))))
}

pub fn parse_mra_fields(xml: &str, origin: &Path) -> Result<MraFields> {
    let mut rbf = None;
    let mut zips = BTreeSet::new();

    for_each_element(xml, origin, |element| match element.name.as_str() {
        "rbf" => keep_first(&mut rbf, "rbf", element.text, origin),
        "rom" => {
            for (key, value) in &element.attributes {
                if key.trim() == "zip" {
                    zips.extend(value.trim().split('|').map(|z| z.trim().to_string()));
                }
            }
        }
        _ => {}
    })?;

    Ok(MraFields {
        rbf,
        zips: zips.into_iter().collect(),
    })
}

pub fn parse_mgl_fields(xml: &str, origin: &Path) -> Result<MglFields> {
    let mut fields = MglFields::default();

    for_each_element(xml, origin, |element| match element.name.as_str() {
        "rbf" => keep_first(&mut fields.rbf, "rbf", element.text, origin),
        "setname" => keep_first(&mut fields.setname, "setname", element.text, origin),
        _ => {}
    })?;

    Ok(fields)
}

/// Single-valued fields keep their first non-empty value; repeats are only logged.
fn keep_first(slot: &mut Option<String>, field: &str, text: Option<String>, origin: &Path) {
    let Some(value) = text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) else {
        return;
    };
    match slot {
        Some(first) => warn!(
            "Duplicated {} tag on file {}, first value {}, later value {}",
            field,
            origin.display(),
            first,
            value
        ),
        None => *slot = Some(value),
    }
}

struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    text: Option<String>,
}

/// Calls `on_element` once per opening tag, with the text that directly follows it.
///
/// The document must hold exactly one closed root element; anything else is an
/// `Error::Xml`.
fn for_each_element<F>(xml: &str, origin: &Path, mut on_element: F) -> Result<()>
where
    F: FnMut(Element),
{
    let lowered = xml.to_lowercase();
    let mut reader = Reader::from_str(&lowered);
    reader.trim_text(true);

    let xml_error = |source: quick_xml::Error| Error::Xml {
        path: origin.to_path_buf(),
        source,
    };

    let mut pending: Option<Element> = None;
    let mut depth = 0usize;
    let mut root_seen = false;
    loop {
        let event = reader.read_event().map_err(xml_error)?;
        match event {
            Event::Start(start) => {
                if depth == 0 {
                    enter_root(&mut root_seen).map_err(xml_error)?;
                }
                depth += 1;
                if let Some(element) = pending.take() {
                    on_element(element);
                }
                pending = Some(open_element(&start).map_err(xml_error)?);
            }
            Event::Empty(start) => {
                if depth == 0 {
                    enter_root(&mut root_seen).map_err(xml_error)?;
                }
                if let Some(element) = pending.take() {
                    on_element(element);
                }
                on_element(open_element(&start).map_err(xml_error)?);
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if let Some(element) = pending.take() {
                    on_element(element);
                }
            }
            Event::Text(text) => {
                if depth == 0 {
                    if text.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    let outside = String::from_utf8_lossy(&text).into_owned();
                    return Err(xml_error(quick_xml::Error::UnexpectedToken(outside)));
                }
                if let Some(mut element) = pending.take() {
                    element.text = Some(text.unescape().map_err(xml_error)?.into_owned());
                    on_element(element);
                }
            }
            Event::CData(data) => {
                if let Some(mut element) = pending.take() {
                    element.text = Some(String::from_utf8_lossy(&data.into_inner()).into_owned());
                    on_element(element);
                }
            }
            Event::Eof => {
                if !root_seen {
                    return Err(xml_error(quick_xml::Error::UnexpectedEof(
                        "no element found".to_string(),
                    )));
                }
                if depth > 0 {
                    return Err(xml_error(quick_xml::Error::UnexpectedEof(format!(
                        "{} unclosed element(s)",
                        depth
                    ))));
                }
                break;
            }
            _ => {
                if let Some(element) = pending.take() {
                    on_element(element);
                }
            }
        }
    }

    if let Some(element) = pending.take() {
        on_element(element);
    }
    Ok(())
}

fn enter_root(root_seen: &mut bool) -> std::result::Result<(), quick_xml::Error> {
    if *root_seen {
        return Err(quick_xml::Error::UnexpectedToken(
            "junk after document element".to_string(),
        ));
    }
    *root_seen = true;
    Ok(())
}

fn open_element(start: &BytesStart<'_>) -> std::result::Result<Element, quick_xml::Error> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attribute in start.attributes() {
        let attribute = attribute?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        text: None,
    })
}
