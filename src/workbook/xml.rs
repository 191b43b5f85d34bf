//! In-memory XML element tree
//!
//! Workbooks are bounded in size and the extractor needs random access to
//! nested elements, so the whole document is read into a tree of owned
//! elements first. Text content is not kept: everything the extractor needs
//! lives in attributes.

use crate::error::{MigrateError, MigrateResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// One element with its attributes and child elements in document order
#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    pub name: String,
    attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    /// Attribute value by name
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn attr_owned(&self, key: &str) -> Option<String> {
        self.attr(key).map(str::to_string)
    }

    /// First direct child with the given name
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All descendants with the given name, pre-order (document order)
    pub fn descendants(&self, name: &str) -> Vec<&XmlElement> {
        self.descendants_outside(name, &[])
    }

    /// Like [`XmlElement::descendants`] but never enters elements named in
    /// `barriers`. A barrier element itself is still returned if it matches.
    pub fn descendants_outside(&self, name: &str, barriers: &[&str]) -> Vec<&XmlElement> {
        let mut found = Vec::new();
        for child in &self.children {
            child.collect(name, barriers, &mut found);
        }
        found
    }

    fn collect<'a>(&'a self, name: &str, barriers: &[&str], found: &mut Vec<&'a XmlElement>) {
        if self.name == name {
            found.push(self);
        }
        if barriers.contains(&self.name.as_str()) {
            return;
        }
        for child in &self.children {
            child.collect(name, barriers, found);
        }
    }
}

/// Parse a complete document into its root element.
///
/// Fails with [`MigrateError::Parse`] on malformed markup, unclosed
/// elements, a missing root, or more than one root.
pub fn parse_document(bytes: &[u8]) -> MigrateResult<XmlElement> {
    let mut reader = Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::with_capacity(1024);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            MigrateError::Parse(format!(
                "malformed XML at byte {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Start(start) => stack.push(element_from(&start)?),
            Event::Empty(start) => {
                let element = element_from(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| {
                    MigrateError::Parse("closing tag without matching opening tag".to_string())
                })?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Eof => break,
            _ => (),
        }
        buf.clear();
    }

    if let Some(open) = stack.last() {
        return Err(MigrateError::Parse(format!(
            "unexpected end of document inside <{}>",
            open.name
        )));
    }

    root.ok_or_else(|| MigrateError::Parse("document has no root element".to_string()))
}

fn element_from(start: &BytesStart) -> MigrateResult<XmlElement> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attributes = Vec::new();

    for attr in start.attributes() {
        let attr =
            attr.map_err(|e| MigrateError::Parse(format!("bad attribute in <{name}>: {e}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| MigrateError::Parse(format!("bad value for '{key}' in <{name}>: {e}")))?
            .into_owned();
        attributes.push((key, value));
    }

    Ok(XmlElement {
        name,
        attributes,
        children: Vec::new(),
    })
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> MigrateResult<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(MigrateError::Parse(format!(
            "second root element <{}>",
            element.name
        )));
    }
    *root = Some(element);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_document() {
        let xml = br#"<?xml version='1.0' encoding='utf-8' ?>
<workbook version='18.1'>
  <datasources>
    <datasource name='a' caption='A &amp; B'/>
    <datasource name='b'><column name='[x]'/></datasource>
  </datasources>
</workbook>"#;

        let root = parse_document(xml).unwrap();
        assert_eq!(root.name, "workbook");
        assert_eq!(root.attr("version"), Some("18.1"));

        let sources = root.descendants("datasource");
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].attr("caption"), Some("A & B"));
        assert_eq!(sources[1].children.len(), 1);
        assert!(sources[0].attr("missing").is_none());
    }

    #[test]
    fn test_descendants_document_order() {
        let xml = b"<r><z name='1'><z name='2'/></z><z name='3'/></r>";
        let root = parse_document(xml).unwrap();
        let names: Vec<_> = root
            .descendants("z")
            .iter()
            .filter_map(|z| z.attr("name"))
            .collect();
        assert_eq!(names, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_descendants_outside_barrier() {
        let xml = b"<r><d name='top'/><w><d name='nested'/></w></r>";
        let root = parse_document(xml).unwrap();
        let found = root.descendants_outside("d", &["w"]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].attr("name"), Some("top"));
    }

    #[test]
    fn test_mismatched_tags_fail() {
        let err = parse_document(b"<a><b></a>").unwrap_err();
        assert!(matches!(err, MigrateError::Parse(_)));
    }

    #[test]
    fn test_unclosed_document_fails() {
        let err = parse_document(b"<a><b/>").unwrap_err();
        assert!(err.to_string().contains("<a>"));
    }

    #[test]
    fn test_empty_document_fails() {
        assert!(matches!(parse_document(b""), Err(MigrateError::Parse(_))));
    }

    #[test]
    fn test_two_roots_fail() {
        assert!(matches!(parse_document(b"<a/><b/>"), Err(MigrateError::Parse(_))));
    }
}
