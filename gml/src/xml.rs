//! Arbre XML minimal pour les fragments de géométrie capturés et le
//! fichier de classes

use std::io::Cursor;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::GmlError;

/// Un élément XML avec ses attributs et ses enfants, dans l'ordre du document
#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

/// Nœud d'un arbre XML
#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attributes(name: impl Into<String>, attributes: &[(String, String)]) -> Self {
        Self {
            name: name.into(),
            attributes: attributes.to_vec(),
            children: Vec::new(),
        }
    }

    /// Construit un élément ne contenant qu'un nœud texte
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut elem = Self::new(name);
        elem.children.push(XmlNode::Text(text.into()));
        elem
    }

    /// Valeur d'un attribut, par nom exact
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Premier élément enfant portant ce nom
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.child_elements().find(|e| e.name == name)
    }

    /// Tous les éléments enfants portant ce nom
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.child_elements().filter(move |e| e.name == name)
    }

    /// Tous les éléments enfants directs
    pub fn child_elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            XmlNode::Text(_) => None,
        })
    }

    /// Concaténation des nœuds texte directs
    pub fn text(&self) -> String {
        let mut out = String::new();
        for node in &self.children {
            if let XmlNode::Text(t) = node {
                out.push_str(t);
            }
        }
        out
    }

    /// Texte d'un enfant nommé, trim inclus
    pub fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).map(|e| e.text().trim().to_string())
    }

    /// Ajoute du texte en fusionnant avec un éventuel nœud texte final
    pub fn push_text(&mut self, text: &str) {
        if let Some(XmlNode::Text(last)) = self.children.last_mut() {
            last.push_str(text);
        } else {
            self.children.push(XmlNode::Text(text.to_string()));
        }
    }
}

/// Parse un document XML complet en arbre. Les commentaires, déclarations
/// et instructions de traitement sont ignorés, ainsi que les nœuds texte
/// ne contenant que des blancs (artéfacts d'indentation).
pub fn parse_document(input: &str) -> Result<XmlElement, GmlError> {
    let mut reader = Reader::from_str(input);
    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        let position = reader.buffer_position();
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                stack.push(element_from_start(&e, position)?);
            }
            Ok(Event::Empty(e)) => {
                let elem = element_from_start(&e, position)?;
                attach(&mut stack, &mut root, elem, position)?;
            }
            Ok(Event::End(_)) => {
                let elem = stack
                    .pop()
                    .ok_or_else(|| GmlError::xml("unexpected closing tag", position))?;
                attach(&mut stack, &mut root, elem, position)?;
            }
            Ok(Event::Text(t)) => {
                let text = t
                    .unescape()
                    .map_err(|e| GmlError::xml(e.to_string(), position))?;
                if !text.trim().is_empty() {
                    if let Some(top) = stack.last_mut() {
                        top.push_text(&text);
                    }
                }
            }
            Ok(Event::CData(c)) => {
                let raw = c.into_inner();
                let text = std::str::from_utf8(&raw)?;
                if let Some(top) = stack.last_mut() {
                    top.push_text(text);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(GmlError::xml(e.to_string(), position)),
        }
    }

    if !stack.is_empty() {
        return Err(GmlError::xml("unclosed element at end of document", 0));
    }
    root.ok_or_else(|| GmlError::xml("empty document", 0))
}

/// Sérialise un arbre en document XML indenté
pub fn serialize_document(root: &XmlElement) -> Result<String, GmlError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    write_element(&mut writer, root)?;
    let bytes = writer.into_inner().into_inner();
    Ok(String::from_utf8(bytes).unwrap_or_default())
}

fn write_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    elem: &XmlElement,
) -> Result<(), GmlError> {
    let mut start = BytesStart::new(elem.name.as_str());
    for (key, value) in &elem.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if elem.children.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for child in &elem.children {
        match child {
            XmlNode::Element(e) => write_element(writer, e)?,
            XmlNode::Text(t) => writer.write_event(Event::Text(BytesText::new(t)))?,
        }
    }
    writer.write_event(Event::End(BytesEnd::new(elem.name.as_str())))?;
    Ok(())
}

fn element_from_start(e: &BytesStart, position: u64) -> Result<XmlElement, GmlError> {
    let name = std::str::from_utf8(e.name().as_ref())?.to_string();
    let mut elem = XmlElement::new(name);
    for attr in e.attributes() {
        let attr = attr.map_err(|err| GmlError::xml(err.to_string(), position))?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| GmlError::xml(err.to_string(), position))?
            .into_owned();
        elem.attributes.push((key, value));
    }
    Ok(elem)
}

fn attach(
    stack: &mut Vec<XmlElement>,
    root: &mut Option<XmlElement>,
    elem: XmlElement,
    position: u64,
) -> Result<(), GmlError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(XmlNode::Element(elem));
        Ok(())
    } else if root.is_none() {
        *root = Some(elem);
        Ok(())
    } else {
        Err(GmlError::xml("multiple root elements", position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_tree() {
        let root = parse_document("<a x=\"1\"><b>hello</b><c/></a>").unwrap();
        assert_eq!(root.name, "a");
        assert_eq!(root.attribute("x"), Some("1"));
        assert_eq!(root.child("b").unwrap().text(), "hello");
        assert!(root.child("c").unwrap().children.is_empty());
    }

    #[test]
    fn test_parse_unescapes_entities() {
        let root = parse_document("<a>x &amp; y</a>").unwrap();
        assert_eq!(root.text(), "x & y");
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut root = XmlElement::new("List");
        root.children
            .push(XmlNode::Element(XmlElement::with_text("Name", "Road")));
        let mut empty = XmlElement::new("Empty");
        empty.attributes.push(("k".to_string(), "v".to_string()));
        root.children.push(XmlNode::Element(empty));

        let serialized = serialize_document(&root).unwrap();
        let reparsed = parse_document(&serialized).unwrap();
        assert_eq!(reparsed, root);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_document("").is_err());
        assert!(parse_document("<a><b>").is_err());
    }

    #[test]
    fn test_whitespace_only_text_dropped() {
        let root = parse_document("<a>\n  <b>x</b>\n</a>").unwrap();
        assert_eq!(root.children.len(), 1);
    }
}
