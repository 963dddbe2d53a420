//! Minimal pull-parser for the flat `<container><record>...</record></container>`
//! shape both `schemas.xml` and `logs.xml` use. This walks elements the way
//! the original's libxml2-based `parseNodeset` does (see
//! `examples/original_source/src/{schema,config}.cpp`), just against
//! `quick-xml`'s event stream instead of a DOM + XPath.

use std::collections::HashMap;

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::{LoggerFsError, Result};

/// Parses every `<record_tag>` element anywhere in `xml` into a map of its
/// immediate child element names to their (trimmed) text content.
pub fn parse_records(xml: &str, record_tag: &str) -> Result<Vec<HashMap<String, String>>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut current: Option<HashMap<String, String>> = None;
    let mut field_name: Option<String> = None;
    let mut text = String::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = element_name(e.name().as_ref());
                if name == record_tag {
                    current = Some(HashMap::new());
                } else if current.is_some() {
                    field_name = Some(name);
                    text.clear();
                }
            }
            Ok(Event::Text(t)) => {
                let decoded = t
                    .unescape()
                    .map_err(|e| LoggerFsError::Config(format!("xml text error: {e}")))?;
                text.push_str(&decoded);
            }
            Ok(Event::End(e)) => {
                let name = element_name(e.name().as_ref());
                if name == record_tag {
                    if let Some(record) = current.take() {
                        records.push(record);
                    }
                } else if field_name.as_deref() == Some(name.as_str()) {
                    if let Some(record) = current.as_mut() {
                        record.insert(name, text.trim().to_string());
                    }
                    field_name = None;
                    text.clear();
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(LoggerFsError::Config(format!("xml parse error: {e}"))),
            _ => {}
        }
        buf.clear();
    }

    Ok(records)
}

fn element_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_records() {
        let xml = r#"
            <schemas>
              <schema>
                <name>apache-common</name>
                <regex>^(\S+)$</regex>
                <columns>host</columns>
              </schema>
              <schema>
                <name>other</name>
                <regex>^(\d+)$</regex>
                <columns>num</columns>
              </schema>
            </schemas>
        "#;
        let records = parse_records(xml, "schema").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("name").map(String::as_str), Some("apache-common"));
        assert_eq!(records[1].get("columns").map(String::as_str), Some("num"));
    }

    #[test]
    fn trims_element_text() {
        let xml = "<logs><log><location>  access  </location></log></logs>";
        let records = parse_records(xml, "log").unwrap();
        assert_eq!(records[0].get("location").map(String::as_str), Some("access"));
    }

    #[test]
    fn empty_container_yields_no_records() {
        let xml = "<schemas></schemas>";
        let records = parse_records(xml, "schema").unwrap();
        assert!(records.is_empty());
    }
}
