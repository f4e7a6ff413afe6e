//! Namespace-aware lookups over `quick_xml` events.
//!
//! Names are matched by namespace URI + local name, never by prefix, so a feed
//! that binds `gml` to a different prefix still parses.

use quick_xml::events::BytesStart;
use quick_xml::name::{QName, ResolveResult};
use quick_xml::NsReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Namespace(pub &'static str);

impl Namespace {
    pub const GML: Namespace = Namespace("http://www.opengis.net/gml");
    pub const WFS: Namespace = Namespace("http://www.opengis.net/wfs");
    pub const OGC: Namespace = Namespace("http://www.opengis.net/ogc");
}

/// A name to look for. `namespace: None` accepts the local name in any (or no)
/// namespace; used for the feature namespace, whose URI is chosen by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualifiedName {
    pub namespace: Option<Namespace>,
    pub local: &'static str,
}

impl QualifiedName {
    pub const fn gml(local: &'static str) -> Self {
        Self {
            namespace: Some(Namespace::GML),
            local,
        }
    }

    pub const fn feature(local: &'static str) -> Self {
        Self {
            namespace: None,
            local,
        }
    }

    pub fn matches(&self, name: &ResolvedName) -> bool {
        if name.local != self.local.as_bytes() {
            return false;
        }
        match self.namespace {
            Some(ns) => name.namespace.as_deref() == Some(ns.0.as_bytes()),
            None => true,
        }
    }
}

pub const FEATURE_MEMBERS: QualifiedName = QualifiedName::gml("featureMembers");
pub const GML_ID: QualifiedName = QualifiedName::gml("id");
pub const FRAME: QualifiedName = QualifiedName::feature("frm");

/// Owned element name after prefix resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedName {
    pub namespace: Option<Vec<u8>>,
    pub local: Vec<u8>,
}

pub fn resolve_element<R>(reader: &NsReader<R>, name: QName<'_>) -> ResolvedName {
    let (resolved, local) = reader.resolve_element(name);
    to_resolved(resolved, local.as_ref())
}

/// Value of the attribute `name` on `start`, unescaped.
pub fn attribute<R>(
    reader: &NsReader<R>,
    start: &BytesStart<'_>,
    name: &QualifiedName,
) -> Result<Option<String>, quick_xml::Error> {
    for attr in start.attributes() {
        let attr = attr?;
        let (resolved, local) = reader.resolve_attribute(attr.key);
        if name.matches(&to_resolved(resolved, local.as_ref())) {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn to_resolved(resolved: ResolveResult<'_>, local: &[u8]) -> ResolvedName {
    let namespace = match resolved {
        ResolveResult::Bound(ns) => Some(ns.as_ref().to_vec()),
        _ => None,
    };
    ResolvedName {
        namespace,
        local: local.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quick_xml::events::Event;

    fn first_start(xml: &str) -> (NsReader<&[u8]>, BytesStart<'static>) {
        let mut reader = NsReader::from_reader(xml.as_bytes());
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf).unwrap() {
                Event::Start(e) | Event::Empty(e) => return (reader, e.into_owned()),
                Event::Eof => panic!("no element in {xml}"),
                _ => {}
            }
        }
    }

    #[test]
    fn test_gml_name_matches_by_uri_not_prefix() {
        let (reader, start) =
            first_start(r#"<g:featureMembers xmlns:g="http://www.opengis.net/gml"/>"#);
        let name = resolve_element(&reader, start.name());
        assert!(FEATURE_MEMBERS.matches(&name));
    }

    #[test]
    fn test_gml_name_rejects_foreign_namespace() {
        let (reader, start) = first_start(r#"<x:featureMembers xmlns:x="urn:other"/>"#);
        let name = resolve_element(&reader, start.name());
        assert!(!FEATURE_MEMBERS.matches(&name));
    }

    #[test]
    fn test_feature_name_accepts_any_namespace() {
        let (reader, start) = first_start(r#"<slm:frm xmlns:slm="urn:lights"/>"#);
        assert!(FRAME.matches(&resolve_element(&reader, start.name())));
        let (reader, start) = first_start("<frm/>");
        assert!(FRAME.matches(&resolve_element(&reader, start.name())));
    }

    #[test]
    fn test_attribute_lookup_by_namespace() {
        let (reader, start) = first_start(
            r#"<frm xmlns:gml="http://www.opengis.net/gml" id="plain" gml:id="frm.7"/>"#,
        );
        assert_eq!(
            attribute(&reader, &start, &GML_ID).unwrap(),
            Some("frm.7".to_string())
        );
    }

    #[test]
    fn test_attribute_missing() {
        let (reader, start) = first_start(r#"<frm id="plain"/>"#);
        assert_eq!(attribute(&reader, &start, &GML_ID).unwrap(), None);
    }

    #[test]
    fn test_attribute_value_is_unescaped() {
        let (reader, start) = first_start(
            r#"<frm xmlns:gml="http://www.opengis.net/gml" gml:id="a&amp;b"/>"#,
        );
        assert_eq!(
            attribute(&reader, &start, &GML_ID).unwrap(),
            Some("a&b".to_string())
        );
    }
}
