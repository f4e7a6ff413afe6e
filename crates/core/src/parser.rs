//! Streaming reader turning a WFS `GetFeature` response into [`Record`]s.

use crate::domain::Record;
use crate::error::ParseError;
use crate::gml::{self, QualifiedName, ResolvedName};
use crate::ports::Clock;
use crate::utils::format_timestamp;
use quick_xml::events::Event;
use quick_xml::NsReader;
use std::io::BufRead;
use std::iter::FusedIterator;
use tracing::debug;

/// Child elements read from every frame, addressed by their path below `frm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    SlmId,
    Smid,
    Smcislo,
    Aktivne,
    Pos,
}

impl Field {
    const ALL: [Field; 5] = [
        Field::SlmId,
        Field::Smid,
        Field::Smcislo,
        Field::Aktivne,
        Field::Pos,
    ];

    fn path(self) -> &'static [QualifiedName] {
        const ID: [QualifiedName; 1] = [QualifiedName::feature("id")];
        const SMID: [QualifiedName; 1] = [QualifiedName::feature("smid")];
        const SMCISLO: [QualifiedName; 1] = [QualifiedName::feature("smcislo")];
        const AKTIVNE: [QualifiedName; 1] = [QualifiedName::feature("aktivne")];
        const POS: [QualifiedName; 3] = [
            QualifiedName::feature("smgeopoint"),
            QualifiedName::gml("Point"),
            QualifiedName::gml("pos"),
        ];
        match self {
            Field::SlmId => &ID,
            Field::Smid => &SMID,
            Field::Smcislo => &SMCISLO,
            Field::Aktivne => &AKTIVNE,
            Field::Pos => &POS,
        }
    }

    fn element(self) -> &'static str {
        match self {
            Field::SlmId => "id",
            Field::Smid => "smid",
            Field::Smcislo => "smcislo",
            Field::Aktivne => "aktivne",
            Field::Pos => "smgeopoint/Point/pos",
        }
    }

    fn at(path: &[ResolvedName]) -> Option<Field> {
        Field::ALL.into_iter().find(|field| {
            let expected = field.path();
            expected.len() == path.len()
                && expected.iter().zip(path).all(|(want, got)| want.matches(got))
        })
    }
}

/// Text collected for one frame. Only the first occurrence of each field counts.
#[derive(Default)]
struct FrameText {
    values: [Option<String>; 5],
    filling: Option<Field>,
}

impl FrameText {
    fn open(&mut self, path: &[ResolvedName]) {
        if let Some(field) = Field::at(path) {
            let slot = &mut self.values[field as usize];
            if slot.is_none() {
                *slot = Some(String::new());
                self.filling = Some(field);
            }
        }
    }

    fn close(&mut self, path: &[ResolvedName]) {
        if self.filling.is_some() && Field::at(path) == self.filling {
            self.filling = None;
        }
    }

    fn append(&mut self, path: &[ResolvedName], text: &str) {
        if let Some(field) = self.filling {
            if Field::at(path) == Some(field) {
                if let Some(value) = self.values[field as usize].as_mut() {
                    value.push_str(text);
                }
            }
        }
    }

    fn take(&mut self, field: Field, gml_id: &str) -> Result<String, ParseError> {
        self.values[field as usize]
            .take()
            .ok_or_else(|| ParseError::MissingElement {
                gml_id: gml_id.to_string(),
                element: field.element(),
            })
    }
}

/// Splits `"<lat> <lon>"` on its single separating space.
pub fn split_position(text: &str) -> Option<(&str, &str)> {
    let mut parts = text.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(lat), Some(lon), None) if !lat.is_empty() && !lon.is_empty() => Some((lat, lon)),
        _ => None,
    }
}

/// Lazy sequence of records read from a feature response.
///
/// Stops for good after the first error; a fresh reader is needed per response.
pub struct FrameReader<'c, R> {
    reader: NsReader<R>,
    buf: Vec<u8>,
    clock: &'c dyn Clock,
    member_depth: usize,
    frames_seen: usize,
    done: bool,
}

impl<'c, R: BufRead> FrameReader<'c, R> {
    pub fn new(source: R, clock: &'c dyn Clock) -> Self {
        Self {
            reader: NsReader::from_reader(source),
            buf: Vec::new(),
            clock,
            member_depth: 0,
            frames_seen: 0,
            done: false,
        }
    }

    /// Number of `frm` elements encountered so far.
    pub fn frames_seen(&self) -> usize {
        self.frames_seen
    }

    fn next_frame(&mut self) -> Result<Option<Record>, ParseError> {
        loop {
            self.buf.clear();
            let (start, has_body) = match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(e) => (e, true),
                Event::Empty(e) => (e, false),
                Event::End(e) => {
                    let name = gml::resolve_element(&self.reader, e.name());
                    if gml::FEATURE_MEMBERS.matches(&name) {
                        self.member_depth = self.member_depth.saturating_sub(1);
                    }
                    continue;
                }
                Event::Eof => return Ok(None),
                _ => continue,
            };

            let name = gml::resolve_element(&self.reader, start.name());
            if gml::FEATURE_MEMBERS.matches(&name) {
                if has_body {
                    self.member_depth += 1;
                }
                continue;
            }
            if self.member_depth == 0 || !gml::FRAME.matches(&name) {
                continue;
            }

            self.frames_seen += 1;
            let gml_id = gml::attribute(&self.reader, &start, &gml::GML_ID)?.ok_or(
                ParseError::MissingAttribute {
                    index: self.frames_seen,
                    attribute: "gml:id",
                },
            )?;
            drop(start);

            let mut text = FrameText::default();
            if has_body {
                self.read_frame_body(&gml_id, &mut text)?;
            }
            let record = self.build_record(gml_id, text)?;
            debug!(gml_id = %record.gml_id, slm_id = %record.slm_id, "parsed frame");
            return Ok(Some(record));
        }
    }

    fn read_frame_body(&mut self, gml_id: &str, text: &mut FrameText) -> Result<(), ParseError> {
        let mut path: Vec<ResolvedName> = Vec::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match self.reader.read_event_into(&mut buf)? {
                Event::Start(e) => {
                    path.push(gml::resolve_element(&self.reader, e.name()));
                    text.open(&path);
                }
                Event::Empty(e) => {
                    path.push(gml::resolve_element(&self.reader, e.name()));
                    text.open(&path);
                    text.close(&path);
                    path.pop();
                }
                Event::Text(e) => text.append(&path, &e.unescape()?),
                Event::CData(e) => text.append(&path, &String::from_utf8_lossy(&e)),
                Event::End(_) => {
                    if path.is_empty() {
                        return Ok(());
                    }
                    text.close(&path);
                    path.pop();
                }
                Event::Eof => {
                    return Err(ParseError::Truncated {
                        gml_id: gml_id.to_string(),
                    })
                }
                _ => {}
            }
        }
    }

    fn build_record(&self, gml_id: String, mut text: FrameText) -> Result<Record, ParseError> {
        let slm_id = text.take(Field::SlmId, &gml_id)?;
        let smid = text.take(Field::Smid, &gml_id)?;
        let smcislo = text.take(Field::Smcislo, &gml_id)?;
        let aktivne = text.take(Field::Aktivne, &gml_id)?;
        let pos = text.take(Field::Pos, &gml_id)?;

        let (lat, lon) = split_position(&pos).ok_or_else(|| ParseError::MalformedPosition {
            gml_id: gml_id.clone(),
            text: pos.clone(),
        })?;

        Ok(Record {
            position_lat: lat.to_string(),
            position_lon: lon.to_string(),
            scrap_time: format_timestamp(self.clock.now()),
            gml_id,
            slm_id,
            smid,
            smcislo,
            aktivne,
        })
    }
}

impl<R: BufRead> Iterator for FrameReader<'_, R> {
    type Item = Result<Record, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_frame() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<R: BufRead> FusedIterator for FrameReader<'_, R> {}
