use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::error::LangualError;

/// Fields of one `<DESCRIPTOR>` element. Empty elements read as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceRecord {
    /// Position of the descriptor in the document, starting at 1.
    pub position: usize,
    pub ftc: Option<String>,
    pub term: Option<String>,
    pub broader: Option<String>,
    pub scope_note: Option<String>,
    pub annotation: Option<String>,
    pub active: Option<String>,
    pub synonyms: Vec<String>,
}

impl SourceRecord {
    fn assign(&mut self, field: &str, text: &str) {
        let trimmed = text.trim();
        let value = (!trimmed.is_empty()).then(|| trimmed.to_string());
        match field {
            "FTC" => self.ftc = value,
            "TERM" => self.term = value,
            "BT" => self.broader = value,
            "SN" => self.scope_note = value,
            "AI" => self.annotation = value,
            "ACTIVE" => self.active = value,
            "SYNONYM" => self.synonyms.extend(value),
            _ => {}
        }
    }

    pub fn is_inactive(&self) -> bool {
        self.active
            .as_deref()
            .is_some_and(|value| value.eq_ignore_ascii_case("false"))
    }
}

/// Streams `<DESCRIPTOR>` records out of a LanguaL XML document.
pub struct DescriptorReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    count: usize,
    done: bool,
}

impl<R: BufRead> DescriptorReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            reader: Reader::from_reader(input),
            buf: Vec::new(),
            count: 0,
            done: false,
        }
    }

    fn read_descriptor(&mut self) -> Result<Option<SourceRecord>, LangualError> {
        let mut record: Option<SourceRecord> = None;
        let mut depth = 0usize;
        let mut field: Option<String> = None;
        let mut text = String::new();
        loop {
            self.buf.clear();
            let event = self
                .reader
                .read_event_into(&mut self.buf)
                .map_err(|err| LangualError::SourceXml(err.to_string()))?;
            match event {
                Event::Start(start) => {
                    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                    if record.is_none() {
                        if name == "DESCRIPTOR" {
                            self.count += 1;
                            record = Some(SourceRecord {
                                position: self.count,
                                ..SourceRecord::default()
                            });
                            depth = 0;
                        }
                        continue;
                    }
                    depth += 1;
                    if depth == 1 {
                        field = Some(name);
                        text.clear();
                    }
                }
                Event::Empty(start) => {
                    if let Some(current) = record.as_mut() {
                        if depth == 0 {
                            let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                            current.assign(&name, "");
                        }
                    }
                }
                Event::Text(content) => {
                    if record.is_some() && depth >= 1 {
                        let unescaped = content
                            .unescape()
                            .map_err(|err| LangualError::SourceXml(err.to_string()))?;
                        text.push_str(&unescaped);
                    }
                }
                Event::CData(content) => {
                    if record.is_some() && depth >= 1 {
                        text.push_str(&String::from_utf8_lossy(&content));
                    }
                }
                Event::End(_) => {
                    let Some(current) = record.as_mut() else {
                        continue;
                    };
                    if depth == 0 {
                        return Ok(record);
                    }
                    if depth == 1 {
                        if let Some(name) = field.take() {
                            current.assign(&name, &text);
                        }
                    }
                    depth -= 1;
                }
                Event::Eof => {
                    if record.is_some() {
                        return Err(LangualError::SourceXml(
                            "document ends inside a DESCRIPTOR".to_string(),
                        ));
                    }
                    return Ok(None);
                }
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for DescriptorReader<R> {
    type Item = Result<SourceRecord, LangualError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_descriptor() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Parses every descriptor of an in-memory document.
pub fn parse_descriptors(xml: &str) -> Result<Vec<SourceRecord>, LangualError> {
    DescriptorReader::new(xml.as_bytes()).collect()
}
