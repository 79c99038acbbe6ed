// Incremental reader for a top-level JSON array of objects
//
// The bulk catalog is a single array of several hundred thousand objects.
// Elements are parsed one at a time straight off the byte stream; only the
// element being parsed is held in memory.

use std::io::BufRead;

use serde::Deserialize;

use super::SourceError;
use crate::models::RawCatalogEntry;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    First,
    Rest,
    Done,
}

/// Iterator over the objects of a JSON array read from `R`
///
/// The first error ends the iteration.
pub struct JsonArrayReader<R> {
    reader: R,
    state: State,
    elements: u64,
}

impl<R: BufRead> JsonArrayReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state: State::Start,
            elements: 0,
        }
    }

    /// Number of elements yielded so far
    pub fn elements_read(&self) -> u64 {
        self.elements
    }

    fn advance(&mut self) -> Result<Option<RawCatalogEntry>, SourceError> {
        loop {
            match self.state {
                State::Done => return Ok(None),
                State::Start => {
                    self.skip_bom()?;
                    match self.peek_non_ws()? {
                        Some(b'[') => {
                            self.reader.consume(1);
                            self.state = State::First;
                        }
                        Some(other) => {
                            return Err(SourceError::Format(format!(
                                "catalog must be a JSON array, found '{}'",
                                other as char
                            )))
                        }
                        None => return Err(SourceError::Format("catalog is empty".to_string())),
                    }
                }
                State::First | State::Rest => {
                    match self.peek_non_ws()? {
                        Some(b']') => {
                            self.reader.consume(1);
                            self.state = State::Done;
                            return Ok(None);
                        }
                        Some(b',') if self.state == State::Rest => {
                            self.reader.consume(1);
                        }
                        Some(_) if self.state == State::First => {}
                        Some(other) => {
                            return Err(SourceError::Format(format!(
                                "expected ',' or ']' after element {}, found '{}'",
                                self.elements, other as char
                            )))
                        }
                        None => return Err(self.truncated()),
                    }

                    if self.peek_non_ws()?.is_none() {
                        return Err(self.truncated());
                    }

                    let index = self.elements;
                    let mut de = serde_json::Deserializer::from_reader(&mut self.reader);
                    let entry = RawCatalogEntry::deserialize(&mut de)
                        .map_err(|source| SourceError::Element { index, source })?;
                    self.state = State::Rest;
                    self.elements += 1;
                    return Ok(Some(entry));
                }
            }
        }
    }

    fn truncated(&self) -> SourceError {
        SourceError::Format(format!(
            "catalog ended before the closing ']' (after {} elements)",
            self.elements
        ))
    }

    fn skip_bom(&mut self) -> Result<(), SourceError> {
        let has_bom = self.reader.fill_buf()?.starts_with(&UTF8_BOM);
        if has_bom {
            self.reader.consume(UTF8_BOM.len());
        }
        Ok(())
    }

    /// Skip whitespace and return the next byte without consuming it
    fn peek_non_ws(&mut self) -> Result<Option<u8>, SourceError> {
        loop {
            let (skipped, next, available) = {
                let buf = self.reader.fill_buf()?;
                if buf.is_empty() {
                    return Ok(None);
                }
                let skipped = buf.iter().take_while(|b| b.is_ascii_whitespace()).count();
                (skipped, buf.get(skipped).copied(), buf.len())
            };

            if let Some(byte) = next {
                self.reader.consume(skipped);
                return Ok(Some(byte));
            }
            self.reader.consume(available);
        }
    }
}

impl<R: BufRead> Iterator for JsonArrayReader<R> {
    type Item = Result<RawCatalogEntry, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => {
                self.state = State::Done;
                Some(Err(e))
            }
        }
    }
}
