//! Streaming reader over the `<row .../>` elements of a dump file.

use crate::error::{MigrateError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Local name of the element that carries one table row.
pub const ROW_ELEMENT: &[u8] = b"row";

/// One data row: attribute name/value pairs in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpRow {
    attributes: Vec<(String, String)>,
}

impl DumpRow {
    /// Value of the attribute named `name`, if the row has it.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Attribute names in document order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Pull parser yielding rows one at a time without loading the document.
///
/// Rows whose attributes cannot be decoded are skipped and counted in
/// [`RowReader::malformed`]. A stream-level error is yielded once, after
/// which the iterator is exhausted.
pub struct RowReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    path: PathBuf,
    malformed: u64,
    done: bool,
}

impl RowReader<BufReader<File>> {
    /// Open a dump file for streaming.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        Ok(Self::from_reader(BufReader::with_capacity(256 * 1024, file), path))
    }
}

impl<R: BufRead> RowReader<R> {
    /// Stream rows from any buffered reader; `path` is used in error messages.
    pub fn from_reader(inner: R, path: impl Into<PathBuf>) -> Self {
        let mut reader = Reader::from_reader(inner);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            buf: Vec::with_capacity(4096),
            path: path.into(),
            malformed: 0,
            done: false,
        }
    }

    /// Number of row elements skipped because their attributes were malformed.
    pub fn malformed(&self) -> u64 {
        self.malformed
    }
}

impl<R: BufRead> Iterator for RowReader<R> {
    type Item = Result<DumpRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e))
                    if e.local_name().as_ref() == ROW_ELEMENT =>
                {
                    match decode_row(&e) {
                        Some(row) => return Some(Ok(row)),
                        None => self.malformed += 1,
                    }
                }
                Ok(Event::Eof) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(MigrateError::xml(
                        &self.path,
                        format!("at byte {}: {}", self.reader.buffer_position(), e),
                    )));
                }
            }
        }
    }
}

fn decode_row(start: &BytesStart<'_>) -> Option<DumpRow> {
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.ok()?;
        let name = std::str::from_utf8(attr.key.local_name().as_ref())
            .ok()?
            .to_string();
        let value = attr.unescape_value().ok()?.into_owned();
        attributes.push((name, value));
    }
    Some(DumpRow { attributes })
}
