//! Backend pull: le consommateur fait avancer le tokenizer

use std::fs::File;
use std::io::BufReader;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::GmlError;
use crate::handler::ReaderCore;
use crate::parser::dispatch_event;

/// Tokenizer piloté par `parse_next`. Chaque appel fait avancer le
/// document d'exactement un événement, si bien qu'au plus une feature se
/// termine par appel.
pub(crate) struct PullParser {
    reader: Reader<BufReader<File>>,
    buf: Vec<u8>,
    done: bool,
}

impl PullParser {
    pub fn new(file: File) -> Self {
        Self {
            reader: Reader::from_reader(BufReader::new(file)),
            buf: Vec::new(),
            done: false,
        }
    }

    /// Dispatch le prochain événement; retourne `false` en fin de document
    pub fn parse_next(&mut self, core: &mut ReaderCore) -> Result<bool, GmlError> {
        if self.done || core.stop_parsing {
            return Ok(false);
        }

        self.buf.clear();
        match self.reader.read_event_into(&mut self.buf) {
            Ok(Event::Eof) => {
                self.done = true;
                Ok(false)
            }
            Ok(event) => {
                dispatch_event(core, event, self.reader.buffer_position())?;
                Ok(true)
            }
            Err(e) => Err(GmlError::xml(e.to_string(), self.reader.buffer_position())),
        }
    }
}
