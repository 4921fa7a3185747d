//! Backend push: alimentation par tampons, découpage incrémental en tokens
//!
//! Le tokenizer sous-jacent ne sait pas s'interrompre au milieu d'un
//! tampon. Les octets reçus sont donc accumulés et seuls les tokens
//! complets (balise entière, commentaire, section CDATA, instruction de
//! traitement, ou plage de texte terminée par `<`) sont soumis au parseur
//! d'événements. Les entités ne sont ainsi jamais coupées entre deux
//! tampons, et un même appel peut terminer plusieurs features.

use std::fs::File;
use std::io::Read;

use memchr::{memchr, memmem};
use quick_xml::escape::unescape;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::GmlError;
use crate::handler::ReaderCore;
use crate::parser::dispatch_event;

const READ_CHUNK: usize = 8192;

const COMMENT_START: &[u8] = b"<!--";
const CDATA_START: &[u8] = b"<![CDATA[";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Text,
    Markup,
}

/// Parseur alimenté par tampons. `pump` lit le fichier source par blocs;
/// `parse` accepte des tampons arbitraires, y compris octet par octet.
pub(crate) struct PushParser {
    file: Option<File>,
    eof: bool,
    pending: Vec<u8>,
    consumed: u64,
}

impl PushParser {
    pub fn from_file(file: File) -> Self {
        Self {
            file: Some(file),
            eof: false,
            pending: Vec::new(),
            consumed: 0,
        }
    }

    /// Parseur sans fichier, alimenté directement via `parse`
    pub fn new() -> Self {
        Self {
            file: None,
            eof: false,
            pending: Vec::new(),
            consumed: 0,
        }
    }

    /// Lit le prochain bloc du fichier et le parse; retourne `false`
    /// quand le fichier est épuisé
    pub fn pump(&mut self, core: &mut ReaderCore) -> Result<bool, GmlError> {
        if self.eof {
            return Ok(false);
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(false);
        };

        let mut buf = [0u8; READ_CHUNK];
        let n = file.read(&mut buf)?;
        if n == 0 {
            self.eof = true;
            self.parse(core, &[], true)?;
            return Ok(false);
        }
        self.parse(core, &buf[..n], false)?;
        Ok(true)
    }

    /// Parse un tampon; les événements sont dispatchés pendant l'appel.
    /// `is_final` marque la fin du flux et autorise la consommation d'un
    /// texte final non terminé par `<`.
    pub fn parse(
        &mut self,
        core: &mut ReaderCore,
        chunk: &[u8],
        is_final: bool,
    ) -> Result<(), GmlError> {
        self.pending.extend_from_slice(chunk);

        // garde-fou contre un flux pathologiquement fragmenté: borne sur
        // le nombre d'événements texte produits par un même tampon
        let text_limit = chunk.len().max(READ_CHUNK);
        let mut text_events = 0usize;

        let mut start = 0usize;
        let result = loop {
            if core.stop_parsing {
                break Ok(());
            }
            let token = match next_token(&self.pending[start..], is_final, self.consumed) {
                Ok(Some(token)) => token,
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            };
            let (len, kind) = token;
            let raw = &self.pending[start..start + len];
            let text = match std::str::from_utf8(raw) {
                Ok(text) => text,
                Err(e) => break Err(GmlError::Utf8(e)),
            };

            match kind {
                TokenKind::Text => {
                    let unescaped = match unescape(text) {
                        Ok(u) => u,
                        Err(e) => break Err(GmlError::xml(e.to_string(), self.consumed)),
                    };
                    if !unescaped.is_empty() {
                        text_events += 1;
                        if text_events > text_limit {
                            core.stop_parsing = true;
                            break Err(GmlError::xml(
                                "too many character data events, input probably corrupted",
                                self.consumed,
                            ));
                        }
                        core.characters(&unescaped);
                    }
                }
                TokenKind::Markup => {
                    // chaque token est parsé isolément: les fins de balise
                    // ne peuvent pas être appariées à leur ouverture
                    let mut reader = Reader::from_str(text);
                    let config = reader.config_mut();
                    config.check_end_names = false;
                    config.allow_unmatched_ends = true;
                    match reader.read_event() {
                        Ok(Event::Eof) => {}
                        Ok(event) => {
                            if let Err(e) = dispatch_event(core, event, self.consumed) {
                                break Err(e);
                            }
                        }
                        Err(e) => break Err(GmlError::xml(e.to_string(), self.consumed)),
                    }
                }
            }

            start += len;
            self.consumed += len as u64;
        };

        self.pending.drain(..start);
        if result.is_err() {
            core.stop_parsing = true;
        }
        result
    }
}

/// Longueur et genre du prochain token complet au début de `buf`, `None`
/// s'il faut plus d'octets, erreur si le flux se termine au milieu d'un
/// token
fn next_token(
    buf: &[u8],
    is_final: bool,
    position: u64,
) -> Result<Option<(usize, TokenKind)>, GmlError> {
    if buf.is_empty() {
        return Ok(None);
    }

    if buf[0] != b'<' {
        return Ok(match memchr(b'<', buf) {
            Some(pos) => Some((pos, TokenKind::Text)),
            None if is_final => Some((buf.len(), TokenKind::Text)),
            None => None,
        });
    }

    let incomplete = |position| {
        if is_final {
            Err(GmlError::xml("truncated XML token at end of input", position))
        } else {
            Ok(None)
        }
    };

    if buf.len() < 2 {
        return incomplete(position);
    }

    match buf[1] {
        b'!' => {
            if buf.starts_with(COMMENT_START) {
                return find_terminated(buf, COMMENT_START.len(), b"-->", is_final, position);
            }
            if buf.starts_with(CDATA_START) {
                return find_terminated(buf, CDATA_START.len(), b"]]>", is_final, position);
            }
            // préfixe encore ambigu ("<!-", "<![CD", ...)
            if COMMENT_START.starts_with(buf) || CDATA_START.starts_with(buf) {
                return incomplete(position);
            }
            // déclaration DOCTYPE ou assimilée
            find_terminated(buf, 2, b">", is_final, position)
        }
        b'?' => find_terminated(buf, 2, b"?>", is_final, position),
        _ => {
            // balise ordinaire: premier '>' hors valeurs d'attributs
            let mut quote = 0u8;
            for (i, &b) in buf.iter().enumerate().skip(1) {
                if quote == 0 {
                    match b {
                        b'"' | b'\'' => quote = b,
                        b'>' => return Ok(Some((i + 1, TokenKind::Markup))),
                        _ => {}
                    }
                } else if b == quote {
                    quote = 0;
                }
            }
            incomplete(position)
        }
    }
}

fn find_terminated(
    buf: &[u8],
    from: usize,
    terminator: &[u8],
    is_final: bool,
    position: u64,
) -> Result<Option<(usize, TokenKind)>, GmlError> {
    if buf.len() <= from {
        return if is_final {
            Err(GmlError::xml("truncated XML token at end of input", position))
        } else {
            Ok(None)
        };
    }
    match memmem::find(&buf[from..], terminator) {
        Some(pos) => Ok(Some((from + pos + terminator.len(), TokenKind::Markup))),
        None if is_final => Err(GmlError::xml(
            "truncated XML token at end of input",
            position,
        )),
        None => Ok(None),
    }
}
