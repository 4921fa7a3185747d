//! Adaptateurs de source d'événements XML
//!
//! Deux backends alimentent la même machine à états: le backend *pull*
//! avance d'un événement par appel, le backend *push* consomme des
//! tampons entiers et peut terminer plusieurs features par appel.

#[cfg(feature = "pull-parser")]
pub mod pull;
#[cfg(feature = "push-parser")]
pub mod push;

use std::fs::File;

use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;

use crate::error::GmlError;
use crate::handler::ReaderCore;

/// Backend XML choisi à la construction du lecteur
pub(crate) enum XmlBackend {
    #[cfg(feature = "pull-parser")]
    Pull(pull::PullParser),
    #[cfg(feature = "push-parser")]
    Push(push::PushParser),
}

impl XmlBackend {
    /// Choisit le backend. Avec les deux compilés, `prefer_push` tranche;
    /// avec un seul, il est utilisé d'office; sans aucun, la construction
    /// échoue.
    pub fn create(file: File, prefer_push: bool) -> Result<Self, GmlError> {
        #[cfg(all(feature = "pull-parser", feature = "push-parser"))]
        {
            if prefer_push {
                Ok(Self::Push(push::PushParser::from_file(file)))
            } else {
                Ok(Self::Pull(pull::PullParser::new(file)))
            }
        }
        #[cfg(all(feature = "pull-parser", not(feature = "push-parser")))]
        {
            let _ = prefer_push;
            Ok(Self::Pull(pull::PullParser::new(file)))
        }
        #[cfg(all(feature = "push-parser", not(feature = "pull-parser")))]
        {
            let _ = prefer_push;
            Ok(Self::Push(push::PushParser::from_file(file)))
        }
        #[cfg(not(any(feature = "pull-parser", feature = "push-parser")))]
        {
            let _ = (file, prefer_push);
            Err(GmlError::NoParserAvailable)
        }
    }
}

/// Relaye un événement quick-xml vers la machine à états. Les noms
/// d'éléments sont réduits à leur nom local; les clés d'attributs gardent
/// leur préfixe (`gml:id` doit rester reconnaissable).
pub(crate) fn dispatch_event(
    core: &mut ReaderCore,
    event: Event<'_>,
    position: u64,
) -> Result<(), GmlError> {
    match event {
        Event::Start(e) => {
            let name = local_name(e.name())?;
            let attrs = collect_attributes(&e, position)?;
            core.start_element(&name, &attrs);
        }
        Event::Empty(e) => {
            let name = local_name(e.name())?;
            let attrs = collect_attributes(&e, position)?;
            core.start_element(&name, &attrs);
            core.end_element(&name);
        }
        Event::End(e) => {
            let name = local_name(e.name())?;
            core.end_element(&name);
        }
        Event::Text(t) => {
            let text = t
                .unescape()
                .map_err(|err| GmlError::xml(err.to_string(), position))?;
            core.characters(&text);
        }
        Event::CData(c) => {
            let raw = c.into_inner();
            core.characters(std::str::from_utf8(&raw)?);
        }
        _ => {}
    }
    Ok(())
}

fn local_name(name: QName<'_>) -> Result<String, GmlError> {
    Ok(std::str::from_utf8(name.local_name().as_ref())?.to_string())
}

fn collect_attributes(
    e: &BytesStart<'_>,
    position: u64,
) -> Result<Vec<(String, String)>, GmlError> {
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| GmlError::xml(err.to_string(), position))?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
        let value = attr
            .unescape_value()
            .map_err(|err| GmlError::xml(err.to_string(), position))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(attrs)
}
