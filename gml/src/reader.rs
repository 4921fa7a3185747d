//! Lecteur GML: façade publique, registre de classes, prescan et fichier
//! de classes

use std::fs::File;
use std::path::{Path, PathBuf};

use geo::HasDimensions;
use tracing::{debug, warn};

use crate::class::FeatureClass;
use crate::error::GmlError;
use crate::feature::Feature;
use crate::geometry::{self, GmlGeometryType};
use crate::handler::ReaderCore;
use crate::parser::XmlBackend;
use crate::srs;
use crate::xml::{self, XmlElement, XmlNode};

/// Options par instance du lecteur
#[derive(Debug, Clone, Copy, Default)]
pub struct GmlReaderOptions {
    /// Préférer le backend push quand les deux sont compilés
    pub prefer_push_parser: bool,
    /// Normaliser l'ordre des axes des SRS lat/long pendant le prescan
    pub invert_axis_order_if_lat_long: bool,
    /// Réécrire `EPSG:x` sous la forme URN OGC à l'ingestion
    pub consider_epsg_as_urn: bool,
}

/// Lecteur streaming de documents GML.
///
/// Le lecteur produit les features dans l'ordre du document via
/// [`next_feature`](Self::next_feature), en découvrant les classes et
/// leurs schémas au fil de la lecture. Un
/// [`prescan_for_schema`](Self::prescan_for_schema) parcourt le document
/// entier pour établir comptes, types de géométrie et étendues par
/// classe, et le registre peut être sauvé puis rechargé comme fichier de
/// classes XML.
///
/// Une instance n'est pas partageable entre threads et ne lit qu'un
/// document à la fois.
pub struct GmlReader {
    options: GmlReaderOptions,
    core: ReaderCore,
    backend: Option<XmlBackend>,
    filename: Option<PathBuf>,
    read_started: bool,
    global_srs_name: Option<String>,
    can_use_global_srs: bool,
}

impl GmlReader {
    /// Construit un lecteur. Échoue si aucun backend XML n'est compilé.
    ///
    /// Les options de processus `GML_FETCH_ALL_GEOMETRIES` et
    /// `GML_FIELDTYPES` sont lues dans l'environnement à cet instant.
    pub fn new(options: GmlReaderOptions) -> Result<Self, GmlError> {
        if cfg!(not(any(feature = "pull-parser", feature = "push-parser"))) {
            return Err(GmlError::NoParserAvailable);
        }

        let fetch_all = test_boolean(&config_option("GML_FETCH_ALL_GEOMETRIES", "NO"));
        let always_string =
            config_option("GML_FIELDTYPES", "").eq_ignore_ascii_case("ALWAYS_STRING");

        Ok(Self {
            options,
            core: ReaderCore::new(fetch_all, always_string),
            backend: None,
            filename: None,
            read_started: false,
            global_srs_name: None,
            can_use_global_srs: false,
        })
    }

    pub fn set_source_file(&mut self, path: impl Into<PathBuf>) {
        self.filename = Some(path.into());
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    /// Ouvre le fichier source et installe le backend XML avec un état
    /// sentinelle. Idempotent, apparié avec
    /// [`cleanup_parser`](Self::cleanup_parser).
    pub fn setup_parser(&mut self) -> Result<(), GmlError> {
        let Some(path) = self.filename.clone() else {
            return Err(GmlError::NoSource);
        };
        self.cleanup_parser();

        let file = File::open(&path)?;
        self.backend = Some(XmlBackend::create(file, self.options.prefer_push_parser)?);
        self.core.begin_document();
        self.read_started = false;
        Ok(())
    }

    /// Démonte le backend, draine les états partiels et oublie les
    /// features en attente. Idempotent.
    pub fn cleanup_parser(&mut self) {
        self.backend = None;
        self.core.cleanup();
        self.read_started = false;
    }

    /// Recommence la lecture au début du document et lève le filtre de
    /// classe
    pub fn reset_reading(&mut self) {
        self.cleanup_parser();
        self.core.filtered_class = None;
    }

    /// Restreint les features émises à la classe nommée; les autres sont
    /// ignorées sans être construites
    pub fn set_filtered_class_name(&mut self, name: Option<&str>) {
        self.core.filtered_class = name.map(str::to_string);
    }

    pub fn filtered_class_name(&self) -> Option<&str> {
        self.core.filtered_class.as_deref()
    }

    /// Vrai si le tokenizer s'est arrêté sur une erreur fatale; permet de
    /// distinguer une fin de flux d'un échec
    pub fn stopped_on_error(&self) -> bool {
        self.core.stop_parsing
    }

    /// Pose le SRS global, une seule fois: les appels suivants sont sans
    /// effet. `EPSG:x` devient l'URN OGC si l'option est active.
    pub fn set_global_srs_name(&mut self, srs_name: &str) {
        if self.global_srs_name.is_some() {
            return;
        }
        let stored = match srs_name.strip_prefix("EPSG:") {
            Some(code) if self.options.consider_epsg_as_urn => {
                format!("urn:ogc:def:crs:EPSG::{code}")
            }
            _ => srs_name.to_string(),
        };
        self.global_srs_name = Some(stored);
    }

    pub fn global_srs_name(&self) -> Option<&str> {
        self.global_srs_name.as_deref()
    }

    /// Vrai quand aucune feature du dernier prescan ne portait son propre
    /// SRS, auquel cas le SRS global fait foi
    pub fn can_use_global_srs(&self) -> bool {
        self.can_use_global_srs
    }

    /// Prochaine feature du document, `Ok(None)` en fin de flux. Une
    /// erreur du tokenizer arrête définitivement la lecture; les appels
    /// suivants drainent les features déjà terminées puis rendent
    /// `Ok(None)`.
    pub fn next_feature(&mut self) -> Result<Option<Feature>, GmlError> {
        if !self.read_started {
            if self.backend.is_none() {
                self.setup_parser()?;
            }
            self.read_started = true;
        }

        if self.core.stop_parsing {
            return Ok(self.core.pending.pop_front());
        }
        if let Some(feature) = self.core.pending.pop_front() {
            return Ok(Some(feature));
        }

        let core = &mut self.core;
        let result = match self.backend.as_mut() {
            #[cfg(feature = "pull-parser")]
            Some(XmlBackend::Pull(parser)) => loop {
                if !core.pending.is_empty() || core.stop_parsing {
                    break Ok(());
                }
                match parser.parse_next(core) {
                    Ok(true) => {}
                    Ok(false) => break Ok(()),
                    Err(e) => break Err(e),
                }
            },
            #[cfg(feature = "push-parser")]
            Some(XmlBackend::Push(parser)) => loop {
                if !core.pending.is_empty() || core.stop_parsing {
                    break Ok(());
                }
                match parser.pump(core) {
                    Ok(true) => {}
                    Ok(false) => break Ok(()),
                    Err(e) => break Err(e),
                }
            },
            #[allow(unreachable_patterns)]
            Some(_) => Err(GmlError::NoParserAvailable),
            None => Err(GmlError::NoSource),
        };

        if let Err(e) = result {
            self.core.stop_parsing = true;
            warn!(error = %e, "GML parsing aborted");
            return Err(e);
        }
        Ok(self.core.pending.pop_front())
    }

    // ---- registre de classes -------------------------------------------

    pub fn class_count(&self) -> usize {
        self.core.classes.len()
    }

    pub fn class(&self, index: usize) -> Option<&FeatureClass> {
        self.core.classes.get(index)
    }

    /// Recherche par nom de classe, insensible à la casse
    pub fn class_by_name(&self, name: &str) -> Option<&FeatureClass> {
        self.core
            .classes
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
    }

    pub fn classes(&self) -> &[FeatureClass] {
        &self.core.classes
    }

    /// Ajoute une classe au registre; son nom doit être inédit
    pub fn add_class(&mut self, class: FeatureClass) -> usize {
        debug_assert!(self.class_by_name(class.name()).is_none());
        self.core.classes.push(class);
        self.core.classes.len() - 1
    }

    pub fn clear_classes(&mut self) {
        self.core.classes.clear();
    }

    pub fn is_class_list_locked(&self) -> bool {
        self.core.class_list_locked
    }

    /// Gèle le registre: plus aucune classe n'est créée à la lecture
    pub fn set_class_list_locked(&mut self, locked: bool) {
        self.core.class_list_locked = locked;
    }

    // ---- prescan -------------------------------------------------------

    /// Parcourt tout le document pour établir les schémas: comptes de
    /// features par classe et, si `get_extents`, types de géométrie,
    /// étendues et SRS. Les features elles-mêmes sont jetées. Retourne
    /// vrai si au moins une classe a été découverte.
    pub fn prescan_for_schema(&mut self, get_extents: bool) -> Result<bool, GmlError> {
        if self.filename.is_none() {
            return Ok(false);
        }

        self.set_class_list_locked(false);
        self.clear_classes();
        self.setup_parser()?;
        self.can_use_global_srs = true;

        let result = self.prescan_loop(get_extents);
        self.cleanup_parser();
        result?;

        Ok(self.class_count() > 0)
    }

    fn prescan_loop(&mut self, get_extents: bool) -> Result<(), GmlError> {
        while let Some(feature) = self.next_feature()? {
            let class_index = feature.class_index();
            {
                let Some(class) = self.core.classes.get_mut(class_index) else {
                    continue;
                };
                let count = class.feature_count();
                class.set_feature_count(if count < 0 { 1 } else { count + 1 });
            }

            if !get_extents {
                continue;
            }

            let built = geometry::build_geometry_from_list(
                feature.geometry_list(),
                true,
                self.options.invert_axis_order_if_lat_long,
                self.options.consider_epsg_as_urn,
            );

            let srs_name = if built.is_some() {
                geometry::extract_srs_name_from_list(
                    feature.geometry_list(),
                    self.options.consider_epsg_as_urn,
                )
            } else {
                None
            };
            if srs_name.is_some() {
                self.can_use_global_srs = false;
            }

            let Some(class) = self.core.classes.get_mut(class_index) else {
                continue;
            };
            match built {
                Some(built_geometry) => {
                    class.merge_srs_name(srs_name.as_deref());

                    let mut current = class.geometry_type();
                    if class.feature_count() == 1 && current == GmlGeometryType::Unknown {
                        current = GmlGeometryType::None;
                    }
                    class.set_geometry_type(geometry::merge_geometry_types(
                        current,
                        geometry::geometry_type_of(&built_geometry),
                    ));

                    if !built_geometry.is_empty() {
                        if let Some(envelope) = geometry::envelope(&built_geometry) {
                            class.extend_extents(&envelope);
                        }
                    }
                }
                None => {
                    // feature sans géométrie
                    if class.geometry_type() == GmlGeometryType::Unknown {
                        class.set_geometry_type(GmlGeometryType::None);
                    }
                }
            }
        }

        self.apply_global_srs();
        Ok(())
    }

    /// Applique le SRS global aux classes qui n'en ont pas vu d'autre,
    /// puis normalise l'ordre des axes lat/long si demandé
    fn apply_global_srs(&mut self) {
        for class in &mut self.core.classes {
            if self.can_use_global_srs {
                if let Some(global) = &self.global_srs_name {
                    class.set_srs_name(global.clone());
                }
            }

            let Some(srs_name) = class.srs_name() else {
                continue;
            };
            if !self.options.invert_axis_order_if_lat_long || !srs::is_lat_long_order(srs_name) {
                continue;
            }

            if let Some(normalized) = srs::normalize_axis_order(srs_name) {
                class.set_srs_name(normalized);
            }
            // les étendues ont été accumulées avant de connaître le SRS
            // effectif: leur ordre d'axes doit être corrigé
            if self.can_use_global_srs {
                if let Some(extents) = class.extents() {
                    class.set_extents(extents.swapped_axes());
                }
            }
        }
    }

    // ---- fichier de classes --------------------------------------------

    /// Charge un fichier `GMLFeatureClassList`, ajoute les classes en
    /// schéma verrouillé, puis gèle le registre. En cas d'échec, le
    /// registre n'est pas modifié.
    pub fn load_classes(&mut self, path: &Path) -> Result<(), GmlError> {
        let path_display = path.display().to_string();
        let text = std::fs::read_to_string(path)?;

        if !text.contains("<GMLFeatureClassList>") {
            return Err(GmlError::invalid_class_file(
                path_display,
                "does not contain a GMLFeatureClassList tree",
            ));
        }

        let root = xml::parse_document(&text)?;
        if root.name != "GMLFeatureClassList" {
            return Err(GmlError::invalid_class_file(
                path_display,
                "root element is not GMLFeatureClassList",
            ));
        }

        let mut loaded = Vec::new();
        for child in root.children_named("GMLFeatureClass") {
            let mut class = FeatureClass::from_xml(child)?;
            class.set_schema_locked(true);
            loaded.push(class);
        }

        debug!(file = %path_display, classes = loaded.len(), "Feature classes loaded");
        for class in loaded {
            self.add_class(class);
        }
        self.set_class_list_locked(true);
        Ok(())
    }

    /// Sauve le registre sous forme de fichier `GMLFeatureClassList`
    pub fn save_classes(&mut self, path: &Path) -> Result<(), GmlError> {
        let mut root = XmlElement::new("GMLFeatureClassList");
        for class in &self.core.classes {
            root.children.push(XmlNode::Element(class.to_xml()));
        }
        let text = xml::serialize_document(&root)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

/// Option de processus, à la clé donnée, avec défaut
fn config_option(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn test_boolean(value: &str) -> bool {
    matches!(
        value.to_ascii_uppercase().as_str(),
        "YES" | "TRUE" | "ON" | "1"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_values() {
        assert!(test_boolean("YES"));
        assert!(test_boolean("true"));
        assert!(test_boolean("1"));
        assert!(!test_boolean("NO"));
        assert!(!test_boolean(""));
    }

    #[test]
    fn test_global_srs_is_one_shot() {
        let mut reader = GmlReader::new(GmlReaderOptions::default()).unwrap();
        reader.set_global_srs_name("EPSG:2154");
        reader.set_global_srs_name("EPSG:4326");
        assert_eq!(reader.global_srs_name(), Some("EPSG:2154"));
    }

    #[test]
    fn test_global_srs_epsg_as_urn() {
        let mut reader = GmlReader::new(GmlReaderOptions {
            consider_epsg_as_urn: true,
            ..Default::default()
        })
        .unwrap();
        reader.set_global_srs_name("EPSG:4326");
        assert_eq!(
            reader.global_srs_name(),
            Some("urn:ogc:def:crs:EPSG::4326")
        );
    }

    #[test]
    fn test_next_feature_without_source() {
        let mut reader = GmlReader::new(GmlReaderOptions::default()).unwrap();
        assert!(matches!(reader.next_feature(), Err(GmlError::NoSource)));
    }

    #[test]
    fn test_prescan_without_source_finds_nothing() {
        let mut reader = GmlReader::new(GmlReaderOptions::default()).unwrap();
        assert!(!reader.prescan_for_schema(true).unwrap());
    }

    #[test]
    fn test_class_registry() {
        let mut reader = GmlReader::new(GmlReaderOptions::default()).unwrap();
        let index = reader.add_class(FeatureClass::new("Road"));
        assert_eq!(index, 0);
        assert_eq!(reader.class_count(), 1);
        assert!(reader.class_by_name("ROAD").is_some());
        assert!(reader.class_by_name("River").is_none());
        reader.clear_classes();
        assert_eq!(reader.class_count(), 0);
    }
}
