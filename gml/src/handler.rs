//! Machine à états SAX: classification des éléments et construction des
//! features au fil des événements

use std::collections::VecDeque;

use tracing::debug;

use crate::class::{FeatureClass, PropertyDefn, PropertyType};
use crate::feature::Feature;
use crate::state::ReadState;
use crate::xml::{XmlElement, XmlNode};

/// Vocabulaire géométrique GML reconnu au niveau d'une feature
const GEOMETRY_ELEMENTS: &[&str] = &[
    "Point",
    "LineString",
    "LinearRing",
    "Polygon",
    "PolygonPatch",
    "MultiPoint",
    "MultiLineString",
    "MultiPolygon",
    "MultiGeometry",
    "GeometryCollection",
    "Curve",
    "MultiCurve",
    "Surface",
    "MultiSurface",
    "Solid",
    "MultiSolid",
    "Box",
    "Envelope",
];

fn is_gml_geometry_element(element: &str) -> bool {
    GEOMETRY_ELEMENTS.contains(&element)
}

/// Capture de texte ou de sous-arbre en cours
#[derive(Debug, Default)]
enum Capture {
    #[default]
    None,
    /// Texte d'un élément attribut; `armed_len` est la profondeur du
    /// chemin au moment de l'armement
    Property { armed_len: usize, text: String },
    /// Attribut générique CityGML; la valeur vient de l'enfant `<value>`
    CityGmlAttribute {
        src_element: String,
        armed_len: usize,
        in_value: bool,
        value: Option<String>,
        buf: String,
    },
    /// Enregistrement d'un sous-arbre de géométrie
    Geometry { stack: Vec<XmlElement> },
}

/// État partagé du lecteur, mutée exclusivement par les événements SAX.
/// Contient le registre de classes, la pile d'états et la file des
/// features terminées en attente de livraison.
#[derive(Debug)]
pub(crate) struct ReaderCore {
    pub classes: Vec<FeatureClass>,
    pub class_list_locked: bool,
    pub pending: VecDeque<Feature>,
    pub stop_parsing: bool,
    pub filtered_class: Option<String>,
    states: Vec<ReadState>,
    capture: Capture,
    fetch_all_geometries: bool,
    always_string_fields: bool,
}

impl ReaderCore {
    pub fn new(fetch_all_geometries: bool, always_string_fields: bool) -> Self {
        Self {
            classes: Vec::new(),
            class_list_locked: false,
            pending: VecDeque::new(),
            stop_parsing: false,
            filtered_class: None,
            states: Vec::new(),
            capture: Capture::None,
            fetch_all_geometries,
            always_string_fields,
        }
    }

    /// Vide la pile d'états, la capture en cours et les features en
    /// attente. Les classes découvertes sont conservées.
    pub fn cleanup(&mut self) {
        self.states.clear();
        self.capture = Capture::None;
        self.pending.clear();
    }

    /// Prépare un nouveau parcours: état sentinelle et drapeaux remis à
    /// zéro
    pub fn begin_document(&mut self) {
        self.cleanup();
        self.stop_parsing = false;
        self.states.push(ReadState::new());
    }

    pub fn start_element(&mut self, element: &str, attrs: &[(String, String)]) {
        if self.states.is_empty() {
            return;
        }

        match &mut self.capture {
            Capture::Geometry { stack } => {
                stack.push(XmlElement::with_attributes(element, attrs));
                return;
            }
            Capture::CityGmlAttribute {
                armed_len,
                in_value,
                ..
            } => {
                let Some(state) = self.states.last_mut() else {
                    return;
                };
                if element == "value" && state.path_len() == *armed_len {
                    *in_value = true;
                }
                state.push_path(element);
                return;
            }
            Capture::Property { .. } | Capture::None => {}
        }

        if self.is_feature_element(element) {
            let fid = attr_value(attrs, "fid").or_else(|| attr_value(attrs, "gml:id"));
            self.capture = Capture::None;
            self.push_feature(element, fid);
            return;
        }

        let in_feature = self
            .states
            .last()
            .is_some_and(|state| state.feature.is_some());
        if in_feature {
            if let Some(src_element) = self.citygml_attribute_target(element, attrs) {
                let Some(state) = self.states.last_mut() else {
                    return;
                };
                state.push_path(element);
                let armed_len = state.path_len();
                self.capture = Capture::CityGmlAttribute {
                    src_element,
                    armed_len,
                    in_value: false,
                    value: None,
                    buf: String::new(),
                };
                return;
            }
            if is_gml_geometry_element(element) {
                self.capture = Capture::Geometry {
                    stack: vec![XmlElement::with_attributes(element, attrs)],
                };
                return;
            }
            if self.is_attribute_element(element) {
                let Some(state) = self.states.last_mut() else {
                    return;
                };
                state.push_path(element);
                let armed_len = state.path_len();
                self.capture = Capture::Property {
                    armed_len,
                    text: String::new(),
                };
                return;
            }
        }

        if let Some(state) = self.states.last_mut() {
            state.push_path(element);
        }
    }

    pub fn end_element(&mut self, _element: &str) {
        if self.states.is_empty() {
            return;
        }

        match std::mem::take(&mut self.capture) {
            Capture::Geometry { mut stack } => {
                if stack.len() > 1 {
                    if let Some(done) = stack.pop() {
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(XmlNode::Element(done));
                        }
                    }
                    self.capture = Capture::Geometry { stack };
                } else if let Some(root) = stack.pop() {
                    self.attach_geometry(root);
                }
                return;
            }
            Capture::CityGmlAttribute {
                src_element,
                armed_len,
                mut in_value,
                mut value,
                mut buf,
            } => {
                let path_len = self.states.last().map(|s| s.path_len()).unwrap_or(0);
                if path_len == armed_len {
                    // fermeture de l'élément *Attribute lui-même
                    if let Some(v) = value {
                        self.set_feature_property(&src_element, &v);
                    }
                    if let Some(state) = self.states.last_mut() {
                        state.pop_path();
                    }
                } else {
                    if in_value && path_len == armed_len + 1 {
                        value = Some(std::mem::take(&mut buf));
                        in_value = false;
                    }
                    if let Some(state) = self.states.last_mut() {
                        state.pop_path();
                    }
                    self.capture = Capture::CityGmlAttribute {
                        src_element,
                        armed_len,
                        in_value,
                        value,
                        buf,
                    };
                }
                return;
            }
            Capture::Property { armed_len, text } => {
                let path_len = self.states.last().map(|s| s.path_len()).unwrap_or(0);
                if path_len == armed_len {
                    let path = self
                        .states
                        .last()
                        .map(|s| s.path_string().to_string())
                        .unwrap_or_default();
                    self.set_feature_property(&path, &text);
                    if let Some(state) = self.states.last_mut() {
                        state.pop_path();
                    }
                } else {
                    // élément imbriqué non reconnu, dépilé sans émettre
                    if let Some(state) = self.states.last_mut() {
                        state.pop_path();
                    }
                    self.capture = Capture::Property { armed_len, text };
                }
                return;
            }
            Capture::None => {}
        }

        let Some(state) = self.states.last_mut() else {
            return;
        };
        if state.path_len() > 0 {
            state.pop_path();
        } else if state.feature.is_some() {
            // fermeture de l'élément de feature: la feature est terminée
            self.pop_state();
        }
    }

    pub fn characters(&mut self, data: &str) {
        match &mut self.capture {
            Capture::Property { text, .. } => text.push_str(data),
            Capture::CityGmlAttribute {
                in_value: true,
                buf,
                ..
            } => buf.push_str(data),
            Capture::Geometry { stack } => {
                if let Some(top) = stack.last_mut() {
                    top.push_text(data);
                }
            }
            _ => {}
        }
    }

    /// L'élément ouvre-t-il une nouvelle feature dans le contexte courant?
    fn is_feature_element(&self, element: &str) -> bool {
        let last = self
            .states
            .last()
            .map(|s| s.last_component())
            .unwrap_or("");

        let recognized =
            // dialecte polonais TBD: les enfants de <dane> sont des features
            last == "dane"
            // OpenLS
            || (last == "GeocodeResponseList" && element == "GeocodedAddress")
            || (last == "DetermineRouteResponse" && element != "RouteInstructionsList")
            || (last == "RouteInstructionsList" && element == "RouteInstruction")
            // réponse GetFeatureInfo de MapServer WMS
            || (last.len() > 6
                && element.len() > 8
                && last.ends_with("_layer")
                && element.ends_with("_feature"))
            || has_member_suffix(last);
        if !recognized {
            return false;
        }

        if self.class_list_locked
            && !self
                .classes
                .iter()
                .any(|c| c.element_name().eq_ignore_ascii_case(element))
        {
            return false;
        }

        if let Some(filter) = &self.filtered_class {
            let class_name = self
                .classes
                .iter()
                .find(|c| c.element_name().eq_ignore_ascii_case(element))
                .map(|c| c.name())
                .unwrap_or(element);
            if !class_name.eq_ignore_ascii_case(filter) {
                return false;
            }
        }

        true
    }

    /// Cible d'un attribut générique CityGML (`stringAttribute`,
    /// `intAttribute`, `doubleAttribute` portant un attribut `name`)
    fn citygml_attribute_target(
        &self,
        element: &str,
        attrs: &[(String, String)],
    ) -> Option<String> {
        if !matches!(element, "stringAttribute" | "intAttribute" | "doubleAttribute") {
            return None;
        }
        let feature = self.states.last()?.feature.as_ref()?;
        let name = attr_value(attrs, "name")?;

        let class = self.classes.get(feature.class_index())?;
        if !class.is_schema_locked() || class.property_index_by_src(&name).is_some() {
            Some(name)
        } else {
            None
        }
    }

    /// L'élément est-il un candidat propriété au chemin courant?
    fn is_attribute_element(&self, element: &str) -> bool {
        let Some(state) = self.states.last() else {
            return false;
        };
        let Some(feature) = state.feature.as_ref() else {
            return false;
        };
        let Some(class) = self.classes.get(feature.class_index()) else {
            return false;
        };

        // schéma ouvert: tout élément simple est un candidat
        if !class.is_schema_locked() {
            return true;
        }

        let path = if state.path_len() == 0 {
            element.to_string()
        } else {
            format!("{}|{}", state.path_string(), element)
        };
        class.property_index_by_src(&path).is_some()
    }

    /// Crée la feature (et sa classe au besoin) et empile son état
    fn push_feature(&mut self, element: &str, fid: Option<String>) {
        let class_index = match self
            .classes
            .iter()
            .position(|c| c.element_name().eq_ignore_ascii_case(element))
        {
            Some(index) => index,
            None => {
                debug_assert!(!self.class_list_locked);
                self.classes.push(FeatureClass::new(element));
                self.classes.len() - 1
            }
        };

        let mut feature = Feature::new(class_index, self.classes[class_index].name().to_string());
        if let Some(fid) = fid {
            feature.set_fid(fid);
        }

        let mut state = ReadState::new();
        state.feature = Some(feature);
        self.states.push(state);
    }

    /// Dépile l'état courant; une feature portée par l'état est émise
    /// dans la file des features terminées
    fn pop_state(&mut self) {
        if let Some(state) = self.states.pop() {
            if let Some(feature) = state.feature {
                self.pending.push_back(feature);
            }
        }
    }

    fn attach_geometry(&mut self, root: XmlElement) {
        let fetch_all = self.fetch_all_geometries;
        let Some(feature) = self.states.last_mut().and_then(|s| s.feature.as_mut()) else {
            return;
        };
        if fetch_all || feature.geometry_list().is_empty() {
            feature.add_geometry(root);
        } else {
            debug!(
                element = %root.name,
                "Extra geometry fragment dropped, set GML_FETCH_ALL_GEOMETRIES to keep all"
            );
        }
    }

    /// Pose une valeur de propriété sur la feature courante, en créant la
    /// propriété dans la classe si le schéma est ouvert
    pub(crate) fn set_feature_property(&mut self, elem_path: &str, value: &str) {
        let Some(class_index) = self
            .states
            .last()
            .and_then(|s| s.feature.as_ref())
            .map(|f| f.class_index())
        else {
            debug_assert!(false, "valeur de propriété sans feature courante");
            return;
        };
        let Some(class) = self.classes.get_mut(class_index) else {
            return;
        };

        let prop_index = match class.property_index_by_src(elem_path) {
            Some(index) => index,
            None => {
                if class.is_schema_locked() {
                    debug!(
                        element = elem_path,
                        class = class.name(),
                        "Property missing from locked schema, value dropped"
                    );
                    return;
                }

                // nom de champ: dernier composant du chemin, ou le chemin
                // entier s'il entre en conflit avec un champ existant
                let mut field_name = match elem_path.rfind('|') {
                    None => elem_path.to_string(),
                    Some(pos) => {
                        let tail = &elem_path[pos + 1..];
                        if class.property_index(tail).is_some() {
                            elem_path.to_string()
                        } else {
                            tail.to_string()
                        }
                    }
                };
                while class.property_index(&field_name).is_some() {
                    field_name.push('_');
                }

                let mut defn = PropertyDefn::new(field_name, elem_path);
                if self.always_string_fields {
                    defn.set_type(PropertyType::String);
                }
                class.add_property(defn)
            }
        };

        if !class.is_schema_locked() {
            class.property_mut(prop_index).analyse_property_value(value);
        }

        if let Some(feature) = self.states.last_mut().and_then(|s| s.feature.as_mut()) {
            feature.set_property(prop_index, value.to_string());
        }
    }
}

fn attr_value(attrs: &[(String, String)], name: &str) -> Option<String> {
    attrs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.clone())
}

/// Suffixe `member`/`members` (insensible à la casse), la convention des
/// conteneurs de features GML
fn has_member_suffix(name: &str) -> bool {
    if name.len() < 6 {
        return false;
    }
    let lower = name.to_ascii_lowercase();
    lower.ends_with("member") || lower.ends_with("members")
}
