//! Classes de features et schémas de propriétés découverts dynamiquement

use crate::error::GmlError;
use crate::geometry::GmlGeometryType;
use crate::xml::{XmlElement, XmlNode};

/// Type d'une propriété. Le type s'élargit au fil des valeurs rencontrées
/// et ne se rétrécit jamais; `String` et `StringList` sont terminaux.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropertyType {
    /// Aucune valeur analysée pour l'instant; lu comme une chaîne
    #[default]
    Untyped,
    String,
    Integer,
    Real,
    StringList,
    IntegerList,
    RealList,
}

impl PropertyType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Untyped => "Untyped",
            Self::String => "String",
            Self::Integer => "Integer",
            Self::Real => "Real",
            Self::StringList => "StringList",
            Self::IntegerList => "IntegerList",
            Self::RealList => "RealList",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            _ if name.eq_ignore_ascii_case("Untyped") => Some(Self::Untyped),
            _ if name.eq_ignore_ascii_case("String") => Some(Self::String),
            _ if name.eq_ignore_ascii_case("Integer") => Some(Self::Integer),
            _ if name.eq_ignore_ascii_case("Real") => Some(Self::Real),
            _ if name.eq_ignore_ascii_case("StringList") => Some(Self::StringList),
            _ if name.eq_ignore_ascii_case("IntegerList") => Some(Self::IntegerList),
            _ if name.eq_ignore_ascii_case("RealList") => Some(Self::RealList),
            _ => None,
        }
    }

    fn parts(self) -> (u8, bool) {
        match self {
            Self::Untyped => (0, false),
            Self::Integer => (1, false),
            Self::Real => (2, false),
            Self::String => (3, false),
            Self::IntegerList => (1, true),
            Self::RealList => (2, true),
            Self::StringList => (3, true),
        }
    }

    fn compose(rank: u8, list: bool) -> Self {
        match (rank, list) {
            (0, _) => Self::Untyped,
            (1, false) => Self::Integer,
            (2, false) => Self::Real,
            (1, true) => Self::IntegerList,
            (2, true) => Self::RealList,
            (_, false) => Self::String,
            (_, true) => Self::StringList,
        }
    }

    fn widen(self, value_rank: u8, value_is_list: bool) -> Self {
        let (rank, list) = self.parts();
        Self::compose(rank.max(value_rank), list || value_is_list)
    }
}

/// Définition d'une propriété dans le schéma d'une classe
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDefn {
    name: String,
    src_element: String,
    prop_type: PropertyType,
}

impl PropertyDefn {
    pub fn new(name: impl Into<String>, src_element: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            src_element: src_element.into(),
            prop_type: PropertyType::Untyped,
        }
    }

    /// Nom de champ visible, unique dans sa classe
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Chemin d'élément source (nom simple ou chemin joint par `|`)
    pub fn src_element(&self) -> &str {
        &self.src_element
    }

    pub fn prop_type(&self) -> PropertyType {
        self.prop_type
    }

    pub fn set_type(&mut self, prop_type: PropertyType) {
        self.prop_type = prop_type;
    }

    /// Raffine le type d'après une valeur observée. Les valeurs vides ne
    /// changent rien; un élargissement n'est jamais annulé.
    pub fn analyse_property_value(&mut self, value: &str) {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return;
        }

        let mut token_count = 0usize;
        let mut widest = 0u8;
        for token in trimmed.split_whitespace() {
            token_count += 1;
            widest = widest.max(classify_token(token));
        }

        self.prop_type = self.prop_type.widen(widest, token_count > 1);
    }
}

/// 1 = entier, 2 = réel, 3 = chaîne
fn classify_token(token: &str) -> u8 {
    if is_integer_token(token) {
        return 1;
    }
    match fast_float::parse::<f64, _>(token) {
        Ok(v) if v.is_finite() => 2,
        _ => 3,
    }
}

fn is_integer_token(token: &str) -> bool {
    let digits = token
        .strip_prefix('-')
        .or_else(|| token.strip_prefix('+'))
        .unwrap_or(token);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Étendue géographique d'une classe, dans l'ordre d'axes natif du SRS
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extents {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Extents {
    pub fn merge(&mut self, other: &Extents) {
        self.x_min = self.x_min.min(other.x_min);
        self.x_max = self.x_max.max(other.x_max);
        self.y_min = self.y_min.min(other.y_min);
        self.y_max = self.y_max.max(other.y_max);
    }

    /// Échange les axes x et y
    pub fn swapped_axes(self) -> Self {
        Self {
            x_min: self.y_min,
            x_max: self.y_max,
            y_min: self.x_min,
            y_max: self.x_max,
        }
    }
}

/// Classe de features, créée au premier élément d'un nouveau genre ou
/// chargée depuis un fichier de classes
#[derive(Debug, Clone)]
pub struct FeatureClass {
    name: String,
    element_name: String,
    properties: Vec<PropertyDefn>,
    schema_locked: bool,
    feature_count: i64,
    geometry_type: GmlGeometryType,
    extents: Option<Extents>,
    srs_name: Option<String>,
    srs_consistent: bool,
}

impl FeatureClass {
    pub fn new(element_name: impl Into<String>) -> Self {
        let element_name = element_name.into();
        Self {
            name: element_name.clone(),
            element_name,
            properties: Vec::new(),
            schema_locked: false,
            feature_count: -1,
            geometry_type: GmlGeometryType::Unknown,
            extents: None,
            srs_name: None,
            srs_consistent: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Nom local de l'élément XML qui déclenche cette classe
    pub fn element_name(&self) -> &str {
        &self.element_name
    }

    pub fn is_schema_locked(&self) -> bool {
        self.schema_locked
    }

    pub fn set_schema_locked(&mut self, locked: bool) {
        self.schema_locked = locked;
    }

    /// Nombre de features comptées, ou -1 si inconnu
    pub fn feature_count(&self) -> i64 {
        self.feature_count
    }

    pub fn set_feature_count(&mut self, count: i64) {
        self.feature_count = count;
    }

    pub fn geometry_type(&self) -> GmlGeometryType {
        self.geometry_type
    }

    pub fn set_geometry_type(&mut self, geometry_type: GmlGeometryType) {
        self.geometry_type = geometry_type;
    }

    pub fn extents(&self) -> Option<Extents> {
        self.extents
    }

    pub fn set_extents(&mut self, extents: Extents) {
        self.extents = Some(extents);
    }

    /// Fusionne une enveloppe dans l'étendue de la classe
    pub fn extend_extents(&mut self, envelope: &Extents) {
        match &mut self.extents {
            Some(current) => current.merge(envelope),
            None => self.extents = Some(*envelope),
        }
    }

    pub fn srs_name(&self) -> Option<&str> {
        self.srs_name.as_deref()
    }

    pub fn set_srs_name(&mut self, srs_name: impl Into<String>) {
        self.srs_name = Some(srs_name.into());
        self.srs_consistent = true;
    }

    /// Retient le premier SRS distinct rencontré. Un second SRS différent
    /// marque la classe comme ambiguë et efface le SRS retenu.
    pub fn merge_srs_name(&mut self, srs_name: Option<&str>) {
        if !self.srs_consistent {
            return;
        }
        match (&self.srs_name, srs_name) {
            (None, Some(new)) => self.srs_name = Some(new.to_string()),
            (None, None) => {}
            (Some(current), new) => {
                if new != Some(current.as_str()) {
                    self.srs_consistent = false;
                    self.srs_name = None;
                }
            }
        }
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    pub fn property(&self, index: usize) -> Option<&PropertyDefn> {
        self.properties.get(index)
    }

    pub(crate) fn property_mut(&mut self, index: usize) -> &mut PropertyDefn {
        &mut self.properties[index]
    }

    pub fn properties(&self) -> &[PropertyDefn] {
        &self.properties
    }

    /// Index d'une propriété par nom de champ
    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name() == name)
    }

    /// Index d'une propriété par chemin d'élément source
    pub fn property_index_by_src(&self, src_element: &str) -> Option<usize> {
        self.properties
            .iter()
            .position(|p| p.src_element() == src_element)
    }

    /// Ajoute une propriété et retourne son index. Le nom de champ et le
    /// chemin source doivent être uniques dans la classe.
    pub fn add_property(&mut self, defn: PropertyDefn) -> usize {
        debug_assert!(self.property_index(defn.name()).is_none());
        debug_assert!(self.property_index_by_src(defn.src_element()).is_none());
        self.properties.push(defn);
        self.properties.len() - 1
    }

    /// Construit une classe depuis un sous-arbre `GMLFeatureClass`
    pub fn from_xml(elem: &XmlElement) -> Result<Self, GmlError> {
        let name = elem
            .child_text("Name")
            .filter(|n| !n.is_empty())
            .ok_or_else(|| GmlError::ClassDefinition("missing <Name> element".to_string()))?;
        let element_name = elem
            .child_text("ElementPath")
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| name.clone());

        let mut class = FeatureClass::new(element_name);
        class.set_name(name);

        if let Some(gtype) = elem.child_text("GeometryType") {
            class.geometry_type = GmlGeometryType::from_name(&gtype).ok_or_else(|| {
                GmlError::ClassDefinition(format!("unknown geometry type `{gtype}`"))
            })?;
        }
        if let Some(srs) = elem.child_text("SRSName").filter(|s| !s.is_empty()) {
            class.srs_name = Some(srs);
        }

        if let Some(info) = elem.child("DatasetSpecificInfo") {
            if let Some(count) = info.child_text("FeatureCount") {
                class.feature_count = count.parse().map_err(|_| {
                    GmlError::ClassDefinition(format!("invalid feature count `{count}`"))
                })?;
            }
            let corner = |name: &str| -> Option<f64> {
                info.child_text(name).and_then(|t| t.parse().ok())
            };
            if let (Some(x_min), Some(x_max), Some(y_min), Some(y_max)) = (
                corner("ExtentXMin"),
                corner("ExtentXMax"),
                corner("ExtentYMin"),
                corner("ExtentYMax"),
            ) {
                class.extents = Some(Extents {
                    x_min,
                    x_max,
                    y_min,
                    y_max,
                });
            }
        }

        for prop in elem.children_named("PropertyDefn") {
            let prop_name = prop
                .child_text("Name")
                .filter(|n| !n.is_empty())
                .ok_or_else(|| {
                    GmlError::ClassDefinition("property without <Name> element".to_string())
                })?;
            let src = prop
                .child_text("ElementPath")
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| prop_name.clone());
            if class.property_index(&prop_name).is_some()
                || class.property_index_by_src(&src).is_some()
            {
                return Err(GmlError::ClassDefinition(format!(
                    "duplicate property `{prop_name}`"
                )));
            }
            let mut defn = PropertyDefn::new(prop_name, src);
            if let Some(type_name) = prop.child_text("Type") {
                defn.prop_type = PropertyType::from_name(&type_name).ok_or_else(|| {
                    GmlError::ClassDefinition(format!("unknown property type `{type_name}`"))
                })?;
            }
            class.properties.push(defn);
        }

        Ok(class)
    }

    /// Sérialise la classe en sous-arbre `GMLFeatureClass`
    pub fn to_xml(&self) -> XmlElement {
        let mut elem = XmlElement::new("GMLFeatureClass");
        elem.children
            .push(XmlNode::Element(XmlElement::with_text("Name", &self.name)));
        elem.children.push(XmlNode::Element(XmlElement::with_text(
            "ElementPath",
            &self.element_name,
        )));
        if self.geometry_type != GmlGeometryType::Unknown {
            elem.children.push(XmlNode::Element(XmlElement::with_text(
                "GeometryType",
                self.geometry_type.name(),
            )));
        }
        if let Some(srs) = &self.srs_name {
            elem.children
                .push(XmlNode::Element(XmlElement::with_text("SRSName", srs)));
        }

        if self.feature_count >= 0 || self.extents.is_some() {
            let mut info = XmlElement::new("DatasetSpecificInfo");
            if self.feature_count >= 0 {
                info.children.push(XmlNode::Element(XmlElement::with_text(
                    "FeatureCount",
                    self.feature_count.to_string(),
                )));
            }
            if let Some(ext) = &self.extents {
                for (name, value) in [
                    ("ExtentXMin", ext.x_min),
                    ("ExtentXMax", ext.x_max),
                    ("ExtentYMin", ext.y_min),
                    ("ExtentYMax", ext.y_max),
                ] {
                    info.children.push(XmlNode::Element(XmlElement::with_text(
                        name,
                        format!("{value}"),
                    )));
                }
            }
            elem.children.push(XmlNode::Element(info));
        }

        for prop in &self.properties {
            let mut defn = XmlElement::new("PropertyDefn");
            defn.children
                .push(XmlNode::Element(XmlElement::with_text("Name", prop.name())));
            defn.children.push(XmlNode::Element(XmlElement::with_text(
                "ElementPath",
                prop.src_element(),
            )));
            defn.children.push(XmlNode::Element(XmlElement::with_text(
                "Type",
                prop.prop_type().name(),
            )));
            elem.children.push(XmlNode::Element(defn));
        }

        elem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysed(values: &[&str]) -> PropertyType {
        let mut defn = PropertyDefn::new("p", "p");
        for value in values {
            defn.analyse_property_value(value);
        }
        defn.prop_type()
    }

    #[test]
    fn test_widening_scalar() {
        assert_eq!(analysed(&["1"]), PropertyType::Integer);
        assert_eq!(analysed(&["1", "2.5"]), PropertyType::Real);
        assert_eq!(analysed(&["1", "2.5", "x"]), PropertyType::String);
        assert_eq!(analysed(&["-12"]), PropertyType::Integer);
        assert_eq!(analysed(&["+3"]), PropertyType::Integer);
        assert_eq!(analysed(&["abc"]), PropertyType::String);
        assert_eq!(analysed(&["1e3"]), PropertyType::Real);
    }

    #[test]
    fn test_widening_never_narrows() {
        assert_eq!(analysed(&["x", "1"]), PropertyType::String);
        assert_eq!(analysed(&["2.5", "1"]), PropertyType::Real);
        assert_eq!(analysed(&["a b", "1"]), PropertyType::StringList);
    }

    #[test]
    fn test_widening_lists() {
        assert_eq!(analysed(&["1 2 3"]), PropertyType::IntegerList);
        assert_eq!(analysed(&["1 2.5"]), PropertyType::RealList);
        assert_eq!(analysed(&["a b"]), PropertyType::StringList);
        // un scalaire ultérieur reste dans la variante liste
        assert_eq!(analysed(&["1 2", "3"]), PropertyType::IntegerList);
        assert_eq!(analysed(&["1 2", "x"]), PropertyType::StringList);
    }

    #[test]
    fn test_empty_values_ignored() {
        assert_eq!(analysed(&[""]), PropertyType::Untyped);
        assert_eq!(analysed(&["   \n "]), PropertyType::Untyped);
        assert_eq!(analysed(&["1", ""]), PropertyType::Integer);
    }

    #[test]
    fn test_merge_srs_name() {
        let mut class = FeatureClass::new("Road");
        class.merge_srs_name(None);
        assert_eq!(class.srs_name(), None);

        class.merge_srs_name(Some("EPSG:4326"));
        assert_eq!(class.srs_name(), Some("EPSG:4326"));

        class.merge_srs_name(Some("EPSG:4326"));
        assert_eq!(class.srs_name(), Some("EPSG:4326"));

        // un SRS différent rend la classe ambiguë
        class.merge_srs_name(Some("EPSG:2154"));
        assert_eq!(class.srs_name(), None);

        // et l'ambiguïté est définitive
        class.merge_srs_name(Some("EPSG:4326"));
        assert_eq!(class.srs_name(), None);
    }

    #[test]
    fn test_extents_merge_and_swap() {
        let mut class = FeatureClass::new("Road");
        class.extend_extents(&Extents {
            x_min: 1.0,
            x_max: 2.0,
            y_min: 10.0,
            y_max: 20.0,
        });
        class.extend_extents(&Extents {
            x_min: 0.0,
            x_max: 1.5,
            y_min: 15.0,
            y_max: 25.0,
        });
        let ext = class.extents().unwrap();
        assert_eq!(ext.x_min, 0.0);
        assert_eq!(ext.x_max, 2.0);
        assert_eq!(ext.y_min, 10.0);
        assert_eq!(ext.y_max, 25.0);

        let swapped = ext.swapped_axes();
        assert_eq!(swapped.x_min, 10.0);
        assert_eq!(swapped.y_max, 2.0);
    }

    #[test]
    fn test_class_xml_round_trip() {
        let mut class = FeatureClass::new("Road");
        class.set_feature_count(3);
        class.set_geometry_type(GmlGeometryType::MultiLineString);
        class.set_srs_name("urn:ogc:def:crs:EPSG::4326");
        class.set_extents(Extents {
            x_min: -1.0,
            x_max: 1.0,
            y_min: -2.0,
            y_max: 2.0,
        });
        let mut name = PropertyDefn::new("name", "name");
        name.set_type(PropertyType::String);
        class.add_property(name);
        let mut width = PropertyDefn::new("width", "prop|width");
        width.set_type(PropertyType::Real);
        class.add_property(width);

        let reparsed = FeatureClass::from_xml(&class.to_xml()).unwrap();
        assert_eq!(reparsed.name(), "Road");
        assert_eq!(reparsed.element_name(), "Road");
        assert_eq!(reparsed.feature_count(), 3);
        assert_eq!(reparsed.geometry_type(), GmlGeometryType::MultiLineString);
        assert_eq!(reparsed.srs_name(), Some("urn:ogc:def:crs:EPSG::4326"));
        assert_eq!(reparsed.extents(), class.extents());
        assert_eq!(reparsed.properties(), class.properties());
    }

    #[test]
    fn test_from_xml_requires_name() {
        let elem = XmlElement::new("GMLFeatureClass");
        assert!(FeatureClass::from_xml(&elem).is_err());
    }
}
