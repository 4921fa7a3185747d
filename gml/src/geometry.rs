//! Construction de géométries `geo` depuis les fragments GML capturés

use geo::{
    BoundingRect, Coord, Geometry, GeometryCollection, LineString, MapCoordsInPlace,
    MultiLineString, MultiPoint, MultiPolygon, Point, Polygon,
};
use tracing::debug;

use crate::class::Extents;
use crate::srs;
use crate::xml::XmlElement;

/// Type de géométrie abstrait d'une classe de features.
///
/// `Unknown` signifie qu'aucun type n'a encore été établi; `None` que des
/// features sans géométrie ont été vues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GmlGeometryType {
    #[default]
    Unknown,
    None,
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
}

impl GmlGeometryType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::None => "None",
            Self::Point => "Point",
            Self::LineString => "LineString",
            Self::Polygon => "Polygon",
            Self::MultiPoint => "MultiPoint",
            Self::MultiLineString => "MultiLineString",
            Self::MultiPolygon => "MultiPolygon",
            Self::GeometryCollection => "GeometryCollection",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            Self::Unknown,
            Self::None,
            Self::Point,
            Self::LineString,
            Self::Polygon,
            Self::MultiPoint,
            Self::MultiLineString,
            Self::MultiPolygon,
            Self::GeometryCollection,
        ]
        .into_iter()
        .find(|t| t.name().eq_ignore_ascii_case(name))
    }
}

/// Union de deux types de géométrie au niveau d'une classe. `Unknown` et
/// `None` sont neutres, les types homogènes passent, un couple
/// simple/multi du même genre est promu en multi, tout le reste retombe
/// sur `Unknown`.
pub fn merge_geometry_types(a: GmlGeometryType, b: GmlGeometryType) -> GmlGeometryType {
    use GmlGeometryType::*;

    if a == Unknown {
        return b;
    }
    if b == Unknown {
        return a;
    }
    if a == None {
        return b;
    }
    if b == None {
        return a;
    }
    if a == b {
        return a;
    }
    match (a, b) {
        (Point, MultiPoint) | (MultiPoint, Point) => MultiPoint,
        (LineString, MultiLineString) | (MultiLineString, LineString) => MultiLineString,
        (Polygon, MultiPolygon) | (MultiPolygon, Polygon) => MultiPolygon,
        _ => Unknown,
    }
}

/// Type abstrait d'une géométrie construite
pub fn geometry_type_of(geometry: &Geometry<f64>) -> GmlGeometryType {
    match geometry {
        Geometry::Point(_) => GmlGeometryType::Point,
        Geometry::Line(_) | Geometry::LineString(_) => GmlGeometryType::LineString,
        Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => {
            GmlGeometryType::Polygon
        }
        Geometry::MultiPoint(_) => GmlGeometryType::MultiPoint,
        Geometry::MultiLineString(_) => GmlGeometryType::MultiLineString,
        Geometry::MultiPolygon(_) => GmlGeometryType::MultiPolygon,
        Geometry::GeometryCollection(_) => GmlGeometryType::GeometryCollection,
    }
}

/// Enveloppe d'une géométrie, en ordre d'axes natif
pub fn envelope(geometry: &Geometry<f64>) -> Option<Extents> {
    geometry.bounding_rect().map(|rect| Extents {
        x_min: rect.min().x,
        x_max: rect.max().x,
        y_min: rect.min().y,
        y_max: rect.max().y,
    })
}

/// Construit une géométrie depuis la liste de fragments capturés d'une
/// feature. Plusieurs fragments sont consolidés en multi-géométrie
/// homogène quand c'est possible, sinon en collection. Si le SRS porté par
/// les fragments est en ordre lat/long et que l'inversion est demandée,
/// les coordonnées sont échangées.
pub fn build_geometry_from_list(
    list: &[XmlElement],
    consolidate: bool,
    invert_axis_if_lat_long: bool,
    consider_epsg_as_urn: bool,
) -> Option<Geometry<f64>> {
    let mut parts: Vec<Geometry<f64>> = list.iter().filter_map(parse_geometry).collect();
    if parts.is_empty() {
        return None;
    }

    let mut geometry = if parts.len() == 1 {
        parts.pop()?
    } else if consolidate {
        consolidate_parts(parts)
    } else {
        Geometry::GeometryCollection(GeometryCollection(parts))
    };

    if invert_axis_if_lat_long {
        if let Some(srs_name) = extract_srs_name_from_list(list, consider_epsg_as_urn) {
            if srs::is_lat_long_order(&srs_name) {
                geometry.map_coords_in_place(|c| Coord { x: c.y, y: c.x });
            }
        }
    }

    Some(geometry)
}

/// Premier attribut `srsName` trouvé dans les fragments, normalisé
pub fn extract_srs_name_from_list(
    list: &[XmlElement],
    consider_epsg_as_urn: bool,
) -> Option<String> {
    list.iter()
        .find_map(find_srs_name)
        .map(|name| normalize_srs_name(name, consider_epsg_as_urn))
}

fn find_srs_name(elem: &XmlElement) -> Option<&str> {
    if let Some(srs) = elem.attribute("srsName") {
        return Some(srs);
    }
    elem.child_elements().find_map(find_srs_name)
}

fn normalize_srs_name(name: &str, consider_epsg_as_urn: bool) -> String {
    let code = name
        .strip_prefix("EPSG:")
        .or_else(|| name.strip_prefix("http://www.opengis.net/gml/srs/epsg.xml#"));
    match code {
        Some(code) if consider_epsg_as_urn => format!("urn:ogc:def:crs:EPSG::{code}"),
        Some(code) => format!("EPSG:{code}"),
        None => name.to_string(),
    }
}

fn consolidate_parts(parts: Vec<Geometry<f64>>) -> Geometry<f64> {
    if parts.iter().all(|g| matches!(g, Geometry::Point(_))) {
        let points = parts
            .into_iter()
            .filter_map(|g| match g {
                Geometry::Point(p) => Some(p),
                _ => None,
            })
            .collect();
        return Geometry::MultiPoint(MultiPoint::new(points));
    }
    if parts.iter().all(|g| matches!(g, Geometry::LineString(_))) {
        let lines = parts
            .into_iter()
            .filter_map(|g| match g {
                Geometry::LineString(l) => Some(l),
                _ => None,
            })
            .collect();
        return Geometry::MultiLineString(MultiLineString::new(lines));
    }
    if parts.iter().all(|g| matches!(g, Geometry::Polygon(_))) {
        let polygons = parts
            .into_iter()
            .filter_map(|g| match g {
                Geometry::Polygon(p) => Some(p),
                _ => None,
            })
            .collect();
        return Geometry::MultiPolygon(MultiPolygon::new(polygons));
    }
    Geometry::GeometryCollection(GeometryCollection(parts))
}

/// Parse un fragment GML en géométrie. Les éléments non reconnus sont
/// ignorés avec une trace de debug.
pub fn parse_geometry(elem: &XmlElement) -> Option<Geometry<f64>> {
    match elem.name.as_str() {
        "Point" => parse_point(elem).map(Geometry::Point),
        "LineString" | "LinearRing" => parse_line_string(elem).map(Geometry::LineString),
        "Polygon" | "PolygonPatch" => parse_polygon(elem).map(Geometry::Polygon),
        "Box" | "Envelope" => parse_box(elem).map(Geometry::Polygon),
        "MultiPoint" => {
            let points: Vec<Point<f64>> = member_elements(elem, "pointMember")
                .filter(|e| e.name == "Point")
                .filter_map(parse_point)
                .collect();
            (!points.is_empty()).then(|| Geometry::MultiPoint(MultiPoint::new(points)))
        }
        "MultiLineString" | "MultiCurve" => {
            let members: Vec<&XmlElement> = member_elements(elem, "lineStringMember")
                .chain(member_elements(elem, "curveMember"))
                .collect();
            let lines: Vec<LineString<f64>> = members
                .into_iter()
                .filter_map(|e| match e.name.as_str() {
                    "LineString" => parse_line_string(e),
                    "Curve" => parse_curve(e),
                    _ => None,
                })
                .collect();
            (!lines.is_empty()).then(|| Geometry::MultiLineString(MultiLineString::new(lines)))
        }
        "MultiPolygon" | "MultiSurface" => {
            let members: Vec<&XmlElement> = member_elements(elem, "polygonMember")
                .chain(member_elements(elem, "surfaceMember"))
                .collect();
            let polygons: Vec<Polygon<f64>> = members
                .into_iter()
                .flat_map(|e| match e.name.as_str() {
                    "Polygon" | "PolygonPatch" => parse_polygon(e).into_iter().collect::<Vec<_>>(),
                    "Surface" => parse_surface_patches(e),
                    _ => Vec::new(),
                })
                .collect();
            (!polygons.is_empty()).then(|| Geometry::MultiPolygon(MultiPolygon::new(polygons)))
        }
        "MultiGeometry" | "GeometryCollection" => {
            let parts: Vec<Geometry<f64>> = member_elements(elem, "geometryMember")
                .filter_map(parse_geometry)
                .collect();
            (!parts.is_empty()).then(|| Geometry::GeometryCollection(GeometryCollection(parts)))
        }
        "Curve" => parse_curve(elem).map(Geometry::LineString),
        "Surface" => {
            let patches = parse_surface_patches(elem);
            match patches.len() {
                0 => None,
                1 => patches.into_iter().next().map(Geometry::Polygon),
                _ => Some(Geometry::MultiPolygon(MultiPolygon::new(patches))),
            }
        }
        other => {
            debug!(element = other, "Unrecognized geometry element, skipped");
            None
        }
    }
}

/// Éléments portés par les enfants `<xxxMember>` et `<xxxMembers>`
fn member_elements<'a>(
    elem: &'a XmlElement,
    member: &'a str,
) -> impl Iterator<Item = &'a XmlElement> + 'a {
    elem.child_elements()
        .filter(move |e| {
            e.name == member || e.name.strip_suffix('s').is_some_and(|base| base == member)
        })
        .flat_map(|e| e.child_elements())
}

fn parse_point(elem: &XmlElement) -> Option<Point<f64>> {
    let coords = read_coords(elem)?;
    coords.first().map(|&c| Point::from(c))
}

fn parse_line_string(elem: &XmlElement) -> Option<LineString<f64>> {
    let coords = read_coords(elem)?;
    (coords.len() >= 2).then(|| LineString::new(coords))
}

fn parse_polygon(elem: &XmlElement) -> Option<Polygon<f64>> {
    let exterior_holder = elem
        .child("outerBoundaryIs")
        .or_else(|| elem.child("exterior"))?;
    let exterior = exterior_holder
        .child("LinearRing")
        .and_then(parse_line_string)?;

    let interiors: Vec<LineString<f64>> = elem
        .child_elements()
        .filter(|e| e.name == "innerBoundaryIs" || e.name == "interior")
        .filter_map(|e| e.child("LinearRing"))
        .filter_map(parse_line_string)
        .collect();

    Some(Polygon::new(exterior, interiors))
}

/// Box GML 2 ou Envelope GML 3, rendu comme un rectangle fermé
fn parse_box(elem: &XmlElement) -> Option<Polygon<f64>> {
    let (min, max) = if let Some(coords) = read_coords(elem) {
        if coords.len() < 2 {
            return None;
        }
        (coords[0], coords[1])
    } else {
        let lower = elem.child("lowerCorner").map(|e| e.text())?;
        let upper = elem.child("upperCorner").map(|e| e.text())?;
        let lower = parse_pos_list(&lower, 2);
        let upper = parse_pos_list(&upper, 2);
        (*lower.first()?, *upper.first()?)
    };

    let ring = LineString::new(vec![
        Coord { x: min.x, y: min.y },
        Coord { x: max.x, y: min.y },
        Coord { x: max.x, y: max.y },
        Coord { x: min.x, y: max.y },
        Coord { x: min.x, y: min.y },
    ]);
    Some(Polygon::new(ring, Vec::new()))
}

/// Courbe GML 3: la concaténation des `LineStringSegment` de `segments`
fn parse_curve(elem: &XmlElement) -> Option<LineString<f64>> {
    let segments = elem.child("segments")?;
    let mut coords: Vec<Coord<f64>> = Vec::new();
    for segment in segments.children_named("LineStringSegment") {
        if let Some(mut seg_coords) = read_coords(segment) {
            // les segments contigus répètent leur point de jonction
            let joined = matches!(
                (coords.last(), seg_coords.first()),
                (Some(a), Some(b)) if a == b
            );
            if joined {
                seg_coords.remove(0);
            }
            coords.append(&mut seg_coords);
        }
    }
    (coords.len() >= 2).then(|| LineString::new(coords))
}

fn parse_surface_patches(elem: &XmlElement) -> Vec<Polygon<f64>> {
    elem.child("patches")
        .map(|patches| {
            patches
                .children_named("PolygonPatch")
                .filter_map(parse_polygon)
                .collect()
        })
        .unwrap_or_default()
}

/// Coordonnées portées par `<coordinates>`, `<posList>` ou `<pos>`
fn read_coords(elem: &XmlElement) -> Option<Vec<Coord<f64>>> {
    if let Some(c) = elem.child("coordinates") {
        return Some(parse_coordinates(
            &c.text(),
            c.attribute("cs"),
            c.attribute("ts"),
        ));
    }
    if let Some(p) = elem.child("posList") {
        let dim = p
            .attribute("srsDimension")
            .and_then(|d| d.parse::<usize>().ok())
            .filter(|&d| d >= 2)
            .unwrap_or(2);
        return Some(parse_pos_list(&p.text(), dim));
    }
    if let Some(p) = elem.child("pos") {
        return Some(parse_pos_list(&p.text(), 2));
    }
    None
}

/// Forme GML 2 `x1,y1 x2,y2`, séparateurs `cs` et `ts` configurables
fn parse_coordinates(text: &str, cs: Option<&str>, ts: Option<&str>) -> Vec<Coord<f64>> {
    let cs = cs.and_then(|s| s.chars().next()).unwrap_or(',');
    let ts = ts.and_then(|s| s.chars().next());

    let tuples: Vec<&str> = match ts {
        Some(sep) if sep != ' ' => text.split(sep).collect(),
        _ => text.split_whitespace().collect(),
    };

    tuples
        .iter()
        .filter_map(|tuple| {
            let mut parts = tuple.trim().split(cs);
            let x = parse_f64(parts.next()?)?;
            let y = parse_f64(parts.next()?)?;
            Some(Coord { x, y })
        })
        .collect()
}

/// Forme GML 3 `x1 y1 x2 y2`, par paquets de `dim` ordonnées
fn parse_pos_list(text: &str, dim: usize) -> Vec<Coord<f64>> {
    let values: Vec<f64> = text.split_whitespace().filter_map(parse_f64).collect();
    values
        .chunks(dim)
        .filter(|chunk| chunk.len() >= 2)
        .map(|chunk| Coord {
            x: chunk[0],
            y: chunk[1],
        })
        .collect()
}

fn parse_f64(token: &str) -> Option<f64> {
    fast_float::parse(token.trim()).ok()
}
