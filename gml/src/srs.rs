//! Identification et normalisation de l'ordre des axes des SRS

/// Codes EPSG géographiques dont la définition d'autorité est en ordre
/// latitude/longitude, reconnus sans base EPSG complète
const LAT_LONG_GEOGRAPHIC_CODES: &[&str] = &[
    "4326", "4258", "4267", "4269", "4283", "4301", "4617", "4619", "4742", "4765",
];

/// Vrai si le nom de SRS désigne un CRS en ordre latitude/longitude.
///
/// La forme URN OGC impose l'ordre d'axes de l'autorité; la forme courte
/// `EPSG:x` implique par convention l'ordre longitude/latitude et n'est
/// donc jamais lat/long. Un WKT `GEOGCS` est lat/long si son premier
/// nœud `AXIS` est une latitude.
pub fn is_lat_long_order(srs_name: &str) -> bool {
    if let Some(code) = urn_epsg_code(srs_name) {
        return LAT_LONG_GEOGRAPHIC_CODES.contains(&code);
    }
    if srs_name.trim_start().starts_with("GEOGCS") {
        return first_axis_is_latitude(srs_name);
    }
    false
}

/// Réécrit un nom de SRS lat/long sous une forme en ordre
/// longitude/latitude: les nœuds `AXIS` d'un WKT `GEOGCS` sont retirés,
/// la forme URN EPSG redevient le code court `EPSG:x`. Retourne `None`
/// quand la forme n'est pas réécrivable.
pub fn normalize_axis_order(srs_name: &str) -> Option<String> {
    if let Some(code) = urn_epsg_code(srs_name) {
        return Some(format!("EPSG:{code}"));
    }
    if srs_name.trim_start().starts_with("GEOGCS") {
        return Some(strip_axis_nodes(srs_name));
    }
    None
}

/// Code d'une URN `urn:ogc:def:crs:EPSG::x` (avec ou sans version)
fn urn_epsg_code(name: &str) -> Option<&str> {
    let rest = name.strip_prefix("urn:ogc:def:crs:EPSG:")?;
    rest.rsplit(':')
        .next()
        .filter(|code| !code.is_empty() && code.bytes().all(|b| b.is_ascii_digit()))
}

fn first_axis_is_latitude(wkt: &str) -> bool {
    let Some(pos) = wkt.find("AXIS[") else {
        return false;
    };
    let node = &wkt[pos..];
    let end = node.find(']').unwrap_or(node.len());
    node[..end].to_ascii_lowercase().contains("lat")
}

/// Retire tous les nœuds `,AXIS[...]` d'un WKT
fn strip_axis_nodes(wkt: &str) -> String {
    let mut out = String::with_capacity(wkt.len());
    let mut rest = wkt;
    while let Some(pos) = rest.find(",AXIS[") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + ",AXIS[".len()..];
        let mut depth = 1usize;
        let mut end = after.len();
        for (i, ch) in after.char_indices() {
            match ch {
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        end = i + 1;
                        break;
                    }
                }
                _ => {}
            }
        }
        rest = &after[end..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const WGS84_WKT: &str = "GEOGCS[\"WGS 84\",DATUM[\"WGS_1984\",\
        SPHEROID[\"WGS 84\",6378137,298.257223563]],\
        PRIMEM[\"Greenwich\",0],UNIT[\"degree\",0.0174532925199433],\
        AXIS[\"Latitude\",NORTH],AXIS[\"Longitude\",EAST]]";

    #[test]
    fn test_urn_forms_are_lat_long() {
        assert!(is_lat_long_order("urn:ogc:def:crs:EPSG::4326"));
        assert!(is_lat_long_order("urn:ogc:def:crs:EPSG:6.6:4326"));
        assert!(!is_lat_long_order("urn:ogc:def:crs:EPSG::2154"));
    }

    #[test]
    fn test_short_epsg_form_is_not_lat_long() {
        assert!(!is_lat_long_order("EPSG:4326"));
    }

    #[test]
    fn test_wkt_axis_detection() {
        assert!(is_lat_long_order(WGS84_WKT));
        assert!(!is_lat_long_order("GEOGCS[\"x\",AXIS[\"Easting\",EAST]]"));
        assert!(!is_lat_long_order("PROJCS[\"x\"]"));
    }

    #[test]
    fn test_normalize_urn_to_short_code() {
        assert_eq!(
            normalize_axis_order("urn:ogc:def:crs:EPSG::4326").as_deref(),
            Some("EPSG:4326")
        );
        assert_eq!(normalize_axis_order("EPSG:4326"), None);
    }

    #[test]
    fn test_normalize_strips_axis_nodes() {
        let stripped = normalize_axis_order(WGS84_WKT).unwrap();
        assert!(!stripped.contains("AXIS"));
        assert!(stripped.contains("GEOGCS"));
        assert!(stripped.contains("PRIMEM"));
        assert!(!is_lat_long_order(&stripped));
    }
}
