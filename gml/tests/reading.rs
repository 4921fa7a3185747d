//! Tests de lecture de bout en bout sur de petits documents GML

use std::path::{Path, PathBuf};

use gml::{Feature, GmlError, GmlGeometryType, GmlReader, GmlReaderOptions, PropertyType};

fn write_doc(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).expect("write fixture");
    path
}

fn reader_for(path: &Path, prefer_push: bool) -> GmlReader {
    let mut reader = GmlReader::new(GmlReaderOptions {
        prefer_push_parser: prefer_push,
        ..Default::default()
    })
    .expect("create reader");
    reader.set_source_file(path);
    reader
}

fn collect_features(reader: &mut GmlReader) -> Vec<Feature> {
    let mut features = Vec::new();
    while let Some(feature) = reader.next_feature().expect("next_feature") {
        features.push(feature);
    }
    features
}

const MINIMAL: &str = "<FeatureCollection><featureMember>\
    <Road fid=\"r1\"><name>A</name></Road>\
    </featureMember></FeatureCollection>";

const MIXED: &str = "<FeatureCollection>\
    <featureMember><Road fid=\"r1\"><name>A</name><width>4</width></Road></featureMember>\
    <featureMember><River fid=\"w1\"><name>Seine</name></River></featureMember>\
    <featureMember><Road fid=\"r2\"><name>B</name><width>6.5</width></Road></featureMember>\
    </FeatureCollection>";

const WITH_GEOMETRY: &str = "<FeatureCollection>\
    <featureMember><Road fid=\"r1\"><name>A</name>\
    <geometryProperty><Point><coordinates>2.3,48.8</coordinates></Point></geometryProperty>\
    </Road></featureMember>\
    <featureMember><Road fid=\"r2\"><name>B</name>\
    <geometryProperty><Point><coordinates>2.5,48.9</coordinates></Point></geometryProperty>\
    </Road></featureMember>\
    </FeatureCollection>";

#[test]
fn minimal_member_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_doc(&dir, "minimal.gml", MINIMAL);

    for prefer_push in [false, true] {
        let mut reader = reader_for(&path, prefer_push);
        let features = collect_features(&mut reader);

        assert_eq!(features.len(), 1);
        assert_eq!(features[0].class_name(), "Road");
        assert_eq!(features[0].fid(), Some("r1"));
        assert_eq!(features[0].property(0), Some("A"));

        assert_eq!(reader.class_count(), 1);
        let class = reader.class(0).unwrap();
        assert_eq!(class.name(), "Road");
        assert_eq!(class.property(0).unwrap().name(), "name");
        assert_eq!(class.property(0).unwrap().prop_type(), PropertyType::String);
    }
}

#[test]
fn push_and_pull_backends_agree() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_doc(&dir, "mixed.gml", MIXED);

    let mut pull = reader_for(&path, false);
    let mut push = reader_for(&path, true);
    let pull_features = collect_features(&mut pull);
    let push_features = collect_features(&mut push);

    assert_eq!(pull_features.len(), 3);
    assert_eq!(pull_features.len(), push_features.len());
    for (a, b) in pull_features.iter().zip(&push_features) {
        assert_eq!(a.class_name(), b.class_name());
        assert_eq!(a.fid(), b.fid());
        assert_eq!(a.properties(), b.properties());
    }
}

#[test]
fn type_widening_across_features() {
    let dir = tempfile::tempdir().unwrap();
    let numeric = write_doc(
        &dir,
        "numeric.gml",
        "<FeatureCollection>\
         <featureMember><Road><n>1</n></Road></featureMember>\
         <featureMember><Road><n>2.5</n></Road></featureMember>\
         </FeatureCollection>",
    );
    let mut reader = reader_for(&numeric, false);
    collect_features(&mut reader);
    assert_eq!(
        reader.class(0).unwrap().property(0).unwrap().prop_type(),
        PropertyType::Real
    );

    let stringy = write_doc(
        &dir,
        "stringy.gml",
        "<FeatureCollection>\
         <featureMember><Road><n>1</n></Road></featureMember>\
         <featureMember><Road><n>2.5</n></Road></featureMember>\
         <featureMember><Road><n>x</n></Road></featureMember>\
         </FeatureCollection>",
    );
    let mut reader = reader_for(&stringy, false);
    collect_features(&mut reader);
    assert_eq!(
        reader.class(0).unwrap().property(0).unwrap().prop_type(),
        PropertyType::String
    );
}

#[test]
fn openls_route_instructions() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_doc(
        &dir,
        "route.gml",
        "<DetermineRouteResponse><RouteInstructionsList>\
         <RouteInstruction><Instruction>left</Instruction></RouteInstruction>\
         <RouteInstruction><Instruction>right</Instruction></RouteInstruction>\
         </RouteInstructionsList></DetermineRouteResponse>",
    );
    let mut reader = reader_for(&path, false);
    let features = collect_features(&mut reader);

    assert_eq!(features.len(), 2);
    assert!(features.iter().all(|f| f.class_name() == "RouteInstruction"));
    assert_eq!(reader.class_count(), 1);
    assert_eq!(features[0].property(0), Some("left"));
    assert_eq!(features[1].property(0), Some("right"));
}

#[test]
fn prescan_counts_match_streaming() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_doc(&dir, "mixed.gml", MIXED);

    let mut reader = reader_for(&path, false);
    assert!(reader.prescan_for_schema(false).unwrap());

    let road_count = reader.class_by_name("Road").unwrap().feature_count();
    let river_count = reader.class_by_name("River").unwrap().feature_count();
    assert_eq!(road_count, 2);
    assert_eq!(river_count, 1);

    // un parcours complet livre les mêmes multiensembles
    let features = collect_features(&mut reader);
    let roads = features.iter().filter(|f| f.class_name() == "Road").count();
    let rivers = features
        .iter()
        .filter(|f| f.class_name() == "River")
        .count();
    assert_eq!(roads as i64, road_count);
    assert_eq!(rivers as i64, river_count);
}

#[test]
fn prescan_with_extents() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_doc(&dir, "geom.gml", WITH_GEOMETRY);

    let mut reader = reader_for(&path, false);
    assert!(reader.prescan_for_schema(true).unwrap());

    let class = reader.class_by_name("Road").unwrap();
    assert_eq!(class.feature_count(), 2);
    assert_eq!(class.geometry_type(), GmlGeometryType::Point);

    let extents = class.extents().unwrap();
    assert_eq!(extents.x_min, 2.3);
    assert_eq!(extents.x_max, 2.5);
    assert_eq!(extents.y_min, 48.8);
    assert_eq!(extents.y_max, 48.9);
}

#[test]
fn feature_without_geometry_coerces_to_none_type() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_doc(&dir, "minimal.gml", MINIMAL);

    let mut reader = reader_for(&path, false);
    assert!(reader.prescan_for_schema(true).unwrap());
    assert_eq!(
        reader.class(0).unwrap().geometry_type(),
        GmlGeometryType::None
    );
}

#[test]
fn empty_document_yields_empty_registry() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_doc(
        &dir,
        "empty.gml",
        "<FeatureCollection></FeatureCollection>",
    );

    let mut reader = reader_for(&path, false);
    assert!(!reader.prescan_for_schema(true).unwrap());
    assert_eq!(reader.class_count(), 0);
    assert!(reader.next_feature().unwrap().is_none());
}

#[test]
fn reset_reading_replays_the_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_doc(&dir, "mixed.gml", MIXED);

    let mut reader = reader_for(&path, false);
    let first: Vec<Option<String>> = collect_features(&mut reader)
        .iter()
        .map(|f| f.fid().map(str::to_string))
        .collect();

    reader.reset_reading();
    let second: Vec<Option<String>> = collect_features(&mut reader)
        .iter()
        .map(|f| f.fid().map(str::to_string))
        .collect();

    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
}

#[test]
fn filtered_class_restricts_features() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_doc(&dir, "mixed.gml", MIXED);

    let mut reader = reader_for(&path, false);
    reader.set_filtered_class_name(Some("River"));
    let features = collect_features(&mut reader);

    assert_eq!(features.len(), 1);
    assert_eq!(features[0].fid(), Some("w1"));

    // reset_reading lève le filtre
    reader.reset_reading();
    assert_eq!(reader.filtered_class_name(), None);
    assert_eq!(collect_features(&mut reader).len(), 3);
}

#[test]
fn schema_sidecar_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write_doc(&dir, "geom.gml", WITH_GEOMETRY);
    let sidecar = dir.path().join("geom.gfs");

    let mut reader = reader_for(&doc, false);
    assert!(reader.prescan_for_schema(true).unwrap());
    reader.save_classes(&sidecar).unwrap();

    let text = std::fs::read_to_string(&sidecar).unwrap();
    assert!(text.contains("<GMLFeatureClassList>"));

    let mut restored = reader_for(&doc, false);
    restored.load_classes(&sidecar).unwrap();
    assert!(restored.is_class_list_locked());
    assert_eq!(restored.class_count(), reader.class_count());

    for (a, b) in reader.classes().iter().zip(restored.classes()) {
        assert_eq!(a.name(), b.name());
        assert_eq!(a.element_name(), b.element_name());
        assert_eq!(a.feature_count(), b.feature_count());
        assert_eq!(a.geometry_type(), b.geometry_type());
        assert_eq!(a.extents(), b.extents());
        assert_eq!(a.srs_name(), b.srs_name());
        assert_eq!(a.properties(), b.properties());
        assert!(b.is_schema_locked());
    }

    // la lecture sous schéma verrouillé livre les mêmes features
    let features = collect_features(&mut restored);
    assert_eq!(features.len(), 2);
    assert_eq!(features[0].property(0), Some("A"));
}

#[test]
fn load_classes_rejects_foreign_files() {
    let dir = tempfile::tempdir().unwrap();
    let bogus = write_doc(&dir, "bogus.xml", "<SomethingElse></SomethingElse>");

    let mut reader = GmlReader::new(GmlReaderOptions::default()).unwrap();
    reader.add_class(gml::FeatureClass::new("Road"));
    assert!(reader.load_classes(&bogus).is_err());

    // l'état existant n'est pas touché par l'échec
    assert_eq!(reader.class_count(), 1);
    assert!(!reader.is_class_list_locked());
}

#[test]
fn global_srs_and_axis_inversion() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_doc(&dir, "geom.gml", WITH_GEOMETRY);

    let mut reader = GmlReader::new(GmlReaderOptions {
        invert_axis_order_if_lat_long: true,
        consider_epsg_as_urn: true,
        ..Default::default()
    })
    .unwrap();
    reader.set_source_file(&path);
    reader.set_global_srs_name("EPSG:4326");

    assert!(reader.prescan_for_schema(true).unwrap());
    assert!(reader.can_use_global_srs());

    let class = reader.class_by_name("Road").unwrap();
    // le SRS normalisé repasse en ordre longitude/latitude
    assert_eq!(class.srs_name(), Some("EPSG:4326"));

    // les étendues, accumulées en ordre document, ont été corrigées
    let extents = class.extents().unwrap();
    assert_eq!(extents.x_min, 48.8);
    assert_eq!(extents.x_max, 48.9);
    assert_eq!(extents.y_min, 2.3);
    assert_eq!(extents.y_max, 2.5);
}

#[test]
fn per_feature_srs_disables_global_srs() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_doc(
        &dir,
        "srs.gml",
        "<FeatureCollection><featureMember><Road>\
         <geometryProperty><Point srsName=\"EPSG:2154\">\
         <coordinates>650000,6860000</coordinates></Point></geometryProperty>\
         </Road></featureMember></FeatureCollection>",
    );

    let mut reader = GmlReader::new(GmlReaderOptions::default()).unwrap();
    reader.set_source_file(&path);
    reader.set_global_srs_name("EPSG:4326");

    assert!(reader.prescan_for_schema(true).unwrap());
    assert!(!reader.can_use_global_srs());
    assert_eq!(
        reader.class(0).unwrap().srs_name(),
        Some("EPSG:2154")
    );
}

#[test]
fn pull_backend_reports_tokenizer_errors() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_doc(
        &dir,
        "bad.gml",
        "<FeatureCollection><featureMember></wrong></FeatureCollection>",
    );

    let mut reader = reader_for(&path, false);
    let result = reader.next_feature();
    assert!(matches!(result, Err(GmlError::Xml { .. })));
    assert!(reader.stopped_on_error());

    // l'itérateur rend ensuite la fin de flux, pas de feature partielle
    assert!(reader.next_feature().unwrap().is_none());
}

#[test]
fn push_backend_reports_truncated_documents() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_doc(&dir, "trunc.gml", "<FeatureCollection><featureMember><Roa");

    let mut reader = reader_for(&path, true);
    let result = reader.next_feature();
    assert!(matches!(result, Err(GmlError::Xml { .. })));
    assert!(reader.stopped_on_error());
    assert!(reader.next_feature().unwrap().is_none());
}
