//! # gml
//!
//! Lecteur streaming pour documents GML (Geography Markup Language).
//!
//! ## Features
//!
//! - Séquence paresseuse de features typées, découverte dynamique des
//!   classes et de leurs schémas de propriétés
//! - Prescan du document entier: comptes, types de géométrie, étendues et
//!   SRS par classe
//! - Schémas persistables en fichier de classes XML (`GMLFeatureClassList`)
//! - Deux backends XML au choix (pull et push), derrière les features
//!   `pull-parser` et `push-parser`
//! - Géométries construites en types `geo` pour l'interopérabilité avec
//!   l'écosystème Rust géospatial
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gml::{GmlReader, GmlReaderOptions};
//!
//! let mut reader = GmlReader::new(GmlReaderOptions::default())?;
//! reader.set_source_file("roads.gml");
//!
//! reader.prescan_for_schema(true)?;
//! for class in reader.classes() {
//!     println!("{}: {} features", class.name(), class.feature_count());
//! }
//!
//! reader.reset_reading();
//! while let Some(feature) = reader.next_feature()? {
//!     println!("{} fid={:?}", feature.class_name(), feature.fid());
//! }
//! ```

pub mod class;
pub mod error;
pub mod feature;
pub mod geometry;
mod handler;
mod parser;
pub mod reader;
pub mod srs;
mod state;
pub mod xml;

pub use class::{Extents, FeatureClass, PropertyDefn, PropertyType};
pub use error::GmlError;
pub use feature::Feature;
pub use geometry::GmlGeometryType;
pub use reader::{GmlReader, GmlReaderOptions};
