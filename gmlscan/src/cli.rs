//! Définition et implémentation des commandes CLI
//!
//! Deux commandes:
//! - scan (défaut): prescan du document, schéma et statistiques par classe
//! - `dump`: liste des features en streaming

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::info;

use gml::{GmlReader, GmlReaderOptions};

#[derive(Args)]
pub struct ScanArgs {
    /// Chemin du document GML
    #[arg(short, long)]
    pub path: PathBuf,

    /// Calculer les types de géométrie, étendues et SRS par classe
    #[arg(long)]
    pub extents: bool,

    /// Charger un fichier de classes (.gfs) avant la lecture
    #[arg(long)]
    pub schema: Option<PathBuf>,

    /// Sauvegarder le fichier de classes (.gfs) après le scan
    #[arg(long)]
    pub save_schema: Option<PathBuf>,

    /// Utiliser le backend push plutôt que pull
    #[arg(long)]
    pub push: bool,

    /// Normaliser l'ordre des axes pour les SRS lat/long
    #[arg(long)]
    pub invert_axis: bool,

    /// Réécrire EPSG:x sous la forme URN OGC
    #[arg(long)]
    pub epsg_as_urn: bool,

    /// SRS global appliqué aux classes qui n'en portent pas
    #[arg(long)]
    pub srs: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Lister les features du document
    Dump {
        /// Chemin du document GML
        #[arg(short, long)]
        path: PathBuf,

        /// Ne garder que les features de la classe nommée
        #[arg(long)]
        class: Option<String>,

        /// Nombre maximum de features affichées
        #[arg(long)]
        limit: Option<usize>,

        /// Utiliser le backend push plutôt que pull
        #[arg(long)]
        push: bool,
    },
}

fn open_reader(path: &Path, options: GmlReaderOptions) -> Result<GmlReader> {
    let mut reader = GmlReader::new(options).context("Failed to create GML reader")?;
    reader.set_source_file(path);
    Ok(reader)
}

/// Exécute la commande scan (défaut)
pub fn cmd_scan(args: &ScanArgs) -> Result<()> {
    let mut reader = open_reader(
        &args.path,
        GmlReaderOptions {
            prefer_push_parser: args.push,
            invert_axis_order_if_lat_long: args.invert_axis,
            consider_epsg_as_urn: args.epsg_as_urn,
        },
    )?;

    if let Some(srs) = &args.srs {
        reader.set_global_srs_name(srs);
    }

    if let Some(schema) = &args.schema {
        // le fichier de classes fait autorité: on compte en streaming
        // sans redécouvrir le schéma
        reader
            .load_classes(schema)
            .with_context(|| format!("Failed to load classes from {}", schema.display()))?;
        info!(file = %schema.display(), classes = reader.class_count(), "Classes loaded");

        let mut counts = vec![0i64; reader.class_count()];
        while let Some(feature) = reader
            .next_feature()
            .with_context(|| format!("Failed reading {}", args.path.display()))?
        {
            if let Some(count) = counts.get_mut(feature.class_index()) {
                *count += 1;
            }
        }
        for (index, count) in counts.iter().enumerate() {
            if let Some(class) = reader.class(index) {
                println!("{}: {} features", class.name(), count);
            }
        }
        return Ok(());
    }

    let found = reader
        .prescan_for_schema(args.extents)
        .with_context(|| format!("Failed to prescan {}", args.path.display()))?;
    if !found {
        println!("No feature classes found in {}", args.path.display());
        return Ok(());
    }

    for class in reader.classes() {
        println!("Class {} (element {})", class.name(), class.element_name());
        if class.feature_count() >= 0 {
            println!("  features: {}", class.feature_count());
        }
        if args.extents {
            println!("  geometry: {}", class.geometry_type().name());
            if let Some(srs) = class.srs_name() {
                println!("  srs: {srs}");
            }
            if let Some(ext) = class.extents() {
                println!(
                    "  extents: ({}, {}) - ({}, {})",
                    ext.x_min, ext.y_min, ext.x_max, ext.y_max
                );
            }
        }
        for prop in class.properties() {
            println!(
                "  {}: {} ({})",
                prop.name(),
                prop.prop_type().name(),
                prop.src_element()
            );
        }
    }

    if let Some(out) = &args.save_schema {
        reader
            .save_classes(out)
            .with_context(|| format!("Failed to save classes to {}", out.display()))?;
        info!(file = %out.display(), "Classes saved");
    }

    Ok(())
}

/// Exécute la commande dump
pub fn cmd_dump(path: &Path, class: Option<&str>, limit: Option<usize>, push: bool) -> Result<()> {
    let mut reader = open_reader(
        path,
        GmlReaderOptions {
            prefer_push_parser: push,
            ..Default::default()
        },
    )?;
    reader.set_filtered_class_name(class);

    let mut shown = 0usize;
    let mut total = 0usize;
    while let Some(feature) = reader
        .next_feature()
        .with_context(|| format!("Failed reading {}", path.display()))?
    {
        total += 1;
        if limit.is_some_and(|l| shown >= l) {
            continue;
        }
        shown += 1;

        let mut line = String::new();
        if let Some(class) = reader.class(feature.class_index()) {
            for (index, value) in feature.properties().iter().enumerate() {
                let (Some(prop), Some(value)) = (class.property(index), value) else {
                    continue;
                };
                if !line.is_empty() {
                    line.push_str(", ");
                }
                line.push_str(prop.name());
                line.push('=');
                line.push_str(value);
            }
        }
        match feature.fid() {
            Some(fid) => println!("{} (fid={}): {}", feature.class_name(), fid, line),
            None => println!("{}: {}", feature.class_name(), line),
        }
    }

    info!(total, shown, "Dump finished");
    Ok(())
}
