//! Catalog and settings loading from disk

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use flate2::read::GzDecoder;

use super::BodyCatalog;
use crate::bodies::BodyRegistry;
use crate::propagation::SimulationSettings;

const BUILTIN_CATALOG: &str = include_str!("../../data/solar_system.json");

/// The embedded solar-system catalog
pub fn builtin_catalog() -> Result<BodyCatalog> {
    serde_json::from_str(BUILTIN_CATALOG).context("Failed to parse built-in catalog")
}

/// Load a body catalog from JSON, gzip-compressed when the name ends in `.gz`
pub fn load_catalog(path: impl AsRef<Path>) -> Result<BodyCatalog> {
    let path = path.as_ref();
    log::info!("Loading body catalog from {:?}", path);

    let file = File::open(path).with_context(|| format!("Failed to open catalog: {:?}", path))?;
    let reader = BufReader::new(file);

    let gzipped = path.extension().map_or(false, |ext| ext == "gz");
    let catalog: BodyCatalog = if gzipped {
        serde_json::from_reader(GzDecoder::new(reader))
    } else {
        serde_json::from_reader(reader)
    }
    .with_context(|| format!("Failed to parse catalog JSON: {:?}", path))?;

    log::info!(
        "Loaded {} bodies from {}",
        catalog.bodies.len(),
        catalog.name.as_deref().unwrap_or("unnamed catalog")
    );
    Ok(catalog)
}

/// Build a registry from a catalog file, or from the built-in catalog
pub fn load_registry(path: Option<&Path>) -> Result<BodyRegistry> {
    let catalog = match path {
        Some(path) => load_catalog(path)?,
        None => builtin_catalog()?,
    };
    let registry = BodyRegistry::from_catalog(&catalog).context("Invalid body catalog")?;
    log::debug!(
        "Registry root {} with {} bodies",
        registry.name_of(registry.root()),
        registry.len()
    );
    Ok(registry)
}

/// Load simulation settings from a TOML file
pub fn load_settings(path: impl AsRef<Path>) -> Result<SimulationSettings> {
    let path = path.as_ref();
    let mut text = String::new();
    File::open(path)
        .and_then(|mut file| file.read_to_string(&mut text))
        .with_context(|| format!("Failed to read settings: {:?}", path))?;

    let settings = SimulationSettings::from_toml_str(&text)
        .with_context(|| format!("Failed to parse settings TOML: {:?}", path))?;
    log::info!("Loaded settings from {:?}", path);
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("orbitsim-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_builtin_catalog_builds_registry() {
        let registry = load_registry(None).unwrap();
        assert_eq!(registry.len(), 47);
        assert_eq!(registry.find("Earth").map(|b| b.id), Some(399));

        for body in registry.iter() {
            if let Some(soi) = registry.soi_radius(body.id) {
                assert!(soi > 0.0, "{} soi {}", body.name, soi);
            }
        }
        assert!(registry.soi_radius(399).is_some());
        assert!(registry.soi_radius(499).is_some());
        let moon_soi = registry.soi_radius(301).unwrap();
        assert!(moon_soi > 50_000.0 && moon_soi < 80_000.0, "moon soi {}", moon_soi);
    }

    #[test]
    fn test_gzipped_catalog_matches_plain() {
        let path = temp_path("catalog.json.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(BUILTIN_CATALOG.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let catalog = load_catalog(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(catalog.bodies.len(), builtin_catalog().unwrap().bodies.len());
    }

    #[test]
    fn test_missing_and_malformed_files_have_context() {
        let missing = load_catalog(temp_path("does-not-exist.json")).unwrap_err();
        assert!(missing.to_string().contains("Failed to open catalog"));

        let path = temp_path("broken.json");
        std::fs::write(&path, "{ \"bodies\": [").unwrap();
        let broken = load_catalog(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(broken.to_string().contains("Failed to parse catalog JSON"));
    }

    #[test]
    fn test_settings_file() {
        let path = temp_path("settings.toml");
        std::fs::write(&path, "[propagator]\nstep_size = 5.0\n").unwrap();
        let settings = load_settings(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(settings.propagator.step_size, 5.0);
        assert!(settings.forces.include_drag);
    }
}
