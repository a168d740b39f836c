use crate::config::AppConfig;
use crate::crs::Crs;
use crate::types::{BoundaryRecord, Dataset};
use anyhow::{anyhow, Context, Result};
use geo::{HasDimensions, MultiPolygon, Validation};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

pub const REGION: &str = "region";
pub const CERCLE: &str = "cercle";
pub const COMMUNE: &str = "commune";
pub const AREA_ID: &str = "idse_new";
pub const POPULATION: &str = "pop_se";
pub const POPULATION_CT: &str = "pop_se_ct";

/// Geometry file extensions, most preferred first.
const PREFERRED_EXTENSIONS: &[&[&str]] = &[&["shp"], &["geojson", "json"]];

const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("lregion", REGION),
    ("nom_region", REGION),
    ("region_name", REGION),
    ("nomreg", REGION),
    ("lcercle", CERCLE),
    ("nom_cercle", CERCLE),
    ("cercle_name", CERCLE),
    ("nomcer", CERCLE),
    ("lcommune", COMMUNE),
    ("nom_commune", COMMUNE),
    ("commune_name", COMMUNE),
    ("nomcom", COMMUNE),
    ("idse", AREA_ID),
    ("id_se", AREA_ID),
    ("se_id", AREA_ID),
    ("code_se", AREA_ID),
    ("enumeration_area_id", AREA_ID),
    ("population", POPULATION),
    ("pop", POPULATION),
    ("pop_ct", POPULATION_CT),
    ("population_ct", POPULATION_CT),
];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no geometry file (.shp, .geojson) found in {0:?}")]
    NoData(PathBuf),
    #[error("unsupported coordinate reference system: {0}")]
    UnsupportedCrs(String),
    #[error("GeoJSON must be a FeatureCollection")]
    NotFeatureCollection,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Number(f64),
    Null,
}

impl AttrValue {
    fn as_label(&self) -> Option<String> {
        match self {
            AttrValue::Text(s) => {
                let s = s.trim();
                (!s.is_empty()).then(|| s.to_string())
            }
            AttrValue::Number(n) if n.is_finite() => Some(format_number(*n)),
            _ => None,
        }
    }

    fn as_count(&self) -> u64 {
        let value = match self {
            AttrValue::Number(n) => *n,
            AttrValue::Text(s) => s.trim().parse().unwrap_or(0.0),
            AttrValue::Null => 0.0,
        };
        if value.is_finite() && value > 0.0 {
            value.round() as u64
        } else {
            0
        }
    }
}

// Integral values print without a trailing ".0" so ids read like the source.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// A feature as read from disk, before normalisation and validation.
#[derive(Debug, Clone)]
pub struct RawFeature {
    pub attributes: HashMap<String, AttrValue>,
    pub geometry: Option<MultiPolygon<f64>>,
}

struct RawCollection {
    features: Vec<RawFeature>,
    declared_crs: Option<Crs>,
}

pub fn load_data(config: &AppConfig) -> Result<Dataset> {
    let path = find_geometry_file(&config.input.data_dir)?;
    info!(path = %path.display(), "loading boundary data");

    let extension = extension_of(&path)
        .ok_or_else(|| anyhow!("Input geometry file has no extension"))?;

    let collection = match extension.as_str() {
        "shp" => read_shapefile(&path)?,
        "json" | "geojson" => read_geojson(&path)?,
        _ => return Err(anyhow!("Unsupported geometry format: {}", extension)),
    };

    let crs = match config.input.source_epsg {
        Some(code) => Crs::from_epsg(code)
            .ok_or_else(|| LoadError::UnsupportedCrs(format!("EPSG:{}", code)))?,
        None => collection.declared_crs.unwrap_or(Crs::Geographic),
    };

    let aliases = alias_table(&config.input.aliases);
    let total = collection.features.len();
    let records = build_records(collection.features, crs, &aliases);
    let dropped = total - records.len();

    if dropped > 0 {
        warn!(dropped, "discarded features with missing, empty or invalid geometry");
    }
    info!(records = records.len(), %crs, "loaded boundary data");

    Ok(Dataset::new(records))
}

/// Picks the data file: the first shapefile by name, else the first GeoJSON.
pub fn find_geometry_file(dir: &Path) -> Result<PathBuf> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read data directory: {:?}", dir))?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    for extensions in PREFERRED_EXTENSIONS {
        let found = files.iter().find(|p| {
            extension_of(p).is_some_and(|ext| extensions.contains(&ext.as_str()))
        });
        if let Some(path) = found {
            return Ok(path.clone());
        }
    }

    Err(LoadError::NoData(dir.to_path_buf()).into())
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
}

/// Lowercases and trims a source attribute name, then applies aliases.
pub fn normalize_key(key: &str, aliases: &HashMap<String, String>) -> String {
    let key = key.trim().to_lowercase();
    match aliases.get(&key) {
        Some(canonical) => canonical.clone(),
        None => key,
    }
}

fn alias_table(extra: &HashMap<String, String>) -> HashMap<String, String> {
    let mut table: HashMap<String, String> = BUILTIN_ALIASES
        .iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect();
    for (from, to) in extra {
        table.insert(from.trim().to_lowercase(), to.trim().to_lowercase());
    }
    table
}

fn read_shapefile(path: &Path) -> Result<RawCollection> {
    use shapefile::dbase::FieldValue;

    let mut reader = shapefile::Reader::from_path(path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let mut features = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let geometry: Option<MultiPolygon<f64>> = match shape {
            shapefile::Shape::Polygon(polygon) => Some(polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?),
            shapefile::Shape::PolygonM(polygon) => Some(polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?),
            shapefile::Shape::PolygonZ(polygon) => Some(polygon.try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?),
            _ => None,
        };

        let attributes = HashMap::<String, FieldValue>::from(record)
            .into_iter()
            .map(|(name, value)| {
                let value = match value {
                    FieldValue::Character(Some(s)) => AttrValue::Text(s),
                    FieldValue::Memo(s) => AttrValue::Text(s),
                    FieldValue::Numeric(Some(n)) => AttrValue::Number(n),
                    FieldValue::Float(Some(n)) => AttrValue::Number(f64::from(n)),
                    FieldValue::Integer(n) => AttrValue::Number(f64::from(n)),
                    FieldValue::Double(n) => AttrValue::Number(n),
                    FieldValue::Currency(n) => AttrValue::Number(n),
                    _ => AttrValue::Null,
                };
                (name, value)
            })
            .collect();

        features.push(RawFeature { attributes, geometry });
    }

    let prj = path.with_extension("prj");
    let declared_crs = if prj.exists() {
        let wkt = fs::read_to_string(&prj)
            .with_context(|| format!("Failed to read projection file: {:?}", prj))?;
        Some(Crs::from_wkt(&wkt).ok_or_else(|| LoadError::UnsupportedCrs(wkt.trim().to_string()))?)
    } else {
        None
    };

    Ok(RawCollection { features, declared_crs })
}

fn read_geojson(path: &Path) -> Result<RawCollection> {
    use geojson::GeoJson;
    use std::io::BufReader;

    let file = File::open(path)
        .with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let geojson = GeoJson::from_reader(BufReader::new(file)).context("Failed to parse GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(LoadError::NotFeatureCollection.into()),
    };

    // Pre-RFC 7946 files still carry a named "crs" member.
    let declared_crs = match collection
        .foreign_members
        .as_ref()
        .and_then(|members| members.get("crs"))
        .and_then(|crs| crs.pointer("/properties/name"))
        .and_then(|name| name.as_str())
    {
        Some(name) => Some(Crs::from_name(name).ok_or_else(|| LoadError::UnsupportedCrs(name.to_string()))?),
        None => None,
    };

    let mut features = Vec::with_capacity(collection.features.len());

    for feature in collection.features {
        let attributes = feature
            .properties
            .unwrap_or_default()
            .into_iter()
            .map(|(name, value)| {
                let value = match value {
                    serde_json::Value::String(s) => AttrValue::Text(s),
                    serde_json::Value::Number(n) => n.as_f64().map_or(AttrValue::Null, AttrValue::Number),
                    _ => AttrValue::Null,
                };
                (name, value)
            })
            .collect();

        let geometry = match feature.geometry {
            Some(geom) => {
                let value: geo::Geometry<f64> = geom.value.try_into()
                    .map_err(|e| anyhow!("Failed to convert geojson geometry: {:?}", e))?;
                match value {
                    geo::Geometry::MultiPolygon(mp) => Some(mp),
                    geo::Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p])),
                    _ => None,
                }
            }
            None => None,
        };

        features.push(RawFeature { attributes, geometry });
    }

    Ok(RawCollection { features, declared_crs })
}

/// Normalises, reprojects and validates raw features. Features without a
/// usable polygon geometry are dropped; collection order is preserved.
pub fn build_records(
    features: Vec<RawFeature>,
    crs: Crs,
    aliases: &HashMap<String, String>,
) -> Vec<BoundaryRecord> {
    features
        .into_par_iter()
        .filter_map(|feature| {
            let geometry = crs.reproject(&feature.geometry?);
            if geometry.is_empty() || !geometry.is_valid() {
                return None;
            }

            let attributes: HashMap<String, AttrValue> = feature
                .attributes
                .into_iter()
                .map(|(k, v)| (normalize_key(&k, aliases), v))
                .collect();

            let label = |key: &str| attributes.get(key).and_then(AttrValue::as_label);
            // Missing count columns read as zero.
            let count = |key: &str| attributes.get(key).map_or(0, AttrValue::as_count);

            Some(BoundaryRecord {
                region: label(REGION),
                cercle: label(CERCLE),
                commune: label(COMMUNE),
                area_id: label(AREA_ID),
                population: count(POPULATION),
                population_ct: count(POPULATION_CT),
                geometry,
            })
        })
        .collect()
}

/// Record counts per region, sorted by region name. Records without a
/// region are counted under `None`.
pub fn region_summary(dataset: &Dataset) -> Vec<(Option<String>, usize)> {
    let mut counts: HashMap<Option<String>, usize> = HashMap::new();
    for record in dataset.records() {
        *counts.entry(record.region.clone()).or_default() += 1;
    }
    let mut summary: Vec<_> = counts.into_iter().collect();
    summary.sort();
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::square;
    use geo::{polygon, Polygon};
    use std::io::Write;

    const ZONES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature",
             "properties": {" LREGION ": "Kayes", "LCERCLE": "Kayes", "LCOMMUNE": "Kayes", "IDSE_NEW": 1001, "POP_SE": 250, "POP_SE_CT": 40.0},
             "geometry": {"type": "Polygon", "coordinates": [[[-11.5, 14.4], [-11.4, 14.4], [-11.4, 14.5], [-11.5, 14.5], [-11.5, 14.4]]]}},
            {"type": "Feature",
             "properties": {"LREGION": "Kayes", "LCERCLE": "Kayes", "LCOMMUNE": "Logo", "IDSE_NEW": "SE-2"},
             "geometry": {"type": "Polygon", "coordinates": [[[-11.3, 14.4], [-11.2, 14.4], [-11.2, 14.5], [-11.3, 14.5], [-11.3, 14.4]]]}},
            {"type": "Feature",
             "properties": {"LREGION": "Kayes"},
             "geometry": null},
            {"type": "Feature",
             "properties": {"LREGION": "Kayes"},
             "geometry": {"type": "Point", "coordinates": [-11.3, 14.4]}}
        ]
    }"#;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn loads_geojson_and_normalizes_columns() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "zones.geojson", ZONES);

        let dataset = load_data(&AppConfig::for_data_dir(dir.path())).unwrap();
        assert_eq!(dataset.len(), 2);

        let first = &dataset.records()[0];
        assert_eq!(first.region.as_deref(), Some("Kayes"));
        assert_eq!(first.commune.as_deref(), Some("Kayes"));
        assert_eq!(first.area_id.as_deref(), Some("1001"));
        assert_eq!(first.population, 250);
        assert_eq!(first.population_ct, 40);

        // Count columns absent from the feature are synthesised as zero.
        let second = &dataset.records()[1];
        assert_eq!(second.area_id.as_deref(), Some("SE-2"));
        assert_eq!(second.population, 0);
        assert_eq!(second.population_ct, 0);
    }

    #[test]
    fn empty_directory_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "readme.txt", "nothing here");

        let err = load_data(&AppConfig::for_data_dir(dir.path())).unwrap_err();
        assert!(matches!(err.downcast_ref::<LoadError>(), Some(LoadError::NoData(_))));
    }

    #[test]
    fn shapefile_is_preferred_over_geojson() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "a.geojson", ZONES);
        write_file(dir.path(), "z.shp", "");
        write_file(dir.path(), "b.geojson", ZONES);

        let found = find_geometry_file(dir.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "z.shp");

        fs::remove_file(dir.path().join("z.shp")).unwrap();
        let found = find_geometry_file(dir.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "a.geojson");
    }

    #[test]
    fn loads_projected_shapefile() {
        use geo::BoundingRect;
        use shapefile::dbase::{self, FieldValue, Record};

        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("zones.shp");
        {
            let table = dbase::TableWriterBuilder::new()
                .add_character_field("LRegion".try_into().unwrap(), 20)
                .add_character_field("LCercle".try_into().unwrap(), 20)
                .add_character_field("LCommune".try_into().unwrap(), 20)
                .add_character_field("IDSE_NEW".try_into().unwrap(), 10)
                .add_numeric_field("Pop_SE".try_into().unwrap(), 10, 0)
                .add_numeric_field("POP_SE_CT".try_into().unwrap(), 10, 0);
            let mut writer = shapefile::Writer::from_path(&shp, table).unwrap();

            let mut record = Record::default();
            record.insert("LRegion".to_string(), FieldValue::Character(Some("Segou".to_string())));
            record.insert("LCercle".to_string(), FieldValue::Character(Some("San".to_string())));
            record.insert("LCommune".to_string(), FieldValue::Character(Some("Tene".to_string())));
            record.insert("IDSE_NEW".to_string(), FieldValue::Character(Some("4207".to_string())));
            record.insert("Pop_SE".to_string(), FieldValue::Numeric(Some(310.0)));
            record.insert("POP_SE_CT".to_string(), FieldValue::Numeric(Some(52.0)));

            // Ten kilometres square, west edge on the zone 30 central meridian.
            let shape = shapefile::Polygon::from(square(500_000.0, 1_500_000.0, 10_000.0));
            writer.write_shape_and_record(&shape, &record).unwrap();
        }
        write_file(
            dir.path(),
            "zones.prj",
            r#"PROJCS["WGS_1984_UTM_Zone_30N",GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]]],PROJECTION["Transverse_Mercator"],PARAMETER["Central_Meridian",-3.0],UNIT["Meter",1.0]]"#,
        );

        let dataset = load_data(&AppConfig::for_data_dir(dir.path())).unwrap();
        assert_eq!(dataset.len(), 1);

        let zone = &dataset.records()[0];
        assert_eq!(zone.region.as_deref(), Some("Segou"));
        assert_eq!(zone.cercle.as_deref(), Some("San"));
        assert_eq!(zone.commune.as_deref(), Some("Tene"));
        assert_eq!(zone.area_id.as_deref(), Some("4207"));
        assert_eq!(zone.population, 310);
        assert_eq!(zone.population_ct, 52);

        let rect = zone.geometry.bounding_rect().unwrap();
        assert!((rect.min().x - (-3.0)).abs() < 1e-6);
        assert!(rect.max().x > -3.0 && rect.max().x < -2.8);
        assert!(rect.min().y > 13.5 && rect.max().y < 13.7);
        assert!(dataset.locate(13.6, -2.95).is_some());
    }

    #[test]
    fn legacy_crs_member_triggers_reprojection() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "utm.geojson",
            r#"{
                "type": "FeatureCollection",
                "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::32630"}},
                "features": [{"type": "Feature", "properties": {"region": "Segou"},
                  "geometry": {"type": "Polygon", "coordinates": [[[500000, 1500000], [510000, 1500000], [510000, 1510000], [500000, 1510000], [500000, 1500000]]]}}]
            }"#,
        );

        let dataset = load_data(&AppConfig::for_data_dir(dir.path())).unwrap();
        let rect = crate::types::bounds(dataset.records()).unwrap();
        assert!((rect.min().x - (-3.0)).abs() < 1e-9);
        assert!(rect.min().y > 13.0 && rect.max().y < 14.0);
    }

    #[test]
    fn unknown_crs_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "lambert.geojson",
            r#"{"type": "FeatureCollection",
                "crs": {"type": "name", "properties": {"name": "EPSG:2154"}},
                "features": []}"#,
        );
        let err = load_data(&AppConfig::for_data_dir(dir.path())).unwrap_err();
        assert!(matches!(err.downcast_ref::<LoadError>(), Some(LoadError::UnsupportedCrs(_))));
    }

    #[test]
    fn invalid_and_empty_geometries_are_dropped() {
        // Self-intersecting bow tie.
        let bow_tie: Polygon<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 1.0, y: 0.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ];
        let features = vec![
            RawFeature { attributes: HashMap::new(), geometry: Some(square(0.0, 0.0, 1.0)) },
            RawFeature { attributes: HashMap::new(), geometry: Some(MultiPolygon::new(vec![bow_tie])) },
            RawFeature { attributes: HashMap::new(), geometry: Some(MultiPolygon::new(vec![])) },
            RawFeature { attributes: HashMap::new(), geometry: None },
        ];

        let records = build_records(features, Crs::Geographic, &alias_table(&HashMap::new()));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].population, 0);
    }

    #[test]
    fn configured_aliases_extend_builtins() {
        let mut extra = HashMap::new();
        extra.insert("NOM_SE".to_string(), "idse_new".to_string());
        let table = alias_table(&extra);

        assert_eq!(normalize_key("  Nom_SE ", &table), AREA_ID);
        assert_eq!(normalize_key("LREGION", &table), REGION);
        assert_eq!(normalize_key("Autre", &table), "autre");
    }

    #[test]
    fn summary_counts_per_region() {
        let dataset = Dataset::new(crate::types::fixtures::sample());
        let summary = region_summary(&dataset);
        assert_eq!(
            summary,
            vec![
                (Some("Kayes".to_string()), 4),
                (Some("Koulikoro".to_string()), 1),
                (Some("Sikasso".to_string()), 1),
            ]
        );
    }
}
