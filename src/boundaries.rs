use crate::config::BoundariesConfig;
use crate::crs::{self, SourceCrs};
use crate::results::parse_district;
use crate::types::DistrictBoundary;
use anyhow::{anyhow, Context, Result};
use geo::MultiPolygon;
use shapefile::dbase::FieldValue;
use shapefile::Reader;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{info, warn};

/// Loads district boundary polygons plus the CRS their coordinates are in.
///
/// Shapefiles report their CRS through the .prj sidecar; GeoJSON is lon/lat
/// by specification. A `crs` config override wins over both.
pub fn load_boundaries(
    path: &Path,
    config: &BoundariesConfig,
) -> Result<(Vec<DistrictBoundary>, SourceCrs)> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Boundary geometry file has no extension"))?;

    let (boundaries, detected) = match extension.as_str() {
        "shp" => (load_shapefile(path, config)?, detect_shapefile_crs(path)?),
        "json" | "geojson" => (load_geojson(path, config)?, Some(SourceCrs::Geographic)),
        _ => return Err(anyhow!("Unsupported geometry format: {}", extension)),
    };

    let source_crs = match &config.crs {
        Some(name) => crs::from_epsg(name)?,
        None => detected.ok_or_else(|| {
            anyhow!("No .prj sidecar next to {:?}; set boundaries.crs in the config", path)
        })?,
    };

    info!(
        count = boundaries.len(),
        crs = ?source_crs,
        "Loaded district boundaries"
    );
    Ok((boundaries, source_crs))
}

fn detect_shapefile_crs(shp_path: &Path) -> Result<Option<SourceCrs>> {
    let prj_path = shp_path.with_extension("prj");
    if !prj_path.exists() {
        return Ok(None);
    }
    let wkt = std::fs::read_to_string(&prj_path)
        .with_context(|| format!("Failed to read .prj sidecar: {:?}", prj_path))?;
    crs::detect_from_wkt(&wkt).map(Some)
}

fn field_as_string(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Character(Some(s)) => Some(s.trim().to_string()),
        FieldValue::Character(None) => None,
        FieldValue::Numeric(Some(n)) => Some(format!("{}", *n as i64)),
        FieldValue::Numeric(None) => None,
        _ => None,
    }
}

fn load_shapefile(path: &Path, config: &BoundariesConfig) -> Result<Vec<DistrictBoundary>> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open shapefile: {:?}", path))?;

    let mut boundaries = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let state = match record.get(&config.state_field) {
            Some(value) => match field_as_string(value) {
                Some(s) => s,
                None => continue, // Null state, nothing to join on
            },
            None => {
                return Err(anyhow!(
                    "Field '{}' not found in shapefile attributes",
                    config.state_field
                ))
            }
        };

        let district_raw = record
            .get(&config.district_field)
            .ok_or_else(|| {
                anyhow!(
                    "Field '{}' not found in shapefile attributes",
                    config.district_field
                )
            })
            .map(field_as_string)?;
        let district = match district_raw.as_deref().map(parse_district) {
            Some(Ok(d)) => d,
            _ => {
                warn!(state = %state, raw = ?district_raw, "Skipping record with unparseable district field");
                continue;
            }
        };

        let geometry = match shape {
            shapefile::Shape::Polygon(polygon) => {
                let geo_polygon: MultiPolygon<f64> = polygon
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?;
                geo_polygon
            }
            shapefile::Shape::PolygonM(polygon) => {
                let geo_polygon: MultiPolygon<f64> = polygon
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?;
                geo_polygon
            }
            shapefile::Shape::PolygonZ(polygon) => {
                let geo_polygon: MultiPolygon<f64> = polygon
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?;
                geo_polygon
            }
            _ => continue, // Skip non-polygon shapes
        };

        boundaries.push(DistrictBoundary {
            state,
            district,
            geometry,
        });
    }

    Ok(boundaries)
}

fn load_geojson(path: &Path, config: &BoundariesConfig) -> Result<Vec<DistrictBoundary>> {
    use geojson::GeoJson;

    let file = File::open(path)
        .with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let reader = BufReader::new(file);

    // Parses the whole file into memory; district boundary collections are
    // small enough for that.
    let geojson = GeoJson::from_reader(reader).context("Failed to parse GeoJSON")?;
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut boundaries = Vec::new();

    for feature in collection.features {
        let props = feature.properties.as_ref();
        let state = match props.and_then(|p| p.get(&config.state_field)) {
            Some(serde_json::Value::String(s)) => s.trim().to_string(),
            _ => continue,
        };
        let district = match props.and_then(|p| p.get(&config.district_field)) {
            Some(serde_json::Value::String(s)) => match parse_district(s) {
                Ok(d) => d,
                Err(_) => {
                    warn!(state = %state, raw = %s, "Skipping feature with unparseable district property");
                    continue;
                }
            },
            Some(serde_json::Value::Number(n)) => match n.as_u64() {
                Some(d) => d as u32,
                None => continue,
            },
            _ => continue,
        };

        let geometry = match feature.geometry {
            Some(geom) => {
                let geo_geom: geo::Geometry<f64> = geom
                    .value
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert GeoJSON geometry: {:?}", e))?;
                match geo_geom {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => continue, // Skip points/lines
                }
            }
            None => continue,
        };

        boundaries.push(DistrictBoundary {
            state,
            district,
            geometry,
        });
    }

    Ok(boundaries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dbase_fields_normalize_to_strings() {
        assert_eq!(
            field_as_string(&FieldValue::Character(Some(" 05 ".to_string()))),
            Some("05".to_string())
        );
        assert_eq!(field_as_string(&FieldValue::Character(None)), None);
        assert_eq!(
            field_as_string(&FieldValue::Numeric(Some(12.0))),
            Some("12".to_string())
        );
        assert_eq!(field_as_string(&FieldValue::Numeric(None)), None);
    }

    #[test]
    fn geojson_features_load_and_normalize_districts() {
        let geojson_str = r#"{
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"STATENAME": "North Carolina", "DISTRICT": "03"},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[-78.0, 35.0], [-77.0, 35.0], [-77.0, 36.0], [-78.0, 35.0]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": {"STATENAME": "North Carolina", "DISTRICT": 7},
                    "geometry": {
                        "type": "MultiPolygon",
                        "coordinates": [[[[-79.0, 34.0], [-78.5, 34.0], [-78.5, 34.5], [-79.0, 34.0]]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": {"STATENAME": "North Carolina", "DISTRICT": "??"},
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[-80.0, 35.0], [-79.5, 35.0], [-79.5, 35.5], [-80.0, 35.0]]]
                    }
                }
            ]
        }"#;

        let dir = std::env::temp_dir().join(format!("votemap-bnd-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("districts.geojson");
        std::fs::write(&path, geojson_str).unwrap();

        let config = BoundariesConfig {
            url: None,
            path: Some(path.clone()),
            cache_dir: dir.clone(),
            state_field: "STATENAME".to_string(),
            district_field: "DISTRICT".to_string(),
            crs: None,
        };
        let (boundaries, crs) = load_boundaries(&path, &config).unwrap();
        assert_eq!(crs, SourceCrs::Geographic);
        assert_eq!(boundaries.len(), 2);
        assert_eq!(boundaries[0].district, 3);
        assert_eq!(boundaries[1].district, 7);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
