use crate::types::DistrictBoundary;
use anyhow::{anyhow, Result};
use geo::{Coord, MapCoordsInPlace};
use std::f64::consts::PI;

pub const TILE_SIZE: u32 = 256;

const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// The coordinate systems district boundary files actually ship in.
/// Everything downstream of the loader works in EPSG:4326 lon/lat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceCrs {
    /// Geographic lon/lat (EPSG:4326, or EPSG:4269 which is identical for
    /// mapping purposes at this scale).
    Geographic,
    /// Web Mercator / Pseudo-Mercator (EPSG:3857).
    WebMercator,
}

/// Detects the CRS from the WKT in a shapefile's .prj sidecar.
///
/// Unknown projected systems are an error rather than a silent pass-through:
/// rendering projected meters as degrees produces a blank map with no hint
/// of what went wrong.
pub fn detect_from_wkt(wkt: &str) -> Result<SourceCrs> {
    let upper = wkt.to_uppercase();
    if upper.contains("PSEUDO-MERCATOR")
        || upper.contains("WEB_MERCATOR")
        || upper.contains("MERCATOR_AUXILIARY_SPHERE")
        || upper.contains("\"3857\"")
    {
        return Ok(SourceCrs::WebMercator);
    }
    if upper.trim_start().starts_with("GEOGCS") || upper.trim_start().starts_with("GEOGCRS") {
        return Ok(SourceCrs::Geographic);
    }
    Err(anyhow!(
        "Unsupported coordinate reference system in .prj: {}",
        wkt.trim()
    ))
}

/// Parses a config override such as "EPSG:4326".
pub fn from_epsg(name: &str) -> Result<SourceCrs> {
    match name.trim().to_uppercase().as_str() {
        "EPSG:4326" | "EPSG:4269" | "4326" | "4269" => Ok(SourceCrs::Geographic),
        "EPSG:3857" | "3857" => Ok(SourceCrs::WebMercator),
        other => Err(anyhow!("Unsupported CRS override: {}", other)),
    }
}

fn mercator_to_lonlat(x: f64, y: f64) -> (f64, f64) {
    let lon = (x / EARTH_RADIUS_M).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS_M).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

/// Reprojects boundary geometry in place so that coordinates are EPSG:4326
/// lon/lat. Geographic input passes through untouched.
pub fn reproject_to_wgs84(boundaries: &mut [DistrictBoundary], crs: SourceCrs) {
    if crs == SourceCrs::Geographic {
        return;
    }
    for boundary in boundaries.iter_mut() {
        boundary.geometry.map_coords_in_place(|c| {
            let (lon, lat) = mercator_to_lonlat(c.x, c.y);
            Coord { x: lon, y: lat }
        });
    }
}

/// Fractional web-mercator tile coordinates for a lon/lat point at a zoom
/// level. Integer parts identify the tile, fractional parts the position
/// within it.
pub fn lonlat_to_tile_frac(lon: f64, lat: f64, zoom: u8) -> (f64, f64) {
    let n = 2.0_f64.powi(zoom as i32);
    let x = (lon + 180.0) / 360.0 * n;
    let lat_rad = lat.to_radians();
    let y = (1.0 - (lat_rad.tan() + (1.0 / lat_rad.cos())).ln() / PI) / 2.0 * n;
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WGS84_WKT: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;
    const NAD83_WKT: &str = r#"GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;
    const MERCATOR_WKT: &str = r#"PROJCS["WGS_1984_Web_Mercator_Auxiliary_Sphere",GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Mercator_Auxiliary_Sphere"]]"#;
    const LAMBERT_WKT: &str = r#"PROJCS["NAD_1983_StatePlane_North_Carolina",GEOGCS["GCS_North_American_1983"],PROJECTION["Lambert_Conformal_Conic"]]"#;

    #[test]
    fn wkt_detection() {
        assert_eq!(detect_from_wkt(WGS84_WKT).unwrap(), SourceCrs::Geographic);
        assert_eq!(detect_from_wkt(NAD83_WKT).unwrap(), SourceCrs::Geographic);
        assert_eq!(
            detect_from_wkt(MERCATOR_WKT).unwrap(),
            SourceCrs::WebMercator
        );
        assert!(detect_from_wkt(LAMBERT_WKT).is_err());
    }

    #[test]
    fn epsg_overrides() {
        assert_eq!(from_epsg("EPSG:4326").unwrap(), SourceCrs::Geographic);
        assert_eq!(from_epsg("epsg:3857").unwrap(), SourceCrs::WebMercator);
        assert!(from_epsg("EPSG:32119").is_err());
    }

    #[test]
    fn mercator_inverse_known_points() {
        let (lon, lat) = mercator_to_lonlat(0.0, 0.0);
        assert!(lon.abs() < 1e-9);
        assert!(lat.abs() < 1e-9);

        // Antimeridian.
        let (lon, _) = mercator_to_lonlat(EARTH_RADIUS_M * PI, 0.0);
        assert!((lon - 180.0).abs() < 1e-9);

        // Raleigh, NC: EPSG:3857 coordinates of (-78.64, 35.78).
        let (lon, lat) = mercator_to_lonlat(-8754_153.0, 4269_347.0);
        assert!((lon - (-78.6403)).abs() < 0.01);
        assert!((lat - 35.7804).abs() < 0.01);
    }

    #[test]
    fn tile_math_at_origin() {
        // lon/lat (0,0) sits at the corner shared by the four z1 tiles.
        let (x, y) = lonlat_to_tile_frac(0.0, 0.0, 1);
        assert!((x - 1.0).abs() < 1e-9);
        assert!((y - 1.0).abs() < 1e-9);

        let (x, y) = lonlat_to_tile_frac(-180.0, 0.0, 0);
        assert!(x.abs() < 1e-9);
        assert!((y - 0.5).abs() < 1e-9);
    }
}
