use crate::config::{FillMode, OutputConfig};
use crate::crs::{lonlat_to_tile_frac, TILE_SIZE};
use crate::types::{District, DistrictVotes, Winner};
use anyhow::{anyhow, Context, Result};
use geo::{BoundingRect, MultiPolygon, Rect};
use image::{ImageBuffer, Rgba, RgbaImage};
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use tracing::info;

pub const VIEWER_HTML: &str = include_str!("viewer.html");

const OUTLINE_COLOR: Rgba<u8> = Rgba([60, 60, 60, 255]);
const BACKGROUND_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);
/// Tiles are drawn semi-transparent so the basemap shows through underneath.
const TILE_FILL_ALPHA: u8 = 200;

pub fn fill_color(config: &OutputConfig, votes: &DistrictVotes) -> Rgba<u8> {
    match config.fill {
        FillMode::Winner => match votes.winner {
            Winner::Democrat => hex_to_rgba(&config.dem_color),
            Winner::Republican => hex_to_rgba(&config.rep_color),
            Winner::Tied => hex_to_rgba(&config.tie_color),
        },
        FillMode::Share => share_ramp(votes.rep_share),
    }
}

fn hex_to_rgba(hex: &str) -> Rgba<u8> {
    let hex = hex.trim_start_matches('#');
    let r = u8::from_str_radix(hex.get(0..2).unwrap_or("00"), 16).unwrap_or(0);
    let g = u8::from_str_radix(hex.get(2..4).unwrap_or("00"), 16).unwrap_or(0);
    let b = u8::from_str_radix(hex.get(4..6).unwrap_or("00"), 16).unwrap_or(0);
    Rgba([r, g, b, 255])
}

/// Diverging blue/white/red ramp over the Republican vote share
/// (ColorBrewer RdBu endpoints).
fn share_ramp(share: f64) -> Rgba<u8> {
    const BLUE: [f64; 3] = [33.0, 102.0, 172.0];
    const WHITE: [f64; 3] = [247.0, 247.0, 247.0];
    const RED: [f64; 3] = [178.0, 24.0, 43.0];

    let t = share.clamp(0.0, 1.0);
    let (from, to, f) = if t < 0.5 {
        (BLUE, WHITE, t * 2.0)
    } else {
        (WHITE, RED, (t - 0.5) * 2.0)
    };
    let channel = |i: usize| (from[i] + (to[i] - from[i]) * f).round() as u8;
    Rgba([channel(0), channel(1), channel(2), 255])
}

fn overall_bounds(districts: &[District]) -> Result<Rect<f64>> {
    let mut bounds: Option<Rect<f64>> = None;
    for district in districts {
        let rect = district
            .geometry
            .bounding_rect()
            .ok_or_else(|| anyhow!("District {} has empty geometry", district.votes.district))?;
        bounds = Some(match bounds {
            None => rect,
            Some(acc) => Rect::new(
                geo::Coord {
                    x: acc.min().x.min(rect.min().x),
                    y: acc.min().y.min(rect.min().y),
                },
                geo::Coord {
                    x: acc.max().x.max(rect.max().x),
                    y: acc.max().y.max(rect.max().y),
                },
            ),
        });
    }
    bounds.ok_or_else(|| anyhow!("No districts to render"))
}

/// Even-odd scanline fill of a multipolygon, with `project` mapping lon/lat
/// to image pixel coordinates. Interior rings become holes for free under
/// the even-odd rule.
fn fill_multipolygon(
    img: &mut RgbaImage,
    mp: &MultiPolygon<f64>,
    color: Rgba<u8>,
    project: &dyn Fn(f64, f64) -> (f64, f64),
) {
    let (width, height) = img.dimensions();
    for polygon in &mp.0 {
        let mut rings: Vec<Vec<(f64, f64)>> = Vec::new();
        let mut push_ring = |ring: &geo::LineString<f64>| {
            let pts: Vec<(f64, f64)> = ring.0.iter().map(|c| project(c.x, c.y)).collect();
            if pts.len() >= 3 {
                rings.push(pts);
            }
        };
        push_ring(polygon.exterior());
        for interior in polygon.interiors() {
            push_ring(interior);
        }
        if rings.is_empty() {
            continue;
        }

        let y_min = rings
            .iter()
            .flatten()
            .map(|p| p.1)
            .fold(f64::INFINITY, f64::min);
        let y_max = rings
            .iter()
            .flatten()
            .map(|p| p.1)
            .fold(f64::NEG_INFINITY, f64::max);
        let row_start = y_min.floor().max(0.0) as u32;
        let row_end = (y_max.ceil().min(height as f64 - 1.0)).max(0.0) as u32;

        for row in row_start..=row_end {
            let scan_y = row as f64 + 0.5;
            let mut crossings: Vec<f64> = Vec::new();
            for ring in &rings {
                for pair in ring.windows(2) {
                    let (x1, y1) = pair[0];
                    let (x2, y2) = pair[1];
                    // Half-open edge test keeps vertices from double-counting.
                    if (y1 <= scan_y && scan_y < y2) || (y2 <= scan_y && scan_y < y1) {
                        crossings.push(x1 + (scan_y - y1) * (x2 - x1) / (y2 - y1));
                    }
                }
            }
            crossings.sort_by(f64::total_cmp);
            for span in crossings.chunks(2) {
                if span.len() < 2 {
                    break;
                }
                // Fill pixels whose center lies inside [span0, span1).
                let x_start = (span[0] - 0.5).ceil().max(0.0) as u32;
                let x_end = ((span[1] - 0.5).floor().min(width as f64 - 1.0)).max(0.0) as u32;
                for x in x_start..=x_end {
                    if (x as f64 + 0.5) >= span[0] && (x as f64 + 0.5) < span[1] {
                        img.put_pixel(x, row, color);
                    }
                }
            }
        }
    }
}

fn stroke_multipolygon(
    img: &mut RgbaImage,
    mp: &MultiPolygon<f64>,
    color: Rgba<u8>,
    project: &dyn Fn(f64, f64) -> (f64, f64),
) {
    let (width, height) = img.dimensions();
    let mut plot = |x: f64, y: f64| {
        if x >= 0.0 && y >= 0.0 && (x as u32) < width && (y as u32) < height {
            img.put_pixel(x as u32, y as u32, color);
        }
    };
    for polygon in &mp.0 {
        let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors().iter());
        for ring in rings {
            let pts: Vec<(f64, f64)> = ring.0.iter().map(|c| project(c.x, c.y)).collect();
            for pair in pts.windows(2) {
                let (x1, y1) = pair[0];
                let (x2, y2) = pair[1];
                let steps = (x2 - x1).abs().max((y2 - y1).abs()).ceil().max(1.0) as usize;
                for i in 0..=steps {
                    let t = i as f64 / steps as f64;
                    plot(x1 + (x2 - x1) * t, y1 + (y2 - y1) * t);
                }
            }
        }
    }
}

/// Renders the static choropleth PNG on an equirectangular fit of the
/// joined districts' bounding box.
pub fn render_static(config: &OutputConfig, districts: &[District]) -> Result<()> {
    let bounds = overall_bounds(districts)?;
    let lon_span = (bounds.max().x - bounds.min().x).max(1e-9);
    let lat_span = (bounds.max().y - bounds.min().y).max(1e-9);
    let mid_lat = (bounds.min().y + bounds.max().y) / 2.0;

    // Degrees of longitude shrink by cos(lat); correct the aspect ratio so
    // districts keep their shape.
    let width = config.width.max(16);
    let height = ((width as f64) * lat_span / (lon_span * mid_lat.to_radians().cos().max(0.05)))
        .round()
        .max(16.0) as u32;

    let project = move |lon: f64, lat: f64| -> (f64, f64) {
        let px = (lon - bounds.min().x) / lon_span * (width as f64 - 1.0);
        let py = (bounds.max().y - lat) / lat_span * (height as f64 - 1.0);
        (px, py)
    };

    let mut img: RgbaImage = ImageBuffer::from_pixel(width, height, BACKGROUND_COLOR);
    for district in districts {
        let color = fill_color(config, &district.votes);
        fill_multipolygon(&mut img, &district.geometry, color, &project);
    }
    for district in districts {
        stroke_multipolygon(&mut img, &district.geometry, OUTLINE_COLOR, &project);
    }

    if let Some(parent) = config.static_map.parent() {
        fs::create_dir_all(parent)?;
    }
    img.save(&config.static_map)
        .with_context(|| format!("Failed to save static map: {:?}", config.static_map))?;
    info!(path = ?config.static_map, width, height, "Wrote static choropleth");
    Ok(())
}

/// Renders the web-mercator tile pyramid, tiles/{z}/{x}/{y}.png, zoom
/// levels in parallel.
pub fn generate_tiles(config: &OutputConfig, districts: &[District]) -> Result<()> {
    let bounds = overall_bounds(districts)?;
    info!(
        min_zoom = config.min_zoom,
        max_zoom = config.max_zoom,
        "Generating tile pyramid"
    );

    (config.min_zoom..=config.max_zoom)
        .into_par_iter()
        .try_for_each(|zoom| render_zoom_level(config, zoom, districts, &bounds))?;
    Ok(())
}

fn render_zoom_level(
    config: &OutputConfig,
    zoom: u8,
    districts: &[District],
    bounds: &Rect<f64>,
) -> Result<()> {
    let n = 1u32 << zoom;
    // Tile y grows southward: min lat gives the bottom row.
    let (x_min_f, y_max_f) = lonlat_to_tile_frac(bounds.min().x, bounds.min().y, zoom);
    let (x_max_f, y_min_f) = lonlat_to_tile_frac(bounds.max().x, bounds.max().y, zoom);
    let tx_range = (x_min_f.floor().max(0.0) as u32)..=(x_max_f.floor() as u32).min(n - 1);
    let ty_range = (y_min_f.floor().max(0.0) as u32)..=(y_max_f.floor() as u32).min(n - 1);

    let fills: Vec<Rgba<u8>> = districts
        .iter()
        .map(|d| {
            let Rgba([r, g, b, _]) = fill_color(config, &d.votes);
            Rgba([r, g, b, TILE_FILL_ALPHA])
        })
        .collect();

    let mut written = 0usize;
    for tx in tx_range {
        for ty in ty_range.clone() {
            let project = move |lon: f64, lat: f64| -> (f64, f64) {
                let (xf, yf) = lonlat_to_tile_frac(lon, lat, zoom);
                (
                    (xf - tx as f64) * TILE_SIZE as f64,
                    (yf - ty as f64) * TILE_SIZE as f64,
                )
            };

            let mut img: RgbaImage = ImageBuffer::new(TILE_SIZE, TILE_SIZE);
            for (district, fill) in districts.iter().zip(&fills) {
                fill_multipolygon(&mut img, &district.geometry, *fill, &project);
            }
            for district in districts {
                stroke_multipolygon(&mut img, &district.geometry, OUTLINE_COLOR, &project);
            }

            // Tiles outside every district stay fully transparent; skip them.
            if img.pixels().all(|p| p[3] == 0) {
                continue;
            }

            let x_dir = config.tile_dir.join(zoom.to_string()).join(tx.to_string());
            fs::create_dir_all(&x_dir).context("Failed to create tile directory")?;
            let path = x_dir.join(format!("{}.png", ty));
            img.save(&path)
                .with_context(|| format!("Failed to save tile: {:?}", path))?;
            written += 1;
        }
    }
    info!(zoom, tiles = written, "Rendered zoom level");
    Ok(())
}

/// Writes the interactive Leaflet viewer next to the tile directory.
pub fn write_viewer(config: &OutputConfig) -> Result<()> {
    let dir = config.tile_dir.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(dir)?;
    let path = dir.join("index.html");
    fs::write(&path, VIEWER_HTML)
        .with_context(|| format!("Failed to write viewer page: {:?}", path))?;
    info!(path = ?path, "Wrote interactive viewer");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn identity() -> impl Fn(f64, f64) -> (f64, f64) {
        |x, y| (x, y)
    }

    #[test]
    fn hex_colors_parse() {
        assert_eq!(hex_to_rgba("#2166ac"), Rgba([0x21, 0x66, 0xac, 255]));
        assert_eq!(hex_to_rgba("b2182b"), Rgba([0xb2, 0x18, 0x2b, 255]));
        assert_eq!(hex_to_rgba("#xyz"), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn share_ramp_endpoints_and_midpoint() {
        assert_eq!(share_ramp(0.0), Rgba([33, 102, 172, 255]));
        assert_eq!(share_ramp(1.0), Rgba([178, 24, 43, 255]));
        assert_eq!(share_ramp(0.5), Rgba([247, 247, 247, 255]));
        // Out-of-range values clamp instead of wrapping.
        assert_eq!(share_ramp(-1.0), share_ramp(0.0));
        assert_eq!(share_ramp(2.0), share_ramp(1.0));
    }

    #[test]
    fn scanline_fill_covers_interior_only() {
        let square = MultiPolygon::new(vec![polygon![
            (x: 2.0, y: 2.0),
            (x: 12.0, y: 2.0),
            (x: 12.0, y: 12.0),
            (x: 2.0, y: 12.0),
        ]]);
        let mut img: RgbaImage = ImageBuffer::new(16, 16);
        let red = Rgba([255, 0, 0, 255]);
        fill_multipolygon(&mut img, &square, red, &identity());

        assert_eq!(*img.get_pixel(7, 7), red);
        assert_eq!(*img.get_pixel(3, 11), red);
        assert_eq!(img.get_pixel(0, 0)[3], 0);
        assert_eq!(img.get_pixel(14, 14)[3], 0);
    }

    #[test]
    fn scanline_fill_respects_holes() {
        let donut = MultiPolygon::new(vec![polygon![
            exterior: [
                (x: 0.0, y: 0.0),
                (x: 12.0, y: 0.0),
                (x: 12.0, y: 12.0),
                (x: 0.0, y: 12.0),
            ],
            interiors: [
                [
                    (x: 4.0, y: 4.0),
                    (x: 8.0, y: 4.0),
                    (x: 8.0, y: 8.0),
                    (x: 4.0, y: 8.0),
                ],
            ],
        ]]);
        let mut img: RgbaImage = ImageBuffer::new(16, 16);
        let blue = Rgba([0, 0, 255, 255]);
        fill_multipolygon(&mut img, &donut, blue, &identity());

        assert_eq!(*img.get_pixel(2, 6), blue);
        assert_eq!(img.get_pixel(6, 6)[3], 0);
    }

    #[test]
    fn stroke_marks_ring_pixels() {
        let square = MultiPolygon::new(vec![polygon![
            (x: 1.0, y: 1.0),
            (x: 10.0, y: 1.0),
            (x: 10.0, y: 10.0),
            (x: 1.0, y: 10.0),
        ]]);
        let mut img: RgbaImage = ImageBuffer::new(16, 16);
        let grey = Rgba([60, 60, 60, 255]);
        stroke_multipolygon(&mut img, &square, grey, &identity());
        assert_eq!(*img.get_pixel(5, 1), grey);
        assert_eq!(img.get_pixel(5, 5)[3], 0);
    }
}
