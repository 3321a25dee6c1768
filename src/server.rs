use crate::config::AppConfig;
use crate::render::VIEWER_HTML;
use crate::types::{District, DistrictVotes};
use anyhow::Result;
use axum::{
    extract::{Query, State},
    response::{Html, Json},
    routing::get,
    Router,
};
use geo::{BoundingRect, Contains, Point};
use rstar::{RTree, RTreeObject, AABB};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

// Wrapper for RTree indexing
struct DistrictIndex {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for DistrictIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

pub struct AppState {
    pub districts: Vec<District>,
    pub tree: RTree<DistrictIndex>,
}

#[derive(Deserialize)]
pub struct QueryParams {
    lat: f64,
    lon: f64,
}

pub async fn start_server(config: AppConfig, districts: Vec<District>) -> Result<()> {
    info!(districts = districts.len(), "Building spatial index");
    let tree_items: Vec<DistrictIndex> = districts
        .iter()
        .enumerate()
        .map(|(i, district)| {
            let rect = district.geometry.bounding_rect().unwrap_or(geo::Rect::new(
                geo::Coord { x: 0.0, y: 0.0 },
                geo::Coord { x: 0.0, y: 0.0 },
            ));
            DistrictIndex {
                index: i,
                aabb: AABB::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                ),
            }
        })
        .collect();
    let tree = RTree::bulk_load(tree_items);

    let state = Arc::new(AppState { districts, tree });

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    info!("Starting server on http://{}", addr);

    let tile_service = ServeDir::new(&config.output.tile_dir);

    let app = Router::new()
        .route("/", get(viewer_handler))
        .route("/api/query", get(query_handler))
        .nest_service("/tiles", tile_service)
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn viewer_handler() -> Html<&'static str> {
    Html(VIEWER_HTML)
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Json<Option<DistrictVotes>> {
    let point = Point::new(params.lon, params.lat);
    let envelope = AABB::from_point([params.lon, params.lat]);

    // R-tree narrows the candidates, the polygon test decides.
    let candidates = state.tree.locate_in_envelope_intersecting(&envelope);
    for candidate in candidates {
        if let Some(district) = state.districts.get(candidate.index) {
            if district.geometry.contains(&point) {
                return Json(Some(district.votes.clone()));
            }
        }
    }

    Json(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Winner;
    use geo::{polygon, MultiPolygon};

    fn district(number: u32, x_offset: f64) -> District {
        let poly = polygon![
            (x: x_offset, y: 0.0),
            (x: x_offset + 1.0, y: 0.0),
            (x: x_offset + 1.0, y: 1.0),
            (x: x_offset, y: 1.0),
        ];
        District {
            votes: DistrictVotes {
                state: "North Carolina".to_string(),
                district: number,
                total_votes: 10,
                dem_votes: 6,
                rep_votes: 4,
                other_votes: 0,
                rep_share: 0.4,
                winner: Winner::Democrat,
            },
            geometry: MultiPolygon::new(vec![poly]),
        }
    }

    fn state_for(districts: Vec<District>) -> AppState {
        let tree_items: Vec<DistrictIndex> = districts
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let rect = d.geometry.bounding_rect().unwrap();
                DistrictIndex {
                    index: i,
                    aabb: AABB::from_corners(
                        [rect.min().x, rect.min().y],
                        [rect.max().x, rect.max().y],
                    ),
                }
            })
            .collect();
        AppState {
            tree: RTree::bulk_load(tree_items),
            districts,
        }
    }

    #[tokio::test]
    async fn point_query_finds_containing_district() {
        let state = Arc::new(state_for(vec![district(1, 0.0), district(2, 2.0)]));
        let result = query_handler(
            State(state),
            Query(QueryParams { lat: 0.5, lon: 2.5 }),
        )
        .await;
        assert_eq!(result.0.as_ref().map(|v| v.district), Some(2));
    }

    #[tokio::test]
    async fn point_outside_all_districts_returns_none() {
        let state = Arc::new(state_for(vec![district(1, 0.0)]));
        let result = query_handler(
            State(state),
            Query(QueryParams { lat: 5.0, lon: 5.0 }),
        )
        .await;
        assert!(result.0.is_none());
    }
}
