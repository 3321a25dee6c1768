use geo::MultiPolygon;
use serde::Serialize;

/// Outcome of the two-party comparison for a district.
///
/// Ties are a real (if rare) possibility and get their own variant rather
/// than silently collapsing into one party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Winner {
    Democrat,
    Republican,
    Tied,
}

impl Winner {
    pub fn from_votes(dem_votes: u64, rep_votes: u64) -> Winner {
        if rep_votes > dem_votes {
            Winner::Republican
        } else if dem_votes > rep_votes {
            Winner::Democrat
        } else {
            Winner::Tied
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Winner::Democrat => "Democrat",
            Winner::Republican => "Republican",
            Winner::Tied => "Tied",
        }
    }
}

/// Per-district vote aggregate.
/// Invariant: total_votes = dem_votes + rep_votes + other_votes.
#[derive(Debug, Clone, Serialize)]
pub struct DistrictVotes {
    pub state: String,
    pub district: u32,
    pub total_votes: u64,
    pub dem_votes: u64,
    pub rep_votes: u64,
    pub other_votes: u64,
    /// Republican share of the total vote, 0.0 when no votes were recorded.
    pub rep_share: f64,
    pub winner: Winner,
}

/// One district boundary polygon as read from the shapefile/GeoJSON.
#[derive(Debug, Clone)]
pub struct DistrictBoundary {
    pub state: String,
    pub district: u32,
    pub geometry: MultiPolygon<f64>,
}

/// Join result: aggregate votes plus boundary geometry in EPSG:4326.
#[derive(Debug, Clone)]
pub struct District {
    pub votes: DistrictVotes,
    pub geometry: MultiPolygon<f64>,
}
