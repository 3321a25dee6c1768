use crate::types::{District, DistrictBoundary, DistrictVotes};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Inner join of vote aggregates and boundary polygons on district number,
/// both sides filtered to one state first.
///
/// Unmatched keys on either side are warned about by name. The join itself
/// stays inner (an unmatched district has nothing to draw or nothing to
/// color), but the row loss is never silent.
pub fn join_districts(
    votes: Vec<DistrictVotes>,
    boundaries: Vec<DistrictBoundary>,
    state: &str,
) -> Vec<District> {
    let mut votes_by_district: BTreeMap<u32, DistrictVotes> = votes
        .into_iter()
        .filter(|v| v.state.eq_ignore_ascii_case(state))
        .map(|v| (v.district, v))
        .collect();

    let mut merged = Vec::new();
    for boundary in boundaries {
        if !boundary.state.eq_ignore_ascii_case(state) {
            continue;
        }
        match votes_by_district.remove(&boundary.district) {
            Some(v) => merged.push(District {
                votes: v,
                geometry: boundary.geometry,
            }),
            None => {
                warn!(
                    district = boundary.district,
                    "Boundary polygon has no matching vote aggregate; dropped"
                );
            }
        }
    }

    for district in votes_by_district.keys() {
        warn!(
            district,
            "Vote aggregate has no matching boundary polygon; dropped"
        );
    }

    merged.sort_by_key(|d| d.votes.district);
    info!(districts = merged.len(), state, "Joined votes to boundaries");
    merged
}
