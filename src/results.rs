use crate::config::InputConfig;
use crate::types::{DistrictVotes, Winner};
use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use tracing::{info, warn};

/// One row of the raw results table: a single candidate's (or party line's)
/// vote count in one district.
#[derive(Debug, Clone)]
pub struct ResultRow {
    pub state: String,
    pub district: u32,
    pub party: Party,
    pub votes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    Democrat,
    Republican,
    Other,
}

pub fn classify_party(label: &str) -> Party {
    let label = label.trim().to_lowercase();
    // "democrat", "democratic", "democratic-farmer-labor" all count as D;
    // same prefix treatment on the R side.
    if label.starts_with("democrat") {
        Party::Democrat
    } else if label.starts_with("republican") {
        Party::Republican
    } else {
        Party::Other
    }
}

/// Normalizes the district identifiers seen across election datasets:
/// "5", "05", "District 5", and the at-large markers ("0", "At Large",
/// "At-Large", "AL") which map to district 0.
pub fn parse_district(raw: &str) -> Result<u32> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(anyhow!("Empty district identifier"));
    }
    let lowered = s.to_lowercase();
    if lowered == "al" || lowered == "at large" || lowered == "at-large" {
        return Ok(0);
    }
    let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return Err(anyhow!("Cannot parse district identifier: {:?}", raw));
    }
    digits
        .parse::<u32>()
        .with_context(|| format!("Cannot parse district identifier: {:?}", raw))
}

/// Reads result rows for the configured state from a CSV stream.
///
/// Vote counts that are missing or unparseable ("NA", "") are zero-filled;
/// the number of zero-filled rows is returned so the caller can surface it
/// instead of losing votes silently.
pub fn read_rows<R: Read>(reader: R, config: &InputConfig) -> Result<(Vec<ResultRow>, usize)> {
    let mut rdr = ReaderBuilder::new().from_reader(reader);
    let headers = rdr.headers()?.clone();

    let col = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| anyhow!("Column '{}' not found in results CSV", name))
    };
    let state_idx = col(&config.state_column)?;
    let district_idx = col(&config.district_column)?;
    let party_idx = col(&config.party_column)?;
    let votes_idx = col(&config.votes_column)?;

    let mut rows = Vec::new();
    let mut zero_filled = 0usize;

    for result in rdr.records() {
        let record = result?;
        let state = record.get(state_idx).unwrap_or("").trim();
        if state.is_empty() || !state.eq_ignore_ascii_case(&config.state) {
            continue;
        }

        let district_raw = record.get(district_idx).unwrap_or("");
        let district = match parse_district(district_raw) {
            Ok(d) => d,
            Err(_) => {
                warn!(district = district_raw, "Skipping row with unparseable district");
                continue;
            }
        };

        let votes = match record.get(votes_idx).unwrap_or("").trim().parse::<u64>() {
            Ok(v) => v,
            Err(_) => {
                zero_filled += 1;
                0
            }
        };

        rows.push(ResultRow {
            state: state.to_string(),
            district,
            party: classify_party(record.get(party_idx).unwrap_or("")),
            votes,
        });
    }

    Ok((rows, zero_filled))
}

/// Groups result rows by district and computes the per-district aggregate:
/// vote totals by party, Republican share, and the winner label.
pub fn aggregate(rows: &[ResultRow]) -> Vec<DistrictVotes> {
    #[derive(Default)]
    struct Tally {
        dem: u64,
        rep: u64,
        other: u64,
    }

    let mut tallies: BTreeMap<(String, u32), Tally> = BTreeMap::new();
    for row in rows {
        let tally = tallies
            .entry((row.state.clone(), row.district))
            .or_default();
        match row.party {
            Party::Democrat => tally.dem += row.votes,
            Party::Republican => tally.rep += row.votes,
            Party::Other => tally.other += row.votes,
        }
    }

    tallies
        .into_iter()
        .map(|((state, district), t)| {
            let total = t.dem + t.rep + t.other;
            let rep_share = if total > 0 {
                t.rep as f64 / total as f64
            } else {
                0.0
            };
            let winner = Winner::from_votes(t.dem, t.rep);
            if winner == Winner::Tied && total > 0 {
                warn!(state = %state, district, "Exact two-party tie");
            }
            DistrictVotes {
                state,
                district,
                total_votes: total,
                dem_votes: t.dem,
                rep_votes: t.rep,
                other_votes: t.other,
                rep_share,
                winner,
            }
        })
        .collect()
}

pub fn load_results(config: &InputConfig) -> Result<Vec<DistrictVotes>> {
    let file = File::open(&config.results_csv)
        .with_context(|| format!("Failed to open results CSV: {:?}", config.results_csv))?;
    let (rows, zero_filled) = read_rows(file, config)?;
    if zero_filled > 0 {
        warn!(
            zero_filled,
            "Rows with missing or unparseable vote counts were treated as zero"
        );
    }
    let districts = aggregate(&rows);
    info!(
        rows = rows.len(),
        districts = districts.len(),
        state = %config.state,
        "Aggregated election results"
    );
    Ok(districts)
}
