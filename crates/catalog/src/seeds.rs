use std::collections::BTreeMap;

use foundation::{FloorId, Step};

use crate::comment::CommentRecord;
use crate::risk::RiskLevel;
use crate::store::CommentError;

/// Built-in comments: floor → step → comments in display order.
pub type CommentSeeds = BTreeMap<FloorId, BTreeMap<Step, Vec<CommentRecord>>>;

/// Parses seed JSON shaped `{ "<floor>": { "<step>": [record, ...] } }`.
pub fn parse_seeds(payload: &str) -> Result<CommentSeeds, CommentError> {
    let seeds: CommentSeeds =
        serde_json::from_str(payload).map_err(|e| CommentError::Parse(e.to_string()))?;
    for (floor, steps) in &seeds {
        for (step, records) in steps {
            if *step == 0 {
                return Err(CommentError::InvalidSeed(format!("{floor}: step 0")));
            }
            if records.iter().any(|r| r.is_user || r.id.is_some()) {
                return Err(CommentError::InvalidSeed(format!(
                    "{floor}/{step}: seeds cannot be user comments"
                )));
            }
        }
    }
    Ok(seeds)
}

/// Comments shipped with the walkthrough.
pub fn builtin_seeds() -> CommentSeeds {
    let mut seeds = CommentSeeds::new();
    let mut put = |floor: &str, step: Step, record: CommentRecord| {
        seeds
            .entry(FloorId::new(floor))
            .or_default()
            .entry(step)
            .or_default()
            .push(record);
    };

    put(
        "3rd",
        1,
        CommentRecord::builtin(
            200.0,
            1300.0,
            "Debris Uncleared",
            "Construction debris has remained uncleared in this area for over 2 weeks. \
             This poses a safety hazard and needs immediate attention.",
            RiskLevel::Normal,
        ),
    );
    put(
        "3rd",
        13,
        CommentRecord::builtin(
            1950.0,
            1255.0,
            "Fire Hazard (Poor wire management)",
            "Exposed electrical wiring and poor cable management poses a significant fire risk. \
             Immediate rectification required.",
            RiskLevel::High,
        ),
    );
    put(
        "ground",
        25,
        CommentRecord::builtin(
            1400.0,
            720.0,
            "Exposed concrete formwork. Medium risk due to rain. Can be covered.",
            "The concrete formwork is currently exposed to weather elements. \
             Cover with tarpaulin to prevent water damage.",
            RiskLevel::Medium,
        ),
    );
    put(
        "roof",
        6,
        CommentRecord::builtin(
            300.0,
            1000.0,
            "HVAC Cooling Tower Installed",
            "New HVAC cooling tower has been successfully installed and is operational.",
            RiskLevel::Info,
        ),
    );

    seeds
}
