//! Cascading region → cercle → commune → enumeration-area selection.

use crate::types::BoundaryRecord;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fourth-level option meaning "do not narrow by enumeration area".
pub const NO_FILTER: &str = "No filtre";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Region,
    Cercle,
    Commune,
    Area,
}

impl Level {
    pub fn value<'a>(&self, record: &'a BoundaryRecord) -> Option<&'a str> {
        match self {
            Level::Region => record.region.as_deref(),
            Level::Cercle => record.cercle.as_deref(),
            Level::Commune => record.commune.as_deref(),
            Level::Area => record.area_id.as_deref(),
        }
    }
}

/// Requested or effective dropdown values. `None` means "nothing chosen
/// yet", which resolves to the first option.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub region: Option<String>,
    pub cercle: Option<String>,
    pub commune: Option<String>,
    pub area: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub regions: Vec<String>,
    pub cercles: Vec<String>,
    pub communes: Vec<String>,
    /// Always starts with [`NO_FILTER`] once a commune is chosen.
    pub areas: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub options: FilterOptions,
    pub selection: Selection,
    /// Indices into the record slice, in collection order.
    pub subset: Vec<usize>,
}

/// Sorted distinct non-null values of `level` among `records`.
pub fn options<'a>(records: impl IntoIterator<Item = &'a BoundaryRecord>, level: Level) -> Vec<String> {
    let mut values: Vec<String> = records
        .into_iter()
        .filter_map(|r| level.value(r))
        .map(str::to_string)
        .collect();
    values.sort();
    values.dedup();
    values
}

/// Pure equality filter. A `None` level or the [`NO_FILTER`] area leaves
/// that level unconstrained.
pub fn apply<'a>(records: &'a [BoundaryRecord], selection: &Selection) -> Vec<&'a BoundaryRecord> {
    let wanted = [
        (Level::Region, selection.region.as_deref()),
        (Level::Cercle, selection.cercle.as_deref()),
        (Level::Commune, selection.commune.as_deref()),
        (Level::Area, selection.area.as_deref().filter(|a| *a != NO_FILTER)),
    ];
    records
        .iter()
        .filter(|r| {
            wanted
                .iter()
                .all(|(level, value)| value.map_or(true, |v| level.value(r) == Some(v)))
        })
        .collect()
}

// Keeps the requested value when it is still offered, like a dropdown
// whose option list changed underneath it.
fn pick(options: &[String], requested: Option<&str>) -> Option<String> {
    match requested {
        Some(value) if options.iter().any(|o| o == value) => Some(value.to_string()),
        _ => options.first().cloned(),
    }
}

fn narrow(records: &[BoundaryRecord], candidates: Vec<usize>, level: Level, value: Option<&str>) -> Vec<usize> {
    match value {
        Some(v) => candidates
            .into_iter()
            .filter(|&i| level.value(&records[i]) == Some(v))
            .collect(),
        None => Vec::new(),
    }
}

/// Resolves the requested selection level by level and returns the options
/// shown at each level together with the innermost matching subset.
pub fn resolve(records: &[BoundaryRecord], requested: &Selection) -> Resolved {
    let all: Vec<usize> = (0..records.len()).collect();

    let regions = options(all.iter().map(|&i| &records[i]), Level::Region);
    let region = pick(&regions, requested.region.as_deref());
    let in_region = narrow(records, all, Level::Region, region.as_deref());

    let cercles = options(in_region.iter().map(|&i| &records[i]), Level::Cercle);
    let cercle = pick(&cercles, requested.cercle.as_deref());
    let in_cercle = narrow(records, in_region, Level::Cercle, cercle.as_deref());

    let communes = options(in_cercle.iter().map(|&i| &records[i]), Level::Commune);
    let commune = pick(&communes, requested.commune.as_deref());
    let in_commune = narrow(records, in_cercle, Level::Commune, commune.as_deref());

    let mut areas = Vec::new();
    if commune.is_some() {
        areas.push(NO_FILTER.to_string());
        areas.extend(options(in_commune.iter().map(|&i| &records[i]), Level::Area));
    }
    let area = pick(&areas, requested.area.as_deref());

    let subset = match area.as_deref() {
        Some(NO_FILTER) | None => in_commune,
        Some(id) => narrow(records, in_commune, Level::Area, Some(id)),
    };

    let selection = Selection { region, cercle, commune, area };
    debug!(?selection, matched = subset.len(), "resolved selection");

    Resolved {
        options: FilterOptions { regions, cercles, communes, areas },
        selection,
        subset,
    }
}
