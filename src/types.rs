use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::{MultiPolygon, Point, Rect};
use rstar::{RTree, RTreeObject, AABB};
use serde::Serialize;

/// One enumeration zone (section d'énumération) boundary.
#[derive(Debug, Clone)]
pub struct BoundaryRecord {
    pub region: Option<String>,
    pub cercle: Option<String>,
    pub commune: Option<String>,
    pub area_id: Option<String>,
    pub population: u64,
    pub population_ct: u64,
    /// Always valid, non-empty and in EPSG:4326.
    pub geometry: MultiPolygon<f64>,
}

/// A user-uploaded point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OverlayPoint {
    pub latitude: f64,
    pub longitude: f64,
}

// Wrapper for RTree indexing
#[derive(Debug)]
struct AreaIndex {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for AreaIndex {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// The loaded boundary collection plus a spatial index over it.
#[derive(Debug)]
pub struct Dataset {
    records: Vec<BoundaryRecord>,
    tree: RTree<AreaIndex>,
}

impl Dataset {
    pub fn new(records: Vec<BoundaryRecord>) -> Self {
        let items: Vec<AreaIndex> = records
            .iter()
            .enumerate()
            .filter_map(|(i, record)| {
                let rect = record.geometry.bounding_rect()?;
                Some(AreaIndex {
                    index: i,
                    aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                })
            })
            .collect();

        Self {
            records,
            tree: RTree::bulk_load(items),
        }
    }

    pub fn records(&self) -> &[BoundaryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The first record (in collection order) whose polygon contains the point.
    pub fn locate(&self, lat: f64, lon: f64) -> Option<&BoundaryRecord> {
        let point = Point::new(lon, lat);
        let envelope = AABB::from_point([lon, lat]);

        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|candidate| candidate.index)
            .filter(|&i| self.records[i].geometry.contains(&point))
            .collect();
        hits.sort_unstable();
        hits.first().map(|&i| &self.records[i])
    }
}

/// Union of the bounding rectangles of `records`.
pub fn bounds<'a>(records: impl IntoIterator<Item = &'a BoundaryRecord>) -> Option<Rect<f64>> {
    records
        .into_iter()
        .filter_map(|r| r.geometry.bounding_rect())
        .reduce(|acc, rect| {
            Rect::new(
                geo::Coord {
                    x: acc.min().x.min(rect.min().x),
                    y: acc.min().y.min(rect.min().y),
                },
                geo::Coord {
                    x: acc.max().x.max(rect.max().x),
                    y: acc.max().y.max(rect.max().y),
                },
            )
        })
}
