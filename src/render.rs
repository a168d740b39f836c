//! Turns the dataset and one session's state into the description of the
//! page to draw. Called on every request; holds no state of its own.

use crate::config::GeolocationMode;
use crate::data::{AREA_ID, POPULATION, POPULATION_CT};
use crate::filter::{self, FilterOptions, Selection};
use crate::session::{Notice, SessionState};
use crate::types::{bounds, BoundaryRecord, Dataset, OverlayPoint};
use geojson::{Feature, FeatureCollection, Geometry};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub title: String,
    pub geolocation: GeolocationMode,
    pub has_logo: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub title: String,
    pub has_logo: bool,
    pub options: FilterOptions,
    pub selection: Selection,
    /// `[[south, west], [north, east]]`, absent when nothing matched.
    pub bounds: Option<[[f64; 2]; 2]>,
    /// `[lat, lon]` midpoint of `bounds`.
    pub center: Option<[f64; 2]>,
    pub boundaries: FeatureCollection,
    pub points: Vec<OverlayPoint>,
    pub overlay_notice: Option<Notice>,
    pub position: Option<PositionView>,
    /// Set on the request that just reported `position`; the map then
    /// centres on it instead of fitting `bounds`.
    pub recenter: bool,
    pub geolocation: GeolocationMode,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionView {
    pub lat: f64,
    pub lon: f64,
    /// Enumeration area containing the position, if any.
    pub area_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginView {
    pub title: String,
    pub has_logo: bool,
    pub warning: Option<String>,
}

pub fn login(settings: &RenderSettings, warning: Option<String>) -> LoginView {
    LoginView {
        title: settings.title.clone(),
        has_logo: settings.has_logo,
        warning,
    }
}

pub fn dashboard(dataset: &Dataset, session: &SessionState, settings: &RenderSettings) -> DashboardView {
    let records = dataset.records();
    let resolved = filter::resolve(records, &session.selection);
    let subset: Vec<&BoundaryRecord> = resolved.subset.iter().map(|&i| &records[i]).collect();

    let rect = bounds(subset.iter().copied());
    let bounds = rect.map(|r| [[r.min().y, r.min().x], [r.max().y, r.max().x]]);
    let center = rect.map(|r| {
        let c = r.center();
        [c.y, c.x]
    });

    let position = session.position.map(|(lat, lon)| PositionView {
        lat,
        lon,
        area_id: dataset.locate(lat, lon).and_then(|r| r.area_id.clone()),
    });

    let mut warnings = Vec::new();
    if dataset.is_empty() {
        warnings.push("Aucune zone de dénombrement n'a été chargée.".to_string());
    } else if subset.is_empty() {
        warnings.push("Aucune zone ne correspond à cette sélection.".to_string());
    }

    DashboardView {
        title: settings.title.clone(),
        has_logo: settings.has_logo,
        options: resolved.options,
        selection: resolved.selection,
        bounds,
        center,
        boundaries: boundary_features(&subset),
        points: session.overlay.clone(),
        overlay_notice: session.overlay_notice.clone(),
        position,
        recenter: false,
        geolocation: settings.geolocation,
        warnings,
    }
}

/// Subset geometries with the three attributes shown in tooltips and popups.
pub fn boundary_features(records: &[&BoundaryRecord]) -> FeatureCollection {
    let features = records
        .iter()
        .map(|record| {
            let mut properties = serde_json::Map::new();
            properties.insert(AREA_ID.to_string(), record.area_id.clone().into());
            properties.insert(POPULATION.to_string(), record.population.into());
            properties.insert(POPULATION_CT.to_string(), record.population_ct.into());

            Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::from(&record.geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::NO_FILTER;
    use crate::types::fixtures::sample;

    fn settings() -> RenderSettings {
        RenderSettings {
            title: "RGPH5".into(),
            geolocation: GeolocationMode::Query,
            has_logo: false,
        }
    }

    fn kayes_session() -> SessionState {
        let mut session = SessionState::new();
        session.selection = Selection {
            region: Some("Kayes".into()),
            cercle: Some("Kayes".into()),
            commune: Some("Kayes".into()),
            area: Some(NO_FILTER.into()),
        };
        session
    }

    #[test]
    fn view_fits_bounds_of_selected_areas() {
        let dataset = Dataset::new(sample());
        let view = dashboard(&dataset, &kayes_session(), &settings());

        assert_eq!(view.boundaries.features.len(), 2);
        let [[south, west], [north, east]] = view.bounds.unwrap();
        assert!((south - 14.4).abs() < 1e-9 && (north - 14.5).abs() < 1e-9);
        assert!((west - (-11.5)).abs() < 1e-9 && (east - (-11.3)).abs() < 1e-9);

        let [lat, lon] = view.center.unwrap();
        assert!((lat - 14.45).abs() < 1e-9 && (lon - (-11.4)).abs() < 1e-9);
        assert!(view.warnings.is_empty());
    }

    #[test]
    fn features_keep_collection_order_and_expose_three_attributes() {
        let dataset = Dataset::new(sample());
        let view = dashboard(&dataset, &kayes_session(), &settings());

        let ids: Vec<_> = view
            .boundaries
            .features
            .iter()
            .map(|f| f.properties.as_ref().unwrap()[AREA_ID].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["SE-003", "SE-001"]);

        let props = view.boundaries.features[0].properties.as_ref().unwrap();
        assert_eq!(props.len(), 3);
        assert_eq!(props[POPULATION], 100);
        assert_eq!(props[POPULATION_CT], 20);
    }

    #[test]
    fn position_is_matched_to_its_area() {
        let dataset = Dataset::new(sample());
        let mut session = kayes_session();
        session.position = Some((14.45, -11.35));
        let view = dashboard(&dataset, &session, &settings());
        assert_eq!(
            view.position,
            Some(PositionView { lat: 14.45, lon: -11.35, area_id: Some("SE-001".into()) })
        );
    }

    #[test]
    fn empty_dataset_has_no_bounds_and_warns() {
        let dataset = Dataset::new(Vec::new());
        let view = dashboard(&dataset, &SessionState::new(), &settings());
        assert!(view.bounds.is_none());
        assert!(view.center.is_none());
        assert!(view.boundaries.features.is_empty());
        assert_eq!(view.warnings.len(), 1);
    }

    #[test]
    fn overlay_points_are_passed_through() {
        let dataset = Dataset::new(sample());
        let mut session = kayes_session();
        session.overlay = vec![OverlayPoint { latitude: 14.5, longitude: -4.5 }];
        let view = dashboard(&dataset, &session, &settings());
        assert_eq!(view.points.len(), 1);
    }
}
