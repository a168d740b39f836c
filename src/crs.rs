//! Source coordinate reference systems and their inverse projections to
//! geographic WGS84 (EPSG:4326).
//!
//! Only the systems Mali boundary files are actually delivered in are
//! handled: plain longitude/latitude, Web Mercator, and the WGS84 UTM zones.

use geo::{Coord, MapCoords, MultiPolygon};
use std::f64::consts::PI;
use std::fmt;

// WGS84 ellipsoid
const A: f64 = 6_378_137.0;
const F: f64 = 1.0 / 298.257_223_563;
const UTM_K0: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crs {
    /// EPSG:4326 and equivalents; coordinates are already lon/lat.
    Geographic,
    /// EPSG:3857
    WebMercator,
    Utm { zone: u8, north: bool },
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Geographic => write!(f, "EPSG:4326"),
            Crs::WebMercator => write!(f, "EPSG:3857"),
            Crs::Utm { zone, north: true } => write!(f, "EPSG:326{:02}", zone),
            Crs::Utm { zone, north: false } => write!(f, "EPSG:327{:02}", zone),
        }
    }
}

impl Crs {
    pub fn from_epsg(code: u32) -> Option<Self> {
        match code {
            4326 | 4269 | 4258 => Some(Crs::Geographic),
            3857 | 900913 | 3785 => Some(Crs::WebMercator),
            32601..=32660 => Some(Crs::Utm { zone: (code - 32600) as u8, north: true }),
            32701..=32760 => Some(Crs::Utm { zone: (code - 32700) as u8, north: false }),
            _ => None,
        }
    }

    /// Parses the names found in GeoJSON `crs` members, e.g. `EPSG:32630`,
    /// `urn:ogc:def:crs:EPSG::4326` or `urn:ogc:def:crs:OGC:1.3:CRS84`.
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_uppercase();
        if upper.ends_with("CRS84") {
            return Some(Crs::Geographic);
        }
        let code = upper
            .rsplit(':')
            .next()
            .and_then(|tail| tail.trim().parse::<u32>().ok())?;
        Self::from_epsg(code)
    }

    /// Recognises the ESRI/OGC WKT written to shapefile `.prj` sidecars.
    pub fn from_wkt(wkt: &str) -> Option<Self> {
        let upper = wkt.to_uppercase();
        let head = upper.trim_start();

        if head.starts_with("GEOGCS") || head.starts_with("GEOGCRS") {
            return Some(Crs::Geographic);
        }
        if upper.contains("MERCATOR_AUXILIARY_SPHERE") || upper.contains("PSEUDO-MERCATOR") || upper.contains("PSEUDO_MERCATOR") {
            return Some(Crs::WebMercator);
        }
        if let Some(code) = authority_code(&upper) {
            if let Some(crs) = Self::from_epsg(code) {
                return Some(crs);
            }
        }
        parse_utm_name(&upper)
    }

    pub fn to_wgs84(&self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Crs::Geographic => c,
            Crs::WebMercator => web_mercator_to_wgs84(c),
            Crs::Utm { zone, north } => utm_to_wgs84(c, *zone, *north),
        }
    }

    pub fn reproject(&self, geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        match self {
            Crs::Geographic => geometry.clone(),
            crs => geometry.map_coords(|c| crs.to_wgs84(c)),
        }
    }
}

// The last AUTHORITY["EPSG","xxxx"] in a WKT string names the whole CRS.
fn authority_code(upper_wkt: &str) -> Option<u32> {
    let start = upper_wkt.rfind("AUTHORITY[\"EPSG\",")?;
    let rest = &upper_wkt[start + "AUTHORITY[\"EPSG\",".len()..];
    let digits: String = rest
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

// Matches "UTM_ZONE_30N", "UTM ZONE 30N", "UTM zone 30, Northern Hemisphere".
fn parse_utm_name(upper_wkt: &str) -> Option<Crs> {
    let start = upper_wkt.find("UTM")?;
    let tail = &upper_wkt[start + 3..];
    let tail = tail.trim_start_matches(|c: char| c == '_' || c == ' ');
    let tail = tail.strip_prefix("ZONE")?;
    let tail = tail.trim_start_matches(|c: char| c == '_' || c == ' ');

    let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
    let zone: u8 = digits.parse().ok()?;
    if !(1..=60).contains(&zone) {
        return None;
    }

    let after = &tail[digits.len()..];
    let north = match after.chars().next() {
        Some('N') => true,
        Some('S') => false,
        _ => !after.contains("SOUTH"),
    };
    Some(Crs::Utm { zone, north })
}

fn web_mercator_to_wgs84(c: Coord<f64>) -> Coord<f64> {
    let lon = (c.x / A).to_degrees();
    let lat = (2.0 * (c.y / A).exp().atan() - PI / 2.0).to_degrees();
    Coord { x: lon, y: lat }
}

// Inverse transverse Mercator (Snyder, USGS PP 1395, eq. 8-12 to 8-18).
fn utm_to_wgs84(c: Coord<f64>, zone: u8, north: bool) -> Coord<f64> {
    let e2 = F * (2.0 - F);
    let ep2 = e2 / (1.0 - e2);
    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());

    let x = c.x - UTM_FALSE_EASTING;
    let y = if north { c.y } else { c.y - UTM_FALSE_NORTHING_SOUTH };
    let lon0 = (f64::from(zone) - 1.0) * 6.0 - 180.0 + 3.0;

    let m = y / UTM_K0;
    let mu = m / (A * (1.0 - e2 / 4.0 - 3.0 * e2.powi(2) / 64.0 - 5.0 * e2.powi(3) / 256.0));

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1.powi(2) / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let sin1 = phi1.sin();
    let cos1 = phi1.cos();
    let tan1 = phi1.tan();

    let n1 = A / (1.0 - e2 * sin1 * sin1).sqrt();
    let t1 = tan1 * tan1;
    let c1 = ep2 * cos1 * cos1;
    let r1 = A * (1.0 - e2) / (1.0 - e2 * sin1 * sin1).powf(1.5);
    let d = x / (n1 * UTM_K0);

    let lat = phi1
        - (n1 * tan1 / r1)
            * (d.powi(2) / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1 * c1 - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1 * t1 - 252.0 * ep2 - 3.0 * c1 * c1)
                    * d.powi(6)
                    / 720.0);

    let lon = (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
        + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1 * c1 + 8.0 * ep2 + 24.0 * t1 * t1) * d.powi(5) / 120.0)
        / cos1;

    Coord {
        x: lon0 + lon.to_degrees(),
        y: lat.to_degrees(),
    }
}
