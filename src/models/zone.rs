// src/models/zone.rs

//! User-configured zones and the geometry used to test membership.

use serde::{Deserialize, Serialize};

use super::incident::{CapArea, Circle};

/// Mean Earth radius used for great-circle distances.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Shape of a zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ZoneShape {
    /// Centre point and radius
    Circle {
        latitude: f64,
        longitude: f64,
        radius_km: f64,
    },

    /// Ring of `[lat, lon]` points; closing point optional
    Polygon { points: Vec<(f64, f64)> },
}

/// A named geographic region of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,

    #[serde(flatten)]
    pub shape: ZoneShape,
}

impl Zone {
    /// Whether the point lies inside the zone (boundary counts as inside
    /// for circles).
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        match &self.shape {
            ZoneShape::Circle {
                latitude,
                longitude,
                radius_km,
            } => haversine_km((*latitude, *longitude), (lat, lon)) <= *radius_km,
            ZoneShape::Polygon { points } => point_in_polygon((lat, lon), points),
        }
    }

    /// Reference point of the zone: circle centre or polygon vertex mean.
    pub fn reference_point(&self) -> Option<(f64, f64)> {
        match &self.shape {
            ZoneShape::Circle {
                latitude,
                longitude,
                ..
            } => Some((*latitude, *longitude)),
            ZoneShape::Polygon { points } => centroid(points),
        }
    }
}

/// The configured zones, evaluated together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneSet {
    zones: Vec<Zone>,
}

impl ZoneSet {
    pub fn new(zones: Vec<Zone>) -> Self {
        Self { zones }
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// Names of zones containing the point, in configuration order.
    /// Empty when coordinates are unknown.
    pub fn zones_containing(&self, coordinates: Option<(f64, f64)>) -> Vec<String> {
        let Some((lat, lon)) = coordinates else {
            return Vec::new();
        };
        self.zones
            .iter()
            .filter(|zone| zone.contains(lat, lon))
            .map(|zone| zone.name.clone())
            .collect()
    }

    /// Zones touched by a CAP alert: the zone's reference point lies in one
    /// of the alert's areas, or the alert's own point lies in the zone.
    pub fn zones_for_areas(
        &self,
        areas: &[CapArea],
        coordinates: Option<(f64, f64)>,
    ) -> Vec<String> {
        self.zones
            .iter()
            .filter(|zone| {
                let covered_by_area = zone
                    .reference_point()
                    .is_some_and(|point| areas.iter().any(|area| area_contains(area, point)));
                let point_in_zone =
                    coordinates.is_some_and(|(lat, lon)| zone.contains(lat, lon));
                covered_by_area || point_in_zone
            })
            .map(|zone| zone.name.clone())
            .collect()
    }
}

/// Whether a CAP area's polygons or circles contain the point.
pub fn area_contains(area: &CapArea, point: (f64, f64)) -> bool {
    area.polygons
        .iter()
        .any(|ring| point_in_polygon(point, ring))
        || area.circles.iter().any(|circle| circle_contains(circle, point))
}

fn circle_contains(circle: &Circle, point: (f64, f64)) -> bool {
    haversine_km((circle.latitude, circle.longitude), point) <= circle.radius_km
}

/// Great-circle distance between two `(lat, lon)` points.
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Even-odd ray casting on `(lat, lon)` vertices treated as planar.
pub fn point_in_polygon(point: (f64, f64), ring: &[(f64, f64)]) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let (y, x) = point;
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (yi, xi) = ring[i];
        let (yj, xj) = ring[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Vertex mean of a ring, ignoring a repeated closing point.
pub fn centroid(ring: &[(f64, f64)]) -> Option<(f64, f64)> {
    let points = match ring {
        [first, .., last] if first == last => &ring[..ring.len() - 1],
        _ => ring,
    };
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (lat, lon) = points
        .iter()
        .fold((0.0, 0.0), |(lat, lon), p| (lat + p.0, lon + p.1));
    Some((lat / n, lon / n))
}
