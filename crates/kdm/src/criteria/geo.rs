//! 🌍 Geo values: points, distances and boxes, the three things a map query ever needs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const EARTH_RADIUS_KM: f64 = 6_371.008_8;

/// 📍 A latitude/longitude pair, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// 📏 Great-circle distance, haversine flavored.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.lon - self.lon).to_radians();
        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }

    /// 🔎 Read a point out of a stored document value.
    ///
    /// Accepts the shapes the engine accepts: `{"lat":..,"lon":..}`, `"lat,lon"` and `[lon, lat]`.
    pub fn from_value(value: &Value) -> Option<GeoPoint> {
        match value {
            Value::Object(map) => Some(GeoPoint::new(
                map.get("lat")?.as_f64()?,
                map.get("lon")?.as_f64()?,
            )),
            Value::String(text) => {
                let (lat, lon) = text.split_once(',')?;
                Some(GeoPoint::new(lat.trim().parse().ok()?, lon.trim().parse().ok()?))
            }
            // 🙃 GeoJSON order: longitude first. Nobody is happy about this.
            Value::Array(items) if items.len() == 2 => {
                Some(GeoPoint::new(items[1].as_f64()?, items[0].as_f64()?))
            }
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        json!({ "lat": self.lat, "lon": self.lon })
    }
}

/// 📐 Distance units the engine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceUnit {
    Meters,
    Kilometers,
    Miles,
}

impl DistanceUnit {
    fn suffix(self) -> &'static str {
        match self {
            DistanceUnit::Meters => "m",
            DistanceUnit::Kilometers => "km",
            DistanceUnit::Miles => "mi",
        }
    }

    fn to_km(self, value: f64) -> f64 {
        match self {
            DistanceUnit::Meters => value / 1_000.0,
            DistanceUnit::Kilometers => value,
            DistanceUnit::Miles => value * 1.609_344,
        }
    }
}

/// 🎯 A radius. `Distance::new(5.0, DistanceUnit::Kilometers)` prints as `5km`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Distance {
    pub value: f64,
    pub unit: DistanceUnit,
}

impl Distance {
    pub fn new(value: f64, unit: DistanceUnit) -> Self {
        Self { value, unit }
    }

    pub fn km(value: f64) -> Self {
        Self::new(value, DistanceUnit::Kilometers)
    }

    pub fn as_km(&self) -> f64 {
        self.unit.to_km(self.value)
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

impl FromStr for Distance {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim().to_ascii_lowercase();
        let split_at = trimmed
            .find(|c: char| c.is_ascii_alphabetic())
            .ok_or_else(|| format!("'{raw}' has no distance unit"))?;
        let (number, unit) = trimmed.split_at(split_at);
        let value: f64 = number
            .trim()
            .parse()
            .map_err(|_| format!("'{raw}' does not start with a number"))?;
        let unit = match unit {
            "m" | "meters" => DistanceUnit::Meters,
            "km" | "kilometers" => DistanceUnit::Kilometers,
            "mi" | "miles" => DistanceUnit::Miles,
            other => return Err(format!("'{other}' is not a distance unit")),
        };
        Ok(Distance::new(value, unit))
    }
}

/// 🗺️ A bounding box, corners included.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBox {
    pub top_left: GeoPoint,
    pub bottom_right: GeoPoint,
}

impl GeoBox {
    pub fn new(top_left: GeoPoint, bottom_right: GeoPoint) -> Self {
        Self {
            top_left,
            bottom_right,
        }
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.lat <= self.top_left.lat
            && point.lat >= self.bottom_right.lat
            && point.lon >= self.top_left.lon
            && point.lon <= self.bottom_right.lon
    }
}
