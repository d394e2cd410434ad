use std::collections::BTreeMap;

use crate::bbox::LngLatBbox;
use crate::error::{TilePackError, TilePackResult};

/// Archive metadata: a name → value mapping with typed accessors for the
/// well-known MBTiles keys.
#[derive(Debug, Clone, Default)]
pub struct TilesetMetadata {
    entries: BTreeMap<String, String>,
}

impl TilesetMetadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn required(&self, key: &'static str) -> TilePackResult<&str> {
        self.get(key).ok_or(TilePackError::MissingMetadata(key))
    }

    fn parse_floats<const N: usize>(key: &'static str, value: &str) -> TilePackResult<[f64; N]> {
        let invalid = || TilePackError::InvalidMetadata {
            key,
            value: value.to_string(),
        };

        let parts: Vec<&str> = value.split(',').collect();
        if parts.len() != N {
            return Err(invalid());
        }

        let mut out = [0.0; N];
        for (slot, part) in out.iter_mut().zip(parts) {
            *slot = part.trim().parse().map_err(|_| invalid())?;
        }
        Ok(out)
    }

    /// The `bounds` entry parsed from "west,south,east,north".
    pub fn bounds(&self) -> TilePackResult<LngLatBbox> {
        let raw = self.required("bounds")?;
        let [west, south, east, north] = Self::parse_floats("bounds", raw)?;
        Ok(LngLatBbox::new(west, south, east, north))
    }

    /// The `center` entry parsed from "lng,lat".
    pub fn center(&self) -> TilePackResult<(f64, f64)> {
        let raw = self.required("center")?;
        let [lng, lat] = Self::parse_floats("center", raw)?;
        Ok((lng, lat))
    }

    fn zoom(&self, key: &'static str) -> TilePackResult<u8> {
        let raw = self.required(key)?;
        raw.parse().map_err(|_| TilePackError::InvalidMetadata {
            key,
            value: raw.to_string(),
        })
    }

    pub fn min_zoom(&self) -> TilePackResult<u8> {
        self.zoom("minzoom")
    }

    pub fn max_zoom(&self) -> TilePackResult<u8> {
        self.zoom("maxzoom")
    }

    pub fn format(&self) -> TilePackResult<&str> {
        self.required("format")
    }

    pub fn name(&self) -> TilePackResult<&str> {
        self.required("name")
    }
}

impl FromIterator<(String, String)> for TilesetMetadata {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_round_trip() {
        let mut metadata = TilesetMetadata::new();
        metadata.set("bounds", "-93.577800,44.684800,-92.748200,45.202000");
        let bounds = metadata.bounds().unwrap();
        assert!((bounds.west - -93.5778).abs() < 1e-6);
        assert!((bounds.north - 45.202).abs() < 1e-6);
    }

    #[test]
    fn missing_bounds_is_a_distinct_error() {
        let metadata = TilesetMetadata::new();
        assert!(matches!(
            metadata.bounds(),
            Err(TilePackError::MissingMetadata("bounds"))
        ));
    }

    #[test]
    fn malformed_bounds_reports_the_value() {
        let mut metadata = TilesetMetadata::new();
        metadata.set("bounds", "1,2,3");
        assert!(matches!(
            metadata.bounds(),
            Err(TilePackError::InvalidMetadata { key: "bounds", .. })
        ));
    }

    #[test]
    fn zoom_accessors_parse_integers() {
        let mut metadata = TilesetMetadata::new();
        metadata.set("minzoom", "0");
        metadata.set("maxzoom", "14");
        assert_eq!(metadata.min_zoom().unwrap(), 0);
        assert_eq!(metadata.max_zoom().unwrap(), 14);
    }

    #[test]
    fn center_parses_two_floats() {
        let mut metadata = TilesetMetadata::new();
        metadata.set("center", "-93.163000,44.943400");
        let (lng, lat) = metadata.center().unwrap();
        assert!((lng - -93.163).abs() < 1e-6);
        assert!((lat - 44.9434).abs() < 1e-6);
    }

    #[test]
    fn last_write_wins() {
        let mut metadata = TilesetMetadata::new();
        metadata.set("name", "first");
        metadata.set("name", "second");
        assert_eq!(metadata.name().unwrap(), "second");
    }
}
