use serde::{Deserialize, Serialize};
use std::fmt;

/// Catalog family a search targets; selects the STAC collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SensorFamily {
    Sentinel2,
    Landsat,
}

impl SensorFamily {
    pub fn collection(&self) -> &'static str {
        match self {
            SensorFamily::Sentinel2 => "sentinel-2-l2a",
            SensorFamily::Landsat => "landsat-c2-l2",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SensorFamily::Sentinel2 => "Sentinel-2",
            SensorFamily::Landsat => "Landsat",
        }
    }
}

impl fmt::Display for SensorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sensor {
    Sentinel2,
    Landsat5,
    Landsat7,
    Landsat8,
    Landsat9,
}

impl Sensor {
    pub fn family(&self) -> SensorFamily {
        match self {
            Sensor::Sentinel2 => SensorFamily::Sentinel2,
            _ => SensorFamily::Landsat,
        }
    }

    /// Sensor from a STAC `platform` value such as `sentinel-2b` or `landsat-8`.
    pub fn from_platform(platform: &str) -> Option<Self> {
        let p = platform.to_ascii_lowercase().replace(['_', ' '], "-");
        if p.starts_with("sentinel-2") {
            return Some(Sensor::Sentinel2);
        }
        match p.as_str() {
            "landsat-5" => Some(Sensor::Landsat5),
            "landsat-7" => Some(Sensor::Landsat7),
            "landsat-8" => Some(Sensor::Landsat8),
            "landsat-9" => Some(Sensor::Landsat9),
            _ => None,
        }
    }

    /// Best guess from a collection id when no platform is given.
    pub fn from_collection(collection: &str) -> Option<Self> {
        let c = collection.to_ascii_lowercase();
        if c.starts_with("sentinel-2") {
            Some(Sensor::Sentinel2)
        } else if c.starts_with("landsat") {
            Some(Sensor::Landsat8)
        } else {
            None
        }
    }

    /// Asset keys holding `band`, in lookup order.
    pub fn asset_keys(&self, band: Band) -> &'static [&'static str] {
        match (self.family(), band) {
            (_, Band::Blue) => &["blue"],
            (_, Band::Green) => &["green"],
            (_, Band::Red) => &["red"],
            (SensorFamily::Sentinel2, Band::Nir) => &["nir"],
            (SensorFamily::Sentinel2, Band::Swir16) => &["swir16"],
            (SensorFamily::Sentinel2, Band::Swir22) => &["swir22", "swir2"],
            (SensorFamily::Landsat, Band::Nir) => &["nir08", "nir"],
            (SensorFamily::Landsat, Band::Swir16) => &["swir16", "swir1"],
            (SensorFamily::Landsat, Band::Swir22) => &["swir22", "swir2"],
        }
    }

    /// Surface reflectance from a stored digital number.
    pub fn reflectance(&self, dn: f32) -> f32 {
        match self.family() {
            SensorFamily::Sentinel2 => dn / 10_000.0,
            SensorFamily::Landsat => dn * 0.000_027_5 - 0.2,
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Sensor::Sentinel2 => "Sentinel-2",
            Sensor::Landsat5 => "Landsat 5",
            Sensor::Landsat7 => "Landsat 7",
            Sensor::Landsat8 => "Landsat 8",
            Sensor::Landsat9 => "Landsat 9",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Band {
    Blue,
    Green,
    Red,
    Nir,
    Swir16,
    Swir22,
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Band::Blue => "blue",
            Band::Green => "green",
            Band::Red => "red",
            Band::Nir => "nir",
            Band::Swir16 => "swir16",
            Band::Swir22 => "swir22",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandCombinationPreset {
    #[default]
    NaturalColor,
    Infrared,
    Agriculture,
}

impl BandCombinationPreset {
    pub const ALL: [BandCombinationPreset; 3] = [
        BandCombinationPreset::NaturalColor,
        BandCombinationPreset::Infrared,
        BandCombinationPreset::Agriculture,
    ];

    /// Bands shown as (red, green, blue).
    pub fn bands(&self) -> [Band; 3] {
        match self {
            BandCombinationPreset::NaturalColor => [Band::Red, Band::Green, Band::Blue],
            BandCombinationPreset::Infrared => [Band::Nir, Band::Red, Band::Green],
            BandCombinationPreset::Agriculture => [Band::Swir16, Band::Nir, Band::Blue],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BandCombinationPreset::NaturalColor => "Natural",
            BandCombinationPreset::Infrared => "Infrared",
            BandCombinationPreset::Agriculture => "Agriculture",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            BandCombinationPreset::NaturalColor => "natural",
            BandCombinationPreset::Infrared => "infrared",
            BandCombinationPreset::Agriculture => "agriculture",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpectralIndexFormula {
    Ndvi,
    Nbr,
}

impl SpectralIndexFormula {
    /// `(A, B)` of `(A - B) / (A + B)`.
    pub fn bands(&self) -> (Band, Band) {
        match self {
            SpectralIndexFormula::Ndvi => (Band::Nir, Band::Red),
            SpectralIndexFormula::Nbr => (Band::Nir, Band::Swir22),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SpectralIndexFormula::Ndvi => "NDVI",
            SpectralIndexFormula::Nbr => "NBR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platforms_map_to_sensors() {
        assert_eq!(Sensor::from_platform("sentinel-2b"), Some(Sensor::Sentinel2));
        assert_eq!(Sensor::from_platform("LANDSAT_9"), Some(Sensor::Landsat9));
        assert_eq!(Sensor::from_platform("landsat-7"), Some(Sensor::Landsat7));
        assert_eq!(Sensor::from_platform("modis"), None);
        assert_eq!(
            Sensor::from_collection("landsat-c2-l2"),
            Some(Sensor::Landsat8)
        );
    }

    #[test]
    fn landsat_falls_back_to_older_asset_names() {
        assert_eq!(Sensor::Landsat5.asset_keys(Band::Nir), &["nir08", "nir"]);
        assert_eq!(Sensor::Sentinel2.asset_keys(Band::Nir), &["nir"]);
        assert_eq!(Sensor::Landsat9.asset_keys(Band::Swir16), &["swir16", "swir1"]);
    }

    #[test]
    fn reflectance_scaling() {
        assert!((Sensor::Sentinel2.reflectance(2500.0) - 0.25).abs() < 1e-6);
        // 0.2 / 0.0000275 is the Landsat zero-reflectance DN
        assert!(Sensor::Landsat8.reflectance(7272.727).abs() < 1e-4);
    }

    #[test]
    fn presets_use_three_distinct_bands() {
        for preset in BandCombinationPreset::ALL {
            let [r, g, b] = preset.bands();
            assert!(r != g && g != b && r != b);
        }
        assert_eq!(SpectralIndexFormula::Nbr.bands(), (Band::Nir, Band::Swir22));
    }
}
