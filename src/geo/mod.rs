use crate::error::{SceneError, SceneResult};
use std::fmt;
use std::ops::Sub;

mod projection;

pub use projection::Transformer;

pub const WGS84: u16 = 4326;
pub const WEB_MERCATOR: u16 = 3857;

// Samples per edge when reprojecting a bounding box
const EDGE_SAMPLES: usize = 21;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval<T> {
    pub min: T,
    pub max: T,
}

impl<T> Interval<T> {
    pub fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl<T: Copy + Sub<Output = T>> Interval<T> {
    pub fn range(&self) -> T {
        self.max - self.min
    }
}

impl Interval<f64> {
    fn intersect(&self, other: &Self) -> Option<Self> {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        (max > min).then_some(Self { min, max })
    }

    fn contains(&self, other: &Self, tolerance: f64) -> bool {
        other.min >= self.min - tolerance && other.max <= self.max + tolerance
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region<T> {
    pub x: Interval<T>,
    pub y: Interval<T>,
}

impl<T> Region<T> {
    pub fn new(min_x: T, min_y: T, max_x: T, max_y: T) -> Self {
        Self {
            x: Interval::new(min_x, max_x),
            y: Interval::new(min_y, max_y),
        }
    }
}

impl<T: Copy> Region<T> {
    pub fn as_tuple(&self) -> (T, T, T, T) {
        (self.x.min, self.y.min, self.x.max, self.y.max)
    }
}

/// Bounding box in a given EPSG coordinate reference system.
///
/// Geographic systems use degrees (x = longitude, y = latitude).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapExtent {
    pub epsg: u16,
    pub region: Region<f64>,
}

impl MapExtent {
    pub fn new(epsg: u16, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> SceneResult<Self> {
        let finite = [min_x, min_y, max_x, max_y].iter().all(|v| v.is_finite());
        if !finite || min_x >= max_x || min_y >= max_y {
            return Err(SceneError::Projection(format!(
                "degenerate extent ({min_x}, {min_y}, {max_x}, {max_y}) in EPSG:{epsg}"
            )));
        }
        Ok(Self {
            epsg,
            region: Region::new(min_x, min_y, max_x, max_y),
        })
    }

    pub fn lat_lon_deg(west: f64, south: f64, east: f64, north: f64) -> SceneResult<Self> {
        Self::new(WGS84, west, south, east, north)
    }

    /// Square extent of `meters` around a WGS84 point, measured in web mercator.
    pub fn around_point(lon: f64, lat: f64, meters: f64) -> SceneResult<Self> {
        let to_metric = Transformer::new(WGS84, WEB_MERCATOR)?;
        let (x, y) = to_metric.transform(lon, lat)?;
        let metric = Self::new(WEB_MERCATOR, x - meters, y - meters, x + meters, y + meters)?;
        metric.reproject(WGS84)
    }

    pub fn min_x(&self) -> f64 {
        self.region.x.min
    }

    pub fn min_y(&self) -> f64 {
        self.region.y.min
    }

    pub fn max_x(&self) -> f64 {
        self.region.x.max
    }

    pub fn max_y(&self) -> f64 {
        self.region.y.max
    }

    pub fn width(&self) -> f64 {
        self.region.x.range()
    }

    pub fn height(&self) -> f64 {
        self.region.y.range()
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Overlap of two extents in the same CRS, `None` when empty or CRSs differ.
    pub fn intersection(&self, other: &MapExtent) -> Option<MapExtent> {
        if self.epsg != other.epsg {
            return None;
        }
        let x = self.region.x.intersect(&other.region.x)?;
        let y = self.region.y.intersect(&other.region.y)?;
        Some(MapExtent {
            epsg: self.epsg,
            region: Region { x, y },
        })
    }

    pub fn contains(&self, other: &MapExtent) -> bool {
        let tolerance = 1e-9 * self.width().max(self.height());
        self.epsg == other.epsg
            && self.region.x.contains(&other.region.x, tolerance)
            && self.region.y.contains(&other.region.y, tolerance)
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x() && x <= self.max_x() && y >= self.min_y() && y <= self.max_y()
    }

    /// Bounding box of this extent in another CRS, sampled along every edge.
    pub fn reproject(&self, epsg: u16) -> SceneResult<MapExtent> {
        if epsg == self.epsg {
            return Ok(*self);
        }
        let transformer = Transformer::new(self.epsg, epsg)?;
        let (min_x, min_y, max_x, max_y) = self.region.as_tuple();
        let mut bounds: Option<(f64, f64, f64, f64)> = None;
        for i in 0..EDGE_SAMPLES {
            let t = i as f64 / (EDGE_SAMPLES - 1) as f64;
            let x = min_x + t * (max_x - min_x);
            let y = min_y + t * (max_y - min_y);
            for (px, py) in [(x, min_y), (x, max_y), (min_x, y), (max_x, y)] {
                let Ok((u, v)) = transformer.transform(px, py) else {
                    continue;
                };
                if !u.is_finite() || !v.is_finite() {
                    continue;
                }
                bounds = Some(match bounds {
                    None => (u, v, u, v),
                    Some((a, b, c, d)) => (a.min(u), b.min(v), c.max(u), d.max(v)),
                });
            }
        }
        let (a, b, c, d) = bounds.ok_or_else(|| {
            SceneError::Projection(format!(
                "extent {self} has no valid points in EPSG:{epsg}"
            ))
        })?;
        MapExtent::new(epsg, a, b, c, d)
    }
}

impl fmt::Display for MapExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.6}, {:.6}, {:.6}, {:.6}] EPSG:{}",
            self.min_x(),
            self.min_y(),
            self.max_x(),
            self.max_y(),
            self.epsg
        )
    }
}

/// Search location in WGS84 degrees.
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    Point { lon: f64, lat: f64 },
    Polygon(Vec<(f64, f64)>),
}

impl Location {
    pub fn point(lon: f64, lat: f64) -> Self {
        Location::Point { lon, lat }
    }

    pub fn validate(&self) -> SceneResult<()> {
        let check = |lon: f64, lat: f64| {
            if !lon.is_finite() || !lat.is_finite() {
                return Err(SceneError::InvalidQuery(format!(
                    "coordinate ({lon}, {lat}) is not a number"
                )));
            }
            if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
                return Err(SceneError::InvalidQuery(format!(
                    "coordinate ({lon}, {lat}) is outside longitude/latitude range"
                )));
            }
            Ok(())
        };
        match self {
            Location::Point { lon, lat } => check(*lon, *lat),
            Location::Polygon(ring) => {
                for (lon, lat) in ring {
                    check(*lon, *lat)?;
                }
                let mut distinct: Vec<(f64, f64)> = vec![];
                for vertex in ring {
                    if !distinct.contains(vertex) {
                        distinct.push(*vertex);
                    }
                }
                if distinct.len() < 3 {
                    return Err(SceneError::InvalidQuery(format!(
                        "polygon needs at least 3 distinct vertices, got {}",
                        distinct.len()
                    )));
                }
                Ok(())
            }
        }
    }

    /// Representative point: the point itself or the polygon's vertex mean.
    pub fn anchor(&self) -> (f64, f64) {
        match self {
            Location::Point { lon, lat } => (*lon, *lat),
            Location::Polygon(ring) => {
                // A closed ring repeats its first vertex at the end
                let open = match ring.as_slice() {
                    [first, rest @ .., last] if first == last && !rest.is_empty() => &ring[..ring.len() - 1],
                    _ => ring.as_slice(),
                };
                let n = open.len().max(1) as f64;
                let (sx, sy) = open
                    .iter()
                    .fold((0.0, 0.0), |(sx, sy), (x, y)| (sx + x, sy + y));
                (sx / n, sy / n)
            }
        }
    }

    /// Search area: a buffer around a point or the polygon bounding box.
    pub fn search_extent(&self, buffer_meters: f64) -> SceneResult<MapExtent> {
        match self {
            Location::Point { lon, lat } => MapExtent::around_point(*lon, *lat, buffer_meters),
            Location::Polygon(ring) => {
                let (mut w, mut s, mut e, mut n) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
                for (lon, lat) in ring {
                    w = w.min(*lon);
                    s = s.min(*lat);
                    e = e.max(*lon);
                    n = n.max(*lat);
                }
                MapExtent::lat_lon_deg(w, s, e, n)
                    .map_err(|_| SceneError::InvalidQuery("polygon has no area".to_string()))
            }
        }
    }
}
