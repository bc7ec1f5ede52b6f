use std::str::FromStr;

use anyhow::{anyhow, Context};
use geo::{BoundingRect, Coord, Geometry, Rect};
use rstar::{RTreeObject, AABB};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box `[min_x, min_y, max_x, max_y]` in lon/lat degrees.
/// Serializes as the four-element GeoJSON array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    /// The whole world in lon/lat.
    pub const WORLD: BBox = BBox { min_x: -180.0, min_y: -90.0, max_x: 180.0, max_y: 90.0 };

    #[inline]
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// Bounding box of a geometry, `None` for empty geometries.
    pub fn of(geometry: &Geometry<f64>) -> Option<Self> {
        geometry.bounding_rect().map(Self::from)
    }

    #[inline] pub fn width(&self) -> f64 { self.max_x - self.min_x }

    #[inline] pub fn height(&self) -> f64 { self.max_y - self.min_y }

    /// Closed-interval overlap test; boxes sharing only an edge intersect.
    #[inline]
    pub fn intersects(&self, other: &BBox) -> bool {
        self.max_x >= other.min_x && other.max_x >= self.min_x
            && self.max_y >= other.min_y && other.max_y >= self.min_y
    }

    /// True when `other` lies inside this box, edges included.
    #[inline]
    pub fn contains(&self, other: &BBox) -> bool {
        self.min_x <= other.min_x && self.min_y <= other.min_y
            && self.max_x >= other.max_x && self.max_y >= other.max_y
    }

    /// Smallest box covering both.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// R-tree envelope for this box.
    #[inline]
    pub fn envelope(&self) -> AABB<[f64; 2]> {
        AABB::from_corners([self.min_x, self.min_y], [self.max_x, self.max_y])
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord { x: self.min_x, y: self.min_y },
            Coord { x: self.max_x, y: self.max_y },
        )
    }

    /// True if the box already lies within [-180, 180] longitude.
    #[inline]
    pub fn within_antimeridian(&self) -> bool { self.min_x >= -180.0 && self.max_x <= 180.0 }

    /// Split a box crossing the antimeridian into at most two boxes within
    /// [-180, 180]. The part beyond the wrap is shifted by 360 degrees and
    /// listed first when it came from west of -180, second when east of 180.
    pub fn split_antimeridian(&self) -> Vec<BBox> {
        let Self { min_x, min_y, max_x, max_y } = *self;

        if self.width() >= 360.0 {
            return vec![BBox::new(-180.0, min_y, 180.0, max_y)];
        }
        if max_x < -180.0 {
            return vec![BBox::new(min_x + 360.0, min_y, max_x + 360.0, max_y)];
        }
        if min_x > 180.0 {
            return vec![BBox::new(min_x - 360.0, min_y, max_x - 360.0, max_y)];
        }
        if min_x < -180.0 {
            return vec![
                BBox::new(min_x + 360.0, min_y, 180.0, max_y),
                BBox::new(-180.0, min_y, max_x, max_y),
            ];
        }
        if max_x > 180.0 {
            return vec![
                BBox::new(min_x, min_y, 180.0, max_y),
                BBox::new(-180.0, min_y, max_x - 360.0, max_y),
            ];
        }
        vec![*self]
    }
}

impl From<[f64; 4]> for BBox {
    fn from([min_x, min_y, max_x, max_y]: [f64; 4]) -> Self { Self::new(min_x, min_y, max_x, max_y) }
}

impl From<BBox> for [f64; 4] {
    fn from(b: BBox) -> Self { [b.min_x, b.min_y, b.max_x, b.max_y] }
}

impl From<Rect<f64>> for BBox {
    fn from(rect: Rect<f64>) -> Self {
        Self::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}

impl FromStr for BBox {
    type Err = anyhow::Error;

    /// Parse `"min_x,min_y,max_x,max_y"`.
    fn from_str(s: &str) -> anyhow::Result<Self> {
        let values = s.split(',')
            .map(|part| part.trim().parse::<f64>()
                .with_context(|| format!("Invalid bbox coordinate: {part:?}")))
            .collect::<anyhow::Result<Vec<f64>>>()?;

        let [min_x, min_y, max_x, max_y] = values[..] else {
            return Err(anyhow!("Expected 4 comma-separated values for bbox, got {}", values.len()));
        };
        if min_x > max_x || min_y > max_y {
            return Err(anyhow!("Invalid bbox {s}: min must not exceed max"));
        }
        Ok(Self::new(min_x, min_y, max_x, max_y))
    }
}

/// A bounding box in an R-tree, associated with an item by index.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BoundingBox {
    idx: usize,
    bbox: BBox,
}

impl BoundingBox {
    pub(crate) fn new(idx: usize, bbox: BBox) -> Self { Self { idx, bbox } }

    /// Get the index of the corresponding item.
    pub(crate) fn idx(&self) -> usize { self.idx }

    pub(crate) fn bbox(&self) -> &BBox { &self.bbox }
}

impl RTreeObject for BoundingBox {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope { self.bbox.envelope() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersects_is_inclusive_of_edges() {
        let a = BBox::new(0.0, 0.0, 1.0, 1.0);
        assert!(a.intersects(&BBox::new(1.0, 0.5, 2.0, 2.0)));
        assert!(a.intersects(&BBox::new(0.25, 0.25, 0.75, 0.75)));
        assert!(!a.intersects(&BBox::new(1.01, 0.0, 2.0, 1.0)));
        assert!(!a.intersects(&BBox::new(0.0, -2.0, 1.0, -0.5)));
    }

    #[test]
    fn contains_requires_full_cover() {
        let a = BBox::new(0.0, 0.0, 2.0, 2.0);
        assert!(a.contains(&a));
        assert!(a.contains(&BBox::new(0.5, 0.5, 1.0, 2.0)));
        assert!(!a.contains(&BBox::new(1.0, 1.0, 3.0, 2.0)));
    }

    #[test]
    fn split_crossing_west_of_antimeridian() {
        let boxes = BBox::new(-190.0, 0.0, -170.0, 10.0).split_antimeridian();
        assert_eq!(boxes, vec![
            BBox::new(170.0, 0.0, 180.0, 10.0),
            BBox::new(-180.0, 0.0, -170.0, 10.0),
        ]);
    }

    #[test]
    fn split_crossing_east_of_antimeridian() {
        let boxes = BBox::new(170.0, 0.0, 190.0, 10.0).split_antimeridian();
        assert_eq!(boxes, vec![
            BBox::new(170.0, 0.0, 180.0, 10.0),
            BBox::new(-180.0, 0.0, -170.0, 10.0),
        ]);
    }

    #[test]
    fn split_leaves_normal_box_untouched() {
        let bbox = BBox::new(-10.0, -5.0, 10.0, 5.0);
        assert_eq!(bbox.split_antimeridian(), vec![bbox]);
    }

    #[test]
    fn split_shifts_box_entirely_past_the_wrap() {
        let boxes = BBox::new(-200.0, 0.0, -190.0, 1.0).split_antimeridian();
        assert_eq!(boxes, vec![BBox::new(160.0, 0.0, 170.0, 1.0)]);
    }

    #[test]
    fn split_covers_original_width() {
        let bbox = BBox::new(-190.0, 0.0, -170.0, 10.0);
        let total: f64 = bbox.split_antimeridian().iter().map(BBox::width).sum();
        assert!((total - bbox.width()).abs() < 1e-9);
    }

    #[test]
    fn parses_from_str() {
        let bbox: BBox = "-1.5, 2, 3,4.25".parse().unwrap();
        assert_eq!(bbox, BBox::new(-1.5, 2.0, 3.0, 4.25));
        assert!("1,2,3".parse::<BBox>().is_err());
        assert!("3,0,1,1".parse::<BBox>().is_err());
    }

    #[test]
    fn serializes_as_array() {
        let bbox = BBox::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(serde_json::to_string(&bbox).unwrap(), "[1.0,2.0,3.0,4.0]");
        let back: BBox = serde_json::from_str("[1,2,3,4]").unwrap();
        assert_eq!(back, bbox);
    }
}
