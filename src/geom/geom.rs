use geo::{ChamberlainDuquetteArea, Coord, Geometry, MapCoords};

use crate::geom::BBox;
use crate::types::{to_multipolygon, Feature, Sketch};

/// Decimal digits kept when truncating coordinates before clipping.
pub const COORD_PRECISION: u32 = 6;

/// Geodesic area in square meters of the polygonal part of a geometry
/// (spherical excess on the WGS84 equatorial radius). Non-areal geometry is 0.
pub fn area(geometry: &Geometry<f64>) -> f64 {
    to_multipolygon(geometry)
        .map(|multi| multi.chamberlain_duquette_unsigned_area())
        .unwrap_or(0.0)
}

/// Area of a feature, 0 for null geometry.
#[inline]
pub fn feature_area(feature: &Feature) -> f64 {
    feature.geometry.as_ref().map_or(0.0, area)
}

/// Round every coordinate to `precision` decimal digits.
pub fn truncate_geometry(geometry: &Geometry<f64>, precision: u32) -> Geometry<f64> {
    let factor = 10f64.powi(precision as i32);
    geometry.map_coords(|Coord { x, y }| Coord {
        x: (x * factor).round() / factor,
        y: (y * factor).round() / factor,
    })
}

/// Copy of `feature` with coordinates truncated to [`COORD_PRECISION`].
pub fn truncate_feature(feature: &Feature) -> Feature {
    let mut truncated = Feature {
        geometry: feature.geometry.as_ref().map(|g| truncate_geometry(g, COORD_PRECISION)),
        bbox: None,
        ..feature.clone()
    };
    truncated.ensure_bbox();
    truncated
}

/// Copy of `sketch` with coordinates truncated to [`COORD_PRECISION`].
pub fn truncate_sketch(sketch: &Sketch) -> Sketch {
    let geometry = sketch.geometry.as_ref().map(|g| truncate_geometry(g, COORD_PRECISION));
    Sketch {
        bbox: geometry.as_ref().and_then(BBox::of),
        geometry,
        ..sketch.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, polygon, Point};

    #[test]
    fn one_degree_square_at_equator_has_expected_area() {
        let square: Geometry<f64> = polygon![
            (x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)
        ].into();
        // R^2 * dlon * (sin(lat2) - sin(lat1)) on R = 6378137 m
        let a = area(&square);
        assert!((a - 12_391_340_000.0).abs() / a < 0.01, "area {a}");
    }

    #[test]
    fn points_have_no_area() {
        assert_eq!(area(&point!(x: 1.0, y: 2.0).into()), 0.0);
        assert_eq!(feature_area(&Feature::null()), 0.0);
    }

    #[test]
    fn truncates_to_six_digits() {
        let g: Geometry<f64> = Point::new(1.123_456_789, -2.987_654_321).into();
        let Geometry::Point(p) = truncate_geometry(&g, COORD_PRECISION) else { panic!("expected point") };
        assert_eq!(p.x(), 1.123_457);
        assert_eq!(p.y(), -2.987_654);
    }

    #[test]
    fn truncation_recomputes_bbox() {
        let g: Geometry<f64> = polygon![
            (x: 0.0, y: 0.0), (x: 1.000_000_4, y: 0.0), (x: 1.000_000_4, y: 1.0), (x: 0.0, y: 1.0)
        ].into();
        let stale = BBox::new(-5.0, -5.0, 5.0, 5.0);

        let mut feature = Feature::new(g.clone());
        feature.bbox = Some(stale);
        assert_eq!(truncate_feature(&feature).bbox, Some(BBox::new(0.0, 0.0, 1.0, 1.0)));

        let mut sketch = Sketch::new("s", "S", g);
        sketch.bbox = Some(stale);
        assert_eq!(truncate_sketch(&sketch).bbox, Some(BBox::new(0.0, 0.0, 1.0, 1.0)));
        assert_eq!(truncate_sketch(&Sketch::null("n", "N")).bbox, None);
    }
}
