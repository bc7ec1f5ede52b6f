use geo::{BooleanOps, Geometry, MultiPolygon, Translate};

use crate::geom::BBox;
use crate::types::{from_multipolygon, to_multipolygon, Sketch};

/// Longitude windows and the shift that brings each back into [-180, 180].
const WINDOWS: [(f64, f64, f64); 3] = [
    (-540.0, -180.0, 360.0),
    (-180.0, 180.0, 0.0),
    (180.0, 540.0, -360.0),
];

/// Cut polygonal geometry extending past +/-180 longitude into parts that all
/// lie within [-180, 180].
///
/// Geometry already within range, and non-polygonal geometry, is returned
/// unchanged. Parts on either side of the wrap stay separate polygons of the
/// resulting MultiPolygon.
pub fn split_geometry_antimeridian(geometry: &Geometry<f64>) -> Geometry<f64> {
    let (Some(bbox), Some(multi)) = (BBox::of(geometry), to_multipolygon(geometry)) else {
        return geometry.clone();
    };
    if bbox.within_antimeridian() {
        return geometry.clone();
    }

    let mut parts = Vec::new();
    for (min_x, max_x, shift) in WINDOWS {
        if bbox.max_x < min_x || bbox.min_x > max_x {
            continue;
        }
        let window = MultiPolygon(vec![
            BBox::new(min_x, bbox.min_y, max_x, bbox.max_y).to_rect().to_polygon(),
        ]);
        let clipped = multi.intersection(&window).translate(shift, 0.0);
        parts.extend(clipped.0);
    }

    from_multipolygon(MultiPolygon(parts)).unwrap_or_else(|| geometry.clone())
}

/// Copy of `sketch` with its geometry split on the antimeridian and its bbox
/// recomputed.
pub fn split_sketch_antimeridian(sketch: &Sketch) -> Sketch {
    let Some(geometry) = sketch.geometry.as_ref() else {
        return sketch.clone();
    };
    let geometry = split_geometry_antimeridian(geometry);
    Sketch {
        bbox: BBox::of(&geometry),
        geometry: Some(geometry),
        ..sketch.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, polygon};

    fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Geometry<f64> {
        polygon![
            (x: min_x, y: min_y), (x: max_x, y: min_y), (x: max_x, y: max_y), (x: min_x, y: max_y)
        ].into()
    }

    #[test]
    fn splits_polygon_crossing_east() {
        let split = split_geometry_antimeridian(&rect(170.0, 0.0, 190.0, 10.0));
        let Geometry::MultiPolygon(multi) = &split else { panic!("expected multipolygon, got {split:?}") };
        assert_eq!(multi.0.len(), 2);

        let boxes: Vec<_> = multi.0.iter()
            .map(|p| BBox::of(&Geometry::Polygon(p.clone())).unwrap())
            .collect();
        assert!(boxes.contains(&BBox::new(170.0, 0.0, 180.0, 10.0)));
        assert!(boxes.contains(&BBox::new(-180.0, 0.0, -170.0, 10.0)));
    }

    #[test]
    fn shifts_polygon_entirely_west_of_wrap() {
        let split = split_geometry_antimeridian(&rect(-200.0, 0.0, -190.0, 5.0));
        assert_eq!(BBox::of(&split), Some(BBox::new(160.0, 0.0, 170.0, 5.0)));
        assert!(matches!(split, Geometry::Polygon(_)));
    }

    #[test]
    fn leaves_in_range_and_non_areal_geometry_alone() {
        let inside = rect(-10.0, 0.0, 10.0, 10.0);
        assert_eq!(split_geometry_antimeridian(&inside), inside);

        let p: Geometry<f64> = point!(x: 200.0, y: 0.0).into();
        assert_eq!(split_geometry_antimeridian(&p), p);
    }

    #[test]
    fn sketch_bbox_is_recomputed() {
        let sketch = Sketch::new("s", "wrap", rect(-190.0, 0.0, -170.0, 10.0));
        let split = split_sketch_antimeridian(&sketch);
        assert_eq!(split.bbox, Some(BBox::new(-180.0, 0.0, 180.0, 10.0)));
        assert_eq!(split.id, "s");

        let null = Sketch::null("n", "none");
        assert_eq!(split_sketch_antimeridian(&null), null);
    }
}
