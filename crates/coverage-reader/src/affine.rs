//! 2D affine transforms backed by a homogeneous 3x3 matrix.

use coverage_common::{BoundingBox, CoverageError, CoverageResult};
use nalgebra::{Matrix3, Vector3};

/// A 2D affine transform.
///
/// Maps `(x, y)` to `(sx*x + shx*y + tx, shy*x + sy*y + ty)`. Grid-to-world
/// transforms map pixel coordinates (column, row) to CRS coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform {
    matrix: Matrix3<f64>,
}

impl AffineTransform {
    pub fn new(
        scale_x: f64,
        shear_x: f64,
        translate_x: f64,
        shear_y: f64,
        scale_y: f64,
        translate_y: f64,
    ) -> Self {
        Self {
            matrix: Matrix3::new(
                scale_x,
                shear_x,
                translate_x,
                shear_y,
                scale_y,
                translate_y,
                0.0,
                0.0,
                1.0,
            ),
        }
    }

    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
        }
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, tx, 0.0, 1.0, ty)
    }

    pub fn scaling(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, 0.0, sy, 0.0)
    }

    pub fn scale_x(&self) -> f64 {
        self.matrix[(0, 0)]
    }

    pub fn shear_x(&self) -> f64 {
        self.matrix[(0, 1)]
    }

    pub fn translate_x(&self) -> f64 {
        self.matrix[(0, 2)]
    }

    pub fn shear_y(&self) -> f64 {
        self.matrix[(1, 0)]
    }

    pub fn scale_y(&self) -> f64 {
        self.matrix[(1, 1)]
    }

    pub fn translate_y(&self) -> f64 {
        self.matrix[(1, 2)]
    }

    pub fn determinant(&self) -> f64 {
        self.scale_x() * self.scale_y() - self.shear_x() * self.shear_y()
    }

    pub fn is_identity(&self) -> bool {
        self.matrix == Matrix3::identity()
    }

    /// `self ∘ other`: the result applies `other` first, then `self`.
    pub fn concatenate(&self, other: &AffineTransform) -> AffineTransform {
        AffineTransform {
            matrix: self.matrix * other.matrix,
        }
    }

    /// `other ∘ self`: the result applies `self` first, then `other`.
    pub fn pre_concatenate(&self, other: &AffineTransform) -> AffineTransform {
        AffineTransform {
            matrix: other.matrix * self.matrix,
        }
    }

    /// Inverse transform. Singular or non-finite transforms are rejected.
    pub fn inverse(&self) -> CoverageResult<AffineTransform> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return Err(CoverageError::validation(format!(
                "transform is not invertible (determinant {})",
                det
            )));
        }

        self.matrix
            .try_inverse()
            .map(|matrix| AffineTransform { matrix })
            .ok_or_else(|| CoverageError::validation("transform is not invertible"))
    }

    pub fn transform_point(&self, x: f64, y: f64) -> (f64, f64) {
        let p = self.matrix * Vector3::new(x, y, 1.0);
        (p.x, p.y)
    }

    /// Envelope of the transformed corners of `bbox`.
    pub fn transform_bbox(&self, bbox: &BoundingBox) -> BoundingBox {
        let corners = bbox.corners().map(|(x, y)| self.transform_point(x, y));
        // Four points always produce an envelope.
        BoundingBox::from_points(&corners).unwrap_or(*bbox)
    }

    /// Pixel size along each grid axis.
    pub fn resolution(&self) -> (f64, f64) {
        (
            self.scale_x().hypot(self.shear_y()),
            self.shear_x().hypot(self.scale_y()),
        )
    }

    pub fn is_finite(&self) -> bool {
        self.matrix.iter().all(|v| v.is_finite())
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}
