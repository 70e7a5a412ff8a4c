//! Math types and helpers
//!
//! Provides the fundamental math types used by the document core. All
//! transforms are plain 4x4 column-major matrices; elements never store
//! decomposed position/rotation/scale.

pub use nalgebra::{Matrix3, Matrix4, Quaternion, Unit, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Extension trait for `Mat4` with the transform helpers the core needs
pub trait Mat4Ext {
    /// Create a pure translation matrix
    fn from_translation(offset: Vec3) -> Mat4;

    /// Get the translation column of the matrix
    fn translation_part(&self) -> Vec3;

    /// Overwrite the translation column, leaving rotation/scale untouched
    fn set_translation_part(&mut self, offset: Vec3);

    /// Component-wise near-equality with an absolute tolerance
    fn approx_eq(&self, other: &Mat4, epsilon: f32) -> bool;
}

impl Mat4Ext for Mat4 {
    fn from_translation(offset: Vec3) -> Mat4 {
        Mat4::new_translation(&offset)
    }

    fn translation_part(&self) -> Vec3 {
        Vec3::new(self.m14, self.m24, self.m34)
    }

    fn set_translation_part(&mut self, offset: Vec3) {
        self.m14 = offset.x;
        self.m24 = offset.y;
        self.m34 = offset.z;
    }

    fn approx_eq(&self, other: &Mat4, epsilon: f32) -> bool {
        self.iter()
            .zip(other.iter())
            .all(|(a, b)| (a - b).abs() <= epsilon)
    }
}

/// Invert a transform matrix, falling back to identity for the degenerate
/// case. Degenerate group transforms would otherwise poison every child
/// matrix they touch, so the fallback is logged.
#[must_use]
pub fn invert_or_identity(matrix: &Mat4) -> Mat4 {
    matrix.try_inverse().unwrap_or_else(|| {
        log::warn!("non-invertible transform encountered, substituting identity");
        Mat4::identity()
    })
}
