/// A 2D affine transform, used both as a raster geotransform and as a
/// pixel-space rotation.
///
/// Maps (col, row) to (x, y):
///   x = a * col + b * row + c
///   y = d * col + e * row + f
///
/// GDAL orders the same six values as [c, a, b, f, d, e].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0)
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, tx, 0.0, 1.0, ty)
    }

    /// Rotation by `degrees` about the origin.
    ///
    /// In a y-down pixel space a positive angle turns clockwise on screen.
    pub fn rotation(degrees: f64) -> Self {
        let (s, c) = degrees.to_radians().sin_cos();
        Self::new(c, -s, 0.0, s, c, 0.0)
    }

    /// Rotation by `degrees` about the point (cx, cy).
    pub fn rotation_about(degrees: f64, cx: f64, cy: f64) -> Self {
        Self::translation(cx, cy)
            .compose(&Self::rotation(degrees))
            .compose(&Self::translation(-cx, -cy))
    }

    /// Build from a GDAL-style geotransform [c, a, b, f, d, e].
    pub fn from_gdal(gt: &[f64; 6]) -> Self {
        Self {
            a: gt[1],
            b: gt[2],
            c: gt[0],
            d: gt[4],
            e: gt[5],
            f: gt[3],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [self.c, self.a, self.b, self.f, self.d, self.e]
    }

    pub fn to_tuple(&self) -> (f64, f64, f64, f64, f64, f64) {
        (self.a, self.b, self.c, self.d, self.e, self.f)
    }

    /// (col, row) -> (x, y).
    pub fn forward(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.a * col + self.b * row + self.c;
        let y = self.d * col + self.e * row + self.f;
        (x, y)
    }

    /// `self ∘ other`: applies `other` first, then `self`.
    pub fn compose(&self, other: &Affine) -> Affine {
        Affine {
            a: self.a * other.a + self.b * other.d,
            b: self.a * other.b + self.b * other.e,
            c: self.a * other.c + self.b * other.f + self.c,
            d: self.d * other.a + self.e * other.d,
            e: self.d * other.b + self.e * other.e,
            f: self.d * other.c + self.e * other.f + self.f,
        }
    }

    pub fn inverse(&self) -> Result<Affine, crate::error::BlockError> {
        let det = self.a * self.e - self.b * self.d;
        if det.abs() < f64::EPSILON {
            return Err(crate::error::BlockError::Affine(
                "Singular affine transform (determinant is zero)".into(),
            ));
        }
        let inv_det = 1.0 / det;
        Ok(Affine {
            a: self.e * inv_det,
            b: -self.b * inv_det,
            c: (self.b * self.f - self.e * self.c) * inv_det,
            d: -self.d * inv_det,
            e: self.a * inv_det,
            f: (self.d * self.c - self.a * self.f) * inv_det,
        })
    }

    /// True when there are no rotation/shear terms (north-up raster).
    pub fn is_rectilinear(&self) -> bool {
        self.b == 0.0 && self.d == 0.0
    }

    /// Same geotransform with its origin moved to pixel (col, row).
    pub fn shifted_to(&self, col: f64, row: f64) -> Affine {
        let (ox, oy) = self.forward(col, row);
        Affine { c: ox, f: oy, ..*self }
    }
}
