//! Face alignment ahead of encoding.
//!
//! Maps the five detected facial landmarks onto the canonical InsightFace
//! reference positions with a 4-DOF similarity transform (scale, rotation,
//! translation) and warps the face into a 112x112 crop.

use crate::preprocess::PreparedImage;

/// Canonical ArcFace reference landmarks for a 112x112 crop:
/// left eye, right eye, nose, left mouth, right mouth.
pub(crate) const REFERENCE_LANDMARKS: [(f32, f32); 5] = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

pub(crate) const ALIGNED_SIZE: usize = 112;

/// 4-DOF similarity transform `[a, -b; b, a]` plus translation `(tx, ty)`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SimilarityTransform {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl SimilarityTransform {
    /// Least-squares estimate mapping `src` landmarks onto `dst`.
    ///
    /// Each point pair contributes two equations to an overdetermined
    /// system in (a, b, tx, ty), solved via the 4x4 normal equations.
    pub(crate) fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Self {
        let mut ata = [0.0f32; 16];
        let mut atb = [0.0f32; 4];

        for i in 0..5 {
            let (sx, sy) = src[i];
            let (dx, dy) = dst[i];
            // sx*a - sy*b + tx = dx
            let r1 = [sx, -sy, 1.0, 0.0];
            // sy*a + sx*b + ty = dy
            let r2 = [sy, sx, 0.0, 1.0];

            for j in 0..4 {
                for k in 0..4 {
                    ata[j * 4 + k] += r1[j] * r1[k] + r2[j] * r2[k];
                }
                atb[j] += r1[j] * dx + r2[j] * dy;
            }
        }

        let x = solve_4x4(&ata, &atb);
        Self {
            a: x[0],
            b: x[1],
            tx: x[2],
            ty: x[3],
        }
    }

    pub(crate) fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        (
            self.a * x - self.b * y + self.tx,
            self.b * x + self.a * y + self.ty,
        )
    }

    /// Map a destination coordinate back into source space. Degenerate
    /// transforms (zero scale) map everything to the origin.
    fn apply_inverse(&self, x: f32, y: f32) -> (f32, f32) {
        let det = self.a * self.a + self.b * self.b;
        if det.abs() < 1e-12 {
            return (0.0, 0.0);
        }
        let dx = x - self.tx;
        let dy = y - self.ty;
        (
            (self.a * dx + self.b * dy) / det,
            (self.a * dy - self.b * dx) / det,
        )
    }
}

/// Solve a 4x4 linear system via Gaussian elimination with partial
/// pivoting. Near-singular systems fall back to an identity-like result.
#[allow(clippy::needless_range_loop)]
fn solve_4x4(ata: &[f32; 16], atb: &[f32; 4]) -> [f32; 4] {
    let mut m = [[0.0f32; 5]; 4];
    for i in 0..4 {
        for j in 0..4 {
            m[i][j] = ata[i * 4 + j];
        }
        m[i][4] = atb[i];
    }

    for col in 0..4 {
        let mut pivot_row = col;
        let mut pivot_val = m[col][col].abs();
        for row in (col + 1)..4 {
            if m[row][col].abs() > pivot_val {
                pivot_val = m[row][col].abs();
                pivot_row = row;
            }
        }
        m.swap(col, pivot_row);

        let pivot = m[col][col];
        if pivot.abs() < 1e-12 {
            return [1.0, 0.0, 0.0, 0.0];
        }

        for row in (col + 1)..4 {
            let factor = m[row][col] / pivot;
            for j in col..5 {
                m[row][j] -= factor * m[col][j];
            }
        }
    }

    let mut x = [0.0f32; 4];
    for i in (0..4).rev() {
        x[i] = m[i][4];
        for j in (i + 1)..4 {
            x[i] -= m[i][j] * x[j];
        }
        x[i] /= m[i][i];
    }
    x
}

/// Warp the face region into a canonical 112x112 aligned crop.
///
/// Bilinear sampling; pixels mapping outside the source are black.
pub(crate) fn align_face(image: &PreparedImage, landmarks: &[(f32, f32); 5]) -> Vec<u8> {
    let transform = SimilarityTransform::estimate(landmarks, &REFERENCE_LANDMARKS);
    let width = image.width() as usize;
    let height = image.height() as usize;
    let pixels = image.pixels();

    let mut out = vec![0u8; ALIGNED_SIZE * ALIGNED_SIZE];
    for oy in 0..ALIGNED_SIZE {
        for ox in 0..ALIGNED_SIZE {
            let (sx, sy) = transform.apply_inverse(ox as f32, oy as f32);

            let x0 = sx.floor() as i32;
            let y0 = sy.floor() as i32;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            let sample = |x: i32, y: i32| -> f32 {
                if x >= 0 && (x as usize) < width && y >= 0 && (y as usize) < height {
                    pixels[y as usize * width + x as usize] as f32
                } else {
                    0.0
                }
            };

            let value = sample(x0, y0) * (1.0 - fx) * (1.0 - fy)
                + sample(x0 + 1, y0) * fx * (1.0 - fy)
                + sample(x0, y0 + 1) * (1.0 - fx) * fy
                + sample(x0 + 1, y0 + 1) * fx * fy;

            out[oy * ALIGNED_SIZE + ox] = value.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::Purpose;

    #[test]
    fn test_identity_estimate() {
        let t = SimilarityTransform::estimate(&REFERENCE_LANDMARKS, &REFERENCE_LANDMARKS);
        assert!((t.a - 1.0).abs() < 1e-4, "a = {}", t.a);
        assert!(t.b.abs() < 1e-4, "b = {}", t.b);
        assert!(t.tx.abs() < 1e-3, "tx = {}", t.tx);
        assert!(t.ty.abs() < 1e-3, "ty = {}", t.ty);
    }

    #[test]
    fn test_estimate_recovers_scale() {
        // Source landmarks at 2x: the fitted scale is ~0.5.
        let src: [(f32, f32); 5] = [
            (76.5892, 103.3926),
            (147.0636, 103.0028),
            (112.0504, 143.4732),
            (83.0986, 184.7310),
            (141.4598, 184.4082),
        ];
        let t = SimilarityTransform::estimate(&src, &REFERENCE_LANDMARKS);
        assert!((t.a - 0.5).abs() < 0.05, "a = {}, expected ~0.5", t.a);
    }

    #[test]
    fn test_apply_inverse_roundtrip() {
        let src: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];
        let t = SimilarityTransform::estimate(&src, &REFERENCE_LANDMARKS);
        let (fx, fy) = t.apply(100.0, 85.0);
        let (bx, by) = t.apply_inverse(fx, fy);
        assert!((bx - 100.0).abs() < 1e-2);
        assert!((by - 85.0).abs() < 1e-2);
    }

    #[test]
    fn test_align_output_size() {
        let image = PreparedImage::from_luma(vec![128u8; 640 * 480], 640, 480, Purpose::Face);
        let aligned = align_face(&image, &REFERENCE_LANDMARKS);
        assert_eq!(aligned.len(), ALIGNED_SIZE * ALIGNED_SIZE);
    }

    #[test]
    fn test_landmark_lands_on_reference_position() {
        // A bright patch painted at the source left eye should end up
        // near the reference left-eye position after alignment.
        let w = 200u32;
        let h = 200u32;
        let mut pixels = vec![0u8; (w * h) as usize];

        let src: [(f32, f32); 5] = [
            (80.0, 60.0),
            (120.0, 60.0),
            (100.0, 85.0),
            (85.0, 110.0),
            (115.0, 110.0),
        ];

        let lx = src[0].0 as u32;
        let ly = src[0].1 as u32;
        for dy in 0..5 {
            for dx in 0..5 {
                let px = lx - 2 + dx;
                let py = ly - 2 + dy;
                pixels[(py * w + px) as usize] = 255;
            }
        }

        let image = PreparedImage::from_luma(pixels, w, h, Purpose::Face);
        let aligned = align_face(&image, &src);

        let ref_x = REFERENCE_LANDMARKS[0].0.round() as usize;
        let ref_y = REFERENCE_LANDMARKS[0].1.round() as usize;
        let mut max_val = 0u8;
        for dy in 0..3usize {
            for dx in 0..3usize {
                let x = ref_x - 1 + dx;
                let y = ref_y - 1 + dy;
                if x < ALIGNED_SIZE && y < ALIGNED_SIZE {
                    max_val = max_val.max(aligned[y * ALIGNED_SIZE + x]);
                }
            }
        }
        assert!(
            max_val > 100,
            "expected bright patch near ({ref_x}, {ref_y}), max={max_val}"
        );
    }
}
