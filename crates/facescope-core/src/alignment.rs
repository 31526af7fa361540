//! Face alignment via a 4-DOF similarity transform.
//!
//! Warps a detected face into a square, upright crop so the expression
//! classifier sees eyes and mouth at fixed positions regardless of head roll
//! or distance from the camera.

use crate::types::Landmarks;

/// InsightFace reference landmarks for a 112×112 crop. Scaled for other sizes.
const REFERENCE_LANDMARKS_112: Landmarks = [
    (38.2946, 51.6963),
    (73.5318, 51.5014),
    (56.0252, 71.7366),
    (41.5493, 92.3655),
    (70.7299, 92.2041),
];

pub const REFERENCE_SIZE: f32 = 112.0;

/// Uniform scale + rotation + translation:
///
/// ```text
/// x' = a·x − b·y + tx
/// y' = b·x + a·y + ty
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
struct Similarity {
    a: f32,
    b: f32,
    tx: f32,
    ty: f32,
}

impl Similarity {
    /// Least-squares fit mapping `src` onto `dst`.
    ///
    /// Closed form on centred points; degenerate input (all source points
    /// coincident) yields `None`.
    fn fit(src: &Landmarks, dst: &Landmarks) -> Option<Self> {
        let n = src.len() as f32;
        let centroid = |pts: &Landmarks| {
            let (sx, sy) = pts.iter().fold((0.0, 0.0), |(ax, ay), &(x, y)| (ax + x, ay + y));
            (sx / n, sy / n)
        };
        let (scx, scy) = centroid(src);
        let (dcx, dcy) = centroid(dst);

        let (mut dot, mut cross, mut norm) = (0.0f32, 0.0f32, 0.0f32);
        for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
            let (sx, sy) = (sx - scx, sy - scy);
            let (dx, dy) = (dx - dcx, dy - dcy);
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
            norm += sx * sx + sy * sy;
        }
        if norm < 1e-9 {
            return None;
        }

        let a = dot / norm;
        let b = cross / norm;
        Some(Self {
            a,
            b,
            tx: dcx - (a * scx - b * scy),
            ty: dcy - (b * scx + a * scy),
        })
    }

    fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (self.a * x - self.b * y + self.tx, self.b * x + self.a * y + self.ty)
    }

    fn inverse(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let a = self.a / det;
        let b = -self.b / det;
        Some(Self {
            a,
            b,
            tx: -(a * self.tx - b * self.ty),
            ty: -(b * self.tx + a * self.ty),
        })
    }
}

/// Bilinear sample of a single-channel image; outside pixels read as black.
fn sample_bilinear(gray: &[u8], width: usize, height: usize, x: f32, y: f32) -> f32 {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let px = |x: i64, y: i64| -> f32 {
        if x < 0 || y < 0 || x >= width as i64 || y >= height as i64 {
            return 0.0;
        }
        gray.get(y as usize * width + x as usize).copied().unwrap_or(0) as f32
    };

    let top = px(x0, y0) * (1.0 - fx) + px(x0 + 1, y0) * fx;
    let bottom = px(x0, y0 + 1) * (1.0 - fx) + px(x0 + 1, y0 + 1) * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Reference landmark positions for an `out_size`×`out_size` crop.
pub fn reference_landmarks(out_size: usize) -> Landmarks {
    let k = out_size as f32 / REFERENCE_SIZE;
    REFERENCE_LANDMARKS_112.map(|(x, y)| (x * k, y * k))
}

/// Align a detected face to a canonical `out_size`×`out_size` grayscale crop.
///
/// Degenerate landmarks produce an all-black crop.
pub fn align_face(
    gray: &[u8],
    width: u32,
    height: u32,
    landmarks: &Landmarks,
    out_size: usize,
) -> Vec<u8> {
    let mut out = vec![0u8; out_size * out_size];
    let Some(back) = Similarity::fit(landmarks, &reference_landmarks(out_size)).and_then(|t| t.inverse()) else {
        return out;
    };

    let (w, h) = (width as usize, height as usize);
    for (i, px) in out.iter_mut().enumerate() {
        let (ox, oy) = ((i % out_size) as f32, (i / out_size) as f32);
        let (sx, sy) = back.apply((ox, oy));
        *px = sample_bilinear(gray, w, h, sx, sy).round().clamp(0.0, 255.0) as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: (f32, f32), b: (f32, f32), tol: f32) {
        assert!((a.0 - b.0).abs() < tol && (a.1 - b.1).abs() < tol, "{a:?} vs {b:?}");
    }

    #[test]
    fn test_fit_identity() {
        let t = Similarity::fit(&REFERENCE_LANDMARKS_112, &REFERENCE_LANDMARKS_112).unwrap();
        assert!((t.a - 1.0).abs() < 1e-4);
        assert!(t.b.abs() < 1e-4);
        assert!(t.tx.abs() < 1e-3 && t.ty.abs() < 1e-3);
    }

    #[test]
    fn test_fit_recovers_scale_rotation_translation() {
        // 90° rotation, scale 2, shift (10, -5).
        let truth = Similarity { a: 0.0, b: 2.0, tx: 10.0, ty: -5.0 };
        let dst = REFERENCE_LANDMARKS_112.map(|p| truth.apply(p));
        let t = Similarity::fit(&REFERENCE_LANDMARKS_112, &dst).unwrap();
        assert!((t.a - truth.a).abs() < 1e-3, "a = {}", t.a);
        assert!((t.b - truth.b).abs() < 1e-3, "b = {}", t.b);
        assert_close((t.tx, t.ty), (truth.tx, truth.ty), 1e-2);
    }

    #[test]
    fn test_inverse_round_trips_points() {
        let t = Similarity { a: 0.8, b: -0.3, tx: 4.0, ty: 7.5 };
        let inv = t.inverse().unwrap();
        for p in REFERENCE_LANDMARKS_112 {
            assert_close(inv.apply(t.apply(p)), p, 1e-3);
        }
    }

    #[test]
    fn test_degenerate_landmarks_give_black_crop() {
        let gray = vec![200u8; 32 * 32];
        let collapsed = [(10.0, 10.0); 5];
        assert!(Similarity::fit(&collapsed, &REFERENCE_LANDMARKS_112).is_none());
        assert!(align_face(&gray, 32, 32, &collapsed, 16).iter().all(|&p| p == 0));
    }

    #[test]
    fn test_reference_landmarks_scale() {
        let r = reference_landmarks(56);
        assert_close(r[0], (38.2946 / 2.0, 51.6963 / 2.0), 1e-4);
        assert_eq!(reference_landmarks(112), REFERENCE_LANDMARKS_112);
    }

    #[test]
    fn test_sample_bilinear_midpoint_and_border() {
        let gray = [0u8, 100, 200, 255];
        assert!((sample_bilinear(&gray, 2, 2, 0.5, 0.0) - 50.0).abs() < 1e-4);
        assert_eq!(sample_bilinear(&gray, 2, 2, -3.0, 0.0), 0.0);
    }

    #[test]
    fn test_left_eye_lands_on_reference() {
        let (w, h) = (200usize, 200usize);
        let mut gray = vec![0u8; w * h];
        let src: Landmarks = [(80.0, 60.0), (120.0, 60.0), (100.0, 85.0), (85.0, 110.0), (115.0, 110.0)];
        for y in 56..65 {
            for x in 76..85 {
                gray[y * w + x] = 255;
            }
        }

        let out_size = 64;
        let aligned = align_face(&gray, w as u32, h as u32, &src, out_size);
        assert_eq!(aligned.len(), out_size * out_size);

        let (ex, ey) = reference_landmarks(out_size)[0];
        let (ex, ey) = (ex.round() as usize, ey.round() as usize);
        let peak = (ey - 1..=ey + 1)
            .flat_map(|y| (ex - 1..=ex + 1).map(move |x| (x, y)))
            .map(|(x, y)| aligned[y * out_size + x])
            .max()
            .unwrap();
        assert!(peak > 100, "expected bright patch near ({ex}, {ey}), peak {peak}");
    }
}
