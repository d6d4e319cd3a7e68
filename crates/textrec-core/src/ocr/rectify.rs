//! Perspective rectification of text quadrilaterals.
//!
//! A detector quad may be rotated or skewed. Rectification crops its
//! bounding box, maps the four corners onto an upright rectangle sized by
//! the quad's top and left edges, and rotates near-vertical results so the
//! recognizer always sees horizontal text.

use image::{imageops, Rgb, RgbImage};
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use tracing::debug;

use super::Quad;

/// Height-to-width ratio at or above which a crop is treated as vertical text.
const VERTICAL_RATIO: f32 = 1.5;

/// Longest accepted output edge, as a multiple of the image diagonal.
const MAX_EDGE_FACTOR: f64 = 2.0;

/// Extract an upright crop for `quad` from `image`.
///
/// The result is a new buffer that shares nothing with `image`. Degenerate
/// geometry (zero-length edges, collinear corners, a quad entirely outside
/// the image, or edges far longer than the image) yields an empty 0x0 buffer.
pub fn rectify(image: &RgbImage, quad: &Quad) -> RgbImage {
    let (left, top, right, bottom) = quad.bounds();

    // Crop region clamped to the image
    let crop_left = left.clamp(0, image.width() as i32) as u32;
    let crop_top = top.clamp(0, image.height() as i32) as u32;
    let crop_right = right.clamp(0, image.width() as i32) as u32;
    let crop_bottom = bottom.clamp(0, image.height() as i32) as u32;

    if crop_right <= crop_left || crop_bottom <= crop_top {
        debug!("Quad {:?} has an empty crop region", quad.points());
        return RgbImage::new(0, 0);
    }
    if quad.area() == 0.0 {
        debug!("Quad {:?} has collinear corners", quad.points());
        return RgbImage::new(0, 0);
    }

    let crop = imageops::crop_imm(
        image,
        crop_left,
        crop_top,
        crop_right - crop_left,
        crop_bottom - crop_top,
    )
    .to_image();

    // Corners in crop-local coordinates
    let local: Vec<(f64, f64)> = quad
        .points()
        .iter()
        .map(|p| (p.x as f64 - crop_left as f64, p.y as f64 - crop_top as f64))
        .collect();

    let points = quad.points();
    let edge_width = points[0].distance(&points[1]);
    let edge_height = points[0].distance(&points[3]);

    let max_edge = MAX_EDGE_FACTOR * (image.width() as f64).hypot(image.height() as f64);
    if edge_width > max_edge || edge_height > max_edge {
        debug!(
            "Quad {:?} edges {:.0}x{:.0} exceed {:.0} for a {}x{} image",
            points,
            edge_width,
            edge_height,
            max_edge,
            image.width(),
            image.height()
        );
        return RgbImage::new(0, 0);
    }

    let target_width = edge_width as u32;
    let target_height = edge_height as u32;

    if target_width == 0 || target_height == 0 {
        debug!(
            "Quad {:?} has a zero-length edge ({}x{})",
            points, target_width, target_height
        );
        return RgbImage::new(0, 0);
    }

    let (w, h) = (target_width as f64, target_height as f64);
    let corners = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];

    let Some(transform) = perspective_transform(&local, &corners) else {
        debug!("Perspective system for {:?} is singular", points);
        return RgbImage::new(0, 0);
    };
    let Some(inverse) = transform.try_inverse() else {
        debug!("Perspective transform for {:?} is not invertible", points);
        return RgbImage::new(0, 0);
    };

    let warped = warp_perspective(&crop, &inverse, target_width, target_height);

    if warped.height() as f32 >= warped.width() as f32 * VERTICAL_RATIO {
        debug!(
            "Rotating vertical crop {}x{}",
            warped.width(),
            warped.height()
        );
        // Transpose followed by a vertical flip
        imageops::rotate270(&warped)
    } else {
        warped
    }
}

/// Solve for the homography mapping `src[i]` onto `dst[i]`.
///
/// Returns `None` when the 8x8 system is singular.
fn perspective_transform(src: &[(f64, f64)], dst: &[(f64, f64); 4]) -> Option<Matrix3<f64>> {
    let mut a = DMatrix::<f64>::zeros(8, 8);
    let mut b = DVector::<f64>::zeros(8);

    for (i, (&(x, y), &(u, v))) in src.iter().zip(dst.iter()).enumerate() {
        let row = i * 2;
        a[(row, 0)] = x;
        a[(row, 1)] = y;
        a[(row, 2)] = 1.0;
        a[(row, 6)] = -x * u;
        a[(row, 7)] = -y * u;
        b[row] = u;

        a[(row + 1, 3)] = x;
        a[(row + 1, 4)] = y;
        a[(row + 1, 5)] = 1.0;
        a[(row + 1, 6)] = -x * v;
        a[(row + 1, 7)] = -y * v;
        b[row + 1] = v;
    }

    let solution = a.lu().solve(&b)?;
    if solution.iter().any(|v| !v.is_finite()) {
        return None;
    }

    Some(Matrix3::new(
        solution[0],
        solution[1],
        solution[2],
        solution[3],
        solution[4],
        solution[5],
        solution[6],
        solution[7],
        1.0,
    ))
}

/// Inverse-map every destination pixel through `inverse` and sample `src`
/// bilinearly, replicating edge pixels outside the source.
fn warp_perspective(src: &RgbImage, inverse: &Matrix3<f64>, width: u32, height: u32) -> RgbImage {
    let mut dst = RgbImage::new(width, height);

    for (x, y, pixel) in dst.enumerate_pixels_mut() {
        let p = inverse * Vector3::new(x as f64, y as f64, 1.0);
        *pixel = if p.z.abs() > f64::EPSILON {
            sample_bilinear(src, p.x / p.z, p.y / p.z)
        } else {
            *src.get_pixel(0, 0)
        };
    }

    dst
}

#[inline]
fn pixel_replicate(image: &RgbImage, x: i64, y: i64) -> &Rgb<u8> {
    let cx = x.clamp(0, image.width() as i64 - 1) as u32;
    let cy = y.clamp(0, image.height() as i64 - 1) as u32;
    image.get_pixel(cx, cy)
}

fn sample_bilinear(image: &RgbImage, x: f64, y: f64) -> Rgb<u8> {
    // Keep far-away samples in i64 range; they clamp to the border anyway
    let x = x.clamp(-1.0, image.width() as f64);
    let y = y.clamp(-1.0, image.height() as f64);

    let x0 = x.floor();
    let y0 = y.floor();
    let dx = x - x0;
    let dy = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let p00 = pixel_replicate(image, x0, y0);
    let p10 = pixel_replicate(image, x0 + 1, y0);
    let p01 = pixel_replicate(image, x0, y0 + 1);
    let p11 = pixel_replicate(image, x0 + 1, y0 + 1);

    let mut out = [0u8; 3];
    for (c, value) in out.iter_mut().enumerate() {
        let top = p00[c] as f64 * (1.0 - dx) + p10[c] as f64 * dx;
        let bottom = p01[c] as f64 * (1.0 - dx) + p11[c] as f64 * dx;
        *value = (top * (1.0 - dy) + bottom * dy).round().clamp(0.0, 255.0) as u8;
    }

    Rgb(out)
}
