// Classical inpainting through OpenCV's Telea implementation

use image::{GrayImage, Rgba, RgbaImage};
use opencv::core::{Mat, Scalar, Vec3b, CV_8UC1, CV_8UC3};
use opencv::photo;
use opencv::prelude::*;

/// Fill masked pixels with `photo::inpaint(.., INPAINT_TELEA)`.
///
/// Colour channels are inpainted; alpha is carried over from the source.
/// With no masked pixels, or no known pixels to sample from, the source is
/// returned unchanged.
pub fn inpaint_telea(image: &RgbaImage, mask: &GrayImage, radius: u32) -> opencv::Result<RgbaImage> {
    let masked = mask.pixels().filter(|p| p[0] != 0).count();
    if masked == 0 || masked == mask.len() {
        return Ok(image.clone());
    }

    let (width, height) = image.dimensions();

    // Convert to OpenCV Mats
    let mut src = Mat::new_rows_cols_with_default(
        height as i32,
        width as i32,
        CV_8UC3,
        Scalar::all(0.0),
    )?;
    let mut mask_mat = Mat::new_rows_cols_with_default(
        height as i32,
        width as i32,
        CV_8UC1,
        Scalar::all(0.0),
    )?;

    for y in 0..height {
        for x in 0..width {
            let p = image.get_pixel(x, y);
            *src.at_2d_mut::<Vec3b>(y as i32, x as i32)? = Vec3b::from([p[0], p[1], p[2]]);
            *mask_mat.at_2d_mut::<u8>(y as i32, x as i32)? = mask.get_pixel(x, y)[0];
        }
    }

    let mut dst = Mat::default();
    photo::inpaint(&src, &mask_mat, &mut dst, radius as f64, photo::INPAINT_TELEA)?;

    // Convert back to ImageBuffer
    let mut result = RgbaImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let c = *dst.at_2d::<Vec3b>(y as i32, x as i32)?;
            let alpha = image.get_pixel(x, y)[3];
            result.put_pixel(x, y, Rgba([c[0], c[1], c[2], alpha]));
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn block_mask(w: u32, h: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    #[test]
    fn test_empty_mask_is_identity() {
        let img = RgbaImage::from_fn(16, 16, |x, y| Rgba([(x * 10) as u8, (y * 10) as u8, 7, 255]));
        let out = inpaint_telea(&img, &GrayImage::new(16, 16), 3).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn test_fills_block_on_flat_background() {
        let mut img = RgbaImage::from_pixel(24, 24, Rgba([128, 128, 128, 255]));
        for y in 9..15 {
            for x in 9..15 {
                img.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        let mask = block_mask(24, 24, 9, 9, 15, 15);

        let out = inpaint_telea(&img, &mask, 3).unwrap();
        for p in out.pixels() {
            assert!((p[0] as i32 - 128).abs() <= 1, "pixel {:?}", p);
            assert_eq!(p[3], 255);
        }
    }

    #[test]
    fn test_unmasked_pixels_untouched() {
        let img = RgbaImage::from_fn(20, 20, |x, _| Rgba([(x * 12) as u8, 0, 0, 255]));
        let mask = block_mask(20, 20, 8, 8, 12, 12);
        let out = inpaint_telea(&img, &mask, 3).unwrap();
        for (x, y, p) in out.enumerate_pixels() {
            if mask.get_pixel(x, y)[0] == 0 {
                assert_eq!(p, img.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn test_follows_horizontal_ramp() {
        let img = RgbaImage::from_fn(30, 30, |x, _| Rgba([(x * 8) as u8, 0, 0, 255]));
        let mask = block_mask(30, 30, 12, 12, 16, 16);
        let out = inpaint_telea(&img, &mask, 3).unwrap();
        // Filled values stay between the neighbors on either side of the hole
        for y in 12..16 {
            for x in 12..16 {
                let v = out.get_pixel(x, y)[0];
                assert!((88..=136).contains(&v), "({}, {}) = {}", x, y, v);
            }
        }
    }

    #[test]
    fn test_fully_masked_image_is_returned() {
        let img = RgbaImage::from_pixel(8, 8, Rgba([9, 9, 9, 255]));
        let mask = GrayImage::from_pixel(8, 8, Luma([255]));
        assert_eq!(inpaint_telea(&img, &mask, 3).unwrap(), img);
    }
}
