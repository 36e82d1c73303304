use std::io::BufReader;
use std::path::Path;

use fast_image_resize::{self as fir, images::Image as FirImage};

use super::{decode, HEIGHT, WIDTH};
use crate::error::{Error, Result};

const GRID: usize = WIDTH * HEIGHT;

/// Extensions the `image` crate is built to decode here.
const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "webp"];

/// Whether `path` looks like an image we can fingerprint, judged by extension.
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Compute the textual fingerprint (16 lowercase hex chars) of an image file.
///
/// The image is decoded, rotated upright according to its EXIF orientation,
/// shrunk to a 9x8 grid and converted to grayscale; each of the 64 bits records
/// whether a pixel is brighter than its right-hand neighbour.
pub fn fingerprint_image(path: &Path) -> Result<String> {
    let pixels = load_grid(path).ok_or_else(|| Error::UnreadableImage(path.to_path_buf()))?;
    Ok(decode(difference_hash(&pixels) as i64))
}

fn load_grid(path: &Path) -> Option<[u8; GRID]> {
    let rgb = image::open(path).ok()?.to_rgb8();
    let (w, h) = (rgb.width() as usize, rgb.height() as usize);

    let (upright, w, h) = orient(rgb.as_raw(), w, h, 3, exif_orientation(path));

    let src = FirImage::from_vec_u8(w as u32, h as u32, upright, fir::PixelType::U8x3).ok()?;
    let mut dst = FirImage::new(WIDTH as u32, HEIGHT as u32, fir::PixelType::U8x3);
    fir::Resizer::new().resize(&src, &mut dst, None).ok()?;

    // BT.601 luma on the 72 resized pixels only.
    let mut gray = [0u8; GRID];
    for (g, px) in gray.iter_mut().zip(dst.buffer().chunks_exact(3)) {
        let luma = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
        *g = luma as u8;
    }
    Some(gray)
}

/// EXIF orientation tag (1-8); 1 when absent or unreadable.
fn exif_orientation(path: &Path) -> u8 {
    let read = || -> Option<u8> {
        let file = std::fs::File::open(path).ok()?;
        let exif = exif::Reader::new()
            .read_from_container(&mut BufReader::new(file))
            .ok()?;
        let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
        field.value.get_uint(0).map(|v| v as u8)
    };
    read().unwrap_or(1)
}

/// Rewrite an interleaved pixel buffer so it is displayed upright.
/// Orientations 5-8 swap width and height.
fn orient(
    buf: &[u8],
    w: usize,
    h: usize,
    channels: usize,
    orientation: u8,
) -> (Vec<u8>, usize, usize) {
    if !(2..=8).contains(&orientation) {
        return (buf.to_vec(), w, h);
    }
    let (out_w, out_h) = if orientation >= 5 { (h, w) } else { (w, h) };
    let mut out = vec![0u8; buf.len()];

    for y in 0..h {
        for x in 0..w {
            let (dx, dy) = match orientation {
                2 => (w - 1 - x, y),
                3 => (w - 1 - x, h - 1 - y),
                4 => (x, h - 1 - y),
                5 => (y, x),
                6 => (h - 1 - y, x),
                7 => (h - 1 - y, w - 1 - x),
                _ => (y, w - 1 - x),
            };
            let from = (y * w + x) * channels;
            let to = (dy * out_w + dx) * channels;
            out[to..to + channels].copy_from_slice(&buf[from..from + channels]);
        }
    }
    (out, out_w, out_h)
}

/// Bit `row * 8 + col` is set when pixel `col` of a row is brighter than pixel `col + 1`.
fn difference_hash(pixels: &[u8; GRID]) -> u64 {
    let mut hash = 0u64;
    for row in 0..HEIGHT {
        for col in 0..WIDTH - 1 {
            if pixels[row * WIDTH + col] > pixels[row * WIDTH + col + 1] {
                hash |= 1 << (row * (WIDTH - 1) + col);
            }
        }
    }
    hash
}
