//! Full-page screenshot assembly.
//!
//! Scroll-and-capture produces one PNG per viewport step; this module
//! stacks them top-to-bottom into a single image. The canvas height is
//! the sum of the capture heights and the width is the widest capture,
//! so nothing a session handed us is ever cropped.

use std::io::Cursor;

use image::{imageops, RgbaImage};

use forager_domain::{Error, Result};

/// Stack PNG captures vertically and re-encode as one PNG.
pub fn stitch_vertical(captures: &[Vec<u8>]) -> Result<Vec<u8>> {
    if captures.is_empty() {
        return Err(Error::Render("no captures to stitch".to_string()));
    }

    let mut frames = Vec::with_capacity(captures.len());
    for (i, bytes) in captures.iter().enumerate() {
        let frame = image::load_from_memory(bytes)
            .map_err(|e| Error::Render(format!("decode capture {i}: {e}")))?
            .to_rgba8();
        frames.push(frame);
    }

    let width = frames.iter().map(|f| f.width()).max().unwrap_or(1);
    let height: u32 = frames.iter().map(|f| f.height()).sum();

    let mut canvas = RgbaImage::from_pixel(width, height, image::Rgba([255, 255, 255, 255]));
    let mut y: i64 = 0;
    for frame in &frames {
        imageops::replace(&mut canvas, frame, 0, y);
        y += i64::from(frame.height());
    }

    let mut out = Vec::new();
    canvas
        .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .map_err(|e| Error::Render(format!("encode stitched png: {e}")))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, image::Rgba(rgba));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn stacks_captures_top_to_bottom() {
        let red = solid_png(4, 3, [255, 0, 0, 255]);
        let blue = solid_png(4, 2, [0, 0, 255, 255]);

        let stitched = stitch_vertical(&[red, blue]).unwrap();
        let img = image::load_from_memory(&stitched).unwrap().to_rgba8();

        assert_eq!(img.dimensions(), (4, 5));
        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(0, 2).0, [255, 0, 0, 255]);
        assert_eq!(img.get_pixel(0, 3).0, [0, 0, 255, 255]);
    }

    #[test]
    fn narrow_frames_sit_on_a_white_canvas() {
        let wide = solid_png(6, 2, [0, 255, 0, 255]);
        let narrow = solid_png(3, 2, [0, 0, 0, 255]);

        let stitched = stitch_vertical(&[wide, narrow]).unwrap();
        let img = image::load_from_memory(&stitched).unwrap().to_rgba8();

        assert_eq!(img.dimensions(), (6, 4));
        // Right half of the narrow row stays white.
        assert_eq!(img.get_pixel(5, 3).0, [255, 255, 255, 255]);
    }

    #[test]
    fn single_capture_round_trips() {
        let one = solid_png(2, 2, [9, 9, 9, 255]);
        let stitched = stitch_vertical(&[one]).unwrap();
        let img = image::load_from_memory(&stitched).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (2, 2));
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(stitch_vertical(&[]).is_err());
    }
}
