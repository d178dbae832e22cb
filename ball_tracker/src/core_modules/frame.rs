// THEORY:
// A `Frame` is the unit that flows down the pipeline: rendered once on the
// server, or decoded once on the client, and never touched again. Ownership is
// handed from stage to stage by value, so there is only ever one reader. The
// pixel buffer is a packed RGB `image::RgbImage`.

use image::{ImageEncoder, Rgb, RgbImage};

pub const BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);
pub const BALL_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Presentation-timestamp unit, `numerator / denominator` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    pub numerator: u32,
    pub denominator: u32,
}

impl TimeBase {
    pub const fn per_second(denominator: u32) -> Self {
        Self {
            numerator: 1,
            denominator,
        }
    }
}

/// An immutable picture plus its presentation timestamp.
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbImage,
    pts: i64,
    time_base: TimeBase,
}

impl Frame {
    pub fn new(image: RgbImage, pts: i64, time_base: TimeBase) -> Self {
        Self {
            image,
            pts,
            time_base,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn pts(&self) -> i64 {
        self.pts
    }

    pub fn time_base(&self) -> TimeBase {
        self.time_base
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Losslessly encodes the pixels as PNG.
    pub fn encode_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut out = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut out);
        encoder.write_image(
            self.image.as_raw(),
            self.width(),
            self.height(),
            image::ExtendedColorType::Rgb8,
        )?;
        Ok(out)
    }

    pub fn decode_png(bytes: &[u8], pts: i64, time_base: TimeBase) -> Result<Self, image::ImageError> {
        let image = image::load_from_memory_with_format(bytes, image::ImageFormat::Png)?.to_rgb8();
        Ok(Self::new(image, pts, time_base))
    }
}

/// A PNG-compressed frame as it came off the wire. Decoding is left to
/// whoever consumes it, so the receiving callback stays O(1).
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    png: Vec<u8>,
    pts: i64,
    time_base: TimeBase,
}

impl EncodedFrame {
    pub fn new(png: Vec<u8>, pts: i64, time_base: TimeBase) -> Self {
        Self { png, pts, time_base }
    }

    pub fn pts(&self) -> i64 {
        self.pts
    }

    pub fn decode(&self) -> Result<Frame, image::ImageError> {
        Frame::decode_png(&self.png, self.pts, self.time_base)
    }
}

/// A frame of `BACKGROUND`.
pub fn blank(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, BACKGROUND)
}

/// Paints every pixel whose centre lies within `radius` of `center`. Parts of
/// the disc outside the image are clipped.
pub fn fill_circle(image: &mut RgbImage, center: (i32, i32), radius: i32, color: Rgb<u8>) {
    if radius < 0 {
        return;
    }
    let (cx, cy) = center;
    let (w, h) = (image.width() as i32, image.height() as i32);
    let r_sq = (radius as i64) * (radius as i64);

    let y0 = (cy - radius).max(0);
    let y1 = (cy + radius).min(h - 1);
    for y in y0..=y1 {
        let dy = (y - cy) as i64;
        let x0 = (cx - radius).max(0);
        let x1 = (cx + radius).min(w - 1);
        for x in x0..=x1 {
            let dx = (x - cx) as i64;
            if dx * dx + dy * dy <= r_sq {
                image.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circle_is_symmetric_and_clipped() {
        let mut img = blank(64, 48);
        fill_circle(&mut img, (10, 10), 5, BALL_COLOR);
        assert_eq!(*img.get_pixel(10, 10), BALL_COLOR);
        assert_eq!(*img.get_pixel(5, 10), BALL_COLOR);
        assert_eq!(*img.get_pixel(15, 10), BALL_COLOR);
        assert_eq!(*img.get_pixel(10, 15), BALL_COLOR);
        assert_eq!(*img.get_pixel(4, 10), BACKGROUND);
        assert_eq!(*img.get_pixel(14, 14), BACKGROUND);

        // Mostly off-canvas; must not panic.
        fill_circle(&mut img, (63, 0), 30, BALL_COLOR);
        assert_eq!(*img.get_pixel(63, 0), BALL_COLOR);
    }

    #[test]
    fn png_preserves_pixels_and_timestamp() {
        let mut img = blank(32, 24);
        fill_circle(&mut img, (16, 12), 6, BALL_COLOR);
        let frame = Frame::new(img, 6000, TimeBase::per_second(90_000));
        let png = frame.encode_png().unwrap();
        let decoded = Frame::decode_png(&png, frame.pts(), frame.time_base()).unwrap();
        assert_eq!(decoded.image(), frame.image());
        assert_eq!(decoded.pts(), 6000);
    }

    #[test]
    fn encoded_frame_decodes_lazily() {
        let mut img = blank(16, 16);
        fill_circle(&mut img, (8, 8), 3, BALL_COLOR);
        let frame = Frame::new(img, 3000, TimeBase::per_second(90_000));
        let encoded = EncodedFrame::new(frame.encode_png().unwrap(), 3000, frame.time_base());
        assert_eq!(encoded.pts(), 3000);
        assert_eq!(encoded.decode().unwrap().image(), frame.image());

        let garbage = EncodedFrame::new(vec![1, 2, 3], 0, frame.time_base());
        assert!(garbage.decode().is_err());
    }
}
