#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicI64, Ordering};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use nano_cleanse::{Clock, MemoryAssets, WatermarkEngine};

pub fn encode(image: DynamicImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

/// Opaque grey mask, every pixel `value`.
pub fn uniform_mask(size: u32, value: u8) -> Vec<u8> {
    encode(DynamicImage::ImageRgb8(RgbImage::from_pixel(
        size,
        size,
        Rgb([value, value, value]),
    )))
}

/// Mask built from a per-pixel function, value in the red channel only.
pub fn mask_from(size: u32, f: impl Fn(u32, u32) -> u8) -> Vec<u8> {
    encode(DynamicImage::ImageRgb8(RgbImage::from_fn(size, size, |x, y| {
        Rgb([f(x, y), 0, 0])
    })))
}

pub fn solid_png(width: u32, height: u32, pixel: Rgba<u8>) -> Vec<u8> {
    encode(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        width, height, pixel,
    )))
}

/// Engine whose masks are uniformly 0.2 opaque.
pub fn engine() -> WatermarkEngine {
    WatermarkEngine::new(
        MemoryAssets::new()
            .with(48, uniform_mask(48, 51))
            .with(96, uniform_mask(96, 51)),
    )
}

/// Advances one millisecond per reading.
pub struct StepClock(AtomicI64);

impl StepClock {
    pub fn starting_at(ms: i64) -> Self {
        Self(AtomicI64::new(ms))
    }
}

impl Clock for StepClock {
    fn now_ms(&self) -> i64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}
