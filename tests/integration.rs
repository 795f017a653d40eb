mod common;

use image::{Rgba, RgbaImage};
use nano_cleanse::blending::reverse_channel;
use nano_cleanse::{
    placement_for, region_for, DirAssets, Error, MemoryAssets, PlacementConfig, WatermarkEngine,
};
use proptest::prelude::*;

#[test]
fn engine_reads_assets_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bg_48.png"), common::uniform_mask(48, 51)).unwrap();
    std::fs::write(dir.path().join("bg_96.png"), common::uniform_mask(96, 51)).unwrap();
    let engine = WatermarkEngine::new(DirAssets::new(dir.path()));

    let small = RgbaImage::from_pixel(200, 200, Rgba([200, 200, 200, 255]));
    let cleaned = engine.remove(&small).unwrap();
    assert_eq!(*cleaned.get_pixel(120, 120), Rgba([186, 186, 186, 255]));
    assert!(engine.alpha_maps().is_cached(48));
    assert!(!engine.alpha_maps().is_cached(96));

    let large = RgbaImage::from_pixel(1100, 1100, Rgba([200, 200, 200, 255]));
    let cleaned = engine.remove(&large).unwrap();
    // Large region spans 940..1036
    assert_eq!(*cleaned.get_pixel(940, 1035), Rgba([186, 186, 186, 255]));
    assert_eq!(*cleaned.get_pixel(939, 1000), Rgba([200, 200, 200, 255]));
    assert_eq!(*cleaned.get_pixel(1036, 1000), Rgba([200, 200, 200, 255]));
}

#[test]
fn placement_selection_matches_boundaries() {
    assert_eq!(
        placement_for(1025, 1025),
        PlacementConfig {
            logo_size: 96,
            margin_right: 64,
            margin_bottom: 64,
        }
    );
    assert_eq!(
        placement_for(1024, 1024),
        PlacementConfig {
            logo_size: 48,
            margin_right: 32,
            margin_bottom: 32,
        }
    );
}

#[test]
fn undersized_image_is_invalid_input() {
    assert!(matches!(
        region_for(40, 40),
        Err(Error::InvalidInput { logo_size: 48, .. })
    ));

    let engine = common::engine();
    let err = engine
        .remove_bytes(&common::solid_png(40, 40, Rgba([0, 0, 0, 255])))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput { width: 40, height: 40, .. }));
}

#[test]
fn large_image_without_large_asset_is_missing_asset() {
    let engine = WatermarkEngine::new(MemoryAssets::new().with(48, common::uniform_mask(48, 51)));
    let err = engine
        .remove(&RgbaImage::new(1025, 1025))
        .unwrap_err();
    assert!(matches!(err, Error::MissingAsset { size: 96, .. }));
}

#[test]
fn low_alpha_pixels_are_bit_identical() {
    // Left half of the mask is zero, right half opaque enough to matter.
    let engine = WatermarkEngine::new(
        MemoryAssets::new().with(48, common::mask_from(48, |x, _| if x < 24 { 0 } else { 80 })),
    );
    let input = RgbaImage::from_fn(120, 120, |x, y| {
        #[allow(clippy::cast_possible_truncation)]
        let v = ((x * 13 + y * 7) % 256) as u8;
        Rgba([v, 255 - v, v / 2, 200])
    });

    let output = engine.remove(&input).unwrap();
    let (rx, ry) = (120 - 32 - 48, 120 - 32 - 48);
    for y in ry..ry + 48 {
        for x in rx..rx + 24 {
            assert_eq!(output.get_pixel(x, y), input.get_pixel(x, y));
        }
    }
    assert_ne!(
        output.get_pixel(rx + 30, ry + 10),
        input.get_pixel(rx + 30, ry + 10)
    );
}

#[test]
fn forward_blended_region_is_recovered() {
    let mask_value = |x: u32, y: u32| -> u8 {
        #[allow(clippy::cast_possible_truncation)]
        let v = ((x + y * 48) % 128) as u8;
        v
    };
    let engine = WatermarkEngine::new(MemoryAssets::new().with(48, common::mask_from(48, mask_value)));

    let original = RgbaImage::from_fn(200, 150, |x, y| {
        #[allow(clippy::cast_possible_truncation)]
        let v = ((x * 5 + y * 3) % 256) as u8;
        Rgba([v, v.wrapping_add(85), v.wrapping_add(170), 255])
    });

    // Composite the white logo the way the watermark was applied.
    let region = region_for(200, 150).unwrap();
    let mut watermarked = original.clone();
    for dy in 0..48 {
        for dx in 0..48 {
            let alpha = f64::from(f32::from(mask_value(dx, dy)) / 255.0);
            let px = watermarked.get_pixel_mut(region.x + dx, region.y + dy);
            for ch in 0..3 {
                let blended = f64::from(px[ch]) * (1.0 - alpha) + 255.0 * alpha;
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                {
                    px[ch] = blended.round() as u8;
                }
            }
        }
    }

    let restored = engine.remove(&watermarked).unwrap();

    for (x, y, px) in restored.enumerate_pixels() {
        let orig = original.get_pixel(x, y);
        for ch in 0..4 {
            let diff = (i32::from(px[ch]) - i32::from(orig[ch])).abs();
            assert!(
                diff <= 1,
                "pixel ({x},{y}) ch {ch} diff {diff} (restored={}, orig={})",
                px[ch],
                orig[ch]
            );
        }
    }
}

fn forward(original: u8, alpha: f32) -> u8 {
    let alpha = f64::from(alpha);
    let blended = f64::from(original) * (1.0 - alpha) + 255.0 * alpha;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        blended.round() as u8
    }
}

proptest! {
    #[test]
    fn inversion_within_one_for_moderate_alpha(original in 0u8..=255, m in 1u8..=127) {
        let alpha = f32::from(m) / 255.0;
        let restored = reverse_channel(forward(original, alpha), alpha);
        prop_assert!((i32::from(restored) - i32::from(original)).abs() <= 1);
    }

    #[test]
    fn inversion_error_scales_with_opacity(original in 0u8..=255, m in 128u8..=252) {
        let alpha = f32::from(m) / 255.0;
        let restored = reverse_channel(forward(original, alpha), alpha);
        let bound = (0.5 / (1.0 - f64::from(alpha))).ceil() as i32 + 1;
        prop_assert!((i32::from(restored) - i32::from(original)).abs() <= bound);
    }
}
