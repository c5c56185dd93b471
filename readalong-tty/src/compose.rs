use anyhow::{anyhow, Result};
use image::{imageops, Rgba, RgbaImage};
use readalong_core::{Fill, OverlayBox, RenderImage};

use crate::strip::PageStrip;

const BACKGROUND: Rgba<u8> = Rgba([40, 40, 40, 255]);

#[derive(Debug, Clone, Copy)]
pub struct Fills {
    pub active: Fill,
    pub inactive: Fill,
}

impl Fills {
    fn for_box(&self, overlay: &OverlayBox) -> Fill {
        if overlay.is_active {
            self.active
        } else {
            self.inactive
        }
    }
}

/// Assembles the strip rows `[offset, offset + height)` into one image.
/// `page_image` supplies rendered pages and `overlays` the boxes to blend
/// over each page, in draw order.
pub fn compose_viewport<P, O>(
    strip: &PageStrip,
    offset: u32,
    height: u32,
    fills: Fills,
    mut page_image: P,
    mut overlays: O,
) -> Result<RenderImage>
where
    P: FnMut(u32) -> Result<std::sync::Arc<RenderImage>>,
    O: FnMut(u32) -> Vec<OverlayBox>,
{
    let width = strip.width().max(1);
    let height = height.max(1);
    let mut canvas = RgbaImage::from_pixel(width, height, BACKGROUND);

    for slot in strip.visible(offset, height) {
        let top = i64::from(slot.top) - i64::from(offset);
        let rendered = page_image(slot.page)?;
        let page = RgbaImage::from_raw(rendered.width, rendered.height, rendered.pixels.clone())
            .ok_or_else(|| anyhow!("page {} image has a malformed buffer", slot.page))?;
        imageops::replace(&mut canvas, &page, 0, top);

        for overlay in overlays(slot.page) {
            let fill = fills.for_box(&overlay);
            if !fill.is_visible() {
                continue;
            }
            let pixels = overlay.rect.to_pixels(width as f32, slot.height as f32);
            fill_rect(
                &mut canvas,
                pixels.x,
                top as f32 + pixels.y,
                pixels.width,
                pixels.height,
                fill,
            );
        }
    }

    Ok(RenderImage {
        width,
        height,
        pixels: canvas.into_raw(),
    })
}

fn fill_rect(canvas: &mut RgbaImage, x: f32, y: f32, width: f32, height: f32, fill: Fill) {
    let clamp_x = |v: f32| v.clamp(0.0, canvas.width() as f32) as u32;
    let clamp_y = |v: f32| v.clamp(0.0, canvas.height() as f32) as u32;
    let x0 = clamp_x(x.floor());
    let x1 = clamp_x((x + width).ceil());
    let y0 = clamp_y(y.floor());
    let y1 = clamp_y((y + height).ceil());

    for py in y0..y1 {
        for px in x0..x1 {
            blend_pixel(canvas.get_pixel_mut(px, py), fill.rgb, fill.alpha);
        }
    }
}

fn blend_pixel(pixel: &mut Rgba<u8>, color: [u8; 3], alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    let inv = 1.0 - alpha;
    for (channel, tint) in pixel.0.iter_mut().zip(color) {
        *channel = (*channel as f32 * inv + tint as f32 * alpha)
            .round()
            .clamp(0.0, 255.0) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use readalong_core::{NormalizedBox, OverlayKey, PageSize, RegionRef};
    use std::sync::Arc;

    fn white_page(width: u32, height: u32) -> Arc<RenderImage> {
        Arc::new(RenderImage {
            width,
            height,
            pixels: vec![255; (width * height * 4) as usize],
        })
    }

    fn overlay(is_active: bool) -> OverlayBox {
        OverlayBox {
            key: OverlayKey {
                sentence: 1,
                slot: RegionRef {
                    sentence: 0,
                    region: 0,
                },
            },
            rect: NormalizedBox {
                left_pct: 0.0,
                top_pct: 0.0,
                width_pct: 50.0,
                height_pct: 50.0,
            },
            is_active,
            tooltip: Arc::from("one"),
            is_anchor: is_active,
        }
    }

    fn fills() -> Fills {
        Fills {
            active: Fill {
                rgb: [0, 0, 0],
                alpha: 0.5,
            },
            inactive: Fill {
                rgb: [0, 0, 0],
                alpha: 0.0,
            },
        }
    }

    fn pixel(image: &RenderImage, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * image.width + x) * 4) as usize;
        [
            image.pixels[idx],
            image.pixels[idx + 1],
            image.pixels[idx + 2],
            image.pixels[idx + 3],
        ]
    }

    fn square_strip() -> PageStrip {
        let square = PageSize {
            width: 100.0,
            height: 100.0,
        };
        PageStrip::layout(&[square, square], 10, 2)
    }

    #[test]
    fn active_boxes_are_tinted_and_inactive_left_alone() {
        let strip = square_strip();
        let image = compose_viewport(
            &strip,
            0,
            10,
            fills(),
            |_| Ok(white_page(10, 10)),
            |page| vec![overlay(page == 1)],
        )
        .unwrap();
        assert_eq!(pixel(&image, 1, 1), [128, 128, 128, 255]);
        assert_eq!(pixel(&image, 8, 8), [255, 255, 255, 255]);
    }

    #[test]
    fn viewport_spans_gap_between_pages() {
        let strip = square_strip();
        let image = compose_viewport(
            &strip,
            5,
            10,
            fills(),
            |_| Ok(white_page(10, 10)),
            |_| Vec::new(),
        )
        .unwrap();
        assert_eq!(image.height, 10);
        assert_eq!(pixel(&image, 0, 0), [255, 255, 255, 255]);
        assert_eq!(pixel(&image, 0, 5), BACKGROUND.0);
        assert_eq!(pixel(&image, 0, 7), [255, 255, 255, 255]);
    }

    #[test]
    fn render_failures_propagate() {
        let strip = square_strip();
        let result = compose_viewport(
            &strip,
            0,
            10,
            fills(),
            |page| Err(anyhow!("page {page} unavailable")),
            |_| Vec::new(),
        );
        assert!(result.is_err());
    }
}
