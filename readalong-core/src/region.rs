use std::sync::Arc;

use thiserror::Error;

pub type SentenceId = i64;

/// A rectangle in a page's native coordinate space. Bottom-left origin: `y`
/// runs from the page's bottom edge to the region's lower edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub page: u32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub page_width: f32,
    pub page_height: f32,
}

impl Region {
    /// Distance from the page's top edge to the region's upper edge.
    pub fn top_from_page_top(&self) -> f32 {
        self.page_height - (self.y + self.height)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sentence {
    pub id: SentenceId,
    pub text: Arc<str>,
    pub regions: Vec<Region>,
}

impl Sentence {
    pub fn new(id: SentenceId, text: impl Into<Arc<str>>, regions: Vec<Region>) -> Self {
        Self {
            id,
            text: text.into(),
            regions,
        }
    }
}

/// A region expressed as percentages (0-100, unclamped) of its page's
/// rendered box, measured from the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NormalizedBox {
    pub left_pct: f32,
    pub top_pct: f32,
    pub width_pct: f32,
    pub height_pct: f32,
}

impl NormalizedBox {
    pub fn right_pct(&self) -> f32 {
        self.left_pct + self.width_pct
    }

    pub fn bottom_pct(&self) -> f32 {
        self.top_pct + self.height_pct
    }

    /// Inclusive containment test for a point given in page percentages.
    pub fn contains(&self, x_pct: f32, y_pct: f32) -> bool {
        x_pct >= self.left_pct
            && x_pct <= self.right_pct()
            && y_pct >= self.top_pct
            && y_pct <= self.bottom_pct()
    }

    pub fn is_empty(&self) -> bool {
        self.width_pct <= 0.0 || self.height_pct <= 0.0
    }

    /// Projects the box onto a rendered page of `width` x `height` pixels.
    /// The result may lie partly or fully outside the page.
    pub fn to_pixels(&self, width: f32, height: f32) -> PixelBox {
        PixelBox {
            x: self.left_pct / 100.0 * width,
            y: self.top_pct / 100.0 * height,
            width: self.width_pct / 100.0 * width,
            height: self.height_pct / 100.0 * height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDimension {
    Width,
    Height,
}

impl std::fmt::Display for PageDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageDimension::Width => f.write_str("page_width"),
            PageDimension::Height => f.write_str("page_height"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegionError {
    #[error("region on page {page} has unusable {dimension} {value}")]
    InvalidPageDimension {
        page: u32,
        dimension: PageDimension,
        value: f32,
    },
}

/// Converts a bottom-left-origin region into a top-left percentage box.
pub fn normalize(region: &Region) -> Result<NormalizedBox, RegionError> {
    check_dimension(region.page, PageDimension::Width, region.page_width)?;
    check_dimension(region.page, PageDimension::Height, region.page_height)?;

    Ok(NormalizedBox {
        left_pct: 100.0 * region.x / region.page_width,
        top_pct: 100.0 * region.top_from_page_top() / region.page_height,
        width_pct: 100.0 * region.width / region.page_width,
        height_pct: 100.0 * region.height / region.page_height,
    })
}

fn check_dimension(page: u32, dimension: PageDimension, value: f32) -> Result<(), RegionError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(RegionError::InvalidPageDimension {
            page,
            dimension,
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(x: f32, y: f32, width: f32, height: f32) -> Region {
        Region {
            page: 1,
            x,
            y,
            width,
            height,
            page_width: 600.0,
            page_height: 800.0,
        }
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 0.01
    }

    #[test]
    fn normalizes_reference_region() {
        let rect = normalize(&region(100.0, 700.0, 50.0, 20.0)).unwrap();
        assert!(approx(rect.left_pct, 16.67));
        assert!(approx(rect.top_pct, 10.0));
        assert!(approx(rect.width_pct, 8.33));
        assert!(approx(rect.height_pct, 2.5));
    }

    #[test]
    fn percentages_scale_back_to_native_box() {
        let samples = [
            region(0.0, 0.0, 600.0, 800.0),
            region(12.5, 40.25, 33.0, 11.0),
            region(599.0, 799.0, 1.0, 1.0),
            region(300.0, 0.0, 0.0, 0.0),
        ];
        for original in samples {
            let rect = normalize(&original).unwrap();
            let x = rect.left_pct / 100.0 * original.page_width;
            let width = rect.width_pct / 100.0 * original.page_width;
            let height = rect.height_pct / 100.0 * original.page_height;
            let top = rect.top_pct / 100.0 * original.page_height;
            let y = original.page_height - top - height;
            assert!((x - original.x).abs() < 1e-2);
            assert!((width - original.width).abs() < 1e-2);
            assert!((height - original.height).abs() < 1e-2);
            assert!((y - original.y).abs() < 1e-2);
        }
    }

    #[test]
    fn top_decreases_as_region_moves_up() {
        let mut previous = f32::INFINITY;
        for step in 0..40 {
            let rect = normalize(&region(10.0, step as f32 * 19.0, 20.0, 15.0)).unwrap();
            assert!(rect.top_pct < previous);
            previous = rect.top_pct;
        }
    }

    #[test]
    fn rejects_degenerate_page_dimensions() {
        let mut bad = region(1.0, 1.0, 1.0, 1.0);
        bad.page_width = 0.0;
        assert_eq!(
            normalize(&bad),
            Err(RegionError::InvalidPageDimension {
                page: 1,
                dimension: PageDimension::Width,
                value: 0.0,
            })
        );

        let mut bad = region(1.0, 1.0, 1.0, 1.0);
        bad.page_height = -12.0;
        assert!(matches!(
            normalize(&bad),
            Err(RegionError::InvalidPageDimension {
                dimension: PageDimension::Height,
                ..
            })
        ));

        let mut bad = region(1.0, 1.0, 1.0, 1.0);
        bad.page_height = f32::NAN;
        assert!(normalize(&bad).is_err());
    }

    #[test]
    fn out_of_page_regions_still_normalize() {
        let rect = normalize(&region(700.0, 900.0, 10.0, 10.0)).unwrap();
        assert!(rect.left_pct > 100.0);
        assert!(rect.top_pct < 0.0);
    }

    #[test]
    fn box_containment_and_projection() {
        let rect = NormalizedBox {
            left_pct: 10.0,
            top_pct: 20.0,
            width_pct: 30.0,
            height_pct: 10.0,
        };
        assert!(rect.contains(10.0, 20.0));
        assert!(rect.contains(40.0, 30.0));
        assert!(!rect.contains(41.0, 25.0));

        let px = rect.to_pixels(200.0, 400.0);
        assert!(approx(px.x, 20.0));
        assert!(approx(px.y, 80.0));
        assert!(approx(px.width, 60.0));
        assert!(approx(px.height, 40.0));
    }
}
