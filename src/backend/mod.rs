//! Raw input backends: where taps, keys and screenshots actually go.

pub mod adb;
pub mod desktop;
pub mod dry_run;

use std::time::Duration;

use image::DynamicImage;

use crate::actuator::ActuationError;
use crate::detector::{self, ImageTarget, PreparedRef};
use crate::layout::{Point, Resolution};

pub use adb::AdbBackend;
pub use desktop::DesktopBackend;
pub use dry_run::DryRunBackend;

pub trait InputBackend {
    fn name(&self) -> &'static str;
    fn tap(&mut self, at: Point) -> Result<(), ActuationError>;
    fn key(&mut self, key: &str) -> Result<(), ActuationError>;
    fn swipe(&mut self, from: Point, to: Point, duration: Duration) -> Result<(), ActuationError>;
    fn move_to(&mut self, at: Point) -> Result<(), ActuationError>;
    fn cursor(&mut self) -> Result<Point, ActuationError>;
    fn screen_size(&mut self) -> Result<Resolution, ActuationError>;
    fn clipboard(&mut self) -> Result<String, ActuationError>;

    /// Screen position of `target`, or `None` when it is not visible.
    fn locate(
        &mut self,
        target: ImageTarget,
        template: Option<&PreparedRef>,
        confidence: f32,
    ) -> Result<Option<Point>, ActuationError>;
}

/// Run the template detector over a screenshot. The point is in screenshot pixels.
pub fn find(screenshot: &DynamicImage, template: &PreparedRef, confidence: f32) -> Option<Point> {
    detector::locate(screenshot, template, confidence).map(|m| Point::new(m.x as i32, m.y as i32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_find_reports_template_center() {
        let screen = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 48, |x, y| {
            let mut v = x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663);
            v ^= v >> 13;
            v = v.wrapping_mul(0x5bd1_e995);
            v ^= v >> 15;
            Rgb([v as u8, (v >> 8) as u8, (v >> 16) as u8])
        }));
        let template = PreparedRef::new(&screen.crop_imm(20, 10, 12, 8));

        assert_eq!(find(&screen, &template, 0.9), Some(Point::new(26, 14)));
    }
}
