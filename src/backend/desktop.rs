//! Drives the host desktop: the real pointer, keyboard, clipboard and screen.
//!
//! Layout presets are measured in logical screen points, which is what the pointer moves in.
//! Screenshots come back at the display's pixel density (twice the points on a Retina panel),
//! so detector matches are mapped back to points before anything is clicked.

use crate::layout::{Point, Resolution};

#[cfg(any(target_os = "macos", target_os = "windows"))]
pub use native::DesktopBackend;

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub use unsupported::DesktopBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStroke {
    Char(char),
    Escape,
    Return,
    Tab,
    Space,
    Backspace,
}

/// Keystroke for a key name. Single letters and digits are typed as themselves, lowercase,
/// so the emulator's own keyboard mapping sees them.
pub fn key_stroke(key: &str) -> Option<KeyStroke> {
    let lower = key.to_ascii_lowercase();
    let named = match lower.as_str() {
        "esc" | "escape" => Some(KeyStroke::Escape),
        "enter" | "return" => Some(KeyStroke::Return),
        "tab" => Some(KeyStroke::Tab),
        "space" => Some(KeyStroke::Space),
        "backspace" => Some(KeyStroke::Backspace),
        _ => None,
    };
    if named.is_some() {
        return named;
    }

    let mut chars = lower.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphanumeric() => Some(KeyStroke::Char(c)),
        _ => None,
    }
}

/// Map a pixel of a `captured`-sized screenshot onto a `screen` measured in points.
pub fn to_screen(at: Point, captured: Resolution, screen: Resolution) -> Point {
    if captured == screen || captured.width == 0 || captured.height == 0 {
        return at;
    }
    let sx = f64::from(screen.width) / f64::from(captured.width);
    let sy = f64::from(screen.height) / f64::from(captured.height);
    Point::new(
        (f64::from(at.x) * sx).round() as i32,
        (f64::from(at.y) * sy).round() as i32,
    )
}

/// Pointer positions for a drag from `from` to `to`, ending exactly on `to`.
pub fn drag_path(from: Point, to: Point, steps: u32) -> Vec<Point> {
    let steps = steps.max(1) as i32;
    (1..=steps)
        .map(|i| {
            Point::new(
                from.x + (to.x - from.x) * i / steps,
                from.y + (to.y - from.y) * i / steps,
            )
        })
        .collect()
}

#[cfg(any(target_os = "macos", target_os = "windows"))]
mod native {
    use std::thread;
    use std::time::Duration;

    use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
    use image::DynamicImage;
    use xcap::Monitor;

    use super::{KeyStroke, drag_path, key_stroke, to_screen};
    use crate::actuator::ActuationError;
    use crate::backend::{InputBackend, find};
    use crate::detector::{ImageTarget, PreparedRef};
    use crate::layout::{Point, Resolution};

    const DRAG_STEP: Duration = Duration::from_millis(20);

    pub struct DesktopBackend {
        enigo: Enigo,
        clipboard: arboard::Clipboard,
    }

    impl DesktopBackend {
        pub fn new() -> Result<Self, ActuationError> {
            let enigo = Enigo::new(&Settings::default()).map_err(|e| failed("input", e))?;
            let clipboard = arboard::Clipboard::new().map_err(|e| failed("clipboard", e))?;
            Ok(Self { enigo, clipboard })
        }

        fn move_abs(&mut self, at: Point) -> Result<(), ActuationError> {
            self.enigo
                .move_mouse(at.x, at.y, Coordinate::Abs)
                .map_err(|e| failed(format!("move to {at}"), e))
        }

        /// Screenshot of the main display, in physical pixels.
        fn capture(&self) -> Result<DynamicImage, ActuationError> {
            let monitor =
                Monitor::from_point(0, 0).map_err(|e| ActuationError::Capture(e.to_string()))?;
            let shot = monitor
                .capture_image()
                .map_err(|e| ActuationError::Capture(e.to_string()))?;
            Ok(DynamicImage::ImageRgba8(shot))
        }

        fn left(&mut self, direction: Direction) -> Result<(), ActuationError> {
            self.enigo
                .button(Button::Left, direction)
                .map_err(|e| failed(format!("left button {direction:?}"), e))
        }
    }

    impl InputBackend for DesktopBackend {
        fn name(&self) -> &'static str {
            "desktop"
        }

        fn tap(&mut self, at: Point) -> Result<(), ActuationError> {
            self.move_abs(at)?;
            self.left(Direction::Click)
        }

        fn key(&mut self, key: &str) -> Result<(), ActuationError> {
            let stroke = key_stroke(key).ok_or_else(|| ActuationError::Command {
                command: format!("key {key}"),
                reason: "no keyboard key for this name".into(),
            })?;
            let key_code = match stroke {
                KeyStroke::Char(c) => Key::Unicode(c),
                KeyStroke::Escape => Key::Escape,
                KeyStroke::Return => Key::Return,
                KeyStroke::Tab => Key::Tab,
                KeyStroke::Space => Key::Space,
                KeyStroke::Backspace => Key::Backspace,
            };
            self.enigo
                .key(key_code, Direction::Click)
                .map_err(|e| failed(format!("key {key}"), e))
        }

        fn swipe(
            &mut self,
            from: Point,
            to: Point,
            duration: Duration,
        ) -> Result<(), ActuationError> {
            let steps = (duration.as_millis() / DRAG_STEP.as_millis()).max(1) as u32;
            let pause = duration / steps;

            self.move_abs(from)?;
            self.left(Direction::Press)?;
            let moved = drag_path(from, to, steps).into_iter().try_for_each(|at| {
                thread::sleep(pause);
                self.move_abs(at)
            });
            // Never leave the button held, even when a move failed
            let released = self.left(Direction::Release);
            moved.and(released)
        }

        fn move_to(&mut self, at: Point) -> Result<(), ActuationError> {
            self.move_abs(at)
        }

        fn cursor(&mut self) -> Result<Point, ActuationError> {
            let (x, y) = self.enigo.location().map_err(|e| failed("pointer location", e))?;
            Ok(Point::new(x, y))
        }

        fn screen_size(&mut self) -> Result<Resolution, ActuationError> {
            let (width, height) = self
                .enigo
                .main_display()
                .map_err(|e| failed("display size", e))?;
            Ok(Resolution::new(width.max(0) as u32, height.max(0) as u32))
        }

        fn clipboard(&mut self) -> Result<String, ActuationError> {
            match self.clipboard.get_text() {
                Ok(text) => Ok(text),
                Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
                Err(e) => Err(failed("clipboard", e)),
            }
        }

        fn locate(
            &mut self,
            target: ImageTarget,
            template: Option<&PreparedRef>,
            confidence: f32,
        ) -> Result<Option<Point>, ActuationError> {
            let template = template.ok_or(ActuationError::MissingTemplate(target))?;
            let shot = self.capture()?;
            let screen = self.screen_size()?;
            let captured = Resolution::new(shot.width(), shot.height());
            Ok(find(&shot, template, confidence).map(|at| to_screen(at, captured, screen)))
        }
    }

    fn failed(command: impl Into<String>, e: impl std::fmt::Display) -> ActuationError {
        ActuationError::Command {
            command: command.into(),
            reason: e.to_string(),
        }
    }
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
mod unsupported {
    use std::time::Duration;

    use crate::actuator::ActuationError;
    use crate::backend::InputBackend;
    use crate::detector::{ImageTarget, PreparedRef};
    use crate::layout::{Point, Resolution};

    /// No desktop input on this platform; `new` always fails.
    pub enum DesktopBackend {}

    impl DesktopBackend {
        pub fn new() -> Result<Self, ActuationError> {
            Err(ActuationError::Command {
                command: "desktop input".into(),
                reason: "only available on macOS and Windows, set RECRUITER_BACKEND to adb or dry-run"
                    .into(),
            })
        }
    }

    impl InputBackend for DesktopBackend {
        fn name(&self) -> &'static str {
            match *self {}
        }

        fn tap(&mut self, _at: Point) -> Result<(), ActuationError> {
            match *self {}
        }

        fn key(&mut self, _key: &str) -> Result<(), ActuationError> {
            match *self {}
        }

        fn swipe(&mut self, _: Point, _: Point, _: Duration) -> Result<(), ActuationError> {
            match *self {}
        }

        fn move_to(&mut self, _at: Point) -> Result<(), ActuationError> {
            match *self {}
        }

        fn cursor(&mut self) -> Result<Point, ActuationError> {
            match *self {}
        }

        fn screen_size(&mut self) -> Result<Resolution, ActuationError> {
            match *self {}
        }

        fn clipboard(&mut self) -> Result<String, ActuationError> {
            match *self {}
        }

        fn locate(
            &mut self,
            _target: ImageTarget,
            _template: Option<&PreparedRef>,
            _confidence: f32,
        ) -> Result<Option<Point>, ActuationError> {
            match *self {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_strokes() {
        assert_eq!(key_stroke("g"), Some(KeyStroke::Char('g')));
        assert_eq!(key_stroke("G"), Some(KeyStroke::Char('g')));
        assert_eq!(key_stroke("7"), Some(KeyStroke::Char('7')));
        assert_eq!(key_stroke("esc"), Some(KeyStroke::Escape));
        assert_eq!(key_stroke("Return"), Some(KeyStroke::Return));
        assert_eq!(key_stroke("space"), Some(KeyStroke::Space));
        assert_eq!(key_stroke("ctrl"), None);
        assert_eq!(key_stroke("-"), None);
        assert_eq!(key_stroke(""), None);
    }

    #[test]
    fn test_retina_capture_maps_to_points() {
        let screen = Resolution::new(1512, 982);
        let captured = Resolution::new(3024, 1964);
        assert_eq!(to_screen(Point::new(1512, 982), captured, screen), Point::new(756, 491));
        assert_eq!(to_screen(Point::new(3023, 1), captured, screen), Point::new(1512, 1));
    }

    #[test]
    fn test_same_density_capture_is_unchanged() {
        let screen = Resolution::new(1920, 1080);
        assert_eq!(to_screen(Point::new(960, 540), screen, screen), Point::new(960, 540));
        assert_eq!(
            to_screen(Point::new(5, 5), Resolution::new(0, 0), screen),
            Point::new(5, 5)
        );
    }

    #[test]
    fn test_drag_path_ends_on_target() {
        let path = drag_path(Point::new(100, 800), Point::new(100, 400), 4);
        assert_eq!(
            path,
            vec![
                Point::new(100, 700),
                Point::new(100, 600),
                Point::new(100, 500),
                Point::new(100, 400),
            ]
        );
        assert_eq!(
            drag_path(Point::new(0, 0), Point::new(9, 9), 0),
            vec![Point::new(9, 9)]
        );
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    #[test]
    fn test_unsupported_platform_is_reported() {
        let err = DesktopBackend::new().err().unwrap();
        assert!(matches!(err, crate::actuator::ActuationError::Command { .. }));
    }
}
