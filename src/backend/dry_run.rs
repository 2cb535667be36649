use std::collections::VecDeque;
use std::time::Duration;

use super::InputBackend;
use crate::actuator::ActuationError;
use crate::detector::{ImageTarget, PreparedRef};
use crate::layout::{Point, Resolution};

/// Logs every action instead of performing it. The clipboard yields each configured tag
/// once, then stays empty so slots fail extraction the way a real empty row would.
/// There is no screen: every image target is reported at the screen center.
pub struct DryRunBackend {
    resolution: Resolution,
    tags: VecDeque<String>,
    cursor: Point,
}

impl DryRunBackend {
    pub fn new(resolution: Resolution, tags: Vec<String>) -> Self {
        Self {
            resolution,
            tags: tags.into(),
            cursor: Point::default(),
        }
    }
}

impl InputBackend for DryRunBackend {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    fn tap(&mut self, at: Point) -> Result<(), ActuationError> {
        tracing::info!("[dry-run] tap {at}");
        self.cursor = at;
        Ok(())
    }

    fn key(&mut self, key: &str) -> Result<(), ActuationError> {
        tracing::info!("[dry-run] key {key:?}");
        Ok(())
    }

    fn swipe(&mut self, from: Point, to: Point, duration: Duration) -> Result<(), ActuationError> {
        tracing::info!("[dry-run] swipe {from} -> {to} over {duration:?}");
        self.cursor = to;
        Ok(())
    }

    fn move_to(&mut self, at: Point) -> Result<(), ActuationError> {
        self.cursor = at;
        Ok(())
    }

    fn cursor(&mut self) -> Result<Point, ActuationError> {
        Ok(self.cursor)
    }

    fn screen_size(&mut self) -> Result<Resolution, ActuationError> {
        Ok(self.resolution)
    }

    fn clipboard(&mut self) -> Result<String, ActuationError> {
        Ok(self.tags.pop_front().unwrap_or_default())
    }

    fn locate(
        &mut self,
        target: ImageTarget,
        _template: Option<&PreparedRef>,
        _confidence: f32,
    ) -> Result<Option<Point>, ActuationError> {
        let center = Point::new(
            (self.resolution.width / 2) as i32,
            (self.resolution.height / 2) as i32,
        );
        tracing::info!("[dry-run] pretend {target} is at {center}");
        Ok(Some(center))
    }
}
