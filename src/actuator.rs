//! Screen actions the invitation loop performs.
//!
//! [`UiActuator`] is what the orchestrator talks to. [`ScreenActuator`] implements it on top
//! of a raw [`InputBackend`], translating element names into coordinates from the resolved
//! layout and image targets into detector matches.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::backend::InputBackend;
use crate::detector::{ImageTarget, Templates};
use crate::layout::{Element, Layout, Point, Resolution};

#[derive(Debug, Error)]
pub enum ActuationError {
    #[error("layout has no coordinate for {0}")]
    MissingElement(Element),

    #[error("no candidate slot {0}")]
    UnknownSlot(usize),

    #[error("no reference image loaded for {0}")]
    MissingTemplate(ImageTarget),

    #[error("{target} not found on screen (confidence {confidence:.2})")]
    NotFound { target: ImageTarget, confidence: f32 },

    #[error("`{command}` failed: {reason}")]
    Command { command: String, reason: String },

    #[error("screen capture failed: {0}")]
    Capture(String),

    #[error("clipboard held {0:?}, not a player tag")]
    EmptyClipboard(String),
}

#[derive(Debug, Clone, Copy)]
pub struct LocateOptions {
    pub confidence: f32,
    /// Keep polling until the image appears or this much time has passed.
    pub timeout: Option<Duration>,
    pub poll_interval: Duration,
}

impl Default for LocateOptions {
    fn default() -> Self {
        Self {
            confidence: 0.8,
            timeout: None,
            poll_interval: Duration::from_millis(500),
        }
    }
}

pub trait UiActuator {
    fn layout(&self) -> &Layout;
    fn click(&mut self, element: Element) -> Result<(), ActuationError>;
    /// Click a candidate row, 1-based.
    fn click_slot(&mut self, slot: usize) -> Result<(), ActuationError>;
    fn press_key(&mut self, key: &str) -> Result<(), ActuationError>;
    /// Locate `target` on screen and click its center.
    fn click_image(
        &mut self,
        target: ImageTarget,
        options: &LocateOptions,
    ) -> Result<Point, ActuationError>;
    fn read_clipboard(&mut self) -> Result<String, ActuationError>;
    fn move_to(&mut self, at: Point) -> Result<(), ActuationError>;
    fn position(&mut self) -> Result<Point, ActuationError>;
    fn screen_size(&mut self) -> Result<Resolution, ActuationError>;
    /// Drag from the current pointer position to `to`.
    fn drag_to(&mut self, to: Point, duration: Duration) -> Result<(), ActuationError>;
}

pub struct ScreenActuator<B> {
    backend: B,
    layout: Layout,
    templates: Templates,
}

impl<B: InputBackend> ScreenActuator<B> {
    pub fn new(backend: B, layout: Layout, templates: Templates) -> Self {
        Self {
            backend,
            layout,
            templates,
        }
    }

    fn tap(&mut self, at: Point) -> Result<(), ActuationError> {
        self.backend.tap(at)?;
        self.backend.move_to(at)
    }
}

impl<B: InputBackend> UiActuator for ScreenActuator<B> {
    fn layout(&self) -> &Layout {
        &self.layout
    }

    fn click(&mut self, element: Element) -> Result<(), ActuationError> {
        let at = self
            .layout
            .get(element)
            .ok_or(ActuationError::MissingElement(element))?;
        tracing::debug!("click {element} at {at}");
        self.tap(at)
    }

    fn click_slot(&mut self, slot: usize) -> Result<(), ActuationError> {
        let at = self
            .layout
            .slot(slot)
            .ok_or(ActuationError::UnknownSlot(slot))?;
        tracing::debug!("click slot {slot} at {at}");
        self.tap(at)
    }

    fn press_key(&mut self, key: &str) -> Result<(), ActuationError> {
        tracing::debug!("press {key:?}");
        self.backend.key(key)
    }

    fn click_image(
        &mut self,
        target: ImageTarget,
        options: &LocateOptions,
    ) -> Result<Point, ActuationError> {
        let started = Instant::now();
        loop {
            let found = self.backend.locate(
                target,
                self.templates.get(target),
                options.confidence,
            )?;
            if let Some(at) = found {
                tracing::debug!("click {target} at {at}");
                self.tap(at)?;
                return Ok(at);
            }

            let waited = started.elapsed();
            match options.timeout {
                Some(timeout) if waited < timeout => {
                    std::thread::sleep(options.poll_interval.min(timeout - waited));
                }
                _ => {
                    return Err(ActuationError::NotFound {
                        target,
                        confidence: options.confidence,
                    });
                }
            }
        }
    }

    fn read_clipboard(&mut self) -> Result<String, ActuationError> {
        self.backend.clipboard()
    }

    fn move_to(&mut self, at: Point) -> Result<(), ActuationError> {
        self.backend.move_to(at)
    }

    fn position(&mut self) -> Result<Point, ActuationError> {
        self.backend.cursor()
    }

    fn screen_size(&mut self) -> Result<Resolution, ActuationError> {
        self.backend.screen_size()
    }

    fn drag_to(&mut self, to: Point, duration: Duration) -> Result<(), ActuationError> {
        let from = self.backend.cursor()?;
        tracing::debug!("drag {from} -> {to} over {duration:?}");
        self.backend.swipe(from, to, duration)?;
        self.backend.move_to(to)
    }
}
