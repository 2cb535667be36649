use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{DynamicImage, GrayImage, RgbImage};
use imageproc::template_matching::{MatchTemplateMethod, match_template};

/// Buttons located by picture instead of by fixed coordinate, since their position moves
/// with the profile layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageTarget {
    Invite,
    Back,
    Exit,
}

impl ImageTarget {
    pub const ALL: [ImageTarget; 3] = [ImageTarget::Invite, ImageTarget::Back, ImageTarget::Exit];

    pub fn file_name(self) -> &'static str {
        match self {
            ImageTarget::Invite => "invite.png",
            ImageTarget::Back => "back.png",
            ImageTarget::Exit => "exit.png",
        }
    }
}

impl fmt::Display for ImageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// A located template: center point in screenshot pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateMatch {
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

/// Reference image split into R, G and B planes for color-aware matching.
pub struct PreparedRef {
    pub channels: [GrayImage; 3],
    pub width: u32,
    pub height: u32,
}

impl PreparedRef {
    pub fn new(image: &DynamicImage) -> Self {
        let rgb = image.to_rgb8();
        Self {
            width: rgb.width(),
            height: rgb.height(),
            channels: split_channels(&rgb),
        }
    }
}

/// Split an RGB image into 3 separate grayscale images (one per channel).
fn split_channels(rgb: &RgbImage) -> [GrayImage; 3] {
    let (w, h) = rgb.dimensions();
    let mut r = GrayImage::new(w, h);
    let mut g = GrayImage::new(w, h);
    let mut b = GrayImage::new(w, h);
    for (x, y, pixel) in rgb.enumerate_pixels() {
        r.put_pixel(x, y, image::Luma([pixel[0]]));
        g.put_pixel(x, y, image::Luma([pixel[1]]));
        b.put_pixel(x, y, image::Luma([pixel[2]]));
    }
    [r, g, b]
}

/// Best position of `template` in `screenshot`, scored as the minimum normalized
/// cross-correlation over the three color channels. Returns `None` when the best score is
/// below `confidence` or the template does not fit.
pub fn locate(
    screenshot: &DynamicImage,
    template: &PreparedRef,
    confidence: f32,
) -> Option<TemplateMatch> {
    let rgb = screenshot.to_rgb8();
    if template.width > rgb.width() || template.height > rgb.height() {
        tracing::warn!(
            "template {}x{} is larger than screenshot {}x{}",
            template.width,
            template.height,
            rgb.width(),
            rgb.height()
        );
        return None;
    }

    let channels = split_channels(&rgb);
    let results: Vec<_> = (0..3)
        .map(|ch| {
            match_template(
                &channels[ch],
                &template.channels[ch],
                MatchTemplateMethod::CrossCorrelationNormalized,
            )
        })
        .collect();

    let (w, h) = results[0].dimensions();
    let mut best: Option<TemplateMatch> = None;

    for y in 0..h {
        for x in 0..w {
            // Minimum across channels: all of them must agree
            let score = results
                .iter()
                .map(|r| r.get_pixel(x, y).0[0])
                .fold(f32::INFINITY, f32::min);
            if score.is_nan() {
                continue;
            }

            let dominated = best.as_ref().is_some_and(|b| score <= b.score);
            if !dominated {
                best = Some(TemplateMatch {
                    x: x + template.width / 2,
                    y: y + template.height / 2,
                    score,
                });
            }
        }
    }

    match best {
        Some(m) if m.score >= confidence => {
            tracing::debug!("template match at ({}, {}) score={:.4}", m.x, m.y, m.score);
            Some(m)
        }
        Some(m) => {
            tracing::debug!("best template score {:.4} below {confidence:.2}", m.score);
            None
        }
        None => None,
    }
}

/// Reference images keyed by target.
#[derive(Default)]
pub struct Templates {
    refs: HashMap<ImageTarget, PreparedRef>,
}

impl Templates {
    pub fn get(&self, target: ImageTarget) -> Option<&PreparedRef> {
        self.refs.get(&target)
    }

    pub fn insert(&mut self, target: ImageTarget, image: &DynamicImage) {
        self.refs.insert(target, PreparedRef::new(image));
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Fail unless every target in `required` was loaded.
    pub fn require(&self, required: &[ImageTarget]) -> Result<()> {
        let missing: Vec<String> = required
            .iter()
            .filter(|t| !self.refs.contains_key(*t))
            .map(|t| t.to_string())
            .collect();
        if !missing.is_empty() {
            anyhow::bail!("missing reference image(s): {}", missing.join(", "));
        }
        Ok(())
    }

    /// Load reference images for every [`ImageTarget`].
    ///
    /// Search order for each image:
    /// 1. `assets_dir` (from `RECRUITER_ASSETS_DIR`, if set)
    /// 2. `./assets/`
    /// 3. `../share/clan-recruiter/assets/` relative to the binary
    pub fn load(assets_dir: Option<&Path>) -> Self {
        let bin_share = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent()?.parent().map(|p| p.join("share/clan-recruiter")));

        let mut templates = Templates::default();

        for target in ImageTarget::ALL {
            let filename = target.file_name();
            let candidates: Vec<PathBuf> = [
                assets_dir.map(|d| d.join(filename)),
                Some(Path::new("assets").join(filename)),
                bin_share.as_ref().map(|d| d.join("assets").join(filename)),
            ]
            .into_iter()
            .flatten()
            .collect();

            let mut loaded = false;
            for path in &candidates {
                if !path.exists() {
                    continue;
                }
                match open_image(path) {
                    Ok(img) => {
                        tracing::info!("loaded reference image: {}", path.display());
                        templates.insert(target, &img);
                        loaded = true;
                        break;
                    }
                    Err(e) => tracing::warn!("{e:#}"),
                }
            }

            if !loaded {
                tracing::warn!("reference image {filename} not found in any search path");
            }
        }

        templates
    }
}

fn open_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).context(format!("failed to decode {}", path.display()))
}
