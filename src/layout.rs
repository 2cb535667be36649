//! Screen coordinates for the in-game recruiting UI.
//!
//! A [`Presets`] table maps exact display resolutions to hand-measured layouts. When the
//! current display has no preset, the canonical 1920x1080 layout is scaled linearly. Scaling
//! keeps every point on screen but may drift on aspect ratios nobody has measured.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of candidate rows visible on one page of search results.
pub const SLOT_COUNT: usize = 5;

pub const CANONICAL: Resolution = Resolution {
    width: 1920,
    height: 1080,
};

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("invalid resolution {0:?}, expected WIDTHxHEIGHT")]
    BadResolution(String),

    #[error("failed to read layout file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse layout file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },

    #[error("preset {resolution} is missing element {element}")]
    MissingElement {
        resolution: Resolution,
        element: Element,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || LayoutError::BadResolution(s.to_string());
        let (w, h) = s.trim().split_once(|c: char| c == 'x' || c == 'X').ok_or_else(bad)?;
        let width = w.trim().parse::<u32>().map_err(|_| bad())?;
        let height = h.trim().parse::<u32>().map_err(|_| bad())?;
        if width == 0 || height == 0 {
            return Err(bad());
        }
        Ok(Self { width, height })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    fn scaled(self, sx: f64, sy: f64) -> Self {
        Self {
            x: (self.x as f64 * sx).round() as i32,
            y: (self.y as f64 * sy).round() as i32,
        }
    }

    fn within(self, resolution: Resolution) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.x as i64 <= resolution.width as i64
            && self.y as i64 <= resolution.height as i64
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Named UI elements the recruiting flow clicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Element {
    GameArea,
    MyClan,
    FindNewMembers,
    FilterWars,
    FilterLeague,
    FilterTrophy,
    SearchSuggested,
    PlayerArea,
    PlayerCode,
    Copy,
}

impl Element {
    pub const ALL: [Element; 10] = [
        Element::GameArea,
        Element::MyClan,
        Element::FindNewMembers,
        Element::FilterWars,
        Element::FilterLeague,
        Element::FilterTrophy,
        Element::SearchSuggested,
        Element::PlayerArea,
        Element::PlayerCode,
        Element::Copy,
    ];
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Element::GameArea => "game_area",
            Element::MyClan => "my_clan",
            Element::FindNewMembers => "find_new_members",
            Element::FilterWars => "filter_wars",
            Element::FilterLeague => "filter_league",
            Element::FilterTrophy => "filter_trophy",
            Element::SearchSuggested => "search_suggested",
            Element::PlayerArea => "player_area",
            Element::PlayerCode => "player_code",
            Element::Copy => "copy",
        };
        f.pad(name)
    }
}

/// Coordinates for every [`Element`] plus the five candidate slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub elements: BTreeMap<Element, Point>,
    pub slots: [Point; SLOT_COUNT],
}

impl Layout {
    pub fn get(&self, element: Element) -> Option<Point> {
        self.elements.get(&element).copied()
    }

    /// Slot coordinate for a 1-based slot index.
    pub fn slot(&self, index: usize) -> Option<Point> {
        index.checked_sub(1).and_then(|i| self.slots.get(i)).copied()
    }

    /// The bottom-most candidate row, used as the drag origin when scrolling.
    pub fn last_slot(&self) -> Point {
        self.slots[SLOT_COUNT - 1]
    }

    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        self.elements.values().copied().chain(self.slots.iter().copied())
    }

    fn scaled(&self, from: Resolution, to: Resolution) -> Self {
        let sx = to.width as f64 / from.width as f64;
        let sy = to.height as f64 / from.height as f64;
        Self {
            elements: self
                .elements
                .iter()
                .map(|(&element, &p)| (element, p.scaled(sx, sy)))
                .collect(),
            slots: self.slots.map(|p| p.scaled(sx, sy)),
        }
    }

    fn missing_element(&self) -> Option<Element> {
        Element::ALL
            .into_iter()
            .find(|element| !self.elements.contains_key(element))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutSource {
    Exact,
    Scaled,
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub resolution: Resolution,
    pub layout: Layout,
    pub source: LayoutSource,
}

#[derive(Debug, Deserialize)]
struct PresetEntry {
    resolution: Resolution,
    #[serde(flatten)]
    layout: Layout,
}

/// Resolution-keyed layout table, seeded with the canonical preset.
#[derive(Debug, Clone)]
pub struct Presets {
    table: BTreeMap<Resolution, Layout>,
}

impl Presets {
    pub fn builtin() -> Self {
        let mut table = BTreeMap::new();
        table.insert(CANONICAL, canonical_layout());
        // MacBook built-in display, in points
        table.insert(
            Resolution::new(1512, 982),
            layout_from(
                [
                    (Element::GameArea, (1080, 32)),
                    (Element::MyClan, (636, 60)),
                    (Element::FindNewMembers, (405, 666)),
                    (Element::FilterWars, (311, 271)),
                    (Element::FilterLeague, (630, 269)),
                    (Element::FilterTrophy, (981, 273)),
                    (Element::SearchSuggested, (1215, 387)),
                    (Element::PlayerArea, (199, 456)),
                    (Element::PlayerCode, (594, 260)),
                    (Element::Copy, (743, 273)),
                ],
                [(198, 477), (197, 578), (199, 696), (196, 814), (197, 911)],
            ),
        );
        Self { table }
    }

    /// Read extra presets from a JSON array of `{ "resolution": {..}, "elements": {..}, "slots": [..] }`.
    pub fn load_file(path: &Path) -> Result<Vec<(Resolution, Layout)>, LayoutError> {
        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|source| LayoutError::Read {
            path: display.clone(),
            source,
        })?;
        let entries: Vec<PresetEntry> =
            serde_json::from_str(&contents).map_err(|source| LayoutError::Parse {
                path: display,
                source,
            })?;

        entries
            .into_iter()
            .map(|entry| match entry.layout.missing_element() {
                Some(element) => Err(LayoutError::MissingElement {
                    resolution: entry.resolution,
                    element,
                }),
                None => Ok((entry.resolution, entry.layout)),
            })
            .collect()
    }

    /// Add or replace presets. The canonical preset may be overridden too.
    pub fn merge(&mut self, extra: impl IntoIterator<Item = (Resolution, Layout)>) {
        for (resolution, layout) in extra {
            tracing::info!("registered layout preset {resolution}");
            self.table.insert(resolution, layout);
        }
    }

    pub fn resolutions(&self) -> Vec<Resolution> {
        self.table.keys().copied().collect()
    }

    pub fn get(&self, resolution: Resolution) -> Option<&Layout> {
        self.table.get(&resolution)
    }

    /// Pick the exact preset for `resolution`, or scale the canonical one.
    pub fn resolve(&self, resolution: Resolution) -> Resolved {
        if let Some(layout) = self.table.get(&resolution) {
            tracing::info!("using layout preset for {resolution}");
            return Resolved {
                resolution,
                layout: layout.clone(),
                source: LayoutSource::Exact,
            };
        }

        tracing::warn!("no layout preset for {resolution}, scaling from {CANONICAL}");
        let layout = match self.table.get(&CANONICAL) {
            Some(canonical) => canonical.scaled(CANONICAL, resolution),
            None => canonical_layout().scaled(CANONICAL, resolution),
        };
        Resolved {
            resolution,
            layout,
            source: LayoutSource::Scaled,
        }
    }
}

fn canonical_layout() -> Layout {
    layout_from(
        [
            (Element::GameArea, (1373, 35)),
            (Element::MyClan, (809, 66)),
            (Element::FindNewMembers, (516, 733)),
            (Element::FilterWars, (396, 298)),
            (Element::FilterLeague, (802, 296)),
            (Element::FilterTrophy, (1249, 301)),
            (Element::SearchSuggested, (1548, 426)),
            (Element::PlayerArea, (253, 501)),
            (Element::PlayerCode, (757, 286)),
            (Element::Copy, (946, 300)),
        ],
        [(252, 525), (251, 637), (253, 768), (249, 897), (250, 1002)],
    )
}

/// True when every coordinate of `layout` lies on a `resolution`-sized screen.
pub fn validate(layout: &Layout, resolution: Resolution) -> bool {
    layout.points().all(|p| p.within(resolution))
}

fn layout_from(
    elements: [(Element, (i32, i32)); 10],
    slots: [(i32, i32); SLOT_COUNT],
) -> Layout {
    Layout {
        elements: elements
            .into_iter()
            .map(|(element, (x, y))| (element, Point::new(x, y)))
            .collect(),
        slots: slots.map(|(x, y)| Point::new(x, y)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_presets_are_complete() {
        let presets = Presets::builtin();
        for resolution in presets.resolutions() {
            let layout = presets.get(resolution).unwrap();
            assert_eq!(layout.missing_element(), None, "{resolution} incomplete");
            assert!(validate(layout, resolution), "{resolution} has off-screen points");
        }
    }

    #[test]
    fn test_exact_preset_returned_verbatim() {
        let presets = Presets::builtin();
        for resolution in presets.resolutions() {
            let resolved = presets.resolve(resolution);
            assert_eq!(resolved.source, LayoutSource::Exact);
            assert_eq!(&resolved.layout, presets.get(resolution).unwrap());
        }
    }

    #[test]
    fn test_scaled_layout_uses_rounding() {
        let presets = Presets::builtin();
        let resolved = presets.resolve(Resolution::new(1280, 720));
        assert_eq!(resolved.source, LayoutSource::Scaled);
        // 1373 * 1280 / 1920 = 915.33, 35 * 720 / 1080 = 23.33
        assert_eq!(resolved.layout.get(Element::GameArea), Some(Point::new(915, 23)));
        // 250 * 2/3 = 166.67, 1002 * 2/3 = 668
        assert_eq!(resolved.layout.last_slot(), Point::new(167, 668));
    }

    #[test]
    fn test_empty_table_scales_builtin_canonical() {
        let presets = Presets {
            table: BTreeMap::new(),
        };
        let resolved = presets.resolve(Resolution::new(1280, 720));
        assert_eq!(resolved.source, LayoutSource::Scaled);
        assert_eq!(resolved.layout.get(Element::GameArea), Some(Point::new(915, 23)));
        assert_eq!(resolved.layout.last_slot(), Point::new(167, 668));
    }

    #[test]
    fn test_scaled_layout_stays_within_bounds() {
        let presets = Presets::builtin();
        for (w, h) in [
            (800, 600),
            (1024, 768),
            (1366, 768),
            (2560, 1440),
            (3840, 2160),
            (1080, 1920),
            (1, 1),
            (7, 3001),
        ] {
            let resolution = Resolution::new(w, h);
            let resolved = presets.resolve(resolution);
            assert!(validate(&resolved.layout, resolution), "{resolution} out of bounds");
        }
    }

    #[test]
    fn test_validate_rejects_out_of_bounds() {
        let presets = Presets::builtin();
        let layout = presets.get(CANONICAL).unwrap();
        assert!(!validate(layout, Resolution::new(1000, 1000)));

        let mut negative = layout.clone();
        negative.slots[0] = Point::new(-1, 10);
        assert!(!validate(&negative, CANONICAL));
    }

    #[test]
    fn test_slot_lookup_is_one_based() {
        let layout = Presets::builtin().resolve(CANONICAL).layout;
        assert_eq!(layout.slot(1), Some(Point::new(252, 525)));
        assert_eq!(layout.slot(5), Some(layout.last_slot()));
        assert_eq!(layout.slot(0), None);
        assert_eq!(layout.slot(6), None);
    }

    #[test]
    fn test_parse_resolution() {
        assert_eq!("1920x1080".parse::<Resolution>().unwrap(), CANONICAL);
        assert_eq!(" 2560X1440 ".parse::<Resolution>().unwrap(), Resolution::new(2560, 1440));
        assert!("1920".parse::<Resolution>().is_err());
        assert!("0x1080".parse::<Resolution>().is_err());
        assert!("ax b".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_load_file_and_merge() {
        let canonical = Presets::builtin().get(CANONICAL).unwrap().clone();
        let entry = serde_json::json!([{
            "resolution": { "width": 2560, "height": 1600 },
            "elements": canonical.elements,
            "slots": canonical.slots,
        }]);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{entry}").unwrap();

        let extra = Presets::load_file(file.path()).unwrap();
        assert_eq!(extra.len(), 1);

        let mut presets = Presets::builtin();
        presets.merge(extra);
        let resolved = presets.resolve(Resolution::new(2560, 1600));
        assert_eq!(resolved.source, LayoutSource::Exact);
        assert_eq!(resolved.layout, canonical);
    }

    #[test]
    fn test_load_file_rejects_incomplete_preset() {
        let entry = serde_json::json!([{
            "resolution": { "width": 800, "height": 600 },
            "elements": { "game_area": { "x": 1, "y": 2 } },
            "slots": [{ "x": 1, "y": 1 }, { "x": 1, "y": 2 }, { "x": 1, "y": 3 },
                      { "x": 1, "y": 4 }, { "x": 1, "y": 5 }],
        }]);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{entry}").unwrap();

        let err = Presets::load_file(file.path()).unwrap_err();
        assert!(matches!(err, LayoutError::MissingElement { element: Element::MyClan, .. }));
    }

    #[test]
    fn test_load_file_missing() {
        let err = Presets::load_file(Path::new("/nonexistent/recruiter-layout.json")).unwrap_err();
        assert!(matches!(err, LayoutError::Read { .. }));
    }
}
