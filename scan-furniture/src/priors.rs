//! Per-label domain knowledge: where furniture sits above the floor and how it is drawn.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Heights above the floor, in scene units, between which a label is expected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeightRange {
    pub min: f64,
    pub max: f64,
}

impl HeightRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Whether `height` lies within the range once the floor is at `floor`.
    pub fn contains(&self, floor: f64, height: f64) -> bool {
        height >= floor + self.min && height <= floor + self.max
    }
}

/// Label aliases, height ranges and marker colors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FurniturePriors {
    /// Detector labels mapped onto the canonical label used everywhere else.
    #[serde(default = "default_aliases")]
    pub aliases: BTreeMap<String, String>,
    #[serde(default = "default_height_ranges")]
    pub height_ranges: BTreeMap<String, HeightRange>,
    /// Used for labels missing from `height_ranges`.
    #[serde(default = "default_height_range")]
    pub default_height_range: HeightRange,
    /// RGB in `0..=1`.
    #[serde(default = "default_palette")]
    pub palette: BTreeMap<String, [f64; 3]>,
    #[serde(default = "default_color")]
    pub default_color: [f64; 3],
}

impl Default for FurniturePriors {
    fn default() -> Self {
        Self {
            aliases: default_aliases(),
            height_ranges: default_height_ranges(),
            default_height_range: default_height_range(),
            palette: default_palette(),
            default_color: default_color(),
        }
    }
}

impl FurniturePriors {
    pub fn canonical_label<'a>(&'a self, label: &'a str) -> &'a str {
        self.aliases.get(label).map(String::as_str).unwrap_or(label)
    }

    pub fn height_range(&self, label: &str) -> HeightRange {
        self.height_ranges
            .get(self.canonical_label(label))
            .copied()
            .unwrap_or(self.default_height_range)
    }

    pub fn color(&self, label: &str) -> [f64; 3] {
        self.palette
            .get(self.canonical_label(label))
            .copied()
            .unwrap_or(self.default_color)
    }
}

fn default_aliases() -> BTreeMap<String, String> {
    [
        ("couch", "sofa"),
        ("dining table", "table"),
        ("potted plant", "plant"),
    ]
    .into_iter()
    .map(|(from, to)| (from.to_string(), to.to_string()))
    .collect()
}

fn default_height_ranges() -> BTreeMap<String, HeightRange> {
    [
        ("chair", HeightRange::new(0.3, 1.2)),
        ("sofa", HeightRange::new(0.3, 1.0)),
        ("table", HeightRange::new(0.6, 0.9)),
        ("bed", HeightRange::new(0.3, 0.8)),
        ("tv", HeightRange::new(0.5, 2.0)),
        ("plant", HeightRange::new(0.0, 1.5)),
        ("laptop", HeightRange::new(0.7, 1.0)),
        ("refrigerator", HeightRange::new(0.5, 2.0)),
        ("vase", HeightRange::new(0.7, 1.2)),
        ("clock", HeightRange::new(1.0, 2.5)),
        ("cup", HeightRange::new(0.7, 1.0)),
        ("bottle", HeightRange::new(0.7, 1.0)),
        ("sink", HeightRange::new(0.8, 1.0)),
    ]
    .into_iter()
    .map(|(label, range)| (label.to_string(), range))
    .collect()
}

fn default_height_range() -> HeightRange {
    HeightRange::new(0.0, 2.0)
}

fn default_palette() -> BTreeMap<String, [f64; 3]> {
    [
        ("chair", [1.0, 0.2, 0.2]),
        ("sofa", [0.2, 0.8, 0.2]),
        ("table", [1.0, 0.6, 0.0]),
        ("bed", [0.3, 0.5, 0.9]),
        ("tv", [0.2, 0.2, 0.2]),
        ("plant", [0.1, 0.6, 0.1]),
        ("laptop", [0.3, 0.3, 0.3]),
        ("refrigerator", [0.8, 0.8, 0.8]),
        ("vase", [0.95, 0.5, 0.8]),
        ("clock", [0.8, 0.6, 0.2]),
    ]
    .into_iter()
    .map(|(label, color)| (label.to_string(), color))
    .collect()
}

fn default_color() -> [f64; 3] {
    [0.5, 0.5, 0.5]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve_before_lookup() {
        let priors = FurniturePriors::default();
        assert_eq!(priors.canonical_label("couch"), "sofa");
        assert_eq!(priors.canonical_label("chair"), "chair");
        assert_eq!(priors.height_range("dining table"), HeightRange::new(0.6, 0.9));
        assert_eq!(priors.color("potted plant"), [0.1, 0.6, 0.1]);
    }

    #[test]
    fn unknown_labels_get_defaults() {
        let priors = FurniturePriors::default();
        assert_eq!(priors.height_range("piano"), HeightRange::new(0.0, 2.0));
        assert_eq!(priors.color("piano"), [0.5, 0.5, 0.5]);
        assert!(priors.height_range("chair").contains(-1.0, -0.5));
        assert!(!priors.height_range("chair").contains(-1.0, 0.5));
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let priors: FurniturePriors =
            serde_json::from_str(r#"{"default_color": [1.0, 1.0, 1.0]}"#).unwrap();
        assert_eq!(priors.color("piano"), [1.0, 1.0, 1.0]);
        assert_eq!(priors.color("chair"), [1.0, 0.2, 0.2]);
    }
}
