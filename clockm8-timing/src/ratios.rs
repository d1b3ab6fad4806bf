//! Ratio catalog - the quantized set of multiply/divide ratios
//!
//! Ratios are grouped in four categories that can be toggled independently:
//! - Binary: powers of two
//! - Ternary: multiples of three
//! - Dotted: dotted variants of the enabled binary/ternary/odd values
//! - Odd: odd (and a few irregular) integers
//!
//! The unity ratio is always present, so resolving a control value never fails.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound for either side of the catalog with every category enabled
const MAX_ENTRIES: usize = 40;

/// Powers of two, shared by multipliers and dividers
const BINARY_VALUES: [f32; 9] = [1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0, 128.0, 256.0];
/// Multiples of three, shared by multipliers and dividers
const TERNARY_VALUES: [f32; 7] = [3.0, 6.0, 12.0, 24.0, 48.0, 96.0, 192.0];
const ODD_VALUES: [f32; 8] = [5.0, 7.0, 9.0, 10.0, 11.0, 13.0, 14.0, 15.0];

const DOTTED_BINARY_MULTIPLIERS: [f32; 1] = [1.0 / (3.0 / 4.0)];
const DOTTED_TERNARY_MULTIPLIERS: [f32; 2] = [1.5, 2.0];
const DOTTED_ODD_MULTIPLIERS: [f32; 1] = [2.5];
const DOTTED_BINARY_DIVIDERS: [f32; 8] = [1.5, 3.0, 6.0, 12.0, 24.0, 48.0, 96.0, 192.0];
const DOTTED_TERNARY_DIVIDERS: [f32; 1] = [2.5];

/// Full scale of the ratio control value (both polarities)
pub const CONTROL_RANGE: f32 = 10.0;

/// Category toggles used to build the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatioCategories {
    pub binary: bool,
    pub ternary: bool,
    pub dotted: bool,
    pub odd: bool,
}

impl Default for RatioCategories {
    fn default() -> Self {
        Self {
            binary: true,
            ternary: true,
            dotted: true,
            odd: true,
        }
    }
}

impl RatioCategories {
    /// Only the unity ratio
    pub const NONE: Self = Self {
        binary: false,
        ternary: false,
        dotted: false,
        odd: false,
    };
}

/// Human-readable ratio, e.g. "x3", "/1.5", "x1"
///
/// Stored as the raw catalog value so it can be copied through expander
/// messages without allocating; the text is produced by `Display`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum RatioLabel {
    #[default]
    Unity,
    Multiply(f32),
    Divide(f32),
}

impl RatioLabel {
    /// Raw catalog value shown after the sign
    pub fn value(&self) -> f32 {
        match self {
            RatioLabel::Unity => 1.0,
            RatioLabel::Multiply(v) | RatioLabel::Divide(v) => *v,
        }
    }
}

impl fmt::Display for RatioLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (sign, value) = match self {
            RatioLabel::Unity => return f.write_str("x1"),
            RatioLabel::Multiply(v) => ('x', *v),
            RatioLabel::Divide(v) => ('/', *v),
        };

        if value.fract() == 0.0 {
            write!(f, "{}{}", sign, value as u32)
        } else {
            // Two decimals, truncated; f32 Display trims trailing zeros
            let truncated = (value * 100.0).trunc() / 100.0;
            write!(f, "{}{}", sign, truncated)
        }
    }
}

/// Sorted, deduplicated multipliers and dividers
#[derive(Debug, Clone)]
pub struct RatioCatalog {
    categories: RatioCategories,
    multipliers: Vec<f32>,
    dividers: Vec<f32>,
}

impl Default for RatioCatalog {
    fn default() -> Self {
        Self::new(RatioCategories::default())
    }
}

impl RatioCatalog {
    /// Create a catalog for the given categories
    pub fn new(categories: RatioCategories) -> Self {
        let mut catalog = Self {
            categories,
            multipliers: Vec::with_capacity(MAX_ENTRIES),
            dividers: Vec::with_capacity(MAX_ENTRIES),
        };
        catalog.rebuild(categories);
        catalog
    }

    /// Categories the catalog was last built from
    pub fn categories(&self) -> RatioCategories {
        self.categories
    }

    /// Ascending multipliers (always contains 1.0)
    pub fn multipliers(&self) -> &[f32] {
        &self.multipliers
    }

    /// Ascending dividers (always contains 1.0)
    pub fn dividers(&self) -> &[f32] {
        &self.dividers
    }

    /// Rebuild only if the categories changed. Returns true on rebuild.
    pub fn set_categories(&mut self, categories: RatioCategories) -> bool {
        if categories == self.categories {
            return false;
        }
        self.rebuild(categories);
        true
    }

    /// Reassemble both tables from the base values of each enabled category
    ///
    /// Storage is reserved up front, so rebuilding on the audio thread does
    /// not allocate.
    pub fn rebuild(&mut self, categories: RatioCategories) {
        self.categories = categories;
        self.multipliers.clear();
        self.dividers.clear();

        if categories.binary {
            self.multipliers.extend_from_slice(&BINARY_VALUES);
            self.dividers.extend_from_slice(&BINARY_VALUES);
        }
        if categories.ternary {
            self.multipliers.extend_from_slice(&TERNARY_VALUES);
            self.dividers.extend_from_slice(&TERNARY_VALUES);
        }
        if categories.dotted && categories.binary {
            self.multipliers.extend_from_slice(&DOTTED_BINARY_MULTIPLIERS);
            self.dividers.extend_from_slice(&DOTTED_BINARY_DIVIDERS);
        }
        if categories.dotted && categories.ternary {
            self.multipliers.extend_from_slice(&DOTTED_TERNARY_MULTIPLIERS);
            self.dividers.extend_from_slice(&DOTTED_TERNARY_DIVIDERS);
        }
        if categories.dotted && categories.odd {
            self.multipliers.extend_from_slice(&DOTTED_ODD_MULTIPLIERS);
        }
        if categories.odd {
            self.multipliers.extend_from_slice(&ODD_VALUES);
            self.dividers.extend_from_slice(&ODD_VALUES);
        }

        self.multipliers.push(1.0);
        self.dividers.push(1.0);

        for table in [&mut self.multipliers, &mut self.dividers] {
            table.sort_by(f32::total_cmp);
            table.dedup();
        }

        tracing::debug!(
            ?categories,
            multipliers = self.multipliers.len(),
            dividers = self.dividers.len(),
            "ratio catalog rebuilt"
        );
    }

    /// Map a control value (-10..10) to a ratio and its label
    ///
    /// Positive values select a multiplier, negative values a divider
    /// (returned as its reciprocal). The magnitude spreads linearly over
    /// the selected table.
    pub fn resolve(&self, offset: f32) -> (f32, RatioLabel) {
        let offset = if offset.is_nan() {
            0.0
        } else {
            offset.clamp(-CONTROL_RANGE, CONTROL_RANGE)
        };
        let multiply = offset >= 0.0;
        let table = if multiply {
            &self.multipliers
        } else {
            &self.dividers
        };

        let raw = table
            .get(Self::index_for(offset.abs(), table.len()))
            .copied()
            .unwrap_or(1.0);

        let label = if raw == 1.0 {
            RatioLabel::Unity
        } else if multiply {
            RatioLabel::Multiply(raw)
        } else {
            RatioLabel::Divide(raw)
        };
        let ratio = if multiply { raw } else { 1.0 / raw };

        (ratio, label)
    }

    #[inline]
    fn index_for(magnitude: f32, size: usize) -> usize {
        if magnitude <= 0.0 || size == 0 {
            return 0;
        }
        let position = ((magnitude / CONTROL_RANGE) * size as f32).ceil() as usize;
        position.saturating_sub(1).min(size - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unity_always_present() {
        let catalog = RatioCatalog::new(RatioCategories::NONE);
        assert_eq!(catalog.multipliers(), &[1.0]);
        assert_eq!(catalog.dividers(), &[1.0]);
        assert_eq!(catalog.resolve(10.0), (1.0, RatioLabel::Unity));
        assert_eq!(catalog.resolve(-10.0), (1.0, RatioLabel::Unity));
    }

    #[test]
    fn test_tables_sorted_and_unique() {
        let catalog = RatioCatalog::default();
        for table in [catalog.multipliers(), catalog.dividers()] {
            assert!(table.windows(2).all(|w| w[0] < w[1]), "{:?}", table);
        }
    }

    #[test]
    fn test_binary_only() {
        let catalog = RatioCatalog::new(RatioCategories {
            binary: true,
            ..RatioCategories::NONE
        });
        assert_eq!(catalog.multipliers(), &BINARY_VALUES);
        assert_eq!(catalog.dividers(), &BINARY_VALUES);
    }

    #[test]
    fn test_dotted_requires_base_category() {
        let dotted_only = RatioCatalog::new(RatioCategories {
            dotted: true,
            ..RatioCategories::NONE
        });
        assert_eq!(dotted_only.multipliers(), &[1.0]);

        let dotted_binary = RatioCatalog::new(RatioCategories {
            binary: true,
            dotted: true,
            ..RatioCategories::NONE
        });
        assert!(dotted_binary.multipliers().contains(&(4.0 / 3.0)));
        assert!(dotted_binary.dividers().contains(&1.5));
        assert!(dotted_binary.dividers().contains(&192.0));
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let mut catalog = RatioCatalog::default();
        let multipliers = catalog.multipliers().to_vec();
        let dividers = catalog.dividers().to_vec();

        catalog.rebuild(RatioCategories::default());
        assert_eq!(catalog.multipliers(), multipliers.as_slice());
        assert_eq!(catalog.dividers(), dividers.as_slice());

        // Toggle a category off and back on
        assert!(catalog.set_categories(RatioCategories {
            ternary: false,
            ..RatioCategories::default()
        }));
        assert_ne!(catalog.multipliers(), multipliers.as_slice());
        assert!(catalog.set_categories(RatioCategories::default()));
        assert_eq!(catalog.multipliers(), multipliers.as_slice());
        assert_eq!(catalog.dividers(), dividers.as_slice());

        assert!(!catalog.set_categories(RatioCategories::default()));
    }

    #[test]
    fn test_resolve_index() {
        let catalog = RatioCatalog::new(RatioCategories {
            binary: true,
            ..RatioCategories::NONE
        });
        // 9 entries: 1, 2, 4 ... 256
        assert_eq!(catalog.resolve(0.0), (1.0, RatioLabel::Unity));
        assert_eq!(catalog.resolve(10.0), (256.0, RatioLabel::Multiply(256.0)));
        // ceil(0.15 * 9) - 1 = 1
        assert_eq!(catalog.resolve(1.5), (2.0, RatioLabel::Multiply(2.0)));
        assert_eq!(catalog.resolve(-1.5), (0.5, RatioLabel::Divide(2.0)));
        // Out-of-range control values clamp
        assert_eq!(catalog.resolve(42.0).0, 256.0);
        assert_eq!(catalog.resolve(f32::NAN).0, 1.0);
    }

    #[test]
    fn test_label_text() {
        assert_eq!(RatioLabel::Unity.to_string(), "x1");
        assert_eq!(RatioLabel::Multiply(3.0).to_string(), "x3");
        assert_eq!(RatioLabel::Divide(1.5).to_string(), "/1.5");
        assert_eq!(RatioLabel::Multiply(4.0 / 3.0).to_string(), "x1.33");
        assert_eq!(RatioLabel::Divide(192.0).to_string(), "/192");
    }
}
