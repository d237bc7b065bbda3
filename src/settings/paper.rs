//! Paper geometry: standardized or custom sizes, orientation and margins.

use crate::error::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

static DIMENSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+(?:\.\d+)?|\.\d+)\s*(px|pt|in|cm|mm)\s*$").expect("valid regex")
});

/// CSS length unit accepted for paper sizes and margins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Unit {
    Px,
    Pt,
    In,
    Cm,
    Mm,
}

impl Unit {
    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Px => "px",
            Unit::Pt => "pt",
            Unit::In => "in",
            Unit::Cm => "cm",
            Unit::Mm => "mm",
        }
    }

    /// Size of one unit in CSS inches.
    fn per_inch(self) -> f64 {
        match self {
            Unit::Px => 1.0 / 96.0,
            Unit::Pt => 1.0 / 72.0,
            Unit::In => 1.0,
            Unit::Cm => 1.0 / 2.54,
            Unit::Mm => 1.0 / 25.4,
        }
    }
}

/// A non-negative length with an explicit unit, e.g. `1.5cm`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Dimension {
    pub value: f64,
    pub unit: Unit,
}

impl Dimension {
    pub const fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    /// Parse `value` as the setting `key`. A unit is mandatory.
    pub fn parse(key: &str, value: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidDimension {
            key: key.to_string(),
            value: value.to_string(),
        };
        let caps = DIMENSION_RE.captures(value).ok_or_else(invalid)?;
        let number: f64 = caps[1].parse().map_err(|_| invalid())?;
        let unit = match &caps[2] {
            "px" => Unit::Px,
            "pt" => Unit::Pt,
            "in" => Unit::In,
            "cm" => Unit::Cm,
            "mm" => Unit::Mm,
            _ => return Err(invalid()),
        };
        Ok(Self::new(number, unit))
    }

    pub fn to_inches(self) -> f64 {
        self.value * self.unit.per_inch()
    }

    /// Length in CSS pixels (96 per inch), rounded.
    pub fn to_pixels(self) -> u32 {
        (self.to_inches() * 96.0).round().max(0.0) as u32
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.as_str())
    }
}

/// Named paper sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StandardizedFormat {
    A0,
    A1,
    A2,
    A3,
    A4,
    A5,
    A6,
    Letter,
    Legal,
    Tabloid,
    Ledger,
}

impl StandardizedFormat {
    pub const NAMES: &'static str = "A0, A1, A2, A3, A4, A5, A6, Letter, Legal, Tabloid, Ledger";

    pub fn as_str(self) -> &'static str {
        match self {
            StandardizedFormat::A0 => "A0",
            StandardizedFormat::A1 => "A1",
            StandardizedFormat::A2 => "A2",
            StandardizedFormat::A3 => "A3",
            StandardizedFormat::A4 => "A4",
            StandardizedFormat::A5 => "A5",
            StandardizedFormat::A6 => "A6",
            StandardizedFormat::Letter => "Letter",
            StandardizedFormat::Legal => "Legal",
            StandardizedFormat::Tabloid => "Tabloid",
            StandardizedFormat::Ledger => "Ledger",
        }
    }

    /// Portrait width and height.
    pub fn size(self) -> (Dimension, Dimension) {
        let mm = |w, h| (Dimension::new(w, Unit::Mm), Dimension::new(h, Unit::Mm));
        let inch = |w, h| (Dimension::new(w, Unit::In), Dimension::new(h, Unit::In));
        match self {
            StandardizedFormat::A0 => mm(841.0, 1189.0),
            StandardizedFormat::A1 => mm(594.0, 841.0),
            StandardizedFormat::A2 => mm(420.0, 594.0),
            StandardizedFormat::A3 => mm(297.0, 420.0),
            StandardizedFormat::A4 => mm(210.0, 297.0),
            StandardizedFormat::A5 => mm(148.0, 210.0),
            StandardizedFormat::A6 => mm(105.0, 148.0),
            StandardizedFormat::Letter => inch(8.5, 11.0),
            StandardizedFormat::Legal => inch(8.5, 14.0),
            StandardizedFormat::Tabloid => inch(11.0, 17.0),
            // Ledger is Tabloid turned sideways.
            StandardizedFormat::Ledger => inch(17.0, 11.0),
        }
    }
}

impl FromStr for StandardizedFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "A0" => StandardizedFormat::A0,
            "A1" => StandardizedFormat::A1,
            "A2" => StandardizedFormat::A2,
            "A3" => StandardizedFormat::A3,
            "A4" => StandardizedFormat::A4,
            "A5" => StandardizedFormat::A5,
            "A6" => StandardizedFormat::A6,
            "Letter" => StandardizedFormat::Letter,
            "Legal" => StandardizedFormat::Legal,
            "Tabloid" => StandardizedFormat::Tabloid,
            "Ledger" => StandardizedFormat::Ledger,
            _ => return Err(()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl FromStr for Orientation {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Portrait" => Ok(Orientation::Portrait),
            "Landscape" => Ok(Orientation::Landscape),
            _ => Err(()),
        }
    }
}

/// Either a named size with an orientation, or an explicit width and height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum PaperFormat {
    Standardized {
        format: StandardizedFormat,
        orientation: Orientation,
    },
    Custom {
        width: Dimension,
        height: Dimension,
    },
}

impl PaperFormat {
    /// Effective width and height after orientation is applied.
    pub fn dimensions(&self) -> (Dimension, Dimension) {
        match *self {
            PaperFormat::Standardized {
                format,
                orientation,
            } => {
                let (w, h) = format.size();
                match orientation {
                    Orientation::Portrait => (w, h),
                    Orientation::Landscape => (h, w),
                }
            }
            PaperFormat::Custom { width, height } => (width, height),
        }
    }

    /// Value for a CSS `@page { size: … }` rule.
    pub fn css_size(&self) -> String {
        match *self {
            PaperFormat::Standardized {
                format,
                orientation,
            } => match orientation {
                Orientation::Portrait => format!("{} portrait", format.as_str()),
                Orientation::Landscape => format!("{} landscape", format.as_str()),
            },
            PaperFormat::Custom { width, height } => format!("{width} {height}"),
        }
    }
}

impl Default for PaperFormat {
    fn default() -> Self {
        PaperFormat::Standardized {
            format: StandardizedFormat::A4,
            orientation: Orientation::Portrait,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Margin {
    pub top: Dimension,
    pub right: Dimension,
    pub bottom: Dimension,
    pub left: Dimension,
}

impl Margin {
    pub const fn uniform(d: Dimension) -> Self {
        Self {
            top: d,
            right: d,
            bottom: d,
            left: d,
        }
    }

    /// `top right bottom left`, as used by the CSS `margin` shorthand.
    pub fn css(&self) -> String {
        format!("{} {} {} {}", self.top, self.right, self.bottom, self.left)
    }
}

impl Default for Margin {
    fn default() -> Self {
        Margin::uniform(Dimension::new(1.0, Unit::Cm))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Paper {
    pub format: PaperFormat,
    pub margin: Margin,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dimensions_with_units() {
        let d = Dimension::parse("margin.top", "1.5cm").unwrap();
        assert_eq!(d, Dimension::new(1.5, Unit::Cm));
        assert_eq!(d.to_string(), "1.5cm");
        assert_eq!(
            Dimension::parse("w", " 12 px ").unwrap(),
            Dimension::new(12.0, Unit::Px)
        );
    }

    #[test]
    fn rejects_dimensions_without_unit() {
        for bad in ["12", "cm", "1.5 furlongs", "-1cm", ""] {
            let err = Dimension::parse("paper.width", bad).unwrap_err();
            assert!(
                matches!(err, ValidationError::InvalidDimension { ref key, .. } if key == "paper.width"),
                "{bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn converts_to_pixels() {
        assert_eq!(Dimension::new(1.0, Unit::In).to_pixels(), 96);
        assert_eq!(Dimension::new(72.0, Unit::Pt).to_pixels(), 96);
        assert_eq!(Dimension::new(210.0, Unit::Mm).to_pixels(), 794);
    }

    #[test]
    fn landscape_swaps_dimensions() {
        let paper = PaperFormat::Standardized {
            format: StandardizedFormat::A4,
            orientation: Orientation::Landscape,
        };
        let (w, h) = paper.dimensions();
        assert_eq!(w, Dimension::new(297.0, Unit::Mm));
        assert_eq!(h, Dimension::new(210.0, Unit::Mm));
        assert_eq!(paper.css_size(), "A4 landscape");
    }

    #[test]
    fn custom_css_size_uses_both_lengths() {
        let paper = PaperFormat::Custom {
            width: Dimension::new(10.0, Unit::Cm),
            height: Dimension::new(4.0, Unit::In),
        };
        assert_eq!(paper.css_size(), "10cm 4in");
    }

    #[test]
    fn default_margin_is_one_centimetre() {
        assert_eq!(Margin::default().css(), "1cm 1cm 1cm 1cm");
    }
}
