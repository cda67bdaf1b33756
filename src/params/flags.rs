//! Parameter flag sets and flag-based filters.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Bit set describing how a parameter takes part in curve synthesis.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParFlags(u8);

impl ParFlags {
    pub const NONE: ParFlags = ParFlags(0);
    /// Does not affect the model itself.
    pub const CONTROLLING: ParFlags = ParFlags(0b0000_0001);
    /// Can be adjusted by a fitting run.
    pub const FITTABLE: ParFlags = ParFlags(0b0000_0010);
    /// May differ between the curves of one system.
    pub const CURVE_DEP: ParFlags = ParFlags(0b0000_0100);
    /// Affects output sampling only.
    pub const OUTPUT_SPEC: ParFlags = ParFlags(0b0000_1000);
    pub const LC: ParFlags = ParFlags(0b0001_0000);
    pub const DC: ParFlags = ParFlags(0b0010_0000);
    /// Bookkeeping local to one curve's generation (never shared).
    pub const CURVE_PRIV: ParFlags = ParFlags(0b0100_0000);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn from_bits(bits: u8) -> Self {
        ParFlags(bits)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// All bits of `other` are set.
    pub const fn contains(self, other: ParFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// At least one bit of `other` is set.
    pub const fn intersects(self, other: ParFlags) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for ParFlags {
    type Output = ParFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        ParFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for ParFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ParFlags {
    type Output = ParFlags;

    fn bitand(self, rhs: Self) -> Self::Output {
        ParFlags(self.0 & rhs.0)
    }
}

impl fmt::Debug for ParFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(ParFlags, &str); 7] = [
            (ParFlags::CONTROLLING, "CONTROLLING"),
            (ParFlags::FITTABLE, "FITTABLE"),
            (ParFlags::CURVE_DEP, "CURVE_DEP"),
            (ParFlags::OUTPUT_SPEC, "OUTPUT_SPEC"),
            (ParFlags::LC, "LC"),
            (ParFlags::DC, "DC"),
            (ParFlags::CURVE_PRIV, "CURVE_PRIV"),
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            write!(f, "ParFlags(NONE)")
        } else {
            write!(f, "ParFlags({})", names.join(" | "))
        }
    }
}

/// Flag-based parameter filter.
///
/// Empty flag sets impose no constraint, so `FlagFilter::default()` matches
/// every parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagFilter {
    /// At least one of these must be set.
    pub any: ParFlags,
    /// All of these must be set.
    pub all: ParFlags,
    /// None of these may be set.
    pub not: ParFlags,
}

impl FlagFilter {
    pub fn every() -> Self {
        Self::default()
    }

    pub fn any_of(flags: ParFlags) -> Self {
        Self {
            any: flags,
            ..Self::default()
        }
    }

    pub fn all_of(flags: ParFlags) -> Self {
        Self {
            all: flags,
            ..Self::default()
        }
    }

    pub fn none_of(flags: ParFlags) -> Self {
        Self {
            not: flags,
            ..Self::default()
        }
    }

    /// Parameters a curve keeps in its own overlay.
    pub fn curve() -> Self {
        Self::any_of(ParFlags::CURVE_DEP | ParFlags::CURVE_PRIV)
    }

    pub fn matches(&self, flags: ParFlags) -> bool {
        (self.any.is_empty() || flags.intersects(self.any))
            && flags.contains(self.all)
            && !flags.intersects(self.not)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_matches_everything() {
        let filter = FlagFilter::every();
        assert!(filter.matches(ParFlags::NONE));
        assert!(filter.matches(ParFlags::CURVE_PRIV | ParFlags::LC));
    }

    #[test]
    fn curve_filter_selects_dependent_and_private() {
        let filter = FlagFilter::curve();
        assert!(filter.matches(ParFlags::CURVE_DEP | ParFlags::LC));
        assert!(filter.matches(ParFlags::CURVE_PRIV));
        assert!(!filter.matches(ParFlags::FITTABLE | ParFlags::LC | ParFlags::DC));
    }

    #[test]
    fn all_and_not_combine() {
        let filter = FlagFilter {
            all: ParFlags::LC | ParFlags::DC,
            not: ParFlags::CURVE_DEP,
            ..FlagFilter::default()
        };
        assert!(filter.matches(ParFlags::LC | ParFlags::DC | ParFlags::FITTABLE));
        assert!(!filter.matches(ParFlags::LC));
        assert!(!filter.matches(ParFlags::LC | ParFlags::DC | ParFlags::CURVE_DEP));
    }

    #[test]
    fn debug_lists_flag_names() {
        let text = format!("{:?}", ParFlags::LC | ParFlags::CURVE_PRIV);
        assert_eq!(text, "ParFlags(LC | CURVE_PRIV)");
        assert_eq!(format!("{:?}", ParFlags::NONE), "ParFlags(NONE)");
    }
}
