//! Transform selection for the line sanitizer.

use std::fmt;
use std::ops::BitOr;
use std::ops::BitOrAssign;

use serde::Deserialize;
use serde::Serialize;

/// A single named transform, used for the serialized form of [`SanitizeOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizeFlag {
    /// Keep only the text after the last carriage return of a line.
    FromLastCr,
    /// Strip ANSI/VT escape sequences.
    RemoveAnsiCodes,
}

impl SanitizeFlag {
    const fn bit(self) -> u8 {
        match self {
            Self::FromLastCr => SanitizeOptions::FROM_LAST_CR.0,
            Self::RemoveAnsiCodes => SanitizeOptions::REMOVE_ANSI_CODES.0,
        }
    }
}

/// Bitset of transforms applied to every scanned line.
///
/// Serializes as a list of [`SanitizeFlag`] names, e.g.
/// `["from_last_cr", "remove_ansi_codes"]`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<SanitizeFlag>", into = "Vec<SanitizeFlag>")]
pub struct SanitizeOptions(u8);

impl SanitizeOptions {
    /// Collapse carriage-return overwrites to the final visible text.
    pub const FROM_LAST_CR: Self = Self(0b01);
    /// Strip ANSI escape sequences.
    pub const REMOVE_ANSI_CODES: Self = Self(0b10);

    /// No transforms; lines are passed through as split.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every transform enabled.
    pub const fn all() -> Self {
        Self(Self::FROM_LAST_CR.0 | Self::REMOVE_ANSI_CODES.0)
    }

    /// Returns true if every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self::all()
    }
}

impl BitOr for SanitizeOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for SanitizeOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl From<Vec<SanitizeFlag>> for SanitizeOptions {
    fn from(flags: Vec<SanitizeFlag>) -> Self {
        Self(flags.iter().fold(0, |bits, flag| bits | flag.bit()))
    }
}

impl From<SanitizeOptions> for Vec<SanitizeFlag> {
    fn from(options: SanitizeOptions) -> Self {
        [SanitizeFlag::FromLastCr, SanitizeFlag::RemoveAnsiCodes]
            .into_iter()
            .filter(|flag| options.0 & flag.bit() != 0)
            .collect()
    }
}

impl fmt::Debug for SanitizeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags: Vec<SanitizeFlag> = (*self).into();
        f.debug_tuple("SanitizeOptions").field(&flags).finish()
    }
}
