//! Delegate behaviour flags.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Composable set of flags configuring how a delegate receives messages.
///
/// Flags are independent bits; combine them with `|`:
///
/// ```
/// use spindle_core::MsgFlags;
///
/// let flags = MsgFlags::REQUIRED | MsgFlags::IGNORE_NAME;
/// assert!(flags.contains(MsgFlags::REQUIRED));
/// assert!(!flags.contains(MsgFlags::ALLOW_OVERWRITE));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MsgFlags(u8);

impl MsgFlags {
    /// Match by name; a single-bind slot accepts one message per event.
    pub const NONE: Self = Self(0);
    /// The delegate must receive at least one message each event.
    pub const REQUIRED: Self = Self(1 << 0);
    /// A single-bind slot may be assigned more than once per event.
    pub const ALLOW_OVERWRITE: Self = Self(1 << 1);
    /// Disregard the instance name of dispatched messages.
    pub const IGNORE_NAME: Self = Self(1 << 2);

    const ALL: [(Self, &'static str); 3] = [
        (Self::REQUIRED, "REQUIRED"),
        (Self::ALLOW_OVERWRITE, "ALLOW_OVERWRITE"),
        (Self::IGNORE_NAME, "IGNORE_NAME"),
    ];

    /// Whether every bit in `other` is also set in `self`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no flag is set.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Raw bit representation.
    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for MsgFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for MsgFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for MsgFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MsgFlags({self})")
    }
}

impl fmt::Display for MsgFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let mut first = true;
        for (flag, name) in Self::ALL {
            if self.contains(flag) {
                if !first {
                    write!(f, " | ")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}
