//! Transfer format negotiation types.

use std::fmt;
use std::ops::BitOr;

/// The negotiated payload mode of a started transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferFormat {
    /// UTF-8 text payloads, record-separator framed.
    Text,
    /// Binary payloads, length-prefix framed.
    Binary,
}

impl fmt::Display for TransferFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "Text"),
            Self::Binary => write!(f, "Binary"),
        }
    }
}

impl From<TransferFormat> for TransferFormats {
    fn from(format: TransferFormat) -> Self {
        match format {
            TransferFormat::Text => TransferFormats::TEXT,
            TransferFormat::Binary => TransferFormats::BINARY,
        }
    }
}

/// A bit-set of transfer formats.
///
/// A set with several bits describes a *capability* (what a transport could
/// carry); a [`Transport::start`](crate::Transport::start) request must name
/// exactly one format, and implementations reject anything else via
/// [`validate_transfer_format`](crate::validate_transfer_format).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferFormats(u8);

impl TransferFormats {
    /// Text payloads.
    pub const TEXT: Self = Self(1 << 0);
    /// Binary payloads.
    pub const BINARY: Self = Self(1 << 1);

    /// The empty set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Whether `other`'s bits are all present in this set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether exactly one bit is set.
    pub const fn is_single(self) -> bool {
        self.0 != 0 && self.0 & (self.0 - 1) == 0
    }

    /// The single format named by this set, if exactly one bit is set.
    pub fn single(self) -> Option<TransferFormat> {
        match self {
            Self::TEXT => Some(TransferFormat::Text),
            Self::BINARY => Some(TransferFormat::Binary),
            _ => None,
        }
    }
}

impl BitOr for TransferFormats {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for TransferFormats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "None");
        }
        let mut first = true;
        for (bit, name) in [(Self::TEXT, "Text"), (Self::BINARY, "Binary")] {
            if self.contains(bit) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_bit_sets() {
        assert!(TransferFormats::TEXT.is_single());
        assert!(TransferFormats::BINARY.is_single());
        assert_eq!(TransferFormats::TEXT.single(), Some(TransferFormat::Text));
        assert_eq!(
            TransferFormats::BINARY.single(),
            Some(TransferFormat::Binary)
        );
    }

    #[test]
    fn test_combined_set_is_not_single() {
        let both = TransferFormats::TEXT | TransferFormats::BINARY;
        assert!(!both.is_single());
        assert_eq!(both.single(), None);
        assert!(both.contains(TransferFormats::TEXT));
        assert!(both.contains(TransferFormats::BINARY));
    }

    #[test]
    fn test_empty_set() {
        let none = TransferFormats::empty();
        assert!(!none.is_single());
        assert_eq!(none.single(), None);
        assert_eq!(none.to_string(), "None");
    }

    #[test]
    fn test_display() {
        assert_eq!(TransferFormats::TEXT.to_string(), "Text");
        assert_eq!(
            (TransferFormats::TEXT | TransferFormats::BINARY).to_string(),
            "Text|Binary"
        );
        assert_eq!(TransferFormat::Binary.to_string(), "Binary");
    }
}
