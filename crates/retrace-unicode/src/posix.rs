//! POSIX character classes
//!
//! The `[:name:]` classes usable inside bracket expressions. These are the
//! ASCII-valued POSIX sets; `print`, `graph`, `punct`, `word`, and `xdigit`
//! are recognized by the parser but reported as unsupported rather than
//! being given made-up semantics.

use retrace_ranges::CodepointRanges;

use crate::tables;

/// A supported POSIX class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PosixClass {
    Alnum,
    Alpha,
    Ascii,
    Blank,
    Cntrl,
    Digit,
    Lower,
    Space,
    Upper,
}

impl PosixClass {
    /// Look up a class by its bracket name.
    pub fn from_name(name: &str) -> Option<PosixClass> {
        Some(match name {
            "alnum" => PosixClass::Alnum,
            "alpha" => PosixClass::Alpha,
            "ascii" => PosixClass::Ascii,
            "blank" => PosixClass::Blank,
            "cntrl" => PosixClass::Cntrl,
            "digit" => PosixClass::Digit,
            "lower" => PosixClass::Lower,
            "space" => PosixClass::Space,
            "upper" => PosixClass::Upper,
            _ => return None,
        })
    }

    /// Whether the name is a POSIX class this engine knows of but does not
    /// implement.
    pub fn is_recognized_unsupported(name: &str) -> bool {
        matches!(name, "print" | "graph" | "punct" | "word" | "xdigit")
    }

    /// The codepoints of the class.
    pub fn ranges(self) -> CodepointRanges {
        match self {
            PosixClass::Alnum => CodepointRanges::from_ranges([
                (0x30u32, 0x39u32),
                (0x41, 0x5A),
                (0x61, 0x7A),
            ]),
            PosixClass::Alpha => {
                CodepointRanges::from_ranges([(0x41u32, 0x5Au32), (0x61, 0x7A)])
            }
            PosixClass::Ascii => CodepointRanges::from_ranges([(0x00u32, 0x7Fu32)]),
            PosixClass::Blank => {
                CodepointRanges::from_ranges([(0x09u32, 0x09u32), (0x20, 0x20)])
            }
            PosixClass::Cntrl => {
                CodepointRanges::from_ranges([(0x00u32, 0x1Fu32), (0x7F, 0x7F)])
            }
            PosixClass::Digit => CodepointRanges::from_ranges([(0x30u32, 0x39u32)]),
            PosixClass::Lower => CodepointRanges::from_ranges([(0x61u32, 0x7Au32)]),
            PosixClass::Space => CodepointRanges::from_table(tables::POSIX_SPACE),
            PosixClass::Upper => CodepointRanges::from_ranges([(0x41u32, 0x5Au32)]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name() {
        assert_eq!(PosixClass::from_name("alpha"), Some(PosixClass::Alpha));
        assert_eq!(PosixClass::from_name("space"), Some(PosixClass::Space));
        assert_eq!(PosixClass::from_name("punct"), None);
        assert!(PosixClass::is_recognized_unsupported("punct"));
        assert!(!PosixClass::is_recognized_unsupported("bogus"));
    }

    #[test]
    fn class_contents() {
        assert!(PosixClass::Alnum.ranges().contains('q' as u32));
        assert!(PosixClass::Alnum.ranges().contains('5' as u32));
        assert!(!PosixClass::Alnum.ranges().contains('_' as u32));
        assert!(PosixClass::Space.ranges().contains('\t' as u32));
        assert!(!PosixClass::Upper.ranges().contains('a' as u32));
    }
}
