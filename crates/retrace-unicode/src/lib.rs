//! Unicode data for the regex engine
//!
//! The engine needs a small slice of the Unicode character database: the
//! general categories behind `\w`/`\d` and friends, the `White_Space`
//! property, the horizontal/vertical whitespace sets, POSIX classes, and the
//! simple (one-to-one) case folding used by case-insensitive matching.
//!
//! Tables are shipped as sorted `static` slices of inclusive codepoint pairs
//! covering the principal allocated scripts, and are consumed either through
//! binary-search membership tests or by materializing a
//! [`CodepointRanges`](retrace_ranges::CodepointRanges) for a character
//! class.

mod case_folding;
mod posix;
pub mod tables;

pub use case_folding::{add_fold_closure, fold, fold_string};
pub use posix::PosixClass;

use retrace_ranges::CodepointRanges;

/// Binary-search membership in a sorted table of inclusive pairs.
pub fn in_table(table: &[(u32, u32)], cp: u32) -> bool {
    table
        .binary_search_by(|&(first, last)| {
            if last < cp {
                std::cmp::Ordering::Less
            } else if first > cp {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Equal
            }
        })
        .is_ok()
}

/// Whether the codepoint is a word character: a letter, a number, or `_`.
pub fn is_word(c: char) -> bool {
    let cp = c as u32;
    cp == '_' as u32 || in_table(tables::LETTER, cp) || in_table(tables::NUMBER, cp)
}

/// Word characters as a range list (`\w`).
pub fn word_ranges() -> CodepointRanges {
    let mut ranges = CodepointRanges::from_table(tables::LETTER);
    ranges.extend(&CodepointRanges::from_table(tables::NUMBER));
    ranges.push(retrace_ranges::CodepointRange::single('_' as u32));
    ranges.sort_and_compact();
    ranges
}

/// Decimal digits as a range list (`\d`).
pub fn decimal_number_ranges() -> CodepointRanges {
    CodepointRanges::from_table(tables::DECIMAL_NUMBER)
}

/// `White_Space` codepoints as a range list (`\s`).
pub fn white_space_ranges() -> CodepointRanges {
    CodepointRanges::from_table(tables::WHITE_SPACE)
}

/// Horizontal whitespace as a range list (`\h`).
pub fn horizontal_whitespace_ranges() -> CodepointRanges {
    CodepointRanges::from_table(tables::HORIZONTAL_WHITESPACE)
}

/// Vertical whitespace as a range list (`\v`).
pub fn vertical_whitespace_ranges() -> CodepointRanges {
    CodepointRanges::from_table(tables::VERTICAL_WHITESPACE)
}

/// Whether the codepoint is skippable whitespace in extended mode.
pub fn is_extended_mode_whitespace(c: char) -> bool {
    in_table(tables::WHITE_SPACE, c as u32)
}
