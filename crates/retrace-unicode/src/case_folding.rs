//! Simple case folding
//!
//! One-to-one folding only: every codepoint folds to exactly one codepoint,
//! so folded comparison is a per-codepoint operation and case-insensitive
//! classes can be closed over their fold equivalents once, at compile time.
//!
//! The fold data is expressed the way the UCD lays it out: contiguous blocks
//! with a constant delta (ASCII, Greek, Cyrillic, Armenian, Fullwidth,
//! Deseret) and blocks of upper/lower pairs at alternating codepoints
//! (Latin Extended, Cyrillic extensions), plus a short list of singletons
//! for the stragglers.

use retrace_ranges::{CodepointRange, CodepointRanges};

/// How an entry maps codepoints inside its block.
#[derive(Debug, Clone, Copy)]
enum FoldKind {
    /// Every codepoint in the block folds by adding the delta.
    Delta(i32),
    /// Even codepoints fold to the following odd one.
    AlternatingEven,
    /// Odd codepoints fold to the following even one.
    AlternatingOdd,
}

/// A block of codepoints that fold by a shared rule.
#[derive(Debug, Clone, Copy)]
struct FoldBlock {
    first: u32,
    last: u32,
    kind: FoldKind,
}

const fn block(first: u32, last: u32, kind: FoldKind) -> FoldBlock {
    FoldBlock { first, last, kind }
}

/// Blocks sorted by `first`.
static FOLD_BLOCKS: &[FoldBlock] = &[
    block(0x0041, 0x005A, FoldKind::Delta(32)),  // A-Z
    block(0x00C0, 0x00D6, FoldKind::Delta(32)),  // À-Ö
    block(0x00D8, 0x00DE, FoldKind::Delta(32)),  // Ø-Þ
    block(0x0100, 0x012F, FoldKind::AlternatingEven), // Ā.. į
    block(0x0132, 0x0137, FoldKind::AlternatingEven),
    block(0x0139, 0x0148, FoldKind::AlternatingOdd),
    block(0x014A, 0x0177, FoldKind::AlternatingEven),
    block(0x0179, 0x017E, FoldKind::AlternatingOdd),
    block(0x0182, 0x0185, FoldKind::AlternatingEven),
    block(0x01A0, 0x01A5, FoldKind::AlternatingEven),
    block(0x01B3, 0x01B6, FoldKind::AlternatingOdd),
    block(0x01CD, 0x01DC, FoldKind::AlternatingOdd),
    block(0x01DE, 0x01EF, FoldKind::AlternatingEven),
    block(0x01F8, 0x021F, FoldKind::AlternatingEven),
    block(0x0222, 0x0233, FoldKind::AlternatingEven),
    block(0x0246, 0x024F, FoldKind::AlternatingEven),
    block(0x0391, 0x03A1, FoldKind::Delta(32)),  // Α-Ρ
    block(0x03A3, 0x03AB, FoldKind::Delta(32)),  // Σ-Ϋ
    block(0x0400, 0x040F, FoldKind::Delta(80)),  // Ѐ-Џ
    block(0x0410, 0x042F, FoldKind::Delta(32)),  // А-Я
    block(0x0460, 0x0481, FoldKind::AlternatingEven),
    block(0x048A, 0x04BF, FoldKind::AlternatingEven),
    block(0x04C1, 0x04CE, FoldKind::AlternatingOdd),
    block(0x04D0, 0x052F, FoldKind::AlternatingEven),
    block(0x0531, 0x0556, FoldKind::Delta(48)),  // Armenian
    block(0x13F8, 0x13FD, FoldKind::Delta(-8)),  // Cherokee small block
    block(0x1E00, 0x1E95, FoldKind::AlternatingEven),
    block(0x1EA0, 0x1EFF, FoldKind::AlternatingEven),
    block(0x1F08, 0x1F0F, FoldKind::Delta(-8)),  // Greek Extended
    block(0x1F18, 0x1F1D, FoldKind::Delta(-8)),
    block(0x1F28, 0x1F2F, FoldKind::Delta(-8)),
    block(0x1F38, 0x1F3F, FoldKind::Delta(-8)),
    block(0x1F48, 0x1F4D, FoldKind::Delta(-8)),
    block(0x1F68, 0x1F6F, FoldKind::Delta(-8)),
    block(0x2C00, 0x2C2E, FoldKind::Delta(48)),  // Glagolitic
    block(0x2C60, 0x2C61, FoldKind::AlternatingEven),
    block(0x2C80, 0x2CE3, FoldKind::AlternatingEven), // Coptic
    block(0xA640, 0xA66D, FoldKind::AlternatingEven),
    block(0xA680, 0xA69B, FoldKind::AlternatingEven),
    block(0xAB70, 0xABBF, FoldKind::Delta(-38864)), // Cherokee folds upward
    block(0xFF21, 0xFF3A, FoldKind::Delta(32)),  // Fullwidth A-Z
    block(0x10400, 0x10427, FoldKind::Delta(40)), // Deseret
    block(0x104B0, 0x104D3, FoldKind::Delta(40)), // Osage
    block(0x10C80, 0x10CB2, FoldKind::Delta(64)), // Old Hungarian
    block(0x118A0, 0x118BF, FoldKind::Delta(32)), // Warang Citi
    block(0x16E40, 0x16E5F, FoldKind::Delta(32)), // Medefaidrin
    block(0x1E900, 0x1E921, FoldKind::Delta(34)), // Adlam
];

/// Singleton folds, sorted by source codepoint.
static FOLD_SINGLES: &[(u32, u32)] = &[
    (0x00B5, 0x03BC), // µ -> μ
    (0x0130, 0x0130), // İ has no simple fold; keep identity explicit
    (0x0178, 0x00FF), // Ÿ -> ÿ
    (0x017F, 0x0073), // ſ -> s
    (0x0187, 0x0188),
    (0x018B, 0x018C),
    (0x0191, 0x0192),
    (0x0198, 0x0199),
    (0x01A7, 0x01A8),
    (0x01AC, 0x01AD),
    (0x01AF, 0x01B0),
    (0x01B8, 0x01B9),
    (0x01BC, 0x01BD),
    (0x01C4, 0x01C6), // DŽ -> dž
    (0x01C5, 0x01C6), // Dž -> dž
    (0x01C7, 0x01C9),
    (0x01C8, 0x01C9),
    (0x01CA, 0x01CC),
    (0x01CB, 0x01CC),
    (0x01F1, 0x01F3),
    (0x01F2, 0x01F3),
    (0x01F4, 0x01F5),
    (0x01F6, 0x0195),
    (0x01F7, 0x01BF),
    (0x0345, 0x03B9), // ypogegrammeni -> ι
    (0x0386, 0x03AC), // Ά
    (0x0388, 0x03AD),
    (0x0389, 0x03AE),
    (0x038A, 0x03AF),
    (0x038C, 0x03CC),
    (0x038E, 0x03CD),
    (0x038F, 0x03CE),
    (0x03C2, 0x03C3), // final sigma -> sigma
    (0x03D0, 0x03B2), // ϐ -> β
    (0x03D1, 0x03B8), // ϑ -> θ
    (0x03D5, 0x03C6), // ϕ -> φ
    (0x03D6, 0x03C0), // ϖ -> π
    (0x03F0, 0x03BA), // ϰ -> κ
    (0x03F1, 0x03C1), // ϱ -> ρ
    (0x03F5, 0x03B5), // ϵ -> ε
    (0x04C0, 0x04CF), // Ӏ
    (0x1E9B, 0x1E61),
    (0x1E9E, 0x00DF), // ẞ -> ß
    (0x1FBE, 0x03B9), // prosgegrammeni -> ι
    (0x2126, 0x03C9), // ohm -> ω
    (0x212A, 0x006B), // kelvin -> k
    (0x212B, 0x00E5), // angstrom -> å
    (0x2132, 0x214E), // turned F
    (0x2183, 0x2184), // Roman reversed C
];

fn lookup_single(cp: u32) -> Option<u32> {
    FOLD_SINGLES
        .binary_search_by_key(&cp, |&(from, _)| from)
        .ok()
        .map(|i| FOLD_SINGLES[i].1)
}

fn lookup_block(cp: u32) -> Option<u32> {
    let idx = FOLD_BLOCKS
        .binary_search_by(|b| {
            if b.last < cp {
                std::cmp::Ordering::Less
            } else if b.first > cp {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Equal
            }
        })
        .ok()?;
    let b = FOLD_BLOCKS[idx];
    match b.kind {
        FoldKind::Delta(d) => Some(cp.wrapping_add_signed(d)),
        FoldKind::AlternatingEven => {
            if cp % 2 == 0 {
                Some(cp + 1)
            } else {
                None
            }
        }
        FoldKind::AlternatingOdd => {
            if cp % 2 == 1 {
                Some(cp + 1)
            } else {
                None
            }
        }
    }
}

fn fold_u32(cp: u32) -> u32 {
    if let Some(folded) = lookup_single(cp) {
        return folded;
    }
    lookup_block(cp).unwrap_or(cp)
}

/// Simple-fold a codepoint. Codepoints without a simple fold (including all
/// cased codepoints already in folded form) map to themselves.
pub fn fold(c: char) -> char {
    char::from_u32(fold_u32(c as u32)).unwrap_or(c)
}

/// Simple-fold every codepoint of a string.
pub fn fold_string(s: &str) -> String {
    s.chars().map(fold).collect()
}

/// Iterate every `(cased, folded)` pair the tables describe.
fn fold_pairs() -> impl Iterator<Item = (u32, u32)> {
    let block_pairs = FOLD_BLOCKS.iter().flat_map(|b| {
        (b.first..=b.last).filter_map(move |cp| match b.kind {
            FoldKind::Delta(d) => Some((cp, cp.wrapping_add_signed(d))),
            FoldKind::AlternatingEven if cp % 2 == 0 => Some((cp, cp + 1)),
            FoldKind::AlternatingOdd if cp % 2 == 1 => Some((cp, cp + 1)),
            _ => None,
        })
    });
    FOLD_SINGLES
        .iter()
        .copied()
        .filter(|&(from, to)| from != to)
        .chain(block_pairs)
}

/// Extend a class with every codepoint that simple-folds into it or that a
/// member folds to, then re-normalize. Case-insensitive classes are closed
/// once here so matching needs no per-codepoint folding.
pub fn add_fold_closure(ranges: &mut CodepointRanges) {
    let mut additions: Vec<u32> = Vec::new();
    for (cased, folded) in fold_pairs() {
        if ranges.contains(cased) {
            additions.push(folded);
        }
        if ranges.contains(folded) {
            additions.push(cased);
        }
    }
    for cp in additions {
        ranges.push(CodepointRange::single(cp));
    }
    ranges.sort_and_compact();
}
