//! Match options
//!
//! Options are scoped: the parser pushes a frame when entering a group with
//! inline flags and pops it on the way out, so a single `Options` value is
//! always "the options in effect right here".

/// The option flags a pattern (or an inline `(?imsxn-…)` group) can toggle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Letters match either case (`i`).
    pub case_insensitive: bool,
    /// `^` and `$` match at line boundaries (`m`).
    pub multiline: bool,
    /// Only explicitly named groups capture (`n`).
    pub no_auto_capture: bool,
    /// `.` also matches line terminators (`s`).
    pub dot_all: bool,
    /// Whitespace and `#` comments outside classes are ignored (`x`).
    pub extended: bool,
    /// Additionally ignore spaces inside classes (`xx`).
    pub extended_more: bool,
}

impl Options {
    /// Apply a single inline flag letter. Returns `false` for letters that
    /// are not recognized.
    pub fn apply_flag(&mut self, flag: char, enable: bool) -> bool {
        match flag {
            'i' => self.case_insensitive = enable,
            'm' => self.multiline = enable,
            'n' => self.no_auto_capture = enable,
            's' => self.dot_all = enable,
            'x' => {
                self.extended = enable;
                if !enable {
                    self.extended_more = false;
                }
            }
            _ => return false,
        }
        true
    }
}
