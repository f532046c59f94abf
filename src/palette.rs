//! Magnitude-to-glyph lookup tables.
//!
//! Both palettes are total over 0..=255 and bucket by ascending thresholds;
//! a boundary value belongs to the bucket above it.

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Palette {
    Fine,
    Coarse,
}

/// Glyph catalog for the fine palette, one per 10-wide bucket. Values of 250
/// and above fall through to `@`.
const FINE_GLYPHS: [char; 25] = [
    '.', '-', ':', '"', ';', '|', '/', '>', '<', '+', '(', ']', '[', '}', '{', ')', '=', 'o', '*',
    '&', '?', '%', '$', 'a', 'g',
];

const COARSE_STEPS: [(u8, char); 5] = [(30, '.'), (60, '-'), (100, '+'), (150, '%'), (200, '#')];

impl Palette {
    pub fn next(self) -> Self {
        match self {
            Palette::Fine => Palette::Coarse,
            Palette::Coarse => Palette::Fine,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Palette::Fine => "fine",
            Palette::Coarse => "coarse",
        }
    }

    pub fn glyph_for(self, value: u8) -> char {
        match self {
            Palette::Fine => FINE_GLYPHS
                .get(value as usize / 10)
                .copied()
                .unwrap_or('@'),
            Palette::Coarse => {
                for (limit, glyph) in COARSE_STEPS {
                    if value < limit {
                        return glyph;
                    }
                }
                '@'
            }
        }
    }
}
