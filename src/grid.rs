//! Maps a magnitude buffer onto a rows × columns character grid.
//!
//! The grid is recomputed every frame from the live container size and the
//! active font size, then each column gets an averaged magnitude and a bar
//! that grows upward from the bottom row.

use crate::palette::Palette;

pub const MIN_ROWS: usize = 3;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct GridDimensions {
    pub rows: usize,
    pub cols: usize,
}

impl GridDimensions {
    /// Derive the grid from container pixel size and font size. Width and
    /// height are floored at 10 px, a character cell is assumed half as wide
    /// as the font is tall.
    pub fn compute(width_px: f32, height_px: f32, font_size: f32) -> Self {
        let w = width_px.max(10.0);
        let h = height_px.max(10.0);
        let font = if font_size > 0.0 { font_size } else { 12.0 };
        let rows = ((h / font).floor() as usize).max(MIN_ROWS);
        let char_w = (font * 0.5).max(1.0);
        let cols = ((w / char_w).floor() as usize).max(1);
        GridDimensions { rows, cols }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Layout {
    Symmetric,
    Flat,
}

impl Layout {
    pub fn next(self) -> Self {
        match self {
            Layout::Symmetric => Layout::Flat,
            Layout::Flat => Layout::Symmetric,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Layout::Symmetric => "mirror",
            Layout::Flat => "flat",
        }
    }
}

/// Average the buffer into `count` contiguous buckets. The bucket width is
/// `ceil(len / count)`; the last bucket may be shorter, and every bucket holds
/// at least one sample even when `count` exceeds the buffer length.
pub fn map_to_columns(buffer: &[u8], count: usize) -> Vec<u8> {
    if buffer.is_empty() || count == 0 {
        return Vec::new();
    }
    let step = buffer.len().div_ceil(count);
    let mut values = Vec::with_capacity(count);
    for c in 0..count {
        let start = (c * step).min(buffer.len() - 1);
        let end = ((c + 1) * step).clamp(start + 1, buffer.len());
        let slice = &buffer[start..end];
        let sum: u32 = slice.iter().map(|&v| u32::from(v)).sum();
        values.push((sum as f32 / slice.len() as f32).round() as u8);
    }
    values
}

/// Character rows a bar of this magnitude occupies, 0..=rows.
pub fn bar_height(value: u8, rows: usize) -> usize {
    ((f32::from(value) / 255.0) * rows as f32).round() as usize
}

/// Column values for the mirrored layout: `reverse(half) ++ [half[0]] ++ half`
/// over the lower half of the spectrum. An even column count is narrowed by
/// one so the center column is unique.
pub fn mirrored_columns(buffer: &[u8], cols: usize) -> Vec<u8> {
    if buffer.is_empty() || cols == 0 {
        return Vec::new();
    }
    let effective = if cols % 2 == 0 { cols - 1 } else { cols };
    let half_cols = (effective.saturating_sub(1) / 2).max(1);
    let half_len = buffer.len().div_ceil(2);
    let half = map_to_columns(&buffer[..half_len], half_cols);
    let center = half[0];
    let mut full = Vec::with_capacity(half.len() * 2 + 1);
    full.extend(half.iter().rev());
    full.push(center);
    full.extend(&half);
    full
}

/// Render one text frame: `dims.rows` lines joined by `\n`, each exactly
/// `dims.cols` characters, bars growing up from the bottom row. The mirrored
/// block is left-padded with spaces so it sits centered in the full width.
pub fn render_frame(buffer: &[u8], dims: GridDimensions, layout: Layout, palette: Palette) -> String {
    let columns = match layout {
        Layout::Flat => map_to_columns(buffer, dims.cols),
        Layout::Symmetric => mirrored_columns(buffer, dims.cols),
    };
    let left_pad = dims.cols.saturating_sub(columns.len()) / 2;

    let mut out = String::with_capacity((dims.cols + 1) * dims.rows);
    for r in 0..dims.rows {
        if r > 0 {
            out.push('\n');
        }
        let mut line = String::with_capacity(dims.cols);
        for _ in 0..left_pad {
            line.push(' ');
        }
        for &value in &columns {
            if line.len() == dims.cols {
                break;
            }
            if dims.rows - r <= bar_height(value, dims.rows) {
                line.push(palette.glyph_for(value));
            } else {
                line.push(' ');
            }
        }
        while line.len() < dims.cols {
            line.push(' ');
        }
        out.push_str(&line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_from_pixels() {
        let dims = GridDimensions::compute(200.0, 100.0, 10.0);
        assert_eq!(dims, GridDimensions { rows: 10, cols: 40 });
    }

    #[test]
    fn dimensions_respect_minimums() {
        let dims = GridDimensions::compute(0.0, 0.0, 16.0);
        assert!(dims.rows >= MIN_ROWS);
        assert!(dims.cols >= 1);

        // Tiny container, huge font: still a drawable grid.
        let dims = GridDimensions::compute(4.0, 4.0, 64.0);
        assert_eq!(dims.rows, MIN_ROWS);
        assert_eq!(dims.cols, 1);
    }

    #[test]
    fn columns_are_bucket_means() {
        let buffer = [10u8, 20, 30, 40, 50, 60, 70, 80];
        assert_eq!(map_to_columns(&buffer, 4), vec![15, 35, 55, 75]);
        assert_eq!(map_to_columns(&buffer, 1), vec![45]);
    }

    #[test]
    fn columns_cover_buffer_in_order() {
        let buffer = [0u8, 50, 100, 150, 200, 250];
        let values = map_to_columns(&buffer, 3);
        assert_eq!(values, vec![25, 125, 225]);
    }

    #[test]
    fn more_columns_than_samples_yields_no_empty_buckets() {
        let buffer = [100u8, 200, 40];
        let values = map_to_columns(&buffer, 5);
        assert_eq!(values.len(), 5);
        // Every value comes from a real sample.
        for v in values {
            assert!(buffer.contains(&v));
        }
    }

    #[test]
    fn bar_height_endpoints_and_monotonicity() {
        for rows in [3usize, 8, 24] {
            assert_eq!(bar_height(0, rows), 0);
            assert_eq!(bar_height(255, rows), rows);
            let mut prev = 0;
            for v in 0..=255u8 {
                let h = bar_height(v, rows);
                assert!(h >= prev, "height regressed at {v}");
                prev = h;
            }
        }
    }

    #[test]
    fn mirrored_row_shape() {
        let buffer = [10u8, 20, 30, 40, 50, 60, 70, 80];
        // 9 columns -> 4 half columns over the lower half (4 bins, step 1).
        let full = mirrored_columns(&buffer, 9);
        assert_eq!(full, vec![40, 30, 20, 10, 10, 10, 20, 30, 40]);
        assert_eq!(full.len(), 9);
    }

    #[test]
    fn mirrored_narrows_even_widths() {
        let buffer = [10u8, 20, 30, 40, 50, 60, 70, 80];
        let full = mirrored_columns(&buffer, 10);
        // Effective width 9, so the mirrored block is 2 * 4 + 1 wide.
        assert_eq!(full.len(), 9);
    }

    #[test]
    fn frame_lines_are_rectangular() {
        let buffer = [255u8; 8];
        // Even width narrows to 11 mirrored columns; the line still spans 12.
        let dims = GridDimensions { rows: 4, cols: 12 };
        let frame = render_frame(&buffer, dims, Layout::Symmetric, Palette::Fine);
        let lines: Vec<&str> = frame.split('\n').collect();
        assert_eq!(lines.len(), 4);
        for line in &lines {
            assert_eq!(line.len(), 12);
        }
        assert!(lines[3].starts_with('@'));
        assert!(lines[3].ends_with(' '));
        assert_eq!(lines[3].trim(), "@@@@@@@@@@@");
    }

    #[test]
    fn bars_grow_from_the_bottom() {
        // 64/255 * 4 rows rounds to one lit row.
        let buffer = [64u8; 4];
        let dims = GridDimensions { rows: 4, cols: 2 };
        let frame = render_frame(&buffer, dims, Layout::Flat, Palette::Fine);
        let lines: Vec<&str> = frame.split('\n').collect();
        assert_eq!(lines[0], "  ");
        assert_eq!(lines[1], "  ");
        assert_eq!(lines[2], "  ");
        assert_eq!(lines[3], "//");
    }

    #[test]
    fn silent_buffer_renders_blank() {
        let buffer = [0u8; 16];
        let dims = GridDimensions { rows: 3, cols: 5 };
        let frame = render_frame(&buffer, dims, Layout::Flat, Palette::Coarse);
        assert!(frame.chars().all(|c| c == ' ' || c == '\n'));
    }
}
