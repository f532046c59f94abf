//! Per-frame driver that turns analyser output into a text block.
//!
//! The loop is a two-state machine: `Running` while audio plays, `Idle`
//! otherwise. Each frame samples the analyser, sizes the grid from the live
//! pane, and hands one fully assembled text block to the display sink.

use log::warn;

use crate::grid::{self, GridDimensions, Layout};
use crate::palette::Palette;
use crate::sampler::{FrequencySampler, SampleBuf};

/// Assumed pixel metrics for one terminal cell.
const CELL_W_PX: f32 = 2.0;
const CELL_H_PX: f32 = 4.0;

pub const FONT_STEP: f32 = 2.0;
const MIN_FONT: f32 = 2.0;
const MAX_FONT: f32 = 16.0;
const DEFAULT_FONT: f32 = 12.0;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum LoopState {
    Idle,
    Running,
}

pub struct VisualizerLoop {
    state: LoopState,
    pub layout: Layout,
    pub palette: Palette,
    font_size: f32,
}

impl VisualizerLoop {
    pub fn new() -> Self {
        VisualizerLoop {
            state: LoopState::Idle,
            layout: Layout::Symmetric,
            palette: Palette::Fine,
            font_size: DEFAULT_FONT,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    /// Start producing frames, attaching the sampler lazily from `tap`.
    /// Starting an already-running loop is a no-op; an attach failure leaves
    /// the loop idle and the player in no-visualizer mode.
    pub fn start(&mut self, sampler: &mut FrequencySampler, tap: Option<(SampleBuf, u16)>) {
        if self.state == LoopState::Running {
            return;
        }
        if !sampler.is_attached() {
            let Some((ring, channels)) = tap else {
                return;
            };
            if let Err(err) = sampler.attach(ring, channels) {
                warn!("visualizer disabled: {err}");
                return;
            }
        }
        self.state = LoopState::Running;
    }

    /// Idempotent; safe from any state.
    pub fn stop(&mut self) {
        self.state = LoopState::Idle;
    }

    pub fn font_size(&self) -> f32 {
        self.font_size
    }

    /// Resolution knob, clamped to [2, 16]. A zero step re-applies the clamp.
    pub fn change_font_size(&mut self, step: f32) -> f32 {
        self.font_size = (self.font_size + step).clamp(MIN_FONT, MAX_FONT);
        self.font_size
    }

    /// Produce one frame for a pane of `pane_cols` × `pane_rows` cells.
    /// Returns `None` while idle or when the sampler has no data yet, in
    /// which case the sink keeps its previous content.
    pub fn frame(
        &mut self,
        sampler: &mut FrequencySampler,
        pane_cols: u16,
        pane_rows: u16,
    ) -> Option<String> {
        if self.state != LoopState::Running || pane_cols == 0 || pane_rows == 0 {
            return None;
        }
        let dims = GridDimensions::compute(
            f32::from(pane_cols) * CELL_W_PX,
            f32::from(pane_rows) * CELL_H_PX,
            self.font_size,
        );
        // The pane cannot scroll; clip the grid to what it can show.
        let dims = GridDimensions {
            rows: dims.rows.min(pane_rows as usize),
            cols: dims.cols.min(pane_cols as usize),
        };
        let buffer = sampler.sample()?;
        Some(grid::render_frame(buffer, dims, self.layout, self.palette))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    fn tap_with_samples(len: usize) -> (SampleBuf, u16) {
        (Arc::new(Mutex::new(VecDeque::from(vec![0.5f32; len]))), 1)
    }

    #[test]
    fn stays_idle_without_a_tap() {
        let mut sampler = FrequencySampler::new();
        let mut vis = VisualizerLoop::new();
        vis.start(&mut sampler, None);
        assert!(!vis.is_running());
        assert!(vis.frame(&mut sampler, 20, 8).is_none());
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let mut sampler = FrequencySampler::new();
        let mut vis = VisualizerLoop::new();
        vis.start(&mut sampler, Some(tap_with_samples(8192)));
        assert!(vis.is_running());
        vis.start(&mut sampler, Some(tap_with_samples(8192)));
        assert!(vis.is_running());
        vis.stop();
        vis.stop();
        assert!(!vis.is_running());
    }

    #[test]
    fn running_loop_skips_frames_until_samples_arrive() {
        let mut sampler = FrequencySampler::new();
        let ring: SampleBuf = Arc::new(Mutex::new(VecDeque::new()));
        let mut vis = VisualizerLoop::new();
        vis.start(&mut sampler, Some((Arc::clone(&ring), 1)));
        assert!(vis.is_running());
        assert!(vis.frame(&mut sampler, 20, 8).is_none());

        ring.lock().unwrap().extend(vec![0.5f32; 4096]);
        assert!(vis.frame(&mut sampler, 20, 8).is_some());
    }

    #[test]
    fn frame_matches_the_pane_grid() {
        let mut sampler = FrequencySampler::new();
        let mut vis = VisualizerLoop::new();
        vis.start(&mut sampler, Some(tap_with_samples(8192)));
        // Pane of 20x8 cells = 40x32 px; font 4 -> 8 rows of 20 columns.
        vis.change_font_size(-8.0);
        assert_eq!(vis.font_size(), 4.0);
        let frame = vis.frame(&mut sampler, 20, 8).unwrap();
        let lines: Vec<&str> = frame.split('\n').collect();
        assert_eq!(lines.len(), 8);
        for line in lines {
            assert_eq!(line.len(), 20);
        }
    }

    #[test]
    fn font_size_is_clamped() {
        let mut vis = VisualizerLoop::new();
        assert_eq!(vis.change_font_size(100.0), 16.0);
        assert_eq!(vis.change_font_size(-100.0), 2.0);
        assert_eq!(vis.change_font_size(0.0), 2.0);
    }
}
