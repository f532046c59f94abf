//! Playlist sequencing and the rodio playback engine.
//!
//! [`Playlist`] is pure sequencing state (shuffled order, index, time) so it
//! can be exercised without an audio device; [`PlaybackController`] owns the
//! output stream, the per-track sink, and the analyser tap.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use std::{fs, io};

use log::{debug, warn};
use rand::Rng;
use rand::seq::SliceRandom;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};
use symphonia::core::{
    formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};

use crate::error::PlaybackError;
use crate::sampler::{AnalyserTap, SampleBuf};
use crate::state::{SavedState, StateStore};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PlayerState {
    NoPlaylist,
    Loaded,
    Ready,
    Playing,
    Paused,
}

pub fn is_mp3(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("mp3"))
}

/// Non-recursive scan for `.mp3` files, sorted by name.
pub fn scan_folder(dir: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && is_mp3(&path) {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Shuffled play order plus position. No audio here.
#[derive(Debug, Clone, PartialEq)]
pub struct Playlist {
    order: Vec<String>,
    index: usize,
    time: f64,
}

impl Playlist {
    /// Build from a folder's track names. When the saved playlist holds the
    /// same names (order-insensitive), the saved shuffle, index, and time
    /// survive, with the index wrapped into range; otherwise the order is
    /// freshly shuffled and the position resets.
    pub fn from_names<R: Rng>(
        names: Vec<String>,
        saved: Option<SavedState>,
        rng: &mut R,
    ) -> Option<Playlist> {
        if names.is_empty() {
            return None;
        }
        if let Some(saved) = saved {
            if same_name_set(&saved.playlist, &names) {
                let index = saved.index % saved.playlist.len();
                return Some(Playlist {
                    order: saved.playlist,
                    index,
                    time: saved.time.max(0.0),
                });
            }
        }
        let mut order = names;
        order.shuffle(rng);
        Some(Playlist {
            order,
            index: 0,
            time: 0.0,
        })
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time.max(0.0);
    }

    pub fn current(&self) -> &str {
        &self.order[self.index]
    }

    /// Step the index by `delta`, wrapping modulo the playlist length, and
    /// reset the position.
    pub fn advance(&mut self, delta: isize) {
        let len = self.order.len() as isize;
        self.index = ((self.index as isize + delta % len + len) % len) as usize;
        self.time = 0.0;
    }
}

fn same_name_set(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort();
    b.sort();
    a == b
}

/// Seek target: delta applied to the current position, clamped to zero and to
/// the track length when known.
fn clamp_seek(current: f64, delta: i64, total: Option<f64>) -> f64 {
    let target = (current + delta as f64).max(0.0);
    match total {
        Some(t) => target.min(t),
        None => target,
    }
}

pub struct PlaybackController {
    folder: PathBuf,
    playlist: Option<Playlist>,
    state: PlayerState,
    store: StateStore,
    stream: OutputStream,
    sink: Option<Sink>,
    ring: SampleBuf,
    channels: u16,
    seek_base: Duration,
    total_duration: Option<Duration>,
    last_saved_second: u64,
}

impl PlaybackController {
    /// Open the default audio device, scan the folder, and restore or shuffle
    /// the play order. A non-empty playlist starts playing immediately, as
    /// the original folder-selection flow did.
    pub fn new(folder: PathBuf, store: StateStore) -> Result<Self, PlaybackError> {
        let stream = OutputStreamBuilder::from_default_device()
            .map_err(|e| PlaybackError::Device(e.to_string()))?
            .open_stream_or_fallback()
            .map_err(|e| PlaybackError::Device(e.to_string()))?;

        let names = scan_folder(&folder)?;
        let saved = store.load();
        let playlist = Playlist::from_names(names, saved, &mut rand::thread_rng());
        if playlist.is_none() {
            store.clear();
        }

        let mut controller = PlaybackController {
            folder,
            playlist,
            state: PlayerState::NoPlaylist,
            store,
            stream,
            sink: None,
            ring: Arc::new(Mutex::new(VecDeque::new())),
            channels: 2,
            seek_base: Duration::ZERO,
            total_duration: None,
            last_saved_second: u64::MAX,
        };
        if controller.playlist.is_some() {
            controller.state = PlayerState::Loaded;
            let resume = controller.playlist.as_ref().map_or(0.0, Playlist::time);
            controller.load_current(resume);
            controller.play();
            controller.save_state();
        }
        Ok(controller)
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlayerState::Playing
    }

    pub fn current_title(&self) -> Option<&str> {
        self.playlist.as_ref().map(|p| p.current())
    }

    pub fn track_count(&self) -> usize {
        self.playlist.as_ref().map_or(0, Playlist::len)
    }

    pub fn track_number(&self) -> usize {
        self.playlist.as_ref().map_or(0, |p| p.index() + 1)
    }

    /// The analyser tap for the visualizer: one ring for the whole session,
    /// refilled by whichever track is live.
    pub fn tap(&self) -> (SampleBuf, u16) {
        (Arc::clone(&self.ring), self.channels)
    }

    pub fn position(&self) -> Duration {
        match &self.sink {
            Some(sink) => self.seek_base + sink.get_pos(),
            None => Duration::ZERO,
        }
    }

    pub fn total_duration(&self) -> Option<Duration> {
        self.total_duration
    }

    pub fn play(&mut self) {
        match self.state {
            PlayerState::Ready | PlayerState::Paused => {
                if let Some(sink) = &self.sink {
                    sink.play();
                    self.state = PlayerState::Playing;
                }
            }
            PlayerState::Loaded => {
                let resume = self.playlist.as_ref().map_or(0.0, Playlist::time);
                self.load_current(resume);
                if self.state == PlayerState::Ready {
                    if let Some(sink) = &self.sink {
                        sink.play();
                        self.state = PlayerState::Playing;
                    }
                }
            }
            _ => {}
        }
    }

    pub fn pause(&mut self) {
        if self.state != PlayerState::Playing {
            return;
        }
        if let Some(sink) = &self.sink {
            sink.pause();
        }
        self.state = PlayerState::Paused;
        self.refresh_time();
        self.save_state();
    }

    pub fn next(&mut self) {
        self.step(1);
    }

    pub fn prev(&mut self) {
        self.step(-1);
    }

    fn step(&mut self, delta: isize) {
        if self.playlist.is_none() {
            return;
        }
        self.pause();
        if let Some(playlist) = self.playlist.as_mut() {
            playlist.advance(delta);
        }
        self.load_current(0.0);
        self.play();
        self.save_state();
    }

    /// Seek by a signed number of seconds. The result clamps at zero (and at
    /// the track length when known) and the play/pause state survives.
    pub fn seek(&mut self, delta_secs: i64) {
        if self.sink.is_none() {
            return;
        }
        let Some(name) = self.current_title().map(str::to_string) else {
            return;
        };
        let was_playing = self.state == PlayerState::Playing;
        let target = clamp_seek(
            self.position().as_secs_f64(),
            delta_secs,
            self.total_duration.map(|t| t.as_secs_f64()),
        );
        match self.load_file(&name, target) {
            Ok(()) => {
                if was_playing {
                    if let Some(sink) = &self.sink {
                        sink.play();
                    }
                }
                self.refresh_time();
                self.save_state();
            }
            Err(err) => warn!("seek failed for {name}: {err}"),
        }
    }

    /// Timeupdate equivalent, called from the event loop: refresh the saved
    /// position once per elapsed whole second and auto-advance when the
    /// current track runs out.
    pub fn tick(&mut self) {
        if self.state != PlayerState::Playing {
            return;
        }
        self.refresh_time();
        let second = self.position().as_secs();
        if second != self.last_saved_second {
            self.last_saved_second = second;
            self.save_state();
        }
        if self.sink.as_ref().is_some_and(Sink::empty) {
            debug!("track ended, advancing");
            self.next();
        }
    }

    /// Load the track at the current index, skipping stale entries. Retries
    /// are capped at the playlist length; a fully stale list degrades to the
    /// no-playlist state instead of recursing.
    fn load_current(&mut self, start_at: f64) {
        let len = match &self.playlist {
            Some(playlist) => playlist.len(),
            None => return,
        };
        let mut start_at = start_at;
        for _ in 0..len {
            let Some(playlist) = self.playlist.as_ref() else {
                return;
            };
            let name = playlist.current().to_string();
            match self.load_file(&name, start_at) {
                Ok(()) => {
                    self.state = PlayerState::Ready;
                    return;
                }
                Err(err) => {
                    warn!("skipping {name}: {err}");
                    start_at = 0.0;
                    if let Some(playlist) = self.playlist.as_mut() {
                        playlist.advance(1);
                    }
                }
            }
        }
        debug!("no loadable tracks remain");
        self.playlist = None;
        self.state = PlayerState::NoPlaylist;
        self.store.clear();
    }

    /// Swap in a fresh sink for `name`, releasing the previous one exactly
    /// once. The new sink starts paused at `start_at` seconds.
    fn load_file(&mut self, name: &str, start_at: f64) -> Result<(), PlaybackError> {
        let path = self.folder.join(name);
        let file =
            fs::File::open(&path).map_err(|_| PlaybackError::TrackNotFound(name.to_string()))?;
        let mut source =
            Decoder::new(io::BufReader::new(file)).map_err(|e| PlaybackError::Decode {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        let channels = source.channels();
        if start_at > 0.0 {
            let _ = source.try_seek(Duration::from_secs_f64(start_at));
        }

        // Release the previous track's resources before wiring the new ones.
        if let Some(old) = self.sink.take() {
            old.stop();
        }
        if let Ok(mut ring) = self.ring.lock() {
            ring.clear();
        }

        self.total_duration = probe_duration(&path);
        self.channels = channels;
        let sink = Sink::connect_new(self.stream.mixer());
        sink.pause();
        sink.append(AnalyserTap::new(source, Arc::clone(&self.ring)));
        self.seek_base = if start_at > 0.0 {
            Duration::from_secs_f64(start_at)
        } else {
            Duration::ZERO
        };
        self.sink = Some(sink);
        Ok(())
    }

    fn refresh_time(&mut self) {
        let position = self.position().as_secs_f64();
        if let Some(playlist) = self.playlist.as_mut() {
            playlist.set_time(position);
        }
    }

    fn save_state(&mut self) {
        if let Some(playlist) = &self.playlist {
            self.store
                .save(playlist.order(), playlist.index(), playlist.time());
        }
    }
}

/// Track length from the container metadata, where the format provides one.
fn probe_duration(path: &Path) -> Option<Duration> {
    let file = fs::File::open(path).ok()?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .ok()?;
    let reader = probed.format;
    let track = reader.default_track()?;
    let time_base = track.codec_params.time_base?;
    let n_frames = track.codec_params.n_frames?;
    let time = time_base.calc_time(n_frames);
    Some(Duration::from_secs_f64(time.seconds as f64 + time.frac))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn mp3_filter_is_case_insensitive() {
        assert!(is_mp3(Path::new("a.mp3")));
        assert!(is_mp3(Path::new("b.MP3")));
        assert!(!is_mp3(Path::new("c.txt")));
        assert!(!is_mp3(Path::new("no-extension")));
    }

    #[test]
    fn folder_scan_keeps_only_mp3s() {
        let dir = std::env::temp_dir().join(format!("asciiamp-scan-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        for file in ["b.mp3", "a.mp3", "c.txt"] {
            fs::write(dir.join(file), b"").unwrap();
        }
        assert_eq!(scan_folder(&dir).unwrap(), names(&["a.mp3", "b.mp3"]));
    }

    #[test]
    fn fresh_playlist_is_a_shuffled_permutation() {
        let input = names(&["a.mp3", "b.mp3", "c.mp3", "d.mp3", "e.mp3"]);
        let mut rng = StdRng::seed_from_u64(7);
        let playlist = Playlist::from_names(input.clone(), None, &mut rng).unwrap();
        assert_eq!(playlist.index(), 0);
        assert_eq!(playlist.time(), 0.0);
        let mut order = playlist.order().to_vec();
        order.sort();
        assert_eq!(order, input);
    }

    #[test]
    fn shuffle_is_seed_deterministic_but_varies_across_seeds() {
        let input = names(&["a.mp3", "b.mp3", "c.mp3", "d.mp3", "e.mp3", "f.mp3"]);
        let first = Playlist::from_names(input.clone(), None, &mut StdRng::seed_from_u64(1));
        let again = Playlist::from_names(input.clone(), None, &mut StdRng::seed_from_u64(1));
        assert_eq!(first, again);

        let orders: Vec<_> = (0..16)
            .map(|seed| {
                Playlist::from_names(input.clone(), None, &mut StdRng::seed_from_u64(seed))
                    .unwrap()
                    .order()
                    .to_vec()
            })
            .collect();
        assert!(orders.iter().any(|o| o != &orders[0]));
    }

    #[test]
    fn empty_folder_has_no_playlist() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(Playlist::from_names(Vec::new(), None, &mut rng), None);
    }

    #[test]
    fn matching_saved_set_restores_order_index_and_time() {
        let saved = SavedState {
            playlist: names(&["b.mp3", "a.mp3"]),
            index: 1,
            time: 12.5,
        };
        let mut rng = StdRng::seed_from_u64(3);
        let playlist =
            Playlist::from_names(names(&["a.mp3", "b.mp3"]), Some(saved), &mut rng).unwrap();
        assert_eq!(playlist.order(), names(&["b.mp3", "a.mp3"]));
        assert_eq!(playlist.index(), 1);
        assert_eq!(playlist.time(), 12.5);
    }

    #[test]
    fn out_of_range_saved_index_wraps_before_use() {
        let saved = SavedState {
            playlist: names(&["a.mp3", "b.mp3"]),
            index: 5,
            time: 0.0,
        };
        let mut rng = StdRng::seed_from_u64(3);
        let playlist =
            Playlist::from_names(names(&["a.mp3", "b.mp3"]), Some(saved), &mut rng).unwrap();
        assert_eq!(playlist.index(), 1);
    }

    #[test]
    fn mismatched_saved_set_reshuffles_from_zero() {
        let saved = SavedState {
            playlist: names(&["x.mp3", "y.mp3"]),
            index: 1,
            time: 30.0,
        };
        let mut rng = StdRng::seed_from_u64(3);
        let playlist =
            Playlist::from_names(names(&["a.mp3", "b.mp3"]), Some(saved), &mut rng).unwrap();
        assert_eq!(playlist.index(), 0);
        assert_eq!(playlist.time(), 0.0);
        let mut order = playlist.order().to_vec();
        order.sort();
        assert_eq!(order, names(&["a.mp3", "b.mp3"]));
    }

    #[test]
    fn advance_wraps_in_both_directions() {
        let mut playlist =
            Playlist::from_names(names(&["a.mp3"]), None, &mut StdRng::seed_from_u64(0)).unwrap();
        playlist.advance(1);
        assert_eq!(playlist.index(), 0);

        let saved = SavedState {
            playlist: names(&["a.mp3", "b.mp3", "c.mp3"]),
            index: 0,
            time: 0.0,
        };
        let mut playlist = Playlist::from_names(
            names(&["a.mp3", "b.mp3", "c.mp3"]),
            Some(saved),
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap();
        playlist.advance(-1);
        assert_eq!(playlist.index(), 2);
        playlist.advance(4);
        assert_eq!(playlist.index(), 0);
    }

    #[test]
    fn advancing_resets_the_position() {
        let saved = SavedState {
            playlist: names(&["a.mp3", "b.mp3"]),
            index: 0,
            time: 55.0,
        };
        let mut playlist = Playlist::from_names(
            names(&["a.mp3", "b.mp3"]),
            Some(saved),
            &mut StdRng::seed_from_u64(0),
        )
        .unwrap();
        assert_eq!(playlist.time(), 55.0);
        playlist.advance(1);
        assert_eq!(playlist.time(), 0.0);
    }

    #[test]
    fn seek_clamps_at_zero_and_track_end() {
        assert_eq!(clamp_seek(5.0, -10, None), 0.0);
        assert_eq!(clamp_seek(5.0, 10, None), 15.0);
        assert_eq!(clamp_seek(170.0, 10, Some(175.0)), 175.0);
    }

    #[test]
    fn set_time_never_goes_negative() {
        let mut playlist =
            Playlist::from_names(names(&["a.mp3"]), None, &mut StdRng::seed_from_u64(0)).unwrap();
        playlist.set_time(-4.0);
        assert_eq!(playlist.time(), 0.0);
    }
}
