use std::{env, io, path::PathBuf, sync::Arc, time::Duration};

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::{
    DefaultTerminal, Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph},
};

mod error;
mod grid;
mod palette;
mod player;
mod sampler;
mod state;
mod visualizer;

use player::{PlaybackController, PlayerState};
use sampler::FrequencySampler;
use state::StateStore;
use visualizer::{FONT_STEP, VisualizerLoop};

fn config_dir() -> PathBuf {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME") {
        PathBuf::from(dir).join("asciiamp")
    } else if let Some(home) = env::var_os("HOME") {
        PathBuf::from(home).join(".config").join("asciiamp")
    } else {
        PathBuf::from(".asciiamp")
    }
}

struct App {
    controller: PlaybackController,
    sampler: FrequencySampler,
    visualizer: VisualizerLoop,
    // Display sink: replaced wholesale whenever the loop produces a frame.
    vis_text: String,
}

impl App {
    fn new(controller: PlaybackController) -> Self {
        let mut app = App {
            controller,
            sampler: FrequencySampler::new(),
            visualizer: VisualizerLoop::new(),
            vis_text: String::new(),
        };
        app.sync_visualizer();
        app
    }

    /// The render loop runs iff audio is playing.
    fn sync_visualizer(&mut self) {
        if self.controller.is_playing() {
            let (ring, channels) = self.controller.tap();
            // Refreshes the channel count on an already-attached sampler.
            let _ = self.sampler.attach(Arc::clone(&ring), channels);
            self.visualizer.start(&mut self.sampler, Some((ring, channels)));
        } else {
            self.visualizer.stop();
        }
    }

    fn toggle_pause(&mut self) {
        if self.controller.is_playing() {
            self.controller.pause();
        } else {
            self.controller.play();
        }
        self.sync_visualizer();
    }

    /// Resolution controls are live only during playback: the font steps by 2
    /// within [2, 16] and the transform size moves one rung with it.
    fn adjust_resolution(&mut self, direction: i32) {
        if !self.controller.is_playing() {
            return;
        }
        self.visualizer.change_font_size(direction as f32 * FONT_STEP);
        self.sampler.adjust_transform_size(direction);
    }
}

fn main() -> io::Result<()> {
    let folder = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    if !folder.is_dir() {
        eprintln!("Not a directory: {}", folder.display());
        std::process::exit(1);
    }

    let store = StateStore::new(config_dir());
    let controller = match PlaybackController::new(folder, store) {
        Ok(controller) => controller,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    let mut terminal = ratatui::init();
    let mut app = App::new(controller);
    let result = run(&mut terminal, &mut app);
    ratatui::restore();
    result
}

fn run(terminal: &mut DefaultTerminal, app: &mut App) -> io::Result<()> {
    loop {
        terminal.draw(|f| draw(f, app))?;

        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') => break,
                        KeyCode::Char(' ') => app.toggle_pause(),
                        KeyCode::Char('n') => {
                            app.controller.next();
                            app.sync_visualizer();
                        }
                        KeyCode::Char('p') => {
                            app.controller.prev();
                            app.sync_visualizer();
                        }
                        KeyCode::Right => app.controller.seek(10),
                        KeyCode::Left => app.controller.seek(-10),
                        KeyCode::Char('+') | KeyCode::Char('=') => app.adjust_resolution(1),
                        KeyCode::Char('-') | KeyCode::Char('_') => app.adjust_resolution(-1),
                        KeyCode::Char('v') => app.visualizer.layout = app.visualizer.layout.next(),
                        KeyCode::Char('c') => {
                            app.visualizer.palette = app.visualizer.palette.next();
                        }
                        _ => {}
                    }
                }
            }
        }

        app.controller.tick();
        app.sync_visualizer();
    }

    // Persist the final position on the way out.
    app.controller.pause();
    Ok(())
}

fn format_time(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn draw(frame: &mut Frame, app: &mut App) {
    let chunks = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(8),
        Constraint::Length(3),
    ])
    .split(frame.area());

    draw_now_playing(frame, chunks[0], app);
    draw_visualizer(frame, chunks[1], app);
    draw_controls(frame, chunks[2]);
}

fn draw_now_playing(frame: &mut Frame, area: Rect, app: &App) {
    let status = match app.controller.state() {
        PlayerState::Playing => " Playing ",
        PlayerState::Paused | PlayerState::Ready | PlayerState::Loaded => " Paused ",
        PlayerState::NoPlaylist => " ---- ",
    };
    let title = match app.controller.current_title() {
        Some(name) => format!(
            "[{}/{}] {name}",
            app.controller.track_number(),
            app.controller.track_count()
        ),
        None => "No MP3s loaded".to_string(),
    };
    let time = match app.controller.total_duration() {
        Some(total) if app.controller.current_title().is_some() => format!(
            " {} / {} ",
            format_time(app.controller.position()),
            format_time(total)
        ),
        _ => " -:-- / -:-- ".to_string(),
    };

    let paragraph = Paragraph::new(Line::from(vec![
        Span::styled(status, Style::default().fg(Color::Black).bg(Color::Cyan)),
        Span::raw("  "),
        Span::styled(title, Style::default().fg(Color::White)),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .title(" Now Playing ")
            .title(Line::from(time).alignment(Alignment::Right)),
    );
    frame.render_widget(paragraph, area);
}

fn draw_visualizer(frame: &mut Frame, area: Rect, app: &mut App) {
    let title = format!(
        " Visualizer · {} · {} · {}pt · fft {} ",
        app.visualizer.layout.label(),
        app.visualizer.palette.label(),
        app.visualizer.font_size(),
        app.sampler.transform_size(),
    );
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .title(title);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if let Some(text) = app
        .visualizer
        .frame(&mut app.sampler, inner.width, inner.height)
    {
        app.vis_text = text;
    }
    let pane = Paragraph::new(app.vis_text.as_str()).style(Style::default().fg(Color::Green));
    frame.render_widget(pane, inner);
}

fn draw_controls(frame: &mut Frame, area: Rect) {
    let key_style = Style::default().fg(Color::Black).bg(Color::Yellow);
    let help = Paragraph::new(Line::from(vec![
        Span::styled(" Space ", key_style),
        Span::raw(" Play/Pause  "),
        Span::styled(" n/p ", key_style),
        Span::raw(" Next/Prev  "),
        Span::styled(" ←/→ ", key_style),
        Span::raw(" Seek ±10s  "),
        Span::styled(" +/- ", key_style),
        Span::raw(" Vis Res  "),
        Span::styled(" v ", key_style),
        Span::raw(" Layout  "),
        Span::styled(" c ", key_style),
        Span::raw(" Glyphs  "),
        Span::styled(" q ", key_style),
        Span::raw(" Quit"),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .title(" Controls "),
    );
    frame.render_widget(help, area);
}
