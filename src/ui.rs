use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Gauge, Paragraph, Widget},
};

use crate::engine::{SessionSnapshot, SessionSummary};
use crate::session::{GameType, MatchResult, SessionPhase};

const HORIZONTAL_MARGIN: u16 = 2;
const CELL_WIDTH: u16 = 7;
const CELL_HEIGHT: u16 = 3;

/// Everything one frame of the play screen shows.
#[derive(Debug, Clone)]
pub struct GameView<'a> {
    pub snapshot: &'a SessionSnapshot,
    /// Letter most recently spoken by the caption synthesizer.
    pub caption: Option<char>,
    pub summary: Option<&'a SessionSummary>,
}

impl<'a> GameView<'a> {
    pub fn new(snapshot: &'a SessionSnapshot) -> Self {
        Self {
            snapshot,
            caption: None,
            summary: None,
        }
    }

    pub fn with_caption(mut self, caption: Option<char>) -> Self {
        self.caption = caption;
        self
    }

    pub fn with_summary(mut self, summary: Option<&'a SessionSummary>) -> Self {
        self.summary = summary;
        self
    }
}

fn result_style(result: MatchResult) -> Style {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    match result {
        MatchResult::None => bold.add_modifier(Modifier::DIM),
        MatchResult::Correct => bold.fg(Color::Green),
        MatchResult::Incorrect => bold.fg(Color::Red),
    }
}

impl Widget for &GameView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if self.snapshot.is_game_over {
            render_results(self, area, buf);
        } else if self.snapshot.phase == SessionPhase::Idle {
            Paragraph::new(Span::styled(
                "Press r to start",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD | Modifier::ITALIC),
            ))
            .alignment(Alignment::Center)
            .render(area, buf);
        } else {
            render_running(self, area, buf);
        }
    }
}

fn render_running(view: &GameView<'_>, area: Rect, buf: &mut Buffer) {
    let snapshot = view.snapshot;
    let config = &snapshot.game_state.config;
    let dim = Style::default().add_modifier(Modifier::DIM);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .constraints([
            Constraint::Length(1), // header
            Constraint::Length(1), // progress
            Constraint::Min(3),    // board
            Constraint::Length(1), // results
            Constraint::Length(1), // legend
        ])
        .split(area);

    Paragraph::new(Line::from(vec![
        Span::styled(
            format!("{} {}-back", config.game_type, config.n_back),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!(
                "   score {}   highscore {}   matches {}",
                snapshot.score, snapshot.highscore, snapshot.total_matches
            ),
            dim,
        ),
    ]))
    .render(chunks[0], buf);

    let step = snapshot.game_state.event_index.map_or(0, |i| i + 1);
    Gauge::default()
        .gauge_style(Style::default().fg(Color::Magenta))
        .ratio(f64::from(snapshot.progress.clamp(0.0, 1.0)))
        .label(format!("{step}/{}", config.number_of_events))
        .render(chunks[1], buf);

    let board = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(9)])
        .split(chunks[2]);

    if config.game_type.uses_visual() {
        render_grid(
            config.grid_size,
            snapshot.game_state.visual_value,
            snapshot.visual_result,
            board[0],
            buf,
        );
    }
    if config.game_type.uses_audio() {
        let letter = view.caption.map_or(String::from(" "), String::from);
        Paragraph::new(Span::styled(letter, result_style(snapshot.audio_result)))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title("audio"))
            .render(board[1], buf);
    }

    let mut results = Vec::new();
    if config.game_type.uses_visual() {
        results.push(Span::styled(
            format!("visual: {:?}  ", snapshot.visual_result),
            result_style(snapshot.visual_result),
        ));
    }
    if config.game_type.uses_audio() {
        results.push(Span::styled(
            format!("audio: {:?}", snapshot.audio_result),
            result_style(snapshot.audio_result),
        ));
    }
    Paragraph::new(Line::from(results))
        .alignment(Alignment::Center)
        .render(chunks[3], buf);

    Paragraph::new(Span::styled(legend(config.game_type), dim.add_modifier(Modifier::ITALIC)))
        .alignment(Alignment::Center)
        .render(chunks[4], buf);
}

fn legend(game_type: GameType) -> &'static str {
    match game_type {
        GameType::Audio => "(a)udio match / (q)uit",
        GameType::Visual => "(l)ocation match / (q)uit",
        GameType::AudioVisual => "(a)udio match / (l)ocation match / (q)uit",
    }
}

fn render_grid(
    grid_size: usize,
    active: Option<u32>,
    result: MatchResult,
    area: Rect,
    buf: &mut Buffer,
) {
    let side = u16::try_from(grid_size).unwrap_or(u16::MAX);
    let width = side.saturating_mul(CELL_WIDTH).min(area.width);
    let height = side.saturating_mul(CELL_HEIGHT).min(area.height);
    let origin = Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    };

    let highlight = match result {
        MatchResult::None => Color::Blue,
        MatchResult::Correct => Color::Green,
        MatchResult::Incorrect => Color::Red,
    };

    for row in 0..side {
        for col in 0..side {
            let cell = Rect {
                x: origin.x + col * CELL_WIDTH,
                y: origin.y + row * CELL_HEIGHT,
                width: CELL_WIDTH,
                height: CELL_HEIGHT,
            }
            .intersection(origin);
            if cell.is_empty() {
                continue;
            }
            // Stimulus v lights cell v - 1 in row-major order.
            let index = u32::from(row) * u32::from(side) + u32::from(col) + 1;
            let lit = active == Some(index);
            let style = if lit {
                Style::default().bg(highlight)
            } else {
                Style::default().add_modifier(Modifier::DIM)
            };
            Block::default()
                .borders(Borders::ALL)
                .style(style)
                .render(cell, buf);
        }
    }
}

fn render_results(view: &GameView<'_>, area: Rect, buf: &mut Buffer) {
    let snapshot = view.snapshot;
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .split(area);

    Paragraph::new(Span::styled(
        format!("{} / {} matches", snapshot.score, snapshot.total_matches),
        bold,
    ))
    .alignment(Alignment::Center)
    .render(chunks[1], buf);

    let new_highscore = view.summary.is_some_and(|s| s.new_highscore);
    let highscore_line = if new_highscore {
        Span::styled(
            format!("new highscore: {}", snapshot.highscore),
            bold.fg(Color::Green),
        )
    } else {
        Span::styled(
            format!("highscore: {}", snapshot.highscore),
            Style::default().add_modifier(Modifier::DIM),
        )
    };
    Paragraph::new(highscore_line)
        .alignment(Alignment::Center)
        .render(chunks[2], buf);

    let config = &snapshot.game_state.config;
    Paragraph::new(Span::styled(
        format!(
            "{} | {}-back | {} events | {} ms",
            config.game_type,
            config.n_back,
            config.number_of_events,
            config.event_interval.as_millis()
        ),
        Style::default().add_modifier(Modifier::DIM),
    ))
    .alignment(Alignment::Center)
    .render(chunks[3], buf);

    Paragraph::new(Span::styled(
        "(r)etry / (q)uit",
        Style::default().add_modifier(Modifier::ITALIC | Modifier::DIM),
    ))
    .alignment(Alignment::Center)
    .render(chunks[5], buf);
}
