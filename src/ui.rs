use crate::app::App;
use crate::queue::TrackQueue;
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use std::time::Duration;

const APP_TITLE: &str = "termdeck";
pub const FOOTER: &str = "Press q to quit, ? to toggle help";

pub const HELP_LINES: [&str; 15] = [
    "(k) or (arrow up) up",
    "(j) or (arrow down) down",
    "(f) next track",
    "(F) previous track",
    "([) volume down",
    "(]) volume up",
    "(p) pause/unpause",
    "(c) clear track queue",
    "(r) restart current track",
    "(R) restart queue",
    "(<Space>) add track to queue",
    "(d) remove track from queue",
    "(<Enter>) enter directory",
    "(-) directory up",
    "(q) or (Ctrl+C) quit",
];

#[derive(Clone, Copy)]
struct Palette {
    bg: Color,
    panel_bg: Color,
    border: Color,
    text: Color,
    muted: Color,
    accent: Color,
    alert: Color,
    selected_bg: Color,
}

const COLORS: Palette = Palette {
    bg: Color::Rgb(10, 15, 24),
    panel_bg: Color::Rgb(19, 29, 43),
    border: Color::Rgb(69, 121, 176),
    text: Color::Rgb(214, 228, 248),
    muted: Color::Rgb(149, 173, 204),
    accent: Color::Rgb(100, 203, 184),
    alert: Color::Rgb(249, 174, 88),
    selected_bg: Color::Rgb(34, 55, 82),
};

pub fn draw(frame: &mut Frame, app: &App) {
    let colors = COLORS;
    frame.render_widget(
        Block::default().style(Style::default().bg(colors.bg)),
        frame.area(),
    );

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(6),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    let queue = app.queue();
    let header = Paragraph::new(vec![
        Line::from(Span::styled(
            header_text(queue),
            Style::default().fg(colors.text).add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            timeline_text(queue, 24),
            Style::default().fg(colors.accent),
        )),
    ])
    .block(panel_block(APP_TITLE, colors.panel_bg, colors.text, colors.border));
    frame.render_widget(header, vertical[0]);

    if app.show_help {
        draw_help(frame, vertical[1], &colors);
    } else {
        draw_browser(frame, vertical[1], app, &colors);
    }

    let status = Paragraph::new(Span::styled(
        app.status.as_str(),
        Style::default().fg(colors.alert),
    ))
    .block(panel_block("Status", colors.panel_bg, colors.text, colors.border));
    frame.render_widget(status, vertical[2]);

    frame.render_widget(
        Paragraph::new(Span::styled(FOOTER, Style::default().fg(colors.muted))),
        vertical[3],
    );
}

fn draw_browser(frame: &mut Frame, area: Rect, app: &App, colors: &Palette) {
    let browser = app.browser();
    let window = browser.window();
    let items: Vec<ListItem> = window
        .clone()
        .map(|index| {
            let style = if index == browser.cursor() {
                Style::default().fg(colors.accent)
            } else {
                Style::default().fg(colors.text)
            };
            ListItem::new(Span::styled(row_text(app, index), style))
        })
        .collect();

    let mut state = ListState::default();
    state.select(
        (!browser.is_empty()).then_some(browser.cursor().saturating_sub(window.start)),
    );

    let title = browser.dir().display().to_string();
    let list = List::new(items)
        .block(panel_block(
            &title,
            colors.panel_bg,
            colors.text,
            colors.border,
        ))
        .highlight_style(Style::default().bg(colors.selected_bg));
    frame.render_stateful_widget(list, area, &mut state);
}

fn draw_help(frame: &mut Frame, area: Rect, colors: &Palette) {
    let lines: Vec<Line> = HELP_LINES
        .iter()
        .map(|line| Line::from(Span::styled(*line, Style::default().fg(colors.text))))
        .collect();
    frame.render_widget(
        Paragraph::new(lines).block(panel_block(
            "controls",
            colors.panel_bg,
            colors.text,
            colors.border,
        )),
        area,
    );
}

pub fn header_text(queue: &TrackQueue) -> String {
    let mut text = format!("volume: {}%", queue.percent());
    if let Some(track) = queue.current() {
        text.push_str(&format!(", playing: {}", track.name()));
    }
    if queue.paused() {
        text.push_str(" [paused]");
    }
    if queue.muted() {
        text.push_str(" [muted]");
    }
    text
}

/// `> [*] name`: cursor column, then `*` for the current track or `>` for any
/// other queued track.
pub fn row_text(app: &App, index: usize) -> String {
    let browser = app.browser();
    let Some(name) = browser.entries().get(index) else {
        return String::new();
    };
    let cursor = if index == browser.cursor() { '>' } else { ' ' };
    let queue = app.queue();
    let mark = match queue
        .tracks()
        .iter()
        .position(|track| track.name() == *name)
    {
        Some(found) if found == queue.current_index() => '*',
        Some(_) => '>',
        None => ' ',
    };
    format!("{cursor} [{mark}] {name}")
}

fn timeline_text(queue: &TrackQueue, width: usize) -> String {
    let Some(track) = queue.current() else {
        return String::new();
    };
    let rate = f64::from(track.sample_rate().max(1));
    let elapsed = Duration::from_secs_f64(track.position() as f64 / rate);
    let total = track
        .length()
        .map(|frames| Duration::from_secs_f64(frames as f64 / rate));
    let ratio = total.and_then(|total| {
        let total_secs = total.as_secs_f64();
        (total_secs > 0.0).then_some(elapsed.as_secs_f64() / total_secs)
    });
    format!(
        "{} / {} {}",
        format_duration(elapsed),
        total
            .map(format_duration)
            .unwrap_or_else(|| String::from("--:--")),
        progress_bar(ratio, width)
    )
}

fn panel_block(title: &str, bg: Color, text: Color, border: Color) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .title(Span::styled(
            format!(" {title} "),
            Style::default().fg(text).add_modifier(Modifier::BOLD),
        ))
        .border_style(Style::default().fg(border))
        .style(Style::default().bg(bg))
}

fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{minutes:02}:{seconds:02}")
}

fn progress_bar(ratio: Option<f64>, width: usize) -> String {
    let clamped = ratio.unwrap_or(0.0).clamp(0.0, 1.0);
    let filled = (clamped * width as f64).round() as usize;
    let mut bar = String::with_capacity(width + 2);
    bar.push('[');
    bar.push_str(&"#".repeat(filled));
    bar.push_str(&"-".repeat(width.saturating_sub(filled)));
    bar.push(']');
    bar
}
