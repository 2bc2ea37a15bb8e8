use crate::shared::{BEATS_PER_PHRASE, DisplayState, LayerDisplay};
use ratatui::layout::{Layout, Direction, Constraint, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph};
use ratatui::Frame;

pub fn render(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // track + transport
            Constraint::Length(5), // 1..8 count row
            Constraint::Length(8), // layer mixer
            Constraint::Min(1),    // message line
        ])
        .split(area);

    draw_screen(frame, sections[0], state);
    draw_count_row(frame, sections[1], state);
    draw_layers(frame, sections[2], state);
    draw_message(frame, sections[3], state);
}

fn fmt_time(secs: f64) -> String {
    let secs = secs.max(0.0);
    format!("{}:{:05.2}", (secs / 60.0) as u64, secs % 60.0)
}

fn draw_screen(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Length(3)])
        .split(area);

    let title = Line::from(vec![
        Span::styled(format!(" {} ", state.status), Style::default().fg(Color::Black).bg(Color::LightMagenta)),
        Span::raw(format!("  {}", state.track)),
        Span::styled(
            format!("   voice: {}", state.voice_filter.label()),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    frame.render_widget(Paragraph::new(title), rows[0]);

    let ratio = if state.duration > 0.0 { (state.current_time / state.duration).clamp(0.0, 1.0) } else { 0.0 };
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL))
        .gauge_style(Style::default().fg(Color::Magenta))
        .ratio(ratio)
        .label(format!("{} / {}", fmt_time(state.current_time), fmt_time(state.duration)));
    frame.render_widget(gauge, rows[1]);
}

// one cell per count; the current one is lit, bridges light up in a
// different color so the dancer can see the count is held
fn draw_count_row(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Ratio(1, BEATS_PER_PHRASE as u32); BEATS_PER_PHRASE as usize])
        .split(area);

    for (i, cell) in cols.iter().enumerate() {
        let number = i as u8 + 1;
        let lit = state.beat_number == Some(number);
        let style = match (lit, state.is_bridge) {
            (true, false) => Style::default().fg(Color::LightMagenta).bg(Color::Magenta).add_modifier(Modifier::BOLD),
            (true, true) => Style::default().fg(Color::Black).bg(Color::Yellow),
            (false, _) => Style::default().fg(Color::DarkGray),
        };
        let block = Block::default().borders(Borders::ALL).border_style(style).style(style);
        let label = Paragraph::new(number.to_string()).block(block).centered();
        frame.render_widget(label, *cell);
    }
}

fn layer_line(l: &LayerDisplay, selected: bool) -> Line<'static> {
    let marker = if selected { ">" } else { " " };
    let state = match (l.loaded, l.enabled) {
        (false, _) => "--",
        (true, true) => "on",
        (true, false) => "off",
    };
    let filled = (l.volume as usize) / 10;
    let bar = format!("{}{}", "#".repeat(filled), ".".repeat(10 - filled.min(10)));
    let style = if !l.loaded {
        Style::default().fg(Color::DarkGray)
    } else if selected {
        Style::default().fg(Color::LightMagenta)
    } else {
        Style::default()
    };
    Line::styled(format!("{marker} {:<9} {:<3} {bar} {:>3}", l.layer.label(), state, l.volume), style)
}

fn draw_layers(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let lines: Vec<Line> = state
        .layers
        .iter()
        .map(|l| layer_line(l, l.layer == state.selected_layer))
        .collect();
    let block = Block::default().borders(Borders::ALL).title(" layers ");
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_message(frame: &mut Frame, area: Rect, state: &DisplayState) {
    if state.message.is_empty() {
        return;
    }
    frame.render_widget(Paragraph::new(state.message.as_str()).style(Style::default().fg(Color::Red)), area);
}
