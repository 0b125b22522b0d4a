use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use waypoint_core::logger::{COLOR_BLUE, COLOR_GRAY, COLOR_GREEN};
use waypoint_core::types::{OrchestratorState, TaskEntry};

use crate::App;

fn key(k: &'static str) -> Span<'static> {
    Span::styled(k, Style::default().fg(Color::Yellow))
}

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = if app.log_visible {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(f.area())
    } else {
        Layout::default()
            .constraints([Constraint::Percentage(100)])
            .split(f.area())
    };

    let run = *app.run_state.lock().unwrap_or_else(|p| p.into_inner());
    let (label, accent) = match run {
        OrchestratorState::Running => ("RUNNING (Press S to stop)", Color::Green),
        OrchestratorState::Stopping => ("STOPPING...", Color::Yellow),
        OrchestratorState::Stopped => ("STOPPED (Press S to start)", Color::Red),
    };

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(0)])
        .split(chunks[0]);
    draw_banner(f, left[0], label, accent);

    let mut lines: Vec<Line<'static>> = vec![
        Line::from(vec![
            key(" j"),
            Span::raw("/"),
            key("k"),
            Span::raw("/"),
            key("space"),
            Span::raw(" to select, "),
            key("r"),
            Span::raw(" to restart, "),
            key("c"),
            Span::raw(" to audit, "),
            key("l"),
            Span::raw(" for logs:"),
        ]),
        Line::from(""),
    ];
    {
        let entries = app.state.lock().unwrap_or_else(|p| p.into_inner());
        for (i, entry) in entries.iter().enumerate() {
            task_lines(&mut lines, entry, i == app.selected, accent);
        }
    }
    let task_list = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::LEFT | Borders::RIGHT | Borders::BOTTOM)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(task_list, left[1]);

    if app.log_visible && chunks.len() > 1 {
        draw_logs(f, chunks[1], app);
    }
}

fn draw_banner(f: &mut Frame, area: Rect, label: &str, bg: Color) {
    let width = area.width as usize;
    let pad = width.saturating_sub(label.len());
    let text = format!("{}{}{}", " ".repeat(pad / 2), label, " ".repeat(pad - pad / 2));
    let banner = Paragraph::new(Line::from(Span::styled(
        text,
        Style::default().fg(Color::Black).bg(bg).add_modifier(Modifier::BOLD),
    )));
    f.render_widget(banner, area);
}

/// Header line per task; enabled tasks also list their windows.
fn task_lines(lines: &mut Vec<Line<'static>>, entry: &TaskEntry, selected: bool, accent: Color) {
    let mut spans = vec![
        Span::raw(if selected { "> " } else { "  " }),
        Span::styled(if entry.enabled { "[x]" } else { "[ ]" }, Style::default().fg(accent)),
        Span::raw(" "),
        Span::styled(entry.name.clone(), Style::default().fg(Color::White).add_modifier(Modifier::BOLD)),
    ];
    if let Some(err) = &entry.error {
        spans.push(Span::styled(format!("  {}", err), Style::default().fg(Color::Red)));
    } else if !entry.description.is_empty() {
        spans.push(Span::styled(format!("  {}", entry.description), Style::default().fg(Color::DarkGray)));
    }
    lines.push(Line::from(spans));

    if !entry.enabled {
        return;
    }
    for inst in &entry.instances {
        let (status, color) = match &inst.error {
            Some(e) => (format!(" err: {}", e), Color::Red),
            None if inst.status.is_empty() => (String::new(), Color::Cyan),
            None => (format!(" {}", inst.status), Color::Cyan),
        };
        lines.push(Line::from(vec![
            Span::styled(format!("    {} ", inst.window_title), Style::default().fg(Color::Yellow)),
            Span::styled(format!("#{}", inst.window_id), Style::default().fg(Color::DarkGray)),
            Span::styled(status, Style::default().fg(color)),
        ]));
    }
}

fn draw_logs(f: &mut Frame, area: Rect, app: &App) {
    let visible = area.height.saturating_sub(2) as usize;
    let total = app.log_messages.len();
    let scroll = app.log_scroll.min(total.saturating_sub(visible));
    let start = total.saturating_sub(visible + scroll);
    let end = total.saturating_sub(scroll);
    let log_lines: Vec<Line> = app.log_messages[start..end].iter().map(|m| parse_log_line(m)).collect();

    let panel = Paragraph::new(log_lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Logs ")
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(panel, area);
}

/// Parse a structured log line (level\x1fprefix\x1fcolor\x1ftimestamp\x1fmessage)
/// into a colored Line.
fn parse_log_line(raw: &str) -> Line<'_> {
    let parts: Vec<&str> = raw.splitn(5, '\x1f').collect();
    let [level, prefix, color, timestamp, message] = parts[..] else {
        return Line::from(raw);
    };

    let color = match color.parse::<u8>().unwrap_or(0) {
        COLOR_GRAY => Color::DarkGray,
        COLOR_BLUE => Color::LightBlue,
        COLOR_GREEN => Color::LightGreen,
        _ => Color::White,
    };

    let mut spans = vec![Span::styled(timestamp, Style::default().fg(Color::DarkGray)), Span::raw(" ")];
    match level {
        "ERROR" => spans.push(Span::styled("error ", Style::default().fg(Color::Red))),
        "WARN" => spans.push(Span::styled("warn ", Style::default().fg(Color::Yellow))),
        _ => {}
    }
    if !prefix.is_empty() {
        spans.push(Span::styled(prefix, Style::default().fg(color).add_modifier(Modifier::BOLD)));
        spans.push(Span::raw(" "));
    }
    spans.push(Span::styled(message, Style::default().fg(color)));
    Line::from(spans)
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_core::logger::{format_console_line, Level};

    fn text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_parse_structured_line() {
        let raw = format_console_line(Level::Warn, "nav", COLOR_GREEN, "12:00:01", "expected [map], saw [home]");
        let line = parse_log_line(&raw);
        assert_eq!(text(&line), "12:00:01 warn nav expected [map], saw [home]");
        assert_eq!(line.spans.last().unwrap().style.fg, Some(Color::LightGreen));
    }

    #[test]
    fn test_parse_plain_line() {
        let line = parse_log_line("just text");
        assert_eq!(text(&line), "just text");
    }
}
