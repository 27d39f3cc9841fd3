/// Main dashboard screen

use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, Wrap},
    Frame,
};

use super::state::{ContainerRow, DashboardState, LogView, ProfileStatus};
use crate::core::runtime::ContainerEvent;
use crate::utils::{format_bytes, format_rate, truncate_string, LifecycleState};

pub fn render(frame: &mut Frame, state: &DashboardState) {
    let profile_height = match state.profile() {
        ProfileStatus::Idle => 0,
        ProfileStatus::Running { .. } => 3,
        ProfileStatus::Finished { .. } => 6,
    };

    let logs_height = if state.logs().is_some() { 12 } else { 0 };
    let events_height = match state.events().len() {
        0 => 0,
        n => n.min(5) as u16 + 2,
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(5),
            Constraint::Length(profile_height),
            Constraint::Length(logs_height),
            Constraint::Length(events_height),
            Constraint::Length(3),
        ])
        .split(frame.size());

    render_summary(frame, chunks[0], state);
    render_table(frame, chunks[1], state);
    if profile_height > 0 {
        render_profile(frame, chunks[2], state.profile());
    }
    if let Some(view) = state.logs() {
        render_logs(frame, chunks[3], view);
    }
    if events_height > 0 {
        render_events(frame, chunks[4], state);
    }
    render_footer(frame, chunks[5], state);
}

fn render_summary(frame: &mut Frame, area: Rect, state: &DashboardState) {
    let total = state.rows().len();
    let running = state.running_count();

    let summary = Paragraph::new(Line::from(vec![
        Span::styled("Containers: ", Style::default().fg(Color::White)),
        Span::styled(
            format!("{}/{} running", running, total),
            if running == total {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            },
        ),
        Span::raw("  |  "),
        Span::styled(format!("{} polls", state.polls()), Style::default().fg(Color::Cyan)),
    ]))
    .block(Block::default().borders(Borders::ALL).title("cm-monitor"));

    frame.render_widget(summary, area);
}

fn state_color(state: LifecycleState) -> Color {
    match state {
        LifecycleState::Running => Color::Green,
        LifecycleState::Paused => Color::Yellow,
        LifecycleState::Restarting => Color::Cyan,
        LifecycleState::Created => Color::Blue,
        LifecycleState::Stopped => Color::Gray,
        LifecycleState::Dead => Color::Red,
        LifecycleState::Unknown => Color::White,
    }
}

fn threshold_color(percent: f64) -> Color {
    if percent > 80.0 {
        Color::Red
    } else if percent > 60.0 {
        Color::Yellow
    } else {
        Color::White
    }
}

fn metric_cells(row: &ContainerRow) -> Vec<Cell<'static>> {
    let Some(m) = &row.metrics else {
        return (0..6)
            .map(|_| Cell::from(Span::styled("no data", Style::default().fg(Color::DarkGray))))
            .collect();
    };
    let dim = |color: Color| {
        if row.stale {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default().fg(color)
        }
    };

    // CPU is relative to one core, so scale the thresholds by core count
    let cpu_share = m.cpu_percent / m.cpu_count.max(1) as f64;

    vec![
        Cell::from(Span::styled(format!("{:.1}%", m.cpu_percent), dim(threshold_color(cpu_share)))),
        Cell::from(Span::styled(
            format!("{} ({:.0}%)", format_bytes(m.memory_used), m.memory_percent),
            dim(threshold_color(m.memory_percent)),
        )),
        Cell::from(Span::styled(
            format!("↓{} ↑{}", format_rate(m.network_rx_rate), format_rate(m.network_tx_rate)),
            dim(Color::White),
        )),
        Cell::from(Span::styled(
            format!("R {} W {}", format_rate(m.block_read_rate), format_rate(m.block_write_rate)),
            dim(Color::White),
        )),
        Cell::from(Span::styled(m.pids.to_string(), dim(Color::White))),
        Cell::from(Span::styled(m.timestamp.format("%H:%M:%S").to_string(), dim(Color::Gray))),
    ]
}

fn render_table(frame: &mut Frame, area: Rect, state: &DashboardState) {
    let header = Row::new(vec!["Container", "State", "CPU", "Memory", "Network", "Block I/O", "PIDs", "Sampled"])
        .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))
        .bottom_margin(1);

    let rows: Vec<Row> = state
        .rows()
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            let mut cells = vec![
                Cell::from(truncate_string(&row.summary.name, 24)),
                Cell::from(Span::styled(
                    row.summary.state.as_str(),
                    Style::default().fg(state_color(row.summary.state)),
                )),
            ];
            cells.extend(metric_cells(row));

            let table_row = Row::new(cells);
            if idx == state.cursor() {
                table_row.style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
            } else {
                table_row
            }
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(24), // Container
            Constraint::Length(11), // State
            Constraint::Length(8),  // CPU
            Constraint::Length(20), // Memory
            Constraint::Length(26), // Network
            Constraint::Length(26), // Block I/O
            Constraint::Length(6),  // PIDs
            Constraint::Min(8),     // Sampled
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title("Containers"));

    frame.render_widget(table, area);
}

fn render_profile(frame: &mut Frame, area: Rect, profile: &ProfileStatus) {
    let lines = match profile {
        ProfileStatus::Idle => Vec::new(),
        ProfileStatus::Running { name, samples, .. } => vec![Line::from(vec![
            Span::styled("● ", Style::default().fg(Color::Red)),
            Span::raw(format!("Profiling {}: {} samples", name, samples)),
        ])],
        ProfileStatus::Finished {
            name,
            samples,
            recommendation: Some(rec),
            ..
        } => vec![
            Line::from(Span::styled(
                format!("Recommendation for {} ({} samples)", name, samples),
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(format!("CPU limit:    {:.2}%  (P95 {:.2}%)", rec.cpu_limit, rec.p95_cpu)),
            Line::from(format!("Memory limit: {} MB  (P95 {} MB)", rec.memory_limit_mb, rec.p95_memory_mb)),
            Line::from(Span::styled(rec.reason(), Style::default().fg(Color::Gray))),
        ],
        ProfileStatus::Finished { name, .. } => vec![Line::from(Span::styled(
            format!("No samples were collected for {}", name),
            Style::default().fg(Color::Yellow),
        ))],
    };

    let paragraph = Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL).title("Profile"));
    frame.render_widget(paragraph, area);
}

fn render_logs(frame: &mut Frame, area: Rect, view: &LogView) {
    let visible = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = view
        .lines
        .iter()
        .skip(view.lines.len().saturating_sub(visible))
        .map(|entry| {
            let color = if entry.stream == "stderr" { Color::Red } else { Color::White };
            Line::from(vec![
                Span::styled(entry.timestamp.format("%H:%M:%S ").to_string(), Style::default().fg(Color::DarkGray)),
                Span::styled(entry.message.clone(), Style::default().fg(color)),
            ])
        })
        .collect();

    let title = if view.ended {
        format!("Logs: {} (stream ended)", view.name)
    } else {
        format!("Logs: {}", view.name)
    };
    let paragraph = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(paragraph, area);
}

fn event_color(action: &str) -> Color {
    match action {
        "start" | "unpause" | "create" => Color::Green,
        "die" | "kill" | "oom" | "destroy" => Color::Red,
        _ => Color::Yellow,
    }
}

fn event_line(event: &ContainerEvent) -> Line<'static> {
    let name = if event.container_name.is_empty() {
        crate::utils::short_id(&event.container_id).to_string()
    } else {
        event.container_name.clone()
    };
    Line::from(vec![
        Span::styled(event.timestamp.format("%H:%M:%S ").to_string(), Style::default().fg(Color::DarkGray)),
        Span::styled(format!("{:<10}", event.action), Style::default().fg(event_color(&event.action))),
        Span::raw(name),
    ])
}

fn render_events(frame: &mut Frame, area: Rect, state: &DashboardState) {
    let events = state.events();
    let visible = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = events.iter().skip(events.len().saturating_sub(visible)).map(event_line).collect();

    let paragraph = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Recent events"));
    frame.render_widget(paragraph, area);
}

fn render_footer(frame: &mut Frame, area: Rect, state: &DashboardState) {
    let line = match state.status() {
        Some(status) => Line::from(Span::styled(status.to_string(), Style::default().fg(Color::Yellow))),
        None => Line::from(vec![
            Span::styled("↑↓/jk", Style::default().fg(Color::Cyan)),
            Span::raw(" move  "),
            Span::styled("s", Style::default().fg(Color::Cyan)),
            Span::raw(" start  "),
            Span::styled("x", Style::default().fg(Color::Cyan)),
            Span::raw(" stop  "),
            Span::styled("R", Style::default().fg(Color::Cyan)),
            Span::raw(" restart  "),
            Span::styled("p", Style::default().fg(Color::Cyan)),
            Span::raw(" profile  "),
            Span::styled("l", Style::default().fg(Color::Cyan)),
            Span::raw(" logs  "),
            Span::styled("r", Style::default().fg(Color::Cyan)),
            Span::raw(" refresh  "),
            Span::styled("q", Style::default().fg(Color::Cyan)),
            Span::raw(" quit"),
        ]),
    };

    frame.render_widget(Paragraph::new(line).block(Block::default().borders(Borders::ALL)), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::collector::CollectionBatch;
    use crate::core::runtime::ContainerSummary;
    use crate::screens::state::{DashboardEvent, DashboardMessage};
    use ratatui::{backend::TestBackend, Terminal};

    fn buffer_text(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_renders_rows_without_data() {
        let mut state = DashboardState::new();
        state.handle(DashboardEvent::Tick);
        state.handle(DashboardEvent::Message(DashboardMessage::Polled {
            containers: vec![ContainerSummary {
                id: "abc".into(),
                name: "web".into(),
                image: "nginx".into(),
                state: LifecycleState::Running,
                status: "Up 1 minute".into(),
            }],
            batch: CollectionBatch::default(),
        }));

        let mut terminal = Terminal::new(TestBackend::new(140, 20)).unwrap();
        terminal.draw(|f| render(f, &state)).unwrap();

        let text = buffer_text(&terminal);
        assert!(text.contains("web"));
        assert!(text.contains("no data"));
        assert!(text.contains("1/1 running"));
    }

    #[test]
    fn test_renders_events_and_logs_panels() {
        use crate::core::runtime::{ContainerEvent, LogEntry};
        use chrono::Utc;
        use crossterm::event::KeyCode;

        let mut state = DashboardState::new();
        state.handle(DashboardEvent::Tick);
        state.handle(DashboardEvent::Message(DashboardMessage::Polled {
            containers: vec![ContainerSummary {
                id: "abc".into(),
                name: "web".into(),
                image: "nginx".into(),
                state: LifecycleState::Running,
                status: "Up 1 minute".into(),
            }],
            batch: CollectionBatch::default(),
        }));
        state.handle(DashboardEvent::Message(DashboardMessage::Event(ContainerEvent {
            container_id: "abc".into(),
            container_name: "web".into(),
            kind: "container".into(),
            action: "exec_start".into(),
            timestamp: Utc::now(),
            attributes: Default::default(),
        })));
        state.handle(DashboardEvent::Input(KeyCode::Char('l')));
        state.handle(DashboardEvent::Message(DashboardMessage::LogLine(LogEntry {
            container_id: "abc".into(),
            timestamp: Utc::now(),
            stream: "stdout".into(),
            message: "GET /healthz 200".into(),
        })));

        let mut terminal = Terminal::new(TestBackend::new(140, 30)).unwrap();
        terminal.draw(|f| render(f, &state)).unwrap();

        let text = buffer_text(&terminal);
        assert!(text.contains("Recent events"));
        assert!(text.contains("exec_start"));
        assert!(text.contains("Logs: web"));
        assert!(text.contains("GET /healthz 200"));
    }
}
