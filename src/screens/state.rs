/// Dashboard state machine
///
/// Everything the dashboard knows lives here and changes only through
/// `handle`, one event at a time. Runtime I/O is requested by returning
/// `Command`s; results come back as `DashboardMessage`s. Keeping the terminal
/// and the runtime out of this type is what makes it testable.

use crossterm::event::KeyCode;
use std::collections::{HashMap, VecDeque};

use crate::core::collector::CollectionBatch;
use crate::core::events::changes_roster;
use crate::core::metrics::ContainerMetrics;
use crate::core::profiler::{ProfileReport, Recommendation};
use crate::core::runtime::{ContainerEvent, ContainerSummary, LogEntry};
use crate::utils::{LOG_VIEW_LINES, RECENT_EVENTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Start,
    Stop,
    Restart,
}

impl LifecycleAction {
    pub fn verb(&self) -> &'static str {
        match self {
            LifecycleAction::Start => "start",
            LifecycleAction::Stop => "stop",
            LifecycleAction::Restart => "restart",
        }
    }
}

/// Work the terminal loop performs on the dashboard's behalf
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Poll,
    Lifecycle(LifecycleAction, String),
    StartProfile(String),
    StopProfile,
    FollowLogs(String),
    StopLogs,
    Quit,
}

/// Results of commands and runtime notifications
#[derive(Debug)]
pub enum DashboardMessage {
    Polled {
        containers: Vec<ContainerSummary>,
        batch: CollectionBatch,
    },
    PollFailed(String),
    ActionFinished {
        action: LifecycleAction,
        container_id: String,
        result: Result<(), String>,
    },
    Event(ContainerEvent),
    ProfileProgress {
        container_id: String,
        samples: usize,
    },
    ProfileFinished(ProfileReport),
    LogLine(LogEntry),
    LogsEnded {
        container_id: String,
    },
}

#[derive(Debug)]
pub enum DashboardEvent {
    Tick,
    Input(KeyCode),
    Message(DashboardMessage),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerRow {
    pub summary: ContainerSummary,
    /// Last successful sample; `None` until the first one
    pub metrics: Option<ContainerMetrics>,
    /// True when `metrics` did not refresh on the latest poll
    pub stale: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProfileStatus {
    Idle,
    Running {
        container_id: String,
        name: String,
        samples: usize,
    },
    Finished {
        container_id: String,
        name: String,
        samples: usize,
        recommendation: Option<Recommendation>,
    },
}

/// Output of the container being followed
#[derive(Debug, Clone, PartialEq)]
pub struct LogView {
    pub container_id: String,
    pub name: String,
    pub lines: VecDeque<LogEntry>,
    /// The runtime closed the log stream
    pub ended: bool,
}

#[derive(Debug)]
pub struct DashboardState {
    rows: Vec<ContainerRow>,
    cursor: usize,
    selected: Option<String>,
    status: Option<String>,
    poll_in_flight: bool,
    repoll: bool,
    profile: ProfileStatus,
    events: VecDeque<ContainerEvent>,
    logs: Option<LogView>,
    polls: u64,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}

impl DashboardState {
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            cursor: 0,
            selected: None,
            status: None,
            poll_in_flight: false,
            repoll: false,
            profile: ProfileStatus::Idle,
            events: VecDeque::with_capacity(RECENT_EVENTS),
            logs: None,
            polls: 0,
        }
    }

    pub fn handle(&mut self, event: DashboardEvent) -> Vec<Command> {
        match event {
            DashboardEvent::Tick => self.request_poll(),
            DashboardEvent::Input(key) => self.on_key(key),
            DashboardEvent::Message(message) => self.on_message(message),
        }
    }

    pub fn rows(&self) -> &[ContainerRow] {
        &self.rows
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn selected_row(&self) -> Option<&ContainerRow> {
        self.rows.get(self.cursor)
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn profile(&self) -> &ProfileStatus {
        &self.profile
    }

    /// Most recent runtime events, oldest first
    pub fn events(&self) -> &VecDeque<ContainerEvent> {
        &self.events
    }

    pub fn logs(&self) -> Option<&LogView> {
        self.logs.as_ref()
    }

    /// Completed polls, successful or not
    pub fn polls(&self) -> u64 {
        self.polls
    }

    pub fn running_count(&self) -> usize {
        self.rows.iter().filter(|r| r.summary.state.is_running()).count()
    }

    fn request_poll(&mut self) -> Vec<Command> {
        if self.poll_in_flight {
            // the poll in flight may predate whatever prompted this one
            self.repoll = true;
            return Vec::new();
        }
        self.poll_in_flight = true;
        vec![Command::Poll]
    }

    fn on_key(&mut self, key: KeyCode) -> Vec<Command> {
        match key {
            KeyCode::Char('q') | KeyCode::Esc => vec![Command::Quit],
            KeyCode::Up | KeyCode::Char('k') => {
                self.move_cursor(-1);
                Vec::new()
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.move_cursor(1);
                Vec::new()
            }
            KeyCode::Char('r') => {
                self.status = Some("Refreshing...".to_string());
                self.request_poll()
            }
            KeyCode::Char('s') => self.lifecycle(LifecycleAction::Start),
            KeyCode::Char('x') => self.lifecycle(LifecycleAction::Stop),
            KeyCode::Char('R') => self.lifecycle(LifecycleAction::Restart),
            KeyCode::Char('p') => self.toggle_profile(),
            KeyCode::Char('l') => self.toggle_logs(),
            _ => Vec::new(),
        }
    }

    fn move_cursor(&mut self, delta: isize) {
        if self.rows.is_empty() {
            return;
        }
        let last = self.rows.len() - 1;
        self.cursor = self.cursor.saturating_add_signed(delta).min(last);
        self.selected = Some(self.rows[self.cursor].summary.id.clone());
    }

    fn lifecycle(&mut self, action: LifecycleAction) -> Vec<Command> {
        let Some(row) = self.selected_row() else {
            return Vec::new();
        };
        let id = row.summary.id.clone();
        let name = row.summary.name.clone();
        self.status = Some(format!("Requesting {} of {}...", action.verb(), name));
        vec![Command::Lifecycle(action, id)]
    }

    fn toggle_profile(&mut self) -> Vec<Command> {
        if matches!(self.profile, ProfileStatus::Running { .. }) {
            self.status = Some("Stopping profiling session...".to_string());
            return vec![Command::StopProfile];
        }

        let Some(row) = self.selected_row() else {
            return Vec::new();
        };
        if !row.summary.state.is_running() {
            self.status = Some(format!("{} is not running", row.summary.name));
            return Vec::new();
        }

        let id = row.summary.id.clone();
        let name = row.summary.name.clone();
        self.status = Some(format!("Profiling {} (press p to finish)", name));
        self.profile = ProfileStatus::Running {
            container_id: id.clone(),
            name,
            samples: 0,
        };
        vec![Command::StartProfile(id)]
    }

    fn toggle_logs(&mut self) -> Vec<Command> {
        if self.logs.take().is_some() {
            return vec![Command::StopLogs];
        }

        let Some(row) = self.selected_row() else {
            return Vec::new();
        };
        let id = row.summary.id.clone();
        let name = row.summary.name.clone();
        self.logs = Some(LogView {
            container_id: id.clone(),
            name,
            lines: VecDeque::new(),
            ended: false,
        });
        vec![Command::FollowLogs(id)]
    }

    fn on_message(&mut self, message: DashboardMessage) -> Vec<Command> {
        match message {
            DashboardMessage::Polled { containers, batch } => {
                self.poll_in_flight = false;
                self.polls += 1;
                self.apply_poll(containers, batch);
                self.take_repoll()
            }
            DashboardMessage::PollFailed(reason) => {
                self.poll_in_flight = false;
                self.polls += 1;
                self.status = Some(format!("No fresh data this tick: {}", reason));
                self.take_repoll()
            }
            DashboardMessage::ActionFinished {
                action,
                container_id,
                result,
            } => {
                let name = self.name_of(&container_id);
                self.status = Some(match result {
                    Ok(()) => format!("✓ {} {}", capitalize(action.verb()), name),
                    Err(e) => format!("✗ Failed to {} {}: {}", action.verb(), name, e),
                });
                self.request_poll()
            }
            DashboardMessage::Event(event) => {
                if event.action == "destroy" {
                    self.remove_row(&event.container_id);
                }
                let commands = if changes_roster(&event.action) {
                    self.request_poll()
                } else {
                    Vec::new()
                };
                if self.events.len() == RECENT_EVENTS {
                    self.events.pop_front();
                }
                self.events.push_back(event);
                commands
            }
            DashboardMessage::LogLine(entry) => {
                if let Some(view) = self.logs.as_mut().filter(|v| v.container_id == entry.container_id) {
                    if view.lines.len() == LOG_VIEW_LINES {
                        view.lines.pop_front();
                    }
                    view.lines.push_back(entry);
                }
                Vec::new()
            }
            DashboardMessage::LogsEnded { container_id } => {
                if let Some(view) = self.logs.as_mut().filter(|v| v.container_id == container_id) {
                    view.ended = true;
                }
                Vec::new()
            }
            DashboardMessage::ProfileProgress { container_id, samples } => {
                if let ProfileStatus::Running {
                    container_id: current,
                    samples: count,
                    ..
                } = &mut self.profile
                {
                    if *current == container_id {
                        *count = samples;
                    }
                }
                Vec::new()
            }
            DashboardMessage::ProfileFinished(report) => {
                let name = self.name_of(&report.container_id);
                self.status = Some(match &report.recommendation {
                    Some(rec) => format!("Profiling of {} finished. {}", name, rec.reason()),
                    None => format!("Profiling of {} collected no samples", name),
                });
                self.profile = ProfileStatus::Finished {
                    container_id: report.container_id,
                    name,
                    samples: report.samples,
                    recommendation: report.recommendation,
                };
                Vec::new()
            }
        }
    }

    fn take_repoll(&mut self) -> Vec<Command> {
        if std::mem::take(&mut self.repoll) {
            self.request_poll()
        } else {
            Vec::new()
        }
    }

    fn apply_poll(&mut self, containers: Vec<ContainerSummary>, batch: CollectionBatch) {
        let mut fresh: HashMap<String, ContainerMetrics> = batch
            .metrics
            .into_iter()
            .map(|m| (m.container_id.clone(), m))
            .collect();
        let vanished: Vec<&String> = batch
            .failed
            .iter()
            .filter(|(_, e)| e.is_not_found())
            .map(|(id, _)| id)
            .collect();
        let mut previous: HashMap<String, ContainerRow> = self
            .rows
            .drain(..)
            .map(|row| (row.summary.id.clone(), row))
            .collect();

        let mut rows: Vec<ContainerRow> = containers
            .into_iter()
            .filter(|summary| !vanished.contains(&&summary.id))
            .map(|summary| {
                let old = previous.remove(&summary.id).and_then(|row| row.metrics);
                match fresh.remove(&summary.id) {
                    Some(metrics) => ContainerRow {
                        summary,
                        metrics: Some(metrics),
                        stale: false,
                    },
                    None => ContainerRow {
                        stale: old.is_some(),
                        metrics: old,
                        summary,
                    },
                }
            })
            .collect();
        rows.sort_by(|a, b| a.summary.name.cmp(&b.summary.name).then(a.summary.id.cmp(&b.summary.id)));
        self.rows = rows;
        self.restore_cursor();

        let failed = batch.failed.len() - vanished.len();
        if failed > 0 {
            self.status = Some(format!("{} container(s) failed to refresh, showing last known values", failed));
        } else if self.status.as_deref().is_some_and(|s| s.starts_with("No fresh data") || s == "Refreshing...") {
            self.status = None;
        }
    }

    fn remove_row(&mut self, container_id: &str) {
        self.rows.retain(|row| row.summary.id != container_id);
        self.restore_cursor();
    }

    /// Follow the selected container by id; clamp when it is gone
    fn restore_cursor(&mut self) {
        if self.rows.is_empty() {
            self.cursor = 0;
            return;
        }
        if let Some(idx) = self
            .selected
            .as_ref()
            .and_then(|id| self.rows.iter().position(|row| &row.summary.id == id))
        {
            self.cursor = idx;
        } else {
            self.cursor = self.cursor.min(self.rows.len() - 1);
        }
        self.selected = Some(self.rows[self.cursor].summary.id.clone());
    }

    fn name_of(&self, container_id: &str) -> String {
        self.rows
            .iter()
            .find(|row| row.summary.id == container_id)
            .map(|row| row.summary.name.clone())
            .unwrap_or_else(|| crate::utils::short_id(container_id).to_string())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::MonitorError;
    use crate::core::metrics::{derive_metrics, fixtures};
    use crate::utils::LifecycleState;
    use chrono::Utc;

    fn summary(id: &str, state: LifecycleState) -> ContainerSummary {
        ContainerSummary {
            id: id.to_string(),
            name: format!("{}-name", id),
            image: "alpine:3".to_string(),
            state,
            status: String::new(),
        }
    }

    fn metrics(id: &str, cpu: f64) -> ContainerMetrics {
        let raw = fixtures::sample(id, 0, 0, 1, 0);
        let mut m = derive_metrics(&fixtures::identity(id), &raw, None);
        m.cpu_percent = cpu;
        m
    }

    fn polled(ids: &[&str], ok: &[(&str, f64)], failed: Vec<(&str, MonitorError)>) -> DashboardEvent {
        DashboardEvent::Message(DashboardMessage::Polled {
            containers: ids.iter().map(|id| summary(id, LifecycleState::Running)).collect(),
            batch: CollectionBatch {
                listed: ids.iter().map(|id| id.to_string()).collect(),
                metrics: ok.iter().map(|(id, cpu)| metrics(id, *cpu)).collect(),
                failed: failed.into_iter().map(|(id, e)| (id.to_string(), e)).collect(),
            },
        })
    }

    fn event(id: &str, action: &str) -> DashboardEvent {
        DashboardEvent::Message(DashboardMessage::Event(ContainerEvent {
            container_id: id.to_string(),
            container_name: format!("{}-name", id),
            kind: "container".to_string(),
            action: action.to_string(),
            timestamp: Utc::now(),
            attributes: Default::default(),
        }))
    }

    fn ready(ids: &[&str]) -> DashboardState {
        let mut state = DashboardState::new();
        state.handle(DashboardEvent::Tick);
        let ok: Vec<(&str, f64)> = ids.iter().map(|id| (*id, 1.0)).collect();
        state.handle(polled(ids, &ok, vec![]));
        state
    }

    #[test]
    fn test_tick_polls_once_while_in_flight() {
        let mut state = DashboardState::new();
        assert_eq!(state.handle(DashboardEvent::Tick), vec![Command::Poll]);
        assert!(state.handle(DashboardEvent::Tick).is_empty());

        // the deferred request fires when the poll lands
        assert_eq!(state.handle(polled(&["a"], &[("a", 1.0)], vec![])), vec![Command::Poll]);
        assert!(state.handle(polled(&["a"], &[("a", 1.0)], vec![])).is_empty());
        assert_eq!(state.polls(), 2);
    }

    #[test]
    fn test_cursor_follows_container_identity() {
        let mut state = ready(&["b", "c"]);
        state.handle(DashboardEvent::Input(KeyCode::Down));
        assert_eq!(state.selected_row().unwrap().summary.id, "c");

        // "a" sorts before "c"; selection stays on "c"
        state.handle(DashboardEvent::Tick);
        state.handle(polled(&["a", "b", "c"], &[("a", 1.0), ("b", 1.0), ("c", 1.0)], vec![]));
        assert_eq!(state.cursor(), 2);
        assert_eq!(state.selected_row().unwrap().summary.id, "c");
    }

    #[test]
    fn test_cursor_clamps_when_selected_disappears() {
        let mut state = ready(&["a", "b", "c"]);
        state.handle(DashboardEvent::Input(KeyCode::Char('j')));
        state.handle(DashboardEvent::Input(KeyCode::Char('j')));
        assert_eq!(state.cursor(), 2);

        state.handle(DashboardEvent::Tick);
        state.handle(polled(&["a", "b"], &[("a", 1.0), ("b", 1.0)], vec![]));
        assert_eq!(state.cursor(), 1);
        assert_eq!(state.selected_row().unwrap().summary.id, "b");

        state.handle(DashboardEvent::Input(KeyCode::Down));
        assert_eq!(state.cursor(), 1);
        state.handle(DashboardEvent::Input(KeyCode::Up));
        state.handle(DashboardEvent::Input(KeyCode::Up));
        assert_eq!(state.cursor(), 0);
    }

    #[test]
    fn test_failed_refresh_keeps_last_known_good() {
        let mut state = ready(&["a", "b"]);
        state.handle(DashboardEvent::Tick);
        state.handle(polled(
            &["a", "b"],
            &[("a", 5.0)],
            vec![("b", MonitorError::RuntimeUnavailable("timeout".into()))],
        ));

        let b = &state.rows()[1];
        assert_eq!(b.summary.id, "b");
        assert_eq!(b.metrics.as_ref().unwrap().cpu_percent, 1.0);
        assert!(b.stale);
        assert!(!state.rows()[0].stale);
        assert!(state.status().unwrap().contains("1 container(s) failed"));
    }

    #[test]
    fn test_not_found_drops_the_row() {
        let mut state = ready(&["a", "b"]);
        state.handle(DashboardEvent::Tick);
        state.handle(polled(
            &["a", "b"],
            &[("a", 5.0)],
            vec![("b", MonitorError::NotFound("b".into()))],
        ));
        assert_eq!(state.rows().len(), 1);
        assert!(state.status().is_none());
    }

    #[test]
    fn test_row_without_sample_shows_no_data() {
        let mut state = DashboardState::new();
        state.handle(DashboardEvent::Tick);
        state.handle(polled(
            &["a"],
            &[],
            vec![("a", MonitorError::RuntimeUnavailable("timeout".into()))],
        ));
        assert!(state.rows()[0].metrics.is_none());
        assert!(!state.rows()[0].stale);
    }

    #[test]
    fn test_failed_poll_is_not_fatal() {
        let mut state = ready(&["a"]);
        state.handle(DashboardEvent::Tick);
        let commands = state.handle(DashboardEvent::Message(DashboardMessage::PollFailed(
            "daemon unreachable".into(),
        )));
        assert!(commands.is_empty());
        assert_eq!(state.rows().len(), 1);
        assert!(state.status().unwrap().starts_with("No fresh data"));

        // next good poll clears the notice
        state.handle(DashboardEvent::Tick);
        state.handle(polled(&["a"], &[("a", 2.0)], vec![]));
        assert!(state.status().is_none());
    }

    #[test]
    fn test_lifecycle_keys_and_repoll() {
        let mut state = ready(&["a"]);
        assert_eq!(
            state.handle(DashboardEvent::Input(KeyCode::Char('x'))),
            vec![Command::Lifecycle(LifecycleAction::Stop, "a".into())]
        );
        assert_eq!(
            state.handle(DashboardEvent::Input(KeyCode::Char('R'))),
            vec![Command::Lifecycle(LifecycleAction::Restart, "a".into())]
        );

        let commands = state.handle(DashboardEvent::Message(DashboardMessage::ActionFinished {
            action: LifecycleAction::Stop,
            container_id: "a".into(),
            result: Ok(()),
        }));
        assert_eq!(commands, vec![Command::Poll]);
        assert_eq!(state.status(), Some("✓ Stop a-name"));
    }

    #[test]
    fn test_keys_without_rows_do_nothing() {
        let mut state = DashboardState::new();
        assert!(state.handle(DashboardEvent::Input(KeyCode::Char('s'))).is_empty());
        assert!(state.handle(DashboardEvent::Input(KeyCode::Char('p'))).is_empty());
        assert!(state.handle(DashboardEvent::Input(KeyCode::Down)).is_empty());
        assert_eq!(state.handle(DashboardEvent::Input(KeyCode::Esc)), vec![Command::Quit]);
    }

    #[test]
    fn test_destroy_event_removes_row_and_polls() {
        let mut state = ready(&["a", "b"]);
        assert_eq!(state.handle(event("b", "destroy")), vec![Command::Poll]);
        assert_eq!(state.rows().len(), 1);
        assert!(state.handle(event("a", "exec_start")).is_empty());
    }

    #[test]
    fn test_profile_session_flow() {
        let mut state = ready(&["a"]);
        assert_eq!(
            state.handle(DashboardEvent::Input(KeyCode::Char('p'))),
            vec![Command::StartProfile("a".into())]
        );
        assert_eq!(state.status(), Some("Profiling a-name (press p to finish)"));
        assert!(matches!(state.profile(), ProfileStatus::Running { name, samples: 0, .. } if name == "a-name"));

        state.handle(DashboardEvent::Message(DashboardMessage::ProfileProgress {
            container_id: "a".into(),
            samples: 3,
        }));
        assert!(matches!(state.profile(), ProfileStatus::Running { samples: 3, .. }));

        assert_eq!(
            state.handle(DashboardEvent::Input(KeyCode::Char('p'))),
            vec![Command::StopProfile]
        );

        let rec = Recommendation {
            cpu_limit: 0.1,
            memory_limit_mb: 128,
            p95_cpu: 0.0,
            p95_memory_mb: 10,
            basis_count: 3,
        };
        state.handle(DashboardEvent::Message(DashboardMessage::ProfileFinished(ProfileReport {
            container_id: "a".into(),
            samples: 3,
            recommendation: Some(rec.clone()),
        })));
        match state.profile() {
            ProfileStatus::Finished { name, recommendation, .. } => {
                assert_eq!(name, "a-name");
                assert_eq!(recommendation.as_ref(), Some(&rec));
            }
            other => panic!("unexpected profile status {:?}", other),
        }
    }

    #[test]
    fn test_profile_refuses_stopped_container() {
        let mut state = DashboardState::new();
        state.handle(DashboardEvent::Tick);
        state.handle(DashboardEvent::Message(DashboardMessage::Polled {
            containers: vec![summary("a", LifecycleState::Stopped)],
            batch: CollectionBatch::default(),
        }));
        assert!(state.handle(DashboardEvent::Input(KeyCode::Char('p'))).is_empty());
        assert_eq!(state.profile(), &ProfileStatus::Idle);
    }

    fn log_line(id: &str, message: &str) -> DashboardEvent {
        DashboardEvent::Message(DashboardMessage::LogLine(LogEntry {
            container_id: id.to_string(),
            timestamp: Utc::now(),
            stream: "stdout".to_string(),
            message: message.to_string(),
        }))
    }

    #[test]
    fn test_keeps_last_ten_events() {
        let mut state = ready(&["a"]);
        for n in 0..RECENT_EVENTS + 3 {
            state.handle(event(&format!("c{}", n), "exec_start"));
        }

        let events = state.events();
        assert_eq!(events.len(), RECENT_EVENTS);
        assert_eq!(events.front().map(|e| e.container_id.as_str()), Some("c3"));
        assert_eq!(
            events.back().map(|e| e.container_id.clone()),
            Some(format!("c{}", RECENT_EVENTS + 2))
        );
    }

    #[test]
    fn test_log_toggle_follows_selected_container() {
        let mut state = ready(&["a", "b"]);
        state.handle(DashboardEvent::Input(KeyCode::Down));

        assert_eq!(
            state.handle(DashboardEvent::Input(KeyCode::Char('l'))),
            vec![Command::FollowLogs("b".into())]
        );
        state.handle(log_line("b", "listening"));
        state.handle(log_line("a", "not followed"));

        let view = state.logs().unwrap();
        assert_eq!(view.name, "b-name");
        assert_eq!(view.lines.len(), 1);
        assert_eq!(view.lines[0].message, "listening");

        state.handle(DashboardEvent::Message(DashboardMessage::LogsEnded {
            container_id: "b".into(),
        }));
        assert!(state.logs().unwrap().ended);

        assert_eq!(
            state.handle(DashboardEvent::Input(KeyCode::Char('l'))),
            vec![Command::StopLogs]
        );
        assert!(state.logs().is_none());
    }

    #[test]
    fn test_log_view_is_bounded() {
        let mut state = ready(&["a"]);
        state.handle(DashboardEvent::Input(KeyCode::Char('l')));
        for n in 0..LOG_VIEW_LINES + 5 {
            state.handle(log_line("a", &format!("line {}", n)));
        }

        let view = state.logs().unwrap();
        assert_eq!(view.lines.len(), LOG_VIEW_LINES);
        assert_eq!(view.lines[0].message, "line 5");
    }
}
