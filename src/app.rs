/// Main TUI application

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::collector::MetricsCollector;
use crate::core::events::watch_events;
use crate::core::profiler::profile_container;
use crate::core::runtime::LifecycleControl;
use crate::screens::dashboard;
use crate::screens::state::{Command, DashboardEvent, DashboardMessage, DashboardState, LifecycleAction};
use crate::utils::{AppConfig, LOG_FOLLOW_TAIL};

pub struct App {
    state: DashboardState,
    collector: MetricsCollector,
    lifecycle: Arc<dyn LifecycleControl>,
    config: AppConfig,
    messages_tx: UnboundedSender<DashboardMessage>,
    messages_rx: UnboundedReceiver<DashboardMessage>,
    profile_cancel: Option<CancellationToken>,
    logs_cancel: Option<CancellationToken>,
    cancel: CancellationToken,
    last_tick: Instant,
    should_quit: bool,
}

impl App {
    pub fn new(collector: MetricsCollector, lifecycle: Arc<dyn LifecycleControl>, config: AppConfig) -> Self {
        let (messages_tx, messages_rx) = unbounded_channel();
        Self {
            state: DashboardState::new(),
            collector,
            lifecycle,
            config,
            messages_tx,
            messages_rx,
            profile_cancel: None,
            logs_cancel: None,
            cancel: CancellationToken::new(),
            last_tick: Instant::now(),
            should_quit: false,
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        // Setup terminal
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        self.spawn_event_forwarder();
        self.dispatch(DashboardEvent::Tick);

        let result = self.run_loop(&mut terminal).await;

        self.cancel.cancel();

        // Restore terminal
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    async fn run_loop<B: ratatui::backend::Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        let refresh_interval = self.config.refresh_interval();

        loop {
            // Results from background work (non-blocking)
            while let Ok(message) = self.messages_rx.try_recv() {
                self.dispatch(DashboardEvent::Message(message));
            }

            if self.last_tick.elapsed() >= refresh_interval {
                self.last_tick = Instant::now();
                self.dispatch(DashboardEvent::Tick);
            }

            terminal.draw(|f| dashboard::render(f, &self.state))?;

            if event::poll(Duration::from_millis(100))? {
                if let Event::Key(key_event) = event::read()? {
                    if key_event.kind == KeyEventKind::Press {
                        self.dispatch(DashboardEvent::Input(key_event.code));
                    }
                }
            }

            if self.should_quit {
                break;
            }

            // let background tasks make progress between frames
            tokio::task::yield_now().await;
        }

        Ok(())
    }

    fn dispatch(&mut self, event: DashboardEvent) {
        for command in self.state.handle(event) {
            self.execute(command);
        }
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Poll => self.spawn_poll(),
            Command::Lifecycle(action, container_id) => self.spawn_lifecycle(action, container_id),
            Command::StartProfile(container_id) => self.spawn_profile(container_id),
            Command::StopProfile => {
                if let Some(token) = self.profile_cancel.take() {
                    token.cancel();
                }
            }
            Command::FollowLogs(container_id) => self.spawn_logs(container_id),
            Command::StopLogs => {
                if let Some(token) = self.logs_cancel.take() {
                    token.cancel();
                }
            }
            Command::Quit => {
                if let Some(token) = self.profile_cancel.take() {
                    token.cancel();
                }
                self.should_quit = true;
            }
        }
    }

    fn spawn_poll(&self) {
        let collector = self.collector.clone();
        let tx = self.messages_tx.clone();

        tokio::spawn(async move {
            let polled = async {
                let (containers, batch) = tokio::try_join!(
                    collector.runtime().list_containers(true),
                    collector.collect_batch(),
                )?;
                collector.retain(&batch.listed).await;
                Ok::<_, crate::core::MonitorError>((containers, batch))
            };

            let message = match polled.await {
                Ok((containers, batch)) => DashboardMessage::Polled { containers, batch },
                Err(e) => DashboardMessage::PollFailed(e.to_string()),
            };
            let _ = tx.send(message);
        });
    }

    fn spawn_lifecycle(&self, action: LifecycleAction, container_id: String) {
        let lifecycle = self.lifecycle.clone();
        let tx = self.messages_tx.clone();

        tokio::spawn(async move {
            let result = match action {
                LifecycleAction::Start => lifecycle.start(&container_id).await,
                LifecycleAction::Stop => lifecycle.stop(&container_id).await,
                LifecycleAction::Restart => lifecycle.restart(&container_id).await,
            };
            info!(container = %container_id, action = action.verb(), ok = result.is_ok(), "lifecycle request finished");
            let _ = tx.send(DashboardMessage::ActionFinished {
                action,
                container_id,
                result: result.map_err(|e| e.to_string()),
            });
        });
    }

    fn spawn_profile(&mut self, container_id: String) {
        if let Some(previous) = self.profile_cancel.take() {
            previous.cancel();
        }
        let token = self.cancel.child_token();
        self.profile_cancel = Some(token.clone());

        let collector = self.collector.clone();
        let tx = self.messages_tx.clone();
        let duration = self.config.profile.duration();
        let interval = self.config.profile.interval();

        tokio::spawn(async move {
            let progress_tx = tx.clone();
            let progress_id = container_id.clone();
            let report = profile_container(&collector, &container_id, duration, interval, token, |samples, _| {
                let _ = progress_tx.send(DashboardMessage::ProfileProgress {
                    container_id: progress_id.clone(),
                    samples,
                });
            })
            .await;
            debug!(container = %container_id, samples = report.samples, "profiling session ended");
            let _ = tx.send(DashboardMessage::ProfileFinished(report));
        });
    }

    fn spawn_logs(&mut self, container_id: String) {
        if let Some(previous) = self.logs_cancel.take() {
            previous.cancel();
        }
        let token = self.cancel.child_token();
        self.logs_cancel = Some(token.clone());

        let mut lines = self.collector.runtime().logs(&container_id, LOG_FOLLOW_TAIL);
        let tx = self.messages_tx.clone();

        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = token.cancelled() => return,
                    next = lines.next() => next,
                };
                match next {
                    Some(Ok(entry)) => {
                        if tx.send(DashboardMessage::LogLine(entry)).is_err() {
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!(container = %container_id, error = %e, "log follow ended");
                        break;
                    }
                    None => break,
                }
            }
            let _ = tx.send(DashboardMessage::LogsEnded { container_id });
        });
    }

    fn spawn_event_forwarder(&self) {
        let mut events = watch_events(self.collector.clone(), self.cancel.clone());
        let tx = self.messages_tx.clone();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if tx.send(DashboardMessage::Event(event)).is_err() {
                    break;
                }
            }
        });
    }
}
