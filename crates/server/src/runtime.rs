//! The task that owns the office. Poll ticks, frame ticks, fetch results,
//! push frames and viewer commands all funnel through one `select!` loop,
//! so a merge never lands halfway through a frame.

use crate::push::{run_push_stream, PushConnector, PushEvent};
use anyhow::Context;
use pixel_office_engine::protocol::{Frame, OfficeView, PushFrame};
use pixel_office_engine::render::{self, PluginRegistry};
use pixel_office_engine::snapshot::{self, Snapshot};
use pixel_office_engine::{
    apply_resolution, clock_label, local_now, local_today, merge_records, resolve,
    start_of_day_ms, Office, OfficeConfig, Point, Resolution, SimEvent, SimulationParams,
    StatusSource, Store, TickOutcome,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};

pub const PUSH_STATUS: &str = "live: push";
pub const PUSH_LOST_STATUS: &str = "push: reconnecting";

pub enum Command {
    Select {
        at: Point,
        reply: oneshot::Sender<Option<String>>,
    },
    SetLive {
        enabled: bool,
        reply: oneshot::Sender<OfficeView>,
    },
    SetPush {
        enabled: bool,
        reply: oneshot::Sender<OfficeView>,
    },
    SetRunning {
        running: bool,
        reply: oneshot::Sender<OfficeView>,
    },
    SetSpeed {
        speed: f64,
        reply: oneshot::Sender<OfficeView>,
    },
    SetPluginVisible {
        name: String,
        visible: bool,
        reply: oneshot::Sender<bool>,
    },
    Export {
        reply: oneshot::Sender<anyhow::Result<Snapshot>>,
    },
    Import {
        reply: oneshot::Sender<anyhow::Result<Option<Snapshot>>>,
    },
    Shutdown,
}

/// Cheap to clone; every clone talks to the same runtime task.
#[derive(Clone)]
pub struct OfficeHandle {
    commands: mpsc::Sender<Command>,
    frames: watch::Receiver<Arc<Frame>>,
    view: watch::Receiver<Arc<OfficeView>>,
}

impl OfficeHandle {
    pub fn frames(&self) -> watch::Receiver<Arc<Frame>> {
        self.frames.clone()
    }

    pub fn latest_frame(&self) -> Arc<Frame> {
        self.frames.borrow().clone()
    }

    pub fn view(&self) -> Arc<OfficeView> {
        self.view.borrow().clone()
    }

    pub fn views(&self) -> watch::Receiver<Arc<OfficeView>> {
        self.view.clone()
    }

    async fn ask<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> anyhow::Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| anyhow::anyhow!("office runtime stopped"))?;
        rx.await.context("office runtime dropped the request")
    }

    pub async fn select(&self, at: Point) -> anyhow::Result<Option<String>> {
        self.ask(|reply| Command::Select { at, reply }).await
    }

    pub async fn set_live(&self, enabled: bool) -> anyhow::Result<OfficeView> {
        self.ask(|reply| Command::SetLive { enabled, reply }).await
    }

    pub async fn set_push(&self, enabled: bool) -> anyhow::Result<OfficeView> {
        self.ask(|reply| Command::SetPush { enabled, reply }).await
    }

    pub async fn set_running(&self, running: bool) -> anyhow::Result<OfficeView> {
        self.ask(|reply| Command::SetRunning { running, reply }).await
    }

    /// The stored speed is clamped to the allowed range.
    pub async fn set_speed(&self, speed: f64) -> anyhow::Result<OfficeView> {
        self.ask(|reply| Command::SetSpeed { speed, reply }).await
    }

    /// `false` when no plugin goes by `name`.
    pub async fn set_plugin_visible(&self, name: &str, visible: bool) -> anyhow::Result<bool> {
        let name = name.to_string();
        self.ask(|reply| Command::SetPluginVisible {
            name,
            visible,
            reply,
        })
        .await
    }

    pub async fn export(&self) -> anyhow::Result<Snapshot> {
        self.ask(|reply| Command::Export { reply }).await?
    }

    pub async fn import(&self) -> anyhow::Result<Option<Snapshot>> {
        self.ask(|reply| Command::Import { reply }).await?
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }
}

pub struct OfficeRuntime {
    office: Office,
    plugins: PluginRegistry,
    params: SimulationParams,
    sources: Arc<Vec<Arc<dyn StatusSource>>>,
    connector: Arc<dyn PushConnector>,
    store: Option<Store>,
    rng: StdRng,
    poll_every: Duration,
    frame_every: Duration,
    reconnect_delay: Duration,
    fps: u32,
    fetch_in_flight: bool,
    push_task: Option<JoinHandle<()>>,
    frames_tx: watch::Sender<Arc<Frame>>,
    view_tx: watch::Sender<Arc<OfficeView>>,
}

impl OfficeRuntime {
    pub fn new(
        config: &OfficeConfig,
        sources: Vec<Arc<dyn StatusSource>>,
        connector: Arc<dyn PushConnector>,
        store: Option<Store>,
    ) -> anyhow::Result<Self> {
        let mut office = Office::new(config)?;
        let today = local_today();
        office.roll_day(today);
        if let Some(store) = &store {
            office.completed_today = store
                .completions_since(start_of_day_ms(today))
                .context("count today's completions")?;
        }
        let (frames_tx, _) = watch::channel(Arc::new(Frame::default()));
        let (view_tx, _) = watch::channel(Arc::new(office.view()));
        Ok(Self {
            office,
            plugins: PluginRegistry::standard(config.fps),
            params: config.simulation.clone(),
            sources: Arc::new(sources),
            connector,
            store,
            rng: StdRng::from_entropy(),
            poll_every: config.poll_interval(),
            frame_every: config.frame_interval(),
            reconnect_delay: config.push_reconnect_delay(),
            fps: config.fps,
            fetch_in_flight: false,
            push_task: None,
            frames_tx,
            view_tx,
        })
    }

    /// Fixes the simulation's randomness.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn spawn(self) -> OfficeHandle {
        let (tx, rx) = mpsc::channel(32);
        let handle = OfficeHandle {
            commands: tx,
            frames: self.frames_tx.subscribe(),
            view: self.view_tx.subscribe(),
        };
        tokio::spawn(self.run(rx));
        handle
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let (fetch_tx, mut fetch_rx) = mpsc::channel::<Resolution>(4);
        let (push_tx, mut push_rx) = mpsc::channel::<PushEvent>(32);

        let mut poll = tokio::time::interval(self.poll_every);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut frames = self.office.running.then(|| self.frame_interval());
        if self.office.push {
            self.start_push(&push_tx);
        }
        tracing::info!(
            live = self.office.live,
            push = self.office.push,
            sources = self.sources.len(),
            "office runtime started"
        );

        loop {
            tokio::select! {
                _ = poll.tick() => self.on_poll(&fetch_tx),
                Some(resolution) = fetch_rx.recv() => self.on_resolution(resolution),
                Some(event) = push_rx.recv() => self.on_push(event),
                _ = next_frame(&mut frames) => self.on_frame(),
                cmd = commands.recv() => match cmd {
                    None | Some(Command::Shutdown) => break,
                    Some(cmd) => self.on_command(cmd, &push_tx, &mut frames),
                },
            }
        }

        self.stop_push();
        tracing::info!("office runtime stopped");
    }

    fn frame_interval(&self) -> Interval {
        let mut i = tokio::time::interval(self.frame_every);
        i.set_missed_tick_behavior(MissedTickBehavior::Skip);
        i
    }

    fn publish_view(&self) {
        self.view_tx.send_replace(Arc::new(self.office.view()));
    }

    fn on_poll(&mut self, fetch_tx: &mpsc::Sender<Resolution>) {
        if self.office.roll_day(local_today()) {
            tracing::info!("new day; completed counter reset");
        }
        if !self.office.live {
            self.apply(Resolution::Offline);
            return;
        }
        if self.fetch_in_flight {
            return;
        }
        self.fetch_in_flight = true;
        let sources = self.sources.clone();
        let tx = fetch_tx.clone();
        tokio::spawn(async move {
            let resolution = resolve(true, &sources).await;
            let _ = tx.send(resolution).await;
        });
    }

    fn on_resolution(&mut self, resolution: Resolution) {
        self.fetch_in_flight = false;
        if !self.office.live {
            return;
        }
        self.apply(resolution);
    }

    fn apply(&mut self, resolution: Resolution) {
        let clock = clock_label(local_now());
        let outcome = apply_resolution(
            &mut self.office,
            resolution,
            &self.params,
            &clock,
            &mut self.rng,
        );
        match outcome {
            TickOutcome::Merged { source, report } => {
                tracing::debug!(
                    %source,
                    applied = report.applied,
                    unknown = report.unknown_ids.len(),
                    "status merged"
                );
            }
            TickOutcome::Simulated { events } => self.record_events(&events),
        }
        self.publish_view();
    }

    fn record_events(&mut self, events: &[SimEvent]) {
        self.plugins.observe(&self.office, events);
        let Some(store) = &self.store else {
            return;
        };
        for event in events {
            if let SimEvent::Completed { id, finished, .. } = event {
                if let Err(e) = store.record_completion(id, finished) {
                    tracing::warn!(error = %e, "record completion");
                }
            }
        }
    }

    fn on_push(&mut self, event: PushEvent) {
        match event {
            PushEvent::Opened => {
                tracing::info!("push stream open");
                self.office.set_status_line(PUSH_STATUS);
                self.publish_view();
            }
            PushEvent::Frame(PushFrame::Connected { .. }) => tracing::debug!("push stream greeted"),
            PushEvent::Frame(PushFrame::Update { data, .. }) => {
                let Some(data) = data else {
                    return;
                };
                let report = merge_records(&mut self.office, &data.characters);
                if !report.is_noop() {
                    self.office.set_status_line(PUSH_STATUS);
                }
                self.publish_view();
            }
            PushEvent::Lost(reason) => {
                tracing::debug!(%reason, "push stream lost");
                self.office.set_status_line(PUSH_LOST_STATUS);
                self.publish_view();
            }
        }
    }

    fn on_frame(&mut self) {
        if let Some(frame) = render::step(&mut self.office, &mut self.plugins) {
            let n = frame.frame;
            self.frames_tx.send_replace(Arc::new(frame));
            if n % u64::from(self.fps.max(1)) == 0 {
                self.publish_view();
            }
        }
    }

    fn start_push(&mut self, push_tx: &mpsc::Sender<PushEvent>) {
        if self.push_task.is_some() {
            return;
        }
        self.push_task = Some(tokio::spawn(run_push_stream(
            self.connector.clone(),
            self.reconnect_delay,
            push_tx.clone(),
        )));
    }

    /// Aborting the task also drops any pending reconnect.
    fn stop_push(&mut self) {
        if let Some(task) = self.push_task.take() {
            task.abort();
        }
    }

    fn on_command(
        &mut self,
        cmd: Command,
        push_tx: &mpsc::Sender<PushEvent>,
        frames: &mut Option<Interval>,
    ) {
        match cmd {
            Command::Select { at, reply } => {
                let hit = self.office.select_at(at).map(str::to_string);
                self.publish_view();
                let _ = reply.send(hit);
            }
            Command::SetLive { enabled, reply } => {
                self.office.live = enabled;
                tracing::info!(enabled, "live mode");
                self.publish_view();
                let _ = reply.send(self.office.view());
            }
            Command::SetPush { enabled, reply } => {
                self.office.push = enabled;
                if enabled {
                    self.start_push(push_tx);
                } else {
                    self.stop_push();
                }
                tracing::info!(enabled, "push stream");
                self.publish_view();
                let _ = reply.send(self.office.view());
            }
            Command::SetRunning { running, reply } => {
                if running && !self.office.running {
                    self.office.running = true;
                    *frames = Some(self.frame_interval());
                } else if !running {
                    self.office.running = false;
                    *frames = None;
                }
                self.publish_view();
                let _ = reply.send(self.office.view());
            }
            Command::SetSpeed { speed, reply } => {
                let stored = self.office.set_game_speed(speed);
                tracing::info!(requested = speed, speed = stored, "game speed");
                self.publish_view();
                let _ = reply.send(self.office.view());
            }
            Command::SetPluginVisible {
                name,
                visible,
                reply,
            } => {
                let found = self.plugins.set_visible(&name, visible);
                tracing::debug!(%name, visible, found, "plugin visibility");
                let _ = reply.send(found);
            }
            Command::Export { reply } => {
                let res = match &self.store {
                    Some(store) => snapshot::export(&self.office, store),
                    None => Err(anyhow::anyhow!("no store configured")),
                };
                let _ = reply.send(res);
            }
            Command::Import { reply } => {
                let res = match &self.store {
                    Some(store) => snapshot::import(&mut self.office, store),
                    None => Err(anyhow::anyhow!("no store configured")),
                };
                self.publish_view();
                let _ = reply.send(res);
            }
            Command::Shutdown => {}
        }
    }
}

async fn next_frame(frames: &mut Option<Interval>) {
    match frames {
        Some(i) => {
            i.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
