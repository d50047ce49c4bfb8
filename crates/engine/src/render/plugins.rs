use super::{palette, Canvas, Rect, FONT_BOLD, FONT_SMALL};
use crate::office::Office;
use crate::simulate::SimEvent;
use crate::zone::Point;
use pixel_office_protocol::TextAlign;
use std::collections::{BTreeMap, VecDeque};

/// Advances once per frame during the update phase.
pub trait Tickable: Send {
    fn tick(&mut self, office: &Office);

    /// Sees every simulation event before the next frame.
    fn observe(&mut self, _office: &Office, _event: &SimEvent) {}
}

/// Paints after the office itself, in registration order.
pub trait Drawable: Send {
    fn name(&self) -> &str;
    fn draw(&self, office: &Office, canvas: &mut dyn Canvas);

    fn visible(&self) -> bool {
        true
    }

    fn set_visible(&mut self, _visible: bool) {}
}

/// Something that both ticks and draws.
pub trait Plugin: Tickable + Drawable {}

impl<T: Tickable + Drawable> Plugin for T {}

enum Slot {
    Tick(Box<dyn Tickable>),
    Draw(Box<dyn Drawable>),
    Both(Box<dyn Plugin>),
}

#[derive(Default)]
pub struct PluginRegistry {
    slots: Vec<Slot>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("len", &self.slots.len())
            .finish()
    }
}

impl PluginRegistry {
    /// The plugins the server ships with.
    pub fn standard(fps: u32) -> Self {
        let mut r = Self::default();
        r.add_plugin(NotificationFeed::new(fps));
        r.add_plugin(ZoneHeatmap::default());
        r.add_drawable(StatsHud::default());
        r
    }

    pub fn add_tickable(&mut self, p: impl Tickable + 'static) {
        self.slots.push(Slot::Tick(Box::new(p)));
    }

    pub fn add_drawable(&mut self, p: impl Drawable + 'static) {
        self.slots.push(Slot::Draw(Box::new(p)));
    }

    pub fn add_plugin(&mut self, p: impl Plugin + 'static) {
        self.slots.push(Slot::Both(Box::new(p)));
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn tick(&mut self, office: &Office) {
        for slot in &mut self.slots {
            match &mut *slot {
                Slot::Tick(p) => p.tick(office),
                Slot::Both(p) => p.tick(office),
                Slot::Draw(_) => {}
            }
        }
    }

    pub fn observe(&mut self, office: &Office, events: &[SimEvent]) {
        for slot in &mut self.slots {
            for event in events {
                match &mut *slot {
                    Slot::Tick(p) => p.observe(office, event),
                    Slot::Both(p) => p.observe(office, event),
                    Slot::Draw(_) => {}
                }
            }
        }
    }

    pub fn draw(&self, office: &Office, canvas: &mut dyn Canvas) {
        for slot in &self.slots {
            match slot {
                Slot::Draw(p) => paint(p.as_ref(), office, canvas),
                Slot::Both(p) => paint(p.as_ref(), office, canvas),
                Slot::Tick(_) => {}
            }
        }
    }

    /// Toggles a drawable by name. Returns false when nothing matched.
    pub fn set_visible(&mut self, name: &str, visible: bool) -> bool {
        let mut found = false;
        for slot in &mut self.slots {
            match slot {
                Slot::Draw(p) if p.name() == name => {
                    p.set_visible(visible);
                    found = true;
                }
                Slot::Both(p) if p.name() == name => {
                    p.set_visible(visible);
                    found = true;
                }
                _ => {}
            }
        }
        found
    }
}

fn paint<D: Drawable + ?Sized>(d: &D, office: &Office, canvas: &mut dyn Canvas) {
    if d.visible() {
        d.draw(office, canvas);
    }
}

const MAX_TOASTS: usize = 5;
const COMPLETE_SECS: u64 = 5;
const MILESTONE_SECS: u64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastKind {
    Complete,
    Milestone,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub kind: ToastKind,
    pub who: String,
    pub task: String,
    pub expires_at: u64,
}

/// Completion and halfway toasts in the top-right corner. Lifetimes are
/// counted in frames so the feed follows the render clock.
#[derive(Debug)]
pub struct NotificationFeed {
    fps: u64,
    now: u64,
    toasts: VecDeque<Toast>,
    visible: bool,
}

impl NotificationFeed {
    pub fn new(fps: u32) -> Self {
        Self {
            fps: u64::from(fps.max(1)),
            now: 0,
            toasts: VecDeque::new(),
            visible: true,
        }
    }

    pub fn toasts(&self) -> impl Iterator<Item = &Toast> {
        self.toasts.iter()
    }

    fn push(&mut self, kind: ToastKind, who: String, task: String) {
        let secs = match kind {
            ToastKind::Complete => COMPLETE_SECS,
            ToastKind::Milestone => MILESTONE_SECS,
        };
        self.toasts.push_back(Toast {
            kind,
            who,
            task,
            expires_at: self.now + secs * self.fps,
        });
        while self.toasts.len() > MAX_TOASTS {
            self.toasts.pop_front();
        }
    }
}

impl Tickable for NotificationFeed {
    fn tick(&mut self, office: &Office) {
        self.now = office.frame;
        let now = self.now;
        self.toasts.retain(|t| t.expires_at > now);
    }

    fn observe(&mut self, office: &Office, event: &SimEvent) {
        let name_of = |id: &str| {
            office
                .character(id)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| id.to_string())
        };
        match event {
            SimEvent::Completed { id, finished, .. } => {
                self.push(ToastKind::Complete, name_of(id), finished.clone())
            }
            SimEvent::Milestone { id, task } => {
                self.push(ToastKind::Milestone, name_of(id), task.clone())
            }
        }
    }
}

impl Drawable for NotificationFeed {
    fn name(&self) -> &str {
        "notifications"
    }

    fn visible(&self) -> bool {
        self.visible
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    fn draw(&self, _office: &Office, canvas: &mut dyn Canvas) {
        let x = canvas.width() - 200.0;
        let mut y = 60.0;
        for t in &self.toasts {
            let (fill, stroke, mark) = match t.kind {
                ToastKind::Complete => ("rgba(0,228,54,0.9)", palette::GREEN, "✅"),
                ToastKind::Milestone => ("rgba(255,163,0,0.9)", palette::ORANGE, "📈"),
            };
            canvas.round_rect(Rect::new(x - 10.0, y - 12.0, 190.0, 40.0), 6.0, fill, Some(stroke));
            canvas.text(
                Point::new(x, y + 2.0),
                &format!("{mark} {}", t.who),
                palette::BLACK,
                FONT_BOLD,
                TextAlign::Left,
            );
            canvas.text(
                Point::new(x, y + 20.0),
                &toast_task(&t.task),
                palette::BLACK,
                FONT_SMALL,
                TextAlign::Left,
            );
            y += 47.0;
        }
    }
}

const TOAST_TASK_CHARS: usize = 14;

fn toast_task(task: &str) -> String {
    if task.chars().count() <= TOAST_TASK_CHARS {
        return task.to_string();
    }
    let head: String = task.chars().take(TOAST_TASK_CHARS - 1).collect();
    format!("{head}…")
}

/// Tints each zone by how many tasks were finished there.
#[derive(Debug)]
pub struct ZoneHeatmap {
    visits: BTreeMap<String, u64>,
    visible: bool,
}

impl Default for ZoneHeatmap {
    fn default() -> Self {
        Self {
            visits: BTreeMap::new(),
            visible: true,
        }
    }
}

impl ZoneHeatmap {
    pub fn visits(&self, zone: &str) -> u64 {
        self.visits.get(zone).copied().unwrap_or(0)
    }

    /// Blue through cyan and yellow to orange as `intensity` goes 0..=1.
    pub fn tint(intensity: f64) -> String {
        let i = intensity.clamp(0.0, 1.0);
        if i < 0.25 {
            format!("rgba(0,100,255,{:.2})", 0.1 + i * 0.2)
        } else if i < 0.5 {
            format!("rgba(0,255,255,{:.2})", 0.2 + i * 0.2)
        } else if i < 0.75 {
            format!("rgba(255,255,0,{:.2})", 0.3 + i * 0.2)
        } else {
            format!("rgba(255,100,0,{:.2})", 0.4 + i * 0.3)
        }
    }
}

impl Tickable for ZoneHeatmap {
    fn tick(&mut self, _office: &Office) {}

    fn observe(&mut self, office: &Office, event: &SimEvent) {
        if let SimEvent::Completed { zone, .. } = event {
            if office.zones.contains(zone) {
                *self.visits.entry(zone.clone()).or_default() += 1;
            }
        }
    }
}

impl Drawable for ZoneHeatmap {
    fn name(&self) -> &str {
        "heatmap"
    }

    fn visible(&self) -> bool {
        self.visible
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    fn draw(&self, office: &Office, canvas: &mut dyn Canvas) {
        let max = self.visits.values().copied().max().unwrap_or(0).max(1);
        for z in office.zones.iter() {
            let n = self.visits(&z.id);
            if n == 0 {
                continue;
            }
            canvas.fill_rect(
                Rect::new(z.x, z.y, z.width, z.height),
                &Self::tint(n as f64 / max as f64),
            );
            canvas.text(
                Point::new(z.x + z.width - 25.0, z.y + z.height - 5.0),
                &format!("({n})"),
                palette::YELLOW,
                FONT_SMALL,
                TextAlign::Left,
            );
        }
    }
}

/// One-line summary along the bottom edge.
#[derive(Debug)]
pub struct StatsHud {
    visible: bool,
}

impl Default for StatsHud {
    fn default() -> Self {
        Self { visible: true }
    }
}

impl StatsHud {
    pub fn line(office: &Office) -> String {
        let s = office.stats();
        format!(
            "工作 {} | 待命 {} | 平均进度 {}% | 速度 {:.1}x | 今日完成 {}",
            s.working, s.idle, s.progress, office.game_speed, office.completed_today
        )
    }
}

impl Drawable for StatsHud {
    fn name(&self) -> &str {
        "stats"
    }

    fn visible(&self) -> bool {
        self.visible
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    fn draw(&self, office: &Office, canvas: &mut dyn Canvas) {
        let y = canvas.height() - 8.0;
        canvas.text(
            Point::new(10.0, y),
            &Self::line(office),
            palette::WHITE,
            FONT_SMALL,
            TextAlign::Left,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OfficeConfig;
    use crate::render::{step, DisplayList};
    use pixel_office_protocol::DrawCommand;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn office() -> Office {
        Office::new(&OfficeConfig::default()).unwrap()
    }

    fn completed(id: &str, zone: &str, moved_to: Option<&str>) -> SimEvent {
        SimEvent::Completed {
            id: id.to_string(),
            finished: "执行测试用例".to_string(),
            next: "回归测试".to_string(),
            zone: zone.to_string(),
            moved_to: moved_to.map(str::to_string),
        }
    }

    struct Marker(&'static str, Arc<AtomicUsize>);

    impl Drawable for Marker {
        fn name(&self) -> &str {
            self.0
        }

        fn draw(&self, _office: &Office, canvas: &mut dyn Canvas) {
            self.1.fetch_add(1, Ordering::SeqCst);
            canvas.clear(self.0);
        }
    }

    #[test]
    fn drawables_run_in_registration_order() {
        let o = office();
        let hits = Arc::new(AtomicUsize::new(0));
        let mut r = PluginRegistry::default();
        r.add_drawable(Marker("first", hits.clone()));
        r.add_drawable(Marker("second", hits.clone()));
        let mut list = DisplayList::office();
        r.draw(&o, &mut list);
        let order: Vec<_> = list
            .commands()
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Clear { color } => Some(color.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(order, vec!["first", "second"]);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn hidden_plugins_are_skipped() {
        let o = office();
        let mut r = PluginRegistry::default();
        r.add_drawable(StatsHud::default());
        assert!(r.set_visible("stats", false));
        assert!(!r.set_visible("nope", false));
        let mut list = DisplayList::office();
        r.draw(&o, &mut list);
        assert!(list.commands().is_empty());
    }

    #[test]
    fn toasts_expire_after_their_lifetime_in_frames() {
        let mut o = office();
        let mut feed = NotificationFeed::new(10);
        feed.observe(&o, &completed("qa", "test", None));
        feed.observe(
            &o,
            &SimEvent::Milestone {
                id: "fe".to_string(),
                task: "实现UI组件".to_string(),
            },
        );
        assert_eq!(feed.toasts().count(), 2);
        assert_eq!(feed.toasts().next().unwrap().who, "🧪 测试工程师");

        o.frame = 29;
        feed.tick(&o);
        assert_eq!(feed.toasts().count(), 2);
        o.frame = 30;
        feed.tick(&o);
        assert_eq!(feed.toasts().count(), 1);
        o.frame = 50;
        feed.tick(&o);
        assert_eq!(feed.toasts().count(), 0);
    }

    #[test]
    fn feed_keeps_at_most_five() {
        let o = office();
        let mut feed = NotificationFeed::new(60);
        for _ in 0..8 {
            feed.observe(&o, &completed("qa", "test", None));
        }
        assert_eq!(feed.toasts().count(), MAX_TOASTS);
    }

    #[test]
    fn heatmap_counts_where_tasks_were_finished() {
        let o = office();
        let mut map = ZoneHeatmap::default();
        map.observe(&o, &completed("qa", "test", Some("break")));
        map.observe(&o, &completed("fe", "dev", None));
        map.observe(&o, &completed("be", "dev", Some("server")));
        map.observe(&o, &completed("ai", "nowhere", None));
        assert_eq!(map.visits("test"), 1);
        assert_eq!(map.visits("dev"), 2);
        assert_eq!(map.visits("break"), 0);
        assert_eq!(map.visits("server"), 0);
        assert_eq!(map.visits("nowhere"), 0);
    }

    #[test]
    fn toasts_show_the_finished_task() {
        let o = office();
        let mut feed = NotificationFeed::new(60);
        feed.observe(&o, &completed("qa", "test", None));
        feed.observe(
            &o,
            &SimEvent::Milestone {
                id: "writer".to_string(),
                task: "撰写一篇很长很长很长很长很长的技术博客文章".to_string(),
            },
        );
        let mut list = DisplayList::office();
        feed.draw(&o, &mut list);
        let texts: Vec<&str> = list
            .commands()
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert!(texts.contains(&"执行测试用例"));
        assert!(texts.contains(&"撰写一篇很长很长很长很长很…"));
    }

    #[test]
    fn heatmap_tint_bands() {
        assert!(ZoneHeatmap::tint(0.0).starts_with("rgba(0,100,255"));
        assert!(ZoneHeatmap::tint(1.0).starts_with("rgba(255,100,0"));
    }

    #[test]
    fn standard_registry_draws_the_hud_line() {
        let mut o = office();
        o.completed_today = 3;
        let mut r = PluginRegistry::standard(60);
        assert_eq!(r.len(), 3);
        let frame = step(&mut o, &mut r).unwrap();
        let expected = StatsHud::line(&o);
        assert!(expected.ends_with("速度 1.0x | 今日完成 3"));
        assert!(frame
            .commands
            .iter()
            .any(|c| matches!(c, DrawCommand::Text { text, .. } if *text == expected)));
    }
}
