//! The frame loop: per-frame animation offsets, then a full redraw onto a
//! [`Canvas`]. The server records frames into a [`DisplayList`] and ships the
//! commands to the viewer, which replays them onto a 2D context.

pub mod plugins;

pub use plugins::{Drawable, NotificationFeed, PluginRegistry, StatsHud, Tickable, ZoneHeatmap};

use crate::character::Character;
use crate::office::Office;
use crate::zone::{Point, CANVAS_HEIGHT, CANVAS_WIDTH};
use pixel_office_protocol::{DrawCommand, Frame, TextAlign};

pub mod palette {
    pub const BLACK: &str = "#000000";
    pub const DARK_BLUE: &str = "#1d2b53";
    pub const DARK_PURPLE: &str = "#7e2553";
    pub const DARK_GREEN: &str = "#008751";
    pub const BROWN: &str = "#ab5236";
    pub const DARK_GRAY: &str = "#5f574f";
    pub const LIGHT_GRAY: &str = "#c2c3c7";
    pub const WHITE: &str = "#fff1e8";
    pub const RED: &str = "#ff004d";
    pub const ORANGE: &str = "#ffa300";
    pub const YELLOW: &str = "#ffec27";
    pub const GREEN: &str = "#00e436";
    pub const BLUE: &str = "#29adff";
    pub const INDIGO: &str = "#83769c";
    pub const PINK: &str = "#ff77a8";
    pub const PEACH: &str = "#ffccaa";

    pub const GRID: &str = "#1a1a1a";
    pub const SHADOW: &str = "rgba(0,0,0,0.3)";
    pub const BUBBLE: &str = "rgba(255,255,255,0.95)";
    pub const BAR_TRACK: &str = "#333";
}

pub const FONT_LABEL: &str = "12px \"Courier New\"";
pub const FONT_SMALL: &str = "10px \"Courier New\"";
pub const FONT_BOLD: &str = "bold 11px \"Courier New\"";

const GRID_STEP: f64 = 40.0;
const BUBBLE_CHARS: usize = 12;
const BUBBLE_LIFT: f64 = 35.0;
const BAR_WIDTH: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }
}

/// A 2D drawing surface. Implementors only need [`Canvas::command`]; the
/// shape helpers build the commands.
pub trait Canvas {
    fn width(&self) -> f64;
    fn height(&self) -> f64;
    fn command(&mut self, cmd: DrawCommand);

    fn clear(&mut self, color: &str) {
        self.command(DrawCommand::Clear {
            color: color.to_string(),
        });
    }

    fn fill_rect(&mut self, r: Rect, color: &str) {
        self.command(DrawCommand::FillRect {
            x: r.x,
            y: r.y,
            w: r.w,
            h: r.h,
            color: color.to_string(),
        });
    }

    fn stroke_rect(&mut self, r: Rect, color: &str, line_width: f64, dashed: bool) {
        self.command(DrawCommand::StrokeRect {
            x: r.x,
            y: r.y,
            w: r.w,
            h: r.h,
            color: color.to_string(),
            line_width,
            dashed,
        });
    }

    fn line(&mut self, from: Point, to: Point, color: &str, line_width: f64) {
        self.command(DrawCommand::Line {
            x1: from.x,
            y1: from.y,
            x2: to.x,
            y2: to.y,
            color: color.to_string(),
            line_width,
        });
    }

    fn ellipse(&mut self, center: Point, rx: f64, ry: f64, color: &str) {
        self.command(DrawCommand::Ellipse {
            x: center.x,
            y: center.y,
            rx,
            ry,
            color: color.to_string(),
        });
    }

    fn round_rect(&mut self, r: Rect, radius: f64, fill: &str, stroke: Option<&str>) {
        self.command(DrawCommand::RoundRect {
            x: r.x,
            y: r.y,
            w: r.w,
            h: r.h,
            radius,
            fill: fill.to_string(),
            stroke: stroke.map(str::to_string),
        });
    }

    fn text(&mut self, at: Point, text: &str, color: &str, font: &str, align: TextAlign) {
        self.command(DrawCommand::Text {
            x: at.x,
            y: at.y,
            text: text.to_string(),
            color: color.to_string(),
            font: font.to_string(),
            align,
        });
    }
}

/// Records commands instead of painting them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayList {
    width: f64,
    height: f64,
    commands: Vec<DrawCommand>,
}

impl DisplayList {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            commands: Vec::new(),
        }
    }

    pub fn office() -> Self {
        Self::new(CANVAS_WIDTH, CANVAS_HEIGHT)
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn into_frame(self, frame: u64) -> Frame {
        Frame {
            frame,
            width: self.width,
            height: self.height,
            commands: self.commands,
        }
    }
}

impl Canvas for DisplayList {
    fn width(&self) -> f64 {
        self.width
    }

    fn height(&self) -> f64 {
        self.height
    }

    fn command(&mut self, cmd: DrawCommand) {
        self.commands.push(cmd);
    }
}

pub fn idle_offset(frame: u64, phase: f64) -> Point {
    let f = frame as f64;
    Point::new((f * 0.05 + phase).sin() * 2.0, (f * 0.03 + phase).cos() * 2.0)
}

pub fn working_offset(frame: u64) -> Point {
    let f = frame as f64;
    Point::new((f * 0.1).sin(), (f * 0.15).sin())
}

/// Update phase: animation offsets, then every tickable plugin.
pub fn update(office: &mut Office, plugins: &mut PluginRegistry) {
    let frame = office.frame;
    for c in &mut office.characters {
        c.offset = if c.is_working() {
            working_offset(frame)
        } else {
            idle_offset(frame, c.phase)
        };
    }
    plugins.tick(office);
}

/// Draw phase. Reads the office, never mutates it.
pub fn draw(office: &Office, plugins: &PluginRegistry, canvas: &mut dyn Canvas) {
    canvas.clear(palette::BLACK);
    draw_floor(canvas);
    draw_zones(office, canvas);
    for c in &office.characters {
        let at = office.position_of(c);
        draw_character(canvas, office.frame, at.offset(c.offset), c);
        if c.is_working() {
            draw_bubble(canvas, Point::new(at.x, at.y - BUBBLE_LIFT), c);
        }
    }
    if let Some(c) = office.selected.as_deref().and_then(|id| office.character(id)) {
        let at = office.position_of(c);
        canvas.stroke_rect(
            Rect::new(at.x - 20.0, at.y - 30.0, 40.0, 55.0),
            palette::YELLOW,
            3.0,
            true,
        );
    }
    plugins.draw(office, canvas);
}

/// One frame: update, draw, advance the counter. `None` while stopped.
pub fn step(office: &mut Office, plugins: &mut PluginRegistry) -> Option<Frame> {
    if !office.running {
        return None;
    }
    update(office, plugins);
    let mut list = DisplayList::office();
    draw(office, plugins, &mut list);
    let frame = list.into_frame(office.frame);
    office.frame += 1;
    Some(frame)
}

fn draw_floor(canvas: &mut dyn Canvas) {
    let (w, h) = (canvas.width(), canvas.height());
    let mut x = 0.0;
    while x < w {
        canvas.line(Point::new(x, 0.0), Point::new(x, h), palette::GRID, 1.0);
        x += GRID_STEP;
    }
    let mut y = 0.0;
    while y < h {
        canvas.line(Point::new(0.0, y), Point::new(w, y), palette::GRID, 1.0);
        y += GRID_STEP;
    }
}

fn draw_zones(office: &Office, canvas: &mut dyn Canvas) {
    for z in office.zones.iter() {
        let r = Rect::new(z.x, z.y, z.width, z.height);
        canvas.fill_rect(r, &format!("{}40", z.color));
        canvas.stroke_rect(r, &z.color, 2.0, false);
        canvas.text(
            Point::new(z.x + 5.0, z.y + 15.0),
            &z.name,
            palette::WHITE,
            FONT_LABEL,
            TextAlign::Left,
        );
    }
}

fn draw_character(canvas: &mut dyn Canvas, frame: u64, at: Point, c: &Character) {
    let Point { x, y } = at;
    let working = c.is_working();
    let blink = (frame / 30) % 2 == 0;

    canvas.ellipse(Point::new(x, y + 18.0), 12.0, 6.0, palette::SHADOW);
    canvas.fill_rect(Rect::new(x - 10.0, y - 5.0, 20.0, 20.0), &c.color);
    canvas.fill_rect(Rect::new(x - 8.0, y - 18.0, 16.0, 14.0), palette::PEACH);

    let (eye, size) = if working {
        (if blink { palette::GREEN } else { palette::DARK_GREEN }, 4.0)
    } else if blink {
        (palette::ORANGE, 3.0)
    } else {
        (palette::BROWN, 3.0)
    };
    canvas.fill_rect(Rect::new(x - 5.0, y - 14.0, size, size), eye);
    canvas.fill_rect(Rect::new(x + 2.0, y - 14.0, size, size), eye);

    draw_accessory(canvas, frame, at, c);

    let period = if working { 15 } else { 40 };
    if (frame / period) % 2 == 0 {
        let color = if working { palette::GREEN } else { palette::ORANGE };
        canvas.fill_rect(Rect::new(x - 12.0, y - 22.0, 4.0, 4.0), color);
        canvas.fill_rect(Rect::new(x + 8.0, y - 22.0, 4.0, 4.0), color);
    }
}

fn draw_accessory(canvas: &mut dyn Canvas, frame: u64, at: Point, c: &Character) {
    let Point { x, y } = at;
    match c.role.as_str() {
        "用户" => canvas.fill_rect(Rect::new(x - 2.0, y - 5.0, 4.0, 10.0), palette::RED),
        "主助手" => {
            canvas.fill_rect(Rect::new(x - 1.0, y - 24.0, 2.0, 6.0), palette::LIGHT_GRAY);
            let tip = if c.is_working() && (frame / 20) % 2 == 0 {
                palette::YELLOW
            } else {
                palette::GREEN
            };
            canvas.fill_rect(Rect::new(x - 2.0, y - 25.0, 4.0, 2.0), tip);
        }
        "开发" => canvas.fill_rect(Rect::new(x - 7.0, y - 14.0, 14.0, 2.0), palette::BLUE),
        "测试" => canvas.fill_rect(Rect::new(x + 6.0, y - 8.0, 6.0, 6.0), palette::LIGHT_GRAY),
        "产品" => canvas.fill_rect(Rect::new(x - 6.0, y - 14.0, 12.0, 2.0), palette::INDIGO),
        "安全" => {
            canvas.fill_rect(Rect::new(x - 12.0, y - 10.0, 4.0, 6.0), palette::RED);
            canvas.fill_rect(Rect::new(x + 8.0, y - 10.0, 4.0, 6.0), palette::RED);
        }
        "查询" => canvas.fill_rect(Rect::new(x + 5.0, y - 12.0, 6.0, 6.0), palette::ORANGE),
        "创作" if c.is_working() && (frame / 10) % 2 == 0 => {
            canvas.fill_rect(Rect::new(x + 6.0, y - 4.0, 8.0, 2.0), palette::PINK)
        }
        _ => {}
    }
}

/// Truncates by characters, not bytes.
pub fn bubble_text(task: &str) -> String {
    task.chars().take(BUBBLE_CHARS).collect()
}

fn draw_bubble(canvas: &mut dyn Canvas, at: Point, c: &Character) {
    let text = bubble_text(&c.task);
    let width = (text.chars().count() as f64 * 8.0 + 20.0).min(120.0);
    let height = 24.0;
    let top = at.y - height / 2.0;

    canvas.round_rect(
        Rect::new(at.x - width / 2.0, top, width, height),
        6.0,
        palette::BUBBLE,
        Some(&c.color),
    );
    canvas.text(
        Point::new(at.x, top + 15.0),
        &text,
        palette::BLACK,
        FONT_SMALL,
        TextAlign::Center,
    );

    let bar_y = top + height + 10.0;
    let left = at.x - BAR_WIDTH / 2.0;
    canvas.fill_rect(Rect::new(left, bar_y, BAR_WIDTH, 4.0), palette::BAR_TRACK);
    let filled = BAR_WIDTH * f64::from(c.progress) / 100.0;
    canvas.fill_rect(Rect::new(left, bar_y, filled, 4.0), &c.color);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OfficeConfig;
    use pixel_office_protocol::Status;

    fn office() -> Office {
        Office::new(&OfficeConfig::default()).unwrap()
    }

    fn texts(frame: &Frame) -> Vec<&str> {
        frame
            .commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn frame_counter_advances_once_per_step() {
        let mut o = office();
        let mut plugins = PluginRegistry::default();
        let first = step(&mut o, &mut plugins).unwrap();
        let second = step(&mut o, &mut plugins).unwrap();
        assert_eq!(first.frame, 0);
        assert_eq!(second.frame, 1);
        assert_eq!(o.frame, 2);
    }

    #[test]
    fn stopped_office_produces_no_frames() {
        let mut o = office();
        let mut plugins = PluginRegistry::default();
        o.running = false;
        assert!(step(&mut o, &mut plugins).is_none());
        assert_eq!(o.frame, 0);
    }

    #[test]
    fn offsets_follow_status() {
        let mut o = office();
        o.frame = 40;
        update(&mut o, &mut PluginRegistry::default());
        let ai = o.character("ai").unwrap();
        assert_eq!(ai.offset, working_offset(40));
        let boss = o.character("boss").unwrap();
        assert_eq!(boss.status, Status::Idle);
        assert_eq!(boss.offset, idle_offset(40, boss.phase));
        assert!(boss.offset.x.abs() <= 2.0 && boss.offset.y.abs() <= 2.0);
    }

    #[test]
    fn frame_starts_with_clear_and_labels_every_zone() {
        let mut o = office();
        let frame = step(&mut o, &mut PluginRegistry::default()).unwrap();
        assert!(matches!(&frame.commands[0], DrawCommand::Clear { color } if color == palette::BLACK));
        let labels = texts(&frame);
        for z in o.zones.iter() {
            assert!(labels.contains(&z.name.as_str()), "missing {}", z.name);
        }
    }

    #[test]
    fn only_working_characters_get_bubbles() {
        let mut o = office();
        for c in &mut o.characters {
            c.status = Status::Idle;
        }
        {
            let fe = o.character_mut("fe").unwrap();
            fe.status = Status::Working;
            fe.task = "实现一个很长很长很长的UI组件列表".to_string();
        }
        let frame = step(&mut o, &mut PluginRegistry::default()).unwrap();
        let bubbles: Vec<_> = frame
            .commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::RoundRect { .. }))
            .collect();
        assert_eq!(bubbles.len(), 1);
        assert!(texts(&frame).contains(&"实现一个很长很长很长的U"));
    }

    #[test]
    fn selection_draws_a_dashed_outline() {
        let mut o = office();
        o.selected = Some("qa".to_string());
        let at = o.position_of(o.character("qa").unwrap());
        let frame = step(&mut o, &mut PluginRegistry::default()).unwrap();
        assert!(frame.commands.iter().any(|c| matches!(
            c,
            DrawCommand::StrokeRect { x, y, dashed: true, .. }
                if *x == at.x - 20.0 && *y == at.y - 30.0
        )));
    }

    #[test]
    fn bubble_text_counts_characters() {
        assert_eq!(bubble_text("短"), "短");
        assert_eq!(bubble_text("abcdefghijklmnop"), "abcdefghijkl");
    }
}
