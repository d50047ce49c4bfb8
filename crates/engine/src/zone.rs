use crate::render::palette;
use serde::{Deserialize, Serialize};

pub const CANVAS_WIDTH: f64 = 800.0;
pub const CANVAS_HEIGHT: f64 = 600.0;

/// Where a character stands when its zone is unknown.
pub const FALLBACK_CENTER: Point = Point { x: 400.0, y: 300.0 };

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, by: Point) -> Self {
        Self {
            x: self.x + by.x,
            y: self.y + by.y,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub name: String,
    pub color: String,
}

impl Zone {
    pub fn new(id: &str, rect: (f64, f64, f64, f64), name: &str, color: &str) -> Self {
        let (x, y, width, height) = rect;
        Self {
            id: id.to_string(),
            x,
            y,
            width,
            height,
            name: name.to_string(),
            color: color.to_string(),
        }
    }

    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.width / 2.0,
            y: self.y + self.height / 2.0,
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.x + self.width && p.y >= self.y && p.y <= self.y + self.height
    }
}

/// The office floor plan. Read-only once the office is built; order is the
/// order zones were declared in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneTable {
    zones: Vec<Zone>,
}

impl ZoneTable {
    pub fn new(zones: Vec<Zone>) -> anyhow::Result<Self> {
        for (i, z) in zones.iter().enumerate() {
            if z.id.trim().is_empty() {
                anyhow::bail!("zone #{i} has an empty id");
            }
            if zones[..i].iter().any(|other| other.id == z.id) {
                anyhow::bail!("duplicate zone id: {}", z.id);
            }
            if z.width <= 0.0 || z.height <= 0.0 {
                anyhow::bail!("zone {} has a non-positive size", z.id);
            }
        }
        Ok(Self { zones })
    }

    pub fn office_default() -> Self {
        Self {
            zones: default_zones(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.zones.iter().position(|z| z.id == id)
    }

    pub fn center_of(&self, id: &str) -> Point {
        self.get(id).map(Zone::center).unwrap_or(FALLBACK_CENTER)
    }

    /// The zone `steps` places after `id`, wrapping around.
    pub fn step_from(&self, id: &str, steps: usize) -> Option<&Zone> {
        let idx = self.index_of(id)?;
        self.zones.get((idx + steps) % self.zones.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.zones.iter().map(|z| z.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

pub fn default_zones() -> Vec<Zone> {
    vec![
        Zone::new("boss", (50.0, 50.0, 150.0, 120.0), "老板办公室", palette::DARK_PURPLE),
        Zone::new("ai", (250.0, 50.0, 120.0, 100.0), "AI助手工位", palette::DARK_BLUE),
        Zone::new("pm", (420.0, 50.0, 100.0, 100.0), "产品区", palette::INDIGO),
        Zone::new("dev", (570.0, 50.0, 200.0, 150.0), "开发区", palette::DARK_GREEN),
        Zone::new("test", (570.0, 250.0, 150.0, 100.0), "测试区", palette::BLUE),
        Zone::new("security", (50.0, 250.0, 100.0, 100.0), "安全区", palette::RED),
        Zone::new("search", (200.0, 250.0, 120.0, 100.0), "查询区", palette::ORANGE),
        Zone::new("meeting", (370.0, 200.0, 150.0, 100.0), "会议室", palette::PINK),
        Zone::new("break", (50.0, 400.0, 200.0, 150.0), "休息区", palette::PEACH),
        Zone::new("server", (300.0, 400.0, 150.0, 150.0), "服务器区", palette::DARK_GRAY),
    ]
}
