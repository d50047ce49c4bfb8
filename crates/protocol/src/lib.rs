use serde::{Deserialize, Serialize};

/// The only two states a character can be in once it is inside the office.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Working,
    Idle,
}

impl Default for Status {
    fn default() -> Self {
        Self::Idle
    }
}

impl Status {
    /// Maps a status string from a feed onto the enum.
    ///
    /// `meeting` and `break` are emitted by the mock endpoints and count as
    /// not working. Anything else is rejected.
    pub fn from_feed(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "working" => Some(Self::Working),
            "idle" | "meeting" | "break" => Some(Self::Idle),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Working => "working",
            Self::Idle => "idle",
        }
    }

    pub fn is_working(self) -> bool {
        matches!(self, Self::Working)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub time: String,
    pub task: String,
    pub completed: bool,
}

/// One character as delivered by a status source. A missing field means
/// "keep what you have"; a record without an `id` matches nobody.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CharacterRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
}

impl CharacterRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub working: u32,
    pub idle: u32,
    pub total: u32,
    pub progress: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusData {
    #[serde(default)]
    pub characters: Vec<CharacterRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
}

/// Body of the local status endpoint and the static fallback.
///
/// Two shapes are accepted: the envelope `{success, timestamp, data:
/// {characters, stats}}` and the legacy `{roles: [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<StatusData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<CharacterRecord>>,
}

impl StatusPayload {
    pub fn envelope(characters: Vec<CharacterRecord>, stats: Stats, timestamp: i64) -> Self {
        Self {
            success: Some(true),
            timestamp: Some(timestamp),
            data: Some(StatusData {
                characters,
                stats: Some(stats),
            }),
            roles: None,
        }
    }

    pub fn legacy(roles: Vec<CharacterRecord>) -> Self {
        Self {
            roles: Some(roles),
            ..Self::default()
        }
    }

    /// The character records carried by whichever shape was received.
    /// `roles` wins when both are present.
    pub fn records(&self) -> &[CharacterRecord] {
        if let Some(roles) = &self.roles {
            return roles;
        }
        match &self.data {
            Some(data) => &data.characters,
            None => &[],
        }
    }

    pub fn into_records(self) -> Vec<CharacterRecord> {
        if let Some(roles) = self.roles {
            return roles;
        }
        self.data.map(|d| d.characters).unwrap_or_default()
    }
}

impl From<StatusData> for StatusPayload {
    fn from(data: StatusData) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }
}

/// One `data:` frame on the push stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PushFrame {
    Connected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
    },
    Update {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        iteration: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<StatusData>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub tasks: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

impl Default for TextAlign {
    fn default() -> Self {
        Self::Left
    }
}

/// A single canvas operation. The viewer replays these in order onto a 2D
/// context; coordinates are in canvas pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DrawCommand {
    Clear {
        color: String,
    },
    FillRect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        color: String,
    },
    StrokeRect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        color: String,
        line_width: f64,
        #[serde(default)]
        dashed: bool,
    },
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        color: String,
        line_width: f64,
    },
    Ellipse {
        x: f64,
        y: f64,
        rx: f64,
        ry: f64,
        color: String,
    },
    RoundRect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        radius: f64,
        fill: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stroke: Option<String>,
    },
    Text {
        x: f64,
        y: f64,
        text: String,
        color: String,
        font: String,
        #[serde(default)]
        align: TextAlign,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub frame: u64,
    pub width: f64,
    pub height: f64,
    pub commands: Vec<DrawCommand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterView {
    pub id: String,
    pub name: String,
    pub role: String,
    pub zone: String,
    pub zone_name: String,
    pub color: String,
    pub task: String,
    pub progress: u8,
    pub status: Status,
    pub history: Vec<HistoryEntry>,
}

/// What `GET /api/office/characters` returns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OfficeView {
    pub status_line: String,
    pub live: bool,
    pub push: bool,
    pub running: bool,
    pub frame: u64,
    pub completed_today: u64,
    pub game_speed: f64,
    pub stats: Stats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<String>,
    pub characters: Vec<CharacterView>,
}
