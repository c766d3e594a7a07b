//! Monitor state value types.
//!
//! [`MonitorState`] is the full property snapshot of one monitor as reported by
//! a backend.  It is a plain value: the live, shared `Monitor` object that
//! applications hold lives in the `monctl` crate and wraps one of these.

use serde::{Deserialize, Serialize};

use super::geometry::{Point, Rect, Size};

/// Horizontal and vertical scale, in percent (`(100.0, 100.0)` is unscaled).
pub type Scale = (f64, f64);

/// Horizontal and vertical dots per inch.
pub type Dpi = (f64, f64);

/// A resolution plus refresh rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    /// Refresh rate in Hz.
    pub frequency: f64,
}

impl DisplayMode {
    pub fn new(width: u32, height: u32, frequency: f64) -> Self {
        Self {
            width,
            height,
            frequency,
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl std::fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}@{:.2}", self.width, self.height, self.frequency)
    }
}

/// Display rotation, numbered as the platforms number it (clockwise quarter turns).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Normal = 0,
    Right = 1,
    Inverted = 2,
    Left = 3,
}

impl Orientation {
    /// Converts a quarter-turn index (0..=3) into an orientation.
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Normal),
            1 => Some(Self::Right),
            2 => Some(Self::Inverted),
            3 => Some(Self::Left),
            _ => None,
        }
    }

    /// Converts a rotation in degrees (multiples of 90) into an orientation.
    pub fn from_degrees(degrees: f64) -> Option<Self> {
        let turns = (degrees / 90.0).round() as i64;
        Self::from_index(turns.rem_euclid(4) as u8)
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn degrees(self) -> u32 {
        self.index() as u32 * 90
    }

    /// `true` for the portrait orientations, where width and height swap.
    pub fn is_portrait(self) -> bool {
        matches!(self, Self::Right | Self::Left)
    }
}

/// Power/attachment state of a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    #[default]
    On,
    Off,
    Suspended,
    /// Detached from the desktop (or no longer reported by the system).
    Detached,
}

/// Full property snapshot of one monitor.
///
/// Fields a platform cannot report are `None` (or empty for `all_modes`);
/// they are never an error.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MonitorState {
    /// Name as the operating system reports it (may be duplicated on macOS).
    #[serde(default)]
    pub system_name: String,
    pub position: Point,
    pub size: Size,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workarea: Option<Rect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<DisplayMode>,
    #[serde(default)]
    pub all_modes: Vec<DisplayMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_mode: Option<DisplayMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<Scale>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dpi: Option<Dpi>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Orientation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colordepth: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contrast: Option<u8>,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub power: PowerState,
}

/// The properties compared when deciding whether a monitor changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorField {
    Position,
    Size,
    Workarea,
    Mode,
    Scale,
    Dpi,
    Orientation,
    Primary,
    Power,
}

impl MonitorState {
    /// The rectangle this monitor covers in desktop coordinates.
    pub fn rect(&self) -> Rect {
        Rect::from_origin_size(self.position, self.size)
    }

    /// Refresh rate of the current mode, if known.
    pub fn frequency(&self) -> Option<f64> {
        self.mode.map(|m| m.frequency)
    }

    /// Makes the current mode a member of `all_modes`.
    ///
    /// Backends occasionally report a current mode that is missing from the
    /// mode list (custom or transient modes); the list is extended rather than
    /// the mode dropped.
    pub fn normalized(mut self) -> Self {
        if let Some(mode) = self.mode {
            if !self.all_modes.contains(&mode) {
                self.all_modes.push(mode);
            }
        }
        self
    }

    /// Returns the fields that differ between `self` and `other`.
    ///
    /// Brightness, contrast, colour depth and the mode list are not compared:
    /// they either cannot change without one of the compared fields changing
    /// too, or are too slow to poll to be worth reporting.
    pub fn changed_fields(&self, other: &MonitorState) -> Vec<MonitorField> {
        let mut fields = Vec::new();
        if self.position != other.position {
            fields.push(MonitorField::Position);
        }
        if self.size != other.size {
            fields.push(MonitorField::Size);
        }
        if self.workarea != other.workarea {
            fields.push(MonitorField::Workarea);
        }
        if self.mode != other.mode {
            fields.push(MonitorField::Mode);
        }
        if self.scale != other.scale {
            fields.push(MonitorField::Scale);
        }
        if self.dpi != other.dpi {
            fields.push(MonitorField::Dpi);
        }
        if self.orientation != other.orientation {
            fields.push(MonitorField::Orientation);
        }
        if self.is_primary != other.is_primary {
            fields.push(MonitorField::Primary);
        }
        if self.power != other.power {
            fields.push(MonitorField::Power);
        }
        fields
    }

    /// `true` if position, size and mode match exactly.  Used to recognise a
    /// monitor the platform re-enumerated under a new name.
    pub fn same_geometry(&self, other: &MonitorState) -> bool {
        self.position == other.position && self.size == other.size && self.mode == other.mode
    }
}

/// Placement legality rules of a platform, fed to the arrangement solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformRules {
    /// Exactly one monitor must be primary at all times.
    pub primary_mandatory: bool,
    /// The primary monitor must sit at `(0, 0)`.
    pub primary_at_origin: bool,
    /// Monitors may have negative coordinates.
    pub negative_coordinates: bool,
    /// Monitors may overlap (mirroring / clone mode).
    pub overlap_allowed: bool,
}

impl PlatformRules {
    /// Windows: primary is mandatory and anchors the origin.
    pub const WINDOWS: PlatformRules = PlatformRules {
        primary_mandatory: true,
        primary_at_origin: true,
        negative_coordinates: true,
        overlap_allowed: false,
    };

    /// X11/RandR: the screen origin is the top-left of the bounding box, the
    /// primary is optional, and outputs may overlap.
    pub const LINUX: PlatformRules = PlatformRules {
        primary_mandatory: false,
        primary_at_origin: false,
        negative_coordinates: false,
        overlap_allowed: true,
    };

    /// macOS: the main display anchors the global origin.
    pub const MACOS: PlatformRules = PlatformRules {
        primary_mandatory: true,
        primary_at_origin: true,
        negative_coordinates: true,
        overlap_allowed: false,
    };

    /// Rules of the platform this binary was compiled for.
    pub fn current() -> PlatformRules {
        if cfg!(target_os = "windows") {
            Self::WINDOWS
        } else if cfg!(target_os = "macos") {
            Self::MACOS
        } else {
            Self::LINUX
        }
    }
}

impl Default for PlatformRules {
    fn default() -> Self {
        Self::current()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
