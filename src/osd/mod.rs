//! OSD module - consumes display-port traffic from the flight controller
//!
//! Handles:
//! - Video system detection from the INAV OSD preferences
//! - The character grid written by `MSP_DISPLAYPORT` sub-commands

mod screen;

pub use screen::{OsdScreen, OsdUpdate};

/// Rows of the backing grid (the largest supported video system)
pub const MAX_ROWS: usize = 22;

/// Columns of the backing grid
pub const MAX_COLS: usize = 60;

/// Video system reported by the flight controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum VideoSystem {
    HdZero = 3,
    WtfOs = 4,
    Walksnail = 5,
    #[default]
    None = 6,
}

impl VideoSystem {
    /// Map a preferences byte, falling back to WtfOS for unknown systems
    pub fn from_preference(value: u8) -> Self {
        match value {
            3 => VideoSystem::HdZero,
            4 => VideoSystem::WtfOs,
            5 => VideoSystem::Walksnail,
            other => {
                tracing::warn!("Unsupported video system {}, falling back to WtfOS", other);
                VideoSystem::WtfOs
            }
        }
    }

    /// Visible grid size as (rows, cols)
    pub fn dimensions(self) -> (usize, usize) {
        match self {
            VideoSystem::HdZero => (18, 50),
            VideoSystem::WtfOs => (22, 60),
            VideoSystem::Walksnail => (20, 53),
            VideoSystem::None => (0, 0),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            VideoSystem::HdZero => "HDZero",
            VideoSystem::WtfOs => "WtfOS",
            VideoSystem::Walksnail => "Walksnail",
            VideoSystem::None => "none",
        }
    }
}

impl std::fmt::Display for VideoSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
