//! Character grid fed by display-port messages

use super::{VideoSystem, MAX_COLS, MAX_ROWS};
use crate::protocol::{command, MspMessage};

/// Display-port sub-commands carried in the first payload byte
const DP_CLEAR_SCREEN: u8 = 2;
const DP_WRITE_STRING: u8 = 3;
const DP_DRAW_SCREEN: u8 = 4;
const DP_SET_OPTIONS: u8 = 5;

/// Extended characters live in the upper half of the 512-glyph font
const EXTENDED_CHAR_BIT: u16 = 0x100;

/// What a message changed on the screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsdUpdate {
    VideoSystemChanged(VideoSystem),
    Cleared,
    Written { row: usize, col: usize, len: usize },
    Drawn,
}

/// On-screen display state
#[derive(Debug, Clone)]
pub struct OsdScreen {
    cells: Vec<u16>,
    video_system: VideoSystem,
    frames_drawn: u64,
}

impl OsdScreen {
    pub fn new() -> Self {
        Self {
            cells: vec![0; MAX_ROWS * MAX_COLS],
            video_system: VideoSystem::None,
            frames_drawn: 0,
        }
    }

    pub fn video_system(&self) -> VideoSystem {
        self.video_system
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Character code at a cell, `None` outside the grid
    pub fn get(&self, row: usize, col: usize) -> Option<u16> {
        (row < MAX_ROWS && col < MAX_COLS).then(|| self.cells[row * MAX_COLS + col])
    }

    /// Store a character; writes outside the grid are clipped
    pub fn set(&mut self, row: usize, col: usize, character: u16) -> bool {
        if row >= MAX_ROWS || col >= MAX_COLS {
            return false;
        }
        self.cells[row * MAX_COLS + col] = character;
        true
    }

    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// Number of non-blank cells
    pub fn populated(&self) -> usize {
        self.cells.iter().filter(|&&c| c != 0 && c != b' ' as u16).count()
    }

    /// Printable ASCII view of a row within the active video system
    pub fn row_text(&self, row: usize) -> String {
        let (_, cols) = self.video_system.dimensions();
        (0..cols)
            .map(|col| match self.get(row, col) {
                Some(c) if (0x20..0x7F).contains(&c) => c as u8 as char,
                _ => ' ',
            })
            .collect()
    }

    /// Apply a message from the flight controller
    pub fn handle(&mut self, message: &MspMessage) -> Option<OsdUpdate> {
        let data = &message.payload[..];
        if data.is_empty() {
            return None;
        }

        match message.code {
            command::MSP2_INAV_OSD_PREFERENCES => {
                self.video_system = VideoSystem::from_preference(data[0]);
                tracing::info!("Video system: {}", self.video_system);
                Some(OsdUpdate::VideoSystemChanged(self.video_system))
            }
            command::MSP_DISPLAYPORT => self.handle_displayport(data),
            _ => None,
        }
    }

    fn handle_displayport(&mut self, data: &[u8]) -> Option<OsdUpdate> {
        match data[0] {
            DP_CLEAR_SCREEN => {
                self.clear();
                Some(OsdUpdate::Cleared)
            }
            DP_WRITE_STRING => {
                if data.len() < 5 {
                    return None;
                }
                let row = data[1] as usize;
                let col = data[2] as usize;
                let extended = data[3] != 0;

                let mut written = 0;
                for (i, &byte) in data[4..].iter().enumerate() {
                    let character = if extended {
                        byte as u16 | EXTENDED_CHAR_BIT
                    } else {
                        byte as u16
                    };
                    if self.set(row, col + i, character) {
                        written += 1;
                    }
                }
                Some(OsdUpdate::Written {
                    row,
                    col,
                    len: written,
                })
            }
            DP_DRAW_SCREEN => {
                self.frames_drawn += 1;
                Some(OsdUpdate::Drawn)
            }
            DP_SET_OPTIONS => None,
            other => {
                tracing::trace!("Ignoring display-port sub-command {}", other);
                None
            }
        }
    }
}

impl Default for OsdScreen {
    fn default() -> Self {
        Self::new()
    }
}
