//! Contract between the network server and the emulator it controls.
//!
//! The server never touches emulator internals directly. Lifecycle requests go
//! through [`Emulator`], and memory access goes through the [`MemorySpace`]
//! guard returned by [`Emulator::lock`], which keeps emulation from advancing
//! until it is dropped.

use crate::region::MemoryRegion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmulationStatus {
    NoGame,
    Paused,
    Running,
}

impl EmulationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EmulationStatus::NoGame => "no_game",
            EmulationStatus::Paused => "paused",
            EmulationStatus::Running => "running",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleType {
    Snes,
    Nes,
}

/// Metadata about the loaded content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GameInfo {
    pub name: String,
    pub file: String,
    pub region: Option<String>,
    pub kind: Option<String>,
}

impl GameInfo {
    /// Builds metadata from a file name, using it as the display name too.
    pub fn from_file(file: impl Into<String>) -> Self {
        let file = file.into();
        Self {
            name: file.clone(),
            file,
            region: None,
            kind: None,
        }
    }
}

/// Backing stores for each exposed region.
///
/// For the pseudo-bus regions the backing store may be shorter than the
/// logical bus size; the gateway treats the remainder as unmapped.
pub trait MemorySpace {
    fn region(&self, region: MemoryRegion) -> &[u8];
    fn region_mut(&mut self, region: MemoryRegion) -> &mut [u8];
}

pub trait Emulator: Send + Sync {
    fn name(&self) -> &str;
    fn version(&self) -> &str;

    fn status(&self) -> EmulationStatus;
    fn game(&self) -> Option<GameInfo>;
    fn console(&self) -> Option<ConsoleType>;

    fn reset(&self);
    fn stop(&self);
    fn pause(&self);
    fn resume(&self);
    fn power_cycle(&self);

    /// Acquires the execution lock. Emulation is held until the guard drops.
    fn lock(&self) -> Box<dyn MemorySpace + '_>;
}
