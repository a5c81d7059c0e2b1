//! A headless SNES-shaped machine.
//!
//! It has no CPU core; it only keeps the memory map and run state that the
//! network server inspects. The binary serves it directly, and the tests use
//! it as the emulator collaborator.

use parking_lot::{Mutex, MutexGuard};

use crate::{
    emulator::{ConsoleType, EmulationStatus, Emulator, GameInfo, MemorySpace},
    region::MemoryRegion,
};

const SRAM_SIZE: usize = 0x2000;
const WRAM_SIZE: usize = 0x2_0000;
const VRAM_SIZE: usize = 0x1_0000;
const OAM_SIZE: usize = 544;
const CGRAM_SIZE: usize = 512;
const CPU_BUS_BACKING: usize = 0x2_0000;
const APU_BUS_BACKING: usize = 0x1_0000;

/// One backing store per region, indexed by [`MemoryRegion::index`].
#[derive(Debug, Clone)]
pub struct MemoryBank {
    regions: [Vec<u8>; MemoryRegion::ALL.len()],
}

impl MemoryBank {
    pub fn snes() -> Self {
        let mut bank = Self {
            regions: Default::default(),
        };
        bank.replace(MemoryRegion::Sram, vec![0; SRAM_SIZE]);
        bank.replace(MemoryRegion::Wram, vec![0; WRAM_SIZE]);
        bank.replace(MemoryRegion::Vram, vec![0; VRAM_SIZE]);
        bank.replace(MemoryRegion::Oam, vec![0; OAM_SIZE]);
        bank.replace(MemoryRegion::CgRam, vec![0; CGRAM_SIZE]);
        bank.replace(MemoryRegion::CpuBus, vec![0; CPU_BUS_BACKING]);
        bank.replace(MemoryRegion::ApuBus, vec![0; APU_BUS_BACKING]);
        bank
    }

    pub fn replace(&mut self, region: MemoryRegion, data: Vec<u8>) {
        self.regions[region.index()] = data;
    }

    fn clear_volatile(&mut self) {
        for region in [
            MemoryRegion::Wram,
            MemoryRegion::Vram,
            MemoryRegion::Oam,
            MemoryRegion::CgRam,
        ] {
            self.regions[region.index()].fill(0);
        }
    }
}

impl MemorySpace for MemoryBank {
    fn region(&self, region: MemoryRegion) -> &[u8] {
        &self.regions[region.index()]
    }

    fn region_mut(&mut self, region: MemoryRegion) -> &mut [u8] {
        &mut self.regions[region.index()]
    }
}

struct BankGuard<'a>(MutexGuard<'a, MemoryBank>);

impl MemorySpace for BankGuard<'_> {
    fn region(&self, region: MemoryRegion) -> &[u8] {
        self.0.region(region)
    }

    fn region_mut(&mut self, region: MemoryRegion) -> &mut [u8] {
        self.0.region_mut(region)
    }
}

#[derive(Debug)]
struct MachineState {
    console: Option<ConsoleType>,
    game: Option<GameInfo>,
    paused: bool,
    resets: u64,
    power_cycles: u64,
}

#[derive(Debug)]
pub struct HeadlessEmulator {
    name: String,
    version: String,
    machine: Mutex<MachineState>,
    memory: Mutex<MemoryBank>,
}

impl HeadlessEmulator {
    pub fn snes() -> Self {
        Self {
            name: "nwa_server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            machine: Mutex::new(MachineState {
                console: Some(ConsoleType::Snes),
                game: None,
                paused: false,
                resets: 0,
                power_cycles: 0,
            }),
            memory: Mutex::new(MemoryBank::snes()),
        }
    }

    pub fn with_console(self, console: Option<ConsoleType>) -> Self {
        self.machine.lock().console = console;
        self
    }

    pub fn with_region(self, region: MemoryRegion, data: Vec<u8>) -> Self {
        self.memory.lock().replace(region, data);
        self
    }

    /// Places a cartridge image in CARTROM and starts running it.
    pub fn load_game(&self, game: GameInfo, rom: Vec<u8>) {
        self.memory.lock().replace(MemoryRegion::CartRom, rom);
        let mut machine = self.machine.lock();
        machine.game = Some(game);
        machine.paused = false;
    }

    pub fn resets(&self) -> u64 {
        self.machine.lock().resets
    }

    pub fn power_cycles(&self) -> u64 {
        self.machine.lock().power_cycles
    }
}

impl Emulator for HeadlessEmulator {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn status(&self) -> EmulationStatus {
        let machine = self.machine.lock();
        match (&machine.game, machine.paused) {
            (None, _) => EmulationStatus::NoGame,
            (Some(_), true) => EmulationStatus::Paused,
            (Some(_), false) => EmulationStatus::Running,
        }
    }

    fn game(&self) -> Option<GameInfo> {
        self.machine.lock().game.clone()
    }

    fn console(&self) -> Option<ConsoleType> {
        self.machine.lock().console
    }

    fn reset(&self) {
        let mut machine = self.machine.lock();
        machine.resets += 1;
        machine.paused = false;
    }

    fn stop(&self) {
        let mut machine = self.machine.lock();
        machine.game = None;
        machine.paused = false;
    }

    fn pause(&self) {
        let mut machine = self.machine.lock();
        if machine.game.is_some() {
            machine.paused = true;
        }
    }

    fn resume(&self) {
        self.machine.lock().paused = false;
    }

    fn power_cycle(&self) {
        self.memory.lock().clear_volatile();
        let mut machine = self.machine.lock();
        machine.power_cycles += 1;
        machine.paused = false;
    }

    fn lock(&self) -> Box<dyn MemorySpace + '_> {
        Box::new(BankGuard(self.memory.lock()))
    }
}
