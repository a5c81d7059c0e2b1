//! Named memory regions exposed to remote clients.

/// Logical size of the CPU address space (24-bit bus).
pub const CPU_BUS_SIZE: usize = 0x100_0000;
/// Logical size of the audio processor address space.
pub const APU_BUS_SIZE: usize = 0x1_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryRegion {
    CartRom,
    Sram,
    Wram,
    Vram,
    Oam,
    CgRam,
    CpuBus,
    ApuBus,
}

impl MemoryRegion {
    /// Every region in the order `core_memories` reports them.
    pub const ALL: [MemoryRegion; 8] = [
        MemoryRegion::CartRom,
        MemoryRegion::Sram,
        MemoryRegion::Wram,
        MemoryRegion::Vram,
        MemoryRegion::Oam,
        MemoryRegion::CgRam,
        MemoryRegion::CpuBus,
        MemoryRegion::ApuBus,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MemoryRegion::CartRom => "CARTROM",
            MemoryRegion::Sram => "SRAM",
            MemoryRegion::Wram => "WRAM",
            MemoryRegion::Vram => "VRAM",
            MemoryRegion::Oam => "OAM",
            MemoryRegion::CgRam => "CGRAM",
            MemoryRegion::CpuBus => "CPUBUS",
            MemoryRegion::ApuBus => "APUBUS",
        }
    }

    /// Looks up a region by its wire name, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|region| region.name().eq_ignore_ascii_case(name))
    }

    /// Position of the region inside [`MemoryRegion::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Fixed logical size for the pseudo-bus regions, `None` for plain buffers.
    fn bus_size(self) -> Option<usize> {
        match self {
            MemoryRegion::CpuBus => Some(CPU_BUS_SIZE),
            MemoryRegion::ApuBus => Some(APU_BUS_SIZE),
            _ => None,
        }
    }

    /// Size advertised to clients and used for bounds checks.
    pub fn exposed_size(self, backing_len: usize) -> usize {
        self.bus_size().unwrap_or(backing_len)
    }
}
