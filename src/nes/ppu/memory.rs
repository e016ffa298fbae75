use crate::nes::mapper::Mirroring;

pub const CHR_LEN: usize = 0x2000;
pub const NAMETABLE_LEN: usize = 0x0400;
pub const PALETTE_LEN: usize = 0x20;

const ADDRESS_SPACE: usize = 0x4000;
const NAMETABLE_BASE: usize = CHR_LEN;
// Four slots so four-screen boards get their extra 2 KiB.
const PALETTE_BASE: usize = NAMETABLE_BASE + 4 * NAMETABLE_LEN;
const PHYSICAL_LEN: usize = PALETTE_BASE + PALETTE_LEN;

/// The PPU's 16 KiB address space backed by pattern memory, nametable RAM
/// and palette RAM.
///
/// Every logical address resolves through a lookup table to a physical
/// cell, so mirroring never costs more than one indexed load. The table is
/// rebuilt whenever the nametable arrangement changes.
pub struct PpuMemory {
    physical: Vec<u8>,
    lookup: Vec<u16>,
    mirroring: Mirroring,
    chr_is_ram: bool,
}

impl Default for PpuMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl PpuMemory {
    pub fn new() -> Self {
        let mut memory = Self {
            physical: vec![0; PHYSICAL_LEN],
            lookup: vec![0; ADDRESS_SPACE],
            mirroring: Mirroring::Horizontal,
            chr_is_ram: true,
        };
        memory.physical[PALETTE_BASE..].fill(0x0F);
        memory.rebuild_lookup();
        memory
    }

    /// Copies pattern data into $0000-$1FFF. Short images are zero padded.
    pub fn load_chr(&mut self, chr: &[u8], is_ram: bool) {
        let len = chr.len().min(CHR_LEN);
        self.physical[..CHR_LEN].fill(0);
        self.physical[..len].copy_from_slice(&chr[..len]);
        self.chr_is_ram = is_ram;
    }

    pub fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    pub fn set_mirroring(&mut self, mirroring: Mirroring) {
        if self.mirroring != mirroring {
            self.mirroring = mirroring;
            self.rebuild_lookup();
        }
    }

    /// Clears nametable and palette RAM, keeping pattern memory.
    pub fn reset(&mut self) {
        self.physical[NAMETABLE_BASE..PALETTE_BASE].fill(0);
        self.physical[PALETTE_BASE..].fill(0x0F);
    }

    pub fn read(&self, addr: u16) -> u8 {
        self.physical[self.physical_index(addr)]
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        let index = self.physical_index(addr);
        if index < CHR_LEN && !self.chr_is_ram {
            return;
        }
        self.physical[index] = value;
    }

    /// Physical cell behind a logical address.
    pub fn physical_index(&self, addr: u16) -> usize {
        self.lookup[(addr as usize) & (ADDRESS_SPACE - 1)] as usize
    }

    /// Colour index stored at palette slot `index` (0..32), aliases applied.
    pub fn palette_entry(&self, index: u8) -> u8 {
        self.read(0x3F00 | (index as u16 & 0x1F))
    }

    pub fn peek_nametable(&self, index: usize) -> u8 {
        self.physical[NAMETABLE_BASE + index % (4 * NAMETABLE_LEN)]
    }

    pub fn peek_palette(&self, index: usize) -> u8 {
        self.physical[PALETTE_BASE + index % PALETTE_LEN]
    }

    fn rebuild_lookup(&mut self) {
        for (addr, slot) in self.lookup.iter_mut().enumerate() {
            *slot = map_address(addr as u16, self.mirroring) as u16;
        }
    }
}

fn map_address(addr: u16, mirroring: Mirroring) -> usize {
    let addr = addr & 0x3FFF;
    match addr {
        0x0000..=0x1FFF => addr as usize,
        0x2000..=0x3EFF => {
            let offset = (addr - 0x2000) & 0x0FFF;
            let slot = mirroring.nametable_slot(offset / NAMETABLE_LEN as u16) as usize;
            NAMETABLE_BASE + slot * NAMETABLE_LEN + (offset as usize % NAMETABLE_LEN)
        }
        _ => {
            let mut index = (addr & 0x001F) as usize;
            // Sprite backdrop entries alias the background ones.
            if index >= 0x10 && (index & 0x03) == 0 {
                index -= 0x10;
            }
            PALETTE_BASE + index
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn same_cell(memory: &PpuMemory, a: u16, b: u16) -> bool {
        memory.physical_index(a) == memory.physical_index(b)
    }

    #[test]
    fn horizontal_mirroring_pairs_tables() {
        let mut memory = PpuMemory::new();
        memory.set_mirroring(Mirroring::Horizontal);
        for offset in 0..0x400 {
            assert!(same_cell(&memory, 0x2400 + offset, 0x2000 + offset));
            assert!(same_cell(&memory, 0x2C00 + offset, 0x2800 + offset));
            assert!(!same_cell(&memory, 0x2000 + offset, 0x2800 + offset));
        }
    }

    #[test]
    fn vertical_mirroring_pairs_tables() {
        let mut memory = PpuMemory::new();
        memory.set_mirroring(Mirroring::Vertical);
        for offset in 0..0x400 {
            assert!(same_cell(&memory, 0x2800 + offset, 0x2000 + offset));
            assert!(same_cell(&memory, 0x2C00 + offset, 0x2400 + offset));
            assert!(!same_cell(&memory, 0x2000 + offset, 0x2400 + offset));
        }
    }

    #[test]
    fn lookup_is_rebuilt_on_mirroring_change() {
        let mut memory = PpuMemory::new();
        memory.set_mirroring(Mirroring::Vertical);
        memory.write(0x2400, 0x42);
        assert_eq!(memory.read(0x2C00), 0x42);

        memory.set_mirroring(Mirroring::Horizontal);
        assert_eq!(memory.read(0x2800), 0x42);
        assert_eq!(memory.read(0x2C00), 0x42);
        assert_eq!(memory.read(0x2400), 0x00);
    }

    #[test]
    fn upper_nametable_range_mirrors_down() {
        let memory = PpuMemory::new();
        assert!(same_cell(&memory, 0x3000, 0x2000));
        assert!(same_cell(&memory, 0x3EFF, 0x2EFF));
        assert!(same_cell(&memory, 0x4123, 0x0123));
    }

    #[test]
    fn palette_backdrop_aliases() {
        let mut memory = PpuMemory::new();
        let aliases = [
            (0x3F10, 0x3F00),
            (0x3F14, 0x3F04),
            (0x3F18, 0x3F08),
            (0x3F1C, 0x3F0C),
        ];
        for (mirror, base) in aliases {
            memory.write(mirror, 0x2A);
            assert_eq!(memory.read(base), 0x2A);
        }
        memory.write(0x3F11, 0x01);
        assert_eq!(memory.read(0x3F01), 0x0F);
        assert_eq!(memory.read(0x3F31), 0x01);
    }

    #[test]
    fn chr_rom_ignores_writes() {
        let mut memory = PpuMemory::new();
        memory.load_chr(&[0xAA; CHR_LEN], false);
        memory.write(0x0010, 0x55);
        assert_eq!(memory.read(0x0010), 0xAA);

        memory.load_chr(&[], true);
        memory.write(0x0010, 0x55);
        assert_eq!(memory.read(0x0010), 0x55);
    }

    #[test]
    fn four_screen_keeps_all_tables_distinct() {
        let mut memory = PpuMemory::new();
        memory.set_mirroring(Mirroring::FourScreen);
        for (i, base) in [0x2000u16, 0x2400, 0x2800, 0x2C00].into_iter().enumerate() {
            memory.write(base, i as u8 + 1);
        }
        assert_eq!(memory.peek_nametable(0), 1);
        assert_eq!(memory.peek_nametable(0xC00), 4);
    }
}
