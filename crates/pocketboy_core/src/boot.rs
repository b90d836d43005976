//! Boot ROM shadow device.
//!
//! Registered ahead of the cartridge, so while mapped it wins the bus
//! priority scan for the low address range. Any write to 0xFF50 unmaps it
//! for the rest of the machine's life.

use anyhow::{bail, Result};

use crate::bus::AddressSpace;

const DMG_BOOT_LEN: usize = 0x100;
const CGB_BOOT_LEN: usize = 0x900;

pub struct BootRom {
    data: Vec<u8>,
    mapped: bool,
    cgb: bool,
}

impl BootRom {
    /// Wrap a boot ROM image. DMG images are 256 bytes; CGB images are
    /// 2304 bytes with the cartridge header window at 0x100-0x1FF unused.
    pub fn new(data: Vec<u8>, cgb: bool) -> Result<Self> {
        let expected = if cgb { CGB_BOOT_LEN } else { DMG_BOOT_LEN };
        if data.len() != expected {
            bail!(
                "boot ROM image is {} bytes, expected {}",
                data.len(),
                expected
            );
        }
        Ok(Self {
            data,
            mapped: true,
            cgb,
        })
    }

    /// A permanently unmapped placeholder used when the machine boots
    /// straight into the post-boot register state.
    pub fn absent() -> Self {
        Self {
            data: Vec::new(),
            mapped: false,
            cgb: false,
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub(crate) fn set_mapped(&mut self, mapped: bool) {
        self.mapped = mapped && !self.data.is_empty();
    }
}

impl AddressSpace for BootRom {
    fn accepts(&self, addr: u16) -> bool {
        if addr == 0xFF50 {
            return true;
        }
        if !self.mapped {
            return false;
        }
        addr < 0x0100 || (self.cgb && (0x0200..0x0900).contains(&addr))
    }

    fn read(&self, addr: u16) -> u8 {
        if addr == 0xFF50 {
            return 0xFF;
        }
        self.data[addr as usize]
    }

    fn write(&mut self, addr: u16, _value: u8) {
        if addr == 0xFF50 {
            self.mapped = false;
        }
        // The ROM itself ignores writes.
    }
}
