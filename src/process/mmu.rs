//! Page table and virtual-to-physical address translation over a flat
//! [`RamMemory`].

use crate::memory::{Memory, RamMemory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTableEntry {
    pub virtual_page: u32,
    pub physical_page: u32,
    pub valid: bool,
    pub read_only: bool,
    pub used: bool,
    pub dirty: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum MemoryAccessError {
    #[error("virtual address {0} is outside the address space")]
    AddressOutOfBounds(u32),
    #[error("page {0} has no valid mapping")]
    PageFault(u32),
}

pub struct Mmu<'m> {
    memory: &'m mut RamMemory,
    page_size: u32,
}

impl<'m> Mmu<'m> {
    pub fn new(memory: &'m mut RamMemory, page_size: u32) -> Self {
        Mmu { memory, page_size }
    }

    fn translate(
        &self,
        page_table: &[PageTableEntry],
        virtual_addr: u32,
    ) -> Result<u32, MemoryAccessError> {
        let page_size = self.page_size;
        let virtual_page = virtual_addr / page_size;
        let offset = virtual_addr % page_size;
        let entry = page_table
            .iter()
            .find(|e| e.virtual_page == virtual_page)
            .ok_or(MemoryAccessError::AddressOutOfBounds(virtual_addr))?;
        if !entry.valid {
            return Err(MemoryAccessError::PageFault(virtual_page));
        }
        Ok(entry.physical_page * page_size + offset)
    }

    pub fn read_mem(
        &self,
        page_table: &[PageTableEntry],
        virtual_addr: u32,
    ) -> Result<u8, MemoryAccessError> {
        let physical_addr = self.translate(page_table, virtual_addr)?;
        Ok(self.memory.read_byte(physical_addr))
    }

    pub fn write_mem(
        &mut self,
        page_table: &[PageTableEntry],
        virtual_addr: u32,
        value: u8,
    ) -> Result<(), MemoryAccessError> {
        let physical_addr = self.translate(page_table, virtual_addr)?;
        self.memory.write_byte(physical_addr, value);
        Ok(())
    }

    /// Read a NUL-terminated string out of user memory, for syscalls like
    /// `exec` that pass a filename by pointer. `max_len` bounds the scratch
    /// buffer the same way a fixed-size kernel stack buffer would.
    pub fn read_c_string(
        &self,
        page_table: &[PageTableEntry],
        virtual_addr: u32,
        max_len: usize,
    ) -> Result<String, MemoryAccessError> {
        let mut bytes = Vec::new();
        for i in 0..max_len {
            let byte = self.read_mem(page_table, virtual_addr + i as u32)?;
            if byte == 0 {
                break;
            }
            bytes.push(byte);
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Copy bytes from physical memory at `physical_addr` into user memory
    /// via the page table, used by the loader to place segment contents.
    pub fn write_physical(&mut self, physical_addr: u32, data: &[u8]) {
        let start = physical_addr as usize;
        self.memory.as_mut_slice()[start..start + data.len()].copy_from_slice(data);
    }

    pub fn zero_physical_page(&mut self, physical_page: u32) {
        self.memory
            .zero_range((physical_page * self.page_size) as usize, self.page_size as usize);
    }
}
