//! Loads a NOFF executable into a freshly paged address space.

use log::debug;

use crate::bitmap::Bitmap;
use crate::fs::OpenFile;

use super::mmu::{Mmu, PageTableEntry};
use super::noff::{NoffError, NoffHeader, NOFF_HEADER_SIZE, NOFF_MAGIC};
use super::registers::{Registers, REG_SP};

pub const PAGE_SIZE: u32 = crate::disk::SECTOR_SIZE as u32;
pub const NUM_PHYS_PAGES: u32 = 32;
pub const USER_STACK_SIZE: u32 = 1024;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Noff(#[from] NoffError),
    #[error("address space of {0} pages exceeds the {1} physical pages available")]
    TooLarge(u32, u32),
    #[error("out of free physical frames")]
    OutOfFrames,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct AddressSpace {
    pub space_id: u32,
    pub page_table: Vec<PageTableEntry>,
    pub num_pages: u32,
}

impl AddressSpace {
    /// Load `executable` into a fresh address space, claiming `space_id`
    /// from the caller's pid pool and physical frames from `frame_map`.
    pub fn load(
        space_id: u32,
        executable: &mut OpenFile<'_>,
        frame_map: &mut Bitmap,
        mmu: &mut Mmu,
        user_stack_size: u32,
    ) -> Result<Self, LoadError> {
        let mut header_bytes = vec![0u8; NOFF_HEADER_SIZE];
        executable.read_at(&mut header_bytes, 0)?;
        let header = NoffHeader::parse(&header_bytes)?;

        let size = header.footprint(user_stack_size);
        let num_pages = size.div_ceil(PAGE_SIZE);
        let total_phys_pages = frame_map.len() as u32;
        if num_pages > total_phys_pages {
            return Err(LoadError::TooLarge(num_pages, total_phys_pages));
        }

        debug!("initializing address space {space_id}, {num_pages} pages");

        let mut page_table = Vec::with_capacity(num_pages as usize);
        for virtual_page in 0..num_pages {
            let physical_page = frame_map
                .find_and_set_first_clear()
                .ok_or(LoadError::OutOfFrames)? as u32;
            mmu.zero_physical_page(physical_page);
            page_table.push(PageTableEntry {
                virtual_page,
                physical_page,
                valid: true,
                read_only: false,
                used: false,
                dirty: false,
            });
        }

        if header.code.size > 0 {
            debug!(
                "loading code segment at 0x{:x}, size {}",
                header.code.virtual_addr, header.code.size
            );
            let mut buf = vec![0u8; header.code.size as usize];
            executable.read_at(&mut buf, header.code.in_file_addr)?;
            place_segment(mmu, &page_table, header.code.virtual_addr, &buf);
        }
        if header.init_data.size > 0 {
            debug!(
                "loading data segment at 0x{:x}, size {}",
                header.init_data.virtual_addr, header.init_data.size
            );
            let mut buf = vec![0u8; header.init_data.size as usize];
            executable.read_at(&mut buf, header.init_data.in_file_addr)?;
            place_segment(mmu, &page_table, header.init_data.virtual_addr, &buf);
        }

        Ok(AddressSpace {
            space_id,
            page_table,
            num_pages,
        })
    }

    /// Release every physical frame this address space owns.
    pub fn release(&self, frame_map: &mut Bitmap) {
        for entry in &self.page_table {
            frame_map.clear(entry.physical_page as usize);
        }
    }

    /// Zero every general register, and set PC/NextPC/SP for a fresh start.
    pub fn init_registers(&self, registers: &mut Registers) {
        registers.reset();
        registers.set_pc(0);
        registers.set_next_pc(4);
        let sp = self.num_pages * PAGE_SIZE - 16;
        registers.set(REG_SP, sp);
        debug!("stack register initialized to {sp}");
    }

    /// Install this address space's page table into the MMU on a context
    /// switch in. Saving state on the way out is a no-op: there is nothing
    /// else address-space-specific to preserve.
    pub fn page_table(&self) -> &[PageTableEntry] {
        &self.page_table
    }
}

/// Copy a segment's file contents into physical memory at the page(s) its
/// virtual address maps to. Segments are assumed to start at a page
/// boundary relative to the translation already set up in `page_table`
/// (true for every NOFF file the loader produces).
fn place_segment(mmu: &mut Mmu, page_table: &[PageTableEntry], virtual_addr: u32, data: &[u8]) {
    let page = virtual_addr / PAGE_SIZE;
    let offset = virtual_addr % PAGE_SIZE;
    let entry = page_table
        .iter()
        .find(|e| e.virtual_page == page)
        .expect("segment virtual address must fall within the loaded page table");
    let physical_addr = entry.physical_page * PAGE_SIZE + offset;
    mmu.write_physical(physical_addr, data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::{DiskGeometry, SynchDisk};
    use crate::fs::FileSystem;
    use crate::memory::RamMemory;
    use tempfile::tempdir;

    fn noff_bytes(code: &[u8], init_data: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        let header_len = NOFF_HEADER_SIZE as u32;
        bytes.extend_from_slice(&NOFF_MAGIC.to_le_bytes());
        // code segment
        bytes.extend_from_slice(&(code.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&header_len.to_le_bytes());
        // initData segment
        bytes.extend_from_slice(&(init_data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(code.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(header_len + code.len() as u32).to_le_bytes());
        // uninitData segment (empty)
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&(code.len() as u32 + init_data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());

        bytes.extend_from_slice(code);
        bytes.extend_from_slice(init_data);
        bytes
    }

    #[test]
    fn loads_code_and_data_segments_into_physical_memory() {
        let dir = tempdir().unwrap();
        let disk_path = dir.path().join("disk.img");
        let mut disk = SynchDisk::open_or_create(&disk_path, DiskGeometry::default()).unwrap();
        let mut fs = FileSystem::format(&mut disk).unwrap();

        let code = vec![0xAAu8; 40];
        let init_data = vec![0xBBu8; 10];
        let image = noff_bytes(&code, &init_data);
        fs.create(&mut disk, "/root/prog", image.len() as u32).unwrap();
        fs.write_file(&mut disk, "/root/prog", 0, &image).unwrap();

        let mut ram = RamMemory::new((NUM_PHYS_PAGES * PAGE_SIZE) as usize);
        let mut frame_map = Bitmap::new(NUM_PHYS_PAGES as usize);
        let mut mmu = Mmu::new(&mut ram, PAGE_SIZE);

        let mut executable = fs.open_file(&mut disk, "/root/prog").unwrap();
        let space = AddressSpace::load(100, &mut executable, &mut frame_map, &mut mmu, USER_STACK_SIZE).unwrap();

        assert!(space.num_pages >= 1);
        assert_eq!(mmu.read_mem(space.page_table(), 0).unwrap(), 0xAA);
        assert_eq!(
            mmu.read_mem(space.page_table(), code.len() as u32).unwrap(),
            0xBB
        );
    }

    #[test]
    fn init_registers_sets_pc_and_stack() {
        let dir = tempdir().unwrap();
        let disk_path = dir.path().join("disk.img");
        let mut disk = SynchDisk::open_or_create(&disk_path, DiskGeometry::default()).unwrap();
        let mut fs = FileSystem::format(&mut disk).unwrap();
        let image = noff_bytes(&[0x90; 4], &[]);
        fs.create(&mut disk, "/root/prog", image.len() as u32).unwrap();
        fs.write_file(&mut disk, "/root/prog", 0, &image).unwrap();

        let mut ram = RamMemory::new((NUM_PHYS_PAGES * PAGE_SIZE) as usize);
        let mut frame_map = Bitmap::new(NUM_PHYS_PAGES as usize);
        let mut mmu = Mmu::new(&mut ram, PAGE_SIZE);
        let mut executable = fs.open_file(&mut disk, "/root/prog").unwrap();
        let space = AddressSpace::load(100, &mut executable, &mut frame_map, &mut mmu, USER_STACK_SIZE).unwrap();

        let mut registers = Registers::new();
        space.init_registers(&mut registers);
        assert_eq!(registers.pc(), 0);
        assert_eq!(registers.next_pc(), 4);
        assert_eq!(registers.get(REG_SP), space.num_pages * PAGE_SIZE - 16);
    }
}
