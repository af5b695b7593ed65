//! File system facade: owns the free-sector bitmap and the root directory,
//! and exposes format/create/remove/open/list over absolute paths.

use std::io;

use log::{debug, info};

use crate::bitmap::Bitmap;
use crate::disk::{SynchDisk, BITMAP_SECTOR, DIRECTORY_HEADER_SECTOR, SECTOR_SIZE};

use super::directory::Directory;
use super::file_header::FileHeader;
use super::open_file::OpenFile;

/// Number of entries in the root directory's table. Generous enough for a
/// small teaching file system without needing directory-file growth.
pub const NUM_DIR_ENTRIES: usize = 64;

pub struct FileSystem {
    free_map: Bitmap,
    directory: Directory,
    directory_header: FileHeader,
}

impl FileSystem {
    /// Format a fresh file system onto `disk`: a zeroed free-sector bitmap
    /// (with sectors 0 and 1 pre-claimed for the bitmap and the root
    /// directory's header) and an empty root directory.
    pub fn format(disk: &mut SynchDisk) -> io::Result<Self> {
        let total_sectors = disk.geometry().total_sectors();
        let mut free_map = Bitmap::new(total_sectors);
        free_map.set(BITMAP_SECTOR);
        free_map.set(DIRECTORY_HEADER_SECTOR);

        let mut directory_header = FileHeader::new();
        let directory = Directory::new(NUM_DIR_ENTRIES);
        let directory_bytes = directory.write_back();
        let directory_size = directory_bytes.len() as u32;
        if !directory_header.allocate(&mut free_map, directory_size) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "not enough free sectors to allocate the root directory file",
            ));
        }

        let mut fs = FileSystem {
            free_map,
            directory,
            directory_header,
        };
        fs.write_directory_header(disk)?;
        fs.write_directory_contents(disk)?;
        fs.write_free_map(disk)?;
        info!("formatted file system: {total_sectors} sectors, {NUM_DIR_ENTRIES} directory entries");
        Ok(fs)
    }

    /// Load a previously-formatted file system from `disk`.
    pub fn open(disk: &mut SynchDisk) -> io::Result<Self> {
        let bitmap_sector = disk.read_sector(BITMAP_SECTOR)?;
        let free_map = Bitmap::from_bytes(disk.geometry().total_sectors(), &bitmap_sector);

        let header_sector = disk.read_sector(DIRECTORY_HEADER_SECTOR)?;
        let directory_header = FileHeader::fetch_from(&header_sector);

        let mut fs = FileSystem {
            free_map,
            directory: Directory::new(NUM_DIR_ENTRIES),
            directory_header,
        };
        let directory_bytes = fs.read_directory_contents(disk)?;
        fs.directory = Directory::fetch_from(NUM_DIR_ENTRIES, &directory_bytes);
        Ok(fs)
    }

    fn write_directory_header(&self, disk: &mut SynchDisk) -> io::Result<()> {
        disk.write_sector(DIRECTORY_HEADER_SECTOR, &self.directory_header.write_back())
    }

    fn write_directory_contents(&mut self, disk: &mut SynchDisk) -> io::Result<()> {
        let bytes = self.directory.write_back();
        let mut open = OpenFile::new(disk, self.directory_header.clone(), DIRECTORY_HEADER_SECTOR as u32);
        open.write_at(&bytes, 0, &mut self.free_map)?;
        Ok(())
    }

    fn read_directory_contents(&mut self, disk: &mut SynchDisk) -> io::Result<Vec<u8>> {
        let length = self.directory_header.file_length() as usize;
        let mut buf = vec![0u8; length];
        let mut open = OpenFile::new(disk, self.directory_header.clone(), DIRECTORY_HEADER_SECTOR as u32);
        open.read_at(&mut buf, 0)?;
        Ok(buf)
    }

    fn write_free_map(&self, disk: &mut SynchDisk) -> io::Result<()> {
        let mut sector = [0u8; SECTOR_SIZE];
        let bytes = self.free_map.to_bytes();
        sector[..bytes.len().min(SECTOR_SIZE)].copy_from_slice(&bytes[..bytes.len().min(SECTOR_SIZE)]);
        disk.write_sector(BITMAP_SECTOR, &sector)
    }

    /// Create a new, empty file at `path` (must not end in `/`).
    pub fn create(&mut self, disk: &mut SynchDisk, path: &str, initial_size: u32) -> io::Result<bool> {
        if self.directory.find_index(path).is_some() {
            return Ok(false);
        }
        let Some(header_sector) = self.free_map.find_and_set_first_clear() else {
            return Ok(false);
        };

        let mut header = FileHeader::new();
        if !header.allocate(&mut self.free_map, initial_size) {
            self.free_map.clear(header_sector);
            return Ok(false);
        }

        if !self.directory.add(path, header_sector as u32) {
            header.deallocate(&mut self.free_map);
            self.free_map.clear(header_sector);
            return Ok(false);
        }

        disk.write_sector(header_sector, &header.write_back())?;
        self.write_directory_contents(disk)?;
        self.write_free_map(disk)?;
        debug!("created {path} (header sector {header_sector}, {initial_size} bytes)");
        Ok(true)
    }

    /// Open an existing file for reading/writing.
    pub fn open_file<'d>(&mut self, disk: &'d mut SynchDisk, path: &str) -> Option<OpenFile<'d>> {
        let sector = self.directory.find(path)?;
        let header_sector_data = disk.read_sector(sector as usize).ok()?;
        let header = FileHeader::fetch_from(&header_sector_data);
        Some(OpenFile::new(disk, header, sector))
    }

    /// Write `data` at `position` into the file at `path`, extending it
    /// (and claiming new sectors from the file system's own free map) as
    /// needed. Writes the updated file header back to disk.
    pub fn write_file(
        &mut self,
        disk: &mut SynchDisk,
        path: &str,
        position: u32,
        data: &[u8],
    ) -> io::Result<Option<usize>> {
        let Some(sector) = self.directory.find(path) else {
            return Ok(None);
        };
        let header_bytes = disk.read_sector(sector as usize)?;
        let header = FileHeader::fetch_from(&header_bytes);
        let mut open = OpenFile::new(disk, header, sector);
        let written = open.write_at(data, position, &mut self.free_map)?;
        self.write_free_map(disk)?;
        Ok(Some(written))
    }

    /// Remove a file or a whole directory subtree, freeing every sector
    /// (header and data) it owned.
    pub fn remove(&mut self, disk: &mut SynchDisk, path: &str) -> io::Result<bool> {
        let Some(header_sectors) = self.directory.remove(path) else {
            return Ok(false);
        };
        for header_sector in header_sectors {
            let header_bytes = disk.read_sector(header_sector as usize)?;
            let header = FileHeader::fetch_from(&header_bytes);
            header.deallocate(&mut self.free_map);
            self.free_map.clear(header_sector as usize);
        }
        self.write_directory_contents(disk)?;
        self.write_free_map(disk)?;
        Ok(true)
    }

    pub fn list(&self) -> Vec<String> {
        self.directory.list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::DiskGeometry;
    use tempfile::tempdir;

    #[test]
    fn format_then_create_then_open_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("disk.img");
        let mut disk = SynchDisk::open_or_create(&path, DiskGeometry::default()).unwrap();
        let mut fs = FileSystem::format(&mut disk).unwrap();

        assert!(fs.create(&mut disk, "/root/dev/small", 0).unwrap());
        let written = fs
            .write_file(&mut disk, "/root/dev/small", 0, b"hello")
            .unwrap()
            .unwrap();
        assert_eq!(written, 5);

        let mut file = fs.open_file(&mut disk, "/root/dev/small").unwrap();
        let mut buf = [0u8; 5];
        file.read_at(&mut buf, 0).unwrap();
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn create_duplicate_path_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("disk.img");
        let mut disk = SynchDisk::open_or_create(&path, DiskGeometry::default()).unwrap();
        let mut fs = FileSystem::format(&mut disk).unwrap();
        assert!(fs.create(&mut disk, "/root/a", 0).unwrap());
        assert!(!fs.create(&mut disk, "/root/a", 0).unwrap());
    }

    #[test]
    fn remove_frees_sectors_for_reuse() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("disk.img");
        let mut disk = SynchDisk::open_or_create(&path, DiskGeometry::default()).unwrap();
        let mut fs = FileSystem::format(&mut disk).unwrap();
        fs.create(&mut disk, "/root/a", 300).unwrap();
        let clear_before = fs.free_map.num_clear();
        assert!(fs.remove(&mut disk, "/root/a").unwrap());
        assert!(fs.free_map.num_clear() > clear_before);
        assert_eq!(fs.list(), vec!["/root/".to_string()]);
    }

    #[test]
    fn reopening_formatted_disk_preserves_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("disk.img");
        {
            let mut disk = SynchDisk::open_or_create(&path, DiskGeometry::default()).unwrap();
            let mut fs = FileSystem::format(&mut disk).unwrap();
            fs.create(&mut disk, "/root/a", 10).unwrap();
        }
        let mut disk = SynchDisk::open_or_create(&path, DiskGeometry::default()).unwrap();
        let fs = FileSystem::open(&mut disk).unwrap();
        assert_eq!(fs.list().len(), 2);
    }
}
