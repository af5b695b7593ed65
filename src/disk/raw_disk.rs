use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::geometry::DiskGeometry;
use super::SECTOR_SIZE;

/// A host-file-backed sector store. The simulated disk is just a
/// fixed-length UNIX file; sector `n` lives at byte offset `n * SECTOR_SIZE`.
pub struct RawDisk {
    file: File,
    path: PathBuf,
    geometry: DiskGeometry,
}

impl RawDisk {
    /// Open an existing disk image, or create and zero-fill a fresh one
    /// sized to `geometry`.
    pub fn open_or_create(path: &Path, geometry: DiskGeometry) -> io::Result<Self> {
        let total_bytes = (geometry.total_sectors() * SECTOR_SIZE) as u64;
        let is_new = !path.exists();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        let mut disk = RawDisk {
            file,
            path: path.to_path_buf(),
            geometry,
        };

        if is_new {
            disk.file.set_len(total_bytes)?;
        } else {
            let actual_len = disk.file.metadata()?.len();
            if actual_len != total_bytes {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "disk image {} has length {actual_len}, expected {total_bytes} for {}x{} geometry",
                        disk.path.display(),
                        geometry.tracks,
                        geometry.sectors_per_track,
                    ),
                ));
            }
        }

        Ok(disk)
    }

    pub fn geometry(&self) -> DiskGeometry {
        self.geometry
    }

    fn check_sector(&self, sector: usize) -> io::Result<()> {
        if sector >= self.geometry.total_sectors() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("sector {sector} out of range (disk has {} sectors)", self.geometry.total_sectors()),
            ));
        }
        Ok(())
    }

    pub fn read_sector(&mut self, sector: usize) -> io::Result<[u8; SECTOR_SIZE]> {
        self.check_sector(sector)?;
        let mut buf = [0u8; SECTOR_SIZE];
        self.file.seek(SeekFrom::Start((sector * SECTOR_SIZE) as u64))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn write_sector(&mut self, sector: usize, data: &[u8; SECTOR_SIZE]) -> io::Result<()> {
        self.check_sector(sector)?;
        self.file.seek(SeekFrom::Start((sector * SECTOR_SIZE) as u64))?;
        self.file.write_all(data)?;
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_fresh_disk_is_zero_filled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("disk.img");
        let mut disk = RawDisk::open_or_create(&path, DiskGeometry::default()).unwrap();
        let sector = disk.read_sector(0).unwrap();
        assert_eq!(sector, [0u8; SECTOR_SIZE]);
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("disk.img");
        let mut disk = RawDisk::open_or_create(&path, DiskGeometry::default()).unwrap();

        let mut data = [0u8; SECTOR_SIZE];
        data[0] = 0xAB;
        data[SECTOR_SIZE - 1] = 0xCD;
        disk.write_sector(5, &data).unwrap();

        let read_back = disk.read_sector(5).unwrap();
        assert_eq!(read_back, data);
    }

    #[test]
    fn reopening_an_existing_image_preserves_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("disk.img");
        {
            let mut disk = RawDisk::open_or_create(&path, DiskGeometry::default()).unwrap();
            let mut data = [0u8; SECTOR_SIZE];
            data[3] = 7;
            disk.write_sector(10, &data).unwrap();
        }
        let mut disk = RawDisk::open_or_create(&path, DiskGeometry::default()).unwrap();
        let data = disk.read_sector(10).unwrap();
        assert_eq!(data[3], 7);
    }

    #[test]
    fn out_of_range_sector_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("disk.img");
        let mut disk = RawDisk::open_or_create(&path, DiskGeometry::default()).unwrap();
        assert!(disk.read_sector(1024).is_err());
    }
}
