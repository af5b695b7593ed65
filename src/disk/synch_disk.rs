use std::io;
use std::path::Path;

use log::{debug, trace};

use super::geometry::DiskGeometry;
use super::raw_disk::RawDisk;
use super::SECTOR_SIZE;

/// Synchronous wrapper around [`RawDisk`].
///
/// The underlying device only ever services one request at a time -- there
/// is no queueing, no interrupt-driven completion, and no overlap between a
/// read and the write that might follow it. Every caller blocks until its
/// own request finishes, which matches the single-in-flight-request
/// discipline of the cooperative scheduler: a process that touches the disk
/// is the only thing in the kernel running until that sector lands.
pub struct SynchDisk {
    raw: RawDisk,
}

impl SynchDisk {
    pub fn open_or_create(path: &Path, geometry: DiskGeometry) -> io::Result<Self> {
        let raw = RawDisk::open_or_create(path, geometry)?;
        debug!("disk opened at {} ({} sectors)", path.display(), geometry.total_sectors());
        Ok(SynchDisk { raw })
    }

    pub fn geometry(&self) -> DiskGeometry {
        self.raw.geometry()
    }

    pub fn read_sector(&mut self, sector: usize) -> io::Result<[u8; SECTOR_SIZE]> {
        trace!("disk read sector {sector}");
        self.raw.read_sector(sector)
    }

    pub fn write_sector(&mut self, sector: usize, data: &[u8; SECTOR_SIZE]) -> io::Result<()> {
        trace!("disk write sector {sector}");
        self.raw.write_sector(sector, data)
    }
}
