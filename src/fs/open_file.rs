//! A file open for reading/writing: a current seek position plus the
//! underlying file header's sector map.

use std::io;

use crate::disk::{SynchDisk, SECTOR_SIZE};

use super::file_header::FileHeader;

pub struct OpenFile<'d> {
    disk: &'d mut SynchDisk,
    header: FileHeader,
    header_sector: u32,
    seek_position: u32,
}

impl<'d> OpenFile<'d> {
    pub fn new(disk: &'d mut SynchDisk, header: FileHeader, header_sector: u32) -> Self {
        OpenFile {
            disk,
            header,
            header_sector,
            seek_position: 0,
        }
    }

    pub fn length(&self) -> u32 {
        self.header.file_length()
    }

    pub fn seek(&mut self, position: u32) {
        self.seek_position = position;
    }

    /// Read up to `buf.len()` bytes starting at the current seek position,
    /// advancing it. Returns the number of bytes actually read.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.read_at(buf, self.seek_position)?;
        self.seek_position += n as u32;
        Ok(n)
    }

    /// Write `buf` starting at the current seek position, advancing it and
    /// extending the file (and claiming new sectors) as needed.
    pub fn write(&mut self, buf: &[u8], free_map: &mut crate::bitmap::Bitmap) -> io::Result<usize> {
        let n = self.write_at(buf, self.seek_position, free_map)?;
        self.seek_position += n as u32;
        Ok(n)
    }

    pub fn read_at(&mut self, buf: &mut [u8], position: u32) -> io::Result<usize> {
        let file_length = self.header.file_length();
        if position >= file_length {
            return Ok(0);
        }
        let want = buf.len().min((file_length - position) as usize);
        let mut read = 0;
        while read < want {
            let offset = position + read as u32;
            let sector = self.header.byte_to_sector(offset);
            let sector_data = self.disk.read_sector(sector as usize)?;
            let within_sector = (offset as usize) % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - within_sector).min(want - read);
            buf[read..read + chunk].copy_from_slice(&sector_data[within_sector..within_sector + chunk]);
            read += chunk;
        }
        Ok(read)
    }

    pub fn write_at(
        &mut self,
        buf: &[u8],
        position: u32,
        free_map: &mut crate::bitmap::Bitmap,
    ) -> io::Result<usize> {
        let end = position + buf.len() as u32;
        if end > self.header.file_length() {
            let increment = end - self.header.file_length();
            if !self.header.append(free_map, increment) {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    "not enough free disk space to extend file",
                ));
            }
        }

        let mut written = 0;
        while written < buf.len() {
            let offset = position + written as u32;
            let sector = self.header.byte_to_sector(offset);
            let mut sector_data = self.disk.read_sector(sector as usize)?;
            let within_sector = (offset as usize) % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - within_sector).min(buf.len() - written);
            sector_data[within_sector..within_sector + chunk]
                .copy_from_slice(&buf[written..written + chunk]);
            self.disk.write_sector(sector as usize, &sector_data)?;
            written += chunk;
        }

        self.disk.write_sector(self.header_sector as usize, &self.header.write_back())?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::Bitmap;
    use crate::disk::DiskGeometry;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_round_trips_across_sectors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("disk.img");
        let mut disk = SynchDisk::open_or_create(&path, DiskGeometry::default()).unwrap();
        let mut free_map = Bitmap::new(disk.geometry().total_sectors());
        free_map.set(0);
        free_map.set(1);

        let header_sector = free_map.find_and_set_first_clear().unwrap() as u32;
        let header = FileHeader::new();
        let mut file = OpenFile::new(&mut disk, header, header_sector);

        let payload: Vec<u8> = (0..300u32).map(|i| (i % 256) as u8).collect();
        let written = file.write_at(&payload, 0, &mut free_map).unwrap();
        assert_eq!(written, payload.len());

        let mut readback = vec![0u8; payload.len()];
        let read = file.read_at(&mut readback, 0).unwrap();
        assert_eq!(read, payload.len());
        assert_eq!(readback, payload);
    }

    #[test]
    fn read_past_end_of_file_returns_zero() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("disk.img");
        let mut disk = SynchDisk::open_or_create(&path, DiskGeometry::default()).unwrap();
        let mut free_map = Bitmap::new(disk.geometry().total_sectors());
        free_map.set(0);
        free_map.set(1);
        let header_sector = free_map.find_and_set_first_clear().unwrap() as u32;
        let header = FileHeader::new();
        let mut file = OpenFile::new(&mut disk, header, header_sector);

        let mut buf = [0u8; 10];
        assert_eq!(file.read_at(&mut buf, 0).unwrap(), 0);
    }
}
