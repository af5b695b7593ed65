//! Parser for the NOFF ("Nachos object file format") executable header:
//! a magic number plus three segment descriptors (code, initialized data,
//! uninitialized data).

pub const NOFF_MAGIC: u32 = 0xbadfad;
pub const NOFF_HEADER_SIZE: usize = 4 + 3 * 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Segment {
    pub size: u32,
    pub virtual_addr: u32,
    pub in_file_addr: u32,
}

impl Segment {
    fn from_bytes(bytes: &[u8]) -> Self {
        Segment {
            size: u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
            virtual_addr: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            in_file_addr: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
        }
    }

    fn swapped(self) -> Self {
        Segment {
            size: self.size.swap_bytes(),
            virtual_addr: self.virtual_addr.swap_bytes(),
            in_file_addr: self.in_file_addr.swap_bytes(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoffHeader {
    pub magic: u32,
    pub code: Segment,
    pub init_data: Segment,
    pub uninit_data: Segment,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NoffError {
    #[error("executable header is too short ({0} bytes)")]
    Truncated(usize),
    #[error("not a NOFF executable (bad magic number)")]
    BadMagic,
}

impl NoffHeader {
    /// Parse a header from its on-disk bytes, transparently byte-swapping
    /// every field if the file was written on a machine of the opposite
    /// endianness.
    pub fn parse(bytes: &[u8]) -> Result<Self, NoffError> {
        if bytes.len() < NOFF_HEADER_SIZE {
            return Err(NoffError::Truncated(bytes.len()));
        }

        let magic = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let mut header = NoffHeader {
            magic,
            code: Segment::from_bytes(&bytes[4..16]),
            init_data: Segment::from_bytes(&bytes[16..28]),
            uninit_data: Segment::from_bytes(&bytes[28..40]),
        };

        if header.magic != NOFF_MAGIC {
            let swapped_magic = header.magic.swap_bytes();
            if swapped_magic == NOFF_MAGIC {
                header.magic = swapped_magic;
                header.code = header.code.swapped();
                header.init_data = header.init_data.swapped();
                header.uninit_data = header.uninit_data.swapped();
            } else {
                return Err(NoffError::BadMagic);
            }
        }

        Ok(header)
    }

    /// Total address-space footprint the three segments plus a user stack
    /// of `stack_size` bytes require, before page-rounding.
    pub fn footprint(&self, stack_size: u32) -> u32 {
        self.code.size + self.init_data.size + self.uninit_data.size + stack_size
    }
}
