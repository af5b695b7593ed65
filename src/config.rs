//! Kernel configuration: disk geometry and process limits, loaded from a
//! small TOML file rather than hardcoded the way the teacher's emulator
//! hardcodes its 1MB RAM size and `drive_c` path.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::disk::DiskGeometry;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub tracks: usize,
    pub sectors_per_track: usize,
    pub num_phys_pages: u32,
    pub user_stack_size: u32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig {
            tracks: crate::disk::NUM_TRACKS,
            sectors_per_track: crate::disk::SECTORS_PER_TRACK,
            num_phys_pages: crate::process::address_space::NUM_PHYS_PAGES,
            user_stack_size: crate::process::address_space::USER_STACK_SIZE,
        }
    }
}

impl KernelConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn geometry(&self) -> DiskGeometry {
        DiskGeometry::new(self.tracks, self.sectors_per_track)
    }
}
