/*
 * Pedagogical OS Emulator Core
 * ============================
 *
 * This library provides the core of a teaching operating-system emulator:
 * an on-disk file system layered over a simulated block device, and a
 * user-process substrate that loads a relocatable executable into a paged
 * address space and dispatches the syscalls it raises.
 *
 * Components:
 * ----------
 * - Bitmap allocator (free sectors, pids, physical frames)
 * - Simulated block device (disk)
 * - File system (free-sector bitmap, file headers, hierarchical directory)
 * - Process substrate (address spaces, MMU, syscall dispatcher, scheduler)
 * - Kernel context (wires the above together; no ambient globals)
 * - Config (disk geometry and process limits, loaded from TOML)
 */

pub mod bitmap;
pub mod config;
pub mod disk;
pub mod fs;
pub mod kernel;
pub mod memory;
pub mod process;

// Re-export commonly used types
pub use bitmap::Bitmap;
pub use config::KernelConfig;
pub use disk::{DiskGeometry, SynchDisk};
pub use fs::FileSystem;
pub use kernel::Kernel;
pub use memory::RamMemory;
