//! The kernel context: owns the disk, the file system, main memory, the
//! frame pool, and the process scheduler, and drives the cooperative
//! syscall loop. There are no global singletons -- every entry point is
//! reached through a `Kernel` value passed explicitly by the caller.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use log::{debug, info};

use crate::bitmap::Bitmap;
use crate::disk::{DiskGeometry, SynchDisk};
use crate::fs::FileSystem;
use crate::memory::RamMemory;
use crate::process::address_space::{AddressSpace, LoadError, NUM_PHYS_PAGES, PAGE_SIZE, USER_STACK_SIZE};
use crate::process::mmu::Mmu;
use crate::process::registers::{REG_ARG1, REG_ARG2, REG_ARG3, REG_ARG4, REG_RESULT, REG_SP};
use crate::process::scheduler::Scheduler;
use crate::process::syscall::{self, SyscallOutcome, INVALID_PID};
use crate::process::UserProgram;

/// Produces a fresh [`UserProgram`] body for a given executable path. The
/// emulated machine's instruction set is out of scope, so a process's
/// behavior is supplied by the embedder (a test, or the CLI's own driver
/// program) rather than decoded from the executable's code segment.
pub type ProgramFactory = Box<dyn Fn() -> Box<dyn UserProgram>>;

/// Shape of a loaded-but-not-run executable, as reported by
/// [`Kernel::inspect_executable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutableInfo {
    pub num_pages: u32,
    pub initial_sp: u32,
}

pub struct Kernel {
    disk: SynchDisk,
    fs: FileSystem,
    ram: RamMemory,
    frame_map: Bitmap,
    scheduler: Scheduler,
    program_factories: HashMap<String, ProgramFactory>,
    user_stack_size: u32,
}

impl Kernel {
    /// Open (or, if `format` is set, create and format) a disk image, then
    /// build the rest of the kernel context on top of it. Construction
    /// order mirrors the layering every entry point assumes: disk ->
    /// synchronous disk -> file system -> scheduler.
    pub fn boot(disk_path: &Path, geometry: DiskGeometry, format: bool) -> Result<Self> {
        Self::boot_with_limits(disk_path, geometry, format, NUM_PHYS_PAGES, USER_STACK_SIZE)
    }

    /// As [`Kernel::boot`], but with main-memory size and user stack size
    /// drawn from a loaded [`crate::config::KernelConfig`] instead of the
    /// built-in constants.
    pub fn boot_with_config(disk_path: &Path, config: &crate::config::KernelConfig, format: bool) -> Result<Self> {
        Self::boot_with_limits(
            disk_path,
            config.geometry(),
            format,
            config.num_phys_pages,
            config.user_stack_size,
        )
    }

    fn boot_with_limits(
        disk_path: &Path,
        geometry: DiskGeometry,
        format: bool,
        num_phys_pages: u32,
        user_stack_size: u32,
    ) -> Result<Self> {
        let mut disk = SynchDisk::open_or_create(disk_path, geometry)
            .with_context(|| format!("opening disk image {}", disk_path.display()))?;
        let fs = if format {
            FileSystem::format(&mut disk).context("formatting file system")?
        } else {
            FileSystem::open(&mut disk).context("reading file system")?
        };

        let ram = RamMemory::new((num_phys_pages * PAGE_SIZE) as usize);
        let frame_map = Bitmap::new(num_phys_pages as usize);

        info!("kernel booted against {}", disk_path.display());
        Ok(Kernel {
            disk,
            fs,
            ram,
            frame_map,
            scheduler: Scheduler::new(),
            program_factories: HashMap::new(),
            user_stack_size,
        })
    }

    pub fn create_file(&mut self, path: &str, initial_size: u32) -> Result<bool> {
        self.fs
            .create(&mut self.disk, path, initial_size)
            .with_context(|| format!("creating {path}"))
    }

    pub fn write_file(&mut self, path: &str, position: u32, data: &[u8]) -> Result<Option<usize>> {
        self.fs
            .write_file(&mut self.disk, path, position, data)
            .with_context(|| format!("writing {path}"))
    }

    pub fn list_files(&self) -> Vec<String> {
        self.fs.list()
    }

    /// Read up to `buf.len()` bytes starting at `position` from the file at
    /// `path`. Returns `None` if the path does not resolve to a file.
    pub fn read_file(&mut self, path: &str, position: u32, buf: &mut [u8]) -> Result<Option<usize>> {
        let Some(mut file) = self.fs.open_file(&mut self.disk, path) else {
            return Ok(None);
        };
        let read = file.read_at(buf, position).with_context(|| format!("reading {path}"))?;
        Ok(Some(read))
    }

    pub fn remove_file(&mut self, path: &str) -> Result<bool> {
        self.fs
            .remove(&mut self.disk, path)
            .with_context(|| format!("removing {path}"))
    }

    /// Register the program body `exec` should hand to a freshly loaded
    /// process of this executable path.
    pub fn register_program(&mut self, path: &str, factory: ProgramFactory) {
        self.program_factories.insert(path.to_string(), factory);
    }

    /// Load `path` as the first user process and run the kernel loop until
    /// either the program halts the machine or runs out of ready work.
    /// Returns the halt/exit status.
    pub fn exec_and_run(&mut self, path: &str) -> Result<i32> {
        let pid = self
            .spawn_exec(path)
            .ok_or_else(|| anyhow!("failed to exec {path}"))?;
        debug!("first user process is pid {pid}");
        Ok(self.run())
    }

    /// Load `path`'s NOFF header into a scratch address space and report its
    /// shape, without spawning a process or registering a program body. Used
    /// by the CLI to inspect an executable -- instruction execution is out
    /// of scope, so there is nothing further the CLI alone could "run".
    pub fn inspect_executable(&mut self, path: &str) -> Result<ExecutableInfo> {
        let mut executable = self
            .fs
            .open_file(&mut self.disk, path)
            .ok_or_else(|| anyhow!("no such file: {path}"))?;
        let mut mmu = Mmu::new(&mut self.ram, PAGE_SIZE);
        let mut scratch_frames = Bitmap::new(self.frame_map.len());
        let space = AddressSpace::load(0, &mut executable, &mut scratch_frames, &mut mmu, self.user_stack_size)
            .with_context(|| format!("loading {path}"))?;
        let mut registers = crate::process::Registers::new();
        space.init_registers(&mut registers);
        let info = ExecutableInfo {
            num_pages: space.num_pages,
            initial_sp: registers.get(REG_SP),
        };
        space.release(&mut scratch_frames);
        Ok(info)
    }

    fn spawn_exec(&mut self, path: &str) -> Option<u32> {
        let mut executable = self.fs.open_file(&mut self.disk, path)?;
        let mut mmu = Mmu::new(&mut self.ram, PAGE_SIZE);
        let space_id_hint = 0; // the scheduler assigns the real pid on spawn
        let address_space = match AddressSpace::load(
            space_id_hint,
            &mut executable,
            &mut self.frame_map,
            &mut mmu,
            self.user_stack_size,
        ) {
            Ok(space) => space,
            Err(err) => {
                log::warn!("failed to load {path}: {err}");
                return None;
            }
        };
        let factory = self.program_factories.get(path)?;
        let program = factory();
        self.scheduler.spawn(address_space, program)
    }

    /// Drive the ready queue until either a process halts the machine or
    /// every process has exited or blocked with nothing left to run.
    pub fn run(&mut self) -> i32 {
        loop {
            let Some(pid) = self.scheduler.next_ready() else {
                return 0;
            };
            if let Some(status) = self.step(pid) {
                return status;
            }
        }
    }

    fn step(&mut self, pid: u32) -> Option<i32> {
        if let Some(exit_code) = self.scheduler.take_join_result(pid) {
            let process = self.scheduler.process_mut(pid).expect("pid just resolved");
            process.registers.set_syscall_result(exit_code as u32);
            process.registers.advance_pc();
        }

        let request = {
            let process = self.scheduler.process_mut(pid).expect("pid just resolved");
            let request = process.program.next_syscall(&process.registers);
            process.registers.set(REG_RESULT, request.number);
            process.registers.set(REG_ARG1, request.arg1);
            process.registers.set(REG_ARG2, request.arg2);
            process.registers.set(REG_ARG3, request.arg3);
            process.registers.set(REG_ARG4, request.arg4);
            request
        };

        match syscall::dispatch(request) {
            SyscallOutcome::Halt => Some(0),
            SyscallOutcome::Exit(code) => {
                self.scheduler.exit(pid, code, &mut self.frame_map);
                None
            }
            SyscallOutcome::Exec(filename_ptr) => {
                let filename = {
                    let process = self.scheduler.process(pid).expect("pid just resolved");
                    let mmu = Mmu::new(&mut self.ram, PAGE_SIZE);
                    mmu.read_c_string(process.address_space.page_table(), filename_ptr, 128)
                        .unwrap_or_default()
                };
                let child = self.spawn_exec(&filename);
                let process = self.scheduler.process_mut(pid).expect("pid just resolved");
                process
                    .registers
                    .set_syscall_result(child.unwrap_or(INVALID_PID));
                process.registers.advance_pc();
                self.scheduler.requeue(pid);
                None
            }
            SyscallOutcome::Join(target) => {
                match self.scheduler.join(pid, target) {
                    Some(code) => {
                        let process = self.scheduler.process_mut(pid).expect("pid just resolved");
                        process.registers.set_syscall_result(code as u32);
                        process.registers.advance_pc();
                        self.scheduler.requeue(pid);
                    }
                    None => { /* blocked; woken by the target's exit */ }
                }
                None
            }
            SyscallOutcome::Yield => {
                let process = self.scheduler.process_mut(pid).expect("pid just resolved");
                process.registers.advance_pc();
                self.scheduler.requeue(pid);
                None
            }
        }
    }
}

pub type KernelLoadError = LoadError;
