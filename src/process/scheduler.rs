//! Cooperative process table: one ready queue, fed by disk I/O
//! completions, joins, and explicit yields -- there is no preemption and
//! exactly one emulated CPU, so at most one process ever actually runs.

use std::collections::VecDeque;

use log::debug;

use crate::bitmap::Bitmap;

use super::address_space::AddressSpace;
use super::registers::Registers;
use super::syscall::SyscallRequest;

/// First pid handed out to a user process; pids below this are reserved
/// for the kernel itself.
pub const PID_BASE: u32 = 100;
pub const MAX_USERPROCESS: usize = 256;

/// A user-process body, stepped one syscall at a time. Because instruction
/// execution is out of scope, a process is not a stream of machine code --
/// it is anything that can produce the next syscall it wants to make.
pub trait UserProgram {
    fn next_syscall(&mut self, registers: &Registers) -> SyscallRequest;
}

impl<F: FnMut(&Registers) -> SyscallRequest> UserProgram for F {
    fn next_syscall(&mut self, registers: &Registers) -> SyscallRequest {
        self(registers)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Ready,
    Blocked,
    Terminated,
}

pub struct Process {
    pub pid: u32,
    pub registers: Registers,
    pub address_space: AddressSpace,
    pub program: Box<dyn UserProgram>,
    pub status: ProcessStatus,
    pub exit_code: Option<i32>,
    /// Other processes blocked in `join` on this one.
    pub joiners: Vec<u32>,
    /// Set while this process is blocked in `join`; cleared (and the
    /// target's exit code delivered) once it is woken back up.
    pub pending_join: Option<u32>,
}

pub struct Scheduler {
    processes: std::collections::HashMap<u32, Process>,
    ready: VecDeque<u32>,
    terminated: Vec<u32>,
    pid_pool: Bitmap,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            processes: std::collections::HashMap::new(),
            ready: VecDeque::new(),
            terminated: Vec::new(),
            pid_pool: Bitmap::new(MAX_USERPROCESS),
        }
    }

    /// Claim a pid and register a new ready process. Returns `None` if the
    /// pid pool is exhausted.
    pub fn spawn(
        &mut self,
        address_space: AddressSpace,
        program: Box<dyn UserProgram>,
    ) -> Option<u32> {
        let slot = self.pid_pool.find_and_set_first_clear()?;
        let pid = PID_BASE + slot as u32;
        let mut registers = Registers::new();
        address_space.init_registers(&mut registers);
        self.processes.insert(
            pid,
            Process {
                pid,
                registers,
                address_space,
                program,
                status: ProcessStatus::Ready,
                exit_code: None,
                joiners: Vec::new(),
                pending_join: None,
            },
        );
        self.ready.push_back(pid);
        debug!("spawned process {pid}");
        Some(pid)
    }

    pub fn next_ready(&mut self) -> Option<u32> {
        self.ready.pop_front()
    }

    pub fn requeue(&mut self, pid: u32) {
        if let Some(process) = self.processes.get_mut(&pid) {
            process.status = ProcessStatus::Ready;
        }
        self.ready.push_back(pid);
    }

    pub fn process_mut(&mut self, pid: u32) -> Option<&mut Process> {
        self.processes.get_mut(&pid)
    }

    pub fn process(&self, pid: u32) -> Option<&Process> {
        self.processes.get(&pid)
    }

    pub fn is_terminated(&self, pid: u32) -> Option<i32> {
        self.processes
            .get(&pid)
            .filter(|p| p.status == ProcessStatus::Terminated)
            .and_then(|p| p.exit_code)
    }

    /// Block `waiter` on `target`'s exit. If `target` has already
    /// terminated, returns its exit code immediately instead of blocking
    /// anyone.
    pub fn join(&mut self, waiter: u32, target: u32) -> Option<i32> {
        if let Some(code) = self.is_terminated(target) {
            return Some(code);
        }
        if let Some(process) = self.processes.get_mut(&target) {
            process.joiners.push(waiter);
        }
        if let Some(process) = self.processes.get_mut(&waiter) {
            process.status = ProcessStatus::Blocked;
            process.pending_join = Some(target);
        }
        None
    }

    /// If `pid` was just woken from a blocked join, consume the pending
    /// marker and return the target's exit code.
    pub fn take_join_result(&mut self, pid: u32) -> Option<i32> {
        let target = self.processes.get_mut(&pid)?.pending_join.take()?;
        self.is_terminated(target)
    }

    /// Mark `pid` terminated with `exit_code`, release its pid and
    /// physical frames, and return every process that was blocked joining
    /// it (now ready to resume with the exit code in hand).
    pub fn exit(&mut self, pid: u32, exit_code: i32, frame_map: &mut Bitmap) -> Vec<u32> {
        let joiners = if let Some(process) = self.processes.get_mut(&pid) {
            process.status = ProcessStatus::Terminated;
            process.exit_code = Some(exit_code);
            process.address_space.release(frame_map);
            std::mem::take(&mut process.joiners)
        } else {
            Vec::new()
        };
        self.pid_pool.clear((pid - PID_BASE) as usize);
        self.terminated.push(pid);

        for &joiner in &joiners {
            self.requeue(joiner);
        }

        if exit_code == 99 {
            self.purge_terminated();
        }
        joiners
    }

    /// Drop every bookkeeping entry for processes that have already
    /// exited, matching the original kernel's "a parent exiting with
    /// status 99 reaps every terminated process" convention.
    pub fn purge_terminated(&mut self) {
        for pid in self.terminated.drain(..) {
            self.processes.remove(&pid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::Bitmap as FrameBitmap;

    fn dummy_address_space() -> AddressSpace {
        AddressSpace {
            space_id: 0,
            page_table: vec![super::super::mmu::PageTableEntry {
                virtual_page: 0,
                physical_page: 0,
                valid: true,
                read_only: false,
                used: false,
                dirty: false,
            }],
            num_pages: 1,
        }
    }

    #[test]
    fn spawn_assigns_pids_from_the_base_offset() {
        let mut scheduler = Scheduler::new();
        let pid = scheduler
            .spawn(dummy_address_space(), Box::new(|_: &Registers| SyscallRequest {
                number: 0,
                arg1: 0,
                arg2: 0,
                arg3: 0,
                arg4: 0,
            }))
            .unwrap();
        assert_eq!(pid, PID_BASE);
        assert_eq!(scheduler.next_ready(), Some(pid));
    }

    #[test]
    fn join_on_a_terminated_process_returns_immediately() {
        let mut frame_map = FrameBitmap::new(32);
        let mut scheduler = Scheduler::new();
        let child = scheduler
            .spawn(dummy_address_space(), Box::new(|_: &Registers| SyscallRequest {
                number: 0,
                arg1: 0,
                arg2: 0,
                arg3: 0,
                arg4: 0,
            }))
            .unwrap();
        scheduler.exit(child, 5, &mut frame_map);
        assert_eq!(scheduler.join(999, child), Some(5));
    }

    #[test]
    fn join_blocks_until_exit_wakes_the_waiter() {
        let mut frame_map = FrameBitmap::new(32);
        let mut scheduler = Scheduler::new();
        let child = scheduler
            .spawn(dummy_address_space(), Box::new(|_: &Registers| SyscallRequest {
                number: 0,
                arg1: 0,
                arg2: 0,
                arg3: 0,
                arg4: 0,
            }))
            .unwrap();
        let parent = scheduler
            .spawn(dummy_address_space(), Box::new(|_: &Registers| SyscallRequest {
                number: 0,
                arg1: 0,
                arg2: 0,
                arg3: 0,
                arg4: 0,
            }))
            .unwrap();

        assert_eq!(scheduler.join(parent, child), None);
        let woken = scheduler.exit(child, 3, &mut frame_map);
        assert_eq!(woken, vec![parent]);
        assert_eq!(scheduler.next_ready(), Some(parent));
    }

    #[test]
    fn exit_with_code_99_purges_every_terminated_process() {
        let mut frame_map = FrameBitmap::new(32);
        let mut scheduler = Scheduler::new();
        let a = scheduler
            .spawn(dummy_address_space(), Box::new(|_: &Registers| SyscallRequest {
                number: 0,
                arg1: 0,
                arg2: 0,
                arg3: 0,
                arg4: 0,
            }))
            .unwrap();
        scheduler.exit(a, 1, &mut frame_map);
        let b = scheduler
            .spawn(dummy_address_space(), Box::new(|_: &Registers| SyscallRequest {
                number: 0,
                arg1: 0,
                arg2: 0,
                arg3: 0,
                arg4: 0,
            }))
            .unwrap();
        scheduler.exit(b, 99, &mut frame_map);
        assert!(scheduler.process(a).is_none());
        assert!(scheduler.process(b).is_none());
    }
}
