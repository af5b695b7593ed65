//! System-call numbers and the dispatcher that drives them from the
//! register file.

use log::{info, warn};

pub const SC_HALT: u32 = 0;
pub const SC_EXIT: u32 = 1;
pub const SC_EXEC: u32 = 2;
pub const SC_JOIN: u32 = 3;
pub const SC_YIELD: u32 = 4;

/// Sentinel pid `exec` returns in r2 when the named file can't be opened,
/// so callers can tell failure apart from a stale register value.
pub const INVALID_PID: u32 = u32::MAX;

/// What the dispatcher decided to do, reported back to the scheduler loop
/// driving this process's registers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyscallOutcome {
    /// Machine halt requested; the whole emulator should stop. PC is not
    /// advanced -- there is no "next instruction" to run.
    Halt,
    /// The calling process exited with this code.
    Exit(i32),
    /// A new process was forked; its pid (or `INVALID_PID` on failure) was
    /// written to r2.
    Exec(u32),
    /// The calling process blocked waiting for `pid` to exit.
    Join(u32),
    /// The calling process yielded the CPU.
    Yield,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallRequest {
    pub number: u32,
    pub arg1: u32,
    pub arg2: u32,
    pub arg3: u32,
    pub arg4: u32,
}

/// Decode a syscall request into its outcome. PC-advance is the caller's
/// responsibility (every syscall but halt advances it); this function only
/// interprets the call number and arguments.
///
/// Unknown syscall numbers are a fatal, "should be impossible" condition --
/// the scheduler only ever steps processes through calls it itself issued.
pub fn dispatch(request: SyscallRequest) -> SyscallOutcome {
    match request.number {
        SC_HALT => {
            info!("halt requested");
            SyscallOutcome::Halt
        }
        SC_EXIT => {
            let code = request.arg1 as i32;
            info!("exit({code})");
            SyscallOutcome::Exit(code)
        }
        SC_EXEC => SyscallOutcome::Exec(request.arg1),
        SC_JOIN => SyscallOutcome::Join(request.arg1),
        SC_YIELD => SyscallOutcome::Yield,
        other => {
            warn!("unexpected syscall {other}");
            panic!("unexpected syscall {other}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(number: u32, arg1: u32) -> SyscallRequest {
        SyscallRequest {
            number,
            arg1,
            arg2: 0,
            arg3: 0,
            arg4: 0,
        }
    }

    #[test]
    fn halt_dispatches_without_pc_advance_semantics() {
        assert_eq!(dispatch(request(SC_HALT, 0)), SyscallOutcome::Halt);
    }

    #[test]
    fn exit_carries_its_status_code() {
        assert_eq!(dispatch(request(SC_EXIT, 7)), SyscallOutcome::Exit(7));
    }

    #[test]
    fn exec_carries_the_filename_pointer_argument() {
        assert_eq!(dispatch(request(SC_EXEC, 0x1000)), SyscallOutcome::Exec(0x1000));
    }

    #[test]
    fn join_and_yield_dispatch() {
        assert_eq!(dispatch(request(SC_JOIN, 101)), SyscallOutcome::Join(101));
        assert_eq!(dispatch(request(SC_YIELD, 0)), SyscallOutcome::Yield);
    }

    #[test]
    #[should_panic(expected = "unexpected syscall")]
    fn unknown_syscall_number_is_fatal() {
        dispatch(request(99, 0));
    }
}
