//! Scoped scheduling setup for the measurement loop. Acquired before
//! recovery starts and released after; preemption or a core migration in
//! the middle of a probe round ruins the measurement.

use crate::SetupError;
use nix::errno::Errno;
use nix::sched::{sched_getaffinity, sched_setaffinity, CpuSet};
use nix::unistd::Pid;

/// Pin the calling thread to one logical core, returning the previous
/// mask.
#[must_use = "this result must be used to restore affinity"]
pub fn pin_to_core(core: usize) -> Result<CpuSet, SetupError> {
    let old = sched_getaffinity(Pid::from_raw(0)).map_err(SetupError::Sched)?;
    let mut set = CpuSet::new();
    set.set(core).map_err(SetupError::Sched)?;
    sched_setaffinity(Pid::from_raw(0), &set).map_err(SetupError::Sched)?;
    Ok(old)
}

pub fn restore_affinity(old: &CpuSet) -> Result<(), SetupError> {
    sched_setaffinity(Pid::from_raw(0), old).map_err(SetupError::Sched)
}

/// Request time-critical scheduling (SCHED_FIFO at maximum priority).
/// Usually needs CAP_SYS_NICE; callers decide whether a refusal is fatal.
/// Release with [`lower_priority`] once the loop is done.
pub fn raise_priority() -> Result<(), SetupError> {
    set_scheduler(libc::SCHED_FIFO, unsafe {
        libc::sched_get_priority_max(libc::SCHED_FIFO)
    })
}

/// Return to normal scheduling (SCHED_OTHER), the counterpart of
/// [`raise_priority`].
pub fn lower_priority() -> Result<(), SetupError> {
    set_scheduler(libc::SCHED_OTHER, 0)
}

fn set_scheduler(policy: libc::c_int, priority: libc::c_int) -> Result<(), SetupError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    let rc = unsafe { libc::sched_setscheduler(0, policy, &param) };
    if rc != 0 {
        return Err(SetupError::Sched(Errno::last()));
    }
    Ok(())
}
