//! Real-time environment setup.
//!
//! ## Process Setup Sequence
//! 1. Check the kernel is PREEMPT_RT (`uname` version + `/sys/kernel/realtime`).
//! 2. `mlockall(MCL_CURRENT | MCL_FUTURE)`: lock all pages.
//! 3. `mallopt`: never trim the heap, never serve `malloc` from `mmap`.
//! 4. Reserve and touch the heap pool so later allocations are fault-free.
//! 5. Prefault the main thread's stack.
//!
//! ## Thread Setup Sequence
//! 1. `sched_setaffinity`: pin to the thread's CPU set.
//! 2. `sched_setscheduler(SCHED_FIFO, prio)`.
//! 3. Prefault the thread's reserved stack.
//!
//! Page-fault deltas are logged after every step. Without the `rt`
//! feature the privileged calls are no-ops so the pipeline runs unprivileged.

use keybus_common::config::RtConfig;
use keybus_common::consts::RT_STACK_BYTES;
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;
use tracing::{info, warn};

/// Real-time setup failure. Always fatal.
#[derive(Debug, Error)]
pub enum RtError {
    /// A setup syscall failed.
    #[error("{call} failed: {reason}")]
    Setup {
        /// Failing call.
        call: &'static str,
        /// OS error text.
        reason: String,
    },

    /// The running kernel lacks PREEMPT_RT.
    #[error("kernel is not PREEMPT_RT: {0}")]
    NotPreemptRt(String),
}

fn setup_err(call: &'static str, err: impl std::fmt::Display) -> RtError {
    RtError::Setup {
        call,
        reason: err.to_string(),
    }
}

// ─── Kernel Check ───────────────────────────────────────────────────

/// Whether a kernel version string and `/sys/kernel/realtime` content
/// describe a PREEMPT_RT kernel.
pub fn is_preempt_rt(kernel_version: &str, realtime_flag: Option<&str>) -> bool {
    let version = kernel_version.to_ascii_uppercase();
    let patched = version.contains("PREEMPT RT") || version.contains("PREEMPT_RT");
    patched && realtime_flag.map(str::trim) == Some("1")
}

/// Check the running kernel. Fatal with the `rt` feature, a warning otherwise.
pub fn check_preempt_rt() -> Result<(), RtError> {
    let uts = nix::sys::utsname::uname().map_err(|e| setup_err("uname", e))?;
    let version = uts.version().to_string_lossy().into_owned();
    let flag = std::fs::read_to_string("/sys/kernel/realtime").ok();

    if is_preempt_rt(&version, flag.as_deref()) {
        info!("PREEMPT_RT kernel detected: {version}");
        return Ok(());
    }
    if cfg!(feature = "rt") {
        Err(RtError::NotPreemptRt(version))
    } else {
        warn!("Kernel is not PREEMPT_RT ({version}); bus timing is best effort");
        Ok(())
    }
}

// ─── Page Faults ────────────────────────────────────────────────────

static LAST_MAJOR: AtomicI64 = AtomicI64::new(0);
static LAST_MINOR: AtomicI64 = AtomicI64::new(0);

/// `(major, minor)` page faults of the process so far.
pub fn page_faults() -> Result<(i64, i64), RtError> {
    use nix::sys::resource::{UsageWho, getrusage};
    let usage = getrusage(UsageWho::RUSAGE_SELF).map_err(|e| setup_err("getrusage", e))?;
    Ok((usage.major_page_faults() as i64, usage.minor_page_faults() as i64))
}

/// Log page faults caused since the previous call.
pub fn log_page_faults(step: &str) {
    match page_faults() {
        Ok((major, minor)) => {
            let d_major = major - LAST_MAJOR.swap(major, Ordering::Relaxed);
            let d_minor = minor - LAST_MINOR.swap(minor, Ordering::Relaxed);
            info!(step, major = d_major, minor = d_minor, "page faults");
        }
        Err(e) => warn!("{e}"),
    }
}

// ─── Memory ─────────────────────────────────────────────────────────

/// Lock all current and future memory pages.
#[cfg(feature = "rt")]
fn rt_mlockall() -> Result<(), RtError> {
    use nix::sys::mman::{MlockallFlags, mlockall};
    mlockall(MlockallFlags::MCL_CURRENT | MlockallFlags::MCL_FUTURE)
        .map_err(|e| setup_err("mlockall", e))
}

#[cfg(not(feature = "rt"))]
fn rt_mlockall() -> Result<(), RtError> {
    Ok(()) // No-op in simulation mode
}

/// Keep freed heap memory in the process and serve every allocation
/// from the (locked) heap.
#[cfg(all(feature = "rt", target_env = "gnu"))]
fn rt_tune_malloc() -> Result<(), RtError> {
    // SAFETY: mallopt only adjusts allocator parameters.
    if unsafe { libc::mallopt(libc::M_TRIM_THRESHOLD, -1) } != 1 {
        return Err(setup_err("mallopt(M_TRIM_THRESHOLD)", "rejected"));
    }
    // SAFETY: as above.
    if unsafe { libc::mallopt(libc::M_MMAP_MAX, 0) } != 1 {
        return Err(setup_err("mallopt(M_MMAP_MAX)", "rejected"));
    }
    Ok(())
}

#[cfg(not(all(feature = "rt", target_env = "gnu")))]
fn rt_tune_malloc() -> Result<(), RtError> {
    Ok(())
}

fn page_size() -> usize {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as usize } else { 4096 }
}

/// Allocate `bytes`, touch every page, free it. With malloc trimming off
/// and pages locked the pool stays resident for later allocations.
pub fn reserve_heap(bytes: usize) {
    let mut pool: Vec<u8> = Vec::with_capacity(bytes);
    let base = pool.as_mut_ptr();
    for offset in (0..bytes).step_by(page_size()) {
        // SAFETY: offset < capacity; the byte is written, never read.
        unsafe { core::ptr::write_volatile(base.add(offset), 0) };
    }
    core::hint::black_box(&pool);
}

/// Touch `N` bytes of the current stack.
pub fn prefault_stack<const N: usize>() {
    let mut buf = [0u8; N];
    for byte in buf.iter_mut().step_by(page_size().min(N.max(1))) {
        // SAFETY: `byte` is a valid exclusive reference.
        unsafe { core::ptr::write_volatile(byte, 0xFF) };
    }
    core::hint::black_box(&buf);
}

// ─── Scheduling ─────────────────────────────────────────────────────

/// Pin the calling thread to `cpus`.
#[cfg(feature = "rt")]
fn rt_set_affinity(cpus: &[usize]) -> Result<(), RtError> {
    use nix::sched::{CpuSet, sched_setaffinity};
    use nix::unistd::Pid;

    let mut cpuset = CpuSet::new();
    for &cpu in cpus {
        cpuset.set(cpu).map_err(|e| setup_err("CpuSet::set", e))?;
    }
    sched_setaffinity(Pid::from_raw(0), &cpuset).map_err(|e| setup_err("sched_setaffinity", e))
}

#[cfg(not(feature = "rt"))]
fn rt_set_affinity(_cpus: &[usize]) -> Result<(), RtError> {
    Ok(()) // No-op in simulation mode
}

/// Switch the calling thread to `SCHED_FIFO` at `priority`.
#[cfg(feature = "rt")]
fn rt_set_scheduler(priority: i32) -> Result<(), RtError> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: param is a valid sched_param; pid 0 is the calling thread.
    let ret = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if ret != 0 {
        return Err(setup_err(
            "sched_setscheduler(SCHED_FIFO)",
            std::io::Error::last_os_error(),
        ));
    }
    Ok(())
}

#[cfg(not(feature = "rt"))]
fn rt_set_scheduler(_priority: i32) -> Result<(), RtError> {
    Ok(()) // No-op in simulation mode
}

// ─── Entry Points ───────────────────────────────────────────────────

/// Process-wide setup. Call once from the main thread before any RT
/// thread is spawned.
pub fn process_setup(config: &RtConfig) -> Result<(), RtError> {
    check_preempt_rt()?;
    log_page_faults("startup");

    rt_mlockall()?;
    log_page_faults("mlockall");

    rt_tune_malloc()?;
    reserve_heap(config.prefault_heap_bytes);
    log_page_faults("heap reserve");

    prefault_stack::<{ 1024 * 1024 }>();
    log_page_faults("main stack prefault");
    Ok(())
}

/// Per-thread setup, run first thing inside each RT thread.
pub fn thread_setup(cpus: &[usize], priority: i32) -> Result<(), RtError> {
    rt_set_affinity(cpus)?;
    rt_set_scheduler(priority)?;
    prefault_stack::<RT_STACK_BYTES>();
    Ok(())
}
