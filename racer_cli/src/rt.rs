//! Real-time scheduling helpers (Linux SCHED_FIFO, affinity, mlockall).

use crate::cli::RtLock;

#[cfg(target_os = "linux")]
/// Capacity of cpu_set_t in CPU indices (bits).
const MAX_CPUSET_BITS: usize = std::mem::size_of::<libc::cpu_set_t>() * 8;

#[cfg(target_os = "linux")]
pub fn setup_rt_once(rt: bool, prio: Option<i32>, lock: RtLock, rt_cpu: Option<usize>) {
    use libc::{
        CPU_ISSET, CPU_SET, CPU_ZERO, MCL_CURRENT, MCL_FUTURE, SCHED_FIFO, mlockall,
        sched_get_priority_max, sched_get_priority_min, sched_param, sched_setscheduler,
    };
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    if !rt {
        return;
    }

    #[inline]
    fn lock_flags(flags: libc::c_int) -> std::io::Result<()> {
        if unsafe { mlockall(flags) } != 0 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    // Apply process memory locking according to the selected mode. A
    // failing MCL_FUTURE lock falls back to current-only when the error
    // is a permission or limit problem.
    #[inline]
    fn try_apply_mem_lock(lock: RtLock) -> eyre::Result<()> {
        let result = match lock {
            RtLock::None => return Ok(()),
            RtLock::Current => lock_flags(MCL_CURRENT),
            RtLock::All => lock_flags(MCL_CURRENT | MCL_FUTURE),
        };
        let Err(err) = result else { return Ok(()) };

        let retryable =
            matches!(err.raw_os_error(), Some(code) if code == libc::EPERM || code == libc::ENOMEM);
        if lock == RtLock::All && retryable && lock_flags(MCL_CURRENT).is_ok() {
            eprintln!("RT: full memory lock unavailable, locked current pages only");
            return Ok(());
        }
        let mut msg = format!("mlockall failed: {err}");
        if retryable {
            msg.push_str("; hint: needs CAP_IPC_LOCK (or root) and sufficient 'ulimit -l'");
        }
        Err(eyre::eyre!(msg))
    }

    // Apply SCHED_FIFO priority, clamped to the system range.
    #[inline]
    fn try_apply_fifo_priority(prio: Option<i32>) -> eyre::Result<()> {
        let (min, max) = unsafe {
            let min = sched_get_priority_min(SCHED_FIFO);
            let max = sched_get_priority_max(SCHED_FIFO);
            if min < 0 || max < 0 { (1, 99) } else { (min, max) }
        };
        let param = sched_param {
            sched_priority: prio.unwrap_or(max).clamp(min, max),
        };
        if unsafe { sched_setscheduler(0, SCHED_FIFO, &param) } != 0 {
            let err = std::io::Error::last_os_error();
            return Err(eyre::eyre!(
                "{err}; hint: needs CAP_SYS_NICE or root (try 'sudo setcap cap_sys_nice=ep <binary>')"
            ));
        }
        Ok(())
    }

    // Pin the process to a single CPU if permitted by the current mask.
    #[inline]
    fn try_apply_affinity(rt_cpu: Option<usize>) -> eyre::Result<()> {
        let online = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        if online < 1 {
            eyre::bail!("_SC_NPROCESSORS_ONLN < 1");
        }
        let target = rt_cpu.unwrap_or(0);
        if target as libc::c_long >= online {
            eyre::bail!("requested CPU {target} >= online {online}");
        }
        if target >= MAX_CPUSET_BITS {
            eyre::bail!("requested CPU {target} exceeds cpu_set_t capacity {MAX_CPUSET_BITS}");
        }
        let mut allowed: libc::cpu_set_t = unsafe { std::mem::zeroed() };
        let rc = unsafe {
            libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut allowed)
        };
        if rc == 0 && unsafe { CPU_ISSET(target, &allowed) as libc::c_int } == 0 {
            eyre::bail!("CPU {target} not permitted by current affinity mask");
        }
        let mut desired: libc::cpu_set_t = unsafe { std::mem::zeroed() };
        unsafe {
            CPU_ZERO(&mut desired);
            CPU_SET(target, &mut desired);
        }
        let rc =
            unsafe { libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &desired) };
        if rc != 0 {
            return Err(eyre::eyre!(std::io::Error::last_os_error()));
        }
        Ok(())
    }

    RT_ONCE.get_or_init(|| {
        match try_apply_mem_lock(lock) {
            Ok(()) => match lock {
                RtLock::None => eprintln!("RT: memory locking disabled (none)"),
                RtLock::Current => eprintln!("RT: memory lock = current"),
                RtLock::All => eprintln!("RT: memory lock = all (current|future)"),
            },
            Err(err) => eprintln!("Warning: {err}"),
        }
        if let Err(err) = try_apply_fifo_priority(prio) {
            let prio_dbg = prio.map_or_else(|| "(max)".into(), |p| p.to_string());
            eprintln!("Warning: sched_setscheduler(SCHED_FIFO, prio={prio_dbg}) failed: {err}");
        }
        if let Err(err) = try_apply_affinity(rt_cpu) {
            eprintln!("Warning: affinity not applied: {err}");
        }
    });
}

#[cfg(not(target_os = "linux"))]
pub fn setup_rt_once(rt: bool, _prio: Option<i32>, _lock: RtLock, _rt_cpu: Option<usize>) {
    if rt {
        eprintln!("Warning: real-time mode is only supported on Linux; ignored");
    }
}
