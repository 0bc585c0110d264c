//! Hardware counters via Linux `perf_event_open(2)`.
//!
//! One counter file descriptor is opened per configured event, measuring the calling
//! thread in user space only. A delta read returns each counter's value and resets it,
//! so consecutive reads partition time into disjoint windows.
//!
//! On other platforms [`PerfCounters::configure`] fails with
//! [`Error::CounterUnavailable`].

use super::{CounterSource, CounterValues, HardwareEvent};
use crate::error::{Error, Result};

/// Hardware counters for the calling thread.
#[derive(Debug)]
pub struct PerfCounters {
    events: Vec<HardwareEvent>,
    #[cfg(target_os = "linux")]
    fds: Vec<sys::Fd>,
    open: bool,
}

impl PerfCounters {
    /// Opens one counter per event, enabled and zeroed.
    ///
    /// Configuring the same event twice opens it once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CounterUnavailable`] if the kernel or CPU refuses any event (no PMU,
    /// restrictive `perf_event_paranoid`, virtualized guest without counters, non-Linux OS).
    pub fn configure(events: &[HardwareEvent]) -> Result<Self> {
        let mut unique: Vec<HardwareEvent> = Vec::with_capacity(events.len());
        for &event in events {
            if !unique.contains(&event) {
                unique.push(event);
            }
        }

        Self::open(unique)
    }

    /// Opens counters by canonical name, e.g. `PERF_COUNT_HW_BRANCH_MISSES`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownCounter`] for unrecognized names, otherwise as
    /// [`configure`](Self::configure).
    pub fn configure_names<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        let events = super::parse_events(names)?;
        Self::configure(&events)
    }

    /// Opens a branch-miss counter, the one event the adaptive controller needs.
    pub fn branch_misses() -> Result<Self> {
        Self::configure(&[HardwareEvent::BranchMisses])
    }

    /// Returns true if hardware counters can be opened on this system.
    #[must_use]
    pub fn is_available() -> bool {
        Self::branch_misses().is_ok()
    }

    #[cfg(target_os = "linux")]
    fn open(events: Vec<HardwareEvent>) -> Result<Self> {
        let mut fds = Vec::with_capacity(events.len());
        for &event in &events {
            match sys::Fd::open(event) {
                Ok(fd) => fds.push(fd),
                Err(err) => {
                    log::warn!("Cannot open hardware counter {}: {}", event, err);
                    return Err(Error::CounterUnavailable {
                        counter: event.name(),
                        message: err.to_string(),
                    });
                }
            }
        }

        log::info!(
            "Configured {} hardware counter(s): {}",
            events.len(),
            events.iter().map(|e| e.name()).collect::<Vec<_>>().join(", ")
        );

        Ok(Self { events, fds, open: true })
    }

    #[cfg(not(target_os = "linux"))]
    fn open(events: Vec<HardwareEvent>) -> Result<Self> {
        let counter = events.first().map_or(HardwareEvent::BranchMisses.name(), |e| e.name());
        log::warn!("Hardware counters require Linux perf_event_open");
        Err(Error::CounterUnavailable {
            counter,
            message: "perf_event_open is only available on Linux".to_string(),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            let counter = self.events.first().map_or(HardwareEvent::BranchMisses.name(), |e| e.name());
            Err(Error::CounterReadFailed { counter, message: "counters were shut down".to_string() })
        }
    }
}

impl CounterSource for PerfCounters {
    fn id(&self) -> &'static str {
        "perf_event"
    }

    fn events(&self) -> &[HardwareEvent] {
        &self.events
    }

    #[cfg(target_os = "linux")]
    fn reset(&mut self) -> Result<()> {
        self.ensure_open()?;
        for (fd, &event) in self.fds.iter().zip(&self.events) {
            fd.reset().map_err(|err| Error::CounterReadFailed {
                counter: event.name(),
                message: err.to_string(),
            })?;
        }
        Ok(())
    }

    #[cfg(target_os = "linux")]
    fn read_delta(&mut self) -> Result<CounterValues> {
        self.ensure_open()?;
        let mut values = CounterValues::new();
        for (fd, &event) in self.fds.iter().zip(&self.events) {
            let to_err = |err: std::io::Error| Error::CounterReadFailed {
                counter: event.name(),
                message: err.to_string(),
            };
            let count = fd.read().map_err(&to_err)?;
            fd.reset().map_err(&to_err)?;
            values.insert(event, i64::try_from(count).unwrap_or(i64::MAX));
        }
        Ok(values)
    }

    #[cfg(not(target_os = "linux"))]
    fn read_delta(&mut self) -> Result<CounterValues> {
        self.ensure_open()?;
        Ok(CounterValues::new())
    }

    fn shutdown(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;

        #[cfg(target_os = "linux")]
        {
            let mut first_err = None;
            for (fd, &event) in self.fds.drain(..).zip(&self.events) {
                if let Err(err) = fd.close() {
                    first_err.get_or_insert(Error::CounterReadFailed {
                        counter: event.name(),
                        message: err.to_string(),
                    });
                }
            }
            if let Some(err) = first_err {
                return Err(err);
            }
        }

        log::debug!("Hardware counters shut down");
        Ok(())
    }

    fn display_name(&self) -> &'static str {
        "Linux perf_event"
    }
}

#[cfg(target_os = "linux")]
mod sys {
    //! Minimal `perf_event_open` bindings; libc exposes the syscall number only.
    #![allow(unsafe_code)]

    use super::HardwareEvent;
    use std::io;

    const PERF_TYPE_HARDWARE: u32 = 0;

    const PERF_EVENT_IOC_ENABLE: u64 = 0x2400;
    const PERF_EVENT_IOC_DISABLE: u64 = 0x2401;
    const PERF_EVENT_IOC_RESET: u64 = 0x2403;

    const FLAG_DISABLED: u64 = 1 << 0;
    const FLAG_EXCLUDE_KERNEL: u64 = 1 << 5;
    const FLAG_EXCLUDE_HV: u64 = 1 << 6;

    /// `struct perf_event_attr`, `PERF_ATTR_SIZE_VER5` layout.
    #[repr(C)]
    #[derive(Default)]
    #[allow(dead_code)]
    struct PerfEventAttr {
        type_: u32,
        size: u32,
        config: u64,
        sample_period: u64,
        sample_type: u64,
        read_format: u64,
        flags: u64,
        wakeup_events: u32,
        bp_type: u32,
        config1: u64,
        config2: u64,
        branch_sample_type: u64,
        sample_regs_user: u64,
        sample_stack_user: u32,
        clockid: i32,
        sample_regs_intr: u64,
        aux_watermark: u32,
        sample_max_stack: u16,
        reserved: u16,
    }

    const fn hw_config(event: HardwareEvent) -> u64 {
        match event {
            HardwareEvent::CpuCycles => 0,
            HardwareEvent::Instructions => 1,
            HardwareEvent::CacheReferences => 2,
            HardwareEvent::CacheMisses => 3,
            HardwareEvent::BranchInstructions => 4,
            HardwareEvent::BranchMisses => 5,
        }
    }

    /// An open counter file descriptor.
    #[derive(Debug)]
    pub(super) struct Fd(libc::c_int);

    impl Fd {
        pub(super) fn open(event: HardwareEvent) -> io::Result<Self> {
            let attr = PerfEventAttr {
                type_: PERF_TYPE_HARDWARE,
                size: std::mem::size_of::<PerfEventAttr>() as u32,
                config: hw_config(event),
                flags: FLAG_DISABLED | FLAG_EXCLUDE_KERNEL | FLAG_EXCLUDE_HV,
                ..PerfEventAttr::default()
            };

            // SAFETY: attr is a valid, fully initialized perf_event_attr whose size field
            // matches its layout. pid 0 / cpu -1 measures the calling thread on any CPU.
            let fd = unsafe {
                libc::syscall(
                    libc::SYS_perf_event_open,
                    &attr as *const PerfEventAttr,
                    0 as libc::pid_t,
                    -1 as libc::c_int,
                    -1 as libc::c_int,
                    0 as libc::c_ulong,
                )
            };
            if fd < 0 {
                return Err(io::Error::last_os_error());
            }

            let fd = Self(fd as libc::c_int);
            fd.ioctl(PERF_EVENT_IOC_RESET)?;
            fd.ioctl(PERF_EVENT_IOC_ENABLE)?;
            Ok(fd)
        }

        pub(super) fn read(&self) -> io::Result<u64> {
            let mut count: u64 = 0;
            // SAFETY: reading exactly 8 bytes into a live u64; read_format is 0 so the
            // kernel writes a single u64 value.
            let n = unsafe {
                libc::read(self.0, (&mut count as *mut u64).cast::<libc::c_void>(), std::mem::size_of::<u64>())
            };
            if n < 0 {
                return Err(io::Error::last_os_error());
            }
            if n as usize != std::mem::size_of::<u64>() {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short counter read"));
            }
            Ok(count)
        }

        pub(super) fn reset(&self) -> io::Result<()> {
            self.ioctl(PERF_EVENT_IOC_RESET)
        }

        pub(super) fn close(self) -> io::Result<()> {
            // close() also stops the counter.
            if let Err(err) = self.ioctl(PERF_EVENT_IOC_DISABLE) {
                log::debug!("Disabling counter fd {} failed: {}", self.0, err);
            }
            let raw = self.0;
            std::mem::forget(self);
            // SAFETY: raw is an fd this struct owned; forget() prevents a second close in Drop.
            if unsafe { libc::close(raw) } < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }

        fn ioctl(&self, request: u64) -> io::Result<()> {
            // SAFETY: perf ioctls with a zero argument act on the fd only.
            if unsafe { libc::ioctl(self.0, request as _, 0) } < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        }
    }

    impl Drop for Fd {
        fn drop(&mut self) {
            // SAFETY: the fd is owned by this struct and closed exactly once.
            unsafe {
                libc::close(self.0);
            }
        }
    }

}
