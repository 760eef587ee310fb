//! Per-thread counting through `perf_event_open(2)`.
//!
//! Every handle owns a disabled `task-clock` group leader opened for the
//! calling thread (`pid = 0`, `cpu = -1`, no inheritance). Subscribed events
//! join that group, so resetting, enabling and disabling the whole handle is
//! one group ioctl and all events share the same measurement window.

use std::fs;
use std::io;
use std::mem;
use std::os::unix::io::RawFd;

use lazy_static::lazy_static;
use tracing::{debug, warn};

pub mod perf_format;

use self::perf_format::*;
use crate::facility::{CounterHandle, Facility, LiveHandles, LiveToken};
use crate::intel;

const PARANOID_PATH: &str = "/proc/sys/kernel/perf_event_paranoid";

lazy_static! {
    static ref PROBE: Result<i32, String> = probe();
}

/// Generic hardware events understood by every perf PMU driver.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum HardwareEventType {
    CPUCycles,
    Instructions,
    CacheReferences,
    CacheMisses,
    BranchInstructions,
    BranchMisses,
    BusCycles,
    RefCPUCycles,
}

impl HardwareEventType {
    pub const ALL: [HardwareEventType; 8] = [
        HardwareEventType::CPUCycles,
        HardwareEventType::Instructions,
        HardwareEventType::CacheReferences,
        HardwareEventType::CacheMisses,
        HardwareEventType::BranchInstructions,
        HardwareEventType::BranchMisses,
        HardwareEventType::BusCycles,
        HardwareEventType::RefCPUCycles,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HardwareEventType::CPUCycles => "cpu-cycles",
            HardwareEventType::Instructions => "instructions",
            HardwareEventType::CacheReferences => "cache-references",
            HardwareEventType::CacheMisses => "cache-misses",
            HardwareEventType::BranchInstructions => "branch-instructions",
            HardwareEventType::BranchMisses => "branch-misses",
            HardwareEventType::BusCycles => "bus-cycles",
            HardwareEventType::RefCPUCycles => "ref-cycles",
        }
    }

    fn config(self) -> u64 {
        match self {
            HardwareEventType::CPUCycles => 0,
            HardwareEventType::Instructions => 1,
            HardwareEventType::CacheReferences => 2,
            HardwareEventType::CacheMisses => 3,
            HardwareEventType::BranchInstructions => 4,
            HardwareEventType::BranchMisses => 5,
            HardwareEventType::BusCycles => 6,
            HardwareEventType::RefCPUCycles => 9,
        }
    }
}

/// Software events counted by the kernel.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SoftwareEventType {
    CpuClock,
    TaskClock,
    PageFaults,
    ContextSwitches,
    CpuMigrations,
    PageFaultsMin,
    PageFaultsMaj,
}

impl SoftwareEventType {
    pub const ALL: [SoftwareEventType; 7] = [
        SoftwareEventType::CpuClock,
        SoftwareEventType::TaskClock,
        SoftwareEventType::PageFaults,
        SoftwareEventType::ContextSwitches,
        SoftwareEventType::CpuMigrations,
        SoftwareEventType::PageFaultsMin,
        SoftwareEventType::PageFaultsMaj,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SoftwareEventType::CpuClock => "cpu-clock",
            SoftwareEventType::TaskClock => "task-clock",
            SoftwareEventType::PageFaults => "page-faults",
            SoftwareEventType::ContextSwitches => "context-switches",
            SoftwareEventType::CpuMigrations => "cpu-migrations",
            SoftwareEventType::PageFaultsMin => "minor-faults",
            SoftwareEventType::PageFaultsMaj => "major-faults",
        }
    }

    fn config(self) -> u64 {
        match self {
            SoftwareEventType::CpuClock => 0,
            SoftwareEventType::TaskClock => 1,
            SoftwareEventType::PageFaults => 2,
            SoftwareEventType::ContextSwitches => 3,
            SoftwareEventType::CpuMigrations => 4,
            SoftwareEventType::PageFaultsMin => 5,
            SoftwareEventType::PageFaultsMaj => 6,
        }
    }
}

/// What a subscribed name turns into: one or more perf events whose counts
/// are summed with a weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecipe {
    pub parts: Vec<(EventAttrType, u64, u64)>,
}

impl EventRecipe {
    fn single(attr_type: EventAttrType, config: u64) -> EventRecipe {
        EventRecipe {
            parts: vec![(attr_type, config, 1)],
        }
    }
}

/// Preset names resolved before anything else.
pub const PRESETS: [(&str, &str); 1] = [(
    crate::events::FP_OPS,
    "Double-precision floating-point operations (weighted FP_ARITH_INST_RETIRED.*).",
)];

/// Translate an event name into the perf events that implement it.
///
/// Lookup order: presets, generic hardware events, software events, Intel
/// events of this CPU, then `raw:0x...` configs. Matching ignores case.
pub fn resolve(name: &str) -> Option<EventRecipe> {
    if name.eq_ignore_ascii_case(crate::events::FP_OPS) {
        let parts: Vec<_> = intel::fp_ops_components()
            .into_iter()
            .map(|(config, weight)| (EventAttrType::Raw, config, weight))
            .collect();
        return if parts.is_empty() {
            None
        } else {
            Some(EventRecipe { parts })
        };
    }
    if let Some(hw) = HardwareEventType::ALL
        .iter()
        .find(|e| e.name().eq_ignore_ascii_case(name))
    {
        return Some(EventRecipe::single(EventAttrType::Hardware, hw.config()));
    }
    if let Some(sw) = SoftwareEventType::ALL
        .iter()
        .find(|e| e.name().eq_ignore_ascii_case(name))
    {
        return Some(EventRecipe::single(EventAttrType::Software, sw.config()));
    }
    if let Some(config) = intel::lookup(name) {
        return Some(EventRecipe::single(EventAttrType::Raw, config));
    }
    parse_raw(name).map(|config| EventRecipe::single(EventAttrType::Raw, config))
}

fn parse_raw(name: &str) -> Option<u64> {
    let lower = name.to_ascii_lowercase();
    let hex = lower.strip_prefix("raw:")?;
    let hex = hex.strip_prefix("0x").unwrap_or(hex);
    u64::from_str_radix(hex, 16).ok()
}

fn perf_event_open(hw_event: &EventAttr, group_fd: RawFd) -> io::Result<RawFd> {
    let pid: libc::pid_t = 0;
    let cpu: libc::c_int = -1;
    let fd = unsafe {
        libc::syscall(
            libc::SYS_perf_event_open,
            hw_event as *const EventAttr,
            pid,
            cpu,
            group_fd,
            PERF_FLAG_FD_CLOEXEC,
        )
    };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(fd as RawFd)
}

fn ioctl(fd: RawFd, request: libc::c_ulong, value: libc::c_int) -> io::Result<()> {
    let ret = unsafe { libc::ioctl(fd, request as _, value) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn read_counter(fd: RawFd) -> io::Result<ReadFormat> {
    let mut words: [u64; 3] = [0; 3];
    let len = mem::size_of_val(&words);
    let ret = unsafe { libc::read(fd, words.as_mut_ptr() as *mut libc::c_void, len) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    if ret as usize != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("short counter read ({} of {} bytes)", ret, len),
        ));
    }
    Ok(ReadFormat::from_words(words))
}

fn close(fd: RawFd) -> io::Result<()> {
    if unsafe { libc::close(fd) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn probe() -> Result<i32, String> {
    let paranoid = fs::read_to_string(PARANOID_PATH)
        .map_err(|e| format!("{} unreadable ({}); kernel lacks perf events?", PARANOID_PATH, e))?;
    let paranoid: i32 = paranoid
        .trim()
        .parse()
        .map_err(|_| format!("unexpected {} contents: {:?}", PARANOID_PATH, paranoid))?;

    let attr = EventAttr::counting(
        EventAttrType::Software,
        SoftwareEventType::TaskClock.config(),
    );
    let fd = perf_event_open(&attr, -1)
        .map_err(|e| format!("cannot open a self-monitoring event (paranoid = {}): {}", paranoid, e))?;
    close(fd).map_err(|e| e.to_string())?;
    Ok(paranoid)
}

/// The perf counting facility.
#[derive(Debug)]
pub struct PerfFacility {
    paranoid: i32,
    live: LiveHandles,
}

impl PerfFacility {
    /// Check once per process that the kernel lets us count our own threads.
    pub fn init() -> crate::Result<PerfFacility> {
        match &*PROBE {
            Ok(paranoid) => {
                debug!(paranoid, "perf counting facility initialised");
                Ok(PerfFacility {
                    paranoid: *paranoid,
                    live: LiveHandles::default(),
                })
            }
            Err(reason) => Err(crate::Error::LibraryInit {
                facility: "perf",
                reason: reason.clone(),
            }),
        }
    }

    pub fn paranoid(&self) -> i32 {
        self.paranoid
    }
}

impl Facility for PerfFacility {
    type Handle = PerfHandle;

    fn name(&self) -> &'static str {
        "perf"
    }

    fn create_handle(&self) -> io::Result<PerfHandle> {
        let attr = EventAttr::counting(
            EventAttrType::Software,
            SoftwareEventType::TaskClock.config(),
        );
        let leader = perf_event_open(&attr, -1)?;
        Ok(PerfHandle {
            leader,
            members: Vec::new(),
            _token: self.live.token(),
        })
    }

    fn live_handles(&self) -> usize {
        self.live.get()
    }
}

impl Drop for PerfFacility {
    fn drop(&mut self) {
        crate::warn_on_live_handles(self.name(), self.live.get());
    }
}

#[derive(Debug)]
struct Member {
    event: String,
    fds: Vec<(RawFd, u64)>,
}

/// A group of perf events counting the thread that created it.
#[derive(Debug)]
pub struct PerfHandle {
    leader: RawFd,
    members: Vec<Member>,
    _token: LiveToken,
}

impl PerfHandle {
    fn close_all(&mut self) -> io::Result<()> {
        let mut first_err = None;
        for member in self.members.drain(..) {
            for (fd, _) in member.fds {
                if let Err(e) = close(fd) {
                    first_err.get_or_insert(e);
                }
            }
        }
        if self.leader >= 0 {
            if let Err(e) = close(self.leader) {
                first_err.get_or_insert(e);
            }
            self.leader = -1;
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl CounterHandle for PerfHandle {
    fn subscribe(&mut self, event: &str) -> io::Result<()> {
        let recipe = resolve(event).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "event not available on this system")
        })?;

        let mut fds = Vec::with_capacity(recipe.parts.len());
        for (attr_type, config, weight) in recipe.parts {
            let attr = EventAttr::counting(attr_type, config);
            match perf_event_open(&attr, self.leader) {
                Ok(fd) => fds.push((fd, weight)),
                Err(e) => {
                    for (fd, _) in fds {
                        let _ = close(fd);
                    }
                    return Err(e);
                }
            }
        }
        self.members.push(Member {
            event: event.to_string(),
            fds,
        });
        Ok(())
    }

    fn start(&mut self) -> io::Result<()> {
        ioctl(self.leader, PERF_EVENT_IOC_RESET, PERF_IOC_FLAG_GROUP)?;
        ioctl(self.leader, PERF_EVENT_IOC_ENABLE, PERF_IOC_FLAG_GROUP)
    }

    fn stop(&mut self) -> io::Result<Vec<u64>> {
        ioctl(self.leader, PERF_EVENT_IOC_DISABLE, PERF_IOC_FLAG_GROUP)?;

        let mut values = Vec::with_capacity(self.members.len());
        for member in self.members.iter() {
            let mut total: u64 = 0;
            for (fd, weight) in member.fds.iter() {
                let rf = read_counter(*fd)?;
                if rf.was_multiplexed() {
                    warn!(
                        event = %member.event,
                        enabled = rf.time_enabled,
                        running = rf.time_running,
                        "counter was multiplexed, count is partial"
                    );
                }
                total = total.wrapping_add(rf.value.wrapping_mul(*weight));
            }
            values.push(total);
        }
        Ok(values)
    }

    fn release(mut self) -> io::Result<()> {
        self.close_all()
    }
}

impl Drop for PerfHandle {
    fn drop(&mut self) {
        let _ = self.close_all();
    }
}
