//! Contains the `perf_event_open` data structures used for counting.
//!
//! Only the subset needed to open, group and read counting events is kept
//! here; sampling records are never requested.

use bitflags::*;

/// `PERF_ATTR_SIZE_VER5`, the layout of [`EventAttr`].
pub const PERF_ATTR_SIZE: u32 = 112;

pub const PERF_FLAG_FD_CLOEXEC: libc::c_ulong = 1 << 3;

// _IO('$', n)
pub const PERF_EVENT_IOC_ENABLE: libc::c_ulong = 0x2400;
pub const PERF_EVENT_IOC_DISABLE: libc::c_ulong = 0x2401;
pub const PERF_EVENT_IOC_RESET: libc::c_ulong = 0x2403;
/// Apply an ioctl to the whole group of the given leader.
pub const PERF_IOC_FLAG_GROUP: libc::c_int = 1;

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct EventAttr {
    pub attr_type: u32,
    pub size: u32,
    pub config: u64,
    pub sample_period_freq: u64,
    pub sample_type: u64,
    pub read_format: ReadFormatFlags,
    pub settings: EventAttrFlags,

    pub wakeup_events_watermark: u32,
    pub bp_type: u32,

    pub config1_or_bp_addr: u64,
    pub config2_or_bp_len: u64,

    pub branch_sample_type: u64,
    pub sample_regs_user: u64,
    pub sample_stack_user: u32,
    pub clock_id: i32,
    pub sample_regs_intr: u64,
    pub aux_watermark: u32,
    pub reserved: u32,
}

impl EventAttr {
    /// A disabled, user-space only counting attribute for `attr_type`/`config`.
    pub fn counting(attr_type: EventAttrType, config: u64) -> EventAttr {
        let mut attr: EventAttr = Default::default();
        attr.attr_type = attr_type.as_raw();
        attr.size = PERF_ATTR_SIZE;
        attr.config = config;
        attr.read_format = ReadFormatFlags::FORMAT_TOTAL_TIME_ENABLED
            | ReadFormatFlags::FORMAT_TOTAL_TIME_RUNNING;
        attr.settings = EventAttrFlags::EVENT_ATTR_DISABLED
            | EventAttrFlags::EVENT_ATTR_EXCLUDE_KERNEL
            | EventAttrFlags::EVENT_ATTR_EXCLUDE_HV;
        attr
    }

    pub fn attr_type(&self) -> EventAttrType {
        EventAttrType::new(self.attr_type)
    }
}

impl Default for EventAttr {
    fn default() -> EventAttr {
        use std::mem;
        unsafe { mem::zeroed::<EventAttr>() }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EventAttrType {
    Hardware,
    Software,
    TracePoint,
    HwCache,
    Raw,
    Breakpoint,
    Unknown(u32),
}

impl EventAttrType {
    pub fn new(attr_type: u32) -> EventAttrType {
        match attr_type {
            0 => EventAttrType::Hardware,
            1 => EventAttrType::Software,
            2 => EventAttrType::TracePoint,
            3 => EventAttrType::HwCache,
            4 => EventAttrType::Raw,
            5 => EventAttrType::Breakpoint,
            _ => EventAttrType::Unknown(attr_type),
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            EventAttrType::Hardware => 0,
            EventAttrType::Software => 1,
            EventAttrType::TracePoint => 2,
            EventAttrType::HwCache => 3,
            EventAttrType::Raw => 4,
            EventAttrType::Breakpoint => 5,
            EventAttrType::Unknown(t) => t,
        }
    }
}

bitflags! {
    pub struct ReadFormatFlags: u64 {
        /// Adds the 64-bit time_enabled field.  This can be used to calculate estimated totals if the PMU is overcommitted
        /// and multiplexing is happening.
        const FORMAT_TOTAL_TIME_ENABLED = 1 << 0;
        /// Adds the 64-bit time_running field.  This can be used to calculate estimated totals if the PMU is  overcommitted
        /// and  multiplexing is happening.
        const FORMAT_TOTAL_TIME_RUNNING = 1 << 1;
        /// Adds a 64-bit unique value that corresponds to the event group.
        const FORMAT_ID = 1 << 2;
        /// Allows all counter values in an event group to be read with one read.
        const FORMAT_GROUP = 1 << 3;
    }
}

bitflags! {
    pub struct EventAttrFlags: u64 {
        /// off by default
        const EVENT_ATTR_DISABLED       =  1 << 0;
        /// children inherit it
        const EVENT_ATTR_INHERIT        =  1 << 1;
        /// must always be on PMU
        const EVENT_ATTR_PINNED         =  1 << 2;
        /// only group on PMU
        const EVENT_ATTR_EXCLUSIVE      =  1 << 3;
        /// don't count user
        const EVENT_ATTR_EXCLUDE_USER   =  1 << 4;
        /// ditto kernel
        const EVENT_ATTR_EXCLUDE_KERNEL =  1 << 5;
        /// ditto hypervisor
        const EVENT_ATTR_EXCLUDE_HV     =  1 << 6;
        /// don't count when idle
        const EVENT_ATTR_EXCLUDE_IDLE   =  1 << 7;
    }
}

/// One counter value as read with
/// `FORMAT_TOTAL_TIME_ENABLED | FORMAT_TOTAL_TIME_RUNNING`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReadFormat {
    pub value: u64,
    pub time_enabled: u64,
    pub time_running: u64,
}

impl ReadFormat {
    pub fn from_words(words: [u64; 3]) -> ReadFormat {
        ReadFormat {
            value: words[0],
            time_enabled: words[1],
            time_running: words[2],
        }
    }

    /// The counter shared its PMU slot with other events for part of the window.
    pub fn was_multiplexed(&self) -> bool {
        self.time_running < self.time_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn attr_layout_matches_kernel_ver5() {
        assert_eq!(mem::size_of::<EventAttr>(), PERF_ATTR_SIZE as usize);
    }

    #[test]
    fn counting_attr_defaults() {
        let attr = EventAttr::counting(EventAttrType::Raw, 0x01c7);
        assert_eq!(attr.attr_type(), EventAttrType::Raw);
        assert_eq!(attr.config, 0x01c7);
        assert!(attr.settings.contains(EventAttrFlags::EVENT_ATTR_DISABLED));
        assert!(!attr.settings.contains(EventAttrFlags::EVENT_ATTR_INHERIT));
        assert_eq!(attr.sample_period_freq, 0);
    }

    #[test]
    fn multiplex_detection() {
        assert!(!ReadFormat::from_words([10, 5, 5]).was_multiplexed());
        assert!(ReadFormat::from_words([10, 5, 3]).was_multiplexed());
    }
}
