//! Intel micro-architectural events for the running CPU.
//!
//! Event tables come from the `x86` crate, which picks the table matching
//! this processor's family and model. Events are turned into raw
//! `PERF_TYPE_RAW` configs the same way the IA32_PERFEVTSELx MSR is laid out.

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
use x86::perfcnt::intel::{events, EventDescription, Tuple};

/// Components of the `FP_OPS` preset with the number of double-precision
/// operations one retired instruction performs. FMA instructions already
/// count twice in these events.
pub const FP_OPS_COMPONENTS: [(&str, u64); 4] = [
    ("FP_ARITH_INST_RETIRED.SCALAR_DOUBLE", 1),
    ("FP_ARITH_INST_RETIRED.128B_PACKED_DOUBLE", 2),
    ("FP_ARITH_INST_RETIRED.256B_PACKED_DOUBLE", 4),
    ("FP_ARITH_INST_RETIRED.512B_PACKED_DOUBLE", 8),
];

/// Encode an event description as a raw perf config.
///
/// Events that need two event codes or umasks (offcore events) are not
/// supported and yield `None`.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub fn raw_config(counter: &EventDescription) -> Option<u64> {
    let mut config: u64 = 0;

    match counter.event_code {
        Tuple::One(code) => config |= code as u64,
        Tuple::Two(_, _) => return None,
    };
    match counter.umask {
        Tuple::One(code) => config |= (code as u64) << 8,
        Tuple::Two(_, _) => return None,
    };
    config |= (counter.counter_mask as u64) << 24;

    if counter.edge_detect {
        config |= 1 << 18;
    }
    if counter.any_thread {
        config |= 1 << 21;
    }
    if counter.invert {
        config |= 1 << 23;
    }

    Some(config)
}

/// Raw config of the named event, if this CPU knows it.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub fn lookup(name: &str) -> Option<u64> {
    let upper = name.to_ascii_uppercase();
    events()
        .and_then(|counters| counters.get(upper.as_str()))
        .and_then(raw_config)
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
pub fn lookup(_name: &str) -> Option<u64> {
    None
}

/// `(raw config, weight)` of every `FP_OPS` component this CPU supports.
pub fn fp_ops_components() -> Vec<(u64, u64)> {
    FP_OPS_COMPONENTS
        .iter()
        .filter_map(|(name, weight)| lookup(name).map(|config| (config, *weight)))
        .collect()
}

/// Names and brief descriptions of all events known for this CPU.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub fn available() -> Vec<(&'static str, &'static str)> {
    let mut all: Vec<(&'static str, &'static str)> = Vec::new();
    if let Some(counters) = events() {
        for (id, cd) in counters {
            if raw_config(cd).is_some() {
                all.push((*id, cd.brief_description));
            }
        }
    }
    all.sort();
    all
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
pub fn available() -> Vec<(&'static str, &'static str)> {
    Vec::new()
}
