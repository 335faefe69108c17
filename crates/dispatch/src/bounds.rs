//! Per-priority worker and permit bounds, derived from CPU count (§4.5).

use codec::Priority;

/// Minimum and maximum concurrent worker count for one priority class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerBounds {
    pub min: usize,
    pub max: usize,
}

/// Computes `{min, max}` worker bounds and semaphore permit count for a
/// priority class from the detected CPU count, using the ratios in §4.5:
/// `base = CPU_count / 2`, High `{base/2..base*2}`, Medium `{base/4..base}`,
/// Low `{1..base/4}`; permits scale the same way (High `base*2`, Medium
/// `base`, Low `base/2`).
pub fn bounds_for(priority: Priority, cpu_count: usize) -> WorkerBounds {
    let base = (cpu_count / 2).max(1);
    match priority {
        Priority::High => WorkerBounds { min: (base / 2).max(1), max: (base * 2).max(2) },
        Priority::Medium => WorkerBounds { min: (base / 4).max(1), max: base.max(1) },
        Priority::Low => WorkerBounds { min: 1, max: (base / 4).max(1) },
    }
}

pub fn permits_for(priority: Priority, cpu_count: usize) -> usize {
    let base = (cpu_count / 2).max(1);
    match priority {
        Priority::High => (base * 2).max(2),
        Priority::Medium => base.max(1),
        Priority::Low => (base / 2).max(1),
    }
}

/// Detected CPU count, falling back to 1 if the platform can't report it.
pub fn detected_cpu_count() -> usize {
    num_cpus::get().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_respect_the_documented_ratios_for_eight_cpus() {
        // base = 4
        assert_eq!(bounds_for(Priority::High, 8), WorkerBounds { min: 2, max: 8 });
        assert_eq!(bounds_for(Priority::Medium, 8), WorkerBounds { min: 1, max: 4 });
        assert_eq!(bounds_for(Priority::Low, 8), WorkerBounds { min: 1, max: 1 });
    }

    #[test]
    fn bounds_never_degenerate_to_zero_on_single_cpu() {
        for p in Priority::ALL {
            let b = bounds_for(p, 1);
            assert!(b.min >= 1);
            assert!(b.max >= b.min);
        }
    }

    #[test]
    fn permits_scale_with_the_same_ratios_as_bounds() {
        assert_eq!(permits_for(Priority::High, 8), 8);
        assert_eq!(permits_for(Priority::Medium, 8), 4);
        assert_eq!(permits_for(Priority::Low, 8), 2);
    }
}
