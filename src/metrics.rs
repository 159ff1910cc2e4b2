//! Process/system metrics for ingestion and query observability.
//!
//! The `sysinfo`-based process memory/CPU sampling is kept from the source
//! material, since it is genuinely useful ambient observability for a
//! long-running ingestion worker; a macOS-only IOKit GPU FFI has no
//! counterpart need here (this engine runs no GPU-bound inference by
//! default) and is dropped — see DESIGN.md.

use std::sync::OnceLock;

use parking_lot::Mutex;
use sysinfo::System;

fn system() -> &'static Mutex<System> {
    static SYS: OnceLock<Mutex<System>> = OnceLock::new();
    SYS.get_or_init(|| Mutex::new(System::new_all()))
}

#[derive(Debug, Clone, Default)]
pub struct ProcessMetrics {
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub cpu_cores: usize,
}

/// Sample current process/system memory and CPU core count.
pub fn sample() -> ProcessMetrics {
    let mut sys = system().lock();
    sys.refresh_memory();
    ProcessMetrics {
        memory_used_mb: sys.used_memory() / 1024 / 1024,
        memory_total_mb: sys.total_memory() / 1024 / 1024,
        cpu_cores: sys.cpus().len(),
    }
}

/// One-line summary suitable for an `info!` log after a phase completes.
pub fn summary_line(elapsed_ms: u128) -> String {
    let m = sample();
    format!(
        "elapsed={elapsed_ms}ms mem={used}/{total}MB cores={cores}",
        used = m.memory_used_mb,
        total = m.memory_total_mb,
        cores = m.cpu_cores
    )
}
