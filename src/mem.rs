//! Process memory reporting for long scans: the hash index is the dominant
//! allocation, so periodic RSS lines tell an operator when to shrink windows.

use parking_lot::Mutex;
use std::sync::OnceLock;
use sysinfo::{get_current_pid, ProcessExt, System, SystemExt};

static STATE: OnceLock<Mutex<System>> = OnceLock::new();

/// Resident set size of this process in bytes, best effort (0 when unknown).
pub fn process_rss() -> u64 {
    let lock = STATE.get_or_init(|| Mutex::new(System::new()));
    let mut sys = lock.lock();
    if let Ok(pid) = get_current_pid() {
        if sys.refresh_process(pid) {
            if let Some(process) = sys.process(pid) {
                return process.memory();
            }
        }
    }
    0
}

/// "1.5GB"-style formatting for log lines.
pub fn human_bytes(num: u64) -> String {
    let mut n = num as f64;
    for unit in ["B", "KB", "MB", "GB", "TB", "PB"] {
        if n < 1024.0 {
            return format!("{n:.1}{unit}");
        }
        n /= 1024.0;
    }
    format!("{n:.1}EB")
}
