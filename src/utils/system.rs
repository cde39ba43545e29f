// src/utils/system.rs: System functions

use std::time::Duration;

use sysinfo::{CpuRefreshKind, RefreshKind, System};
use tokio::time::sleep;


/// Determines number of cores handed to the external tools
///
/// # Arguments
///
/// * `requested` - Core count from the command line; None or 0 means all physical cores.
///
/// # Returns
///
/// (cores to use, current cpu usage)
pub async fn detect_cores_and_load(requested: Option<usize>) -> (usize, f32) {
    let refresh_kind = RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing().with_cpu_usage());
    let mut system = System::new_with_specifics(refresh_kind);
    system.refresh_cpu_usage();
    sleep(Duration::from_millis(100)).await;
    system.refresh_cpu_usage();
    let cpu_load = system.global_cpu_usage();
    let physical_cores = System::physical_core_count().unwrap_or(1).max(1);

    let cores = match requested {
        Some(n) if n > 0 => n,
        _ => physical_cores,
    };
    (cores, cpu_load)
}


/// Random identifier for this run, used in the log file name.
pub fn generate_run_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}
