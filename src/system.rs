use std::fs;

#[derive(Clone, Debug)]
pub struct SystemInfo {
    pub ncpus: usize,
    pub cpu_model: String,
}

impl SystemInfo {
    pub fn detect() -> Self {
        Self {
            ncpus: online_cpus(),
            cpu_model: read_cpu_model().unwrap_or_else(|| "Unknown".into()),
        }
    }

    /// Workers that fit next to the coordinator thread: one per remaining CPU.
    pub fn default_workers(&self) -> usize {
        self.ncpus.saturating_sub(1).max(1)
    }
}

fn online_cpus() -> usize {
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if n > 0 {
        n as usize
    } else {
        std::thread::available_parallelism().map_or(1, |n| n.get())
    }
}

fn read_cpu_model() -> Option<String> {
    let contents = fs::read_to_string("/proc/cpuinfo").ok()?;
    contents
        .lines()
        .find(|line| line.starts_with("model name"))
        .and_then(|line| line.split(':').nth(1))
        .map(|val| val.trim().to_string())
}
