//! The polling worker pool.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::MethodError;
use crate::worker::{Completion, Launcher, WorkItem};

/// Counters observed while a batch ran.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    /// Highest number of simultaneously running items seen at any poll tick.
    pub max_running: usize,
}

/// Runs work items with at most `concurrency` processes alive at once.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    launcher: Launcher,
    concurrency: usize,
}

struct Running {
    item: WorkItem,
    child: Child,
    capture: PathBuf,
    started: Instant,
}

enum ItemState {
    Pending(WorkItem),
    Running(Running),
    Done,
}

impl WorkerPool {
    pub fn new(launcher: Launcher, concurrency: usize) -> Self {
        Self {
            launcher,
            concurrency: concurrency.max(1),
        }
    }

    /// Run every item to completion, calling `on_complete` once per item in
    /// completion order. Returns when the whole batch is done.
    pub fn run<F>(&self, items: Vec<WorkItem>, mut on_complete: F) -> Result<PoolStats, MethodError>
    where
        F: FnMut(Completion),
    {
        let capture_dir = self.launcher.capture_dir();
        std::fs::create_dir_all(&capture_dir)?;

        let mut slots: Vec<ItemState> = items.into_iter().map(ItemState::Pending).collect();
        let mut stats = PoolStats::default();
        let mut next_capture = 0usize;

        loop {
            // Reap finished (or overdue) processes before starting new ones.
            for slot in slots.iter_mut() {
                let ItemState::Running(running) = slot else { continue };
                if let Some(done) = self.poll(running) {
                    *slot = ItemState::Done;
                    record(&mut stats, &done);
                    on_complete(done);
                }
            }

            let mut running = slots.iter().filter(|s| matches!(s, ItemState::Running(_))).count();
            for slot in slots.iter_mut() {
                if running >= self.concurrency {
                    break;
                }
                if !matches!(slot, ItemState::Pending(_)) {
                    continue;
                }
                let ItemState::Pending(item) = std::mem::replace(slot, ItemState::Done) else {
                    continue;
                };
                let capture = capture_dir.join(format!("{next_capture}.out"));
                next_capture += 1;
                match self.spawn(&item, &capture) {
                    Ok(child) => {
                        tracing::debug!(label = %item.label, "started");
                        *slot = ItemState::Running(Running {
                            item,
                            child,
                            capture,
                            started: Instant::now(),
                        });
                        running += 1;
                    }
                    Err(e) => {
                        tracing::warn!(label = %item.label, error = %e, "failed to start invocation");
                        let done = Completion {
                            label: item.label,
                            output: format!("failed to start: {e}\n"),
                            exit_code: None,
                            timed_out: false,
                            elapsed: Duration::ZERO,
                        };
                        record(&mut stats, &done);
                        on_complete(done);
                    }
                }
            }
            stats.max_running = stats.max_running.max(running);

            if slots.iter().all(|s| matches!(s, ItemState::Done)) {
                break;
            }
            thread::sleep(self.launcher.poll_interval);
        }

        Ok(stats)
    }

    /// Run a single item and wait for it.
    pub fn run_one(&self, item: WorkItem) -> Result<Completion, MethodError> {
        let mut out = None;
        self.run(vec![item], |done| out = Some(done))?;
        out.ok_or_else(|| MethodError::Io("invocation finished without a result".to_string()))
    }

    fn spawn(&self, item: &WorkItem, capture: &Path) -> std::io::Result<Child> {
        let stdout = File::create(capture)?;
        let stderr = stdout.try_clone()?;
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(self.launcher.shell_line(&item.command))
            .current_dir(&self.launcher.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));
        // Own process group, so a timeout can take down the tool and not just `sh`.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        cmd.spawn()
    }

    /// Check one running process. Returns the completion once it is over.
    fn poll(&self, running: &mut Running) -> Option<Completion> {
        let (exit_code, timed_out) = match running.child.try_wait() {
            Ok(Some(status)) => (status.code(), false),
            Ok(None) => {
                let overdue = self
                    .launcher
                    .timeout
                    .is_some_and(|limit| running.started.elapsed() >= limit);
                if !overdue {
                    return None;
                }
                tracing::warn!(label = %running.item.label, "invocation timed out, killing");
                kill_group(&mut running.child);
                let code = running.child.wait().ok().and_then(|s| s.code());
                (code, true)
            }
            Err(e) => {
                tracing::warn!(label = %running.item.label, error = %e, "failed to poll invocation");
                kill_group(&mut running.child);
                let _ = running.child.wait();
                (None, false)
            }
        };

        let output = match std::fs::read(&running.capture) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => format!("<capture unavailable: {e}>\n"),
        };
        let _ = std::fs::remove_file(&running.capture);

        Some(Completion {
            label: running.item.label.clone(),
            output,
            exit_code,
            timed_out,
            elapsed: running.started.elapsed(),
        })
    }
}

/// SIGKILL the child's process group, then the child itself.
fn kill_group(child: &mut Child) {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        match Command::new("kill")
            .args(["-KILL", "--", group.as_str()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) if !status.success() => {
                tracing::debug!(pid = child.id(), %status, "process group already gone");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(pid = child.id(), error = %e, "failed to invoke kill for process group"),
        }
    }
    let _ = child.kill();
}

fn record(stats: &mut PoolStats, done: &Completion) {
    stats.completed += 1;
    if done.timed_out {
        stats.timed_out += 1;
    } else if !done.succeeded() {
        stats.failed += 1;
    }
}
