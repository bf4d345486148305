use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::{Child, Command};

pub const KILL_GRACE: Duration = Duration::from_secs(2);

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Puts the child in its own session so the whole group can be killed at once.
#[cfg(unix)]
pub fn isolate_child(cmd: &mut Command) {
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(windows)]
pub fn isolate_child(cmd: &mut Command) {
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(any(unix, windows)))]
pub fn isolate_child(_cmd: &mut Command) {}

#[cfg(unix)]
fn kill_process_group(child: &Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

pub async fn force_terminate(child: &mut Child, grace: Duration) -> anyhow::Result<ExitStatus> {
    kill_process_group(child);
    // Fails only when the child was already reaped, which the wait below reports.
    let _ = child.start_kill();
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => Ok(status?),
        Err(_) => anyhow::bail!("child did not exit within {}ms of kill", grace.as_millis()),
    }
}
