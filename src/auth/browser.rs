//! Usage: Launches the user's default browser at the provider authorization URL.

use std::process::Command;

use crate::shared::error::AppResult;

#[cfg(target_os = "windows")]
fn launch_command(url: &str) -> Option<Command> {
    // The URL protocol handler forces the default browser; `explorer <url>`
    // may open File Explorer for some URL shapes.
    let mut cmd = Command::new("rundll32.exe");
    cmd.arg("url.dll,FileProtocolHandler").arg(url);
    Some(cmd)
}

#[cfg(target_os = "macos")]
fn launch_command(url: &str) -> Option<Command> {
    let mut cmd = Command::new("open");
    cmd.arg(url);
    Some(cmd)
}

#[cfg(all(unix, not(target_os = "macos")))]
fn launch_command(url: &str) -> Option<Command> {
    let mut cmd = Command::new("xdg-open");
    cmd.arg(url);
    Some(cmd)
}

#[cfg(not(any(windows, unix)))]
fn launch_command(_url: &str) -> Option<Command> {
    None
}

pub(crate) fn open_browser(url: &str) -> AppResult<()> {
    let Some(mut cmd) = launch_command(url) else {
        return Err("BROWSER_LAUNCH: browser launch is unsupported on this platform".into());
    };
    cmd.spawn()
        .map_err(|e| format!("BROWSER_LAUNCH: failed to open browser: {e}"))?;
    Ok(())
}
