//! Desktop notification plus a spoken or audible cue on this machine.

use super::Urgency;
use notify_rust::Notification;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};

fn sound_name(urgency: Urgency) -> &'static str {
    match urgency {
        Urgency::Info => "Blow",
        Urgency::Attention => "Sosumi",
        Urgency::Success => "Hero",
        Urgency::Failure => "Basso",
    }
}

pub fn alert(message: &str, urgency: Urgency) {
    log::info!("Alerting user with message: '{}'", message);

    let mut notification = Notification::new();
    notification
        .summary("Deliverance")
        .body(message)
        .appname("deliverance")
        .timeout(10000);
    if let Err(e) = notification.show() {
        log::debug!("Failed to show notification: {}", e);
    }

    if let Err(e) = speak(message, urgency) {
        log::debug!("Failed to play audible alert: {}", e);
    }
}

#[cfg(target_os = "macos")]
fn speak(message: &str, urgency: Urgency) -> std::io::Result<()> {
    let script = format!(
        "afplay /System/Library/Sounds/{}.aiff && say \"{}\" --rate 150",
        sound_name(urgency),
        message.replace('"', "")
    );
    spawn_quiet(Command::new("sh").arg("-c").arg(script)).map(drop)
}

#[cfg(target_os = "linux")]
fn speak(message: &str, urgency: Urgency) -> std::io::Result<()> {
    // requires speech-dispatcher
    let _ = sound_name(urgency);
    spawn_quiet(Command::new("spd-say").arg(message)).map(drop)
}

#[cfg(target_os = "windows")]
fn speak(message: &str, urgency: Urgency) -> std::io::Result<()> {
    let _ = sound_name(urgency);
    let script = format!(
        "Add-Type -AssemblyName System.Speech; \
         (New-Object System.Speech.Synthesis.SpeechSynthesizer).Speak('{}');",
        message.replace('\'', "")
    );
    spawn_quiet(Command::new("PowerShell").arg("-Command").arg(script)).map(drop)
}

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
fn speak(_message: &str, urgency: Urgency) -> std::io::Result<()> {
    let _ = sound_name(urgency);
    Ok(())
}

/// Starts `cmd` with its output discarded. A detached thread waits on the
/// child so it does not linger as a zombie.
fn spawn_quiet(cmd: &mut Command) -> std::io::Result<JoinHandle<()>> {
    let mut child = cmd.stdout(Stdio::null()).stderr(Stdio::null()).spawn()?;
    thread::Builder::new()
        .name("alert-reaper".to_string())
        .spawn(move || match child.wait() {
            Ok(status) if !status.success() => log::debug!("Alert command exited with {}", status),
            Ok(_) => {}
            Err(e) => log::debug!("Failed to wait on alert command: {}", e),
        })
}

/// Plays the attention sound over and over for a few seconds.
pub fn annoy() {
    #[cfg(target_os = "macos")]
    for i in 0..15 {
        let script = format!(
            "sleep {}.{} && afplay /System/Library/Sounds/Sosumi.aiff",
            i / 5,
            (i * 37) % 10
        );
        let _ = spawn_quiet(Command::new("sh").arg("-c").arg(script));
    }

    #[cfg(not(target_os = "macos"))]
    {
        let _ = speak("Delivery slots available", Urgency::Attention);
    }
}
