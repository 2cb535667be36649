use std::process::{Command, Output};
use std::time::Duration;

use image::DynamicImage;

use super::InputBackend;
use crate::actuator::ActuationError;
use crate::detector::{ImageTarget, PreparedRef};
use crate::layout::{Point, Resolution};

/// Drives an Android device or emulator through `adb shell input`.
///
/// Every point is a device pixel as reported by `wm size`, so layouts come from a
/// preset file measured on the device rather than the built-in desktop presets.
///
/// adb has no pointer, so the cursor is tracked locally from the last tap or move.
pub struct AdbBackend {
    adb: String,
    serial: Option<String>,
    clipboard: Vec<String>,
    cursor: Point,
}

impl AdbBackend {
    pub fn new(adb: &str, serial: Option<String>, clipboard: Option<Vec<String>>) -> Self {
        Self {
            adb: adb.to_string(),
            serial,
            clipboard: clipboard
                .filter(|argv| !argv.is_empty())
                .unwrap_or_else(default_clipboard_command),
            cursor: Point::default(),
        }
    }

    fn adb(&self, args: &[&str]) -> Result<Output, ActuationError> {
        let mut cmd = Command::new(&self.adb);
        if let Some(serial) = &self.serial {
            cmd.args(["-s", serial.as_str()]);
        }
        cmd.args(args);
        let label = format!("{} {}", self.adb, args.join(" "));
        run(cmd, label)
    }

    fn shell(&self, args: &[&str]) -> Result<Output, ActuationError> {
        let mut full = vec!["shell"];
        full.extend_from_slice(args);
        self.adb(&full)
    }

    fn capture(&self) -> Result<DynamicImage, ActuationError> {
        let output = self.adb(&["exec-out", "screencap", "-p"])?;
        image::load_from_memory(&output.stdout).map_err(|e| ActuationError::Capture(e.to_string()))
    }
}

impl InputBackend for AdbBackend {
    fn name(&self) -> &'static str {
        "adb"
    }

    fn tap(&mut self, at: Point) -> Result<(), ActuationError> {
        self.shell(&["input", "tap", &at.x.to_string(), &at.y.to_string()])?;
        self.cursor = at;
        Ok(())
    }

    fn key(&mut self, key: &str) -> Result<(), ActuationError> {
        let code = keycode(key).ok_or_else(|| ActuationError::Command {
            command: format!("input keyevent {key}"),
            reason: "no Android keycode for this key".into(),
        })?;
        self.shell(&["input", "keyevent", &code])?;
        Ok(())
    }

    fn swipe(&mut self, from: Point, to: Point, duration: Duration) -> Result<(), ActuationError> {
        self.shell(&[
            "input",
            "swipe",
            &from.x.to_string(),
            &from.y.to_string(),
            &to.x.to_string(),
            &to.y.to_string(),
            &duration.as_millis().to_string(),
        ])?;
        self.cursor = to;
        Ok(())
    }

    fn move_to(&mut self, at: Point) -> Result<(), ActuationError> {
        self.cursor = at;
        Ok(())
    }

    fn cursor(&mut self) -> Result<Point, ActuationError> {
        Ok(self.cursor)
    }

    fn screen_size(&mut self) -> Result<Resolution, ActuationError> {
        let output = self.shell(&["wm", "size"])?;
        let text = String::from_utf8_lossy(&output.stdout);
        parse_wm_size(&text).ok_or_else(|| ActuationError::Command {
            command: "wm size".into(),
            reason: format!("unexpected output {:?}", text.trim()),
        })
    }

    fn clipboard(&mut self) -> Result<String, ActuationError> {
        let (program, args) = self
            .clipboard
            .split_first()
            .ok_or_else(|| ActuationError::Command {
                command: "clipboard".into(),
                reason: "no clipboard command configured".into(),
            })?;
        let mut cmd = Command::new(program);
        cmd.args(args);
        let output = run(cmd, self.clipboard.join(" "))?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn locate(
        &mut self,
        target: ImageTarget,
        template: Option<&PreparedRef>,
        confidence: f32,
    ) -> Result<Option<Point>, ActuationError> {
        let template = template.ok_or(ActuationError::MissingTemplate(target))?;
        let screen = self.capture()?;
        Ok(super::find(&screen, template, confidence))
    }
}

fn run(mut cmd: Command, label: String) -> Result<Output, ActuationError> {
    tracing::trace!("exec {label}");
    let output = cmd.output().map_err(|e| ActuationError::Command {
        command: label.clone(),
        reason: e.to_string(),
    })?;
    if !output.status.success() {
        return Err(ActuationError::Command {
            command: label,
            reason: format!(
                "{}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(output)
}

/// Host command that prints the clipboard, per platform.
fn default_clipboard_command() -> Vec<String> {
    let argv: &[&str] = if cfg!(target_os = "macos") {
        &["pbpaste"]
    } else if cfg!(windows) {
        &["powershell", "-NoProfile", "-Command", "Get-Clipboard"]
    } else {
        &["xclip", "-selection", "clipboard", "-o"]
    };
    argv.iter().map(|s| s.to_string()).collect()
}

/// Android keycode for a key name. Single letters and digits map to `KEYCODE_<KEY>`.
fn keycode(key: &str) -> Option<String> {
    let lower = key.to_ascii_lowercase();
    let named = match lower.as_str() {
        "esc" | "escape" => Some("KEYCODE_ESCAPE"),
        "back" => Some("KEYCODE_BACK"),
        "enter" | "return" => Some("KEYCODE_ENTER"),
        "tab" => Some("KEYCODE_TAB"),
        "space" => Some("KEYCODE_SPACE"),
        _ => None,
    };
    if let Some(code) = named {
        return Some(code.to_string());
    }

    let mut chars = lower.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphanumeric() => {
            Some(format!("KEYCODE_{}", c.to_ascii_uppercase()))
        }
        _ => None,
    }
}

/// Parse `adb shell wm size` output. An `Override size` wins over the physical one.
fn parse_wm_size(text: &str) -> Option<Resolution> {
    let mut physical = None;
    let mut overridden = None;
    for line in text.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let parsed = value.trim().parse::<Resolution>().ok();
        match label.trim() {
            "Physical size" => physical = parsed,
            "Override size" => overridden = parsed,
            _ => {}
        }
    }
    overridden.or(physical)
}
