//! Operator controls for the frame loops.
//!
//! `c` captures a calibration view, `q` quits, ESC or Ctrl-C escapes a
//! detection loop. Terminal input is line-based: a reader thread forwards
//! parsed commands over a channel and the loop polls it once per frame.

use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;

const ESC: char = '\u{1b}';

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Capture,
    Quit,
    Escape,
}

/// Parse one line of terminal input.
pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim_matches(|c: char| c.is_whitespace() && c != ESC);
    if line.starts_with(ESC) || line.eq_ignore_ascii_case("esc") {
        return Some(Command::Escape);
    }
    match line.to_ascii_lowercase().as_str() {
        "c" | "capture" => Some(Command::Capture),
        "q" | "quit" => Some(Command::Quit),
        _ => None,
    }
}

/// Non-blocking source of operator commands, polled once per frame.
pub trait ControlSource {
    fn poll(&mut self) -> Option<Command>;
}

/// Commands from stdin plus Ctrl-C.
pub struct TerminalControls {
    rx: Receiver<Command>,
    interrupted: Arc<AtomicBool>,
    stdin_open: bool,
}

impl TerminalControls {
    /// Install the Ctrl-C handler and start the stdin reader. Call once per
    /// process.
    pub fn spawn() -> Result<Self> {
        let interrupted = Arc::new(AtomicBool::new(false));
        let flag = interrupted.clone();
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        })
        .context("error setting Ctrl-C handler")?;

        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("controls".to_string())
            .spawn(move || {
                let stdin = std::io::stdin();
                for line in stdin.lock().lines() {
                    let Ok(line) = line else {
                        break;
                    };
                    match parse_command(&line) {
                        Some(cmd) => {
                            if tx.send(cmd).is_err() {
                                break;
                            }
                        }
                        None if !line.trim().is_empty() => {
                            log::warn!("unknown command {:?} (use c, q or esc)", line.trim());
                        }
                        None => {}
                    }
                }
            })
            .context("spawn controls thread")?;

        Ok(Self {
            rx,
            interrupted,
            stdin_open: true,
        })
    }
}

impl ControlSource for TerminalControls {
    fn poll(&mut self) -> Option<Command> {
        if self.interrupted.swap(false, Ordering::SeqCst) {
            return Some(Command::Escape);
        }
        if !self.stdin_open {
            return None;
        }
        match self.rx.try_recv() {
            Ok(cmd) => Some(cmd),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                log::debug!("stdin closed; only Ctrl-C can stop the loop now");
                self.stdin_open = false;
                None
            }
        }
    }
}

/// One scripted poll result per frame, then silence. For tests and headless runs.
pub struct ScriptedControls {
    script: VecDeque<Option<Command>>,
}

impl ScriptedControls {
    pub fn new(script: Vec<Option<Command>>) -> Self {
        Self {
            script: script.into(),
        }
    }

    /// No commands at all.
    pub fn silent() -> Self {
        Self::new(Vec::new())
    }
}

impl ControlSource for ScriptedControls {
    fn poll(&mut self) -> Option<Command> {
        self.script.pop_front().flatten()
    }
}
