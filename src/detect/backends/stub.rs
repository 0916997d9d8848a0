use std::collections::VecDeque;

use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Stub backend for testing. Replays one scripted detection list per frame and
/// returns nothing once the script runs out.
pub struct StubBackend {
    script: VecDeque<Vec<Detection>>,
}

impl StubBackend {
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        Ok(self.script.pop_front().unwrap_or_default())
    }
}
