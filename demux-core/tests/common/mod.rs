//! Test-only `Producer` fixture driving the engine from a scripted packet plan, per §10's
//! "test tooling" guidance: fixtures live under `tests/`, never the public API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use demux_core::{CheckLevel, ControlResult, Packet, Producer, ProducerApi, SeekFlags, StreamHeader};

/// One scripted action the reader loop will replay, a single `fill_buffer` call at a time.
pub enum Step {
    /// Register a new stream, returning its assigned index to the script (ignored here; the
    /// script only needs insertion order, so streams are registered once up front).
    Register(StreamHeader),
    Submit { stream: u32, packet: Packet },
    /// Explicit end-of-stream: `fill_buffer` reports no progress from here on.
    Eof,
}

/// A `Producer` whose entire behavior is a fixed script of [`Step`]s, consumed one per
/// `fill_buffer` call. Seeks and control calls are recorded for assertions but otherwise no-ops.
pub struct ScriptedProducer {
    steps: std::collections::VecDeque<Step>,
    pub seeks: Arc<Mutex<Vec<(f64, SeekFlags)>>>,
    pub controls: Arc<Mutex<Vec<(String, String)>>>,
    pub closed: Arc<Mutex<bool>>,
}

impl ScriptedProducer {
    pub fn new(steps: Vec<Step>) -> Self {
        ScriptedProducer {
            steps: steps.into(),
            seeks: Arc::new(Mutex::new(Vec::new())),
            controls: Arc::new(Mutex::new(Vec::new())),
            closed: Arc::new(Mutex::new(false)),
        }
    }
}

impl Producer for ScriptedProducer {
    fn open(&mut self, api: &ProducerApi, _check_level: CheckLevel) -> i32 {
        while matches!(self.steps.front(), Some(Step::Register(_))) {
            let Some(Step::Register(header)) = self.steps.pop_front()
            else {
                unreachable!()
            };
            api.register_stream(header);
        }
        0
    }

    fn fill_buffer(&mut self, api: &ProducerApi) -> i32 {
        match self.steps.pop_front() {
            Some(Step::Submit { stream, packet }) => {
                api.submit_packet(stream, packet);
                1
            }
            Some(Step::Register(header)) => {
                api.register_stream(header);
                1
            }
            Some(Step::Eof) => 0,
            // No explicit `Eof` scripted: behave like a source still connected but with nothing
            // new to offer yet, rather than implicitly ending the stream.
            None => {
                std::thread::sleep(Duration::from_millis(5));
                1
            }
        }
    }

    fn seek(&mut self, _api: &ProducerApi, pts: f64, flags: SeekFlags) {
        self.seeks.lock().unwrap().push((pts, flags));
    }

    fn control(&mut self, _api: &ProducerApi, cmd: &str, arg: &str) -> ControlResult {
        self.controls.lock().unwrap().push((cmd.to_string(), arg.to_string()));
        ControlResult::Ok
    }

    fn close(&mut self, _api: &ProducerApi) {
        *self.closed.lock().unwrap() = true;
    }
}
