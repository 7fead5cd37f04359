//! Client-side prediction bookkeeping.
//!
//! Three structures keyed by the client-local input sequence:
//!
//! - `input_history`: every input ever applied (rolling, 60 frames)
//! - `prediction_history`: the predicted pose after each input (rolling, 60)
//! - `input_buffer`: inputs the server has not acknowledged yet (map, 100)
//!
//! Reconciliation marks buffered inputs for replay; the runtime collects
//! them sorted by sequence and re-applies them after a correction.

use glam::Vec2;
use shared::entities::MoveFlags;
use shared::time;
use std::collections::{HashMap, VecDeque};

/// Rolling history length: one second of inputs at 60 Hz.
pub const MAX_PREDICTION_HISTORY: usize = 60;

/// Maximum unacknowledged inputs kept before the oldest is evicted.
pub const MAX_INPUT_BUFFER_SIZE: usize = 100;

/// Buffered inputs older than this are presumed lost and dropped.
pub const INPUT_TIMEOUT_MS: i64 = 5000;

/// One frame of local input, as applied to the predicted tank and sent to
/// the server. The barrel rotation records the mouse aim at capture time so
/// replays reuse the real intent.
#[derive(Debug, Clone)]
pub struct InputFrame {
    pub sequence: u32,
    pub timestamp: i64,
    pub moving: MoveFlags,
    pub delta_time: f32,
    pub barrel_rotation: f32,
    pub acknowledged: bool,
    pub sent_time: i64,
}

impl InputFrame {
    pub fn new(timestamp: i64, moving: MoveFlags, delta_time: f32, barrel_rotation: f32) -> Self {
        InputFrame {
            sequence: 0,
            timestamp,
            moving,
            delta_time,
            barrel_rotation,
            acknowledged: false,
            sent_time: 0,
        }
    }
}

/// Where the client believed it was after applying one input.
#[derive(Debug, Clone, Copy)]
pub struct PredictedState {
    pub sequence: u32,
    pub timestamp: i64,
    pub position: Vec2,
    pub body_rotation: f32,
    pub barrel_rotation: f32,
}

/// An unacknowledged input plus its replay flag and age.
#[derive(Debug, Clone)]
struct BufferedInput {
    frame: InputFrame,
    needs_replay: bool,
    buffer_time_ms: i64,
}

/// Prediction history and input buffering for the local player.
pub struct ClientPrediction {
    input_history: VecDeque<InputFrame>,
    prediction_history: VecDeque<PredictedState>,
    input_buffer: HashMap<u32, BufferedInput>,
    next_sequence: u32,
    clock: fn() -> i64,
}

impl Default for ClientPrediction {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientPrediction {
    pub fn new() -> Self {
        ClientPrediction {
            input_history: VecDeque::new(),
            prediction_history: VecDeque::new(),
            input_buffer: HashMap::new(),
            // 0 is reserved for "nothing acknowledged yet".
            next_sequence: 1,
            clock: time::now_ms,
        }
    }

    pub fn set_clock(&mut self, clock: fn() -> i64) {
        self.clock = clock;
    }

    /// Assigns the next sequence to an input, records it in the history and
    /// the unacknowledged buffer, and returns the sequence.
    pub fn store_input(&mut self, frame: InputFrame) -> u32 {
        let mut frame = frame;
        frame.sequence = self.next_sequence;
        self.next_sequence += 1;
        frame.sent_time = (self.clock)();
        frame.acknowledged = false;

        self.buffer_input(frame.clone());
        self.input_history.push_back(frame.clone());
        while self.input_history.len() > MAX_PREDICTION_HISTORY {
            self.input_history.pop_front();
        }

        frame.sequence
    }

    pub fn store_predicted_state(&mut self, state: PredictedState) {
        self.prediction_history.push_back(state);
        while self.prediction_history.len() > MAX_PREDICTION_HISTORY {
            self.prediction_history.pop_front();
        }
    }

    pub fn latest_sequence(&self) -> u32 {
        self.next_sequence - 1
    }

    pub fn input(&self, sequence: u32) -> Option<&InputFrame> {
        self.input_history.iter().find(|f| f.sequence == sequence)
    }

    pub fn predicted_state(&self, sequence: u32) -> Option<&PredictedState> {
        self.prediction_history
            .iter()
            .find(|s| s.sequence == sequence)
    }

    /// All stored inputs strictly after `sequence`, in order.
    pub fn inputs_after(&self, sequence: u32) -> Vec<InputFrame> {
        let mut frames: Vec<InputFrame> = self
            .input_history
            .iter()
            .filter(|f| f.sequence > sequence)
            .cloned()
            .collect();
        frames.sort_by_key(|f| f.sequence);
        frames
    }

    fn buffer_input(&mut self, frame: InputFrame) {
        let sequence = frame.sequence;
        self.input_buffer.insert(
            sequence,
            BufferedInput {
                frame,
                needs_replay: false,
                buffer_time_ms: 0,
            },
        );

        // Over capacity: evict the input with the oldest timestamp.
        if self.input_buffer.len() > MAX_INPUT_BUFFER_SIZE {
            if let Some(oldest) = self
                .input_buffer
                .iter()
                .min_by_key(|(_, b)| b.frame.timestamp)
                .map(|(seq, _)| *seq)
            {
                self.input_buffer.remove(&oldest);
            }
        }
    }

    /// Removes an acknowledged input from the buffer and flags it in the
    /// history.
    pub fn acknowledge_input(&mut self, sequence: u32) {
        self.input_buffer.remove(&sequence);
        for frame in self.input_history.iter_mut() {
            if frame.sequence == sequence {
                frame.acknowledged = true;
                break;
            }
        }
    }

    pub fn unacknowledged_count(&self) -> usize {
        self.input_buffer.len()
    }

    pub fn unacknowledged_inputs(&self) -> Vec<InputFrame> {
        let mut frames: Vec<InputFrame> = self
            .input_buffer
            .values()
            .map(|b| b.frame.clone())
            .collect();
        frames.sort_by_key(|f| f.sequence);
        frames
    }

    /// Flags every buffered input at or after `from_sequence` for replay.
    pub fn mark_inputs_for_replay(&mut self, from_sequence: u32) {
        for buffered in self.input_buffer.values_mut() {
            if buffered.frame.sequence >= from_sequence {
                buffered.needs_replay = true;
            }
        }
    }

    /// Flagged inputs sorted by sequence, ready to re-apply.
    pub fn inputs_to_replay(&self) -> Vec<InputFrame> {
        let mut frames: Vec<InputFrame> = self
            .input_buffer
            .values()
            .filter(|b| b.needs_replay)
            .map(|b| b.frame.clone())
            .collect();
        frames.sort_by_key(|f| f.sequence);
        frames
    }

    pub fn clear_replay_flags(&mut self) {
        for buffered in self.input_buffer.values_mut() {
            buffered.needs_replay = false;
        }
    }

    /// Ages every buffered input by `dt`.
    pub fn update_buffer_timers(&mut self, dt: f32) {
        let dt_ms = (dt * 1000.0) as i64;
        for buffered in self.input_buffer.values_mut() {
            buffered.buffer_time_ms += dt_ms;
        }
    }

    /// Drops buffered inputs older than [`INPUT_TIMEOUT_MS`].
    pub fn cleanup_timed_out_inputs(&mut self) {
        self.input_buffer
            .retain(|_, b| b.buffer_time_ms <= INPUT_TIMEOUT_MS);
    }

    /// Trims history and buffer below the acknowledged watermark, keeping a
    /// ten-frame safety margin for late reordering.
    pub fn cleanup_history(&mut self, last_acked_sequence: u32) {
        let cutoff = last_acked_sequence.saturating_sub(10);
        while self
            .input_history
            .front()
            .is_some_and(|f| f.sequence < cutoff)
        {
            self.input_history.pop_front();
        }
        while self
            .prediction_history
            .front()
            .is_some_and(|s| s.sequence < cutoff)
        {
            self.prediction_history.pop_front();
        }
        self.input_buffer
            .retain(|seq, b| *seq >= cutoff && !b.frame.acknowledged);
    }

    pub fn history_len(&self) -> usize {
        self.input_history.len()
    }

    pub fn clear(&mut self) {
        self.input_history.clear();
        self.prediction_history.clear();
        self.input_buffer.clear();
        self.next_sequence = 1;
    }
}
