// Gain automation for a single voice
//
// Mirrors the subset of AudioParam automation the player needs: an instant
// set, an exponential ramp and a linear ramp. Every ramp starts at the time
// and value of the event before it.

/// Loudest gain a clip is played at (volume 100)
pub const MAX_GAIN: f32 = 0.5;

/// Exponent of the volume curve. Above 1 so that low slider values are
/// quieter than a straight line would make them.
const VOLUME_CURVE_EXPONENT: f32 = 1.5;

/// Map a 0-100 volume slider value onto output gain.
///
/// `gain = MAX_GAIN * (volume / 100)^1.5`. Values above 100 are clamped.
pub fn volume_to_gain(volume: u8) -> f32 {
    let normalized = f32::from(volume.min(100)) / 100.0;
    MAX_GAIN * normalized.powf(VOLUME_CURVE_EXPONENT)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum EventKind {
    Set,
    Linear,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Event {
    time: f64,
    value: f32,
    kind: EventKind,
}

/// Gain timeline in device seconds
#[derive(Debug, Clone, PartialEq)]
pub struct GainEnvelope {
    default_value: f32,
    events: Vec<Event>,
}

impl Default for GainEnvelope {
    fn default() -> Self {
        Self::constant(1.0)
    }
}

impl GainEnvelope {
    /// Envelope that holds `value` forever
    pub fn constant(value: f32) -> Self {
        Self {
            default_value: value,
            events: Vec::new(),
        }
    }

    pub fn set_value_at_time(mut self, value: f32, time: f64) -> Self {
        self.push(Event { time, value, kind: EventKind::Set });
        self
    }

    pub fn linear_ramp_to_value_at_time(mut self, value: f32, time: f64) -> Self {
        self.push(Event { time, value, kind: EventKind::Linear });
        self
    }

    pub fn exponential_ramp_to_value_at_time(mut self, value: f32, time: f64) -> Self {
        self.push(Event { time, value, kind: EventKind::Exponential });
        self
    }

    // Events stay sorted by time; equal times keep insertion order
    fn push(&mut self, event: Event) {
        let index = self.events.partition_point(|e| e.time <= event.time);
        self.events.insert(index, event);
    }

    /// Time of the last scheduled event, if any
    pub fn end_time(&self) -> Option<f64> {
        self.events.last().map(|e| e.time)
    }

    /// Gain at device time `time`
    pub fn value_at(&self, time: f64) -> f32 {
        let next_index = self.events.partition_point(|e| e.time <= time);

        let (start_time, start_value) = match next_index.checked_sub(1) {
            Some(i) => (self.events[i].time, self.events[i].value),
            None => (f64::NEG_INFINITY, self.default_value),
        };

        let Some(next) = self.events.get(next_index) else {
            return start_value;
        };

        match next.kind {
            EventKind::Set => start_value,
            EventKind::Linear => {
                if !start_time.is_finite() {
                    return start_value;
                }
                let progress = ((time - start_time) / (next.time - start_time)) as f32;
                start_value + (next.value - start_value) * progress
            }
            EventKind::Exponential => {
                if !start_time.is_finite() || start_value <= 0.0 || next.value <= 0.0 {
                    return start_value;
                }
                let progress = ((time - start_time) / (next.time - start_time)) as f32;
                start_value * (next.value / start_value).powf(progress)
            }
        }
    }
}
