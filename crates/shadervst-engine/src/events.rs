use crossbeam_channel::Sender;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// General-purpose log line.
    Log {
        level: LogLevel,
        tag: &'static str,
        msg: String,
    },

    /// A shader slot compiled, linked and passed uniform validation.
    ShaderCompileOk {
        slot: usize,
        intrinsics: usize,
        parameters: usize,
    },

    /// A shader slot failed to build. `log` carries the driver log or the
    /// uniform diagnostic.
    ShaderCompileErr { slot: Option<usize>, log: String },

    /// User-facing notification. Never blocks the caller.
    Alert { title: String, message: String },

    /// The whole pipeline was built; frames are being drawn.
    PipelineReady { programs: usize, framebuffers: usize },

    /// The pipeline failed to build; frames are cleared to black.
    PipelineInvalid,

    /// The capture bridge restarted (first block or sample-rate change).
    AudioReset { sample_rate: f64, history_len: usize },
}

/// Non-blocking publisher for engine events.
///
/// A missing or disconnected receiver is not an error: events are dropped.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<Sender<EngineEvent>>,
}

impl EventSink {
    pub fn new(tx: Sender<EngineEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Sink that drops everything.
    pub fn disconnected() -> Self {
        Self { tx: None }
    }

    pub fn send(&self, event: EngineEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(event);
        }
    }

    pub fn log(&self, level: LogLevel, tag: &'static str, msg: impl Into<String>) {
        self.send(EngineEvent::Log {
            level,
            tag,
            msg: msg.into(),
        });
    }

    /// Report a build failure both as a log line and as a user alert.
    pub fn alert_error(&self, err: &EngineError) {
        let shader_slot = match err {
            EngineError::Compile { slot, .. }
            | EngineError::Link { slot, .. }
            | EngineError::IllegalIntrinsic { slot, .. }
            | EngineError::IllegalParameter { slot, .. } => Some(Some(*slot)),
            EngineError::CopyProgram { .. } => Some(None),
            _ => None,
        };
        if let Some(slot) = shader_slot {
            self.send(EngineEvent::ShaderCompileErr {
                slot,
                log: err.to_string(),
            });
        }
        self.send(EngineEvent::Alert {
            title: err.title().to_string(),
            message: err.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnected_sink_drops_events() {
        let sink = EventSink::disconnected();
        sink.log(LogLevel::Info, "TEST", "nobody listens");
    }

    #[test]
    fn compile_errors_raise_a_log_and_an_alert() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let sink = EventSink::new(tx);
        sink.alert_error(&EngineError::Link {
            slot: 2,
            log: "undefined symbol".into(),
        });

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            EngineEvent::ShaderCompileErr { slot: Some(2), log } if log.contains("undefined symbol")
        ));
        assert!(matches!(
            &events[1],
            EngineEvent::Alert { title, .. } if title == "Error building program"
        ));
    }

    #[test]
    fn dropped_receiver_does_not_panic() {
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        EventSink::new(tx).send(EngineEvent::PipelineInvalid);
    }
}
