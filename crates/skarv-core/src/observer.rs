use crate::outcome::FileOutcome;

/// Progress events emitted while a case uploads.
///
/// `FileDone` comes from the engine workers as each outcome lands;
/// the attempt markers come from the batch retry loop.
#[derive(Debug)]
pub enum UploadEvent<'a> {
    AttemptStarted {
        attempt: usize,
        files: usize,
    },
    FileDone {
        outcome: &'a FileOutcome,
    },
    AttemptFinished {
        attempt: usize,
        ok: usize,
        failed: usize,
        rejected: usize,
    },
}

/// Receives progress events. Implementations run on worker threads and must
/// not block for long; the engine makes no progress while a callback runs.
pub trait UploadObserver: Send + Sync {
    fn on_event(&self, event: &UploadEvent<'_>);
}

/// Discards every event.
pub struct NoopObserver;

impl UploadObserver for NoopObserver {
    fn on_event(&self, _event: &UploadEvent<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl UploadObserver for Recorder {
        fn on_event(&self, event: &UploadEvent<'_>) {
            let label = match event {
                UploadEvent::AttemptStarted { .. } => "started",
                UploadEvent::FileDone { .. } => "done",
                UploadEvent::AttemptFinished { .. } => "finished",
            };
            self.seen.lock().unwrap().push(label.to_owned());
        }
    }

    #[test]
    fn observer_receives_events() {
        let recorder = Recorder {
            seen: Mutex::new(Vec::new()),
        };
        recorder.on_event(&UploadEvent::AttemptStarted {
            attempt: 1,
            files: 3,
        });
        recorder.on_event(&UploadEvent::AttemptFinished {
            attempt: 1,
            ok: 3,
            failed: 0,
            rejected: 0,
        });
        assert_eq!(*recorder.seen.lock().unwrap(), vec!["started", "finished"]);
    }

    #[test]
    fn noop_observer_accepts_events() {
        NoopObserver.on_event(&UploadEvent::AttemptStarted {
            attempt: 1,
            files: 0,
        });
    }
}
