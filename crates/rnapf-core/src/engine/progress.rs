use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone)]
pub enum Progress {
    PhaseStart { name: &'static str },
    PhaseFinish,

    TaskStart { total_steps: u64 },
    TaskIncrement,
    TaskFinish,

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

/// Shared flag a caller can raise to stop a running fold at the next span
/// boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Forwards progress events to an optional callback and carries the
/// cooperative cancellation flag. The engine reports one `TaskIncrement`
/// and polls the flag once per span increment.
#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
    cancel: CancelFlag,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
            cancel: CancelFlag::new(),
        }
    }

    /// The flag a caller holds on to for cancelling this fold.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn reporter_without_callback_swallows_events() {
        let reporter = ProgressReporter::new();
        reporter.report(Progress::TaskIncrement);
        assert!(!reporter.is_cancelled());
    }

    #[test]
    fn callback_receives_events_in_order() {
        let seen = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            seen.lock().unwrap().push(format!("{event:?}"));
        }));
        reporter.report(Progress::TaskStart { total_steps: 3 });
        reporter.report(Progress::TaskIncrement);
        reporter.report(Progress::TaskFinish);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen[0].contains("TaskStart"));
    }

    #[test]
    fn cancel_flag_is_shared_with_the_reporter() {
        let reporter = ProgressReporter::new();
        let flag = reporter.cancel_flag();
        assert!(!reporter.is_cancelled());
        flag.cancel();
        assert!(reporter.is_cancelled());
    }
}
