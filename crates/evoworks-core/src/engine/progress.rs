/// Events emitted while a conversion runs.
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

/// Forwards [`Progress`] events to an optional callback.
#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }

    /// Runs `step` over `items` inside a task, one increment per item.
    pub fn track<T, E>(
        &self,
        items: &[T],
        mut step: impl FnMut(&T) -> Result<(), E>,
    ) -> Result<(), E> {
        self.report(Progress::TaskStart {
            total_steps: items.len() as u64,
        });
        for item in items {
            step(item)?;
            self.report(Progress::TaskIncrement);
        }
        self.report(Progress::TaskFinish);
        Ok(())
    }
}
