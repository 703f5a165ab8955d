//! Executable job payloads

use std::borrow::Cow;

/// Work carried by a job
///
/// Any type with a zero-argument `execute` and a diagnostic name can be
/// scheduled.
pub trait JobPayload: Send + 'static {
    /// Run the work; called at most once
    fn execute(&mut self);

    /// Human-readable name for diagnostics
    fn name(&self) -> &str;
}

/// Payload wrapping a one-shot closure
pub struct FnJob<F> {
    name: Cow<'static, str>,
    func: Option<F>,
}

impl<F> FnJob<F>
where
    F: FnOnce() + Send + 'static,
{
    /// Wrap `func` under `name`
    pub fn new(name: impl Into<Cow<'static, str>>, func: F) -> Self {
        Self {
            name: name.into(),
            func: Some(func),
        }
    }
}

impl<F> JobPayload for FnJob<F>
where
    F: FnOnce() + Send + 'static,
{
    fn execute(&mut self) {
        if let Some(func) = self.func.take() {
            func();
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
