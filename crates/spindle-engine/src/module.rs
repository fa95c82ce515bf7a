//! The [`Module`] trait.

use crate::error::ModuleError;
use crate::event::Event;

/// A processing unit run once per event.
///
/// # Contract
///
/// - Modules subscribe to their inputs when constructed, through the
///   [`Subscriptions`](spindle_messenger::Subscriptions) guard handed to the
///   factory passed to [`PipelineBuilder::add_module`](crate::PipelineBuilder::add_module).
///   The typed handles returned there are what the module keeps.
/// - `run()` takes `&self`. Per-event inputs are read from the [`Event`],
///   never stored in the module, so one instance can serve several events
///   at once on different worker threads.
/// - `initialize()` and `finalize()` run once, before the first and after
///   the last event.
///
/// # Examples
///
/// ```
/// use spindle_core::{Message, MsgFlags};
/// use spindle_engine::{Event, Module, ModuleError};
/// use spindle_messenger::{Subscriptions, Single};
///
/// struct Energy(f64);
/// struct Calibrated(f64);
///
/// struct Calibrator {
///     raw: Single<Energy>,
///     gain: f64,
/// }
///
/// impl Calibrator {
///     fn new(subs: &mut Subscriptions, gain: f64) -> Self {
///         subs.declare_output::<Calibrated>();
///         Self { raw: subs.bind_single(MsgFlags::REQUIRED), gain }
///     }
/// }
///
/// impl Module for Calibrator {
///     fn run(&self, event: &mut Event<'_>) -> Result<(), ModuleError> {
///         let raw = event.single(&self.raw).ok_or_else(|| ModuleError::failed("no energy"))?;
///         let calibrated: Vec<_> = raw.data().iter().map(|e| Calibrated(e.0 * self.gain)).collect();
///         event.dispatch(Message::new(calibrated))?;
///         Ok(())
///     }
/// }
/// ```
pub trait Module: Send + Sync + 'static {
    /// Prepare for the first event.
    ///
    /// Default: no-op.
    fn initialize(&self) -> Result<(), ModuleError> {
        Ok(())
    }

    /// Process one event.
    fn run(&self, event: &mut Event<'_>) -> Result<(), ModuleError>;

    /// Wrap up after the last event.
    ///
    /// Default: no-op.
    fn finalize(&self) -> Result<(), ModuleError> {
        Ok(())
    }
}
