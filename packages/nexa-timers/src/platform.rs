use crate::error::CallbackError;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Monotonic time source. Deadlines never depend on wall-clock time.
pub trait MonotonicClock {
    fn now(&self) -> Instant;
}

/// The host's one-shot wakeup primitive. At most one arm is outstanding;
/// arming again replaces the previous one.
pub trait PlatformTimer {
    fn arm(&self, delay: Duration, on_fire: Box<dyn FnOnce()>);
    fn cancel(&self);
}

/// Runs the body behind an opaque callback handle.
pub trait CallbackExecutor<H> {
    fn invoke(&self, handler: &H) -> Result<(), CallbackError>;
}

impl<H, F> CallbackExecutor<H> for F
where
    F: Fn(&H) -> Result<(), CallbackError>,
{
    fn invoke(&self, handler: &H) -> Result<(), CallbackError> {
        self(handler)
    }
}

impl<T: MonotonicClock + ?Sized> MonotonicClock for Rc<T> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

impl<T: PlatformTimer + ?Sized> PlatformTimer for Rc<T> {
    fn arm(&self, delay: Duration, on_fire: Box<dyn FnOnce()>) {
        (**self).arm(delay, on_fire)
    }

    fn cancel(&self) {
        (**self).cancel()
    }
}

/// Callback handle for hosts that store closures directly.
pub type Callback = Box<dyn Fn() -> Result<(), CallbackError>>;

/// Executor for [`Callback`] handles.
pub fn call_directly(callback: &Callback) -> Result<(), CallbackError> {
    callback()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl MonotonicClock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    elapsed: Cell<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            elapsed: Cell::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.elapsed.set(self.elapsed.get() + by);
    }

    /// Moves the clock to `at`. Earlier instants are ignored.
    pub fn advance_to(&self, at: Instant) {
        let target = at.saturating_duration_since(self.base);
        if target > self.elapsed.get() {
            self.elapsed.set(target);
        }
    }

    pub fn start(&self) -> Instant {
        self.base
    }
}

impl MonotonicClock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed.get()
    }
}

/// Platform timer that holds its arm until [`ManualTimer::fire`] is called.
#[derive(Default)]
pub struct ManualTimer {
    armed: RefCell<Option<(Duration, Box<dyn FnOnce()>)>>,
    arm_count: Cell<usize>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn armed_delay(&self) -> Option<Duration> {
        self.armed.borrow().as_ref().map(|(delay, _)| *delay)
    }

    pub fn is_armed(&self) -> bool {
        self.armed.borrow().is_some()
    }

    pub fn arm_count(&self) -> usize {
        self.arm_count.get()
    }

    /// Runs the pending wakeup, if any. Returns whether one ran.
    pub fn fire(&self) -> bool {
        let armed = self.armed.borrow_mut().take();
        match armed {
            Some((_, on_fire)) => {
                on_fire();
                true
            }
            None => false,
        }
    }
}

impl PlatformTimer for ManualTimer {
    fn arm(&self, delay: Duration, on_fire: Box<dyn FnOnce()>) {
        self.arm_count.set(self.arm_count.get() + 1);
        *self.armed.borrow_mut() = Some((delay, on_fire));
    }

    fn cancel(&self) {
        self.armed.borrow_mut().take();
    }
}
