//! RTOS abstraction: the narrow set of scheduling primitives the core
//! consumes (tasks, queues, binary semaphores, a monotonic clock). The core
//! never assumes a particular concurrency runtime; it is generic over any
//! `Rtos` implementation. Two are provided: [`std_rtos::StdRtos`], backed by
//! real OS threads, and [`virtual_rtos::VirtualRtos`], a deterministic
//! virtual-time implementation for tests.

pub mod std_rtos;
pub mod virtual_rtos;

/// Outcome of a bounded-wait send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueSendResult {
    Ok,
    Timeout,
    Full,
    Error,
}

/// Outcome of a bounded-wait receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueReceiveResult<T> {
    Ok(T),
    Timeout,
    Empty,
    Error,
}

/// Sentinel timeout meaning "wait indefinitely, but remain interruptible by
/// stop/notify" (the RTOS trait's `MAX_DELAY`).
pub const MAX_DELAY_MS: u32 = u32::MAX;

/// Relative scheduling priority hint. The two provided implementations use
/// this only for the OS thread's name/diagnostics; a true RTOS binding would
/// map it onto real priority levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

/// The scheduling, queueing, and clock primitives the protocol core
/// consumes. Components are generic over `R: Rtos` rather than depending on
/// a concrete runtime.
pub trait Rtos: Send + Sync + 'static {
    /// A bounded FIFO carrying items of type `T`. Receiving from a queue
    /// whose owning task has been deleted (or whose protocol has been
    /// stopped) must return [`QueueReceiveResult::Error`], never a
    /// spurious `Ok`.
    type Queue<T: Send + 'static>: Send + Sync + Clone;
    /// A binary semaphore.
    type Semaphore: Send + Sync;
    /// An opaque handle to a spawned task; dropping or deleting it tears
    /// down the task's resources.
    type Task: Send;

    /// Spawns a long-lived task. `body` receives no arguments; it is
    /// expected to poll [`Rtos::should_stop`] at every loop iteration.
    fn spawn<F>(&self, name: &str, priority: TaskPriority, body: F) -> Self::Task
    where
        F: FnOnce() + Send + 'static;

    /// Tears down `task`. Any queue it was blocked on must wake with
    /// [`QueueReceiveResult::Error`].
    fn delete_task(&self, task: Self::Task);

    /// `true` once a stop has been requested; task bodies must check this
    /// at every loop iteration, not only on suspension return.
    fn should_stop(&self) -> bool;

    /// Signals every task to stop and wakes every queue so that blocked
    /// receives observe the stop rather than hanging.
    fn request_stop(&self);

    /// Cooperative yield point.
    fn yield_now(&self);

    /// Monotonic milliseconds, wrapping roughly every 49.7 days.
    fn tick_count(&self) -> u32;

    fn create_binary_semaphore(&self) -> Self::Semaphore;
    fn take_semaphore(&self, sem: &Self::Semaphore, timeout_ms: u32) -> bool;
    fn give_semaphore(&self, sem: &Self::Semaphore) -> bool;

    fn create_queue<T: Send + 'static>(&self, capacity: usize) -> Self::Queue<T>;
    fn send_to_queue<T: Send + 'static>(
        &self,
        queue: &Self::Queue<T>,
        item: T,
        timeout_ms: u32,
    ) -> QueueSendResult;
    /// Non-blocking send usable from an ISR-equivalent context (the radio's
    /// on-receive callback). Never blocks; drops the item and reports
    /// `Full` if the queue has no room.
    fn send_to_queue_isr<T: Send + 'static>(&self, queue: &Self::Queue<T>, item: T) -> QueueSendResult;
    fn receive_from_queue<T: Send + 'static>(
        &self,
        queue: &Self::Queue<T>,
        timeout_ms: u32,
    ) -> QueueReceiveResult<T>;
}
