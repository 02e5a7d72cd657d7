//! Deterministic virtual-time [`Rtos`] implementation for tests. Real
//! `std::thread`s still run task bodies (so the coordinator and scheduler
//! code under test is unmodified), but the clock is a counter the test
//! driver advances explicitly with [`VirtualRtos::advance_time`], which
//! wakes every blocked queue receive in lockstep with the clock rather than
//! relying on wall-clock time.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use super::{QueueReceiveResult, QueueSendResult, Rtos, TaskPriority};

struct Clock {
    now_ms: Mutex<u32>,
    cv: Condvar,
}

impl Clock {
    fn now(&self) -> u32 {
        *self.now_ms.lock().unwrap()
    }

    fn advance(&self, ms: u32) {
        let mut now = self.now_ms.lock().unwrap();
        *now = now.wrapping_add(ms);
        drop(now);
        self.cv.notify_all();
    }
}

struct QueueState<T> {
    items: VecDeque<T>,
    capacity: usize,
    closed: bool,
}

/// A bounded FIFO whose blocked operations wake on [`VirtualRtos::advance_time`]
/// rather than wall-clock elapsed time.
pub struct VirtualQueue<T> {
    clock: Arc<Clock>,
    state: Mutex<QueueState<T>>,
}

impl<T> VirtualQueue<T> {
    fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        drop(state);
        self.clock.cv.notify_all();
    }
}

pub struct VirtualTask {
    join_handle: Option<thread::JoinHandle<()>>,
}

pub struct VirtualSemaphore {
    available: Mutex<bool>,
}

/// Test [`Rtos`] implementation with a manually-advanced clock.
pub struct VirtualRtos {
    clock: Arc<Clock>,
    stop_requested: Arc<AtomicBool>,
}

impl Default for VirtualRtos {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualRtos {
    pub fn new() -> Self {
        VirtualRtos {
            clock: Arc::new(Clock {
                now_ms: Mutex::new(0),
                cv: Condvar::new(),
            }),
            stop_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Moves the virtual clock forward by `ms` and wakes every queue
    /// waiting on a deadline, so they can re-check whether it has passed.
    pub fn advance_time(&self, ms: u32) {
        self.clock.advance(ms);
    }

    pub fn now(&self) -> u32 {
        self.clock.now()
    }
}

impl Rtos for VirtualRtos {
    type Queue<T: Send + 'static> = Arc<VirtualQueue<T>>;
    type Semaphore = Arc<VirtualSemaphore>;
    type Task = VirtualTask;

    fn spawn<F>(&self, name: &str, _priority: TaskPriority, body: F) -> Self::Task
    where
        F: FnOnce() + Send + 'static,
    {
        let join_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .expect("failed to spawn virtual RTOS task thread");
        VirtualTask {
            join_handle: Some(join_handle),
        }
    }

    fn delete_task(&self, mut task: Self::Task) {
        self.request_stop();
        self.clock.cv.notify_all();
        if let Some(handle) = task.join_handle.take() {
            let _ = handle.join();
        }
    }

    fn should_stop(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.clock.cv.notify_all();
    }

    fn yield_now(&self) {
        thread::yield_now();
    }

    fn tick_count(&self) -> u32 {
        self.clock.now()
    }

    fn create_binary_semaphore(&self) -> Self::Semaphore {
        Arc::new(VirtualSemaphore {
            available: Mutex::new(false),
        })
    }

    fn take_semaphore(&self, sem: &Self::Semaphore, timeout_ms: u32) -> bool {
        let deadline = self.clock.now().wrapping_add(timeout_ms);
        let mut available = sem.available.lock().unwrap();
        loop {
            if *available {
                *available = false;
                return true;
            }
            if self.should_stop() {
                return false;
            }
            if timeout_ms != super::MAX_DELAY_MS && self.clock.now() >= deadline {
                return false;
            }
            let guard = self.clock.now_ms.lock().unwrap();
            drop(available);
            let _ = self.clock.cv.wait(guard).unwrap();
            available = sem.available.lock().unwrap();
        }
    }

    fn give_semaphore(&self, sem: &Self::Semaphore) -> bool {
        let mut available = sem.available.lock().unwrap();
        *available = true;
        drop(available);
        self.clock.cv.notify_all();
        true
    }

    fn create_queue<T: Send + 'static>(&self, capacity: usize) -> Self::Queue<T> {
        Arc::new(VirtualQueue {
            clock: self.clock.clone(),
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                capacity,
                closed: false,
            }),
        })
    }

    fn send_to_queue<T: Send + 'static>(
        &self,
        queue: &Self::Queue<T>,
        item: T,
        timeout_ms: u32,
    ) -> QueueSendResult {
        let deadline = self.clock.now().wrapping_add(timeout_ms);
        loop {
            let mut state = queue.state.lock().unwrap();
            if state.closed {
                return QueueSendResult::Error;
            }
            if state.items.len() < state.capacity {
                state.items.push_back(item);
                drop(state);
                self.clock.cv.notify_all();
                return QueueSendResult::Ok;
            }
            if timeout_ms != super::MAX_DELAY_MS && self.clock.now() >= deadline {
                return QueueSendResult::Full;
            }
            drop(state);
            let guard = self.clock.now_ms.lock().unwrap();
            let _ = self.clock.cv.wait(guard).unwrap();
        }
    }

    fn send_to_queue_isr<T: Send + 'static>(&self, queue: &Self::Queue<T>, item: T) -> QueueSendResult {
        let mut state = match queue.state.try_lock() {
            Ok(state) => state,
            Err(_) => return QueueSendResult::Error,
        };
        if state.closed {
            return QueueSendResult::Error;
        }
        if state.items.len() >= state.capacity {
            return QueueSendResult::Full;
        }
        state.items.push_back(item);
        drop(state);
        self.clock.cv.notify_all();
        QueueSendResult::Ok
    }

    fn receive_from_queue<T: Send + 'static>(
        &self,
        queue: &Self::Queue<T>,
        timeout_ms: u32,
    ) -> QueueReceiveResult<T> {
        let deadline = self.clock.now().wrapping_add(timeout_ms);
        loop {
            let mut state = queue.state.lock().unwrap();
            if let Some(item) = state.items.pop_front() {
                return QueueReceiveResult::Ok(item);
            }
            if state.closed {
                return QueueReceiveResult::Error;
            }
            if timeout_ms != super::MAX_DELAY_MS && self.clock.now() >= deadline {
                return QueueReceiveResult::Timeout;
            }
            drop(state);
            let guard = self.clock.now_ms.lock().unwrap();
            let _ = self.clock.cv.wait(guard).unwrap();
        }
    }
}

impl<T> Drop for VirtualQueue<T> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn receive_times_out_only_after_clock_advances() {
        let rtos = Arc::new(VirtualRtos::new());
        let queue = rtos.create_queue::<u32>(1);
        let waiter_rtos = rtos.clone();
        let waiter_queue = queue.clone();
        let handle = thread::spawn(move || waiter_rtos.receive_from_queue(&waiter_queue, 100));
        thread::sleep(Duration::from_millis(20));
        rtos.advance_time(50);
        thread::sleep(Duration::from_millis(20));
        rtos.advance_time(60);
        let result = handle.join().unwrap();
        assert_eq!(result, QueueReceiveResult::Timeout);
    }

    #[test]
    fn receive_wakes_immediately_on_send() {
        let rtos = VirtualRtos::new();
        let queue = rtos.create_queue::<u32>(1);
        assert_eq!(rtos.send_to_queue(&queue, 9, 0), QueueSendResult::Ok);
        assert_eq!(rtos.receive_from_queue(&queue, 0), QueueReceiveResult::Ok(9));
    }
}
