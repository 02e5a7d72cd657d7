//! Real-time implementation of [`Rtos`] backed by `std::thread` and
//! `std::sync` primitives, for production use on any platform with an OS
//! scheduler.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use super::{QueueReceiveResult, QueueSendResult, Rtos, TaskPriority};

struct QueueState<T> {
    items: VecDeque<T>,
    capacity: usize,
    closed: bool,
    _marker: std::marker::PhantomData<T>,
}

/// A bounded FIFO shared between producer and consumer threads.
pub struct StdQueue<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> StdQueue<T> {
    fn new(capacity: usize) -> Arc<Self> {
        Arc::new(StdQueue {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                capacity,
                closed: false,
                _marker: std::marker::PhantomData,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        })
    }

    fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }
}

/// Handle to a task spawned by [`StdRtos`]. Dropping it detaches the
/// thread; call [`Rtos::delete_task`] to join it after requesting a stop.
pub struct StdTask {
    join_handle: Option<thread::JoinHandle<()>>,
}

/// A binary semaphore backed by a mutex-guarded bool and a condvar.
pub struct StdSemaphore {
    available: Mutex<bool>,
    cv: Condvar,
}

/// Production [`Rtos`] implementation using real OS threads and the
/// wall-clock monotonic `Instant`.
pub struct StdRtos {
    start: Instant,
    stop_requested: Arc<AtomicBool>,
}

impl Default for StdRtos {
    fn default() -> Self {
        Self::new()
    }
}

impl StdRtos {
    pub fn new() -> Self {
        StdRtos {
            start: Instant::now(),
            stop_requested: Arc::new(AtomicBool::new(false)),
        }
    }
}

fn timeout_to_duration(timeout_ms: u32) -> Option<Duration> {
    if timeout_ms == super::MAX_DELAY_MS {
        None
    } else {
        Some(Duration::from_millis(timeout_ms as u64))
    }
}

impl Rtos for StdRtos {
    type Queue<T: Send + 'static> = Arc<StdQueue<T>>;
    type Semaphore = Arc<StdSemaphore>;
    type Task = StdTask;

    fn spawn<F>(&self, name: &str, _priority: TaskPriority, body: F) -> Self::Task
    where
        F: FnOnce() + Send + 'static,
    {
        let join_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(body)
            .expect("failed to spawn RTOS task thread");
        StdTask {
            join_handle: Some(join_handle),
        }
    }

    fn delete_task(&self, mut task: Self::Task) {
        self.request_stop();
        if let Some(handle) = task.join_handle.take() {
            let _ = handle.join();
        }
    }

    fn should_stop(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    fn yield_now(&self) {
        thread::yield_now();
    }

    fn tick_count(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }

    fn create_binary_semaphore(&self) -> Self::Semaphore {
        Arc::new(StdSemaphore {
            available: Mutex::new(false),
            cv: Condvar::new(),
        })
    }

    fn take_semaphore(&self, sem: &Self::Semaphore, timeout_ms: u32) -> bool {
        let mut available = sem.available.lock().unwrap();
        match timeout_to_duration(timeout_ms) {
            None => {
                while !*available {
                    available = sem.cv.wait(available).unwrap();
                }
                *available = false;
                true
            }
            Some(duration) => {
                let deadline = Instant::now() + duration;
                while !*available {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return false;
                    }
                    let (guard, result) = sem.cv.wait_timeout(available, remaining).unwrap();
                    available = guard;
                    if result.timed_out() && !*available {
                        return false;
                    }
                }
                *available = false;
                true
            }
        }
    }

    fn give_semaphore(&self, sem: &Self::Semaphore) -> bool {
        let mut available = sem.available.lock().unwrap();
        *available = true;
        sem.cv.notify_one();
        true
    }

    fn create_queue<T: Send + 'static>(&self, capacity: usize) -> Self::Queue<T> {
        StdQueue::new(capacity)
    }

    fn send_to_queue<T: Send + 'static>(
        &self,
        queue: &Self::Queue<T>,
        item: T,
        timeout_ms: u32,
    ) -> QueueSendResult {
        let mut state = queue.state.lock().unwrap();
        if state.closed {
            return QueueSendResult::Error;
        }
        match timeout_to_duration(timeout_ms) {
            None => {
                while state.items.len() >= state.capacity && !state.closed {
                    state = queue.not_full.wait(state).unwrap();
                }
            }
            Some(duration) => {
                let deadline = Instant::now() + duration;
                while state.items.len() >= state.capacity && !state.closed {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return QueueSendResult::Full;
                    }
                    let (guard, _) = queue.not_full.wait_timeout(state, remaining).unwrap();
                    state = guard;
                }
            }
        }
        if state.closed {
            return QueueSendResult::Error;
        }
        state.items.push_back(item);
        drop(state);
        queue.not_empty.notify_one();
        QueueSendResult::Ok
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
        queue.not_empty.notify_one();
        QueueSendResult::Ok
    }

    fn receive_from_queue<T: Send + 'static>(
        &self,
        queue: &Self::Queue<T>,
        timeout_ms: u32,
    ) -> QueueReceiveResult<T> {
        let mut state = queue.state.lock().unwrap();
        match timeout_to_duration(timeout_ms) {
            None => {
                while state.items.is_empty() && !state.closed {
                    state = queue.not_empty.wait(state).unwrap();
                }
            }
            Some(duration) => {
                let deadline = Instant::now() + duration;
                while state.items.is_empty() && !state.closed {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return QueueReceiveResult::Timeout;
                    }
                    let (guard, _) = queue.not_empty.wait_timeout(state, remaining).unwrap();
                    state = guard;
                }
            }
        }
        if let Some(item) = state.items.pop_front() {
            drop(state);
            queue.not_full.notify_one();
            QueueReceiveResult::Ok(item)
        } else if state.closed {
            QueueReceiveResult::Error
        } else {
            QueueReceiveResult::Empty
        }
    }
}

impl Drop for StdRtos {
    fn drop(&mut self) {
        self.request_stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_round_trips_items() {
        let rtos = StdRtos::new();
        let queue = rtos.create_queue::<u32>(4);
        assert_eq!(rtos.send_to_queue(&queue, 7, 0), QueueSendResult::Ok);
        match rtos.receive_from_queue(&queue, 0) {
            QueueReceiveResult::Ok(v) => assert_eq!(v, 7),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn receive_times_out_when_empty() {
        let rtos = StdRtos::new();
        let queue = rtos.create_queue::<u32>(1);
        assert_eq!(rtos.receive_from_queue(&queue, 10), QueueReceiveResult::Timeout);
    }

    #[test]
    fn closing_queue_wakes_pending_receive_with_error() {
        let rtos = Arc::new(StdRtos::new());
        let queue = rtos.create_queue::<u32>(1);
        let closer = queue.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            closer.close();
        });
        let result = rtos.receive_from_queue(&queue, super::super::MAX_DELAY_MS);
        handle.join().unwrap();
        assert_eq!(result, QueueReceiveResult::Error);
    }

    #[test]
    fn semaphore_take_give_round_trips() {
        let rtos = StdRtos::new();
        let sem = rtos.create_binary_semaphore();
        assert!(!rtos.take_semaphore(&sem, 5));
        assert!(rtos.give_semaphore(&sem));
        assert!(rtos.take_semaphore(&sem, 0));
    }
}
