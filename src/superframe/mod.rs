//! Superframe scheduler: the time source. Computes the current slot from
//! the monotonic clock and three parameters, emits slot-transition
//! callbacks, and owns the single update task that sleeps until the next
//! meaningful event.

use std::sync::{Arc, Mutex};

use crate::rtos::{QueueReceiveResult, Rtos, TaskPriority};
use crate::time::elapsed;

/// Radio activity assigned to one slot of the superframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotType {
    Tx,
    Rx,
    Sleep,
    DiscoveryRx,
    DiscoveryTx,
    ControlRx,
    ControlTx,
}

/// One entry of a node's slot table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotAllocation {
    pub slot_number: u16,
    pub slot_type: SlotType,
}

/// An ordered, gap-free slot table: `slot_number` spans `[0, total_slots)`.
#[derive(Debug, Clone, Default)]
pub struct SlotTable {
    slots: Vec<SlotType>,
}

impl SlotTable {
    pub fn new(total_slots: u16) -> Self {
        SlotTable {
            slots: vec![SlotType::Sleep; total_slots as usize],
        }
    }

    pub fn set(&mut self, slot_number: u16, slot_type: SlotType) {
        if let Some(slot) = self.slots.get_mut(slot_number as usize) {
            *slot = slot_type;
        }
    }

    pub fn get(&self, slot_number: u16) -> SlotType {
        self.slots
            .get(slot_number as usize)
            .copied()
            .unwrap_or(SlotType::Sleep)
    }

    pub fn len(&self) -> u16 {
        self.slots.len() as u16
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn allocations(&self) -> Vec<SlotAllocation> {
        self.slots
            .iter()
            .enumerate()
            .map(|(i, &slot_type)| SlotAllocation {
                slot_number: i as u16,
                slot_type,
            })
            .collect()
    }
}

const MIN_EVENT_TIMEOUT_MS: u32 = 20;
const MAX_EVENT_TIMEOUT_MS: u32 = 5_000;
const SYNC_WAIT_TIMEOUT_MS: u32 = 1_000;
const YIELD_TIMEOUT_MS: u32 = 1;

struct SchedulerState {
    total_slots: u16,
    slot_duration_ms: u32,
    superframe_start_ms: u32,
    is_synchronized: bool,
    auto_advance: bool,
    update_start_on_new_frame: bool,
    last_slot: u16,
    drift_accumulator_ms: i64,
}

impl SchedulerState {
    fn superframe_duration(&self) -> u32 {
        self.total_slots as u32 * self.slot_duration_ms
    }

    fn current_slot(&self, now: u32) -> u16 {
        if !self.auto_advance {
            return self.total_slots.saturating_sub(1);
        }
        let into = elapsed(now, self.superframe_start_ms);
        ((into / self.slot_duration_ms) % self.total_slots as u32) as u16
    }
}

/// Callback fired on a slot transition: `(current_slot, is_new_superframe)`.
pub type SlotTransitionCallback = Box<dyn Fn(u16, bool) + Send + Sync>;

enum Notification {
    ConfigUpdated,
    Synchronized,
    Stop,
}

/// The TDMA superframe scheduler. Generic over any [`Rtos`] implementation;
/// the update task's sleep always goes through `Rtos::receive_from_queue`
/// so a virtual-time RTOS can advance clock and wakeups atomically.
pub struct SuperframeScheduler<R: Rtos> {
    rtos: Arc<R>,
    state: Mutex<SchedulerState>,
    notify_queue: R::Queue<Notification>,
    task: Mutex<Option<R::Task>>,
    on_transition: Mutex<Option<SlotTransitionCallback>>,
}

impl<R: Rtos> SuperframeScheduler<R> {
    pub fn new(rtos: Arc<R>, total_slots: u16, slot_duration_ms: u32) -> Arc<Self> {
        let notify_queue = rtos.create_queue(8);
        Arc::new(SuperframeScheduler {
            rtos,
            state: Mutex::new(SchedulerState {
                total_slots,
                slot_duration_ms,
                superframe_start_ms: 0,
                is_synchronized: false,
                auto_advance: true,
                update_start_on_new_frame: false,
                last_slot: 0,
                drift_accumulator_ms: 0,
            }),
            notify_queue,
            task: Mutex::new(None),
            on_transition: Mutex::new(None),
        })
    }

    pub fn set_on_transition(&self, callback: SlotTransitionCallback) {
        *self.on_transition.lock().unwrap() = Some(callback);
    }

    /// Sets whether the start-of-superframe time advances automatically
    /// (`true`, manager/initializing role) or is held fixed awaiting an
    /// external sync (`false`, follower role).
    pub fn set_update_start_on_new_frame(&self, value: bool) {
        self.state.lock().unwrap().update_start_on_new_frame = value;
    }

    pub fn is_synchronized(&self) -> bool {
        self.state.lock().unwrap().is_synchronized
    }

    pub fn current_slot(&self, now: u32) -> u16 {
        self.state.lock().unwrap().current_slot(now)
    }

    pub fn current_slot_type(&self, slot_table: &SlotTable, now: u32) -> SlotType {
        let slot = self.current_slot(now);
        slot_table.get(slot)
    }

    pub fn time_remaining_in_slot(&self, now: u32) -> u32 {
        let state = self.state.lock().unwrap();
        let into = elapsed(now, state.superframe_start_ms) % state.slot_duration_ms;
        state.slot_duration_ms - into
    }

    /// Arms `superframe_start_ms = now`, marks synchronized, and spawns the
    /// update task.
    pub fn start(self: &Arc<Self>, now: u32) -> Result<(), crate::error::MeshError> {
        {
            let mut state = self.state.lock().unwrap();
            state.superframe_start_ms = now;
            state.is_synchronized = true;
            state.last_slot = state.current_slot(now);
        }
        let mut task_guard = self.task.lock().unwrap();
        if task_guard.is_some() {
            return Err(crate::error::MeshError::InvalidState(
                "superframe scheduler already started".into(),
            ));
        }
        let scheduler = self.clone();
        let rtos = self.rtos.clone();
        let task = rtos.spawn("superframe-update", TaskPriority::High, move || {
            scheduler.update_task_loop();
        });
        *task_guard = Some(task);
        Ok(())
    }

    /// Tears down the update task. The dispatcher must not hold references
    /// after this returns.
    pub fn stop(&self) -> Result<(), crate::error::MeshError> {
        self.state.lock().unwrap().is_synchronized = false;
        let _ = self
            .rtos
            .send_to_queue(&self.notify_queue, Notification::Stop, 0);
        self.rtos.request_stop();
        if let Some(task) = self.task.lock().unwrap().take() {
            self.rtos.delete_task(task);
        }
        Ok(())
    }

    /// Reconfigures total slots / slot duration, optionally ending the
    /// current superframe immediately.
    pub fn update_config(
        &self,
        total_slots: u16,
        slot_duration_ms: u32,
        end_current_immediately: bool,
        now: u32,
    ) -> Result<(), crate::error::MeshError> {
        if total_slots == 0 || slot_duration_ms == 0 {
            return Err(crate::error::MeshError::invalid_argument(
                "total_slots/slot_duration_ms",
                "must be greater than zero",
            ));
        }
        {
            let mut state = self.state.lock().unwrap();
            state.total_slots = total_slots;
            state.slot_duration_ms = slot_duration_ms;
            if end_current_immediately {
                state.superframe_start_ms = now;
                state.last_slot = state.total_slots.saturating_sub(1);
            }
        }
        let _ = self
            .rtos
            .send_to_queue(&self.notify_queue, Notification::ConfigUpdated, 0);
        Ok(())
    }

    /// Called on a natural slot-0 boundary.
    pub fn handle_new_superframe(&self, now: u32) {
        let is_new = {
            let mut state = self.state.lock().unwrap();
            if state.update_start_on_new_frame {
                let duration = state.superframe_duration();
                let expected_end = state.superframe_start_ms.wrapping_add(duration);
                if elapsed(now, expected_end) > duration {
                    state.superframe_start_ms = now;
                } else {
                    state.superframe_start_ms = state.superframe_start_ms.wrapping_add(duration);
                }
            }
            state.last_slot = 0;
            true
        };
        if is_new {
            if let Some(cb) = self.on_transition.lock().unwrap().as_ref() {
                cb(0, true);
            }
        }
    }

    /// Adopts an external timing reference, e.g. from a `ROUTE_TABLE`
    /// broadcast carrying the sender's current slot.
    pub fn synchronize_with(&self, external_slot_start_ms: u32, external_slot: u16, now: u32) {
        let mut state = self.state.lock().unwrap();
        let slot_duration = state.slot_duration_ms;
        let duration = state.superframe_duration();
        let implied_start =
            external_slot_start_ms.wrapping_sub(external_slot as u32 * slot_duration);
        let old_start = state.superframe_start_ms;
        let new_start = if elapsed(implied_start, now) > duration {
            // Implied start sits more than one superframe in the future: corrupt input.
            now
        } else {
            implied_start
        };
        state.drift_accumulator_ms += new_start as i64 - old_start as i64;
        state.superframe_start_ms = new_start;
        state.is_synchronized = true;
        state.last_slot = external_slot.wrapping_sub(1);
        drop(state);
        let _ = self
            .rtos
            .send_to_queue(&self.notify_queue, Notification::Synchronized, 0);
    }

    /// `true` if the accumulated drift since the last reset exceeds
    /// `threshold_ms`. Does not clear `is_synchronized` itself — the
    /// network service decides what to do about drift.
    pub fn needs_resynchronization(&self, threshold_ms: u32) -> bool {
        let state = self.state.lock().unwrap();
        state.drift_accumulator_ms.unsigned_abs() as u64 > threshold_ms as u64
    }

    pub fn reset_drift(&self) {
        self.state.lock().unwrap().drift_accumulator_ms = 0;
    }

    fn next_event_timeout(&self, now: u32) -> u32 {
        let state = self.state.lock().unwrap();
        let current = state.current_slot(now) as u32;
        let duration = state.superframe_duration();
        let next_boundary = state
            .superframe_start_ms
            .wrapping_add((current + 1) * state.slot_duration_ms);
        let remaining = next_boundary.wrapping_sub(now);
        if remaining > 0 && remaining <= duration {
            return remaining.clamp(MIN_EVENT_TIMEOUT_MS, MAX_EVENT_TIMEOUT_MS);
        }
        let superframe_end = state.superframe_start_ms.wrapping_add(duration);
        if elapsed(now, superframe_end) <= duration && !state.update_start_on_new_frame {
            SYNC_WAIT_TIMEOUT_MS
        } else {
            YIELD_TIMEOUT_MS
        }
    }

    fn update_task_loop(self: Arc<Self>) {
        while !self.rtos.should_stop() {
            let now = self.rtos.tick_count();
            let timeout = self.next_event_timeout(now);
            match self.rtos.receive_from_queue(&self.notify_queue, timeout) {
                QueueReceiveResult::Ok(Notification::Stop) => break,
                QueueReceiveResult::Error => break,
                _ => {}
            }
            if self.rtos.should_stop() {
                break;
            }
            let now = self.rtos.tick_count();
            let (current, last, auto_advance) = {
                let state = self.state.lock().unwrap();
                (
                    state.current_slot(now),
                    state.last_slot,
                    state.auto_advance,
                )
            };
            if current != last {
                if current == 0 && auto_advance {
                    self.handle_new_superframe(now);
                } else {
                    self.state.lock().unwrap().last_slot = current;
                    if let Some(cb) = self.on_transition.lock().unwrap().as_ref() {
                        cb(current, false);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtos::virtual_rtos::VirtualRtos;
    use std::sync::atomic::{AtomicU16, Ordering};

    #[test]
    fn current_slot_is_monotonic_within_one_superframe() {
        let rtos = Arc::new(VirtualRtos::new());
        let scheduler = SuperframeScheduler::new(rtos, 10, 100);
        scheduler.state.lock().unwrap().superframe_start_ms = 0;
        let a = scheduler.current_slot(150);
        let b = scheduler.current_slot(550);
        assert!(a <= b);
    }

    #[test]
    fn current_slot_wraps_at_superframe_boundary() {
        let rtos = Arc::new(VirtualRtos::new());
        let scheduler = SuperframeScheduler::new(rtos, 10, 100);
        scheduler.state.lock().unwrap().superframe_start_ms = 0;
        assert_eq!(scheduler.current_slot(999), 9);
        assert_eq!(scheduler.current_slot(1000), 0);
    }

    #[test]
    fn synchronize_with_clamps_far_future_start() {
        let rtos = Arc::new(VirtualRtos::new());
        let scheduler = SuperframeScheduler::new(rtos, 10, 100);
        let now = 1_000;
        // superframe duration is 1000ms; an external start far beyond one
        // superframe into the future must be rejected in favor of `now`.
        scheduler.synchronize_with(1_000_000, 0, now);
        assert_eq!(scheduler.state.lock().unwrap().superframe_start_ms, now);
    }

    #[test]
    fn synchronize_with_adopts_reasonable_external_reference() {
        let rtos = Arc::new(VirtualRtos::new());
        let scheduler = SuperframeScheduler::new(rtos, 10, 100);
        let now = 1_000;
        scheduler.synchronize_with(1_050, 3, now);
        let expected = 1_050u32.wrapping_sub(3 * 100);
        assert_eq!(scheduler.state.lock().unwrap().superframe_start_ms, expected);
        assert!(scheduler.is_synchronized());
    }

    #[test]
    fn slot_table_defaults_to_sleep() {
        let table = SlotTable::new(4);
        assert_eq!(table.get(0), SlotType::Sleep);
        assert_eq!(table.get(99), SlotType::Sleep);
    }

    #[test]
    fn update_task_fires_transition_callbacks() {
        let rtos = Arc::new(VirtualRtos::new());
        let scheduler = SuperframeScheduler::new(rtos.clone(), 4, 50);
        let seen = Arc::new(AtomicU16::new(u16::MAX));
        let seen_clone = seen.clone();
        scheduler.set_on_transition(Box::new(move |slot, _new_superframe| {
            seen_clone.store(slot, Ordering::SeqCst);
        }));
        scheduler.start(rtos.now()).unwrap();
        for _ in 0..10 {
            rtos.advance_time(60);
            std::thread::sleep(std::time::Duration::from_millis(5));
            if seen.load(Ordering::SeqCst) != u16::MAX {
                break;
            }
        }
        scheduler.stop().unwrap();
        assert_ne!(seen.load(Ordering::SeqCst), u16::MAX);
    }
}
