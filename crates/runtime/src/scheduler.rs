//! Timer queue and stimulus inbox
//!
//! All deferred work (wait bodies, pulse ends, socket events, spawned
//! threads, scripted stimulus) is a [`TimerTask`] in one min-heap ordered by
//! due time and then by creation order. Stimulus from other threads arrives
//! through an mpsc inbox. Nothing here runs tasks: the interpreter pops them
//! at its suspension points or when the host advances time.
//!
//! ## Clocks
//!
//! - **Real**: `now()` is wall time since creation; waiting blocks on the
//!   inbox with a timeout so stimulus wakes it early.
//! - **Virtual**: `now()` only moves when a timer fires or a wait reaches
//!   its deadline. Runs are deterministic and instantaneous.

use crate::config::ClockMode;
use splusc::ast::Trigger;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

/// Longest single blocking wait on the real clock, so a stop flag raised
/// without an inbox message is still noticed promptly
const MAX_REAL_SLEEP: Duration = Duration::from_millis(50);

/// External input delivered to a running interpreter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stimulus {
    Digital { name: String, value: i64 },
    Analog { name: String, value: i64 },
    Serial { name: String, value: String },
    Stop,
}

pub type TimerId = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum TimerTask {
    /// Labelled or anonymous `Wait` body, looked up in the wait registry
    WaitBody { label: String },
    /// `CreateThread` call with no arguments
    Spawn { function: String },
    /// Drive a pulsed digital output back low
    PulseEnd { output: String },
    Stimulus(Stimulus),
    SocketConnected { id: i64 },
    SocketDeliver { id: i64, data: String },
    SocketEvent { trigger: Trigger, id: i64 },
}

enum Clock {
    Real { origin: Instant },
    Virtual { now: Duration },
}

pub struct Scheduler {
    clock: Clock,
    heap: BinaryHeap<Reverse<(Duration, TimerId)>>,
    /// Live tasks; heap entries whose id is missing or whose due time no
    /// longer matches are stale and skipped
    tasks: HashMap<TimerId, (Duration, TimerTask)>,
    next_id: TimerId,
    inbox: Receiver<Stimulus>,
    sender: Sender<Stimulus>,
}

impl Scheduler {
    pub fn new(mode: ClockMode) -> Self {
        let (sender, inbox) = mpsc::channel();
        let clock = match mode {
            ClockMode::Real => Clock::Real {
                origin: Instant::now(),
            },
            ClockMode::Virtual => Clock::Virtual {
                now: Duration::ZERO,
            },
        };
        Scheduler {
            clock,
            heap: BinaryHeap::new(),
            tasks: HashMap::new(),
            next_id: 1,
            inbox,
            sender,
        }
    }

    pub fn now(&self) -> Duration {
        match &self.clock {
            Clock::Real { origin } => origin.elapsed(),
            Clock::Virtual { now } => *now,
        }
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self.clock, Clock::Virtual { .. })
    }

    pub fn sender(&self) -> Sender<Stimulus> {
        self.sender.clone()
    }

    pub fn schedule(&mut self, delay: Duration, task: TimerTask) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        let due = self.now() + delay;
        self.tasks.insert(id, (due, task));
        self.heap.push(Reverse((due, id)));
        id
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.tasks.remove(&id).is_some()
    }

    /// Move a pending timer to `delay` from now; false if it already fired
    pub fn retime(&mut self, id: TimerId, delay: Duration) -> bool {
        let due = self.now() + delay;
        match self.tasks.get_mut(&id) {
            Some(entry) => {
                entry.0 = due;
                self.heap.push(Reverse((due, id)));
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.tasks.contains_key(&id)
    }

    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Due time of the earliest live timer
    pub fn next_due(&mut self) -> Option<Duration> {
        self.discard_stale();
        self.heap.peek().map(|Reverse((due, _))| *due)
    }

    /// Pop the earliest timer if it is due by `deadline` and by the clock
    pub fn pop_due(&mut self, deadline: Duration) -> Option<(TimerId, TimerTask)> {
        let due = self.next_due()?;
        if due > deadline {
            return None;
        }
        match &mut self.clock {
            Clock::Virtual { now } => {
                if due > *now {
                    *now = due;
                }
            }
            Clock::Real { origin } => {
                if due > origin.elapsed() {
                    return None;
                }
            }
        }
        let Reverse((_, id)) = self.heap.pop()?;
        self.tasks.remove(&id).map(|(_, task)| (id, task))
    }

    pub fn try_recv(&self) -> Option<Stimulus> {
        self.inbox.try_recv().ok()
    }

    /// Let time pass until `until`, returning early with any stimulus
    pub fn wait_until(&mut self, until: Duration) -> Option<Stimulus> {
        match &mut self.clock {
            Clock::Virtual { now } => {
                if let Ok(stimulus) = self.inbox.try_recv() {
                    return Some(stimulus);
                }
                if until > *now {
                    *now = until;
                }
                None
            }
            Clock::Real { origin } => {
                let remaining = until.saturating_sub(origin.elapsed());
                match self.inbox.recv_timeout(remaining.min(MAX_REAL_SLEEP)) {
                    Ok(stimulus) => Some(stimulus),
                    Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
                }
            }
        }
    }

    /// Drop every timer; the clock keeps running
    pub fn clear(&mut self) {
        self.heap.clear();
        self.tasks.clear();
        while self.inbox.try_recv().is_ok() {}
    }

    fn discard_stale(&mut self) {
        while let Some(Reverse((due, id))) = self.heap.peek() {
            match self.tasks.get(id) {
                Some((live_due, _)) if live_due == due => break,
                _ => {
                    self.heap.pop();
                }
            }
        }
    }
}

/// Thread-safe remote control for an interpreter
///
/// Stimulus is queued and applied at the interpreter's next suspension
/// point (or the next `advance`/`settle` call). `stop` also raises the
/// abort flag that a running Main checks at every step.
#[derive(Debug, Clone)]
pub struct InterpreterHandle {
    sender: Sender<Stimulus>,
    abort: Arc<AtomicBool>,
}

impl InterpreterHandle {
    pub(crate) fn new(sender: Sender<Stimulus>, abort: Arc<AtomicBool>) -> Self {
        InterpreterHandle { sender, abort }
    }

    /// Queue a stimulus; false when the interpreter is gone
    pub fn send(&self, stimulus: Stimulus) -> bool {
        self.sender.send(stimulus).is_ok()
    }

    pub fn set_digital_input(&self, name: &str, value: i64) -> bool {
        self.send(Stimulus::Digital {
            name: name.to_string(),
            value,
        })
    }

    pub fn set_analog_input(&self, name: &str, value: i64) -> bool {
        self.send(Stimulus::Analog {
            name: name.to_string(),
            value,
        })
    }

    pub fn set_string_input(&self, name: &str, value: &str) -> bool {
        self.send(Stimulus::Serial {
            name: name.to_string(),
            value: value.to_string(),
        })
    }

    pub fn stop(&self) {
        self.abort.store(true, Ordering::SeqCst);
        let _ = self.sender.send(Stimulus::Stop);
    }

    /// Raw abort flag, for signal handlers
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pulse(name: &str) -> TimerTask {
        TimerTask::PulseEnd {
            output: name.to_string(),
        }
    }

    #[test]
    fn test_timers_fire_in_due_then_creation_order() {
        let mut sched = Scheduler::new(ClockMode::Virtual);
        sched.schedule(Duration::from_millis(30), pulse("c"));
        sched.schedule(Duration::from_millis(10), pulse("a"));
        sched.schedule(Duration::from_millis(10), pulse("b"));

        let far = Duration::from_secs(1);
        let order: Vec<TimerTask> = std::iter::from_fn(|| sched.pop_due(far).map(|(_, t)| t)).collect();
        assert_eq!(order, vec![pulse("a"), pulse("b"), pulse("c")]);
        assert_eq!(sched.now(), Duration::from_millis(30));
    }

    #[test]
    fn test_pop_due_respects_deadline() {
        let mut sched = Scheduler::new(ClockMode::Virtual);
        sched.schedule(Duration::from_millis(100), pulse("x"));
        assert!(sched.pop_due(Duration::from_millis(50)).is_none());
        assert_eq!(sched.wait_until(Duration::from_millis(50)), None);
        assert_eq!(sched.now(), Duration::from_millis(50));
        assert!(sched.pop_due(Duration::from_millis(100)).is_some());
    }

    #[test]
    fn test_cancel_and_retime() {
        let mut sched = Scheduler::new(ClockMode::Virtual);
        let a = sched.schedule(Duration::from_millis(10), pulse("a"));
        let b = sched.schedule(Duration::from_millis(20), pulse("b"));
        assert!(sched.cancel(a));
        assert!(!sched.cancel(a));
        assert!(sched.retime(b, Duration::from_millis(500)));
        assert_eq!(sched.next_due(), Some(Duration::from_millis(500)));
        assert_eq!(sched.pending(), 1);

        let (id, _) = sched.pop_due(Duration::from_secs(1)).unwrap();
        assert_eq!(id, b);
        assert!(!sched.retime(b, Duration::from_millis(1)));
        assert_eq!(sched.next_due(), None);
    }

    #[test]
    fn test_handle_delivers_to_inbox() {
        let sched = Scheduler::new(ClockMode::Virtual);
        let abort = Arc::new(AtomicBool::new(false));
        let handle = InterpreterHandle::new(sched.sender(), Arc::clone(&abort));

        let remote = handle.clone();
        std::thread::spawn(move || {
            remote.set_digital_input("go", 1);
        })
        .join()
        .unwrap();

        assert_eq!(
            sched.try_recv(),
            Some(Stimulus::Digital {
                name: "go".to_string(),
                value: 1
            })
        );
        handle.stop();
        assert!(abort.load(Ordering::SeqCst));
        assert_eq!(sched.try_recv(), Some(Stimulus::Stop));
    }

    #[test]
    fn test_real_clock_wakes_on_stimulus() {
        let mut sched = Scheduler::new(ClockMode::Real);
        let sender = sched.sender();
        sender.send(Stimulus::Stop).unwrap();
        let start = Instant::now();
        assert_eq!(sched.wait_until(Duration::from_secs(10)), Some(Stimulus::Stop));
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
