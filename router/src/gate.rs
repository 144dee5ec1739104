//! The serialization gate: admits at most one logical worker into the
//! master-response pipeline at a time, queueing the rest in arrival
//! order. Layered on top of however many threads actually deliver bytes.

use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct GateState {
    active_logs: bool,
    queue: VecDeque<Vec<u8>>,
}

#[derive(Debug, Default)]
pub struct Gate {
    state: Mutex<GateState>,
}

impl Gate {
    pub fn new() -> Self {
        Gate { state: Mutex::new(GateState::default()) }
    }

    #[cfg(test)]
    fn queue_len(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    #[cfg(test)]
    fn is_active(&self) -> bool {
        self.state.lock().unwrap().active_logs
    }

    /// Admit `buffer` into the pipeline, running `process` once per
    /// admitted buffer (possibly more than once, if arrivals queued up
    /// while a previous buffer was being processed). Returns immediately
    /// if another caller already holds the gate.
    pub fn on_arrival<F: FnMut(Vec<u8>)>(&self, buffer: Vec<u8>, mut process: F) {
        {
            let mut s = self.state.lock().unwrap();
            if s.active_logs {
                s.queue.push_back(buffer);
                return;
            }
            s.active_logs = true;
        }

        let mut current = buffer;
        loop {
            process(current);

            let mut s = self.state.lock().unwrap();
            match s.queue.pop_front() {
                Some(next) => {
                    drop(s);
                    current = next;
                }
                None => {
                    s.active_logs = false;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn single_arrival_processes_immediately() {
        let gate = Gate::new();
        let mut seen = Vec::new();
        gate.on_arrival(vec![1], |b| seen.push(b));
        assert_eq!(seen, vec![vec![1]]);
        assert!(!gate.is_active());
        assert_eq!(gate.queue_len(), 0);
    }

    #[test]
    fn concurrent_arrivals_are_processed_in_fifo_order() {
        let gate = Arc::new(Gate::new());
        let order: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));

        let g2 = Arc::clone(&gate);
        let o2 = Arc::clone(&order);
        let t = thread::spawn(move || {
            g2.on_arrival(vec![1], |buf| {
                // Hold the "gate" busy briefly so the second arrival queues.
                thread::sleep(std::time::Duration::from_millis(20));
                o2.lock().unwrap().push(buf[0]);
            });
        });

        thread::sleep(std::time::Duration::from_millis(5));
        gate.on_arrival(vec![2], |buf| {
            order.lock().unwrap().push(buf[0]);
        });

        t.join().unwrap();
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }
}
