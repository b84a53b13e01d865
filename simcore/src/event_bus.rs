//! Topic-based publish/subscribe with time-ordered delivery.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::rc::Rc;

use crate::clock::Time;
use crate::payload::Payload;

type Handler = Rc<RefCell<dyn FnMut(Box<dyn Payload>, Time)>>;

struct QueuedEvent {
    seq: u64,
    fire_at: Time,
    topic: String,
    payload: Box<dyn Payload>,
}

impl Eq for QueuedEvent {}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Ord for QueuedEvent {
    // BinaryHeap is a max-heap; reverse the comparison on (fire_at, seq) so the earliest,
    // then earliest-published, event sorts to the top. Adapted from `core::sim::EventEntry`.
    fn cmp(&self, other: &Self) -> Ordering {
        other.fire_at.cmp(&self.fire_at).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The queue and subscriber registry, behind their own `RefCell`. Every public `EventBus` method
/// takes `&self` and borrows this for only as long as it takes to read or mutate the queue/
/// registry — never across a handler invocation — so a handler that publishes or subscribes from
/// inside `run_until`'s dispatch loop never re-enters a borrow that loop is still holding.
#[derive(Default)]
struct Inner {
    subscribers: HashMap<String, Vec<Handler>>,
    queue: BinaryHeap<QueuedEvent>,
    next_seq: u64,
}

/// A topic-indexed ordered queue of `(topic, fire_at, payload)` triples.
///
/// Multiple handlers may subscribe to the same topic; they are invoked in subscription order.
/// Publishing to a topic with no subscribers is a no-op — the event is never enqueued, so it
/// can never later block `empty()`.
#[derive(Default)]
pub struct EventBus {
    inner: RefCell<Inner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self { inner: RefCell::new(Inner::default()) }
    }

    /// Registers `handler` for `topic`. `P` is the concrete payload type this topic carries;
    /// a published payload whose concrete type does not match `P` is silently skipped for this
    /// subscriber (which never happens in practice, since each topic is only ever published
    /// with one payload type).
    pub fn subscribe<P, F>(&self, topic: &str, mut handler: F)
    where
        P: Payload,
        F: FnMut(P, Time) + 'static,
    {
        let wrapped: Handler = Rc::new(RefCell::new(move |payload: Box<dyn Payload>, fire_at: Time| {
            if let Ok(typed) = payload.downcast::<P>() {
                handler(*typed, fire_at);
            }
        }));
        self.inner.borrow_mut().subscribers.entry(topic.to_string()).or_default().push(wrapped);
    }

    /// Enqueues `payload` for delivery at `fire_at`. `fire_at` is expected to be `>= now`,
    /// the caller (the component publishing the event) is responsible for that. Safe to call
    /// from inside a handler `run_until` is currently dispatching, since this only ever takes a
    /// fresh, short-lived borrow of `inner` rather than one held across the dispatch loop.
    pub fn publish<P: Payload>(&self, topic: &str, fire_at: Time, payload: P) {
        let mut inner = self.inner.borrow_mut();
        if !inner.subscribers.contains_key(topic) {
            return;
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.queue.push(QueuedEvent {
            seq,
            fire_at,
            topic: topic.to_string(),
            payload: Box::new(payload),
        });
    }

    /// Delivers every queued event whose `fire_at <= now`, in non-decreasing `fire_at` order
    /// (ties broken by publish order). Handlers may publish new events during delivery; any
    /// such event with `fire_at <= now` is also delivered within this call.
    ///
    /// Each pass borrows `inner` only long enough to pop the next due event and snapshot its
    /// handler list, then drops that borrow before invoking anything — a handler is free to
    /// `publish`/`subscribe` on this same bus without tripping a nested-borrow panic.
    pub fn run_until(&self, now: Time) {
        loop {
            let next = {
                let mut inner = self.inner.borrow_mut();
                match inner.queue.peek() {
                    Some(top) if top.fire_at <= now => {
                        let event = inner.queue.pop().unwrap();
                        let handlers = inner.subscribers.get(&event.topic).cloned().unwrap_or_default();
                        Some((event, handlers))
                    }
                    _ => None,
                }
            };
            let Some((event, handlers)) = next else { break };

            for handler in handlers {
                let payload = dyn_clone::clone_box(&*event.payload);
                (handler.borrow_mut())(payload, event.fire_at);
            }
        }
    }

    pub fn empty(&self) -> bool {
        self.inner.borrow().queue.is_empty()
    }
}

impl fmt::Debug for EventBus {
    /// Subscriber closures aren't `Debug`; report shape only (topic count, queue depth) rather
    /// than trying to peer into the handlers themselves.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("EventBus")
            .field("topics", &inner.subscribers.len())
            .field("queued", &inner.queue.len())
            .finish()
    }
}
