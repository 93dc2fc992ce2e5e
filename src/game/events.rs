use crate::game::judgment::Judgment;

/// Handle returned by [`Notifier::subscribe`]; pass it back to unsubscribe.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener<E> = Box<dyn FnMut(&E)>;

/// Explicit observer list owned by the component that emits `E`.
///
/// There is no global bus: whoever subscribes keeps the returned id and is
/// responsible for unsubscribing when it goes away.
pub struct Notifier<E> {
    next_id: u64,
    listeners: Vec<(SubscriptionId, Listener<E>)>,
}

impl<E> Default for Notifier<E> {
    fn default() -> Self {
        Self {
            next_id: 0,
            listeners: Vec::new(),
        }
    }
}

impl<E> std::fmt::Debug for Notifier<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl<E> Notifier<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&E) + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns false when `id` was not (or no longer) subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    #[inline(always)]
    pub fn emit(&mut self, event: &E) {
        for (_, listener) in &mut self.listeners {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ClockEvent {
    Beat { index: u64 },
    HalfBeat { index: u64 },
}

#[derive(Clone, Debug, PartialEq)]
pub enum JudgeEvent {
    Judged(Judgment),
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum LifecycleEvent {
    Started { remaining: f64 },
    TimeChanged { remaining: f64, normalized: f64 },
    Beat { index: u64 },
    Succeeded,
    Failed,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// Occurrence times in seconds from session start, ascending.
    ScheduleReady(Vec<f64>),
    /// An occurrence came due too late to start (another event held the slot).
    EventSkipped { at: f64 },
}
