use {
    super::{Event, EventQueue},
    std::{
        sync::atomic::{AtomicBool, Ordering},
        thread,
        time::Duration,
    },
};

/// pushes a [`Event::Redraw`] every `interval` until `running` is cleared.
pub(super) fn tick(queue: &EventQueue<Event>, running: &AtomicBool, interval: Duration) {
    while running.load(Ordering::Acquire) {
        thread::sleep(interval);
        if !running.load(Ordering::Acquire) {
            break;
        }
        queue.push(Event::Redraw);
    }
}
