use {
    super::{Event, EventQueue},
    crossterm::event::{self, KeyCode, KeyEventKind},
    std::{
        io,
        sync::atomic::{AtomicBool, Ordering},
        time::Duration,
    },
    tracing::{debug, warn},
};

/// a source of key presses.
pub trait KeySource: Send {
    /// waits up to `timeout` for a key press. `Ok(None)` means the wait timed out.
    fn next_key(&mut self, timeout: Duration) -> io::Result<Option<KeyCode>>;
}

/// key presses read from the controlling terminal.
#[derive(Clone, Copy, Debug, Default)]
pub struct TerminalKeys;

impl KeySource for TerminalKeys {
    fn next_key(&mut self, timeout: Duration) -> io::Result<Option<KeyCode>> {
        if !event::poll(timeout)? {
            return Ok(None);
        }

        // resizes arrive through the signal handler; mouse and paste events are ignored.
        match event::read()? {
            event::Event::Key(key) if key.kind == KeyEventKind::Press => Ok(Some(key.code)),
            _ => Ok(None),
        }
    }
}

/// forwards key presses to `queue` until the quit key is pressed or `running` is cleared.
///
/// the flag is checked at least once per `interval`.
pub(super) fn listen(
    mut keys: impl KeySource,
    queue: &EventQueue<Event>,
    running: &AtomicBool,
    interval: Duration,
    quit_key: KeyCode,
) {
    while running.load(Ordering::Acquire) {
        match keys.next_key(interval) {
            Ok(Some(code)) if code == quit_key => {
                debug!("quit key pressed");
                running.store(false, Ordering::Release);
                queue.push(Event::Quit);
                return;
            }
            Ok(Some(code)) => queue.push(Event::KeyPress(code)),
            Ok(None) => {}
            Err(error) => {
                warn!(%error, "failed to read from the terminal, quitting");
                running.store(false, Ordering::Release);
                queue.push(Event::Quit);
                return;
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use {super::mock::ScriptedKeys, super::*};

    const INTERVAL: Duration = Duration::from_millis(10);
    const QUIT: KeyCode = KeyCode::Char('q');

    #[test]
    fn forwards_keys_until_quit() {
        let queue = EventQueue::new();
        let running = AtomicBool::new(true);
        let keys = ScriptedKeys::new([KeyCode::Down, KeyCode::Up, QUIT, KeyCode::Down]);

        listen(keys, &queue, &running, INTERVAL, QUIT);

        assert_eq!(
            queue.drain(),
            vec![
                Event::KeyPress(KeyCode::Down),
                Event::KeyPress(KeyCode::Up),
                Event::Quit,
            ]
        );
        assert!(!running.load(Ordering::Acquire));
    }

    #[test]
    fn read_errors_quit() {
        let queue = EventQueue::new();
        let running = AtomicBool::new(true);
        let keys = ScriptedKeys::new([KeyCode::Enter]).then_fail();

        listen(keys, &queue, &running, INTERVAL, QUIT);

        assert_eq!(
            queue.drain(),
            vec![Event::KeyPress(KeyCode::Enter), Event::Quit]
        );
    }

    #[test]
    fn stops_when_the_flag_is_cleared() {
        let queue = EventQueue::new();
        let running = AtomicBool::new(false);

        listen(ScriptedKeys::default(), &queue, &running, INTERVAL, QUIT);
        assert!(queue.is_empty());
    }
}
