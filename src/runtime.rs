use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// Unified event type consumed by the play loop
#[derive(Clone, Debug)]
pub enum InputEvent {
    Key(KeyEvent),
    Resize,
    Tick,
}

/// What a key press asks the game to do
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerAction {
    AudioMatch,
    VisualMatch,
    Replay,
    Quit,
}

impl PlayerAction {
    /// Map a key press to an action; releases and repeats map to nothing.
    pub fn from_key(key: &KeyEvent) -> Option<Self> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(PlayerAction::Quit)
            }
            KeyCode::Char('a') | KeyCode::Char('A') => Some(PlayerAction::AudioMatch),
            KeyCode::Char('l') | KeyCode::Char('L') => Some(PlayerAction::VisualMatch),
            KeyCode::Char('r') | KeyCode::Char('R') => Some(PlayerAction::Replay),
            KeyCode::Char('q') | KeyCode::Esc => Some(PlayerAction::Quit),
            _ => None,
        }
    }
}

/// Source of terminal events (keyboard, resize, etc.)
pub trait InputSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<InputEvent, RecvTimeoutError>;
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    rx: Receiver<InputEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || loop {
            let forwarded = match event::read() {
                Ok(CtEvent::Key(key)) => tx.send(InputEvent::Key(key)),
                Ok(CtEvent::Resize(_, _)) => tx.send(InputEvent::Resize),
                Ok(_) => Ok(()),
                Err(e) => {
                    tracing::warn!("terminal input closed: {e}");
                    break;
                }
            };
            if forwarded.is_err() {
                break;
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InputSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<InputEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed redraw interval
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Channel-fed event source for tests
pub struct TestEventSource {
    rx: Receiver<InputEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<InputEvent>) -> Self {
        Self { rx }
    }
}

impl InputSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<InputEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Advances the play loop one event or tick at a time
pub struct Runner<E: InputSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: InputSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Blocks up to the tick interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> InputEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                InputEvent::Tick
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn step_returns_tick_on_timeout() {
        let (_tx, rx) = mpsc::channel();
        let runner = Runner::new(
            TestEventSource::new(rx),
            FixedTicker::new(Duration::from_millis(1)),
        );
        assert!(matches!(runner.step(), InputEvent::Tick));
    }

    #[test]
    fn step_passes_through_events() {
        let (tx, rx) = mpsc::channel();
        tx.send(InputEvent::Key(press(KeyCode::Char('l')))).unwrap();
        let runner = Runner::new(
            TestEventSource::new(rx),
            FixedTicker::new(Duration::from_millis(10)),
        );
        match runner.step() {
            InputEvent::Key(key) => {
                assert_eq!(PlayerAction::from_key(&key), Some(PlayerAction::VisualMatch))
            }
            other => panic!("expected key event, got {other:?}"),
        }
    }

    #[test]
    fn key_bindings() {
        assert_eq!(
            PlayerAction::from_key(&press(KeyCode::Char('a'))),
            Some(PlayerAction::AudioMatch)
        );
        assert_eq!(
            PlayerAction::from_key(&press(KeyCode::Char('r'))),
            Some(PlayerAction::Replay)
        );
        assert_eq!(
            PlayerAction::from_key(&press(KeyCode::Esc)),
            Some(PlayerAction::Quit)
        );
        assert_eq!(
            PlayerAction::from_key(&KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(PlayerAction::Quit)
        );
        assert_eq!(PlayerAction::from_key(&press(KeyCode::Char('x'))), None);
    }

    #[test]
    fn key_release_is_ignored() {
        let release = KeyEvent {
            code: KeyCode::Char('l'),
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Release,
            state: KeyEventState::NONE,
        };
        assert_eq!(PlayerAction::from_key(&release), None);
    }
}
