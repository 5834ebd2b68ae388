//! Masked passphrase entry.
//!
//! Reads a passphrase one key at a time over raw terminal mode, echoing a
//! placeholder `*` per character (never the character itself). Backspace is
//! destructive, Enter submits the accumulated string (possibly empty), and
//! Ctrl-C surfaces as [`BootstrapError::Cancelled`]. All other control keys
//! are ignored.
//!
//! Raw mode is restored on every exit path, including cancellation and IO
//! errors, via an RAII guard.

use std::io::{self, Write};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

use crate::error::{BootstrapError, Result};

/// Restores the terminal's original input mode when dropped.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// What the terminal loop should do with one key event.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum KeyAction {
    /// A character was accepted; echo one placeholder.
    Masked,
    /// A character was removed; erase one placeholder.
    Erased,
    /// Nothing to do (control keys, key releases, backspace on empty input).
    Ignored,
    /// Enter: return the accumulated passphrase.
    Submit,
    /// Ctrl-C: cancel the whole run.
    Interrupt,
}

/// Fold one key event into the passphrase buffer.
pub(crate) fn apply_key(buf: &mut String, key: &KeyEvent) -> KeyAction {
    if key.kind != KeyEventKind::Press {
        return KeyAction::Ignored;
    }
    match key.code {
        KeyCode::Enter => KeyAction::Submit,
        KeyCode::Char('c' | 'C') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            KeyAction::Interrupt
        }
        KeyCode::Backspace => {
            if buf.pop().is_some() {
                KeyAction::Erased
            } else {
                KeyAction::Ignored
            }
        }
        KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) && !ch.is_control() => {
            buf.push(ch);
            KeyAction::Masked
        }
        _ => KeyAction::Ignored,
    }
}

/// Read a passphrase from the terminal, masked.
pub fn read_passphrase(prompt: &str) -> Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{prompt}")?;
    stdout.flush()?;

    let _guard = RawModeGuard::enable()?;
    let mut passphrase = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        match apply_key(&mut passphrase, &key) {
            KeyAction::Masked => {
                write!(stdout, "*")?;
                stdout.flush()?;
            }
            KeyAction::Erased => {
                write!(stdout, "\x08 \x08")?;
                stdout.flush()?;
            }
            KeyAction::Submit => {
                write!(stdout, "\r\n")?;
                stdout.flush()?;
                return Ok(passphrase);
            }
            KeyAction::Interrupt => {
                write!(stdout, "^C\r\n")?;
                stdout.flush()?;
                return Err(BootstrapError::Cancelled);
            }
            KeyAction::Ignored => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(ch: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL)
    }

    #[test]
    fn test_chars_accumulate_masked() {
        let mut buf = String::new();
        assert_eq!(apply_key(&mut buf, &press(KeyCode::Char('h'))), KeyAction::Masked);
        assert_eq!(apply_key(&mut buf, &press(KeyCode::Char('i'))), KeyAction::Masked);
        assert_eq!(buf, "hi");
    }

    #[test]
    fn test_backspace_is_destructive() {
        let mut buf = String::from("hi");
        assert_eq!(apply_key(&mut buf, &press(KeyCode::Backspace)), KeyAction::Erased);
        assert_eq!(buf, "h");
        assert_eq!(apply_key(&mut buf, &press(KeyCode::Backspace)), KeyAction::Erased);
        assert_eq!(apply_key(&mut buf, &press(KeyCode::Backspace)), KeyAction::Ignored);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_enter_submits_even_empty() {
        let mut buf = String::new();
        assert_eq!(apply_key(&mut buf, &press(KeyCode::Enter)), KeyAction::Submit);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_ctrl_c_interrupts() {
        let mut buf = String::from("partial");
        assert_eq!(apply_key(&mut buf, &ctrl('c')), KeyAction::Interrupt);
        assert_eq!(apply_key(&mut buf, &ctrl('C')), KeyAction::Interrupt);
    }

    #[test]
    fn test_control_keys_ignored() {
        let mut buf = String::new();
        for code in [
            KeyCode::Esc,
            KeyCode::Tab,
            KeyCode::F(1),
            KeyCode::Left,
            KeyCode::Home,
        ] {
            assert_eq!(apply_key(&mut buf, &press(code)), KeyAction::Ignored);
        }
        // Other Ctrl chords are not interrupt and not input.
        assert_eq!(apply_key(&mut buf, &ctrl('d')), KeyAction::Ignored);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_key_release_ignored() {
        let mut buf = String::new();
        let mut release = press(KeyCode::Char('x'));
        release.kind = KeyEventKind::Release;
        assert_eq!(apply_key(&mut buf, &release), KeyAction::Ignored);
        assert!(buf.is_empty());
    }
}
