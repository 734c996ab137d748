/*!
confirm.rs

Single-keypress confirmation before `--run` executes a generated command.

Enter, space, `y`/`Y` confirm. Escape, `n`/`N`, Ctrl-C and any other key
cancel. When raw mode is unavailable (stdin not a terminal) a line is read
instead: a blank line, `y` or `yes` confirm, anything else and EOF cancel.
*/

use std::io::{self, BufRead, IsTerminal, Write};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;

pub const PROMPT: &str = "[Enter/Space] run, [Esc/n] cancel: ";

/// Decision for one key event.
pub fn key_confirms(key: &KeyEvent) -> bool {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return false;
    }
    matches!(
        key.code,
        KeyCode::Enter | KeyCode::Char(' ') | KeyCode::Char('y') | KeyCode::Char('Y')
    )
}

/// Decision for the line-buffered fallback. `None` is EOF.
pub fn line_confirms(line: Option<&str>) -> bool {
    line.is_some_and(|l| matches!(l.trim().to_ascii_lowercase().as_str(), "" | "y" | "yes"))
}

fn read_key() -> io::Result<KeyEvent> {
    terminal::enable_raw_mode()?;
    let key = loop {
        match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => break Ok(key),
            Ok(_) => continue,
            Err(e) => break Err(e),
        }
    };
    let restored = terminal::disable_raw_mode();
    let key = key?;
    restored?;
    Ok(key)
}

fn read_line() -> Option<String> {
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line),
    }
}

/// Print `prompt` and wait for the user's answer.
pub fn ask(prompt: &str) -> bool {
    print!("{prompt}");
    let _ = io::stdout().flush();

    if io::stdin().is_terminal() {
        match read_key() {
            Ok(key) => {
                println!();
                return key_confirms(&key);
            }
            Err(e) => tracing::debug!(error = %e, "raw mode unavailable; reading a line"),
        }
    }
    let line = read_line();
    line_confirms(line.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn confirming_keys() {
        for code in [
            KeyCode::Enter,
            KeyCode::Char(' '),
            KeyCode::Char('y'),
            KeyCode::Char('Y'),
        ] {
            assert!(key_confirms(&key(code)), "{code:?}");
        }
    }

    #[test]
    fn cancelling_keys() {
        for code in [
            KeyCode::Esc,
            KeyCode::Char('n'),
            KeyCode::Char('N'),
            KeyCode::Char('x'),
            KeyCode::Tab,
        ] {
            assert!(!key_confirms(&key(code)), "{code:?}");
        }
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert!(!key_confirms(&ctrl_c));
    }

    #[test]
    fn line_fallback() {
        assert!(line_confirms(Some("\n")));
        assert!(line_confirms(Some(" \n")));
        assert!(line_confirms(Some("Y\n")));
        assert!(line_confirms(Some("yes\n")));
        assert!(!line_confirms(Some("n\n")));
        assert!(!line_confirms(Some(" No \n")));
        assert!(!line_confirms(None));
    }

    #[test]
    fn unexpected_lines_cancel() {
        for line in ["\x1b\n", "x\n", "q\n", "cancel\n", "yess\n", "sure\n"] {
            assert!(!line_confirms(Some(line)), "{line:?}");
        }
    }
}
