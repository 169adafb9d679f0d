use std::collections::VecDeque;
use std::io::{self, IsTerminal, Read as _};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::Duration;

use colored::Colorize;
use crossterm::{
    event::{self, Event, KeyEvent},
    terminal,
};

/// Returned in place of a character once input has reached end of stream.
pub const EOT: u8 = 0x04;

/// Instructions executed between checks for pending keyboard events.
const TICKS_PER_POLL: u32 = 0x1000;

/// Exit status used when the user interrupts a running program.
const INTERRUPT_STATUS: i32 = 130;

/// Character device consulted by traps and keyboard registers.
pub trait Console {
    /// Whether a character can be read without blocking.
    fn poll_ready(&mut self) -> bool;
    /// Block until one character is available.
    fn read_char(&mut self) -> u8;
    fn write_char(&mut self, ch: u8);
    fn flush(&mut self) {}
    /// Message from the machine itself, as opposed to program output.
    fn notice(&mut self, _msg: &str) {}
    /// Called once before every instruction.
    fn tick(&mut self) {}
}

/// Whether this process currently holds the terminal in raw mode.
static RAW_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Clear `active` and call `disable` if it was set. Returns whether `disable` ran.
fn release(active: &AtomicBool, disable: impl FnOnce() -> io::Result<()>) -> bool {
    if !active.swap(false, AtomicOrdering::SeqCst) {
        return false;
    }
    if let Err(err) = disable() {
        log::error!("failed to disable raw terminal: {err}");
    }
    true
}

/// Return the terminal to cooked mode if this process left it raw.
///
/// Safe to call from any thread, any number of times.
pub fn restore_terminal() {
    release(&RAW_ACTIVE, terminal::disable_raw_mode);
}

/// Restore the terminal and exit with status 130 on `SIGINT`, `SIGTERM` or `SIGHUP`.
///
/// Raw mode swallows `Ctrl+C` as a key event, so this covers signals sent from outside.
pub fn install_interrupt_handler() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(|| {
        restore_terminal();
        eprintln!();
        std::process::exit(INTERRUPT_STATUS);
    })
}

/// Raw mode for the controlling terminal, restored when dropped.
#[derive(Debug)]
pub struct RawMode(());

impl RawMode {
    /// Fails if the terminal is already in raw mode.
    pub fn acquire() -> io::Result<Self> {
        if terminal::is_raw_mode_enabled()? {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "terminal is already in raw mode",
            ));
        }
        terminal::enable_raw_mode()?;
        RAW_ACTIVE.store(true, AtomicOrdering::SeqCst);
        Ok(Self(()))
    }

    pub fn is_active(&self) -> bool {
        RAW_ACTIVE.load(AtomicOrdering::SeqCst)
    }

    /// Return terminal to cooked mode. Does nothing if already restored.
    pub fn restore(&mut self) {
        restore_terminal();
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        restore_terminal();
    }
}

/// Program output with line tracking, so machine notices always start on a fresh line.
#[derive(Debug)]
struct Printer<W> {
    out: W,
    minimal: bool,
    is_line_start: bool,
}

impl<W: io::Write> Printer<W> {
    fn new(out: W, minimal: bool) -> Self {
        Self {
            out,
            minimal,
            is_line_start: true,
        }
    }

    fn write_char(&mut self, ch: u8, raw: bool) {
        // Raw mode disables output processing, so line feeds must carry their own return.
        // Output errors (eg. closed pipe) are ignored.
        let _ = if ch == b'\n' && raw {
            self.out.write_all(b"\r\n")
        } else {
            self.out.write_all(&[ch])
        };
        self.is_line_start = ch == b'\n';
    }

    fn flush(&mut self) {
        let _ = self.out.flush();
    }

    fn notice(&mut self, msg: &str, raw: bool) {
        if !self.is_line_start {
            self.write_char(b'\n', raw);
        }
        let line = if self.minimal {
            msg.to_string()
        } else {
            format!("{:>12}", msg.cyan())
        };
        for &ch in line.as_bytes() {
            self.write_char(ch, raw);
        }
        self.write_char(b'\n', raw);
        self.flush();
    }
}

/// Process stdin and stdout.
///
/// An interactive stdin is put into raw mode for as long as the `Terminal` lives. Piped stdin
/// is read byte by byte and is always considered ready.
#[derive(Debug)]
pub struct Terminal {
    input: Input,
    output: Printer<io::Stdout>,
}

#[derive(Debug)]
enum Input {
    Keyboard(Keyboard),
    Piped(io::Stdin),
}

#[derive(Debug)]
struct Keyboard {
    raw: RawMode,
    pending: VecDeque<u8>,
    ticks: u32,
}

/// Similar to [`crossterm::event::KeyCode`] but only contains relevant information.
#[derive(Debug)]
enum Key {
    Interrupt,
    Byte(u8),
    Char(char),
}

impl Terminal {
    pub fn new(minimal: bool) -> io::Result<Self> {
        let stdin = io::stdin();
        let input = if stdin.is_terminal() {
            Input::Keyboard(Keyboard {
                raw: RawMode::acquire()?,
                pending: VecDeque::new(),
                ticks: 0,
            })
        } else {
            Input::Piped(stdin)
        };
        Ok(Self {
            input,
            output: Printer::new(io::stdout(), minimal),
        })
    }

    fn is_raw(&self) -> bool {
        matches!(&self.input, Input::Keyboard(keyboard) if keyboard.raw.is_active())
    }
}

impl Console for Terminal {
    fn poll_ready(&mut self) -> bool {
        match &mut self.input {
            Input::Keyboard(keyboard) => {
                keyboard.pump();
                !keyboard.pending.is_empty()
            }
            Input::Piped(_) => true,
        }
    }

    fn read_char(&mut self) -> u8 {
        self.output.flush();
        match &mut self.input {
            Input::Keyboard(keyboard) => keyboard.read_byte(),
            Input::Piped(stdin) => {
                let mut buf = [0; 1];
                match stdin.read(&mut buf) {
                    Ok(1) => buf[0],
                    _ => EOT,
                }
            }
        }
    }

    fn write_char(&mut self, ch: u8) {
        let raw = self.is_raw();
        self.output.write_char(ch, raw);
    }

    fn flush(&mut self) {
        self.output.flush();
    }

    fn notice(&mut self, msg: &str) {
        let raw = self.is_raw();
        self.output.notice(msg, raw);
    }

    fn tick(&mut self) {
        if let Input::Keyboard(keyboard) = &mut self.input {
            keyboard.ticks += 1;
            if keyboard.ticks >= TICKS_PER_POLL {
                keyboard.ticks = 0;
                keyboard.pump();
            }
        }
    }
}

impl Keyboard {
    /// Move every key event which is already available into `pending`.
    fn pump(&mut self) {
        while event::poll(Duration::ZERO).is_ok_and(|ready| ready) {
            match event::read() {
                Ok(event) => self.accept(event),
                Err(_) => break,
            }
        }
    }

    /// Inputs are read as [`KeyEvent`]s, which read multi-byte characters as `char`. Any such
    /// characters are queued as their UTF-8 bytes.
    fn read_byte(&mut self) -> u8 {
        loop {
            if let Some(byte) = self.pending.pop_front() {
                return byte;
            }
            match event::read() {
                Ok(event) => self.accept(event),
                Err(_) => return EOT,
            }
        }
    }

    fn accept(&mut self, event: Event) {
        match Key::try_from(event) {
            Ok(Key::Interrupt) => self.interrupt(),
            Ok(Key::Byte(byte)) => self.pending.push_back(byte),
            Ok(Key::Char(ch)) => {
                let mut bytes = [0u8; 4];
                self.pending
                    .extend(ch.encode_utf8(&mut bytes).as_bytes().iter().copied());
            }
            Err(()) => (),
        }
    }

    /// `Ctrl+C` always returns the terminal to normal state and exits.
    fn interrupt(&mut self) -> ! {
        self.raw.restore();
        eprintln!();
        std::process::exit(INTERRUPT_STATUS);
    }
}

impl TryFrom<Event> for Key {
    type Error = ();
    fn try_from(event: Event) -> Result<Self, Self::Error> {
        if let Event::Key(event) = event {
            return event.try_into();
        }
        Err(())
    }
}

impl TryFrom<KeyEvent> for Key {
    type Error = ();
    fn try_from(event: KeyEvent) -> Result<Self, Self::Error> {
        use event::{KeyCode, KeyEventKind, KeyModifiers as Mod};

        if matches!(event.kind, KeyEventKind::Release) {
            return Err(());
        }

        let key = match (event.modifiers, event.code) {
            (Mod::CONTROL, KeyCode::Char('c')) => Key::Interrupt,

            // Ctrl+letter produces the matching control character
            (Mod::CONTROL, KeyCode::Char(ch)) if ch.is_ascii_alphabetic() => {
                Key::Byte(ch.to_ascii_lowercase() as u8 & 0x1f)
            }

            (_, KeyCode::Enter) => Key::Byte(b'\n'),
            (_, KeyCode::Tab) => Key::Byte(b'\t'),
            (_, KeyCode::Backspace) => Key::Byte(0x08),
            (_, KeyCode::Esc) => Key::Byte(0x1b),
            (_, KeyCode::Delete) => Key::Byte(0x7f),

            // Normal character
            (Mod::NONE | Mod::SHIFT, KeyCode::Char(ch)) => Key::Char(ch),

            _ => return Err(()),
        };

        Ok(key)
    }
}

/// In-memory console with scripted input and captured output.
#[derive(Debug, Default)]
pub struct BufferConsole {
    input: VecDeque<u8>,
    output: Vec<u8>,
    notices: Vec<String>,
}

impl BufferConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(input: impl AsRef<[u8]>) -> Self {
        let mut console = Self::new();
        console.push_input(input);
        console
    }

    pub fn push_input(&mut self, input: impl AsRef<[u8]>) {
        self.input.extend(input.as_ref().iter().copied());
    }

    /// Everything written by the program so far.
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    pub fn notices(&self) -> &[String] {
        &self.notices
    }
}

impl Console for BufferConsole {
    fn poll_ready(&mut self) -> bool {
        !self.input.is_empty()
    }

    fn read_char(&mut self) -> u8 {
        self.input.pop_front().unwrap_or(EOT)
    }

    fn write_char(&mut self, ch: u8) {
        self.output.push(ch);
    }

    fn notice(&mut self, msg: &str) {
        self.notices.push(msg.to_string());
    }
}
