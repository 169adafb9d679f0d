use log::debug;

use crate::runtime::Machine;
use crate::term::Console;

/// Written before reading a character with the `IN` trap.
const IN_PROMPT: &str = "Enter a character: ";

/// Built-in service routines, selected by the low 8 bits of a `TRAP` instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrapVector {
    /// Read one character into `R0`, without echo.
    Getc = 0x20,
    /// Write the character in `R0`.
    Out = 0x21,
    /// Write the string starting at `R0`, one character per word.
    Puts = 0x22,
    /// Prompt for, read, and echo one character into `R0`.
    In = 0x23,
    /// Write the string starting at `R0`, two characters per word.
    Putsp = 0x24,
    /// Stop the machine.
    Halt = 0x25,
}

impl TryFrom<u8> for TrapVector {
    type Error = u8;
    fn try_from(vector: u8) -> Result<Self, Self::Error> {
        Ok(match vector {
            0x20 => Self::Getc,
            0x21 => Self::Out,
            0x22 => Self::Puts,
            0x23 => Self::In,
            0x24 => Self::Putsp,
            0x25 => Self::Halt,
            _ => return Err(vector),
        })
    }
}

impl<C: Console> Machine<C> {
    pub(crate) fn trap(&mut self, instr: u16) {
        let vector = match TrapVector::try_from((instr & 0xFF) as u8) {
            Ok(vector) => vector,
            Err(vector) => {
                debug!("unknown trap vector 0x{vector:02x} ignored");
                return;
            }
        };

        match vector {
            TrapVector::Getc => {
                let ch = self.console.read_char();
                self.state.set_result(0, ch as u16);
            }
            TrapVector::Out => {
                let ch = (self.state.reg(0) & 0xFF) as u8;
                self.console.write_char(ch);
                self.console.flush();
            }
            TrapVector::Puts => {
                for word in self.string_words() {
                    self.console.write_char((word & 0xFF) as u8);
                }
                self.console.flush();
            }
            TrapVector::In => {
                for &ch in IN_PROMPT.as_bytes() {
                    self.console.write_char(ch);
                }
                self.console.flush();
                let ch = self.console.read_char();
                self.console.write_char(ch);
                self.console.flush();
                self.state.set_result(0, ch as u16);
            }
            TrapVector::Putsp => {
                for word in self.string_words() {
                    self.console.write_char((word & 0xFF) as u8);
                    let high = (word >> 8) as u8;
                    if high != 0 {
                        self.console.write_char(high);
                    }
                }
                self.console.flush();
            }
            TrapVector::Halt => {
                self.console.flush();
                self.console.notice("Halted");
                self.running = false;
            }
        }
    }

    /// Words from the address in `R0` up to (not including) the first zero word.
    ///
    /// Stops after one full pass over memory, so a string without terminator still ends.
    fn string_words(&self) -> Vec<u16> {
        let start = self.state.reg(0);
        (0..=u16::MAX)
            .map(|i| self.state.mem(start.wrapping_add(i)))
            .take_while(|word| *word != 0)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{RunFlag, RunState, PC_START};
    use crate::term::{BufferConsole, EOT};

    fn machine(program: &[u16], input: &str) -> Machine<BufferConsole> {
        let mut state = RunState::new();
        for (addr, word) in (PC_START..).zip(program) {
            state.write(addr, *word);
        }
        Machine::new(state, BufferConsole::with_input(input))
    }

    fn write_str(state: &mut RunState, addr: u16, s: &str) {
        for (addr, ch) in (addr..).zip(s.bytes()) {
            state.write(addr, ch as u16);
        }
    }

    #[test]
    fn vector_from_u8() {
        assert_eq!(TrapVector::try_from(0x20u8), Ok(TrapVector::Getc));
        assert_eq!(TrapVector::try_from(0x25u8), Ok(TrapVector::Halt));
        assert_eq!(TrapVector::try_from(0x1Fu8), Err(0x1F));
        assert_eq!(TrapVector::try_from(0x26u8), Err(0x26));
    }

    #[test]
    fn getc_reads_without_echo() {
        let mut m = machine(&[0xF020], "z");
        m.step();
        assert_eq!(m.state().reg(0), b'z' as u16);
        assert_eq!(m.state().flag(), RunFlag::P);
        assert!(m.console().output().is_empty());
    }

    #[test]
    fn getc_at_end_of_input() {
        let mut m = machine(&[0xF020], "");
        m.step();
        assert_eq!(m.state().reg(0), EOT as u16);
    }

    #[test]
    fn out_writes_low_byte() {
        let mut m = machine(&[0xF021], "");
        m.state_mut().set_reg(0, 0x7F41);
        m.step();
        assert_eq!(m.console().output(), b"A");
    }

    #[test]
    fn puts_one_char_per_word() {
        let mut m = machine(&[0xF022], "");
        write_str(m.state_mut(), 0x4000, "Hi!");
        m.state_mut().set_reg(0, 0x4000);
        let flag = m.state().flag();
        m.step();
        assert_eq!(m.console().output_string(), "Hi!");
        assert_eq!(m.state().flag(), flag);
    }

    #[test]
    fn puts_empty_string() {
        let mut m = machine(&[0xF022], "");
        m.state_mut().set_reg(0, 0x4000);
        m.step();
        assert!(m.console().output().is_empty());
    }

    #[test]
    fn puts_unterminated_string_ends() {
        let mut m = machine(&[], "");
        for addr in 0..=u16::MAX {
            m.state_mut().write(addr, b'.' as u16);
        }
        m.state_mut().write(PC_START, 0xF022);
        m.step();
        assert_eq!(m.console().output().len(), 0x10000);
    }

    #[test]
    fn in_prompts_and_echoes() {
        let mut m = machine(&[0xF023], "k");
        m.step();
        assert_eq!(m.console().output_string(), "Enter a character: k");
        assert_eq!(m.state().reg(0), b'k' as u16);
        assert_eq!(m.state().flag(), RunFlag::P);
    }

    #[test]
    fn putsp_packed_low_byte_first() {
        let mut m = machine(&[0xF024], "");
        // "Hello" packed, odd length leaves a zero high byte
        let words = [0x6548, 0x6C6C, 0x006F, 0x0000];
        for (addr, word) in (0x4000..).zip(words) {
            m.state_mut().write(addr, word);
        }
        m.state_mut().set_reg(0, 0x4000);
        m.step();
        assert_eq!(m.console().output_string(), "Hello");
    }

    #[test]
    fn halt_stops_with_notice() {
        let mut m = machine(&[0xF025, 0xF021], "");
        m.run();
        assert!(!m.is_running());
        assert_eq!(m.state().pc(), PC_START + 1);
        assert!(m.console().output().is_empty());
        assert_eq!(m.console().notices(), ["Halted"]);
    }

    #[test]
    fn unknown_vector_is_noop() {
        let mut m = machine(&[0xF0FF, 0xF026, 0xF025], "");
        m.step();
        m.step();
        assert!(m.is_running());
        assert_eq!(m.state().flag(), RunFlag::Z);
        m.step();
        assert!(!m.is_running());
    }

    #[test]
    fn lea_puts_halt() {
        // LEA R0, #2 ; PUTS ; HALT ; "Hello, world!"
        let mut m = machine(&[0xE002, 0xF022, 0xF025], "");
        write_str(m.state_mut(), PC_START + 3, "Hello, world!");
        m.run();
        assert!(!m.is_running());
        assert_eq!(m.console().output_string(), "Hello, world!");
    }
}
