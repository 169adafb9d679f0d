use std::cmp::Ordering;
use std::fmt;

use crate::term::Console;

/// LC3 can address 128KB of memory.
pub const MEMORY_MAX: usize = 0x10000;

/// Conventional address user programs are loaded at and started from.
pub const PC_START: u16 = 0x3000;

/// Keyboard status register. Bit 15 is set when a character has been latched into [`KBDR`].
pub const KBSR: u16 = 0xFE00;
/// Keyboard data register.
pub const KBDR: u16 = 0xFE02;

const KBSR_READY: u16 = 0x8000;

/// Set using result from previous register write.
///
/// Discriminants match the `nzp` bits of a `BR` instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunFlag {
    /// Negative
    N = 0b100,
    /// Zero
    Z = 0b010,
    /// Positive
    P = 0b001,
}

impl RunFlag {
    /// Flag describing a value interpreted as two's-complement.
    pub fn from_value(val: u16) -> Self {
        match (val as i16).cmp(&0) {
            Ordering::Less => RunFlag::N,
            Ordering::Equal => RunFlag::Z,
            Ordering::Greater => RunFlag::P,
        }
    }

    pub fn bits(self) -> u16 {
        self as u16
    }
}

/// Represents complete machine state during runtime.
///
/// Every access is total: registers are masked to 3 bits and any `u16` is a valid address.
pub struct RunState {
    /// System memory - 128KB in size.
    mem: Box<[u16]>,
    /// Program counter
    pc: u16,
    /// 8x 16-bit registers
    reg: [u16; 8],
    /// Condition code
    flag: RunFlag,
}

impl RunState {
    /// Zeroed memory and registers, with `PC` at [`PC_START`] and the zero flag set.
    pub fn new() -> Self {
        RunState {
            mem: vec![0; MEMORY_MAX].into_boxed_slice(),
            pc: PC_START,
            reg: [0; 8],
            flag: RunFlag::Z,
        }
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.pc = pc;
    }

    pub fn reg(&self, reg: u16) -> u16 {
        self.reg[(reg & 0b111) as usize]
    }

    /// Write a register without touching the condition code.
    pub fn set_reg(&mut self, reg: u16, val: u16) {
        self.reg[(reg & 0b111) as usize] = val;
    }

    pub fn flag(&self) -> RunFlag {
        self.flag
    }

    pub fn set_flags(&mut self, val: u16) {
        self.flag = RunFlag::from_value(val);
    }

    /// Write a destination register and recompute the condition code from it.
    pub fn set_result(&mut self, reg: u16, val: u16) {
        self.set_reg(reg, val);
        self.set_flags(val);
    }

    /// Read memory without device side effects.
    pub fn mem(&self, addr: u16) -> u16 {
        self.mem[addr as usize]
    }

    pub fn write(&mut self, addr: u16, val: u16) {
        self.mem[addr as usize] = val;
    }

    /// Read memory as the running program sees it.
    ///
    /// Reading [`KBSR`] latches a pending character into [`KBDR`] if the console has one. The
    /// console is not polled again while a character is still latched.
    /// Reading [`KBDR`] returns the latched character, or blocks on the console if nothing is
    /// latched. Either way the ready bit is cleared afterwards.
    pub fn read<C>(&mut self, addr: u16, console: &mut C) -> u16
    where
        C: Console + ?Sized,
    {
        match addr {
            KBSR => {
                if self.mem(KBSR) & KBSR_READY != 0 {
                    // Latched character not yet consumed
                } else if console.poll_ready() {
                    self.write(KBDR, console.read_char() as u16);
                    self.write(KBSR, KBSR_READY);
                } else {
                    self.write(KBSR, 0);
                }
            }
            KBDR => {
                if self.mem(KBSR) & KBSR_READY == 0 {
                    self.write(KBSR, KBSR_READY);
                    self.write(KBDR, console.read_char() as u16);
                }
                let val = self.mem(KBDR);
                self.write(KBSR, 0);
                return val;
            }
            _ => (),
        }
        self.mem(addr)
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunState")
            .field("pc", &format_args!("0x{:04x}", self.pc))
            .field("reg", &self.reg)
            .field("flag", &self.flag)
            .finish_non_exhaustive()
    }
}
