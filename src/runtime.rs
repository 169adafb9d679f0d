use log::trace;

use crate::state::RunState;
use crate::term::Console;

/// Instruction class, selected by the top 4 bits of an instruction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    Br,
    Add,
    Ld,
    St,
    Jsr,
    And,
    Ldr,
    Str,
    Rti,
    Not,
    Ldi,
    Sti,
    Jmp,
    Res,
    Lea,
    Trap,
}

impl Opcode {
    const TABLE: [Opcode; 16] = [
        Opcode::Br,   // 0x0
        Opcode::Add,  // 0x1
        Opcode::Ld,   // 0x2
        Opcode::St,   // 0x3
        Opcode::Jsr,  // 0x4
        Opcode::And,  // 0x5
        Opcode::Ldr,  // 0x6
        Opcode::Str,  // 0x7
        Opcode::Rti,  // 0x8
        Opcode::Not,  // 0x9
        Opcode::Ldi,  // 0xA
        Opcode::Sti,  // 0xB
        Opcode::Jmp,  // 0xC
        Opcode::Res,  // 0xD
        Opcode::Lea,  // 0xE
        Opcode::Trap, // 0xF
    ];

    /// Every instruction word decodes to some opcode.
    pub fn decode(instr: u16) -> Self {
        Self::TABLE[(instr >> 12) as usize]
    }
}

/// Widen the low `bits` bits of `val` to 16 bits, as two's-complement.
pub fn sign_extend(val: u16, bits: u32) -> u16 {
    debug_assert!(bits > 0 && bits < 16);
    // Sign bit
    let sign = val & (1u16 << (bits - 1));
    // Bits lower than sign bit
    let magnitude = val & ((1u16 << (bits - 1)) - 1);
    // Positive input: all bits unset; 0x0000
    // Negative input: sign bit and above will be set, lower bits will be reset
    //      Eg. bits=14 -> 0xE000
    let sign_extension = (!sign).wrapping_add(1); // sign * -1
    magnitude | sign_extension
}

/// Destination (or store source) register, bits 11-9.
#[inline]
fn dr(instr: u16) -> u16 {
    (instr >> 9) & 0b111
}

/// First source or base register, bits 8-6.
#[inline]
fn sr(instr: u16) -> u16 {
    (instr >> 6) & 0b111
}

/// A machine state together with the console it is attached to.
pub struct Machine<C> {
    pub(crate) state: RunState,
    pub(crate) console: C,
    /// Cleared only by the `HALT` trap.
    pub(crate) running: bool,
}

impl<C: Console> Machine<C> {
    pub fn new(state: RunState, console: C) -> Self {
        Self {
            state,
            console,
            running: true,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RunState {
        &mut self.state
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    pub fn into_parts(self) -> (RunState, C) {
        (self.state, self.console)
    }

    /// Run until the program halts.
    pub fn run(&mut self) {
        while self.running {
            self.step();
        }
    }

    /// Fetch, decode and execute a single instruction. Does nothing once halted.
    pub fn step(&mut self) {
        if !self.running {
            return;
        }
        self.console.tick();

        let pc = self.state.pc();
        let instr = self.state.read(pc, &mut self.console);
        // PC incremented before instruction is performed
        self.state.set_pc(pc.wrapping_add(1));

        match Opcode::decode(instr) {
            Opcode::Br => self.br(instr),
            Opcode::Add => self.add(instr),
            Opcode::Ld => self.ld(instr),
            Opcode::St => self.st(instr),
            Opcode::Jsr => self.jsr(instr),
            Opcode::And => self.and(instr),
            Opcode::Ldr => self.ldr(instr),
            Opcode::Str => self.str(instr),
            Opcode::Not => self.not(instr),
            Opcode::Ldi => self.ldi(instr),
            Opcode::Sti => self.sti(instr),
            Opcode::Jmp => self.jmp(instr),
            Opcode::Lea => self.lea(instr),
            Opcode::Trap => self.trap(instr),
            Opcode::Rti | Opcode::Res => {
                trace!("reserved opcode 0x{instr:04x} at 0x{pc:04x} ignored");
            }
        }
    }

    /// Address `offset`-bit offset away from the (already incremented) PC.
    #[inline]
    fn pc_offset(&self, instr: u16, bits: u32) -> u16 {
        self.state.pc().wrapping_add(sign_extend(instr, bits))
    }

    #[inline]
    fn read(&mut self, addr: u16) -> u16 {
        self.state.read(addr, &mut self.console)
    }

    /// Second operand of `ADD`/`AND`: register or 5-bit immediate.
    fn operand(&self, instr: u16) -> u16 {
        if instr & 0b100000 == 0 {
            self.state.reg(instr & 0b111)
        } else {
            sign_extend(instr, 5)
        }
    }

    fn add(&mut self, instr: u16) {
        let res = self.state.reg(sr(instr)).wrapping_add(self.operand(instr));
        self.state.set_result(dr(instr), res);
    }

    fn and(&mut self, instr: u16) {
        let res = self.state.reg(sr(instr)) & self.operand(instr);
        self.state.set_result(dr(instr), res);
    }

    fn not(&mut self, instr: u16) {
        let res = !self.state.reg(sr(instr));
        self.state.set_result(dr(instr), res);
    }

    fn br(&mut self, instr: u16) {
        let flag = (instr >> 9) & 0b111;
        if self.state.flag().bits() & flag != 0 {
            self.state.set_pc(self.pc_offset(instr, 9));
        }
    }

    fn jmp(&mut self, instr: u16) {
        self.state.set_pc(self.state.reg(sr(instr)));
    }

    fn jsr(&mut self, instr: u16) {
        let ret = self.state.pc();
        let target = if instr & 0x800 == 0 {
            // reg
            self.state.reg(sr(instr))
        } else {
            // offs
            self.pc_offset(instr, 11)
        };
        self.state.set_reg(7, ret);
        self.state.set_pc(target);
    }

    fn ld(&mut self, instr: u16) {
        let val = self.read(self.pc_offset(instr, 9));
        self.state.set_result(dr(instr), val);
    }

    fn ldi(&mut self, instr: u16) {
        let ptr = self.read(self.pc_offset(instr, 9));
        let val = self.read(ptr);
        self.state.set_result(dr(instr), val);
    }

    fn ldr(&mut self, instr: u16) {
        let ptr = self.state.reg(sr(instr)).wrapping_add(sign_extend(instr, 6));
        let val = self.read(ptr);
        self.state.set_result(dr(instr), val);
    }

    fn lea(&mut self, instr: u16) {
        let val = self.pc_offset(instr, 9);
        self.state.set_result(dr(instr), val);
    }

    fn st(&mut self, instr: u16) {
        let val = self.state.reg(dr(instr));
        self.state.write(self.pc_offset(instr, 9), val);
    }

    fn sti(&mut self, instr: u16) {
        let val = self.state.reg(dr(instr));
        let ptr = self.read(self.pc_offset(instr, 9));
        self.state.write(ptr, val);
    }

    fn str(&mut self, instr: u16) {
        let val = self.state.reg(dr(instr));
        let ptr = self.state.reg(sr(instr)).wrapping_add(sign_extend(instr, 6));
        self.state.write(ptr, val);
    }
}
