// Machine
mod runtime;
pub use runtime::{sign_extend, Machine, Opcode};
mod state;
pub use state::{RunFlag, RunState, KBDR, KBSR, MEMORY_MAX, PC_START};
mod trap;
pub use trap::TrapVector;

// Collaborators
mod image;
pub use image::Image;
mod term;
pub use term::{
    install_interrupt_handler, restore_terminal, BufferConsole, Console, RawMode, Terminal, EOT,
};

mod error;
