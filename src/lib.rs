//! A CHIP-8 virtual machine core.
//!
//! The crate owns the fetch/decode/execute loop and the machine state it
//! mutates: 4KB of memory, sixteen registers, the call stack, both
//! countdown timers, the keypad flags, and the 64x32 framebuffer.
//! Everything with a screen, speaker, keyboard, or filesystem lives on the
//! host side of the API.
//!
//! The host drives the machine at its own cadence and polls state back out:
//!
//! ```no_run
//! use chipvm::{Emulator, EngineState};
//!
//! let rom = std::fs::read("game.ch8").unwrap();
//! let mut emu = Emulator::new();
//! emu.load_program(&rom).unwrap();
//! // once per 60Hz frame: run a slice of cycles, tick, present
//! loop {
//!     if let EngineState::Halted(reason) = emu.run_cycles(12) {
//!         eprintln!("halted: {reason:?}");
//!         break;
//!     }
//!     emu.tick_timers();
//!     if let Some(frame) = emu.frame() {
//!         let _pixels = frame.pixels(); // blit these
//!     }
//!     if emu.sound_pending() {
//!         // play one tone
//!     }
//!     // deliver emu.key_down(..) / emu.key_up(..) events here
//! }
//! ```

pub use decode::OpCode;
pub use display::{FrameBuffer, HEIGHT, WIDTH};
pub use emulator::{Emulator, EngineState, HaltReason};
pub use error::VmError;

mod decode;
mod display;
mod emulator;
mod error;
mod keyboard;
mod memory;
mod registers;
mod timer;
