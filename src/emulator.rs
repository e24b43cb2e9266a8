use log::{error, info, warn};
use rand::Rng;

use crate::decode::OpCode;
use crate::display::FrameBuffer;
use crate::error::VmError;
use crate::keyboard::Keypad;
use crate::memory::Memory;
use crate::registers::{CallStack, IndexRegister, ProgramCounter, Registers};
use crate::timer::Timer;

/// What the engine is doing, inspected by the host every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Running,
    /// Parked on an FX0A until `key_down` fills the register in `target`.
    WaitingForKey { target: u8 },
    /// Terminal, except that `resume` clears an infinite-loop halt.
    Halted(HaltReason),
}

/// Why a halted engine halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// A decode fault. The same PC would fault again, so not retryable.
    Fault(VmError),
    /// The host called [`Emulator::stop`].
    Stopped,
}

/// The CPU engine and the machine state it drives.
///
/// The host owns the real-time clock: it calls [`run_cycles`] at its chosen
/// cadence, [`tick_timers`] exactly once per fixed interval (canonically
/// 60Hz), and delivers key events in between. Frames and the tone signal
/// come back out as snapshots; the host never touches memory or registers
/// directly.
///
/// [`run_cycles`]: Emulator::run_cycles
/// [`tick_timers`]: Emulator::tick_timers
pub struct Emulator {
    mem: Memory,
    regs: Registers,
    fb: FrameBuffer,
    keys: Keypad,
    pc: ProgramCounter,
    index: IndexRegister,
    stack: CallStack,
    delay: Timer,
    sound: Timer,
    state: EngineState,
    sound_pending: bool,
}

impl Emulator {
    pub fn new() -> Self {
        Self {
            mem: Memory::new(),
            regs: Registers::new(),
            fb: FrameBuffer::new(),
            keys: Keypad::new(),
            pc: ProgramCounter::new(),
            index: IndexRegister::new(),
            stack: CallStack::new(),
            delay: Timer::new(),
            sound: Timer::new(),
            state: EngineState::Running,
            sound_pending: false,
        }
    }

    /// Back to the post-initialization state: everything zeroed except the
    /// font table, PC at 0x200, engine running.
    pub fn reset(&mut self) {
        self.mem.reset();
        self.regs.reset();
        self.fb.reset();
        self.keys.reset();
        self.pc = ProgramCounter::new();
        self.index = IndexRegister::new();
        self.stack.reset();
        self.delay = Timer::new();
        self.sound = Timer::new();
        self.state = EngineState::Running;
        self.sound_pending = false;
        info!("machine reset");
    }

    /// Places a ROM image at 0x200. Prior state at other addresses stays;
    /// call [`reset`](Emulator::reset) first for a clean machine.
    pub fn load_program(&mut self, rom: &[u8]) -> Result<(), VmError> {
        self.mem.load_rom(rom)?;
        info!("loaded {} byte program", rom.len());
        Ok(())
    }

    /// Executes one instruction. Does nothing unless the engine is running.
    pub fn step(&mut self) {
        if self.state != EngineState::Running {
            return;
        }
        let raw = self.mem.get_word(self.pc.get());
        self.pc.advance();
        self.execute(OpCode::decode(raw));
    }

    /// Executes up to `n` instructions, stopping early if the engine leaves
    /// the running state, and returns where it ended up. Timers are not
    /// touched here; they advance only through
    /// [`tick_timers`](Emulator::tick_timers).
    pub fn run_cycles(&mut self, n: usize) -> EngineState {
        for _ in 0..n {
            if self.state != EngineState::Running {
                break;
            }
            self.step();
        }
        self.state
    }

    /// One timer tick: each counter drops by one, floored at zero. The
    /// sound timer expiring latches the tone signal for the host.
    pub fn tick_timers(&mut self) {
        self.delay.tick();
        if self.sound.tick() {
            self.sound_pending = true;
        }
    }

    /// True exactly once per sound-timer expiry; asking clears the latch.
    pub fn sound_pending(&mut self) -> bool {
        let pending = self.sound_pending;
        self.sound_pending = false;
        pending
    }

    /// Marks `key` down and completes a pending key wait with it.
    pub fn key_down(&mut self, key: u8) {
        self.keys.press(key);
        if let EngineState::WaitingForKey { target } = self.state {
            self.regs.set(target, key & 0xF);
            self.pc.advance();
            self.state = EngineState::Running;
        }
    }

    pub fn key_up(&mut self, key: u8) {
        self.keys.release(key);
    }

    /// The framebuffer, if it changed since the last taken frame. Taking
    /// a frame clears the draw-pending flag.
    pub fn frame(&mut self) -> Option<&FrameBuffer> {
        if self.fb.take_pending() {
            Some(&self.fb)
        } else {
            None
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn delay_timer(&self) -> u8 {
        self.delay.get()
    }

    pub fn sound_timer(&self) -> u8 {
        self.sound.get()
    }

    /// Parks the engine for good; the host's cycle loop sees `Halted` and
    /// stops calling in.
    pub fn stop(&mut self) {
        self.state = EngineState::Halted(HaltReason::Stopped);
    }

    /// Clears an infinite-loop halt so the host can run past the
    /// heuristic. Decode-fault and host-stop halts stay put.
    pub fn resume(&mut self) -> bool {
        match self.state {
            EngineState::Halted(HaltReason::Fault(VmError::InfiniteLoop { .. })) => {
                self.state = EngineState::Running;
                true
            }
            _ => false,
        }
    }

    fn halt(&mut self, fault: VmError) {
        self.state = EngineState::Halted(HaltReason::Fault(fault));
    }

    fn execute(&mut self, op: OpCode) {
        match op {
            OpCode::ClearScreen => self.fb.clear(),
            OpCode::Return => {
                let addr = self.stack.pop();
                self.pc.set(addr);
            }
            OpCode::Jump(addr) => {
                self.pc.set(addr);
                // A jump whose target is itself spins forever; catch it
                // while the word is in hand rather than on the next fetch.
                if self.mem.get_word(addr) == (0x1000 | addr) {
                    warn!("jump to self at {addr:#05X}, halting");
                    self.halt(VmError::InfiniteLoop { addr });
                }
            }
            OpCode::Call(addr) => {
                self.stack.push(self.pc.get());
                self.pc.set(addr);
            }
            OpCode::SkipIfEqual(x, nn) => {
                if self.regs.get(x) == nn {
                    self.pc.advance();
                }
            }
            OpCode::SkipIfNotEqual(x, nn) => {
                if self.regs.get(x) != nn {
                    self.pc.advance();
                }
            }
            OpCode::SkipIfRegistersEqual(x, y) => {
                if self.regs.get(x) == self.regs.get(y) {
                    self.pc.advance();
                }
            }
            OpCode::SkipIfRegistersNotEqual(x, y) => {
                if self.regs.get(x) != self.regs.get(y) {
                    self.pc.advance();
                }
            }
            OpCode::Load(x, nn) => self.regs.set(x, nn),
            OpCode::AddImmediate(x, nn) => {
                let val = self.regs.get(x).wrapping_add(nn);
                self.regs.set(x, val);
            }
            OpCode::Copy(x, y) => {
                let val = self.regs.get(y);
                self.regs.set(x, val);
            }
            OpCode::Or(x, y) => {
                let val = self.regs.get(x) | self.regs.get(y);
                self.regs.set(x, val);
            }
            OpCode::And(x, y) => {
                let val = self.regs.get(x) & self.regs.get(y);
                self.regs.set(x, val);
            }
            OpCode::Xor(x, y) => {
                let val = self.regs.get(x) ^ self.regs.get(y);
                self.regs.set(x, val);
            }
            // For the arithmetic and shift family the flag write comes
            // last, so VF holds the flag even when X is F.
            OpCode::Add(x, y) => {
                let (sum, carry) = self.regs.get(x).overflowing_add(self.regs.get(y));
                self.regs.set(x, sum);
                self.regs.set_flag(carry);
            }
            OpCode::Sub(x, y) => {
                let (diff, borrow) = self.regs.get(x).overflowing_sub(self.regs.get(y));
                self.regs.set(x, diff);
                self.regs.set_flag(!borrow);
            }
            OpCode::SubReversed(x, y) => {
                let (diff, borrow) = self.regs.get(y).overflowing_sub(self.regs.get(x));
                self.regs.set(x, diff);
                self.regs.set_flag(!borrow);
            }
            OpCode::ShiftRight(x, _) => {
                let val = self.regs.get(x);
                self.regs.set(x, val >> 1);
                self.regs.set_flag(val & 0x01 != 0);
            }
            OpCode::ShiftLeft(x, _) => {
                let val = self.regs.get(x);
                self.regs.set(x, val << 1);
                self.regs.set_flag(val & 0x80 != 0);
            }
            OpCode::LoadIndex(addr) => self.index.set(addr),
            OpCode::JumpOffset(addr) => {
                self.pc.set(addr.wrapping_add(self.regs.get(0x0) as u16));
            }
            OpCode::Random(x, nn) => {
                let byte: u8 = rand::thread_rng().gen();
                self.regs.set(x, byte & nn);
            }
            OpCode::Draw(x, y, n) => {
                let mut sprite = Vec::with_capacity(n as usize);
                for row in 0..n as u16 {
                    sprite.push(self.mem.get(self.index.get().wrapping_add(row)));
                }
                let collision = self.fb.paint(self.regs.get(x), self.regs.get(y), &sprite);
                self.regs.set_flag(collision);
            }
            OpCode::SkipIfKeyDown(x) => {
                if self.keys.is_down(self.regs.get(x)) {
                    self.pc.advance();
                }
            }
            OpCode::SkipIfKeyUp(x) => {
                if !self.keys.is_down(self.regs.get(x)) {
                    self.pc.advance();
                }
            }
            OpCode::ReadDelay(x) => {
                let val = self.delay.get();
                self.regs.set(x, val);
            }
            OpCode::WaitKey(x) => {
                // Park on this instruction; key_down performs the advance.
                self.pc.rewind();
                self.state = EngineState::WaitingForKey { target: x };
            }
            OpCode::SetDelay(x) => self.delay.set(self.regs.get(x)),
            OpCode::SetSound(x) => self.sound.set(self.regs.get(x)),
            OpCode::AddIndex(x) => {
                let overflow = self.index.add(self.regs.get(x));
                self.regs.set_flag(overflow);
            }
            OpCode::LoadGlyph(x) => {
                let addr = self.mem.sprite_addr(self.regs.get(x));
                self.index.set(addr);
            }
            OpCode::StoreBcd(x) => {
                let val = self.regs.get(x);
                let i = self.index.get();
                self.mem.set(i, val / 100);
                self.mem.set(i.wrapping_add(1), val / 10 % 10);
                self.mem.set(i.wrapping_add(2), val % 10);
            }
            OpCode::StoreRegisters(x) => {
                for reg in 0..=x {
                    let addr = self.index.get().wrapping_add(reg as u16);
                    self.mem.set(addr, self.regs.get(reg));
                }
            }
            OpCode::LoadRegisters(x) => {
                for reg in 0..=x {
                    let addr = self.index.get().wrapping_add(reg as u16);
                    self.regs.set(reg, self.mem.get(addr));
                }
            }
            OpCode::Unknown(raw) => {
                error!("unknown opcode {raw:#06X}, halting");
                self.halt(VmError::UnknownOpcode { opcode: raw });
            }
        }
    }
}

impl Default for Emulator {
    fn default() -> Self {
        Self::new()
    }
}
