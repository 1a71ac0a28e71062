use rand::rngs::StdRng;
use rand::Rng;

use crate::constants::{ADDRESS_MASK, GLYPH_SIZE, STACK_DEPTH, TIMER_HZ};
use crate::framebuffer::Framebuffer;
use crate::instruction::Instruction;
use crate::keypad::Keypad;
use crate::memory::Memory;
use crate::registers::Registers;

/// Control state of the interpreter between steps.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Mode {
    Running,
    /// LD Vx,K was executed; instruction fetch is gated until a key
    /// is pressed, at which point the key code lands in Vx.
    AwaitingKey { vx: u8 },
}

/// # Cpu
/// The fetch-decode-execute engine. Owns the register file, the RNG
/// behind RND, the key-wait state, and the 60 Hz timer anchor; memory,
/// framebuffer, and keypad are borrowed from the machine for the
/// duration of each step.
pub(crate) struct Cpu {
    pub(crate) regs: Registers,
    pub(crate) mode: Mode,
    /// Whole 60 Hz periods consumed so far; `now_ms * 60 / 1000`
    /// trails this by less than one period.
    pub(crate) timer_ticks: u64,
    rng: StdRng,
}

impl Cpu {
    pub(crate) fn new(rng: StdRng) -> Self {
        Cpu {
            regs: Registers::new(),
            mode: Mode::Running,
            timer_ticks: 0,
            rng,
        }
    }

    /// Back to boot state. The timer anchor survives so that a reset
    /// mid-run does not replay already-consumed periods.
    pub(crate) fn reset(&mut self) {
        self.regs.reset();
        self.mode = Mode::Running;
    }

    /// Advance the machine by one step at host time `now_ms`.
    ///
    /// While awaiting a key no fetch happens: the keypad is polled,
    /// the lowest pressed key (if any) resolves the wait, and only the
    /// timers move. Otherwise one opcode is fetched big-endian at PC,
    /// PC advances past it, and the decoded instruction executes.
    /// Opcodes outside the instruction table are ignored. Timers are
    /// brought up to date after the instruction body.
    pub(crate) fn step(
        &mut self,
        now_ms: u64,
        memory: &mut Memory,
        framebuffer: &mut Framebuffer,
        keypad: &Keypad,
    ) {
        if let Mode::AwaitingKey { vx } = self.mode {
            if let Some(key) = keypad.first_pressed() {
                self.regs.v[(vx & 0xF) as usize] = key;
                self.mode = Mode::Running;
            }
            self.advance_timers(now_ms);
            return;
        }

        let opcode = memory.load_word(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(2);

        if let Some(instruction) = Instruction::decode(opcode) {
            self.execute(instruction, memory, framebuffer, keypad);
        }

        self.advance_timers(now_ms);
    }

    fn execute(
        &mut self,
        instruction: Instruction,
        memory: &mut Memory,
        framebuffer: &mut Framebuffer,
        keypad: &Keypad,
    ) {
        match instruction {
            Instruction::Cls => framebuffer.clear(),
            Instruction::Ret => {
                // underflow clamps to a no-op
                if self.regs.sp > 0 {
                    self.regs.sp -= 1;
                    self.regs.pc = self.regs.stack[self.regs.sp as usize];
                }
            }
            Instruction::Jp { nnn } => self.regs.pc = nnn,
            Instruction::Call { nnn } => {
                // overflow saturates: the jump happens, the push is dropped
                if (self.regs.sp as usize) < STACK_DEPTH {
                    self.regs.stack[self.regs.sp as usize] = self.regs.pc;
                    self.regs.sp += 1;
                }
                self.regs.pc = nnn;
            }
            Instruction::SeByte { x, kk } => {
                if self.regs.v[x as usize] == kk {
                    self.skip();
                }
            }
            Instruction::SneByte { x, kk } => {
                if self.regs.v[x as usize] != kk {
                    self.skip();
                }
            }
            Instruction::SeReg { x, y } => {
                if self.regs.v[x as usize] == self.regs.v[y as usize] {
                    self.skip();
                }
            }
            Instruction::LdByte { x, kk } => self.regs.v[x as usize] = kk,
            Instruction::AddByte { x, kk } => {
                self.regs.v[x as usize] = self.regs.v[x as usize].wrapping_add(kk);
            }
            Instruction::LdReg { x, y } => self.regs.v[x as usize] = self.regs.v[y as usize],
            Instruction::Or { x, y } => self.regs.v[x as usize] |= self.regs.v[y as usize],
            Instruction::And { x, y } => self.regs.v[x as usize] &= self.regs.v[y as usize],
            Instruction::Xor { x, y } => self.regs.v[x as usize] ^= self.regs.v[y as usize],
            Instruction::AddReg { x, y } => {
                let (sum, carried) = self.regs.v[x as usize].overflowing_add(self.regs.v[y as usize]);
                self.regs.v[0xF] = u8::from(carried);
                self.regs.v[x as usize] = sum;
            }
            Instruction::Sub { x, y } => {
                let vx = self.regs.v[x as usize];
                let vy = self.regs.v[y as usize];
                // strict comparison: equal operands count as a borrow
                self.regs.v[0xF] = u8::from(vx > vy);
                self.regs.v[x as usize] = vx.wrapping_sub(vy);
            }
            Instruction::Shr { x, y } => {
                // early-model semantics: the shift reads Vy, not Vx
                let vy = self.regs.v[y as usize];
                self.regs.v[0xF] = vy & 0x1;
                self.regs.v[x as usize] = vy >> 1;
            }
            Instruction::Subn { x, y } => {
                let vx = self.regs.v[x as usize];
                let vy = self.regs.v[y as usize];
                self.regs.v[0xF] = u8::from(vy > vx);
                self.regs.v[x as usize] = vy.wrapping_sub(vx);
            }
            Instruction::Shl { x, y } => {
                let vy = self.regs.v[y as usize];
                self.regs.v[0xF] = vy >> 7;
                self.regs.v[x as usize] = vy << 1;
            }
            Instruction::SneReg { x, y } => {
                if self.regs.v[x as usize] != self.regs.v[y as usize] {
                    self.skip();
                }
            }
            Instruction::LdI { nnn } => self.regs.i = nnn,
            Instruction::JpV0 { nnn } => {
                self.regs.pc = nnn.wrapping_add(u16::from(self.regs.v[0x0]));
            }
            Instruction::Rnd { x, kk } => {
                let byte: u8 = self.rng.random();
                self.regs.v[x as usize] = byte & kk;
            }
            Instruction::Drw { x, y, n } => {
                let mut sprite = [0u8; 15];
                let rows = n as usize;
                for (offset, byte) in sprite[..rows].iter_mut().enumerate() {
                    *byte = memory.load_byte(self.regs.i.wrapping_add(offset as u16));
                }
                let erased = framebuffer.blit_sprite(
                    self.regs.v[x as usize],
                    self.regs.v[y as usize],
                    &sprite[..rows],
                );
                self.regs.v[0xF] = u8::from(erased);
            }
            Instruction::Skp { x } => {
                if keypad.is_pressed(self.regs.v[x as usize]) {
                    self.skip();
                }
            }
            Instruction::Sknp { x } => {
                if !keypad.is_pressed(self.regs.v[x as usize]) {
                    self.skip();
                }
            }
            Instruction::LdFromDt { x } => self.regs.v[x as usize] = self.regs.dt,
            Instruction::WaitKey { x } => self.mode = Mode::AwaitingKey { vx: x },
            Instruction::LdDt { x } => self.regs.dt = self.regs.v[x as usize],
            Instruction::LdSt { x } => self.regs.st = self.regs.v[x as usize],
            Instruction::AddI { x } => {
                self.regs.i =
                    self.regs.i.wrapping_add(u16::from(self.regs.v[x as usize])) & ADDRESS_MASK;
            }
            Instruction::LdFont { x } => {
                self.regs.i = u16::from(self.regs.v[x as usize] & 0xF) * GLYPH_SIZE;
            }
            Instruction::Bcd { x } => {
                let value = self.regs.v[x as usize];
                memory.store_byte(self.regs.i, value / 100);
                memory.store_byte(self.regs.i.wrapping_add(1), value / 10 % 10);
                memory.store_byte(self.regs.i.wrapping_add(2), value % 10);
            }
            Instruction::Save { x } => {
                for index in 0..=x {
                    memory.store_byte(self.regs.i, self.regs.v[index as usize]);
                    self.regs.i = self.regs.i.wrapping_add(1) & ADDRESS_MASK;
                }
            }
            Instruction::Restore { x } => {
                for index in 0..=x {
                    self.regs.v[index as usize] = memory.load_byte(self.regs.i);
                    self.regs.i = self.regs.i.wrapping_add(1) & ADDRESS_MASK;
                }
            }
        }
    }

    /// Skip the next opcode; PC already points past the current one.
    fn skip(&mut self) {
        self.regs.pc = self.regs.pc.wrapping_add(2);
    }

    /// Bring the 60 Hz timers up to date with the host clock.
    ///
    /// The closed form of "while a period has elapsed since the
    /// anchor, decrement and advance the anchor": all whole periods
    /// since the last call are consumed at once and each nonzero
    /// timer drops by that count, never below zero.
    fn advance_timers(&mut self, now_ms: u64) {
        let due = now_ms * u64::from(TIMER_HZ) / 1000;
        let ticks = due.saturating_sub(self.timer_ticks);
        if ticks == 0 {
            return;
        }
        let periods = ticks.min(u64::from(u8::MAX)) as u8;
        self.regs.dt = self.regs.dt.saturating_sub(periods);
        self.regs.st = self.regs.st.saturating_sub(periods);
        self.timer_ticks = due;
    }
}
