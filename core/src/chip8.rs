use std::io::Read;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::constants::{MAX_ROM_SIZE, PROGRAM_START};
use crate::cpu::Cpu;
use crate::error::RomError;
use crate::framebuffer::Framebuffer;
use crate::keypad::Keypad;
use crate::memory::Memory;

/// # Chip-8
/// Chip-8 is a virtual machine and corresponding interpreted language.
///
/// The machine owns its memory, framebuffer, keypad, and CPU by
/// value; each step lends the CPU mutable access to the rest.
///
/// Supplies interfaces for:
/// - loading ROMs
/// - pressing and releasing keys, and flagging a quit request
/// - advancing the machine one instruction at a time
/// - inspecting the framebuffer for rendering by some display
pub struct Chip8 {
    cpu: Cpu,
    memory: Memory,
    framebuffer: Framebuffer,
    keypad: Keypad,
}

impl Chip8 {
    /// A machine whose RND stream is seeded from OS entropy.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// A machine with a pinned RND stream; tests and the `--seed`
    /// flag use this to make CXKK reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Chip8 {
            cpu: Cpu::new(rng),
            memory: Memory::new(),
            framebuffer: Framebuffer::new(),
            keypad: Keypad::new(),
        }
    }

    /// Load a program image at 0x200.
    ///
    /// The image is copied byte-for-byte, so multi-byte opcodes must
    /// already be big-endian. Returns the number of bytes loaded.
    ///
    /// # Arguments
    /// * `reader` a reader that yields the ROM
    pub fn load_rom(&mut self, reader: &mut dyn Read) -> Result<usize, RomError> {
        let mut image = Vec::new();
        reader.read_to_end(&mut image)?;
        if image.len() > MAX_ROM_SIZE {
            return Err(RomError::TooLarge {
                size: image.len(),
                max: MAX_ROM_SIZE,
            });
        }
        self.memory.store_bytes(PROGRAM_START, &image);
        Ok(image.len())
    }

    /// Back to boot state: registers, timers, suspension, and the
    /// display. Memory keeps whatever was loaded or written.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.framebuffer.clear();
    }

    /// Advance the machine by a single instruction.
    ///
    /// # Arguments
    /// * `now_ms` monotonic host time in milliseconds; the 60 Hz
    ///   timers are measured against it, so any stepping rate works
    pub fn step(&mut self, now_ms: u64) {
        self.cpu.step(now_ms, &mut self.memory, &mut self.framebuffer, &self.keypad);
    }

    /// Latch the pressed status of a key.
    ///
    /// # Arguments
    /// * `key` the CHIP-8 code (0..F) of the key that was pressed
    pub fn key_press(&mut self, key: u8) {
        self.keypad.press(key);
    }

    /// Unlatch the pressed status of a key.
    ///
    /// # Arguments
    /// * `key` the CHIP-8 code (0..F) of the key that was released
    pub fn key_release(&mut self, key: u8) {
        self.keypad.release(key);
    }

    /// Flag that the host wants to shut down. Only the outer loop
    /// ever reads this back; instruction execution ignores it.
    pub fn request_quit(&mut self) {
        self.keypad.request_quit();
    }

    pub fn quit_requested(&self) -> bool {
        self.keypad.quit_requested()
    }

    /// The framebuffer, if CLS or DRW touched it since the last call.
    pub fn take_frame(&mut self) -> Option<&Framebuffer> {
        if self.framebuffer.take_dirty() {
            Some(&self.framebuffer)
        } else {
            None
        }
    }
}

impl Default for Chip8 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Mode;
    use crate::memory::Endian;

    /// Store a program written as opcode literals at 0x200.
    fn load_words(vm: &mut Chip8, words: &[u16]) {
        vm.memory.store_words(PROGRAM_START, words, Endian::Big);
    }

    #[test]
    fn test_load_immediate_then_register_copy() {
        let mut vm = Chip8::with_seed(0);
        load_words(&mut vm, &[0x6AAB, 0x8CA0]);
        vm.step(0);
        vm.step(0);
        assert_eq!(vm.cpu.regs.v[0xA], 0xAB);
        assert_eq!(vm.cpu.regs.v[0xC], 0xAB);
        assert_eq!(vm.cpu.regs.pc, 0x204);
    }

    #[test]
    fn test_call_and_return() {
        let mut vm = Chip8::with_seed(0);
        load_words(&mut vm, &[0x2208, 0x0000, 0x0000, 0x0000, 0x00EE]);
        vm.step(0);
        assert_eq!(vm.cpu.regs.sp, 1);
        assert_eq!(vm.cpu.regs.stack[0], 0x202);
        assert_eq!(vm.cpu.regs.pc, 0x208);
        vm.step(0);
        assert_eq!(vm.cpu.regs.sp, 0);
        assert_eq!(vm.cpu.regs.pc, 0x202);
    }

    #[test]
    fn test_add_with_overflow_flag() {
        let mut vm = Chip8::with_seed(0);
        load_words(&mut vm, &[0x6AC2, 0x6B53, 0x8AB4]);
        for _ in 0..3 {
            vm.step(0);
        }
        assert_eq!(vm.cpu.regs.v[0xA], 0x15);
        assert_eq!(vm.cpu.regs.v[0xF], 0x1);
    }

    #[test]
    fn test_bcd_store() {
        let mut vm = Chip8::with_seed(0);
        load_words(&mut vm, &[0x60FF, 0xA800, 0xF033]);
        for _ in 0..3 {
            vm.step(0);
        }
        assert_eq!(vm.memory.load_byte(0x800), 2);
        assert_eq!(vm.memory.load_byte(0x801), 5);
        assert_eq!(vm.memory.load_byte(0x802), 5);
    }

    #[test]
    fn test_sprite_collision_clears_pixel() {
        let mut vm = Chip8::with_seed(0);
        vm.framebuffer.blit_sprite(1, 2, &[0x80]);
        vm.memory.store_byte(0x800, 0x80);
        load_words(&mut vm, &[0x6001, 0x6102, 0xA800, 0xD011]);
        for _ in 0..4 {
            vm.step(0);
        }
        assert_eq!(vm.framebuffer.pixel(1, 2), 0);
        assert_eq!(vm.cpu.regs.v[0xF], 0x1);
    }

    #[test]
    fn test_key_wait_suspends_then_resolves() {
        let mut vm = Chip8::with_seed(0);
        load_words(&mut vm, &[0xF30A, 0x6001]);
        vm.step(0);
        let suspended_pc = vm.cpu.regs.pc;
        for _ in 0..5 {
            vm.step(0);
        }
        assert_eq!(vm.cpu.regs.pc, suspended_pc);
        assert_eq!(vm.cpu.mode, Mode::AwaitingKey { vx: 0x3 });

        vm.key_press(0x5);
        vm.step(0);
        assert_eq!(vm.cpu.regs.v[0x3], 0x5);
        assert_eq!(vm.cpu.mode, Mode::Running);

        // execution resumes with the following opcode
        vm.step(0);
        assert_eq!(vm.cpu.regs.v[0x0], 0x1);
        assert_eq!(vm.cpu.regs.pc, 0x204);
    }

    #[test]
    fn test_timers_decoupled_from_step_rate() {
        let mut vm = Chip8::with_seed(0);
        load_words(&mut vm, &[0x603C, 0xF015]);
        vm.step(0);
        vm.step(0);
        assert_eq!(vm.cpu.regs.dt, 60);

        // many steps inside one period leave the timer alone
        for _ in 0..10 {
            vm.step(10);
        }
        assert_eq!(vm.cpu.regs.dt, 60);

        // one second of elapsed time drains sixty periods
        vm.step(1010);
        assert_eq!(vm.cpu.regs.dt, 0);
    }

    #[test]
    fn test_reset_keeps_memory() {
        let mut vm = Chip8::with_seed(0);
        load_words(&mut vm, &[0x6AAB]);
        vm.step(0);
        assert_eq!(vm.cpu.regs.v[0xA], 0xAB);

        vm.reset();
        assert_eq!(vm.cpu.regs.pc, 0x200);
        assert_eq!(vm.cpu.regs.v[0xA], 0x00);
        // the program image survives and runs again
        vm.step(0);
        assert_eq!(vm.cpu.regs.v[0xA], 0xAB);
    }

    #[test]
    fn test_load_rom_places_image_at_program_start() {
        let mut vm = Chip8::with_seed(0);
        let mut rom: &[u8] = &[0x6A, 0xAB, 0x8C, 0xA0];
        assert_eq!(vm.load_rom(&mut rom).unwrap(), 4);
        assert_eq!(vm.memory.load_word(0x200), 0x6AAB);
        assert_eq!(vm.memory.load_word(0x202), 0x8CA0);
    }

    #[test]
    fn test_load_rom_rejects_oversized_image() {
        let mut vm = Chip8::with_seed(0);
        let image = vec![0u8; MAX_ROM_SIZE + 1];
        let mut reader: &[u8] = &image;
        assert!(matches!(
            vm.load_rom(&mut reader),
            Err(RomError::TooLarge { size, max }) if size == MAX_ROM_SIZE + 1 && max == MAX_ROM_SIZE
        ));
    }

    #[test]
    fn test_take_frame_only_after_draw() {
        let mut vm = Chip8::with_seed(0);
        load_words(&mut vm, &[0x6A01, 0xD005]);
        vm.step(0);
        assert!(vm.take_frame().is_none());
        vm.step(0);
        assert!(vm.take_frame().is_some());
        assert!(vm.take_frame().is_none());
    }

    #[test]
    fn test_rnd_masks_and_is_seedable() {
        let mut a = Chip8::with_seed(7);
        let mut b = Chip8::with_seed(7);
        load_words(&mut a, &[0xC10F]);
        load_words(&mut b, &[0xC10F]);
        a.step(0);
        b.step(0);
        assert_eq!(a.cpu.regs.v[0x1] & 0xF0, 0);
        assert_eq!(a.cpu.regs.v[0x1], b.cpu.regs.v[0x1]);
    }
}
