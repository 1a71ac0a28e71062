use std::fs::File;
use std::io::BufReader;
use std::time::{Duration, Instant};

use anyhow::Context;
use sdl2::event::Event;
use sdl2::keyboard::Keycode;

use okto_core::Chip8;
use okto_display::Display;

use crate::keymap::keymap;
use crate::Args;

pub fn run(args: Args) -> anyhow::Result<()> {
    let mut chip8 = match args.seed {
        Some(seed) => Chip8::with_seed(seed),
        None => Chip8::new(),
    };

    let file = File::open(&args.rom)
        .with_context(|| format!("unable to open {}", args.rom.display()))?;
    let mut reader = BufReader::new(file);
    let loaded = chip8
        .load_rom(&mut reader)
        .with_context(|| format!("unable to load {}", args.rom.display()))?;
    println!("loaded {loaded} byte ROM from {}", args.rom.display());

    let sdl = sdl2::init().map_err(anyhow::Error::msg)?;
    let mut display = Display::new(&sdl, args.scale).map_err(anyhow::Error::msg)?;
    let mut events = sdl.event_pump().map_err(anyhow::Error::msg)?;

    let cycle_time = Duration::from_secs(1) / args.clock.max(1);
    let start = Instant::now();
    let mut last_cycle = Instant::now();

    while !chip8.quit_requested() {
        // Latch input ahead of the step so key state is stable for it
        for event in events.poll_iter() {
            match event {
                Event::Quit { .. } => chip8.request_quit(),
                Event::KeyDown {
                    keycode: Some(key), ..
                } => match (key, keymap(key)) {
                    (_, Some(code)) => chip8.key_press(code),
                    (Keycode::Escape, _) => chip8.request_quit(),
                    _ => continue,
                },
                Event::KeyUp {
                    keycode: Some(key), ..
                } => match keymap(key) {
                    Some(code) => chip8.key_release(code),
                    None => continue,
                },
                _ => continue,
            };
        }

        chip8.step(start.elapsed().as_millis() as u64);

        // If the machine drew since the last render, show the frame
        if let Some(frame) = chip8.take_frame() {
            display.render(frame).map_err(anyhow::Error::msg)?;
        }

        // Sleep off the rest of the cycle to hold the clock rate
        let elapsed = last_cycle.elapsed();
        if cycle_time > elapsed {
            std::thread::sleep(cycle_time - elapsed);
        }
        last_cycle = Instant::now();
    }

    Ok(())
}
