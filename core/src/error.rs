use thiserror::Error;

/// Why a program image failed to load. Instruction execution itself
/// is total and never produces errors; only the loader can fail.
#[derive(Debug, Error)]
pub enum RomError {
    #[error("program image is {size} bytes but only {max} fit above 0x200")]
    TooLarge { size: usize, max: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
