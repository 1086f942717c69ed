use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use stack_machine::bytecode::Bytecode;
use thiserror_no_std::Error;

pub const SOURCE_EXTENSION: &str = "asm";
pub const IMAGE_EXTENSION: &str = "vm";
/// Written over the image of a failed assembly so a stale image can't be
/// run by mistake. It is not a valid image.
pub const CORRUPT_MARKER: &[u8] = b"CORRUPT\n";

#[derive(Error, Debug)]
pub enum FileError {
    #[error("`{}` does not end in .{}", .0.display(), .1)]
    WrongExtension(PathBuf, &'static str),
}

pub fn require_extension(path: &Path, extension: &'static str) -> Result<(), FileError> {
    match path.extension() {
        Some(found) if found == extension => Ok(()),
        _ => Err(FileError::WrongExtension(path.to_path_buf(), extension)),
    }
}

/// `prog.asm` assembles to `prog.vm` next to it.
pub fn image_path(source: &Path) -> Result<PathBuf, FileError> {
    require_extension(source, SOURCE_EXTENSION)?;
    Ok(source.with_extension(IMAGE_EXTENSION))
}

pub fn read_source(path: &Path) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))
}

pub fn write_image(path: &Path, code: &Bytecode) -> anyhow::Result<()> {
    let file = fs::File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    code.write_to(io::BufWriter::new(file))
        .with_context(|| format!("cannot write {}", path.display()))
}

pub fn read_image(path: &Path) -> anyhow::Result<Bytecode> {
    require_extension(path, IMAGE_EXTENSION)?;
    let bytes = fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    if bytes == CORRUPT_MARKER {
        anyhow::bail!("{} is left over from a failed assembly", path.display());
    }
    Bytecode::from_bytes(&bytes)
        .with_context(|| format!("{} is not a bytecode image", path.display()))
}

pub fn mark_corrupt(path: &Path) -> io::Result<()> {
    fs::write(path, CORRUPT_MARKER)
}
