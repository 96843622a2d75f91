use std::collections::HashMap;
use std::error::Error;

use colored::*;
use dialoguer::Confirm;
use flatfs::{
    disk::init::{open_volume, VolumeOptions},
    AccessMode, FileHandle, FileSystem, FileSystemError,
};

use crate::shell::{boot_progress, finish_progress};

#[derive(Debug)]
pub enum Command {
    Help,
    Ls,
    Df,
    Create(String),
    Open(String, AccessMode),
    Close(String),
    Read(String, Option<usize>),
    Write(String, String),
    Seek(String, u64),
    Stat(String),
    Rm(String),
    Exists(String),
    Format,
    Exit,
}

/// A mounted volume plus the files the user has open, by name.
pub struct Session {
    pub fs: FileSystem,
    pub options: VolumeOptions,
    pub handles: HashMap<String, FileHandle>,
}

impl Session {
    pub fn new(fs: FileSystem, options: VolumeOptions) -> Self {
        Self {
            fs,
            options,
            handles: HashMap::new(),
        }
    }

    /// Closes every open handle, reporting but not stopping on failures.
    pub fn close_all(&mut self) {
        for (name, mut handle) in self.handles.drain() {
            if let Err(e) = self.fs.close(&mut handle) {
                println!("{} closing {}: {}", "⚠️".yellow(), name, e);
            }
        }
    }
}

fn mode_label(mode: Option<AccessMode>) -> ColoredString {
    match mode {
        Some(AccessMode::ReadWrite) => "read-write".green(),
        Some(AccessMode::ReadOnly) => "read-only".yellow(),
        None => "closed".bright_black(),
    }
}

pub fn execute_command(cmd: &Command, session: &mut Session) -> Result<(), Box<dyn Error>> {
    match cmd {
        Command::Help => print_help(),
        Command::Ls => {
            let files = session.fs.list()?;
            if files.is_empty() {
                println!("{}", "(no files)".bright_black());
            }
            for (name, size) in files {
                let marker = if session.handles.contains_key(&name) { "*" } else { " " };
                println!("📄 {}{:<32} {:>8} bytes", marker.cyan(), name, size);
            }
        }
        Command::Df => {
            let stats = session.fs.stat()?;
            let layout = session.fs.layout();
            println!("{}", "💾 Volume".bright_yellow().bold());
            println!("{}: {} blocks", "Size".blue(), layout.total_blocks);
            println!("{}: {}/{}", "Files".blue(), stats.files, stats.max_files);
            println!("{}: {}/{}", "Inodes".blue(), stats.inodes_used, stats.inodes_total);
            println!(
                "{}: {}/{}",
                "Data blocks".blue(),
                stats.data_used,
                stats.data_total
            );
        }
        Command::Create(name) => {
            let handle = session.fs.create(name)?;
            session.handles.insert(name.clone(), handle);
            println!("📝 Created file: {} ({})", name.green(), "open read-write".bright_black());
        }
        Command::Open(name, mode) => {
            let handle = session.fs.open(name, *mode)?;
            println!(
                "📂 Opened {} {} ({} bytes)",
                name.cyan(),
                mode_label(Some(*mode)),
                handle.len()
            );
            session.handles.insert(name.clone(), handle);
        }
        Command::Close(name) => {
            let mut handle = session
                .handles
                .remove(name)
                .ok_or(FileSystemError::FileNotOpen)?;
            session.fs.close(&mut handle)?;
            println!("🔒 Closed {}", name.cyan());
        }
        Command::Read(name, len) => {
            let Session { fs, handles, .. } = session;
            let handle = handles.get_mut(name).ok_or(FileSystemError::FileNotOpen)?;
            let mut buf = vec![0u8; read_len(handle, *len)];
            let n = fs.read(handle, &mut buf)?;
            println!("📖 {} bytes from {}:", n, name.cyan());
            println!("{}", String::from_utf8_lossy(&buf[..n]));
        }
        Command::Write(name, content) => {
            let Session { fs, handles, .. } = session;
            let handle = handles.get_mut(name).ok_or(FileSystemError::FileNotOpen)?;
            match fs.write(handle, content.as_bytes()) {
                Ok(n) => println!("✏️  Wrote {} bytes to {}", n, name.cyan()),
                Err(short) => {
                    println!(
                        "{} only {} of {} bytes written",
                        "⚠️".yellow(),
                        short.written,
                        content.len()
                    );
                    return Err(Box::new(short));
                }
            }
        }
        Command::Seek(name, pos) => {
            let Session { fs, handles, .. } = session;
            let handle = handles.get_mut(name).ok_or(FileSystemError::FileNotOpen)?;
            fs.seek(handle, *pos)?;
            println!("📍 {} at {} of {} bytes", name.cyan(), pos, handle.len());
        }
        Command::Stat(name) => {
            let open = session
                .handles
                .get(name)
                .map(|h| (h.len(), Some(h.position()), h.mode()));
            let (size, position, mode) = match open {
                Some(info) => info,
                None => {
                    let size = session
                        .fs
                        .list()?
                        .into_iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, size)| size)
                        .ok_or_else(|| FileSystemError::FileNotFound(name.clone()))?;
                    (size, None, None)
                }
            };
            println!("{}", "📊 File Info".bright_yellow().bold());
            println!("{}: {}", "Name".blue(), name);
            println!("{}: {} bytes", "Size".blue(), size);
            println!("{}: {}", "State".blue(), mode_label(mode));
            if let Some(position) = position {
                println!("{}: {}", "Cursor".blue(), position);
            }
        }
        Command::Rm(name) => {
            session.fs.delete(name)?;
            println!("❌ Deleted file: {}", name.red());
        }
        Command::Exists(name) => {
            if session.fs.exists(name)? {
                println!("✅ {} exists", name.green());
            } else {
                println!("🚫 {} does not exist", name.red());
            }
        }
        Command::Format => {
            let confirmed = Confirm::new()
                .with_prompt("Format the volume? Every file will be erased")
                .default(false)
                .interact()?;
            if !confirmed {
                println!("{}", "Format cancelled".bright_black());
                return Ok(());
            }
            session.close_all();
            let options = VolumeOptions {
                force_format: true,
                ..session.options.clone()
            };
            let mut bar = None;
            session.fs = open_volume(&options, |p| boot_progress(&mut bar, p))?;
            finish_progress(bar, "✅ Disk formatted successfully!");
        }
        Command::Exit => {
            session.close_all();
            println!("{}", "👋 Exiting flatfs shell...".yellow().bold());
        }
    }

    Ok(())
}

/// Bytes a `read` asks for: what the user requested, never more than what
/// is left before end of file.
fn read_len(handle: &FileHandle, requested: Option<usize>) -> usize {
    let remaining = handle.len().saturating_sub(handle.position());
    let remaining = usize::try_from(remaining).unwrap_or(usize::MAX);
    requested.map_or(remaining, |n| n.min(remaining))
}

fn print_help() {
    println!("{}", "📘 flatfs Commands".bright_cyan().bold());
    println!(
        "{}",
        "
  ls                   List files (* = open in this shell)
  create <file>        Create a file and open it read-write
  open <file> [ro|rw]  Open a file (default rw)
  close <file>         Close an open file
  write <file> <str>   Write a string at the cursor
  read <file> [n]      Read n bytes (default: to end of file)
  seek <file> <pos>    Move the cursor; past the end grows the file
  stat <file>          Show file info
  rm <file>            Delete a closed file
  exists <file>        Check whether a file exists
  df                   Show volume usage
  format               Erase and format the volume
  help                 Show this help message
  exit                 Close all files and quit
"
        .bright_black()
    );
}
