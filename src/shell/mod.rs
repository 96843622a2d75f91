pub mod command;
pub mod parse;

use crate::shell::{
    command::{execute_command, Command, Session},
    parse::parse_command,
};
use colored::*;
use crossterm::{
    cursor, execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use flatfs::disk::init::{open_volume, BootProgress, VolumeOptions};
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use reedline::{
    DefaultCompleter, DefaultPrompt, DefaultPromptSegment, FileBackedHistory, Reedline, Signal,
};
use std::{io::stdout, path::PathBuf};

const COMMANDS: [&str; 15] = [
    "help", "ls", "df", "create", "open", "close", "read", "write", "seek", "stat", "rm",
    "exists", "format", "exit", "quit",
];

/// Feeds boot milestones to the terminal, drawing a bar while formatting.
pub fn boot_progress(bar: &mut Option<ProgressBar>, progress: BootProgress) {
    match progress {
        BootProgress::Step(msg) => println!("{}", msg),
        BootProgress::Formatting { done, total } => {
            let pb = bar.get_or_insert_with(|| {
                let pb = ProgressBar::new(total);
                pb.set_style(
                    ProgressStyle::with_template("[{bar:40.green/black}] {pos:>5}/{len} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("#>-"),
                );
                pb
            });
            pb.set_position(done);
        }
    }
}

pub fn finish_progress(bar: Option<ProgressBar>, msg: &'static str) {
    if let Some(pb) = bar {
        pb.finish_with_message(msg);
    }
}

pub fn start_shell(options: VolumeOptions) {
    boot_banner();

    let mut bar = None;
    let fs = match open_volume(&options, |p| boot_progress(&mut bar, p)) {
        Ok(fs) => fs,
        Err(e) => {
            println!(
                "{} cannot bring up {}: {}",
                "❌ Error:".red().bold(),
                options.path.display(),
                e
            );
            return;
        }
    };
    finish_progress(bar, "✅ Ready!");
    let mut session = Session::new(fs, options);

    let username = whoami::username();
    let hostname = whoami::devicename();

    println!(
        "{}",
        "Type 'help' for available commands. Use ↑↓ for history.\n".bright_black()
    );

    let history_path = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".flatfs_history");

    let mut line_editor = Reedline::create();
    match FileBackedHistory::with_file(100, history_path) {
        Ok(history) => line_editor = line_editor.with_history(Box::new(history)),
        Err(e) => warn!("command history disabled: {}", e),
    }

    let completer = DefaultCompleter::new_with_wordlen(
        COMMANDS.iter().map(|c| c.to_string()).collect(),
        2,
    );
    line_editor = line_editor.with_completer(Box::new(completer));

    let prompt = DefaultPrompt::new(
        DefaultPromptSegment::Basic(format!("{}@{}", username, hostname)),
        DefaultPromptSegment::Basic("flatfs".to_string()),
    );

    loop {
        match line_editor.read_line(&prompt) {
            Ok(Signal::Success(buffer)) => {
                let trimmed = buffer.trim();
                if trimmed.is_empty() {
                    continue;
                }

                match parse_command(trimmed) {
                    Some(cmd) => {
                        if let Err(e) = execute_command(&cmd, &mut session) {
                            println!("{} {}", "❌ Error:".red().bold(), e);
                        }
                        if matches!(cmd, Command::Exit) {
                            println!("{}", "👋 Bye!".bright_yellow());
                            return;
                        }
                    }
                    None => println!(
                        "{}",
                        "⚠️  Unknown command. Type 'help' for command list.".yellow()
                    ),
                }
            }
            Ok(Signal::CtrlD) => {
                println!("{}", "Exiting flatfs...".yellow());
                break;
            }
            Ok(_) => {
                // Ctrl-C clears the line
                println!();
                continue;
            }
            Err(e) => {
                println!("Error reading line: {}", e);
                break;
            }
        }
    }

    session.close_all();
    println!("{}", "GoodBye!".bright_yellow());
}

fn boot_banner() {
    let mut stdout = stdout();
    let _ = execute!(
        stdout,
        Clear(ClearType::All),
        cursor::MoveTo(0, 0),
        SetForegroundColor(Color::Cyan),
        Print(format!("flatfs v{}\n", env!("CARGO_PKG_VERSION"))),
        ResetColor
    );
    println!("{}", "[flatfs booting...]".bright_yellow().bold());
}
