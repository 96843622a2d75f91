use flatfs::AccessMode;

use crate::shell::command::Command;

fn parse_mode(token: Option<&&str>) -> Option<AccessMode> {
    match token.copied() {
        None | Some("rw") | Some("w") => Some(AccessMode::ReadWrite),
        Some("ro") | Some("r") => Some(AccessMode::ReadOnly),
        Some(_) => None,
    }
}

pub fn parse_command(input: &str) -> Option<Command> {
    let tokens: Vec<&str> = input.trim().split_ascii_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }

    let cmd = tokens[0];
    let args = &tokens[1..];
    let name = || args.first().map(|s| s.to_string());

    match cmd {
        "help" => Some(Command::Help),
        "ls" => Some(Command::Ls),
        "df" => Some(Command::Df),
        "create" => name().map(Command::Create),
        "open" => Some(Command::Open(name()?, parse_mode(args.get(1))?)),
        "close" => name().map(Command::Close),
        "read" => {
            let len = match args.get(1) {
                Some(n) => Some(n.parse().ok()?),
                None => None,
            };
            Some(Command::Read(name()?, len))
        }
        "write" => {
            if args.len() >= 2 {
                Some(Command::Write(args[0].to_string(), args[1..].join(" ")))
            } else {
                None
            }
        }
        "seek" => Some(Command::Seek(name()?, args.get(1)?.parse().ok()?)),
        "stat" => name().map(Command::Stat),
        "rm" => name().map(Command::Rm),
        "exists" => name().map(Command::Exists),
        "format" => Some(Command::Format),
        "exit" | "quit" => Some(Command::Exit),
        _ => None,
    }
}
