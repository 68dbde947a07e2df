use std::str::FromStr;

use thiserror::Error;

use process_manager::Pid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unrecognized command '{0}'")]
    UnrecognizedCommand(String),
    #[error("missing argument <{0}>")]
    MissingArgument(&'static str),
    #[error("'{0}' is not a number")]
    InvalidNumber(String),
    #[error("'{0}' is not an access mode")]
    InvalidMode(String),
    #[error("unexpected argument '{0}'")]
    TrailingArgument(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `translate <pid> <addr> [r|w]`
    Translate {
        pid: Pid,
        address: u32,
        is_write: bool,
    },
    /// `write <pid> <addr>`, resolving copy-on-write
    Write { pid: Pid, address: u32 },
    Fork { pid: Pid },
    Exit { pid: Pid },
    Spawn,
    /// `map <pid> <vpn> [ro|rw]`
    Map { pid: Pid, vpn: u32, writable: bool },
    Ps,
    PageTable { pid: Pid },
    Frames,
    Help,
}

pub const HELP: &str = "\
translate <pid> <addr> [r|w]  walk the page tables of <pid>
write <pid> <addr>            write access, copying shared pages
fork <pid>                    fork <pid> with copy-on-write
exit <pid>                    tear down <pid> and release its frames
spawn                         create an empty process
map <pid> <vpn> [ro|rw]       map <vpn> of <pid> to a free frame
ps                            list processes
pt <pid>                      print the page table of <pid>
frames                        print frames in use
.exit                         leave";

/// Accepts `0x`-prefixed hexadecimal or decimal.
pub fn parse_number(token: &str) -> Result<u32, CommandError> {
    let parsed = match token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => token.parse(),
    };
    parsed.map_err(|_| CommandError::InvalidNumber(token.to_string()))
}

struct Arguments<'a> {
    tokens: std::str::SplitWhitespace<'a>,
}

impl<'a> Arguments<'a> {
    fn number(&mut self, name: &'static str) -> Result<u32, CommandError> {
        let token = self.tokens.next().ok_or(CommandError::MissingArgument(name))?;
        parse_number(token)
    }

    fn optional(&mut self) -> Option<&'a str> {
        self.tokens.next()
    }

    fn finish(mut self) -> Result<(), CommandError> {
        match self.tokens.next() {
            Some(extra) => Err(CommandError::TrailingArgument(extra.to_string())),
            None => Ok(()),
        }
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut tokens = line.split_whitespace();
        let name = tokens.next().ok_or(CommandError::Empty)?;
        let mut args = Arguments { tokens };
        let command = match name {
            "translate" | "t" => {
                let pid = args.number("pid")?;
                let address = args.number("addr")?;
                let is_write = match args.optional() {
                    None | Some("r") => false,
                    Some("w") => true,
                    Some(other) => return Err(CommandError::InvalidMode(other.to_string())),
                };
                Command::Translate {
                    pid,
                    address,
                    is_write,
                }
            }
            "write" | "w" => Command::Write {
                pid: args.number("pid")?,
                address: args.number("addr")?,
            },
            "fork" => Command::Fork {
                pid: args.number("pid")?,
            },
            "exit" | "kill" => Command::Exit {
                pid: args.number("pid")?,
            },
            "spawn" => Command::Spawn,
            "map" => {
                let pid = args.number("pid")?;
                let vpn = args.number("vpn")?;
                let writable = match args.optional() {
                    None | Some("rw") => true,
                    Some("ro") => false,
                    Some(other) => return Err(CommandError::InvalidMode(other.to_string())),
                };
                Command::Map { pid, vpn, writable }
            }
            "ps" => Command::Ps,
            "pt" => Command::PageTable {
                pid: args.number("pid")?,
            },
            "frames" => Command::Frames,
            "help" => Command::Help,
            other => return Err(CommandError::UnrecognizedCommand(other.to_string())),
        };
        args.finish()?;
        Ok(command)
    }
}
