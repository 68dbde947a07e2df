use std::io::{self, BufRead, Write};

use log::debug;
use process_manager::ProcessError;

use crate::command::{Command, HELP};
use crate::meta_commands::{handle_meta_command, MetaCommand};
use crate::Simulator;

pub const PROMPT: &str = "vmsim> ";

pub struct REPL<R: BufRead> {
    input: R,
}

impl<R: BufRead> REPL<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    /// Next trimmed line, or `None` at end of input.
    pub fn read_line(&mut self) -> Result<Option<String>, io::Error> {
        let mut buffer = String::new();
        if self.input.read_line(&mut buffer)? == 0 {
            return Ok(None);
        }
        Ok(Some(buffer.trim().to_string()))
    }

    /// Reads commands until `.exit` or end of input.
    pub fn run<W: Write, const F: usize, const P: usize, const M: usize>(
        &mut self,
        out: &mut W,
        simulator: &mut Simulator<F, P, M>,
    ) -> Result<(), io::Error> {
        loop {
            write!(out, "{}", PROMPT)?;
            out.flush()?;
            let line = match self.read_line()? {
                Some(line) => line,
                None => break,
            };
            if line.is_empty() {
                continue;
            }
            if line.starts_with('.') {
                match handle_meta_command(&line) {
                    Ok(MetaCommand::Exit) => break,
                    Err(_) => {
                        writeln!(out, "Unrecognized command '{}'", line)?;
                        continue;
                    }
                }
            }
            debug!("command: {}", line);
            match line.parse::<Command>() {
                Ok(command) => writeln!(out, "{}", execute(simulator, command))?,
                Err(err) => writeln!(out, "error: {}", err)?,
            }
        }
        Ok(())
    }
}

fn report(err: ProcessError) -> String {
    match err {
        ProcessError::Fault(fault) => format!("{}: {}", fault.kind(), fault),
        other => format!("error: {}", other),
    }
}

/// Runs one command and renders its outcome. Failures are part of the
/// output, never fatal.
pub fn execute<const F: usize, const P: usize, const M: usize>(
    simulator: &mut Simulator<F, P, M>,
    command: Command,
) -> String {
    match command {
        Command::Translate {
            pid,
            address,
            is_write,
        } => match simulator.translate(pid, address, is_write) {
            Ok(pa) => format!("0x{:08X} -> {}", address, pa),
            Err(err) => report(err),
        },
        Command::Write { pid, address } => match simulator.write(pid, address) {
            Ok(pa) => format!("0x{:08X} -> {} (write)", address, pa),
            Err(err) => report(err),
        },
        Command::Fork { pid } => match simulator.fork(pid) {
            Ok(child) => format!("forked {} -> {}", pid, child),
            Err(err) => report(err.into()),
        },
        Command::Exit { pid } => match simulator.exit(pid) {
            Ok(released) => format!("process {} exited, {} frame(s) released", pid, released),
            Err(err) => report(err),
        },
        Command::Spawn => match simulator.create_process() {
            Ok(pid) => format!("created process {}", pid),
            Err(err) => report(err),
        },
        Command::Map { pid, vpn, writable } => match simulator.map_new_page(pid, vpn, writable) {
            Ok(frame) => format!("page {} of process {} -> frame {}", vpn, pid, frame),
            Err(err) => report(err),
        },
        Command::Ps => {
            let mut lines = vec![String::from("PID  | Pages")];
            for process in simulator.processes().iter() {
                lines.push(format!("{:<4} | {}", process.pid(), process.pages().count()));
            }
            lines.join("\n")
        }
        Command::PageTable { pid } => match simulator.dump(pid) {
            Some(dump) => dump.to_string(),
            None => report(ProcessError::NoSuchProcess { pid }),
        },
        Command::Frames => simulator.frames().to_string(),
        Command::Help => HELP.to_string(),
    }
}
