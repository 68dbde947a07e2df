#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaCommand {
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaCommandError {
    UnrecognizedCommand,
}

/// Lines starting with `.` are handled here instead of by the simulator.
pub fn handle_meta_command(input: &str) -> Result<MetaCommand, MetaCommandError> {
    match input.trim() {
        ".exit" | ".quit" => Ok(MetaCommand::Exit),
        _ => Err(MetaCommandError::UnrecognizedCommand),
    }
}
