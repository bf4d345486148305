use serde::Deserialize;
use tokio::process::Command;

/// Interpreter that runs each command; the command text goes after `args`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShellConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ShellConfig {
    #[cfg(windows)]
    fn default() -> Self {
        Self {
            program: "powershell.exe".to_string(),
            args: vec![
                "-NoProfile".to_string(),
                "-ExecutionPolicy".to_string(),
                "Bypass".to_string(),
                "-Command".to_string(),
            ],
        }
    }

    #[cfg(not(windows))]
    fn default() -> Self {
        Self {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string()],
        }
    }
}

impl ShellConfig {
    pub fn command_line(&self, command: &str) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line.push_str(" \"");
        line.push_str(&escape_double_quotes(command));
        line.push('"');
        line
    }

    pub(super) fn build(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        append_command(&mut cmd, command);
        cmd
    }
}

/// Prefixes every `"` with a backslash so the command survives being wrapped in quotes.
pub fn escape_double_quotes(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch == '"' {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

// Windows hands the child a single command line, so the command is quoted there.
#[cfg(windows)]
fn append_command(cmd: &mut Command, command: &str) {
    cmd.raw_arg(format!("\"{}\"", escape_double_quotes(command)));
}

#[cfg(not(windows))]
fn append_command(cmd: &mut Command, command: &str) {
    cmd.arg(command);
}
