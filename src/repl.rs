//! Interactive read-eval-print loop.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use crate::bytecode::disassemble_bytecode;
use crate::error::{GotienError, ParseErrors};
use crate::session::Session;

const HISTORY_FILE: &str = ".gotien_history";

pub const PROMPT: &str = ">> ";
pub const CONTINUATION_PROMPT: &str = ".. ";

const GOTIEN: &str = r"                 __,__
                GoTien
               ╭──────────────╮
               │   ▄───▄      │
         ╭─────┴──────────────┴────╮
         │     ╭────────────╮      │
         │     │   ▄────▄   │      │
   ╭─────┴─────┴────────────┴──────┴─────╮
   │         ╭────────────────╮          │
   │         │   ▄──────▄     │          │
   │         │   █      █     │          │
   │         │   █      █     │          │
   │         │   █▄▄▄▄▄▄█     │          │
   ╰─────────────────────────────────────╯
";

/// What the loop should do after handling one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

pub struct Repl<R, W> {
    input: R,
    output: W,
    session: Session,
    history: Vec<String>,
    history_file: Option<PathBuf>,
    multiline_buffer: String,
    brace_balance: i32,
}

impl Repl<io::StdinLock<'static>, io::Stdout> {
    /// A REPL on stdin/stdout with history persisted in the home directory.
    pub fn stdio() -> Self {
        let mut repl = Self::new(io::stdin().lock(), io::stdout());
        repl.history_file = Some(history_path());
        repl.load_history();
        repl
    }
}

fn history_path() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(HISTORY_FILE),
        None => PathBuf::from(HISTORY_FILE),
    }
}

impl<R: BufRead, W: Write> Repl<R, W> {
    /// A REPL without persisted history.
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            session: Session::new(),
            history: Vec::new(),
            history_file: None,
            multiline_buffer: String::new(),
            brace_balance: 0,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn load_history(&mut self) {
        let Some(path) = &self.history_file else {
            return;
        };
        if let Ok(content) = std::fs::read_to_string(path) {
            self.history.extend(
                content
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .map(str::to_string),
            );
        }
    }

    fn save_history(&self) {
        let Some(path) = &self.history_file else {
            return;
        };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = std::fs::write(path, self.history.join("\n"));
    }

    /// Read lines until end of input or an exit command.
    pub fn run(&mut self) -> io::Result<()> {
        loop {
            let prompt = if self.is_multiline() {
                CONTINUATION_PROMPT
            } else {
                PROMPT
            };
            write!(self.output, "{}", prompt)?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                break;
            }
            let line = line.trim_end_matches(['\n', '\r']);

            if self.handle_line(line)? == Flow::Exit {
                break;
            }
        }
        self.save_history();
        Ok(())
    }

    fn is_multiline(&self) -> bool {
        !self.multiline_buffer.is_empty()
    }

    fn handle_line(&mut self, line: &str) -> io::Result<Flow> {
        if self.is_multiline() {
            self.multiline_buffer.push('\n');
            self.multiline_buffer.push_str(line);
            self.brace_balance += count_braces(line);
            if self.brace_balance <= 0 {
                let code = std::mem::take(&mut self.multiline_buffer);
                self.brace_balance = 0;
                self.history.push(history_entry(&code));
                self.execute(&code)?;
            }
            return Ok(Flow::Continue);
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Flow::Continue);
        }

        let balance = count_braces(line);
        if balance > 0 && !trimmed.starts_with('.') {
            self.multiline_buffer = line.to_string();
            self.brace_balance = balance;
            return Ok(Flow::Continue);
        }

        self.history.push(trimmed.to_string());
        if trimmed == "exit" || trimmed == ".exit" {
            return Ok(Flow::Exit);
        }
        if trimmed.starts_with('.') {
            self.handle_dot_command(trimmed)?;
            return Ok(Flow::Continue);
        }

        self.execute(line)?;
        Ok(Flow::Continue)
    }

    fn handle_dot_command(&mut self, line: &str) -> io::Result<()> {
        let (command, argument) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match (command, argument) {
            (".help", _) => self.cmd_help(),
            (".vars", _) => self.cmd_vars(),
            (".history", _) => self.cmd_history(),
            (".clear", _) => self.cmd_clear(),
            (".load", "") => writeln!(self.output, "Usage: .load <file>"),
            (".load", path) => self.cmd_load(Path::new(path)),
            (".bytecode", "") => writeln!(self.output, "Usage: .bytecode <code>"),
            (".bytecode", code) => self.cmd_bytecode(code),
            _ => writeln!(
                self.output,
                "Unknown command: {}. Type .help for available commands.",
                command
            ),
        }
    }

    fn cmd_help(&mut self) -> io::Result<()> {
        writeln!(self.output, "GoTien REPL Commands")?;
        writeln!(self.output)?;
        writeln!(self.output, ".help            - Show this help message")?;
        writeln!(self.output, ".vars            - List global bindings")?;
        writeln!(self.output, ".history         - Show command history")?;
        writeln!(self.output, ".clear           - Reset the session")?;
        writeln!(self.output, ".load <file>     - Load and execute a file")?;
        writeln!(self.output, ".bytecode <code> - Show the bytecode for code")?;
        writeln!(self.output, "exit / Ctrl+D    - Exit the REPL")
    }

    fn cmd_vars(&mut self) -> io::Result<()> {
        let bindings = self.session.global_bindings();
        if bindings.is_empty() {
            return writeln!(self.output, "No variables defined.");
        }
        writeln!(self.output, "Variables:")?;
        for (name, value) in bindings {
            writeln!(self.output, "  {} = {}", name, value)?;
        }
        Ok(())
    }

    fn cmd_history(&mut self) -> io::Result<()> {
        writeln!(self.output, "History:")?;
        for (i, entry) in self.history.iter().enumerate() {
            writeln!(self.output, "{:4}  {}", i + 1, entry)?;
        }
        Ok(())
    }

    fn cmd_clear(&mut self) -> io::Result<()> {
        self.session.reset();
        writeln!(self.output, "Session reset.")
    }

    fn cmd_load(&mut self, path: &Path) -> io::Result<()> {
        match std::fs::read_to_string(path) {
            Ok(source) => self.execute(&source),
            Err(err) => writeln!(self.output, "Error: {}: {}", path.display(), err),
        }
    }

    fn cmd_bytecode(&mut self, code: &str) -> io::Result<()> {
        match self.session.compile(code) {
            Ok(bytecode) => write!(self.output, "{}", disassemble_bytecode(&bytecode)),
            Err(err) => self.report(&err),
        }
    }

    fn execute(&mut self, source: &str) -> io::Result<()> {
        match self.session.eval(source) {
            Ok(value) => writeln!(self.output, "{}", value),
            Err(err) => self.report(&err),
        }
    }

    fn report(&mut self, err: &GotienError) -> io::Result<()> {
        match err {
            GotienError::Parse(errors) => print_parser_errors(&mut self.output, errors),
            GotienError::Compile(err) => {
                writeln!(self.output, "Woops! Compilation failed:\n {}", err)
            }
            GotienError::Runtime(err) => {
                writeln!(self.output, "Woops! Executing bytecode failed:\n {}", err)
            }
            GotienError::Io(err) => writeln!(self.output, "Error: {}", err),
        }
    }
}

fn print_parser_errors<W: Write>(out: &mut W, errors: &ParseErrors) -> io::Result<()> {
    write!(out, "{}", GOTIEN)?;
    writeln!(out, "Oh no... an ancient mist has clouded your code.")?;
    writeln!(out, " parser errors:")?;
    for err in errors.iter() {
        writeln!(out, "\t{}", err)?;
    }
    Ok(())
}

/// A multi-line entry folded onto one line, so the history file keeps one
/// entry per line.
fn history_entry(code: &str) -> String {
    code.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Net count of `{` over `}` outside string literals.
fn count_braces(s: &str) -> i32 {
    let mut balance = 0;
    let mut in_string = false;
    let mut escaped = false;

    for c in s.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else if c == '{' {
            balance += 1;
        } else if c == '}' {
            balance -= 1;
        }
    }
    balance
}

/// Run the REPL on stdin/stdout.
pub fn start() -> io::Result<()> {
    println!("Hello! This is the GoTien programming language!");
    println!("Feel free to type in commands. Type .help for available commands.");
    Repl::stdio().run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn run_repl(input: &str) -> String {
        let mut repl = Repl::new(Cursor::new(input.to_string()), Vec::new());
        repl.run().unwrap();
        String::from_utf8(repl.into_output()).unwrap()
    }

    #[test]
    fn test_count_braces() {
        assert_eq!(count_braces("fn(x) {"), 1);
        assert_eq!(count_braces("{ {} }"), 0);
        assert_eq!(count_braces(r#"puts("{")"#), 0);
        assert_eq!(count_braces(r#""\"{" }"#), -1);
    }

    #[test]
    fn test_globals_persist_across_lines() {
        let output = run_repl("let a = 10;\na * 2;\n");
        assert_eq!(output, ">> 10\n>> 20\n>> ");
    }

    #[test]
    fn test_error_does_not_erase_bindings() {
        let output = run_repl("let a = 10;\nb;\na;\n");
        assert!(output.contains("Woops! Compilation failed:\n undefined variable b"));
        assert!(output.ends_with(">> 10\n>> "));
    }

    #[test]
    fn test_runtime_error_message() {
        let output = run_repl("1 + true;\n");
        assert!(output.contains(
            "Woops! Executing bytecode failed:\n unsupported types for binary operation: INTEGER BOOLEAN"
        ));
    }

    #[test]
    fn test_parser_errors_banner() {
        let output = run_repl("let x 5;\n");
        assert!(output.contains("Oh no... an ancient mist has clouded your code.\n"));
        assert!(output.contains(" parser errors:\n\texpected next token to be"));
    }

    #[test]
    fn test_multiline_input() {
        let output = run_repl("let add = fn(a, b) {\n  a + b\n};\nadd(1, 2)\n");
        assert!(output.starts_with(">> .. .. Closure["));
        assert!(output.ends_with("]\n>> 3\n>> "));
    }

    #[test]
    fn test_multiline_entry_recorded_in_history() {
        let mut repl = Repl::new(
            Cursor::new("let add = fn(a, b) {\n  a + b\n};\nadd(1, 2)\n.history\n".to_string()),
            Vec::new(),
        );
        repl.run().unwrap();
        assert_eq!(
            repl.history,
            vec![
                "let add = fn(a, b) { a + b };".to_string(),
                "add(1, 2)".to_string(),
                ".history".to_string(),
            ]
        );
        let output = String::from_utf8(repl.into_output()).unwrap();
        assert!(output.contains("   1  let add = fn(a, b) { a + b };\n   2  add(1, 2)\n"));
    }

    #[test]
    fn test_exit_stops_reading() {
        let output = run_repl("1\nexit\n2\n");
        assert_eq!(output, ">> 1\n>> ");
    }

    #[test]
    fn test_vars_and_clear() {
        let output = run_repl("let a = 1;\nlet b = \"two\";\n.vars\n.clear\n.vars\n");
        assert!(output.contains("Variables:\n  a = 1\n  b = two\n"));
        assert!(output.contains("Session reset.\n>> No variables defined.\n"));
    }

    #[test]
    fn test_bytecode_command() {
        let output = run_repl(".bytecode 1 + 2\n");
        assert!(output.contains("OpConstant 0"));
        assert!(output.contains("OpAdd"));
        // Disassembly does not commit anything.
        let output = run_repl(".bytecode let a = 1;\na\n");
        assert!(output.contains("undefined variable a"));
    }

    #[test]
    fn test_history_and_unknown_command() {
        let output = run_repl("1\n.nope\n.history\n");
        assert!(output.contains("Unknown command: .nope."));
        assert!(output.contains("   1  1\n   2  .nope\n   3  .history\n"));
    }

    #[test]
    fn test_load_missing_file() {
        let output = run_repl(".load /nonexistent/file.gt\n");
        assert!(output.contains("Error: /nonexistent/file.gt:"));
    }
}
