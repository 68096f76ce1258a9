// This module models compiler diagnostics and decides whether an invocation succeeded. It has
// two halves. The parser turns raw toolchain output into Diagnostic values, accepting the
// `file(line,col): error CODE: message` form (with optional range suffixes), the
// `file:line:col: error: message` form, and location-less `error CODE: message` lines; any
// other non-blank line continues the previous diagnostic or, at the start of the output,
// becomes an informational one so no toolchain text is lost. The classifier declares failure
// when any diagnostic is an error, the exit status is non-zero, or no unit was produced, and
// renders the failure report from every diagnostic in emission order, falling back to a
// synthetic exit-code line when the toolchain printed nothing.

//! Diagnostics and success/failure classification.

use std::fmt;

use crate::toolchain::{Invocation, UnitHandle};

/// Severity of a toolchain diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    /// Map a toolchain severity word, ignoring case.
    pub fn from_word(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "error" => Some(Severity::Error),
            "warning" => Some(Severity::Warning),
            "info" | "information" | "note" => Some(Severity::Info),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where in the source a diagnostic points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePosition {
    pub file: Option<String>,
    pub line: u32,
    pub column: u32,
}

/// One message emitted by the compiler toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<String>,
    pub message: String,
    pub position: Option<SourcePosition>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: None,
            message: message.into(),
            position: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn at(mut self, file: Option<&str>, line: u32, column: u32) -> Self {
        self.position = Some(SourcePosition {
            file: file.map(str::to_string),
            line,
            column,
        });
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(position) = &self.position {
            write!(
                f,
                "{}({},{}): ",
                position.file.as_deref().unwrap_or(""),
                position.line,
                position.column
            )?;
        }
        write!(f, "{}", self.severity)?;
        if let Some(code) = &self.code {
            write!(f, " {}", code)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Parse everything a toolchain printed into diagnostics, in order.
pub fn parse_output(text: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for line in text.lines() {
        push_output_line(&mut diagnostics, line);
    }
    diagnostics
}

/// Parse one output line, appending to `diagnostics`.
pub fn push_output_line(diagnostics: &mut Vec<Diagnostic>, line: &str) {
    let line = line.trim_end();
    if line.trim().is_empty() {
        return;
    }

    // An indented line without a location continues the previous diagnostic,
    // even when it starts with a severity word.
    let indented = line.starts_with(char::is_whitespace);
    let allow_bare = !indented || diagnostics.is_empty();
    if let Some(diagnostic) = parse_line(line, allow_bare) {
        diagnostics.push(diagnostic);
        return;
    }

    match diagnostics.last_mut() {
        Some(previous) => {
            previous.message.push('\n');
            previous.message.push_str(line.trim());
        }
        None => diagnostics.push(Diagnostic::new(Severity::Info, line.trim())),
    }
}

fn parse_line(line: &str, allow_bare: bool) -> Option<Diagnostic> {
    if allow_bare {
        if let Some(diagnostic) = parse_body(line.trim_start(), None) {
            return Some(diagnostic);
        }
    }

    let mut search = 0;
    while let Some(offset) = line[search..].find(": ") {
        let split = search + offset;
        if let Some(position) = parse_location(&line[..split]) {
            if let Some(diagnostic) = parse_body(&line[split + 2..], Some(position)) {
                return Some(diagnostic);
            }
        }
        search = split + 2;
    }
    None
}

/// `error FS0039: message` or `error: message`.
fn parse_body(body: &str, position: Option<SourcePosition>) -> Option<Diagnostic> {
    let word_end = body
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(body.len());
    let severity = Severity::from_word(&body[..word_end])?;
    let rest = &body[word_end..];

    let (code, message) = if let Some(message) = rest.strip_prefix(':') {
        (None, message)
    } else {
        let rest = rest.strip_prefix(' ')?;
        let colon = rest.find(':')?;
        let code = rest[..colon].trim();
        if code.is_empty() || code.contains(char::is_whitespace) {
            return None;
        }
        (Some(code.to_string()), &rest[colon + 1..])
    };

    Some(Diagnostic {
        severity,
        code,
        message: message.trim().to_string(),
        position,
    })
}

/// `file(l,c)`, `file(l,c,el,ec)`, `file(l,c)-(el,ec)` or `file:l:c`.
fn parse_location(location: &str) -> Option<SourcePosition> {
    let location = location.trim();

    if location.ends_with(')') {
        let location = match location.find(")-(") {
            Some(idx) => &location[..=idx],
            None => location,
        };
        let open = location.rfind('(')?;
        let numbers: Vec<&str> = location[open + 1..location.len() - 1].split(',').collect();
        if numbers.len() != 2 && numbers.len() != 4 {
            return None;
        }
        let line = numbers[0].trim().parse().ok()?;
        let column = numbers[1].trim().parse().ok()?;
        let file = location[..open].trim();
        return Some(SourcePosition {
            file: (!file.is_empty()).then(|| file.to_string()),
            line,
            column,
        });
    }

    let mut parts = location.rsplitn(3, ':');
    let column = parts.next()?.parse().ok()?;
    let line = parts.next()?.parse().ok()?;
    let file = parts.next()?;
    if file.is_empty() {
        return None;
    }
    Some(SourcePosition {
        file: Some(file.to_string()),
        line,
        column,
    })
}

/// Verdict on one toolchain invocation.
#[derive(Debug)]
pub enum Classification {
    Success(UnitHandle),
    Failure { report: String },
}

impl Classification {
    pub fn is_success(&self) -> bool {
        matches!(self, Classification::Success(_))
    }
}

/// Decide success or failure of an invocation.
pub fn classify(invocation: Invocation) -> Classification {
    let Invocation {
        diagnostics,
        exit_status,
        unit,
    } = invocation;

    let has_errors = diagnostics.iter().any(Diagnostic::is_error);
    match unit {
        Some(unit) if !has_errors && exit_status == 0 => Classification::Success(unit),
        _ => Classification::Failure {
            report: failure_report(&diagnostics, exit_status),
        },
    }
}

/// Render every diagnostic, one per line, in emission order.
pub fn failure_report(diagnostics: &[Diagnostic], exit_status: i32) -> String {
    if diagnostics.is_empty() {
        return if exit_status != 0 {
            format!("Compilation failed with exit code {}.", exit_status)
        } else {
            "Compilation produced no output unit.".to_string()
        };
    }

    let report: Vec<String> = diagnostics.iter().map(Diagnostic::to_string).collect();
    report.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation(diagnostics: Vec<Diagnostic>, exit_status: i32, unit: bool) -> Invocation {
        Invocation {
            diagnostics,
            exit_status,
            unit: unit.then(|| UnitHandle::Image(vec![0x7f])),
        }
    }

    #[test]
    fn test_parse_located_diagnostic() {
        let diags = parse_output(
            "/tmp/calc-1.fsx(3,9): error FS0039: The value or constructor 'y' is not defined.",
        );
        assert_eq!(diags.len(), 1);
        let diag = &diags[0];
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.code.as_deref(), Some("FS0039"));
        assert_eq!(diag.message, "The value or constructor 'y' is not defined.");
        assert_eq!(
            diag.position,
            Some(SourcePosition {
                file: Some("/tmp/calc-1.fsx".to_string()),
                line: 3,
                column: 9,
            })
        );
    }

    #[test]
    fn test_parse_range_and_gnu_forms() {
        let diags = parse_output(
            "a.fsx(1,2)-(1,8): warning FS0064: narrowed\n\
             b.fsx(4,1,4,6): info FS3370: consider this\n\
             src/c.fsx:7:3: error: unexpected token\n",
        );
        assert_eq!(diags.len(), 3);
        assert_eq!(diags[0].severity, Severity::Warning);
        assert_eq!(diags[0].position.as_ref().unwrap().column, 2);
        assert_eq!(diags[1].severity, Severity::Info);
        assert_eq!(diags[1].position.as_ref().unwrap().line, 4);
        assert_eq!(diags[2].code, None);
        assert_eq!(diags[2].position.as_ref().unwrap().file.as_deref(), Some("src/c.fsx"));
        assert_eq!(diags[2].message, "unexpected token");
    }

    #[test]
    fn test_parse_location_less_and_continuations() {
        let diags = parse_output(
            "Compiler banner v1\n\
             error FS0222: Files in libraries must begin with a namespace\n\
             \x20   see the language reference\n\
             \n",
        );
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].severity, Severity::Info);
        assert_eq!(diags[0].message, "Compiler banner v1");
        assert!(diags[1].is_error());
        assert_eq!(
            diags[1].message,
            "Files in libraries must begin with a namespace\nsee the language reference"
        );
    }

    #[test]
    fn test_indented_severity_word_continues_previous() {
        let diags = parse_output(
            "x.fsx(3,1): error FS0001: This expression was expected to have type 'int'\n\
             \x20   note: see declaration of 'count'\n\
             \x20  Warning signs: x\n\
             \x20 y.fsx(9,2): warning FS0064: indented but located\n",
        );
        assert_eq!(diags.len(), 2);
        assert_eq!(
            diags[0].message,
            "This expression was expected to have type 'int'\nnote: see declaration of 'count'\nWarning signs: x"
        );
        assert_eq!(diags[0].code.as_deref(), Some("FS0001"));
        assert_eq!(diags[1].severity, Severity::Warning);
        assert_eq!(diags[1].position.as_ref().unwrap().file.as_deref(), Some("y.fsx"));
    }

    #[test]
    fn test_indented_diagnostic_without_predecessor_still_parses() {
        let diags = parse_output("   error FS0010: Unexpected symbol\n");
        assert_eq!(diags.len(), 1);
        assert!(diags[0].is_error());
        assert_eq!(diags[0].code.as_deref(), Some("FS0010"));
    }

    #[test]
    fn test_display_round_trips_the_message() {
        let diag = Diagnostic::error("Unexpected symbol '=' in expression")
            .with_code("FS0010")
            .at(Some("s.fsx"), 2, 5);
        assert_eq!(
            diag.to_string(),
            "s.fsx(2,5): error FS0010: Unexpected symbol '=' in expression"
        );
        assert_eq!(Diagnostic::warning("careful").to_string(), "warning: careful");
    }

    #[test]
    fn test_classify_success_needs_clean_exit_and_unit() {
        let ok = classify(invocation(vec![Diagnostic::warning("unused")], 0, true));
        assert!(ok.is_success());

        let no_unit = classify(invocation(vec![], 0, false));
        assert!(matches!(
            no_unit,
            Classification::Failure { ref report } if report == "Compilation produced no output unit."
        ));
    }

    #[test]
    fn test_classify_error_diagnostic_fails_even_with_unit() {
        let verdict = classify(invocation(vec![Diagnostic::error("bad")], 0, true));
        match verdict {
            Classification::Failure { report } => assert_eq!(report, "error: bad"),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_exit_code_fallback() {
        let verdict = classify(invocation(vec![], 3, false));
        match verdict {
            Classification::Failure { report } => {
                assert_eq!(report, "Compilation failed with exit code 3.")
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_report_keeps_emission_order() {
        let report = failure_report(
            &[
                Diagnostic::warning("first"),
                Diagnostic::error("second"),
                Diagnostic::new(Severity::Info, "third  "),
            ],
            1,
        );
        assert_eq!(report, "warning: first\nerror: second\ninfo: third");
    }
}
