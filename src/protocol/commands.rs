//! Command type and its two textual encodings: the wire request line and
//! the on-disk WAL record line.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

fn arg_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9*/_]+$").expect("static regex is valid"))
}

/// The three operations the executor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Get,
    Set,
    Del,
}

impl CommandKind {
    fn as_str(self) -> &'static str {
        match self {
            CommandKind::Get => "GET",
            CommandKind::Set => "SET",
            CommandKind::Del => "DEL",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(CommandKind::Get),
            "SET" => Some(CommandKind::Set),
            "DEL" => Some(CommandKind::Del),
            _ => None,
        }
    }

    fn expected_args(self) -> usize {
        match self {
            CommandKind::Get | CommandKind::Del => 1,
            CommandKind::Set => 2,
        }
    }
}

/// A parsed, validated request: a kind plus its ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub args: Vec<String>,
}

impl Command {
    pub fn key(&self) -> &str {
        &self.args[0]
    }

    pub fn value(&self) -> &str {
        &self.args[1]
    }

    /// Builds a command from a kind and already-tokenized args, validating
    /// arg count and the `[A-Za-z0-9*/_]+` shape of every argument.
    pub fn new(kind: CommandKind, args: Vec<String>) -> Result<Self> {
        let expected = kind.expected_args();
        if args.len() != expected {
            return Err(Error::ArgCountMismatch {
                kind: kind.as_str(),
                expected,
                got: args.len(),
            });
        }

        for arg in &args {
            if !arg_pattern().is_match(arg) {
                return Err(Error::InvalidArg(arg.clone()));
            }
        }

        Ok(Self { kind, args })
    }

    /// Tokenizes a request line (`KIND ARG [ARG]`) into a validated
    /// command. Used both for live client requests and, during WAL
    /// recovery, for re-validating each record.
    pub fn parse_request(line: &str) -> Result<Self> {
        let mut tokens = line.split_whitespace();
        let kind_token = tokens.next().ok_or(Error::EmptyQuery)?;
        let kind = CommandKind::from_str(kind_token)
            .ok_or_else(|| Error::UnknownCommand(kind_token.to_string()))?;
        let args: Vec<String> = tokens.map(str::to_string).collect();
        Command::new(kind, args)
    }

    /// Encodes this command as a WAL record line, without a trailing
    /// newline: `"<KIND>;arg1,arg2"`.
    pub fn to_wal_line(&self) -> String {
        format!("{};{}", self.kind.as_str(), self.args.join(","))
    }

    /// Decodes a WAL record line back into a command, re-validating arg
    /// count and argument shape exactly as a live request would be.
    pub fn parse_wal_line(line: &str) -> Result<Self> {
        let (kind_str, args_str) = line
            .split_once(';')
            .ok_or_else(|| Error::InvalidArg(line.to_string()))?;
        let kind = CommandKind::from_str(kind_str)
            .ok_or_else(|| Error::UnknownCommand(kind_str.to_string()))?;
        let args: Vec<String> = if args_str.is_empty() {
            Vec::new()
        } else {
            args_str.split(',').map(str::to_string).collect()
        };
        Command::new(kind, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_law_set() {
        let cmd = Command::parse_request("SET foo bar").unwrap();
        let line = cmd.to_wal_line();
        assert_eq!(line.matches('\n').count(), 0);
        let back = Command::parse_wal_line(&line).unwrap();
        assert_eq!(cmd, back);
    }

    #[test]
    fn round_trip_law_get_and_del() {
        for line in ["GET foo", "DEL foo"] {
            let cmd = Command::parse_request(line).unwrap();
            let back = Command::parse_wal_line(&cmd.to_wal_line()).unwrap();
            assert_eq!(cmd, back);
        }
    }

    #[test]
    fn get_requires_exactly_one_arg() {
        assert!(Command::parse_request("GET").is_err());
        assert!(Command::parse_request("GET a b").is_err());
    }

    #[test]
    fn set_requires_exactly_two_args() {
        assert!(Command::parse_request("SET k").is_err());
        assert!(Command::parse_request("SET k v extra").is_err());
    }

    #[test]
    fn rejects_args_outside_allowed_charset() {
        assert!(Command::parse_request("SET k! v").is_err());
    }

    #[test]
    fn unknown_command_is_an_error() {
        assert!(matches!(
            Command::parse_request("FOO a"),
            Err(Error::UnknownCommand(_))
        ));
    }

    #[test]
    fn empty_line_is_an_error() {
        assert!(matches!(Command::parse_request(""), Err(Error::EmptyQuery)));
        assert!(matches!(
            Command::parse_request("   "),
            Err(Error::EmptyQuery)
        ));
    }
}
