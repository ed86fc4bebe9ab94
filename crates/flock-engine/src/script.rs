//! Command-script classification.
//!
//! Each line is matched by substring against a fixed keyword order and the
//! first match wins:
//!
//! `//`, `scan`, `>`, `battery_check`, `delay`, `correct_ip`, `=`, `sync`,
//! `read_pad`, `poly`, the shape names, `home`, `frame`.
//!
//! The order matters: `1>up 20=fast` is a target command because `>` is
//! tested before `=`. Lines matching nothing are ignored. Arguments are the
//! text after the first occurrence of the keyword.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use flock_formation::{Convention, Shape, Vec3};

use crate::error::{Result, SwarmError};

/// Which nodes a target command addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Targets {
    /// `*`: every known node.
    All,
    /// A 1-based script id.
    One(usize),
}

/// One classified script line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Comment(String),
    Scan(usize),
    Target { targets: Targets, action: String },
    BatteryCheck(i64),
    Delay(Duration),
    CorrectIp,
    /// Bind 1-based `id` to `serial`.
    Assign { id: usize, serial: String },
    Sync(Duration),
    ReadPad,
    Poly(u32),
    Formation(Shape),
    Home(Vec3),
    Frame(Convention),
}

/// A command script, read once into lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    lines: Vec<String>,
}

impl Script {
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    /// Lines with their 1-based line numbers.
    pub fn lines(&self) -> impl Iterator<Item = (usize, &str)> {
        self.lines.iter().enumerate().map(|(i, l)| (i + 1, l.as_str()))
    }
}

/// Classify one line. `Ok(None)` for blank and unrecognized lines.
pub fn classify(line_no: usize, line: &str) -> Result<Option<Command>> {
    let line = line.trim_end();
    if line.trim().is_empty() {
        return Ok(None);
    }
    let p = Parser { line_no, line };

    let command = if line.contains("//") {
        Command::Comment(line.to_string())
    } else if line.contains("scan") {
        Command::Scan(p.arg("scan")?)
    } else if line.contains('>') {
        p.target()?
    } else if line.contains("battery_check") {
        Command::BatteryCheck(p.arg("battery_check")?)
    } else if line.contains("delay") {
        Command::Delay(p.seconds("delay")?)
    } else if line.contains("correct_ip") {
        Command::CorrectIp
    } else if line.contains('=') {
        p.assign()?
    } else if line.contains("sync") {
        Command::Sync(p.seconds("sync")?)
    } else if line.contains("read_pad") {
        Command::ReadPad
    } else if line.contains("poly") {
        Command::Poly(p.arg("poly")?)
    } else if let Some(shape) = Shape::ALL.into_iter().find(|s| line.contains(s.name())) {
        Command::Formation(shape)
    } else if line.contains("home") {
        p.home()?
    } else if line.contains("frame") {
        let raw = p.after("frame");
        Command::Frame(raw.parse().map_err(|e| p.error(format!("{e}")))?)
    } else {
        return Ok(None);
    };
    Ok(Some(command))
}

struct Parser<'a> {
    line_no: usize,
    line: &'a str,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: impl Into<String>) -> SwarmError {
        SwarmError::Parse {
            line: self.line_no,
            text: self.line.to_string(),
            reason: reason.into(),
        }
    }

    /// Text after the first occurrence of `sep`.
    fn after(&self, sep: &str) -> &'a str {
        self.line
            .split_once(sep)
            .map_or("", |(_, rest)| rest)
            .trim()
    }

    /// Text before the first occurrence of `sep`.
    fn before(&self, sep: char) -> &'a str {
        self.line.split_once(sep).map_or("", |(head, _)| head).trim()
    }

    fn arg<T: FromStr>(&self, keyword: &str) -> Result<T> {
        let raw = self.after(keyword);
        raw.parse()
            .map_err(|_| self.error(format!("invalid argument {raw:?} for {keyword}")))
    }

    fn seconds(&self, keyword: &str) -> Result<Duration> {
        let secs: f64 = self.arg(keyword)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|_| self.error(format!("{keyword} needs a non-negative duration")))
    }

    fn target(&self) -> Result<Command> {
        let id = self.before('>');
        let targets = if id == "*" {
            Targets::All
        } else {
            Targets::One(
                id.parse()
                    .map_err(|_| self.error(format!("invalid target id {id:?}")))?,
            )
        };
        let action = self.after(">");
        if action.is_empty() {
            return Err(self.error("missing action"));
        }
        Ok(Command::Target {
            targets,
            action: action.to_string(),
        })
    }

    fn assign(&self) -> Result<Command> {
        let id = self.before('=');
        let id = id
            .parse()
            .map_err(|_| self.error(format!("invalid id {id:?}")))?;
        let serial = self.after("=");
        if serial.is_empty() {
            return Err(self.error("missing serial"));
        }
        Ok(Command::Assign {
            id,
            serial: serial.to_string(),
        })
    }

    fn home(&self) -> Result<Command> {
        let coords: Vec<f64> = self
            .after("home")
            .split_whitespace()
            .map(str::parse::<f64>)
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| self.error("home needs three numbers"))?;
        match coords.as_slice() {
            [x, y, z] => Ok(Command::Home(Vec3::new(*x, *y, *z))),
            _ => Err(self.error("home needs three numbers")),
        }
    }
}
