//! Controller response classification
//!
//! Every line received after the handshake falls into one [`Response`]
//! class. Resend requests are matched against an ordered pattern list, so
//! firmware with its own wording can be supported with
//! [`ResponseParser::with_resend_pattern`].

use std::fmt;
use std::sync::OnceLock;

use printlink_core::{PositionReport, TemperatureReading, TemperatureReport};
use regex::Regex;

const RESEND_PATTERNS: [&str; 2] = [
    r"(?i)^resend\s*:?\s*N?:?\s*(\d+)",
    r"(?i)^rs\s*:?\s*N?:?\s*(\d+)",
];

/// Classified controller line
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Acknowledgement, possibly with a temperature report appended
    Ok {
        /// Temperatures carried on the same line
        temperature: Option<TemperatureReport>,
    },
    /// Request to retransmit from this line number
    Resend(u64),
    /// Looked like a resend request but no line number could be read
    UnparseableResend,
    /// Temperature report
    Temperature(TemperatureReport),
    /// Position report
    Position(PositionReport),
    /// Error reported by the firmware
    Error(String),
    /// Boot banner
    Greeting,
    /// Firmware debug output
    Debug,
    /// Anything else
    Other,
}

impl Response {
    /// Whether this response frees the send credit
    pub fn releases_credit(&self) -> bool {
        matches!(
            self,
            Self::Ok { .. } | Self::Resend(_) | Self::UnparseableResend | Self::Greeting
        )
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok { .. } => write!(f, "ok"),
            Self::Resend(n) => write!(f, "resend:{}", n),
            Self::UnparseableResend => write!(f, "resend:?"),
            Self::Temperature(report) => write!(f, "temperature:{}", report),
            Self::Position(_) => write!(f, "position"),
            Self::Error(msg) => write!(f, "error:{}", msg),
            Self::Greeting => write!(f, "greeting"),
            Self::Debug => write!(f, "debug"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Classifies received lines
#[derive(Debug, Clone)]
pub struct ResponseParser {
    greetings: Vec<String>,
    resend_patterns: Vec<Regex>,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new(vec!["start".to_string(), "Grbl ".to_string()])
    }
}

impl ResponseParser {
    /// Parser recognising the given boot banners
    pub fn new(greetings: Vec<String>) -> Self {
        let resend_patterns = RESEND_PATTERNS
            .iter()
            .map(|p| Regex::new(p).expect("invalid regex pattern"))
            .collect();
        Self {
            greetings,
            resend_patterns,
        }
    }

    /// Add a resend pattern; its first capture group must be the line number.
    /// Patterns are tried in insertion order.
    pub fn with_resend_pattern(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.resend_patterns.push(Regex::new(pattern)?);
        Ok(self)
    }

    /// Whether `line` starts with a configured boot banner
    pub fn is_greeting(&self, line: &str) -> bool {
        self.greetings.iter().any(|g| line.starts_with(g.as_str()))
    }

    /// Any reply that proves the controller is listening
    pub fn is_online_marker(&self, line: &str) -> bool {
        let line = line.trim();
        self.is_greeting(line) || line.starts_with("ok") || line.contains("T:")
    }

    /// Line number of a resend request
    pub fn resend_target(&self, line: &str) -> Option<u64> {
        let line = line.trim();
        for pattern in &self.resend_patterns {
            if let Some(n) = pattern
                .captures(line)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<u64>().ok())
            {
                return Some(n);
            }
        }

        // Loose fallback: first number after the keyword
        line.replace(['N', ':'], " ")
            .split_whitespace()
            .skip(1)
            .find_map(|token| token.parse::<u64>().ok())
    }

    /// Classify one received line
    pub fn classify(&self, line: &str) -> Response {
        let line = line.trim();
        let lower = line.to_ascii_lowercase();

        if lower.starts_with("ok") {
            let temperature = parse_temperature(line);
            return Response::Ok { temperature };
        }

        if lower.starts_with("resend") || lower.starts_with("rs") {
            return match self.resend_target(line) {
                Some(n) => Response::Resend(n),
                None => Response::UnparseableResend,
            };
        }

        if line.starts_with("Error") || line.starts_with("!!") {
            return Response::Error(line.to_string());
        }

        if self.is_greeting(line) {
            return Response::Greeting;
        }

        if line.starts_with("DEBUG_") {
            return Response::Debug;
        }

        if line.contains("T:") || line.contains("B:") {
            if let Some(report) = parse_temperature(line) {
                return Response::Temperature(report);
            }
        }

        if line.starts_with("X:") {
            if let Some(report) = parse_position(line) {
                return Response::Position(report);
            }
        }

        Response::Other
    }
}

/// Extract `T:` / `T0:` / `B:` readings with optional `/target`
pub fn parse_temperature(line: &str) -> Option<TemperatureReport> {
    static TEMPERATURE_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = TEMPERATURE_REGEX.get_or_init(|| {
        Regex::new(r"([TB]\d*):\s*([-+]?\d*\.?\d+)\s*(?:/\s*([-+]?\d*\.?\d+))?")
            .expect("invalid regex pattern")
    });

    let readings: Vec<TemperatureReading> = regex
        .captures_iter(line)
        .filter_map(|c| {
            let sensor = c.get(1)?.as_str().to_string();
            let current = c.get(2)?.as_str().parse::<f64>().ok()?;
            let target = c.get(3).and_then(|m| m.as_str().parse::<f64>().ok());
            Some(TemperatureReading {
                sensor,
                current,
                target,
            })
        })
        .collect();

    if readings.is_empty() {
        None
    } else {
        Some(TemperatureReport { readings })
    }
}

/// Extract the first `X:` `Y:` `Z:` `E:` values of a position report
pub fn parse_position(line: &str) -> Option<PositionReport> {
    static POSITION_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = POSITION_REGEX.get_or_init(|| {
        Regex::new(r"([XYZE]):\s*([-+]?\d*\.?\d+)").expect("invalid regex pattern")
    });

    let mut report = PositionReport::default();
    for c in regex.captures_iter(line) {
        let (Some(axis), Some(value)) = (c.get(1), c.get(2)) else {
            continue;
        };
        let Ok(value) = value.as_str().parse::<f64>() else {
            continue;
        };
        let slot = match axis.as_str() {
            "X" => &mut report.x,
            "Y" => &mut report.y,
            "Z" => &mut report.z,
            _ => &mut report.e,
        };
        slot.get_or_insert(value);
    }

    if report.x.is_none() && report.y.is_none() && report.z.is_none() {
        None
    } else {
        Some(report)
    }
}
