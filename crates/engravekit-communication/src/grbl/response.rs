//! GRBL response classification
//!
//! Every line a controller sends falls into one of the [`GrblResponse`]
//! variants. `ok`, `error:N` and `ALARM:N` complete an exchange; everything
//! else is informational.

use super::codes;
use super::status::StatusReport;

/// One line from the controller
#[derive(Debug, Clone, PartialEq)]
pub enum GrblResponse {
    /// Command accepted
    Ok,
    /// Command rejected with an error code
    Error(u8),
    /// Controller entered alarm state
    Alarm(u8),
    /// `<...>` status report
    Status(StatusReport),
    /// `$N=value`
    Setting { number: u16, value: String },
    /// Startup banner, e.g. `Grbl 1.1h ['$' for help]`
    Welcome(String),
    /// `[...]` feedback such as `[MSG:...]` or `[VER:...]`
    Feedback(String),
    /// Anything else, including echoes
    Message(String),
}

impl GrblResponse {
    /// Classify a line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if line.eq_ignore_ascii_case("ok") {
            return Some(GrblResponse::Ok);
        }

        if let Some(code) = code_after(line, "error:") {
            return Some(match code {
                Some(code) => GrblResponse::Error(code),
                None => GrblResponse::Message(line.to_string()),
            });
        }

        if let Some(code) = code_after(line, "alarm:") {
            return Some(match code {
                Some(code) => GrblResponse::Alarm(code),
                None => GrblResponse::Message(line.to_string()),
            });
        }

        if line.starts_with('<') && line.ends_with('>') {
            if let Some(report) = StatusReport::parse(line) {
                return Some(GrblResponse::Status(report));
            }
        }

        if let Some(rest) = line.strip_prefix('$') {
            if let Some((number, value)) = rest.split_once('=') {
                if let Ok(number) = number.trim().parse::<u16>() {
                    return Some(GrblResponse::Setting {
                        number,
                        value: value.trim().to_string(),
                    });
                }
            }
        }

        if line.starts_with("Grbl ") || line.starts_with("GrblHAL ") {
            return Some(GrblResponse::Welcome(line.to_string()));
        }

        if line.starts_with('[') && line.ends_with(']') {
            return Some(GrblResponse::Feedback(
                line[1..line.len() - 1].to_string(),
            ));
        }

        Some(GrblResponse::Message(line.to_string()))
    }

    /// Whether this line completes a command exchange
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GrblResponse::Ok | GrblResponse::Error(_) | GrblResponse::Alarm(_)
        )
    }

    /// Operator-facing text for error and alarm lines
    pub fn describe(&self) -> Option<String> {
        match self {
            GrblResponse::Error(code) => Some(codes::format_error(*code)),
            GrblResponse::Alarm(code) => Some(codes::format_alarm(*code)),
            _ => None,
        }
    }
}

/// Case-insensitive `prefix` followed by a numeric code.
///
/// `None` when the prefix is absent, `Some(None)` when the code is garbled.
fn code_after(line: &str, prefix: &str) -> Option<Option<u8>> {
    let head = line.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    Some(line[prefix.len()..].trim().parse::<u8>().ok())
}
