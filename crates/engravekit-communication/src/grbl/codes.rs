//! GRBL error and alarm code descriptions

/// Short description of an `error:N` code
pub fn error_message(code: u8) -> &'static str {
    match code {
        1 => "Letter expected at start of word",
        2 => "Bad or missing number",
        3 => "Unknown '$' command",
        4 => "Negative value where positive expected",
        5 => "Homing is disabled",
        6 => "Step pulse shorter than 3us",
        7 => "Settings read failed, defaults restored",
        8 => "'$' command only valid when idle",
        9 => "G-code locked out during alarm or jog",
        10 => "Soft limits need homing enabled",
        11 => "Line too long",
        12 => "Step rate too high",
        13 => "Safety door open",
        14 => "Startup line too long",
        15 => "Jog target beyond travel",
        16 => "Invalid jog command",
        17 => "Laser mode needs PWM output",
        20 => "Unsupported G-code command",
        21 => "Two commands from the same modal group",
        22 => "Feed rate not set",
        23 => "Command needs an integer value",
        24 => "Two commands need axis words",
        25 => "Repeated word in block",
        26 => "Axis words missing",
        27 => "Line number out of range",
        28 => "P or L word missing",
        29 => "Unsupported work coordinate system",
        30 => "G53 needs G0 or G1 active",
        31 => "Unused axis words with G80",
        32 => "Arc without axis words in plane",
        33 => "Invalid motion target",
        34 => "Arc radius error",
        35 => "Arc offset word missing",
        36 => "Unused words in block",
        37 => "Tool length offset on wrong axis",
        38 => "Tool number too large",
        _ => "Unknown error",
    }
}

/// Short description of an `ALARM:N` code
pub fn alarm_message(code: u8) -> &'static str {
    match code {
        1 => "Hard limit triggered, re-home",
        2 => "Motion target exceeds travel",
        3 => "Reset while moving, re-home",
        4 => "Probe not in expected state",
        5 => "Probe made no contact",
        6 => "Homing reset",
        7 => "Safety door opened while homing",
        8 => "Homing could not clear the switch",
        9 => "Homing switch not found",
        10 => "Limit switch engaged at start of homing",
        11 => "Homing required",
        _ => "Unknown alarm",
    }
}

/// `error:N - message`
pub fn format_error(code: u8) -> String {
    format!("error:{} - {}", code, error_message(code))
}

/// `ALARM:N - message`
pub fn format_alarm(code: u8) -> String {
    format!("ALARM:{} - {}", code, alarm_message(code))
}
