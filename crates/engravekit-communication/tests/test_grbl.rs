use engravekit_communication::grbl::commands::clean_line;
use engravekit_communication::{GrblResponse, MachineState, StatusReport};
use proptest::prelude::*;

#[test]
fn test_status_report_fields() {
    let report = StatusReport::parse("<Run|MPos:10.000,5.500,0.000|FS:1200,800>").unwrap();
    assert_eq!(report.state, MachineState::Run);
    assert!(report.state.is_running());
}

#[test]
fn test_comment_only_lines_are_dropped() {
    assert_eq!(clean_line("(pass 1 of 2)"), None);
    assert_eq!(clean_line("   ; text ADA"), None);
    assert_eq!(clean_line("G1 X1 (cut) Y2 ; tail").as_deref(), Some("G1 X1  Y2"));
}

proptest! {
    #[test]
    fn prop_parsers_accept_any_line(line in ".{0,80}") {
        let _ = GrblResponse::parse(&line);
        let _ = StatusReport::parse(&line);
    }

    #[test]
    fn prop_cleaned_lines_carry_no_comments(line in "[A-Z0-9 .;()-]{0,60}") {
        if let Some(cleaned) = clean_line(&line) {
            prop_assert!(!cleaned.contains(';'));
            prop_assert!(!cleaned.is_empty());
            prop_assert_eq!(cleaned.trim(), cleaned.as_str());
        }
    }
}
