//! Parsing radio command names.

use nts_radio::radio::commands::RadioCommand;
use nts_radio::AppError;

#[test]
fn parses_every_command() {
    let cases = [
        ("live_on_1", RadioCommand::LiveOn(1)),
        ("live_on_2", RadioCommand::LiveOn(2)),
        ("stop_now", RadioCommand::StopNow),
        ("pause_now", RadioCommand::PauseNow),
        ("resume_now", RadioCommand::ResumeNow),
        ("live_now", RadioCommand::LiveNow),
    ];
    for (raw, expected) in cases {
        assert_eq!(raw.parse::<RadioCommand>().expect(raw), expected);
    }
}

#[test]
fn tolerates_prefix_whitespace_and_case() {
    assert_eq!(
        "/live_on_2".parse::<RadioCommand>().expect("slash prefix"),
        RadioCommand::LiveOn(2)
    );
    assert_eq!(
        "  !STOP_NOW ".parse::<RadioCommand>().expect("bang prefix"),
        RadioCommand::StopNow
    );
}

#[test]
fn name_round_trips_through_parse() {
    for command in [
        RadioCommand::LiveOn(7),
        RadioCommand::StopNow,
        RadioCommand::PauseNow,
        RadioCommand::ResumeNow,
        RadioCommand::LiveNow,
    ] {
        assert_eq!(command.name().parse::<RadioCommand>().expect("parses"), command);
    }
}

#[test]
fn rejects_unknown_commands() {
    for raw in ["play", "live_on_", "live_on_x", "live_on_300", ""] {
        let result = raw.parse::<RadioCommand>();
        assert!(
            matches!(result, Err(AppError::NotFound(_))),
            "`{raw}` should not parse, got {result:?}"
        );
    }
}
