use rf_siggen::adapters::{MockInstrument, MockTransport};
use rf_siggen::error::InstrumentError;
use rf_siggen::instrument::{
    resolve, Feature, HandshakeStep, InstrumentAddress, InstrumentSession, Quantity,
    SessionOptions, SessionState, SwitchSetting, Unit,
};
use rf_siggen::logging;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::fmt::MakeWriter;

const PHASE_CONTINUOUS_OPTIONS: &str = "\"1E5,A.01,N/A\",\"U02,A.01,2.0\"";

fn options() -> SessionOptions {
    SessionOptions {
        name: "TestGen".to_string(),
        settle_delay: Duration::ZERO,
        ..SessionOptions::default()
    }
}

fn connect(mock: &MockInstrument) -> InstrumentSession<MockTransport> {
    let session =
        InstrumentSession::connect(mock, "192.168.1.10", options()).expect("handshake succeeds");
    mock.clear_log();
    session
}

#[test]
fn test_address_resolution() {
    for n in 0..=30i64 {
        let resource = resolve(&InstrumentAddress::Integer(n)).expect("valid GPIB address");
        assert_eq!(resource.as_str(), format!("GPIB0::{n}::INSTR"));
    }
    for n in [-1i64, 31] {
        assert!(matches!(
            resolve(&InstrumentAddress::Integer(n)),
            Err(InstrumentError::InvalidAddress(_))
        ));
    }
    let resource = resolve(&"172.16.0.42".into()).expect("valid IPv4");
    assert_eq!(resource.as_str(), "TCPIP0::172.16.0.42::inst0::INSTR");

    assert!(resolve(&"localhost".into()).is_err());
    assert!(resolve(&InstrumentAddress::Float(1.5)).is_err());
}

#[test]
fn test_idempotent_read() {
    let mock = MockInstrument::new();
    let mut session = connect(&mock);

    let first = session.frequency().expect("first read");
    let second = session.frequency().expect("second read");

    assert_eq!(first, second);
    assert_eq!(first, Quantity::hertz(1.0e9));
    assert_eq!(
        mock.count(":SOURce:FREQuency:CW?"),
        1,
        "second read should be served from cache"
    );
}

#[test]
fn test_write_confirm_round_trip() {
    let mock = MockInstrument::new();
    let mut session = connect(&mock);

    session.set_frequency(2.4e9).expect("confirmed write");
    assert_eq!(
        mock.commands(),
        vec![":SOURce:FREQuency:CW 2400000000Hz", "*OPC?"]
    );

    mock.clear_log();
    let frequency = session.frequency().expect("cached read");
    assert_eq!(frequency.value, 2.4e9);
    assert_eq!(frequency.unit, Unit::Hertz);
    assert_eq!(frequency.unit.symbol(), "Hz");
    assert!(mock.commands().is_empty(), "read should not touch the transport");
}

#[test]
fn test_unconfirmed_write_leaves_cache_untouched() {
    let mock = MockInstrument::new();
    let mut session = connect(&mock);

    mock.set_opc_response("0");
    let err = session.set_power(-10.0).unwrap_err();
    assert!(
        matches!(err, InstrumentError::WriteNotConfirmed { ref response, .. } if response == "0"),
        "got {err:?}"
    );
    assert!(err.is_recoverable());

    mock.set_opc_response("1");
    mock.clear_log();
    session.power().expect("read");
    assert_eq!(
        mock.count(":SOURce:POWer:LEVel:IMMediate:AMPlitude?"),
        1,
        "read after an unconfirmed write must query the instrument"
    );
}

#[test]
fn test_unconfirmed_write_keeps_last_confirmed_value() {
    let mock = MockInstrument::new();
    let mut session = connect(&mock);

    session.set_output(true).expect("confirmed");
    mock.set_opc_response("ERR");
    assert!(session.set_output(false).is_err());

    assert!(session.output_enabled().expect("cached"));
}

#[test]
fn test_phase_continuous_requires_option() {
    let mock = MockInstrument::new();
    let mut session = connect(&mock);
    assert!(!session.is_available(Feature::PhaseContinuous));

    let err = session.set_phase_continuous(1i64).unwrap_err();
    assert!(matches!(
        err,
        InstrumentError::FeatureNotLicensed(Feature::PhaseContinuous)
    ));
    let err = session.phase_continuous().unwrap_err();
    assert!(matches!(
        err,
        InstrumentError::FeatureNotLicensed(Feature::PhaseContinuous)
    ));

    assert!(
        mock.commands().is_empty(),
        "gated accessors must not reach the transport"
    );
}

#[test]
fn test_phase_continuous_with_option() {
    let mock = MockInstrument::new().with_options(PHASE_CONTINUOUS_OPTIONS);
    let mut session = connect(&mock);

    assert!(session.is_available(Feature::PhaseContinuous));
    assert!(!session.phase_continuous().expect("read"));
    session.set_phase_continuous("ON").expect("write");
    assert!(session.phase_continuous().expect("cached"));
    assert_eq!(
        mock.commands(),
        vec![
            ":SOURce:FREQuency:CONTinuous:MODE?",
            ":SOURce:FREQuency:CONTinuous:MODE 1",
            "*OPC?",
        ]
    );
}

#[test]
fn test_modulation_gating() {
    let mock = MockInstrument::new().with_options("\"1E5,A.01,N/A\"");
    let mut session = connect(&mock);
    assert!(matches!(
        session.set_modulation("off"),
        Err(InstrumentError::FeatureNotLicensed(Feature::Modulation))
    ));
    assert!(mock.commands().is_empty());

    let mock = MockInstrument::new();
    let mut session = connect(&mock);
    session.set_modulation("off").expect("UNT option installed");
    assert!(!session.modulation_enabled().expect("cached"));
}

#[test]
fn test_high_end_model() {
    let mock = MockInstrument::new()
        .with_identity("Agilent Technologies,E8267D,US12345678,C.06.10")
        .with_options("\"1EA,A.01,N/A\"");
    let mut session =
        InstrumentSession::connect(&mock, 19, options()).expect("handshake succeeds");

    assert_eq!(mock.count(":DIAGnostic:INFOrmation:CCOunt:ATTenuator?"), 1);
    let diagnostics = session.diagnostics().expect("captured at handshake");
    assert_eq!(diagnostics.attenuator_switches.as_deref(), Some("321"));
    assert_eq!(diagnostics.power_on_cycles, "789");

    assert!(session.is_available(Feature::Modulation));
    session.set_modulation(1i64).expect("built-in modulation");
}

#[test]
fn test_phase_adjustment_zeroes_reference_first() {
    let mock = MockInstrument::new();
    let mut session = connect(&mock);
    assert!(!session.phase_reference_zeroed());

    session.set_phase_adjustment(45.0).expect("write");
    assert_eq!(
        mock.commands(),
        vec![
            ":SOURce:PHASe:REFerence",
            "*OPC?",
            ":SOURce:PHASe:ADJust 45DEG",
            "*OPC?",
        ]
    );
    assert!(session.phase_reference_zeroed());

    mock.clear_log();
    session.set_phase_adjustment(-30.0).expect("write");
    assert_eq!(mock.count(":SOURce:PHASe:REFerence"), 0, "zeroed only once");
    assert_eq!(session.phase_adjustment().expect("cached"), Quantity::degrees(-30.0));
}

#[test]
fn test_failed_zero_blocks_phase_adjustment() {
    let mock = MockInstrument::new();
    let mut session = connect(&mock);

    mock.set_opc_response("0");
    let err = session.set_phase_adjustment(10.0).unwrap_err();
    assert!(
        matches!(err, InstrumentError::WriteNotConfirmed { ref command, .. } if command == ":SOURce:PHASe:REFerence"),
        "got {err:?}"
    );
    assert!(!session.phase_reference_zeroed());
    assert!(mock
        .commands()
        .iter()
        .all(|c| !c.starts_with(":SOURce:PHASe:ADJust")));
}

#[test]
fn test_phase_adjustment_read_converts_radians() {
    let mock = MockInstrument::new();
    let mut session = connect(&mock);

    assert_eq!(session.phase_adjustment().expect("read").value, 0.0);
    assert_eq!(
        mock.commands(),
        vec![":SOURce:PHASe:REFerence", "*OPC?", ":SOURce:PHASe:ADJust?"]
    );

    session.set_phase_adjustment(90.0).expect("write");
    session.invalidate_cache();
    assert!(session.phase_reference_zeroed(), "marker survives invalidation");

    let phase = session.phase_adjustment().expect("fresh read");
    assert_eq!(phase.unit, Unit::Degree);
    assert!((phase.value - 90.0).abs() < 1e-6, "got {phase}");
}

#[test]
fn test_malformed_identity_makes_session_unusable() {
    let mock = MockInstrument::new().with_identity("Agilent Technologies,E4438C,MY45091234");
    let mut session = InstrumentSession::new(19, options()).expect("valid address");

    let err = session.open(&mock).unwrap_err();
    assert!(matches!(err, InstrumentError::MalformedIdentity(_)), "got {err:?}");
    assert!(!err.is_recoverable());
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(mock.close_count(), 1, "transport released on failure");

    mock.clear_log();
    assert!(matches!(session.frequency(), Err(InstrumentError::SessionUnusable)));
    assert!(matches!(session.set_output(1i64), Err(InstrumentError::SessionUnusable)));
    assert!(matches!(session.confirm(), Err(InstrumentError::SessionUnusable)));
    assert!(matches!(session.open(&mock), Err(InstrumentError::SessionUnusable)));
    assert!(matches!(session.close(), Err(InstrumentError::SessionUnusable)));
    assert!(mock.commands().is_empty());
    assert!(mock.opened_resources().len() == 1, "no reopen attempt");

    drop(session);
    assert_eq!(mock.close_count(), 1, "transport closed exactly once");
}

#[test]
fn test_malformed_option_record_fails_handshake() {
    let mock = MockInstrument::new().with_options("\"UNT,A.02\"");
    let result = InstrumentSession::connect(&mock, 19, options());
    assert!(matches!(result, Err(InstrumentError::MalformedOptionRecord(_))));
    assert_eq!(mock.close_count(), 1);
}

#[test]
fn test_handshake_transport_failure_reports_step() {
    let mock = MockInstrument::new().failing_on(":DIAGnostic:INFOrmation:BOARds?");
    let mut session = InstrumentSession::new("10.0.0.7", options()).expect("valid address");

    let err = session.open(&mock).unwrap_err();
    assert!(
        matches!(
            err,
            InstrumentError::HandshakeFailed {
                step: HandshakeStep::Boards,
                ..
            }
        ),
        "got {err:?}"
    );
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(mock.close_count(), 1);
}

#[test]
fn test_malformed_board_record_fails_handshake() {
    let mock = MockInstrument::new().with_boards("\"CPU,OK\"");
    let mut session = InstrumentSession::new(19, options()).expect("valid address");

    let err = session.open(&mock).unwrap_err();
    assert!(
        matches!(err, InstrumentError::MalformedBoardRecord(ref record) if record == "CPU,OK"),
        "got {err:?}"
    );
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(mock.close_count(), 1);
    assert!(matches!(session.power(), Err(InstrumentError::SessionUnusable)));
}

#[test]
fn test_handshake_failure_during_reset() {
    let mock = MockInstrument::new().failing_on("*CLS");
    let mut session = InstrumentSession::new(19, options()).expect("valid address");

    let err = session.open(&mock).unwrap_err();
    assert!(
        matches!(
            err,
            InstrumentError::HandshakeFailed {
                step: HandshakeStep::Reset,
                ..
            }
        ),
        "got {err:?}"
    );
    assert_eq!(mock.commands(), vec!["*RST", "*CLS"], "identify never attempted");
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(mock.close_count(), 1);
}

#[test]
fn test_handshake_failure_during_diagnostics() {
    let mock = MockInstrument::new().failing_on(":DIAGnostic:INFOrmation:CCOunt:PON?");
    let mut session = InstrumentSession::new(19, options()).expect("valid address");

    let err = session.open(&mock).unwrap_err();
    assert!(
        matches!(
            err,
            InstrumentError::HandshakeFailed {
                step: HandshakeStep::Diagnostics,
                ..
            }
        ),
        "got {err:?}"
    );
    assert_eq!(session.state(), SessionState::Failed);
    assert!(session.diagnostics().is_none());
    assert_eq!(mock.close_count(), 1);
}

#[test]
fn test_settle_delay_applied_to_every_round_trip() {
    let settle = Duration::from_millis(20);
    let mock = MockInstrument::new();
    let mut session = InstrumentSession::connect(
        &mock,
        19,
        SessionOptions {
            settle_delay: settle,
            ..options()
        },
    )
    .expect("handshake succeeds");
    assert_eq!(session.settle_delay(), settle);

    let gap = mock.gap_after("*RST").expect("*CLS follows *RST");
    assert!(gap >= settle, "*RST followed by {gap:?}");
    let gap = mock.gap_after("*CLS").expect("*IDN? follows *CLS");
    assert!(gap >= settle, "*CLS followed by {gap:?}");

    let handshake_queries = mock.query_delays();
    assert_eq!(handshake_queries.len(), 7);
    for (query, delay) in &handshake_queries {
        assert_eq!(*delay, settle, "{query} received {delay:?}");
    }

    mock.clear_log();
    session.set_power(-10.0).expect("confirmed");
    session.frequency().expect("read");
    assert_eq!(
        mock.query_delays(),
        vec![
            ("*OPC?".to_string(), settle),
            (":SOURce:FREQuency:CW?".to_string(), settle),
        ]
    );
}

#[test]
fn test_refused_connection() {
    let mock = MockInstrument::new().refusing_connections();
    let mut session = InstrumentSession::new(7, options()).expect("valid address");

    let err = session.open(&mock).unwrap_err();
    assert!(
        matches!(err, InstrumentError::TransportOpenFailed { ref resource, .. } if resource == "GPIB0::7::INSTR")
    );
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(mock.close_count(), 0);
}

#[test]
fn test_boolean_inputs() {
    let mock = MockInstrument::new();
    let mut session = connect(&mock);

    let accepted: Vec<(SwitchSetting, bool)> = vec![
        (1i64.into(), true),
        ("1".into(), true),
        ("on".into(), true),
        ("ON".into(), true),
        (0i64.into(), false),
        ("off".into(), false),
    ];
    for (input, expected) in accepted {
        session
            .set_output(input.clone())
            .unwrap_or_else(|e| panic!("{input} should be accepted: {e}"));
        assert_eq!(session.output_enabled().expect("cached"), expected);
    }

    mock.clear_log();
    let rejected: Vec<SwitchSetting> = vec![2i64.into(), "yes".into(), 3.5f64.into()];
    for input in rejected {
        let err = session.set_output(input.clone()).unwrap_err();
        assert!(
            matches!(err, InstrumentError::InvalidParameterValue { .. }),
            "{input} should be rejected"
        );
    }
    assert!(mock.commands().is_empty(), "validation is local");
}

#[test]
fn test_numeric_validation_is_local() {
    let mock = MockInstrument::new();
    let mut session = connect(&mock);

    assert!(session.set_frequency(-1.0).is_err());
    assert!(session.set_power(f64::NAN).is_err());
    assert!(session.set_phase_adjustment(f64::INFINITY).is_err());
    assert!(mock.commands().is_empty());
}

#[test]
fn test_malformed_steady_state_response() {
    let mock =
        MockInstrument::new().with_response(":SOURce:POWer:LEVel:IMMediate:AMPlitude?", "N/A");
    let mut session = connect(&mock);

    let err = session.power().unwrap_err();
    assert!(matches!(err, InstrumentError::MalformedResponse { .. }));
    assert!(err.is_recoverable());
    assert_eq!(session.state(), SessionState::Ready);
}

#[test]
fn test_close_sequence() {
    let mock = MockInstrument::new();
    let mut session = connect(&mock);

    session.close().expect("close");
    assert_eq!(mock.commands(), vec![":DIAGnostic:INFOrmation:OTIMe?"]);
    assert_eq!(mock.close_count(), 1);
    assert_eq!(session.state(), SessionState::Closed);

    assert!(matches!(session.close(), Err(InstrumentError::AlreadyClosed)));
    assert!(matches!(session.frequency(), Err(InstrumentError::AlreadyClosed)));
    drop(session);
    assert_eq!(mock.close_count(), 1);
}

#[test]
fn test_close_releases_even_if_query_fails() {
    let mock = MockInstrument::new();
    let mut session = connect(&mock);
    mock.start_failing(":DIAGnostic:INFOrmation:OTIMe?");

    assert!(session.close().is_err());
    assert_eq!(mock.close_count(), 1);
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn test_drop_releases_transport() {
    let mock = MockInstrument::new();
    {
        let _session = connect(&mock);
    }
    assert_eq!(mock.close_count(), 1);
    assert!(mock.commands().is_empty(), "drop performs no I/O");
}

#[test]
fn test_invalidate_cache_rereads() {
    let mock = MockInstrument::new();
    let mut session = connect(&mock);

    assert_eq!(session.frequency().expect("read").value, 1.0e9);
    mock.set_frequency(3.0e9);
    assert_eq!(session.frequency().expect("cached").value, 1.0e9);

    session.invalidate_cache();
    assert_eq!(session.frequency().expect("fresh").value, 3.0e9);
}

#[derive(Clone, Default)]
struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Buffer {
    type Writer = Buffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn test_session_logs_to_its_own_sink() {
    let buffer = Buffer::default();
    let sink = logging::writer_sink("info", buffer.clone());
    let mock = MockInstrument::new();

    let mut session = InstrumentSession::connect(
        &mock,
        19,
        SessionOptions {
            log_sink: Some(sink),
            ..options()
        },
    )
    .expect("handshake succeeds");
    session.set_power(-20.0).expect("write");
    session.close().expect("close");

    let output = String::from_utf8(buffer.0.lock().expect("buffer lock").clone()).expect("utf8");
    assert!(output.contains("Instrument identified"), "{output}");
    assert!(output.contains("E4438C"), "{output}");
    assert!(output.contains("TestGen"), "span fields present: {output}");
    assert!(output.contains("Parameter set"), "{output}");
    assert!(output.contains("Instrument has been on for 12345 hours"), "{output}");
}
