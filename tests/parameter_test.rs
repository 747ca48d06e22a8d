//! Parameters against a simulated power supply and a mock transport.

use daq_param::adapters::MockAdapter;
use daq_param::parameter::ParameterBase;
use daq_param::validation::{Enumerated, IntRange, NumberRange};
use daq_param::{Backend, Parameter, ParamError, Session, SessionConfig};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

const SUPPLY: &str = r#"
spec: "1.0"
devices:
  supply:
    eom: { query: "\n", response: "\n" }
    error: ERROR
    dialogues:
      - { q: "*IDN?", r: "ACME,PS-3000,0042,1.4.2" }
    properties:
      voltage:
        default: 0.0
        getter: { q: "VOLT?", r: "{}" }
        setter: { q: "VOLT {}" }
      offset:
        default: 0
        getter: { q: "OFFS?", r: "{}" }
        setter: { q: "OFFS {}", r: "OK" }
      mode:
        default: CV
        getter: { q: "MODE?", r: "{}" }
        setter: { q: "MODE {}" }
resources:
  "ASRL4::INSTR": { device: supply }
"#;

fn supply_session() -> (Arc<Session>, NamedTempFile) {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(SUPPLY.as_bytes()).unwrap();
    let session = Session::open(
        "ASRL4::INSTR",
        Backend::Simulated(Some(file.path().to_path_buf())),
        SessionConfig::default(),
    )
    .unwrap();
    (Arc::new(session), file)
}

#[test]
fn test_float_round_trip() {
    let (session, _file) = supply_session();
    let voltage = Parameter::<f64>::builder("voltage", session)
        .get_cmd("VOLT?")
        .set_cmd("VOLT {value}")
        .validator(NumberRange::between(-60.0, 60.0).unwrap())
        .unit("V")
        .build()
        .unwrap();

    for target in [0.0, -12.0, 3.3, 0.001, -59.875] {
        voltage.set(target).unwrap();
        assert_eq!(voltage.get().unwrap(), target);
    }
}

#[test]
fn test_acknowledged_integer_round_trip() {
    let (session, _file) = supply_session();
    let offset = Parameter::<i32>::builder("offset", session)
        .get_cmd("OFFS?")
        .set_cmd("OFFS {}")
        .read_after_setting(true)
        .validator(IntRange::between(-100, 100).unwrap())
        .build()
        .unwrap();

    for target in [0, -7, 42] {
        offset.set(target).unwrap();
        assert_eq!(offset.get().unwrap(), target);
    }
}

#[test]
fn test_enumerated_string_parameter() {
    let (session, _file) = supply_session();
    let mode = Parameter::<String>::builder("mode", session)
        .get_cmd("MODE?")
        .set_cmd("MODE {}")
        .validator(Enumerated::new(["CV", "CC"]).unwrap())
        .build()
        .unwrap();

    assert_eq!(mode.get().unwrap(), "CV");
    mode.set("CC".to_string()).unwrap();
    assert_eq!(mode.call(None).unwrap().as_deref(), Some("CC"));
    assert!(mode.set("CP".to_string()).unwrap_err().is_validation());
    assert_eq!(mode.get().unwrap(), "CC");
}

#[test]
fn test_rejected_set_performs_zero_writes() {
    let adapter = MockAdapter::new();
    let log = adapter.log();
    let session = Arc::new(Session::with_transport(
        "MOCK0::INSTR",
        Box::new(adapter),
        SessionConfig::default(),
    ));
    let level = Parameter::<f64>::builder("level", session)
        .set_cmd("LEV {}")
        .pre_cmd("SYST:REM")
        .validator(NumberRange::between(0.0, 1.0).unwrap())
        .build()
        .unwrap();

    for bad in [-0.5, 1.5, f64::NAN] {
        assert!(level.set(bad).unwrap_err().is_validation());
    }
    assert_eq!(log.write_count(), 0);

    level.set(0.5).unwrap();
    assert_eq!(log.writes(), vec!["SYST:REM", "LEV 0.5"]);
}

#[test]
fn test_get_only_parameter_refuses_values() {
    let (session, _file) = supply_session();
    let voltage = Parameter::<f64>::builder("voltage", session)
        .get_cmd("VOLT?")
        .set_cmd("VOLT {}")
        .settable(false)
        .build()
        .unwrap();

    let err = voltage.call(Some(1.0)).unwrap_err();
    assert!(matches!(err, ParamError::Usage(_)));
    assert_eq!(voltage.get().unwrap(), 0.0);
}

#[test]
fn test_instrument_error_reply_is_decode_error() {
    let (session, _file) = supply_session();
    let current = Parameter::<f64>::builder("current", session)
        .get_cmd("CURR?")
        .build()
        .unwrap();
    match current.get().unwrap_err() {
        ParamError::Decode { response, .. } => assert_eq!(response, "ERROR"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_parameters_after_session_close() {
    let (session, _file) = supply_session();
    let voltage = Parameter::<f64>::builder("voltage", Arc::clone(&session))
        .get_cmd("VOLT?")
        .build()
        .unwrap();
    session.close().unwrap();
    assert!(voltage.get().unwrap_err().is_connection());
}

#[test]
fn test_identification_and_heterogeneous_collection() {
    let (session, _file) = supply_session();
    let idn = Parameter::<daq_param::Identification>::identification(Arc::clone(&session)).unwrap();
    let voltage = Parameter::<f64>::builder("voltage", Arc::clone(&session))
        .get_cmd("VOLT?")
        .set_cmd("VOLT {}")
        .build()
        .unwrap();

    let params: Vec<Box<dyn ParameterBase>> = vec![Box::new(idn), Box::new(voltage)];
    assert_eq!(params[0].get_text().unwrap(), "ACME,PS-3000,0042,1.4.2");
    params[1].set_text("4.5").unwrap();
    assert_eq!(params[1].get_text().unwrap(), "4.5");

    let snapshots: Vec<_> = params.iter().map(|p| p.snapshot()).collect();
    assert_eq!(snapshots[0].name, "IDN");
    assert!(!snapshots[0].settable);
    assert!(snapshots[1].settable);
}

#[test]
fn test_pre_and_post_commands_stay_contiguous_across_threads() {
    let adapter = MockAdapter::new()
        .with_response("A?", "1")
        .with_response("B?", "2");
    let log = adapter.log();
    let session = Arc::new(Session::with_transport(
        "MOCK0::INSTR",
        Box::new(adapter),
        SessionConfig::default(),
    ));
    let remote = Parameter::<i32>::builder("remote_reading", Arc::clone(&session))
        .get_cmd("A?")
        .pre_cmd("SYST:REM")
        .post_cmd("SYST:LOC")
        .build()
        .unwrap();
    let plain = Parameter::<i32>::builder("plain_reading", session)
        .get_cmd("B?")
        .build()
        .unwrap();

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for _ in 0..50 {
                assert_eq!(remote.get().unwrap(), 1);
            }
        });
        scope.spawn(|| {
            for _ in 0..50 {
                assert_eq!(plain.get().unwrap(), 2);
            }
        });
    });

    let writes = log.writes();
    assert_eq!(writes.len(), 200);
    let mut sequences = 0;
    for (i, command) in writes.iter().enumerate() {
        if command == "SYST:REM" {
            assert_eq!(writes[i + 1..i + 3], ["A?", "SYST:LOC"], "interleaved at {i}");
            sequences += 1;
        }
    }
    assert_eq!(sequences, 50);
}
