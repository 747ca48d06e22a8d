//! Multi-channel attenuator driven through the built-in simulated instrument.

use daq_param::validation::NumberRange;
use daq_param::{Backend, ChannelGroup, Parameter, Session, SessionConfig};
use std::sync::Arc;
use std::thread;

fn open_attenuator() -> Arc<Session> {
    Arc::new(
        Session::open(
            "ASRL1::INSTR",
            Backend::Simulated(None),
            SessionConfig::default(),
        )
        .unwrap(),
    )
}

fn attenuation_group(session: &Arc<Session>) -> ChannelGroup<f64> {
    let count = Parameter::<i64>::builder("channel_count", Arc::clone(session))
        .get_cmd("RFCONFIG? CHAN")
        .read_only()
        .build()
        .unwrap();
    assert_eq!(count.get().unwrap(), 9);

    let template = Parameter::<f64>::builder("attenuation{index}", Arc::clone(session))
        .get_cmd("ATTN? {index}")
        .set_cmd("ATTN {index} {value}")
        .validator(NumberRange::between(0.0, 31.75).unwrap())
        .unit("dB");
    ChannelGroup::build(&count, &template).unwrap()
}

#[test]
fn test_every_channel_round_trips() {
    let session = open_attenuator();
    let group = attenuation_group(&session);
    assert_eq!(group.len(), 9);

    for (i, channel) in group.iter().enumerate() {
        assert_eq!(channel.name(), format!("attenuation{}", i + 1));
        let target = i as f64 * 0.27 + 0.1;
        channel.set(target).unwrap();
        assert_eq!(channel.get().unwrap(), target);
    }

    // Channels keep independent state.
    let expected: Vec<f64> = (0..9).map(|i| i as f64 * 0.27 + 0.1).collect();
    assert_eq!(group.get_all().unwrap(), expected);
}

#[test]
fn test_out_of_range_channel_value_is_rejected() {
    let session = open_attenuator();
    let group = attenuation_group(&session);
    let first = group.channel(1).unwrap();

    first.set(2.5).unwrap();
    assert!(first.set(40.0).unwrap_err().is_validation());
    assert_eq!(first.get().unwrap(), 2.5);
}

#[test]
fn test_channels_driven_from_threads() {
    let session = open_attenuator();
    let group = Arc::new(attenuation_group(&session));

    let workers: Vec<_> = (1..=group.len())
        .map(|index| {
            let group = Arc::clone(&group);
            thread::spawn(move || {
                let channel = group.channel(index).unwrap();
                for step in 0..5 {
                    let value = index as f64 + step as f64 * 0.25;
                    channel.set(value).unwrap();
                    assert_eq!(channel.get().unwrap(), value);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let finals: Vec<f64> = (1..=9).map(|i| i as f64 + 1.0).collect();
    assert_eq!(group.get_all().unwrap(), finals);
}
