//! End-to-end tests against the in-memory transport.
//!
//! These drive the public API the way an application would: connector,
//! controller and thermostat on top of the session, with the simulator
//! standing in for the device.

use std::time::Duration;

use eqiva_core::codec::decode;
use eqiva_core::{
    Aliases, BaseMode, Command, Controller, DaySchedule, DeviceState, DaySelector, EffectiveMode, Error,
    MockConnector, MockTransport, Notification, Operation, Outcome, Preset, SessionConfig,
    SessionEvent, SimulatedThermostat, Temperature, Thermostat, ThermostatOptions, Weekday,
};

const ADDR: &str = "00:1A:22:12:34:56";

fn temperature(celsius: f32) -> Temperature {
    Temperature::new(celsius).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_full_evening_routine() {
    let mock = MockTransport::with_simulator(ADDR, SimulatedThermostat::default());
    let thermostat = Thermostat::new(mock.clone(), ThermostatOptions::default());
    let mut events = thermostat.subscribe();

    thermostat.connect().await.unwrap();
    assert!(matches!(events.recv().await.unwrap(), SessionEvent::Connected { .. }));

    thermostat.set_mode(BaseMode::Manual).await.unwrap();
    thermostat.set_preset(Preset::Comfort).await.unwrap();
    let state = thermostat.set_lock(true).await.unwrap();

    assert_eq!(state.effective_mode(), Some(EffectiveMode::Manual));
    assert_eq!(state.target(), Some(temperature(21.0)));
    assert!(state.flags().unwrap().locked);
    assert!(state.updated_at.is_some());

    let mut statuses = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SessionEvent::Status { .. }) {
            statuses += 1;
        }
    }
    assert_eq!(statuses, 3);

    thermostat.disconnect().await.unwrap();
    assert_eq!(thermostat.state(), DeviceState::default());
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_command_times_out_after_one_resend() {
    let mock = MockTransport::with_simulator(ADDR, SimulatedThermostat::default());
    let options = ThermostatOptions::default()
        .session(SessionConfig::default().response_timeout(Duration::from_millis(500)));
    let thermostat = Thermostat::new(mock.clone(), options);
    thermostat.connect().await.unwrap();
    thermostat.sync_status().await.unwrap();
    let before = thermostat.state();

    mock.silence_next(2);
    let err = thermostat.set_boost(true).await.unwrap_err();
    assert!(matches!(err, Error::CommandTimeout { attempts: 2, .. }), "{err}");
    assert_eq!(thermostat.state(), before);
    assert!(thermostat.is_connected());

    let state = thermostat.sync_status().await.unwrap();
    assert_eq!(state.effective_mode(), Some(EffectiveMode::Auto));
}

#[tokio::test(start_paused = true)]
async fn test_unsolicited_push_updates_cached_state() {
    let mock = MockTransport::with_simulator(ADDR, SimulatedThermostat::default());
    let thermostat = Thermostat::new(mock.clone(), ThermostatOptions::default());
    thermostat.connect().await.unwrap();

    let mut pushed = SimulatedThermostat::default().manual(23.0);
    pushed.status.valve = 40;
    mock.notify(pushed.status_frame()).await;
    tokio::time::sleep(Duration::from_millis(1)).await;

    let state = thermostat.state();
    assert_eq!(state.target(), Some(temperature(23.0)));
    assert_eq!(state.valve(), Some(40));
    assert_eq!(mock.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_weekly_program_via_controller() {
    let mock = MockTransport::with_simulator(ADDR, SimulatedThermostat::default());
    let connector = MockConnector::new().with_device(mock.clone());
    let aliases: Aliases = [("office".to_string(), ADDR.to_string())].into_iter().collect();
    let controller = Controller::new(connector, aliases, ThermostatOptions::default());

    let program = DaySchedule::from_periods(
        &[
            (temperature(17.0), "07:00".parse().unwrap()),
            (temperature(21.0), "18:00".parse().unwrap()),
        ],
        temperature(17.0),
    )
    .unwrap();

    let report = controller
        .run_device(
            "office",
            &[
                Operation::SetSchedule {
                    days: DaySelector::Work,
                    schedule: program.clone(),
                },
                Operation::RequestSchedule(DaySelector::Day(Weekday::Wednesday)),
            ],
        )
        .await
        .unwrap();

    let Outcome::Schedules(read_back) = &report.results[1] else {
        panic!("expected a schedule read-back");
    };
    assert_eq!(read_back, &vec![(Weekday::Wednesday, program.clone())]);
    assert_eq!(
        mock.simulator().unwrap().schedule(Weekday::Saturday),
        &DaySchedule::constant(temperature(17.0))
    );

    // one status fetch, five day programs, one read-back
    assert_eq!(mock.write_count(), 7);
    for frame in &mock.writes()[1..6] {
        assert_eq!(frame[0], 0x10);
        assert_eq!(frame.len(), 16);
    }
    assert!(!mock.is_link_up());
}

#[tokio::test(start_paused = true)]
async fn test_legacy_status_frames_leave_config_unknown() {
    let sim = SimulatedThermostat {
        legacy_firmware: true,
        ..Default::default()
    };
    let frame = sim.status_frame();
    assert_eq!(frame.len(), 6);
    let Ok(Notification::Status(report)) = decode(&frame) else {
        panic!("short status frames decode");
    };
    assert!(report.config.is_none());

    let mock = MockTransport::with_simulator(ADDR, sim);
    let thermostat = Thermostat::new(mock, ThermostatOptions::default());
    thermostat.connect().await.unwrap();
    let state = thermostat.set_comfort_eco(22.0, 18.0).await.unwrap();
    assert!(state.config.is_none());
    assert!(state.status.is_some());
}

#[test]
fn test_commands_expose_names() {
    assert_eq!(Command::SetBoost(true).name(), "set_boost");
    assert_eq!(Command::FactoryReset.name(), "factory_reset");
}
