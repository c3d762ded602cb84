use ncs_service::{NcsService, ServiceConfig};
use sensor_interface::{ChannelFence, InterfaceConfig};
use sensor_protocol::{KindSet, NcsError, Sample, SensorConfig, SensorKind, SimulatedHub};
use std::sync::Arc;
use std::time::Duration;

/// Tick period of a 20 Hz stream
const TICK: u64 = 960_000;

fn service(hub: &SimulatedHub) -> NcsService {
    service_with(hub, ServiceConfig::fast_test())
}

fn service_with(hub: &SimulatedHub, config: ServiceConfig) -> NcsService {
    NcsService::initialize(Arc::new(hub.clone()), config).unwrap()
}

fn gyro(rate: f32) -> SensorConfig {
    SensorConfig::new(SensorKind::Gyro, rate)
}

#[test]
fn test_shared_gyro_upgraded_in_place() {
    let hub = SimulatedHub::new();
    let service = service(&hub);

    let slow = service.register_service(&gyro(10.0)).unwrap();
    let fast = service.register_service(&gyro(20.0)).unwrap();
    assert_eq!(slow.connection(), fast.connection());
    assert_ne!(slow.id(), fast.id());
    assert_eq!(hub.stream_rate(SensorKind::Gyro), Some(20.0));

    let info = service.interface().connection_info(slow.connection()).unwrap();
    assert_eq!(info.sampling_rate, 20.0);
    assert_eq!(info.clients, 2);

    for k in 1..=4u64 {
        hub.emit_sample(SensorKind::Gyro, k * TICK, vec![0.1, 0.2, 0.3]);
    }
    // the slow client reads 20 Hz data without re-registering
    let window = slow.get_data_sync(2 * TICK, 4 * TICK).unwrap();
    let stamps: Vec<u64> = window.samples().unwrap().iter().map(Sample::timestamp).collect();
    assert_eq!(stamps, vec![2 * TICK, 3 * TICK, 4 * TICK]);
}

#[tokio::test]
async fn test_async_read_completed_by_covering_sample() {
    let hub = SimulatedHub::new();
    let service = service(&hub);
    let client = service.register_service(&gyro(20.0)).unwrap();

    let waiter = client.read_async(100, 200).unwrap();
    hub.emit_sample(SensorKind::Gyro, 150, vec![0.0; 3]);
    hub.emit_sample(SensorKind::Gyro, 250, vec![0.0; 3]);
    assert_eq!(waiter.wait().await, Ok(()));

    let info = service.interface().connection_info(client.connection()).unwrap();
    assert_eq!(info.pending, 0);
}

#[tokio::test]
async fn test_forced_reconfigure_disables_pending_reads() {
    let hub = SimulatedHub::new();
    let service = service(&hub);
    let client = service.register_service(&gyro(20.0)).unwrap();

    let (first, first_waiter) = ChannelFence::new();
    let (second, second_waiter) = ChannelFence::new();
    client.get_data_async(10 * TICK, 20 * TICK, first.clone()).unwrap();
    client.get_data_async(30 * TICK, 40 * TICK, second.clone()).unwrap();

    service
        .interface()
        .reconfigure(client.connection(), gyro(20.0), true)
        .unwrap();
    assert_eq!(first_waiter.wait().await, Err(NcsError::Disabled));
    assert_eq!(second_waiter.wait().await, Err(NcsError::Disabled));
    assert!(first.is_released());
    assert!(second.is_released());
}

#[test]
fn test_last_client_tears_down_connection_and_poll_thread() {
    let hub = SimulatedHub::new();
    let service = service(&hub);
    assert!(!service.is_polling());

    let a = service.register_service(&gyro(10.0)).unwrap();
    let b = service.register_service(&gyro(10.0)).unwrap();
    let slot = a.connection();
    assert!(service.is_polling());
    assert_eq!(hub.open_count(), 2);

    drop(a);
    assert_eq!(service.client_count(), 1);
    assert!(service.interface().connection_info(slot).is_some());
    assert!(service.is_polling());

    b.unregister().unwrap();
    assert_eq!(service.client_count(), 0);
    assert!(service.interface().connection_info(slot).is_none());
    assert!(!service.is_polling());
    assert_eq!(hub.active_links(), 1);
    // transport opened once for the whole live period
    assert_eq!(hub.open_count(), 2);
}

#[test]
fn test_total_silence_resets_once_per_window() {
    let hub = SimulatedHub::new();
    let config = ServiceConfig {
        poll_timeout_ms: 50,
        ..ServiceConfig::fast_test()
    };
    let service = service_with(&hub, config);
    let client = service.register_service(&gyro(20.0)).unwrap();
    hub.set_silent(true);

    let opened = hub.open_count();
    std::thread::sleep(Duration::from_millis(275));
    let resets = hub.open_count() - opened;
    // at most one reset per elapsed 50ms window
    assert!((2..=6).contains(&resets), "{} resets in 275ms", resets);

    let info = service.interface().connection_info(client.connection()).unwrap();
    assert!(info.state.is_active());
    assert!(info.has_transport);
}

#[test]
fn test_streaming_keeps_connections_healthy() {
    let hub = SimulatedHub::new();
    let service = service(&hub);
    let accel = service
        .register_service(&SensorConfig::new(SensorKind::Accelerometer, 50.0))
        .unwrap();
    let gyro_client = service.register_service(&gyro(100.0)).unwrap();

    let stream = hub.start_streaming(Duration::from_millis(5));
    std::thread::sleep(Duration::from_millis(300));

    let info = service.interface().connection_info(accel.connection()).unwrap();
    assert_eq!(info.capacity, 150);
    assert!(info.buffered > 0);
    assert!(info.state.is_active());

    let window = gyro_client.get_last_n_samples(3).unwrap();
    assert_eq!(window.len(), 3);
    let samples = window.samples().unwrap();
    assert!(samples.windows(2).all(|w| w[0].timestamp() < w[1].timestamp()));
    drop(window);
    stream.stop();
}

#[test]
fn test_failed_registration_unwinds() {
    let hub = SimulatedHub::new();
    hub.set_absent(SensorKind::Magnetometer, true);
    let service = service(&hub);

    assert!(matches!(
        service.register_service(&SensorConfig::new(SensorKind::Magnetometer, 10.0)),
        Err(NcsError::Unsupported(_))
    ));
    assert!(!service.is_polling());

    hub.set_fail_open(true);
    assert!(matches!(
        service.register_service(&gyro(10.0)),
        Err(NcsError::NoMemory(_))
    ));
    assert!(!service.is_polling());
    assert_eq!(service.client_count(), 0);

    hub.set_fail_open(false);
    let client = service.register_service(&gyro(10.0)).unwrap();
    assert!(service.is_polling());
    assert_eq!(client.capabilities().unwrap().max_rate(), Some(400.0));
}

#[test]
fn test_client_slots_bounded() {
    let hub = SimulatedHub::new();
    let service = service_with(
        &hub,
        ServiceConfig {
            max_clients: 2,
            ..ServiceConfig::fast_test()
        },
    );
    let _a = service.register_service(&gyro(10.0)).unwrap();
    let _b = service.register_service(&gyro(10.0)).unwrap();
    assert!(matches!(
        service.register_service(&gyro(10.0)),
        Err(NcsError::NoMemory(_))
    ));
}

#[test]
fn test_stop_with_clients_registered() {
    let hub = SimulatedHub::new();
    let service = service(&hub);
    let client = service.register_service(&gyro(20.0)).unwrap();

    service.stop();
    assert!(!service.is_polling());
    assert_eq!(hub.active_links(), 0);
    assert!(client.get_last_n_samples(1).is_err());
    assert!(matches!(
        client.unregister(),
        Err(NcsError::InvalidArgument(_))
    ));
}

#[test]
fn test_flush_keeps_health_monitoring_for_registered_clients() {
    let hub = SimulatedHub::new();
    let config = ServiceConfig {
        poll_timeout_ms: 50,
        ..ServiceConfig::fast_test()
    };
    let service = service_with(&hub, config);
    let _gyro = service.register_service(&gyro(20.0)).unwrap();

    service.flush_service().unwrap();
    assert!(service.is_polling());

    let _accel = service
        .register_service(&SensorConfig::new(SensorKind::Accelerometer, 50.0))
        .unwrap();
    hub.set_silent(true);
    let opened = hub.open_count();
    std::thread::sleep(Duration::from_millis(300));
    assert!(hub.open_count() > opened, "silent connections never reset after flush");
}

#[test]
fn test_flush_without_clients_leaves_poll_thread_stopped() {
    let hub = SimulatedHub::new();
    let service = service(&hub);
    service.flush_service().unwrap();
    assert!(!service.is_polling());

    let client = service.register_service(&gyro(10.0)).unwrap();
    assert!(service.is_polling());
    client.unregister().unwrap();
    service.flush_service().unwrap();
    assert!(!service.is_polling());
}

#[test]
fn test_concurrent_clients_keep_refcount() {
    let hub = SimulatedHub::new();
    let mut config = ServiceConfig::fast_test();
    config.interface = InterfaceConfig {
        monitored: KindSet::empty(),
        ..InterfaceConfig::fast_test()
    };
    let service = service_with(&hub, config);

    let anchor = service.register_service(&gyro(20.0)).unwrap();
    let slot = anchor.connection();
    let opened = hub.open_count();

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for _ in 0..50 {
                    let client = service.register_service(&gyro(20.0)).unwrap();
                    assert_eq!(client.connection(), slot);
                    drop(client);
                }
            });
        }
    });

    let info = service.interface().connection_info(slot).unwrap();
    assert_eq!(info.clients, 1);
    assert_eq!(service.client_count(), 1);
    assert_eq!(hub.open_count(), opened);
    assert!(service.is_polling());

    drop(anchor);
    assert!(service.interface().connection_info(slot).is_none());
    assert_eq!(service.client_count(), 0);
    assert!(!service.is_polling());
    assert_eq!(hub.active_links(), 1);
}
