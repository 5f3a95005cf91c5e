//! Integration tests for the connection registry, driven by in-memory modems.

use modem_rs::modem::mock::{MockModem, MockOpener};
use modem_rs::{
    DecodedMessage, IncomingMessageHandler, ModemConfig, ModemError, ModemRegistry, PortState,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::timeout;

// Deliver fragments from +8613711023456, reference 0x2A, two parts.
const PART_1: &str = "0891683108200005F0440D91683117013254F60008520112214500230A0500032A02014F60597D";
const PART_2: &str = "0891683108200005F0440D91683117013254F60008520112214500230A0500032A0202597D4F60";

fn test_config(ports: &[&str]) -> ModemConfig {
    ModemConfig {
        ports: ports.iter().map(|p| p.to_string()).collect(),
        probe_timeout_ms: 200,
        command_timeout_ms: 2000,
        send_timeout_ms: 2000,
        idle_read_ms: 20,
        health_check_interval_secs: 0,
        ..ModemConfig::default()
    }
}

fn registry_with(modems: &[(&str, MockModem)]) -> ModemRegistry {
    let opener = MockOpener::new();
    for (path, modem) in modems {
        opener.insert(path, modem.clone());
    }
    let paths: Vec<&str> = modems.iter().map(|(path, _)| *path).collect();
    ModemRegistry::with_opener(test_config(&paths), Arc::new(opener))
}

/// Replies with the command text itself, so responses can be matched to
/// the command that produced them.
fn echo_modem() -> MockModem {
    MockModem::with_responder(|cmd| Some(format!("\r\n+ECHO: {cmd}\r\n\r\nOK\r\n")))
}

/// `+CMGL` listing holding both fragments, at indices 1 and 2.
fn two_part_listing() -> String {
    format!("\r\n+CMGL: 1,0,,40\r\n{PART_1}\r\n+CMGL: 2,0,,40\r\n{PART_2}\r\n\r\nOK\r\n")
}

/// Registry over `/dev/mock0` whose handler forwards every delivery.
fn registry_with_handler(
    modem: &MockModem,
) -> (ModemRegistry, mpsc::Receiver<(DecodedMessage, String)>) {
    let (tx, rx) = mpsc::channel(8);
    let handler: Arc<dyn IncomingMessageHandler> =
        Arc::new(move |message: DecodedMessage, port: &str| {
            let _ = tx.try_send((message, port.to_string()));
        });

    let opener = MockOpener::new();
    opener.insert("/dev/mock0", modem.clone());
    let registry = ModemRegistry::with_opener(test_config(&["/dev/mock0"]), Arc::new(opener))
        .with_handler(handler);
    (registry, rx)
}

/// Tests that scanning promotes only modems that answer the probe.
#[tokio::test]
async fn test_scan_connects_answering_ports_only() {
    let opener = MockOpener::new();
    let good = MockModem::new();
    opener.insert("/dev/mock0", good.clone());
    opener.insert("/dev/mock1", MockModem::silent());
    let registry = ModemRegistry::with_opener(
        test_config(&["/dev/mock0", "/dev/mock1", "/dev/mock2"]),
        Arc::new(opener),
    );

    assert_eq!(registry.scan().await, vec!["mock0".to_string()]);

    let ports = registry.list_ports().await;
    let states: Vec<(&str, PortState)> = ports.iter().map(|p| (p.name.as_str(), p.state)).collect();
    assert_eq!(
        states,
        vec![
            ("mock0", PortState::Connected),
            ("mock1", PortState::Disconnected),
            ("mock2", PortState::Disconnected),
        ]
    );

    let commands = good.commands();
    assert_eq!(&commands[..3], ["AT", "ATE0", "AT+CMGF=0"]);

    // Already connected ports are not probed again.
    assert!(registry.scan().await.is_empty());
    assert_eq!(good.commands().iter().filter(|c| *c == "AT").count(), 1);

    registry.shutdown().await;
}

/// Tests that the UCS-2 character set is selected when configured.
#[tokio::test]
async fn test_init_selects_ucs2_when_configured() {
    let modem = MockModem::new();
    let opener = MockOpener::new();
    opener.insert("/dev/mock0", modem.clone());
    let config = ModemConfig {
        select_ucs2_charset: true,
        ..test_config(&["/dev/mock0"])
    };
    let registry = ModemRegistry::with_opener(config, Arc::new(opener));

    registry.connect("/dev/mock0").await.unwrap();
    assert_eq!(modem.commands()[3], "AT+CSCS=\"UCS2\"");
    registry.shutdown().await;
}

/// Tests that a failing init command leaves the port connected.
#[tokio::test]
async fn test_init_failures_are_not_fatal() {
    let modem = MockModem::with_replies(&[
        ("AT+CMGF", "\r\nERROR\r\n"),
        ("AT+CGMI", "\r\nSIMCOM\r\n\r\nOK\r\n"),
    ]);
    let registry = registry_with(&[("/dev/mock0", modem)]);

    assert_eq!(registry.connect("/dev/mock0").await.unwrap(), "mock0");
    let ports = registry.list_ports().await;
    assert_eq!(ports[0].state, PortState::Connected);
    assert_eq!(ports[0].identity.as_ref().unwrap().manufacturer, "SIMCOM");
    registry.shutdown().await;
}

/// Tests that operations on an unknown port fail with `NotConnected`.
#[tokio::test]
async fn test_unknown_port_is_not_connected() {
    let registry = registry_with(&[]);
    let err = registry.send_command("ttyUSB9", "AT").await.unwrap_err();
    assert!(matches!(err, ModemError::NotConnected(ref port) if port == "ttyUSB9"));
    assert!(matches!(
        registry.disconnect("ttyUSB9").await,
        Err(ModemError::NotConnected(_))
    ));
}

/// Tests that ports can be addressed by base name or full path.
#[tokio::test]
async fn test_lookup_by_name_or_path() {
    let registry = registry_with(&[("/dev/mock0", echo_modem())]);
    registry.connect("/dev/mock0").await.unwrap();

    assert!(registry.send_command("mock0", "AT+X").await.unwrap().contains("AT+X"));
    assert!(registry.send_command("/dev/mock0", "AT+Y").await.unwrap().contains("AT+Y"));
    registry.shutdown().await;
}

/// Tests that concurrent commands on one port never see each other's bytes.
#[tokio::test]
async fn test_same_port_commands_are_serialized() {
    let modem = echo_modem();
    let registry = Arc::new(registry_with(&[("/dev/mock0", modem.clone())]));
    registry.connect("/dev/mock0").await.unwrap();
    modem.set_response_delay(Duration::from_millis(50));

    let mut tasks = Vec::new();
    for n in 0..4 {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move {
            let command = format!("AT+CMD{n}");
            let response = registry.send_command("mock0", &command).await.unwrap();
            (command, response)
        }));
    }
    for task in tasks {
        let (command, response) = task.await.unwrap();
        assert_eq!(response, format!("+ECHO: {command}\r\n\r\nOK"));
    }

    // Every command was written whole, one after another.
    let written = String::from_utf8(modem.written()).unwrap();
    for n in 0..4 {
        assert!(written.contains(&format!("AT+CMD{n}\r\n")));
    }
    registry.shutdown().await;
}

/// Tests that slow replies on one port do not hold up another port.
#[tokio::test]
async fn test_different_ports_run_in_parallel() {
    let first = echo_modem();
    let second = echo_modem();
    let registry = Arc::new(registry_with(&[
        ("/dev/mock0", first.clone()),
        ("/dev/mock1", second.clone()),
    ]));
    assert_eq!(registry.scan().await.len(), 2);
    first.set_response_delay(Duration::from_millis(400));
    second.set_response_delay(Duration::from_millis(400));

    let started = Instant::now();
    let a = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.send_command("mock0", "AT+A").await })
    };
    let b = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.send_command("mock1", "AT+B").await })
    };
    assert!(a.await.unwrap().unwrap().contains("AT+A"));
    assert!(b.await.unwrap().unwrap().contains("AT+B"));
    assert!(started.elapsed() < Duration::from_millis(750), "took {:?}", started.elapsed());
    registry.shutdown().await;
}

/// Tests that disconnecting fails a pending command promptly.
#[tokio::test]
async fn test_disconnect_fails_pending_command() {
    let modem = MockModem::with_responder(|cmd| {
        if cmd == "AT+SLOW" {
            None
        } else {
            Some("\r\nOK\r\n".to_string())
        }
    });
    let registry = Arc::new(registry_with(&[("/dev/mock0", modem)]));
    registry.connect("/dev/mock0").await.unwrap();

    let pending = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.send_command("mock0", "AT+SLOW").await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    registry.disconnect("mock0").await.unwrap();

    let result = timeout(Duration::from_millis(500), pending).await.unwrap().unwrap();
    assert!(matches!(result, Err(ModemError::TransportError(_))));
    assert!(matches!(
        registry.send_command("mock0", "AT").await,
        Err(ModemError::NotConnected(_))
    ));
}

/// Tests that a new-message notification reaches the incoming-message handler
/// with the fragments merged.
#[tokio::test]
async fn test_new_message_notification_invokes_handler() {
    let modem = MockModem::with_replies(&[("AT+CMGL", two_part_listing().as_str())]);
    let (registry, mut rx) = registry_with_handler(&modem);
    registry.connect("/dev/mock0").await.unwrap();
    let (mut events, _cancel) = registry.subscribe(8);

    modem.push_unsolicited("\r\n+CMTI: \"SM\",2\r\n");

    let (message, port) = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(port, "mock0");
    assert_eq!(message.sender, "+8613711023456");
    assert_eq!(message.text, "你好好你");
    assert!(message.concat.is_none());

    let event = timeout(Duration::from_secs(1), events.recv()).await.unwrap().unwrap();
    assert_eq!(event.port, "mock0");
    assert!(event.text.contains("+CMTI: \"SM\",2"));

    assert!(modem.commands().iter().any(|c| c == "AT+CMGL=4"));
    registry.shutdown().await;
}

/// Tests that unsolicited output reaches every subscriber until cancelled.
#[tokio::test]
async fn test_unsolicited_output_is_published() {
    let modem = MockModem::new();
    let registry = registry_with(&[("/dev/mock0", modem.clone())]);
    registry.connect("/dev/mock0").await.unwrap();

    let (mut first, cancel_first) = registry.subscribe(8);
    let (mut second, _cancel_second) = registry.subscribe(8);

    modem.push_unsolicited("\r\nRING\r\n");
    for rx in [&mut first, &mut second] {
        let event = timeout(Duration::from_secs(1), rx.recv()).await.unwrap().unwrap();
        assert_eq!(event.text.trim(), "RING");
    }

    cancel_first.cancel();
    modem.push_unsolicited("\r\nRING\r\n");
    let event = timeout(Duration::from_secs(1), second.recv()).await.unwrap().unwrap();
    assert_eq!(event.text.trim(), "RING");
    assert_eq!(first.recv().await, None);
    registry.shutdown().await;
}

/// Tests that a health check removes a port whose line went away.
#[tokio::test]
async fn test_health_check_removes_dead_port() {
    let healthy = MockModem::new();
    let dying = MockModem::new();
    let registry = registry_with(&[("/dev/mock0", healthy), ("/dev/mock1", dying.clone())]);
    assert_eq!(registry.scan().await.len(), 2);

    dying.close();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(registry.health_check().await, vec!["mock1".to_string()]);
    let states: Vec<PortState> = registry.list_ports().await.iter().map(|p| p.state).collect();
    assert_eq!(states, vec![PortState::Connected, PortState::Disconnected]);
    registry.shutdown().await;
}

/// Tests that successive multi-part sends use successive references.
#[tokio::test]
async fn test_send_message_rolls_reference() {
    let modem = MockModem::with_replies(&[
        ("AT+CMGS=", "\r\n> "),
        ("00", "\r\n+CMGS: 1\r\n\r\nOK\r\n"),
    ]);
    let registry = registry_with(&[("/dev/mock0", modem.clone())]);
    registry.connect("/dev/mock0").await.unwrap();

    let text = "长".repeat(71);
    let first = registry.send_message("mock0", "+8613800138000", &text).await.unwrap();
    let second = registry.send_message("mock0", "+8613800138000", &text).await.unwrap();
    assert_eq!(first.parts, 2);
    let (Some(a), Some(b)) = (first.reference, second.reference) else {
        panic!("multi-part sends carry a reference");
    };
    assert_eq!(b, a.wrapping_add(1));

    let single = registry.send_message("mock0", "10086", "hi").await.unwrap();
    assert_eq!(single.reference, None);
    registry.shutdown().await;
}

/// Tests that a message announced once per fragment reaches the handler once.
#[tokio::test]
async fn test_fragment_notifications_deliver_message_once() {
    let modem = MockModem::with_replies(&[("AT+CMGL", two_part_listing().as_str())]);
    let (registry, mut rx) = registry_with_handler(&modem);
    registry.connect("/dev/mock0").await.unwrap();

    modem.push_unsolicited("\r\n+CMTI: \"SM\",1\r\n+CMTI: \"SM\",2\r\n");
    let (message, _) = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
    assert_eq!(message.text, "你好好你");
    assert!(timeout(Duration::from_millis(500), rx.recv()).await.is_err());

    // A repeated notification for a message still in storage is not redelivered.
    modem.push_unsolicited("\r\n+CMTI: \"SM\",2\r\n");
    assert!(timeout(Duration::from_millis(500), rx.recv()).await.is_err());
    registry.shutdown().await;
}

/// Tests that scanning a silent candidate does not hold up commands on a
/// port that is already connected.
#[tokio::test]
async fn test_scan_does_not_block_connected_ports() {
    let opener = MockOpener::new();
    opener.insert("/dev/mock0", echo_modem());
    opener.insert("/dev/mock1", MockModem::silent());
    let config = ModemConfig {
        probe_timeout_ms: 1000,
        ..test_config(&["/dev/mock0", "/dev/mock1"])
    };
    let registry = Arc::new(ModemRegistry::with_opener(config, Arc::new(opener)));
    registry.connect("/dev/mock0").await.unwrap();

    let scan = {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move { registry.scan().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let states: Vec<PortState> = registry.list_ports().await.iter().map(|p| p.state).collect();
    assert_eq!(states, vec![PortState::Connected, PortState::Probing]);

    let started = Instant::now();
    let response = registry.send_command("mock0", "AT+CSQ").await.unwrap();
    assert!(response.contains("AT+CSQ"));
    assert!(started.elapsed() < Duration::from_millis(300), "took {:?}", started.elapsed());

    assert!(scan.await.unwrap().is_empty());
    registry.shutdown().await;
}

/// Tests that a health check removes a port whose line stays open but no
/// longer answers.
#[tokio::test]
async fn test_health_check_removes_unresponsive_port() {
    let modem = MockModem::new();
    let registry = registry_with(&[("/dev/mock0", modem.clone())]);
    registry.connect("/dev/mock0").await.unwrap();

    modem.set_responder(|_| None);
    assert_eq!(registry.health_check().await, vec!["mock0".to_string()]);
    assert!(!modem.is_closed());
    assert!(matches!(
        registry.send_command("mock0", "AT").await,
        Err(ModemError::NotConnected(_))
    ));
}

/// Tests that dropping the registry stops reading from its ports.
#[tokio::test]
async fn test_drop_stops_port_loops() {
    let modem = MockModem::new();
    let registry = registry_with(&[("/dev/mock0", modem.clone())]);
    registry.connect("/dev/mock0").await.unwrap();
    let (mut events, _cancel) = registry.subscribe(8);

    modem.push_unsolicited("\r\nRING\r\n");
    assert!(timeout(Duration::from_secs(1), events.recv()).await.unwrap().is_some());

    drop(registry);
    tokio::time::sleep(Duration::from_millis(50)).await;
    modem.push_unsolicited("\r\nRING\r\n");
    assert!(timeout(Duration::from_millis(300), events.recv()).await.is_err());
}
