//! Integration tests for the AT transaction engine.

use modem_rs::constants::PROMPT_TERMINATORS;
use modem_rs::modem::mock::MockModem;
use modem_rs::modem::{execute, ModemConnection, PendingCommand};
use modem_rs::ModemError;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Tests that a silent modem times out after the deadline, not before and
/// not much later.
#[tokio::test]
async fn test_silent_modem_times_out_on_deadline() {
    let conn = ModemConnection::new("/dev/ttyUSB0", Box::new(MockModem::silent()));
    let started = Instant::now();
    let err = execute(&conn, &PendingCommand::new("AT", Duration::from_secs(1)))
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, ModemError::Timeout(ref partial) if partial.is_empty()));
    assert!(elapsed >= Duration::from_secs(1), "returned early after {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1300), "returned late after {elapsed:?}");
}

/// Tests that concurrent transactions on one connection do not interleave.
#[tokio::test]
async fn test_concurrent_transactions_are_serialized() {
    let modem = MockModem::with_responder(|cmd| Some(format!("\r\n{cmd} done\r\nOK\r\n")));
    modem.set_response_delay(Duration::from_millis(30));
    let conn = Arc::new(ModemConnection::new("/dev/ttyUSB0", Box::new(modem.clone())));

    let mut tasks = Vec::new();
    for n in 0..5 {
        let conn = Arc::clone(&conn);
        tasks.push(tokio::spawn(async move {
            let command = format!("AT+N{n}");
            let pending = PendingCommand::new(command.clone(), Duration::from_secs(2));
            let response = execute(&conn, &pending).await.unwrap();
            assert_eq!(response, format!("{command} done\r\nOK"));
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(modem.commands().len(), 5);
}

/// Tests the prompt and payload exchange of one message part.
#[tokio::test]
async fn test_prompt_and_payload_hold_the_line() {
    let modem = MockModem::with_replies(&[
        ("AT+CMGS=", "\r\n> "),
        ("0011", "\r\n+CMGS: 3\r\n\r\nOK\r\n"),
    ]);
    let conn = ModemConnection::new("/dev/ttyUSB0", Box::new(modem.clone()));

    let mut tx = conn.transaction().await.unwrap();
    let prompt = PendingCommand::new("AT+CMGS=19", Duration::from_secs(1))
        .with_terminators(PROMPT_TERMINATORS);
    assert_eq!(tx.exchange(&prompt).await.unwrap(), ">");
    let payload =
        PendingCommand::payload("0011000D91683108108300F00008AA044F60597D", Duration::from_secs(1));
    let result = tx.exchange(&payload).await.unwrap();
    assert_eq!(result, "+CMGS: 3\r\n\r\nOK");
    drop(tx);

    assert!(modem.written().ends_with(b"044F60597D\x1A"));
}

/// Tests that an ERROR reply is returned as a response, not a failure.
#[tokio::test]
async fn test_error_reply_is_a_response() {
    let modem = MockModem::with_replies(&[("AT+BOGUS", "\r\nERROR\r\n")]);
    let conn = ModemConnection::new("/dev/ttyUSB0", Box::new(modem));
    let response = execute(&conn, &PendingCommand::new("AT+BOGUS", Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(response, "ERROR");
}
