use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use printboth::{DownloadSink, PrintError, Relay, RelayBridge, RelayCommand, RelayNotification};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{connect_async, tungstenite::Message};

async fn wait_for_client(bridge: &RelayBridge) -> Result<()> {
    for _ in 0..100 {
        if bridge.is_client_connected().await {
            return Ok(());
        }
        sleep(Duration::from_millis(10)).await;
    }
    anyhow::bail!("extension client never registered")
}

#[tokio::test]
async fn commands_reach_the_extension_as_json() -> Result<()> {
    printboth::logging::init_logging();
    let bridge = RelayBridge::bind("127.0.0.1:0").await?;
    let url = format!("ws://{}", bridge.local_addr());
    let (mut ws, _) = connect_async(url).await?;
    wait_for_client(&bridge).await?;

    bridge
        .send(RelayCommand::StartCapture {
            session_id: "s-1".into(),
        })
        .await?;
    bridge
        .download_documents(vec!["https://cdn/a.pdf".into(), "https://cdn/b.pdf".into()])
        .await?;

    let mut frames = Vec::new();
    while frames.len() < 2 {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await?
            .ok_or_else(|| anyhow::anyhow!("socket closed"))??;
        if let Message::Text(text) = msg {
            frames.push(serde_json::from_str::<serde_json::Value>(&text)?);
        }
    }
    assert_eq!(frames[0]["action"], "startCapture");
    assert_eq!(frames[0]["sessionId"], "s-1");
    assert_eq!(frames[1]["action"], "downloadDocuments");
    assert_eq!(frames[1]["urls"][1], "https://cdn/b.pdf");
    Ok(())
}

#[tokio::test]
async fn captured_locations_are_delivered_to_listeners() -> Result<()> {
    let bridge = RelayBridge::bind("127.0.0.1:0").await?;
    let mut listener = bridge.listen();
    let (mut ws, _) = connect_async(format!("ws://{}", bridge.local_addr())).await?;
    wait_for_client(&bridge).await?;

    ws.send(Message::Text(r#"{"type":"hello","from":"background"}"#.into()))
        .await?;
    ws.send(Message::Text("not json".into())).await?;
    ws.send(Message::Text(
        r#"{"action":"capturedLocation","url":"https://cdn/a.pdf","sessionId":"s-1"}"#.into(),
    ))
    .await?;

    let received = timeout(Duration::from_secs(5), listener.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("listener closed"))?;
    assert_eq!(
        received,
        RelayNotification::CapturedLocation {
            url: "https://cdn/a.pdf".into(),
            session_id: Some("s-1".into()),
        }
    );
    assert!(listener.close());
    Ok(())
}

#[tokio::test]
async fn sending_without_a_client_is_an_error() -> Result<()> {
    let bridge = RelayBridge::bind("127.0.0.1:0").await?;
    let err = bridge
        .send(RelayCommand::StopCapture {
            session_id: "s-1".into(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, PrintError::Relay(_)));
    assert!(err.is_user_visible());
    Ok(())
}

#[tokio::test]
async fn disconnected_clients_are_forgotten() -> Result<()> {
    let bridge = RelayBridge::bind("127.0.0.1:0").await?;
    let (mut ws, _) = connect_async(format!("ws://{}", bridge.local_addr())).await?;
    wait_for_client(&bridge).await?;

    ws.close(None).await?;
    for _ in 0..100 {
        if !bridge.is_client_connected().await {
            return Ok(());
        }
        sleep(Duration::from_millis(10)).await;
    }
    anyhow::bail!("client still registered after closing")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_callers_share_the_global_bridge() -> Result<()> {
    let (first, second) = tokio::join!(
        tokio::spawn(RelayBridge::global()),
        tokio::spawn(RelayBridge::global())
    );
    let (first, second) = (first??, second??);
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &RelayBridge::global().await?));
    Ok(())
}
