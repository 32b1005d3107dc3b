use std::sync::Arc;
use std::time::Duration;

use agentation_bus::EventBus;
use agentation_core::Event;
use tokio::task::JoinHandle;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_ATTEMPTS: u32 = 3;

/// Spawns one delivery task per configured URL, each holding its own bus
/// subscription. Deliveries for a single URL are issued in sequence order;
/// URLs are independent tasks and may interleave with each other.
pub fn spawn_delivery(bus: &Arc<EventBus>, urls: Vec<String>) -> Vec<JoinHandle<()>> {
    urls.into_iter()
        .map(|url| {
            let (handle, rx) = bus.subscribe();
            tokio::spawn(deliver_loop(handle, rx, url))
        })
        .collect()
}

async fn deliver_loop(
    _subscription: agentation_bus::SubscriptionHandle,
    mut rx: tokio::sync::mpsc::Receiver<Event>,
    url: String,
) {
    let client = reqwest::Client::builder()
        .timeout(DELIVERY_TIMEOUT)
        .build()
        .expect("reqwest client with a fixed timeout can't fail to build");

    while let Some(event) = rx.recv().await {
        deliver_with_retries(&client, &url, &event).await;
    }
}

async fn deliver_with_retries(client: &reqwest::Client, url: &str, event: &Event) {
    let mut backoff = Duration::from_millis(250);

    for attempt in 1..=MAX_ATTEMPTS {
        match client.post(url).json(event).send().await {
            Ok(response) if response.status().is_success() => return,
            Ok(response) => {
                tracing::warn!(
                    url,
                    sequence = event.sequence,
                    status = %response.status(),
                    attempt,
                    "webhook delivery rejected"
                );
            }
            Err(error) => {
                tracing::warn!(
                    url,
                    sequence = event.sequence,
                    attempt,
                    %error,
                    "webhook delivery failed"
                );
            }
        }

        if attempt < MAX_ATTEMPTS {
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }
    }

    tracing::warn!(
        url,
        sequence = event.sequence,
        "webhook delivery exhausted retries, dropping event"
    );
}
