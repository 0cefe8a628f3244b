//! Mint event delivery with WebSocket-primary, polling-fallback transport.
//!
//! The source prefers a push subscription to the `Minted` topic. When the
//! subscription errors or drops, it tears the WebSocket down, immediately
//! switches to polling log queries so no events are missed, and schedules
//! an exponential-backoff reconnect. Delivery is at-least-once; the
//! consumer dedupes on `(token_id, transaction_hash)`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{BlockNumberOrTag, Filter, Log};
use alloy::sol;
use alloy::sol_types::SolEvent;
use futures_util::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::MintEvent;
use crate::error::ForgeError;

sol! {
    #[derive(Debug)]
    event Minted(address indexed to, uint256 indexed tokenId, uint8 rarity);
}

/// Reconnect backoff base delay.
const BACKOFF_BASE: Duration = Duration::from_secs(1);
/// Reconnect backoff ceiling.
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Which delivery path is currently active.
///
/// Modeled explicitly so "polling and push are never both active" is a
/// state-machine property instead of flag bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Not listening; no tasks running.
    Unsubscribed,
    /// WebSocket connection attempt in progress; polling may cover the
    /// gap until the subscription is confirmed.
    Subscribing,
    /// Push subscription live; polling torn down.
    Subscribed,
    /// Polling log queries; a reconnect attempt may be pending.
    Polling,
}

/// Watermark over fully-scanned blocks for the polling fallback.
///
/// `next_range` computes the scan range first; `advance_through` moves
/// the watermark only through what was actually scanned, so the cursor
/// never skips un-scanned blocks and never re-scans covered ones.
#[derive(Debug, Clone, Copy)]
pub struct PollCursor {
    last_processed: u64,
}

impl PollCursor {
    /// Starts the cursor with `last_processed` already covered.
    #[must_use]
    pub const fn new(last_processed: u64) -> Self {
        Self { last_processed }
    }

    /// The last fully-scanned block.
    #[must_use]
    pub const fn last_processed(&self) -> u64 {
        self.last_processed
    }

    /// Range to scan given the current chain head, or `None` when the
    /// head has not moved past the watermark.
    #[must_use]
    pub const fn next_range(&self, head: u64) -> Option<(u64, u64)> {
        if head > self.last_processed {
            Some((self.last_processed + 1, head))
        } else {
            None
        }
    }

    /// Marks blocks up to and including `scanned_to` as covered.
    /// Never moves backwards.
    pub const fn advance_through(&mut self, scanned_to: u64) {
        if scanned_to > self.last_processed {
            self.last_processed = scanned_to;
        }
    }
}

/// Exponential backoff delay for the `attempt`-th reconnect (0-based):
/// 1s, 2s, 4s, ... capped at 30s.
#[must_use]
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.min(10);
    let delay = BACKOFF_BASE.saturating_mul(1u32 << exp);
    delay.min(BACKOFF_CAP)
}

/// Splits `[from, to]` into inclusive sub-ranges of at most `max_span`
/// blocks each, to respect provider log-query limits.
#[must_use]
pub fn chunk_ranges(from: u64, to: u64, max_span: u64) -> Vec<(u64, u64)> {
    if from > to {
        return Vec::new();
    }
    let span = max_span.max(1);
    let mut chunks = Vec::new();
    let mut start = from;
    while start <= to {
        let end = start.saturating_add(span - 1).min(to);
        chunks.push((start, end));
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    chunks
}

/// Decodes one `Minted` log into a normalized [`MintEvent`].
///
/// Malformed logs are rejected at this boundary (logged by the caller)
/// rather than propagated inward.
fn decode_mint_log(log: &Log) -> Result<MintEvent, ForgeError> {
    let decoded = Minted::decode_log_data(&log.inner.data)
        .map_err(|e| ForgeError::Rpc(format!("undecodable Minted log: {e}")))?;
    let token_id = u64::try_from(decoded.tokenId)
        .map_err(|_| ForgeError::Rpc("tokenId out of u64 range".to_string()))?;
    let transaction_hash = log
        .transaction_hash
        .ok_or_else(|| ForgeError::Rpc("log without transaction hash".to_string()))?;
    let rarity = (1..=5).contains(&decoded.rarity).then_some(decoded.rarity);
    Ok(MintEvent {
        token_id,
        to: decoded.to,
        from: Address::ZERO,
        transaction_hash,
        block_number: log.block_number.unwrap_or(0),
        rarity,
    })
}

struct ListenerState {
    delivery: DeliveryState,
    cursor: PollCursor,
    reconnect_attempts: u32,
    sink: Option<mpsc::Sender<MintEvent>>,
    ws_task: Option<JoinHandle<()>>,
    poll_task: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ListenerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerState")
            .field("delivery", &self.delivery)
            .field("cursor", &self.cursor)
            .field("reconnect_attempts", &self.reconnect_attempts)
            .finish_non_exhaustive()
    }
}

impl ListenerState {
    fn abort_ws(&mut self) {
        if let Some(task) = self.ws_task.take() {
            task.abort();
        }
    }

    fn abort_poll(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
    }

    fn abort_timer(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
    }
}

/// Mint event source over one Plumffel contract.
///
/// Cheap to share behind an [`Arc`]; all mutable bookkeeping lives in an
/// internal state mutex.
#[derive(Debug)]
pub struct ChainEventSource {
    rpc_url: String,
    ws_url: Option<String>,
    contract_address: Address,
    deploy_block: u64,
    poll_interval: Duration,
    max_block_range: u64,
    state: Mutex<ListenerState>,
}

impl ChainEventSource {
    /// Creates an event source. `ws_url == None` disables push mode
    /// entirely; the source then polls from the start.
    #[must_use]
    pub fn new(
        rpc_url: String,
        ws_url: Option<String>,
        contract_address: Address,
        deploy_block: u64,
        poll_interval: Duration,
        max_block_range: u64,
    ) -> Self {
        Self {
            rpc_url,
            ws_url,
            contract_address,
            deploy_block,
            poll_interval,
            max_block_range,
            state: Mutex::new(ListenerState {
                delivery: DeliveryState::Unsubscribed,
                cursor: PollCursor::new(0),
                reconnect_attempts: 0,
                sink: None,
                ws_task: None,
                poll_task: None,
                reconnect_timer: None,
            }),
        }
    }

    /// Current delivery state, for the health endpoint and tests.
    pub async fn delivery_state(&self) -> DeliveryState {
        self.state.lock().await.delivery
    }

    /// Begins event delivery into `sink`.
    ///
    /// Idempotent: calling while already listening is a no-op. The
    /// watermark starts at the current chain head, so only events after
    /// startup flow through live delivery; use
    /// [`Self::get_past_mint_events`] for catch-up.
    ///
    /// # Errors
    ///
    /// Currently infallible; the signature leaves room for startup
    /// validation.
    pub async fn start_listening(
        self: &Arc<Self>,
        sink: mpsc::Sender<MintEvent>,
    ) -> Result<(), ForgeError> {
        let head = self.current_block().await.unwrap_or(0);
        let mut state = self.state.lock().await;
        if state.delivery != DeliveryState::Unsubscribed {
            debug!("already listening; start ignored");
            return Ok(());
        }
        state.sink = Some(sink);
        state.cursor = PollCursor::new(head);
        state.reconnect_attempts = 0;

        if self.ws_url.is_some() {
            state.delivery = DeliveryState::Subscribing;
            state.ws_task = Some(tokio::spawn(Arc::clone(self).ws_loop()));
        } else {
            state.delivery = DeliveryState::Polling;
            state.poll_task = Some(tokio::spawn(Arc::clone(self).poll_loop()));
        }
        info!(delivery = ?state.delivery, head, "mint listener started");
        Ok(())
    }

    /// Halts delivery and releases all subscriptions, timers, and tasks.
    pub async fn stop_listening(&self) {
        let mut state = self.state.lock().await;
        state.abort_ws();
        state.abort_poll();
        state.abort_timer();
        state.sink = None;
        state.delivery = DeliveryState::Unsubscribed;
        info!("mint listener stopped");
    }

    /// Liveness probe. Never errors; an unreachable RPC returns `false`.
    pub async fn test_connection(&self) -> bool {
        self.current_block().await.is_ok()
    }

    /// Backfill: all mint events from `from_block` (default: the
    /// contract's deploy block) through the current head.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::Rpc`] if the head or any log query fails.
    pub async fn get_past_mint_events(
        &self,
        from_block: Option<u64>,
    ) -> Result<Vec<MintEvent>, ForgeError> {
        let head = self.current_block().await?;
        let from = from_block.unwrap_or(self.deploy_block);
        if from > head {
            return Ok(Vec::new());
        }
        self.get_mint_events_in_range(from, head).await
    }

    /// Mint events in `[from, to]`, chunked to at most
    /// `max_block_range` blocks per log query.
    ///
    /// # Errors
    ///
    /// Returns [`ForgeError::Rpc`] if any chunk's log query fails.
    pub async fn get_mint_events_in_range(
        &self,
        from: u64,
        to: u64,
    ) -> Result<Vec<MintEvent>, ForgeError> {
        let provider = self.http_provider()?;
        let mut events = Vec::new();
        for (chunk_from, chunk_to) in chunk_ranges(from, to, self.max_block_range) {
            let filter = Filter::new()
                .address(self.contract_address)
                .event(Minted::SIGNATURE)
                .from_block(chunk_from)
                .to_block(chunk_to);
            let logs = provider
                .get_logs(&filter)
                .await
                .map_err(|e| ForgeError::Rpc(format!("getLogs [{chunk_from},{chunk_to}]: {e}")))?;
            for log in &logs {
                match decode_mint_log(log) {
                    Ok(event) => events.push(event),
                    Err(e) => warn!(%e, "skipping malformed Minted log"),
                }
            }
        }
        Ok(events)
    }

    fn http_provider(&self) -> Result<impl Provider, ForgeError> {
        let rpc_url = self
            .rpc_url
            .parse()
            .map_err(|e| ForgeError::Rpc(format!("invalid RPC URL: {e}")))?;
        Ok(ProviderBuilder::new().connect_http(rpc_url))
    }

    async fn current_block(&self) -> Result<u64, ForgeError> {
        let provider = self.http_provider()?;
        provider
            .get_block_number()
            .await
            .map_err(|e| ForgeError::Rpc(format!("blockNumber: {e}")))
    }

    /// WebSocket subscription loop. Runs until the stream ends or
    /// errors, then falls back to polling and schedules a reconnect.
    ///
    /// The future is boxed: the loop respawns itself through the
    /// reconnect timer, and type-erasing at the recursion edge is what
    /// lets the compiler prove the spawned future is `Send`.
    fn ws_loop(self: Arc<Self>) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            let Some(ws_url) = self.ws_url.clone() else {
                return;
            };
            info!(url = %ws_url, "connecting Minted event subscription");

            match ProviderBuilder::new().connect(&ws_url).await {
                Ok(provider) => {
                    let filter = Filter::new()
                        .address(self.contract_address)
                        .event(Minted::SIGNATURE)
                        .from_block(BlockNumberOrTag::Latest);
                    match provider.subscribe_logs(&filter).await {
                        Ok(subscription) => {
                            self.on_subscribed().await;
                            let mut stream = subscription.into_stream();
                            while let Some(log) = stream.next().await {
                                match decode_mint_log(&log) {
                                    Ok(event) => self.dispatch(event).await,
                                    Err(e) => warn!(%e, "skipping malformed Minted log"),
                                }
                            }
                            warn!("Minted subscription stream ended");
                        }
                        Err(e) => error!(%e, "log subscription failed"),
                    }
                }
                Err(e) => error!(%e, "WebSocket connection failed"),
            }

            self.fall_back_to_polling().await;
            self.schedule_reconnect().await;
        })
    }

    /// Subscription confirmed: push becomes the sole delivery path.
    async fn on_subscribed(&self) {
        let mut state = self.state.lock().await;
        if state.delivery == DeliveryState::Unsubscribed {
            return;
        }
        state.abort_poll();
        state.abort_timer();
        state.delivery = DeliveryState::Subscribed;
        state.reconnect_attempts = 0;
        info!("Minted subscription live");
    }

    /// Switches delivery to polling so no events are missed while the
    /// WebSocket is down. No-op when already polling or stopped.
    async fn fall_back_to_polling(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if state.delivery == DeliveryState::Unsubscribed {
            return;
        }
        if state.poll_task.is_none() {
            state.poll_task = Some(tokio::spawn(Arc::clone(self).poll_loop()));
        }
        state.delivery = DeliveryState::Polling;
        info!("falling back to log polling");
    }

    /// Schedules the next WebSocket attempt. Replaces any pending timer,
    /// so at most one reconnect is ever outstanding.
    async fn schedule_reconnect(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if state.delivery == DeliveryState::Unsubscribed || self.ws_url.is_none() {
            return;
        }
        state.abort_timer();
        let delay = backoff_delay(state.reconnect_attempts);
        state.reconnect_attempts += 1;
        let attempt = state.reconnect_attempts;
        let source = Arc::clone(self);
        state.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            source.respawn_ws().await;
        }));
        info!(attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
    }

    async fn respawn_ws(self: Arc<Self>) {
        let mut state = self.state.lock().await;
        if state.delivery != DeliveryState::Polling {
            return;
        }
        state.abort_ws();
        state.delivery = DeliveryState::Subscribing;
        state.ws_task = Some(tokio::spawn(Arc::clone(&self).ws_loop()));
    }

    /// Polling loop: each tick scans `[watermark+1, head]` for Minted
    /// logs, then advances the watermark through the scanned range.
    async fn poll_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if let Err(e) = self.poll_once().await {
                warn!(%e, "poll tick failed; watermark unchanged");
            }
        }
    }

    async fn poll_once(&self) -> Result<(), ForgeError> {
        let head = self.current_block().await?;
        // Compute the range before touching the watermark.
        let range = {
            let state = self.state.lock().await;
            state.cursor.next_range(head)
        };
        let Some((from, to)) = range else {
            return Ok(());
        };

        let events = self.get_mint_events_in_range(from, to).await?;
        let count = events.len();
        for event in events {
            self.dispatch(event).await;
        }

        let mut state = self.state.lock().await;
        state.cursor.advance_through(to);
        if count > 0 {
            debug!(from, to, count, "poll scan dispatched events");
        }
        Ok(())
    }

    async fn dispatch(&self, event: MintEvent) {
        let sink = {
            let state = self.state.lock().await;
            state.sink.clone()
        };
        if let Some(sink) = sink {
            let token_id = event.token_id;
            if sink.send(event).await.is_err() {
                warn!(token_id, "event sink closed; dropping mint event");
            }
        }
    }
}
