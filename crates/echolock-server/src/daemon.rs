//! The daemon's three entry points: creating a switch (two-phase
//! commit to Bitcoin and relays), the poll loop that evaluates the
//! check-in clock, and the release pipeline that recovers and
//! delivers the message once triggered.

use crate::config::ServerConfig;
use crate::notify::{deliver_to_all, LoggingNotificationSink};
use anyhow::{Context, Result};
use bitcoin::consensus::deserialize;
use bitcoin::Transaction;
use echolock_bitcoin::EsploraClient;
use echolock_coordinator::{CommitState, Coordinator};
use echolock_monitor::{ConfirmationState, MonitorConfig, MonitorService};
use echolock_relay::{
    EventFilter, NostrTransport, RelayClient, RelayEvent, KIND_SHARE_RELEASE, KIND_SHARE_STORAGE,
};
use echolock_shamir::AuthenticatedShare;
use echolock_switch::{FileSwitchStore, Switch, SwitchState, SwitchStore, WrappedPrivateKey};
use nostr_sdk::Keys;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Events carrying share material are kept around for a generous
/// window — relays are free to garbage-collect past this, but a
/// switch's check-in interval is usually much shorter than a year.
const SHARE_EVENT_TTL_SECS: i64 = 365 * 24 * 3600;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn relay_identity(config: &ServerConfig) -> Result<Keys> {
    match &config.relay.service_secret_key {
        Some(hex) => Keys::parse(hex).context("Invalid relay.service_secret_key"),
        None => {
            log::warn!("No relay.service_secret_key configured — using an ephemeral identity");
            Ok(Keys::generate())
        }
    }
}

fn relay_client(config: &ServerConfig) -> Result<RelayClient<NostrTransport>> {
    let keys = relay_identity(config)?;
    let transport = Arc::new(NostrTransport::new(keys));
    Ok(RelayClient::new(
        transport,
        config.relay.relay_urls.clone(),
        config.relay.min_relay_acks,
    ))
}

/// Run the daemon's poll loop. Blocks forever (until shutdown signal).
/// Does not create or release switches on its own — those are
/// explicit operator actions (`--create` / `--release`), since both
/// need a password this loop has no safe way to hold.
pub async fn run(config: ServerConfig) -> Result<()> {
    log::info!("EchoLock server starting…");
    log::info!("  Switch:       {}", config.switch.id);
    log::info!(
        "  Threshold:    {}-of-{}",
        config.switch.threshold_required,
        config.switch.threshold_total
    );
    log::info!(
        "  Check-in:     every {} s",
        config.switch.check_in_interval_secs
    );
    log::info!("  Bitcoin leg:  {}", config.bitcoin.use_bitcoin_timelock);
    log::info!("  Relays:       {}", config.relay.relay_urls.len());
    log::info!("  Data dir:     {}", config.server.data_dir.display());

    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Failed to create data dir: {}",
            config.server.data_dir.display()
        )
    })?;

    let interval = Duration::from_secs(config.server.poll_interval_secs);

    let mut first = true;
    loop {
        if !first {
            log::info!(
                "Sleeping {} seconds until next check…",
                config.server.poll_interval_secs
            );
            tokio::time::sleep(interval).await;
        }
        first = false;

        match run_check_cycle(&config).await {
            Ok(()) => log::info!("Check cycle completed successfully."),
            Err(e) => log::error!("Check cycle failed: {:#}", e),
        }
    }
}

fn switch_store(config: &ServerConfig) -> Result<FileSwitchStore> {
    let dir = config.server.data_dir.join("switches");
    FileSwitchStore::new(dir).context("Failed to open switch store")
}

/// Execute a single check cycle: load the switch, evaluate its
/// check-in clock against the current time, and persist the result.
/// Purely read/evaluate — creation and release are separate,
/// explicitly invoked operations.
pub async fn run_check_cycle(config: &ServerConfig) -> Result<()> {
    log::info!("Starting check cycle…");

    let mut store = switch_store(config)?;

    let mut switch = store.get(&config.switch.id).with_context(|| {
        format!(
            "switch '{}' is not tracked yet — run with --create to commit one first",
            config.switch.id
        )
    })?;

    let now = now_secs();
    switch.evaluate(now);
    store.put(&switch).context("Failed to persist switch state")?;

    match switch.state {
        SwitchState::Pending => {
            log::warn!(
                "Switch '{}' is Pending — creation never finished committing.",
                switch.id
            );
        }
        SwitchState::Armed => {
            let remaining = switch.seconds_until_trigger(now);
            log::info!(
                "Switch '{}' armed — {} s until trigger.",
                switch.id,
                remaining
            );
        }
        SwitchState::Triggered => {
            log::warn!(
                "Switch '{}' has triggered — run with --release to recover and deliver the message.",
                switch.id
            );
        }
        SwitchState::Released | SwitchState::Cancelled => {
            log::info!(
                "Switch '{}' already in terminal state {:?}.",
                switch.id,
                switch.state
            );
        }
    }
    Ok(())
}

/// A pre-built Bitcoin leg for switch creation: a funding transaction
/// that pays into the P2SH(CLTV) address, and the already-signed
/// spend transaction that claims it once `locktime_height` is reached.
/// Building the funding transaction (selecting UTXOs, signing with a
/// wallet key) is outside this crate's scope — it arrives fully formed
/// from whatever wallet tooling the operator used.
pub struct BitcoinCreationLeg {
    pub wrapped_release_key: WrappedPrivateKey,
    pub locktime_height: u32,
    pub signed_release_tx_hex: String,
    pub funding_tx_hex: String,
}

/// Assemble, commit, and arm a new switch: seal the message, split
/// the auth key, optionally commit a Bitcoin leg, publish shares to
/// relays, and only then transition the switch to `Armed`.
pub async fn create_switch(
    config: &ServerConfig,
    plaintext: &[u8],
    password: &str,
    bitcoin_leg: Option<BitcoinCreationLeg>,
) -> Result<Switch> {
    let mut store = switch_store(config)?;

    let prepared = echolock_switch::prepare_switch(
        &config.switch.id,
        &config.switch.owner_label,
        config.switch.threshold_required,
        config.switch.threshold_total,
        config.switch.check_in_interval_secs,
        config.relay.relay_urls.clone(),
        config.switch.recipients.clone(),
        plaintext,
        password,
        config.switch.pbkdf2_iterations,
    )
    .context("Failed to prepare switch commit material")?;

    let mut switch = prepared.switch;
    let shares = prepared.shares;

    let use_bitcoin = config.bitcoin.use_bitcoin_timelock && bitcoin_leg.is_some();
    let mut coordinator = Coordinator::new(!use_bitcoin);

    if let Some(leg) = bitcoin_leg.filter(|_| config.bitcoin.use_bitcoin_timelock) {
        run_creation_bitcoin_leg(config, &mut switch, &mut coordinator, leg).await?;
    } else {
        log::info!(
            "Switch '{}' has no Bitcoin leg — skipping phase 1.",
            switch.id
        );
    }

    coordinator
        .begin_phase2_publish()
        .context("Coordinator refused to start phase 2")?;

    publish_shares(config, &mut switch, &shares, &mut coordinator).await?;

    match coordinator.state() {
        CommitState::Committed => {}
        other => anyhow::bail!("coordinator ended in non-committed state: {other}"),
    }

    switch.arm().context("Commit succeeded but switch.arm() rejected the transition")?;
    store.put(&switch).context("Failed to persist armed switch")?;
    log::info!("Switch '{}' armed.", switch.id);
    Ok(switch)
}

async fn run_creation_bitcoin_leg(
    config: &ServerConfig,
    switch: &mut Switch,
    coordinator: &mut Coordinator,
    leg: BitcoinCreationLeg,
) -> Result<()> {
    let network = config.network()?;
    let base_url = config
        .bitcoin
        .esplora_url
        .clone()
        .unwrap_or_else(|| echolock_bitcoin::default_base_url(network).to_string());
    let client =
        EsploraClient::new(&base_url, network).context("Failed to build esplora client")?;

    let funding_bytes =
        hex::decode(&leg.funding_tx_hex).context("Funding tx is not valid hex")?;
    let funding_tx: Transaction =
        deserialize(&funding_bytes).context("Funding tx failed to deserialize")?;

    let txid = echolock_monitor::broadcast_with_retry(&client, &funding_tx)
        .await
        .context("Bitcoin funding broadcast failed after retries")?;
    log::info!("Broadcast Bitcoin funding transaction {txid}");

    coordinator
        .begin_phase1_broadcast(txid)
        .context("Coordinator refused to start phase 1")?;

    let mut monitor = MonitorService::new(MonitorConfig {
        poll_interval: Duration::from_millis(config.bitcoin.bitcoin_poll_interval_ms),
        max_wait: Duration::from_millis(config.bitcoin.bitcoin_confirmation_timeout_ms),
        required_confirmations: config.bitcoin.min_bitcoin_confirmations,
    });
    monitor.track(txid);

    loop {
        let events = monitor.poll(&client).await;
        for event in &events {
            log::info!("monitor: {event:?}");
        }
        match monitor.state_of(&txid).map(|s| s.state) {
            Some(ConfirmationState::Confirmed) => {
                coordinator
                    .complete_phase1()
                    .context("Coordinator refused phase 1 completion")?;
                switch.bitcoin_txid = Some(txid.to_string());
                switch.attach_bitcoin_leg(
                    leg.wrapped_release_key,
                    leg.locktime_height,
                    leg.signed_release_tx_hex,
                );
                return Ok(());
            }
            Some(ConfirmationState::Dropped) => {
                coordinator.fail("bitcoin funding tx dropped from mempool").ok();
                anyhow::bail!("bitcoin funding tx {txid} was dropped before confirming");
            }
            Some(ConfirmationState::TimedOut) => {
                coordinator.fail("bitcoin funding confirmation timed out").ok();
                anyhow::bail!("bitcoin funding tx {txid} timed out waiting for confirmation");
            }
            _ => {
                tokio::time::sleep(Duration::from_millis(
                    config.bitcoin.bitcoin_poll_interval_ms,
                ))
                .await;
            }
        }
    }
}

/// Publish every share to the relay set, filling in each
/// `shares_meta` entry's `event_id` as it succeeds. Fails the
/// coordinator and bails on the first relay rejection — a partially
/// published share set is worse than no commit at all.
async fn publish_shares(
    config: &ServerConfig,
    switch: &mut Switch,
    shares: &[AuthenticatedShare],
    coordinator: &mut Coordinator,
) -> Result<()> {
    let client = relay_client(config)?;
    let expiry = now_secs() as i64 + SHARE_EVENT_TTL_SECS;

    for share in shares {
        let meta_idx = switch
            .shares_meta
            .iter()
            .position(|m| m.index == share.index)
            .context("share index missing from shares_meta")?;

        let mut tags = vec![
            ("d".to_string(), format!("{}:{}", switch.id, share.index)),
            ("expiry".to_string(), expiry.to_string()),
        ];
        if let Some(txid) = &switch.bitcoin_txid {
            tags.push(("btc_txid".to_string(), txid.clone()));
        }

        let content = serde_json::to_string(share).context("Failed to serialize share")?;
        let event = RelayEvent {
            id: String::new(),
            kind: KIND_SHARE_STORAGE,
            pubkey: String::new(),
            created_at: now_secs() as i64,
            tags,
            content,
            sig: String::new(),
        };

        let result = client.publish(event).await;
        match result {
            Ok(acks) => {
                log::info!(
                    "share {} for switch '{}' acknowledged by {acks} relay(s)",
                    share.index,
                    switch.id
                );
                switch.shares_meta[meta_idx].event_id =
                    Some(format!("{}:{}", switch.id, share.index));
            }
            Err(e) => {
                coordinator.fail(format!("failed to publish share {}: {e}", share.index)).ok();
                anyhow::bail!("failed to publish share {}: {e}", share.index);
            }
        }
    }

    coordinator
        .complete_phase2()
        .context("Coordinator refused phase 2 completion")?;
    Ok(())
}

/// Recover a triggered switch's message: fetch `threshold_required`
/// shares from relays, verify and reconstruct through the Shamir gate,
/// decrypt, deliver to every recipient, then mark the switch
/// `Released`. Requires the release password as an external input —
/// the daemon never derives or stores it.
pub async fn run_release_pipeline(config: &ServerConfig, password: &str) -> Result<Vec<u8>> {
    let mut store = switch_store(config)?;
    let mut switch = store.get(&config.switch.id).context("Switch not found")?;

    if switch.state != SwitchState::Triggered {
        anyhow::bail!(
            "switch '{}' is not Triggered (found {:?}) — release is only valid once triggered",
            switch.id,
            switch.state
        );
    }

    let client = relay_client(config)?;
    let mut shares = Vec::with_capacity(switch.shares_meta.len());

    for meta in &switch.shares_meta {
        let filter = EventFilter {
            kinds: vec![KIND_SHARE_STORAGE],
            d_tag: Some(format!("{}:{}", switch.id, meta.index)),
            ..Default::default()
        };
        let mut events = client.fetch(&filter).await.context("Failed to fetch share")?;
        events.sort_by_key(|e| std::cmp::Reverse(e.created_at));
        let Some(event) = events.into_iter().next() else {
            log::warn!("share {} for switch '{}' not found on any relay", meta.index, switch.id);
            continue;
        };
        match serde_json::from_str::<AuthenticatedShare>(&event.content) {
            Ok(share) => shares.push(share),
            Err(e) => log::warn!("share {} failed to parse: {e}", meta.index),
        }
    }

    log::info!(
        "recovered {} of {} required shares for switch '{}'",
        shares.len(),
        switch.threshold_required,
        switch.id
    );

    let plaintext = echolock_switch::recover_message(&switch, password, &shares)
        .context("Failed to recover switch message")?;

    let sink = LoggingNotificationSink;
    deliver_to_all(&sink, &switch.recipients, &switch.owner_label, &plaintext);

    if let Err(e) = publish_release_announcement(config, &switch, &client).await {
        log::warn!("failed to publish release announcement, continuing anyway: {e:#}");
    }

    if switch.bitcoin_signed_tx_hex.is_some() {
        if let Err(e) = broadcast_release_spend(config, &switch).await {
            log::error!("failed to broadcast Bitcoin release spend, continuing anyway: {e:#}");
        }
    }

    switch
        .release()
        .context("Recovery succeeded but switch.release() rejected the transition")?;
    store.put(&switch).context("Failed to persist released switch")?;
    log::info!("Switch '{}' released.", switch.id);

    Ok(plaintext)
}

/// Publish a public, unauthenticated `KIND_SHARE_RELEASE` event marking
/// that this switch has released. This is a transparency signal, not a
/// delivery mechanism — spec.md §3 models `recipients` as opaque
/// delivery-address strings, not Nostr pubkeys, so there's no recipient
/// key to re-encrypt this content to; actual delivery goes through
/// `NotificationSink` instead.
async fn publish_release_announcement(
    config: &ServerConfig,
    switch: &Switch,
    client: &RelayClient<NostrTransport>,
) -> Result<()> {
    let body = serde_json::json!({
        "switch_id": switch.id,
        "owner_label": switch.owner_label,
        "threshold_required": switch.threshold_required,
        "threshold_total": switch.threshold_total,
        "released_at": now_secs(),
    });

    let event = RelayEvent {
        id: String::new(),
        kind: KIND_SHARE_RELEASE,
        pubkey: String::new(),
        created_at: now_secs() as i64,
        tags: vec![("d".to_string(), switch.id.clone())],
        content: body.to_string(),
        sig: String::new(),
    };

    let acks = client.publish(event).await.context("Release announcement publish failed")?;
    log::info!("Release announcement for '{}' acknowledged by {acks} relay(s)", switch.id);
    let _ = config;
    Ok(())
}

/// Broadcast the pre-signed CLTV release spend. Failure here is
/// logged, not fatal — the message has already been recovered and
/// delivered by the time this runs, and the Bitcoin leg is just a
/// secondary, publicly-verifiable proof of release.
async fn broadcast_release_spend(config: &ServerConfig, switch: &Switch) -> Result<()> {
    let network = config.network()?;
    let base_url = config
        .bitcoin
        .esplora_url
        .clone()
        .unwrap_or_else(|| echolock_bitcoin::default_base_url(network).to_string());
    let client =
        EsploraClient::new(&base_url, network).context("Failed to build esplora client")?;

    let tx_hex = switch
        .bitcoin_signed_tx_hex
        .as_ref()
        .context("switch has no signed release tx")?;
    let tx_bytes = hex::decode(tx_hex).context("Stored Bitcoin tx is not valid hex")?;
    let tx: Transaction =
        deserialize(&tx_bytes).context("Stored Bitcoin tx failed to deserialize")?;

    let txid = echolock_monitor::broadcast_with_retry(&client, &tx)
        .await
        .context("Bitcoin release broadcast failed after retries")?;
    log::info!("Broadcast Bitcoin release spend {txid}");
    Ok(())
}
