//! Reference embedder: a UDP receive loop feeding the decoder, appending
//! every decoded packet as one gzipped JSON line.
//!
//! Each line is written as soon as its datagram decodes, so a crash never
//! loses more than the in-flight line. Deferred datagrams are written when
//! they resolve, carrying the receipt timestamp of the original datagram;
//! consumers reorder by `ts` if they care.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::net::UdpSocket;

use crate::config::Config;
use crate::decode::{Decoder, ExportPacket};
use crate::stats::StatsRegistry;
use crate::template::TemplateRegistry;

/// Largest possible UDP payload.
const MAX_DATAGRAM: usize = 65_535;

const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(30);

pub struct Collector {
    config: Config,
    decoder: Decoder,
}

impl Collector {
    /// Build a collector, rehydrating the template registry from the
    /// configured snapshot file when one exists.
    pub fn new(config: Config) -> Result<Self> {
        let registry = match config.snapshot_file.as_deref() {
            Some(path) if path.exists() => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("Failed to read template snapshot {path:?}"))?;
                match TemplateRegistry::restore(&bytes) {
                    Ok(registry) => {
                        tracing::info!(
                            templates = registry.template_count(),
                            exporters = registry.exporter_count(),
                            "restored template snapshot"
                        );
                        registry
                    }
                    Err(e) => {
                        tracing::warn!(?path, error = %e, "ignoring unreadable template snapshot");
                        TemplateRegistry::new()
                    }
                }
            }
            _ => TemplateRegistry::new(),
        };

        Ok(Self {
            decoder: Decoder::with_registry(config.decoder_config(), registry),
            config,
        })
    }

    pub fn stats(&self) -> StatsRegistry {
        self.decoder.stats()
    }

    pub async fn run(&mut self) -> Result<()> {
        let socket = UdpSocket::bind(self.config.listen)
            .await
            .with_context(|| format!("Failed to bind UDP socket on {}", self.config.listen))?;
        tracing::info!("Listening for NetFlow/IPFIX exports on {}", self.config.listen);

        let mut writer = OutputWriter::open(&self.config.output_file)?;
        let mut buf = vec![0u8; MAX_DATAGRAM];

        let rotate_period = if self.config.rotate_interval_secs > 0 {
            Duration::from_secs(self.config.rotate_interval_secs)
        } else {
            // Rotation disabled; keep the arm alive but effectively idle.
            Duration::from_secs(u32::MAX as u64)
        };
        let mut rotate = tokio::time::interval(rotate_period);
        let mut housekeeping = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        // The first tick of a tokio interval completes immediately.
        rotate.tick().await;
        housekeeping.tick().await;

        loop {
            tokio::select! {
                result = socket.recv_from(&mut buf) => {
                    let (len, peer) = result.context("UDP receive failed")?;
                    self.handle_datagram(&buf[..len], peer, &mut writer)?;
                }
                _ = rotate.tick() => {
                    if self.config.rotate_interval_secs > 0 {
                        writer.rotate()?;
                    }
                    self.persist_snapshot();
                }
                _ = housekeeping.tick() => {
                    self.decoder.expire_deferred(SystemTime::now());
                    self.log_stats();
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received shutdown signal");
                    break;
                }
            }
        }

        self.persist_snapshot();
        writer.finish()?;
        Ok(())
    }

    /// Decode one datagram and persist whatever it produced: the packet
    /// itself and any previously deferred packets it unlocked.
    fn handle_datagram(
        &mut self,
        data: &[u8],
        peer: SocketAddr,
        writer: &mut OutputWriter,
    ) -> Result<()> {
        let received_at = SystemTime::now();
        match self.decoder.decode(data, peer, received_at) {
            Ok(Some(packet)) => writer.write_packet(&packet, peer, received_at)?,
            Ok(None) => {}
            // Packet-fatal only; counted per exporter, loop survives.
            Err(e) => tracing::debug!(%peer, error = %e, "dropping undecodable datagram"),
        }

        let resolved: Vec<_> = self.decoder.drain_resolved().collect();
        for packet in resolved {
            writer.write_packet(&packet.packet, packet.exporter.peer, packet.received_at)?;
        }
        Ok(())
    }

    fn persist_snapshot(&self) {
        let Some(path) = self.config.snapshot_file.as_deref() else {
            return;
        };
        if let Err(e) = std::fs::write(path, self.decoder.registry().snapshot()) {
            tracing::warn!(?path, error = %e, "failed to persist template snapshot");
        } else {
            tracing::debug!(
                ?path,
                templates = self.decoder.registry().template_count(),
                "persisted template snapshot"
            );
        }
    }

    fn log_stats(&self) {
        let all = self.decoder.stats().all();
        let packets: u64 = all.values().map(|s| s.packets).sum();
        let flows: u64 = all.values().map(|s| s.flows).sum();
        let errors: u64 = all.values().map(|s| s.error_total()).sum();
        tracing::info!(
            "Stats: exporters={}, packets={}, flows={}, errors={}, templates={}, deferred={}",
            all.len(),
            packets,
            flows,
            errors,
            self.decoder.registry().template_count(),
            self.decoder.deferred_count()
        );
    }
}

/// Append-only gzipped JSON-lines writer with logrotate-style rotation.
struct OutputWriter {
    path: PathBuf,
    encoder: Option<GzEncoder<BufWriter<File>>>,
    lines: u64,
}

impl OutputWriter {
    fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            encoder: Some(Self::open_encoder(path)?),
            lines: 0,
        })
    }

    fn open_encoder(path: &Path) -> Result<GzEncoder<BufWriter<File>>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open output file {path:?}"))?;
        Ok(GzEncoder::new(BufWriter::new(file), Compression::default()))
    }

    fn write_packet(
        &mut self,
        packet: &ExportPacket,
        peer: SocketAddr,
        received_at: SystemTime,
    ) -> Result<()> {
        let ts = received_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();

        let mut value = serde_json::to_value(packet).context("Failed to serialize packet")?;
        let object = value
            .as_object_mut()
            .context("packet did not serialize to an object")?;
        object.insert("ts".to_string(), serde_json::json!(ts));
        object.insert(
            "client".to_string(),
            serde_json::json!([peer.ip().to_string(), peer.port()]),
        );

        let mut line = serde_json::to_vec(&value)?;
        line.push(b'\n');

        let encoder = self
            .encoder
            .as_mut()
            .context("output writer already closed")?;
        encoder.write_all(&line)?;
        // One flush per datagram keeps the on-disk file usable after a
        // crash without waiting for the gzip block to fill.
        encoder.flush()?;
        self.lines += 1;
        Ok(())
    }

    /// Close the current gzip member, move it aside with a timestamp
    /// suffix and start a fresh file. A file with nothing written is left
    /// alone.
    fn rotate(&mut self) -> Result<()> {
        if self.lines == 0 {
            return Ok(());
        }
        if let Some(encoder) = self.encoder.take() {
            let mut inner = encoder.finish().context("Failed to finish gzip stream")?;
            inner.flush()?;
        }

        let unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let rotated = PathBuf::from(format!("{}.{unix}", self.path.display()));
        std::fs::rename(&self.path, &rotated)
            .with_context(|| format!("Failed to rotate output to {rotated:?}"))?;
        tracing::info!(lines = self.lines, to = ?rotated, "rotated output file");

        self.encoder = Some(Self::open_encoder(&self.path)?);
        self.lines = 0;
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        if let Some(encoder) = self.encoder.take() {
            let mut inner = encoder.finish().context("Failed to finish gzip stream")?;
            inner.flush()?;
        }
        Ok(())
    }
}
