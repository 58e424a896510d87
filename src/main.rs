// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::Args;
use clap::Parser;
use edgefirst_schemas::{sensor_msgs::PointCloud2, serde_cdr};
use edgefirst_velodyne::{
    Calibration, PointCloud, ScanAccumulator, SensorModel,
    formats::point_cloud2,
    lidar::Error,
    packet::PacketSlice,
    packet_source::{PacketSource, ReplaySource, UdpSource},
};
use kanal::{AsyncReceiver, AsyncSender};
use std::{path::Path, sync::Arc, time::Duration};
use tracing::{debug, error, info, info_span, instrument, trace, warn};
use tracing_subscriber::EnvFilter;
use zenoh::{
    bytes::{Encoding, ZBytes},
    pubsub::Publisher,
    qos::{CongestionControl, Priority},
};

/// Scans queued for publication before new ones are dropped.
const PUBLISH_QUEUE: usize = 4;

/// Nominal revolution period at 600 RPM.
const REVOLUTION: Duration = Duration::from_millis(100);

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(args.rust_log.into())
                .from_env_lossy(),
        )
        .init();

    let calibration = Arc::new(Calibration::load(&args.calibration)?);
    info!(
        "loaded {} calibration with {} lasers from {}",
        calibration.model(),
        calibration.len(),
        args.calibration.display()
    );

    let mut accumulator = ScanAccumulator::new(calibration.clone(), args.npackets);
    debug!("{} packets per scan", accumulator.packets_per_scan());

    let (mut source, pacing) = open_source(&args, calibration.model()).await?;

    let session = zenoh::open(zenoh::config::Config::try_from(&args)?).await?;
    debug!("opened zenoh session");

    let publisher = match session
        .declare_publisher(args.lidar_topic.clone())
        .priority(Priority::DataHigh)
        .congestion_control(CongestionControl::Drop)
        .await
    {
        Ok(v) => Arc::new(v),
        Err(e) => {
            error!("Failed to create publisher {}: {:?}", args.lidar_topic, e);
            return Err(e);
        }
    };

    let (tx, rx) = kanal::bounded_async(PUBLISH_QUEUE);
    // Published clouds come back here so their buffers are reused.
    let (recycle_tx, recycle_rx) = kanal::bounded_async(PUBLISH_QUEUE + 1);
    let publish_task = tokio::spawn(publish_thread(
        rx,
        recycle_tx,
        publisher.clone(),
        args.frame_id.clone(),
        args.lidar_topic.clone(),
    ));

    let mut pacing = pacing.map(tokio::time::interval);
    let mut cloud = PointCloud::with_capacity(accumulator.capacity());
    let mut buf = [0u8; 2048];
    let mut skip = 0;
    let mut product_checked = false;

    while source.has_more() {
        if let Some(interval) = pacing.as_mut() {
            interval.tick().await;
        }

        let len = match source.recv(&mut buf).await {
            Ok(len) => len,
            Err(e) => {
                warn!("receive error, dropping scan: {}", e);
                accumulator.reset();
                continue;
            }
        };

        if !product_checked {
            product_checked = check_product(&buf[..len], &calibration);
        }

        // Scans nobody subscribes to are skipped whole.
        if skip > 0 {
            skip -= 1;
            continue;
        }
        if accumulator.packets() == 0 && !has_subscribers(&publisher).await {
            trace!("no subscribers on {}, skipping scan", args.lidar_topic);
            skip = accumulator.packets_per_scan() - 1;
            continue;
        }

        let complete =
            info_span!("decode").in_scope(|| accumulator.process(&mut cloud, &buf[..len]));
        match complete {
            Ok(true) => {
                let spare = spare_cloud(&recycle_rx, accumulator.capacity());
                let scan = std::mem::replace(&mut cloud, spare);
                trace!("scan {} complete with {} points", scan.seq, scan.len());
                match tx.try_send(scan) {
                    Ok(true) => {}
                    Ok(false) => debug!("publisher busy, dropping scan"),
                    Err(e) => {
                        error!("publisher task closed: {:?}", e);
                        break;
                    }
                }
            }
            Ok(false) => {}
            Err(e) => warn!("skipping packet: {}", e),
        }
    }

    info!("packet source exhausted");
    drop(tx);
    publish_task.await?;

    Ok(())
}

/// Open the packet source named by the target.
///
/// Recorded sources are paced at the nominal packet rate unless
/// `--read-fast` is given, in which case no interval is returned.
async fn open_source(
    args: &Args,
    model: SensorModel,
) -> Result<(Box<dyn PacketSource>, Option<Duration>), Error> {
    let path = Path::new(&args.target);
    if !path.is_file() {
        let source = UdpSource::bind(&args.target).await?;
        info!("receiving packets on {}", source.local_addr()?);
        return Ok((Box::new(source), None));
    }

    let source = load_capture(path)?;
    let per_packet = match args.read_fast {
        true => None,
        false => Some(REVOLUTION / model.packets_per_rev() as u32),
    };
    Ok((source, per_packet))
}

#[cfg(feature = "pcap")]
fn load_capture(path: &Path) -> Result<Box<dyn PacketSource>, Error> {
    use edgefirst_velodyne::{PcapSource, packet_source::DATA_PORT};

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("pcap") | Some("pcapng") => {
            let source = PcapSource::from_file(path, Some(DATA_PORT))?;
            info!("replaying {} ({} packets)", path.display(), source.len());
            Ok(Box::new(source))
        }
        _ => load_dump(path),
    }
}

#[cfg(not(feature = "pcap"))]
fn load_capture(path: &Path) -> Result<Box<dyn PacketSource>, Error> {
    load_dump(path)
}

/// Raw dump of back-to-back data packets.
fn load_dump(path: &Path) -> Result<Box<dyn PacketSource>, Error> {
    let data = std::fs::read(path)?;
    let source = ReplaySource::from_stream(&data);
    info!("replaying {} ({} packets)", path.display(), source.len());
    Ok(Box::new(source))
}

/// Warn if the packet footer names a different model than the calibration.
///
/// Returns true once a well-formed packet has been checked.
fn check_product(data: &[u8], calibration: &Calibration) -> bool {
    let Ok(packet) = PacketSlice::from_slice(data) else {
        return false;
    };

    let product = packet.product_id();
    match product.model() {
        Some(model) if model != calibration.model() => warn!(
            "sensor reports {} but calibration is for {}",
            model,
            calibration.model()
        ),
        Some(model) => debug!("sensor is {}, {:?}", model, packet.return_mode()),
        None => debug!("unknown product id {:?}", product),
    }
    true
}

/// Reuse a cloud returned by the publisher, allocating only when none is
/// available.
fn spare_cloud(recycled: &AsyncReceiver<PointCloud>, capacity: usize) -> PointCloud {
    match recycled.try_recv() {
        Ok(Some(cloud)) => cloud,
        _ => PointCloud::with_capacity(capacity),
    }
}

async fn has_subscribers(publisher: &Publisher<'_>) -> bool {
    match publisher.matching_status().await {
        Ok(status) => status.matching(),
        Err(e) => {
            warn!("matching status error: {:?}", e);
            true
        }
    }
}

// If the receiver is empty, waits for the next message, otherwise returns the
// most recent message on this receiver. If the receiver is closed, returns None
async fn drain_recv<T>(rx: &mut AsyncReceiver<T>) -> Option<T> {
    let mut msg = match rx.try_recv() {
        Err(_) => return None,
        Ok(Some(v)) => v,
        Ok(None) => return rx.recv().await.ok(),
    };
    while let Ok(Some(v)) = rx.try_recv() {
        msg = v;
    }
    Some(msg)
}

async fn publish_thread(
    mut rx: AsyncReceiver<PointCloud>,
    recycle: AsyncSender<PointCloud>,
    publ: Arc<Publisher<'static>>,
    frame_id: String,
    topic: String,
) {
    while let Some(cloud) = drain_recv(&mut rx).await {
        let msg = point_cloud2(&cloud, &frame_id);
        let (msg, enc) = match encode(&msg) {
            Ok(v) => v,
            Err(e) => {
                error!("Could not encode PCD: {:?}", e);
                continue;
            }
        };

        match publ.put(msg).encoding(enc).await {
            Ok(_) => trace!("{} message sent", topic),
            Err(e) => error!("{} message error: {:?}", topic, e),
        }

        if let Ok(false) = recycle.try_send(cloud) {
            trace!("recycle queue full, dropping cloud");
        }
    }
}

#[instrument(skip_all)]
fn encode(msg: &PointCloud2) -> Result<(ZBytes, Encoding), serde_cdr::Error> {
    let msg = ZBytes::from(serde_cdr::serialize(msg)?);
    let enc = Encoding::APPLICATION_CDR.with_schema("sensor_msgs/msg/PointCloud2");
    Ok((msg, enc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spare_cloud_reuses_published() {
        let (tx, rx) = kanal::bounded_async(2);

        let fresh = spare_cloud(&rx, 384);
        assert!(fresh.points.capacity() >= 384);

        let mut published = PointCloud::with_capacity(4096);
        published.seq = 9;
        let buffer = published.points.as_ptr();
        assert!(tx.try_send(published).unwrap());

        let reused = spare_cloud(&rx, 384);
        assert_eq!(reused.seq, 9);
        assert_eq!(reused.points.as_ptr(), buffer);
        assert!(reused.points.capacity() >= 4096);

        // Queue drained, back to allocating.
        let fresh = spare_cloud(&rx, 384);
        assert_eq!(fresh.seq, 0);
    }
}
