// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;
use zenoh::config::{Config, WhatAmI};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Pcap file or UDP bind address.  If target is an existing file it is
    /// replayed as a capture, otherwise it is bound as a local address to
    /// receive sensor packets (port 2368 unless given).
    #[arg(env, default_value = "0.0.0.0")]
    pub target: String,

    /// Velodyne calibration file (YAML or JSON)
    #[arg(long, env)]
    pub calibration: PathBuf,

    /// Packets per published scan, defaults to one revolution of the
    /// calibrated sensor model.
    #[arg(long, env)]
    pub npackets: Option<usize>,

    /// Replay captures as fast as possible instead of at the sensor rate
    #[arg(long, env)]
    pub read_fast: bool,

    /// The name of the lidar frame
    #[arg(long, env, default_value = "velodyne")]
    pub frame_id: String,

    /// lidar point cloud topic
    #[arg(long, env, default_value = "rt/lidar/points")]
    pub lidar_topic: String,

    /// Application log level
    #[arg(long, env, default_value = "info")]
    pub rust_log: LevelFilter,

    /// zenoh connection mode
    #[arg(long, env, default_value = "peer")]
    mode: WhatAmI,

    /// connect to zenoh endpoints
    #[arg(long, env)]
    connect: Vec<String>,

    /// listen to zenoh endpoints
    #[arg(long, env)]
    listen: Vec<String>,

    /// disable zenoh multicast scouting
    #[arg(long, env)]
    no_multicast_scouting: bool,
}

impl TryFrom<&Args> for Config {
    type Error = zenoh::Error;

    fn try_from(args: &Args) -> Result<Self, Self::Error> {
        let mut config = Config::default();

        config.insert_json5("mode", &json!(args.mode).to_string())?;

        if !args.connect.is_empty() {
            config.insert_json5("connect/endpoints", &json!(args.connect).to_string())?;
        }

        if !args.listen.is_empty() {
            config.insert_json5("listen/endpoints", &json!(args.listen).to_string())?;
        }

        if args.no_multicast_scouting {
            config.insert_json5("scouting/multicast/enabled", &json!(false).to_string())?;
        }

        config.insert_json5("scouting/multicast/interface", &json!("lo").to_string())?;

        Ok(config)
    }
}
