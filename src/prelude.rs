//! WiFi data link crate prelude
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

pub use crate::{LinkId, Ts, Upper};

pub use crate::wifi::{Wifi, WifiStats, CsmaState, Config as WifiConfig, Frame, FrameError, HEADER_LEN, MAX_FRAME_LEN, WIFI_MAXDATA};

pub use crate::error::WifiError;

pub use crate::phy::{Phy, RadioPhy, RadioPhyConfig};

pub use crate::timer::{Scheduler, TimerEvent, TimerId};

pub use crate::link::{Directory, LinkInfo, LinkKind, NicAddr};

pub use crate::checksum::{Checksum, Crc32};
