//! WiFi data link layer
//!
//! A [`Wifi`] instance holds the state for one station on one wireless
//! link: channel access (carrier sense with binary exponential backoff),
//! frame construction, and filtering of received frames before they are
//! passed to the upper layer.
//!
//! All entry points run to completion. A busy medium stages the frame in
//! the station's pending slot and schedules a [`TimerEvent::Backoff`];
//! the event loop returns that event via [`Wifi::handle_timer`] (or
//! [`Wifi::backoff_expired`]) to re-attempt the transmission.
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use core::mem;

use rand_core::RngCore;

use crate::log::{trace, debug, info, warn, error};
use crate::{LinkId, Ts, Upper};
use crate::checksum::{Checksum, Crc32};
use crate::error::WifiError;
use crate::link::{Directory, NicAddr};
use crate::phy::Phy;
use crate::timer::{Scheduler, TimerEvent, TimerId};

pub mod config;
pub use config::Config;

pub mod frame;
pub use frame::{Frame, FrameError, Control, HEADER_LEN, MAX_FRAME_LEN, WIFI_MAXDATA};

pub mod backoff;
pub use backoff::Backoff;


/// Channel access state for the station's pending transmission
#[derive(Debug, Clone, PartialEq)]
pub enum CsmaState {
    /// Nothing staged
    Idle,
    /// Frame staged, waiting for the backoff timer
    Backoff {
        frame: Frame,
        timer: TimerId,
        delay: Ts,
    },
}

impl CsmaState {
    pub fn is_idle(&self) -> bool {
        match self {
            CsmaState::Idle => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WifiStats {
    /// Frames written to the physical layer
    pub tx_sent: u32,
    /// Busy medium encounters that scheduled a retry
    pub tx_deferred: u32,
    /// Frames abandoned after too many collisions
    pub tx_dropped: u32,
    /// Writes discarded for empty or oversized payloads
    pub tx_rejected: u32,
    /// Writes lost to physical layer errors
    pub tx_errors: u32,
    /// Payloads passed to the upper layer
    pub rx_delivered: u32,
    /// Frames from another access point ignored by this access point
    pub rx_ignored_ds: u32,
    /// Received frames discarded as oversized, malformed or corrupt
    pub rx_rejected: u32,
}

impl WifiStats {
    pub fn new() -> Self {
        Self::default()
    }
}

/// WiFi data link layer state for one station.
///
/// Generic over the physical layer (P), scheduler (S), upper layer (U),
/// random source (R) and checksum (C).
pub struct Wifi<P, S, U, R, C = Crc32> {
    link: LinkId,
    address: NicAddr,
    is_ds: bool,
    config: Config,

    callback: U,
    phy: P,
    scheduler: S,
    backoff: Backoff<R>,
    checksum: C,

    collisions: u8,
    csma_state: CsmaState,

    stats: WifiStats,
}

impl <P, S, U, R> Wifi<P, S, U, R, Crc32>
where
    P: Phy,
    S: Scheduler,
    U: Upper,
    R: RngCore,
{
    /// Create a new station on `link`.
    ///
    /// The link must exist in `directory` and be a wireless link. `is_ds`
    /// marks the station as an access point (part of the distribution system).
    pub fn new<D>(directory: &D, link: LinkId, callback: U, is_ds: bool, phy: P, scheduler: S, rng: R, config: Config) -> Result<Self, WifiError<P::Error>>
    where
        D: Directory + ?Sized,
    {
        let info = match directory.link_info(link) {
            Some(i) => i,
            None => {
                warn!("Link {} does not exist", link);
                return Err(WifiError::InvalidLink(link))
            }
        };

        if !info.is_wireless() {
            warn!("Link {} is not a WLAN link ({:?})", link, info.kind);
            return Err(WifiError::NotWireless(link, info.kind))
        }

        let backoff = Backoff::new(rng, &config);

        debug!("Setup WiFi on link {} with address {:?} (ds: {})", link, info.address, is_ds);

        Ok(Self {
            link,
            address: info.address,
            is_ds,
            config,

            callback,
            phy,
            scheduler,
            backoff,
            checksum: Crc32,

            collisions: 0,
            csma_state: CsmaState::Idle,

            stats: WifiStats::new(),
        })
    }
}

impl <P, S, U, R, C> Wifi<P, S, U, R, C>
where
    P: Phy,
    S: Scheduler,
    U: Upper,
    R: RngCore,
    C: Checksum,
{
    /// Replace the frame checksum implementation
    pub fn with_checksum<C2: Checksum>(self, checksum: C2) -> Wifi<P, S, U, R, C2> {
        Wifi {
            link: self.link,
            address: self.address,
            is_ds: self.is_ds,
            config: self.config,

            callback: self.callback,
            phy: self.phy,
            scheduler: self.scheduler,
            backoff: self.backoff,
            checksum,

            collisions: self.collisions,
            csma_state: self.csma_state,

            stats: self.stats,
        }
    }

    /// Tear down the station, returning the physical layer, scheduler and upper layer.
    ///
    /// Any staged frame is discarded, a backoff timer still in flight
    /// has no station to return to and may be ignored by the event loop.
    pub fn destroy(self) -> (P, S, U) {
        if let CsmaState::Backoff{timer, ..} = &self.csma_state {
            debug!("Link {} destroyed with pending backoff (timer {})", self.link, timer);
        }

        (self.phy, self.scheduler, self.callback)
    }

    pub fn link(&self) -> LinkId {
        self.link
    }

    /// Hardware address of the station's link
    pub fn address(&self) -> NicAddr {
        self.address
    }

    /// Whether this station is an access point
    pub fn is_ds(&self) -> bool {
        self.is_ds
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Current collision count
    pub fn collisions(&self) -> u8 {
        self.collisions
    }

    pub fn csma_state(&self) -> &CsmaState {
        &self.csma_state
    }

    /// Fetch data link statistics
    pub fn stats(&self) -> WifiStats {
        self.stats.clone()
    }

    /// Build a sealed frame from this station to `dest`
    pub fn build_frame(&self, dest: NicAddr, data: &[u8]) -> Result<Frame, FrameError> {
        let mut frame = Frame::new(dest, self.address, self.is_ds, data)?;
        frame.seal(&self.checksum);

        Ok(frame)
    }

    /// Write a payload to `dest`.
    ///
    /// Fire-and-forget: invalid payloads, busy-medium retries, drops after
    /// too many collisions and physical layer errors are handled here and
    /// only visible through logs and [`Wifi::stats`].
    pub fn write(&mut self, dest: NicAddr, data: &[u8]) {
        if data.is_empty() || data.len() > WIFI_MAXDATA {
            debug!("Link {} discarding write of {} bytes", self.link, data.len());
            self.stats.tx_rejected = self.stats.tx_rejected.saturating_add(1);
            return
        }

        if let Err(e) = self.try_write(dest, data) {
            error!("Link {} write to {:?} failed: {:?}", self.link, dest, e);
            self.stats.tx_errors = self.stats.tx_errors.saturating_add(1);
        }
    }

    /// Handle a timer event scheduled by this station
    pub fn handle_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::Backoff(link) if link == self.link => self.backoff_expired(),
            TimerEvent::Backoff(link) => {
                warn!("Link {} received backoff event for link {}", self.link, link);
            },
        }
    }

    /// Backoff timer expired, re-attempt the staged frame
    pub fn backoff_expired(&mut self) {
        let frame = match mem::replace(&mut self.csma_state, CsmaState::Idle) {
            CsmaState::Backoff{frame, ..} => frame,
            CsmaState::Idle => {
                debug!("Link {} backoff expired with no staged frame", self.link);
                return
            }
        };

        trace!("Link {} backoff expired, retrying after {} collisions", self.link, self.collisions);

        self.write(frame.dest, frame.payload());
    }

    /// Handle received bytes, passing the payload of acceptable frames upwards
    pub fn read(&mut self, data: &[u8]) {
        if data.len() > MAX_FRAME_LEN {
            debug!("Link {} discarding oversized frame ({} bytes)", self.link, data.len());
            self.stats.rx_rejected = self.stats.rx_rejected.saturating_add(1);
            return
        }

        let frame = match Frame::decode(data) {
            Ok(f) => f,
            Err(e) => {
                debug!("Link {} error decoding frame: {:?}", self.link, e);
                self.stats.rx_rejected = self.stats.rx_rejected.saturating_add(1);
                return
            }
        };

        if self.config.verify_rx_checksum && !frame.verify(&self.checksum) {
            warn!("Link {} checksum mismatch on frame from {:?}", self.link, frame.src);
            self.stats.rx_rejected = self.stats.rx_rejected.saturating_add(1);
            return
        }

        // Access points do not accept frames relayed by other access points
        if frame.from_ds() && self.is_ds {
            info!("Link {} ignoring frame from access point {:?}", self.link, frame.src);
            self.stats.rx_ignored_ds = self.stats.rx_ignored_ds.saturating_add(1);
            return
        }

        trace!("Link {} received {} bytes from {:?}", self.link, frame.length(), frame.src);

        self.callback.up_from_dll(self.link, frame.payload());
        self.stats.rx_delivered = self.stats.rx_delivered.saturating_add(1);
    }

    fn try_write(&mut self, dest: NicAddr, data: &[u8]) -> Result<(), WifiError<P::Error>> {
        let busy = self.phy.carrier_sense(self.link).map_err(WifiError::Phy)?;

        match busy {
            true => self.defer(dest, data),
            false => self.transmit(dest, data),
        }
    }

    /// Stage a frame and schedule a retry (or abandon it)
    fn defer(&mut self, dest: NicAddr, data: &[u8]) -> Result<(), WifiError<P::Error>> {
        self.collisions = self.collisions.saturating_add(1);

        let mut frame = Frame::new(dest, self.address, self.is_ds, data)?;
        frame.collisions = self.collisions;
        frame.seal(&self.checksum);

        let delay = match self.backoff.delay(self.collisions) {
            Some(d) => d,
            None => {
                warn!("Link {} dropping frame to {:?} after {} collisions", self.link, dest, self.collisions);

                self.collisions = 0;
                self.csma_state = CsmaState::Idle;
                self.stats.tx_dropped = self.stats.tx_dropped.saturating_add(1);

                return Ok(())
            }
        };

        let timer = self.scheduler.schedule_once(delay, TimerEvent::Backoff(self.link));

        debug!("Link {} busy, collision {} backoff {} (timer {})", self.link, self.collisions, delay, timer);

        // Overwrites any frame already staged
        self.csma_state = CsmaState::Backoff{ frame, timer, delay };
        self.stats.tx_deferred = self.stats.tx_deferred.saturating_add(1);

        Ok(())
    }

    /// Build and write a frame to the physical layer
    fn transmit(&mut self, dest: NicAddr, data: &[u8]) -> Result<(), WifiError<P::Error>> {
        // Any staged frame is left for its own timer to retry
        self.collisions = 0;

        let frame = self.build_frame(dest, data)?;

        let mut buff = [0u8; MAX_FRAME_LEN];
        let n = frame.encode(&mut buff)?;

        trace!("Link {} transmitting {} bytes to {:?}", self.link, n, dest);

        self.phy.write_physical(self.link, &buff[..n]).map_err(WifiError::Phy)?;

        self.stats.tx_sent = self.stats.tx_sent.saturating_add(1);

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::vec;
    use std::vec::Vec;
    use std::sync::{Arc, Mutex};

    use rand::{SeedableRng, rngs::StdRng};

    use crate::link::{LinkInfo, LinkKind};
    use crate::phy::mock::MockPhy;
    use crate::timer::mock::MockScheduler;
    use super::*;

    const STA_ADDR: NicAddr = NicAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
    const AP_ADDR: NicAddr = NicAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0xa0]);
    const PEER_ADDR: NicAddr = NicAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);

    type Rx = Arc<Mutex<Vec<(LinkId, Vec<u8>)>>>;

    /// Upper layer recording delivered payloads
    struct Collector(Rx);

    impl Upper for Collector {
        fn up_from_dll(&mut self, link: LinkId, data: &[u8]) {
            self.0.lock().unwrap().push((link, data.to_vec()));
        }
    }

    struct Harness {
        wifi: Wifi<MockPhy, MockScheduler, Collector, StdRng>,
        phy: MockPhy,
        sched: MockScheduler,
        rx: Rx,
    }

    fn links(addr: NicAddr) -> [LinkInfo; 3] {
        [
            LinkInfo::new(LinkKind::Loopback, NicAddr::default()),
            LinkInfo::new(LinkKind::Wlan, addr),
            LinkInfo::new(LinkKind::Lan, NicAddr([0x02, 0, 0, 0, 0, 0x10])),
        ]
    }

    fn setup(is_ds: bool, config: Config) -> Harness {
        let _ = simplelog::SimpleLogger::init(::log::LevelFilter::Debug, simplelog::Config::default());

        let addr = if is_ds { AP_ADDR } else { STA_ADDR };
        let phy = MockPhy::new();
        let sched = MockScheduler::new();
        let rx = Rx::default();

        let wifi = Wifi::new(&links(addr), 1, Collector(rx.clone()), is_ds, phy.clone(), sched.clone(), StdRng::seed_from_u64(7), config).unwrap();

        Harness{ wifi, phy, sched, rx }
    }

    fn encode(frame: &Frame) -> Vec<u8> {
        let mut buff = [0u8; MAX_FRAME_LEN];
        let n = frame.encode(&mut buff).unwrap();
        buff[..n].to_vec()
    }

    #[test]
    fn new_validates_link() {
        let table = links(STA_ADDR);
        let sched = MockScheduler::new();

        let missing = Wifi::new(&table, 5, |_l: LinkId, _d: &[u8]| (), false, MockPhy::new(), sched.clone(), StdRng::seed_from_u64(1), Config::default());
        assert_eq!(missing.err(), Some(WifiError::InvalidLink(5)));

        let wired = Wifi::new(&table, 2, |_l: LinkId, _d: &[u8]| (), false, MockPhy::new(), sched.clone(), StdRng::seed_from_u64(1), Config::default());
        assert_eq!(wired.err(), Some(WifiError::NotWireless(2, LinkKind::Lan)));

        let loopback = Wifi::new(&table, 0, |_l: LinkId, _d: &[u8]| (), false, MockPhy::new(), sched.clone(), StdRng::seed_from_u64(1), Config::default());
        assert_eq!(loopback.err(), Some(WifiError::NotWireless(0, LinkKind::Loopback)));

        let wifi = Wifi::new(&table, 1, |_l: LinkId, _d: &[u8]| (), true, MockPhy::new(), sched.clone(), StdRng::seed_from_u64(1), Config::default()).unwrap();
        assert_eq!(wifi.link(), 1);
        assert_eq!(wifi.address(), STA_ADDR);
        assert!(wifi.is_ds());
        assert!(wifi.csma_state().is_idle());

        // Nothing scheduled by creation
        assert_eq!(sched.total(), 0);
    }

    #[test]
    fn write_free_channel_every_length() {
        let mut h = setup(false, Config::default());

        let data: Vec<u8> = (0..WIFI_MAXDATA).map(|i| (i * 7 + 3) as u8).collect();

        for len in 1..=WIFI_MAXDATA {
            h.wifi.write(PEER_ADDR, &data[..len]);
        }

        let writes = h.phy.writes();
        assert_eq!(writes.len(), WIFI_MAXDATA);

        for (i, (link, bytes)) in writes.iter().enumerate() {
            let len = i + 1;

            assert_eq!(*link, 1);
            assert_eq!(bytes.len(), Frame::header_len() + len);
            assert_eq!(&bytes[HEADER_LEN..], &data[..len]);
        }

        assert_eq!(h.sched.total(), 0);
        assert_eq!(h.wifi.stats().tx_sent, WIFI_MAXDATA as u32);
    }

    #[test]
    fn written_frame_contents() {
        let mut h = setup(true, Config::default());

        h.wifi.write(PEER_ADDR, b"from the access point");

        let writes = h.phy.writes();
        assert_eq!(writes.len(), 1);

        let frame = Frame::decode(&writes[0].1).unwrap();
        assert!(frame.from_ds());
        assert_eq!(frame.dest, PEER_ADDR);
        assert_eq!(frame.src, AP_ADDR);
        assert_eq!(frame.collisions, 0);
        assert_eq!(frame.payload(), b"from the access point");
        assert!(frame.verify(&Crc32));

        // Non-AP stations leave FROM_DS clear
        let mut h = setup(false, Config::default());
        h.wifi.write(PEER_ADDR, b"x");
        assert!(!Frame::decode(&h.phy.writes()[0].1).unwrap().from_ds());
    }

    #[test]
    fn write_rejects_invalid_lengths() {
        let mut h = setup(false, Config::default());

        h.wifi.write(PEER_ADDR, &[]);
        h.wifi.write(PEER_ADDR, &vec![0u8; WIFI_MAXDATA + 1]);

        // No carrier sense, no writes, no timers
        assert_eq!(h.phy.senses(), 0);
        assert!(h.phy.writes().is_empty());
        assert_eq!(h.sched.total(), 0);
        assert_eq!(h.wifi.stats().tx_rejected, 2);
    }

    #[test]
    fn busy_channel_stages_frame() {
        let mut h = setup(false, Config::default());
        h.phy.set_busy(true);

        h.wifi.write(PEER_ADDR, b"hello");

        assert!(h.phy.writes().is_empty());
        assert_eq!(h.wifi.collisions(), 1);
        assert_eq!(h.sched.pending(), 1);

        let scheduled = h.sched.pop().unwrap();
        assert_eq!(scheduled.event, TimerEvent::Backoff(1));

        match h.wifi.csma_state() {
            CsmaState::Backoff{frame, timer, delay} => {
                assert_eq!(*timer, scheduled.id);
                assert_eq!(*delay, scheduled.delay);
                assert!(*delay == 0 || *delay == 40);

                assert_eq!(frame.dest, PEER_ADDR);
                assert_eq!(frame.src, STA_ADDR);
                assert_eq!(frame.payload(), b"hello");
                assert_eq!(frame.collisions, 1);
                assert!(frame.verify(&Crc32));
            },
            s => panic!("unexpected state: {:?}", s),
        }
    }

    #[test]
    fn busy_then_clear_sends_staged_frame() {
        let mut h = setup(false, Config::default());
        h.phy.busy_for(3);

        h.wifi.write(PEER_ADDR, b"eventually");

        while let Some(t) = h.sched.pop() {
            h.wifi.handle_timer(t.event);
        }

        assert_eq!(h.sched.total(), 3);
        assert_eq!(h.phy.senses(), 4);
        assert_eq!(h.wifi.collisions(), 0);
        assert!(h.wifi.csma_state().is_idle());

        let writes = h.phy.writes();
        assert_eq!(writes.len(), 1);

        let frame = Frame::decode(&writes[0].1).unwrap();
        assert_eq!(frame.payload(), b"eventually");
        assert_eq!(frame.collisions, 0);

        let stats = h.wifi.stats();
        assert_eq!(stats.tx_deferred, 3);
        assert_eq!(stats.tx_sent, 1);
    }

    #[test]
    fn drop_after_sixteen_collisions() {
        let mut h = setup(false, Config::default());
        h.phy.set_busy(true);

        h.wifi.write(PEER_ADDR, b"doomed");

        let mut fired = 0;
        while let Some(t) = h.sched.pop() {
            assert_eq!(t.event, TimerEvent::Backoff(1));
            assert!(t.delay <= 1023 * 40);

            h.wifi.backoff_expired();
            fired += 1;
        }

        // 16 attempts, 15 timers, then a silent drop
        assert_eq!(fired, 15);
        assert_eq!(h.sched.total(), 15);
        assert_eq!(h.phy.senses(), 16);
        assert!(h.phy.writes().is_empty());
        assert_eq!(h.wifi.collisions(), 0);
        assert!(h.wifi.csma_state().is_idle());

        let stats = h.wifi.stats();
        assert_eq!(stats.tx_deferred, 15);
        assert_eq!(stats.tx_dropped, 1);
        assert_eq!(stats.tx_sent, 0);

        // Following writes start from a clean slate
        h.phy.set_busy(false);
        h.wifi.write(PEER_ADDR, b"next");
        assert_eq!(h.phy.writes().len(), 1);
    }

    #[test]
    fn write_while_backoff_pending() {
        let mut h = setup(false, Config::default());
        h.phy.busy_for(1);

        h.wifi.write(PEER_ADDR, b"first");
        assert_eq!(h.wifi.collisions(), 1);

        // Medium now free, a new write goes out directly
        h.wifi.write(PEER_ADDR, b"second");
        assert_eq!(h.wifi.collisions(), 0);
        assert_eq!(h.phy.writes().len(), 1);

        // Without disturbing the staged frame
        match h.wifi.csma_state() {
            CsmaState::Backoff{frame, ..} => assert_eq!(frame.payload(), b"first"),
            s => panic!("unexpected state: {:?}", s),
        }

        // The staged frame follows when its timer fires
        let t = h.sched.pop().unwrap();
        h.wifi.handle_timer(t.event);

        let payloads: Vec<Vec<u8>> = h.phy.writes().into_iter()
            .map(|(_l, b)| Frame::decode(&b).unwrap().payload().to_vec())
            .collect();
        assert_eq!(payloads, vec![b"second".to_vec(), b"first".to_vec()]);
        assert!(h.wifi.csma_state().is_idle());
    }

    #[test]
    fn busy_write_replaces_staged_frame() {
        let mut h = setup(false, Config::default());
        h.phy.set_busy(true);

        h.wifi.write(PEER_ADDR, b"first");
        h.wifi.write(AP_ADDR, b"second");

        assert_eq!(h.wifi.collisions(), 2);
        assert_eq!(h.sched.pending(), 2);

        let first = h.sched.pop().unwrap();
        let second = h.sched.pop().unwrap();

        // Latest write wins the slot and holds the latest timer
        match h.wifi.csma_state() {
            CsmaState::Backoff{frame, timer, ..} => {
                assert_eq!(frame.dest, AP_ADDR);
                assert_eq!(frame.payload(), b"second");
                assert_eq!(frame.collisions, 2);
                assert_eq!(*timer, second.id);
            },
            s => panic!("unexpected state: {:?}", s),
        }

        // Whichever timer fires first retries the staged frame
        h.phy.set_busy(false);
        h.wifi.handle_timer(first.event);

        assert!(h.wifi.csma_state().is_idle());
        assert_eq!(h.wifi.collisions(), 0);

        // The remaining timer finds nothing staged
        h.wifi.handle_timer(second.event);

        let writes = h.phy.writes();
        assert_eq!(writes.len(), 1);

        let frame = Frame::decode(&writes[0].1).unwrap();
        assert_eq!(frame.dest, AP_ADDR);
        assert_eq!(frame.payload(), b"second");
        assert_eq!(h.phy.senses(), 3);
    }

    #[test]
    fn large_slot_time_backoff() {
        let mut h = setup(false, Config{ slot_time: u64::MAX / 2, ..Default::default() });
        h.phy.set_busy(true);

        for _ in 0..4 {
            h.wifi.write(PEER_ADDR, b"slow");
        }

        assert_eq!(h.wifi.collisions(), 4);
        assert_eq!(h.sched.total(), 4);

        while let Some(t) = h.sched.pop() {
            assert!(t.delay == 0 || t.delay >= u64::MAX / 2);
        }
    }

    #[test]
    fn backoff_expired_without_staged_frame() {
        let mut h = setup(false, Config::default());

        h.wifi.backoff_expired();
        h.wifi.handle_timer(TimerEvent::Backoff(3));

        assert_eq!(h.phy.senses(), 0);
        assert!(h.phy.writes().is_empty());
    }

    #[test]
    fn stations_contend_independently() {
        let _ = simplelog::SimpleLogger::init(::log::LevelFilter::Debug, simplelog::Config::default());

        let table = [
            LinkInfo::new(LinkKind::Loopback, NicAddr::default()),
            LinkInfo::new(LinkKind::Wlan, STA_ADDR),
            LinkInfo::new(LinkKind::Wlan, PEER_ADDR),
        ];

        let mut phy = MockPhy::new();
        let mut sched = MockScheduler::new();

        let mut a = Wifi::new(&table, 1, |_l: LinkId, _d: &[u8]| (), false, phy.clone(), sched.clone(), StdRng::seed_from_u64(1), Config::default()).unwrap();
        let mut b = Wifi::new(&table, 2, |_l: LinkId, _d: &[u8]| (), false, phy.clone(), sched.clone(), StdRng::seed_from_u64(2), Config::default()).unwrap();

        phy.set_busy(true);
        a.write(AP_ADDR, b"from a");
        b.write(AP_ADDR, b"from b");

        assert_eq!((a.collisions(), b.collisions()), (1, 1));

        // Only station a sees its retry collide
        let t = sched.pop().unwrap();
        assert_eq!(t.event, TimerEvent::Backoff(1));
        a.handle_timer(t.event);

        assert_eq!((a.collisions(), b.collisions()), (2, 1));

        // Medium clears, b's retry goes first
        phy.set_busy(false);

        let t = sched.pop().unwrap();
        assert_eq!(t.event.link(), 2);
        b.handle_timer(t.event);

        assert_eq!((a.collisions(), b.collisions()), (2, 0));
        assert!(b.csma_state().is_idle());
        assert!(!a.csma_state().is_idle());

        let t = sched.pop().unwrap();
        a.handle_timer(t.event);

        assert_eq!(a.collisions(), 0);

        let writes: Vec<(LinkId, Vec<u8>)> = phy.writes().into_iter()
            .map(|(l, b)| (l, Frame::decode(&b).unwrap().payload().to_vec()))
            .collect();
        assert_eq!(writes, vec![(2, b"from b".to_vec()), (1, b"from a".to_vec())]);
    }

    #[test]
    fn phy_errors_are_contained() {
        let mut h = setup(false, Config::default());

        h.phy.fail_write(true);
        h.wifi.write(PEER_ADDR, b"lost");

        h.phy.fail_write(false);
        h.phy.fail_sense(true);
        h.wifi.write(PEER_ADDR, b"lost too");

        assert!(h.phy.writes().is_empty());
        assert_eq!(h.sched.total(), 0);
        assert_eq!(h.wifi.stats().tx_errors, 2);
    }

    #[test]
    fn read_from_ds_filter() {
        let ap_frame = Frame::new(STA_ADDR, PEER_ADDR, true, b"relayed").unwrap();
        let bytes = encode(&ap_frame);

        // Access points ignore frames from other access points
        let mut ap = setup(true, Config::default());
        ap.wifi.read(&bytes);

        assert!(ap.rx.lock().unwrap().is_empty());
        assert_eq!(ap.wifi.stats().rx_ignored_ds, 1);

        // Stations accept them
        let mut sta = setup(false, Config::default());
        sta.wifi.read(&bytes);

        assert_eq!(*sta.rx.lock().unwrap(), vec![(1, b"relayed".to_vec())]);
        assert_eq!(sta.wifi.stats().rx_delivered, 1);

        // Access points accept frames from stations
        let sta_frame = Frame::new(AP_ADDR, STA_ADDR, false, b"uplink").unwrap();
        ap.wifi.read(&encode(&sta_frame));

        assert_eq!(*ap.rx.lock().unwrap(), vec![(1, b"uplink".to_vec())]);
    }

    #[test]
    fn read_rejects_oversized_and_malformed() {
        let mut h = setup(false, Config::default());

        h.wifi.read(&vec![0u8; MAX_FRAME_LEN + 1]);

        // A valid frame with trailing bytes beyond the maximum frame size
        let frame = Frame::new(STA_ADDR, PEER_ADDR, false, &[0x55; WIFI_MAXDATA]).unwrap();
        let mut bytes = encode(&frame);
        bytes.push(0);
        h.wifi.read(&bytes);

        // Short and inconsistent frames
        h.wifi.read(&[0u8; 4]);
        let mut truncated = encode(&Frame::new(STA_ADDR, PEER_ADDR, false, b"abcdef").unwrap());
        truncated.truncate(HEADER_LEN + 3);
        h.wifi.read(&truncated);

        assert!(h.rx.lock().unwrap().is_empty());
        assert_eq!(h.wifi.stats().rx_rejected, 4);
    }

    #[test]
    fn read_checksum_verification() {
        let mut frame = Frame::new(STA_ADDR, PEER_ADDR, false, b"corrupt me").unwrap();
        frame.seal(&Crc32);

        let mut bytes = encode(&frame);
        bytes[HEADER_LEN] ^= 0x01;

        // Unverified by default, corrupted payload passes up
        let mut h = setup(false, Config::default());
        h.wifi.read(&bytes);
        assert_eq!(h.rx.lock().unwrap().len(), 1);

        // Verification enabled
        let mut h = setup(false, Config{ verify_rx_checksum: true, ..Default::default() });
        h.wifi.read(&bytes);
        assert!(h.rx.lock().unwrap().is_empty());
        assert_eq!(h.wifi.stats().rx_rejected, 1);

        h.wifi.read(&encode(&frame));
        assert_eq!(*h.rx.lock().unwrap(), vec![(1, b"corrupt me".to_vec())]);
    }

    #[test]
    fn closure_upper_and_destroy() {
        let table = links(STA_ADDR);
        let mut received = Vec::new();

        {
            let upper = |link: LinkId, data: &[u8]| received.push((link, data.to_vec()));
            let mut wifi = Wifi::new(&table, 1, upper, false, MockPhy::new(), MockScheduler::new(), StdRng::seed_from_u64(1), Config::default()).unwrap();

            let frame = Frame::new(STA_ADDR, PEER_ADDR, false, b"closure").unwrap();
            wifi.read(&encode(&frame));

            let (_phy, _sched, _upper) = wifi.destroy();
        }

        assert_eq!(received, vec![(1, b"closure".to_vec())]);
    }

    #[test]
    fn custom_checksum() {
        struct Fixed;

        impl Checksum for Fixed {
            fn crc32(&self, _data: &[u8]) -> u32 {
                0x1234_5678
            }
        }

        let h = setup(false, Config::default());
        let phy = h.phy.clone();
        let mut wifi = h.wifi.with_checksum(Fixed);

        wifi.write(PEER_ADDR, b"fixed");

        let frame = Frame::decode(&phy.writes()[0].1).unwrap();
        assert_eq!(frame.checksum, 0x1234_5678);
        assert_eq!(h.sched.total(), 0);
    }
}
