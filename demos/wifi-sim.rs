//! WiFi data link simulation
//!
//! Runs a number of access points and clients on one shared wireless
//! medium as a discrete event simulation. One simulation time unit is
//! treated as one microsecond.
//
// https://github.com/rust-iot/rust-lpwan
// Copyright 2021 Ryan Kurte

use std::cell::RefCell;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::convert::Infallible;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use rand::{Rng, SeedableRng, rngs::StdRng};

use structopt::StructOpt;

use wifi_dll::prelude::*;


#[derive(Debug, StructOpt)]
struct Options {

    #[structopt(long, default_value = "1")]
    /// Number of access points
    pub aps: usize,

    #[structopt(long, default_value = "4")]
    /// Number of clients
    pub clients: usize,

    #[structopt(long, default_value = "10")]
    /// Frames sent by each station
    pub frames: usize,

    #[structopt(long, default_value = "1500")]
    /// Maximum payload length
    pub max_payload: usize,

    #[structopt(long, default_value = "8")]
    /// Air time per byte
    pub byte_time: Ts,

    #[structopt(long, default_value = "1s")]
    /// Simulated time limit
    pub limit: humantime::Duration,

    #[structopt(long)]
    /// Seed for the simulation RNG, random if unset
    pub seed: Option<u64>,

    #[structopt(long)]
    /// Verify checksums on received frames
    pub verify: bool,

    #[structopt(long, default_value = "info")]
    /// Configure log level
    pub log_level: simplelog::LevelFilter,
}

#[derive(Debug)]
enum Event {
    /// Station generates a frame
    Send(usize),
    /// Timer fired for a station
    Timer(usize, TimerEvent),
    /// Frame finished transmission
    Deliver(usize, Vec<u8>),
}

#[derive(Debug)]
struct Queued {
    at: Ts,
    seq: u64,
    event: Event,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        (self.at, self.seq) == (other.at, other.seq)
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    // Reversed for a min-heap on (time, insertion order)
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (other.at, other.seq).cmp(&(self.at, self.seq))
    }
}

/// Shared wireless medium and event queue
#[derive(Debug, Default)]
struct Air {
    now: Ts,
    busy_until: Ts,
    byte_time: Ts,
    seq: u64,
    queue: BinaryHeap<Queued>,
}

impl Air {
    fn push(&mut self, at: Ts, event: Event) {
        let seq = self.seq;
        self.seq += 1;
        self.queue.push(Queued{ at, seq, event });
    }
}

/// Station view of the medium
struct SimPhy {
    air: Rc<RefCell<Air>>,
    station: usize,
}

impl Phy for SimPhy {
    type Error = Infallible;

    fn carrier_sense(&mut self, _link: LinkId) -> Result<bool, Self::Error> {
        let air = self.air.borrow();
        Ok(air.now < air.busy_until)
    }

    fn write_physical(&mut self, _link: LinkId, data: &[u8]) -> Result<(), Self::Error> {
        let mut air = self.air.borrow_mut();

        let done = air.now + data.len() as Ts * air.byte_time;
        air.busy_until = air.busy_until.max(done);

        let station = self.station;
        air.push(done, Event::Deliver(station, data.to_vec()));

        Ok(())
    }
}

/// Station timers, scheduled on the shared queue
struct SimScheduler {
    air: Rc<RefCell<Air>>,
    station: usize,
    next_id: TimerId,
}

impl Scheduler for SimScheduler {
    fn schedule_once(&mut self, delay: Ts, event: TimerEvent) -> TimerId {
        let mut air = self.air.borrow_mut();

        let at = air.now.saturating_add(delay);
        air.push(at, Event::Timer(self.station, event));

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }
}

fn address(index: usize) -> NicAddr {
    NicAddr([0x02, 0x00, 0x00, 0x00, (index >> 8) as u8, index as u8])
}

fn main() -> anyhow::Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    // Bind exit handler
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })?;

    // Load options
    let opts = Options::from_args();

    // Initialise logging
    let _ = simplelog::SimpleLogger::init(opts.log_level, simplelog::Config::default());

    if opts.max_payload == 0 || opts.max_payload > WIFI_MAXDATA {
        return Err(anyhow::anyhow!("max payload must be within 1..={}", WIFI_MAXDATA));
    }

    let seed = opts.seed.unwrap_or_else(rand::random);
    let limit = Duration::from(opts.limit).as_micros() as Ts;

    info!("Starting wifi-sim ({} APs, {} clients, seed {})", opts.aps, opts.clients, seed);

    let mut rng = StdRng::seed_from_u64(seed);
    let air = Rc::new(RefCell::new(Air{ byte_time: opts.byte_time, ..Default::default() }));
    let received = Rc::new(RefCell::new(vec![0u32; opts.aps + opts.clients]));

    let config = WifiConfig {
        verify_rx_checksum: opts.verify,
        ..Default::default()
    };

    debug!("Initialising stations");

    let mut stations = Vec::new();
    for i in 0..opts.aps + opts.clients {
        let links = [
            LinkInfo::new(LinkKind::Loopback, NicAddr::default()),
            LinkInfo::new(LinkKind::Wlan, address(i)),
        ];

        let phy = SimPhy{ air: air.clone(), station: i };
        let scheduler = SimScheduler{ air: air.clone(), station: i, next_id: 0 };

        let rx = received.clone();
        let upper = move |link: LinkId, data: &[u8]| {
            debug!("Station {} link {} received {} bytes", i, link, data.len());
            rx.borrow_mut()[i] += 1;
        };

        let is_ds = i < opts.aps;
        let station_rng = StdRng::seed_from_u64(rng.gen());

        let wifi = match Wifi::new(&links, 1, upper, is_ds, phy, scheduler, station_rng, config.clone()) {
            Ok(w) => w,
            Err(e) => {
                return Err(anyhow::anyhow!("Error initialising station {}: {:?}", i, e));
            }
        };

        stations.push(wifi);
    }

    // Spread initial traffic over the first part of the run
    for i in 0..stations.len() {
        for _ in 0..opts.frames {
            let at = rng.gen_range(0..limit.max(1) / 2 + 1);
            air.borrow_mut().push(at, Event::Send(i));
        }
    }

    debug!("Starting loop");

    while running.load(Ordering::SeqCst) {
        let next = air.borrow_mut().queue.pop();
        let Queued{ at, event, .. } = match next {
            Some(q) => q,
            None => break,
        };

        if at > limit {
            warn!("Simulation time limit reached");
            break;
        }

        air.borrow_mut().now = at;

        match event {
            Event::Send(i) => {
                // APs send to clients and clients to APs
                let peers = match stations[i].is_ds() {
                    true => opts.aps..opts.aps + opts.clients,
                    false => 0..opts.aps,
                };

                if peers.is_empty() {
                    continue;
                }

                let dest = address(rng.gen_range(peers));
                let len = rng.gen_range(1..=opts.max_payload);
                let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();

                stations[i].write(dest, &data);
            },
            Event::Timer(i, timer) => {
                stations[i].handle_timer(timer);
            },
            Event::Deliver(from, data) => {
                for (j, s) in stations.iter_mut().enumerate() {
                    if j != from {
                        s.read(&data);
                    }
                }
            },
        }
    }

    let now = air.borrow().now;
    info!("Finished at {}", humantime::format_duration(Duration::from_micros(now)));

    let received = received.borrow();
    for (i, s) in stations.iter().enumerate() {
        let kind = if s.is_ds() { "ap" } else { "client" };
        info!("{} {:?} rx {} {:?}", kind, s.address(), received[i], s.stats());
    }

    Ok(())
}
