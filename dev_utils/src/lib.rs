use access::mapper::Attachment;
use access::modes::{EntrainmentMap, ModeRegistry, ModeSet};
use access::network::{EdgeId, Network, NewEdge, NodeId};
use access::schedule::{
    CalendarRecord, Feed, RouteRecord, Schedule, ScheduleOptions, StopRecord, StopTimeRecord, Timestamp, TripRecord,
    WeekdayFlags,
};
use access::{geometry, utils};
use chrono::NaiveDate;
use geo::{coord, LineString};

// Common synthetic data for the integration tests and benchmarks.

pub const GRID_SPACING: f64 = 200.;

// foot, bicycle and passenger of the default registry
pub const STREET_MODES: ModeSet = ModeSet(0b111);

pub fn get_example_date() -> NaiveDate {
    const { utils::const_unwrap(NaiveDate::from_ymd_opt(2024, 5, 10)) }
}

pub fn get_example_transfer_time() -> Timestamp {
    3 * 60 // 3 minutes transfer time.
}

pub fn get_example_start_time() -> Timestamp {
    8 * 3600 + 30 * 60
}

/// Adds a street and its reverse twin between two nodes.
pub fn add_street(network: &mut Network, from: NodeId, to: NodeId, modes: ModeSet, speed: f64) -> (EdgeId, EdgeId) {
    let geometry = LineString::new(vec![network.node(from).pos, network.node(to).pos]);
    let reversed = geometry::reversed(&geometry);
    let (a, b) = (network.node(from).ext_id, network.node(to).ext_id);
    let there = network
        .add_edge(NewEdge { name: format!("{a}-{b}"), from, to, modes, speed, geometry, length: None })
        .unwrap();
    let back = network
        .add_edge(NewEdge { name: format!("{b}-{a}"), from: to, to: from, modes, speed, geometry: reversed, length: None })
        .unwrap();
    network.link_opposites(there, back);
    (there, back)
}

/// A `size` x `size` street grid with two-way streets at 50 km/h.
pub fn grid_network(size: usize) -> Network {
    let mut network = Network::new();
    let node = |network: &mut Network, row: usize, col: usize| {
        network.get_or_create_node(
            (row * size + col) as i64,
            coord! { x: col as f64 * GRID_SPACING, y: row as f64 * GRID_SPACING },
        )
    };
    for row in 0..size {
        for col in 0..size {
            let here = node(&mut network, row, col);
            if col + 1 < size {
                let east = node(&mut network, row, col + 1);
                add_street(&mut network, here, east, STREET_MODES, 50. / 3.6);
            }
            if row + 1 < size {
                let north = node(&mut network, row + 1, col);
                add_street(&mut network, here, north, STREET_MODES, 50. / 3.6);
            }
        }
    }
    network
}

/// One bus line along the middle row of the grid, with a stop in the middle of
/// every block and a trip every `headway` seconds between 06:00 and 10:00.
pub fn line_feed(size: usize, headway: Timestamp) -> Feed {
    let row = (size / 2) as f64 * GRID_SPACING;
    let stops: Vec<StopRecord> = (0..size - 1)
        .map(|i| StopRecord {
            id: format!("stop_{i}"),
            name: format!("Block {i}"),
            position: coord! { x: (i as f64 + 0.5) * GRID_SPACING, y: row + 5. },
        })
        .collect();

    let mut feed = Feed {
        routes: vec![RouteRecord { id: "line_1".into(), short_name: "1".into(), long_name: "Crosstown".into(), route_type: 3 }],
        calendar: vec![CalendarRecord {
            service_id: "weekdays".into(),
            weekdays: WeekdayFlags::from_bools(true, true, true, true, true, false, false),
            start_date: const { utils::const_unwrap(NaiveDate::from_ymd_opt(2024, 1, 1)) },
            end_date: const { utils::const_unwrap(NaiveDate::from_ymd_opt(2024, 12, 31)) },
        }],
        ..Feed::default()
    };
    let mut start = 6 * 3600;
    while start < 10 * 3600 {
        let trip = format!("line_1_{start}");
        for (i, stop) in stops.iter().enumerate() {
            // 40 s per block plus 20 s dwell
            let arrival = start + i as Timestamp * 60;
            feed.stop_times.push(StopTimeRecord {
                trip_id: trip.clone(),
                stop_id: stop.id.clone(),
                sequence: i as u32,
                arrival,
                departure: arrival + 20,
            });
        }
        feed.trips.push(TripRecord { id: trip, route_id: "line_1".into(), service_id: "weekdays".into() });
        start += headway;
    }
    feed.stops = stops;
    feed
}

/// A grid with a spliced-in bus line running on the example date.
pub fn get_example_scenario(size: usize) -> (Network, ModeRegistry, Schedule) {
    let mut network = grid_network(size);
    let registry = ModeRegistry::default();
    let entrainment = EntrainmentMap::with_defaults(&registry);
    let options = ScheduleOptions { date: Some(get_example_date()), ..ScheduleOptions::default() };
    let schedule = Schedule::assemble(&mut network, &line_feed(size, 600), &registry, entrainment, &options).unwrap();
    (network, registry, schedule)
}

/// Random points on active road edges.
pub fn random_attachments(network: &Network, count: usize, rng: &mut fastrand::Rng) -> Vec<Attachment> {
    let roads: Vec<(EdgeId, f64)> =
        network.edges().filter(|edge| !edge.is_transit()).map(|edge| (edge.id, edge.length)).collect();
    (0..count)
        .map(|_| {
            let (edge, length) = roads[rng.usize(..roads.len())];
            Attachment { edge, offset: rng.f64() * length }
        })
        .collect()
}
