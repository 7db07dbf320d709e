//! Public transit schedule.
//!
//! Stops are spliced into the road network; every pair of consecutive stops
//! served by some trip gets one transit edge carrying all scheduled
//! connections between them, sorted by departure time.

pub mod gtfs;

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, NaiveDate, Weekday};
use geo::{Coord, LineString};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::mapper::{splice, AccessEdges, MappablePoint, Mapping, NearestEdgeFinder};
use crate::modes::{EntrainmentMap, ModeId, ModeRegistry, ModeSet};
use crate::network::{EdgeId, Network, NetworkError, NewEdge, NodeId};
use crate::price::PriceFunction;

/// Seconds since midnight of the service day; may exceed 24h.
pub type Timestamp = u32;
pub type RouteIndex = u32;
pub type TripIndex = u32;
pub type ServiceIndex = u32;

// Padding applied to a lone connection that departs and arrives at the same second.
const ZERO_DWELL_PADDING: Timestamp = 15;

#[derive(thiserror::Error, Debug)]
pub enum ScheduleError {
    #[error("Invalid time '{0}'.")]
    InvalidTime(String),
    #[error("Unknown exception type {code} for service '{service}'.")]
    UnknownExceptionType { service: String, code: u8 },
    #[error("A connection of line '{line}' departs at {departure} and arrives at {arrival}.")]
    DepartureAfterArrival { line: String, departure: Timestamp, arrival: Timestamp },
    #[error("Stop time references unknown trip '{0}'.")]
    UnknownTrip(String),
    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// One scheduled vehicle run over a transit edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Connection {
    pub edge: EdgeId,
    pub trip: TripIndex,
    pub route: RouteIndex,
    pub service: ServiceIndex,
    pub departure: Timestamp,
    pub arrival: Timestamp,
}

/// Index of the first connection departing at or after `threshold` in a
/// departure-sorted slice.
pub fn earliest_departure(connections: &[Connection], threshold: Timestamp) -> Option<usize> {
    let i = connections.partition_point(|connection| connection.departure < threshold);
    (i < connections.len()).then_some(i)
}

/// Removes zero-duration hops from the connections of one trip, in trip order.
///
/// A connection departing and arriving at the same second is either padded by
/// 15s on both sides or, when neighbouring connections share its departure or
/// arrival time, the whole run is re-spaced evenly between the first real
/// departure and the last real arrival.
pub fn correct_zero_dwell(connections: &mut [Connection], line: &str) -> Result<(), ScheduleError> {
    for i in 0..connections.len() {
        let current = connections[i];
        if current.departure > current.arrival {
            return Err(ScheduleError::DepartureAfterArrival {
                line: line.to_owned(),
                departure: current.departure,
                arrival: current.arrival,
            });
        }
        if current.departure != current.arrival {
            continue;
        }

        let mut begin = i;
        while begin > 0 && connections[begin].departure == current.departure {
            begin -= 1;
        }
        let mut end = i;
        while end + 1 < connections.len() && connections[end].arrival == current.arrival {
            end += 1;
        }

        if begin == end {
            connections[i].departure = current.departure.saturating_sub(ZERO_DWELL_PADDING);
            connections[i].arrival = current.arrival + ZERO_DWELL_PADDING;
        } else {
            let span = connections[end].arrival.saturating_sub(connections[begin].departure);
            let step = span / (end - begin + 1) as Timestamp;
            let mut t = connections[begin].departure;
            for connection in &mut connections[begin..=end] {
                connection.departure = t;
                t += step;
                connection.arrival = t;
            }
        }
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WeekdayFlags(u8);

impl WeekdayFlags {
    pub fn set(&mut self, weekday: Weekday) {
        self.0 |= 1 << weekday.num_days_from_monday();
    }

    pub fn contains(self, weekday: Weekday) -> bool {
        self.0 & (1 << weekday.num_days_from_monday()) != 0
    }

    pub fn from_bools(mon: bool, tue: bool, wed: bool, thu: bool, fri: bool, sat: bool, sun: bool) -> Self {
        let days = [
            (mon, Weekday::Mon),
            (tue, Weekday::Tue),
            (wed, Weekday::Wed),
            (thu, Weekday::Thu),
            (fri, Weekday::Fri),
            (sat, Weekday::Sat),
            (sun, Weekday::Sun),
        ];
        let mut flags = Self::default();
        for (runs, weekday) in days {
            if runs {
                flags.set(weekday);
            }
        }
        flags
    }
}

/// Dates a service operates on: a weekly pattern within a date window,
/// adjusted by explicitly added and removed dates.
#[derive(Clone, Debug, Default)]
pub struct ServiceCalendar {
    pub window: Option<(NaiveDate, NaiveDate)>,
    pub weekdays: WeekdayFlags,
    pub added: HashSet<NaiveDate>,
    pub removed: HashSet<NaiveDate>,
}

impl ServiceCalendar {
    pub fn runs_on(&self, date: NaiveDate) -> bool {
        if self.added.contains(&date) {
            return true;
        }
        if self.removed.contains(&date) {
            return false;
        }
        match self.window {
            Some((start, end)) => start <= date && date <= end && self.weekdays.contains(date.weekday()),
            None => false,
        }
    }
}

/// Builds the calendar of every service named in the feed.
pub fn service_calendars(feed: &Feed) -> Result<HashMap<String, ServiceCalendar>, ScheduleError> {
    let mut calendars: HashMap<String, ServiceCalendar> = HashMap::new();
    for record in &feed.calendar {
        let calendar = calendars.entry(record.service_id.clone()).or_default();
        calendar.window = Some((record.start_date, record.end_date));
        calendar.weekdays = record.weekdays;
    }
    for record in &feed.calendar_dates {
        let calendar = calendars.entry(record.service_id.clone()).or_default();
        match record.exception_type {
            1 => calendar.added.insert(record.date),
            2 => calendar.removed.insert(record.date),
            code => {
                return Err(ScheduleError::UnknownExceptionType { service: record.service_id.clone(), code });
            }
        };
    }
    Ok(calendars)
}

#[derive(Clone, Debug)]
pub struct StopRecord {
    pub id: String,
    pub name: String,
    // In the network's reference system.
    pub position: Coord,
}

#[derive(Clone, Debug)]
pub struct RouteRecord {
    pub id: String,
    pub short_name: String,
    pub long_name: String,
    pub route_type: i32,
}

#[derive(Clone, Debug)]
pub struct TripRecord {
    pub id: String,
    pub route_id: String,
    pub service_id: String,
}

#[derive(Clone, Debug)]
pub struct StopTimeRecord {
    pub trip_id: String,
    pub stop_id: String,
    pub sequence: u32,
    pub arrival: Timestamp,
    pub departure: Timestamp,
}

impl StopTimeRecord {
    /// Builds a record from `HH:MM:SS` or plain-seconds time fields.
    pub fn parse(trip_id: &str, stop_id: &str, sequence: u32, arrival: &str, departure: &str) -> Result<Self, ScheduleError> {
        Ok(Self {
            trip_id: trip_id.to_owned(),
            stop_id: stop_id.to_owned(),
            sequence,
            arrival: crate::utils::parse_time(arrival)?,
            departure: crate::utils::parse_time(departure)?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct CalendarRecord {
    pub service_id: String,
    pub weekdays: WeekdayFlags,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Clone, Debug)]
pub struct CalendarDateRecord {
    pub service_id: String,
    pub date: NaiveDate,
    // 1 adds the date, 2 removes it.
    pub exception_type: u8,
}

#[derive(Clone, Debug)]
pub struct TransferRecord {
    pub from_stop_id: String,
    pub to_stop_id: String,
    pub transfer_type: u8,
    pub min_transfer_time: Option<Timestamp>,
    pub from_trip_id: Option<String>,
    pub to_trip_id: Option<String>,
}

/// Plain timetable records, independent of where they were read from.
#[derive(Clone, Debug, Default)]
pub struct Feed {
    pub stops: Vec<StopRecord>,
    pub routes: Vec<RouteRecord>,
    pub trips: Vec<TripRecord>,
    pub stop_times: Vec<StopTimeRecord>,
    pub calendar: Vec<CalendarRecord>,
    pub calendar_dates: Vec<CalendarDateRecord>,
    pub transfers: Vec<TransferRecord>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScheduleOptions {
    // Without a date every trip is read.
    pub date: Option<NaiveDate>,
    // GTFS route types to keep; empty keeps all.
    pub route_types: Vec<i32>,
    pub access_modes: ModeSet,
    // m/s
    pub access_speed: f64,
    pub boarding_fare: Option<f64>,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            date: None,
            route_types: Vec::new(),
            // foot and bicycle of the default registry
            access_modes: ModeSet(0b11),
            access_speed: 50. / 3.6,
            boarding_fare: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Stop {
    pub id: Box<str>,
    pub name: Box<str>,
    pub node: NodeId,
}

#[derive(Clone, Debug)]
pub struct Route {
    pub id: Box<str>,
    pub short_name: Box<str>,
    pub long_name: Box<str>,
    pub route_type: i32,
    pub mode: ModeId,
}

impl Route {
    /// The name reported for this route in results.
    pub fn line(&self) -> &str {
        if self.short_name.is_empty() { &self.id } else { &self.short_name }
    }
}

#[derive(Clone, Debug)]
pub struct Trip {
    pub id: Box<str>,
    pub route: RouteIndex,
    pub service: ServiceIndex,
}

/// Minimum interchange times at one stop.
#[derive(Clone, Debug, Default)]
pub struct Interchange {
    // Applies to any pair of routes without a specific entry.
    pub any: Option<Timestamp>,
    pub by_routes: HashMap<(RouteIndex, RouteIndex), Timestamp>,
}

pub struct Schedule {
    stops: Vec<Stop>,
    stop_index: HashMap<Box<str>, usize>,
    routes: Vec<Route>,
    trips: Vec<Trip>,
    services: Vec<Box<str>>,
    interchanges: HashMap<NodeId, Interchange>,
    transit_edges: Vec<EdgeId>,
    entrainment: EntrainmentMap,
    num_connections: usize,
}

impl Schedule {
    pub fn new(entrainment: EntrainmentMap) -> Self {
        Self {
            stops: Vec::new(),
            stop_index: HashMap::new(),
            routes: Vec::new(),
            trips: Vec::new(),
            services: Vec::new(),
            interchanges: HashMap::new(),
            transit_edges: Vec::new(),
            entrainment,
            num_connections: 0,
        }
    }

    /// Splices the feed's stops into `network` and builds its transit edges.
    pub fn assemble(
        network: &mut Network,
        feed: &Feed,
        registry: &ModeRegistry,
        entrainment: EntrainmentMap,
        options: &ScheduleOptions,
    ) -> Result<Self, ScheduleError> {
        let mut schedule = Schedule::new(entrainment);
        schedule.splice_stops(network, &feed.stops, options)?;

        let mut route_index: HashMap<&str, RouteIndex> = HashMap::new();
        for record in &feed.routes {
            if !options.route_types.is_empty() && !options.route_types.contains(&record.route_type) {
                continue;
            }
            let Some(mode) = registry.for_route_type(record.route_type) else {
                log::warn!("Skipping route '{}' of unsupported type {}.", record.id, record.route_type);
                continue;
            };
            let index = schedule.add_route(Route {
                id: record.id.as_str().into(),
                short_name: record.short_name.as_str().into(),
                long_name: record.long_name.as_str().into(),
                route_type: record.route_type,
                mode,
            });
            route_index.insert(record.id.as_str(), index);
        }

        let active = match options.date {
            Some(date) => {
                let calendars = service_calendars(feed)?;
                let active: HashSet<String> = calendars
                    .into_iter()
                    .filter(|(_, calendar)| calendar.runs_on(date))
                    .map(|(service, _)| service)
                    .collect();
                Some(active)
            }
            None => {
                log::info!("No service date given; all trips are read.");
                None
            }
        };

        let mut trip_index: HashMap<&str, TripIndex> = HashMap::new();
        let mut service_index: HashMap<&str, ServiceIndex> = HashMap::new();
        for record in &feed.trips {
            if active.as_ref().is_some_and(|active| !active.contains(&record.service_id)) {
                continue;
            }
            let Some(&route) = route_index.get(record.route_id.as_str()) else {
                continue;
            };
            let service = match service_index.get(record.service_id.as_str()) {
                Some(&service) => service,
                None => {
                    let service = schedule.services.len() as ServiceIndex;
                    schedule.services.push(record.service_id.as_str().into());
                    service_index.insert(record.service_id.as_str(), service);
                    service
                }
            };
            let trip = schedule.add_trip(Trip { id: record.id.as_str().into(), route, service });
            trip_index.insert(record.id.as_str(), trip);
        }

        let known_trips: HashSet<&str> = feed.trips.iter().map(|trip| trip.id.as_str()).collect();
        let mut stop_times: HashMap<&str, Vec<&StopTimeRecord>> = HashMap::new();
        for record in &feed.stop_times {
            if !known_trips.contains(record.trip_id.as_str()) {
                return Err(ScheduleError::UnknownTrip(record.trip_id.clone()));
            }
            if trip_index.contains_key(record.trip_id.as_str()) {
                stop_times.entry(record.trip_id.as_str()).or_default().push(record);
            }
        }

        let mut trips: Vec<(&str, TripIndex)> = trip_index.iter().map(|(&id, &trip)| (id, trip)).collect();
        trips.sort_unstable_by_key(|&(_, trip)| trip);

        let mut pair2edge: HashMap<(NodeId, NodeId), EdgeId> = HashMap::new();
        let mut per_edge: HashMap<EdgeId, Vec<Connection>> = HashMap::new();
        for (trip_id, trip) in trips {
            let Some(times) = stop_times.get_mut(trip_id) else {
                continue;
            };
            times.sort_by_key(|record| record.sequence);
            let Trip { route, service, .. } = schedule.trips[trip as usize];

            let mut trip_connections = Vec::with_capacity(times.len().saturating_sub(1));
            for pair in times.windows(2) {
                let (last, next) = (pair[0], pair[1]);
                let (Some(from), Some(to)) = (schedule.stop_node(&last.stop_id), schedule.stop_node(&next.stop_id)) else {
                    log::debug!("Trip '{trip_id}': skipping hop {} -> {} between unallocated stops.", last.stop_id, next.stop_id);
                    continue;
                };
                if from == to {
                    continue;
                }
                let edge = schedule.transit_edge(network, &mut pair2edge, (from, to), (last.stop_id.as_str(), next.stop_id.as_str()), route, options)?;
                trip_connections.push(Connection {
                    edge,
                    trip,
                    route,
                    service,
                    departure: last.departure,
                    arrival: next.arrival,
                });
            }
            correct_zero_dwell(&mut trip_connections, schedule.routes[route as usize].line())?;
            for connection in trip_connections {
                per_edge.entry(connection.edge).or_default().push(connection);
            }
        }

        for (edge, mut connections) in per_edge {
            connections.sort_unstable_by_key(|connection| (connection.departure, connection.arrival, connection.trip));
            schedule.num_connections += connections.len();
            network.edge_mut(edge).connections = Some(connections);
        }
        schedule.transit_edges = pair2edge.into_values().collect();
        schedule.transit_edges.sort_unstable();

        schedule.read_transfers(&feed.transfers, &trip_index);

        log::info!(
            "Schedule: {} stops, {} routes, {} trips, {} connections on {} transit edges.",
            schedule.stops.len(),
            schedule.routes.len(),
            schedule.trips.len(),
            schedule.num_connections,
            schedule.transit_edges.len()
        );
        Ok(schedule)
    }

    fn splice_stops(&mut self, network: &mut Network, records: &[StopRecord], options: &ScheduleOptions) -> Result<(), ScheduleError> {
        let points: Vec<MappablePoint> = records
            .iter()
            .map(|record| MappablePoint { id: record.id.clone(), position: record.position, modes: options.access_modes })
            .collect();
        let mapping = NearestEdgeFinder::new(network, options.access_modes).map_all(&points);
        let unmapped = mapping.unmapped;

        let mut mapped_points = Vec::with_capacity(points.len());
        let mut mapped_results = Vec::with_capacity(points.len());
        let mut mapped_records = Vec::with_capacity(points.len());
        let mut stop_nodes = Vec::with_capacity(points.len());
        for ((point, result), record) in points.into_iter().zip(mapping.results).zip(records) {
            if result.is_none() {
                continue;
            }
            stop_nodes.push(network.create_node(point.position));
            mapped_points.push(point);
            mapped_results.push(result);
            mapped_records.push(record);
        }

        let mapping = Mapping { results: mapped_results, unmapped: 0 };
        let access = AccessEdges { modes: options.access_modes, speed: options.access_speed };
        splice(network, &mapped_points, &mapping, &stop_nodes, access)?;

        for (record, node) in mapped_records.into_iter().zip(stop_nodes) {
            self.add_stop(Stop { id: record.id.as_str().into(), name: record.name.as_str().into(), node });
        }
        log::info!("{} stops spliced into the network, {unmapped} could not be allocated.", self.stops.len());
        Ok(())
    }

    // Creates the transit edge between two stops on first use; later routes add their modes.
    fn transit_edge(
        &self,
        network: &mut Network,
        pair2edge: &mut HashMap<(NodeId, NodeId), EdgeId>,
        (from, to): (NodeId, NodeId),
        (from_stop, to_stop): (&str, &str),
        route: RouteIndex,
        options: &ScheduleOptions,
    ) -> Result<EdgeId, NetworkError> {
        let carrier = self.routes[route as usize].mode;
        let modes = ModeSet::of(carrier) | self.entrainment.carried(carrier);
        if let Some(&edge) = pair2edge.get(&(from, to)) {
            let edge = network.edge_mut(edge);
            edge.modes = edge.modes | modes;
            return Ok(edge.id);
        }

        let geometry = LineString::new(vec![network.node(from).pos, network.node(to).pos]);
        let edge = network.add_edge(NewEdge {
            name: format!("pt-{from_stop}-{to_stop}"),
            from,
            to,
            modes,
            // travel times come from the connections
            speed: 0.,
            geometry,
            length: None,
        })?;
        let transit = network.edge_mut(edge);
        transit.connections = Some(Vec::new());
        transit.price = options.boarding_fare.map(PriceFunction::fare);
        pair2edge.insert((from, to), edge);
        Ok(edge)
    }

    fn read_transfers(&mut self, transfers: &[TransferRecord], trip_index: &HashMap<&str, TripIndex>) {
        for record in transfers {
            if record.transfer_type != 2 || record.from_stop_id != record.to_stop_id {
                continue;
            }
            // may lie outside the network
            let Some(node) = self.stop_node(&record.from_stop_id) else {
                continue;
            };
            let time = record.min_transfer_time.unwrap_or(0);
            match (&record.from_trip_id, &record.to_trip_id) {
                (Some(from_trip), Some(to_trip)) => {
                    match (trip_index.get(from_trip.as_str()), trip_index.get(to_trip.as_str())) {
                        (Some(&from_trip), Some(&to_trip)) => {
                            let key = (self.trips[from_trip as usize].route, self.trips[to_trip as usize].route);
                            self.interchanges.entry(node).or_default().by_routes.insert(key, time);
                        }
                        _ => log::warn!("Skipping transfer at '{}' between unknown trips.", record.from_stop_id),
                    }
                }
                _ => self.interchanges.entry(node).or_default().any = Some(time),
            }
        }
    }

    pub fn add_stop(&mut self, stop: Stop) -> usize {
        let index = self.stops.len();
        self.stop_index.insert(stop.id.clone(), index);
        self.stops.push(stop);
        index
    }

    pub fn add_route(&mut self, route: Route) -> RouteIndex {
        self.routes.push(route);
        (self.routes.len() - 1) as RouteIndex
    }

    pub fn add_trip(&mut self, trip: Trip) -> TripIndex {
        self.trips.push(trip);
        (self.trips.len() - 1) as TripIndex
    }

    pub fn set_interchange_time(&mut self, node: NodeId, routes: Option<(RouteIndex, RouteIndex)>, time: Timestamp) {
        let interchange = self.interchanges.entry(node).or_default();
        match routes {
            Some(routes) => {
                interchange.by_routes.insert(routes, time);
            }
            None => interchange.any = Some(time),
        }
    }

    /// Minimum time needed at `node` to change from `from` to `to`, if one is recorded.
    pub fn interchange_time(&self, node: NodeId, from: RouteIndex, to: RouteIndex) -> Option<Timestamp> {
        let interchange = self.interchanges.get(&node)?;
        interchange.by_routes.get(&(from, to)).copied().or(interchange.any)
    }

    pub fn stops(&self) -> &[Stop] { &self.stops }

    pub fn stop(&self, id: &str) -> Option<&Stop> {
        self.stop_index.get(id).map(|&i| &self.stops[i])
    }

    pub fn stop_node(&self, id: &str) -> Option<NodeId> {
        self.stop(id).map(|stop| stop.node)
    }

    pub fn routes(&self) -> &[Route] { &self.routes }

    pub fn route(&self, route: RouteIndex) -> &Route { &self.routes[route as usize] }

    pub fn trips(&self) -> &[Trip] { &self.trips }

    pub fn trip(&self, trip: TripIndex) -> &Trip { &self.trips[trip as usize] }

    pub fn service_id(&self, service: ServiceIndex) -> &str { &self.services[service as usize] }

    pub fn transit_edges(&self) -> &[EdgeId] { &self.transit_edges }

    pub fn entrainment(&self) -> &EntrainmentMap { &self.entrainment }

    pub fn num_connections(&self) -> usize { self.num_connections }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    fn connection(departure: Timestamp, arrival: Timestamp) -> Connection {
        Connection { edge: EdgeId(0), trip: 0, route: 0, service: 0, departure, arrival }
    }

    #[test]
    fn earliest_departure_matches_linear_scan() {
        let connections: Vec<Connection> =
            [100, 200, 200, 400].iter().map(|&t| connection(t, t + 60)).collect();
        assert_eq!(earliest_departure(&connections, 150), Some(1));
        assert_eq!(earliest_departure(&connections, 200), Some(1));
        assert_eq!(earliest_departure(&connections, 0), Some(0));
        assert_eq!(earliest_departure(&connections, 401), None);

        for _ in 0..200 {
            let mut times: Vec<Timestamp> = (0..fastrand::usize(0..20)).map(|_| fastrand::u32(0..1000)).collect();
            times.sort_unstable();
            let connections: Vec<Connection> = times.iter().map(|&t| connection(t, t)).collect();
            let threshold = fastrand::u32(0..1100);
            let linear = connections.iter().position(|c| c.departure >= threshold);
            assert_eq!(earliest_departure(&connections, threshold), linear);
        }
    }

    #[test]
    fn zero_dwell_run_is_respaced() {
        let mut connections = vec![connection(90, 100), connection(100, 100), connection(100, 130)];
        correct_zero_dwell(&mut connections, "1").unwrap();
        let times: Vec<(Timestamp, Timestamp)> = connections.iter().map(|c| (c.departure, c.arrival)).collect();
        assert_eq!(times, vec![(90, 103), (103, 116), (116, 129)]);
        for c in &connections {
            assert!(c.departure < c.arrival);
            assert!(c.departure >= 90 && c.arrival <= 130);
        }
    }

    #[test]
    fn lone_zero_dwell_connection_is_padded() {
        let mut connections = vec![connection(100, 100)];
        correct_zero_dwell(&mut connections, "1").unwrap();
        assert_eq!((connections[0].departure, connections[0].arrival), (85, 115));

        let mut early = vec![connection(5, 5)];
        correct_zero_dwell(&mut early, "1").unwrap();
        assert_eq!((early[0].departure, early[0].arrival), (0, 20));
    }

    #[test]
    fn departure_after_arrival_is_an_error() {
        let mut connections = vec![connection(200, 100)];
        let result = correct_zero_dwell(&mut connections, "S1");
        assert!(matches!(result, Err(ScheduleError::DepartureAfterArrival { departure: 200, arrival: 100, .. })));
    }

    #[test]
    fn calendar_applies_exceptions() {
        let date = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
        let feed = Feed {
            calendar: vec![CalendarRecord {
                service_id: "weekdays".into(),
                weekdays: WeekdayFlags::from_bools(true, true, true, true, true, false, false),
                start_date: date(1),
                end_date: date(31),
            }],
            calendar_dates: vec![
                CalendarDateRecord { service_id: "weekdays".into(), date: date(2), exception_type: 2 },
                CalendarDateRecord { service_id: "weekdays".into(), date: date(6), exception_type: 1 },
                CalendarDateRecord { service_id: "special".into(), date: date(7), exception_type: 1 },
            ],
            ..Feed::default()
        };
        let calendars = service_calendars(&feed).unwrap();
        let weekdays = &calendars["weekdays"];
        assert!(weekdays.runs_on(date(3))); // Wednesday
        assert!(!weekdays.runs_on(date(2))); // removed
        assert!(weekdays.runs_on(date(6))); // Saturday, added
        assert!(!weekdays.runs_on(date(7))); // Sunday
        assert!(calendars["special"].runs_on(date(7)));
        assert!(!calendars["special"].runs_on(date(8)));

        let bad = Feed {
            calendar_dates: vec![CalendarDateRecord { service_id: "x".into(), date: date(1), exception_type: 3 }],
            ..Feed::default()
        };
        assert!(matches!(service_calendars(&bad), Err(ScheduleError::UnknownExceptionType { code: 3, .. })));
    }

    #[test]
    fn parses_stop_time_records() {
        let record = StopTimeRecord::parse("t", "s", 1, "08:00:00", "28860").unwrap();
        assert_eq!((record.arrival, record.departure), (28800, 28860));
        assert!(StopTimeRecord::parse("t", "s", 1, "8h", "08:00:00").is_err());
    }

    fn street_feed() -> (Network, Feed) {
        let mut network = Network::new();
        let a = network.get_or_create_node(1, coord! { x: 0., y: 0. });
        let b = network.get_or_create_node(2, coord! { x: 1000., y: 0. });
        for (name, from, to) in [("street", a, b), ("-street", b, a)] {
            let geometry = LineString::new(vec![network.node(from).pos, network.node(to).pos]);
            network
                .add_edge(NewEdge { name: name.into(), from, to, modes: ModeSet(0b111), speed: 10., geometry, length: None })
                .unwrap();
        }
        network.link_opposites(EdgeId(0), EdgeId(1));

        let stop = |id: &str, x: f64| StopRecord { id: id.into(), name: id.to_uppercase(), position: coord! { x: x, y: 10. } };
        let stop_time = |trip: &str, stop: &str, sequence, arrival, departure| StopTimeRecord {
            trip_id: trip.into(),
            stop_id: stop.into(),
            sequence,
            arrival,
            departure,
        };
        let feed = Feed {
            stops: vec![stop("s1", 100.), stop("s2", 500.), stop("s3", 900.)],
            routes: vec![
                RouteRecord { id: "r_bus".into(), short_name: "42".into(), long_name: String::new(), route_type: 3 },
                RouteRecord { id: "r_tram".into(), short_name: "T1".into(), long_name: String::new(), route_type: 0 },
            ],
            trips: vec![
                TripRecord { id: "bus_1".into(), route_id: "r_bus".into(), service_id: "daily".into() },
                TripRecord { id: "tram_1".into(), route_id: "r_tram".into(), service_id: "sundays".into() },
            ],
            stop_times: vec![
                stop_time("bus_1", "s2", 2, 160, 170),
                stop_time("bus_1", "s1", 1, 100, 100),
                stop_time("bus_1", "s3", 3, 260, 260),
                stop_time("tram_1", "s1", 1, 50, 60),
                stop_time("tram_1", "s2", 2, 120, 120),
            ],
            calendar: vec![
                CalendarRecord {
                    service_id: "daily".into(),
                    weekdays: WeekdayFlags::from_bools(true, true, true, true, true, true, true),
                    start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                    end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
                },
                CalendarRecord {
                    service_id: "sundays".into(),
                    weekdays: WeekdayFlags::from_bools(false, false, false, false, false, false, true),
                    start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                    end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
                },
            ],
            calendar_dates: Vec::new(),
            transfers: vec![TransferRecord {
                from_stop_id: "s2".into(),
                to_stop_id: "s2".into(),
                transfer_type: 2,
                min_transfer_time: Some(120),
                from_trip_id: Some("bus_1".into()),
                to_trip_id: Some("tram_1".into()),
            }],
        };
        (network, feed)
    }

    #[test]
    fn assembles_transit_edges_from_stop_times() {
        let (mut network, feed) = street_feed();
        let registry = ModeRegistry::default();
        let entrainment = EntrainmentMap::with_defaults(&registry);
        let options = ScheduleOptions {
            date: Some(NaiveDate::from_ymd_opt(2024, 3, 6).unwrap()), // Wednesday
            boarding_fare: Some(2.),
            ..ScheduleOptions::default()
        };
        let schedule = Schedule::assemble(&mut network, &feed, &registry, entrainment, &options).unwrap();

        assert_eq!(schedule.stops().len(), 3);
        // the tram only runs on Sundays
        assert_eq!(schedule.trips().len(), 1);
        assert_eq!(schedule.transit_edges().len(), 2);
        assert_eq!(schedule.num_connections(), 2);

        let s1 = schedule.stop_node("s1").unwrap();
        let s2 = schedule.stop_node("s2").unwrap();
        let hop = network.node(s1).outgoing.iter().map(|&e| network.edge(e)).find(|e| e.is_transit()).unwrap();
        assert_eq!(hop.to, s2);
        let bus = registry.id("bus").unwrap();
        assert!(hop.allows(bus));
        assert!(hop.allows(registry.id("bicycle").unwrap()));
        assert_eq!(hop.price, Some(PriceFunction::fare(2.)));
        let connections = hop.connections.as_ref().unwrap();
        assert_eq!((connections[0].departure, connections[0].arrival), (100, 160));
        assert_eq!(schedule.route(connections[0].route).line(), "42");

        // the tram trip is filtered, so its transfer is not resolvable
        assert_eq!(schedule.interchange_time(s2, 0, 0), None);
        assert_eq!(network.node(s1).incoming.len(), 1);
    }

    #[test]
    fn without_a_date_every_trip_is_read() {
        let (mut network, feed) = street_feed();
        let registry = ModeRegistry::default();
        let entrainment = EntrainmentMap::with_defaults(&registry);
        let schedule =
            Schedule::assemble(&mut network, &feed, &registry, entrainment, &ScheduleOptions::default()).unwrap();
        assert_eq!(schedule.trips().len(), 2);
        // bus and tram share the s1 -> s2 edge
        assert_eq!(schedule.transit_edges().len(), 2);
        assert_eq!(schedule.num_connections(), 3);
        let s1 = schedule.stop_node("s1").unwrap();
        let s2 = schedule.stop_node("s2").unwrap();
        let shared = network.node(s1).outgoing.iter().map(|&e| network.edge(e)).find(|e| e.is_transit()).unwrap();
        assert!(shared.allows(registry.id("tram").unwrap()));
        assert!(shared.allows(registry.id("bus").unwrap()));
        let departures: Vec<Timestamp> = shared.connections.as_ref().unwrap().iter().map(|c| c.departure).collect();
        assert_eq!(departures, vec![60, 100]);
        assert_eq!(schedule.interchange_time(s2, 0, 1), Some(120));
    }

    #[test]
    fn route_type_filter_and_unknown_trips() {
        let (mut network, mut feed) = street_feed();
        let registry = ModeRegistry::default();
        let options = ScheduleOptions { route_types: vec![0], ..ScheduleOptions::default() };
        let schedule =
            Schedule::assemble(&mut network, &feed, &registry, EntrainmentMap::new(), &options).unwrap();
        assert_eq!(schedule.routes().len(), 1);
        assert_eq!(schedule.trips().len(), 1);

        let (mut network, _) = street_feed();
        feed.stop_times.push(StopTimeRecord {
            trip_id: "ghost".into(),
            stop_id: "s1".into(),
            sequence: 1,
            arrival: 0,
            departure: 0,
        });
        let result = Schedule::assemble(&mut network, &feed, &registry, EntrainmentMap::new(), &options);
        assert!(matches!(result, Err(ScheduleError::UnknownTrip(trip)) if trip == "ghost"));
    }
}
