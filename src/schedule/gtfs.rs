//! Conversion from an in-memory `gtfs_structures` feed.
//!
//! Stop positions are copied as given (longitude as x, latitude as y); callers
//! working in a projected network transform `Feed::stops` before assembly.

use gtfs_structures::{Exception, Gtfs, RouteType, TransferType};

use super::{
    CalendarDateRecord, CalendarRecord, Feed, RouteRecord, StopRecord, StopTimeRecord, TransferRecord, TripRecord,
    WeekdayFlags,
};

/// Numeric GTFS `route_type` of a parsed route type.
pub fn route_type_code(route_type: &RouteType) -> i32 {
    match route_type {
        RouteType::Tramway => 0,
        RouteType::Subway => 1,
        RouteType::Rail => 2,
        RouteType::Bus => 3,
        RouteType::Ferry => 4,
        RouteType::CableCar => 5,
        RouteType::Gondola => 6,
        RouteType::Funicular => 7,
        RouteType::Coach => 200,
        RouteType::Air => 1100,
        RouteType::Taxi => 1500,
        RouteType::Other(code) => i32::from(*code),
    }
}

impl Feed {
    pub fn from_gtfs(gtfs: &Gtfs) -> Self {
        let mut feed = Feed::default();

        for (id, stop) in &gtfs.stops {
            let (Some(x), Some(y)) = (stop.longitude, stop.latitude) else {
                log::warn!("Stop '{id}' has no position and is skipped.");
                continue;
            };
            feed.stops.push(StopRecord {
                id: id.clone(),
                name: stop.name.clone().unwrap_or_default(),
                position: geo::Coord { x, y },
            });
            for transfer in &stop.transfers {
                // Only minimum-time transfers constrain interchanges.
                if !matches!(transfer.transfer_type, TransferType::MinTime) {
                    continue;
                }
                feed.transfers.push(TransferRecord {
                    from_stop_id: id.clone(),
                    to_stop_id: transfer.to_stop_id.clone(),
                    transfer_type: 2,
                    min_transfer_time: transfer.min_transfer_time,
                    from_trip_id: None,
                    to_trip_id: None,
                });
            }
        }

        for (id, route) in &gtfs.routes {
            feed.routes.push(RouteRecord {
                id: id.clone(),
                short_name: route.short_name.clone().unwrap_or_default(),
                long_name: route.long_name.clone().unwrap_or_default(),
                route_type: route_type_code(&route.route_type),
            });
        }

        for (id, trip) in &gtfs.trips {
            feed.trips.push(TripRecord {
                id: id.clone(),
                route_id: trip.route_id.clone(),
                service_id: trip.service_id.clone(),
            });
            for (sequence, stop_time) in trip.stop_times.iter().enumerate() {
                // Stops without any time are not timing points; the hop bridges over them.
                let (Some(arrival), Some(departure)) = (
                    stop_time.arrival_time.or(stop_time.departure_time),
                    stop_time.departure_time.or(stop_time.arrival_time),
                ) else {
                    log::debug!("Trip '{id}': stop '{}' has no times.", stop_time.stop.id);
                    continue;
                };
                feed.stop_times.push(StopTimeRecord {
                    trip_id: id.clone(),
                    stop_id: stop_time.stop.id.clone(),
                    sequence: sequence as u32,
                    arrival,
                    departure,
                });
            }
        }

        for (service_id, calendar) in &gtfs.calendar {
            feed.calendar.push(CalendarRecord {
                service_id: service_id.clone(),
                weekdays: WeekdayFlags::from_bools(
                    calendar.monday,
                    calendar.tuesday,
                    calendar.wednesday,
                    calendar.thursday,
                    calendar.friday,
                    calendar.saturday,
                    calendar.sunday,
                ),
                start_date: calendar.start_date,
                end_date: calendar.end_date,
            });
        }

        for (service_id, dates) in &gtfs.calendar_dates {
            for date in dates {
                let exception_type = match date.exception_type {
                    Exception::Added => 1,
                    Exception::Deleted => 2,
                };
                feed.calendar_dates.push(CalendarDateRecord { service_id: service_id.clone(), date: date.date, exception_type });
            }
        }

        // HashMap iteration order is arbitrary; keep assembly deterministic.
        feed.stops.sort_by(|a, b| a.id.cmp(&b.id));
        feed.routes.sort_by(|a, b| a.id.cmp(&b.id));
        feed.trips.sort_by(|a, b| a.id.cmp(&b.id));
        feed.stop_times.sort_by(|a, b| a.trip_id.cmp(&b.trip_id).then(a.sequence.cmp(&b.sequence)));

        log::info!(
            "Read {} stops, {} routes and {} trips from GTFS.",
            feed.stops.len(),
            feed.routes.len(),
            feed.trips.len()
        );
        feed
    }
}
