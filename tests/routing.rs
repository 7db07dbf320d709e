use access::label::LabelId;
use access::mapper::Attachment;
use access::modes::{EntrainmentMap, ModeRegistry, ModeSet};
use access::network::{EdgeId, Network, NewEdge, NodeId};
use access::router::{Cutoff, Origin, Router, SearchOptions};
use access::schedule::{Connection, Route, Schedule, Timestamp, Trip};
use access::WeightFunction;
use approx::assert_relative_eq;
use dev_utils::{add_street, get_example_scenario, get_example_start_time, random_attachments};
use geo::{coord, LineString};

fn nodes(network: &mut Network, xs: &[f64]) -> Vec<NodeId> {
    xs.iter().enumerate().map(|(i, &x)| network.get_or_create_node(i as i64, coord! { x: x, y: 0. })).collect()
}

fn edge(network: &mut Network, from: NodeId, to: NodeId, modes: ModeSet, speed: f64) -> EdgeId {
    let geometry = LineString::new(vec![network.node(from).pos, network.node(to).pos]);
    network
        .add_edge(NewEdge { name: format!("{}-{}", from.0, to.0), from, to, modes, speed, geometry, length: None })
        .unwrap()
}

#[test]
fn single_edge_from_a_to_b() {
    let mut network = Network::new();
    let ab = nodes(&mut network, &[0., 100.]);
    edge(&mut network, ab[0], ab[1], ModeSet(0b100), 10.);
    let registry = ModeRegistry::default();
    let router = Router::new(&network, &registry);
    let options = SearchOptions { modes: ModeSet::of(registry.id("passenger").unwrap()), ..SearchOptions::default() };

    let result = router.route(Origin::Node(ab[0]), &[], &options);
    let at_b = result.node_best(ab[1]).unwrap();
    assert_relative_eq!(result.labels()[at_b].tt, 10.);
    assert_eq!(result.labels()[at_b].prev, result.node_best(ab[0]));
    assert!(result.labels()[result.node_best(ab[0]).unwrap()].is_origin());
}

struct Lines {
    network: Network,
    schedule: Schedule,
    registry: ModeRegistry,
    stops: Vec<NodeId>,
}

// Stop 0 -bus-> stop 1 -tram-> stop 2, with default entrainment.
fn bus_then_tram(tram_departures: &[Timestamp]) -> Lines {
    let registry = ModeRegistry::default();
    let (bus, tram) = (registry.id("bus").unwrap(), registry.id("tram").unwrap());
    let entrainment = EntrainmentMap::with_defaults(&registry);
    let mut network = Network::new();
    let stops = nodes(&mut network, &[0., 1000., 2000.]);
    let mut schedule = Schedule::new(entrainment.clone());

    let line = |network: &mut Network, schedule: &mut Schedule, name: &str, route_type, mode, from, to, departures: &[Timestamp]| {
        let route = schedule.add_route(Route {
            id: name.into(),
            short_name: name.into(),
            long_name: String::new().into(),
            route_type,
            mode,
        });
        let hop = edge(network, from, to, ModeSet::of(mode) | entrainment.carried(mode), 0.);
        let connections = departures
            .iter()
            .map(|&departure| {
                let trip = schedule.add_trip(Trip { id: format!("{name}{departure}").into(), route, service: 0 });
                Connection { edge: hop, trip, route, service: 0, departure, arrival: departure + 100 }
            })
            .collect();
        network.edge_mut(hop).connections = Some(connections);
        route
    };
    line(&mut network, &mut schedule, "B", 3, bus, stops[0], stops[1], &[100]);
    line(&mut network, &mut schedule, "T", 0, tram, stops[1], stops[2], tram_departures);
    Lines { network, schedule, registry, stops }
}

fn all_modes(registry: &ModeRegistry, names: &str) -> ModeSet {
    registry.parse_modes(names).unwrap()
}

#[test]
fn bicycles_ride_the_bus_but_not_the_tram() {
    let Lines { network, schedule, registry, stops } = bus_then_tram(&[300]);
    let router = Router::new(&network, &registry).with_schedule(&schedule);
    let bicycle = registry.id("bicycle").unwrap();
    let foot = registry.id("foot").unwrap();
    let options = SearchOptions { modes: all_modes(&registry, "foot;bicycle;bus;tram"), ..SearchOptions::default() };

    let result = router.route(Origin::Node(stops[0]), &[], &options);
    let on_bus = &result.labels()[result.node_best(stops[1]).unwrap()];
    assert_eq!(on_bus.used_mode, registry.id("bus"));
    assert!(on_bus.available_modes.contains(bicycle));
    assert!(on_bus.available_modes.contains(foot));

    let on_tram = &result.labels()[result.node_best(stops[2]).unwrap()];
    assert_eq!(on_tram.used_mode, registry.id("tram"));
    assert!(!on_tram.available_modes.contains(bicycle));
    assert!(on_tram.available_modes.contains(foot));
    assert_eq!(on_tram.transfers(), 1);
    assert_relative_eq!(on_tram.tt, 400.);
}

#[test]
fn cyclists_without_foot_cannot_change_to_the_tram() {
    let Lines { network, schedule, registry, stops } = bus_then_tram(&[300]);
    let router = Router::new(&network, &registry).with_schedule(&schedule);
    let options = SearchOptions { modes: all_modes(&registry, "bicycle;bus;tram"), ..SearchOptions::default() };

    let result = router.route(Origin::Node(stops[0]), &[], &options);
    assert!(result.node_best(stops[1]).is_some());
    assert!(result.node_best(stops[2]).is_none());
}

#[test]
fn interchange_times_delay_the_change() {
    let Lines { network, mut schedule, registry, stops } = bus_then_tram(&[300, 360]);
    schedule.set_interchange_time(stops[1], Some((0, 1)), 150);
    let router = Router::new(&network, &registry).with_schedule(&schedule);
    let options = SearchOptions { modes: all_modes(&registry, "foot;bus;tram"), ..SearchOptions::default() };

    let result = router.route(Origin::Node(stops[0]), &[], &options);
    let on_tram = &result.labels()[result.node_best(stops[2]).unwrap()];
    // the bus arrives at 200, so the 300 tram is missed
    assert_relative_eq!(on_tram.tt, 460.);
    assert_relative_eq!(on_tram.interchange_tt, 160.);
}

#[test]
fn transfer_limits_stop_at_the_first_line() {
    let Lines { network, schedule, registry, stops } = bus_then_tram(&[300]);
    let router = Router::new(&network, &registry).with_schedule(&schedule);
    let modes = all_modes(&registry, "foot;bus;tram");
    let capped = SearchOptions { modes, cutoff: Cutoff { max_transfers: Some(0), ..Cutoff::default() }, ..SearchOptions::default() };
    let limited = SearchOptions { modes, weight: WeightFunction::MaxInterchangesTravelTime { max: 0 }, ..SearchOptions::default() };

    for options in [capped, limited] {
        let result = router.route(Origin::Node(stops[0]), &[], &options);
        let on_bus = result.node_best(stops[1]).unwrap();
        assert_eq!(result.labels()[on_bus].transfers(), 0);
        assert!(result.node_best(stops[2]).is_none());
    }

    let free = router.route(Origin::Node(stops[0]), &[], &SearchOptions { modes, ..SearchOptions::default() });
    assert_eq!(free.labels()[free.node_best(stops[2]).unwrap()].transfers(), 1);
}

#[test]
fn connection_lookup_picks_the_next_departure() {
    let registry = ModeRegistry::default();
    let bus = registry.id("bus").unwrap();
    let mut network = Network::new();
    let stops = nodes(&mut network, &[0., 150., 1150.]);
    edge(&mut network, stops[0], stops[1], ModeSet::of(0), 10.);
    let mut entrainment = EntrainmentMap::new();
    entrainment.add(bus, ModeSet::of(0));
    let mut schedule = Schedule::new(entrainment);
    let route = schedule.add_route(Route { id: "r".into(), short_name: "5".into(), long_name: "".into(), route_type: 3, mode: bus });
    let hop = edge(&mut network, stops[1], stops[2], ModeSet::of(0) | ModeSet::of(bus), 0.);
    let connections = [100, 200, 400]
        .into_iter()
        .map(|departure| {
            let trip = schedule.add_trip(Trip { id: format!("t{departure}").into(), route, service: 0 });
            Connection { edge: hop, trip, route, service: 0, departure, arrival: departure + 50 }
        })
        .collect();
    network.edge_mut(hop).connections = Some(connections);

    // a person walking, uncapped at 10 m/s here, reaches the stop at t=150
    let mut walk = ModeRegistry::empty();
    for mode in registry.modes() {
        let max_speed = if mode.id == 0 { None } else { mode.max_speed };
        walk.add(&mode.name, &mode.mml, max_speed, mode.public_transit, mode.gtfs_route_type).unwrap();
    }
    let router = Router::new(&network, &walk).with_schedule(&schedule);
    let options = SearchOptions { start_time: 135, modes: ModeSet::of(0) | ModeSet::of(bus), ..SearchOptions::default() };
    let result = router.route(Origin::Node(stops[0]), &[], &options);
    let label = &result.labels()[result.node_best(stops[2]).unwrap()];
    assert_relative_eq!(label.interchange_tt, 50.);
    assert_relative_eq!(label.tt, 15. + 50. + 50.);
    let path = result.path(result.node_best(stops[2]).unwrap());
    assert_eq!(path.len(), 2);
    assert_eq!(path[1].line_mode_id, "5");
    assert_eq!(path[0].line_mode_id, "foot");
}

fn check_chain(network: &Network, result: &access::SearchResult, id: LabelId) {
    let labels = result.labels();
    for step in labels.chain(id) {
        if let Some(edge) = labels[step].edge {
            assert!(network.edge(edge).modes.is_superset(labels[step].available_modes));
        }
    }
    for (later, earlier) in labels.chain(id).zip(labels.chain(id).skip(1)) {
        assert!(labels[later].tt >= labels[earlier].tt);
        assert!(labels[later].distance >= labels[earlier].distance);
    }
    let path = result.path(id);
    assert_eq!(path.len(), labels.depth(id));
    assert_relative_eq!(path.iter().map(|s| s.tt).sum::<f64>(), labels[id].tt, epsilon = 1e-6);
}

#[test]
fn labels_on_the_example_grid_are_consistent() {
    let (network, registry, schedule) = get_example_scenario(8);
    let router = Router::new(&network, &registry).with_schedule(&schedule);
    let mut rng = fastrand::Rng::with_seed(42);

    for weight in [WeightFunction::TravelTime, WeightFunction::InterchangesTravelTime, WeightFunction::PriceTravelTime] {
        let options = SearchOptions {
            start_time: get_example_start_time(),
            modes: all_modes(&registry, "foot;bus"),
            weight,
            ..SearchOptions::default()
        };
        for origin in random_attachments(&network, 5, &mut rng) {
            let result = router.route(Origin::Edge(origin), &[], &options);
            // the grid is connected on foot
            assert_eq!(result.reached().count(), network.num_nodes());
            for (_, id) in result.reached() {
                check_chain(&network, &result, id);
            }
        }
    }
}

#[test]
fn buses_speed_up_long_trips_on_the_grid() {
    let (network, registry, schedule) = get_example_scenario(8);
    let router = Router::new(&network, &registry).with_schedule(&schedule);
    let start = network.node_by_ext_id(4 * 8).unwrap();
    let end = network.node_by_ext_id(4 * 8 + 7).unwrap();
    // 80 s before a bus leaves the first stop
    let walking = SearchOptions { start_time: 8 * 3600 + 28 * 60 + 40, modes: all_modes(&registry, "foot"), ..SearchOptions::default() };
    let riding = SearchOptions { modes: all_modes(&registry, "foot;bus"), ..walking.clone() };

    let on_foot = router.route(Origin::Node(start), &[], &walking);
    let by_bus = router.route(Origin::Node(start), &[], &riding);
    let on_foot_tt = on_foot.labels()[on_foot.node_best(end).unwrap()].tt;
    let best = by_bus.node_best(end).unwrap();
    assert!(by_bus.labels()[best].tt < on_foot_tt);
    assert!(by_bus.used_transit(best));
    assert!(!on_foot.used_transit(on_foot.node_best(end).unwrap()));
}

#[test]
fn unreachable_destinations_are_reported() {
    let mut network = Network::new();
    let island = nodes(&mut network, &[0., 100., 5000., 5100.]);
    let (near, _) = add_street(&mut network, island[0], island[1], ModeSet(1), 10.);
    let (far, _) = add_street(&mut network, island[2], island[3], ModeSet(1), 10.);
    let registry = ModeRegistry::default();
    let router = Router::new(&network, &registry);

    let result = router.route(Origin::Node(island[0]), &[], &SearchOptions::default());
    let arrivals = result.arrivals(&[Attachment { edge: far, offset: 10. }, Attachment { edge: near, offset: 10. }]);
    assert_eq!(arrivals.len(), 2);
    assert!(arrivals[0].is_none());
    assert!(arrivals[1].is_some());
}
