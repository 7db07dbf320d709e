//! Origin-destination runs: one search per origin on the rayon pool, with
//! every destination turned into an [`OdRecord`] and written in batches.
//! Unreached destinations get a record without a [`Travel`].

use std::convert::Infallible;
use std::sync::Mutex;

use rayon::prelude::*;

use crate::mapper::{Attachment, MappablePoint, Mapping};
use crate::result::{Arrival, SearchResult};
use crate::router::{Origin, Router, SearchOptions, Termination};

/// A mapped origin or destination with the value it carries.
#[derive(Clone, Debug, PartialEq)]
pub struct OdPoint {
    pub id: String,
    pub attachment: Attachment,
    pub value: f64,
}

/// Builds OD points from mapped points, dropping the unmapped ones.
pub fn od_points(points: &[MappablePoint], mapping: &Mapping, value: impl Fn(&MappablePoint) -> f64) -> Vec<OdPoint> {
    points
        .iter()
        .zip(mapping.attachments())
        .filter_map(|(point, attachment)| {
            Some(OdPoint { id: point.id.clone(), attachment: attachment?, value: value(point) })
        })
        .collect()
}

/// How a destination was reached.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Travel {
    pub distance: f64,
    pub tt: f64,
    // Scaled by the origin's value.
    pub weighted_distance: f64,
    pub weighted_tt: f64,
    pub used_transit: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OdRecord {
    pub origin: String,
    pub destination: String,
    pub weight: f64,
    // Destination value scaled by the origin's value.
    pub weighted_value: f64,
    // `None` when the destination was not reached.
    pub travel: Option<Travel>,
}

impl OdRecord {
    fn new(origin: &OdPoint, destination: &OdPoint, travel: Option<Travel>) -> Self {
        Self {
            origin: origin.id.clone(),
            destination: destination.id.clone(),
            weight: origin.value,
            weighted_value: destination.value * origin.value,
            travel,
        }
    }

    pub fn is_reached(&self) -> bool {
        self.travel.is_some()
    }
}

impl Travel {
    fn new(origin: &OdPoint, arrival: &Arrival, used_transit: bool) -> Self {
        Self {
            distance: arrival.distance,
            tt: arrival.tt,
            weighted_distance: arrival.distance * origin.value,
            weighted_tt: arrival.tt * origin.value,
            used_transit,
        }
    }
}

/// Destination of OD records.
pub trait ResultSink {
    type Error: std::error::Error + Send + Sync + 'static;

    fn write_batch(&mut self, records: &[OdRecord]) -> Result<(), Self::Error>;
}

impl ResultSink for Vec<OdRecord> {
    type Error = Infallible;

    fn write_batch(&mut self, records: &[OdRecord]) -> Result<(), Infallible> {
        self.extend_from_slice(records);
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum OdError<E> {
    #[error("Writing results failed: {0}")]
    Sink(#[source] E),
    #[error("The result writer was poisoned by a panicking worker.")]
    Poisoned,
}

struct Batch<S> {
    sink: S,
    buffer: Vec<OdRecord>,
    written: usize,
}

/// Buffers records from many workers and hands them to the sink `batch_size` at a time.
pub struct BatchWriter<S> {
    batch: Mutex<Batch<S>>,
    batch_size: usize,
}

impl<S: ResultSink> BatchWriter<S> {
    pub fn new(sink: S, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self { batch: Mutex::new(Batch { sink, buffer: Vec::with_capacity(batch_size), written: 0 }), batch_size }
    }

    pub fn push(&self, record: OdRecord) -> Result<(), OdError<S::Error>> {
        let mut batch = self.batch.lock().map_err(|_| OdError::Poisoned)?;
        batch.buffer.push(record);
        if batch.buffer.len() >= self.batch_size {
            Self::drain(&mut batch)?;
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<(), OdError<S::Error>> {
        let mut batch = self.batch.lock().map_err(|_| OdError::Poisoned)?;
        Self::drain(&mut batch)
    }

    fn drain(batch: &mut Batch<S>) -> Result<(), OdError<S::Error>> {
        if batch.buffer.is_empty() {
            return Ok(());
        }
        let Batch { sink, buffer, written } = batch;
        sink.write_batch(buffer).map_err(OdError::Sink)?;
        *written += buffer.len();
        buffer.clear();
        Ok(())
    }

    /// Records handed to the sink so far.
    pub fn written(&self) -> usize {
        self.batch.lock().map_or(0, |batch| batch.written)
    }

    /// Flushes and returns the sink.
    pub fn into_inner(self) -> Result<S, OdError<S::Error>> {
        let mut batch = self.batch.into_inner().map_err(|_| OdError::Poisoned)?;
        Self::drain(&mut batch)?;
        Ok(batch.sink)
    }
}

#[derive(Clone, Debug, Default)]
pub struct OdOptions {
    pub search: SearchOptions,
    // Drop reached pairs whose fastest path does not ride transit.
    pub require_transit: bool,
}

impl OdOptions {
    /// Ends each search once all destinations are final.
    pub fn bounded(search: SearchOptions) -> Self {
        Self { search: SearchOptions { termination: Termination::AllDestinations, ..search }, require_transit: false }
    }
}

fn records_for(
    origin: &OdPoint,
    destinations: &[OdPoint],
    result: &SearchResult,
    require_transit: bool,
) -> Vec<OdRecord> {
    let attachments: Vec<Attachment> = destinations.iter().map(|d| d.attachment).collect();
    destinations
        .iter()
        .zip(result.arrivals(&attachments))
        .filter_map(|(destination, arrival)| match arrival {
            Some(arrival) => {
                let used_transit = result.used_transit(arrival.label);
                (used_transit || !require_transit)
                    .then(|| OdRecord::new(origin, destination, Some(Travel::new(origin, &arrival, used_transit))))
            }
            None => Some(OdRecord::new(origin, destination, None)),
        })
        .collect()
}

/// Routes from every origin to all destinations in parallel. Returns the number of records written.
pub fn route_many<S: ResultSink + Send>(
    router: &Router,
    origins: &[OdPoint],
    destinations: &[OdPoint],
    options: &OdOptions,
    writer: &BatchWriter<S>,
) -> Result<usize, OdError<S::Error>> {
    let attachments: Vec<Attachment> = destinations.iter().map(|d| d.attachment).collect();
    origins.par_iter().try_for_each(|origin| {
        let result = router.route(Origin::Edge(origin.attachment), &attachments, &options.search);
        let records = records_for(origin, destinations, &result, options.require_transit);
        let reached = records.iter().filter(|record| record.is_reached()).count();
        log::trace!("Origin '{}': {reached} of {} destinations reached.", origin.id, destinations.len());
        records.into_iter().try_for_each(|record| writer.push(record))
    })?;
    writer.flush()?;
    let written = writer.written();
    log::info!("Routed {} origins, wrote {written} OD records.", origins.len());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::{ModeRegistry, ModeSet};
    use crate::network::{EdgeId, Network, NewEdge, NodeId};
    use approx::assert_relative_eq;
    use geo::{coord, LineString};

    fn corridor() -> (Network, Vec<EdgeId>) {
        let mut network = Network::new();
        let nodes: Vec<NodeId> =
            (0..4).map(|i| network.get_or_create_node(i, coord! { x: i as f64 * 100., y: 0. })).collect();
        let mut forward = Vec::new();
        for pair in nodes.windows(2) {
            let geometry = LineString::new(vec![network.node(pair[0]).pos, network.node(pair[1]).pos]);
            let reversed = crate::geometry::reversed(&geometry);
            let there = network
                .add_edge(NewEdge { name: format!("{}>", pair[0].0), from: pair[0], to: pair[1], modes: ModeSet(1), speed: 1., geometry, length: None })
                .unwrap();
            let back = network
                .add_edge(NewEdge { name: format!("{}<", pair[0].0), from: pair[1], to: pair[0], modes: ModeSet(1), speed: 1., geometry: reversed, length: None })
                .unwrap();
            network.link_opposites(there, back);
            forward.push(there);
        }
        (network, forward)
    }

    fn point(id: &str, edge: EdgeId, offset: f64, value: f64) -> OdPoint {
        OdPoint { id: id.into(), attachment: Attachment { edge, offset }, value }
    }

    struct FailingSink;

    #[derive(thiserror::Error, Debug)]
    #[error("disk full")]
    struct DiskFull;

    impl ResultSink for FailingSink {
        type Error = DiskFull;

        fn write_batch(&mut self, _: &[OdRecord]) -> Result<(), DiskFull> {
            Err(DiskFull)
        }
    }

    #[test]
    fn writes_one_record_per_pair() {
        let (network, edges) = corridor();
        let mut registry = ModeRegistry::empty();
        registry.add("walk", "walk", None, false, None).unwrap();
        let router = Router::new(&network, &registry);
        let origins = [point("o1", edges[0], 50., 2.), point("o2", edges[2], 50., 1.)];
        let destinations = [point("d1", edges[1], 50., 10.), point("d2", edges[2], 80., 3.)];

        let writer = BatchWriter::new(Vec::new(), 3);
        let written = route_many(&router, &origins, &destinations, &OdOptions::default(), &writer).unwrap();
        assert_eq!(written, 4);
        let mut records = writer.into_inner().unwrap();
        records.sort_by(|a, b| (&a.origin, &a.destination).cmp(&(&b.origin, &b.destination)));

        let o1_d1 = &records[0];
        assert_eq!((o1_d1.origin.as_str(), o1_d1.destination.as_str()), ("o1", "d1"));
        assert_relative_eq!(o1_d1.weighted_value, 20.);
        let travel = o1_d1.travel.unwrap();
        assert_relative_eq!(travel.tt, 100.);
        assert_relative_eq!(travel.weighted_tt, 200.);
        assert!(!travel.used_transit);

        // d2 lies behind o2's position on the same edge pair
        let travel = records[3].travel.unwrap();
        assert_relative_eq!(travel.distance, 30.);
        assert_relative_eq!(travel.weighted_distance, 30.);
    }

    #[test]
    fn transit_only_runs_skip_walking_pairs() {
        let (network, edges) = corridor();
        let mut registry = ModeRegistry::empty();
        registry.add("walk", "walk", None, false, None).unwrap();
        let router = Router::new(&network, &registry);
        let origins = [point("o", edges[0], 0., 1.)];
        let destinations = [point("d", edges[2], 10., 1.)];
        let options = OdOptions { require_transit: true, ..OdOptions::bounded(SearchOptions::default()) };

        let writer = BatchWriter::new(Vec::new(), 10);
        assert_eq!(route_many(&router, &origins, &destinations, &options, &writer).unwrap(), 0);
        assert!(writer.into_inner().unwrap().is_empty());
    }

    #[test]
    fn unreached_pairs_are_written_without_travel() {
        let (mut network, edges) = corridor();
        let island: Vec<NodeId> =
            (10..12).map(|i| network.get_or_create_node(i, coord! { x: i as f64 * 100., y: 900. })).collect();
        let geometry = LineString::new(vec![network.node(island[0]).pos, network.node(island[1]).pos]);
        let cut_off = network
            .add_edge(NewEdge { name: "island".into(), from: island[0], to: island[1], modes: ModeSet(1), speed: 1., geometry, length: None })
            .unwrap();
        let mut registry = ModeRegistry::empty();
        registry.add("walk", "walk", None, false, None).unwrap();
        let router = Router::new(&network, &registry);
        let origins = [point("o", edges[0], 0., 1.)];
        let destinations = [point("reach", edges[1], 10., 2.), point("island", cut_off, 10., 4.)];

        for options in [OdOptions::default(), OdOptions { require_transit: true, ..OdOptions::default() }] {
            let writer = BatchWriter::new(Vec::new(), 10);
            route_many(&router, &origins, &destinations, &options, &writer).unwrap();
            let records = writer.into_inner().unwrap();
            let island = records.iter().find(|record| record.destination == "island").unwrap();
            assert_eq!(island.travel, None);
            assert_relative_eq!(island.weighted_value, 4.);
            // walking pairs only count without the transit requirement
            assert_eq!(records.len(), if options.require_transit { 1 } else { 2 });
        }
    }

    #[test]
    fn sink_errors_surface() {
        let writer = BatchWriter::new(FailingSink, 2);
        let record = OdRecord { origin: "a".into(), destination: "b".into(), weight: 1., weighted_value: 1., travel: None };
        assert!(writer.push(record.clone()).is_ok());
        assert!(matches!(writer.push(record), Err(OdError::Sink(DiskFull))));
    }

    #[test]
    fn unmapped_points_are_dropped() {
        let points = [
            MappablePoint { id: "a".into(), position: coord! { x: 0., y: 0. }, modes: ModeSet(1) },
            MappablePoint { id: "b".into(), position: coord! { x: 9., y: 9. }, modes: ModeSet(1) },
        ];
        let mapping = Mapping {
            results: vec![
                None,
                Some(crate::mapper::MapResult { edge: EdgeId(3), point: coord! { x: 9., y: 0. }, offset: 9., distance: 9. }),
            ],
            unmapped: 1,
        };
        let od = od_points(&points, &mapping, |_| 1.5);
        assert_eq!(od, vec![point("b", EdgeId(3), 9., 1.5)]);
    }
}
