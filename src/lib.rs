pub mod modes;

pub use modes::{EntrainmentMap, ModeId, ModeRegistry, ModeSet};

pub mod geometry;
pub mod spatial;

pub mod network;

pub use network::{Edge, EdgeId, Network, NetworkError, NewEdge, Node, NodeId};

pub mod mapper;

pub use mapper::{splice, AccessEdges, Attachment, MappablePoint, NearestEdgeFinder};

pub mod schedule;

pub use schedule::{Feed, Schedule, ScheduleError, ScheduleOptions, Timestamp};

pub mod price;
pub mod measure;

pub use measure::{Measures, WeightFunction};

pub mod label;
pub mod router;

pub use router::{Cutoff, Origin, Router, SearchOptions, Termination};

pub mod result;

pub use result::{Arrival, SearchResult, Segment};

pub mod od;

pub use od::{route_many, BatchWriter, OdPoint, OdRecord, ResultSink, Travel};

pub mod utils;
