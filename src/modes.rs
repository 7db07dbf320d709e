use std::collections::HashMap;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Index of a mode in the registry; also its bit position in a [`ModeSet`].
pub type ModeId = u8;

/// A set of travel modes stored as a bitmask.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModeSet(pub u64);

impl ModeSet {
    pub const EMPTY: ModeSet = ModeSet(0);

    pub const fn of(mode: ModeId) -> Self {
        ModeSet(1 << mode)
    }

    pub const fn contains(self, mode: ModeId) -> bool {
        self.0 & (1 << mode) != 0
    }

    pub const fn intersects(self, other: ModeSet) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_superset(self, other: ModeSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn union(self, other: ModeSet) -> Self {
        ModeSet(self.0 | other.0)
    }

    pub const fn intersection(self, other: ModeSet) -> Self {
        ModeSet(self.0 & other.0)
    }

    pub const fn without(self, other: ModeSet) -> Self {
        ModeSet(self.0 & !other.0)
    }

    pub fn iter(self) -> impl Iterator<Item = ModeId> {
        (0..64u8).filter(move |&m| self.contains(m))
    }
}

impl std::ops::BitOr for ModeSet {
    type Output = ModeSet;

    fn bitor(self, rhs: ModeSet) -> ModeSet { self.union(rhs) }
}

impl std::ops::BitAnd for ModeSet {
    type Output = ModeSet;

    fn bitand(self, rhs: ModeSet) -> ModeSet { self.intersection(rhs) }
}

impl fmt::Display for ModeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#b}", self.0)
    }
}

pub struct Mode {
    pub id: ModeId,
    pub name: Box<str>,
    // Short symbolic id reported for hops without a transit line.
    pub mml: Box<str>,
    // Speed cap in m/s, applied on top of the edge's free-flow speed.
    pub max_speed: Option<f64>,
    pub public_transit: bool,
    pub gtfs_route_type: Option<i32>,
}

#[derive(thiserror::Error, Debug)]
pub enum ModeError {
    #[error("Unknown mode '{0}'.")]
    UnknownMode(String),
    #[error("Mode registry is full ({0} modes).")]
    RegistryFull(usize),
}

/// Immutable table of modes, built once per run and passed by reference.
pub struct ModeRegistry {
    modes: Vec<Mode>,
    by_name: HashMap<Box<str>, ModeId>,
}

impl ModeRegistry {
    pub fn empty() -> Self {
        Self { modes: Vec::new(), by_name: HashMap::new() }
    }

    pub fn add(
        &mut self,
        name: &str,
        mml: &str,
        max_speed: Option<f64>,
        public_transit: bool,
        gtfs_route_type: Option<i32>,
    ) -> Result<ModeId, ModeError> {
        if let Some(&id) = self.by_name.get(name) {
            return Ok(id);
        }
        if self.modes.len() >= 64 {
            return Err(ModeError::RegistryFull(self.modes.len()));
        }
        let id = self.modes.len() as ModeId;
        self.modes.push(Mode {
            id,
            name: name.into(),
            mml: mml.into(),
            max_speed,
            public_transit,
            gtfs_route_type,
        });
        self.by_name.insert(name.into(), id);
        Ok(id)
    }

    pub fn get(&self, id: ModeId) -> &Mode { &self.modes[id as usize] }

    pub fn id(&self, name: &str) -> Option<ModeId> { self.by_name.get(name).copied() }

    pub fn modes(&self) -> &[Mode] { &self.modes }

    pub fn set(&self, name: &str) -> Result<ModeSet, ModeError> {
        self.id(name)
            .map(ModeSet::of)
            .ok_or_else(|| ModeError::UnknownMode(name.to_owned()))
    }

    /// Parses a `;`- or `,`-separated list of mode names.
    pub fn parse_modes(&self, names: &str) -> Result<ModeSet, ModeError> {
        names
            .split([';', ','])
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .try_fold(ModeSet::EMPTY, |acc, name| Ok(acc | self.set(name)?))
    }

    pub fn for_route_type(&self, route_type: i32) -> Option<ModeId> {
        self.modes
            .iter()
            .find(|mode| mode.gtfs_route_type == Some(route_type))
            .map(|mode| mode.id)
    }

    pub fn transit_modes(&self) -> ModeSet {
        self.modes
            .iter()
            .filter(|mode| mode.public_transit)
            .fold(ModeSet::EMPTY, |acc, mode| acc | ModeSet::of(mode.id))
    }

    /// Speed used to traverse an edge with the given free-flow speed.
    pub fn effective_speed(&self, mode: ModeId, edge_speed: f64) -> f64 {
        match self.get(mode).max_speed {
            Some(cap) => cap.min(edge_speed),
            None => edge_speed,
        }
    }

    /// The fastest individual (non-transit) mode in `modes` on an edge of the given speed.
    pub fn fastest_individual(&self, modes: ModeSet, edge_speed: f64) -> Option<ModeId> {
        modes
            .iter()
            .filter(|&m| (m as usize) < self.modes.len() && !self.get(m).public_transit)
            .max_by(|&a, &b| {
                self.effective_speed(a, edge_speed)
                    .total_cmp(&self.effective_speed(b, edge_speed))
                    .then(b.cmp(&a))
            })
    }
}

impl Default for ModeRegistry {
    fn default() -> Self {
        const KMH: f64 = 1. / 3.6;
        let mut registry = ModeRegistry::empty();
        let individual = [
            ("foot", "foot", Some(5. * KMH)),
            ("bicycle", "bike", Some(15. * KMH)),
            ("passenger", "car", None),
        ];
        let transit = [
            ("tram", "tram", 0),
            ("subway", "subway", 1),
            ("rail", "rail", 2),
            ("bus", "bus", 3),
            ("ferry", "ferry", 4),
            ("cable_tram", "cable_tram", 5),
            ("aerial", "aerial", 6),
            ("funicular", "funicular", 7),
        ];
        // A fresh registry has room for all of these, so `add` cannot fail here.
        for (name, mml, max_speed) in individual {
            let _ = registry.add(name, mml, max_speed, false, None);
        }
        for (name, mml, route_type) in transit {
            let _ = registry.add(name, mml, None, true, Some(route_type));
        }
        registry
    }
}

/// Which modes may be carried aboard a vehicle of a carrier mode.
#[derive(Clone, Debug, Default)]
pub struct EntrainmentMap {
    carrier2carried: HashMap<ModeId, ModeSet>,
}

impl EntrainmentMap {
    pub fn new() -> Self { Self::default() }

    pub fn add(&mut self, carrier: ModeId, carried: ModeSet) {
        let entry = self.carrier2carried.entry(carrier).or_default();
        *entry = *entry | carried;
    }

    pub fn carried(&self, carrier: ModeId) -> ModeSet {
        self.carrier2carried.get(&carrier).copied().unwrap_or_default()
    }

    /// Whether a traveller holding `current` may ride aboard `carrier`.
    pub fn may_board(&self, current: Option<ModeId>, carrier: ModeId) -> bool {
        match current {
            None => true,
            Some(mode) if mode == carrier => true,
            Some(mode) => self.carried(carrier).contains(mode),
        }
    }

    pub fn with_defaults(registry: &ModeRegistry) -> Self {
        let mut map = EntrainmentMap::new();
        let foot = registry.id("foot").map(ModeSet::of).unwrap_or_default();
        let bicycle = registry.id("bicycle").map(ModeSet::of).unwrap_or_default();
        for mode in registry.modes().iter().filter(|mode| mode.public_transit) {
            map.add(mode.id, foot);
            if matches!(&*mode.name, "bus" | "rail" | "subway" | "ferry") {
                map.add(mode.id, bicycle);
            }
        }
        map
    }
}
