// Core types shared across the simulation.
//
// Defines grid coordinates (`Location`), the cell character alphabet
// (`Cell`), person identifiers, resources, and the structure/work kind
// enums. Everything serializes for snapshots.
//
// `Location`, `StructureKind`, and `WorkKind` key `BTreeMap`s all over
// the sim, so they serialize as compact strings rather than structs
// (serde_json requires string map keys).
//
// **Critical constraint: determinism.** `Location` has a total order
// (row-major: y then x) so it can key `BTreeMap`s, which is how every
// registry in the sim stays deterministically iterable.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;
use std::fmt;

// ---------------------------------------------------------------------------
// Spatial types
// ---------------------------------------------------------------------------

/// A position on the 2D grid. `x` is the column, `y` the row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    pub x: i32,
    pub y: i32,
}

impl Location {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Chebyshev adjacency: true when the two cells are at most one step
    /// apart on both axes (including diagonals). A location is one away
    /// from itself.
    pub fn is_one_away(self, other: Self) -> bool {
        (self.x - other.x).abs() <= 1 && (self.y - other.y).abs() <= 1
    }

    /// Euclidean distance between two cells.
    pub fn distance_to(self, other: Self) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }

    /// Chebyshev distance: the number of 8-connected steps between cells.
    pub fn chebyshev_distance(self, other: Self) -> u32 {
        (self.x - other.x)
            .unsigned_abs()
            .max((self.y - other.y).unsigned_abs())
    }

    /// The 8 neighboring locations, in a fixed order (row above, own row,
    /// row below; left to right). Bounds are not checked.
    pub fn neighbors(self) -> SmallVec<[Location; 8]> {
        const OFFSETS: [(i32, i32); 8] = [
            (-1, -1),
            (0, -1),
            (1, -1),
            (-1, 0),
            (1, 0),
            (-1, 1),
            (0, 1),
            (1, 1),
        ];
        OFFSETS
            .iter()
            .map(|&(dx, dy)| Location::new(self.x + dx, self.y + dy))
            .collect()
    }
}

// Row-major ordering (y, then x) so BTreeMap iteration scans the grid the
// way the parser does.
impl Ord for Location {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.y.cmp(&other.y).then_with(|| self.x.cmp(&other.x))
    }
}

impl PartialOrd for Location {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// Custom serde: serialize as "x,y" so Location can be used as a JSON map
// key (serde_json requires string keys).
impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&format_args!("{},{}", self.x, self.y))
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let (x, y) = s
            .split_once(',')
            .ok_or_else(|| serde::de::Error::custom("expected \"x,y\""))?;
        let x = x
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom("invalid x coordinate"))?;
        let y = y
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom("invalid y coordinate"))?;
        Ok(Location { x, y })
    }
}

// ---------------------------------------------------------------------------
// Person identifiers
// ---------------------------------------------------------------------------

/// Unique identifier for a person. Sequential, assigned at spawn; a
/// newborn's id is one past the current maximum.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PersonId(pub u32);

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PersonId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// The cell alphabet
// ---------------------------------------------------------------------------

/// One grid cell. The capital/lowercase pairs are {finished building,
/// construction site} for each building kind; trees and empty cells have
/// no construction variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cell {
    Empty,
    Tree,
    Home,
    HomeSite,
    Barn,
    BarnSite,
    Farm,
    FarmSite,
    Mine,
    MineSite,
}

impl Cell {
    /// Parse a cell from its grid character. Returns `None` for characters
    /// outside the alphabet.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            ' ' => Some(Cell::Empty),
            '*' => Some(Cell::Tree),
            'H' => Some(Cell::Home),
            'h' => Some(Cell::HomeSite),
            'B' => Some(Cell::Barn),
            'b' => Some(Cell::BarnSite),
            'F' => Some(Cell::Farm),
            'f' => Some(Cell::FarmSite),
            'M' => Some(Cell::Mine),
            'm' => Some(Cell::MineSite),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Cell::Empty => ' ',
            Cell::Tree => '*',
            Cell::Home => 'H',
            Cell::HomeSite => 'h',
            Cell::Barn => 'B',
            Cell::BarnSite => 'b',
            Cell::Farm => 'F',
            Cell::FarmSite => 'f',
            Cell::Mine => 'M',
            Cell::MineSite => 'm',
        }
    }

    /// Path cost for entering this cell. 0 means impassable.
    ///
    /// Empty cells are freely walkable; trees and most construction sites
    /// are expensive detours; finished buildings are impassable except the
    /// farm, which can be crossed at a price.
    pub fn path_cost(self) -> u32 {
        match self {
            Cell::Empty => 1,
            Cell::Tree => 10,
            Cell::Home | Cell::Barn | Cell::Mine => 0,
            Cell::Farm => 5,
            Cell::HomeSite | Cell::BarnSite | Cell::MineSite => 10,
            Cell::FarmSite => 3,
        }
    }

    /// True for cells that block vision rays (anything that is not empty).
    pub fn is_opaque(self) -> bool {
        self != Cell::Empty
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

// ---------------------------------------------------------------------------
// Structure and resource kinds
// ---------------------------------------------------------------------------

/// The kinds of resource a backpack or store can hold.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Resource {
    Food,
    Wood,
    Stone,
}

impl Resource {
    pub const ALL: [Resource; 3] = [Resource::Food, Resource::Wood, Resource::Stone];
}

/// The buildable structure kinds (everything with a construction-site
/// variant).
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum BuildingKind {
    Home,
    Barn,
    Farm,
    Mine,
}

impl BuildingKind {
    pub const ALL: [BuildingKind; 4] = [
        BuildingKind::Home,
        BuildingKind::Barn,
        BuildingKind::Farm,
        BuildingKind::Mine,
    ];

    /// Cell character of the finished building.
    pub fn finished_cell(self) -> Cell {
        match self {
            BuildingKind::Home => Cell::Home,
            BuildingKind::Barn => Cell::Barn,
            BuildingKind::Farm => Cell::Farm,
            BuildingKind::Mine => Cell::Mine,
        }
    }

    /// Cell character of the construction site.
    pub fn site_cell(self) -> Cell {
        match self {
            BuildingKind::Home => Cell::HomeSite,
            BuildingKind::Barn => Cell::BarnSite,
            BuildingKind::Farm => Cell::FarmSite,
            BuildingKind::Mine => Cell::MineSite,
        }
    }
}

/// What a navigator can be asked to head for: any finished structure kind,
/// or a construction site of a given building kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StructureKind {
    Home,
    Barn,
    Farm,
    Mine,
    Tree,
    Site(BuildingKind),
}

// Custom serde: the navigator keys its reward tables by StructureKind, so
// it serializes as a plain string.
impl Serialize for StructureKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let s = match self {
            StructureKind::Home => "home",
            StructureKind::Barn => "barn",
            StructureKind::Farm => "farm",
            StructureKind::Mine => "mine",
            StructureKind::Tree => "tree",
            StructureKind::Site(BuildingKind::Home) => "construction_home",
            StructureKind::Site(BuildingKind::Barn) => "construction_barn",
            StructureKind::Site(BuildingKind::Farm) => "construction_farm",
            StructureKind::Site(BuildingKind::Mine) => "construction_mine",
        };
        serializer.serialize_str(s)
    }
}

impl<'de> Deserialize<'de> for StructureKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let kind = match s.as_str() {
            "home" => StructureKind::Home,
            "barn" => StructureKind::Barn,
            "farm" => StructureKind::Farm,
            "mine" => StructureKind::Mine,
            "tree" => StructureKind::Tree,
            "construction_home" => StructureKind::Site(BuildingKind::Home),
            "construction_barn" => StructureKind::Site(BuildingKind::Barn),
            "construction_farm" => StructureKind::Site(BuildingKind::Farm),
            "construction_mine" => StructureKind::Site(BuildingKind::Mine),
            other => {
                return Err(serde::de::Error::custom(format!(
                    "unknown structure kind {other:?}"
                )));
            }
        };
        Ok(kind)
    }
}

impl StructureKind {
    /// The memory character the navigator scans for when hunting this kind.
    pub fn cell(self) -> Cell {
        match self {
            StructureKind::Home => Cell::Home,
            StructureKind::Barn => Cell::Barn,
            StructureKind::Farm => Cell::Farm,
            StructureKind::Mine => Cell::Mine,
            StructureKind::Tree => Cell::Tree,
            StructureKind::Site(kind) => kind.site_cell(),
        }
    }

    /// Workplace kinds learn per-location rewards; stores and sites are
    /// picked by distance instead.
    pub fn is_workplace(self) -> bool {
        matches!(
            self,
            StructureKind::Farm | StructureKind::Mine | StructureKind::Tree
        )
    }
}

/// The three gathering occupations an agent learns rewards for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkKind {
    Farm,
    Mine,
    ChopTree,
}

// Custom serde: the per-occupation reward table is keyed by WorkKind.
impl Serialize for WorkKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(match self {
            WorkKind::Farm => "farm",
            WorkKind::Mine => "mine",
            WorkKind::ChopTree => "chop_tree",
        })
    }
}

impl<'de> Deserialize<'de> for WorkKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "farm" => Ok(WorkKind::Farm),
            "mine" => Ok(WorkKind::Mine),
            "chop_tree" => Ok(WorkKind::ChopTree),
            other => Err(serde::de::Error::custom(format!(
                "unknown work kind {other:?}"
            ))),
        }
    }
}

impl WorkKind {
    pub const ALL: [WorkKind; 3] = [WorkKind::Farm, WorkKind::Mine, WorkKind::ChopTree];

    /// The structure kind this occupation is performed at.
    pub fn structure_kind(self) -> StructureKind {
        match self {
            WorkKind::Farm => StructureKind::Farm,
            WorkKind::Mine => StructureKind::Mine,
            WorkKind::ChopTree => StructureKind::Tree,
        }
    }

    /// The resource this occupation gathers.
    pub fn resource(self) -> Resource {
        match self {
            WorkKind::Farm => Resource::Food,
            WorkKind::Mine => Resource::Stone,
            WorkKind::ChopTree => Resource::Wood,
        }
    }
}
