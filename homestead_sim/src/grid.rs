// The world grid: character cells plus the structure registry.
//
// The grid stores a dense `Vec<Cell>` (row-major, `y` = row) and a
// `BTreeMap<Location, Structure>` keyed by each structure's top-left
// corner. A second map (`cell_owner`) tracks which registered structure
// covers each footprint cell, so `top_left_of()` can normalize any cell of
// a multi-cell building to its representative location.
//
// Construction flows through here: `start_construction()` places a site on
// empty ground, `turn_completed_constructions_to_buildings()` promotes
// finished sites, `deconstruct()` knocks a building back into a site at
// the same spot.
//
// Trees are 1×1 structures whose 8-connected components form groves; all
// trees in one grove share the identity of a `(mu, sigma)` yield
// distribution, assigned once at parse time and inherited by growth.
//
// See also: `structure.rs` for the entity data, `pathfinding.rs` for the
// `CostGrid` built by `path_cost_matrix()`, `sim.rs` which owns the grid.
//
// **Critical constraint: determinism.** All registries are `BTreeMap`;
// every scan is row-major; grove grouping and tree growth iterate in that
// fixed order and draw from the sim PRNG only.

use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::pathfinding::CostGrid;
use crate::structure::{Structure, StructureState};
use crate::types::{BuildingKind, Cell, Location, StructureKind};
use homestead_prng::SimRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The world: cells, structures, and the current day's temperature.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Grid {
    width: i32,
    height: i32,
    /// Row-major cell storage: index = x + y * width.
    cells: Vec<Cell>,
    /// Structures keyed by top-left corner.
    structures: BTreeMap<Location, Structure>,
    /// Footprint cell → owning structure's top-left.
    cell_owner: BTreeMap<Location, Location>,
    /// Temperature of the current day, updated by the driver.
    pub temperature: f64,
}

impl Grid {
    /// Parse a grid from rows of characters.
    ///
    /// Every character must be in the cell alphabet. Multi-cell buildings
    /// are registered at the first (top-left) cell encountered scanning
    /// row-major; their whole footprint must carry the same character.
    /// Tree groves get their shared yield distributions drawn here.
    pub fn from_rows(rows: &[&str], cfg: &SimConfig, rng: &mut SimRng) -> SimResult<Self> {
        let height = rows.len() as i32;
        let width = rows.first().map_or(0, |r| r.chars().count()) as i32;

        let mut cells = Vec::with_capacity((width * height) as usize);
        for (y, row) in rows.iter().enumerate() {
            // Ragged rows would desync the row-major indexing.
            if row.chars().count() as i32 != width {
                return Err(SimError::InvalidCell {
                    character: '\n',
                    location: Location::new(width, y as i32),
                });
            }
            for (x, c) in row.chars().enumerate() {
                let cell = Cell::from_char(c).ok_or(SimError::InvalidCell {
                    character: c,
                    location: Location::new(x as i32, y as i32),
                })?;
                cells.push(cell);
            }
        }

        let mut grid = Self {
            width,
            height,
            cells,
            structures: BTreeMap::new(),
            cell_owner: BTreeMap::new(),
            temperature: 0.0,
        };
        grid.register_structures(cfg, rng)?;
        grid.assign_grove_yields(cfg, rng);
        Ok(grid)
    }

    /// Scan the parsed cells and register one structure per footprint.
    fn register_structures(&mut self, cfg: &SimConfig, rng: &mut SimRng) -> SimResult<()> {
        for y in 0..self.height {
            for x in 0..self.width {
                let loc = Location::new(x, y);
                if self.cell_owner.contains_key(&loc) {
                    continue;
                }
                let cell = self.cell_at(loc);
                let structure = match cell {
                    Cell::Empty => continue,
                    Cell::Tree => {
                        // Grove distributions are assigned after the scan.
                        Structure::tree(loc, 0.0, 0.0, cfg)
                    }
                    Cell::Home => Structure::home(loc, cfg),
                    Cell::Barn => Structure::barn(loc, cfg),
                    Cell::Farm => Structure::farm(loc, cfg, rng),
                    Cell::Mine => Structure::mine(loc, cfg, rng),
                    Cell::HomeSite => Structure::construction_site(loc, BuildingKind::Home, cfg),
                    Cell::BarnSite => Structure::construction_site(loc, BuildingKind::Barn, cfg),
                    Cell::FarmSite => Structure::construction_site(loc, BuildingKind::Farm, cfg),
                    Cell::MineSite => Structure::construction_site(loc, BuildingKind::Mine, cfg),
                };
                // The whole footprint must be in bounds and carry the char.
                for covered in structure.footprint() {
                    if !self.in_bounds(covered) || self.cell_at(covered) != cell {
                        return Err(SimError::InvalidCell {
                            character: cell.as_char(),
                            location: covered,
                        });
                    }
                    if self.cell_owner.contains_key(&covered) {
                        return Err(SimError::CellOccupied(covered));
                    }
                }
                self.insert_structure(structure);
            }
        }
        Ok(())
    }

    /// Group trees into groves (8-connected components) and give each
    /// grove one `(mu, sigma)` pair: μ ~ U(min, max), σ ~ U(0, (max−min)/2).
    fn assign_grove_yields(&mut self, cfg: &SimConfig, rng: &mut SimRng) {
        let tree_locs: Vec<Location> = self.structure_locations(StructureKind::Tree);
        let index: BTreeMap<Location, usize> = tree_locs
            .iter()
            .enumerate()
            .map(|(i, &loc)| (loc, i))
            .collect();

        let mut ds = DisjointSet::new(tree_locs.len());
        for (&loc, &i) in &index {
            for neighbor in loc.neighbors() {
                if let Some(&j) = index.get(&neighbor) {
                    ds.union(i, j);
                }
            }
        }

        // Group by root; keyed by the smallest member location so grove
        // order (and therefore the draw order) is deterministic.
        let mut groves: BTreeMap<Location, Vec<Location>> = BTreeMap::new();
        for (&loc, &i) in &index {
            let root_loc = tree_locs[ds.find(i)];
            groves.entry(root_loc).or_default().push(loc);
        }

        for members in groves.values() {
            let mu = rng.range_f64(cfg.grove_yield_min, cfg.grove_yield_max);
            let sigma = rng.range_f64(0.0, (cfg.grove_yield_max - cfg.grove_yield_min) / 2.0);
            for &loc in members {
                if let Some(Structure {
                    state: StructureState::Tree(w),
                    ..
                }) = self.structures.get_mut(&loc)
                {
                    w.yield_mu = mu;
                    w.yield_sigma = sigma;
                }
            }
        }
    }

    fn insert_structure(&mut self, structure: Structure) {
        let cell = structure.cell();
        for covered in structure.footprint() {
            self.set_cell(covered, cell);
            self.cell_owner.insert(covered, structure.location);
        }
        self.structures.insert(structure.location, structure);
    }

    // -- geometry ----------------------------------------------------------

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn in_bounds(&self, loc: Location) -> bool {
        loc.x >= 0 && loc.y >= 0 && loc.x < self.width && loc.y < self.height
    }

    fn cell_index(&self, loc: Location) -> usize {
        (loc.x + loc.y * self.width) as usize
    }

    fn cell_at(&self, loc: Location) -> Cell {
        self.cells[self.cell_index(loc)]
    }

    /// Read a cell. `None` for out-of-bounds coordinates.
    pub fn cell(&self, loc: Location) -> Option<Cell> {
        self.in_bounds(loc).then(|| self.cell_at(loc))
    }

    fn set_cell(&mut self, loc: Location, cell: Cell) {
        let idx = self.cell_index(loc);
        self.cells[idx] = cell;
    }

    /// True when the cell exists and is empty ground.
    pub fn is_walkable(&self, loc: Location) -> bool {
        self.cell(loc) == Some(Cell::Empty)
    }

    /// True when the cell is inside an impassable building (home, barn,
    /// mine). These are the cells the pathfinder treats as blocked.
    pub fn is_inside_building(&self, loc: Location) -> bool {
        self.cell(loc).is_some_and(|c| c.path_cost() == 0)
    }

    pub fn is_tree(&self, loc: Location) -> bool {
        self.cell(loc) == Some(Cell::Tree)
    }

    // -- structures --------------------------------------------------------

    /// Normalize any footprint cell to its structure's top-left corner.
    pub fn top_left_of(&self, loc: Location) -> Option<Location> {
        self.cell_owner.get(&loc).copied()
    }

    /// The structure covering a cell, if any.
    pub fn structure(&self, loc: Location) -> Option<&Structure> {
        self.top_left_of(loc)
            .and_then(|tl| self.structures.get(&tl))
    }

    pub fn structure_mut(&mut self, loc: Location) -> Option<&mut Structure> {
        let tl = self.top_left_of(loc)?;
        self.structures.get_mut(&tl)
    }

    /// All registered structures, in top-left order.
    pub fn structures(&self) -> impl Iterator<Item = &Structure> {
        self.structures.values()
    }

    pub fn structures_mut(&mut self) -> impl Iterator<Item = &mut Structure> {
        self.structures.values_mut()
    }

    /// Top-left locations of every structure of one kind.
    pub fn structure_locations(&self, kind: StructureKind) -> Vec<Location> {
        self.structures
            .values()
            .filter(|s| s.kind() == kind)
            .map(|s| s.location)
            .collect()
    }

    // -- pathfinding -------------------------------------------------------

    /// Build the path-cost matrix. A pure function of the cells: calling
    /// it twice without mutation yields equal matrices.
    pub fn path_cost_matrix(&self) -> CostGrid {
        CostGrid::new(
            self.width,
            self.height,
            self.cells.iter().map(|c| c.path_cost()).collect(),
        )
    }

    // -- trees -------------------------------------------------------------

    /// Fell a tree: clears the cell and unregisters the structure. No-op
    /// when the location does not hold a tree.
    pub fn remove_tree(&mut self, loc: Location) {
        if self.is_tree(loc) {
            self.remove_structure_at(loc);
        }
    }

    /// Yearly growth: each tree tries its 8 neighbors in random order and,
    /// with probability `chance` per empty neighbor, sprouts at most one
    /// new tree inheriting the parent's grove distribution.
    pub fn grow_trees(&mut self, chance: f64, cfg: &SimConfig, rng: &mut SimRng) {
        let parents: Vec<Location> = self.structure_locations(StructureKind::Tree);
        for parent in parents {
            let Some(Structure {
                state: StructureState::Tree(w),
                ..
            }) = self.structures.get(&parent)
            else {
                continue;
            };
            let (mu, sigma) = (w.yield_mu, w.yield_sigma);

            let mut neighbors = parent.neighbors();
            rng.shuffle(&mut neighbors);
            for neighbor in neighbors {
                if !self.is_walkable(neighbor) {
                    continue;
                }
                if rng.random_bool(chance) {
                    self.insert_structure(Structure::tree(neighbor, mu, sigma, cfg));
                    break;
                }
            }
        }
    }

    // -- construction lifecycle --------------------------------------------

    /// Place a construction site of `kind` with its top-left at `loc`.
    /// Every footprint cell must be empty ground.
    pub fn start_construction(
        &mut self,
        kind: BuildingKind,
        loc: Location,
        cfg: &SimConfig,
    ) -> SimResult<()> {
        let site = Structure::construction_site(loc, kind, cfg);
        for covered in site.footprint() {
            if !self.in_bounds(covered) {
                return Err(SimError::CellOccupied(covered));
            }
            if !self.is_walkable(covered) {
                return Err(SimError::CellOccupied(covered));
            }
        }
        self.insert_structure(site);
        Ok(())
    }

    /// Promote every finished construction site to its building. Returns
    /// the promoted (location, kind) pairs for the event stream. Workers
    /// are not carried over.
    pub fn turn_completed_constructions_to_buildings(
        &mut self,
        cfg: &SimConfig,
        rng: &mut SimRng,
    ) -> Vec<(Location, BuildingKind)> {
        let finished: Vec<(Location, BuildingKind)> = self
            .structures
            .values()
            .filter_map(|s| match &s.state {
                StructureState::Site(site) if !site.needs_more() => {
                    Some((s.location, site.kind))
                }
                _ => None,
            })
            .collect();

        for &(loc, kind) in &finished {
            self.remove_structure_at(loc);
            let building = match kind {
                BuildingKind::Home => Structure::home(loc, cfg),
                BuildingKind::Barn => Structure::barn(loc, cfg),
                BuildingKind::Farm => Structure::farm(loc, cfg, rng),
                BuildingKind::Mine => Structure::mine(loc, cfg, rng),
            };
            self.insert_structure(building);
        }
        finished
    }

    /// Remove a structure and clear its footprint back to empty ground.
    pub fn destroy(&mut self, loc: Location) {
        self.remove_structure_at(loc);
    }

    /// Knock a finished building back into a construction site at the same
    /// location. Trees and sites are not deconstructable.
    pub fn deconstruct(&mut self, loc: Location, cfg: &SimConfig) {
        let Some(structure) = self.structure(loc) else {
            return;
        };
        let kind = match structure.kind() {
            StructureKind::Home => BuildingKind::Home,
            StructureKind::Barn => BuildingKind::Barn,
            StructureKind::Farm => BuildingKind::Farm,
            StructureKind::Mine => BuildingKind::Mine,
            StructureKind::Tree | StructureKind::Site(_) => return,
        };
        let top_left = structure.location;
        self.remove_structure_at(top_left);
        self.insert_structure(Structure::construction_site(top_left, kind, cfg));
    }

    fn remove_structure_at(&mut self, loc: Location) {
        let Some(top_left) = self.top_left_of(loc) else {
            return;
        };
        if let Some(structure) = self.structures.remove(&top_left) {
            for covered in structure.footprint() {
                self.set_cell(covered, Cell::Empty);
                self.cell_owner.remove(&covered);
            }
        }
    }

    // -- town adjacency ----------------------------------------------------

    /// The first empty cell 4-adjacent to any structure, scanning
    /// structures in registry order. `None` when the town is walled in —
    /// the condition the stuck check probes.
    pub fn open_spot_next_to_town(&self) -> Option<Location> {
        const SIDES: [(i32, i32); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];
        for structure in self.structures.values() {
            for covered in structure.footprint() {
                for (dx, dy) in SIDES {
                    let neighbor = Location::new(covered.x + dx, covered.y + dy);
                    if self.is_walkable(neighbor) {
                        return Some(neighbor);
                    }
                }
            }
        }
        None
    }

    /// Empty cells 8-adjacent to a building (finished or under
    /// construction, trees excluded) that are themselves not adjacent to a
    /// tree. These are the candidate plots for new construction.
    pub fn empty_spots_near_town(&self) -> Vec<Location> {
        let mut spots = Vec::new();
        for structure in self.structures.values() {
            if structure.kind() == StructureKind::Tree {
                continue;
            }
            for covered in structure.footprint() {
                for neighbor in covered.neighbors() {
                    if !self.is_walkable(neighbor) || spots.contains(&neighbor) {
                        continue;
                    }
                    let near_tree = neighbor.neighbors().iter().any(|&n| self.is_tree(n));
                    if !near_tree {
                        spots.push(neighbor);
                    }
                }
            }
        }
        spots
    }

    /// Render the grid back to rows of characters (snapshot consumers).
    pub fn to_rows(&self) -> Vec<String> {
        (0..self.height)
            .map(|y| {
                (0..self.width)
                    .map(|x| self.cell_at(Location::new(x, y)).as_char())
                    .collect()
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Disjoint set for grove grouping
// ---------------------------------------------------------------------------

/// Union-find over tree indices, used only during grove assignment.
struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, i: usize) -> usize {
        if self.parent[i] != i {
            let root = self.find(self.parent[i]);
            self.parent[i] = root;
        }
        self.parent[i]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            // Attach the larger root under the smaller so the smallest
            // index stays the representative.
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}
