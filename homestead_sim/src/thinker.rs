// Per-tick decision making: metabolism, task population, and priority
// recomputation.
//
// `take_action()` is one full tick for one person: metabolize, offer the
// applicable task kinds to the scheduler, rewrite the priority table from
// current world knowledge, then let the scheduler run the best task once.
//
// Task population offers: Explore always; FindSpouse when unpartnered;
// FindHome when homeless; Transport when the pack holds anything; one
// gathering occupation chosen ε-greedy over the per-kind reward table
// (ε = `person_epsilon`, forced random while every reward is zero) when
// the pack has room; Eat when hunger is below the personal preference.
//
// Priorities are recomputed from world state every tick, clamped to
// [1, 10], with higher numbers running sooner:
// - Explore scales with memory coverage of a quarter of the grid.
// - Start-construction tracks just under Explore.
// - Transport scales with backpack fullness, so full packs get hauled.
// - The three gathering kinds scale with how stocked the known barns are.
// - Build kinds rank 10 when no site of the kind is known, and thin out
//   as more sites appear.

use crate::config::SimConfig;
use crate::error::SimResult;
use crate::person::Person;
use crate::scheduler;
use crate::sim::TickCtx;
use crate::structure::Structure;
use crate::task::TaskKind;
use crate::types::{BuildingKind, Resource, StructureKind, WorkKind};
use homestead_prng::SimRng;

/// One full tick for one person.
pub fn take_action(person: &mut Person, ctx: &mut TickCtx<'_>) -> SimResult<()> {
    person.metabolize(ctx.config);
    populate(person, ctx);
    adjust_priorities(person, ctx);
    scheduler::execute(person, ctx)
}

/// Offer every currently applicable task kind to the scheduler.
fn populate(person: &mut Person, ctx: &mut TickCtx<'_>) {
    person.scheduler.add(TaskKind::Explore);

    if !person.has_spouse() {
        person.scheduler.add(TaskKind::FindSpouse);
    }
    if !person.has_home() {
        person.scheduler.add(TaskKind::FindHome);
    }
    if person.backpack.has_items() {
        person.scheduler.add(TaskKind::Transport);
    }
    if person.backpack.has_capacity(ctx.config) {
        let kind = choose_work_kind(person, ctx.config, ctx.rng);
        person.scheduler.add(TaskKind::Work(kind));
    }
    if person.hunger < person.hunger_preference {
        person.scheduler.add(TaskKind::Eat);
    }
}

/// ε-greedy over the three gathering occupations. While every reward is
/// zero there is nothing to exploit, so the draw is forced random.
fn choose_work_kind(person: &Person, cfg: &SimConfig, rng: &mut SimRng) -> WorkKind {
    let all_zero = WorkKind::ALL
        .iter()
        .all(|k| person.work_rewards.get(k).copied().unwrap_or(0.0) == 0.0);
    if all_zero || rng.next_f64() < cfg.person_epsilon {
        return WorkKind::ALL[rng.choose_index(WorkKind::ALL.len())];
    }
    // Exploit: best-rewarded occupation, ties to declaration order.
    let mut best = WorkKind::ALL[0];
    for &kind in &WorkKind::ALL[1..] {
        if person.work_rewards.get(&kind).copied().unwrap_or(0.0)
            > person.work_rewards.get(&best).copied().unwrap_or(0.0)
        {
            best = kind;
        }
    }
    best
}

/// Rewrite the priority table from world state. All values clamp to
/// [1, 10]; the scheduler treats higher as sooner.
fn adjust_priorities(person: &mut Person, ctx: &mut TickCtx<'_>) {
    set_explore_priority(person, ctx);
    set_start_construction_priorities(person);
    set_transport_priority(person, ctx.config);
    set_gathering_priorities(person, ctx);
    for kind in BuildingKind::ALL {
        set_build_priority(person, ctx, kind);
    }
}

fn clamp_priority(value: i32) -> i32 {
    value.clamp(1, 10)
}

/// Explore priority scales linearly with memory coverage of a quarter of
/// the grid's cells.
fn set_explore_priority(person: &mut Person, ctx: &TickCtx<'_>) {
    let coverage_target = (ctx.grid.width() * ctx.grid.height()) as f64 / 4.0;
    let coverage = person.memories.len() as f64 / coverage_target.max(1.0);
    let priority = clamp_priority((1.0 + 9.0 * coverage) as i32);
    person.priorities.insert(TaskKind::Explore, priority);
}

/// Start-construction rides just under Explore: 1 while Explore is high,
/// Explore + 1 once the agent knows its surroundings.
fn set_start_construction_priorities(person: &mut Person) {
    let explore = person.priority(TaskKind::Explore);
    let priority = if explore >= 5 {
        1
    } else {
        clamp_priority(explore + 1)
    };
    for kind in BuildingKind::ALL {
        person
            .priorities
            .insert(TaskKind::StartConstruction(kind), priority);
    }
}

/// The fuller the backpack, the sooner it gets hauled to a barn.
fn set_transport_priority(person: &mut Person, cfg: &SimConfig) {
    let fullness = person.backpack.fullness(cfg);
    let priority = clamp_priority((10.0 * fullness) as i32);
    person.priorities.insert(TaskKind::Transport, priority);
}

/// Gathering priorities track how stocked the known barns are, per
/// resource, relative to their total capacity.
fn set_gathering_priorities(person: &mut Person, ctx: &mut TickCtx<'_>) {
    let barns = person.memories.locations_of(
        StructureKind::Barn.cell(),
        ctx.tick,
        ctx.config.memory_expire,
    );

    let mut totals = [0u64; 3]; // food, wood, stone
    let mut capacity = 0u64;
    for loc in barns {
        let Some(barn) = ctx.grid.structure(loc).filter(|s| s.kind() == StructureKind::Barn)
        else {
            continue;
        };
        totals[0] += barn.resource(Resource::Food) as u64;
        totals[1] += barn.resource(Resource::Wood) as u64;
        totals[2] += barn.resource(Resource::Stone) as u64;
        capacity += barn_total_capacity(barn, ctx.config) as u64;
    }

    for (kind, total) in [
        (WorkKind::Farm, totals[0]),
        (WorkKind::ChopTree, totals[1]),
        (WorkKind::Mine, totals[2]),
    ] {
        let share = if capacity > 0 {
            total as f64 / capacity as f64
        } else {
            0.0
        };
        person
            .priorities
            .insert(TaskKind::Work(kind), clamp_priority((10.0 * share) as i32));
    }
}

fn barn_total_capacity(barn: &Structure, cfg: &SimConfig) -> u32 {
    Resource::ALL
        .iter()
        .map(|&r| barn.resource_capacity(r, cfg))
        .sum()
}

/// Build priority: urgent when no site of the kind is known, thinning out
/// as more sites appear.
fn set_build_priority(person: &mut Person, ctx: &mut TickCtx<'_>, kind: BuildingKind) {
    let count = person
        .memories
        .locations_of(kind.site_cell(), ctx.tick, ctx.config.memory_expire)
        .len() as i32;
    let priority = if count == 0 {
        10
    } else {
        clamp_priority(3 - count)
    };
    person.priorities.insert(TaskKind::Build(kind), priority);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::SimEvent;
    use crate::grid::Grid;
    use crate::people::People;
    use crate::types::{Cell, Location, PersonId};

    struct Fixture {
        grid: Grid,
        people: People,
        rng: SimRng,
        config: SimConfig,
        events: Vec<SimEvent>,
    }

    impl Fixture {
        fn new(rows: &[&str]) -> Self {
            let config = SimConfig::default();
            let mut rng = SimRng::new(42);
            let grid = Grid::from_rows(rows, &config, &mut rng).unwrap();
            Self {
                grid,
                people: People::new(),
                rng,
                config,
                events: Vec::new(),
            }
        }

        fn ctx(&mut self, tick: u64) -> TickCtx<'_> {
            TickCtx {
                grid: &mut self.grid,
                people: &mut self.people,
                rng: &mut self.rng,
                config: &self.config,
                tick,
                events: &mut self.events,
            }
        }

        fn person_at(&mut self, loc: Location) -> Person {
            let mut rng = SimRng::new(1);
            Person::new(PersonId(1), "Odd".into(), 25, loc, &self.config, &mut rng)
        }
    }

    #[test]
    fn populate_offers_the_applicable_kinds() {
        let mut fx = Fixture::new(&["     ", "     ", "     ", "     ", "     "]);
        let mut person = fx.person_at(Location::new(2, 2));
        person.hunger = 10; // below any preference
        let mut ctx = fx.ctx(1);
        populate(&mut person, &mut ctx);

        assert!(person.scheduler.contains_kind(TaskKind::Explore));
        assert!(person.scheduler.contains_kind(TaskKind::FindSpouse));
        assert!(person.scheduler.contains_kind(TaskKind::FindHome));
        assert!(person.scheduler.contains_kind(TaskKind::Eat));
        // Empty pack: no Transport, but room to work.
        assert!(!person.scheduler.contains_kind(TaskKind::Transport));
        assert!(WorkKind::ALL
            .iter()
            .any(|&k| person.scheduler.contains_kind(TaskKind::Work(k))));
    }

    #[test]
    fn populate_skips_satisfied_needs() {
        let mut fx = Fixture::new(&["     ", "     ", "     ", "     ", "     "]);
        let mut person = fx.person_at(Location::new(2, 2));
        person.spouse = Some(PersonId(9));
        person.home = Some(Location::new(0, 0));
        person.hunger = 100;
        let mut ctx = fx.ctx(1);
        populate(&mut person, &mut ctx);

        assert!(!person.scheduler.contains_kind(TaskKind::FindSpouse));
        assert!(!person.scheduler.contains_kind(TaskKind::FindHome));
        assert!(!person.scheduler.contains_kind(TaskKind::Eat));
    }

    #[test]
    fn work_kind_exploits_the_best_reward() {
        let config = SimConfig::default();
        let mut rng = SimRng::new(7);
        let mut person = {
            let mut prng = SimRng::new(1);
            Person::new(PersonId(1), "Gul".into(), 25, Location::new(0, 0), &config, &mut prng)
        };
        person.add_work_reward(WorkKind::Mine, 50.0);
        person.add_work_reward(WorkKind::Farm, 5.0);

        // With ε = 0.05, the overwhelming majority of draws exploit.
        let mut mine_picks = 0;
        for _ in 0..200 {
            if choose_work_kind(&person, &config, &mut rng) == WorkKind::Mine {
                mine_picks += 1;
            }
        }
        assert!(mine_picks > 150, "expected mostly Mine, got {mine_picks}");
    }

    #[test]
    fn all_zero_rewards_force_random_choice() {
        let config = SimConfig::default();
        let mut rng = SimRng::new(7);
        let person = {
            let mut prng = SimRng::new(1);
            Person::new(PersonId(1), "Gul".into(), 25, Location::new(0, 0), &config, &mut prng)
        };
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..100 {
            seen.insert(choose_work_kind(&person, &config, &mut rng));
        }
        assert_eq!(seen.len(), 3, "all three kinds should appear");
    }

    #[test]
    fn explore_priority_scales_with_memory_coverage() {
        let mut fx = Fixture::new(&["    ", "    ", "    ", "    "]);
        let mut person = fx.person_at(Location::new(0, 0));
        {
            let ctx = fx.ctx(1);
            set_explore_priority(&mut person, &ctx);
        }
        assert_eq!(person.priority(TaskKind::Explore), 1, "no memories yet");

        // Fill memory with a quarter of the grid (4 cells): coverage 1.0.
        for i in 0..4 {
            person
                .memories
                .add(Cell::Empty, Location::new(i, 0), 1, &fx.grid);
        }
        {
            let ctx = fx.ctx(1);
            set_explore_priority(&mut person, &ctx);
        }
        assert_eq!(person.priority(TaskKind::Explore), 10);
    }

    #[test]
    fn start_construction_tracks_explore() {
        let mut fx = Fixture::new(&["    ", "    ", "    ", "    "]);
        let mut person = fx.person_at(Location::new(0, 0));
        person.priorities.insert(TaskKind::Explore, 7);
        set_start_construction_priorities(&mut person);
        for kind in BuildingKind::ALL {
            assert_eq!(person.priority(TaskKind::StartConstruction(kind)), 1);
        }

        person.priorities.insert(TaskKind::Explore, 3);
        set_start_construction_priorities(&mut person);
        for kind in BuildingKind::ALL {
            assert_eq!(person.priority(TaskKind::StartConstruction(kind)), 4);
        }
    }

    #[test]
    fn transport_priority_follows_fullness() {
        let config = SimConfig::default();
        let mut person = {
            let mut prng = SimRng::new(1);
            Person::new(PersonId(1), "Nel".into(), 25, Location::new(0, 0), &config, &mut prng)
        };
        set_transport_priority(&mut person, &config);
        assert_eq!(person.priority(TaskKind::Transport), 1, "empty pack");

        // Fill the pack completely: 100 food + 50 wood + 50 stone.
        person.backpack.add(Resource::Food, 100, &config).unwrap();
        person.backpack.add(Resource::Wood, 50, &config).unwrap();
        person.backpack.add(Resource::Stone, 50, &config).unwrap();
        set_transport_priority(&mut person, &config);
        assert_eq!(person.priority(TaskKind::Transport), 10, "full pack hauls first");
    }

    #[test]
    fn gathering_priorities_follow_barn_stock() {
        let mut fx = Fixture::new(&[
            " BBB  ",
            " BBB  ",
            " BBB  ",
            "      ",
            "      ",
            "      ",
        ]);
        let cfg = fx.config.clone();
        let mut person = fx.person_at(Location::new(5, 5));
        person.memories.add(Cell::Barn, Location::new(1, 0), 1, &fx.grid);
        // Stock the barn full of food, empty of wood and stone.
        fx.grid
            .structure_mut(Location::new(1, 0))
            .unwrap()
            .add_resource(Resource::Food, 100, &cfg)
            .unwrap();

        let mut ctx = fx.ctx(1);
        set_gathering_priorities(&mut person, &mut ctx);
        // 100 food / 200 total capacity = 0.5 → priority 5.
        assert_eq!(person.priority(TaskKind::Work(WorkKind::Farm)), 5);
        assert_eq!(person.priority(TaskKind::Work(WorkKind::ChopTree)), 1);
        assert_eq!(person.priority(TaskKind::Work(WorkKind::Mine)), 1);
    }

    #[test]
    fn build_priority_peaks_with_no_known_sites() {
        let mut fx = Fixture::new(&[
            "bbb   ",
            "bbb   ",
            "bbb   ",
            "      ",
            "      ",
            "      ",
        ]);
        let mut person = fx.person_at(Location::new(5, 5));
        {
            let mut ctx = fx.ctx(1);
            set_build_priority(&mut person, &mut ctx, BuildingKind::Barn);
        }
        assert_eq!(person.priority(TaskKind::Build(BuildingKind::Barn)), 10);

        person.memories.add(Cell::BarnSite, Location::new(0, 0), 1, &fx.grid);
        {
            let mut ctx = fx.ctx(1);
            set_build_priority(&mut person, &mut ctx, BuildingKind::Barn);
        }
        // One known site: 3 − 1 = 2.
        assert_eq!(person.priority(TaskKind::Build(BuildingKind::Barn)), 2);
    }
}
