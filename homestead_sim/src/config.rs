// Data-driven simulation configuration.
//
// All tunable parameters live here in `SimConfig`, loadable from JSON at
// startup. The sim never uses magic numbers — it reads from the config.
// Construction parameters are grouped per building kind in `BuildSpec`;
// workplace parameters in `WorkSpec`.
//
// Serde defaults are wired so a partial JSON file overrides only the keys
// it names; everything else keeps the documented default.
//
// **Critical constraint: determinism.** Config values feed directly into
// simulation logic. Two runs must use identical configs (and seeds) for
// identical results.

use crate::types::BuildingKind;
use serde::{Deserialize, Serialize};

/// Construction parameters for one building kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Footprint edge length (buildings are square).
    pub size: i32,
    /// Wood that must be deposited before the site can finish.
    pub req_wood: u32,
    /// Stone that must be deposited before the site can finish.
    pub req_stone: u32,
    /// Build actions the site accepts within one tick.
    pub max_work_count: u32,
    /// Workers the site accepts at once.
    pub max_worker_count: u32,
    /// Completion counter value at which the site is finishable.
    pub finished_completion_level: u32,
}

/// Workplace parameters for one work structure kind.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkSpec {
    /// Workers the structure accepts at once.
    pub max_worker_count: u32,
    /// Work actions the structure accepts within one tick.
    pub max_work_count: u32,
    /// Mean of the per-tick yield distribution.
    pub yield_mu: f64,
    /// Standard deviation of the per-tick yield distribution.
    pub yield_sigma: f64,
}

/// The full simulation configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    // -- clock ------------------------------------------------------------
    /// Person actions per simulated day.
    pub actions_per_day: u32,
    /// Days per simulated year.
    pub days_per_year: u32,

    // -- movement and perception ------------------------------------------
    /// Steps per mover invocation.
    pub speed: u32,
    /// Vision radius (Chebyshev).
    pub visibility: u32,
    /// Ticks before a memory entry is evicted.
    pub memory_expire: u64,

    // -- person stats ------------------------------------------------------
    pub person_health_cap: i32,
    pub person_hunger_cap: i32,
    /// Death-by-old-age threshold.
    pub person_age_max: u32,
    /// Per-agent hunger-preference uniform range.
    pub hunger_pref_min: i32,
    pub hunger_pref_max: i32,
    /// Hunger below which health drains.
    pub hunger_damage_threshold: i32,
    /// Hunger above which health regenerates.
    pub hunger_regen_threshold: i32,
    /// Hunger restored when eating at home.
    pub home_eat_satiate: i32,
    /// Hunger restored when eating at a barn.
    pub barn_eat_satiate: i32,
    /// Food consumed by one meal, home or barn.
    pub eat_food_cost: u32,

    // -- backpack ----------------------------------------------------------
    pub backpack_food_store: u32,
    pub backpack_stone_store: u32,
    pub backpack_wood_store: u32,

    // -- stores ------------------------------------------------------------
    pub barn_food_store: u32,
    pub barn_wood_store: u32,
    pub barn_stone_store: u32,
    pub home_food_store: u32,

    // -- decision policy ---------------------------------------------------
    /// Thinker's ε for work-type selection.
    pub person_epsilon: f64,
    /// Fraction of known locations an agent searches before escalating to
    /// construction.
    pub search_escalation_ratio: f64,

    // -- construction ------------------------------------------------------
    pub home_build: BuildSpec,
    pub barn_build: BuildSpec,
    pub farm_build: BuildSpec,
    pub mine_build: BuildSpec,

    // -- workplaces --------------------------------------------------------
    pub farm_work: WorkSpec,
    pub mine_work: WorkSpec,
    pub tree_work: WorkSpec,
    /// Range of grove yield means: μ ~ U(grove_yield_min, grove_yield_max),
    /// σ ~ U(0, (max − min) / 2).
    pub grove_yield_min: f64,
    pub grove_yield_max: f64,

    // -- world -------------------------------------------------------------
    /// Probability that an empty neighbor of a tree sprouts each year.
    pub tree_growth_chance: f64,
    /// Probability per year that each disaster draw fires.
    pub disaster_chance: f64,
    /// Health lost by the victim of a person disaster.
    pub disaster_health_damage: i32,
}

impl SimConfig {
    /// Parse a config from JSON. Missing keys fall back to defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Total person actions in one simulated year.
    pub fn actions_per_year(&self) -> u64 {
        self.actions_per_day as u64 * self.days_per_year as u64
    }

    /// Construction parameters for a building kind.
    pub fn build_spec(&self, kind: BuildingKind) -> &BuildSpec {
        match kind {
            BuildingKind::Home => &self.home_build,
            BuildingKind::Barn => &self.barn_build,
            BuildingKind::Farm => &self.farm_build,
            BuildingKind::Mine => &self.mine_build,
        }
    }

    /// Aggregate backpack capacity across all resources.
    pub fn backpack_capacity(&self) -> u32 {
        self.backpack_food_store + self.backpack_stone_store + self.backpack_wood_store
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            actions_per_day: 5,
            days_per_year: 365,

            speed: 10,
            visibility: 15,
            memory_expire: 50,

            person_health_cap: 100,
            person_hunger_cap: 100,
            person_age_max: 80,
            hunger_pref_min: 50,
            hunger_pref_max: 100,
            hunger_damage_threshold: 20,
            hunger_regen_threshold: 50,
            home_eat_satiate: 10,
            barn_eat_satiate: 5,
            eat_food_cost: 3,

            backpack_food_store: 100,
            backpack_stone_store: 50,
            backpack_wood_store: 50,

            barn_food_store: 100,
            barn_wood_store: 50,
            barn_stone_store: 50,
            home_food_store: 30,

            person_epsilon: 0.05,
            search_escalation_ratio: 0.37,

            home_build: BuildSpec {
                size: 2,
                req_wood: 50,
                req_stone: 20,
                max_work_count: 3,
                max_worker_count: 2,
                finished_completion_level: 5,
            },
            barn_build: BuildSpec {
                size: 3,
                req_wood: 60,
                req_stone: 30,
                max_work_count: 3,
                max_worker_count: 3,
                finished_completion_level: 5,
            },
            farm_build: BuildSpec {
                size: 3,
                req_wood: 30,
                req_stone: 10,
                max_work_count: 3,
                max_worker_count: 3,
                finished_completion_level: 3,
            },
            mine_build: BuildSpec {
                size: 3,
                req_wood: 40,
                req_stone: 40,
                max_work_count: 5,
                max_worker_count: 3,
                finished_completion_level: 5,
            },

            farm_work: WorkSpec {
                max_worker_count: 4,
                max_work_count: 3,
                yield_mu: 5.0,
                yield_sigma: 1.0,
            },
            mine_work: WorkSpec {
                max_worker_count: 6,
                max_work_count: 4,
                yield_mu: 4.0,
                yield_sigma: 1.0,
            },
            tree_work: WorkSpec {
                max_worker_count: 1,
                max_work_count: 2,
                // Trees ignore these means; groves draw their own (μ, σ).
                yield_mu: 0.0,
                yield_sigma: 0.0,
            },
            grove_yield_min: 10.0,
            grove_yield_max: 50.0,

            tree_growth_chance: 0.10,
            disaster_chance: 0.50,
            disaster_health_damage: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SimConfig::default();
        assert_eq!(cfg.speed, 10);
        assert_eq!(cfg.visibility, 15);
        assert_eq!(cfg.memory_expire, 50);
        assert_eq!(cfg.person_age_max, 80);
        assert_eq!(cfg.backpack_food_store, 100);
        assert_eq!(cfg.backpack_stone_store, 50);
        assert_eq!(cfg.backpack_wood_store, 50);
        assert_eq!(cfg.backpack_capacity(), 200);
        assert_eq!(cfg.person_epsilon, 0.05);
    }

    #[test]
    fn partial_json_overrides_only_named_keys() {
        let cfg = SimConfig::from_json(r#"{ "speed": 3, "visibility": 7 }"#).unwrap();
        assert_eq!(cfg.speed, 3);
        assert_eq!(cfg.visibility, 7);
        // Everything else keeps its default.
        assert_eq!(cfg.memory_expire, 50);
        assert_eq!(cfg.barn_build.req_wood, 60);
    }

    #[test]
    fn nested_build_spec_from_json() {
        let cfg = SimConfig::from_json(
            r#"{ "mine_build": { "size": 4, "req_wood": 10, "req_stone": 10,
                 "max_work_count": 2, "max_worker_count": 2,
                 "finished_completion_level": 1 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.mine_build.size, 4);
        assert_eq!(cfg.build_spec(crate::types::BuildingKind::Mine).req_wood, 10);
        // Untouched specs keep defaults.
        assert_eq!(cfg.barn_build.size, 3);
    }

    #[test]
    fn actions_per_year_is_product() {
        let cfg = SimConfig::default();
        assert_eq!(cfg.actions_per_year(), 5 * 365);
    }

    #[test]
    fn config_serialization_roundtrip() {
        let cfg = SimConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let restored = SimConfig::from_json(&json).unwrap();
        assert_eq!(cfg, restored);
    }
}
