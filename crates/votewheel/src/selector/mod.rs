//! Weighted stratified sampling of layers across the three game-mode
//! families.
//!
//! A selector is built once per match start with the current remote state
//! and draws layers bucket by bucket: warfare, then offensive, then
//! skirmish. Weighting joins and instance counts are computed once per
//! bucket preparation; each draw is a single pass over the working table.

mod table;

use std::collections::{BTreeSet, HashMap, HashSet};

use crcon::models::{Environment, GameMode, Layer, ServerStatus, VoteMapUserConfig};
use rand::Rng;
use tracing::warn;

use crate::models::WeightingParameters;
use table::{SelectionTable, TableRow};

struct GroupRef<'a> {
    name: &'a str,
    weight: f64,
    repeat_decay: f64,
}

pub struct MapSelector<'a> {
    status: &'a ServerStatus,
    layers: &'a [Layer],
    votemap_config: &'a VoteMapUserConfig,
    recent_history: &'a [String],
    layers_by_id: HashMap<&'a str, &'a Layer>,
    map_groups: HashMap<&'a str, GroupRef<'a>>,
    environment_categories: HashMap<Environment, GroupRef<'a>>,
}

impl<'a> MapSelector<'a> {
    /// `layers` is the whitelist-filtered catalog; `recent_history` holds
    /// the most recently completed layer ids, newest first.
    pub fn new(
        status: &'a ServerStatus,
        layers: &'a [Layer],
        weighting: &'a WeightingParameters,
        votemap_config: &'a VoteMapUserConfig,
        recent_history: &'a [String],
    ) -> Self {
        let layers_by_id = layers.iter().map(|l| (l.id.as_str(), l)).collect();

        let mut map_groups = HashMap::new();
        for (name, group) in &weighting.groups {
            for map_id in &group.maps {
                map_groups.insert(
                    map_id.as_str(),
                    GroupRef {
                        name: name.as_str(),
                        weight: f64::from(group.weight),
                        repeat_decay: group.repeat_decay,
                    },
                );
            }
        }

        let mut environment_categories = HashMap::new();
        for (name, category) in &weighting.environments {
            for environment in &category.environments {
                environment_categories.insert(
                    *environment,
                    GroupRef {
                        name: name.as_str(),
                        weight: f64::from(category.weight),
                        repeat_decay: category.repeat_decay,
                    },
                );
            }
        }

        Self {
            status,
            layers,
            votemap_config,
            recent_history,
            layers_by_id,
            map_groups,
            environment_categories,
        }
    }

    /// Layer ids grouped warfare → offensive → skirmish, each bucket capped
    /// by its configured count. May be empty.
    pub fn get_selection(&self, rng: &mut impl Rng) -> Vec<String> {
        let mut selection = self.warfare(rng);
        selection.extend(self.offensive(rng));
        selection.extend(self.skirmish(rng));
        selection
    }

    fn warfare(&self, rng: &mut impl Rng) -> Vec<String> {
        let table = self.prepare(GameMode::Warfare, false);
        table.select(self.votemap_config.num_warfare_options, rng)
    }

    fn offensive(&self, rng: &mut impl Rng) -> Vec<String> {
        let current_mode = self.status.map.game_mode;
        if current_mode == GameMode::Offensive && !self.votemap_config.allow_consecutive_offensives
        {
            return Vec::new();
        }
        let table = self.prepare(
            GameMode::Offensive,
            self.votemap_config.consider_offensive_same_map,
        );
        table.select(self.votemap_config.num_offensive_options, rng)
    }

    fn skirmish(&self, rng: &mut impl Rng) -> Vec<String> {
        let current_mode = self.status.map.game_mode;
        if current_mode.is_small() && !self.votemap_config.allow_consecutive_skirmishes {
            return Vec::new();
        }
        let table = self.prepare(
            GameMode::Control,
            self.votemap_config.consider_skirmishes_as_same_map,
        );
        table.select(self.votemap_config.num_skirmish_control_options, rng)
    }

    fn in_bucket(bucket: GameMode, layer: &Layer) -> bool {
        match bucket {
            GameMode::Warfare => layer.game_mode == GameMode::Warfare,
            GameMode::Offensive => layer.game_mode == GameMode::Offensive,
            _ => layer.game_mode.is_small(),
        }
    }

    fn prepare(&self, bucket: GameMode, exclude_recent_maps: bool) -> SelectionTable {
        let window = self.votemap_config.number_last_played_to_exclude as usize;
        let recent = &self.recent_history[..window.min(self.recent_history.len())];

        let mut excluded_ids: HashSet<&str> = recent.iter().map(String::as_str).collect();
        excluded_ids.insert(self.status.map.id.as_str());

        // recently played ids may no longer be in the filtered catalog
        let excluded_maps: HashSet<&str> = if exclude_recent_maps {
            recent
                .iter()
                .filter_map(|id| self.layers_by_id.get(id.as_str()))
                .map(|layer| layer.map.id.as_str())
                .collect()
        } else {
            HashSet::new()
        };

        let current_side = self.status.map.attackers;
        let rows: Vec<&Layer> = self
            .layers
            .iter()
            .filter(|layer| Self::in_bucket(bucket, layer))
            .filter(|layer| !excluded_ids.contains(layer.id.as_str()))
            .filter(|layer| !excluded_maps.contains(layer.map.id.as_str()))
            .filter(|layer| {
                // keep only matches attacked from the other side
                match current_side {
                    Some(side) if self.votemap_config.allow_consecutive_offensives_opposite_sides => {
                        layer.attackers != Some(side)
                    }
                    _ => true,
                }
            })
            .collect();

        let mut map_counts: HashMap<&str, usize> = HashMap::new();
        let mut environment_counts: HashMap<Environment, usize> = HashMap::new();
        for layer in &rows {
            *map_counts.entry(layer.map.id.as_str()).or_default() += 1;
            *environment_counts.entry(layer.environment).or_default() += 1;
        }

        let mut unconfigured_maps = BTreeSet::new();
        let mut unconfigured_environments = BTreeSet::new();
        let mut table = SelectionTable::default();

        for layer in rows {
            let Some(group) = self.map_groups.get(layer.map.id.as_str()) else {
                unconfigured_maps.insert(layer.map.id.as_str());
                continue;
            };
            let Some(category) = self.environment_categories.get(&layer.environment) else {
                unconfigured_environments.insert(layer.environment.to_string());
                continue;
            };

            // normalization counters a map (or environment) with many
            // layers crowding out the rest of its group
            let map_count = map_counts.get(layer.map.id.as_str()).copied().unwrap_or(1);
            let environment_count = environment_counts
                .get(&layer.environment)
                .copied()
                .unwrap_or(1);

            table.push(TableRow {
                id: layer.id.clone(),
                map_id: layer.map.id.clone(),
                environment_category: category.name.to_string(),
                map_weight: group.weight,
                map_repeat_decay: group.repeat_decay,
                environment_weight: category.weight,
                environment_repeat_decay: category.repeat_decay,
                map_norm: 1.0 / map_count as f64,
                environment_norm: 1.0 / environment_count as f64,
            });
        }

        if !unconfigured_maps.is_empty() {
            let names: Vec<&str> = unconfigured_maps.into_iter().collect();
            warn!(maps = names.join(","), "no map groups configured");
        }
        if !unconfigured_environments.is_empty() {
            let names: Vec<String> = unconfigured_environments.into_iter().collect();
            warn!(environments = names.join(","), "no environment categories configured");
        }

        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EnvironmentGroup, MapGroup};
    use crcon::models::{Faction, GameMap, Orientation, Team};
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn layer(
        id: &str,
        map_id: &str,
        mode: GameMode,
        environment: Environment,
        attackers: Option<Team>,
    ) -> Layer {
        Layer {
            id: id.to_string(),
            map: GameMap {
                id: map_id.to_string(),
                name: map_id.to_string(),
                tag: map_id.to_uppercase(),
                pretty_name: map_id.to_string(),
                shortname: map_id.to_string(),
                allies: Faction {
                    name: "us".to_string(),
                    team: Team::Allies,
                },
                axis: Faction {
                    name: "ger".to_string(),
                    team: Team::Axis,
                },
                orientation: Orientation::Horizontal,
            },
            game_mode: mode,
            attackers,
            environment,
            pretty_name: id.to_string(),
            image_name: format!("{map_id}.webp"),
        }
    }

    fn status_for(current: &Layer) -> ServerStatus {
        ServerStatus {
            name: "Test Server".to_string(),
            map: current.clone(),
            current_players: 64,
            max_players: 100,
            short_name: "TST".to_string(),
            server_number: 1,
        }
    }

    /// One group covering every map, one category covering every environment.
    fn weighting_for(layers: &[Layer]) -> WeightingParameters {
        let maps: BTreeSet<String> = layers.iter().map(|l| l.map.id.clone()).collect();
        let groups = HashMap::from([(
            "All".to_string(),
            MapGroup::new(100, 0.5, maps.into_iter().collect()).unwrap(),
        )]);
        let environments = HashMap::from([(
            "Any".to_string(),
            EnvironmentGroup::new(
                100,
                0.5,
                vec![
                    Environment::Dawn,
                    Environment::Day,
                    Environment::Dusk,
                    Environment::Night,
                    Environment::Overcast,
                    Environment::Rain,
                ],
            )
            .unwrap(),
        )]);
        WeightingParameters::new(groups, environments).unwrap()
    }

    fn config(warfare: u32, offensive: u32, skirmish: u32) -> VoteMapUserConfig {
        VoteMapUserConfig {
            num_warfare_options: warfare,
            num_offensive_options: offensive,
            num_skirmish_control_options: skirmish,
            ..Default::default()
        }
    }

    /// 32 warfare, 36 offensive and 22 skirmish layers.
    fn big_catalog() -> Vec<Layer> {
        let mut layers = Vec::new();

        let warfare_maps = [
            "carentan", "w01", "w02", "w03", "w04", "w05", "w06", "w07",
        ];
        for map in warfare_maps {
            for environment in [
                Environment::Day,
                Environment::Night,
                Environment::Dusk,
                Environment::Rain,
            ] {
                let id = match environment {
                    Environment::Day => format!("{map}_warfare"),
                    other => format!("{map}_warfare_{other}"),
                };
                layers.push(layer(&id, map, GameMode::Warfare, environment, None));
            }
        }

        for i in 1..=9 {
            let map = format!("o{i:02}");
            for (side, environment) in [
                (Team::Allies, Environment::Day),
                (Team::Axis, Environment::Day),
                (Team::Allies, Environment::Night),
                (Team::Axis, Environment::Night),
            ] {
                let id = format!("{map}_offensive_{side}_{environment}");
                layers.push(layer(&id, &map, GameMode::Offensive, environment, Some(side)));
            }
        }

        for i in 1..=11 {
            let map = format!("s{i:02}");
            for environment in [Environment::Day, Environment::Night] {
                let id = format!("{map}_control_{environment}");
                layers.push(layer(&id, &map, GameMode::Control, environment, None));
            }
        }

        layers
    }

    fn mode_of(catalog: &[Layer], id: &str) -> GameMode {
        catalog
            .iter()
            .find(|l| l.id == id)
            .unwrap_or_else(|| panic!("{id} not in catalog"))
            .game_mode
    }

    #[test]
    fn cold_start_selects_full_counts_grouped_by_mode() {
        let catalog = big_catalog();
        assert_eq!(
            catalog.iter().filter(|l| l.game_mode == GameMode::Warfare).count(),
            32
        );
        assert_eq!(
            catalog.iter().filter(|l| l.game_mode == GameMode::Offensive).count(),
            36
        );
        assert_eq!(catalog.iter().filter(|l| l.game_mode.is_small()).count(), 22);

        let current = catalog.iter().find(|l| l.id == "carentan_warfare").unwrap().clone();
        let status = status_for(&current);
        let weighting = weighting_for(&catalog);
        let config = config(6, 2, 2);
        let history: Vec<String> = Vec::new();

        let selector = MapSelector::new(&status, &catalog, &weighting, &config, &history);
        let mut rng = StdRng::seed_from_u64(7);
        let selection = selector.get_selection(&mut rng);

        assert_eq!(selection.len(), 10);
        assert!(!selection.contains(&"carentan_warfare".to_string()));

        let distinct: HashSet<&String> = selection.iter().collect();
        assert_eq!(distinct.len(), 10);

        let modes: Vec<GameMode> = selection.iter().map(|id| mode_of(&catalog, id)).collect();
        assert!(modes[..6].iter().all(|m| *m == GameMode::Warfare));
        assert!(modes[6..8].iter().all(|m| *m == GameMode::Offensive));
        assert!(modes[8..].iter().all(|m| m.is_small()));
    }

    #[test]
    fn selection_is_deterministic_for_a_seed() {
        let catalog = big_catalog();
        let current = catalog[0].clone();
        let status = status_for(&current);
        let weighting = weighting_for(&catalog);
        let config = config(6, 2, 2);
        let history: Vec<String> = Vec::new();
        let selector = MapSelector::new(&status, &catalog, &weighting, &config, &history);

        let first = selector.get_selection(&mut StdRng::seed_from_u64(42));
        let second = selector.get_selection(&mut StdRng::seed_from_u64(42));
        assert_eq!(first, second);
    }

    #[test]
    fn consecutive_offensive_blocked_empties_the_offensive_bucket() {
        let catalog = big_catalog();
        let current = layer(
            "carentan_offensive_us",
            "carentan",
            GameMode::Offensive,
            Environment::Day,
            Some(Team::Allies),
        );
        let status = status_for(&current);
        let weighting = weighting_for(&catalog);
        let config = VoteMapUserConfig {
            allow_consecutive_offensives: false,
            ..config(6, 2, 2)
        };
        let history: Vec<String> = Vec::new();

        let selector = MapSelector::new(&status, &catalog, &weighting, &config, &history);
        let selection = selector.get_selection(&mut StdRng::seed_from_u64(3));

        let modes: Vec<GameMode> = selection.iter().map(|id| mode_of(&catalog, id)).collect();
        assert!(modes.iter().all(|m| *m != GameMode::Offensive));
        assert!(modes.iter().filter(|m| **m == GameMode::Warfare).count() <= 6);
        assert!(modes.iter().filter(|m| m.is_small()).count() <= 2);
    }

    #[test]
    fn consecutive_skirmish_blocked_empties_the_skirmish_bucket() {
        let catalog = big_catalog();
        let current = layer(
            "s01_control_day",
            "s01",
            GameMode::Control,
            Environment::Day,
            None,
        );
        let status = status_for(&current);
        let weighting = weighting_for(&catalog);
        // allow_consecutive_skirmishes already defaults to false
        let config = config(6, 2, 2);
        let history: Vec<String> = Vec::new();

        let selector = MapSelector::new(&status, &catalog, &weighting, &config, &history);
        let selection = selector.get_selection(&mut StdRng::seed_from_u64(3));
        let modes: Vec<GameMode> = selection.iter().map(|id| mode_of(&catalog, id)).collect();
        assert!(modes.iter().all(|m| !m.is_small()));
    }

    #[test]
    fn empty_catalog_yields_empty_selection() {
        let catalog: Vec<Layer> = Vec::new();
        let current = layer("carentan_warfare", "carentan", GameMode::Warfare, Environment::Day, None);
        let status = status_for(&current);
        let weighting = weighting_for(&catalog);
        let config = config(6, 2, 2);
        let history: Vec<String> = Vec::new();

        let selector = MapSelector::new(&status, &catalog, &weighting, &config, &history);
        assert!(selector.get_selection(&mut StdRng::seed_from_u64(1)).is_empty());
    }

    #[test]
    fn zero_counts_yield_empty_selection() {
        let catalog = big_catalog();
        let current = catalog[0].clone();
        let status = status_for(&current);
        let weighting = weighting_for(&catalog);
        let config = config(0, 0, 0);
        let history: Vec<String> = Vec::new();

        let selector = MapSelector::new(&status, &catalog, &weighting, &config, &history);
        assert!(selector.get_selection(&mut StdRng::seed_from_u64(1)).is_empty());
    }

    #[test]
    fn history_exclusion_window_may_exceed_history_length() {
        let catalog = big_catalog();
        let current = catalog.iter().find(|l| l.id == "carentan_warfare").unwrap().clone();
        let status = status_for(&current);
        let weighting = weighting_for(&catalog);
        let config = VoteMapUserConfig {
            number_last_played_to_exclude: 10,
            ..config(31, 0, 0)
        };
        let history = vec!["w01_warfare".to_string()];

        let selector = MapSelector::new(&status, &catalog, &weighting, &config, &history);
        let selection = selector.get_selection(&mut StdRng::seed_from_u64(5));

        assert!(!selection.contains(&"w01_warfare".to_string()));
        assert!(!selection.contains(&"carentan_warfare".to_string()));
        // everything else was eligible; same-map exclusion is scoped to the
        // offensive and skirmish buckets, so only those two ids are gone
        assert_eq!(selection.len(), 30);
    }

    #[test]
    fn zero_repeat_decay_collapses_the_map_after_one_draw() {
        let catalog = vec![
            layer("foy_warfare", "foy", GameMode::Warfare, Environment::Day, None),
            layer("foy_warfare_night", "foy", GameMode::Warfare, Environment::Night, None),
            layer("foy_warfare_rain", "foy", GameMode::Warfare, Environment::Rain, None),
        ];
        let current = layer("carentan_warfare", "carentan", GameMode::Warfare, Environment::Day, None);
        let status = status_for(&current);

        let groups = HashMap::from([(
            "Foy".to_string(),
            MapGroup::new(100, 0.0, vec!["foy".to_string()]).unwrap(),
        )]);
        let environments = HashMap::from([(
            "Any".to_string(),
            EnvironmentGroup::new(
                100,
                1.0,
                vec![Environment::Day, Environment::Night, Environment::Rain],
            )
            .unwrap(),
        )]);
        let weighting = WeightingParameters::new(groups, environments).unwrap();
        let config = config(3, 0, 0);
        let history: Vec<String> = Vec::new();

        let selector = MapSelector::new(&status, &catalog, &weighting, &config, &history);
        let selection = selector.get_selection(&mut StdRng::seed_from_u64(11));
        assert_eq!(selection.len(), 1);
    }

    #[test]
    fn unconfigured_maps_are_dropped_from_selection() {
        let catalog = vec![
            layer("foy_warfare", "foy", GameMode::Warfare, Environment::Day, None),
            layer("omaha_warfare", "omaha", GameMode::Warfare, Environment::Day, None),
        ];
        let current = layer("carentan_warfare", "carentan", GameMode::Warfare, Environment::Day, None);
        let status = status_for(&current);

        let groups = HashMap::from([(
            "Foy".to_string(),
            MapGroup::new(100, 0.5, vec!["foy".to_string()]).unwrap(),
        )]);
        let environments = HashMap::from([(
            "Any".to_string(),
            EnvironmentGroup::new(100, 0.5, vec![Environment::Day]).unwrap(),
        )]);
        let weighting = WeightingParameters::new(groups, environments).unwrap();
        let config = config(5, 0, 0);
        let history: Vec<String> = Vec::new();

        let selector = MapSelector::new(&status, &catalog, &weighting, &config, &history);
        let selection = selector.get_selection(&mut StdRng::seed_from_u64(2));
        assert_eq!(selection, vec!["foy_warfare".to_string()]);
    }

    #[test]
    fn opposite_sides_rule_excludes_same_side_attackers() {
        let catalog = big_catalog();
        let current = layer(
            "carentan_offensive_us",
            "carentan",
            GameMode::Offensive,
            Environment::Day,
            Some(Team::Allies),
        );
        let status = status_for(&current);
        let weighting = weighting_for(&catalog);
        let config = VoteMapUserConfig {
            allow_consecutive_offensives_opposite_sides: true,
            ..config(0, 18, 0)
        };
        let history: Vec<String> = Vec::new();

        let selector = MapSelector::new(&status, &catalog, &weighting, &config, &history);
        let selection = selector.get_selection(&mut StdRng::seed_from_u64(9));

        assert!(!selection.is_empty());
        for id in &selection {
            let chosen = catalog.iter().find(|l| &l.id == id).unwrap();
            assert_eq!(chosen.attackers, Some(Team::Axis), "{id} attacked by the wrong side");
        }
    }

    #[test]
    fn recent_map_exclusion_applies_to_the_offensive_bucket() {
        let catalog = big_catalog();
        let current = catalog.iter().find(|l| l.id == "carentan_warfare").unwrap().clone();
        let status = status_for(&current);
        let weighting = weighting_for(&catalog);
        // consider_offensive_same_map defaults to true
        let config = VoteMapUserConfig {
            number_last_played_to_exclude: 1,
            ..config(0, 36, 0)
        };
        let history = vec!["o01_offensive_allies_day".to_string()];

        let selector = MapSelector::new(&status, &catalog, &weighting, &config, &history);
        let selection = selector.get_selection(&mut StdRng::seed_from_u64(21));

        assert!(!selection.is_empty());
        assert!(selection.iter().all(|id| !id.starts_with("o01_")));
    }
}
