use rand::Rng;

/// One candidate layer joined with its weighting configuration.
pub(crate) struct TableRow {
    pub id: String,
    pub map_id: String,
    pub environment_category: String,
    pub map_weight: f64,
    pub map_repeat_decay: f64,
    pub environment_weight: f64,
    pub environment_repeat_decay: f64,
    pub map_norm: f64,
    pub environment_norm: f64,
}

/// The selection working set, laid out as parallel columns keyed by row
/// index so each draw is a single pass over flat arrays.
#[derive(Default)]
pub(crate) struct SelectionTable {
    ids: Vec<String>,
    map_ids: Vec<String>,
    environment_categories: Vec<String>,
    map_weights: Vec<f64>,
    map_repeat_decays: Vec<f64>,
    environment_weights: Vec<f64>,
    environment_repeat_decays: Vec<f64>,
    map_norms: Vec<f64>,
    environment_norms: Vec<f64>,
    map_repeat_scores: Vec<f64>,
    environment_repeat_scores: Vec<f64>,
}

impl SelectionTable {
    pub fn push(&mut self, row: TableRow) {
        self.ids.push(row.id);
        self.map_ids.push(row.map_id);
        self.environment_categories.push(row.environment_category);
        self.map_weights.push(row.map_weight);
        self.map_repeat_decays.push(row.map_repeat_decay);
        self.environment_weights.push(row.environment_weight);
        self.environment_repeat_decays.push(row.environment_repeat_decay);
        self.map_norms.push(row.map_norm);
        self.environment_norms.push(row.environment_norm);
        self.map_repeat_scores.push(1.0);
        self.environment_repeat_scores.push(1.0);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    fn weight(&self, i: usize) -> f64 {
        self.map_weights[i]
            * self.map_norms[i]
            * self.environment_weights[i]
            * self.environment_norms[i]
            * self.map_repeat_scores[i]
            * self.environment_repeat_scores[i]
    }

    /// Draw up to `count` distinct layers, decaying the scores of rows that
    /// share the chosen row's map or environment category after each draw.
    pub fn select(mut self, count: u32, rng: &mut impl Rng) -> Vec<String> {
        let mut selected = Vec::new();
        for _ in 0..count {
            let weights: Vec<f64> = (0..self.len()).map(|i| self.weight(i)).collect();
            let total: f64 = weights.iter().sum();
            if total <= 0.0 {
                break;
            }

            let chosen = sample_index(&weights, total, rng);
            selected.push(self.ids[chosen].clone());

            let map_id = self.map_ids[chosen].clone();
            let category = self.environment_categories[chosen].clone();
            for i in 0..self.len() {
                if self.map_ids[i] == map_id {
                    self.map_repeat_scores[i] *= self.map_repeat_decays[i];
                }
                if self.environment_categories[i] == category {
                    self.environment_repeat_scores[i] *= self.environment_repeat_decays[i];
                }
            }
            // the chosen layer must never be drawn twice
            self.map_repeat_scores[chosen] = 0.0;
        }
        selected
    }
}

fn sample_index(weights: &[f64], total: f64, rng: &mut impl Rng) -> usize {
    let mut draw = rng.random::<f64>() * total;
    let mut fallback = 0;
    for (i, weight) in weights.iter().enumerate() {
        if *weight <= 0.0 {
            continue;
        }
        fallback = i;
        if draw < *weight {
            return i;
        }
        draw -= weight;
    }
    // floating-point remainder lands on the last positive weight
    fallback
}
