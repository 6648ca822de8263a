//! Evolution - genetic search over the fuser's weight vector
//!
//! Fitness reads the joined outcome history; the search itself is pure so
//! it can be exercised without a store. When the rolling win-rate drops
//! under the floor, the alpha individual replaces the active weights row
//! and the fuser picks it up on its next cache refresh.

use anyhow::Result;
use rand::Rng;
use std::sync::Arc;
use tracing::info;

use crate::config::EvolutionConfig;
use crate::parallax::weights::{
    Genes, WeightStore, CVD_RANGE, IB_RANGE, MIN_CONFIDENCE_RANGE, ORB_BREAKOUT_RANGE, RSI_RANGE,
    STOP_LOSS_RANGE, TARGET_RANGE, TPO_RANGE, VWAP_RANGE,
};
use crate::persistence::Repository;
use crate::types::{Outcome, OutcomeResult, Prediction};

#[derive(Debug, Clone)]
struct Individual {
    genes: Genes,
    fitness: f64,
}

/// Fitness of the joined outcome dataset. With no history the search is
/// blind and every individual scores 0.5.
pub fn fitness_of(history: &[(Prediction, Outcome)]) -> f64 {
    if history.is_empty() {
        return 0.5;
    }
    let wins = history
        .iter()
        .filter(|(_, o)| o.result == OutcomeResult::Win)
        .count();
    let win_rate = wins as f64 / history.len() as f64;
    let avg_pnl =
        history.iter().map(|(_, o)| o.realized_pnl).sum::<f64>() / history.len() as f64;
    0.7 * win_rate + if avg_pnl > 0.0 { 0.3 } else { 0.0 }
}

/// Uniform-random genes within per-field bounds, components normalized
pub fn random_genes(rng: &mut impl Rng) -> Genes {
    let mut genes = Genes {
        tpo: rng.gen_range(TPO_RANGE.0..=TPO_RANGE.1),
        rsi: rng.gen_range(RSI_RANGE.0..=RSI_RANGE.1),
        ib: rng.gen_range(IB_RANGE.0..=IB_RANGE.1),
        cvd: rng.gen_range(CVD_RANGE.0..=CVD_RANGE.1),
        vwap: rng.gen_range(VWAP_RANGE.0..=VWAP_RANGE.1),
        min_confidence: rng.gen_range(MIN_CONFIDENCE_RANGE.0..=MIN_CONFIDENCE_RANGE.1),
        orb_breakout_mult: rng.gen_range(ORB_BREAKOUT_RANGE.0..=ORB_BREAKOUT_RANGE.1),
        stop_loss_mult: rng.gen_range(STOP_LOSS_RANGE.0..=STOP_LOSS_RANGE.1),
        target_mult: rng.gen_range(TARGET_RANGE.0..=TARGET_RANGE.1),
    };
    genes.normalize();
    genes
}

/// Per-field uniform pick from either parent, then renormalize
pub fn crossover(a: &Genes, b: &Genes, rng: &mut impl Rng) -> Genes {
    let mut pick = |x: f64, y: f64| if rng.gen_bool(0.5) { x } else { y };
    let mut child = Genes {
        tpo: pick(a.tpo, b.tpo),
        rsi: pick(a.rsi, b.rsi),
        ib: pick(a.ib, b.ib),
        cvd: pick(a.cvd, b.cvd),
        vwap: pick(a.vwap, b.vwap),
        min_confidence: pick(a.min_confidence, b.min_confidence),
        orb_breakout_mult: pick(a.orb_breakout_mult, b.orb_breakout_mult),
        stop_loss_mult: pick(a.stop_loss_mult, b.stop_loss_mult),
        target_mult: pick(a.target_mult, b.target_mult),
    };
    child.normalize();
    child
}

fn jitter(value: f64, step: f64, range: (f64, f64), rng: &mut impl Rng) -> f64 {
    (value + rng.gen_range(-step..=step)).clamp(range.0, range.1)
}

/// Per-field mutation with the documented noise ranges; component weights
/// renormalize whenever any of them moved.
pub fn mutate(genes: &mut Genes, rate: f64, rng: &mut impl Rng) {
    let mut component_touched = false;

    if rng.gen_bool(rate) {
        genes.tpo = jitter(genes.tpo, 0.05, TPO_RANGE, rng);
        component_touched = true;
    }
    if rng.gen_bool(rate) {
        genes.rsi = jitter(genes.rsi, 0.05, RSI_RANGE, rng);
        component_touched = true;
    }
    if rng.gen_bool(rate) {
        genes.ib = jitter(genes.ib, 0.05, IB_RANGE, rng);
        component_touched = true;
    }
    if rng.gen_bool(rate) {
        genes.cvd = jitter(genes.cvd, 0.05, CVD_RANGE, rng);
        component_touched = true;
    }
    if rng.gen_bool(rate) {
        genes.vwap = jitter(genes.vwap, 0.05, VWAP_RANGE, rng);
        component_touched = true;
    }
    if rng.gen_bool(rate) {
        genes.min_confidence = jitter(genes.min_confidence, 5.0, MIN_CONFIDENCE_RANGE, rng);
    }
    if rng.gen_bool(rate) {
        genes.orb_breakout_mult = jitter(genes.orb_breakout_mult, 0.2, ORB_BREAKOUT_RANGE, rng);
    }
    if rng.gen_bool(rate) {
        genes.stop_loss_mult = jitter(genes.stop_loss_mult, 0.1, STOP_LOSS_RANGE, rng);
    }
    if rng.gen_bool(rate) {
        genes.target_mult = jitter(genes.target_mult, 0.3, TARGET_RANGE, rng);
    }

    if component_touched {
        genes.normalize();
    }
}

/// Roulette selection over non-negative fitness; uniform when the pool sums
/// to zero.
fn select<'a>(population: &'a [Individual], rng: &mut impl Rng) -> &'a Individual {
    let total: f64 = population.iter().map(|i| i.fitness.max(0.0)).sum();
    if total <= 0.0 {
        return &population[rng.gen_range(0..population.len())];
    }
    let mut spin = rng.gen_range(0.0..total);
    for individual in population {
        spin -= individual.fitness.max(0.0);
        if spin <= 0.0 {
            return individual;
        }
    }
    &population[population.len() - 1]
}

/// Pure search: one pass of init -> elitism -> crossover/mutation ->
/// re-evaluation, returning the alpha individual's genes.
pub fn search(dataset_fitness: f64, config: &EvolutionConfig, rng: &mut impl Rng) -> Genes {
    let mut population: Vec<Individual> = (0..config.population_size.max(1))
        .map(|_| Individual {
            genes: random_genes(rng),
            fitness: dataset_fitness,
        })
        .collect();
    population.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));

    for _ in 0..config.generations.max(1) {
        let mut next: Vec<Individual> = population
            .iter()
            .take(config.elite_count.min(population.len()))
            .cloned()
            .collect();

        while next.len() < population.len() {
            let mut child = if rng.gen_bool(config.crossover_rate.clamp(0.0, 1.0)) {
                let a = select(&population, rng);
                let b = select(&population, rng);
                crossover(&a.genes, &b.genes, rng)
            } else {
                population[0].genes.clone()
            };
            mutate(&mut child, config.mutation_rate.clamp(0.0, 1.0), rng);
            next.push(Individual {
                genes: child,
                fitness: dataset_fitness,
            });
        }

        population = next;
        population.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
    }

    population[0].genes.clone()
}

/// Retraining driver wired to the repository
pub struct EvolutionEngine {
    repo: Arc<Repository>,
    config: EvolutionConfig,
    win_rate_floor: f64,
    weight_store: Option<Arc<WeightStore>>,
}

impl EvolutionEngine {
    pub fn new(repo: Arc<Repository>, config: EvolutionConfig, win_rate_floor: f64) -> Self {
        Self {
            repo,
            config,
            win_rate_floor,
            weight_store: None,
        }
    }

    /// Invalidate this store after every hot-swap so the fuser does not
    /// have to wait out the TTL.
    pub fn with_weight_store(mut self, store: Arc<WeightStore>) -> Self {
        self.weight_store = Some(store);
        self
    }

    /// Run the search and hot-swap the active weights, but only when the
    /// observed win-rate is under the floor.
    pub fn maybe_evolve(&self, ticker: &str, current_win_rate: f64) -> Result<bool> {
        if current_win_rate >= self.win_rate_floor {
            return Ok(false);
        }

        let history = self.repo.outcomes_joined(Some(ticker), None)?;
        let dataset_fitness = fitness_of(&history);
        let mut rng = rand::thread_rng();
        let alpha = search(dataset_fitness, &self.config, &mut rng);

        let reason = format!(
            "win rate {:.2} below floor {:.2}",
            current_win_rate, self.win_rate_floor
        );
        self.repo
            .upsert_active_weights(ticker, &alpha, current_win_rate, &reason)?;
        if let Some(store) = &self.weight_store {
            store.invalidate(ticker);
        }
        info!(
            "evolved weights for {} over {} outcomes (fitness {:.3})",
            ticker,
            history.len(),
            dataset_fitness
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::test_support::{make_prediction, temp_repository};
    use crate::types::{Direction, TradePlan};
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn config() -> EvolutionConfig {
        EvolutionConfig {
            population_size: 20,
            elite_count: 3,
            mutation_rate: 0.15,
            crossover_rate: 0.7,
            generations: 1,
        }
    }

    fn in_range(v: f64, range: (f64, f64)) -> bool {
        v >= range.0 && v <= range.1
    }

    #[test]
    fn test_mutation_preserves_normalization_and_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let mut genes = random_genes(&mut rng);
            mutate(&mut genes, 0.9, &mut rng);
            assert!(
                (genes.component_sum() - 1.0).abs() < 1e-9,
                "sum {}",
                genes.component_sum()
            );
            assert!(in_range(genes.min_confidence, MIN_CONFIDENCE_RANGE));
            assert!(in_range(genes.orb_breakout_mult, ORB_BREAKOUT_RANGE));
            assert!(in_range(genes.stop_loss_mult, STOP_LOSS_RANGE));
            assert!(in_range(genes.target_mult, TARGET_RANGE));
        }
    }

    #[test]
    fn test_crossover_renormalizes() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let a = random_genes(&mut rng);
            let b = random_genes(&mut rng);
            let child = crossover(&a, &b, &mut rng);
            assert!((child.component_sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_fitness_formula() {
        assert_eq!(fitness_of(&[]), 0.5);

        let plan = TradePlan {
            entry: 1.0,
            stop: 0.5,
            target: 2.0,
            risk_reward: 2.0,
        };
        let p = make_prediction("SPY", Direction::Call, plan);
        let win = (
            p.clone(),
            crate::types::Outcome {
                prediction_id: p.id.clone(),
                result: OutcomeResult::Win,
                realized_pnl: 1.0,
                closed_at: Utc::now(),
            },
        );
        let loss = (
            p.clone(),
            crate::types::Outcome {
                prediction_id: p.id.clone(),
                result: OutcomeResult::Loss,
                realized_pnl: -0.4,
                closed_at: Utc::now(),
            },
        );
        // 50% wins, positive average pnl
        let f = fitness_of(&[win.clone(), loss.clone()]);
        assert!((f - (0.35 + 0.3)).abs() < 1e-9);
        // All losses, negative pnl: no pnl bonus
        let f = fitness_of(&[loss.clone(), loss]);
        assert!((f - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_search_alpha_is_well_formed() {
        let mut rng = StdRng::seed_from_u64(3);
        let alpha = search(0.5, &config(), &mut rng);
        assert!((alpha.component_sum() - 1.0).abs() < 1e-9);
        assert!(in_range(alpha.min_confidence, MIN_CONFIDENCE_RANGE));
    }

    #[test]
    fn test_maybe_evolve_respects_floor() {
        let repo = Arc::new(temp_repository());
        let engine = EvolutionEngine::new(repo.clone(), config(), 0.60);

        assert!(!engine.maybe_evolve("SPY", 0.75).unwrap());
        assert!(repo.get_active_weights("SPY").unwrap().is_none());

        assert!(engine.maybe_evolve("SPY", 0.30).unwrap());
        let active = repo.get_active_weights("SPY").unwrap().unwrap();
        assert!((active.component_sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_second_evolution_logs_delta() {
        let repo = Arc::new(temp_repository());
        let engine = EvolutionEngine::new(repo.clone(), config(), 0.60);
        engine.maybe_evolve("SPY", 0.30).unwrap();
        engine.maybe_evolve("SPY", 0.40).unwrap();
        assert_eq!(repo.weights_delta_count().unwrap(), 1);
    }
}
